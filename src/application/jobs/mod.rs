mod context;
mod ingest;

pub use context::{IngestWorkerContext, job_failed};
pub use ingest::{
    ApalisIngestQueue, INGEST_POST_NAMESPACE, IngestPostMessage, IngestQueue, QueueError,
    process_ingest_post_job,
};
