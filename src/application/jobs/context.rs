use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::infra::db::PostgresRepositories;

/// Shared context passed to job workers so they can access infrastructure capabilities.
#[derive(Clone)]
pub struct IngestWorkerContext {
    pub repositories: Arc<PostgresRepositories>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
