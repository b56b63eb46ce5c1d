use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use clap::Parser;
use rivus::{
    application::{
        error::AppError,
        feed::{FeedCacheTuning, FeedRanking, FeedService},
        jobs::{
            ApalisIngestQueue, INGEST_POST_NAMESPACE, IngestWorkerContext, process_ingest_post_job,
        },
        ranker::{HttpRanker, RankerConfig},
    },
    cache::MemoryFeedStore,
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let cli_args = config::CliArgs::parse();
    let settings = config::load(&cli_args)
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::default()))
    {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

fn database_url(settings: &config::Settings) -> Result<&str, AppError> {
    settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| AppError::from(InfraError::configuration("database.url is not set")))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let url = database_url(&settings)?;
    let pool = PostgresRepositories::connect(url, 1)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    info!("migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let url = database_url(&settings)?;

    let http_pool =
        PostgresRepositories::connect(url, settings.database.http_max_connections.get())
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
    let jobs_pool =
        PostgresRepositories::connect(url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&http_pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    PostgresStorage::setup(&jobs_pool)
        .await
        .map_err(|err| InfraError::job_queue(err.to_string()))?;

    let repositories = Arc::new(PostgresRepositories::new(http_pool));
    let job_repositories = Arc::new(PostgresRepositories::new(jobs_pool));

    let ranker = HttpRanker::new(
        reqwest::Client::new(),
        RankerConfig {
            base_url: settings.ranker.base_url.clone(),
            token: settings.ranker.token.clone(),
        },
    );
    let ranking = Arc::new(FeedRanking::new(
        Arc::new(MemoryFeedStore::new()),
        Arc::new(ranker),
        FeedCacheTuning {
            staleness_threshold: settings.feed_cache.staleness,
            fresh_page_size: settings.feed_cache.fresh_page_size as usize,
        },
    ));
    let feeds = Arc::new(FeedService::new(
        repositories.clone(),
        repositories.clone(),
        ranking,
    ));

    let ingest_storage = PostgresStorage::new_with_config(
        job_repositories.pool().clone(),
        ApalisSqlConfig::new(INGEST_POST_NAMESPACE),
    );
    let ingest_queue = Arc::new(ApalisIngestQueue::new(ingest_storage.clone()));

    let monitor_handle = spawn_job_monitor(job_repositories, ingest_storage, &settings.jobs);

    let state = ApiState {
        feeds,
        feed_config: repositories.clone(),
        ingest: ingest_queue,
        db: repositories,
    };
    let result = serve_http(&settings, state).await;

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

fn spawn_job_monitor(
    repositories: Arc<PostgresRepositories>,
    storage: PostgresStorage<rivus::application::jobs::IngestPostMessage>,
    jobs: &config::JobsSettings,
) -> tokio::task::JoinHandle<()> {
    let context = IngestWorkerContext { repositories };

    let ingest_worker = WorkerBuilder::new("ingest-post-worker")
        .concurrency(jobs.ingest_concurrency.get() as usize)
        .data(context)
        .backend(storage)
        .build_fn(process_ingest_post_job);

    let monitor = Monitor::new().register(ingest_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| {
            AppError::from(InfraError::Bind {
                addr: settings.server.addr,
                source: err,
            })
        })?;

    info!(addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    // In-flight requests get the configured grace period after the shutdown
    // signal; whatever is still running afterwards is abandoned.
    tokio::select! {
        result = async { server.await } => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "shutdown grace period elapsed, exiting");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install shutdown handler");
    }
}
