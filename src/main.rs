use std::{process, sync::Arc};

use showcase::{
    application::{
        error::AppError,
        preload::PreloadAggregator,
        repos::{ContentRepo, SnapshotsRepo},
        revalidate::{NoopRevalidator, PageRevalidator},
    },
    cache::{CacheConfig, KvStore, MemoryStore, ReadThroughCache},
    config,
    domain::snapshots::Snapshotable,
    infra::{
        db::PostgresContentRepo,
        error::InfraError,
        http::{self, HttpState},
        revalidate::{HttpRevalidator, RevalidateConfig},
        snapshots::{SnapshotStore, SnapshotStoreConfig},
        telemetry,
    },
    sync::{SyncConfig, SyncCoordinator},
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Publish(_) => run_publish(settings).await,
        config::Command::Status(_) => run_status(settings).await,
    }
}

/// Shared runtime pieces used by `serve` and `publish`.
struct Runtime {
    cache: Arc<ReadThroughCache>,
    snapshots: Arc<SnapshotStore>,
    coordinator: SyncCoordinator,
}

async fn build_runtime(settings: &config::Settings) -> Result<Runtime, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new(cache_config.capacity_non_zero()));
    let cache = Arc::new(ReadThroughCache::new(&cache_config, store));

    let snapshots = Arc::new(
        SnapshotStore::open(SnapshotStoreConfig::from(&settings.snapshots))
            .await
            .map_err(InfraError::from)?,
    );

    let revalidator = build_revalidator(&settings.revalidate)?;
    let coordinator = SyncCoordinator::spawn(
        SyncConfig::from(&settings.sync),
        snapshots.clone() as Arc<dyn SnapshotsRepo>,
        cache.clone(),
        revalidator,
    );

    Ok(Runtime {
        cache,
        snapshots,
        coordinator,
    })
}

fn build_revalidator(
    settings: &config::RevalidateSettings,
) -> Result<Arc<dyn PageRevalidator>, AppError> {
    match settings.url.clone() {
        Some(url) => {
            let config = RevalidateConfig {
                url,
                token: settings.token.clone(),
                timeout: settings.timeout,
            };
            Ok(Arc::new(HttpRevalidator::new(config)?))
        }
        None => {
            info!("No revalidation endpoint configured; page revalidation is logged only");
            Ok(Arc::new(NoopRevalidator))
        }
    }
}

fn build_content_repo(settings: &config::Settings) -> Result<PostgresContentRepo, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        AppError::from(InfraError::configuration(
            "database.url must be set (SHOWCASE__DATABASE__URL or --database-url)",
        ))
    })?;

    let pool = PostgresContentRepo::connect_lazy(
        url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(PostgresContentRepo::new(pool))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repo = build_content_repo(&settings)?;
    if let Err(err) = repo.health_check().await {
        warn!(error = %err, "Database unreachable at start-up; reads will fall back");
    }

    let runtime = build_runtime(&settings).await?;
    let aggregator = Arc::new(PreloadAggregator::new(
        Arc::new(repo) as Arc<dyn ContentRepo>,
        runtime.snapshots.clone() as Arc<dyn SnapshotsRepo>,
        runtime.cache.clone(),
        CacheConfig::from(&settings.cache).ttl,
    ));

    let router = http::build_router(HttpState {
        aggregator,
        coordinator: runtime.coordinator.clone(),
        snapshots: runtime.snapshots.clone(),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "Showcase listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    match tokio::time::timeout(
        settings.server.graceful_shutdown,
        runtime.coordinator.shutdown(),
    )
    .await
    {
        Ok(Ok(report)) => info!(
            written = report.written(),
            elapsed_ms = report.elapsed_ms,
            "Final flush completed"
        ),
        Ok(Err(err)) => warn!(error = %err, "Final flush skipped"),
        Err(_) => warn!(
            timeout_secs = settings.server.graceful_shutdown.as_secs(),
            "Final flush timed out; pending updates were dropped"
        ),
    }

    Ok(())
}

async fn run_publish(settings: config::Settings) -> Result<(), AppError> {
    let repo = build_content_repo(&settings)?;
    let runtime = build_runtime(&settings).await?;

    let sections = repo.homepage_sections().await.map_err(repo_error)?;
    let campaigns = repo.active_campaigns().await.map_err(repo_error)?;
    let category_stats = repo.category_stats().await.map_err(repo_error)?;

    runtime.coordinator.queue_update(sections.into_update())?;
    runtime.coordinator.queue_update(campaigns.into_update())?;
    runtime
        .coordinator
        .queue_update(category_stats.into_update())?;

    let report = runtime.coordinator.sync_now().await?;
    runtime.coordinator.shutdown().await?;

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|err| AppError::unexpected(format!("failed to encode report: {err}")))?;
    println!("{rendered}");

    if report.written() < report.outcomes.len() {
        return Err(AppError::unexpected(format!(
            "{} of {} snapshots were not written",
            report.outcomes.len() - report.written(),
            report.outcomes.len()
        )));
    }
    Ok(())
}

async fn run_status(settings: config::Settings) -> Result<(), AppError> {
    let store = SnapshotStore::open(SnapshotStoreConfig::from(&settings.snapshots))
        .await
        .map_err(InfraError::from)?;
    let status = store.status().await;

    let rendered = serde_json::to_string_pretty(&status)
        .map_err(|err| AppError::unexpected(format!("failed to encode status: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn repo_error(err: showcase::application::repos::RepoError) -> AppError {
    AppError::from(InfraError::database(err.to_string()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
