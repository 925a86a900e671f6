use crate::cli::ServeArgs;
use crate::infra::{in_memory_engine, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use shelter_intake::clock::{Clock, SystemClock};
use shelter_intake::config::AppConfig;
use shelter_intake::error::AppError;
use shelter_intake::telemetry;
use shelter_intake::workflows::profiles::integrations::{
    publishers_from_env, DeepLTranslator, MatchpfoteClient,
};
use shelter_intake::workflows::profiles::{JobRunner, JobWorker, LifecycleEngine, TokioJobQueue};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (queue, receiver) = TokioJobQueue::channel();
    let engine = Arc::new(in_memory_engine(
        Arc::new(queue),
        clock,
        config.jobs.clone(),
    ));

    let runner = JobRunner::new(
        engine.clone(),
        Arc::new(DeepLTranslator::from_env()),
        publishers_from_env(&config.publishing),
        Arc::new(MatchpfoteClient::from_env(config.publishing.clone())),
    );
    tokio::spawn(JobWorker::new(Arc::new(runner), &config.jobs).run(receiver));
    let sweeper = tokio::spawn(sweep_rate_limits(engine.clone()));

    let app = with_service_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "shelter intake service ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("shelter intake service stopped");
    Ok(())
}

/// Drops rate-limit records past their retention once an hour.
async fn sweep_rate_limits(engine: Arc<LifecycleEngine>) {
    let mut ticker = tokio::time::interval(RATE_LIMIT_SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(err) = engine.rate_limiter().sweep() {
            warn!(error = %err, "rate limit sweep failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
