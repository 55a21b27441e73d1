use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::{
    body::Body,
    response::IntoResponse,
    routing::get,
    Router,
};
use http::StatusCode;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod routes;
mod services;

use config::Config;
use db::{EventRepository, ReminderLogRepository};
use error::AppError;
use services::email::ResendTransport;
use services::init;
use services::reminders::{DispatchSettings, ReminderDispatcher, SystemClock};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub dispatcher: Arc<ReminderDispatcher>,
}

/// Turn a governor rejection into the same JSON shape as `AppError`, plus `Retry-After`.
fn rate_limit_response(error: GovernorError) -> http::Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let mut resp = AppError::RateLimited.into_response();

            // Include any headers provided by the governor (e.g., X-RateLimit-* if enabled)
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }

            // `wait_time` is provided as seconds
            resp.headers_mut()
                .insert(http::header::RETRY_AFTER, http::HeaderValue::from(wait_time));

            resp
        }
        GovernorError::UnableToExtractKey => {
            let body = serde_json::json!({
                "error": "Unable to determine client IP for rate limiting",
                "code": "INVALID_REQUEST"
            })
            .to_string();

            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() = StatusCode::BAD_REQUEST;
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            resp
        }
        GovernorError::Other { code, msg, headers } => {
            let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
            let mut resp = http::Response::new(Body::from(body));
            let status =
                StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            *resp.status_mut() = status;
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "college_events=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting College Events reminder service");

    // Initialize database
    let pool = init::init_db(&config).await?;

    // Wire the reminder job
    let dispatcher = ReminderDispatcher::new(
        Arc::new(EventRepository::new(pool.clone())),
        Arc::new(ReminderLogRepository::new(pool.clone())),
        Arc::new(ResendTransport::new(&config.email)?),
        Arc::new(SystemClock),
        DispatchSettings::from_config(&config),
    );

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        dispatcher: Arc::new(dispatcher),
    });

    // Create shutdown notifier for background workers and std threads
    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let thread_shutdown = Arc::new(AtomicBool::new(false));

    // Spawn background workers (returns JoinHandles so we can await shutdown)
    let bg_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    // Rate limiter for the externally triggered dispatch endpoint
    let dispatch_gov_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit.dispatch_per_second.into())
            .burst_size(config.rate_limit.dispatch_burst)
            .key_extractor(SmartIpKeyExtractor)
            .error_handler(rate_limit_response)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build dispatch governor config"))?,
    );

    // Background cleanup for limiter storage
    let dispatch_cleaner = {
        let limiter = dispatch_gov_conf.limiter().clone();
        let interval = Duration::from_secs(60);
        let flag = thread_shutdown.clone();
        std::thread::spawn(move || {
            // Use smaller sleep granularity to allow quick shutdown.
            let tick = Duration::from_secs(1);
            loop {
                for _ in 0..interval.as_secs() {
                    if flag.load(Ordering::SeqCst) {
                        tracing::info!("Dispatch rate limiter cleanup thread exiting");
                        return;
                    }
                    std::thread::sleep(tick);
                }
                tracing::debug!("dispatch rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    let dispatch_rate_layer = GovernorLayer {
        config: dispatch_gov_conf.clone(),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest(
            "/api/reminders",
            routes::reminders::router().layer(dispatch_rate_layer),
        )
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(routes::cors_layer());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    // The signal listener races the server future. On a signal we notify the
    // workers and threads, then drop the server future to stop accepting connections.
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_tx_clone = shutdown_tx.clone();
    let thread_shutdown_clone = thread_shutdown.clone();

    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {},
                        _ = term.recv() => {},
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to bind SIGTERM, listening for Ctrl+C only: {}", e);
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        tracing::info!("Shutdown signal received, notifying background workers and threads");
        let _ = shutdown_tx_clone.send(());
        thread_shutdown_clone.store(true, Ordering::SeqCst);
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Signal handler completed; server future dropped to stop accepting new connections");
        }
    }

    // A reminder run in flight gets some time to finish its current event.
    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );

    let bg_wait = async {
        for h in bg_handles {
            let _ = h.await;
        }
    };
    let _ = tokio::time::timeout(shutdown_wait, bg_wait).await;

    // If the server exited on its own the cleanup thread still needs the flag.
    thread_shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = dispatch_cleaner.join() {
        tracing::warn!("Dispatch cleanup thread join failed: {:?}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
