//! QMS RS Server
//!
//! HTTP server for the quality management backend. Also runs the periodic
//! task automation sweep when `automation.enabled` is set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qms_api::AppState;
use qms_auth::{Authenticator, JwtService};
use qms_core::config::AppConfig;
use qms_db::{Database, DatabaseConfig, Stores};
use qms_notifications::{build_sender, EmailTemplates};
use qms_services::{Mailer, Services, TaskAutomationService};

mod health;

use health::{HealthChecker, HealthConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "starting QMS RS"
    );

    let database = Database::connect(&DatabaseConfig::from(&config.database))
        .await
        .context("failed to connect to database")?;
    database.migrate().await.context("failed to apply migrations")?;
    let stores = Stores::postgres(database.pool().clone());

    let sender = build_sender(&config.email).context("failed to build e-mail sender")?;
    let mailer = Mailer::new(sender, EmailTemplates::from_config(&config.email));
    let jwt = Arc::new(JwtService::new(config.auth.jwt_secret.as_bytes()));
    let services = Services::new(stores, mailer, config.clone(), jwt.clone());

    if config.automation.enabled {
        tokio::spawn(run_automation(
            services.automation.clone(),
            Duration::from_secs(config.automation.interval_seconds),
        ));
    }

    let state = AppState::new(services, Arc::new(Authenticator::new(jwt)), config.clone())
        .with_database(database.clone());
    let health = Arc::new(HealthChecker::new(HealthConfig::default()).with_database(database.clone()));
    let app = build_router(
        state,
        health,
        Duration::from_secs(config.server.request_timeout_seconds),
    );

    let addr = config.server_addr();
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    database.close().await;
    info!("server shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,qms_server=debug,qms_api=debug,tower_http=debug".into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

fn build_router(state: AppState, health: Arc<HealthChecker>, request_timeout: Duration) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::readiness))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(health);

    Router::new()
        .merge(health_routes)
        .merge(qms_api::router().with_state(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

/// Periodic overdue/recurrence sweep
async fn run_automation(automation: TaskAutomationService, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(interval_seconds = every.as_secs(), "task automation scheduled");

    loop {
        ticker.tick().await;
        let today = chrono::Utc::now().date_naive();
        match automation.run(today).await {
            Ok(report) if report.errors > 0 => warn!(?report, "automation sweep finished with errors"),
            Ok(report) => info!(?report, "automation sweep finished"),
            Err(e) => error!(error = %e, "automation sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use qms_notifications::{EmailAddress, MemoryEmailSender};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = Arc::new(AppConfig::default());
        let jwt = Arc::new(JwtService::new(b"server-test-secret-of-32-bytes!!"));
        let mailer = Mailer::new(
            Arc::new(MemoryEmailSender::new()),
            EmailTemplates::new("http://localhost", EmailAddress::new("qms@example.com")),
        );
        let services = Services::new(Stores::memory(), mailer, config.clone(), jwt.clone());
        let state = AppState::new(services, Arc::new(Authenticator::new(jwt)), config);
        let health = Arc::new(HealthChecker::new(HealthConfig::default()));

        build_router(state, health, Duration::from_secs(5))
    }

    async fn get(uri: &str) -> StatusCode {
        test_app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        assert_eq!(get("/health").await, StatusCode::OK);
        assert_eq!(get("/health/live").await, StatusCode::OK);
        assert_eq!(get("/health/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_is_mounted() {
        assert_eq!(get("/api/v1").await, StatusCode::OK);
        assert_eq!(get("/api/v1/tasks").await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        assert_eq!(get("/nope").await, StatusCode::NOT_FOUND);
    }
}
