//! SafeGuardian Cloud Server
//!
//! HTTP front door of the monitoring pipeline: collectors push events,
//! guardians and reviewers work alerts and evidence, the scheduler runs
//! maintenance.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   SAFEGUARDIAN CLOUD                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │  API      │  │  Auth     │  │  Monitor                │ │
//! │  │  Gateway  │─►│  (JWT)    │─►│  (per-session workers)  │ │
//! │  │  (Axum)   │  │           │  │                         │ │
//! │  └───────────┘  └───────────┘  └────────────┬────────────┘ │
//! │                       ┌─────────────────────┼──────────┐   │
//! │                       ▼                     ▼          ▼   │
//! │                ┌─────────────┐   ┌──────────────┐ ┌──────┐ │
//! │                │ PostgreSQL  │   │ Evidence dir │ │Oracle│ │
//! │                └─────────────┘   └──────────────┘ └──────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod store;
mod handlers;
mod middleware;
mod error;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
    middleware as axum_middleware,
};
use guardian_core::logic::audit::{AuditSink, FanoutAuditSink, JsonlAuditSink, StoreAuditSink};
use guardian_core::logic::evidence::FsBlobStore;
use guardian_core::logic::notify::{LogNotifier, Notifier, WebhookNotifier};
use guardian_core::logic::scoring::{HttpOracle, ScoringOracle, StaticOracle};
use guardian_core::logic::store::{MemoryStore, Store};
use guardian_core::{Monitor, MonitorDeps, PipelineConfig};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "guardian_cloud=debug,guardian_core=info,tower_http=debug".into());
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("SafeGuardian Cloud Server starting ({})...", config.environment);

    let monitor = build_monitor(&config).await?;

    // Build application state
    let state = AppState {
        monitor: Arc::new(monitor),
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire the pipeline to its backends
async fn build_monitor(config: &config::Config) -> anyhow::Result<Monitor> {
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("Database: {}", url.split('@').last().unwrap_or("***"));
            let pool = db::create_pool(url).await
                .context("Failed to create database pool")?;

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await
                .context("Failed to run migrations")?;
            Arc::new(store::PgStore::new(pool))
        }
        None => {
            if config.is_production() {
                anyhow::bail!("DATABASE_URL is required in production");
            }
            tracing::warn!("No DATABASE_URL set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let oracle: Arc<dyn ScoringOracle> = match &config.oracle_url {
        Some(url) => Arc::new(HttpOracle::new(url.clone(), config.http_timeout)?),
        None => {
            tracing::warn!("No ORACLE_URL set, messages will not be analyzed");
            Arc::new(StaticOracle::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), config.http_timeout)?),
        None => Arc::new(LogNotifier),
    };

    let blobs = Arc::new(FsBlobStore::new(&config.evidence_dir)?);

    let audit_sink: Option<Arc<dyn AuditSink>> = match &config.audit_log_dir {
        Some(dir) => {
            let jsonl = JsonlAuditSink::new(dir)
                .with_context(|| format!("Failed to open audit log dir {}", dir.display()))?;
            let sinks: Vec<Arc<dyn AuditSink>> = vec![
                Arc::new(StoreAuditSink::new(store.clone())),
                Arc::new(jsonl),
            ];
            Some(Arc::new(FanoutAuditSink::new(sinks)))
        }
        None => None,
    };

    Ok(Monitor::new(
        PipelineConfig::from_env(),
        MonitorDeps {
            store,
            oracle,
            notifier,
            blobs,
            audit_sink,
            children: None,
        },
    ))
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check));

    // Authenticated routes; the pipeline checks what each role may do
    let api_routes = Router::new()
        // Ingestion
        .route("/api/v1/ingest/events", post(handlers::ingest::submit))

        // Sessions
        .route("/api/v1/sessions/:id", get(handlers::sessions::get))
        .route("/api/v1/sessions/:id/alerts", get(handlers::sessions::alerts))
        .route(
            "/api/v1/sessions/:id/participants/:participant_id/reset-risk",
            post(handlers::sessions::reset_participant_risk),
        )

        // Alerts
        .route("/api/v1/alerts/:id", get(handlers::alerts::get))
        .route("/api/v1/alerts/:id/export", get(handlers::alerts::export))
        .route("/api/v1/alerts/:id/actions/:action", post(handlers::alerts::act))

        // Evidence
        .route("/api/v1/evidence/:id", get(handlers::evidence::read))
        .route("/api/v1/evidence/:id/verify", post(handlers::evidence::verify))
        .route("/api/v1/evidence/:id/legal-hold", post(handlers::evidence::legal_hold))

        // Audit
        .route("/api/v1/audit", get(handlers::audit::list))

        // Maintenance
        .route("/api/v1/maintenance/expire-idle", post(handlers::maintenance::expire_idle))
        .route("/api/v1/maintenance/retention", post(handlers::maintenance::retention))

        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
