//! Application entry point for the `conservation-monitor` service.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the database schema if it does not exist
//! - Wiring the evaluation engine and notification dispatcher around one
//!   shared rate limiter
//! - Spawning the periodic dispatch loop
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//!
//! # Environment Variables
//! See `config::load_from_env` for the full list. Logging is controlled by
//! `RUST_LOG`, or `APP_LOG_LEVEL` (default: `debug`) and `APP_SPAN_EVENTS`.
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use conservation_monitor::notify::{LogSender, NotificationSender, WebhookSender};
use conservation_monitor::store::{PgAlertStore, PgArtifactStore};
use conservation_monitor::{config, routes, schema, Dispatcher, Engine, RateLimiter};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!(
        "Attempting to connect to database: {}",
        config::mask_db_url(&cfg.db_url)
    );

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .acquire_timeout(cfg.store_timeout())
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let alerts = Arc::new(PgAlertStore::new(pool.clone()));
    let artifacts = Arc::new(PgArtifactStore::new(pool));
    let limiter = Arc::new(RateLimiter::from_minutes(cfg.notify_threshold_minutes));

    let sender: Arc<dyn NotificationSender> = match &cfg.notify_webhook_url {
        Some(url) => Arc::new(WebhookSender::new(url.clone())),
        None => Arc::new(LogSender),
    };

    let engine = Arc::new(Engine::new(
        alerts.clone(),
        artifacts.clone(),
        limiter.clone(),
        cfg.engine_settings(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        alerts,
        artifacts,
        sender,
        limiter,
        cfg.store_timeout(),
        cfg.send_timeout(),
    ));

    tokio::spawn(dispatcher.clone().run(cfg.dispatch_interval()));

    // Build app from routes gateway (EMBP)
    let app = routes::router(engine, dispatcher);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `APP_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to `APP_LOG_LEVEL`
///
/// Must be called once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("APP_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("APP_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
