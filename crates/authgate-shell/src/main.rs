//! authgate - a terminal shell around the authgate session core.
//!
//! Shows a login/sign-up screen or a welcome screen depending on whether a
//! session is live, and drops back to the login screen when the session
//! window elapses.

mod app;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use authgate_core::Config;

use app::App;

/// Log file prefix inside the data directory
const LOG_FILE_PREFIX: &str = "authgate.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to a daily rolling file so they never interleave with prompts.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(config: &Config) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = config.data_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX),
    );

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _log_guard = init_tracing(&config)?;
    info!("authgate starting");

    let mut app = App::new(config)?;
    let result = app.run().await;

    if let Err(ref e) = result {
        eprintln!("Error: {}", e);
    }

    info!("authgate shutting down");
    result
}
