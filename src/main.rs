//! Belgian eID middleware bridge

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beid_service::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    tracing::info!("Starting Belgian eID middleware service");

    let config = Config::from_env()?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    beid_service::server::run(listener, config).await?;

    Ok(())
}

/// Console logging always; file logging best-effort, degrading silently to
/// console-only when no candidate directory is writable.
fn init_tracing() {
    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beid_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer());

    match open_log_file() {
        Some((path, file)) => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::sync::Arc::new(file))
                        .with_ansi(false),
                )
                .init();
            tracing::info!("Logging to {}", path.display());
        }
        None => {
            registry.init();
            tracing::warn!("Could not create log file. Logging to console only.");
        }
    }
}

/// Try a fixed list of directories and keep the first one that accepts an
/// appended log file.
fn open_log_file() -> Option<(std::path::PathBuf, std::fs::File)> {
    let file_name = format!("beid_service_{}.log", chrono::Local::now().format("%Y%m%d"));

    let mut candidates: Vec<std::path::PathBuf> = vec!["/app".into(), "/tmp".into()];
    if let Ok(home) = std::env::var("HOME") {
        candidates.push(home.into());
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }

    for dir in candidates {
        let path = dir.join(&file_name);
        if let Ok(file) = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
        {
            return Some((path, file));
        }
    }
    None
}
