use norsim::config::{LogConfig, LogTarget};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging from `NS_LOG`/`NS_LOGLEVEL`; `RUST_LOG` wins when set.
pub fn init_telemetry(cfg: &LogConfig) {
    let level = cfg.level.as_directive();
    let filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("norsim={level},norsim_cli={level}")),
    );

    match &cfg.target {
        LogTarget::File(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .init();
                tracing::info!("Using {} file for logging", path.display());
            }
            Err(e) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer())
                    .init();
                tracing::warn!(
                    "Path {} is not valid ({}), falling back to STDIO logging",
                    path.display(),
                    e
                );
            }
        },
        LogTarget::Stdio => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
