use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Config, LogFormat};

const DEFAULT_FILTER: &str = "taskboard=info,tower_http=info";

/// Installs the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered lines are lost.
pub fn init(config: &Config) -> WorkerGuard {
    let (writer, guard) = match &config.log_dir {
        Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "taskboard.log")),
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_ansi(config.log_dir.is_none()).with_writer(writer))
            .init(),
    }

    guard
}
