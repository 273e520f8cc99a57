use tracing_subscriber::EnvFilter;

use crate::app::config::LoggingSettings;

/// `RUST_LOG` wins over the configured level. Release builds always log JSON.
pub fn init_logging(settings: &LoggingSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.log_level.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg!(debug_assertions) && !settings.json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
