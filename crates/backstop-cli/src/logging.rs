use std::fs::File;
use std::sync::Mutex;

use anyhow::{Context, Result};
use backstop_core::settings::LogSettings;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "BACKSTOP_LOG";

/// Where log records go for this run.
pub enum LogTarget {
    Stderr,
    File(File),
    /// Nothing is installed; used while the terminal UI owns the screen.
    Disabled,
}

/// `BACKSTOP_LOG` directives when set, otherwise the settings level.
pub fn build_filter(env_value: Option<&str>, settings: &LogSettings) -> Result<EnvFilter> {
    let directives = env_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(settings.level.as_str());
    EnvFilter::try_new(directives).with_context(|| format!("invalid log filter '{directives}'"))
}

pub fn init(filter: EnvFilter, target: LogTarget) {
    let installed = match target {
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
        LogTarget::File(file) => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .try_init(),
        LogTarget::Disabled => return,
    };

    if installed.is_err() {
        debug!("tracing subscriber already installed");
    }
}
