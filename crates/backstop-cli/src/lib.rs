pub mod cli;
pub mod diagnostics;
pub mod dispatch;
pub mod logging;
pub mod output;

use anyhow::{Context, Result};
use backstop_app::App;
use backstop_core::remote::RemoteBackend;
use backstop_core::settings::{
    SOCKET_ENV, effective_socket, load_settings_or_default, resolve_settings_dir,
    resolve_settings_path,
};
use clap::Parser;
use tracing::debug;

use crate::cli::Cli;
use crate::diagnostics::DiagnosticsSession;
use crate::logging::{LOG_ENV, LogTarget};

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings_dir = resolve_settings_dir()?;
    let settings_path = resolve_settings_path()?;
    let settings = load_settings_or_default(&settings_path)?;

    let diagnostics = DiagnosticsSession::initialize(cli.diagnostics, &settings_dir)?;
    if let Some(path) = diagnostics.path() {
        eprintln!("Diagnostics enabled: {}", path.display());
    }

    let filter = logging::build_filter(std::env::var(LOG_ENV).ok().as_deref(), &settings.log)?;
    let target = match diagnostics.log_file()? {
        Some(file) => LogTarget::File(file),
        None if cli.command.is_interactive() => LogTarget::Disabled,
        None => LogTarget::Stderr,
    };
    logging::init(filter, target);
    debug!(settings = %settings_path.display(), "settings loaded");

    let socket = effective_socket(
        cli.socket.as_deref(),
        std::env::var(SOCKET_ENV).ok().as_deref(),
        &settings,
    );

    // The connection's reader task must keep running while the UI thread
    // blocks on individual requests.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let backend = runtime
        .block_on(RemoteBackend::connect(&socket))
        .with_context(|| format!("failed to connect to backend at {}", socket.display()))?;
    let app = App::new(&backend);

    dispatch::run_with_deps(cli, &app, &runtime, &settings)
}
