use std::backtrace::Backtrace;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

#[derive(Default)]
struct DiagnosticsState {
    path: Option<PathBuf>,
    file: Option<File>,
}

static HOOK_ONCE: Once = Once::new();
static STATE: OnceLock<Mutex<DiagnosticsState>> = OnceLock::new();

fn state() -> MutexGuard<'static, DiagnosticsState> {
    STATE
        .get_or_init(|| Mutex::new(DiagnosticsState::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Owns the optional diagnostics log. Panics are always reported on stderr;
/// when a log is open they are also appended to it with a backtrace.
pub struct DiagnosticsSession {
    path: Option<PathBuf>,
}

impl DiagnosticsSession {
    pub fn initialize(enabled: bool, settings_dir: &Path) -> Result<Self> {
        install_panic_hook();
        if !enabled {
            let mut state = state();
            state.path = None;
            state.file = None;
            return Ok(Self { path: None });
        }

        let dir = settings_dir.join("diagnostics");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create diagnostics directory {}", dir.display()))?;

        let path = dir.join(format!("{}.log", epoch_millis()));
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to create diagnostics log at {}", path.display()))?;

        writeln!(
            file,
            "backstop diagnostics start\nversion={}\npid={}\nargv={:?}",
            env!("CARGO_PKG_VERSION"),
            std::process::id(),
            std::env::args().collect::<Vec<String>>()
        )
        .and_then(|()| file.flush())
        .with_context(|| format!("failed to write diagnostics header to {}", path.display()))?;

        let mut state = state();
        state.path = Some(path.clone());
        state.file = Some(file);
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A second handle on the log for the tracing subscriber to write through.
    pub fn log_file(&self) -> Result<Option<File>> {
        let state = state();
        let Some(file) = state.file.as_ref() else {
            return Ok(None);
        };
        file.try_clone()
            .map(Some)
            .context("failed to share diagnostics log with the logger")
    }
}

fn install_panic_hook() {
    HOOK_ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|panic_info| {
            let payload = panic_payload(panic_info);
            let location = panic_info
                .location()
                .map(|value| format!("{}:{}:{}", value.file(), value.line(), value.column()))
                .unwrap_or_else(|| "unknown".to_string());

            append_line(format!("panic_message={payload}"));
            append_line(format!("panic_location={location}"));
            append_line(format!("panic_backtrace={:?}", Backtrace::force_capture()));

            let path = state().path.clone();
            eprintln!("Fatal internal error in backstop: {payload}");
            match path {
                Some(path) => eprintln!("Diagnostics written to {}", path.display()),
                None => eprintln!("Run with `--diagnostics` to capture a diagnostics log."),
            }
        }));
    });
}

fn panic_payload(panic_info: &std::panic::PanicHookInfo<'_>) -> String {
    if let Some(payload) = panic_info.payload().downcast_ref::<&str>() {
        return (*payload).to_string();
    }
    if let Some(payload) = panic_info.payload().downcast_ref::<String>() {
        return payload.clone();
    }
    "unknown panic payload".to_string()
}

fn append_line(line: impl AsRef<str>) {
    let mut state = state();
    let Some(file) = state.file.as_mut() else {
        return;
    };
    let _ = writeln!(file, "[{}] {}", epoch_millis(), line.as_ref());
    let _ = file.flush();
}
