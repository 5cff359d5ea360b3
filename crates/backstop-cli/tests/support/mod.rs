use assert_cmd::Command;
use serde_json::{Value, json};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

pub fn new_command_with_temp_home() -> (Command, tempfile::TempDir) {
    let temp_home = tempfile::tempdir().expect("temp home");
    let binary = assert_cmd::cargo::cargo_bin!("backstop");
    let mut command = Command::new(binary);
    command.env("HOME", temp_home.path());
    command.env("XDG_CONFIG_HOME", temp_home.path().join(".config"));
    command.env_remove("BACKSTOP_SOCKET");
    command.env_remove("BACKSTOP_LOG");
    (command, temp_home)
}

pub fn write_settings(home: &Path, raw: &str) {
    let settings_dir = home.join(".config").join("backstop");
    fs::create_dir_all(&settings_dir).expect("create settings dir");
    fs::write(settings_dir.join("settings.toml"), raw).expect("write settings");
}

pub fn assert_timestamp_log_names(entries: &[std::fs::DirEntry]) {
    assert!(!entries.is_empty(), "expected at least one diagnostics log");

    for entry in entries {
        let name = entry
            .file_name()
            .into_string()
            .expect("diagnostics filename utf8");
        let stem = name
            .strip_suffix(".log")
            .unwrap_or_else(|| panic!("diagnostics file should end with .log: {name}"));
        assert!(
            !stem.is_empty() && stem.chars().all(|character| character.is_ascii_digit()),
            "diagnostics filename must be <timestamp>.log, got: {name}"
        );
    }
}

/// A backend on a Unix socket that answers from fixed state and records
/// every request it receives.
pub struct ScriptedBackend {
    pub socket: PathBuf,
    requests: Arc<Mutex<Vec<Value>>>,
    _dir: tempfile::TempDir,
}

struct ScriptState {
    config: Value,
    status: Value,
}

impl ScriptedBackend {
    pub fn spawn(config: Value, status: Value) -> Self {
        let dir = tempfile::tempdir().expect("socket dir");
        let socket = dir.path().join("backstop.sock");
        let listener = UnixListener::bind(&socket).expect("bind socket");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(Mutex::new(ScriptState { config, status }));

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    break;
                };
                serve(stream, &state, &recorded);
            }
        });

        Self {
            socket,
            requests,
            _dir: dir,
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter_map(|request| request["command"].as_str().map(str::to_string))
            .collect()
    }

    pub fn last_request(&self, command: &str) -> Option<Value> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .rev()
            .find(|request| request["command"] == command)
            .cloned()
    }
}

fn serve(stream: UnixStream, state: &Mutex<ScriptState>, requests: &Mutex<Vec<Value>>) {
    let mut writer = stream.try_clone().expect("clone stream");
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else {
            return;
        };
        let request: Value = serde_json::from_str(&line).expect("request json");
        requests.lock().expect("requests lock").push(request.clone());

        let id = request["id"].clone();
        let mut state = state.lock().expect("state lock");
        let (reply, event) = match request["command"].as_str().unwrap_or_default() {
            "get_config" => (state.config.clone(), None),
            "set_config" => {
                state.config = request["args"]["config"].clone();
                (
                    Value::Null,
                    Some(json!({"event": "config_changed", "payload": state.config})),
                )
            }
            "scan_status" => (state.status.clone(), None),
            "auto_start" => (json!(false), None),
            "metrics" => (json!({"files_excluded": 3, "files_included": 1}), None),
            _ => (Value::Null, None),
        };
        drop(state);

        let mut frames = vec![json!({"id": id, "ok": reply})];
        frames.extend(event);
        for frame in frames {
            if writeln!(writer, "{frame}").is_err() {
                return;
            }
        }
    }
}
