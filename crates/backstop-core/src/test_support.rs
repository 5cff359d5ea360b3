use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

/// One scripted action of the fake backend socket.
pub enum Step {
    /// Read the next request frame.
    Read,
    /// Answer the last request read.
    Respond(Result<Value, Value>),
    /// Write an event frame.
    Push(&'static str, Value),
    /// Shut down the write side while continuing to accept requests.
    CloseWrite,
    /// Read request frames until the client disconnects.
    Drain,
}

pub fn exchange(reply: Result<Value, Value>) -> Vec<Step> {
    vec![Step::Read, Step::Respond(reply)]
}

pub struct ScriptedServer {
    _dir: TempDir,
    path: PathBuf,
    handle: JoinHandle<Vec<Value>>,
}

impl ScriptedServer {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for the script to run out and returns every request it read.
    pub async fn finish(self) -> Vec<Value> {
        self.handle.await.expect("scripted server task")
    }
}

/// Binds a socket in a fresh temp dir and plays `steps` against the first
/// client that connects.
pub fn serve(steps: Vec<Step>) -> ScriptedServer {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("backend.sock");
    let listener = UnixListener::bind(&path).expect("bind socket");

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut requests = Vec::new();
        let mut last_id = Value::Null;

        for step in steps {
            let frame = match step {
                Step::Read => {
                    let line = lines
                        .next_line()
                        .await
                        .expect("read request")
                        .expect("request frame");
                    let request: Value = serde_json::from_str(&line).expect("request json");
                    last_id = request["id"].clone();
                    requests.push(request);
                    continue;
                }
                Step::CloseWrite => {
                    write_half.shutdown().await.expect("shutdown write half");
                    continue;
                }
                Step::Drain => {
                    while let Some(line) = lines.next_line().await.expect("read request") {
                        requests.push(serde_json::from_str(&line).expect("request json"));
                    }
                    continue;
                }
                Step::Respond(Ok(value)) => json!({ "id": last_id, "ok": value }),
                Step::Respond(Err(error)) => json!({ "id": last_id, "error": error }),
                Step::Push(event, payload) => json!({ "event": event, "payload": payload }),
            };

            let mut line = frame.to_string();
            line.push('\n');
            write_half
                .write_all(line.as_bytes())
                .await
                .expect("write frame");
        }

        requests
    });

    ScriptedServer {
        _dir: dir,
        path,
        handle,
    }
}
