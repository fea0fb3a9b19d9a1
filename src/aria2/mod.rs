//! aria2 client: the RPC method set, batched status aggregation, and the
//! persisted endpoint config.
//!
//! Everything here talks JSON-RPC through [`RpcClient`]. Status polling is the
//! one genuinely latency-sensitive operation, so it rides a single
//! `system.multicall` instead of four round trips.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::format::readable_size;
use crate::rpc::{RpcClient, RpcRequest, TransportError};

/// Endpoint used when no config file is present.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:6800/jsonrpc";

/// Paging window for `tellWaiting`/`tellStopped`.
const TELL_WINDOW: u64 = 1000;

/// Fields requested for every task query.
const TASK_KEYS: [&str; 7] = [
    "gid",
    "status",
    "totalLength",
    "completedLength",
    "downloadSpeed",
    "connections",
    "files",
];

const CONFIG_FILE: &str = "aria2.json";

/// Errors from the aria2 client.
#[derive(Debug, Error)]
pub enum Aria2Error {
    /// The wire failed before a well-formed envelope came back.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// aria2 answered with an RPC-level error payload.
    #[error("aria2 rejected '{method}': {message}")]
    Remote { method: String, message: String },
    /// The envelope decoded but its result did not match the expected shape.
    #[error("unexpected aria2 response shape at '{context}'")]
    Shape { context: &'static str },
    /// The endpoint config file could not be written.
    #[error("cannot write aria2 config '{path}': {source}")]
    Config {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl Aria2Error {
    fn remote(method: &str, message: String) -> Self {
        Self::Remote {
            method: method.to_string(),
            message,
        }
    }

    fn shape(context: &'static str) -> Self {
        Self::Shape { context }
    }
}

/// Persisted endpoint config: a JSON object `{url}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aria2Config {
    pub url: String,
}

/// One download task, normalized from aria2's string-typed wire fields.
///
/// Wire keys follow the frontend contract, `stoped` spelling included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub gid: String,
    pub filename: String,
    /// One of active / waiting / paused / error / complete / removed.
    pub status: String,
    /// Total size in bytes.
    pub size: u64,
    pub completed_length: u64,
    /// Completion percentage, 0-100, two decimals.
    pub progress: f64,
    /// Download speed in bytes per second.
    pub speed: u64,
    /// Connection count, passed through as aria2 reports it.
    pub connections: String,
}

/// Point-in-time aggregate of the downloader's state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    /// Readable global download speed, e.g. `1.50MB/s`.
    pub speed: String,
    #[serde(rename = "activeTasks")]
    pub active_tasks: Vec<DownloadTask>,
    #[serde(rename = "waitingTasks")]
    pub waiting_tasks: Vec<DownloadTask>,
    #[serde(rename = "stopedTasks")]
    pub stopped_tasks: Vec<DownloadTask>,
}

/// Client for one aria2 daemon.
///
/// The endpoint and the version cache are the only cross-request state:
/// a successful version string is remembered for the process lifetime, and
/// saving the config swaps the endpoint and drops the cached version.
#[derive(Debug)]
pub struct Aria2Client {
    rpc: RpcClient,
    config_path: PathBuf,
    endpoint: RwLock<String>,
    version: Mutex<Option<String>>,
}

impl Aria2Client {
    /// Creates a client, reading the endpoint from `<config_dir>/aria2.json`
    /// when present and falling back to [`DEFAULT_ENDPOINT`].
    #[must_use]
    pub fn new(config_dir: &Path) -> Self {
        let config_path = config_dir.join(CONFIG_FILE);
        let endpoint = load_endpoint(&config_path).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        info!(endpoint = %endpoint, "aria2 endpoint configured");
        Self {
            rpc: RpcClient::new(),
            config_path,
            endpoint: RwLock::new(endpoint),
            version: Mutex::new(None),
        }
    }

    fn endpoint(&self) -> String {
        self.endpoint
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string())
    }

    /// Current endpoint config.
    #[must_use]
    pub fn config(&self) -> Aria2Config {
        Aria2Config {
            url: self.endpoint(),
        }
    }

    /// Persists a new endpoint and swaps it in. Invalidates the cached
    /// version string: the next `getVersion` must talk to the new daemon.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Config`] when the config file cannot be written.
    pub fn save_config(&self, url: &str) -> Result<(), Aria2Error> {
        let url = if url.trim().is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            url.trim().to_string()
        };
        let content = json!({ "url": url }).to_string();
        fs::write(&self.config_path, content).map_err(|source| Aria2Error::Config {
            path: self.config_path.display().to_string(),
            source,
        })?;
        if let Ok(mut guard) = self.endpoint.write() {
            *guard = url;
        }
        if let Ok(mut cached) = self.version.lock() {
            *cached = None;
        }
        Ok(())
    }

    /// Returns the daemon version, cached after the first success. A failed
    /// call leaves the cache empty so every later call retries until one
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns the transport or remote error of the underlying call.
    pub async fn get_version(&self) -> Result<String, Aria2Error> {
        if let Ok(cached) = self.version.lock()
            && let Some(version) = cached.as_ref()
        {
            return Ok(version.clone());
        }

        let result = self
            .call_checked(RpcRequest::new("aria2.getVersion"))
            .await?;
        let version = result
            .as_ref()
            .and_then(|v| v.get("version"))
            .and_then(Value::as_str)
            .ok_or(Aria2Error::shape("getVersion.version"))?
            .to_string();

        if let Ok(mut cached) = self.version.lock() {
            *cached = Some(version.clone());
        }
        Ok(version)
    }

    /// Hands a URL to aria2 and returns the new task's gid.
    ///
    /// `extra_header` is a full header line (e.g. `Cookie: ...`) that aria2
    /// attaches to its own outbound fetch of the URL.
    ///
    /// # Errors
    ///
    /// Returns the transport or remote error of the `addUri` call, or a shape
    /// error when aria2 answers without a gid.
    pub async fn add_download(
        &self,
        url: &str,
        filename: &str,
        extra_header: Option<&str>,
    ) -> Result<String, Aria2Error> {
        let mut options = serde_json::Map::new();
        options.insert("out".to_string(), json!(filename));
        if let Some(header) = extra_header.filter(|h| !h.is_empty()) {
            options.insert("header".to_string(), json!(header));
        }
        let request = RpcRequest::with_params(
            "aria2.addUri",
            vec![json!([url]), Value::Object(options)],
        );

        let result = self.call_checked(request).await?;
        let gid = result
            .as_ref()
            .and_then(Value::as_str)
            .ok_or(Aria2Error::shape("addUri.gid"))?
            .to_string();
        debug!(gid = %gid, filename, "download enqueued");
        Ok(gid)
    }

    /// Resumes the given tasks, one call per gid, best effort.
    pub async fn unpause(&self, gids: &[String]) {
        for gid in gids {
            self.best_effort(RpcRequest::with_params("aria2.unpause", vec![json!(gid)]))
                .await;
        }
    }

    /// Pauses the given tasks, one call per gid, best effort.
    pub async fn pause(&self, gids: &[String]) {
        for gid in gids {
            self.best_effort(RpcRequest::with_params("aria2.pause", vec![json!(gid)]))
                .await;
        }
    }

    /// Removes the given tasks and their download results, best effort. A
    /// failure on one gid never aborts the remaining ones.
    pub async fn remove(&self, gids: &[String]) {
        for gid in gids {
            self.best_effort(RpcRequest::with_params(
                "aria2.forceRemove",
                vec![json!(gid)],
            ))
            .await;
            self.best_effort(RpcRequest::with_params(
                "aria2.removeDownloadResult",
                vec![json!(gid)],
            ))
            .await;
        }
    }

    /// Clears the download results of the given stopped tasks, best effort.
    pub async fn remove_results(&self, gids: &[String]) {
        for gid in gids {
            self.best_effort(RpcRequest::with_params(
                "aria2.removeDownloadResult",
                vec![json!(gid)],
            ))
            .await;
        }
    }

    /// Resumes every task.
    ///
    /// # Errors
    ///
    /// Returns the transport or remote error of the call.
    pub async fn unpause_all(&self) -> Result<(), Aria2Error> {
        self.call_checked(RpcRequest::new("aria2.unpauseAll"))
            .await
            .map(|_| ())
    }

    /// Pauses every task.
    ///
    /// # Errors
    ///
    /// Returns the transport or remote error of the call.
    pub async fn pause_all(&self) -> Result<(), Aria2Error> {
        self.call_checked(RpcRequest::new("aria2.pauseAll"))
            .await
            .map(|_| ())
    }

    /// Purges every completed/error/removed download result.
    ///
    /// # Errors
    ///
    /// Returns the transport or remote error of the call.
    pub async fn purge_stopped(&self) -> Result<(), Aria2Error> {
        self.call_checked(RpcRequest::new("aria2.purgeDownloadResult"))
            .await
            .map(|_| ())
    }

    /// Retrieves the global speed plus the active/waiting/stopped task lists
    /// in one `system.multicall` round trip.
    ///
    /// The aggregate result is ordered by submission: position 0 is the global
    /// stat, then active, waiting, stopped. Each sub-result arrives wrapped in
    /// a one-element list by the multicall convention and is unwrapped before
    /// field access.
    ///
    /// # Errors
    ///
    /// Returns transport/remote errors of the multicall, or a shape error
    /// naming the field that did not match.
    pub async fn get_status(&self) -> Result<StatusSnapshot, Aria2Error> {
        let keys = json!(TASK_KEYS);
        let calls = json!([
            { "methodName": "aria2.getGlobalStat" },
            { "methodName": "aria2.tellActive", "params": [keys] },
            { "methodName": "aria2.tellWaiting", "params": [0, TELL_WINDOW, keys] },
            { "methodName": "aria2.tellStopped", "params": [0, TELL_WINDOW, keys] },
        ]);
        let request = RpcRequest::with_params("system.multicall", vec![calls]);

        let result = self
            .call_checked(request)
            .await?
            .ok_or(Aria2Error::shape("multicall.result"))?;
        let list = result
            .as_array()
            .filter(|l| l.len() >= 4)
            .ok_or(Aria2Error::shape("multicall.arity"))?;

        let stat = unwrap_sub_result(&list[0], "multicall.globalStat")?;
        let speed_raw = stat
            .get("downloadSpeed")
            .and_then(Value::as_str)
            .ok_or(Aria2Error::shape("globalStat.downloadSpeed"))?;

        Ok(StatusSnapshot {
            speed: format!("{}B/s", readable_size(speed_raw)),
            active_tasks: parse_tasks(unwrap_sub_result(&list[1], "multicall.active")?),
            waiting_tasks: parse_tasks(unwrap_sub_result(&list[2], "multicall.waiting")?),
            stopped_tasks: parse_tasks(unwrap_sub_result(&list[3], "multicall.stopped")?),
        })
    }

    /// One call with the remote error payload promoted to [`Aria2Error`].
    async fn call_checked(&self, request: RpcRequest) -> Result<Option<Value>, Aria2Error> {
        let method = request.method.clone();
        let response = self.rpc.call(&self.endpoint(), &request).await?;
        if let Some(message) = response.error_message() {
            return Err(Aria2Error::remote(&method, message));
        }
        Ok(response.result)
    }

    /// Fire-and-log call used by the batch operations: per-gid failures are
    /// logged, never aggregated, and never abort the remaining gids.
    async fn best_effort(&self, request: RpcRequest) {
        let method = request.method.clone();
        match self.call_checked(request).await {
            Ok(_) => {}
            Err(error) => warn!(method, error = %error, "batch call failed"),
        }
    }
}

fn load_endpoint(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let config: Aria2Config = serde_json::from_str(&content).ok()?;
    let url = config.url.trim();
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Peels the one-element list the multicall convention wraps around every
/// successful sub-result. A sub-error (an object instead of a list) or an
/// empty list is a shape mismatch.
fn unwrap_sub_result<'a>(
    value: &'a Value,
    context: &'static str,
) -> Result<&'a Value, Aria2Error> {
    value
        .as_array()
        .and_then(|l| l.first())
        .ok_or(Aria2Error::shape(context))
}

/// Normalizes a task list. All fields are display data, so malformed entries
/// degrade to zero/empty instead of failing the whole snapshot.
fn parse_tasks(data: &Value) -> Vec<DownloadTask> {
    let Some(list) = data.as_array() else {
        return Vec::new();
    };
    list.iter()
        .filter_map(Value::as_object)
        .map(|task| {
            let size = uint_field(task.get("totalLength"));
            let completed = uint_field(task.get("completedLength"));
            DownloadTask {
                gid: str_field(task.get("gid")),
                filename: filename_of(task.get("files")),
                status: str_field(task.get("status")),
                size,
                completed_length: completed,
                progress: progress(completed, size),
                speed: uint_field(task.get("downloadSpeed")),
                connections: str_field(task.get("connections")),
            }
        })
        .collect()
}

fn str_field(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

/// aria2 encodes sizes and speeds as decimal strings; malformed strings
/// normalize to 0.
fn uint_field(value: Option<&Value>) -> u64 {
    value
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// The filename is the first file entry's path after the last separator.
fn filename_of(files: Option<&Value>) -> String {
    files
        .and_then(Value::as_array)
        .and_then(|l| l.first())
        .and_then(|f| f.get("path"))
        .and_then(Value::as_str)
        .map(|path| path.rsplit('/').next().unwrap_or(path).to_string())
        .unwrap_or_default()
}

/// Completion percentage is computed here rather than trusted from the wire.
fn progress(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let raw = completed as f64 * 100.0 / total as f64;
    (raw * 100.0).round() / 100.0
}
