//! HTTP listener the Roblox plugin posts its output to.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use outsync_core::sink::{ChannelSink, LogSink, SinkRegistry, TerminalSink};
use outsync_core::OutputEngine;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub type Version = [u64; 3];

/// Version of this listener.
pub const LISTENER_VERSION: Version = [0, 1, 0];
/// Newest plugin version this listener knows about.
pub const PLUGIN_VERSION: Version = [0, 1, 0];
/// Plugins that still post to `/log` predate version reporting.
const LEGACY_PLUGIN_VERSION: Version = [0, 0, 3];

pub const BODY_LIMIT: usize = 1024 * 1024;

/// Sinks that each write to a fresh `make()` with terminal line endings.
/// They are opened on creation, so nothing is held back.
pub fn terminal_sinks<W, F>(make: F) -> SinkRegistry
where
    W: Write + Send + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    SinkRegistry::new(move |_context| {
        let mut sink = TerminalSink::new(make());
        sink.open();
        Box::new(sink) as Box<dyn LogSink>
    })
}

pub fn is_version_old(version: &Version, than: &Version) -> bool {
    version < than
}

pub fn format_version(version: &Version) -> String {
    format!("{}.{}.{}", version[0], version[1], version[2])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReport {
    pub version: Version,
    pub required_version: Option<Version>,
}

fn parse_version(value: &Value) -> Result<Version, &'static str> {
    let Some(items) = value.as_array() else {
        return Err("json.version should be an array");
    };
    match items.as_slice() {
        [major, minor, patch] => match (major.as_u64(), minor.as_u64(), patch.as_u64()) {
            (Some(major), Some(minor), Some(patch)) => Ok([major, minor, patch]),
            _ => Err("json.version should only contain numbers"),
        },
        _ => Err("json.version should be an array with 3 items"),
    }
}

pub fn parse_version_report(body: &[u8]) -> Result<VersionReport, &'static str> {
    let Ok(Value::Object(body)) = serde_json::from_slice::<Value>(body) else {
        return Err("Missing json");
    };
    let version = match body.get("version") {
        None | Some(Value::Null) => return Err("Missing json.version"),
        Some(value) => parse_version(value)?,
    };
    let required_version = body
        .get("requiredVersion")
        .and_then(|value| parse_version(value).ok());
    Ok(VersionReport {
        version,
        required_version,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBatch {
    pub logs: Vec<String>,
    pub context: String,
}

pub fn parse_log_batch(body: &[u8]) -> Result<LogBatch, &'static str> {
    let Ok(Value::Object(body)) = serde_json::from_slice::<Value>(body) else {
        return Err("Missing JSON");
    };
    let Some(Value::Array(logs)) = body.get("Logs") else {
        return Err("Missing body.Logs");
    };
    let context = match body.get("Context") {
        Some(Value::String(context)) if !context.is_empty() => context.clone(),
        _ => return Err("Missing body.Context"),
    };
    let logs = logs
        .iter()
        .map(|log| match log {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect();
    Ok(LogBatch { logs, context })
}

pub struct AppState {
    engine: Arc<OutputEngine>,
    sinks: Mutex<SinkRegistry>,
    update_notice_shown: AtomicBool,
}

impl AppState {
    pub fn new(engine: Arc<OutputEngine>, sinks: SinkRegistry) -> Self {
        Self {
            engine,
            sinks: Mutex::new(sinks),
            update_notice_shown: AtomicBool::new(false),
        }
    }

    /// One stdout channel per log context, tagged with the context name.
    pub fn with_stdout(engine: Arc<OutputEngine>) -> Self {
        let sinks = SinkRegistry::new(|context| {
            Box::new(ChannelSink::with_label(context, std::io::stdout())) as Box<dyn LogSink>
        });
        Self::new(engine, sinks)
    }

    /// One terminal stream per log context on stdout.
    pub fn with_terminal(engine: Arc<OutputEngine>) -> Self {
        Self::new(engine, terminal_sinks(std::io::stdout))
    }

    /// Processes `raw` and writes it to the sink for `context`.
    pub fn write(&self, context: &str, raw: &str) {
        let text = self.engine.process(raw);
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        sinks.get_or_make(context).write(&text);
    }

    /// Logs the plugin update notice at most once per session. Returns
    /// whether it was logged by this call.
    pub fn notify_plugin_outdated(&self, reported: &Version) -> bool {
        if self.update_notice_shown.swap(true, Ordering::SeqCst) {
            return false;
        }
        warn!(
            "({} -> {}) An update is available for the Roblox plugin",
            format_version(reported),
            format_version(&PLUGIN_VERSION)
        );
        true
    }

    pub fn check_plugin_version(&self, report: &VersionReport) {
        if is_version_old(&report.version, &PLUGIN_VERSION) {
            self.notify_plugin_outdated(&report.version);
        }
        if let Some(required) = &report.required_version {
            if is_version_old(&LISTENER_VERSION, required) {
                error!(
                    "The Roblox plugin requires listener version {} or newer; this listener is {}",
                    format_version(required),
                    format_version(&LISTENER_VERSION)
                );
            }
        }
    }
}

fn rejected(reason: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "reason": reason })),
    )
}

fn accepted(body: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(body))
}

async fn banner() -> String {
    format!(
        "Roblox Output Sync listener version: {}",
        format_version(&LISTENER_VERSION)
    )
}

async fn get_version() -> Json<Value> {
    Json(json!({ "success": true, "version": PLUGIN_VERSION }))
}

async fn post_version(State(state): State<Arc<AppState>>, body: Bytes) -> (StatusCode, Json<Value>) {
    match parse_version_report(&body) {
        Ok(report) => {
            state.check_plugin_version(&report);
            accepted(json!({ "success": true, "version": PLUGIN_VERSION }))
        }
        Err(reason) => rejected(reason),
    }
}

async fn post_log(State(state): State<Arc<AppState>>, body: Bytes) -> (StatusCode, Json<Value>) {
    let batch = match parse_log_batch(&body) {
        Ok(batch) => batch,
        Err(reason) => return rejected(reason),
    };
    state.notify_plugin_outdated(&LEGACY_PLUGIN_VERSION);
    for log in &batch.logs {
        state.write(&batch.context, &format!("{log}\n"));
    }
    accepted(json!({ "success": true }))
}

async fn post_log_text(
    State(state): State<Arc<AppState>>,
    Path(context): Path<String>,
    body: String,
) -> (StatusCode, Json<Value>) {
    state.write(&context, &body);
    accepted(json!({ "success": true }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/version", get(get_version).post(post_version))
        .route("/log", post(post_log))
        .route("/log2/{context}", post(post_log_text))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

pub async fn run_http_server(
    state: Arc<AppState>,
    port: u16,
    cancel_token: CancellationToken,
) -> outsync_core::Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Roblox output listener on 127.0.0.1:{}", port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await?;
    Ok(())
}
