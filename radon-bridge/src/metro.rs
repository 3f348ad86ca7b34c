//! Metro bundler client: liveness, reload, and the two log-fetch
//! strategies (plain HTTP endpoint, or a CDP WebSocket session listening
//! to console events for a bounded window).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::errors::BridgeError;

pub const STATUS_TIMEOUT: Duration = Duration::from_secs(3);
pub const RELOAD_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOG_WINDOW: Duration = Duration::from_secs(5);

/// Console events carrying this token are Radon control-plane noise, not
/// application log lines, and are dropped before accumulation.
const INTERNAL_MARKER: &str = "__RNIDE_INTERNAL";

/// An ordered capture of log lines with a known total count. Produced by
/// the collectors, consumed exactly once by the window pipeline.
#[derive(Debug, Clone)]
pub struct LogChunk {
    pub text: String,
}

impl LogChunk {
    pub fn from_lines(lines: Vec<String>) -> Self {
        LogChunk {
            text: lines.join("\n"),
        }
    }

    pub fn line_count(&self) -> usize {
        if self.text.is_empty() {
            0
        } else {
            self.text.split('\n').count()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetroStatus {
    pub running: bool,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One debuggable page from Metro's `/json` introspection endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DebugPage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Which log-fetch strategy the target bundler supports.
#[derive(Debug, Clone)]
pub enum LogStrategy {
    /// One bounded GET to `/logs/`; the body is the chunk verbatim.
    Plain,
    /// CDP session against the page's debugger WebSocket.
    Debugger(DebugPage),
}

#[derive(Clone)]
pub struct MetroClient {
    client: reqwest::Client,
}

impl Default for MetroClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MetroClient {
    pub fn new() -> Self {
        MetroClient {
            client: reqwest::Client::new(),
        }
    }

    /// Bounded liveness check. Transport errors and non-200 statuses both
    /// mean "not running"; this never propagates an error to the caller.
    pub async fn status(&self, port: u16) -> MetroStatus {
        let url = format!("http://localhost:{port}/status");
        match self
            .client
            .get(&url)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => {
                let running = response.status().is_success();
                let status = response.text().await.ok().map(|s| s.trim().to_string());
                MetroStatus {
                    running,
                    port,
                    status,
                }
            }
            Err(e) => {
                debug!(port, error = %e, "metro status probe failed");
                MetroStatus {
                    running: false,
                    port,
                    status: None,
                }
            }
        }
    }

    pub async fn reload(&self, port: u16) -> Result<(), BridgeError> {
        let url = format!("http://localhost:{port}/reload");
        let response = self
            .client
            .post(&url)
            .timeout(RELOAD_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BridgeError::Transport(format!(
                "reload returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Probe what the bundler exposes: a debuggable React Native page
    /// means the CDP session strategy, anything else degrades to the
    /// plain `/logs/` endpoint.
    pub async fn probe_strategy(&self, port: u16) -> LogStrategy {
        match self.list_debug_pages(port).await {
            Ok(pages) => match select_react_native_page(&pages) {
                Some(page) if page.web_socket_debugger_url.is_some() => {
                    LogStrategy::Debugger(page.clone())
                }
                _ => LogStrategy::Plain,
            },
            // An unreachable /json just means no debugger, but a reachable
            // endpoint serving garbage is a broken CDP setup worth flagging.
            Err(e @ BridgeError::Protocol(_)) => {
                warn!(port, error = %e, "malformed debug page list, using plain endpoint");
                LogStrategy::Plain
            }
            Err(e) => {
                debug!(port, error = %e, "page list unavailable, using plain endpoint");
                LogStrategy::Plain
            }
        }
    }

    /// Fetch console logs using whichever strategy the bundler supports.
    pub async fn fetch_logs(&self, port: u16, window: Duration) -> Result<LogChunk, BridgeError> {
        match self.probe_strategy(port).await {
            LogStrategy::Plain => self.fetch_logs_http(port, window).await,
            LogStrategy::Debugger(page) => self.collect_console_events(&page, window).await,
        }
    }

    /// Plain endpoint strategy: one bounded GET, body returned verbatim.
    pub async fn fetch_logs_http(
        &self,
        port: u16,
        window: Duration,
    ) -> Result<LogChunk, BridgeError> {
        let url = format!("http://localhost:{port}/logs/");
        let response = self.client.get(&url).timeout(window).send().await?;
        if !response.status().is_success() {
            return Err(BridgeError::Transport(format!(
                "logs endpoint returned {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        Ok(LogChunk { text: body })
    }

    pub async fn list_debug_pages(&self, port: u16) -> Result<Vec<DebugPage>, BridgeError> {
        let url = format!("http://localhost:{port}/json");
        let response = self
            .client
            .get(&url)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;
        response
            .json::<Vec<DebugPage>>()
            .await
            .map_err(|e| BridgeError::Protocol(format!("malformed page list: {e}")))
    }

    /// Debugger-protocol strategy: open a session to the page's WebSocket,
    /// enable console notifications, and accumulate formatted console
    /// events until the collection window's hard deadline.
    ///
    /// Deadline, session close and post-setup session errors all resolve
    /// to success with whatever was accumulated; only setup failures
    /// surface as errors.
    pub async fn collect_console_events(
        &self,
        page: &DebugPage,
        window: Duration,
    ) -> Result<LogChunk, BridgeError> {
        let url = page.web_socket_debugger_url.as_deref().ok_or_else(|| {
            BridgeError::Protocol("debug page has no WebSocket URL".to_string())
        })?;

        let deadline = Instant::now() + window;

        let (mut ws, _) = timeout(window, connect_async(url))
            .await
            .map_err(|_| BridgeError::Timeout("debugger session connect timed out".to_string()))?
            .map_err(|e| BridgeError::Transport(format!("debugger session connect failed: {e}")))?;

        ws.send(Message::Text(
            json!({"id": 1, "method": "Runtime.enable"}).to_string(),
        ))
        .await
        .map_err(|e| BridgeError::Transport(format!("failed to enable console events: {e}")))?;

        let mut lines: Vec<String> = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, ws.next()).await {
                Err(_) => break,    // window elapsed
                Ok(None) => break,  // session closed
                Ok(Some(Err(e))) => {
                    // Mid-session errors resolve with the partial capture.
                    warn!(error = %e, "debugger session error, returning partial logs");
                    break;
                }
                Ok(Some(Ok(Message::Text(payload)))) => {
                    if let Some(line) = format_console_event(&payload) {
                        lines.push(line);
                    }
                }
                Ok(Some(Ok(_))) => {}
            }
        }

        let _ = ws.close(None).await;
        debug!(collected = lines.len(), "debugger session finished");
        Ok(LogChunk::from_lines(lines))
    }
}

/// Metro lists every debug target it knows about; the app runtime is the
/// page whose description or title names React Native.
pub fn select_react_native_page(pages: &[DebugPage]) -> Option<&DebugPage> {
    pages
        .iter()
        .find(|p| p.description.contains("React Native") || p.title.contains("React Native"))
}

/// Turn one `Runtime.consoleAPICalled` notification into a log line, or
/// `None` for anything else (responses, other events, internal noise).
pub fn format_console_event(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    if value.get("method")?.as_str()? != "Runtime.consoleAPICalled" {
        return None;
    }
    let args = value.get("params")?.get("args")?.as_array()?;
    let parts: Vec<String> = args.iter().map(format_remote_object).collect();
    let line = parts.join(" ");
    if line.contains(INTERNAL_MARKER) {
        return None;
    }
    Some(line)
}

fn format_remote_object(arg: &Value) -> String {
    if let Some(v) = arg.get("value") {
        match v {
            Value::String(s) => return s.clone(),
            Value::Null => {}
            other => return other.to_string(),
        }
    }
    if let Some(desc) = arg.get("description").and_then(Value::as_str) {
        return desc.to_string();
    }
    serde_json::to_string(arg).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(args: serde_json::Value) -> String {
        json!({
            "method": "Runtime.consoleAPICalled",
            "params": {"type": "log", "args": args}
        })
        .to_string()
    }

    #[test]
    fn formats_primitive_values() {
        let raw = event(json!([
            {"type": "string", "value": "hello"},
            {"type": "number", "value": 42},
            {"type": "boolean", "value": true}
        ]));
        assert_eq!(format_console_event(&raw).unwrap(), "hello 42 true");
    }

    #[test]
    fn falls_back_to_description_then_json() {
        let raw = event(json!([
            {"type": "object", "description": "Object {a: 1}"},
            {"type": "object", "subtype": "null"}
        ]));
        let line = format_console_event(&raw).unwrap();
        assert!(line.starts_with("Object {a: 1} "));
        assert!(line.contains("subtype"));
    }

    #[test]
    fn drops_internal_marker_events() {
        let raw = event(json!([{"type": "string", "value": "__RNIDE_INTERNAL ping"}]));
        assert!(format_console_event(&raw).is_none());
    }

    #[test]
    fn ignores_non_console_messages() {
        assert!(format_console_event(r#"{"id":1,"result":{}}"#).is_none());
        assert!(
            format_console_event(r#"{"method":"Runtime.executionContextCreated","params":{}}"#)
                .is_none()
        );
        assert!(format_console_event("not json").is_none());
    }

    #[test]
    fn selects_react_native_page_by_description_or_title() {
        let pages: Vec<DebugPage> = serde_json::from_value(json!([
            {"title": "inspector", "description": "don't use"},
            {"title": "app", "description": "React Native Bridge", "webSocketDebuggerUrl": "ws://x"},
        ]))
        .unwrap();
        let page = select_react_native_page(&pages).unwrap();
        assert_eq!(page.title, "app");

        let none: Vec<DebugPage> = serde_json::from_value(json!([
            {"title": "inspector", "description": "nothing"}
        ]))
        .unwrap();
        assert!(select_react_native_page(&none).is_none());
    }

    #[test]
    fn log_chunk_counts_lines() {
        assert_eq!(LogChunk::from_lines(vec![]).line_count(), 0);
        let chunk = LogChunk::from_lines(vec!["a".into(), "b".into()]);
        assert_eq!(chunk.line_count(), 2);
        assert!(!chunk.is_empty());
    }
}
