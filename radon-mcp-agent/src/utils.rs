use std::env;
use std::time::Duration;

use anyhow::Result;
use radon_bridge::MetroClient;
use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct EmptyArgs {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ViewLogsArgs {
    #[schemars(
        description = "Regex pattern to grep log lines. Applied FIRST, before any range selection. Case-insensitive."
    )]
    pub filter: Option<String>,
    #[schemars(
        description = "Windowing mode: 'auto' (filter, then last-N or default truncation), 'paginate' (offset/limit slicing), or 'search' (filter required, then default truncation). Defaults to auto."
    )]
    pub mode: Option<String>,
    #[schemars(description = "Line offset for paginate mode. Non-negative.")]
    pub offset: Option<u32>,
    #[schemars(description = "Maximum lines per page for paginate mode.")]
    pub limit: Option<u32>,
    #[schemars(description = "Take last N lines AFTER filtering. If not set, truncates to 200 lines.")]
    pub last: Option<u32>,
    #[schemars(
        description = "Where to collect from: 'metro' (JS console via the bundler), 'device' (simulator system log), or 'both'. Defaults to metro."
    )]
    pub source: Option<String>,
    #[schemars(
        description = "Log collection window in milliseconds. Defaults to 5000, capped at 30000."
    )]
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct OpenUrlArgs {
    #[schemars(description = "URL or deeplink to open (e.g., myapp://screen, https://example.com)")]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SetAppearanceArgs {
    #[schemars(description = "Appearance mode: dark or light")]
    pub mode: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SetStatusBarArgs {
    #[schemars(description = "Status bar time to display (e.g., \"9:41\")")]
    pub time: Option<String>,
    #[schemars(description = "Battery level 0-100")]
    pub battery_level: Option<u8>,
    #[schemars(description = "Cellular bars 0-4")]
    pub cellular_bars: Option<u8>,
    #[schemars(description = "WiFi bars 0-3")]
    pub wifi_bars: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SetPrivacyArgs {
    #[schemars(description = "Permission action: grant, revoke, or reset")]
    pub action: String,
    #[schemars(description = "Service to act on (e.g., camera, location, photos, all)")]
    pub service: String,
    #[schemars(description = "Bundle identifier of the target app")]
    pub bundle_id: String,
}

#[derive(Clone)]
pub struct ServerWrapper {
    pub metro: MetroClient,
    pub tool_router: rmcp::handler::server::tool::ToolRouter<Self>,
}

pub fn init_logging() -> Result<()> {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    // stdout carries the MCP stdio transport; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    Ok(())
}

const DEFAULT_COLLECTION_WINDOW_MS: u64 = 5000;
const MAX_COLLECTION_WINDOW_MS: u64 = 30_000;

/// Caller-tunable log collection window, clamped so no request can pin a
/// subprocess or socket open indefinitely.
pub fn collection_window(timeout_ms: Option<u64>) -> Duration {
    let ms = timeout_ms
        .unwrap_or(DEFAULT_COLLECTION_WINDOW_MS)
        .clamp(100, MAX_COLLECTION_WINDOW_MS);
    Duration::from_millis(ms)
}
