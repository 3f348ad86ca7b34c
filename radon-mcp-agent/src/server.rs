pub use crate::utils::ServerWrapper;
use crate::utils::{
    collection_window, EmptyArgs, OpenUrlArgs, SetAppearanceArgs, SetPrivacyArgs,
    SetStatusBarArgs, ViewLogsArgs,
};
use radon_bridge::device_log::stream_device_logs;
use radon_bridge::pagination::{run_window, WindowMode, WindowParams};
use radon_bridge::simctl::{self, StatusBarOverrides};
use radon_bridge::{BridgeError, MetroClient, RadonContext};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{tool, tool_handler, tool_router, Error as McpError, ServerHandler};
use serde_json::{json, Value};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogSource {
    Metro,
    Device,
    Both,
}

impl LogSource {
    fn as_str(&self) -> &'static str {
        match self {
            LogSource::Metro => "metro",
            LogSource::Device => "device",
            LogSource::Both => "both",
        }
    }

    fn wants_metro(&self) -> bool {
        matches!(self, LogSource::Metro | LogSource::Both)
    }

    fn wants_device(&self) -> bool {
        matches!(self, LogSource::Device | LogSource::Both)
    }
}

fn parse_mode(raw: Option<&str>) -> Result<WindowMode, McpError> {
    match raw.unwrap_or("auto") {
        "auto" => Ok(WindowMode::Auto),
        "paginate" => Ok(WindowMode::Paginate),
        "search" => Ok(WindowMode::Search),
        other => Err(McpError::invalid_params(
            "Invalid mode",
            Some(json!({"mode": other, "expected": ["auto", "paginate", "search"]})),
        )),
    }
}

fn parse_source(raw: Option<&str>) -> Result<LogSource, McpError> {
    match raw.unwrap_or("metro") {
        "metro" => Ok(LogSource::Metro),
        "device" => Ok(LogSource::Device),
        "both" => Ok(LogSource::Both),
        other => Err(McpError::invalid_params(
            "Invalid source",
            Some(json!({"source": other, "expected": ["metro", "device", "both"]})),
        )),
    }
}

fn bridge_error(context: &str, e: BridgeError) -> McpError {
    match e {
        BridgeError::InvalidArgument(msg) => {
            McpError::invalid_params(context.to_string(), Some(json!({"reason": msg})))
        }
        other => McpError::internal_error(
            context.to_string(),
            Some(json!({"reason": other.to_string()})),
        ),
    }
}

const HEALTH_TIP: &str = "TIP: Use check_system_health to diagnose.";

/// Window the collected sections and assemble the `{text, metadata}` tool
/// payload. Sections that yielded nothing leave only their notices behind;
/// an entirely empty collection reports "No logs collected" rather than an
/// error.
pub fn render_logs_response(
    sections: Vec<(&'static str, String)>,
    notices: Vec<String>,
    params: &WindowParams,
    source: &str,
) -> Result<(String, Value), BridgeError> {
    let nonempty: Vec<&(&'static str, String)> = sections
        .iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .collect();

    if nonempty.is_empty() {
        let mut text = String::from("No logs collected.");
        for notice in &notices {
            text.push_str("\n\n");
            text.push_str(notice);
        }
        text.push_str("\n\n");
        text.push_str(HEALTH_TIP);
        let metadata = json!({
            "mode": params.mode.as_str(),
            "source": source,
            "total": 0,
            "truncated": false,
            "notices": notices,
        });
        return Ok((text, metadata));
    }

    let raw = if nonempty.len() > 1 {
        nonempty
            .iter()
            .map(|(label, text)| format!("=== {label} ===\n{text}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        nonempty[0].1.clone()
    };

    let result = run_window(&raw, params)?;
    let mut text = result.summary_header();
    text.push_str(&result.text);
    for notice in &notices {
        text.push_str("\n\n");
        text.push_str(notice);
    }

    let mut metadata = serde_json::to_value(&result.metadata)
        .unwrap_or_else(|_| json!({"mode": params.mode.as_str()}));
    if let Some(obj) = metadata.as_object_mut() {
        obj.insert("source".to_string(), json!(source));
        if !notices.is_empty() {
            obj.insert("notices".to_string(), json!(notices));
        }
    }
    Ok((text, metadata))
}

/// The device stream predicate mirrors the window filter, so it only
/// applies in modes where the window stage filters too; paginate must
/// see the same unfiltered lines from every source.
fn device_predicate(mode: WindowMode, filter: Option<&str>) -> Option<&str> {
    match mode {
        WindowMode::Paginate => None,
        _ => filter,
    }
}

fn device_not_detected() -> CallToolResult {
    CallToolResult::success(vec![Content::text(format!(
        "Radon device not detected.\n\n{HEALTH_TIP}"
    ))])
}

#[tool_router]
impl ServerWrapper {
    pub fn new() -> Self {
        Self {
            metro: MetroClient::new(),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Get application logs from the running React Native app. Collects Metro JS console output (via the bundler's log endpoint or a CDP session) and/or the simulator system log, then windows the result: filter (regex, case-insensitive) -> range (offset/limit or last-N) -> head/tail truncation to 50+150 lines. The response is {text, metadata}; the text starts with a summary line describing exactly what was applied."
    )]
    async fn view_application_logs(
        &self,
        Parameters(args): Parameters<ViewLogsArgs>,
    ) -> Result<CallToolResult, McpError> {
        let mode = parse_mode(args.mode.as_deref())?;
        let source = parse_source(args.source.as_deref())?;
        let window = collection_window(args.timeout);

        // Fresh discovery on every call; the simulator and bundler can
        // start or stop between requests.
        let context = RadonContext::detect().await;

        let mut sections: Vec<(&'static str, String)> = Vec::new();
        let mut notices: Vec<String> = Vec::new();

        if source.wants_metro() {
            match context.metro_port {
                Some(port) => match self.metro.fetch_logs(port, window).await {
                    Ok(chunk) => sections.push(("Metro logs", chunk.text)),
                    Err(e) => notices.push(format!("Failed to get Metro logs: {e}")),
                },
                None => {
                    if let Some(err) = &context.errors.metro {
                        notices.push(format!("Metro discovery failed: {err}"));
                    } else {
                        notices.push("Metro bundler not detected.".to_string());
                    }
                }
            }
        }

        let predicate = device_predicate(mode, args.filter.as_deref());

        if source.wants_device() {
            match &context.device {
                Some(device) => {
                    match stream_device_logs(device, window, predicate).await {
                        Ok(chunk) => sections.push(("Device logs", chunk.text)),
                        Err(e) => notices.push(format!("Failed to get device logs: {e}")),
                    }
                }
                None => {
                    if let Some(err) = &context.errors.device {
                        notices.push(format!("Device discovery failed: {err}"));
                    } else {
                        notices.push("Radon device not detected.".to_string());
                    }
                }
            }
        }

        let params = WindowParams {
            mode,
            filter: args.filter.clone(),
            case_sensitive: false,
            offset: args.offset.map(|v| v as usize),
            limit: args.limit.map(|v| v as usize),
            last: args.last.map(|v| v as usize),
        };

        let (text, metadata) = render_logs_response(sections, notices, &params, source.as_str())
            .map_err(|e| bridge_error("Failed to window logs", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "text": text,
            "metadata": metadata,
        }))?]))
    }

    #[tool(
        description = "Check Radon IDE and Metro bundler status. Reports device connectivity, bundler liveness and an overall healthy/degraded/unavailable verdict. Use before starting a debug session or whenever other tools return errors."
    )]
    async fn check_system_health(
        &self,
        Parameters(_args): Parameters<EmptyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;

        let (radon_status, radon_detail) = match (&context.device, &context.errors.device) {
            (Some(device), _) => ("connected", Some(device.device_id.clone())),
            (None, Some(err)) => ("error", Some(err.clone())),
            (None, None) => ("disconnected", None),
        };

        let (metro_status, metro_detail) = match (context.metro_port, &context.errors.metro) {
            (Some(port), _) => {
                let status = self.metro.status(port).await;
                if status.running {
                    ("running", Some(format!("port {port}")))
                } else {
                    ("unreachable", Some(format!("port {port}")))
                }
            }
            (None, Some(err)) => ("error", Some(err.clone())),
            (None, None) => ("not_detected", None),
        };

        let system = if radon_status == "connected" && metro_status == "running" {
            "healthy"
        } else if radon_status == "connected" || metro_status == "running" {
            "degraded"
        } else {
            "unavailable"
        };

        let mut text = format!(
            "=== System Health ===\nChecked: {}\nStatus: {}\n\n",
            chrono::Utc::now().to_rfc3339(),
            system.to_uppercase()
        );
        text.push_str(&format!("Radon Device: {radon_status}"));
        if let Some(detail) = &radon_detail {
            text.push_str(&format!(" ({detail})"));
        }
        text.push('\n');
        text.push_str(&format!("Metro Bundler: {metro_status}"));
        if let Some(detail) = &metro_detail {
            text.push_str(&format!(" ({detail})"));
        }
        text.push('\n');

        if system == "unavailable" {
            text.push_str(
                "\nTROUBLESHOOTING:\n1. Open Radon IDE\n2. Start the iOS Simulator\n3. Run your React Native app\n4. Try check_system_health again\n",
            );
        }

        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Capture a screenshot of the running simulator, downscaled to a JPEG. Use to see the current UI state before checking logs."
    )]
    async fn view_screenshot(
        &self,
        Parameters(_args): Parameters<EmptyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(device) = &context.device else {
            return Ok(device_not_detected());
        };

        let shot = simctl::capture_screenshot(device)
            .await
            .map_err(|e| bridge_error("Failed to capture screenshot", e))?;

        Ok(CallToolResult::success(vec![
            Content::json(json!({
                "action": "view_screenshot",
                "status": "success",
                "device_id": device.device_id,
                "image_format": "jpeg",
            }))?,
            Content::image(shot.base64, shot.mime_type.to_string()),
        ]))
    }

    #[tool(
        description = "Open a URL or deeplink in the iOS Simulator (e.g. myapp://profile/123, https://example.com, app-settings:)."
    )]
    async fn open_url(
        &self,
        Parameters(args): Parameters<OpenUrlArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(device) = &context.device else {
            return Ok(device_not_detected());
        };

        simctl::open_url(device, &args.url)
            .await
            .map_err(|e| bridge_error("Failed to open URL", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "action": "open_url",
            "status": "success",
            "url": args.url,
        }))?]))
    }

    #[tool(
        description = "Switch the iOS Simulator between dark and light mode. Useful for verifying theme-specific styling."
    )]
    async fn set_appearance(
        &self,
        Parameters(args): Parameters<SetAppearanceArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(device) = &context.device else {
            return Ok(device_not_detected());
        };

        simctl::set_appearance(device, &args.mode)
            .await
            .map_err(|e| bridge_error("Failed to set appearance", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "action": "set_appearance",
            "status": "success",
            "mode": args.mode,
        }))?]))
    }

    #[tool(
        description = "Override the iOS Simulator status bar (time, battery, cellular/wifi bars) for consistent screenshots. At least one option is required."
    )]
    async fn set_status_bar(
        &self,
        Parameters(args): Parameters<SetStatusBarArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(device) = &context.device else {
            return Ok(device_not_detected());
        };

        let overrides = StatusBarOverrides {
            time: args.time,
            battery_level: args.battery_level,
            cellular_bars: args.cellular_bars,
            wifi_bars: args.wifi_bars,
        };
        simctl::set_status_bar(device, &overrides)
            .await
            .map_err(|e| bridge_error("Failed to set status bar", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "action": "set_status_bar",
            "status": "success",
            "overrides": overrides,
        }))?]))
    }

    #[tool(description = "Clear any status bar overrides previously applied to the simulator.")]
    async fn clear_status_bar(
        &self,
        Parameters(_args): Parameters<EmptyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(device) = &context.device else {
            return Ok(device_not_detected());
        };

        simctl::clear_status_bar(device)
            .await
            .map_err(|e| bridge_error("Failed to clear status bar", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "action": "clear_status_bar",
            "status": "success",
        }))?]))
    }

    #[tool(
        description = "Grant, revoke or reset a privacy permission (camera, location, photos, ...) for an app in the simulator."
    )]
    async fn set_privacy(
        &self,
        Parameters(args): Parameters<SetPrivacyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(device) = &context.device else {
            return Ok(device_not_detected());
        };

        simctl::set_privacy(device, &args.action, &args.service, &args.bundle_id)
            .await
            .map_err(|e| bridge_error("Failed to set privacy", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "action": "set_privacy",
            "status": "success",
            "permission_action": args.action,
            "service": args.service,
            "bundle_id": args.bundle_id,
        }))?]))
    }

    #[tool(description = "Get the simulator device record (name, state, runtime) for the connected device.")]
    async fn get_device_info(
        &self,
        Parameters(_args): Parameters<EmptyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(device) = &context.device else {
            return Ok(device_not_detected());
        };

        let record = simctl::get_device_info(device)
            .await
            .map_err(|e| bridge_error("Failed to get device info", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "action": "get_device_info",
            "status": "success",
            "device": record,
        }))?]))
    }

    #[tool(description = "Ask the running app to reload its JavaScript bundle.")]
    async fn reload_app(
        &self,
        Parameters(_args): Parameters<EmptyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(device) = &context.device else {
            return Ok(device_not_detected());
        };

        simctl::reload_app(device)
            .await
            .map_err(|e| bridge_error("Failed to reload app", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "action": "reload_app",
            "status": "success",
        }))?]))
    }

    #[tool(description = "Ask the Metro bundler to rebuild and push a fresh bundle to the app.")]
    async fn reload_metro(
        &self,
        Parameters(_args): Parameters<EmptyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let context = RadonContext::detect().await;
        let Some(port) = context.metro_port else {
            return Ok(CallToolResult::success(vec![Content::text(format!(
                "Metro bundler not detected.\n\n{HEALTH_TIP}"
            ))]));
        };

        self.metro
            .reload(port)
            .await
            .map_err(|e| bridge_error("Failed to reload Metro", e))?;

        Ok(CallToolResult::success(vec![Content::json(json!({
            "action": "reload_metro",
            "status": "success",
            "port": port,
        }))?]))
    }
}

#[tool_handler]
impl ServerHandler for ServerWrapper {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(get_server_instructions().to_string()),
        }
    }
}

fn get_server_instructions() -> &'static str {
    "You are connected to a Radon IDE development session for a React Native app running in the iOS Simulator.

Typical debugging loop:
1. check_system_health - verify the device and the Metro bundler are up.
2. view_screenshot - see the current UI state.
3. view_application_logs - find errors (filter: \"error|exception\"), recent activity (last: 50), or page through history (mode: paginate).
4. Mutate the simulator when needed: open_url for deeplinks, set_appearance for dark/light testing, set_status_bar for clean screenshots, set_privacy for permission flows.

Nothing is configured up front: the device and bundler are re-discovered on every call, so a session that was down a moment ago may be up now. When a tool answers 'not detected', run check_system_health for a diagnosis rather than retrying blindly."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_accepts_known_values_only() {
        assert_eq!(parse_mode(None).unwrap(), WindowMode::Auto);
        assert_eq!(parse_mode(Some("paginate")).unwrap(), WindowMode::Paginate);
        assert!(parse_mode(Some("stream")).is_err());
    }

    #[test]
    fn parse_source_defaults_to_metro() {
        assert_eq!(parse_source(None).unwrap(), LogSource::Metro);
        assert_eq!(parse_source(Some("both")).unwrap(), LogSource::Both);
        assert!(parse_source(Some("cloud")).is_err());
    }

    #[test]
    fn paginate_mode_does_not_prefilter_device_stream() {
        assert_eq!(
            device_predicate(WindowMode::Paginate, Some("error")),
            None
        );
        assert_eq!(
            device_predicate(WindowMode::Auto, Some("error")),
            Some("error")
        );
        assert_eq!(
            device_predicate(WindowMode::Search, Some("error")),
            Some("error")
        );
    }

    #[test]
    fn empty_collection_reports_no_logs() {
        let (text, metadata) = render_logs_response(
            vec![("Metro logs", "   ".to_string())],
            vec!["Metro bundler not detected.".to_string()],
            &WindowParams::default(),
            "metro",
        )
        .unwrap();
        assert!(text.starts_with("No logs collected."));
        assert!(text.contains("Metro bundler not detected."));
        assert_eq!(metadata["total"], 0);
        assert_eq!(metadata["mode"], "auto");
    }

    #[test]
    fn both_sources_get_section_headers() {
        let (text, metadata) = render_logs_response(
            vec![
                ("Metro logs", "js line".to_string()),
                ("Device logs", "sys line".to_string()),
            ],
            vec![],
            &WindowParams::default(),
            "both",
        )
        .unwrap();
        assert!(text.contains("=== Metro logs ==="));
        assert!(text.contains("=== Device logs ==="));
        assert_eq!(metadata["source"], "both");
    }

    #[test]
    fn single_source_has_no_header_noise() {
        let (text, _) = render_logs_response(
            vec![("Metro logs", "only line".to_string())],
            vec![],
            &WindowParams::default(),
            "metro",
        )
        .unwrap();
        assert!(!text.contains("==="));
        assert!(text.contains("only line"));
    }
}
