//! Validated `xcrun simctl` pass-throughs for simulator mutation and
//! inspection. Every entry point validates the device ID and device-set
//! path before any command exists, and every command runs as an argument
//! vector with an explicit timeout, never through a shell.

use std::process::Output;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::detector::DeviceHandle;
use crate::errors::BridgeError;
use crate::validators::{validate_device_id, validate_path};

const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const VALID_PRIVACY_ACTIONS: [&str; 3] = ["grant", "revoke", "reset"];
const VALID_PRIVACY_SERVICES: [&str; 14] = [
    "all",
    "calendar",
    "contacts-limited",
    "contacts",
    "location",
    "location-always",
    "photos-add",
    "photos",
    "media-library",
    "microphone",
    "motion",
    "reminders",
    "siri",
    "camera",
];

fn validate_device(device: &DeviceHandle) -> Result<(), BridgeError> {
    validate_device_id(&device.device_id)?;
    validate_path(&device.device_set.to_string_lossy())
}

async fn run_command(mut cmd: Command, window: Duration) -> Result<Output, BridgeError> {
    let output = timeout(window, cmd.output())
        .await
        .map_err(|_| BridgeError::Timeout("command timed out".to_string()))??;
    if !output.status.success() {
        return Err(BridgeError::CommandFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(output)
}

fn simctl(device: &DeviceHandle) -> Command {
    let mut cmd = Command::new("xcrun");
    cmd.arg("simctl").arg("--set").arg(&device.device_set);
    cmd
}

#[derive(Debug, Clone, Serialize)]
pub struct Screenshot {
    pub base64: String,
    pub mime_type: &'static str,
}

/// Capture a screenshot, downscale it to a JPEG with `sips`, and return it
/// base64-encoded. Scratch files live in `NamedTempFile`s so they are
/// removed on every exit path.
pub async fn capture_screenshot(device: &DeviceHandle) -> Result<Screenshot, BridgeError> {
    validate_device(device)?;

    let png = tempfile::Builder::new()
        .prefix("radon-screenshot-")
        .suffix(".png")
        .tempfile()?;
    let jpeg = tempfile::Builder::new()
        .prefix("radon-screenshot-")
        .suffix(".jpg")
        .tempfile()?;

    let mut capture = simctl(device);
    capture
        .arg("io")
        .arg(&device.device_id)
        .arg("screenshot")
        .arg(png.path());
    run_command(capture, SCREENSHOT_TIMEOUT).await?;

    let mut convert = Command::new("sips");
    convert
        .args(["-Z", "800", "-s", "format", "jpeg", "-s", "formatOptions", "60"])
        .arg(png.path())
        .arg("--out")
        .arg(jpeg.path());
    run_command(convert, SCREENSHOT_TIMEOUT).await?;

    let bytes = std::fs::read(jpeg.path())?;
    debug!(bytes = bytes.len(), "captured screenshot");
    Ok(Screenshot {
        base64: general_purpose::STANDARD.encode(bytes),
        mime_type: "image/jpeg",
    })
}

pub async fn open_url(device: &DeviceHandle, url: &str) -> Result<(), BridgeError> {
    validate_device(device)?;
    if url.is_empty() {
        return Err(BridgeError::InvalidArgument("URL is required".to_string()));
    }
    let mut cmd = simctl(device);
    cmd.arg("openurl").arg(&device.device_id).arg(url);
    run_command(cmd, SCREENSHOT_TIMEOUT).await?;
    Ok(())
}

pub async fn set_appearance(device: &DeviceHandle, mode: &str) -> Result<(), BridgeError> {
    validate_device(device)?;
    if !matches!(mode, "dark" | "light") {
        return Err(BridgeError::InvalidArgument(
            "Mode must be \"dark\" or \"light\"".to_string(),
        ));
    }
    let mut cmd = simctl(device);
    cmd.arg("ui")
        .arg(&device.device_id)
        .arg("appearance")
        .arg(mode);
    run_command(cmd, COMMAND_TIMEOUT).await?;
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBarOverrides {
    pub time: Option<String>,
    pub battery_level: Option<u8>,
    pub cellular_bars: Option<u8>,
    pub wifi_bars: Option<u8>,
}

impl StatusBarOverrides {
    pub fn is_empty(&self) -> bool {
        self.time.is_none()
            && self.battery_level.is_none()
            && self.cellular_bars.is_none()
            && self.wifi_bars.is_none()
    }
}

pub async fn set_status_bar(
    device: &DeviceHandle,
    overrides: &StatusBarOverrides,
) -> Result<(), BridgeError> {
    validate_device(device)?;
    if overrides.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "At least one status bar option is required".to_string(),
        ));
    }
    let mut cmd = simctl(device);
    cmd.arg("status_bar")
        .arg(&device.device_id)
        .arg("override");
    if let Some(time) = &overrides.time {
        cmd.arg("--time").arg(time);
    }
    if let Some(level) = overrides.battery_level {
        cmd.arg("--batteryLevel").arg(level.to_string());
    }
    if let Some(bars) = overrides.cellular_bars {
        cmd.arg("--cellularBars").arg(bars.to_string());
    }
    if let Some(bars) = overrides.wifi_bars {
        cmd.arg("--wifiBars").arg(bars.to_string());
    }
    run_command(cmd, COMMAND_TIMEOUT).await?;
    Ok(())
}

pub async fn clear_status_bar(device: &DeviceHandle) -> Result<(), BridgeError> {
    validate_device(device)?;
    let mut cmd = simctl(device);
    cmd.arg("status_bar").arg(&device.device_id).arg("clear");
    run_command(cmd, COMMAND_TIMEOUT).await?;
    Ok(())
}

pub async fn set_privacy(
    device: &DeviceHandle,
    action: &str,
    service: &str,
    bundle_id: &str,
) -> Result<(), BridgeError> {
    validate_device(device)?;
    if !VALID_PRIVACY_ACTIONS.contains(&action) {
        return Err(BridgeError::InvalidArgument(
            "Action must be \"grant\", \"revoke\", or \"reset\"".to_string(),
        ));
    }
    if !VALID_PRIVACY_SERVICES.contains(&service) {
        return Err(BridgeError::InvalidArgument(format!(
            "Invalid service. Valid: {}",
            VALID_PRIVACY_SERVICES.join(", ")
        )));
    }
    if bundle_id.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "Bundle ID is required".to_string(),
        ));
    }
    let mut cmd = simctl(device);
    cmd.arg("privacy")
        .arg(&device.device_id)
        .arg(action)
        .arg(service)
        .arg(bundle_id);
    run_command(cmd, COMMAND_TIMEOUT).await?;
    Ok(())
}

/// Look the device up in `simctl list devices -j` and return its record
/// with the runtime identifier shortened to its display form.
pub async fn get_device_info(device: &DeviceHandle) -> Result<Value, BridgeError> {
    validate_device(device)?;
    let mut cmd = simctl(device);
    cmd.args(["list", "devices", "-j"]);
    let output = run_command(cmd, COMMAND_TIMEOUT).await?;

    let data: Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| BridgeError::Protocol(format!("malformed device list: {e}")))?;
    let devices = data
        .get("devices")
        .and_then(Value::as_object)
        .ok_or_else(|| BridgeError::Protocol("malformed device list".to_string()))?;

    for (runtime, entries) in devices {
        if let Some(entries) = entries.as_array() {
            for entry in entries {
                if entry.get("udid").and_then(Value::as_str) == Some(device.device_id.as_str()) {
                    let mut record = entry.clone();
                    if let Some(obj) = record.as_object_mut() {
                        obj.insert(
                            "runtime".to_string(),
                            Value::String(
                                runtime
                                    .trim_start_matches("com.apple.CoreSimulator.SimRuntime.")
                                    .to_string(),
                            ),
                        );
                    }
                    return Ok(record);
                }
            }
        }
    }
    Err(BridgeError::Discovery("Device not found".to_string()))
}

/// Nudge the app's JS runtime to reload by posting the notification the
/// dev menu listens for.
pub async fn reload_app(device: &DeviceHandle) -> Result<(), BridgeError> {
    validate_device(device)?;
    let mut cmd = simctl(device);
    cmd.arg("spawn")
        .arg(&device.device_id)
        .args(["notifyutil", "-p", "com.apple.mobile.keybag.userAuthenticated"]);
    run_command(cmd, COMMAND_TIMEOUT).await?;
    Ok(())
}
