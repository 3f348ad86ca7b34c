//! Environment discovery for a running Radon IDE session.
//!
//! Nothing here is configured explicitly: the simulator device is found by
//! scanning the OS process table for the simulator-server process (falling
//! back to the Radon cache directory), and the Metro port by scanning for a
//! `react-native start` invocation (falling back to probing the
//! conventional ports). Every failure is returned as data; discovery never
//! aborts the caller's request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::BridgeError;
use crate::validators::{validate_device_id, validate_path};

/// Ports Metro conventionally listens on when no `--port` flag is visible.
pub const CONVENTIONAL_METRO_PORTS: [u16; 2] = [8081, 50377];

const PS_TIMEOUT: Duration = Duration::from_secs(5);
const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

static DEVICE_ARGS_REGEX: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"simulator-server-macos.*--id\s+([A-F0-9-]+).*--device-set\s+(\S+)")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static METRO_ARGS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"react-native.*start.*--port\s+(\d+)").unwrap());

static UUID_DIR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)[A-F0-9-]{36}$").unwrap());

/// A booted simulator instance as discovered from the environment.
///
/// This is a value, re-discovered on every call; it is never cached across
/// requests because the simulator can start or stop between calls.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceHandle {
    pub device_id: String,
    pub device_set: PathBuf,
    pub platform: String,
}

/// Source of the raw process table. The real implementation shells out to
/// `ps aux`; tests feed synthetic listings through this seam instead.
#[async_trait]
pub trait ProcessLister: Send + Sync {
    async fn list_processes(&self) -> Result<String, BridgeError>;
}

/// Default lister backed by `ps aux`.
pub struct PsProcessLister;

#[async_trait]
impl ProcessLister for PsProcessLister {
    async fn list_processes(&self) -> Result<String, BridgeError> {
        let output = timeout(PS_TIMEOUT, Command::new("ps").arg("aux").output())
            .await
            .map_err(|_| BridgeError::Discovery("ps aux timed out".to_string()))?
            .map_err(|e| BridgeError::Discovery(format!("failed to run ps: {e}")))?;
        if !output.status.success() {
            return Err(BridgeError::Discovery(format!(
                "ps exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join("Library/Caches/com.swmansion.radon-ide/Devices/iOS")
}

/// Find the booted Radon device, preferring the simulator-server process
/// arguments over the cache-directory fallback.
///
/// Returns `(found, error)`: a lister failure is reported as an error
/// message, while an empty environment is simply `(None, None)`.
pub async fn detect_device(lister: &dyn ProcessLister) -> (Option<DeviceHandle>, Option<String>) {
    detect_device_in(lister, &default_cache_dir()).await
}

pub async fn detect_device_in(
    lister: &dyn ProcessLister,
    cache_dir: &Path,
) -> (Option<DeviceHandle>, Option<String>) {
    let ps_output = match lister.list_processes().await {
        Ok(out) => out,
        Err(e) => return (None, Some(e.to_string())),
    };

    if let Some(caps) = DEVICE_ARGS_REGEX.captures(&ps_output) {
        let device_id = caps[1].to_string();
        let device_set = caps[2].to_string();
        // ps output is attacker-adjacent text. A match that fails
        // validation is treated as no match, not as a discovered device.
        if validate_device_id(&device_id).is_ok() && validate_path(&device_set).is_ok() {
            debug!(device_id, "found simulator-server process");
            return (
                Some(DeviceHandle {
                    device_id,
                    device_set: PathBuf::from(device_set),
                    platform: "iOS".to_string(),
                }),
                None,
            );
        }
        warn!("simulator-server arguments failed validation, ignoring");
    }

    // Enumeration order of the cache directory is the tie-break when
    // multiple candidates exist; it is not guaranteed stable.
    match std::fs::read_dir(cache_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if UUID_DIR_REGEX.is_match(&name) && validate_device_id(&name).is_ok() {
                    debug!(device_id = %name, "found device in cache directory");
                    return (
                        Some(DeviceHandle {
                            device_id: name.into_owned(),
                            device_set: cache_dir.to_path_buf(),
                            platform: "iOS".to_string(),
                        }),
                        None,
                    );
                }
            }
            (None, None)
        }
        // A missing cache directory is the normal no-device case, but
        // an unreadable one is a discovery failure worth surfacing.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (None, None),
        Err(e) => (
            None,
            Some(format!("cannot scan device cache {}: {e}", cache_dir.display())),
        ),
    }
}

/// Find the Metro bundler port: parse it out of a `react-native start`
/// invocation if one is visible, otherwise probe the conventional ports
/// with a short liveness request. No port is assumed by default.
pub async fn detect_metro_port(lister: &dyn ProcessLister) -> (Option<u16>, Option<String>) {
    detect_metro_port_on(lister, &CONVENTIONAL_METRO_PORTS).await
}

pub async fn detect_metro_port_on(
    lister: &dyn ProcessLister,
    candidate_ports: &[u16],
) -> (Option<u16>, Option<String>) {
    let ps_output = match lister.list_processes().await {
        Ok(out) => out,
        Err(e) => return (None, Some(e.to_string())),
    };

    if let Some(caps) = METRO_ARGS_REGEX.captures(&ps_output) {
        if let Ok(port) = caps[1].parse::<u16>() {
            debug!(port, "found metro port in process arguments");
            return (Some(port), None);
        }
    }

    let client = match reqwest::Client::builder()
        .timeout(PORT_PROBE_TIMEOUT)
        .build()
    {
        Ok(c) => c,
        Err(e) => return (None, Some(e.to_string())),
    };

    for &port in candidate_ports {
        let url = format!("http://localhost:{port}/status");
        if client.get(&url).send().await.is_ok() {
            debug!(port, "metro responded to port probe");
            return (Some(port), None);
        }
    }

    (None, None)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryErrors {
    pub device: Option<String>,
    pub metro: Option<String>,
}

/// Per-request snapshot of what discovery found.
///
/// Constructed fresh for every external request and never reused: both the
/// simulator and Metro can start or stop between calls. "Not found" and
/// "errored while searching" are carried separately and never conflated.
#[derive(Debug, Clone, Serialize)]
pub struct RadonContext {
    pub device: Option<DeviceHandle>,
    pub metro_port: Option<u16>,
    pub is_running: bool,
    pub errors: DiscoveryErrors,
}

impl RadonContext {
    /// Run both discovery legs against the real process table.
    pub async fn detect() -> Self {
        Self::detect_with(&PsProcessLister).await
    }

    pub async fn detect_with(lister: &dyn ProcessLister) -> Self {
        // The two legs are independent; run them concurrently.
        let (device_result, metro_result) =
            tokio::join!(detect_device(lister), detect_metro_port(lister));
        Self::assemble(device_result, metro_result)
    }

    pub fn assemble(
        (device, device_error): (Option<DeviceHandle>, Option<String>),
        (metro_port, metro_error): (Option<u16>, Option<String>),
    ) -> Self {
        let is_running = device.is_some() || metro_port.is_some();
        RadonContext {
            device,
            metro_port,
            is_running,
            errors: DiscoveryErrors {
                device: device_error,
                metro: metro_error,
            },
        }
    }
}
