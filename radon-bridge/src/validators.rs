//! Input validation for values that end up in external commands.
//!
//! Device IDs and device-set paths are interpolated into `xcrun simctl`
//! argument vectors; both are checked against strict shapes before any
//! command is constructed. Filter patterns are length-capped before
//! compilation to bound worst-case matching cost.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::errors::BridgeError;

/// Canonical 36-character hyphenated hex UUID, either case.
static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[A-F0-9]{8}-[A-F0-9]{4}-[A-F0-9]{4}-[A-F0-9]{4}-[A-F0-9]{12}$").unwrap()
});

/// Allowlist for device-set paths. Deliberately excludes shell
/// metacharacters, spaces and anything else `ps` output could smuggle in.
static PATH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9/_.\-~]+$").unwrap());

/// Documented cap on filter pattern length.
pub const MAX_REGEX_LENGTH: usize = 100;

pub fn validate_device_id(id: &str) -> Result<(), BridgeError> {
    if id.is_empty() {
        return Err(BridgeError::InvalidArgument("Device ID required".to_string()));
    }
    if !UUID_REGEX.is_match(id) {
        return Err(BridgeError::InvalidArgument(
            "Invalid device ID format".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_path(path: &str) -> Result<(), BridgeError> {
    if path.is_empty() {
        return Err(BridgeError::InvalidArgument("Path required".to_string()));
    }
    if !PATH_REGEX.is_match(path) {
        return Err(BridgeError::InvalidArgument(
            "Invalid path characters".to_string(),
        ));
    }
    if path.contains("..") {
        return Err(BridgeError::InvalidArgument(
            "Path traversal not allowed".to_string(),
        ));
    }
    Ok(())
}

/// Compile a log filter pattern, case-insensitive unless told otherwise.
/// Over-long patterns are rejected before compilation, not truncated.
pub fn compile_filter(pattern: &str, case_sensitive: bool) -> Result<Regex, BridgeError> {
    if pattern.len() > MAX_REGEX_LENGTH {
        return Err(BridgeError::InvalidArgument(format!(
            "Regex too long (max {MAX_REGEX_LENGTH})"
        )));
    }
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| BridgeError::InvalidArgument(format!("Invalid regex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_uuid_either_case() {
        assert!(validate_device_id("A1B2C3D4-E5F6-7890-ABCD-EF1234567890").is_ok());
        assert!(validate_device_id("a1b2c3d4-e5f6-7890-abcd-ef1234567890").is_ok());
    }

    #[test]
    fn rejects_malformed_device_ids() {
        for bad in [
            "",
            "not-a-uuid",
            "A1B2C3D4-E5F6-7890-ABCD-EF12345678", // too short
            "A1B2C3D4-E5F6-7890-ABCD-EF1234567890X",
            "`id`",
            "$(whoami)",
            "A1B2C3D4-E5F6-7890-ABCD-EF1234567890; rm -rf /",
        ] {
            assert!(validate_device_id(bad).is_err(), "accepted: {bad:?}");
        }
    }

    #[test]
    fn rejects_path_traversal_and_metacharacters() {
        assert!(validate_path("/Users/dev/Library/Caches/Devices/iOS").is_ok());
        assert!(validate_path("~/Library/Caches").is_ok());
        for bad in [
            "",
            "/tmp/../etc/passwd",
            "/tmp/a..b",
            "/tmp/$(whoami)",
            "/tmp/`id`",
            "/tmp/a;b",
            "/tmp/a b",
        ] {
            assert!(validate_path(bad).is_err(), "accepted: {bad:?}");
        }
    }

    #[test]
    fn filter_is_case_insensitive_by_default() {
        let re = compile_filter("error", false).unwrap();
        assert!(re.is_match("An ERROR occurred"));
        let re = compile_filter("error", true).unwrap();
        assert!(!re.is_match("An ERROR occurred"));
    }

    #[test]
    fn rejects_overlong_and_uncompilable_patterns() {
        let long = "a".repeat(MAX_REGEX_LENGTH + 1);
        assert!(compile_filter(&long, false).is_err());
        assert!(compile_filter("[unclosed", false).is_err());
        // Exactly at the cap is fine
        let at_cap = "a".repeat(MAX_REGEX_LENGTH);
        assert!(compile_filter(&at_cap, false).is_ok());
    }
}
