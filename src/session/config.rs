//! Scanner settings consumed by the capture session

use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the session does after accepting a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    /// Keep scanning; the cooldown suppresses duplicates
    #[default]
    Continuous,
    /// Pause after the first accepted scan
    SingleShot,
}

impl ScanMode {
    /// Parse a mode name (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continuous" => Some(Self::Continuous),
            "single-shot" | "single_shot" | "single" | "once" => Some(Self::SingleShot),
            _ => None,
        }
    }
}

/// Settings for a capture session. Changing them on a live session triggers a reconfigure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Duplicate-suppression window after an accepted scan
    pub cooldown_duration_ms: u64,
    /// Regular expression the decoded text must match; empty accepts everything
    pub data_pattern: String,
    /// The preview is drawn mirrored left-to-right
    pub mirror_horizontal: bool,
    /// Continuous or single-shot scanning
    pub scan_mode: ScanMode,
    /// Upper bound on waiting for the first frame
    pub video_ready_timeout_ms: u64,
    /// Upper bound on the camera request, fallback attempt included
    pub permission_timeout_ms: u64,
    /// Delay between decode attempts
    pub frame_interval_ms: u64,
    /// Ask for the rear-facing camera first
    pub prefer_rear_camera: bool,
    /// Retry with any camera when the preferred one is unavailable
    pub fallback_any_camera: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cooldown_duration_ms: 3000,
            data_pattern: String::new(),
            mirror_horizontal: false,
            scan_mode: ScanMode::Continuous,
            video_ready_timeout_ms: 10_000,
            permission_timeout_ms: 10_000,
            frame_interval_ms: 100,
            prefer_rear_camera: true,
            fallback_any_camera: true,
        }
    }
}

impl ScannerConfig {
    /// Cooldown as a duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_duration_ms)
    }

    /// Video-ready timeout as a duration
    pub fn video_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.video_ready_timeout_ms)
    }

    /// Camera request timeout as a duration
    pub fn permission_timeout(&self) -> Duration {
        Duration::from_millis(self.permission_timeout_ms)
    }

    /// Frame pacing as a duration
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Compile `data_pattern`. `None` when every text is acceptable.
    pub fn compile_pattern(&self) -> Result<Option<Regex>> {
        if self.data_pattern.is_empty() {
            return Ok(None);
        }
        Ok(Some(Regex::new(&self.data_pattern)?))
    }

    /// The pattern recorded alongside accepted scans
    pub fn pattern_tag(&self) -> Option<String> {
        (!self.data_pattern.is_empty()).then(|| self.data_pattern.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let config = ScannerConfig::default();
        assert_eq!(config.cooldown(), Duration::from_secs(3));
        assert_eq!(config.video_ready_timeout(), Duration::from_secs(10));
        assert_eq!(config.scan_mode, ScanMode::Continuous);
        assert!(config.compile_pattern().unwrap().is_none());
        assert_eq!(config.pattern_tag(), None);
    }

    #[test]
    fn test_pattern_compiles() {
        let config = ScannerConfig {
            data_pattern: r"^@\n?ANSI \d{6}".to_string(),
            ..Default::default()
        };
        let re = config.compile_pattern().unwrap().unwrap();
        assert!(re.is_match("@\nANSI 636014080002DL"));
        assert!(!re.is_match("https://example.com"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = ScannerConfig {
            data_pattern: "([".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.compile_pattern(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_toml() {
        let config: ScannerConfig =
            toml::from_str("cooldown_duration_ms = 500\nscan_mode = \"single-shot\"").unwrap();
        assert_eq!(config.cooldown_duration_ms, 500);
        assert_eq!(config.scan_mode, ScanMode::SingleShot);
        assert_eq!(config.frame_interval_ms, 100);
    }

    #[test]
    fn test_scan_mode_parse() {
        assert_eq!(ScanMode::parse("Single_Shot"), Some(ScanMode::SingleShot));
        assert_eq!(ScanMode::parse("continuous"), Some(ScanMode::Continuous));
        assert_eq!(ScanMode::parse("burst"), None);
    }
}
