//! pdfscan runtime configuration handling
//!
//! Values come from defaults, then a TOML/YAML file, then `PDFSCAN_*`
//! environment variables, then command-line flags applied by the daemon.

#[cfg(feature = "camera")]
use crate::camera::{CameraConfig, PixelFormat};
use crate::error::{Error, Result};
use crate::geometry::CenteredViewport;
use crate::session::{ScanMode, ScannerConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure persisted to disk or environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfscanConfig {
    /// Camera device overrides
    pub camera: CameraOptions,
    /// Capture session settings
    pub scanner: ScannerConfig,
    /// Scan window placement
    pub layout: LayoutOptions,
    /// Where scans are stored
    pub storage: StorageOptions,
    /// Logging configuration
    pub logging: LoggingOptions,
    /// Event output configuration
    pub output: OutputOptions,
}

impl PdfscanConfig {
    /// Load configuration from an explicit path or fall back to discovered defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            Self::from_file(path)?
        } else if let Some(path) = Self::discover_file()? {
            tracing::info!("Using configuration file: {}", path.display());
            Self::from_file(&path)?
        } else {
            tracing::debug!("No pdfscan.toml / pdfscan.yaml found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Attempt to locate a configuration file in common locations.
    fn discover_file() -> Result<Option<PathBuf>> {
        let cwd =
            env::current_dir().map_err(|e| Error::Config(format!("Failed to read cwd: {e}")))?;
        let local = ["pdfscan.toml", "pdfscan.yaml", "pdfscan.yml"]
            .iter()
            .map(|name| cwd.join(name));

        let xdg = env::var_os("XDG_CONFIG_HOME")
            .map(|dir| PathBuf::from(dir).join("pdfscan"))
            .into_iter()
            .flat_map(|base| ["config.toml", "config.yaml"].map(|name| base.join(name)));

        Ok(local.chain(xdg).find(|path| path.exists()))
    }

    /// Read configuration from a concrete file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        Self::parse(&contents, &extension)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse configuration text in the format named by `extension`
    pub fn parse(contents: &str, extension: &str) -> Result<Self> {
        let config: Self = match extension {
            "toml" => toml::from_str(contents)
                .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
            other => {
                return Err(Error::Config(format!(
                    "Unsupported config format '{other}', expected toml/yaml"
                )));
            }
        };
        config.scanner.compile_pattern()?;
        Ok(config)
    }

    /// Apply environment variable overrides after file/default loading.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.camera.apply_overrides(&lookup);
        apply_scanner_overrides(&mut self.scanner, &lookup);
        self.storage.apply_overrides(&lookup);
        self.logging.apply_overrides(&lookup);
        self.output.apply_overrides(&lookup);
    }

    /// Produce a fully resolved camera configuration ready to open the V4L2 device.
    #[cfg(feature = "camera")]
    pub fn camera_config(&self) -> Result<CameraConfig> {
        self.camera.to_camera_config()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn apply_scanner_overrides(scanner: &mut ScannerConfig, lookup: &impl Fn(&str) -> Option<String>) {
    if let Some(ms) = lookup("PDFSCAN_COOLDOWN_MS").and_then(|v| v.parse().ok()) {
        scanner.cooldown_duration_ms = ms;
    }
    if let Some(pattern) = lookup("PDFSCAN_DATA_PATTERN") {
        scanner.data_pattern = pattern;
    }
    if let Some(mirror) = lookup("PDFSCAN_MIRROR").as_deref().and_then(parse_flag) {
        scanner.mirror_horizontal = mirror;
    }
    if let Some(mode) = lookup("PDFSCAN_SCAN_MODE").as_deref().and_then(ScanMode::parse) {
        scanner.scan_mode = mode;
    }
    if let Some(ms) = lookup("PDFSCAN_VIDEO_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        scanner.video_ready_timeout_ms = ms;
    }
}

/// User-friendly camera overrides merged on top of the default V4L2 configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    /// Numeric camera index (e.g. `/dev/video2`)
    pub device_index: Option<usize>,
    /// Camera name substring
    pub device_name: Option<String>,
    /// Frame width in pixels
    pub width: Option<u32>,
    /// Frame height in pixels
    pub height: Option<u32>,
    /// Frames per second
    pub fps: Option<u32>,
    /// Pixel format (mjpeg/yuyv/grey)
    pub format: Option<String>,
    /// Name substrings that mark a rear camera
    pub rear_name_hints: Option<Vec<String>>,
}

impl CameraOptions {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("PDFSCAN_CAMERA_DEVICE") {
            self.device_name = Some(name);
            self.device_index = None;
        }
        if let Some(index) = lookup("PDFSCAN_CAMERA_INDEX").and_then(|v| v.parse().ok()) {
            self.device_index = Some(index);
            self.device_name = None;
        }
        if let Some(width) = lookup("PDFSCAN_CAMERA_WIDTH") {
            self.width = width.parse().ok();
        }
        if let Some(height) = lookup("PDFSCAN_CAMERA_HEIGHT") {
            self.height = height.parse().ok();
        }
        if let Some(fps) = lookup("PDFSCAN_CAMERA_FPS") {
            self.fps = fps.parse().ok();
        }
        if let Some(format) = lookup("PDFSCAN_CAMERA_FORMAT") {
            self.format = Some(format);
        }
    }

    /// Merge overrides onto the default camera configuration.
    #[cfg(feature = "camera")]
    pub fn to_camera_config(&self) -> Result<CameraConfig> {
        let mut config = CameraConfig::default();

        if let Some(ref name) = self.device_name {
            config.device_name = Some(name.clone());
        } else if let Some(index) = self.device_index {
            config.device_index = Some(index);
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config.fps = fps.max(1);
        }
        if let Some(ref format) = self.format {
            config.format = PixelFormat::parse(format).ok_or_else(|| {
                Error::Config(format!(
                    "Unknown pixel format '{format}'. Use mjpeg, yuyv, or grey"
                ))
            })?;
        }
        if let Some(ref hints) = self.rear_name_hints {
            config.rear_name_hints = hints.clone();
        }

        Ok(config)
    }
}

/// Placement of the scan window when no UI supplies a layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Window width as a fraction of the frame width
    pub region_width: f64,
    /// Window height as a fraction of the frame height
    pub region_height: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        // PDF417 symbols are wide and short
        Self {
            region_width: 0.8,
            region_height: 0.4,
        }
    }
}

impl LayoutOptions {
    /// Viewport that centers the window on the native frame
    pub fn viewport(&self) -> CenteredViewport {
        CenteredViewport {
            width_fraction: self.region_width,
            height_fraction: self.region_height,
        }
    }
}

/// Scan storage location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// JSON lines file; defaults to `$XDG_DATA_HOME/pdfscan/scans.jsonl`
    pub path: Option<PathBuf>,
}

impl StorageOptions {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("PDFSCAN_STORE") {
            self.path = Some(PathBuf::from(path));
        }
    }

    /// Resolved store path
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(ref path) = self.path {
            return path.clone();
        }
        let base = env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share")));
        match base {
            Some(base) => base.join("pdfscan").join("scans.jsonl"),
            None => PathBuf::from("pdfscan-scans.jsonl"),
        }
    }
}

/// Structured logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Default log level (overridable via `PDFSCAN_LOG_LEVEL`)
    pub level: String,
    /// Optional log file path for teeing structured logs
    pub file: Option<PathBuf>,
    /// ANSI colors in stdout logging
    pub color: bool,
    /// Optional log rotation strategy applied to `file`
    pub rotation: Option<LogRotation>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            color: true,
            rotation: None,
        }
    }
}

impl LoggingOptions {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("PDFSCAN_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(file) = lookup("PDFSCAN_LOG_FILE") {
            self.file = Some(PathBuf::from(file));
        }
        if let Some(color) = lookup("PDFSCAN_LOG_COLOR").as_deref().and_then(parse_flag) {
            self.color = color;
        }
        if let Some(rotation) = lookup("PDFSCAN_LOG_ROTATION")
            .as_deref()
            .and_then(LogRotation::parse)
        {
            self.rotation = Some(rotation);
        }
    }
}

/// Supported log rotation policies for file sinks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Rotate log files once per hour
    Hourly,
    /// Rotate log files once per day
    Daily,
}

impl LogRotation {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            _ => None,
        }
    }
}

/// Where session events are published
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Print events as JSON instead of text
    pub json: bool,
    /// Unix domain socket streaming events as JSON lines
    pub unix_socket: Option<PathBuf>,
    /// Ring the terminal bell on accepted scans
    pub bell: bool,
}

impl OutputOptions {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(socket) = lookup("PDFSCAN_UNIX_SOCKET") {
            self.unix_socket = (!socket.trim().is_empty()).then(|| PathBuf::from(socket));
        }
        if let Some(bell) = lookup("PDFSCAN_BELL").as_deref().and_then(parse_flag) {
            self.bell = bell;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_toml_sections() {
        let config = PdfscanConfig::parse(
            r#"
            [scanner]
            cooldown_duration_ms = 1500
            data_pattern = "^@"
            mirror_horizontal = true

            [layout]
            region_width = 0.9

            [logging]
            level = "debug"
            rotation = "daily"
            "#,
            "toml",
        )
        .unwrap();
        assert_eq!(config.scanner.cooldown_duration_ms, 1500);
        assert!(config.scanner.mirror_horizontal);
        assert_eq!(config.layout.region_width, 0.9);
        assert_eq!(config.layout.region_height, 0.4);
        assert_eq!(config.logging.rotation, Some(LogRotation::Daily));
    }

    #[test]
    fn test_yaml_config() {
        let config = PdfscanConfig::parse(
            "scanner:\n  scan_mode: single-shot\nstorage:\n  path: /tmp/scans.jsonl\n",
            "yaml",
        )
        .unwrap();
        assert_eq!(config.scanner.scan_mode, ScanMode::SingleShot);
        assert_eq!(
            config.storage.resolved_path(),
            PathBuf::from("/tmp/scans.jsonl")
        );
    }

    #[test]
    fn test_invalid_pattern_rejected_at_load() {
        let err = PdfscanConfig::parse("[scanner]\ndata_pattern = \"(\"\n", "toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_extension() {
        assert!(PdfscanConfig::parse("", "ini").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = PdfscanConfig::default();
        config.apply_overrides(lookup(&[
            ("PDFSCAN_COOLDOWN_MS", "750"),
            ("PDFSCAN_MIRROR", "on"),
            ("PDFSCAN_SCAN_MODE", "once"),
            ("PDFSCAN_CAMERA_INDEX", "2"),
            ("PDFSCAN_LOG_COLOR", "false"),
            ("PDFSCAN_UNIX_SOCKET", ""),
        ]));
        assert_eq!(config.scanner.cooldown_duration_ms, 750);
        assert!(config.scanner.mirror_horizontal);
        assert_eq!(config.scanner.scan_mode, ScanMode::SingleShot);
        assert_eq!(config.camera.device_index, Some(2));
        assert!(!config.logging.color);
        assert!(config.output.unix_socket.is_none());
    }

    #[test]
    fn test_bad_override_values_are_ignored() {
        let mut config = PdfscanConfig::default();
        config.apply_overrides(lookup(&[
            ("PDFSCAN_COOLDOWN_MS", "soon"),
            ("PDFSCAN_MIRROR", "maybe"),
        ]));
        assert_eq!(config.scanner.cooldown_duration_ms, 3000);
        assert!(!config.scanner.mirror_horizontal);
    }

    #[cfg(feature = "camera")]
    #[test]
    fn test_camera_overrides_merge() {
        let options = CameraOptions {
            width: Some(1280),
            fps: Some(0),
            format: Some("yuyv".to_string()),
            ..Default::default()
        };
        let config = options.to_camera_config().unwrap();
        assert_eq!(config.width, 1280);
        assert_eq!(config.fps, 1);
        assert_eq!(config.format, PixelFormat::Yuyv);

        let bad = CameraOptions {
            format: Some("h264".to_string()),
            ..Default::default()
        };
        assert!(bad.to_camera_config().is_err());
    }
}
