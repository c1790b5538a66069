//! V4L2 capture configuration

use serde::{Deserialize, Serialize};

/// Device names that suggest a rear-facing camera
pub const DEFAULT_REAR_HINTS: &[&str] = &["rear", "back", "world", "environment"];

/// V4L2 capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Device index (e.g. 0 for /dev/video0). Pins the device and bypasses facing preference.
    pub device_index: Option<usize>,

    /// Case-insensitive name substring. Pins the device and bypasses facing preference.
    pub device_name: Option<String>,

    /// Name substrings treated as rear-facing when the session asks for the environment camera
    pub rear_name_hints: Vec<String>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Frames per second
    pub fps: u32,

    /// Pixel format requested from the driver
    pub format: PixelFormat,

    /// Number of mmap buffers
    pub buffer_count: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: None,
            device_name: None,
            rear_name_hints: DEFAULT_REAR_HINTS.iter().map(|s| s.to_string()).collect(),
            // PDF417 rows are thin; resolution matters more than frame rate
            width: 1920,
            height: 1080,
            fps: 15,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
        }
    }
}

impl CameraConfig {
    /// Preset for webcams that only do uncompressed VGA
    pub fn compatible() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            format: PixelFormat::Yuyv,
            ..Default::default()
        }
    }

    /// Pin a device by name
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self.device_index = None;
        self
    }

    /// Whether the device choice is fixed by configuration
    pub fn is_pinned(&self) -> bool {
        self.device_name.is_some() || self.device_index.is_some()
    }

    /// Whether a device name looks like a rear camera
    pub fn looks_rear_facing(&self, device_name: &str) -> bool {
        let lower = device_name.to_lowercase();
        self.rear_name_hints
            .iter()
            .any(|hint| !hint.is_empty() && lower.contains(&hint.to_lowercase()))
    }
}

/// Pixel format for camera capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Motion JPEG
    Mjpeg,
    /// YUYV 4:2:2
    Yuyv,
    /// 8-bit greyscale, cheapest to decode from
    Grey,
}

impl PixelFormat {
    /// V4L2 FourCC code
    pub fn to_fourcc(self) -> v4l::FourCC {
        match self {
            PixelFormat::Mjpeg => v4l::FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => v4l::FourCC::new(b"YUYV"),
            PixelFormat::Grey => v4l::FourCC::new(b"GREY"),
        }
    }

    /// Parse from a user-provided string (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mjpeg" | "mjpg" => Some(PixelFormat::Mjpeg),
            "yuyv" | "yuy2" => Some(PixelFormat::Yuyv),
            "grey" | "gray" | "y8" => Some(PixelFormat::Grey),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CameraConfig::default();
        assert_eq!(config.width, 1920);
        assert!(!config.is_pinned());
    }

    #[test]
    fn test_rear_hints() {
        let config = CameraConfig::default();
        assert!(config.looks_rear_facing("Integrated Rear Camera"));
        assert!(config.looks_rear_facing("BACK cam"));
        assert!(!config.looks_rear_facing("HD Webcam"));
    }

    #[test]
    fn test_pinned_by_name() {
        let config = CameraConfig::compatible().with_device_name("Logitech");
        assert!(config.is_pinned());
        assert_eq!(config.format, PixelFormat::Yuyv);
    }

    #[test]
    fn test_pixel_format_parse() {
        assert_eq!(PixelFormat::parse("MJPG"), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::parse("yuy2"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::parse("gray"), Some(PixelFormat::Grey));
        assert!(PixelFormat::parse("h264").is_none());
        assert_eq!(PixelFormat::Grey.to_fourcc(), v4l::FourCC::new(b"GREY"));
    }
}
