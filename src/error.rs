//! Error types for pdfscan operations

use thiserror::Error;

/// Result type alias using pdfscan's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pdfscan operations
#[derive(Error, Debug)]
pub enum Error {
    /// Camera access was refused by the system
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    /// No usable camera could be opened
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The stream opened but never produced ready metadata
    #[error("Video did not become ready within {0} ms")]
    VideoLoadTimeout(u64),

    /// The decoder reported that its stream or device is gone
    #[error("Decoder lost its video source: {0}")]
    DecodeFatal(String),

    /// The rendered video surface disappeared while scanning
    #[error("Video surface is no longer available")]
    VideoElementLost,

    /// The scan sink rejected a write
    #[error("Failed to persist scan: {0}")]
    Persistence(String),

    /// A scan submission was malformed
    #[error("Invalid scan: {0}")]
    Validation(String),

    /// Other camera-related errors
    #[error("Camera error: {0}")]
    Camera(String),

    /// Failed to capture frame from camera
    #[error("Frame capture failed: {0}")]
    FrameCapture(String),

    /// Per-frame decode failure that does not affect the stream
    #[error("Failed to decode barcode: {0}")]
    Decode(String),

    /// No barcode found in frame
    #[error("No barcode found in frame")]
    NoBarcodeFound,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error compromises the camera or decoder and must tear the session down.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Error::PermissionDenied(_)
                | Error::DeviceUnavailable(_)
                | Error::VideoLoadTimeout(_)
                | Error::DecodeFatal(_)
                | Error::VideoElementLost
                | Error::Camera(_)
        )
    }

    /// Whether the frame source or decoder is gone, so no further frame can be tried.
    ///
    /// A single unreadable frame (`Image`, `Decode`) is not.
    pub fn ends_decoding(&self) -> bool {
        matches!(self, Error::DecodeFatal(_) | Error::FrameCapture(_))
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

// V4L errors are converted manually in camera module

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {}", e))
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Config(format!("Invalid data pattern: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::VideoLoadTimeout(10_000).is_fatal_to_session());
        assert!(Error::DecodeFatal("gone".into()).is_fatal_to_session());
        assert!(!Error::NoBarcodeFound.is_fatal_to_session());
        assert!(!Error::Persistence("disk full".into()).is_fatal_to_session());
        assert!(!Error::Validation("empty".into()).is_fatal_to_session());
    }

    #[test]
    fn test_bad_frame_does_not_end_decoding() {
        assert!(Error::FrameCapture("stream stopped".into()).ends_decoding());
        assert!(Error::DecodeFatal("engine crashed".into()).ends_decoding());
        assert!(!Error::Image("MJPEG decode failed: truncated".into()).ends_decoding());
        assert!(!Error::Decode("checksum".into()).ends_decoding());
        assert!(!Error::NoBarcodeFound.ends_decoding());
    }

    #[test]
    fn test_regex_error_maps_to_config() {
        let err: Error = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
    }
}
