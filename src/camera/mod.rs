//! Camera acquisition
//!
//! The capture session only sees [`CameraProvider`] and [`CameraStream`]; the
//! V4L2 implementation lives behind the `camera` feature. A [`CameraHandle`]
//! owns one acquired stream and stops it when released or dropped.

#[cfg(feature = "camera")]
mod config;
#[cfg(feature = "camera")]
mod device;

#[cfg(feature = "camera")]
pub use config::{CameraConfig, PixelFormat};
#[cfg(feature = "camera")]
pub use device::{
    CameraDevice, FrameLayout, V4lCamera, V4lCameraProvider, find_device_by_name, list_devices,
};

use crate::error::Result;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which camera the session would like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Rear-facing ("environment") camera
    #[default]
    Environment,
    /// User-facing camera
    User,
    /// Whatever is available
    Any,
}

/// Constraints passed to a [`CameraProvider`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    /// Preferred facing
    pub facing: Facing,
}

/// Native stream properties reported once the video is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Native frame width
    pub width: u32,
    /// Native frame height
    pub height: u32,
}

/// A live hardware video stream
#[async_trait]
pub trait CameraStream: Send + Sync {
    /// Human readable device label
    fn label(&self) -> String;

    /// Wait until the stream produces frames and report its native size
    async fn wait_ready(&self) -> Result<VideoMetadata>;

    /// Grab the next frame. Fails with `FrameCapture` once the stream has been stopped or
    /// lost. A single unreadable frame is reported as `Image` and capture may continue.
    ///
    /// Implementations backed by blocking reads must move them off the async worker.
    async fn capture_frame(&self) -> Result<DynamicImage>;

    /// Stop every underlying track. Must be idempotent.
    fn stop(&self);

    /// Number of tracks still running
    fn live_tracks(&self) -> usize;
}

/// Something that can open camera streams
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Request camera access and open a stream.
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`.
    async fn acquire(&self, constraints: CameraConstraints) -> Result<Arc<dyn CameraStream>>;
}

/// Exclusive owner of one acquired stream
pub struct CameraHandle {
    stream: Arc<dyn CameraStream>,
    metadata: Option<VideoMetadata>,
}

impl CameraHandle {
    /// Take ownership of a freshly acquired stream
    pub fn new(stream: Arc<dyn CameraStream>) -> Self {
        Self {
            stream,
            metadata: None,
        }
    }

    /// The underlying stream
    pub fn stream(&self) -> &Arc<dyn CameraStream> {
        &self.stream
    }

    /// Native size, once the stream has reported ready
    pub fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata
    }

    pub(crate) fn set_metadata(&mut self, metadata: VideoMetadata) {
        self.metadata = Some(metadata);
    }

    /// Stop all tracks of the stream
    pub fn release(self) {
        // Drop does the work
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.stream.stop();
        tracing::debug!(camera = %self.stream.label(), "Camera stream released");
    }
}

impl fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraHandle")
            .field("label", &self.stream.label())
            .field("metadata", &self.metadata)
            .field("live_tracks", &self.stream.live_tracks())
            .finish()
    }
}
