//! V4L2 camera stream and provider

use crate::camera::{
    CameraConfig, CameraConstraints, CameraProvider, CameraStream, Facing, PixelFormat,
    VideoMetadata,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::io;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Highest /dev/videoN index checked during enumeration
const MAX_PROBED_DEVICES: usize = 16;

/// Information about a camera device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraDevice {
    /// Device index (e.g., 0 for /dev/video0)
    pub index: usize,
    /// Device path (e.g., "/dev/video0")
    pub path: String,
    /// Device name reported by the driver
    pub name: String,
    /// Driver name
    pub driver: String,
}

fn open_error(path: &str, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            Error::PermissionDenied(format!("{path}: {err}"))
        }
        _ => Error::DeviceUnavailable(format!("{path}: {err}")),
    }
}

/// List available V4L2 capture devices.
///
/// Fails with `PermissionDenied` when devices exist but none could be opened for that
/// reason, and with `DeviceUnavailable` when there is nothing to open.
pub fn list_devices() -> Result<Vec<CameraDevice>> {
    let mut devices = Vec::new();
    let mut denied = None;

    for index in 0..MAX_PROBED_DEVICES {
        let path = format!("/dev/video{index}");
        let dev = match Device::new(index) {
            Ok(dev) => dev,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                denied = Some(open_error(&path, err));
                continue;
            }
            Err(_) => continue,
        };

        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            devices.push(CameraDevice {
                index,
                path,
                name: caps.card,
                driver: caps.driver,
            });
        }
    }

    if devices.is_empty() {
        return Err(denied.unwrap_or_else(|| {
            Error::DeviceUnavailable("No V4L2 capture devices found".to_string())
        }));
    }

    Ok(devices)
}

/// Find a camera device by name (case-insensitive substring match)
pub fn find_device_by_name(name: &str) -> Result<CameraDevice> {
    let name_lower = name.to_lowercase();
    list_devices()?
        .into_iter()
        .find(|d| d.name.to_lowercase().contains(&name_lower))
        .ok_or_else(|| Error::DeviceUnavailable(format!("No device matching '{name}'")))
}

/// Longest a single dequeue blocks before the capture lock is released
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

/// Memory-mapped stream plus the device it borrows from
struct CameraInner {
    /// Declared first so it drops before the device
    stream: MmapStream<'static>,
    _device: Box<Device>,
}

/// Negotiated frame shape used to turn raw buffers into images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Pixel format the driver accepted
    pub format: PixelFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl FrameLayout {
    /// Convert one dequeued buffer into an image
    pub fn decode(&self, buf: &[u8]) -> Result<DynamicImage> {
        match self.format {
            PixelFormat::Mjpeg => {
                image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                    .map_err(|e| Error::Image(format!("MJPEG decode failed: {e}")))
            }
            // Barcode decoding only needs luma: keep every Y sample of Y0 U Y1 V
            PixelFormat::Yuyv => {
                let luma: Vec<u8> = buf.iter().step_by(2).copied().collect();
                self.gray_image(luma)
            }
            PixelFormat::Grey => self.gray_image(buf.to_vec()),
        }
    }

    fn gray_image(&self, mut luma: Vec<u8>) -> Result<DynamicImage> {
        luma.truncate(self.width as usize * self.height as usize);
        GrayImage::from_raw(self.width, self.height, luma)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| Error::Image("Short frame buffer".to_string()))
    }
}

/// Dequeue one buffer, blocking the calling thread.
///
/// The lock is dropped after every timed-out poll so `stop` can take the stream.
fn dequeue(inner: &Mutex<Option<CameraInner>>) -> Result<Vec<u8>> {
    loop {
        let mut guard = inner
            .lock()
            .map_err(|_| Error::FrameCapture("camera mutex poisoned".to_string()))?;
        let camera = guard
            .as_mut()
            .ok_or_else(|| Error::FrameCapture("stream stopped".to_string()))?;

        match camera.stream.next() {
            Ok((buf, _meta)) => return Ok(buf.to_vec()),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                continue;
            }
            Err(e) => return Err(Error::FrameCapture(format!("Failed to capture: {e}"))),
        }
    }
}

/// An open V4L2 capture stream
pub struct V4lCamera {
    inner: Arc<Mutex<Option<CameraInner>>>,
    info: CameraDevice,
    layout: FrameLayout,
}

impl V4lCamera {
    /// Open and configure a device
    pub fn open(info: CameraDevice, config: &CameraConfig) -> Result<Self> {
        tracing::info!("Opening camera: {} at {}", info.name, info.path);

        let dev = Device::new(info.index).map_err(|e| open_error(&info.path, e))?;

        let mut fmt = dev
            .format()
            .map_err(|e| Error::Camera(format!("Failed to get format: {e}")))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = config.format.to_fourcc();

        // Drivers may substitute a nearby resolution
        let actual = dev
            .set_format(&fmt)
            .map_err(|e| Error::Camera(format!("Failed to set format: {e}")))?;
        if actual.fourcc != fmt.fourcc {
            return Err(Error::Camera(format!(
                "{} does not support {:?}",
                info.name, config.format
            )));
        }

        let mut params = dev
            .params()
            .map_err(|e| Error::Camera(format!("Failed to get params: {e}")))?;
        params.interval = v4l::Fraction::new(1, config.fps.max(1));
        dev.set_params(&params)
            .map_err(|e| Error::Camera(format!("Failed to set params: {e}")))?;

        tracing::info!(
            width = actual.width,
            height = actual.height,
            fps = config.fps,
            format = ?config.format,
            "Camera configured"
        );

        let device = Box::new(dev);
        // SAFETY: the boxed device lives inside CameraInner next to the stream and is dropped after it.
        let static_device: &'static Device =
            unsafe { mem::transmute::<&Device, &'static Device>(device.as_ref()) };

        let mut stream =
            MmapStream::with_buffers(static_device, Type::VideoCapture, config.buffer_count.max(2))
                .map_err(|e| Error::Camera(format!("Failed to create stream: {e}")))?;
        stream.set_timeout(DEQUEUE_TIMEOUT);

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(CameraInner {
                stream,
                _device: device,
            }))),
            info,
            layout: FrameLayout {
                format: config.format,
                width: actual.width,
                height: actual.height,
            },
        })
    }

    /// Device information
    pub fn info(&self) -> &CameraDevice {
        &self.info
    }

    /// Negotiated frame shape
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    async fn grab(&self) -> Result<DynamicImage> {
        let inner = Arc::clone(&self.inner);
        let layout = self.layout;
        tokio::task::spawn_blocking(move || layout.decode(&dequeue(&inner)?))
            .await
            .map_err(|e| Error::FrameCapture(format!("capture task failed: {e}")))?
    }
}

#[async_trait]
impl CameraStream for V4lCamera {
    fn label(&self) -> String {
        format!("{} ({})", self.info.name, self.info.path)
    }

    async fn wait_ready(&self) -> Result<VideoMetadata> {
        // The first dequeued buffer proves the stream is delivering
        self.grab().await?;
        Ok(VideoMetadata {
            width: self.layout.width,
            height: self.layout.height,
        })
    }

    async fn capture_frame(&self) -> Result<DynamicImage> {
        self.grab().await
    }

    fn stop(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if guard.take().is_some() {
            tracing::info!(camera = %self.info.path, "Camera stream stopped");
        }
    }

    fn live_tracks(&self) -> usize {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        usize::from(guard.is_some())
    }
}

/// Opens V4L2 devices according to a [`CameraConfig`]
#[derive(Debug, Clone, Default)]
pub struct V4lCameraProvider {
    config: CameraConfig,
}

impl V4lCameraProvider {
    /// Create a provider
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    fn candidates(&self, facing: Facing) -> Result<Vec<CameraDevice>> {
        if let Some(ref name) = self.config.device_name {
            return Ok(vec![find_device_by_name(name)?]);
        }
        let devices = list_devices()?;
        if let Some(index) = self.config.device_index {
            return devices
                .into_iter()
                .find(|d| d.index == index)
                .map(|d| vec![d])
                .ok_or_else(|| {
                    Error::DeviceUnavailable(format!("Device /dev/video{index} not found"))
                });
        }

        let selected: Vec<CameraDevice> = match facing {
            Facing::Any => devices,
            Facing::Environment => devices
                .into_iter()
                .filter(|d| self.config.looks_rear_facing(&d.name))
                .collect(),
            Facing::User => devices
                .into_iter()
                .filter(|d| !self.config.looks_rear_facing(&d.name))
                .collect(),
        };

        if selected.is_empty() {
            return Err(Error::DeviceUnavailable(format!(
                "No camera matches facing mode {facing:?}"
            )));
        }
        Ok(selected)
    }
}

#[async_trait]
impl CameraProvider for V4lCameraProvider {
    async fn acquire(&self, constraints: CameraConstraints) -> Result<Arc<dyn CameraStream>> {
        let mut last_error = None;
        for info in self.candidates(constraints.facing)? {
            match V4lCamera::open(info, &self.config) {
                Ok(camera) => return Ok(Arc::new(camera)),
                Err(err) => {
                    tracing::warn!("Failed to open camera: {err}");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::DeviceUnavailable("No camera could be opened".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_error_mapping() {
        let err = open_error(
            "/dev/video0",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, Error::PermissionDenied(_)));
        let err = open_error("/dev/video9", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, Error::DeviceUnavailable(_)));
    }

    #[test]
    fn test_yuyv_keeps_luma_samples() {
        let layout = FrameLayout {
            format: PixelFormat::Yuyv,
            width: 2,
            height: 2,
        };
        let buf = [10, 128, 20, 128, 30, 90, 40, 90];
        let frame = layout.decode(&buf).unwrap();
        assert_eq!(frame.to_luma8().into_raw(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_grey_frame_ignores_trailing_padding() {
        let layout = FrameLayout {
            format: PixelFormat::Grey,
            width: 3,
            height: 1,
        };
        let frame = layout.decode(&[1, 2, 3, 0, 0]).unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 1));
        assert_eq!(frame.to_luma8().into_raw(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bad_frames_are_image_errors() {
        let grey = FrameLayout {
            format: PixelFormat::Grey,
            width: 4,
            height: 4,
        };
        assert!(matches!(grey.decode(&[0; 8]), Err(Error::Image(_))));

        let yuyv = FrameLayout {
            format: PixelFormat::Yuyv,
            ..grey
        };
        // 16 bytes of YUYV only carry 8 luma samples
        assert!(matches!(yuyv.decode(&[0; 16]), Err(Error::Image(_))));

        let mjpeg = FrameLayout {
            format: PixelFormat::Mjpeg,
            ..grey
        };
        let truncated = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        assert!(matches!(mjpeg.decode(&truncated), Err(Error::Image(_))));
    }

    #[test]
    fn test_dequeue_from_stopped_stream() {
        let inner = Mutex::new(None);
        assert!(matches!(dequeue(&inner), Err(Error::FrameCapture(_))));
    }

    #[tokio::test]
    async fn test_acquire_any_camera() {
        // Only meaningful on machines with a webcam
        let provider = V4lCameraProvider::default();
        match provider
            .acquire(CameraConstraints {
                facing: Facing::Any,
            })
            .await
        {
            Ok(stream) => {
                println!("Opened camera: {}", stream.label());
                stream.stop();
                stream.stop();
                assert_eq!(stream.live_tracks(), 0);
            }
            Err(e) => {
                println!("No camera available (expected on CI): {e}");
            }
        }
    }
}
