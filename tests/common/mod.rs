//! Fake camera, decoder and sink implementations shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::DynamicImage;
use pdfscan::camera::{
    CameraConstraints, CameraProvider, CameraStream, Facing, VideoMetadata,
};
use pdfscan::decoder::{BarcodeDecoder, BarcodeFormat, DecodeResult};
use pdfscan::geometry::{DisplayBox, FixedViewport, Layout, Point, TargetRegion};
use pdfscan::session::{CaptureSession, ScannerConfig, SessionParts};
use pdfscan::store::{MemoryScanStore, Scan, ScanSink, ScanSubmission, StoreSink};
use pdfscan::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

/// A stream with one track. Frames only flow when `frames` is set.
pub struct FakeStream {
    label: String,
    live: AtomicBool,
    ready: Option<VideoMetadata>,
    frames: bool,
    /// Frames that fail to convert before good ones arrive
    corrupt: AtomicUsize,
    /// Blocks the calling thread in `wait_ready`, like a driver read with no timeout
    ready_stall: Option<Duration>,
}

impl FakeStream {
    fn build(ready: bool, frames: bool) -> Self {
        Self {
            label: "fake rear camera".to_string(),
            live: AtomicBool::new(true),
            ready: ready.then_some(VideoMetadata {
                width: WIDTH,
                height: HEIGHT,
            }),
            frames,
            corrupt: AtomicUsize::new(0),
            ready_stall: None,
        }
    }

    /// Ready immediately, never produces frames
    pub fn idle() -> Arc<Self> {
        Arc::new(Self::build(true, false))
    }

    /// Ready immediately and produces a blank frame every millisecond
    pub fn streaming() -> Arc<Self> {
        Arc::new(Self::build(true, true))
    }

    /// Opens but never reports ready
    pub fn never_ready() -> Arc<Self> {
        Arc::new(Self::build(false, false))
    }

    /// Streaming, but the first `count` frames are unreadable
    pub fn corrupting(count: usize) -> Arc<Self> {
        let stream = Self::build(true, true);
        stream.corrupt.store(count, Ordering::SeqCst);
        Arc::new(stream)
    }

    /// Holds the thread for `stall` before reporting ready
    pub fn stalling(stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            ready_stall: Some(stall),
            ..Self::build(true, false)
        })
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Simulate the device going away underneath the session
    pub fn unplug(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl CameraStream for FakeStream {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn wait_ready(&self) -> Result<VideoMetadata> {
        if let Some(stall) = self.ready_stall {
            std::thread::sleep(stall);
        }
        match self.ready {
            Some(metadata) => Ok(metadata),
            None => std::future::pending().await,
        }
    }

    async fn capture_frame(&self) -> Result<DynamicImage> {
        if !self.is_live() {
            return Err(Error::FrameCapture("track ended".to_string()));
        }
        if !self.frames {
            return std::future::pending().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        if !self.is_live() {
            return Err(Error::FrameCapture("track ended".to_string()));
        }
        let corrupt = self
            .corrupt
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if corrupt.is_ok() {
            return Err(Error::Image("MJPEG decode failed: truncated".to_string()));
        }
        Ok(DynamicImage::new_luma8(8, 8))
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.is_live())
    }
}

/// How the provider answers one camera request
pub enum Grant {
    Stream(Arc<FakeStream>),
    Deny,
    Unavailable,
    Hang,
}

/// Answers requests from a script, then grants fresh idle streams
#[derive(Default)]
pub struct FakeProvider {
    script: Mutex<VecDeque<Grant>>,
    requests: Mutex<Vec<Facing>>,
    issued: Mutex<Vec<Arc<FakeStream>>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(script: impl IntoIterator<Item = Grant>) -> Arc<Self> {
        let provider = Self::default();
        provider.script.lock().unwrap().extend(script);
        Arc::new(provider)
    }

    /// Facing requested by each acquisition, in order
    pub fn requests(&self) -> Vec<Facing> {
        self.requests.lock().unwrap().clone()
    }

    /// Every stream handed out so far
    pub fn issued(&self) -> Vec<Arc<FakeStream>> {
        self.issued.lock().unwrap().clone()
    }

    /// Tracks still running across every issued stream
    pub fn live_tracks(&self) -> usize {
        self.issued().iter().map(|s| s.live_tracks()).sum()
    }
}

#[async_trait]
impl CameraProvider for FakeProvider {
    async fn acquire(&self, constraints: CameraConstraints) -> Result<Arc<dyn CameraStream>> {
        self.requests.lock().unwrap().push(constraints.facing);
        let grant = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Grant::Stream(FakeStream::idle()));

        match grant {
            Grant::Stream(stream) => {
                self.issued.lock().unwrap().push(Arc::clone(&stream));
                Ok(stream)
            }
            Grant::Deny => Err(Error::PermissionDenied("user dismissed the prompt".to_string())),
            Grant::Unavailable => Err(Error::DeviceUnavailable("no rear camera".to_string())),
            Grant::Hang => std::future::pending().await,
        }
    }
}

/// Returns queued results in order, then `NoBarcodeFound`
#[derive(Default)]
pub struct ScriptedDecoder {
    queue: Mutex<VecDeque<Result<DecodeResult>>>,
    calls: AtomicUsize,
}

impl ScriptedDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Result<DecodeResult>) {
        self.queue.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BarcodeDecoder for ScriptedDecoder {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn decode(&self, _frame: &DynamicImage) -> Result<DecodeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(Error::NoBarcodeFound))
    }
}

/// A sink whose backing storage is down
pub struct FailingSink;

#[async_trait]
impl ScanSink for FailingSink {
    async fn submit(&self, _submission: ScanSubmission) -> Result<Scan> {
        Err(Error::Persistence("database is unreachable".to_string()))
    }
}

/// Scan window (100,100)-(300,200) over a 640x480 video drawn at native size
pub fn layout() -> Layout {
    Layout {
        region: TargetRegion::new(100.0, 100.0, 200.0, 100.0),
        display: DisplayBox::new(0.0, 0.0, WIDTH as f64, HEIGHT as f64),
    }
}

/// Two corner points whose centroid is `(x, y)`
pub fn points_around(x: f64, y: f64) -> Vec<Point> {
    vec![Point::new(x - 20.0, y - 8.0), Point::new(x + 20.0, y + 8.0)]
}

pub fn pdf417(text: &str, x: f64, y: f64) -> DecodeResult {
    DecodeResult {
        text: text.to_string(),
        points: points_around(x, y),
        format: BarcodeFormat::Pdf417,
    }
}

/// A session plus handles on its fakes
pub struct Harness {
    pub session: CaptureSession,
    pub provider: Arc<FakeProvider>,
    pub decoder: Arc<ScriptedDecoder>,
    pub store: MemoryScanStore,
}

impl Harness {
    pub fn new(config: ScannerConfig) -> Self {
        Self::with_provider(config, FakeProvider::new())
    }

    pub fn with_provider(config: ScannerConfig, provider: Arc<FakeProvider>) -> Self {
        let decoder = ScriptedDecoder::new();
        let store = MemoryScanStore::new();
        let parts = SessionParts::new(
            provider.clone(),
            decoder.clone(),
            Arc::new(StoreSink::new(store.clone())),
            Arc::new(FixedViewport(layout())),
        );
        let session = CaptureSession::new(config, parts).expect("valid config");
        Self {
            session,
            provider,
            decoder,
            store,
        }
    }

    pub fn with_sink(config: ScannerConfig, sink: Arc<dyn ScanSink>) -> Self {
        let provider = FakeProvider::new();
        let decoder = ScriptedDecoder::new();
        let parts = SessionParts::new(
            provider.clone(),
            decoder.clone(),
            sink,
            Arc::new(FixedViewport(layout())),
        );
        let session = CaptureSession::new(config, parts).expect("valid config");
        Self {
            session,
            provider,
            decoder,
            store: MemoryScanStore::new(),
        }
    }
}

/// Settings with a cooldown long enough to never lapse during a test
pub fn config() -> ScannerConfig {
    ScannerConfig {
        cooldown_duration_ms: 60_000,
        frame_interval_ms: 0,
        ..Default::default()
    }
}
