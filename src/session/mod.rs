//! Capture session: camera lifecycle plus the decode-confirm-persist loop
//!
//! A [`CaptureSession`] exclusively owns at most one [`CameraHandle`] and at
//! most one [`DecodeSubscription`]. Every method takes `&mut self`, so decode
//! attempts, cooldown checks and intent changes are serialised by the borrow
//! checker rather than by locks. Attempts carry the generation of the
//! subscription that produced them; anything from an older subscription, or
//! arriving while the session is not scanning, is ignored.
//!
//! ```text
//! Idle -> Initializing -> Scanning <-> Paused
//!              |             |            |
//!              +-----> Error <------------+      dispose: any -> Idle
//! ```

mod config;
mod driver;

pub use config::{ScanMode, ScannerConfig};
pub use driver::{SessionCommand, run};

use crate::camera::{CameraConstraints, CameraHandle, CameraProvider, CameraStream, Facing};
use crate::cooldown::CooldownGate;
use crate::decoder::{BarcodeDecoder, DecodeAttempt, DecodeEvent, DecodeResult, DecodeSubscription};
use crate::error::{Error, Result};
use crate::feedback::{Feedback, Silent};
use crate::geometry::{Viewport, ViewportTransform, is_within_target};
use crate::store::{Scan, ScanSink, ScanSubmission};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the session event channel
const EVENT_CAPACITY: usize = 64;

/// Lifecycle state of a capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No stream, no permission
    Idle,
    /// Camera request or stream setup in flight
    Initializing,
    /// Stream open, decoder running
    Scanning,
    /// Stream open, decoder stopped
    Paused,
    /// Failed; everything released. Retry with [`CaptureSession::enable`].
    Error(String),
}

impl SessionState {
    /// Whether the camera stream is open
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Scanning | SessionState::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Initializing => f.write_str("initializing"),
            SessionState::Scanning => f.write_str("scanning"),
            SessionState::Paused => f.write_str("paused"),
            SessionState::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Why a decoded barcode was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Fewer than two result points
    InsufficientGeometry,
    /// Centroid outside the scan window
    OutOfTarget,
    /// Text does not match the data pattern
    PatternMismatch,
    /// Cooldown still running
    CoolingDown,
}

/// What the session did with one decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Handed to the sink and stored
    Accepted(Scan),
    /// Decoded but not accepted
    Rejected(RejectReason),
    /// Nothing in the frame
    NoDetection,
    /// Recoverable decoder noise
    Transient(String),
    /// Accepted but the sink refused it; scanning continues
    PersistenceFailed(String),
    /// The session failed and tore down
    Failed(String),
    /// Stale or arrived while not scanning
    Ignored,
}

/// Notifications for whoever renders the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The lifecycle state changed
    StateChanged {
        /// New state
        state: SessionState,
    },
    /// A scan was accepted and stored
    ScanAccepted {
        /// Stored record
        scan: Scan,
    },
    /// The sink rejected an accepted scan
    PersistenceFailed {
        /// Sink error
        message: String,
    },
    /// The session failed and released its resources
    Failed {
        /// Error description
        message: String,
    },
}

/// External collaborators a session is wired to
#[derive(Clone)]
pub struct SessionParts {
    /// Opens camera streams
    pub camera: Arc<dyn CameraProvider>,
    /// Per-frame barcode engine
    pub decoder: Arc<dyn BarcodeDecoder>,
    /// Receives accepted scans
    pub sink: Arc<dyn ScanSink>,
    /// Current on-screen layout
    pub viewport: Arc<dyn Viewport>,
    /// Confirmation signal
    pub feedback: Arc<dyn Feedback>,
}

impl SessionParts {
    /// Wire the required collaborators, with no audible feedback
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        decoder: Arc<dyn BarcodeDecoder>,
        sink: Arc<dyn ScanSink>,
        viewport: Arc<dyn Viewport>,
    ) -> Self {
        Self {
            camera,
            decoder,
            sink,
            viewport,
            feedback: Arc::new(Silent),
        }
    }

    /// Replace the feedback implementation
    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = feedback;
        self
    }
}

/// The capture-and-decode state machine
pub struct CaptureSession {
    state: SessionState,
    config: ScannerConfig,
    matcher: Option<Regex>,
    parts: SessionParts,
    handle: Option<CameraHandle>,
    subscription: Option<DecodeSubscription>,
    gate: CooldownGate,
    generation: u64,
    events: broadcast::Sender<SessionEvent>,
}

impl CaptureSession {
    /// Create an idle session. Fails if `config.data_pattern` does not compile.
    pub fn new(config: ScannerConfig, parts: SessionParts) -> Result<Self> {
        let matcher = config.compile_pattern()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            state: SessionState::Idle,
            config,
            matcher,
            parts,
            handle: None,
            subscription: None,
            gate: CooldownGate::new(),
            generation: 0,
            events,
        })
    }

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current settings
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// The open camera, if any
    pub fn camera(&self) -> Option<&CameraHandle> {
        self.handle.as_ref()
    }

    /// Generation of the running decoder subscription
    pub fn subscription_generation(&self) -> Option<u64> {
        self.subscription.as_ref().map(DecodeSubscription::generation)
    }

    /// Whether the cooldown is currently suppressing accepts
    pub fn is_cooling_down(&self) -> bool {
        self.gate.is_armed()
    }

    /// Receive lifecycle and scan notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No listeners is fine
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "Session state change");
        self.state = state.clone();
        self.emit(SessionEvent::StateChanged { state });
    }

    /// Turn the camera on and start scanning.
    ///
    /// From `Idle` or `Error` this requests the camera, waits for the first frame and
    /// starts the decoder. On failure every partially acquired resource is released
    /// before the session enters `Error` and the error is returned. No-op when active.
    pub async fn enable(&mut self) -> Result<()> {
        if self.state.is_active() {
            return Ok(());
        }

        self.set_state(SessionState::Initializing);
        match self.open_camera().await {
            Ok(handle) => {
                info!(camera = %handle.stream().label(), metadata = ?handle.metadata(), "Camera ready");
                self.handle = Some(handle);
            }
            Err(err) => return Err(self.fail(err)),
        }

        if let Err(err) = self.start_decoding() {
            return Err(self.fail(err));
        }
        Ok(())
    }

    /// Stop the decoder, keep the stream open
    pub fn pause(&mut self) {
        if self.state != SessionState::Scanning {
            trace!(state = %self.state, "Pause ignored");
            return;
        }
        self.stop_decoding();
        self.set_state(SessionState::Paused);
    }

    /// Restart the decoder against the still-open stream
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            SessionState::Paused => {
                if let Err(err) = self.start_decoding() {
                    return Err(self.fail(err));
                }
                Ok(())
            }
            SessionState::Scanning => Ok(()),
            _ => Err(Error::Other(format!(
                "cannot resume a session that is {}",
                self.state
            ))),
        }
    }

    /// Apply the UI's scanning intent: on enables or resumes, off pauses
    pub async fn set_scanning(&mut self, scanning: bool) -> Result<()> {
        match (scanning, &self.state) {
            (true, SessionState::Paused) => self.resume(),
            (true, _) => self.enable().await,
            (false, _) => {
                self.pause();
                Ok(())
            }
        }
    }

    /// Swap in new settings.
    ///
    /// An invalid pattern is rejected and leaves the session untouched. On an active
    /// session the decoder is torn down and restarted against the new settings while
    /// the camera stream is reused; a paused session stays paused. A running cooldown
    /// keeps its original deadline.
    pub async fn reconfigure(&mut self, config: ScannerConfig) -> Result<()> {
        let matcher = config.compile_pattern()?;
        let resume_scanning = match self.state {
            SessionState::Scanning => Some(true),
            SessionState::Paused => Some(false),
            _ => None,
        };

        info!(
            cooldown_ms = config.cooldown_duration_ms,
            pattern = %config.data_pattern,
            mirror = config.mirror_horizontal,
            mode = ?config.scan_mode,
            "Applying scanner settings"
        );
        self.config = config;
        self.matcher = matcher;

        let Some(resume_scanning) = resume_scanning else {
            return Ok(());
        };

        self.set_state(SessionState::Initializing);
        self.stop_decoding();
        if resume_scanning {
            if let Err(err) = self.start_decoding() {
                return Err(self.fail(err));
            }
        } else {
            self.set_state(SessionState::Paused);
        }
        Ok(())
    }

    /// Release everything and return to `Idle`. Safe to call any number of times.
    pub fn dispose(&mut self) {
        self.teardown();
        if self.state != SessionState::Idle {
            info!("Capture session disposed");
            self.set_state(SessionState::Idle);
        }
    }

    /// Wait for the next decode attempt. Cancel-safe.
    ///
    /// Pends forever while no decoder is running, which suits `tokio::select!`.
    pub async fn next_decode(&mut self) -> DecodeAttempt {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        let generation = subscription.generation();
        match subscription.recv().await {
            Some(attempt) => attempt,
            None => DecodeAttempt {
                generation,
                event: DecodeEvent::Failed {
                    fatal: true,
                    message: "decoder stopped unexpectedly".to_string(),
                },
            },
        }
    }

    /// Wait for and handle the next attempt. `None` while not scanning.
    pub async fn next_outcome(&mut self) -> Option<ScanOutcome> {
        self.subscription.as_ref()?;
        let attempt = self.next_decode().await;
        Some(self.handle_decode(attempt).await)
    }

    /// Run one decode attempt through the accept pipeline
    pub async fn handle_decode(&mut self, attempt: DecodeAttempt) -> ScanOutcome {
        if self.state != SessionState::Scanning
            || self.subscription_generation() != Some(attempt.generation)
        {
            trace!(
                generation = attempt.generation,
                state = %self.state,
                "Dropping stale decode attempt"
            );
            return ScanOutcome::Ignored;
        }

        match attempt.event {
            DecodeEvent::NotFound => ScanOutcome::NoDetection,
            DecodeEvent::Failed {
                fatal: false,
                message,
            } => {
                debug!("Decoder noise: {message}");
                ScanOutcome::Transient(message)
            }
            DecodeEvent::Failed {
                fatal: true,
                message,
            } => {
                let err = self.fail(Error::DecodeFatal(message));
                ScanOutcome::Failed(err.to_string())
            }
            DecodeEvent::Decoded(result) => self.consider(result).await,
        }
    }

    async fn consider(&mut self, result: DecodeResult) -> ScanOutcome {
        if result.points.len() < 2 {
            return ScanOutcome::Rejected(RejectReason::InsufficientGeometry);
        }

        let Some(metadata) = self.handle.as_ref().and_then(CameraHandle::metadata) else {
            let err = self.fail(Error::DecodeFatal("camera stream missing".to_string()));
            return ScanOutcome::Failed(err.to_string());
        };
        let Some(layout) = self.parts.viewport.layout(metadata.width, metadata.height) else {
            let err = self.fail(Error::VideoElementLost);
            return ScanOutcome::Failed(err.to_string());
        };

        let transform = ViewportTransform::new(layout.display, metadata.width, metadata.height)
            .with_space(self.parts.decoder.coordinate_space())
            .with_mirrored(self.config.mirror_horizontal);
        if !is_within_target(&result.points, &layout.region, &transform) {
            trace!(format = %result.format, "Detection outside target region");
            return ScanOutcome::Rejected(RejectReason::OutOfTarget);
        }

        if let Some(ref matcher) = self.matcher {
            if !matcher.is_match(&result.text) {
                debug!(format = %result.format, "Detection does not match data pattern");
                return ScanOutcome::Rejected(RejectReason::PatternMismatch);
            }
        }

        if !self.gate.try_accept() {
            return ScanOutcome::Rejected(RejectReason::CoolingDown);
        }
        self.gate.arm(self.config.cooldown());

        let submission = ScanSubmission {
            content: result.text,
            format: result.format.to_string(),
            pattern: self.config.pattern_tag(),
        };

        match self.parts.sink.submit(submission).await {
            Ok(scan) => {
                info!(id = %scan.id, format = %scan.format, bytes = scan.content.len(), "Scan accepted");
                if let Err(err) = self.parts.feedback.confirm() {
                    debug!("Confirmation feedback failed: {err}");
                }
                self.emit(SessionEvent::ScanAccepted { scan: scan.clone() });
                if self.config.scan_mode == ScanMode::SingleShot {
                    self.pause();
                }
                ScanOutcome::Accepted(scan)
            }
            Err(err) => {
                // The cooldown stays armed; the barcode is not re-queued
                warn!("Scan sink rejected scan: {err}");
                let message = err.to_string();
                self.emit(SessionEvent::PersistenceFailed {
                    message: message.clone(),
                });
                ScanOutcome::PersistenceFailed(message)
            }
        }
    }

    async fn acquire_stream(&self) -> Result<Arc<dyn CameraStream>> {
        let preferred = if self.config.prefer_rear_camera {
            Facing::Environment
        } else {
            Facing::Any
        };
        let camera = Arc::clone(&self.parts.camera);
        let fallback = self.config.fallback_any_camera && preferred != Facing::Any;

        let request = async move {
            match camera.acquire(CameraConstraints { facing: preferred }).await {
                Err(Error::DeviceUnavailable(reason)) if fallback => {
                    warn!("Preferred camera unavailable ({reason}), falling back to any camera");
                    camera
                        .acquire(CameraConstraints {
                            facing: Facing::Any,
                        })
                        .await
                }
                other => other,
            }
        };

        let timeout = self.config.permission_timeout();
        time::timeout(timeout, request).await.map_err(|_| {
            Error::DeviceUnavailable(format!(
                "camera request timed out after {} ms",
                timeout.as_millis()
            ))
        })?
    }

    async fn open_camera(&self) -> Result<CameraHandle> {
        let mut handle = CameraHandle::new(self.acquire_stream().await?);

        // Dropping the handle on any early return stops the stream
        let stream = Arc::clone(handle.stream());
        // On its own task so a driver that stalls its thread cannot hold up the timer
        let mut ready = tokio::spawn(async move { stream.wait_ready().await });
        let timeout = self.config.video_ready_timeout();
        let metadata = match time::timeout(timeout, &mut ready).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => {
                return Err(Error::Camera(format!("video readiness check failed: {join}")));
            }
            Err(_) => {
                ready.abort();
                return Err(Error::VideoLoadTimeout(self.config.video_ready_timeout_ms));
            }
        };
        handle.set_metadata(metadata);
        Ok(handle)
    }

    fn start_decoding(&mut self) -> Result<()> {
        let stream = match self.handle.as_ref() {
            Some(handle) if handle.stream().live_tracks() > 0 => Arc::clone(handle.stream()),
            Some(_) => return Err(Error::DecodeFatal("camera stream was lost".to_string())),
            None => return Err(Error::DecodeFatal("no camera stream".to_string())),
        };

        self.stop_decoding();
        self.generation += 1;
        let subscription = DecodeSubscription::start(
            self.generation,
            stream,
            Arc::clone(&self.parts.decoder),
            self.config.frame_interval(),
        )?;
        self.subscription = Some(subscription);
        self.set_state(SessionState::Scanning);
        Ok(())
    }

    fn stop_decoding(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    fn teardown(&mut self) {
        self.stop_decoding();
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
        self.gate.clear();
    }

    /// Tear down, enter `Error`, report once, hand the error back
    fn fail(&mut self, err: Error) -> Error {
        error!("Capture session failed: {err}");
        self.teardown();
        let message = err.to_string();
        self.set_state(SessionState::Error(message.clone()));
        self.emit(SessionEvent::Failed { message });
        err
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("camera", &self.handle)
            .field("subscription", &self.subscription)
            .field("gate", &self.gate)
            .finish()
    }
}
