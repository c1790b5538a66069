//! Barcode decoding against live frames
//!
//! [`BarcodeDecoder`] is the per-frame recognition engine. [`DecodeSubscription`]
//! turns it into a lazy, cancelable stream of [`DecodeAttempt`]s by pulling
//! frames from a [`CameraStream`] on a background task.

mod grid;

pub use grid::RqrrDecoder;

use crate::camera::CameraStream;
use crate::error::{Error, Result};
use crate::geometry::{CoordinateSpace, Point};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Attempts buffered between the frame loop and the session
const ATTEMPT_BUFFER: usize = 4;

/// Symbology of a decoded barcode
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BarcodeFormat {
    /// PDF417 stacked linear code
    Pdf417,
    /// QR code
    QrCode,
    /// Anything else, by name
    Other(String),
}

impl BarcodeFormat {
    /// Canonical tag used in scan records
    pub fn as_str(&self) -> &str {
        match self {
            BarcodeFormat::Pdf417 => "pdf417",
            BarcodeFormat::QrCode => "qr_code",
            BarcodeFormat::Other(name) => name,
        }
    }
}

impl From<String> for BarcodeFormat {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().replace('-', "_").as_str() {
            "pdf417" | "pdf_417" => BarcodeFormat::Pdf417,
            "qr_code" | "qrcode" | "qr" => BarcodeFormat::QrCode,
            _ => BarcodeFormat::Other(value),
        }
    }
}

impl From<BarcodeFormat> for String {
    fn from(value: BarcodeFormat) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One successful decode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeResult {
    /// Decoded text
    pub text: String,
    /// Corner or landmark points, in the decoder's coordinate space
    pub points: Vec<Point>,
    /// Symbology
    pub format: BarcodeFormat,
}

/// Per-frame recognition engine
pub trait BarcodeDecoder: Send + Sync + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Space the returned points are expressed in
    fn coordinate_space(&self) -> CoordinateSpace {
        CoordinateSpace::Pixel
    }

    /// Called before a subscription starts; an error aborts the start.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Decode one frame. `Err(Error::NoBarcodeFound)` when the frame holds nothing.
    fn decode(&self, frame: &DynamicImage) -> Result<DecodeResult>;
}

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// A barcode was decoded
    Decoded(DecodeResult),
    /// Nothing in this frame
    NotFound,
    /// The attempt failed. Fatal failures mean the stream or device is gone.
    Failed {
        /// Whether the session must tear down
        fatal: bool,
        /// Description for logs and users
        message: String,
    },
}

impl DecodeEvent {
    fn from_decode(outcome: Result<DecodeResult>) -> Self {
        match outcome {
            Ok(result) => DecodeEvent::Decoded(result),
            Err(Error::NoBarcodeFound) => DecodeEvent::NotFound,
            Err(err) => DecodeEvent::Failed {
                fatal: err.ends_decoding(),
                message: err.to_string(),
            },
        }
    }
}

/// A decode event tagged with the subscription that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeAttempt {
    /// Generation of the producing subscription
    pub generation: u64,
    /// What happened
    pub event: DecodeEvent,
}

/// A running frame loop feeding decode attempts to its owner.
///
/// Dropping or cancelling the subscription stops the loop; no attempt is
/// delivered afterwards.
pub struct DecodeSubscription {
    generation: u64,
    rx: mpsc::Receiver<DecodeAttempt>,
    task: JoinHandle<()>,
}

impl DecodeSubscription {
    /// Start decoding frames from `stream`
    pub fn start(
        generation: u64,
        stream: Arc<dyn CameraStream>,
        decoder: Arc<dyn BarcodeDecoder>,
        frame_interval: Duration,
    ) -> Result<Self> {
        decoder
            .prepare()
            .map_err(|e| Error::DecodeFatal(format!("{} failed to start: {e}", decoder.name())))?;

        let (tx, rx) = mpsc::channel(ATTEMPT_BUFFER);
        let task = tokio::spawn(frame_loop(generation, stream, decoder, frame_interval, tx));

        tracing::debug!(generation, "Decoder subscription started");
        Ok(Self {
            generation,
            rx,
            task,
        })
    }

    /// Generation this subscription tags its attempts with
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next attempt. Cancel-safe. `None` once the loop has ended.
    pub async fn recv(&mut self) -> Option<DecodeAttempt> {
        self.rx.recv().await
    }

    /// Stop the frame loop and discard anything still buffered
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.task.abort();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for DecodeSubscription {
    fn drop(&mut self) {
        self.shutdown();
        tracing::debug!(generation = self.generation, "Decoder subscription stopped");
    }
}

impl fmt::Debug for DecodeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeSubscription")
            .field("generation", &self.generation)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

async fn frame_loop(
    generation: u64,
    stream: Arc<dyn CameraStream>,
    decoder: Arc<dyn BarcodeDecoder>,
    frame_interval: Duration,
    tx: mpsc::Sender<DecodeAttempt>,
) {
    loop {
        let event = match stream.capture_frame().await {
            Ok(frame) => {
                let decoder = Arc::clone(&decoder);
                match tokio::task::spawn_blocking(move || decoder.decode(&frame)).await {
                    Ok(outcome) => DecodeEvent::from_decode(outcome),
                    Err(err) => DecodeEvent::Failed {
                        fatal: false,
                        message: format!("decoder task failed: {err}"),
                    },
                }
            }
            // A corrupt frame is skipped; only a lost stream stops the loop
            Err(err) => DecodeEvent::from_decode(Err(err)),
        };

        let fatal = matches!(event, DecodeEvent::Failed { fatal: true, .. });
        if tx.send(DecodeAttempt { generation, event }).await.is_err() {
            // Owner went away
            break;
        }
        if fatal {
            break;
        }
        if !frame_interval.is_zero() {
            tokio::time::sleep(frame_interval).await;
        }
    }
}
