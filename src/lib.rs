//! pdfscan - camera-driven PDF417 scanning with target-region confirmation
//!
//! This library runs the control loop around a barcode decoder: it opens a
//! camera, feeds frames to a decoder, keeps only detections whose centroid lies
//! inside the on-screen scan window, suppresses duplicates with a cooldown and
//! hands accepted scans to a persistence sink.
//!
//! # Features
//!
//! - **Capture session**: one owner for the camera stream and decoder, with
//!   strict cleanup on pause, reconfigure, failure and dispose
//! - **Geometry filter**: maps decoder coordinates through the displayed
//!   viewport (scaling, normalized points, mirroring)
//! - **Cooldown gate**: single deadline, no stacking
//! - **Scan stores**: in-memory and JSON-lines implementations
//! - **Camera Integration**: Direct V4L2 access behind the `camera` feature
//!
//! # Example
//!
//! ```no_run
//! use pdfscan::camera::{CameraConfig, V4lCameraProvider};
//! use pdfscan::decoder::RqrrDecoder;
//! use pdfscan::session::{CaptureSession, ScannerConfig, SessionParts};
//! use pdfscan::store::{MemoryScanStore, StoreSink};
//! use pdfscan::LayoutOptions;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let parts = SessionParts::new(
//!         Arc::new(V4lCameraProvider::new(CameraConfig::default())),
//!         Arc::new(RqrrDecoder::new()),
//!         Arc::new(StoreSink::new(MemoryScanStore::new())),
//!         Arc::new(LayoutOptions::default().viewport()),
//!     );
//!     let mut session = CaptureSession::new(ScannerConfig::default(), parts)?;
//!     session.enable().await?;
//!
//!     while let Some(outcome) = session.next_outcome().await {
//!         println!("{outcome:?}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod camera;
pub mod config;
pub mod cooldown;
pub mod decoder;
pub mod error;
pub mod feedback;
pub mod geometry;
pub mod logging;
pub mod output;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use error::{Error, Result};

#[cfg(feature = "camera")]
#[cfg_attr(docsrs, doc(cfg(feature = "camera")))]
pub use camera::{CameraConfig, CameraDevice, V4lCameraProvider};

pub use config::{
    CameraOptions, LayoutOptions, LogRotation, LoggingOptions, OutputOptions, PdfscanConfig,
    StorageOptions,
};
pub use cooldown::CooldownGate;
pub use decoder::{BarcodeDecoder, BarcodeFormat, DecodeResult, RqrrDecoder};
pub use geometry::{Point, TargetRegion, ViewportTransform, centroid, is_within_target};
pub use session::{
    CaptureSession, RejectReason, ScanMode, ScanOutcome, ScannerConfig, SessionCommand,
    SessionEvent, SessionParts, SessionState,
};
pub use store::{FileScanStore, MemoryScanStore, Scan, ScanSink, ScanStore, ScanSubmission, StoreSink};
