//! Scan barcodes from a webcam into an in-memory history
//!
//! Usage: cargo run --example scan_pdf417 [-- PATTERN]

use pdfscan::camera::{self, CameraConfig, V4lCameraProvider};
use pdfscan::session::{CaptureSession, ScanOutcome, ScannerConfig, SessionParts};
use pdfscan::store::{MemoryScanStore, ScanStore, StoreSink};
use pdfscan::{LayoutOptions, RqrrDecoder};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("pdfscan camera demo");
    println!("===================\n");

    println!("Available cameras:");
    match camera::list_devices() {
        Ok(devices) => {
            for dev in &devices {
                println!("  [{}] {} ({})", dev.index, dev.name, dev.path);
            }
        }
        Err(e) => {
            eprintln!("Error listing cameras: {e}");
            return Ok(());
        }
    }

    let config = ScannerConfig {
        data_pattern: std::env::args().nth(1).unwrap_or_default(),
        ..Default::default()
    };

    let store = MemoryScanStore::new();
    let parts = SessionParts::new(
        Arc::new(V4lCameraProvider::new(CameraConfig::default())),
        Arc::new(RqrrDecoder::new()),
        Arc::new(StoreSink::new(store.clone())),
        Arc::new(LayoutOptions::default().viewport()),
    );
    let mut session = CaptureSession::new(config, parts)?;

    println!("\nOpening camera...");
    session.enable().await?;
    if let Some(handle) = session.camera() {
        println!("Camera ready: {:?}", handle);
    }
    println!("Hold a barcode inside the centre of the frame (Ctrl+C to stop)\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            outcome = session.next_outcome() => match outcome {
                Some(ScanOutcome::Accepted(scan)) => {
                    println!("Accepted [{}] {}", scan.format, scan.content);
                }
                Some(ScanOutcome::Rejected(reason)) => println!("  rejected: {reason:?}"),
                Some(ScanOutcome::Failed(message)) => {
                    eprintln!("Scanner stopped: {message}");
                    break;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    session.dispose();

    let recent = store.list_recent(5).await?;
    println!("\n{} scans this run, latest first:", recent.len());
    for scan in recent {
        println!("  {} {}", scan.timestamp.format("%H:%M:%S"), scan.content);
    }
    Ok(())
}
