//! pdfscan daemon entrypoint

#[cfg(not(feature = "camera"))]
compile_error!("pdfscand requires the `camera` feature");

use clap::Parser;
#[cfg(target_family = "unix")]
use pdfscan::output::unix::UnixBroadcast;
use pdfscan::output::{Rendered, render_event, render_scan};
use pdfscan::session::{self, CaptureSession, SessionCommand, SessionEvent, SessionParts};
use pdfscan::store::{DEFAULT_RECENT_LIMIT, FileScanStore, ScanStore, StoreSink};
use pdfscan::{
    Error, PdfscanConfig, Result, RqrrDecoder, ScanMode, V4lCameraProvider, camera, feedback,
    logging,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "pdfscand",
    version,
    about = "Camera PDF417 scanner with target-region confirmation"
)]
struct Cli {
    /// Optional configuration file (toml/yaml). Defaults to pdfscan.{toml,yaml} in cwd/XDG config.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override camera by name (takes precedence over config file)
    #[arg(long, value_name = "NAME")]
    device: Option<String>,

    /// Override camera by index (/dev/videoN)
    #[arg(long, value_name = "INDEX")]
    device_index: Option<usize>,

    /// List detected cameras and exit
    #[arg(long)]
    list_cameras: bool,

    /// Output events as JSON instead of human-readable text
    #[arg(long)]
    json: bool,

    /// Pause after the first accepted scan
    #[arg(long)]
    single_shot: bool,

    /// Duplicate-suppression window in milliseconds
    #[arg(long, value_name = "MS")]
    cooldown_ms: Option<u64>,

    /// Only accept barcodes whose text matches this regular expression
    #[arg(long, value_name = "REGEX")]
    pattern: Option<String>,

    /// The preview is mirrored left-to-right
    #[arg(long)]
    mirror: bool,

    /// Scan history file (JSON lines)
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Print the most recent scans and exit
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "10")]
    recent: Option<usize>,

    /// Delete the scan history and exit
    #[arg(long)]
    clear: bool,

    /// Publish session events over the specified Unix domain socket path
    #[arg(long, value_name = "PATH")]
    unix_socket: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut PdfscanConfig) {
        if let Some(ref name) = self.device {
            config.camera.device_name = Some(name.clone());
            config.camera.device_index = None;
        }
        if let Some(index) = self.device_index {
            config.camera.device_index = Some(index);
            config.camera.device_name = None;
        }
        if self.json {
            config.output.json = true;
        }
        if self.single_shot {
            config.scanner.scan_mode = ScanMode::SingleShot;
        }
        if let Some(ms) = self.cooldown_ms {
            config.scanner.cooldown_duration_ms = ms;
        }
        if let Some(ref pattern) = self.pattern {
            config.scanner.data_pattern = pattern.clone();
        }
        if self.mirror {
            config.scanner.mirror_horizontal = true;
        }
        if let Some(ref path) = self.store {
            config.storage.path = Some(path.clone());
        }
        if let Some(ref socket) = self.unix_socket {
            config.output.unix_socket = Some(socket.clone());
        }
    }
}

struct OutputSinks {
    json: bool,
    #[cfg(target_family = "unix")]
    unix: Option<Arc<UnixBroadcast>>,
}

impl OutputSinks {
    fn emit(&self, rendered: &Rendered) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(&rendered.json)?);
        } else {
            for line in &rendered.human {
                println!("{line}");
            }
        }
        self.send_unix_value(&rendered.json)
    }

    fn send_unix_value(&self, value: &Value) -> Result<()> {
        #[cfg(target_family = "unix")]
        if let Some(unix) = &self.unix {
            unix.send_value(value)?;
        }

        #[cfg(not(target_family = "unix"))]
        let _ = value;

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_cameras {
        return list_cameras();
    }

    let mut config = PdfscanConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    // Flags may have replaced the pattern
    config.scanner.compile_pattern()?;

    logging::init(&config.logging)?;

    let store = FileScanStore::new(config.storage.resolved_path());
    if cli.clear {
        store.clear().await?;
        println!("Cleared {}", store.path().display());
        return Ok(());
    }
    if let Some(limit) = cli.recent {
        return print_recent(&store, limit, config.output.json).await;
    }

    #[cfg(target_family = "unix")]
    let sinks = OutputSinks {
        json: config.output.json,
        unix: match config.output.unix_socket {
            Some(ref path) => Some(UnixBroadcast::bind(path).await?),
            None => None,
        },
    };
    #[cfg(not(target_family = "unix"))]
    let sinks = OutputSinks {
        json: config.output.json,
    };

    let camera_config = config.camera_config()?;
    info!(?camera_config, store = %store.path().display(), "Starting pdfscan scanner");

    let mut parts = SessionParts::new(
        Arc::new(V4lCameraProvider::new(camera_config)),
        Arc::new(RqrrDecoder::new()),
        Arc::new(StoreSink::new(store)),
        Arc::new(config.layout.viewport()),
    );
    if config.output.bell {
        parts = parts.with_feedback(Arc::new(feedback::TerminalBell));
    }

    let session = CaptureSession::new(config.scanner.clone(), parts)?;
    let events = session.subscribe();
    let output_task = tokio::spawn(forward_events(events, sinks));

    let (commands, command_rx) = mpsc::channel(16);
    commands
        .send(SessionCommand::Enable)
        .await
        .map_err(|e| Error::Other(format!("Failed to start session: {e}")))?;
    tokio::spawn(read_console(commands.clone()));
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(err) => warn!("Failed to listen for Ctrl-C: {err}"),
        }
        let _ = commands.send(SessionCommand::Dispose).await;
    });

    session::run(session, command_rx).await;

    // The session is gone, so the event channel closes and the output task drains
    if let Err(err) = output_task.await {
        debug!("Output task ended abnormally: {err}");
    }
    Ok(())
}

fn list_cameras() -> Result<()> {
    match camera::list_devices() {
        Ok(devices) => {
            println!("Discovered cameras:");
            for dev in devices {
                println!("  [{}] {} ({}, {})", dev.index, dev.name, dev.path, dev.driver);
            }
            Ok(())
        }
        Err(Error::DeviceUnavailable(_)) => {
            println!("No V4L2 cameras detected");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn print_recent(store: &FileScanStore, limit: usize, json: bool) -> Result<()> {
    let limit = if limit == 0 { DEFAULT_RECENT_LIMIT } else { limit };
    let scans = store.list_recent(limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&scans)?);
        return Ok(());
    }
    if scans.is_empty() {
        println!("No scans recorded in {}", store.path().display());
    }
    for scan in &scans {
        for line in render_scan(scan).human {
            println!("{line}");
        }
    }
    Ok(())
}

async fn forward_events(mut events: broadcast::Receiver<SessionEvent>, sinks: OutputSinks) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Err(err) = sinks.emit(&render_event(&event)) {
                    warn!("Failed to publish event: {err}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Output fell behind, {skipped} events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `p` pauses, `r` resumes, `q` quits
async fn read_console(commands: mpsc::Sender<SessionCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let command = match line.trim() {
            "p" | "pause" => SessionCommand::Pause,
            "r" | "resume" => SessionCommand::SetScanning(true),
            "q" | "quit" => SessionCommand::Dispose,
            "" => continue,
            other => {
                eprintln!("Unknown command '{other}' (p = pause, r = resume, q = quit)");
                continue;
            }
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }
}
