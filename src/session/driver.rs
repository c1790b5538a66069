//! Command loop that owns a session and reacts to intents and decode attempts

use crate::session::{CaptureSession, ScanOutcome, ScannerConfig};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Intents sent by the UI or daemon to a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Request the camera and start scanning
    Enable,
    /// Stop the decoder, keep the stream
    Pause,
    /// Restart the decoder
    Resume,
    /// Scanning intent flag
    SetScanning(bool),
    /// Settings changed
    Reconfigure(ScannerConfig),
    /// Tear everything down and stop the loop
    Dispose,
}

/// Drive `session` until a `Dispose` command arrives or every command sender is dropped.
///
/// Commands and decode attempts are handled one at a time in arrival order.
/// Failures are reported through [`CaptureSession::subscribe`] events; the loop keeps
/// running so the user can retry with `Enable`.
pub async fn run(mut session: CaptureSession, mut commands: mpsc::Receiver<SessionCommand>) {
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("Command channel closed");
                    break;
                };
                if command == SessionCommand::Dispose {
                    break;
                }
                apply(&mut session, command).await;
            }
            attempt = session.next_decode() => {
                if let ScanOutcome::Failed(message) = session.handle_decode(attempt).await {
                    debug!("Session stopped scanning: {message}");
                }
            }
        }
    }
    session.dispose();
}

async fn apply(session: &mut CaptureSession, command: SessionCommand) {
    let result = match command {
        SessionCommand::Enable => session.enable().await,
        SessionCommand::Pause => {
            session.pause();
            Ok(())
        }
        SessionCommand::Resume => session.resume(),
        SessionCommand::SetScanning(scanning) => session.set_scanning(scanning).await,
        SessionCommand::Reconfigure(config) => session.reconfigure(config).await,
        SessionCommand::Dispose => {
            session.dispose();
            Ok(())
        }
    };
    match result {
        Ok(()) => {}
        // Already reported through a Failed event
        Err(err) if err.is_fatal_to_session() => debug!("Session command failed: {err}"),
        Err(err) => warn!("Session command failed: {err}"),
    }
}
