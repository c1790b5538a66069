//! Helpers for rendering and distributing structured scan output

#[cfg(target_family = "unix")]
pub mod unix;

use crate::session::SessionEvent;
use crate::store::Scan;
use serde_json::{Value, json};

/// Combined structured and human-readable representation of an event
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Structured JSON representation suitable for downstream consumers
    pub json: Value,
    /// Human-readable lines for terminal presentation
    pub human: Vec<String>,
}

/// Render a session event into both JSON and human-readable forms.
pub fn render_event(event: &SessionEvent) -> Rendered {
    let json = serde_json::to_value(event)
        .unwrap_or_else(|err| json!({ "event": "error", "message": err.to_string() }));

    let human = match event {
        SessionEvent::StateChanged { state } => vec![format!("Scanner {state}")],
        SessionEvent::ScanAccepted { scan } => {
            let mut lines = vec!["Barcode accepted".to_string()];
            lines.extend(scan_lines(scan));
            lines
        }
        SessionEvent::PersistenceFailed { message } => {
            vec![format!("Scan was read but could not be saved: {message}")]
        }
        SessionEvent::Failed { message } => vec![format!("Scanner stopped: {message}")],
    };

    Rendered { json, human }
}

/// Render a stored scan, as listed by `--recent`.
pub fn render_scan(scan: &Scan) -> Rendered {
    let json = serde_json::to_value(scan).unwrap_or(Value::Null);
    let mut human = vec![format!(
        "{} {}",
        scan.timestamp.format("%Y-%m-%d %H:%M:%S"),
        scan.id
    )];
    human.extend(scan_lines(scan).into_iter().skip(1));
    Rendered { json, human }
}

fn scan_lines(scan: &Scan) -> Vec<String> {
    let mut lines = vec![format!("  ID: {}", scan.id)];
    lines.push(format!("  Format: {}", scan.format));
    if let Some(pattern) = &scan.pattern {
        lines.push(format!("  Pattern: {pattern}"));
    }
    lines.push(format!("  Content: {}", format_text_snippet(&scan.content)));
    lines
}

fn format_text_snippet(text: &str) -> String {
    const MAX: usize = 120;
    let total = text.chars().count();
    // AAMVA payloads are multi-line; keep the terminal output on one line
    let flat: String = text
        .chars()
        .take(MAX)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if total <= MAX {
        flat
    } else {
        format!("{flat}... ({total} chars)")
    }
}
