//! CLI output handling.
//!
//! Results print either as JSON lines (for scripting) or as short
//! human-readable text. Controller events stream to stderr while a command
//! runs.

use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::QuestError;
use crate::events::QuestEvent;

/// Print a command result.
///
/// In JSON mode the value is written as a single line with a `type` field;
/// otherwise `lines` is printed as is.
pub fn print_result<T: Serialize>(json_mode: bool, kind: &str, value: &T, lines: &[String]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if json_mode {
        let mut json = serde_json::to_value(value)?;
        if let Some(obj) = json.as_object_mut() {
            obj.insert("type".to_string(), serde_json::json!(kind));
        }
        writeln!(stdout, "{}", json)?;
    } else {
        for line in lines {
            writeln!(stdout, "{}", line)?;
        }
    }
    stdout.flush()?;
    Ok(())
}

/// Print a controller error with its classification.
pub fn print_error(json_mode: bool, err: &QuestError) -> Result<()> {
    if json_mode {
        let json = serde_json::json!({
            "type": "error",
            "kind": err.kind(),
            "message": err.to_string(),
        });
        println!("{}", json);
    } else {
        eprintln!("Error [{}]: {}", err.kind(), err);
    }
    Ok(())
}

/// Stream controller events until the channel closes.
///
/// Events are progress, not results: they always go to stderr so stdout only
/// ever carries the command result.
pub async fn run_event_loop(mut event_rx: broadcast::Receiver<QuestEvent>, json_mode: bool) -> Result<()> {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                if json_mode {
                    eprintln!("{}", serde_json::to_string(&event)?);
                } else {
                    eprintln!("{}", describe_event(&event));
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!("[events] Output lagged by {} events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}

fn describe_event(event: &QuestEvent) -> String {
    match event {
        QuestEvent::HostStateChanged { state } => format!("[host] {}", state),
        QuestEvent::SessionChanged {
            connected: true,
            address: Some(address),
        } => format!("[session] connected as {}", address),
        QuestEvent::SessionChanged { connected, .. } => {
            format!("[session] {}", if *connected { "connected" } else { "disconnected" })
        }
        QuestEvent::SwapPhase { swap_id, phase } => {
            let phase = serde_json::to_value(phase)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            format!("[swap] {} {}", swap_id, phase)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SwapPhase;
    use alloy_primitives::Address;

    #[test]
    fn test_describe_events() {
        let event = QuestEvent::SessionChanged {
            connected: true,
            address: Some(Address::repeat_byte(0xaa)),
        };
        assert!(describe_event(&event).starts_with("[session] connected as 0x"));

        let event = QuestEvent::SwapPhase {
            swap_id: uuid::Uuid::nil(),
            phase: SwapPhase::Settling,
        };
        assert_eq!(
            describe_event(&event),
            "[swap] 00000000-0000-0000-0000-000000000000 settling"
        );
    }
}
