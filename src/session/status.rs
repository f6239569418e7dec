use std::fmt;

use tokio::sync::mpsc;

use crate::transcript::TranscriptTurn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Closing,
}

/// User-visible progress of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Streaming,
    Closing,
    Idle,
    /// A fatal problem; the session is being torn down.
    Error(String),
    /// A recoverable problem, such as a chunk the output refused.
    Warning(String),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Streaming => f.write_str("streaming"),
            Self::Closing => f.write_str("closing"),
            Self::Idle => f.write_str("idle"),
            Self::Error(msg) => write!(f, "error: {msg}"),
            Self::Warning(msg) => write!(f, "warning: {msg}"),
        }
    }
}

/// Receives status changes and sealed turns from a session.
pub trait StatusSink {
    fn report(&self, status: &SessionStatus);

    fn turn_sealed(&self, _turn: &TranscriptTurn) {}
}

/// Forwards everything as events to a channel, for UIs running elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Status(SessionStatus),
    Turn(TranscriptTurn),
}

impl StatusSink for mpsc::UnboundedSender<SessionEvent> {
    fn report(&self, status: &SessionStatus) {
        let _ = self.send(SessionEvent::Status(status.clone()));
    }

    fn turn_sealed(&self, turn: &TranscriptTurn) {
        let _ = self.send(SessionEvent::Turn(turn.clone()));
    }
}

/// Reports status through the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn report(&self, status: &SessionStatus) {
        match status {
            SessionStatus::Error(_) => tracing::error!("session {status}"),
            SessionStatus::Warning(_) => tracing::warn!("session {status}"),
            _ => tracing::info!("session {status}"),
        }
    }

    fn turn_sealed(&self, turn: &TranscriptTurn) {
        tracing::info!("{}: {}", turn.speaker, turn.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Speaker;

    #[test]
    fn status_text() {
        assert_eq!(SessionStatus::Connecting.to_string(), "connecting");
        assert_eq!(
            SessionStatus::Error("remote closed the session".to_string()).to_string(),
            "error: remote closed the session"
        );
    }

    #[test]
    fn channel_sink_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.report(&SessionStatus::Streaming);
        tx.turn_sealed(&TranscriptTurn {
            speaker: Speaker::User,
            text: "hi".to_string(),
            complete: true,
        });

        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::Status(SessionStatus::Streaming)));
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Turn(turn)) if turn.text == "hi"));
    }
}
