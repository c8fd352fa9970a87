//! Progress and completion events emitted by export sessions.

use tokio::sync::mpsc;

/// Progress snapshot emitted once per frame delivered downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    pub frame_index: u64,
    pub total_frames: u64,
    /// Integer percentage [0, 100].
    pub percent: u8,
    /// Recent throughput, present once the rolling window has samples.
    pub fps: Option<f64>,
    /// Estimated seconds remaining, derived from the same window.
    pub eta_secs: Option<f64>,
}

impl ExportProgress {
    pub fn new(frame_index: u64, total_frames: u64) -> Self {
        let percent = if total_frames == 0 {
            0
        } else {
            (((frame_index + 1) * 100) / total_frames).min(100) as u8
        };
        Self {
            frame_index,
            total_frames,
            percent,
            fps: None,
            eta_secs: None,
        }
    }
}

/// Lifecycle events of one export session.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    Progress(ExportProgress),
    /// Emitted exactly once, on every exit path.
    Completed {
        success: bool,
        error: Option<String>,
    },
}

pub type EventSender = mpsc::UnboundedSender<ExportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ExportEvent>;

/// Per-session event channel. Each session gets its own; there is no
/// ambient listener registry to leak between runs.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Send an event, ignoring a departed receiver. A UI that stopped
/// listening must not fail the export.
pub fn emit(sender: Option<&EventSender>, event: ExportEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_monotonic_and_capped() {
        let mut last = 0u8;
        for i in 0..10 {
            let p = ExportProgress::new(i, 10);
            assert!(p.percent >= last);
            assert!(p.percent <= 100);
            last = p.percent;
        }
        assert_eq!(ExportProgress::new(9, 10).percent, 100);
    }

    #[test]
    fn test_zero_total_does_not_divide() {
        assert_eq!(ExportProgress::new(0, 0).percent, 0);
    }

    #[test]
    fn test_emit_survives_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);
        emit(Some(&tx), ExportEvent::Progress(ExportProgress::new(0, 1)));
    }
}
