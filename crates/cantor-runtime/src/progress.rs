//! Progress reporting.
//!
//! The engine publishes [`ProgressEvent`]s fire-and-forget: a sink error
//! is logged and never reaches the workflow.

use cantor_core::{ReviewStatus, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from progress sinks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgressError {
    #[error("Progress receiver closed")]
    Closed,

    #[error("Progress publish failed: {0}")]
    Publish(String),
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressKind {
    RunStarted {
        total_cycles: u32,
        resumed: bool,
    },
    StageStarted {
        cycle: u32,
        stage: Stage,
    },
    StageCompleted {
        cycle: u32,
        stage: Stage,
        legal_status: ReviewStatus,
        linguistic_status: ReviewStatus,
        progress_percent: u8,
    },
    RunCompleted {
        legal_status: ReviewStatus,
        linguistic_status: ReviewStatus,
        degraded: bool,
    },
}

/// A timestamped progress event of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ProgressKind,
}

impl ProgressEvent {
    pub fn new(run_id: impl Into<String>, kind: ProgressKind) -> Self {
        Self {
            run_id: run_id.into(),
            at: Utc::now(),
            kind,
        }
    }
}

/// Receives progress events.
///
/// Implementations must not block; the engine calls `publish` inline.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: &ProgressEvent) -> Result<(), ProgressError>;
}

/// Logs every event at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn publish(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        match &event.kind {
            ProgressKind::RunStarted {
                total_cycles,
                resumed,
            } => tracing::info!(run_id = %event.run_id, total_cycles, resumed, "Run started"),
            ProgressKind::StageStarted { cycle, stage } => {
                tracing::debug!(run_id = %event.run_id, cycle, %stage, "Stage started")
            }
            ProgressKind::StageCompleted {
                cycle,
                stage,
                legal_status,
                linguistic_status,
                progress_percent,
            } => tracing::info!(
                run_id = %event.run_id,
                cycle,
                %stage,
                %legal_status,
                %linguistic_status,
                progress = progress_percent,
                "Stage completed"
            ),
            ProgressKind::RunCompleted {
                legal_status,
                linguistic_status,
                degraded,
            } => tracing::info!(
                run_id = %event.run_id,
                %legal_status,
                %linguistic_status,
                degraded,
                "Run completed"
            ),
        }
        Ok(())
    }
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }

    /// A sink together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn publish(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        self.sender
            .send(event.clone())
            .map_err(|_| ProgressError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_flat() {
        let event = ProgressEvent::new(
            "run-1",
            ProgressKind::StageStarted {
                cycle: 2,
                stage: Stage::LegalReview,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "stage_started");
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["cycle"], 2);

        let back: ProgressEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelProgressSink::channel();
        let event = ProgressEvent::new(
            "run-1",
            ProgressKind::RunStarted {
                total_cycles: 3,
                resumed: false,
            },
        );
        sink.publish(&event).unwrap();
        assert_eq!(rx.recv().await, Some(event));
    }

    #[test]
    fn test_channel_sink_closed_receiver() {
        let (sink, rx) = ChannelProgressSink::channel();
        drop(rx);
        let event = ProgressEvent::new(
            "run-1",
            ProgressKind::RunCompleted {
                legal_status: ReviewStatus::Approved,
                linguistic_status: ReviewStatus::Failed,
                degraded: true,
            },
        );
        assert_eq!(sink.publish(&event), Err(ProgressError::Closed));
    }

    #[test]
    fn test_tracing_sink_never_fails() {
        let event = ProgressEvent::new(
            "run-1",
            ProgressKind::StageCompleted {
                cycle: 1,
                stage: Stage::Compose,
                legal_status: ReviewStatus::Pending,
                linguistic_status: ReviewStatus::Pending,
                progress_percent: 0,
            },
        );
        assert!(TracingProgressSink.publish(&event).is_ok());
    }
}
