//! Observability side-channel.
//!
//! Transient failures never escape the coordinator as errors; they show up
//! here instead, alongside state transitions and resource activity.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::coordinator::ScanState;
use crate::types::{Facing, ScanId, ScanMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    StateChanged {
        scan_id: Option<ScanId>,
        from: ScanState,
        to: ScanState,
    },
    SessionAcquired {
        scan_id: ScanId,
        session_id: u64,
        facing: Facing,
    },
    SessionReleased {
        scan_id: Option<ScanId>,
        session_id: u64,
    },
    DetectorError {
        scan_id: Option<ScanId>,
        message: String,
    },
    CameraControlFailed {
        scan_id: ScanId,
        message: String,
    },
    ResultDelivered {
        scan_id: ScanId,
        mode: ScanMode,
        sentinel: bool,
    },
    StreamValueDropped {
        reason: String,
    },
}

/// Trait for publishing scan events
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ScanEvent);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPublisher;

impl EventPublisher for NoOpPublisher {
    fn publish(&self, _event: ScanEvent) {}
}

/// Fans events out to any number of async subscribers.
///
/// Slow subscribers lag rather than block the coordinator.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<ScanEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: ScanEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ScanEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of transitions into `Terminated`
    pub fn terminations(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ScanEvent::StateChanged { to: ScanState::Terminated, .. }))
            .count()
    }

    /// Number of results handed to the host
    pub fn deliveries(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ScanEvent::ResultDelivered { .. }))
            .count()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: ScanEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
