//! Error taxonomy.
//!
//! Terminal errors always end the live request with the sentinel result.
//! Non-terminal errors leave the session as it was.

use crate::coordinator::ScanState;
use crate::types::NoResultReason;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera acquisition failed: {0}")]
    CameraAcquisitionFailure(String),

    #[error("detector error: {0}")]
    DetectorTransient(String),

    #[error("invalid request argument: {0}")]
    InvalidRequestArgument(String),

    #[error("a scan request is already pending")]
    DoubleRequestViolation,

    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: ScanState,
    },

    #[error("camera control failed: {0}")]
    CameraControl(String),
}

impl ScanError {
    /// Whether this error ends the live request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanError::PermissionDenied | ScanError::CameraAcquisitionFailure(_)
        )
    }

    /// The failure behind a sentinel result, if the reason was one
    pub fn for_reason(reason: NoResultReason) -> Option<ScanError> {
        match reason {
            NoResultReason::PermissionDenied => Some(ScanError::PermissionDenied),
            NoResultReason::AcquisitionFailed => Some(ScanError::CameraAcquisitionFailure(
                "capture session unavailable".to_string(),
            )),
            NoResultReason::Cancelled
            | NoResultReason::Destroyed
            | NoResultReason::MissingValue => None,
        }
    }
}

/// Errors raised by the exclusive capture resource
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("capture resource is held by another owner")]
    Busy,

    #[error("previous capture session is still held")]
    StillHeld,

    #[error("no capture session is held")]
    NoSession,

    #[error("failed to open capture device: {0}")]
    Open(String),

    #[error("failed to start frame delivery: {0}")]
    Start(String),

    #[error("capture control failed: {0}")]
    Control(String),
}
