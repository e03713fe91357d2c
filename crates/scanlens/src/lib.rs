//! Scanlens: scan-session coordinator
//!
//! Drives one barcode scan session at a time against an exclusive capture
//! resource:
//!
//! - **Coordinator**: request/session state machine, mode policy, result delivery
//! - **Capture**: release-before-replace ownership of the capture resource
//! - **Bridge**: single-shot request/response and continuous value streams for the host
//! - **Overlay**: latest detection batch and tap hit-testing
//!
//! The detection pipeline, permission prompt and host lifecycle are external;
//! they feed the coordinator through [`ScanCoordinator`] callbacks.

pub mod bridge;
pub mod capture;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod logging;
pub mod overlay;
pub mod permission;
pub mod request;
pub mod sim;
pub mod types;

pub use bridge::{PendingScan, ScanBridge, ScanStream};
pub use capture::{
    CaptureDevice, CaptureHandle, CaptureSession, CaptureSessionManager, CaptureSettings,
    CaptureStats,
};
pub use coordinator::{LifecycleEvent, ResultDelivery, ScanCoordinator, ScanState};
pub use error::{CaptureError, ScanError};
pub use events::{BroadcastPublisher, EventPublisher, NoOpPublisher, RecordingPublisher, ScanEvent};
pub use overlay::{hit_test, OverlayTracker, OverlayTransform};
pub use permission::{PermissionGate, PermissionStatus, StaticPermission};
pub use request::{ScanRequest, ScanRequestBuilder};
pub use sim::{CaptureOp, SimulatedCamera};
pub use types::{
    Detection, Facing, FlashMode, FocusMode, FormatFilter, NoResultReason, Point, Rect,
    ResultEnvelope, ScanId, ScanMode, Symbology, ValueType, SENTINEL,
};
