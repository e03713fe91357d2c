//! Scan coordinator - the request/session state machine.
//!
//! ```text
//!   Idle ──start──▶ AwaitingPermission ──grant──▶ Active(mode)
//!     ▲                   │ deny                    │ result / cancel / destroy
//!     │                   ▼                         ▼
//!     └──────────── Terminated ◀────────────── Completing
//! ```
//!
//! All state lives behind one mutex. Host calls and detection callbacks both
//! take it for the whole transition, including the blocking release and
//! acquisition of the capture resource, so a batch racing a cancel can never
//! produce a second result and a replacement session is never built before
//! the old one has been released.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureDevice, CaptureSessionManager, CaptureSettings};
use crate::error::{CaptureError, ScanError};
use crate::events::{EventPublisher, NoOpPublisher, ScanEvent};
use crate::overlay::{hit_test, OverlayTracker, OverlayTransform};
use crate::permission::{PermissionGate, PermissionStatus};
use crate::request::ScanRequest;
use crate::types::{Detection, FlashMode, NoResultReason, Point, ResultEnvelope, ScanId, ScanMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    AwaitingPermission,
    Active(ScanMode),
    Completing,
    Terminated,
}

impl ScanState {
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Active(_))
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Idle => f.write_str("idle"),
            ScanState::AwaitingPermission => f.write_str("awaiting_permission"),
            ScanState::Active(mode) => write!(f, "active({})", mode),
            ScanState::Completing => f.write_str("completing"),
            ScanState::Terminated => f.write_str("terminated"),
        }
    }
}

/// Host lifecycle events, consumed by [`ScanCoordinator::on_lifecycle_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Resume,
    Pause,
    Destroy,
}

/// Where the coordinator hands results.
///
/// Called with the coordinator lock held; implementations must not call back
/// into the coordinator.
pub trait ResultDelivery: Send + Sync {
    /// Terminal result of the live request. Called exactly once per request.
    fn complete(&self, scan_id: &ScanId, envelope: ResultEnvelope);

    /// One continuous-mode value
    fn stream_value(&self, scan_id: &ScanId, value: String);
}

#[derive(Debug, Clone)]
struct LiveRequest {
    id: ScanId,
    request: ScanRequest,
}

#[derive(Debug)]
struct Inner {
    state: ScanState,
    live: Option<LiveRequest>,
    capture: CaptureSessionManager,
    overlay: OverlayTracker,
    transform: OverlayTransform,
    /// Frame-space tap waiting for the next single-shot batch
    tap: Option<Point>,
    paused: bool,
}

pub struct ScanCoordinator {
    inner: Mutex<Inner>,
    base_settings: CaptureSettings,
    permission: Arc<dyn PermissionGate>,
    delivery: Arc<dyn ResultDelivery>,
    publisher: Arc<dyn EventPublisher>,
}

impl fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("inner", &self.inner)
            .field("base_settings", &self.base_settings)
            .finish()
    }
}

impl ScanCoordinator {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        permission: Arc<dyn PermissionGate>,
        delivery: Arc<dyn ResultDelivery>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ScanState::Idle,
                live: None,
                capture: CaptureSessionManager::new(device),
                overlay: OverlayTracker::new(),
                transform: OverlayTransform::default(),
                tap: None,
                paused: false,
            }),
            base_settings: CaptureSettings::default(),
            permission,
            delivery,
            publisher: Arc::new(NoOpPublisher),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Facing and focus used for every new session. Formats come from the request.
    pub fn with_capture_defaults(mut self, settings: CaptureSettings) -> Self {
        self.base_settings = settings;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every transition completes before its guard drops.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Host operations
    // ------------------------------------------------------------------

    /// Admit a new request.
    ///
    /// Acquisition failures and denied permission are not errors here: they
    /// end the request with the sentinel result.
    pub fn start_scan(&self, request: ScanRequest) -> Result<ScanId, ScanError> {
        let scan_id = ScanId::generate();
        let prompt = {
            let mut guard = self.lock();
            let inner = &mut *guard;

            if inner.live.is_some() {
                return Err(ScanError::InvalidRequestArgument(
                    "a scan request is already live".to_string(),
                ));
            }
            if !matches!(inner.state, ScanState::Idle | ScanState::Terminated) {
                return Err(ScanError::InvalidState {
                    operation: "start_scan",
                    state: inner.state,
                });
            }

            info!(
                scan.id = %scan_id,
                mode = %request.mode(),
                formats = %request.format_filter(),
                "scan requested"
            );
            inner.live = Some(LiveRequest {
                id: scan_id.clone(),
                request,
            });

            match self.permission.status() {
                PermissionStatus::Granted => {
                    self.activate(inner);
                    false
                }
                PermissionStatus::Denied => {
                    warn!(scan.id = %scan_id, "camera permission already denied");
                    self.terminate(inner, NoResultReason::PermissionDenied);
                    false
                }
                PermissionStatus::Unknown => {
                    self.transition(inner, ScanState::AwaitingPermission);
                    true
                }
            }
        };

        // Outside the lock: the host may answer synchronously.
        if prompt {
            self.permission.request();
        }
        Ok(scan_id)
    }

    pub fn on_permission_result(&self, granted: bool) -> Result<(), ScanError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.state != ScanState::AwaitingPermission {
            return Err(ScanError::InvalidState {
                operation: "on_permission_result",
                state: inner.state,
            });
        }

        if granted {
            info!(scan.id = ?live_id(inner), "camera permission granted");
            self.activate(inner);
        } else {
            warn!(scan.id = ?live_id(inner), "camera permission denied");
            self.terminate(inner, NoResultReason::PermissionDenied);
        }
        Ok(())
    }

    /// End the live request with the sentinel. A no-op when nothing is live.
    pub fn cancel(&self) -> Result<(), ScanError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.live.is_none() && !inner.capture.is_held() {
            debug!("cancel with no live request");
            return Ok(());
        }
        info!(scan.id = ?live_id(inner), "scan cancelled");
        self.terminate(inner, NoResultReason::Cancelled);
        Ok(())
    }

    /// Cancel the live request only if it is continuous. Returns whether it did.
    pub fn cancel_continuous(&self) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let continuous = inner
            .live
            .as_ref()
            .is_some_and(|l| l.request.mode() == ScanMode::Continuous);
        if continuous {
            info!(scan.id = ?live_id(inner), "continuous scan closed");
            self.terminate(inner, NoResultReason::Cancelled);
        }
        continuous
    }

    /// Release then rebuild the session with the opposite facing.
    pub fn toggle_facing(&self) -> Result<(), ScanError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let scan_id = self.require_active(inner, "toggle_facing")?;

        let old_session = inner.capture.current().map(|s| s.id());
        let paused = inner.paused;
        let rebuilt = inner.capture.toggle_facing().and_then(|session| {
            let id = session.id();
            let facing = session.settings().facing;
            if !paused {
                session.start_frames()?;
            }
            Ok((id, facing))
        });

        if let Some(session_id) = old_session {
            self.publisher.publish(ScanEvent::SessionReleased {
                scan_id: Some(scan_id.clone()),
                session_id,
            });
        }

        match rebuilt {
            Ok((session_id, facing)) => {
                // Regions and taps from the old facing no longer map onto frames.
                inner.overlay.clear();
                inner.tap = None;
                info!(scan.id = %scan_id, %facing, "facing toggled");
                self.publisher.publish(ScanEvent::SessionAcquired {
                    scan_id,
                    session_id,
                    facing,
                });
                Ok(())
            }
            Err(e) => {
                error!(scan.id = %scan_id, "facing toggle failed: {}", e);
                self.terminate(inner, NoResultReason::AcquisitionFailed);
                Err(ScanError::CameraAcquisitionFailure(e.to_string()))
            }
        }
    }

    pub fn set_flash(&self, flash: FlashMode) -> Result<(), ScanError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let scan_id = self.require_active(inner, "set_flash")?;

        let result = match inner.capture.current_mut() {
            Some(session) => session.set_flash(flash),
            None => Err(CaptureError::NoSession),
        };
        result.map_err(|e| self.control_failed(scan_id, e.to_string()))
    }

    pub fn zoom(&self, scale: f32) -> Result<(), ScanError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let scan_id = self.require_active(inner, "zoom")?;

        if !scale.is_finite() || scale <= 0.0 {
            return Err(ScanError::InvalidRequestArgument(format!(
                "zoom scale must be positive, got {}",
                scale
            )));
        }

        let result = match inner.capture.current_mut() {
            Some(session) => session.zoom(scale),
            None => Err(CaptureError::NoSession),
        };
        result.map_err(|e| self.control_failed(scan_id, e.to_string()))
    }

    /// A user tap on the overlay, in screen coordinates.
    ///
    /// In single-shot mode a hit on the current overlay completes the request
    /// with that detection. A tap that hits nothing is kept and decides the
    /// selection from the next batch. Continuous sessions ignore taps.
    pub fn on_tap(&self, point: Point) -> Result<Option<Detection>, ScanError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        self.require_active(inner, "on_tap")?;

        if inner.state != ScanState::Active(ScanMode::SingleShot) {
            debug!("tap ignored in continuous mode");
            return Ok(None);
        }

        let point = inner.transform.to_frame(point);
        let Some(hit) = inner.overlay.hit_test(point) else {
            debug!(x = point.x, y = point.y, "tap held for next batch");
            inner.tap = Some(point);
            return Ok(None);
        };
        self.finish(inner, ResultEnvelope::from_detection(&hit));
        Ok(Some(hit))
    }

    /// Where the overlay sits on screen relative to the camera frame
    pub fn set_overlay_transform(&self, transform: OverlayTransform) {
        self.lock().transform = transform;
    }

    pub fn on_lifecycle_event(&self, event: LifecycleEvent) -> Result<(), ScanError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        debug!(?event, state = %inner.state, "lifecycle event");

        match event {
            LifecycleEvent::Pause => {
                inner.paused = true;
                if let Some(session) = inner.capture.current_mut() {
                    session.stop_frames();
                }
                Ok(())
            }
            LifecycleEvent::Resume => {
                inner.paused = false;
                let started = match inner.capture.current_mut() {
                    Some(session) if inner.state.is_active() => session.start_frames(),
                    _ => Ok(()),
                };
                started.map_err(|e| {
                    error!(scan.id = ?live_id(inner), "frame delivery failed to resume: {}", e);
                    self.terminate(inner, NoResultReason::AcquisitionFailed);
                    ScanError::CameraAcquisitionFailure(e.to_string())
                })
            }
            LifecycleEvent::Destroy => {
                inner.paused = false;
                if inner.live.is_some() || inner.capture.is_held() {
                    self.terminate(inner, NoResultReason::Destroyed);
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Detection pipeline callbacks
    // ------------------------------------------------------------------

    /// A batch from the detection pipeline. Never fails; batches that arrive
    /// outside `Active` are dropped.
    pub fn on_detection_batch(&self, batch: Vec<Detection>) {
        let mut guard = self.lock();
        self.accept_batch(&mut guard, batch, None);
    }

    /// A batch the pipeline produced in response to a user tap at `point`
    /// (screen coordinates). Single-shot requests complete with the
    /// detection the tap selects instead of the first one.
    pub fn on_detection_batch_with_tap(&self, batch: Vec<Detection>, point: Point) {
        let mut guard = self.lock();
        let point = guard.transform.to_frame(point);
        self.accept_batch(&mut guard, batch, Some(point));
    }

    fn accept_batch(&self, inner: &mut Inner, mut batch: Vec<Detection>, tap: Option<Point>) {
        let (scan_id, request) = match (&inner.live, inner.state) {
            (Some(live), ScanState::Active(_)) => (live.id.clone(), live.request.clone()),
            _ => {
                debug!(state = %inner.state, size = batch.len(), "batch dropped outside active state");
                return;
            }
        };
        if inner.paused {
            debug!(scan.id = %scan_id, "batch dropped while paused");
            return;
        }

        let filter = request.format_filter();
        batch.retain(|d| filter.accepts(d.format));
        let Some(first) = batch.first().cloned() else {
            return;
        };
        let selected = match (request.mode(), tap.or(inner.tap)) {
            (ScanMode::SingleShot, Some(point)) => {
                hit_test(&batch, point).cloned().unwrap_or(first)
            }
            _ => first,
        };
        inner.overlay.replace(batch);

        match request.mode() {
            ScanMode::SingleShot => {
                self.finish(inner, ResultEnvelope::from_detection(&selected));
            }
            ScanMode::Continuous => match selected.raw_value {
                Some(value) => self.delivery.stream_value(&scan_id, value),
                None => debug!(scan.id = %scan_id, "undecoded detection not streamed"),
            },
        }
    }

    /// Non-terminal detector failure, reported on the side-channel only
    pub fn on_detection_error(&self, message: impl Into<String>) {
        let message = message.into();
        let scan_id = live_id(&self.lock());
        let err = ScanError::DetectorTransient(message.clone());
        warn!(scan.id = ?scan_id, terminal = err.is_terminal(), "{}", err);
        self.publisher
            .publish(ScanEvent::DetectorError { scan_id, message });
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> ScanState {
        self.lock().state
    }

    pub fn scan_id(&self) -> Option<ScanId> {
        live_id(&self.lock())
    }

    pub fn live_request(&self) -> Option<ScanRequest> {
        self.lock().live.as_ref().map(|l| l.request.clone())
    }

    /// Settings of the held session, if any
    pub fn capture_settings(&self) -> Option<CaptureSettings> {
        let inner = self.lock();
        inner
            .capture
            .current()
            .filter(|s| s.is_held())
            .map(|s| *s.settings())
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn hit_test(&self, point: Point) -> Option<Detection> {
        self.lock().overlay.hit_test(point)
    }

    pub fn overlay(&self) -> Arc<[Detection]> {
        self.lock().overlay.current()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn require_active(&self, inner: &Inner, operation: &'static str) -> Result<ScanId, ScanError> {
        match (&inner.live, inner.state) {
            (Some(live), ScanState::Active(_)) => Ok(live.id.clone()),
            _ => Err(ScanError::InvalidState {
                operation,
                state: inner.state,
            }),
        }
    }

    fn control_failed(&self, scan_id: ScanId, message: String) -> ScanError {
        warn!(scan.id = %scan_id, "camera control failed: {}", message);
        self.publisher.publish(ScanEvent::CameraControlFailed {
            scan_id,
            message: message.clone(),
        });
        ScanError::CameraControl(message)
    }

    /// Build the session for the live request and enter `Active`
    fn activate(&self, inner: &mut Inner) {
        let Some(live) = inner.live.as_ref() else {
            return;
        };
        let scan_id = live.id.clone();
        let mode = live.request.mode();
        let settings = CaptureSettings {
            formats: live.request.format_filter(),
            ..self.base_settings
        };

        let paused = inner.paused;
        let built = inner.capture.build(settings).and_then(|session| {
            self.publisher.publish(ScanEvent::SessionAcquired {
                scan_id: scan_id.clone(),
                session_id: session.id(),
                facing: session.settings().facing,
            });
            if !paused {
                session.start_frames()?;
            }
            Ok(())
        });

        match built {
            Ok(()) => self.transition(inner, ScanState::Active(mode)),
            Err(e) => {
                error!(scan.id = %scan_id, "capture session could not be started: {}", e);
                self.terminate(inner, NoResultReason::AcquisitionFailed);
            }
        }
    }

    fn terminate(&self, inner: &mut Inner, reason: NoResultReason) {
        if let Some(err) = ScanError::for_reason(reason) {
            warn!(scan.id = ?live_id(inner), terminal = err.is_terminal(), "scan failed: {}", err);
        }
        self.finish(inner, ResultEnvelope::no_result(reason));
    }

    /// The single terminal path: release, deliver once, reset to `Idle`.
    fn finish(&self, inner: &mut Inner, envelope: ResultEnvelope) {
        self.transition(inner, ScanState::Completing);

        let released = inner.capture.current().map(|s| s.id());
        if inner.capture.release() {
            self.publisher.publish(ScanEvent::SessionReleased {
                scan_id: live_id(inner),
                session_id: released.unwrap_or_default(),
            });
        }
        inner.overlay.clear();
        inner.tap = None;

        if let Some(live) = inner.live.take() {
            let sentinel = envelope.is_sentinel();
            info!(
                scan.id = %live.id,
                mode = %live.request.mode(),
                sentinel,
                "scan result delivered"
            );
            self.delivery.complete(&live.id, envelope);
            self.publisher.publish(ScanEvent::ResultDelivered {
                scan_id: live.id.clone(),
                mode: live.request.mode(),
                sentinel,
            });
            self.transition_for(inner, Some(live.id), ScanState::Terminated);
        } else {
            self.transition(inner, ScanState::Terminated);
        }

        self.transition(inner, ScanState::Idle);
    }

    fn transition(&self, inner: &mut Inner, to: ScanState) {
        let scan_id = live_id(inner);
        self.transition_for(inner, scan_id, to);
    }

    fn transition_for(&self, inner: &mut Inner, scan_id: Option<ScanId>, to: ScanState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        info!(scan.id = ?scan_id, %from, %to, "scan state changed");
        self.publisher
            .publish(ScanEvent::StateChanged { scan_id, from, to });
    }
}

fn live_id(inner: &Inner) -> Option<ScanId> {
    inner.live.as_ref().map(|l| l.id.clone())
}
