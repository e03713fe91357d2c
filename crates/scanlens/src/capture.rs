//! Capture session management
//!
//! Owns the binding between capture settings and the exclusive capture
//! resource, and enforces release-before-replace: a new session is only
//! built once the previous one has returned from `release()`.
//!
//! ```text
//!   build(settings) ──▶ CaptureSession (held)
//!        ▲                   │ start_frames / stop_frames
//!        │                   ▼
//!   rebuild/toggle ◀── release()  (blocking, idempotent)
//! ```

use std::fmt;
use std::sync::Arc;

use scanconf::DefaultsConfig;
use tracing::{debug, error, info};

use crate::error::{CaptureError, ScanError};
use crate::types::{Facing, FlashMode, FocusMode, FormatFilter};

/// Settings a capture session is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub facing: Facing,
    pub focus: FocusMode,
    pub flash: FlashMode,
    /// Symbologies the detection pipeline is configured for
    pub formats: FormatFilter,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            facing: Facing::Back,
            focus: FocusMode::ContinuousAuto,
            flash: FlashMode::Off,
            formats: FormatFilter::Qr,
        }
    }
}

impl CaptureSettings {
    /// Initial settings from configuration. Flash always starts off.
    pub fn from_defaults(defaults: &DefaultsConfig) -> Result<Self, ScanError> {
        Ok(Self {
            facing: defaults.facing.parse()?,
            focus: if defaults.auto_focus {
                FocusMode::ContinuousAuto
            } else {
                FocusMode::Fixed
            },
            flash: FlashMode::Off,
            formats: defaults.format.parse()?,
        })
    }

    /// Same focus, flash and formats with the opposite facing
    pub fn inverted_facing(&self) -> Self {
        Self {
            facing: self.facing.inverse(),
            ..*self
        }
    }
}

/// The exclusive capture resource.
///
/// At most one handle may be outstanding at a time; implementations are
/// expected to refuse a second `acquire` with [`CaptureError::Busy`].
pub trait CaptureDevice: Send + Sync {
    fn acquire(&self, settings: &CaptureSettings) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// A held capture resource.
pub trait CaptureHandle: Send {
    /// Begin delivering frames to the detection pipeline
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop frame delivery without giving up the resource
    fn stop(&mut self);

    fn set_flash(&mut self, flash: FlashMode) -> Result<(), CaptureError>;

    fn zoom(&mut self, _scale: f32) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Give the resource back. Returns only once the release has completed.
    fn release(&mut self);
}

/// One live binding to the capture resource
pub struct CaptureSession {
    id: u64,
    settings: CaptureSettings,
    handle: Box<dyn CaptureHandle>,
    delivering: bool,
    released: bool,
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("delivering", &self.delivering)
            .field("released", &self.released)
            .finish()
    }
}

impl CaptureSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn is_held(&self) -> bool {
        !self.released
    }

    pub fn is_delivering(&self) -> bool {
        self.delivering
    }

    pub fn start_frames(&mut self) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::NoSession);
        }
        if self.delivering {
            return Ok(());
        }
        self.handle.start()?;
        self.delivering = true;
        debug!(session.id = self.id, "frame delivery started");
        Ok(())
    }

    pub fn stop_frames(&mut self) {
        if self.delivering && !self.released {
            self.handle.stop();
            self.delivering = false;
            debug!(session.id = self.id, "frame delivery stopped");
        }
    }

    pub fn set_flash(&mut self, flash: FlashMode) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::NoSession);
        }
        self.handle.set_flash(flash)?;
        self.settings.flash = flash;
        Ok(())
    }

    pub fn zoom(&mut self, scale: f32) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::NoSession);
        }
        self.handle.zoom(scale)
    }

    /// Release the resource. Calling this again is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop_frames();
        self.handle.release();
        self.released = true;
        info!(
            session.id = self.id,
            facing = %self.settings.facing,
            "capture session released"
        );
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Counters for the session manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub builds: u64,
    pub releases: u64,
    pub failures: u64,
}

/// Guarantees release-before-replace for the exclusive capture resource
pub struct CaptureSessionManager {
    device: Arc<dyn CaptureDevice>,
    current: Option<CaptureSession>,
    next_id: u64,
    stats: CaptureStats,
}

impl fmt::Debug for CaptureSessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSessionManager")
            .field("current", &self.current)
            .field("stats", &self.stats)
            .finish()
    }
}

impl CaptureSessionManager {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            current: None,
            next_id: 1,
            stats: CaptureStats::default(),
        }
    }

    /// Build a new session.
    ///
    /// Refused with [`CaptureError::StillHeld`] while a previous session is
    /// still held; call [`release`](Self::release) first.
    pub fn build(&mut self, settings: CaptureSettings) -> Result<&mut CaptureSession, CaptureError> {
        if self.current.as_ref().is_some_and(CaptureSession::is_held) {
            return Err(CaptureError::StillHeld);
        }
        self.current = None;

        let handle = match self.device.acquire(&settings) {
            Ok(handle) => handle,
            Err(e) => {
                self.stats.failures += 1;
                error!(facing = %settings.facing, "capture acquisition failed: {}", e);
                return Err(e);
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        self.stats.builds += 1;

        info!(
            session.id = id,
            facing = %settings.facing,
            formats = %settings.formats,
            flash = settings.flash.is_on(),
            "capture session built"
        );

        Ok(self.current.insert(CaptureSession {
            id,
            settings,
            handle,
            delivering: false,
            released: false,
        }))
    }

    /// Release the current session, if any. Idempotent.
    ///
    /// Returns whether a held session was actually released.
    pub fn release(&mut self) -> bool {
        let Some(mut session) = self.current.take() else {
            return false;
        };
        if !session.is_held() {
            return false;
        }
        session.release();
        self.stats.releases += 1;
        true
    }

    /// Release then build with new settings
    pub fn rebuild(&mut self, settings: CaptureSettings) -> Result<&mut CaptureSession, CaptureError> {
        self.release();
        self.build(settings)
    }

    /// Rebuild with the opposite facing, carrying flash, focus and formats over
    pub fn toggle_facing(&mut self) -> Result<&mut CaptureSession, CaptureError> {
        let settings = self
            .current
            .as_ref()
            .filter(|s| s.is_held())
            .map(|s| s.settings().inverted_facing())
            .ok_or(CaptureError::NoSession)?;
        self.rebuild(settings)
    }

    pub fn current(&self) -> Option<&CaptureSession> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut CaptureSession> {
        self.current.as_mut()
    }

    pub fn is_held(&self) -> bool {
        self.current.as_ref().is_some_and(CaptureSession::is_held)
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }
}

impl Drop for CaptureSessionManager {
    fn drop(&mut self) {
        self.release();
    }
}
