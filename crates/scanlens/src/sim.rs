//! In-process capture device.
//!
//! Behaves like a single physical sensor: one handle at a time, blocking
//! release, and an audit log of every acquire/release so ordering can be
//! checked after the fact.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::capture::{CaptureDevice, CaptureHandle, CaptureSettings};
use crate::error::CaptureError;
use crate::types::{Facing, FlashMode};

/// One entry in the camera's audit log
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureOp {
    Acquired { handle: u64, facing: Facing },
    Started { handle: u64 },
    Stopped { handle: u64 },
    Flash { handle: u64, flash: FlashMode },
    Zoom { handle: u64, scale: f32 },
    Released { handle: u64 },
}

#[derive(Debug, Default)]
struct SimState {
    held: Option<u64>,
    delivering: bool,
    flash: FlashMode,
    next_handle: u64,
    ops: Vec<CaptureOp>,
    acquires: usize,
    releases: usize,
    fail_acquire: Option<String>,
    fail_start: Option<String>,
    fail_flash: bool,
    release_delay: Duration,
}

/// Simulated exclusive camera
#[derive(Debug, Clone, Default)]
pub struct SimulatedCamera {
    state: Arc<Mutex<SimState>>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `release()` block for `delay`, like a driver tearing down
    pub fn with_release_delay(self, delay: Duration) -> Self {
        lock(&self.state).release_delay = delay;
        self
    }

    pub fn fail_next_acquire(&self, message: impl Into<String>) {
        lock(&self.state).fail_acquire = Some(message.into());
    }

    pub fn fail_next_start(&self, message: impl Into<String>) {
        lock(&self.state).fail_start = Some(message.into());
    }

    pub fn fail_flash(&self, fail: bool) {
        lock(&self.state).fail_flash = fail;
    }

    pub fn is_held(&self) -> bool {
        lock(&self.state).held.is_some()
    }

    pub fn is_delivering(&self) -> bool {
        lock(&self.state).delivering
    }

    pub fn flash(&self) -> FlashMode {
        lock(&self.state).flash
    }

    pub fn acquire_count(&self) -> usize {
        lock(&self.state).acquires
    }

    pub fn release_count(&self) -> usize {
        lock(&self.state).releases
    }

    pub fn operations(&self) -> Vec<CaptureOp> {
        lock(&self.state).ops.clone()
    }

    /// Whether every acquisition happened while nothing else was held
    pub fn release_before_acquire_held(&self) -> bool {
        let mut held = false;
        for op in lock(&self.state).ops.iter() {
            match op {
                CaptureOp::Acquired { .. } if held => return false,
                CaptureOp::Acquired { .. } => held = true,
                CaptureOp::Released { .. } => held = false,
                _ => {}
            }
        }
        true
    }
}

impl CaptureDevice for SimulatedCamera {
    fn acquire(&self, settings: &CaptureSettings) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let mut state = lock(&self.state);
        if state.held.is_some() {
            return Err(CaptureError::Busy);
        }
        if let Some(message) = state.fail_acquire.take() {
            return Err(CaptureError::Open(message));
        }

        state.next_handle += 1;
        let handle = state.next_handle;
        state.held = Some(handle);
        state.acquires += 1;
        state.flash = settings.flash;
        state.ops.push(CaptureOp::Acquired {
            handle,
            facing: settings.facing,
        });
        debug!(handle, facing = %settings.facing, "simulated camera acquired");

        Ok(Box::new(SimulatedHandle {
            handle,
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimulatedHandle {
    handle: u64,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedHandle {
    fn owned(&self) -> Result<MutexGuard<'_, SimState>, CaptureError> {
        let state = lock(&self.state);
        if state.held == Some(self.handle) {
            Ok(state)
        } else {
            Err(CaptureError::NoSession)
        }
    }
}

impl CaptureHandle for SimulatedHandle {
    fn start(&mut self) -> Result<(), CaptureError> {
        let mut state = self.owned()?;
        if let Some(message) = state.fail_start.take() {
            return Err(CaptureError::Start(message));
        }
        state.delivering = true;
        state.ops.push(CaptureOp::Started {
            handle: self.handle,
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut state) = self.owned() {
            state.delivering = false;
            state.ops.push(CaptureOp::Stopped {
                handle: self.handle,
            });
        }
    }

    fn set_flash(&mut self, flash: FlashMode) -> Result<(), CaptureError> {
        let mut state = self.owned()?;
        if state.fail_flash {
            return Err(CaptureError::Control("torch unavailable".to_string()));
        }
        state.flash = flash;
        state.ops.push(CaptureOp::Flash {
            handle: self.handle,
            flash,
        });
        Ok(())
    }

    fn zoom(&mut self, scale: f32) -> Result<(), CaptureError> {
        let mut state = self.owned()?;
        state.ops.push(CaptureOp::Zoom {
            handle: self.handle,
            scale,
        });
        Ok(())
    }

    fn release(&mut self) {
        let delay = lock(&self.state).release_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = lock(&self.state);
        if state.held != Some(self.handle) {
            return;
        }
        state.held = None;
        state.delivering = false;
        state.releases += 1;
        state.ops.push(CaptureOp::Released {
            handle: self.handle,
        });
        debug!(handle = self.handle, "simulated camera released");
    }
}
