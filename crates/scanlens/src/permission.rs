//! Camera permission collaborator.
//!
//! The host owns the actual prompt. The coordinator asks for the current
//! status, fires `request()` when the status is unknown, and waits for the
//! answer to come back through `ScanCoordinator::on_permission_result`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Not asked yet, or the user has not answered
    Unknown,
}

pub trait PermissionGate: Send + Sync {
    fn status(&self) -> PermissionStatus;

    /// Ask the host to prompt the user. The answer is delivered once,
    /// asynchronously, to the coordinator.
    fn request(&self);
}

/// A gate with a fixed status, for tests and the demo binary
#[derive(Debug)]
pub struct StaticPermission {
    status: Mutex<PermissionStatus>,
    prompts: AtomicU32,
}

impl StaticPermission {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(status),
            prompts: AtomicU32::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted)
    }

    pub fn denied() -> Self {
        Self::new(PermissionStatus::Denied)
    }

    pub fn unknown() -> Self {
        Self::new(PermissionStatus::Unknown)
    }

    /// Record the user's answer so later `status()` calls see it
    pub fn set(&self, status: PermissionStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// How many times a prompt was requested
    pub fn prompts(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl PermissionGate for StaticPermission {
    fn status(&self) -> PermissionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request(&self) {
        self.prompts.fetch_add(1, Ordering::SeqCst);
    }
}
