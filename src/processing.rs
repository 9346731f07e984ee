use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingState {
    Idle,
    Busy,
}

/// Busy flag set by the chat logic while a response is streaming in.
///
/// Clones share the same flag. The conversation store only reads it; whoever
/// drives a request sets and clears it, preferably through [`ProcessingController::begin`].
#[derive(Clone, Debug, Default)]
pub struct ProcessingController {
    busy: Arc<AtomicBool>,
}

impl ProcessingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProcessingState {
        if self.is_busy() {
            ProcessingState::Busy
        } else {
            ProcessingState::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn set_busy(&self, busy: bool) {
        let previous = self.busy.swap(busy, Ordering::AcqRel);
        if previous != busy {
            log::debug!("Processing state -> {:?}", self.state());
        }
    }

    /// Marks the controller busy until the returned guard is dropped.
    pub fn begin(&self) -> ProcessingGuard {
        self.set_busy(true);
        ProcessingGuard {
            controller: self.clone(),
        }
    }
}

#[must_use = "the controller goes idle as soon as the guard is dropped"]
pub struct ProcessingGuard {
    controller: ProcessingController,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.controller.set_busy(false);
    }
}
