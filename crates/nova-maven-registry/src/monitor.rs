//! Cooperative cancellation and progress reporting for registry operations.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, Result};
use crate::model::DescriptorId;

/// Which part of a refresh produced a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    /// Structural (dependency-free) discovery.
    Discovery,
    /// Dependency resolution fixpoint.
    Resolution,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshProgress {
    Begin { requested: usize },
    Descriptor {
        phase: RefreshPhase,
        descriptor: DescriptorId,
    },
    End { changed: usize },
}

pub type RefreshProgressReceiver = broadcast::Receiver<RefreshProgress>;

/// Passed through every registry operation that may block.
///
/// Cancellation is checked between queue pops; blocking collaborator calls are
/// never interrupted, but the loop does not continue after them.
#[derive(Debug, Clone)]
pub struct RefreshMonitor {
    cancel: CancellationToken,
    progress: Option<broadcast::Sender<RefreshProgress>>,
}

impl Default for RefreshMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshMonitor {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    /// Enable progress events and return a receiver for them.
    pub fn subscribe(&mut self, capacity: usize) -> RefreshProgressReceiver {
        match &self.progress {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(capacity.max(1));
                self.progress = Some(tx);
                rx
            }
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }
        Ok(())
    }

    pub(crate) fn report(&self, event: RefreshProgress) {
        if let Some(tx) = &self.progress {
            // No receivers is fine; progress is best-effort.
            let _ = tx.send(event);
        }
    }
}
