use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ReconError;

/// Cooperative cancellation flag shared between a caller and a running engine.
///
/// Cloning shares the flag. The engine polls it between sources and between
/// keys; it never interrupts a single key's work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), ReconError> {
        if self.is_cancelled() {
            Err(ReconError::Cancelled)
        } else {
            Ok(())
        }
    }
}
