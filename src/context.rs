//! Cancellation signal shared by the engine and every plugin call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ScanError;

/// Cloneable handle used to cancel a running scan.
///
/// All clones observe the same flag. Plugins with long-running work should
/// poll [`is_cancelled`](Self::is_cancelled); the engine checks it between
/// phases and between plugin invocations.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    cancelled: Arc<AtomicBool>,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns [`ScanError::Cancelled`] once the scan has been cancelled.
    pub fn check(&self) -> Result<(), ScanError> {
        if self.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let ctx = ScanContext::new();
        let other = ctx.clone();
        assert!(ctx.check().is_ok());
        other.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(ScanError::Cancelled)));
    }
}
