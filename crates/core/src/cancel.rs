use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CrawlError;
use crate::ports::Result;

/// Shared interrupt flag. Signal handlers set it; the crawler polls it between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying flag, for registration with a signal handler.
    pub fn shared(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CrawlError::Interrupted)
        } else {
            Ok(())
        }
    }
}
