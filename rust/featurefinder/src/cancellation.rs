use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};

use crate::errors::{
    FeatureFindingError,
    Result,
};

/// Shared flag used to stop a long running extraction.
///
/// Clones share the same flag, so a batch driver can hand a clone to
/// every worker and flip it once. Long running stages call [`check`]
/// between units of work (one scan, one seed peak) and bubble the
/// resulting [`FeatureFindingError::Cancelled`] up with `?`.
///
/// ```
/// use featurefinder::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
/// assert!(worker_token.check().is_ok());
/// token.cancel();
/// assert!(worker_token.check().unwrap_err().is_cancelled());
/// ```
///
/// [`check`]: CancellationToken::check
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FeatureFindingError::Cancelled)
        } else {
            Ok(())
        }
    }
}
