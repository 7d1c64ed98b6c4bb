//! Mutual exclusion for graph mutations.

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{EngineError, EngineResult};

/// Serialises every mutation of the live graph.
///
/// Acquisition never waits: a caller that finds the gate held is rejected
/// with [`EngineError::ConcurrentUpdateRejected`].
#[derive(Debug, Default)]
pub struct UpdateGate {
    lock: Mutex<()>,
}

/// Holds the gate until dropped.
#[derive(Debug)]
#[must_use = "the gate is released when the guard is dropped"]
pub struct UpdateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl UpdateGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate or fail immediately.
    ///
    /// # Errors
    /// Returns [`EngineError::ConcurrentUpdateRejected`] if another update
    /// holds the gate.
    pub fn try_acquire(&self) -> EngineResult<UpdateGuard<'_>> {
        self.lock
            .try_lock()
            .map(|guard| UpdateGuard { _guard: guard })
            .map_err(|_| EngineError::ConcurrentUpdateRejected)
    }

    /// Whether an update is in progress.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_second_acquire_rejected_until_release() {
        let gate = UpdateGate::new();
        let guard = gate.try_acquire().unwrap();
        assert!(gate.is_held());
        assert_matches!(gate.try_acquire(), Err(EngineError::ConcurrentUpdateRejected));

        drop(guard);
        assert!(!gate.is_held());
        assert!(gate.try_acquire().is_ok());
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing(gate: &UpdateGate) -> EngineResult<()> {
            let _guard = gate.try_acquire()?;
            Err(EngineError::QueryFailed("boom".into()))
        }

        let gate = UpdateGate::new();
        assert!(failing(&gate).is_err());
        assert!(!gate.is_held());
    }
}
