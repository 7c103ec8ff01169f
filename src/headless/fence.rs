// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::escrow::Fence;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// A fence signaled by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualFence {
    shared: Arc<(Mutex<bool>, Condvar)>,
}

impl ManualFence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signaled() -> Self {
        let fence = Self::new();
        fence.signal();
        fence
    }

    pub fn signal(&self) {
        let (lock, condvar) = &*self.shared;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }
}

impl Fence for ManualFence {
    fn is_signaled(&self) -> bool {
        *self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self) {
        let (lock, condvar) = &*self.shared;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = condvar
            .wait_while(guard, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
