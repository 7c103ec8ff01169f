// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::present::context::{ContextError, GraphicsContext};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

#[derive(Debug, Default)]
struct Affinity {
    current: Option<ThreadId>,
    make_current: u64,
    swaps: u64,
    //make_current while current on another thread
    violations: u64,
    fail_make_current: u32,
}

/**
A context that only tracks which thread it is current on.

Making it current while it is current on a different thread fails with
[ContextError::CurrentElsewhere] and counts as a violation, which is how tests check
that the context is never shared.
*/
#[derive(Debug, Clone, Default)]
pub struct HeadlessContext {
    affinity: Arc<Mutex<Affinity>>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Affinity> {
        self.affinity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.lock().current
    }

    pub fn is_current_here(&self) -> bool {
        self.current_thread() == Some(std::thread::current().id())
    }

    pub fn is_current_anywhere(&self) -> bool {
        self.current_thread().is_some()
    }

    pub fn make_current_count(&self) -> u64 {
        self.lock().make_current
    }

    pub fn swap_count(&self) -> u64 {
        self.lock().swaps
    }

    pub fn violation_count(&self) -> u64 {
        self.lock().violations
    }

    /// The next `count` calls to `make_current` fail.
    pub fn fail_next_make_current(&self, count: u32) {
        self.lock().fail_make_current = count;
    }
}

impl GraphicsContext for HeadlessContext {
    fn make_current(&mut self) -> Result<(), ContextError> {
        let me = std::thread::current().id();
        let mut affinity = self.lock();
        if affinity.fail_make_current > 0 {
            affinity.fail_make_current -= 1;
            return Err(ContextError::MakeCurrent("injected failure".to_string()));
        }
        match affinity.current {
            Some(other) if other != me => {
                affinity.violations += 1;
                Err(ContextError::CurrentElsewhere)
            }
            _ => {
                affinity.current = Some(me);
                affinity.make_current += 1;
                Ok(())
            }
        }
    }

    fn done_current(&mut self) {
        let me = std::thread::current().id();
        let mut affinity = self.lock();
        if affinity.current == Some(me) {
            affinity.current = None;
        }
    }

    fn swap_buffers(&mut self) -> Result<(), ContextError> {
        let me = std::thread::current().id();
        let mut affinity = self.lock();
        if affinity.current != Some(me) {
            return Err(ContextError::Swap("context is not current".to_string()));
        }
        affinity.swaps += 1;
        Ok(())
    }
}
