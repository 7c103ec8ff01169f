// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
CPU-side resources and their dirty tracking.

A resource is exclusively owned by whatever holds it (a batch, a transform stage, a
uniform container).  Backends never hold a reference back to it; they remember a
[BufferId] and the last [Stamp] they uploaded, which is enough to find their own mirror
and to skip transfers that would not change anything.
*/

pub mod buffer;
pub mod sysmem;

use std::sync::atomic::{AtomicU64, Ordering};

pub use buffer::{Buffer, DirtyRange, DirtyRanges};
pub use sysmem::{Stamp, Sysmem};

/// Default dirty-tracking granularity.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/**
Lookup-only identity of a [Buffer].

Backend mirrors are keyed by this rather than by a reference to the buffer.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

impl BufferId {
    pub(crate) fn next() -> Self {
        BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}
