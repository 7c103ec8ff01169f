// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Software implementations of every capability the pipeline needs.

These back the test suite and let the pipeline run without a native graphics API.  Each
type is cheaply cloneable: clones share state, so a test keeps one clone as a probe after
handing the other to the pipeline.
*/

mod allocator;
mod backend;
mod context;
mod device;
mod fence;

pub use allocator::HeadlessAllocator;
pub use backend::{BackendEvent, RecordingBackend};
pub use context::HeadlessContext;
pub use device::{CompositeRecord, HeadlessDevice};
pub use fence::ManualFence;
