// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Presentation: moving frames from the producer to a display.

* [context] is the native graphics context capability.
* [device] is the display device capability.
* [thread] is the dedicated thread that owns the context and presents.
* [display] is what the producer talks to.
* [reporter] exposes presentation statistics.
*/

pub mod context;
pub mod device;
pub mod display;
pub mod reporter;
pub mod thread;

pub use context::{ContextError, Current, GraphicsContext};
pub use device::{DisplayDevice, Layers, PresentError};
pub use display::Display;
pub use reporter::{PresentReporter, RateCounter};
pub use thread::{PresentPhase, PresentThread, ShutdownError};
