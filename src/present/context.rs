// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The native graphics context capability.

A context has single-thread affinity: it may be current on at most one thread at a time.
The crate moves the `Box<dyn GraphicsContext>` itself between threads, so whoever owns the
box is the only party that can make it current.
*/

use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ContextError {
    #[error("could not make the context current: {0}")]
    MakeCurrent(String),
    #[error("could not swap buffers: {0}")]
    Swap(String),
    #[error("context is current on another thread")]
    CurrentElsewhere,
    #[error("no context is available")]
    Unavailable,
}

pub trait GraphicsContext: Send + Debug {
    fn make_current(&mut self) -> Result<(), ContextError>;
    fn done_current(&mut self);
    fn swap_buffers(&mut self) -> Result<(), ContextError>;
}

/**
A context made current on this thread for as long as the guard lives.

```
use present_pipeline::headless::HeadlessContext;
use present_pipeline::present::context::Current;
use present_pipeline::present::GraphicsContext;

let mut context = HeadlessContext::new();
let probe = context.clone();
{
    let mut current = Current::new(&mut context).unwrap();
    current.swap_buffers().unwrap();
    assert!(probe.is_current_here());
}
assert!(!probe.is_current_here());
```
*/
#[derive(Debug)]
pub struct Current<'a, C: GraphicsContext + ?Sized> {
    context: &'a mut C,
}

impl<'a, C: GraphicsContext + ?Sized> Current<'a, C> {
    pub fn new(context: &'a mut C) -> Result<Self, ContextError> {
        context.make_current()?;
        Ok(Current { context })
    }
}

impl<C: GraphicsContext + ?Sized> Deref for Current<'_, C> {
    type Target = C;
    fn deref(&self) -> &C {
        self.context
    }
}

impl<C: GraphicsContext + ?Sized> DerefMut for Current<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.context
    }
}

impl<C: GraphicsContext + ?Sized> Drop for Current<'_, C> {
    fn drop(&mut self) {
        self.context.done_current();
    }
}
