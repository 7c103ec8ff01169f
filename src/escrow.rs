// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The cross-thread handoff of completed frames.

A [FrameEscrow] is a single slot.  The producer [submit](FrameEscrow::submit)s a frame
whenever a render completes; the consumer fetches whatever is in the slot when it is ready
to present.  A producer running faster than the consumer does not build a backlog: the
frame sitting in the slot is superseded and its texture goes straight back through the
release callback without ever being displayed.

```
use present_pipeline::escrow::{Frame, FrameEscrow};
use present_pipeline::texture::{TextureHandle, UVec2};
use std::sync::{Arc, Mutex};

let released = Arc::new(Mutex::new(Vec::new()));
let sink = released.clone();
let escrow = FrameEscrow::new(Arc::new(move |h: TextureHandle| sink.lock().unwrap().push(h)));

let size = UVec2::new(4, 4);
for index in 1..=3 {
    escrow.submit(Frame::new(TextureHandle(index as u64), index, size));
}
//only the newest frame survived
assert_eq!(*released.lock().unwrap(), vec![TextureHandle(1), TextureHandle(2)]);

let mut held = None;
assert!(escrow.fetch_signaled(&mut held));
assert_eq!(held.as_ref().unwrap().index(), 3);
assert!(!escrow.fetch_signaled(&mut held));
```
*/

use crate::texture::{ReleaseTexture, TextureHandle, UVec2};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/**
GPU-side completion of the work that produced a frame.

A frame without a fence is complete when submitted.
*/
pub trait Fence: Send + Debug {
    /// Returns whether the GPU work has completed, without blocking.
    fn is_signaled(&self) -> bool;
    /// Blocks until the GPU work has completed.
    fn wait(&self);
}

/**
A completed render, identified by a caller-assigned frame index.

`Frame` is deliberately not `Clone`: whoever owns it is responsible for handing it back
through [FrameEscrow::release], so a texture cannot be returned twice.
*/
#[derive(Debug)]
pub struct Frame {
    texture: TextureHandle,
    index: u32,
    size: UVec2,
    fence: Option<Box<dyn Fence>>,
}

impl Frame {
    pub fn new(texture: TextureHandle, index: u32, size: UVec2) -> Self {
        Frame {
            texture,
            index,
            size,
            fence: None,
        }
    }

    /// Attaches the fence that signals when rendering into `texture` has finished.
    pub fn with_fence<F: Fence + 'static>(mut self, fence: F) -> Self {
        self.fence = Some(Box::new(fence));
        self
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn is_signaled(&self) -> bool {
        self.fence.as_ref().is_none_or(|f| f.is_signaled())
    }

    fn wait(&self) {
        if let Some(fence) = &self.fence {
            fence.wait();
        }
    }
}

#[derive(Debug, Default)]
struct State {
    pending: Option<Frame>,
    last_submitted: Option<u32>,
    submitted: u64,
    superseded: u64,
}

/// Counters describing an escrow's traffic so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EscrowStats {
    pub submitted: u64,
    /// Frames replaced in the slot before anyone fetched them.
    pub superseded: u64,
    pub pending: Option<u32>,
}

pub struct FrameEscrow {
    state: Mutex<State>,
    release: Arc<dyn ReleaseTexture>,
}

impl Debug for FrameEscrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameEscrow")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl FrameEscrow {
    pub fn new(release: Arc<dyn ReleaseTexture>) -> Self {
        FrameEscrow {
            state: Mutex::new(State::default()),
            release,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /**
    Places `frame` in the slot.

    Never blocks on the consumer.  A frame already in the slot is released immediately.
    A frame whose index is not newer than the last submitted one is a programming error;
    it is released instead of being queued.

    Returns whether `frame` was queued.
    */
    pub fn submit(&self, frame: Frame) -> bool {
        let mut state = self.lock();
        if let Some(last) = state.last_submitted
            && frame.index <= last
        {
            drop(state);
            let index = frame.index;
            self.release(frame);
            logwise::error_sync!(
                "frame {index} submitted after frame {last}",
                index = index,
                last = last
            );
            debug_assert!(false, "stale frame index {index} (last {last})");
            return false;
        }
        state.last_submitted = Some(frame.index);
        state.submitted += 1;
        let superseded = state.pending.replace(frame);
        if superseded.is_some() {
            state.superseded += 1;
        }
        drop(state);
        if let Some(old) = superseded {
            logwise::trace_sync!("dropping superseded frame {index}", index = old.index);
            self.release(old);
        }
        true
    }

    /**
    Takes the pending frame if its GPU work is already complete.

    Returns `false` without changing anything if the slot is empty or its frame is not
    signaled yet.  Otherwise `held` receives the new frame; a frame previously in `held`
    is released first.
    */
    pub fn fetch_signaled(&self, held: &mut Option<Frame>) -> bool {
        let fetched = {
            let mut state = self.lock();
            match &state.pending {
                Some(frame) if frame.is_signaled() => state.pending.take(),
                _ => None,
            }
        };
        self.exchange(held, fetched)
    }

    /**
    Takes the pending frame, blocking until its GPU work completes.

    Returns `false` if the slot is empty.  The wait happens outside the lock, so the
    producer can keep submitting meanwhile.
    */
    pub fn fetch_blocking(&self, held: &mut Option<Frame>) -> bool {
        let fetched = self.lock().pending.take();
        if let Some(frame) = &fetched {
            frame.wait();
        }
        self.exchange(held, fetched)
    }

    fn exchange(&self, held: &mut Option<Frame>, fetched: Option<Frame>) -> bool {
        match fetched {
            None => false,
            Some(frame) => {
                if let Some(old) = held.replace(frame) {
                    self.release(old);
                }
                true
            }
        }
    }

    /// Hands `frame`'s texture to the release callback.
    pub fn release(&self, frame: Frame) {
        self.release.release_texture(frame.texture);
    }

    /// Releases the frame in `held`, if any.
    pub fn release_held(&self, held: &mut Option<Frame>) {
        if let Some(frame) = held.take() {
            self.release(frame);
        }
    }

    /// Releases whatever is pending.  The index history is kept.
    pub fn clear(&self) {
        let pending = self.lock().pending.take();
        if let Some(frame) = pending {
            self.release(frame);
        }
    }

    pub fn stats(&self) -> EscrowStats {
        let state = self.lock();
        EscrowStats {
            submitted: state.submitted,
            superseded: state.superseded,
            pending: state.pending.as_ref().map(|f| f.index),
        }
    }
}

impl Drop for FrameEscrow {
    fn drop(&mut self) {
        let pending = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .take();
        if let Some(frame) = pending {
            self.release.release_texture(frame.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Fence, Frame, FrameEscrow};
    use crate::headless::ManualFence;
    use crate::texture::{TextureHandle, UVec2};
    use std::sync::{Arc, Mutex};

    fn escrow() -> (FrameEscrow, Arc<Mutex<Vec<TextureHandle>>>) {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();
        let escrow = FrameEscrow::new(Arc::new(move |h: TextureHandle| {
            sink.lock().unwrap().push(h)
        }));
        (escrow, released)
    }

    fn frame(index: u32) -> Frame {
        Frame::new(TextureHandle(index as u64 * 10), index, UVec2::new(2, 2))
    }

    #[test]
    fn keeps_only_the_newest_pending_frame() {
        for n in 1..8u32 {
            let (escrow, released) = escrow();
            for i in 1..=n {
                assert!(escrow.submit(frame(i)));
            }
            assert_eq!(escrow.stats().pending, Some(n));
            assert_eq!(released.lock().unwrap().len(), (n - 1) as usize);
            assert_eq!(escrow.stats().superseded, (n - 1) as u64);
        }
    }

    #[test]
    fn fetch_releases_previously_held_frame() {
        let (escrow, released) = escrow();
        let mut held = None;
        escrow.submit(frame(1));
        assert!(escrow.fetch_signaled(&mut held));
        escrow.submit(frame(2));
        assert!(escrow.fetch_signaled(&mut held));
        assert_eq!(held.as_ref().map(Frame::index), Some(2));
        assert_eq!(*released.lock().unwrap(), vec![TextureHandle(10)]);
        escrow.release_held(&mut held);
        assert!(held.is_none());
        assert_eq!(released.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_fetch_changes_nothing() {
        let (escrow, released) = escrow();
        let mut held = None;
        assert!(!escrow.fetch_signaled(&mut held));
        assert!(!escrow.fetch_blocking(&mut held));
        escrow.submit(frame(1));
        assert!(escrow.fetch_signaled(&mut held));
        assert!(!escrow.fetch_signaled(&mut held));
        //still holding frame 1
        assert_eq!(held.as_ref().map(Frame::index), Some(1));
        assert!(released.lock().unwrap().is_empty());
    }

    #[test]
    fn unsignaled_frame_stays_pending() {
        let (escrow, _) = escrow();
        let fence = ManualFence::new();
        escrow.submit(frame(1).with_fence(fence.clone()));
        let mut held = None;
        assert!(!escrow.fetch_signaled(&mut held));
        assert_eq!(escrow.stats().pending, Some(1));
        fence.signal();
        assert!(fence.is_signaled());
        assert!(escrow.fetch_signaled(&mut held));
    }

    #[test]
    fn blocking_fetch_waits_for_the_fence() {
        let (escrow, _) = escrow();
        let fence = ManualFence::new();
        escrow.submit(frame(1).with_fence(fence.clone()));
        let signaler = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            fence.signal();
        });
        let mut held = None;
        assert!(escrow.fetch_blocking(&mut held));
        assert!(held.as_ref().is_some_and(Frame::is_signaled));
        signaler.join().unwrap();
    }

    #[test]
    fn dropping_the_escrow_releases_the_pending_frame() {
        let (escrow, released) = escrow();
        escrow.submit(frame(4));
        drop(escrow);
        assert_eq!(*released.lock().unwrap(), vec![TextureHandle(40)]);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "stale frame index"))]
    fn stale_index_is_rejected() {
        let (escrow, released) = escrow();
        escrow.submit(frame(5));
        assert!(!escrow.submit(frame(5)));
        assert_eq!(escrow.stats().pending, Some(5));
        assert_eq!(released.lock().unwrap().len(), 1);
    }
}
