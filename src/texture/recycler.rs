// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A pool of render-target textures reused across frames.

GPU texture allocation is comparatively expensive, so instead of allocating a texture per
frame the producer asks the recycler for one and the display returns it once it has been
presented.  The pool has a single target size: textures of any other size are evicted as
soon as they are idle, and never handed out again.

# States

Every texture the recycler knows is either *in use* (handed out, not yet returned) or
*ready* (idle, queued for reuse).  Evicted textures are deallocated and forgotten.

```
use present_pipeline::headless::HeadlessAllocator;
use present_pipeline::texture::{TextureRecycler, UVec2};

let recycler = TextureRecycler::new(HeadlessAllocator::new(), UVec2::new(64, 64));
let a = recycler.get_next_texture();
recycler.recycle_texture(a).unwrap();
//the idle texture is reused
assert_eq!(recycler.get_next_texture(), a);
```
*/

use crate::config::RecyclerConfig;
use crate::texture::{ReleaseTexture, TextureAllocator, TextureHandle, UVec2};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RecycleError {
    #[error("texture {0:?} was not allocated by this recycler")]
    UnknownTexture(TextureHandle),
    #[error("texture {0:?} is not in use")]
    NotInUse(TextureHandle),
}

/// A snapshot of the pool's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecyclerStats {
    pub target_size: UVec2,
    pub in_use: usize,
    pub ready: usize,
    pub allocations: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    InUse,
    Ready,
}

#[derive(Debug)]
struct Entry {
    size: UVec2,
    state: EntryState,
    //set by clear() on textures that were out at the time
    retired: bool,
}

struct Inner {
    size: UVec2,
    entries: HashMap<TextureHandle, Entry>,
    ready: VecDeque<TextureHandle>,
    allocator: Box<dyn TextureAllocator>,
    allocations: u64,
    evictions: u64,
}

impl Inner {
    fn evict(&mut self, handle: TextureHandle) {
        self.entries.remove(&handle);
        self.allocator.deallocate(handle);
        self.evictions += 1;
    }
}

pub struct TextureRecycler {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for TextureRecycler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureRecycler")
            .field("stats", &self.stats())
            .finish()
    }
}

impl TextureRecycler {
    pub fn new<A: TextureAllocator + 'static>(allocator: A, size: UVec2) -> Self {
        TextureRecycler {
            inner: Mutex::new(Inner {
                size,
                entries: HashMap::new(),
                ready: VecDeque::new(),
                allocator: Box::new(allocator),
                allocations: 0,
                evictions: 0,
            }),
        }
    }

    pub fn with_config<A: TextureAllocator + 'static>(allocator: A, config: &RecyclerConfig) -> Self {
        Self::new(allocator, config.initial_size)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> UVec2 {
        self.lock().size
    }

    /**
    Sets the target size.

    Idle textures of any other size are evicted immediately.  Textures currently in use
    are left alone and evicted when they come back.
    */
    pub fn set_size(&self, size: UVec2) {
        let mut inner = self.lock();
        if inner.size == size {
            return;
        }
        inner.size = size;
        let ready = std::mem::take(&mut inner.ready);
        let mut evicted = 0;
        for handle in ready {
            let stale = inner
                .entries
                .get(&handle)
                .is_some_and(|entry| entry.size != size);
            if stale {
                inner.evict(handle);
                evicted += 1;
            } else {
                inner.ready.push_back(handle);
            }
        }
        drop(inner);
        logwise::trace_sync!(
            "recycler resized to {size}, evicted {evicted} idle textures",
            size = logwise::privacy::LogIt(size),
            evicted = evicted
        );
    }

    /**
    Returns a texture of the current target size, marked in use.

    Reuses an idle texture if there is one, otherwise allocates.
    */
    pub fn get_next_texture(&self) -> TextureHandle {
        let mut inner = self.lock();
        while let Some(handle) = inner.ready.pop_front() {
            if let Some(entry) = inner.entries.get_mut(&handle) {
                entry.state = EntryState::InUse;
                return handle;
            }
        }
        let size = inner.size;
        let handle = inner.allocator.allocate(size);
        inner.allocations += 1;
        inner.entries.insert(
            handle,
            Entry {
                size,
                state: EntryState::InUse,
                retired: false,
            },
        );
        handle
    }

    /**
    Returns a texture to the pool.

    A texture whose size no longer matches the target is deallocated instead of being
    queued.  Returning a texture that is unknown or not in use is a programming error:
    it is rejected without touching the pool, and traps in debug builds.
    */
    pub fn recycle_texture(&self, handle: TextureHandle) -> Result<(), RecycleError> {
        let result = {
            let mut inner = self.lock();
            let target = inner.size;
            match inner.entries.get_mut(&handle) {
                None => Err(RecycleError::UnknownTexture(handle)),
                Some(entry) if entry.state != EntryState::InUse => {
                    Err(RecycleError::NotInUse(handle))
                }
                Some(entry) => {
                    if entry.retired || entry.size != target {
                        inner.evict(handle);
                    } else {
                        entry.state = EntryState::Ready;
                        inner.ready.push_back(handle);
                    }
                    Ok(())
                }
            }
        };
        if let Err(e) = &result {
            logwise::error_sync!("recycle_texture: {err}", err = logwise::privacy::LogIt(e));
            debug_assert!(false, "recycle_texture contract violation: {e}");
        }
        result
    }

    /**
    Deallocates every idle texture.

    Textures in use stay valid for their holder and are deallocated when they come back.
    */
    pub fn clear(&self) {
        let mut inner = self.lock();
        let ready = std::mem::take(&mut inner.ready);
        for handle in ready {
            inner.evict(handle);
        }
        for entry in inner.entries.values_mut() {
            entry.retired = true;
        }
    }

    pub fn stats(&self) -> RecyclerStats {
        let inner = self.lock();
        let in_use = inner
            .entries
            .values()
            .filter(|e| e.state == EntryState::InUse)
            .count();
        RecyclerStats {
            target_size: inner.size,
            in_use,
            ready: inner.ready.len(),
            allocations: inner.allocations,
            evictions: inner.evictions,
        }
    }
}

impl ReleaseTexture for TextureRecycler {
    fn release_texture(&self, handle: TextureHandle) {
        //already logged
        let _ = self.recycle_texture(handle);
    }
}
