// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::texture::{TextureAllocator, TextureHandle, UVec2};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Textures {
    next: u64,
    live: HashMap<TextureHandle, UVec2>,
    allocations: u64,
    double_frees: u64,
}

/// Hands out texture handles and remembers which are live.
#[derive(Debug, Clone, Default)]
pub struct HeadlessAllocator {
    textures: Arc<Mutex<Textures>>,
}

impl HeadlessAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Textures> {
        self.textures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_live(&self, handle: TextureHandle) -> bool {
        self.lock().live.contains_key(&handle)
    }

    pub fn size_of(&self, handle: TextureHandle) -> Option<UVec2> {
        self.lock().live.get(&handle).copied()
    }

    pub fn allocation_count(&self) -> u64 {
        self.lock().allocations
    }

    /// Deallocations of handles that were not live.
    pub fn double_free_count(&self) -> u64 {
        self.lock().double_frees
    }
}

impl TextureAllocator for HeadlessAllocator {
    fn allocate(&mut self, size: UVec2) -> TextureHandle {
        let mut textures = self.lock();
        textures.next += 1;
        let handle = TextureHandle(textures.next);
        textures.live.insert(handle, size);
        textures.allocations += 1;
        handle
    }

    fn deallocate(&mut self, handle: TextureHandle) {
        let mut textures = self.lock();
        if textures.live.remove(&handle).is_none() {
            textures.double_frees += 1;
        }
    }
}
