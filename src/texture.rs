// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Texture identities and the seams through which textures are created and returned.

The crate never talks to a native graphics API directly.  Textures are opaque
[TextureHandle]s; creating and destroying them is delegated to a [TextureAllocator], and
returning a texture after display goes through [ReleaseTexture].
*/

pub mod recycler;

pub use glam::UVec2;
pub use recycler::{RecycleError, RecyclerStats, TextureRecycler};

/// Opaque identity of a native texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/**
Creates and destroys native textures.

Implementations are called with the recycler's lock held, so they must not call back into
the recycler.
*/
pub trait TextureAllocator: Send {
    fn allocate(&mut self, size: UVec2) -> TextureHandle;
    fn deallocate(&mut self, handle: TextureHandle);
}

/**
Receives textures once their consumer is done reading them.

This is the "release/recycle callback" a frame escrow invokes when a frame's last
reference goes away.
*/
pub trait ReleaseTexture: Send + Sync {
    fn release_texture(&self, handle: TextureHandle);
}

impl<F> ReleaseTexture for F
where
    F: Fn(TextureHandle) + Send + Sync,
{
    fn release_texture(&self, handle: TextureHandle) {
        self(handle)
    }
}
