// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! present_pipeline moves finished frames from a renderer to a display, for VR and 3D
viewers that cannot afford to block the renderer on the display's refresh rate.

A producer thread renders at its own pace.  A dedicated presentation thread owns the
native graphics context and shows whatever is newest, possibly on a headset with its own
vsync.  Between them sit the pieces this crate provides:

| Piece                          | Module      | Touched by        | What it guarantees                                                   |
|--------------------------------|-------------|-------------------|----------------------------------------------------------------------|
| Paged buffers                  | [resource]  | owner only        | only pages written since the last upload are transferred             |
| Command batches                | [batch]     | producer, replay  | recording never touches native objects                               |
| Camera bookkeeping             | [transform] | replay            | one camera capture per distinct state, one per eye in stereo         |
| Texture pool                   | [texture]   | both threads      | no stale-size texture is handed out; textures are reused, not freed  |
| Frame escrow                   | [escrow]    | both threads      | at most one pending frame; the producer never blocks                 |
| Presentation thread & displays | [present]   | both threads      | the context is current on one thread at a time, and never lost       |

# A frame's life

1. The producer takes a texture from a [texture::TextureRecycler] sized to
   [present::Display::recommended_render_size].
2. It records a [batch::Batch] and replays it through a [backend::RenderContext] into the
   texture.  Buffers are uploaded page by page; stereo draws are instanced per eye
   rather than issued twice.
3. It submits the texture with [present::Display::submit_scene_texture].  If an older
   frame was still waiting, that one goes straight back to the pool.
4. The [present::PresentThread] fetches the newest frame whose GPU work has finished,
   composites an optional overlay over it, and presents it.
5. Once the next frame has been fetched, the previous one goes back to the pool.

# Capabilities

Native APIs plug in through three traits: [present::GraphicsContext],
[present::DisplayDevice] and [backend::Backend], plus [texture::TextureAllocator] for
texture storage.  [headless] implements all of them in software.

```
use present_pipeline::config::PresentConfig;
use present_pipeline::headless::{HeadlessAllocator, HeadlessContext, HeadlessDevice};
use present_pipeline::present::{Display, PresentThread};
use present_pipeline::texture::{TextureRecycler, UVec2};
use std::sync::Arc;
use std::time::Duration;

let thread = PresentThread::spawn(HeadlessContext::new(), PresentConfig::default()).unwrap();
let device = HeadlessDevice::new("window", UVec2::new(320, 240));
let probe = device.clone();
let recycler = Arc::new(TextureRecycler::new(HeadlessAllocator::new(), UVec2::new(320, 240)));
let display = Display::threaded(device, recycler.clone(), &thread);
display.activate_blocking().unwrap();

let texture = recycler.get_next_texture();
display.submit_scene_texture(1, texture, display.recommended_render_size());
assert!(probe.wait_for_presents(1, Duration::from_secs(5)));

display.deactivate_blocking().unwrap();
thread.shutdown().unwrap();
//the presented texture came back
assert_eq!(recycler.stats().ready, 1);
```

# Errors

Nothing crosses from the presentation thread to the producer as an error.  Failures in
device hooks are logged through `logwise` and cost one frame.  Misuse of a pool or
escrow (returning a texture twice, submitting a stale frame index) is rejected and
logged, and trips a `debug_assert!` in debug builds.
*/

pub mod backend;
pub mod batch;
mod bittricks;
pub mod config;
pub mod escrow;
pub mod headless;
pub mod present;
pub mod resource;
pub mod texture;
pub mod transform;

pub use glam;
