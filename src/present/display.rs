// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The producer-facing side of a display.

A [Display] couples a [DisplayDevice] with two frame escrows, one for the rendered scene
and one for an optional overlay (UI) texture.  The producer submits textures; whoever
owns the graphics context presents them.  That is either a shared [PresentThread]
(threaded mode) or the producer's own thread at submission time (inline mode).

```
use present_pipeline::headless::{HeadlessContext, HeadlessDevice};
use present_pipeline::present::Display;
use present_pipeline::texture::{TextureHandle, UVec2};
use std::sync::Arc;

let device = HeadlessDevice::new("desktop", UVec2::new(64, 32));
let probe = device.clone();
let display = Display::inline(device, Arc::new(|_: TextureHandle| {}), HeadlessContext::new());
display.activate_blocking().unwrap();
display.submit_scene_texture(1, TextureHandle(7), UVec2::new(64, 32));
assert_eq!(probe.presented_indices(), vec![1]);
assert_eq!(display.recommended_render_size(), UVec2::new(64, 32));
```
*/

use crate::bittricks::{u32s_to_u64, u64_to_u32s};
use crate::escrow::{EscrowStats, Frame, FrameEscrow};
use crate::present::context::{ContextError, Current, GraphicsContext};
use crate::present::device::{DisplayDevice, Layers, PresentError};
use crate::present::reporter::PresentReporter;
use crate::present::thread::PresentThread;
use crate::texture::{ReleaseTexture, TextureHandle, UVec2};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_DISPLAY_ID: AtomicU64 = AtomicU64::new(1);

fn pack(size: UVec2) -> u64 {
    u32s_to_u64(size.x, size.y)
}

fn unpack(packed: u64) -> UVec2 {
    let (x, y) = u64_to_u32s(packed);
    UVec2::new(x, y)
}

#[derive(Debug, Default)]
struct Held {
    scene: Option<Frame>,
    overlay: Option<Frame>,
}

/// State shared between a [Display] and the thread presenting it.
pub(crate) struct DisplayCore {
    id: u64,
    name: String,
    is_null: bool,
    is_stereo: bool,
    device: Mutex<Box<dyn DisplayDevice>>,
    scene: FrameEscrow,
    overlay: FrameEscrow,
    //frames the presenter is still displaying; released on the next fetch
    held: Mutex<Held>,
    release: Arc<dyn ReleaseTexture>,
    reporter: PresentReporter,
    render_size: AtomicU64,
    ui_size: AtomicU64,
    overlay_index: AtomicU32,
    overlay_alpha: AtomicU32,
    active: AtomicBool,
}

impl std::fmt::Debug for DisplayCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DisplayCore {
    fn new(device: Box<dyn DisplayDevice>, release: Arc<dyn ReleaseTexture>) -> Self {
        DisplayCore {
            id: NEXT_DISPLAY_ID.fetch_add(1, Ordering::Relaxed),
            name: device.name().to_string(),
            is_null: device.is_null(),
            is_stereo: device.is_stereo(),
            render_size: AtomicU64::new(pack(device.recommended_render_size())),
            ui_size: AtomicU64::new(pack(device.recommended_ui_size())),
            device: Mutex::new(device),
            scene: FrameEscrow::new(release.clone()),
            overlay: FrameEscrow::new(release.clone()),
            held: Mutex::new(Held::default()),
            release,
            reporter: PresentReporter::new(),
            overlay_index: AtomicU32::new(0),
            overlay_alpha: AtomicU32::new(1.0f32.to_bits()),
            active: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn customize(&self, context: &mut dyn GraphicsContext) -> Result<(), PresentError> {
        lock(&self.device).customize_context(context)?;
        self.set_active(true);
        Ok(())
    }

    /// Undoes [Self::customize] and returns every frame this display still holds.
    pub(crate) fn uncustomize(&self, context: &mut dyn GraphicsContext) -> Result<(), PresentError> {
        self.set_active(false);
        let result = lock(&self.device).uncustomize_context(context);
        self.release_frames();
        result
    }

    /// Drops the target without its teardown hook, returning every frame it holds.
    pub(crate) fn abandon(&self) {
        self.set_active(false);
        self.release_frames();
    }

    fn release_frames(&self) {
        let mut held = lock(&self.held);
        self.scene.release_held(&mut held.scene);
        self.overlay.release_held(&mut held.overlay);
        drop(held);
        self.scene.clear();
        self.overlay.clear();
    }

    /**
    Presents the newest signaled scene frame, if there is one.

    Returns whether a frame was fetched.  Composite and present failures are logged and
    abandon only this frame.
    */
    pub(crate) fn present_next(&self, context: &mut dyn GraphicsContext) -> bool {
        let mut held = lock(&self.held);
        if !self.scene.fetch_signaled(&mut held.scene) {
            return false;
        }
        self.overlay.fetch_signaled(&mut held.overlay);
        self.present_held(&held, context);
        true
    }

    /// Like [Self::present_next] but waits for the pending frame's fence.
    pub(crate) fn present_blocking(&self, context: &mut dyn GraphicsContext) -> bool {
        let mut held = lock(&self.held);
        if !self.scene.fetch_blocking(&mut held.scene) {
            return false;
        }
        self.overlay.fetch_blocking(&mut held.overlay);
        self.present_held(&held, context);
        true
    }

    fn present_held(&self, held: &Held, context: &mut dyn GraphicsContext) {
        let Some(scene) = held.scene.as_ref() else {
            return;
        };
        let index = scene.index();
        self.reporter.sender().record_new_frame(index);
        let overlay_alpha = f32::from_bits(self.overlay_alpha.load(Ordering::Relaxed));
        //an overlay drawn for another surface size would be stretched
        let surface = unpack(self.render_size.load(Ordering::Relaxed));
        let layers = Layers {
            scene,
            overlay: held
                .overlay
                .as_ref()
                .filter(|overlay| overlay_alpha > 0.0 && overlay.size() == surface),
            overlay_alpha,
        };
        let mut device = lock(&self.device);
        let composite = logwise::perfwarn_begin!("DisplayCore::composite");
        let composited = device.composite(context, &layers);
        drop(composite);
        if let Err(e) = composited {
            logwise::warn_sync!(
                "{name}: composite of frame {index} failed: {err}",
                name = logwise::privacy::LogIt(&self.name),
                index = index,
                err = logwise::privacy::LogIt(&e)
            );
            return;
        }
        let present = logwise::perfwarn_begin!("DisplayCore::present");
        let presented = device.present(context);
        drop(present);
        match presented {
            Ok(()) => self.reporter.sender().record_present(index),
            Err(e) => logwise::warn_sync!(
                "{name}: present of frame {index} failed: {err}",
                name = logwise::privacy::LogIt(&self.name),
                index = index,
                err = logwise::privacy::LogIt(&e)
            ),
        }
    }
}

impl Drop for DisplayCore {
    fn drop(&mut self) {
        let held = self.held.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.scene.release_held(&mut held.scene);
        self.overlay.release_held(&mut held.overlay);
    }
}

enum Mode {
    Threaded(Arc<PresentThread>),
    Inline(Mutex<Box<dyn GraphicsContext>>),
}

/// A display as seen by the producer.
pub struct Display {
    core: Arc<DisplayCore>,
    mode: Mode,
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("core", &self.core)
            .field(
                "threaded",
                &matches!(self.mode, Mode::Threaded(_)),
            )
            .finish()
    }
}

impl Display {
    /**
    A display presented by `thread`.

    Any number of displays may share one thread; activating one replaces whichever was
    active.  `release` receives every texture once the display is done with it.
    */
    pub fn threaded<D: DisplayDevice + 'static>(
        device: D,
        release: Arc<dyn ReleaseTexture>,
        thread: &Arc<PresentThread>,
    ) -> Self {
        Display {
            core: Arc::new(DisplayCore::new(Box::new(device), release)),
            mode: Mode::Threaded(thread.clone()),
        }
    }

    /// A display presented synchronously on the submitting thread.
    pub fn inline<D: DisplayDevice + 'static, C: GraphicsContext + 'static>(
        device: D,
        release: Arc<dyn ReleaseTexture>,
        context: C,
    ) -> Self {
        Display {
            core: Arc::new(DisplayCore::new(Box::new(device), release)),
            mode: Mode::Inline(Mutex::new(Box::new(context))),
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    pub fn is_null(&self) -> bool {
        self.core.is_null
    }

    /**
    Whether the device shows a separate image to each eye.

    Producers use this to decide whether to render with a
    [crate::transform::StereoState] bound to their [crate::backend::RenderContext].
    */
    pub fn is_stereo(&self) -> bool {
        self.core.is_stereo
    }

    /// Resolves once the device has customized the context.
    pub async fn activate(&self) -> Result<(), PresentError> {
        match &self.mode {
            Mode::Threaded(thread) => thread.activate(self.core.clone()).await,
            Mode::Inline(context) => {
                let mut context = lock(context);
                let mut current = Current::new(&mut **context)?;
                self.core.customize(&mut *current)?;
                logwise::info_sync!(
                    "activated {name}",
                    name = logwise::privacy::LogIt(self.core.name())
                );
                Ok(())
            }
        }
    }

    pub async fn deactivate(&self) -> Result<(), PresentError> {
        match &self.mode {
            Mode::Threaded(thread) => thread.deactivate(self.core.id()).await,
            Mode::Inline(context) => {
                if !self.core.is_active() {
                    return Ok(());
                }
                let mut context = lock(context);
                let mut current = Current::new(&mut **context)?;
                self.core.uncustomize(&mut *current)?;
                logwise::info_sync!(
                    "deactivated {name}",
                    name = logwise::privacy::LogIt(self.core.name())
                );
                Ok(())
            }
        }
    }

    pub fn activate_blocking(&self) -> Result<(), PresentError> {
        test_executors::sleep_on(self.activate())
    }

    pub fn deactivate_blocking(&self) -> Result<(), PresentError> {
        test_executors::sleep_on(self.deactivate())
    }

    /// Submits a completed scene render.  Never blocks on the presenter.
    pub fn submit_scene_texture(&self, index: u32, texture: TextureHandle, size: UVec2) {
        self.submit_scene_frame(Frame::new(texture, index, size));
    }

    /// Like [Self::submit_scene_texture] for a frame that may carry a fence.
    pub fn submit_scene_frame(&self, frame: Frame) {
        if self.core.is_null {
            self.core.release.release_texture(frame.texture());
            return;
        }
        self.core.scene.submit(frame);
        self.present_inline();
    }

    /// Submits the overlay drawn over subsequent scene frames.
    pub fn submit_overlay_texture(&self, texture: TextureHandle, size: UVec2) {
        if self.core.is_null {
            self.core.release.release_texture(texture);
            return;
        }
        let index = self.core.overlay_index.fetch_add(1, Ordering::Relaxed) + 1;
        self.core.overlay.submit(Frame::new(texture, index, size));
    }

    /// Overlay opacity; 0 disables compositing the overlay.
    pub fn set_overlay_alpha(&self, alpha: f32) {
        self.core
            .overlay_alpha
            .store(alpha.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn present_inline(&self) {
        let Mode::Inline(context) = &self.mode else {
            return;
        };
        if !self.core.is_active() {
            return;
        }
        let mut context = lock(context);
        match Current::new(&mut **context) {
            Ok(mut current) => {
                self.core.present_blocking(&mut *current);
            }
            Err(e) => logwise::warn_sync!(
                "inline present could not make the context current: {err}",
                err = logwise::privacy::LogIt(&e)
            ),
        }
    }

    pub fn recommended_render_size(&self) -> UVec2 {
        unpack(self.core.render_size.load(Ordering::Relaxed))
    }

    pub fn recommended_ui_size(&self) -> UVec2 {
        unpack(self.core.ui_size.load(Ordering::Relaxed))
    }

    /// Queries the device again, for devices whose size can change.
    pub fn refresh_recommended_sizes(&self) {
        let device = lock(&self.core.device);
        self.core
            .render_size
            .store(pack(device.recommended_render_size()), Ordering::Relaxed);
        self.core
            .ui_size
            .store(pack(device.recommended_ui_size()), Ordering::Relaxed);
    }

    /// Runs `f` with the graphics context current on the calling thread.
    pub fn with_main_thread_context<R>(
        &self,
        f: impl FnOnce(&mut dyn GraphicsContext) -> R,
    ) -> Result<R, ContextError> {
        match &self.mode {
            Mode::Threaded(thread) => thread.with_main_thread_context(f),
            Mode::Inline(context) => {
                let mut context = lock(context);
                let mut current = Current::new(&mut **context)?;
                Ok(f(&mut *current))
            }
        }
    }

    pub fn reporter(&self) -> PresentReporter {
        self.core.reporter.clone()
    }

    pub fn scene_stats(&self) -> EscrowStats {
        self.core.scene.stats()
    }

    pub fn overlay_stats(&self) -> EscrowStats {
        self.core.overlay.stats()
    }
}
