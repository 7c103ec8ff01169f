// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::present::context::GraphicsContext;
use crate::present::device::{DisplayDevice, Layers, PresentError};
use crate::texture::{TextureHandle, UVec2};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// One call to [DisplayDevice::composite].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeRecord {
    pub scene: TextureHandle,
    pub scene_index: u32,
    pub overlay: Option<TextureHandle>,
}

#[derive(Debug, Default)]
struct DeviceLog {
    customized: u32,
    uncustomized: u32,
    composites: Vec<CompositeRecord>,
    presented: Vec<u32>,
    present_threads: Vec<ThreadId>,
    fail_customize: bool,
    fail_composites: u32,
    fail_presents: u32,
    present_delay: Duration,
    uncustomize_delay: Duration,
}

/**
A display device that records what it is asked to show.

Failures can be injected into every hook, and a delay added to `present` to stand in for
a vsync wait.  A delay on `uncustomize_context` stands in for a slow teardown.
*/
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    name: String,
    render_size: UVec2,
    null: bool,
    stereo: bool,
    log: Arc<Mutex<DeviceLog>>,
}

impl HeadlessDevice {
    pub fn new(name: &str, render_size: UVec2) -> Self {
        HeadlessDevice {
            name: name.to_string(),
            render_size,
            null: false,
            stereo: false,
            log: Arc::new(Mutex::new(DeviceLog::default())),
        }
    }

    /// A device that shows nothing.
    pub fn null() -> Self {
        HeadlessDevice {
            null: true,
            ..Self::new("null", UVec2::new(100, 100))
        }
    }

    /// A side-by-side stereo device; the render size covers both eyes.
    pub fn stereo(name: &str, eye_size: UVec2) -> Self {
        HeadlessDevice {
            stereo: true,
            ..Self::new(name, UVec2::new(eye_size.x * 2, eye_size.y))
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn customize_count(&self) -> u32 {
        self.lock().customized
    }

    pub fn uncustomize_count(&self) -> u32 {
        self.lock().uncustomized
    }

    pub fn composites(&self) -> Vec<CompositeRecord> {
        self.lock().composites.clone()
    }

    /// Frame indices successfully presented, in order.
    pub fn presented_indices(&self) -> Vec<u32> {
        self.lock().presented.clone()
    }

    /// Threads `present` was called on, one entry per successful present.
    pub fn present_threads(&self) -> Vec<ThreadId> {
        self.lock().present_threads.clone()
    }

    pub fn fail_customize(&self, fail: bool) {
        self.lock().fail_customize = fail;
    }

    pub fn fail_next_composites(&self, count: u32) {
        self.lock().fail_composites = count;
    }

    pub fn fail_next_presents(&self, count: u32) {
        self.lock().fail_presents = count;
    }

    pub fn set_present_delay(&self, delay: Duration) {
        self.lock().present_delay = delay;
    }

    pub fn set_uncustomize_delay(&self, delay: Duration) {
        self.lock().uncustomize_delay = delay;
    }

    /// Polls until `count` frames have been presented.  Returns false on timeout.
    pub fn wait_for_presents(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.lock().presented.len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl DisplayDevice for HeadlessDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_null(&self) -> bool {
        self.null
    }

    fn is_stereo(&self) -> bool {
        self.stereo
    }

    fn recommended_render_size(&self) -> UVec2 {
        self.render_size
    }

    fn recommended_ui_size(&self) -> UVec2 {
        UVec2::new(self.render_size.x / 2, self.render_size.y / 2).max(UVec2::ONE)
    }

    fn customize_context(&mut self, _context: &mut dyn GraphicsContext) -> Result<(), PresentError> {
        let mut log = self.lock();
        if log.fail_customize {
            return Err(PresentError::Device("injected customize failure".to_string()));
        }
        log.customized += 1;
        Ok(())
    }

    fn uncustomize_context(&mut self, _context: &mut dyn GraphicsContext) -> Result<(), PresentError> {
        let delay = self.lock().uncustomize_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.lock().uncustomized += 1;
        Ok(())
    }

    fn composite(&mut self, _context: &mut dyn GraphicsContext, layers: &Layers<'_>) -> Result<(), PresentError> {
        let mut log = self.lock();
        if log.fail_composites > 0 {
            log.fail_composites -= 1;
            return Err(PresentError::Device("injected composite failure".to_string()));
        }
        log.composites.push(CompositeRecord {
            scene: layers.scene.texture(),
            scene_index: layers.scene.index(),
            overlay: layers.overlay.map(|f| f.texture()),
        });
        Ok(())
    }

    fn present(&mut self, context: &mut dyn GraphicsContext) -> Result<(), PresentError> {
        let delay = {
            let mut log = self.lock();
            if log.fail_presents > 0 {
                log.fail_presents -= 1;
                return Err(PresentError::Device("injected present failure".to_string()));
            }
            log.present_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        context.swap_buffers()?;
        let mut log = self.lock();
        if let Some(last) = log.composites.last().map(|c| c.scene_index) {
            log.presented.push(last);
        }
        log.present_threads.push(std::thread::current().id());
        Ok(())
    }
}
