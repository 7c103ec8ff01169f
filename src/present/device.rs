// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The display device capability.

A [DisplayDevice] is whatever ends up showing pixels: a desktop window, a headset
compositor, or nothing at all.  Its hooks run on the thread that currently owns the
graphics context, with the context current.
*/

use crate::escrow::Frame;
use crate::present::context::{ContextError, GraphicsContext};
use crate::texture::UVec2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PresentError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("display device failed: {0}")]
    Device(String),
    #[error("the present thread is not running")]
    NotRunning,
}

/// What is composited for one present.
#[derive(Debug, Clone, Copy)]
pub struct Layers<'a> {
    pub scene: &'a Frame,
    /// Drawn over the scene when present.
    pub overlay: Option<&'a Frame>,
    pub overlay_alpha: f32,
}

pub trait DisplayDevice: Send {
    fn name(&self) -> &str;

    /// A null device shows nothing; submitted frames are released right away.
    fn is_null(&self) -> bool {
        false
    }

    fn is_stereo(&self) -> bool {
        false
    }

    fn recommended_render_size(&self) -> UVec2;

    fn recommended_ui_size(&self) -> UVec2 {
        self.recommended_render_size()
    }

    /// Sets the context up for this device.  Runs once per activation.
    fn customize_context(&mut self, context: &mut dyn GraphicsContext) -> Result<(), PresentError>;

    /// Undoes [Self::customize_context].
    fn uncustomize_context(&mut self, context: &mut dyn GraphicsContext) -> Result<(), PresentError>;

    fn composite(&mut self, context: &mut dyn GraphicsContext, layers: &Layers<'_>) -> Result<(), PresentError>;

    fn present(&mut self, context: &mut dyn GraphicsContext) -> Result<(), PresentError> {
        context.swap_buffers()?;
        Ok(())
    }
}
