// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Configuration for the pipeline's components.
//!
//! Every struct here is plain data with public fields and a [Default] that matches the
//! values a desktop VR viewer runs with.  Override individual fields with struct update
//! syntax:
//!
//! ```
//! use present_pipeline::config::PresentConfig;
//! use std::time::Duration;
//!
//! let config = PresentConfig {
//!     shutdown_timeout: Duration::from_millis(500),
//!     ..Default::default()
//! };
//! assert_eq!(config.thread_name, "present");
//! ```

use glam::UVec2;
use std::time::Duration;

/// Configures a [crate::present::PresentThread].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentConfig {
    /// Name given to the OS thread.
    pub thread_name: String,
    /// How long the loop sleeps per iteration while no display target is bound.
    pub idle_sleep: Duration,
    /// How long the loop sleeps when a target is bound but no frame is pending.
    pub frame_poll_interval: Duration,
    /// How long [crate::present::PresentThread::shutdown] waits for the thread to terminate.
    pub shutdown_timeout: Duration,
}

impl Default for PresentConfig {
    fn default() -> Self {
        PresentConfig {
            thread_name: "present".to_string(),
            idle_sleep: Duration::from_micros(100),
            frame_poll_interval: Duration::from_micros(100),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Configures a [crate::transform::TransformStage].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformConfig {
    /**
    Alignment of each camera snapshot inside the camera buffer.

    Uniform bindings at an offset generally have to be aligned; 256 bytes satisfies every
    common native API.  Values that are not a power of two are rounded up to one.
    */
    pub uniform_alignment: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            uniform_alignment: 256,
        }
    }
}

/// Configures a [crate::texture::TextureRecycler].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecyclerConfig {
    pub initial_size: UVec2,
}

impl Default for RecyclerConfig {
    fn default() -> Self {
        RecyclerConfig {
            initial_size: UVec2::new(1920, 1080),
        }
    }
}
