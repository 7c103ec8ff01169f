// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The camera uniform captured for a range of commands.

use crate::transform::stereo::{Eye, StereoState};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/**
One camera state as laid out in the camera uniform buffer.

`view` maps world to camera space; `view_inverse` is the camera's world transform.
`projection_view_untranslated` is `projection * view` with the translation removed,
which is what skybox-style shaders want.
*/
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraSnapshot {
    pub view: Mat4,
    pub view_inverse: Mat4,
    pub projection_view_untranslated: Mat4,
    pub projection: Mat4,
    pub projection_inverse: Mat4,
    /// `x, y, width, height` in pixels.
    pub viewport: Vec4,
}

impl Default for CameraSnapshot {
    fn default() -> Self {
        CameraSnapshot::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec4::ZERO)
    }
}

impl CameraSnapshot {
    /// Builds a snapshot from the camera's world transform.
    pub fn new(camera_transform: Mat4, projection: Mat4, viewport: Vec4) -> Self {
        let mut snapshot = CameraSnapshot {
            view: Mat4::IDENTITY,
            view_inverse: Mat4::IDENTITY,
            projection_view_untranslated: Mat4::IDENTITY,
            projection,
            projection_inverse: Mat4::IDENTITY,
            viewport,
        };
        snapshot.recompute_derived(camera_transform);
        snapshot
    }

    /// Recomputes every matrix that depends on the camera transform or the projection.
    pub fn recompute_derived(&mut self, camera_transform: Mat4) {
        self.view_inverse = camera_transform;
        self.view = camera_transform.inverse();
        let mut untranslated = self.projection * self.view;
        untranslated.w_axis = Vec4::W;
        self.projection_view_untranslated = untranslated;
        self.projection_inverse = self.projection.inverse();
    }

    /**
    Derives the camera for one eye.

    The eye's view offset is applied in camera space unless `stereo` is in skybox mode,
    in which case both eyes share the head position.  The projection is always the eye's.
    */
    pub fn eye_camera(&self, eye: Eye, stereo: &StereoState, camera_transform: Mat4) -> Self {
        let mut result = *self;
        let mut offset = camera_transform;
        if !stereo.skybox {
            let translation: Vec3 = stereo.eye_views[eye.index()].w_axis.truncate();
            offset *= Mat4::from_translation(-translation);
        }
        result.projection = stereo.eye_projections[eye.index()];
        result.recompute_derived(offset);
        result
    }
}
