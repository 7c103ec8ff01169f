// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Per-eye view and projection overrides.

use glam::{Mat4, Vec3};

/// Physical width assumed for the virtual screen, in meters.
const SCREEN_WIDTH: f32 = 0.5;
const CONVERGENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/**
Stereo rendering parameters.

`eye_views` are view-space offsets: an eye sits at the negated translation of its entry,
relative to the head.  In skybox mode the offsets are ignored and only the projections
differ.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoState {
    pub enable: bool,
    pub skybox: bool,
    pub eye_views: [Mat4; 2],
    pub eye_projections: [Mat4; 2],
}

impl Default for StereoState {
    fn default() -> Self {
        StereoState {
            enable: false,
            skybox: false,
            eye_views: [Mat4::IDENTITY; 2],
            eye_projections: [Mat4::IDENTITY; 2],
        }
    }
}

impl StereoState {
    /**
    Stereo state for a side-by-side display.

    Eyes are placed `ipd / 2` either side of the head.  Each eye's projection is `base`
    with a horizontal frustum shift toward the convergence plane.
    */
    pub fn side_by_side(ipd: f32, base: Mat4) -> Self {
        let separation = ipd / SCREEN_WIDTH;
        let mut eye_views = [Mat4::IDENTITY; 2];
        let mut eye_projections = [base; 2];
        for eye in Eye::ALL {
            let (sign, shift) = match eye {
                Eye::Left => (-1.0, separation),
                Eye::Right => (1.0, -separation),
            };
            eye_views[eye.index()] = Mat4::from_translation(Vec3::new(-sign * ipd * 0.5, 0.0, 0.0));
            let projection = &mut eye_projections[eye.index()];
            projection.z_axis.x += shift;
            projection.w_axis.x += shift * CONVERGENCE;
        }
        StereoState {
            enable: true,
            skybox: false,
            eye_views,
            eye_projections,
        }
    }

    /// Number of cameras captured per snapshot.
    pub fn eye_count(&self) -> usize {
        if self.enable { 2 } else { 1 }
    }
}
