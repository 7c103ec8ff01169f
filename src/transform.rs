// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Camera bookkeeping for a batch being replayed.

Recording a batch only says *when* the view, projection or viewport changed.  Before the
batch is replayed, a prepare pass walks it and asks the [TransformStage] to capture a
[CameraSnapshot] at every draw that follows a change.  Captures are lazy and coalesced:
any number of invalidations before the next draw produce one snapshot (or one per eye in
stereo), tagged with that draw's command index.

During replay, [TransformStage::find_snapshot_offset] maps a command index back to the
byte offset of its camera in the camera buffer.  Replay is sequential, so the lookup keeps
a forward-only cursor instead of searching from the start each time.

```
use present_pipeline::transform::{Eye, StereoState, TransformStage};
use glam::Mat4;

let mut stage = TransformStage::new(Default::default());
stage.set_view(Mat4::from_translation(glam::Vec3::Z));
stage.invalidate_view();
let stereo = StereoState::side_by_side(0.064, Mat4::IDENTITY);
assert!(stage.capture_snapshot_if_needed(3, &stereo));
assert!(!stage.capture_snapshot_if_needed(4, &stereo));

assert_eq!(stage.find_snapshot_offset(2, Eye::Left), None);
assert_eq!(stage.find_snapshot_offset(5, Eye::Left), Some(0));
assert_eq!(stage.find_snapshot_offset(5, Eye::Right), Some(stage.stride()));
```
*/

pub mod camera;
pub mod stereo;

use crate::config::TransformConfig;
use crate::resource::Buffer;
use glam::{Mat4, Vec4};

pub use camera::CameraSnapshot;
pub use stereo::{Eye, StereoState};

/// One row of the command-index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SnapshotEntry {
    command_index: usize,
    offset: usize,
    eye_count: usize,
}

/// The part of the camera buffer a draw should bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraBinding {
    pub offset: usize,
    /// 1 for mono; 2 when both eyes follow at `offset` and `offset + stride`.
    pub eye_count: usize,
    pub stride: usize,
}

#[derive(Debug)]
pub struct TransformStage {
    stride: usize,
    view: Mat4,
    projection: Mat4,
    viewport: Vec4,
    invalid_view: bool,
    invalid_projection: bool,
    invalid_viewport: bool,
    entries: Vec<SnapshotEntry>,
    snapshots: Vec<CameraSnapshot>,
    camera_buffer: Buffer,
    cursor: usize,
}

impl TransformStage {
    pub fn new(config: TransformConfig) -> Self {
        let snapshot = std::mem::size_of::<CameraSnapshot>();
        let alignment = config
            .uniform_alignment
            .checked_next_power_of_two()
            .unwrap_or(TransformConfig::default().uniform_alignment);
        if alignment != config.uniform_alignment {
            logwise::warn_sync!(
                "uniform alignment {requested} is not a power of two, using {alignment}",
                requested = config.uniform_alignment,
                alignment = alignment
            );
        }
        let stride = snapshot.checked_next_multiple_of(alignment).unwrap_or(snapshot);
        TransformStage {
            stride,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            viewport: Vec4::ZERO,
            invalid_view: true,
            invalid_projection: true,
            invalid_viewport: true,
            entries: Vec::new(),
            snapshots: Vec::new(),
            camera_buffer: Buffer::new(),
            cursor: 0,
        }
    }

    /// Byte distance between consecutive snapshots in the camera buffer.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Sets the camera's world transform.
    pub fn set_view(&mut self, camera_transform: Mat4) {
        self.view = camera_transform;
        self.invalid_view = true;
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
        self.invalid_projection = true;
    }

    pub fn set_viewport(&mut self, viewport: Vec4) {
        self.viewport = viewport;
        self.invalid_viewport = true;
    }

    pub fn invalidate_view(&mut self) {
        self.invalid_view = true;
    }

    pub fn invalidate_projection(&mut self) {
        self.invalid_projection = true;
    }

    pub fn invalidate_viewport(&mut self) {
        self.invalid_viewport = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.invalid_view || self.invalid_projection || self.invalid_viewport
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn viewport(&self) -> Vec4 {
        self.viewport
    }

    /**
    Starts bookkeeping for a new batch.

    The previous batch's table is discarded and the state is marked stale, so the first
    draw of the new batch always captures a camera.
    */
    pub fn begin_batch(&mut self) {
        self.entries.clear();
        self.snapshots.clear();
        self.cursor = 0;
        self.invalid_view = true;
        self.invalid_projection = true;
        self.invalid_viewport = true;
    }

    /**
    Captures the current camera if anything changed since the last capture.

    Appends one row tagged with `command_index`, holding one snapshot in mono or one per
    eye in stereo, and writes the snapshots into the camera buffer.  Returns whether a
    capture happened.
    */
    pub fn capture_snapshot_if_needed(&mut self, command_index: usize, stereo: &StereoState) -> bool {
        if !self.is_dirty() {
            return false;
        }
        debug_assert!(
            self.entries
                .last()
                .is_none_or(|e| e.command_index <= command_index),
            "snapshots must be captured in command order"
        );
        let head = CameraSnapshot::new(self.view, self.projection, self.viewport);
        let offset = self.snapshots.len() * self.stride;
        if stereo.enable {
            for eye in Eye::ALL {
                self.snapshots.push(head.eye_camera(eye, stereo, self.view));
            }
        } else {
            self.snapshots.push(head);
        }
        let eye_count = stereo.eye_count();
        self.entries.push(SnapshotEntry {
            command_index,
            offset,
            eye_count,
        });
        self.write_snapshots(offset, eye_count);
        self.invalid_view = false;
        self.invalid_projection = false;
        self.invalid_viewport = false;
        true
    }

    fn write_snapshots(&mut self, offset: usize, eye_count: usize) {
        let end = offset + eye_count * self.stride;
        if self.camera_buffer.size() < end {
            self.camera_buffer.resize(end);
        }
        let first = self.snapshots.len() - eye_count;
        for (i, snapshot) in self.snapshots[first..].iter().enumerate() {
            self.camera_buffer
                .set_sub_data(offset + i * self.stride, bytemuck::bytes_of(snapshot));
        }
    }

    fn seek(&mut self, command_index: usize) -> Option<SnapshotEntry> {
        if self.entries.is_empty() {
            return None;
        }
        if self.cursor >= self.entries.len() {
            self.cursor = self.entries.len() - 1;
        }
        while self.cursor + 1 < self.entries.len()
            && self.entries[self.cursor + 1].command_index <= command_index
        {
            self.cursor += 1;
        }
        let entry = self.entries[self.cursor];
        (entry.command_index <= command_index).then_some(entry)
    }

    /**
    Returns the camera buffer offset of `eye`'s snapshot for the command at `command_index`.

    The latest row tagged at or before `command_index` wins.  A mono row serves both eyes.
    Lookups must come in non-decreasing command order; call [Self::reset_cursor] to start
    over.  Returns `None` if no camera was captured at or before `command_index`.
    */
    pub fn find_snapshot_offset(&mut self, command_index: usize, eye: Eye) -> Option<usize> {
        let entry = self.seek(command_index)?;
        let eye = eye.index().min(entry.eye_count - 1);
        Some(entry.offset + eye * self.stride)
    }

    /// Like [Self::find_snapshot_offset] but describes every eye of the row.
    pub fn find_camera_binding(&mut self, command_index: usize) -> Option<CameraBinding> {
        let entry = self.seek(command_index)?;
        Some(CameraBinding {
            offset: entry.offset,
            eye_count: entry.eye_count,
            stride: self.stride,
        })
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub fn snapshots(&self) -> &[CameraSnapshot] {
        &self.snapshots
    }

    /// Number of rows in the command-index table.
    pub fn capture_count(&self) -> usize {
        self.entries.len()
    }

    pub fn camera_buffer(&self) -> &Buffer {
        &self.camera_buffer
    }

    pub fn camera_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.camera_buffer
    }
}
