// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Replaying batches against a native API.

[Backend] is the capability a native API implements: it receives dirty byte ranges of
buffers it mirrors, camera bindings, state changes and draws.  It never sees a [Batch] or
a [Buffer] directly, only [BufferId]s and bytes, so the mirror on its side holds no
reference back into this crate.

[RenderContext] drives a backend.  [RenderContext::render] runs in three passes:

1. *prepare* walks the batch, feeding view/projection/viewport changes to the
   [TransformStage] and capturing a camera at each draw that needs one.  Object
   transforms and per-draw records are written into paged buffers, touching only the
   elements that changed.
2. *transfer* uploads the dirty pages of every buffer the batch uses, in page order.
3. *replay* issues the state changes and draws.  In stereo, a draw binds a camera range
   covering both eyes and doubles its instance count; it is never issued twice.
*/

use crate::batch::{Batch, Command, CommandRef, PipelineId};
use crate::config::TransformConfig;
use crate::resource::{Buffer, BufferId, DirtyRange, Stamp};
use crate::transform::{CameraBinding, StereoState, TransformStage};
use bytemuck::Pod;
use glam::{Mat4, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Arrays,
    Indexed,
}

/// A draw as issued to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub kind: DrawKind,
    /// Vertex or index count.
    pub count: u32,
    /// First vertex or first index.
    pub first: u32,
    pub instances: u32,
    /// Index into the draw-call buffer, which names the object transform.
    pub draw_index: u32,
}

/**
The capability a native graphics API implements.

Called only from the thread that owns the native context.
*/
pub trait Backend: Send {
    /// Copies `bytes`, which are `range` of buffer `buffer`, into the native mirror.
    fn transfer(&mut self, buffer: BufferId, range: DirtyRange, bytes: &[u8]);
    /// Tells the backend which buffers hold cameras, objects and draw records.
    fn bind_transform_buffers(&mut self, buffers: TransformBuffers);
    fn bind_camera(&mut self, binding: CameraBinding);
    fn set_viewport(&mut self, viewport: Vec4);
    fn set_depth_range(&mut self, near: f32, far: f32);
    fn set_pipeline(&mut self, pipeline: PipelineId);
    fn draw(&mut self, call: &DrawCall);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformBuffers {
    pub camera: BufferId,
    pub objects: BufferId,
    pub draw_calls: BufferId,
}

/// Counters accumulated by a [RenderContext].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextStats {
    pub batches: u64,
    pub draw_calls: u64,
    /// Instances submitted to the backend; twice the recorded count in stereo.
    pub instances: u64,
    pub pipeline_changes: u64,
    pub camera_bindings: u64,
    pub buffer_transfers: u64,
    pub bytes_transferred: u64,
    pub snapshots_captured: u64,
}

impl ContextStats {
    pub fn evaluate_delta(&self, previous: &ContextStats) -> ContextStats {
        ContextStats {
            batches: self.batches.saturating_sub(previous.batches),
            draw_calls: self.draw_calls.saturating_sub(previous.draw_calls),
            instances: self.instances.saturating_sub(previous.instances),
            pipeline_changes: self.pipeline_changes.saturating_sub(previous.pipeline_changes),
            camera_bindings: self.camera_bindings.saturating_sub(previous.camera_bindings),
            buffer_transfers: self.buffer_transfers.saturating_sub(previous.buffer_transfers),
            bytes_transferred: self.bytes_transferred.saturating_sub(previous.bytes_transferred),
            snapshots_captured: self.snapshots_captured.saturating_sub(previous.snapshots_captured),
        }
    }
}

/// Last buffer and stamp uploaded for each role.  Batches come and go, so their data
/// buffer gets a single slot rather than an entry per buffer ever seen.
#[derive(Debug, Default)]
struct Uploaded {
    camera: Option<(BufferId, Stamp)>,
    objects: Option<(BufferId, Stamp)>,
    draw_calls: Option<(BufferId, Stamp)>,
    batch_data: Option<(BufferId, Stamp)>,
}

pub struct RenderContext {
    backend: Box<dyn Backend>,
    stereo: StereoState,
    transform: TransformStage,
    objects: Buffer,
    draw_calls: Buffer,
    uploaded: Uploaded,
    pipeline: Option<PipelineId>,
    depth_range: Option<(f32, f32)>,
    stats: ContextStats,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("stereo", &self.stereo)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Writes `values` as an array of `T`, touching only the elements that differ.
fn sync_slice<T: Pod + PartialEq>(buffer: &mut Buffer, values: &[T]) {
    let size = std::mem::size_of_val(values);
    if buffer.size() != size {
        buffer.resize(size);
    }
    for (i, value) in values.iter().enumerate() {
        if buffer.read::<T>(i).as_ref() != Some(value) {
            buffer.set_sub_data_at(i, value);
        }
    }
}

impl RenderContext {
    pub fn new<B: Backend + 'static>(backend: B, config: TransformConfig) -> Self {
        let mut context = RenderContext {
            backend: Box::new(backend),
            stereo: StereoState::default(),
            transform: TransformStage::new(config),
            objects: Buffer::new(),
            draw_calls: Buffer::new(),
            uploaded: Uploaded::default(),
            pipeline: None,
            depth_range: None,
            stats: ContextStats::default(),
        };
        let buffers = context.transform_buffers();
        context.backend.bind_transform_buffers(buffers);
        context
    }

    pub fn transform_buffers(&self) -> TransformBuffers {
        TransformBuffers {
            camera: self.transform.camera_buffer().id(),
            objects: self.objects.id(),
            draw_calls: self.draw_calls.id(),
        }
    }

    pub fn enable_stereo(&mut self, enable: bool) {
        self.stereo.enable = enable;
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo.enable
    }

    pub fn enable_skybox(&mut self, enable: bool) {
        self.stereo.skybox = enable;
    }

    pub fn set_stereo_views(&mut self, views: [Mat4; 2]) {
        self.stereo.eye_views = views;
    }

    pub fn set_stereo_projections(&mut self, projections: [Mat4; 2]) {
        self.stereo.eye_projections = projections;
    }

    pub fn set_stereo(&mut self, stereo: StereoState) {
        self.stereo = stereo;
    }

    pub fn stereo(&self) -> &StereoState {
        &self.stereo
    }

    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ContextStats::default();
    }

    pub fn transform(&self) -> &TransformStage {
        &self.transform
    }

    /// Prepares, uploads and replays `batch`.
    pub fn render(&mut self, batch: &mut Batch) {
        self.prepare(batch);
        self.transfer_all(batch);
        self.replay(batch);
        self.stats.batches += 1;
    }

    fn prepare(&mut self, batch: &Batch) {
        self.transform.begin_batch();
        for command in batch.commands() {
            match command.command {
                Command::SetViewTransform => {
                    if let Some(m) = Self::transform_param(batch, &command) {
                        self.transform.set_view(m);
                    }
                }
                Command::SetProjectionTransform => {
                    if let Some(m) = Self::transform_param(batch, &command) {
                        self.transform.set_projection(m);
                    }
                }
                Command::SetViewportTransform => {
                    let viewport = command
                        .param(0)
                        .and_then(|p| p.index())
                        .and_then(|offset| batch.read_vec4(offset));
                    if let Some(viewport) = viewport {
                        self.transform.set_viewport(viewport);
                    }
                }
                c if c.is_draw() => {
                    if self
                        .transform
                        .capture_snapshot_if_needed(command.index, &self.stereo)
                    {
                        self.stats.snapshots_captured += 1;
                    }
                }
                _ => {}
            }
        }
        sync_slice(&mut self.objects, batch.objects());
        sync_slice(&mut self.draw_calls, batch.draw_calls());
    }

    fn transform_param(batch: &Batch, command: &CommandRef<'_>) -> Option<Mat4> {
        let m = command
            .param(0)
            .and_then(|p| p.index())
            .and_then(|i| batch.transform(i));
        if m.is_none() {
            logwise::warn_sync!(
                "malformed transform command {index}",
                index = command.index
            );
        }
        m
    }

    fn transfer_all(&mut self, batch: &mut Batch) {
        Self::transfer(
            &mut *self.backend,
            &mut self.uploaded.camera,
            &mut self.stats,
            self.transform.camera_buffer_mut(),
        );
        Self::transfer(
            &mut *self.backend,
            &mut self.uploaded.objects,
            &mut self.stats,
            &mut self.objects,
        );
        Self::transfer(
            &mut *self.backend,
            &mut self.uploaded.draw_calls,
            &mut self.stats,
            &mut self.draw_calls,
        );
        Self::transfer(
            &mut *self.backend,
            &mut self.uploaded.batch_data,
            &mut self.stats,
            batch.data_mut(),
        );
    }

    /// Uploads the dirty pages of `buffer`, skipping it entirely if its stamp is unchanged.
    fn transfer(
        backend: &mut dyn Backend,
        uploaded: &mut Option<(BufferId, Stamp)>,
        stats: &mut ContextStats,
        buffer: &mut Buffer,
    ) {
        let id = buffer.id();
        let stamp = buffer.stamp();
        if *uploaded == Some((id, stamp)) {
            return;
        }
        let mut cursor = 0;
        while let Some(range) = buffer.next_dirty_range(&mut cursor) {
            let bytes = &buffer.data()[range.offset..range.end()];
            backend.transfer(id, range, bytes);
            stats.buffer_transfers += 1;
            stats.bytes_transferred += range.size as u64;
            logwise::trace_sync!(
                "transfer {size} bytes at {offset}",
                size = range.size,
                offset = range.offset
            );
        }
        *uploaded = Some((id, stamp));
    }

    fn replay(&mut self, batch: &Batch) {
        self.transform.reset_cursor();
        let mut bound_camera: Option<CameraBinding> = None;
        let mut draw_index: u32 = 0;
        for command in batch.commands() {
            match command.command {
                Command::SetPipeline => {
                    let Some(pipeline) = command.param(0).and_then(|p| p.uint()) else {
                        continue;
                    };
                    let pipeline = PipelineId(pipeline);
                    if self.pipeline != Some(pipeline) {
                        self.backend.set_pipeline(pipeline);
                        self.pipeline = Some(pipeline);
                        self.stats.pipeline_changes += 1;
                    }
                }
                Command::SetDepthRangeTransform => {
                    let near = command.param(0).and_then(|p| p.float());
                    let far = command.param(1).and_then(|p| p.float());
                    if let (Some(near), Some(far)) = (near, far)
                        && self.depth_range != Some((near, far))
                    {
                        self.backend.set_depth_range(near, far);
                        self.depth_range = Some((near, far));
                    }
                }
                Command::SetViewportTransform => {
                    let viewport = command
                        .param(0)
                        .and_then(|p| p.index())
                        .and_then(|offset| batch.read_vec4(offset));
                    if let Some(viewport) = viewport {
                        self.backend.set_viewport(viewport);
                    }
                }
                c if c.is_draw() => {
                    let Some(mut call) = Self::decode_draw(&command, draw_index) else {
                        logwise::warn_sync!("malformed draw {index}", index = command.index);
                        continue;
                    };
                    draw_index += 1;
                    if let Some(binding) = self.transform.find_camera_binding(command.index)
                        && bound_camera != Some(binding)
                    {
                        self.backend.bind_camera(binding);
                        bound_camera = Some(binding);
                        self.stats.camera_bindings += 1;
                    }
                    if self.stereo.enable {
                        call.instances *= 2;
                    }
                    self.backend.draw(&call);
                    self.stats.draw_calls += 1;
                    self.stats.instances += call.instances as u64;
                }
                _ => {}
            }
        }
    }

    fn decode_draw(command: &CommandRef<'_>, draw_index: u32) -> Option<DrawCall> {
        let uint = |i: usize| -> Option<u32> {
            command
                .param(i)
                .and_then(|p| p.uint())
                .and_then(|v| u32::try_from(v).ok())
        };
        let (kind, instances, count, first) = match command.command {
            Command::Draw => (DrawKind::Arrays, 1, uint(0)?, uint(1)?),
            Command::DrawIndexed => (DrawKind::Indexed, 1, uint(0)?, uint(1)?),
            Command::DrawInstanced => (DrawKind::Arrays, uint(0)?, uint(1)?, uint(2)?),
            Command::DrawIndexedInstanced => (DrawKind::Indexed, uint(0)?, uint(1)?, uint(2)?),
            _ => return None,
        };
        Some(DrawCall {
            kind,
            count,
            first,
            instances,
            draw_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DrawKind, RenderContext};
    use crate::batch::{Batch, PipelineId};
    use crate::config::TransformConfig;
    use crate::headless::{BackendEvent, RecordingBackend};
    use crate::transform::StereoState;
    use glam::{Mat4, Vec3};

    fn context() -> (RenderContext, RecordingBackend) {
        let backend = RecordingBackend::new();
        let probe = backend.clone();
        (RenderContext::new(backend, TransformConfig::default()), probe)
    }

    #[test]
    fn stereo_doubles_instances_instead_of_draws() {
        let (mut ctx, probe) = context();
        ctx.set_stereo(StereoState::side_by_side(0.064, Mat4::IDENTITY));
        let mut batch = Batch::new("stereo");
        batch.set_view_transform(Mat4::IDENTITY);
        batch.draw_instanced(3, 36, 0);
        ctx.render(&mut batch);
        let draws = probe.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].instances, 6);
        assert_eq!(draws[0].kind, DrawKind::Arrays);
        let bindings = probe.camera_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].eye_count, 2);
        assert_eq!(ctx.stats().snapshots_captured, 1);
    }

    #[test]
    fn redundant_pipeline_changes_are_filtered() {
        let (mut ctx, probe) = context();
        let mut batch = Batch::default();
        batch.set_pipeline(PipelineId(1));
        batch.draw(3, 0);
        batch.set_pipeline(PipelineId(1));
        batch.draw(3, 0);
        batch.set_pipeline(PipelineId(2));
        batch.draw(3, 0);
        ctx.render(&mut batch);
        let pipelines: Vec<_> = probe
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::SetPipeline(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(pipelines, vec![PipelineId(1), PipelineId(2)]);
        assert_eq!(ctx.stats().pipeline_changes, 2);
    }

    #[test]
    fn unchanged_objects_are_not_retransferred() {
        let (mut ctx, probe) = context();
        let objects = ctx.transform_buffers().objects;
        let record = |batch: &mut Batch, x: f32| {
            batch.clear();
            for i in 0..200 {
                let offset = if i == 150 { x } else { i as f32 };
                batch.set_model_transform(Mat4::from_translation(Vec3::new(offset, 0.0, 0.0)));
                batch.draw(3, 0);
            }
        };
        let mut batch = Batch::default();
        record(&mut batch, 0.0);
        ctx.render(&mut batch);
        let first = probe.transferred_bytes(objects);
        assert_eq!(first, 200 * 64);

        record(&mut batch, 1.0);
        ctx.render(&mut batch);
        //one matrix changed, so one page moved
        assert_eq!(probe.transferred_bytes(objects) - first, 4096);
        assert_eq!(probe.mirror(objects).len(), 200 * 64);
    }

    #[test]
    fn depth_range_forwarded_only_on_change() {
        let (mut ctx, probe) = context();
        let mut batch = Batch::default();
        batch.set_depth_range_transform(0.0, 1.0);
        batch.set_depth_range_transform(0.0, 1.0);
        batch.set_depth_range_transform(0.5, 1.0);
        ctx.render(&mut batch);
        let count = probe
            .events()
            .iter()
            .filter(|e| matches!(e, BackendEvent::SetDepthRange(..)))
            .count();
        assert_eq!(count, 2);
    }

    #[test]
    fn per_frame_batches_share_one_upload_slot() {
        let (mut ctx, probe) = context();
        let mut last = None;
        for frame in 0..100 {
            let mut batch = Batch::new("frame");
            batch.set_viewport_transform(glam::Vec4::new(0.0, 0.0, frame as f32, 1.0));
            batch.draw(3, 0);
            ctx.render(&mut batch);
            assert_eq!(probe.mirror(batch.data().id()), batch.data().data());
            last = Some(batch.data().id());
        }
        assert_eq!(ctx.uploaded.batch_data.map(|(id, _)| id), last);
        assert_eq!(ctx.stats().batches, 100);
    }

    #[test]
    fn delta_against_newer_stats_is_zero() {
        let (mut ctx, _probe) = context();
        let mut batch = Batch::default();
        batch.draw(3, 0);
        ctx.render(&mut batch);
        let before = ctx.stats();
        ctx.reset_stats();
        let delta = ctx.stats().evaluate_delta(&before);
        assert_eq!(delta.batches, 0);
        assert_eq!(delta.draw_calls, 0);
        assert_eq!(delta.bytes_transferred, 0);
    }
}
