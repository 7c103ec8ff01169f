// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Deferred command recording.

A [Batch] is a passive record of draw, state and transform operations.  The producer
records it on its own thread, then hands it to a [crate::backend::RenderContext] on the
thread that owns the native context, which replays it.  Nothing in a batch refers to
native objects: pipelines are [PipelineId]s, matrices live in side arrays, and small blobs
(viewports) live in a paged data [Buffer].

Model transforms are coalesced the same way camera snapshots are.  Setting a model
transform only marks it pending; the next draw appends it to the object array once, and
every draw records a [DrawCallInfo] naming the object it uses.

```
use present_pipeline::batch::{Batch, Command};
use glam::Mat4;

let mut batch = Batch::new("scene");
batch.set_model_transform(Mat4::IDENTITY);
batch.draw(3, 0);
batch.draw(3, 3);
assert_eq!(batch.objects().len(), 1);
assert_eq!(batch.draw_calls().len(), 2);
assert_eq!(batch.commands().filter(|c| c.command.is_draw()).count(), 2);
assert_eq!(batch.command_count(), 3);
```
*/

pub mod command;

use crate::resource::Buffer;
use glam::{Mat4, Vec4};

pub use command::{Command, CommandRef, DrawCallInfo, Param, PipelineId};

#[derive(Debug)]
pub struct Batch {
    name: String,
    commands: Vec<Command>,
    //start of each command's operands in params
    command_offsets: Vec<usize>,
    params: Vec<Param>,
    data: Buffer,
    transforms: Vec<Mat4>,
    objects: Vec<Mat4>,
    draw_calls: Vec<DrawCallInfo>,
    current_model: Mat4,
    invalid_model: bool,
}

impl Default for Batch {
    fn default() -> Self {
        Batch::new("")
    }
}

impl Batch {
    pub fn new(name: impl Into<String>) -> Self {
        Batch {
            name: name.into(),
            commands: Vec::new(),
            command_offsets: Vec::new(),
            params: Vec::new(),
            data: Buffer::new(),
            transforms: Vec::new(),
            objects: Vec::new(),
            draw_calls: Vec::new(),
            current_model: Mat4::IDENTITY,
            invalid_model: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forgets everything recorded, keeping allocations.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.command_offsets.clear();
        self.params.clear();
        self.data.resize(0);
        self.transforms.clear();
        self.objects.clear();
        self.draw_calls.clear();
        self.current_model = Mat4::IDENTITY;
        self.invalid_model = true;
    }

    /**
    Appends a command and its operands.

    The recording helpers below are the usual way in; this is the primitive they share.
    */
    pub fn record(&mut self, command: Command, params: &[Param]) {
        debug_assert_eq!(params.len(), command.param_count(), "{command:?}");
        self.command_offsets.push(self.params.len());
        self.commands.push(command);
        self.params.extend_from_slice(params);
    }

    /// Appends `bytes` to the data blob and returns their offset.
    pub fn cache_data(&mut self, bytes: &[u8]) -> usize {
        let offset = self.data.size();
        self.data.append(bytes);
        offset
    }

    pub fn set_model_transform(&mut self, model: Mat4) {
        self.current_model = model;
        self.invalid_model = true;
        self.record(Command::SetModelTransform, &[Param::Index(self.objects.len())]);
    }

    pub fn set_view_transform(&mut self, camera_transform: Mat4) {
        self.transforms.push(camera_transform);
        self.record(
            Command::SetViewTransform,
            &[Param::Index(self.transforms.len() - 1)],
        );
    }

    pub fn set_projection_transform(&mut self, projection: Mat4) {
        self.transforms.push(projection);
        self.record(
            Command::SetProjectionTransform,
            &[Param::Index(self.transforms.len() - 1)],
        );
    }

    pub fn set_viewport_transform(&mut self, viewport: Vec4) {
        let offset = self.cache_data(bytemuck::bytes_of(&viewport));
        self.record(Command::SetViewportTransform, &[Param::Index(offset)]);
    }

    pub fn set_depth_range_transform(&mut self, near: f32, far: f32) {
        self.record(
            Command::SetDepthRangeTransform,
            &[Param::Float(near), Param::Float(far)],
        );
    }

    pub fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.record(Command::SetPipeline, &[Param::UInt(pipeline.0)]);
    }

    fn capture_draw_call_info(&mut self) {
        if self.invalid_model {
            self.objects.push(self.current_model);
            self.invalid_model = false;
        }
        let object = u32::try_from(self.objects.len() - 1).unwrap_or(u32::MAX);
        self.draw_calls.push(DrawCallInfo { object });
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.capture_draw_call_info();
        self.record(
            Command::Draw,
            &[
                Param::UInt(vertex_count as u64),
                Param::UInt(first_vertex as u64),
            ],
        );
    }

    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32) {
        self.capture_draw_call_info();
        self.record(
            Command::DrawIndexed,
            &[
                Param::UInt(index_count as u64),
                Param::UInt(first_index as u64),
            ],
        );
    }

    pub fn draw_instanced(&mut self, instances: u32, vertex_count: u32, first_vertex: u32) {
        self.capture_draw_call_info();
        self.record(
            Command::DrawInstanced,
            &[
                Param::UInt(instances as u64),
                Param::UInt(vertex_count as u64),
                Param::UInt(first_vertex as u64),
            ],
        );
    }

    pub fn draw_indexed_instanced(&mut self, instances: u32, index_count: u32, first_index: u32) {
        self.capture_draw_call_info();
        self.record(
            Command::DrawIndexedInstanced,
            &[
                Param::UInt(instances as u64),
                Param::UInt(index_count as u64),
                Param::UInt(first_index as u64),
            ],
        );
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn command(&self, index: usize) -> Option<CommandRef<'_>> {
        let command = *self.commands.get(index)?;
        let start = *self.command_offsets.get(index)?;
        let end = self
            .command_offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.params.len());
        Some(CommandRef {
            index,
            command,
            params: self.params.get(start..end)?,
        })
    }

    /// Every command in record order.
    pub fn commands(&self) -> impl Iterator<Item = CommandRef<'_>> + '_ {
        (0..self.commands.len()).filter_map(|i| self.command(i))
    }

    pub fn transform(&self, index: usize) -> Option<Mat4> {
        self.transforms.get(index).copied()
    }

    pub fn objects(&self) -> &[Mat4] {
        &self.objects
    }

    /// One entry per draw, in record order.
    pub fn draw_calls(&self) -> &[DrawCallInfo] {
        &self.draw_calls
    }

    pub fn data(&self) -> &Buffer {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Buffer {
        &mut self.data
    }

    /// Reads a `Vec4` cached at `offset` in the data blob.
    pub fn read_vec4(&self, offset: usize) -> Option<Vec4> {
        let bytes = self
            .data
            .data()
            .get(offset..offset.checked_add(std::mem::size_of::<Vec4>())?)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}
