// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::backend::{Backend, DrawCall, TransformBuffers};
use crate::batch::PipelineId;
use crate::resource::{BufferId, DirtyRange};
use crate::transform::CameraBinding;
use glam::Vec4;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendEvent {
    Transfer { buffer: BufferId, range: DirtyRange },
    BindTransformBuffers(TransformBuffers),
    BindCamera(CameraBinding),
    SetViewport(Vec4),
    SetDepthRange(f32, f32),
    SetPipeline(PipelineId),
    Draw(DrawCall),
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<BackendEvent>,
    //the native-side copy of each buffer
    mirrors: HashMap<BufferId, Vec<u8>>,
    transferred: HashMap<BufferId, u64>,
}

/// A backend that records every call and mirrors transferred bytes.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    recording: Arc<Mutex<Recording>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Draw(call) => Some(*call),
                _ => None,
            })
            .collect()
    }

    pub fn camera_bindings(&self) -> Vec<CameraBinding> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::BindCamera(binding) => Some(*binding),
                _ => None,
            })
            .collect()
    }

    /// Total bytes transferred for `buffer` so far.
    pub fn transferred_bytes(&self, buffer: BufferId) -> u64 {
        self.lock().transferred.get(&buffer).copied().unwrap_or(0)
    }

    pub fn mirror(&self, buffer: BufferId) -> Vec<u8> {
        self.lock().mirrors.get(&buffer).cloned().unwrap_or_default()
    }
}

impl Backend for RecordingBackend {
    fn transfer(&mut self, buffer: BufferId, range: DirtyRange, bytes: &[u8]) {
        let mut recording = self.lock();
        let mirror = recording.mirrors.entry(buffer).or_default();
        if mirror.len() < range.end() {
            mirror.resize(range.end(), 0);
        }
        mirror[range.offset..range.end()].copy_from_slice(bytes);
        *recording.transferred.entry(buffer).or_default() += bytes.len() as u64;
        recording.events.push(BackendEvent::Transfer { buffer, range });
    }

    fn bind_transform_buffers(&mut self, buffers: TransformBuffers) {
        self.lock().events.push(BackendEvent::BindTransformBuffers(buffers));
    }

    fn bind_camera(&mut self, binding: CameraBinding) {
        self.lock().events.push(BackendEvent::BindCamera(binding));
    }

    fn set_viewport(&mut self, viewport: Vec4) {
        self.lock().events.push(BackendEvent::SetViewport(viewport));
    }

    fn set_depth_range(&mut self, near: f32, far: f32) {
        self.lock().events.push(BackendEvent::SetDepthRange(near, far));
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.lock().events.push(BackendEvent::SetPipeline(pipeline));
    }

    fn draw(&mut self, call: &DrawCall) {
        self.lock().events.push(BackendEvent::Draw(*call));
    }
}
