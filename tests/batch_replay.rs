// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Replaying recorded batches against the recording backend.

use present_pipeline::backend::{DrawKind, RenderContext};
use present_pipeline::batch::{Batch, PipelineId};
use present_pipeline::config::TransformConfig;
use present_pipeline::glam::{Mat4, Vec3, Vec4};
use present_pipeline::headless::{BackendEvent, RecordingBackend};
use present_pipeline::transform::{Eye, StereoState};

fn context() -> (RenderContext, RecordingBackend) {
    let backend = RecordingBackend::new();
    let probe = backend.clone();
    (RenderContext::new(backend, TransformConfig::default()), probe)
}

fn scene(batch: &mut Batch, objects: usize) {
    batch.clear();
    batch.set_viewport_transform(Vec4::new(0.0, 0.0, 640.0, 480.0));
    batch.set_projection_transform(Mat4::perspective_rh(1.0, 4.0 / 3.0, 0.1, 100.0));
    batch.set_view_transform(Mat4::from_translation(Vec3::new(0.0, 1.7, 5.0)));
    batch.set_pipeline(PipelineId(1));
    for i in 0..objects {
        batch.set_model_transform(Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)));
        batch.draw_indexed(36, 0);
    }
}

#[test]
fn native_mirrors_match_the_buffers() {
    let (mut ctx, probe) = context();
    let buffers = ctx.transform_buffers();
    let mut batch = Batch::new("scene");
    scene(&mut batch, 100);
    ctx.render(&mut batch);

    assert_eq!(
        probe.mirror(buffers.objects),
        bytemuck::cast_slice::<Mat4, u8>(batch.objects())
    );
    assert_eq!(
        probe.mirror(buffers.draw_calls),
        bytemuck::cast_slice::<_, u8>(batch.draw_calls())
    );
    assert_eq!(
        probe.mirror(buffers.camera),
        ctx.transform().camera_buffer().data()
    );
    assert_eq!(probe.mirror(batch.data().id()), batch.data().data());

    let stats = ctx.stats();
    assert_eq!(stats.draw_calls, 100);
    assert_eq!(stats.snapshots_captured, 1);
    assert_eq!(stats.camera_bindings, 1);
    assert_eq!(stats.pipeline_changes, 1);
}

#[test]
fn first_event_binds_the_transform_buffers() {
    let (ctx, probe) = context();
    assert_eq!(
        probe.events(),
        vec![BackendEvent::BindTransformBuffers(ctx.transform_buffers())]
    );
}

#[test]
fn draws_bind_the_camera_captured_before_them() {
    let (mut ctx, probe) = context();
    let mut batch = Batch::new("cameras");
    batch.set_view_transform(Mat4::IDENTITY);
    batch.draw(3, 0);
    batch.draw(3, 3);
    batch.set_view_transform(Mat4::from_translation(Vec3::X));
    batch.draw(3, 6);
    batch.set_projection_transform(Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.0, 1.0));
    batch.draw(3, 9);
    ctx.render(&mut batch);

    let stride = ctx.transform().stride();
    let offsets: Vec<_> = probe.camera_bindings().iter().map(|b| b.offset).collect();
    assert_eq!(offsets, vec![0, stride, 2 * stride]);
    assert!(probe.camera_bindings().iter().all(|b| b.eye_count == 1));

    let draws = probe.draws();
    assert_eq!(draws.len(), 4);
    assert_eq!(
        draws.iter().map(|d| d.draw_index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert!(draws.iter().all(|d| d.kind == DrawKind::Arrays && d.count == 3));

    let snapshots = ctx.transform().snapshots();
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[1].view_inverse, Mat4::from_translation(Vec3::X));
}

#[test]
fn stereo_rows_hold_both_eyes() {
    let (mut ctx, probe) = context();
    ctx.set_stereo(StereoState::side_by_side(0.064, Mat4::IDENTITY));
    let mut batch = Batch::new("stereo");
    batch.set_view_transform(Mat4::IDENTITY);
    batch.draw_indexed_instanced(4, 36, 0);
    batch.set_view_transform(Mat4::from_translation(Vec3::Y));
    batch.draw_indexed_instanced(1, 36, 0);
    ctx.render(&mut batch);

    let stride = ctx.transform().stride();
    let bindings = probe.camera_bindings();
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[0].offset, 0);
    assert_eq!(bindings[1].offset, 2 * stride);
    assert!(bindings.iter().all(|b| b.eye_count == 2 && b.stride == stride));

    let instances: Vec<_> = probe.draws().iter().map(|d| d.instances).collect();
    assert_eq!(instances, vec![8, 2]);

    let snapshots = ctx.transform().snapshots();
    assert_eq!(snapshots.len(), 4);
    let left = snapshots[Eye::Left.index()];
    let right = snapshots[Eye::Right.index()];
    assert_ne!(left.view, right.view);
    let distance = left
        .view_inverse
        .w_axis
        .truncate()
        .distance(right.view_inverse.w_axis.truncate());
    assert!((distance - 0.064).abs() < 1e-5, "{distance}");
}

#[test]
fn skybox_eyes_share_the_head_position() {
    let (mut ctx, _probe) = context();
    ctx.set_stereo(StereoState::side_by_side(0.064, Mat4::IDENTITY));
    ctx.enable_skybox(true);
    let mut batch = Batch::new("sky");
    batch.set_view_transform(Mat4::from_translation(Vec3::Z));
    batch.draw(36, 0);
    ctx.render(&mut batch);

    let snapshots = ctx.transform().snapshots();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].view, snapshots[1].view);
    assert_ne!(snapshots[0].projection, snapshots[1].projection);
}

#[test]
fn rerendering_an_identical_scene_uploads_no_object_pages() {
    let (mut ctx, probe) = context();
    let buffers = ctx.transform_buffers();
    let mut batch = Batch::new("scene");
    scene(&mut batch, 300);
    ctx.render(&mut batch);
    let objects = probe.transferred_bytes(buffers.objects);
    let draw_calls = probe.transferred_bytes(buffers.draw_calls);
    assert_eq!(objects, 300 * 64);
    assert!(draw_calls > 0);

    scene(&mut batch, 300);
    ctx.render(&mut batch);
    assert_eq!(probe.transferred_bytes(buffers.objects), objects);
    assert_eq!(probe.transferred_bytes(buffers.draw_calls), draw_calls);
    assert_eq!(ctx.stats().batches, 2);
}

#[test]
fn state_changes_replay_in_order() {
    let (mut ctx, probe) = context();
    let mut batch = Batch::new("state");
    let viewport = Vec4::new(0.0, 0.0, 128.0, 64.0);
    batch.set_viewport_transform(viewport);
    batch.set_depth_range_transform(0.0, 1.0);
    batch.set_pipeline(PipelineId(7));
    batch.draw(3, 0);
    probe.clear_events();
    ctx.render(&mut batch);

    let replayed: Vec<_> = probe
        .events()
        .into_iter()
        .filter(|e| !matches!(e, BackendEvent::Transfer { .. }))
        .collect();
    assert!(matches!(
        replayed.as_slice(),
        [
            BackendEvent::SetViewport(v),
            BackendEvent::SetDepthRange(near, far),
            BackendEvent::SetPipeline(PipelineId(7)),
            BackendEvent::BindCamera(_),
            BackendEvent::Draw(_),
        ] if *v == viewport && *near == 0.0 && *far == 1.0
    ));
    assert_eq!(ctx.transform().viewport(), viewport);
}
