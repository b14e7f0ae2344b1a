//! Scene Model Tests
//!
//! Tests for:
//! - Client mutation + action recording, renderer-side replay equality
//! - Handle tables: explicit allocation, release, invalid handles
//! - Resource change tracking across an epoch
//! - Flush sealing and the terminating flush record
//! - Validation report

use glam::{Quat, Vec3};

use mirage::errors::MirageError;
use mirage::resources::{DataType, PixelFormat, ResourceContentHash};
use mirage::scene::{
    ClientScene, DataBufferKind, DataFieldInfo, FlushTimeInfo, RenderableDataSlot, SceneActionId,
    SceneId, SceneResourceActionKind, SceneState, SceneVersionTag, Severity, TextureSamplerContent,
    TextureSamplerStates, WaylandIviSurfaceId, apply_scene_actions,
};

fn hash(n: u64) -> ResourceContentHash {
    ResourceContentHash::new(n, n.wrapping_mul(31))
}

/// Builds a client scene with one renderable referencing two resources.
fn build_sample_scene(id: SceneId) -> ClientScene {
    let mut scene = ClientScene::new(id);
    let root = scene.allocate_node();
    let child = scene.allocate_node();
    scene.add_child(root, child).unwrap();
    scene
        .set_translation(child, Vec3::new(1.0, 2.0, 3.0))
        .unwrap();
    scene
        .set_rotation(child, Quat::from_xyzw(0.0, 0.0, 0.0, 1.0))
        .unwrap();

    let layout = scene.allocate_data_layout(
        vec![
            DataFieldInfo {
                data_type: DataType::ByteBlob,
                element_count: 1,
            },
            DataFieldInfo {
                data_type: DataType::Vector4F,
                element_count: 1,
            },
        ],
        hash(1),
    );
    let instance = scene.allocate_data_instance(layout).unwrap();
    scene.set_data_resource(instance, 0, hash(2)).unwrap();
    scene
        .set_data_vector4f_array(instance, 1, &[[0.5, 0.25, 0.125, 1.0]])
        .unwrap();

    let renderable = scene.allocate_renderable(child).unwrap();
    scene
        .set_renderable_data_instance(renderable, RenderableDataSlot::Geometry, instance)
        .unwrap();
    scene.set_renderable_index_count(renderable, 36).unwrap();
    scene
}

// ============================================================================
// Replay
// ============================================================================

#[test]
fn replaying_recorded_actions_reproduces_the_state() {
    let scene = build_sample_scene(SceneId(1));

    let mut mirror = SceneState::new(SceneId(1));
    apply_scene_actions(&mut mirror, scene.pending_actions()).unwrap();

    assert_eq!(&mirror, scene.state());
}

#[test]
fn replay_after_releases_still_matches() {
    let mut scene = ClientScene::new(SceneId(9));
    let a = scene.allocate_node();
    let b = scene.allocate_node();
    let c = scene.allocate_node();
    scene.release_node(b).unwrap();
    // slot of b is reused, keeping the handle table dense
    let d = scene.allocate_node();
    assert_eq!(b, d);
    scene.add_child(a, c).unwrap();
    scene.release_node(d).unwrap();

    let mut mirror = SceneState::new(SceneId(9));
    apply_scene_actions(&mut mirror, scene.pending_actions()).unwrap();
    assert_eq!(&mirror, scene.state());
}

#[test]
fn replay_covers_scene_owned_gpu_objects() {
    let mut scene = ClientScene::new(SceneId(3));
    let color = scene.allocate_render_buffer(64, 64, PixelFormat::Rgba8, 1);
    let depth = scene.allocate_render_buffer(64, 64, PixelFormat::Depth24Stencil8, 1);
    scene.allocate_render_target(vec![color, depth]).unwrap();
    let blit_target = scene.allocate_render_buffer(64, 64, PixelFormat::Rgba8, 1);
    let blit = scene
        .allocate_blit_pass(color, blit_target, [0, 0, 64, 64], [0, 0, 64, 64])
        .unwrap();
    scene.set_blit_pass_enabled(blit, false).unwrap();

    let data_buffer = scene.allocate_data_buffer(DataBufferKind::IndexBuffer, DataType::UInt16, 64);
    scene.update_data_buffer(data_buffer, 4, &[1, 2, 3, 4]).unwrap();

    let texture_buffer = scene
        .allocate_texture_buffer(PixelFormat::Rgba8, &[(4, 4), (2, 2), (1, 1)])
        .unwrap();
    scene
        .update_texture_buffer(texture_buffer, 0, [1, 1, 2, 2], &[0xAA; 16])
        .unwrap();

    scene.allocate_stream_texture(WaylandIviSurfaceId(42), hash(5));

    let mut mirror = SceneState::new(SceneId(3));
    apply_scene_actions(&mut mirror, scene.pending_actions()).unwrap();
    assert_eq!(&mirror, scene.state());
}

#[test]
fn texture_sampler_contents_replay() {
    let mut scene = ClientScene::new(SceneId(4));
    let buffer = scene.allocate_render_buffer(16, 16, PixelFormat::Rgba8, 1);
    let stream = scene.allocate_stream_texture(WaylandIviSurfaceId(7), hash(9));

    scene
        .allocate_texture_sampler(
            TextureSamplerStates::default(),
            TextureSamplerContent::ClientTexture(hash(11)),
        )
        .unwrap();
    scene
        .allocate_texture_sampler(
            TextureSamplerStates::default(),
            TextureSamplerContent::RenderBuffer(buffer),
        )
        .unwrap();
    scene
        .allocate_texture_sampler(
            TextureSamplerStates::default(),
            TextureSamplerContent::StreamTexture(stream),
        )
        .unwrap();

    let mut mirror = SceneState::new(SceneId(4));
    apply_scene_actions(&mut mirror, scene.pending_actions()).unwrap();
    assert_eq!(&mirror, scene.state());
}

// ============================================================================
// Handle Failures
// ============================================================================

#[test]
fn action_on_released_handle_fails_with_handle_invalid() {
    let mut scene = ClientScene::new(SceneId(2));
    let node = scene.allocate_node();
    scene.release_node(node).unwrap();
    let error = scene.set_translation(node, Vec3::ONE).unwrap_err();
    assert!(matches!(error, MirageError::HandleInvalid { .. }));
}

#[test]
fn double_allocation_at_same_handle_fails_on_replay() {
    let mut forged = mirage::scene::SceneActionCollection::new();
    forged.begin_action(SceneActionId::AllocateNode);
    forged.write_u32(0);
    forged.begin_action(SceneActionId::AllocateNode);
    forged.write_u32(0);

    let mut mirror = SceneState::new(SceneId(8));
    let error = apply_scene_actions(&mut mirror, &forged).unwrap_err();
    assert!(matches!(error, MirageError::HandleInvalid { .. }));
}

#[test]
fn renderable_on_unknown_node_fails() {
    let mut forged = mirage::scene::SceneActionCollection::new();
    forged.begin_action(SceneActionId::AllocateRenderable);
    forged.write_u32(0);
    forged.write_u32(33);

    let mut mirror = SceneState::new(SceneId(8));
    assert!(apply_scene_actions(&mut mirror, &forged).is_err());
}

// ============================================================================
// Resource Changes
// ============================================================================

#[test]
fn first_reference_lands_in_added() {
    let scene = build_sample_scene(SceneId(5));
    let changes = scene.pending_changes();
    assert!(changes.added.contains(&hash(1)), "layout effect hash");
    assert!(changes.added.contains(&hash(2)), "geometry resource");
    assert!(changes.removed.is_empty());
}

#[test]
fn release_within_the_same_epoch_cancels_the_add() {
    let mut scene = ClientScene::new(SceneId(6));
    let layout = scene.allocate_data_layout(
        vec![DataFieldInfo {
            data_type: DataType::ByteBlob,
            element_count: 1,
        }],
        hash(21),
    );
    assert!(scene.pending_changes().added.contains(&hash(21)));
    scene.release_data_layout(layout).unwrap();
    assert!(scene.pending_changes().is_empty());
}

#[test]
fn release_after_flush_lands_in_removed() {
    let mut scene = ClientScene::new(SceneId(6));
    let layout = scene.allocate_data_layout(
        vec![DataFieldInfo {
            data_type: DataType::ByteBlob,
            element_count: 1,
        }],
        hash(21),
    );
    scene
        .flush(SceneVersionTag(1), FlushTimeInfo::default())
        .unwrap();

    scene.release_data_layout(layout).unwrap();
    assert!(scene.pending_changes().removed.contains(&hash(21)));
    assert!(scene.pending_changes().added.is_empty());
}

#[test]
fn scene_resource_actions_record_in_order() {
    let mut scene = ClientScene::new(SceneId(7));
    let buffer = scene.allocate_render_buffer(8, 8, PixelFormat::Rgba8, 1);
    scene.release_render_buffer(buffer).unwrap();

    let actions = &scene.pending_changes().scene_resource_actions;
    assert_eq!(actions.len(), 2);
    assert_eq!(
        actions[0].kind().unwrap(),
        SceneResourceActionKind::CreateRenderBuffer
    );
    assert_eq!(
        actions[1].kind().unwrap(),
        SceneResourceActionKind::DestroyRenderBuffer
    );
}

// ============================================================================
// Flush
// ============================================================================

#[test]
fn flush_seals_the_epoch_and_carries_the_version() {
    let mut scene = build_sample_scene(SceneId(1));
    let time = FlushTimeInfo {
        flush_ts: 123_456,
        expiration_ts: 0,
    };
    let update = scene.flush(SceneVersionTag(7), time).unwrap();

    assert_eq!(update.scene_id, SceneId(1));
    assert_eq!(update.version_tag, SceneVersionTag(7));
    assert_eq!(
        update.actions.back().action_id(),
        SceneActionId::SceneFlush
    );
    assert!(scene.pending_actions().is_empty());
    assert!(scene.pending_changes().is_empty());

    // the mirror sees the same flush metadata
    let mut mirror = SceneState::new(SceneId(1));
    let applied = apply_scene_actions(&mut mirror, &update.actions)
        .unwrap()
        .unwrap();
    assert_eq!(applied.version_tag, SceneVersionTag(7));
    assert_eq!(applied.time_info, time);
    assert_eq!(applied.resource_changes, update.resource_changes);
}

#[test]
fn second_flush_starts_a_fresh_epoch() {
    let mut scene = build_sample_scene(SceneId(1));
    scene
        .flush(SceneVersionTag(1), FlushTimeInfo::default())
        .unwrap();

    let node = scene.allocate_node();
    scene.set_scaling(node, Vec3::splat(2.0)).unwrap();
    let update = scene
        .flush(SceneVersionTag(2), FlushTimeInfo::default())
        .unwrap();

    // only the delta plus the flush record itself
    assert_eq!(update.actions.number_of_actions(), 3);
    assert!(update.resource_changes.added.is_empty());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn valid_scene_produces_no_issues() {
    let scene = build_sample_scene(SceneId(1));
    let report = scene.state().validate();
    assert!(!report.has_error(), "issues: {:?}", report.issues());
}

#[test]
fn renderable_without_indices_warns() {
    let mut scene = ClientScene::new(SceneId(2));
    let node = scene.allocate_node();
    scene.allocate_renderable(node).unwrap();
    let report = scene.state().validate();
    assert!(report.has_issue());
    assert!(!report.has_error());
    assert_eq!(report.issues()[0].severity, Severity::Warning);
}

#[test]
fn duplicate_issues_are_suppressed() {
    let mut scene = ClientScene::new(SceneId(2));
    let node = scene.allocate_node();
    scene.allocate_renderable(node).unwrap();
    let report = scene.state().validate();
    let repeated = scene.state().validate();
    assert_eq!(report.issues().len(), repeated.issues().len());
    assert_eq!(report.issues().len(), 1);
}

#[test]
fn empty_render_target_warns_and_self_blit_warns() {
    let mut scene = ClientScene::new(SceneId(3));
    scene.allocate_render_target(Vec::new()).unwrap();
    let buffer = scene.allocate_render_buffer(8, 8, PixelFormat::Rgba8, 1);
    scene
        .allocate_blit_pass(buffer, buffer, [0, 0, 8, 8], [0, 0, 8, 8])
        .unwrap();

    let report = scene.state().validate();
    let messages: Vec<&str> = report
        .issues()
        .iter()
        .map(|issue| issue.message.as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("no buffers")));
    assert!(messages.iter().any(|m| m.contains("onto itself")));
}
