//! Scene Lifecycle Tests
//!
//! Tests for:
//! - Publish/unpublish idempotency and the legal state paths
//! - Ready gating on resource residency, edge-triggered retry
//! - Corrupted action streams forcing Unavailable
//! - Event ordering for the publish → ready → flushed scenario

use glam::Vec3;

use mirage::control::{
    ControlRequest, ControlResponse, RendererControl, RendererEvent, SceneAvailability,
};
use mirage::renderer::{DisplayConfig, HeadlessDevice, ResourceCacheConfig};
use mirage::resources::{ArrayMetadata, DataType, Resource, ResourceMetadata};
use mirage::scene::{
    ClientScene, DataFieldInfo, FlushTimeInfo, SceneActionId, SceneId, SceneVersionTag,
};

fn new_renderer() -> RendererControl {
    let _ = env_logger::builder().is_test(true).try_init();
    RendererControl::new(ResourceCacheConfig::default())
}

fn make_resource(seed: u8, elements: u32) -> Resource {
    Resource::create(
        ResourceMetadata::Array(ArrayMetadata {
            indices: false,
            element_type: DataType::Float,
            element_count: elements,
        }),
        vec![seed; (elements * 4) as usize],
        0,
        format!("res-{seed}"),
    )
    .unwrap()
}

/// Creates a display and maps + assigns the scene to its framebuffer.
fn setup_display(renderer: &mut RendererControl, scene: SceneId) -> mirage::scene::DisplayId {
    let ControlResponse::DisplayCreated(display) = renderer
        .handle_request(ControlRequest::CreateDisplay(DisplayConfig::default()))
        .unwrap()
    else {
        panic!("expected a display id");
    };
    renderer
        .handle_request(ControlRequest::SetSceneMapping { scene, display })
        .unwrap();
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();
    renderer
        .handle_request(ControlRequest::SetSceneDisplayBuffer {
            scene,
            buffer: framebuffer,
            render_order: 0,
        })
        .unwrap();
    display
}

fn states_of(events: &[RendererEvent]) -> Vec<SceneAvailability> {
    events
        .iter()
        .filter_map(|event| match event {
            RendererEvent::SceneStateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Publish / Unpublish
// ============================================================================

#[test]
fn publish_emits_available_once() {
    let mut renderer = new_renderer();
    renderer.scene_published(SceneId(1));
    renderer.scene_published(SceneId(1));

    let events = renderer.drain_events();
    assert_eq!(
        states_of(&events),
        vec![SceneAvailability::Available],
        "publishing twice must be idempotent"
    );
}

#[test]
fn unpublish_from_unknown_scene_is_a_noop() {
    let mut renderer = new_renderer();
    renderer.scene_unpublished(SceneId(99));
    assert!(renderer.drain_events().is_empty());
}

#[test]
fn unpublish_walks_down_through_legal_states() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let scene = SceneId(1);

    renderer.scene_published(scene);
    setup_display(&mut renderer, scene);
    renderer.receive_update(
        ClientScene::new(scene)
            .flush(SceneVersionTag(1), FlushTimeInfo::default())
            .unwrap(),
    );
    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Rendered,
        })
        .unwrap();
    for _ in 0..3 {
        renderer.do_one_loop(&mut device);
    }
    renderer.drain_events();

    renderer.scene_unpublished(scene);
    let states = states_of(&renderer.drain_events());
    assert_eq!(
        states,
        vec![
            SceneAvailability::Ready,
            SceneAvailability::Available,
            SceneAvailability::Unavailable
        ]
    );
}

// ============================================================================
// Publish → Ready → Flushed
// ============================================================================

#[test]
fn scene_with_resident_resources_reaches_ready_then_flushed() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let scene = SceneId(1);

    let r1 = make_resource(1, 16);
    let r2 = make_resource(2, 16);

    let mut client = ClientScene::new(scene);
    let layout = client.allocate_data_layout(
        vec![
            DataFieldInfo {
                data_type: DataType::ByteBlob,
                element_count: 1,
            },
            DataFieldInfo {
                data_type: DataType::ByteBlob,
                element_count: 1,
            },
        ],
        r1.hash(),
    );
    let instance = client.allocate_data_instance(layout).unwrap();
    client.set_data_resource(instance, 0, r2.hash()).unwrap();
    let update = client
        .flush(SceneVersionTag(7), FlushTimeInfo::default())
        .unwrap();

    renderer.scene_published(scene);
    setup_display(&mut renderer, scene);
    renderer.provide_resource(r1);
    renderer.provide_resource(r2);
    renderer.receive_update(update);
    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Ready,
        })
        .unwrap();

    renderer.do_one_loop(&mut device);
    renderer.do_one_loop(&mut device);

    let events = renderer.drain_events();
    let interesting: Vec<&RendererEvent> = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                RendererEvent::SceneStateChanged { .. } | RendererEvent::SceneFlushed { .. }
            )
        })
        .collect();

    assert!(matches!(
        interesting[0],
        RendererEvent::SceneStateChanged {
            state: SceneAvailability::Available,
            ..
        }
    ));
    assert!(matches!(
        interesting[1],
        RendererEvent::SceneStateChanged {
            state: SceneAvailability::Ready,
            ..
        }
    ));
    assert!(matches!(
        interesting[2],
        RendererEvent::SceneFlushed {
            version: SceneVersionTag(7),
            ..
        }
    ));
}

#[test]
fn missing_resources_hold_the_scene_at_available() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let scene = SceneId(1);

    let resource = make_resource(3, 8);
    let mut client = ClientScene::new(scene);
    client.allocate_data_layout(
        vec![DataFieldInfo {
            data_type: DataType::ByteBlob,
            element_count: 1,
        }],
        resource.hash(),
    );
    let update = client
        .flush(SceneVersionTag(1), FlushTimeInfo::default())
        .unwrap();

    renderer.scene_published(scene);
    setup_display(&mut renderer, scene);
    renderer.receive_update(update);
    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Ready,
        })
        .unwrap();

    // payload never provided: the scene must not advance
    renderer.do_one_loop(&mut device);
    renderer.do_one_loop(&mut device);
    assert_eq!(renderer.lifecycle().state_of(scene), SceneAvailability::Available);

    // once the payload arrives the transition happens within one tick
    renderer.provide_resource(resource);
    renderer.do_one_loop(&mut device);
    renderer.do_one_loop(&mut device);
    assert_eq!(renderer.lifecycle().state_of(scene), SceneAvailability::Ready);
}

#[test]
fn failed_upload_never_advances_past_available() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let scene = SceneId(1);

    let resource = make_resource(4, 8);
    device.fail_uploads.push(resource.hash());

    let mut client = ClientScene::new(scene);
    client.allocate_data_layout(
        vec![DataFieldInfo {
            data_type: DataType::ByteBlob,
            element_count: 1,
        }],
        resource.hash(),
    );
    let update = client
        .flush(SceneVersionTag(1), FlushTimeInfo::default())
        .unwrap();

    renderer.scene_published(scene);
    setup_display(&mut renderer, scene);
    renderer.provide_resource(resource);
    renderer.receive_update(update);
    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Ready,
        })
        .unwrap();

    for _ in 0..3 {
        renderer.do_one_loop(&mut device);
    }

    assert_eq!(renderer.lifecycle().state_of(scene), SceneAvailability::Available);
    assert!(
        renderer
            .drain_events()
            .iter()
            .any(|event| matches!(event, RendererEvent::ResourceFailed { .. }))
    );
}

// ============================================================================
// Target-State Requests
// ============================================================================

#[test]
fn lowering_the_target_steps_back_down() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let scene = SceneId(1);

    renderer.scene_published(scene);
    setup_display(&mut renderer, scene);
    renderer.receive_update(
        ClientScene::new(scene)
            .flush(SceneVersionTag(1), FlushTimeInfo::default())
            .unwrap(),
    );
    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Rendered,
        })
        .unwrap();
    for _ in 0..2 {
        renderer.do_one_loop(&mut device);
    }
    assert_eq!(renderer.lifecycle().state_of(scene), SceneAvailability::Rendered);

    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Available,
        })
        .unwrap();
    assert_eq!(renderer.lifecycle().state_of(scene), SceneAvailability::Available);
}

#[test]
fn requesting_the_current_state_is_a_noop() {
    let mut renderer = new_renderer();
    let scene = SceneId(1);
    renderer.scene_published(scene);
    renderer.drain_events();

    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Available,
        })
        .unwrap();
    assert!(states_of(&renderer.drain_events()).is_empty());
}

// ============================================================================
// Corruption
// ============================================================================

#[test]
fn corrupted_stream_forces_unavailable() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let scene = SceneId(1);

    renderer.scene_published(scene);
    setup_display(&mut renderer, scene);
    renderer.drain_events();

    // action referencing a handle that was never allocated
    let mut forged = mirage::scene::SceneActionCollection::new();
    forged.begin_action(SceneActionId::ReleaseNode);
    forged.write_u32(17);
    renderer.receive_update(mirage::scene::SceneUpdate {
        scene_id: scene,
        version_tag: SceneVersionTag::NONE,
        time_info: FlushTimeInfo::default(),
        actions: forged,
        resource_changes: mirage::scene::ResourceChanges::default(),
    });

    renderer.do_one_loop(&mut device);

    assert_eq!(
        renderer.lifecycle().state_of(scene),
        SceneAvailability::Unavailable
    );
    let events = renderer.drain_events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, RendererEvent::SceneCorrupted { .. }))
    );
}
