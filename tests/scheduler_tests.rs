//! Display Scheduler Tests
//!
//! Tests for:
//! - Draw order across scenes on one buffer (ascending render order)
//! - Offscreen buffers rendering before their consumers
//! - Skip-if-unchanged swap suppression
//! - Flush expiration and recovery events

use glam::Vec3;

use mirage::control::{
    ControlRequest, ControlResponse, RendererControl, RendererEvent, SceneAvailability,
};
use mirage::renderer::{DisplayConfig, HeadlessDevice, ResourceCacheConfig};
use mirage::scene::{
    ClientScene, DisplayBufferId, DisplayId, FlushTimeInfo, SceneId, SceneVersionTag,
};

fn new_renderer() -> RendererControl {
    let _ = env_logger::builder().is_test(true).try_init();
    RendererControl::new(ResourceCacheConfig::default())
}

fn create_display(renderer: &mut RendererControl) -> DisplayId {
    match renderer
        .handle_request(ControlRequest::CreateDisplay(DisplayConfig::default()))
        .unwrap()
    {
        ControlResponse::DisplayCreated(display) => display,
        other => panic!("unexpected response {other:?}"),
    }
}

/// One-node scene with a single visible renderable.
fn renderable_update(scene: SceneId, tag: u64) -> mirage::scene::SceneUpdate {
    let mut client = ClientScene::new(scene);
    let node = client.allocate_node();
    client.set_translation(node, Vec3::ZERO).unwrap();
    let renderable = client.allocate_renderable(node).unwrap();
    client.set_renderable_index_count(renderable, 3).unwrap();
    client
        .flush(SceneVersionTag(tag), FlushTimeInfo::default())
        .unwrap()
}

fn show_scene(
    renderer: &mut RendererControl,
    scene: SceneId,
    display: DisplayId,
    buffer: DisplayBufferId,
    order: i32,
) {
    renderer.scene_published(scene);
    renderer
        .handle_request(ControlRequest::SetSceneMapping { scene, display })
        .unwrap();
    renderer
        .handle_request(ControlRequest::SetSceneDisplayBuffer {
            scene,
            buffer,
            render_order: order,
        })
        .unwrap();
    renderer.receive_update(renderable_update(scene, 1));
    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Rendered,
        })
        .unwrap();
}

// ============================================================================
// Draw Order
// ============================================================================

#[test]
fn scenes_draw_in_ascending_render_order() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let display = create_display(&mut renderer);
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();

    // assign in reverse to make ordering observable
    show_scene(&mut renderer, SceneId(2), display, framebuffer, 2);
    show_scene(&mut renderer, SceneId(1), display, framebuffer, 1);

    for _ in 0..2 {
        renderer.do_one_loop(&mut device);
    }

    let scenes: Vec<SceneId> = device.draws.iter().map(|draw| draw.scene).collect();
    assert_eq!(scenes, vec![SceneId(1), SceneId(2)]);
}

// ============================================================================
// Offscreen Buffers
// ============================================================================

#[test]
fn provider_buffer_renders_before_its_consumer() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let display = create_display(&mut renderer);
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();

    let ControlResponse::OffscreenBufferCreated(offscreen) = renderer
        .handle_request(ControlRequest::CreateOffscreenBuffer {
            display,
            width: 256,
            height: 256,
            sample_count: 1,
            depth_stencil_format: None,
            interruptible: true,
        })
        .unwrap()
    else {
        panic!("expected an offscreen buffer");
    };

    let provider_scene = SceneId(10);
    let consumer_scene = SceneId(20);
    show_scene(&mut renderer, provider_scene, display, offscreen, 0);
    show_scene(&mut renderer, consumer_scene, display, framebuffer, 0);
    renderer
        .handle_request(ControlRequest::LinkOffscreenBuffer {
            provider: offscreen,
            consumer_scene,
            consumer_id: 1,
        })
        .unwrap();

    for _ in 0..2 {
        renderer.do_one_loop(&mut device);
    }

    let provider_draw = device
        .draws
        .iter()
        .position(|draw| draw.scene == provider_scene)
        .expect("provider scene must draw");
    let consumer_draw = device
        .draws
        .iter()
        .position(|draw| draw.scene == consumer_scene)
        .expect("consumer scene must draw");
    assert!(
        provider_draw < consumer_draw,
        "offscreen provider must render before the buffer sampling it"
    );
    assert_eq!(device.draws[provider_draw].buffer, offscreen);
    assert_eq!(device.draws[consumer_draw].buffer, framebuffer);
}

#[test]
fn dirty_provider_re_renders_its_consumer() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let display = create_display(&mut renderer);
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();

    let ControlResponse::OffscreenBufferCreated(offscreen) = renderer
        .handle_request(ControlRequest::CreateOffscreenBuffer {
            display,
            width: 64,
            height: 64,
            sample_count: 1,
            depth_stencil_format: None,
            interruptible: false,
        })
        .unwrap()
    else {
        panic!("expected an offscreen buffer");
    };
    let provider_scene = SceneId(10);
    let consumer_scene = SceneId(20);
    show_scene(&mut renderer, provider_scene, display, offscreen, 0);
    show_scene(&mut renderer, consumer_scene, display, framebuffer, 0);
    renderer
        .handle_request(ControlRequest::LinkOffscreenBuffer {
            provider: offscreen,
            consumer_scene,
            consumer_id: 1,
        })
        .unwrap();
    for _ in 0..3 {
        renderer.do_one_loop(&mut device);
    }
    device.draws.clear();

    // a provider-only change re-renders both buffers
    renderer.receive_update(renderable_update(provider_scene, 2));
    renderer.do_one_loop(&mut device);

    assert!(device.draws.iter().any(|d| d.buffer == offscreen));
    assert!(device.draws.iter().any(|d| d.buffer == framebuffer));
}

#[test]
fn linking_the_framebuffer_as_provider_is_rejected() {
    let mut renderer = new_renderer();
    let display = create_display(&mut renderer);
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();
    let scene = SceneId(1);
    renderer.scene_published(scene);
    renderer
        .handle_request(ControlRequest::SetSceneMapping { scene, display })
        .unwrap();

    let result = renderer.handle_request(ControlRequest::LinkOffscreenBuffer {
        provider: framebuffer,
        consumer_scene: scene,
        consumer_id: 1,
    });
    assert!(result.is_err());
}

// ============================================================================
// Skip-If-Unchanged
// ============================================================================

#[test]
fn unchanged_scene_skips_the_swap() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let display = create_display(&mut renderer);
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();
    show_scene(&mut renderer, SceneId(1), display, framebuffer, 0);

    // frame with changes presents
    let mut presented = false;
    for _ in 0..2 {
        presented |= renderer
            .do_one_loop(&mut device)
            .iter()
            .any(|(_, summary)| summary.presented);
    }
    assert!(presented, "the first rendered frame must present");

    // steady state: nothing changed, no swap
    let summaries = renderer.do_one_loop(&mut device);
    assert!(summaries.iter().all(|(_, summary)| !summary.presented));

    // a new flush presents again
    renderer.receive_update(renderable_update(SceneId(1), 2));
    let summaries = renderer.do_one_loop(&mut device);
    assert!(summaries.iter().any(|(_, summary)| summary.presented));
}

#[test]
fn disabling_skip_unmodified_swaps_every_frame() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let config = DisplayConfig {
        skip_unmodified: false,
        ..DisplayConfig::default()
    };
    let ControlResponse::DisplayCreated(_) = renderer
        .handle_request(ControlRequest::CreateDisplay(config))
        .unwrap()
    else {
        panic!("expected a display id");
    };

    for _ in 0..3 {
        let summaries = renderer.do_one_loop(&mut device);
        assert!(summaries.iter().all(|(_, summary)| summary.presented));
    }
}

// ============================================================================
// Expiration
// ============================================================================

#[test]
fn expiration_fires_once_and_recovers_once() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let display = create_display(&mut renderer);
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();
    let scene = SceneId(1);

    renderer.scene_published(scene);
    renderer
        .handle_request(ControlRequest::SetSceneMapping { scene, display })
        .unwrap();
    renderer
        .handle_request(ControlRequest::SetSceneDisplayBuffer {
            scene,
            buffer: framebuffer,
            render_order: 0,
        })
        .unwrap();

    let mut client = ClientScene::new(scene);
    let node = client.allocate_node();
    client.set_translation(node, Vec3::ZERO).unwrap();
    renderer.receive_update(
        client
            .flush(
                SceneVersionTag(1),
                FlushTimeInfo {
                    flush_ts: 1_000,
                    expiration_ts: 100_000_000,
                },
            )
            .unwrap(),
    );

    // before the deadline: no expiration
    renderer.do_one_loop_at(&mut device, 50_000_000);
    // after the deadline: exactly one event, repeated ticks stay silent
    renderer.do_one_loop_at(&mut device, 150_000_000);
    renderer.do_one_loop_at(&mut device, 200_000_000);
    renderer.do_one_loop_at(&mut device, 250_000_000);

    let events = renderer.drain_events();
    let expired_count = events
        .iter()
        .filter(|event| matches!(event, RendererEvent::SceneExpired { .. }))
        .count();
    assert_eq!(expired_count, 1);

    // a flush with a future expiration recovers exactly once
    renderer.receive_update(
        client
            .flush(
                SceneVersionTag(2),
                FlushTimeInfo {
                    flush_ts: 2_000,
                    expiration_ts: 10_000_000_000,
                },
            )
            .unwrap(),
    );
    renderer.do_one_loop_at(&mut device, 300_000_000);
    renderer.do_one_loop_at(&mut device, 350_000_000);

    let events = renderer.drain_events();
    let recovered_count = events
        .iter()
        .filter(|event| matches!(event, RendererEvent::SceneRecovered { .. }))
        .count();
    assert_eq!(recovered_count, 1);
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, RendererEvent::SceneExpired { .. }))
    );
}

// ============================================================================
// Embedded Surfaces
// ============================================================================

#[test]
fn committed_stream_content_uploads_and_answers_frame_callbacks() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let display = create_display(&mut renderer);
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();
    let scene = SceneId(1);
    let ivi = mirage::scene::WaylandIviSurfaceId(23);

    // scene with a stream texture consuming the ivi surface
    renderer.scene_published(scene);
    renderer
        .handle_request(ControlRequest::SetSceneMapping { scene, display })
        .unwrap();
    renderer
        .handle_request(ControlRequest::SetSceneDisplayBuffer {
            scene,
            buffer: framebuffer,
            render_order: 0,
        })
        .unwrap();
    let mut client = ClientScene::new(scene);
    let node = client.allocate_node();
    let renderable = client.allocate_renderable(node).unwrap();
    client.set_renderable_index_count(renderable, 3).unwrap();
    client.allocate_stream_texture(ivi, mirage::resources::ResourceContentHash::INVALID);
    renderer.receive_update(
        client
            .flush(SceneVersionTag(1), FlushTimeInfo::default())
            .unwrap(),
    );
    renderer
        .handle_request(ControlRequest::SetSceneState {
            scene,
            target: SceneAvailability::Rendered,
        })
        .unwrap();
    renderer.do_one_loop(&mut device);

    // the wayland client attaches, commits and asks for a frame callback
    let requests = renderer
        .display(display)
        .unwrap()
        .compositor()
        .request_sender();
    use mirage::compositor::CompositorRequest;
    requests
        .send(CompositorRequest::CreateSurface {
            connection: 1,
            surface: 1,
        })
        .unwrap();
    requests
        .send(CompositorRequest::BindIviSurface {
            connection: 1,
            surface: 1,
            ivi,
        })
        .unwrap();
    requests
        .send(CompositorRequest::AttachBuffer {
            connection: 1,
            surface: 1,
            buffer: 1,
            width: 2,
            height: 2,
            bytes: vec![0x3C; 16].into(),
        })
        .unwrap();
    requests
        .send(CompositorRequest::RequestFrameCallback {
            connection: 1,
            surface: 1,
            callback: 77,
        })
        .unwrap();
    requests
        .send(CompositorRequest::CommitSurface {
            connection: 1,
            surface: 1,
        })
        .unwrap();

    let summaries = renderer.do_one_loop(&mut device);
    assert_eq!(device.stream_uploads, vec![ivi]);
    let callbacks: Vec<u32> = summaries
        .iter()
        .flat_map(|(_, summary)| summary.frame_callbacks.iter().map(|cb| cb.callback))
        .collect();
    assert_eq!(callbacks, vec![77]);
}

// ============================================================================
// Display Teardown
// ============================================================================

#[test]
fn destroyed_display_stops_ticking() {
    let mut renderer = new_renderer();
    let mut device = HeadlessDevice::new();
    let display = create_display(&mut renderer);
    let framebuffer = renderer.display(display).unwrap().graph().framebuffer();
    show_scene(&mut renderer, SceneId(1), display, framebuffer, 0);

    renderer.do_one_loop(&mut device);
    renderer
        .handle_request(ControlRequest::DestroyDisplay(display))
        .unwrap();
    let summaries = renderer.do_one_loop(&mut device);
    assert!(summaries.is_empty());

    let events = renderer.drain_events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, RendererEvent::DisplayDestroyed { .. }))
    );
}
