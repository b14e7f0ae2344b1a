//! The renderer-side control surface.
//!
//! Owns every per-display scheduler, the scene lifecycle controller and the
//! resource cache, executes control requests against them and runs the
//! frame loops. Incoming flushes and resources are injected through
//! [`RendererControl::receive_update`] / [`RendererControl::provide_resource`].

use rustc_hash::FxHashMap;

use crate::control::events::{
    EventReceiver, EventSender, RendererEvent, SceneAvailability, event_channel,
};
use crate::errors::{MirageError, Result};
use crate::lifecycle::SceneLifecycleController;
use crate::renderer::{
    Device, DisplayConfig, DisplayScheduler, FrameSummary, ResourceCacheConfig, ResourceManager,
};
use crate::resources::{PixelFormat, Resource};
use crate::scene::{DisplayBufferId, DisplayId, SceneId, SceneUpdate};
use crate::utils::FrameClock;

/// Cross-scene data link: `(provider_scene, provider_id)` feeds
/// `(consumer_scene, consumer_id)`. Endpoints resolve lazily at frame
/// start; a missing endpoint warns instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLink {
    pub provider_scene: SceneId,
    pub provider_id: u32,
    pub consumer_scene: SceneId,
    pub consumer_id: u32,
}

/// Request of the renderer control API.
#[derive(Debug, Clone)]
pub enum ControlRequest {
    CreateDisplay(DisplayConfig),
    DestroyDisplay(DisplayId),
    CreateOffscreenBuffer {
        display: DisplayId,
        width: u32,
        height: u32,
        sample_count: u32,
        depth_stencil_format: Option<PixelFormat>,
        interruptible: bool,
    },
    DestroyOffscreenBuffer {
        display: DisplayId,
        buffer: DisplayBufferId,
    },
    SetSceneMapping {
        scene: SceneId,
        display: DisplayId,
    },
    SetSceneDisplayBuffer {
        scene: SceneId,
        buffer: DisplayBufferId,
        render_order: i32,
    },
    SetSceneState {
        scene: SceneId,
        target: SceneAvailability,
    },
    LinkOffscreenBuffer {
        provider: DisplayBufferId,
        consumer_scene: SceneId,
        consumer_id: u32,
    },
    LinkData(DataLink),
    UnlinkData {
        consumer_scene: SceneId,
        consumer_id: u32,
    },
}

/// Response of a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    DisplayCreated(DisplayId),
    OffscreenBufferCreated(DisplayBufferId),
    Done,
}

pub struct RendererControl {
    displays: FxHashMap<DisplayId, DisplayScheduler>,
    lifecycle: SceneLifecycleController,
    resources: ResourceManager,
    data_links: Vec<DataLink>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    next_display: u32,
}

impl RendererControl {
    #[must_use]
    pub fn new(cache_config: ResourceCacheConfig) -> Self {
        let (events_tx, events_rx) = event_channel();
        let resources = ResourceManager::new(cache_config, events_tx.clone());
        Self {
            displays: FxHashMap::default(),
            lifecycle: SceneLifecycleController::new(),
            resources,
            data_links: Vec::new(),
            events_tx,
            events_rx,
            next_display: 0,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> &SceneLifecycleController {
        &self.lifecycle
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    #[must_use]
    pub fn display(&self, display: DisplayId) -> Option<&DisplayScheduler> {
        self.displays.get(&display)
    }

    pub fn display_mut(&mut self, display: DisplayId) -> Option<&mut DisplayScheduler> {
        self.displays.get_mut(&display)
    }

    /// Drains all pending pushed events.
    pub fn drain_events(&mut self) -> Vec<RendererEvent> {
        self.events_rx.try_iter().collect()
    }

    // ========================================================================
    // Transport ingestion
    // ========================================================================

    /// Client published a scene.
    pub fn scene_published(&mut self, scene: SceneId) {
        self.lifecycle.publish(scene, &self.events_tx);
    }

    /// Client unpublished a scene.
    pub fn scene_unpublished(&mut self, scene: SceneId) {
        for scheduler in self.displays.values_mut() {
            scheduler.graph_mut().unassign_scene(scene);
        }
        self.lifecycle
            .unpublish(scene, &mut self.resources, &self.events_tx);
    }

    /// A decoded flush arrived for a scene.
    pub fn receive_update(&mut self, update: SceneUpdate) {
        self.lifecycle.flush_received(update);
    }

    /// A resource payload arrived (transport or resource file).
    pub fn provide_resource(&mut self, resource: Resource) {
        self.resources.provide(resource);
    }

    // ========================================================================
    // Control requests
    // ========================================================================

    pub fn handle_request(&mut self, request: ControlRequest) -> Result<ControlResponse> {
        match request {
            ControlRequest::CreateDisplay(config) => {
                let display = DisplayId(self.next_display);
                self.next_display += 1;
                self.displays.insert(
                    display,
                    DisplayScheduler::new(display, config, self.events_tx.clone()),
                );
                let _ = self.events_tx.send(RendererEvent::DisplayCreated { display });
                Ok(ControlResponse::DisplayCreated(display))
            }
            ControlRequest::DestroyDisplay(display) => {
                let mut scheduler = self
                    .displays
                    .remove(&display)
                    .ok_or_else(|| unknown_display(display))?;
                scheduler.cancel();
                self.resources.abort_queued();
                let _ = self
                    .events_tx
                    .send(RendererEvent::DisplayDestroyed { display });
                Ok(ControlResponse::Done)
            }
            ControlRequest::CreateOffscreenBuffer {
                display,
                width,
                height,
                sample_count,
                depth_stencil_format,
                interruptible,
            } => {
                let scheduler = self
                    .displays
                    .get_mut(&display)
                    .ok_or_else(|| unknown_display(display))?;
                let buffer = scheduler.graph_mut().create_offscreen_buffer(
                    width,
                    height,
                    sample_count,
                    depth_stencil_format,
                    interruptible,
                );
                let _ = self
                    .events_tx
                    .send(RendererEvent::OffscreenBufferCreated { display, buffer });
                Ok(ControlResponse::OffscreenBufferCreated(buffer))
            }
            ControlRequest::DestroyOffscreenBuffer { display, buffer } => {
                let scheduler = self
                    .displays
                    .get_mut(&display)
                    .ok_or_else(|| unknown_display(display))?;
                scheduler.graph_mut().destroy_offscreen_buffer(buffer)?;
                let _ = self
                    .events_tx
                    .send(RendererEvent::OffscreenBufferDestroyed { display, buffer });
                Ok(ControlResponse::Done)
            }
            ControlRequest::SetSceneMapping { scene, display } => {
                if !self.displays.contains_key(&display) {
                    return Err(unknown_display(display));
                }
                self.lifecycle.set_mapped_display(scene, display);
                Ok(ControlResponse::Done)
            }
            ControlRequest::SetSceneDisplayBuffer {
                scene,
                buffer,
                render_order,
            } => {
                let display = self
                    .lifecycle
                    .record(scene)
                    .and_then(|record| record.mapped_display())
                    .ok_or_else(|| {
                        MirageError::InvalidEncoding(format!("{scene} is not mapped to a display"))
                    })?;
                let scheduler = self
                    .displays
                    .get_mut(&display)
                    .ok_or_else(|| unknown_display(display))?;
                scheduler.graph_mut().assign_scene(scene, buffer, render_order)?;
                scheduler.mark_buffer_dirty(buffer);
                self.lifecycle
                    .set_assigned_buffer(scene, Some((buffer, render_order)));
                self.lifecycle
                    .reevaluate(scene, &self.resources, &self.events_tx);
                Ok(ControlResponse::Done)
            }
            ControlRequest::SetSceneState { scene, target } => {
                if target == SceneAvailability::Unavailable {
                    log::warn!(
                        "target Unavailable is owned by the publishing client; lowering {scene} to Available"
                    );
                }
                let target = target.max(SceneAvailability::Available);
                self.lifecycle
                    .set_target_state(scene, target, &self.resources, &self.events_tx);
                Ok(ControlResponse::Done)
            }
            ControlRequest::LinkOffscreenBuffer {
                provider,
                consumer_scene,
                consumer_id,
            } => {
                let display = self
                    .lifecycle
                    .record(consumer_scene)
                    .and_then(|record| record.mapped_display())
                    .ok_or_else(|| {
                        MirageError::InvalidEncoding(format!(
                            "{consumer_scene} is not mapped to a display"
                        ))
                    })?;
                let scheduler = self
                    .displays
                    .get_mut(&display)
                    .ok_or_else(|| unknown_display(display))?;
                scheduler
                    .graph_mut()
                    .link_offscreen_buffer(provider, consumer_scene, consumer_id)?;
                scheduler.mark_scene_dirty(consumer_scene);
                let _ = self.events_tx.send(RendererEvent::OffscreenBufferLinked {
                    provider,
                    consumer_scene,
                    consumer_id,
                });
                Ok(ControlResponse::Done)
            }
            ControlRequest::LinkData(link) => {
                self.data_links.retain(|existing| {
                    !(existing.consumer_scene == link.consumer_scene
                        && existing.consumer_id == link.consumer_id)
                });
                self.data_links.push(link);
                Ok(ControlResponse::Done)
            }
            ControlRequest::UnlinkData {
                consumer_scene,
                consumer_id,
            } => {
                self.data_links.retain(|existing| {
                    !(existing.consumer_scene == consumer_scene
                        && existing.consumer_id == consumer_id)
                });
                Ok(ControlResponse::Done)
            }
        }
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// Runs one frame on every display, in display id order.
    pub fn do_one_loop(&mut self, device: &mut dyn Device) -> Vec<(DisplayId, FrameSummary)> {
        self.resolve_data_links();
        let now_ns = FrameClock::wall_clock_ns();
        self.do_one_loop_at(device, now_ns)
    }

    /// Frame loop with an explicit wall-clock timestamp (deterministic
    /// expiration in tests).
    pub fn do_one_loop_at(
        &mut self,
        device: &mut dyn Device,
        now_ns: i64,
    ) -> Vec<(DisplayId, FrameSummary)> {
        let mut ids: Vec<DisplayId> = self.displays.keys().copied().collect();
        ids.sort_unstable();
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(scheduler) = self.displays.get_mut(&id) {
                let summary = scheduler.frame(
                    &mut self.lifecycle,
                    &mut self.resources,
                    device,
                    &self.events_tx,
                    now_ns,
                );
                summaries.push((id, summary));
            }
        }
        summaries
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Lazy per-frame resolution of cross-scene data links.
    fn resolve_data_links(&mut self) {
        for link in &self.data_links {
            let provider_live = self.lifecycle.record(link.provider_scene).is_some();
            let consumer_live = self.lifecycle.record(link.consumer_scene).is_some();
            if !provider_live || !consumer_live {
                log::warn!(
                    "data link {}:{} -> {}:{} has a missing endpoint",
                    link.provider_scene,
                    link.provider_id,
                    link.consumer_scene,
                    link.consumer_id
                );
            }
        }
    }
}

fn unknown_display(display: DisplayId) -> MirageError {
    MirageError::InvalidEncoding(format!("unknown {display}"))
}
