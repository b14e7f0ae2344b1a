//! Per-display frame loop.
//!
//! One cooperative tick per frame: pump the embedded compositor, apply
//! pending scene actions, upload resources, render the offscreen-buffer DAG
//! in topological order, swap if anything feeding the framebuffer changed,
//! then deliver wayland frame callbacks. Every step runs against its
//! configured time budget and suspends between whole work items.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::compositor::{EmbeddedCompositor, FrameCallback};
use crate::control::events::{EventSender, SceneAvailability};
use crate::lifecycle::SceneLifecycleController;
use crate::renderer::device::Device;
use crate::renderer::display_graph::{DisplayBufferKind, DisplayGraph};
use crate::renderer::resource_manager::ResourceManager;
use crate::renderer::settings::DisplayConfig;
use crate::scene::{DisplayBufferId, DisplayId, RenderableHandle, SceneId, WaylandIviSurfaceId};
use crate::utils::{BudgetTimer, FrameClock};

/// Where an interrupted offscreen render resumes next frame.
#[derive(Debug, Clone, Copy)]
struct ResumePoint {
    buffer: DisplayBufferId,
    scene_index: usize,
    renderable_index: usize,
}

/// Outcome of one scheduler tick.
#[derive(Debug, Default)]
pub struct FrameSummary {
    /// Whether the framebuffer was swapped.
    pub presented: bool,
    pub uploaded_resources: usize,
    pub drawn_renderables: usize,
    /// Callbacks the platform layer must deliver to wayland clients.
    pub frame_callbacks: Vec<FrameCallback>,
}

pub struct DisplayScheduler {
    display: DisplayId,
    config: DisplayConfig,
    graph: DisplayGraph,
    compositor: EmbeddedCompositor,
    clock: FrameClock,
    resume: Option<ResumePoint>,
    cancelled: bool,
    dirty_buffers: FxHashSet<DisplayBufferId>,
    was_rendered: FxHashMap<SceneId, bool>,
    frame_number: u64,
}

impl DisplayScheduler {
    #[must_use]
    pub fn new(display: DisplayId, config: DisplayConfig, events: EventSender) -> Self {
        let graph = DisplayGraph::new(
            config.width,
            config.height,
            config.sample_count,
            config.depth_stencil_format.map(Into::into),
        );
        Self {
            display,
            config,
            graph,
            compositor: EmbeddedCompositor::new(events),
            clock: FrameClock::new(),
            resume: None,
            cancelled: false,
            dirty_buffers: FxHashSet::default(),
            was_rendered: FxHashMap::default(),
            frame_number: 0,
        }
    }

    #[must_use]
    pub fn display_id(&self) -> DisplayId {
        self.display
    }

    #[must_use]
    pub fn graph(&self) -> &DisplayGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut DisplayGraph {
        &mut self.graph
    }

    #[must_use]
    pub fn compositor(&self) -> &EmbeddedCompositor {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut EmbeddedCompositor {
        &mut self.compositor
    }

    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Marks a buffer for re-rendering (assignment or link changes).
    pub fn mark_buffer_dirty(&mut self, buffer: DisplayBufferId) {
        self.dirty_buffers.insert(buffer);
    }

    pub fn mark_scene_dirty(&mut self, scene: SceneId) {
        if let Some(buffer) = self.graph.buffer_of_scene(scene) {
            self.dirty_buffers.insert(buffer);
        }
    }

    /// Display teardown: drains the loop; in-flight interruptible renders
    /// are discarded.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.resume = None;
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// One frame tick.
    pub fn frame(
        &mut self,
        lifecycle: &mut SceneLifecycleController,
        resources: &mut ResourceManager,
        device: &mut dyn Device,
        events: &EventSender,
        now_ns: i64,
    ) -> FrameSummary {
        let mut summary = FrameSummary::default();
        if self.cancelled {
            return summary;
        }
        self.clock.tick();
        self.frame_number += 1;
        let frame_timer = BudgetTimer::start(self.config.budgets.frame_max_us);
        let mut over_budget: Vec<&'static str> = Vec::new();

        // 1. pump the embedded compositor and route buffer commits
        let mut acquired_sources: Vec<WaylandIviSurfaceId> = Vec::new();
        self.pump_compositor(lifecycle, device, &mut acquired_sources);

        // 2. apply pending scene actions
        let actions_timer = BudgetTimer::start(u64::MAX);
        let changed = lifecycle.apply_pending_actions(
            self.display,
            self.config.budgets.limit_actions_us,
            resources,
            events,
        );
        if actions_timer.elapsed().as_micros() as u64 > self.config.budgets.limit_actions_us {
            over_budget.push("actions");
        }
        for scene in changed {
            self.mark_scene_dirty(scene);
        }

        // 3. upload resources, then retry pending ready-transitions
        let uploads_timer = BudgetTimer::start(u64::MAX);
        summary.uploaded_resources =
            resources.upload_step(device, self.config.budgets.limit_uploads_us);
        if uploads_timer.elapsed().as_micros() as u64 > self.config.budgets.limit_uploads_us {
            over_budget.push("uploads");
        }
        lifecycle.recheck_pending(resources, events);
        lifecycle.drain_flush_notifications(events);
        lifecycle.check_expirations(now_ns, events);

        // scenes that just entered or left Rendered need their buffer redrawn
        for scene in lifecycle.scenes_on_display(self.display) {
            let rendered = lifecycle.state_of(scene) == SceneAvailability::Rendered;
            let before = self.was_rendered.insert(scene, rendered).unwrap_or(false);
            if before != rendered {
                self.mark_scene_dirty(scene);
            }
        }

        // 4. render offscreen buffers in topological order, then the framebuffer
        let rendered = self.render_buffers(lifecycle, device, &mut summary, &mut over_budget);

        // 5. swap if anything feeding the framebuffer changed
        let closure = self.graph.feeding_closure(self.graph.framebuffer());
        let framebuffer_touched = rendered.iter().any(|buffer| closure.contains(buffer));
        if framebuffer_touched || !self.config.skip_unmodified {
            device.swap_buffers(self.display);
            summary.presented = true;
        }

        // 6. frame callbacks for consumed surfaces used this frame
        summary.frame_callbacks = self.compositor.end_frame(false, &acquired_sources);
        for source in acquired_sources {
            self.compositor.release_content(source);
        }

        if frame_timer.expired() {
            log::warn!(
                "display {} frame {} over budget ({} us), slow steps: {}",
                self.display,
                self.frame_number,
                frame_timer.elapsed().as_micros(),
                if over_budget.is_empty() {
                    "render".to_string()
                } else {
                    over_budget.join(", ")
                }
            );
        }
        summary
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn pump_compositor(
        &mut self,
        lifecycle: &SceneLifecycleController,
        device: &mut dyn Device,
        acquired: &mut Vec<WaylandIviSurfaceId>,
    ) {
        self.compositor.pump();
        let updated = self.compositor.dispatch_updated_sources();
        if updated.is_empty() {
            return;
        }
        let scenes = lifecycle.scenes_on_display(self.display);
        for source in updated {
            let consumed_by: Vec<SceneId> = scenes
                .iter()
                .copied()
                .filter(|&scene| {
                    lifecycle
                        .record(scene)
                        .is_some_and(|r| r.mirror().consumed_stream_sources().contains(&source))
                })
                .collect();
            if consumed_by.is_empty() {
                continue;
            }
            if let Some(content) = self.compositor.acquire_content(source) {
                device.upload_stream_texture(source, content.width, content.height, &content.bytes);
                acquired.push(source);
                for scene in consumed_by {
                    self.mark_scene_dirty(scene);
                }
            }
        }
    }

    /// Renders dirty buffers providers-first; returns the buffers drawn
    /// this frame.
    fn render_buffers(
        &mut self,
        lifecycle: &SceneLifecycleController,
        device: &mut dyn Device,
        summary: &mut FrameSummary,
        over_budget: &mut Vec<&'static str>,
    ) -> Vec<DisplayBufferId> {
        let order = self.graph.render_order();

        // dirt propagates along consume edges: a dirty provider re-renders
        // its consumers
        for &buffer in &order {
            if self
                .graph
                .providers_of(buffer)
                .iter()
                .any(|p| self.dirty_buffers.contains(p))
            {
                self.dirty_buffers.insert(buffer);
            }
        }

        let offscreen_budget = BudgetTimer::start(self.config.budgets.limit_offscreen_us);
        let mut rendered = Vec::new();
        let mut offscreen_exhausted = false;

        for &buffer_id in &order {
            let Some(buffer) = self.graph.buffer(buffer_id) else {
                continue;
            };
            let is_framebuffer = matches!(buffer.kind, DisplayBufferKind::Framebuffer);
            let resume_here = self
                .resume
                .filter(|point| point.buffer == buffer_id)
                .map(|point| (point.scene_index, point.renderable_index));

            if !self.dirty_buffers.contains(&buffer_id) && resume_here.is_none() {
                continue;
            }
            if !is_framebuffer && offscreen_exhausted && resume_here.is_none() {
                // out of budget; stays dirty and renders next frame
                continue;
            }

            let start = resume_here.unwrap_or((0, 0));
            if resume_here.is_some() {
                self.resume = None;
            } else {
                device.begin_buffer(self.display, buffer);
            }

            let budget = if is_framebuffer {
                None
            } else {
                Some(&offscreen_budget)
            };
            let interrupt = Self::draw_buffer_scenes(
                self.display,
                buffer_id,
                buffer.scenes(),
                buffer.is_interruptible(),
                start,
                budget,
                lifecycle,
                device,
                summary,
            );

            match interrupt {
                Some((scene_index, renderable_index)) => {
                    self.resume = Some(ResumePoint {
                        buffer: buffer_id,
                        scene_index,
                        renderable_index,
                    });
                    offscreen_exhausted = true;
                }
                None => {
                    self.dirty_buffers.remove(&buffer_id);
                    rendered.push(buffer_id);
                    if !is_framebuffer && offscreen_budget.expired() {
                        offscreen_exhausted = true;
                    }
                }
            }
        }

        if offscreen_exhausted {
            over_budget.push("offscreen");
        }
        rendered
    }

    /// Draws the scenes of one buffer in ascending render order. Returns
    /// the interruption point when the budget ran out mid-buffer.
    #[allow(clippy::too_many_arguments)]
    fn draw_buffer_scenes(
        display: DisplayId,
        buffer: DisplayBufferId,
        scenes: &[(SceneId, i32)],
        interruptible: bool,
        start: (usize, usize),
        budget: Option<&BudgetTimer>,
        lifecycle: &SceneLifecycleController,
        device: &mut dyn Device,
        summary: &mut FrameSummary,
    ) -> Option<(usize, usize)> {
        for (scene_index, &(scene, _)) in scenes.iter().enumerate().skip(start.0) {
            if lifecycle.state_of(scene) != SceneAvailability::Rendered {
                continue;
            }
            let Some(record) = lifecycle.record(scene) else {
                continue;
            };
            let mirror = record.mirror();
            let renderables: Vec<RenderableHandle> = mirror
                .renderables
                .iter()
                .filter(|(_, r)| r.visible)
                .map(|(handle, _)| handle)
                .collect();
            let first = if scene_index == start.0 { start.1 } else { 0 };
            for (renderable_index, &handle) in renderables.iter().enumerate().skip(first) {
                if interruptible {
                    if let Some(budget) = budget {
                        if budget.expired() {
                            return Some((scene_index, renderable_index));
                        }
                    }
                }
                device.draw_renderable(display, buffer, mirror, handle);
                summary.drawn_renderables += 1;
            }
        }
        None
    }
}
