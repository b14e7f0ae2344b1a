//! Per-scene state machine `{Unavailable, Available, Ready, Rendered}`.
//!
//! Events of different scenes are independent; events of one scene are
//! processed in arrival order. A flush whose resources are not yet resident
//! records a pending transition that is retried when the resource manager
//! reports the outstanding hash set empty (edge-triggered).

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::control::events::{EventSender, RendererEvent, SceneAvailability};
use crate::errors::MirageError;
use crate::renderer::ResourceManager;
use crate::resources::ResourceContentHash;
use crate::scene::{
    AppliedFlush, DisplayBufferId, DisplayId, SceneId, SceneState, SceneUpdate,
    apply_scene_actions,
};
use crate::utils::BudgetTimer;

/// Renderer-side bookkeeping for one published scene.
#[derive(Debug)]
pub struct SceneRecord {
    state: SceneAvailability,
    target: SceneAvailability,
    mirror: SceneState,
    pending_updates: VecDeque<SceneUpdate>,
    /// Resources of the latest applied flush still missing on the GPU.
    pending_resources: FxHashSet<ResourceContentHash>,
    latest_flush: Option<AppliedFlush>,
    /// Applied flush tags not yet announced; drained after the readiness
    /// recheck so `SceneFlushed` follows the state change it enabled.
    unnotified_flushes: Vec<crate::scene::SceneVersionTag>,
    mapped_display: Option<DisplayId>,
    assigned_buffer: Option<(DisplayBufferId, i32)>,
    expired: bool,
}

impl SceneRecord {
    fn new(scene: SceneId) -> Self {
        Self {
            state: SceneAvailability::Available,
            target: SceneAvailability::Available,
            mirror: SceneState::new(scene),
            pending_updates: VecDeque::new(),
            pending_resources: FxHashSet::default(),
            latest_flush: None,
            unnotified_flushes: Vec::new(),
            mapped_display: None,
            assigned_buffer: None,
            expired: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> SceneAvailability {
        self.state
    }

    #[must_use]
    pub fn mirror(&self) -> &SceneState {
        &self.mirror
    }

    #[must_use]
    pub fn mapped_display(&self) -> Option<DisplayId> {
        self.mapped_display
    }

    #[must_use]
    pub fn assigned_buffer(&self) -> Option<(DisplayBufferId, i32)> {
        self.assigned_buffer
    }

    #[must_use]
    pub fn latest_flush(&self) -> Option<&AppliedFlush> {
        self.latest_flush.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct SceneLifecycleController {
    scenes: FxHashMap<SceneId, SceneRecord>,
}

impl SceneLifecycleController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn record(&self, scene: SceneId) -> Option<&SceneRecord> {
        self.scenes.get(&scene)
    }

    #[must_use]
    pub fn state_of(&self, scene: SceneId) -> SceneAvailability {
        self.scenes
            .get(&scene)
            .map_or(SceneAvailability::Unavailable, |record| record.state)
    }

    /// Scenes mapped to `display`, for the scheduler's per-display steps.
    pub fn scenes_on_display(&self, display: DisplayId) -> Vec<SceneId> {
        let mut scenes: Vec<SceneId> = self
            .scenes
            .iter()
            .filter(|(_, record)| record.mapped_display == Some(display))
            .map(|(&scene, _)| scene)
            .collect();
        scenes.sort_unstable();
        scenes
    }

    // ========================================================================
    // Client-driven events
    // ========================================================================

    /// Client published the scene. Idempotent in any published state.
    pub fn publish(&mut self, scene: SceneId, events: &EventSender) {
        if self.scenes.contains_key(&scene) {
            return;
        }
        self.scenes.insert(scene, SceneRecord::new(scene));
        let _ = events.send(RendererEvent::SceneStateChanged {
            scene,
            state: SceneAvailability::Available,
        });
    }

    /// Client unpublished the scene; drops the mirror and dereferences the
    /// resources of the latest applied flush. No-op when unknown.
    pub fn unpublish(
        &mut self,
        scene: SceneId,
        resources: &mut ResourceManager,
        events: &EventSender,
    ) {
        let Some(record) = self.scenes.remove(&scene) else {
            return;
        };
        for hash in record.mirror.referenced_resources() {
            resources.dereference(hash);
        }
        // walk the downward edges so observers always see a legal path
        let downward = [
            SceneAvailability::Rendered,
            SceneAvailability::Ready,
            SceneAvailability::Available,
            SceneAvailability::Unavailable,
        ];
        for &state in downward.iter().filter(|&&s| s < record.state) {
            let _ = events.send(RendererEvent::SceneStateChanged { scene, state });
        }
    }

    /// A flush arrived over the transport. Queued in arrival order; applied
    /// within the scheduler's action budget.
    pub fn flush_received(&mut self, update: SceneUpdate) {
        let Some(record) = self.scenes.get_mut(&update.scene_id) else {
            log::warn!("flush for unpublished {}", update.scene_id);
            return;
        };
        record.pending_updates.push_back(update);
    }

    // ========================================================================
    // Control-driven events
    // ========================================================================

    pub fn set_mapped_display(&mut self, scene: SceneId, display: DisplayId) {
        if let Some(record) = self.scenes.get_mut(&scene) {
            record.mapped_display = Some(display);
        }
    }

    pub fn set_assigned_buffer(
        &mut self,
        scene: SceneId,
        buffer: Option<(DisplayBufferId, i32)>,
    ) {
        if let Some(record) = self.scenes.get_mut(&scene) {
            record.assigned_buffer = buffer;
        }
    }

    /// Control request for a target state. Requesting the current state is
    /// a no-op; otherwise the controller moves as far toward the target as
    /// the resource and assignment preconditions allow.
    pub fn set_target_state(
        &mut self,
        scene: SceneId,
        target: SceneAvailability,
        resources: &ResourceManager,
        events: &EventSender,
    ) {
        let Some(record) = self.scenes.get_mut(&scene) else {
            log::warn!("state request for unpublished {scene}");
            return;
        };
        record.target = target;
        Self::advance(scene, record, resources, events);
    }

    /// Re-runs the transition preconditions without changing the target
    /// (assignment or readiness may have unblocked a move).
    pub fn reevaluate(
        &mut self,
        scene: SceneId,
        resources: &ResourceManager,
        events: &EventSender,
    ) {
        if let Some(record) = self.scenes.get_mut(&scene) {
            Self::advance(scene, record, resources, events);
        }
    }

    // ========================================================================
    // Scheduler-driven steps
    // ========================================================================

    /// Applies pending flushes of the scenes on `display` within the time
    /// budget. Returns the scenes whose content changed.
    pub fn apply_pending_actions(
        &mut self,
        display: DisplayId,
        budget_us: u64,
        resources: &mut ResourceManager,
        events: &EventSender,
    ) -> Vec<SceneId> {
        let budget = BudgetTimer::start(budget_us);
        let mut changed = Vec::new();
        let scenes = self.scenes_on_display(display);
        'outer: for scene in scenes {
            let Some(record) = self.scenes.get_mut(&scene) else {
                continue;
            };
            while let Some(update) = record.pending_updates.pop_front() {
                match Self::apply_update(scene, record, update, resources, events) {
                    Ok(()) => {
                        if !changed.contains(&scene) {
                            changed.push(scene);
                        }
                    }
                    Err(error) => {
                        Self::corrupt(scene, record, &error, resources, events);
                        break;
                    }
                }
                if budget.expired() {
                    break 'outer;
                }
            }
            Self::advance(scene, record, resources, events);
            if budget.expired() {
                break;
            }
        }
        changed
    }

    /// Edge-triggered retry after resource readiness changed.
    pub fn recheck_pending(&mut self, resources: &ResourceManager, events: &EventSender) {
        for (&scene, record) in &mut self.scenes {
            if !record.pending_resources.is_empty() {
                record
                    .pending_resources
                    .retain(|hash| !resources.readiness(std::iter::once(hash)));
            }
            Self::advance(scene, record, resources, events);
        }
    }

    /// Announces every applied-but-unannounced flush, in application order.
    pub fn drain_flush_notifications(&mut self, events: &EventSender) {
        let mut scenes: Vec<SceneId> = self.scenes.keys().copied().collect();
        scenes.sort_unstable();
        for scene in scenes {
            if let Some(record) = self.scenes.get_mut(&scene) {
                for version in record.unnotified_flushes.drain(..) {
                    let _ = events.send(RendererEvent::SceneFlushed { scene, version });
                }
            }
        }
    }

    /// Emits `SceneExpired`/`SceneRecovered` against the wall clock. The
    /// expired flag latches until a later flush clears it; the scene state
    /// itself never changes.
    pub fn check_expirations(&mut self, now_ns: i64, events: &EventSender) {
        for (&scene, record) in &mut self.scenes {
            let Some(flush) = &record.latest_flush else {
                continue;
            };
            if !flush.time_info.has_expiration() {
                continue;
            }
            let expired = now_ns > flush.time_info.expiration_ts;
            if expired && !record.expired {
                record.expired = true;
                let _ = events.send(RendererEvent::SceneExpired { scene });
            } else if !expired && record.expired {
                record.expired = false;
                let _ = events.send(RendererEvent::SceneRecovered { scene });
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn apply_update(
        scene: SceneId,
        record: &mut SceneRecord,
        update: SceneUpdate,
        resources: &mut ResourceManager,
        events: &EventSender,
    ) -> crate::errors::Result<()> {
        let flush = apply_scene_actions(&mut record.mirror, &update.actions)?;

        if let Some(flush) = flush {
            for &hash in &flush.resource_changes.added {
                resources.reference(scene, hash);
            }
            for &hash in &flush.resource_changes.removed {
                resources.dereference(hash);
            }

            record.pending_resources = record
                .mirror
                .referenced_resources()
                .into_iter()
                .filter(|hash| !resources.readiness(std::iter::once(hash)))
                .collect();

            record.unnotified_flushes.push(flush.version_tag);
            record.latest_flush = Some(flush);
        }
        Ok(())
    }

    fn corrupt(
        scene: SceneId,
        record: &mut SceneRecord,
        error: &MirageError,
        resources: &mut ResourceManager,
        events: &EventSender,
    ) {
        log::error!("scene {scene} corrupted: {error}");
        for hash in record.mirror.referenced_resources() {
            resources.dereference(hash);
        }
        record.mirror = SceneState::new(scene);
        record.pending_updates.clear();
        record.pending_resources.clear();
        record.unnotified_flushes.clear();
        record.latest_flush = None;
        record.state = SceneAvailability::Unavailable;
        let _ = events.send(RendererEvent::SceneCorrupted {
            scene,
            message: error.to_string(),
        });
        let _ = events.send(RendererEvent::SceneStateChanged {
            scene,
            state: SceneAvailability::Unavailable,
        });
    }

    /// Moves the state toward the target as far as preconditions allow,
    /// emitting one event per state actually entered.
    fn advance(
        scene: SceneId,
        record: &mut SceneRecord,
        resources: &ResourceManager,
        events: &EventSender,
    ) {
        loop {
            let next = match (record.state, record.target) {
                // upward
                (SceneAvailability::Available, target) if target >= SceneAvailability::Ready => {
                    // needs scene content: at least one applied flush whose
                    // resources are all resident
                    if record.latest_flush.is_some()
                        && record.pending_resources.is_empty()
                        && resources.readiness(record.mirror.referenced_resources().iter())
                    {
                        Some(SceneAvailability::Ready)
                    } else {
                        None
                    }
                }
                (SceneAvailability::Ready, SceneAvailability::Rendered) => {
                    if record.assigned_buffer.is_some() {
                        Some(SceneAvailability::Rendered)
                    } else {
                        None
                    }
                }
                // downward
                (SceneAvailability::Rendered, target) if target < SceneAvailability::Rendered => {
                    Some(SceneAvailability::Ready)
                }
                (SceneAvailability::Ready, target) if target < SceneAvailability::Ready => {
                    Some(SceneAvailability::Available)
                }
                _ => None,
            };
            let Some(next) = next else {
                return;
            };
            record.state = next;
            let _ = events.send(RendererEvent::SceneStateChanged { scene, state: next });
        }
    }
}
