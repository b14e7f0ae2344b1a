//! Per-display buffer graph: the framebuffer plus offscreen buffers, scene
//! assignments with render order, and the consume links that let scenes
//! sample offscreen buffers as textures. The graph is kept acyclic; render
//! order is a topological sort with the framebuffer last.

use bitflags::bitflags;
use glam::Vec4;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{MirageError, Result};
use crate::resources::PixelFormat;
use crate::scene::{DisplayBufferId, SceneId};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl Default for ClearFlags {
    fn default() -> Self {
        ClearFlags::all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayBufferKind {
    Framebuffer,
    Offscreen {
        /// May suspend mid-frame to honor the offscreen time budget.
        interruptible: bool,
    },
}

/// The framebuffer of a display or one offscreen buffer.
#[derive(Debug, Clone)]
pub struct DisplayBuffer {
    pub id: DisplayBufferId,
    pub kind: DisplayBufferKind,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub depth_stencil_format: Option<PixelFormat>,
    pub clear_flags: ClearFlags,
    pub clear_color: Vec4,
    /// Assigned scenes, kept ascending by `(render_order, scene)`.
    scenes: Vec<(SceneId, i32)>,
}

impl DisplayBuffer {
    #[must_use]
    pub fn is_interruptible(&self) -> bool {
        matches!(
            self.kind,
            DisplayBufferKind::Offscreen {
                interruptible: true
            }
        )
    }

    /// Scenes in strictly ascending render order.
    #[must_use]
    pub fn scenes(&self) -> &[(SceneId, i32)] {
        &self.scenes
    }

    fn assign(&mut self, scene: SceneId, order: i32) {
        self.scenes.retain(|&(s, _)| s != scene);
        let position = self
            .scenes
            .partition_point(|&(s, o)| (o, s) <= (order, scene));
        self.scenes.insert(position, (scene, order));
    }

    fn unassign(&mut self, scene: SceneId) {
        self.scenes.retain(|&(s, _)| s != scene);
    }
}

/// Consume edge: `consumer_scene` samples `provider` through the link id
/// the scene addresses it by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffscreenLink {
    pub provider: DisplayBufferId,
    pub consumer_scene: SceneId,
    pub consumer_id: u32,
}

#[derive(Debug)]
pub struct DisplayGraph {
    buffers: FxHashMap<DisplayBufferId, DisplayBuffer>,
    framebuffer: DisplayBufferId,
    links: Vec<OffscreenLink>,
    scene_buffer: FxHashMap<SceneId, DisplayBufferId>,
    next_buffer: u32,
}

impl DisplayGraph {
    /// Builds the graph around the display framebuffer.
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        sample_count: u32,
        depth_stencil_format: Option<PixelFormat>,
    ) -> Self {
        let framebuffer = DisplayBufferId(0);
        let mut buffers = FxHashMap::default();
        buffers.insert(
            framebuffer,
            DisplayBuffer {
                id: framebuffer,
                kind: DisplayBufferKind::Framebuffer,
                width,
                height,
                sample_count,
                depth_stencil_format,
                clear_flags: ClearFlags::default(),
                clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
                scenes: Vec::new(),
            },
        );
        Self {
            buffers,
            framebuffer,
            links: Vec::new(),
            scene_buffer: FxHashMap::default(),
            next_buffer: 1,
        }
    }

    #[must_use]
    pub fn framebuffer(&self) -> DisplayBufferId {
        self.framebuffer
    }

    #[must_use]
    pub fn buffer(&self, id: DisplayBufferId) -> Option<&DisplayBuffer> {
        self.buffers.get(&id)
    }

    pub fn buffer_mut(&mut self, id: DisplayBufferId) -> Option<&mut DisplayBuffer> {
        self.buffers.get_mut(&id)
    }

    #[must_use]
    pub fn buffer_of_scene(&self, scene: SceneId) -> Option<DisplayBufferId> {
        self.scene_buffer.get(&scene).copied()
    }

    #[must_use]
    pub fn links(&self) -> &[OffscreenLink] {
        &self.links
    }

    pub fn create_offscreen_buffer(
        &mut self,
        width: u32,
        height: u32,
        sample_count: u32,
        depth_stencil_format: Option<PixelFormat>,
        interruptible: bool,
    ) -> DisplayBufferId {
        let id = DisplayBufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            DisplayBuffer {
                id,
                kind: DisplayBufferKind::Offscreen { interruptible },
                width,
                height,
                sample_count,
                depth_stencil_format,
                clear_flags: ClearFlags::default(),
                clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
                scenes: Vec::new(),
            },
        );
        id
    }

    pub fn destroy_offscreen_buffer(&mut self, id: DisplayBufferId) -> Result<()> {
        if id == self.framebuffer {
            return Err(MirageError::InvalidEncoding(
                "the framebuffer cannot be destroyed".into(),
            ));
        }
        let buffer = self
            .buffers
            .remove(&id)
            .ok_or_else(|| MirageError::InvalidEncoding(format!("unknown buffer {id}")))?;
        for (scene, _) in buffer.scenes {
            self.scene_buffer.remove(&scene);
        }
        self.links.retain(|link| link.provider != id);
        Ok(())
    }

    /// Assigns a scene to a buffer with the given render order, moving it
    /// from its previous buffer if needed.
    pub fn assign_scene(
        &mut self,
        scene: SceneId,
        buffer: DisplayBufferId,
        order: i32,
    ) -> Result<()> {
        if !self.buffers.contains_key(&buffer) {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown buffer {buffer}"
            )));
        }
        if let Some(previous) = self.scene_buffer.get(&scene) {
            if let Some(prev_buffer) = self.buffers.get_mut(previous) {
                prev_buffer.unassign(scene);
            }
        }
        self.scene_buffer.insert(scene, buffer);
        if let Some(target) = self.buffers.get_mut(&buffer) {
            target.assign(scene, order);
        }
        if self.has_cycle() {
            // undo; the new assignment would make a consumer feed its provider
            if let Some(target) = self.buffers.get_mut(&buffer) {
                target.unassign(scene);
            }
            self.scene_buffer.remove(&scene);
            return Err(MirageError::InvalidEncoding(format!(
                "assigning {scene} to {buffer} would create a buffer cycle"
            )));
        }
        Ok(())
    }

    pub fn unassign_scene(&mut self, scene: SceneId) {
        if let Some(buffer) = self.scene_buffer.remove(&scene) {
            if let Some(target) = self.buffers.get_mut(&buffer) {
                target.unassign(scene);
            }
        }
    }

    /// Adds a consume edge from an offscreen buffer to a scene.
    pub fn link_offscreen_buffer(
        &mut self,
        provider: DisplayBufferId,
        consumer_scene: SceneId,
        consumer_id: u32,
    ) -> Result<()> {
        if provider == self.framebuffer || !self.buffers.contains_key(&provider) {
            return Err(MirageError::InvalidEncoding(format!(
                "{provider} is not an offscreen buffer"
            )));
        }
        self.links.retain(|link| {
            !(link.consumer_scene == consumer_scene && link.consumer_id == consumer_id)
        });
        self.links.push(OffscreenLink {
            provider,
            consumer_scene,
            consumer_id,
        });
        if self.has_cycle() {
            self.links.pop();
            return Err(MirageError::InvalidEncoding(format!(
                "linking {provider} into {consumer_scene} would create a buffer cycle"
            )));
        }
        Ok(())
    }

    pub fn unlink_offscreen_buffer(&mut self, consumer_scene: SceneId, consumer_id: u32) {
        self.links.retain(|link| {
            !(link.consumer_scene == consumer_scene && link.consumer_id == consumer_id)
        });
    }

    /// Buffers directly feeding `buffer` through consume links.
    #[must_use]
    pub fn providers_of(&self, buffer: DisplayBufferId) -> Vec<DisplayBufferId> {
        let Some(target) = self.buffers.get(&buffer) else {
            return Vec::new();
        };
        let scenes: FxHashSet<SceneId> = target.scenes.iter().map(|&(s, _)| s).collect();
        self.links
            .iter()
            .filter(|link| scenes.contains(&link.consumer_scene))
            .map(|link| link.provider)
            .collect()
    }

    /// Transitive closure of buffers feeding `buffer`, including itself.
    #[must_use]
    pub fn feeding_closure(&self, buffer: DisplayBufferId) -> FxHashSet<DisplayBufferId> {
        let mut closure = FxHashSet::default();
        let mut stack = vec![buffer];
        while let Some(current) = stack.pop() {
            if closure.insert(current) {
                stack.extend(self.providers_of(current));
            }
        }
        closure
    }

    /// Topological render order: every provider before any buffer sampling
    /// it, the framebuffer last.
    #[must_use]
    pub fn render_order(&self) -> Vec<DisplayBufferId> {
        let mut order: Vec<DisplayBufferId> = Vec::with_capacity(self.buffers.len());
        let mut visited = FxHashSet::default();
        let mut ids: Vec<DisplayBufferId> = self
            .buffers
            .keys()
            .copied()
            .filter(|&id| id != self.framebuffer)
            .collect();
        ids.sort_unstable();
        for id in ids {
            self.visit(id, &mut visited, &mut order);
        }
        self.visit(self.framebuffer, &mut visited, &mut order);
        order
    }

    fn visit(
        &self,
        id: DisplayBufferId,
        visited: &mut FxHashSet<DisplayBufferId>,
        order: &mut Vec<DisplayBufferId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let mut providers = self.providers_of(id);
        providers.sort_unstable();
        for provider in providers {
            self.visit(provider, visited, order);
        }
        order.push(id);
    }

    fn has_cycle(&self) -> bool {
        // DFS with colors over the provider → consumer-buffer edges
        fn dfs(
            graph: &DisplayGraph,
            id: DisplayBufferId,
            visiting: &mut FxHashSet<DisplayBufferId>,
            done: &mut FxHashSet<DisplayBufferId>,
        ) -> bool {
            if done.contains(&id) {
                return false;
            }
            if !visiting.insert(id) {
                return true;
            }
            for provider in graph.providers_of(id) {
                if dfs(graph, provider, visiting, done) {
                    return true;
                }
            }
            visiting.remove(&id);
            done.insert(id);
            false
        }

        let mut visiting = FxHashSet::default();
        let mut done = FxHashSet::default();
        self.buffers
            .keys()
            .any(|&id| dfs(self, id, &mut visiting, &mut done))
    }
}
