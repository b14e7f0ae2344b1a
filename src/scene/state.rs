//! In-memory scene state: one handle table per entity kind.
//!
//! Both sides of the wire hold a `SceneState`; the client mutates it
//! through [`crate::scene::ClientScene`] which records actions, the
//! renderer mirrors it by applying those actions. Replaying a recorded
//! action stream therefore reproduces the tables exactly.

use rustc_hash::FxHashSet;

use crate::resources::ResourceContentHash;
use crate::scene::components::{
    BlitPass, DataBuffer, DataInstance, DataLayout, Node, Renderable, RenderBuffer, RenderTarget,
    StreamTexture, TextureBuffer, TextureSampler, TextureSamplerContent,
};
use crate::scene::handles::{
    BlitPassHandle, DataBufferHandle, DataInstanceHandle, DataLayoutHandle, HandlePool, NodeHandle,
    RenderBufferHandle, RenderTargetHandle, RenderableHandle, StreamTextureHandle,
    TextureBufferHandle, TextureSamplerHandle,
};
use crate::scene::ids::SceneId;

#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    id: SceneId,
    pub nodes: HandlePool<NodeHandle, Node>,
    pub renderables: HandlePool<RenderableHandle, Renderable>,
    pub data_layouts: HandlePool<DataLayoutHandle, DataLayout>,
    pub data_instances: HandlePool<DataInstanceHandle, DataInstance>,
    pub texture_samplers: HandlePool<TextureSamplerHandle, TextureSampler>,
    pub render_buffers: HandlePool<RenderBufferHandle, RenderBuffer>,
    pub render_targets: HandlePool<RenderTargetHandle, RenderTarget>,
    pub blit_passes: HandlePool<BlitPassHandle, BlitPass>,
    pub data_buffers: HandlePool<DataBufferHandle, DataBuffer>,
    pub texture_buffers: HandlePool<TextureBufferHandle, TextureBuffer>,
    pub stream_textures: HandlePool<StreamTextureHandle, StreamTexture>,
}

impl SceneState {
    #[must_use]
    pub fn new(id: SceneId) -> Self {
        Self {
            id,
            nodes: HandlePool::new(),
            renderables: HandlePool::new(),
            data_layouts: HandlePool::new(),
            data_instances: HandlePool::new(),
            texture_samplers: HandlePool::new(),
            render_buffers: HandlePool::new(),
            render_targets: HandlePool::new(),
            blit_passes: HandlePool::new(),
            data_buffers: HandlePool::new(),
            texture_buffers: HandlePool::new(),
            stream_textures: HandlePool::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> SceneId {
        self.id
    }

    /// All client resources referenced by live components.
    #[must_use]
    pub fn referenced_resources(&self) -> FxHashSet<ResourceContentHash> {
        let mut hashes = FxHashSet::default();
        for (_, layout) in self.data_layouts.iter() {
            if layout.effect_hash.is_valid() {
                hashes.insert(layout.effect_hash);
            }
        }
        for (_, instance) in self.data_instances.iter() {
            for field in &instance.fields {
                if field.resource.is_valid() {
                    hashes.insert(field.resource);
                }
            }
        }
        for (_, sampler) in self.texture_samplers.iter() {
            if let TextureSamplerContent::ClientTexture(hash) = sampler.content {
                hashes.insert(hash);
            }
        }
        for (_, stream) in self.stream_textures.iter() {
            if stream.fallback.is_valid() {
                hashes.insert(stream.fallback);
            }
        }
        hashes
    }

    /// Ivi surface ids consumed by this scene's stream textures.
    #[must_use]
    pub fn consumed_stream_sources(&self) -> FxHashSet<crate::scene::WaylandIviSurfaceId> {
        self.stream_textures
            .iter()
            .map(|(_, stream)| stream.source_id)
            .collect()
    }
}
