//! Scene model: handle tables, components, the scene action log and the
//! client/renderer mutation pipelines built on it.

mod actions;
mod apply;
mod client;
mod components;
mod handles;
mod ids;
mod resource_changes;
mod state;
mod validate;

pub use actions::{ActionReader, SceneActionCollection, SceneActionId};
pub use apply::{AppliedFlush, apply_scene_actions};
pub use client::{ClientScene, SceneUpdate};
pub use components::{
    BlitPass, DataBuffer, DataBufferKind, DataField, DataFieldInfo, DataInstance, DataLayout,
    Node, Renderable, RenderBuffer, RenderTarget, RenderableDataSlot, SamplerFilter,
    StreamTexture, TextureBuffer, TextureBufferMip, TextureSampler, TextureSamplerContent,
    TextureSamplerStates, WrapMode, mip_dimensions_valid,
};
pub use handles::{
    BlitPassHandle, DataBufferHandle, DataInstanceHandle, DataLayoutHandle, HandlePool,
    NodeHandle, RenderBufferHandle, RenderTargetHandle, RenderableHandle, SceneHandle,
    StreamTextureHandle, TextureBufferHandle, TextureSamplerHandle,
};
pub use ids::{
    DisplayBufferId, DisplayId, FlushTimeInfo, SceneId, SceneVersionTag, WaylandIviSurfaceId,
};
pub use resource_changes::{ResourceChanges, SceneResourceAction, SceneResourceActionKind};
pub use state::SceneState;
pub use validate::{Severity, ValidationIssue, ValidationReport};
