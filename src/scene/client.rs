//! Client-side scene: every mutation updates the in-memory handle tables
//! and appends a typed record to the current action log. `flush` seals the
//! epoch and hands the log plus the resource-change set to the transport.

use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;

use crate::errors::{MirageError, Result};
use crate::resources::{DataType, PixelFormat, ResourceContentHash};
use crate::scene::actions::{SceneActionCollection, SceneActionId};
use crate::scene::components::{
    BlitPass, DataBuffer, DataBufferKind, DataFieldInfo, DataInstance, DataLayout, Node,
    Renderable, RenderBuffer, RenderTarget, RenderableDataSlot, StreamTexture, TextureBuffer,
    TextureBufferMip, TextureSampler, TextureSamplerContent, TextureSamplerStates,
};
use crate::scene::handles::{
    BlitPassHandle, DataBufferHandle, DataInstanceHandle, DataLayoutHandle, NodeHandle,
    RenderBufferHandle, RenderTargetHandle, RenderableHandle, SceneHandle, StreamTextureHandle,
    TextureBufferHandle, TextureSamplerHandle,
};
use crate::scene::ids::{FlushTimeInfo, SceneId, SceneVersionTag, WaylandIviSurfaceId};
use crate::scene::resource_changes::{
    ResourceChanges, SceneResourceAction, SceneResourceActionKind,
};
use crate::scene::state::SceneState;
use crate::scene::mip_dimensions_valid;

/// Everything one flush hands to the transport.
#[derive(Debug)]
pub struct SceneUpdate {
    pub scene_id: SceneId,
    pub version_tag: SceneVersionTag,
    pub time_info: FlushTimeInfo,
    /// Sealed action log, terminated by the `SceneFlush` record.
    pub actions: SceneActionCollection,
    pub resource_changes: ResourceChanges,
}

/// Scene as authored in a client process.
#[derive(Debug)]
pub struct ClientScene {
    state: SceneState,
    actions: SceneActionCollection,
    changes: ResourceChanges,
    resource_refs: FxHashMap<ResourceContentHash, u32>,
}

impl ClientScene {
    #[must_use]
    pub fn new(id: SceneId) -> Self {
        Self {
            state: SceneState::new(id),
            actions: SceneActionCollection::new(),
            changes: ResourceChanges::default(),
            resource_refs: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> SceneId {
        self.state.id()
    }

    #[must_use]
    pub fn state(&self) -> &SceneState {
        &self.state
    }

    /// Actions recorded since the last flush.
    #[must_use]
    pub fn pending_actions(&self) -> &SceneActionCollection {
        &self.actions
    }

    #[must_use]
    pub fn pending_changes(&self) -> &ResourceChanges {
        &self.changes
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn allocate_node(&mut self) -> NodeHandle {
        let handle = self.state.nodes.allocate(Node::default());
        self.actions.begin_action(SceneActionId::AllocateNode);
        self.actions.write_u32(handle.index());
        handle
    }

    pub fn release_node(&mut self, handle: NodeHandle) -> Result<()> {
        self.state.nodes.release(self.id(), handle)?;
        self.actions.begin_action(SceneActionId::ReleaseNode);
        self.actions.write_u32(handle.index());
        Ok(())
    }

    pub fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        let id = self.id();
        self.state.nodes.try_get(id, parent)?;
        self.state.nodes.try_get_mut(id, child)?.parent = parent;
        self.state
            .nodes
            .try_get_mut(id, parent)?
            .children
            .push(child);
        self.actions.begin_action(SceneActionId::AddChildToNode);
        self.actions.write_u32(parent.index());
        self.actions.write_u32(child.index());
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        let id = self.id();
        self.state
            .nodes
            .try_get_mut(id, parent)?
            .children
            .retain(|&c| c != child);
        self.state.nodes.try_get_mut(id, child)?.parent = NodeHandle::invalid();
        self.actions
            .begin_action(SceneActionId::RemoveChildFromNode);
        self.actions.write_u32(parent.index());
        self.actions.write_u32(child.index());
        Ok(())
    }

    pub fn set_translation(&mut self, node: NodeHandle, translation: Vec3) -> Result<()> {
        let id = self.id();
        self.state.nodes.try_get_mut(id, node)?.translation = translation;
        self.actions.begin_action(SceneActionId::SetTranslation);
        self.actions.write_u32(node.index());
        write_vec3(&mut self.actions, translation);
        Ok(())
    }

    pub fn set_rotation(&mut self, node: NodeHandle, rotation: Quat) -> Result<()> {
        let id = self.id();
        self.state.nodes.try_get_mut(id, node)?.rotation = rotation;
        self.actions.begin_action(SceneActionId::SetRotation);
        self.actions.write_u32(node.index());
        self.actions.write_f32(rotation.x);
        self.actions.write_f32(rotation.y);
        self.actions.write_f32(rotation.z);
        self.actions.write_f32(rotation.w);
        Ok(())
    }

    pub fn set_scaling(&mut self, node: NodeHandle, scaling: Vec3) -> Result<()> {
        let id = self.id();
        self.state.nodes.try_get_mut(id, node)?.scaling = scaling;
        self.actions.begin_action(SceneActionId::SetScaling);
        self.actions.write_u32(node.index());
        write_vec3(&mut self.actions, scaling);
        Ok(())
    }

    // ========================================================================
    // Renderables
    // ========================================================================

    pub fn allocate_renderable(&mut self, node: NodeHandle) -> Result<RenderableHandle> {
        self.state.nodes.try_get(self.id(), node)?;
        let handle = self.state.renderables.allocate(Renderable::new(node));
        self.actions.begin_action(SceneActionId::AllocateRenderable);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(node.index());
        Ok(handle)
    }

    pub fn release_renderable(&mut self, handle: RenderableHandle) -> Result<()> {
        self.state.renderables.release(self.id(), handle)?;
        self.actions.begin_action(SceneActionId::ReleaseRenderable);
        self.actions.write_u32(handle.index());
        Ok(())
    }

    pub fn set_renderable_data_instance(
        &mut self,
        renderable: RenderableHandle,
        slot: RenderableDataSlot,
        instance: DataInstanceHandle,
    ) -> Result<()> {
        let id = self.id();
        self.state.data_instances.try_get(id, instance)?;
        let target = self.state.renderables.try_get_mut(id, renderable)?;
        match slot {
            RenderableDataSlot::Geometry => target.geometry_instance = instance,
            RenderableDataSlot::Uniforms => target.uniform_instance = instance,
        }
        self.actions
            .begin_action(SceneActionId::SetRenderableDataInstance);
        self.actions.write_u32(renderable.index());
        self.actions.write_u8(slot as u8);
        self.actions.write_u32(instance.index());
        Ok(())
    }

    pub fn set_renderable_start_index(
        &mut self,
        renderable: RenderableHandle,
        start_index: u32,
    ) -> Result<()> {
        let id = self.id();
        self.state.renderables.try_get_mut(id, renderable)?.start_index = start_index;
        self.actions
            .begin_action(SceneActionId::SetRenderableStartIndex);
        self.actions.write_u32(renderable.index());
        self.actions.write_u32(start_index);
        Ok(())
    }

    pub fn set_renderable_index_count(
        &mut self,
        renderable: RenderableHandle,
        index_count: u32,
    ) -> Result<()> {
        let id = self.id();
        self.state.renderables.try_get_mut(id, renderable)?.index_count = index_count;
        self.actions
            .begin_action(SceneActionId::SetRenderableIndexCount);
        self.actions.write_u32(renderable.index());
        self.actions.write_u32(index_count);
        Ok(())
    }

    pub fn set_renderable_instance_count(
        &mut self,
        renderable: RenderableHandle,
        instance_count: u32,
    ) -> Result<()> {
        let id = self.id();
        self.state
            .renderables
            .try_get_mut(id, renderable)?
            .instance_count = instance_count;
        self.actions
            .begin_action(SceneActionId::SetRenderableInstanceCount);
        self.actions.write_u32(renderable.index());
        self.actions.write_u32(instance_count);
        Ok(())
    }

    pub fn set_renderable_visibility(
        &mut self,
        renderable: RenderableHandle,
        visible: bool,
    ) -> Result<()> {
        let id = self.id();
        self.state.renderables.try_get_mut(id, renderable)?.visible = visible;
        self.actions
            .begin_action(SceneActionId::SetRenderableVisibility);
        self.actions.write_u32(renderable.index());
        self.actions.write_bool(visible);
        Ok(())
    }

    // ========================================================================
    // Data layouts and instances
    // ========================================================================

    pub fn allocate_data_layout(
        &mut self,
        fields: Vec<DataFieldInfo>,
        effect_hash: ResourceContentHash,
    ) -> DataLayoutHandle {
        if effect_hash.is_valid() {
            self.ref_resource(effect_hash);
        }
        let handle = self.state.data_layouts.allocate(DataLayout {
            fields: fields.clone(),
            effect_hash,
        });
        self.actions.begin_action(SceneActionId::AllocateDataLayout);
        self.actions.write_u32(handle.index());
        self.actions.write_u64(effect_hash.hi);
        self.actions.write_u64(effect_hash.lo);
        self.actions.write_u32(fields.len() as u32);
        for field in &fields {
            self.actions.write_u32(field.data_type as u32);
            self.actions.write_u32(field.element_count);
        }
        handle
    }

    pub fn release_data_layout(&mut self, handle: DataLayoutHandle) -> Result<()> {
        let layout = self.state.data_layouts.release(self.id(), handle)?;
        if layout.effect_hash.is_valid() {
            self.unref_resource(layout.effect_hash);
        }
        self.actions.begin_action(SceneActionId::ReleaseDataLayout);
        self.actions.write_u32(handle.index());
        Ok(())
    }

    pub fn allocate_data_instance(&mut self, layout: DataLayoutHandle) -> Result<DataInstanceHandle> {
        let field_count = self.state.data_layouts.try_get(self.id(), layout)?.fields.len();
        let handle = self
            .state
            .data_instances
            .allocate(DataInstance::new(layout, field_count));
        self.actions
            .begin_action(SceneActionId::AllocateDataInstance);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(layout.index());
        Ok(handle)
    }

    pub fn release_data_instance(&mut self, handle: DataInstanceHandle) -> Result<()> {
        let instance = self.state.data_instances.release(self.id(), handle)?;
        let stale: Vec<_> = instance
            .fields
            .iter()
            .filter(|f| f.resource.is_valid())
            .map(|f| f.resource)
            .collect();
        for hash in stale {
            self.unref_resource(hash);
        }
        self.actions
            .begin_action(SceneActionId::ReleaseDataInstance);
        self.actions.write_u32(handle.index());
        Ok(())
    }

    fn set_data_array(
        &mut self,
        action: SceneActionId,
        instance: DataInstanceHandle,
        field: u32,
        bytes: &[u8],
    ) -> Result<()> {
        let id = self.id();
        let data = self.state.data_instances.try_get_mut(id, instance)?;
        let slot = data.fields.get_mut(field as usize).ok_or({
            MirageError::HandleInvalid {
                kind: "data-field",
                handle: field,
                scene: id,
            }
        })?;
        slot.bytes = bytes.to_vec();
        self.actions.begin_action(action);
        self.actions.write_u32(instance.index());
        self.actions.write_u32(field);
        self.actions.write_blob(bytes);
        Ok(())
    }

    pub fn set_data_float_array(
        &mut self,
        instance: DataInstanceHandle,
        field: u32,
        values: &[f32],
    ) -> Result<()> {
        self.set_data_array(
            SceneActionId::SetDataFloatArray,
            instance,
            field,
            bytemuck::cast_slice(values),
        )
    }

    pub fn set_data_vector2f_array(
        &mut self,
        instance: DataInstanceHandle,
        field: u32,
        values: &[[f32; 2]],
    ) -> Result<()> {
        self.set_data_array(
            SceneActionId::SetDataVector2fArray,
            instance,
            field,
            bytemuck::cast_slice(values),
        )
    }

    pub fn set_data_vector3f_array(
        &mut self,
        instance: DataInstanceHandle,
        field: u32,
        values: &[[f32; 3]],
    ) -> Result<()> {
        self.set_data_array(
            SceneActionId::SetDataVector3fArray,
            instance,
            field,
            bytemuck::cast_slice(values),
        )
    }

    pub fn set_data_vector4f_array(
        &mut self,
        instance: DataInstanceHandle,
        field: u32,
        values: &[[f32; 4]],
    ) -> Result<()> {
        self.set_data_array(
            SceneActionId::SetDataVector4fArray,
            instance,
            field,
            bytemuck::cast_slice(values),
        )
    }

    pub fn set_data_matrix44f_array(
        &mut self,
        instance: DataInstanceHandle,
        field: u32,
        values: &[[f32; 16]],
    ) -> Result<()> {
        self.set_data_array(
            SceneActionId::SetDataMatrix44fArray,
            instance,
            field,
            bytemuck::cast_slice(values),
        )
    }

    pub fn set_data_int32_array(
        &mut self,
        instance: DataInstanceHandle,
        field: u32,
        values: &[i32],
    ) -> Result<()> {
        self.set_data_array(
            SceneActionId::SetDataInt32Array,
            instance,
            field,
            bytemuck::cast_slice(values),
        )
    }

    /// Points a field at a client resource (index/vertex array data).
    pub fn set_data_resource(
        &mut self,
        instance: DataInstanceHandle,
        field: u32,
        hash: ResourceContentHash,
    ) -> Result<()> {
        let id = self.id();
        let data = self.state.data_instances.try_get_mut(id, instance)?;
        let slot = data.fields.get_mut(field as usize).ok_or({
            MirageError::HandleInvalid {
                kind: "data-field",
                handle: field,
                scene: id,
            }
        })?;
        let previous = slot.resource;
        slot.resource = hash;
        if hash.is_valid() {
            self.ref_resource(hash);
        }
        if previous.is_valid() {
            self.unref_resource(previous);
        }
        self.actions.begin_action(SceneActionId::SetDataResource);
        self.actions.write_u32(instance.index());
        self.actions.write_u32(field);
        self.actions.write_u64(hash.hi);
        self.actions.write_u64(hash.lo);
        Ok(())
    }

    pub fn set_data_texture_sampler(
        &mut self,
        instance: DataInstanceHandle,
        field: u32,
        sampler: TextureSamplerHandle,
    ) -> Result<()> {
        let id = self.id();
        self.state.texture_samplers.try_get(id, sampler)?;
        let data = self.state.data_instances.try_get_mut(id, instance)?;
        let slot = data.fields.get_mut(field as usize).ok_or({
            MirageError::HandleInvalid {
                kind: "data-field",
                handle: field,
                scene: id,
            }
        })?;
        slot.sampler = sampler;
        self.actions
            .begin_action(SceneActionId::SetDataTextureSampler);
        self.actions.write_u32(instance.index());
        self.actions.write_u32(field);
        self.actions.write_u32(sampler.index());
        Ok(())
    }

    // ========================================================================
    // Texture samplers
    // ========================================================================

    pub fn allocate_texture_sampler(
        &mut self,
        states: TextureSamplerStates,
        content: TextureSamplerContent,
    ) -> Result<TextureSamplerHandle> {
        let id = self.id();
        match content {
            TextureSamplerContent::ClientTexture(hash) => {
                if hash.is_valid() {
                    self.ref_resource(hash);
                }
            }
            TextureSamplerContent::RenderBuffer(buffer) => {
                self.state.render_buffers.try_get(id, buffer)?;
            }
            TextureSamplerContent::TextureBuffer(buffer) => {
                self.state.texture_buffers.try_get(id, buffer)?;
            }
            TextureSamplerContent::StreamTexture(stream) => {
                self.state.stream_textures.try_get(id, stream)?;
            }
        }
        let handle = self
            .state
            .texture_samplers
            .allocate(TextureSampler { states, content });
        self.actions
            .begin_action(SceneActionId::AllocateTextureSampler);
        self.actions.write_u32(handle.index());
        self.actions.write_u8(states.min_filter as u8);
        self.actions.write_u8(states.mag_filter as u8);
        self.actions.write_u8(states.wrap_u as u8);
        self.actions.write_u8(states.wrap_v as u8);
        self.actions.write_u8(states.wrap_w as u8);
        self.actions.write_u32(states.anisotropy);
        match content {
            TextureSamplerContent::ClientTexture(hash) => {
                self.actions.write_u8(0);
                self.actions.write_u64(hash.hi);
                self.actions.write_u64(hash.lo);
            }
            TextureSamplerContent::RenderBuffer(buffer) => {
                self.actions.write_u8(1);
                self.actions.write_u32(buffer.index());
            }
            TextureSamplerContent::TextureBuffer(buffer) => {
                self.actions.write_u8(2);
                self.actions.write_u32(buffer.index());
            }
            TextureSamplerContent::StreamTexture(stream) => {
                self.actions.write_u8(3);
                self.actions.write_u32(stream.index());
            }
        }
        Ok(handle)
    }

    pub fn release_texture_sampler(&mut self, handle: TextureSamplerHandle) -> Result<()> {
        let sampler = self.state.texture_samplers.release(self.id(), handle)?;
        if let TextureSamplerContent::ClientTexture(hash) = sampler.content {
            if hash.is_valid() {
                self.unref_resource(hash);
            }
        }
        self.actions
            .begin_action(SceneActionId::ReleaseTextureSampler);
        self.actions.write_u32(handle.index());
        Ok(())
    }

    // ========================================================================
    // Scene-owned GPU objects
    // ========================================================================

    pub fn allocate_render_buffer(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        sample_count: u32,
    ) -> RenderBufferHandle {
        let handle = self.state.render_buffers.allocate(RenderBuffer {
            width,
            height,
            format,
            sample_count,
        });
        self.actions
            .begin_action(SceneActionId::AllocateRenderBuffer);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(width);
        self.actions.write_u32(height);
        self.actions.write_u32(format as u32);
        self.actions.write_u32(sample_count);
        self.record_scene_resource(SceneResourceActionKind::CreateRenderBuffer, handle.index());
        handle
    }

    pub fn release_render_buffer(&mut self, handle: RenderBufferHandle) -> Result<()> {
        self.state.render_buffers.release(self.id(), handle)?;
        self.actions
            .begin_action(SceneActionId::ReleaseRenderBuffer);
        self.actions.write_u32(handle.index());
        self.record_scene_resource(SceneResourceActionKind::DestroyRenderBuffer, handle.index());
        Ok(())
    }

    pub fn allocate_render_target(
        &mut self,
        buffers: Vec<RenderBufferHandle>,
    ) -> Result<RenderTargetHandle> {
        let id = self.id();
        for &buffer in &buffers {
            self.state.render_buffers.try_get(id, buffer)?;
        }
        let handle = self.state.render_targets.allocate(RenderTarget {
            buffers: buffers.clone(),
        });
        self.actions
            .begin_action(SceneActionId::AllocateRenderTarget);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(buffers.len() as u32);
        for buffer in buffers {
            self.actions.write_u32(buffer.index());
        }
        self.record_scene_resource(SceneResourceActionKind::CreateRenderTarget, handle.index());
        Ok(handle)
    }

    pub fn release_render_target(&mut self, handle: RenderTargetHandle) -> Result<()> {
        self.state.render_targets.release(self.id(), handle)?;
        self.actions
            .begin_action(SceneActionId::ReleaseRenderTarget);
        self.actions.write_u32(handle.index());
        self.record_scene_resource(SceneResourceActionKind::DestroyRenderTarget, handle.index());
        Ok(())
    }

    pub fn allocate_blit_pass(
        &mut self,
        source: RenderBufferHandle,
        destination: RenderBufferHandle,
        source_rect: [u32; 4],
        destination_rect: [u32; 4],
    ) -> Result<BlitPassHandle> {
        let id = self.id();
        self.state.render_buffers.try_get(id, source)?;
        self.state.render_buffers.try_get(id, destination)?;
        let handle = self.state.blit_passes.allocate(BlitPass {
            source,
            destination,
            source_rect,
            destination_rect,
            enabled: true,
        });
        self.actions.begin_action(SceneActionId::AllocateBlitPass);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(source.index());
        self.actions.write_u32(destination.index());
        for value in source_rect.iter().chain(destination_rect.iter()) {
            self.actions.write_u32(*value);
        }
        self.record_scene_resource(SceneResourceActionKind::CreateBlitPass, handle.index());
        Ok(handle)
    }

    pub fn release_blit_pass(&mut self, handle: BlitPassHandle) -> Result<()> {
        self.state.blit_passes.release(self.id(), handle)?;
        self.actions.begin_action(SceneActionId::ReleaseBlitPass);
        self.actions.write_u32(handle.index());
        self.record_scene_resource(SceneResourceActionKind::DestroyBlitPass, handle.index());
        Ok(())
    }

    pub fn set_blit_pass_enabled(&mut self, handle: BlitPassHandle, enabled: bool) -> Result<()> {
        let id = self.id();
        self.state.blit_passes.try_get_mut(id, handle)?.enabled = enabled;
        self.actions
            .begin_action(SceneActionId::SetBlitPassEnabled);
        self.actions.write_u32(handle.index());
        self.actions.write_bool(enabled);
        Ok(())
    }

    pub fn allocate_data_buffer(
        &mut self,
        kind: DataBufferKind,
        data_type: DataType,
        max_size: u32,
    ) -> DataBufferHandle {
        let handle = self.state.data_buffers.allocate(DataBuffer {
            kind,
            data_type,
            data: vec![0; max_size as usize],
            used_size: 0,
        });
        self.actions.begin_action(SceneActionId::AllocateDataBuffer);
        self.actions.write_u32(handle.index());
        self.actions.write_u8(kind as u8);
        self.actions.write_u32(data_type as u32);
        self.actions.write_u32(max_size);
        self.record_scene_resource(SceneResourceActionKind::CreateDataBuffer, handle.index());
        handle
    }

    pub fn release_data_buffer(&mut self, handle: DataBufferHandle) -> Result<()> {
        self.state.data_buffers.release(self.id(), handle)?;
        self.actions.begin_action(SceneActionId::ReleaseDataBuffer);
        self.actions.write_u32(handle.index());
        self.record_scene_resource(SceneResourceActionKind::DestroyDataBuffer, handle.index());
        Ok(())
    }

    pub fn update_data_buffer(
        &mut self,
        handle: DataBufferHandle,
        offset: u32,
        bytes: &[u8],
    ) -> Result<()> {
        let id = self.id();
        let buffer = self.state.data_buffers.try_get_mut(id, handle)?;
        let end = offset as usize + bytes.len();
        if end > buffer.data.len() {
            return Err(MirageError::InvalidEncoding(format!(
                "data buffer update of {} bytes at {offset} exceeds capacity {}",
                bytes.len(),
                buffer.data.len()
            )));
        }
        buffer.data[offset as usize..end].copy_from_slice(bytes);
        buffer.used_size = buffer.used_size.max(end as u32);
        self.actions.begin_action(SceneActionId::UpdateDataBuffer);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(offset);
        self.actions.write_blob(bytes);
        self.record_scene_resource(SceneResourceActionKind::UpdateDataBuffer, handle.index());
        Ok(())
    }

    pub fn allocate_texture_buffer(
        &mut self,
        format: PixelFormat,
        mip_dimensions: &[(u32, u32)],
    ) -> Result<TextureBufferHandle> {
        if !mip_dimensions_valid(mip_dimensions) {
            return Err(MirageError::InvalidEncoding(
                "texture buffer mip chain dimensions are not a halving chain".into(),
            ));
        }
        let texel = format.texel_size().ok_or_else(|| {
            MirageError::InvalidEncoding(format!(
                "texture buffers require an uncompressed format, got {format:?}"
            ))
        })?;
        let mips = mip_dimensions
            .iter()
            .map(|&(width, height)| TextureBufferMip {
                width,
                height,
                data: vec![0; (width * height * texel) as usize],
            })
            .collect();
        let handle = self
            .state
            .texture_buffers
            .allocate(TextureBuffer { format, mips });
        self.actions
            .begin_action(SceneActionId::AllocateTextureBuffer);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(format as u32);
        self.actions.write_u32(mip_dimensions.len() as u32);
        for &(width, height) in mip_dimensions {
            self.actions.write_u32(width);
            self.actions.write_u32(height);
        }
        self.record_scene_resource(SceneResourceActionKind::CreateTextureBuffer, handle.index());
        Ok(handle)
    }

    pub fn release_texture_buffer(&mut self, handle: TextureBufferHandle) -> Result<()> {
        self.state.texture_buffers.release(self.id(), handle)?;
        self.actions
            .begin_action(SceneActionId::ReleaseTextureBuffer);
        self.actions.write_u32(handle.index());
        self.record_scene_resource(SceneResourceActionKind::DestroyTextureBuffer, handle.index());
        Ok(())
    }

    pub fn update_texture_buffer(
        &mut self,
        handle: TextureBufferHandle,
        mip: u32,
        region: [u32; 4],
        bytes: &[u8],
    ) -> Result<()> {
        let id = self.id();
        let buffer = self.state.texture_buffers.try_get_mut(id, handle)?;
        apply_texture_buffer_update(buffer, mip, region, bytes)?;
        self.actions
            .begin_action(SceneActionId::UpdateTextureBuffer);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(mip);
        for value in region {
            self.actions.write_u32(value);
        }
        self.actions.write_blob(bytes);
        self.record_scene_resource(SceneResourceActionKind::UpdateTextureBuffer, handle.index());
        Ok(())
    }

    pub fn allocate_stream_texture(
        &mut self,
        source_id: WaylandIviSurfaceId,
        fallback: ResourceContentHash,
    ) -> StreamTextureHandle {
        if fallback.is_valid() {
            self.ref_resource(fallback);
        }
        let handle = self.state.stream_textures.allocate(StreamTexture {
            source_id,
            fallback,
            force_fallback: false,
        });
        self.actions
            .begin_action(SceneActionId::AllocateStreamTexture);
        self.actions.write_u32(handle.index());
        self.actions.write_u32(source_id.0);
        self.actions.write_u64(fallback.hi);
        self.actions.write_u64(fallback.lo);
        self.record_scene_resource(SceneResourceActionKind::CreateStreamTexture, handle.index());
        handle
    }

    pub fn release_stream_texture(&mut self, handle: StreamTextureHandle) -> Result<()> {
        let stream = self.state.stream_textures.release(self.id(), handle)?;
        if stream.fallback.is_valid() {
            self.unref_resource(stream.fallback);
        }
        self.actions
            .begin_action(SceneActionId::ReleaseStreamTexture);
        self.actions.write_u32(handle.index());
        self.record_scene_resource(SceneResourceActionKind::DestroyStreamTexture, handle.index());
        Ok(())
    }

    pub fn set_stream_texture_force_fallback(
        &mut self,
        handle: StreamTextureHandle,
        force: bool,
    ) -> Result<()> {
        let id = self.id();
        self.state
            .stream_textures
            .try_get_mut(id, handle)?
            .force_fallback = force;
        self.actions
            .begin_action(SceneActionId::SetStreamTextureForceFallback);
        self.actions.write_u32(handle.index());
        self.actions.write_bool(force);
        Ok(())
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Seals the current epoch: appends the terminating flush record and
    /// returns the log plus resource changes, starting a fresh epoch.
    pub fn flush(
        &mut self,
        version_tag: SceneVersionTag,
        time_info: FlushTimeInfo,
    ) -> Result<SceneUpdate> {
        if self.actions.number_of_actions() > 0
            && self.actions.back().action_id() == SceneActionId::Incomplete
        {
            return Err(MirageError::InvalidEncoding(
                "cannot flush a log ending in an incomplete action".into(),
            ));
        }

        self.actions.begin_action(SceneActionId::SceneFlush);
        self.actions.write_u64(version_tag.0);
        self.actions.write_i64(time_info.flush_ts);
        self.actions.write_i64(time_info.expiration_ts);
        self.changes.put_to_action(&mut self.actions);

        let actions = std::mem::take(&mut self.actions);
        let resource_changes = std::mem::take(&mut self.changes);
        Ok(SceneUpdate {
            scene_id: self.id(),
            version_tag,
            time_info,
            actions,
            resource_changes,
        })
    }

    // ========================================================================
    // Resource reference bookkeeping
    // ========================================================================

    fn ref_resource(&mut self, hash: ResourceContentHash) {
        let count = self.resource_refs.entry(hash).or_insert(0);
        *count += 1;
        if *count == 1 {
            // re-referenced within the same epoch cancels the removal
            if let Some(pos) = self.changes.removed.iter().position(|&h| h == hash) {
                self.changes.removed.swap_remove(pos);
            } else {
                self.changes.added.push(hash);
            }
        }
    }

    fn unref_resource(&mut self, hash: ResourceContentHash) {
        let Some(count) = self.resource_refs.get_mut(&hash) else {
            log::warn!("dereferencing untracked resource {hash}");
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.resource_refs.remove(&hash);
            if let Some(pos) = self.changes.added.iter().position(|&h| h == hash) {
                self.changes.added.swap_remove(pos);
            } else {
                self.changes.removed.push(hash);
            }
        }
    }

    fn record_scene_resource(&mut self, kind: SceneResourceActionKind, handle: u32) {
        self.changes
            .scene_resource_actions
            .push(SceneResourceAction::new(kind, handle));
    }
}

fn write_vec3(actions: &mut SceneActionCollection, value: Vec3) {
    actions.write_f32(value.x);
    actions.write_f32(value.y);
    actions.write_f32(value.z);
}

/// Bounds-checks and applies a texture buffer region update. Shared by the
/// client mutator and the renderer-side dispatcher.
pub(crate) fn apply_texture_buffer_update(
    buffer: &mut TextureBuffer,
    mip: u32,
    region: [u32; 4],
    bytes: &[u8],
) -> Result<()> {
    let texel = buffer
        .format
        .texel_size()
        .expect("texture buffers only carry uncompressed formats");
    let mip_data = buffer.mips.get_mut(mip as usize).ok_or_else(|| {
        MirageError::InvalidEncoding(format!("texture buffer has no mip {mip}"))
    })?;
    let [x, y, width, height] = region;
    if x + width > mip_data.width || y + height > mip_data.height {
        return Err(MirageError::InvalidEncoding(format!(
            "texture buffer update {width}x{height} at {x},{y} exceeds mip of {}x{}",
            mip_data.width, mip_data.height
        )));
    }
    if bytes.len() != (width * height * texel) as usize {
        return Err(MirageError::InvalidEncoding(format!(
            "texture buffer update carries {} bytes for a {width}x{height} region",
            bytes.len()
        )));
    }
    let row_bytes = (width * texel) as usize;
    for row in 0..height {
        let src = &bytes[(row * width * texel) as usize..][..row_bytes];
        let dst_offset = (((y + row) * mip_data.width + x) * texel) as usize;
        mip_data.data[dst_offset..dst_offset + row_bytes].copy_from_slice(src);
    }
    Ok(())
}
