//! Renderer-side application of a scene action stream.
//!
//! Each record is dispatched through a jump table keyed on
//! [`SceneActionId`] and mutates the renderer's mirror of the scene using
//! the same handle-table contract as the client. Any decode failure or
//! invalid handle is fatal to the batch; the caller marks the scene
//! corrupted and forces a full re-sync.

use glam::{Quat, Vec3};

use crate::errors::{MirageError, Result};
use crate::resources::{DataType, PixelFormat, ResourceContentHash};
use crate::scene::actions::{ActionReader, SceneActionCollection, SceneActionId};
use crate::scene::client::apply_texture_buffer_update;
use crate::scene::components::{
    BlitPass, DataBuffer, DataBufferKind, DataFieldInfo, DataInstance, DataLayout, Node,
    Renderable, RenderBuffer, RenderTarget, RenderableDataSlot, SamplerFilter, StreamTexture,
    TextureBuffer, TextureBufferMip, TextureSampler, TextureSamplerContent, TextureSamplerStates,
    WrapMode,
};
use crate::scene::handles::{
    BlitPassHandle, DataBufferHandle, DataInstanceHandle, DataLayoutHandle, NodeHandle,
    RenderBufferHandle, RenderTargetHandle, RenderableHandle, SceneHandle, StreamTextureHandle,
    TextureBufferHandle, TextureSamplerHandle,
};
use crate::scene::ids::{FlushTimeInfo, SceneVersionTag, WaylandIviSurfaceId};
use crate::scene::resource_changes::ResourceChanges;
use crate::scene::state::SceneState;

/// Metadata carried by the terminating flush record of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedFlush {
    pub version_tag: SceneVersionTag,
    pub time_info: FlushTimeInfo,
    pub resource_changes: ResourceChanges,
}

/// Applies every action of `collection` to `state` in order.
///
/// Returns the flush metadata when the batch ends in a `SceneFlush` record.
pub fn apply_scene_actions(
    state: &mut SceneState,
    collection: &SceneActionCollection,
) -> Result<Option<AppliedFlush>> {
    let mut flush = None;
    for mut reader in collection.iter() {
        if let Some(applied) = apply_one(state, &mut reader)? {
            flush = Some(applied);
        }
    }
    Ok(flush)
}

fn apply_one(
    state: &mut SceneState,
    reader: &mut ActionReader<'_>,
) -> Result<Option<AppliedFlush>> {
    let scene = state.id();
    match reader.action_id() {
        // ------------------------------------------------------------ nodes
        SceneActionId::AllocateNode => {
            let handle = NodeHandle(reader.read_u32()?);
            state.nodes.allocate_at(scene, handle, Node::default())?;
        }
        SceneActionId::ReleaseNode => {
            let handle = NodeHandle(reader.read_u32()?);
            state.nodes.release(scene, handle)?;
        }
        SceneActionId::AddChildToNode => {
            let parent = NodeHandle(reader.read_u32()?);
            let child = NodeHandle(reader.read_u32()?);
            state.nodes.try_get(scene, parent)?;
            state.nodes.try_get_mut(scene, child)?.parent = parent;
            state.nodes.try_get_mut(scene, parent)?.children.push(child);
        }
        SceneActionId::RemoveChildFromNode => {
            let parent = NodeHandle(reader.read_u32()?);
            let child = NodeHandle(reader.read_u32()?);
            state
                .nodes
                .try_get_mut(scene, parent)?
                .children
                .retain(|&c| c != child);
            state.nodes.try_get_mut(scene, child)?.parent = NodeHandle::invalid();
        }
        SceneActionId::SetTranslation => {
            let handle = NodeHandle(reader.read_u32()?);
            let value = read_vec3(reader)?;
            state.nodes.try_get_mut(scene, handle)?.translation = value;
        }
        SceneActionId::SetRotation => {
            let handle = NodeHandle(reader.read_u32()?);
            let value = Quat::from_xyzw(
                reader.read_f32()?,
                reader.read_f32()?,
                reader.read_f32()?,
                reader.read_f32()?,
            );
            state.nodes.try_get_mut(scene, handle)?.rotation = value;
        }
        SceneActionId::SetScaling => {
            let handle = NodeHandle(reader.read_u32()?);
            let value = read_vec3(reader)?;
            state.nodes.try_get_mut(scene, handle)?.scaling = value;
        }

        // ------------------------------------------------------ renderables
        SceneActionId::AllocateRenderable => {
            let handle = RenderableHandle(reader.read_u32()?);
            let node = NodeHandle(reader.read_u32()?);
            state.nodes.try_get(scene, node)?;
            state
                .renderables
                .allocate_at(scene, handle, Renderable::new(node))?;
        }
        SceneActionId::ReleaseRenderable => {
            let handle = RenderableHandle(reader.read_u32()?);
            state.renderables.release(scene, handle)?;
        }
        SceneActionId::SetRenderableDataInstance => {
            let handle = RenderableHandle(reader.read_u32()?);
            let slot = RenderableDataSlot::from_u8(reader.read_u8()?)?;
            let instance = DataInstanceHandle(reader.read_u32()?);
            state.data_instances.try_get(scene, instance)?;
            let renderable = state.renderables.try_get_mut(scene, handle)?;
            match slot {
                RenderableDataSlot::Geometry => renderable.geometry_instance = instance,
                RenderableDataSlot::Uniforms => renderable.uniform_instance = instance,
            }
        }
        SceneActionId::SetRenderableStartIndex => {
            let handle = RenderableHandle(reader.read_u32()?);
            let value = reader.read_u32()?;
            state.renderables.try_get_mut(scene, handle)?.start_index = value;
        }
        SceneActionId::SetRenderableIndexCount => {
            let handle = RenderableHandle(reader.read_u32()?);
            let value = reader.read_u32()?;
            state.renderables.try_get_mut(scene, handle)?.index_count = value;
        }
        SceneActionId::SetRenderableInstanceCount => {
            let handle = RenderableHandle(reader.read_u32()?);
            let value = reader.read_u32()?;
            state.renderables.try_get_mut(scene, handle)?.instance_count = value;
        }
        SceneActionId::SetRenderableVisibility => {
            let handle = RenderableHandle(reader.read_u32()?);
            let value = reader.read_bool()?;
            state.renderables.try_get_mut(scene, handle)?.visible = value;
        }

        // ------------------------------------------- layouts and instances
        SceneActionId::AllocateDataLayout => {
            let handle = DataLayoutHandle(reader.read_u32()?);
            let effect_hash = read_hash(reader)?;
            let field_count = reader.read_u32()?;
            let mut fields = Vec::with_capacity(field_count.min(1024) as usize);
            for _ in 0..field_count {
                fields.push(DataFieldInfo {
                    data_type: DataType::from_u32(reader.read_u32()?)?,
                    element_count: reader.read_u32()?,
                });
            }
            state.data_layouts.allocate_at(
                scene,
                handle,
                DataLayout {
                    fields,
                    effect_hash,
                },
            )?;
        }
        SceneActionId::ReleaseDataLayout => {
            let handle = DataLayoutHandle(reader.read_u32()?);
            state.data_layouts.release(scene, handle)?;
        }
        SceneActionId::AllocateDataInstance => {
            let handle = DataInstanceHandle(reader.read_u32()?);
            let layout = DataLayoutHandle(reader.read_u32()?);
            let field_count = state.data_layouts.try_get(scene, layout)?.fields.len();
            state
                .data_instances
                .allocate_at(scene, handle, DataInstance::new(layout, field_count))?;
        }
        SceneActionId::ReleaseDataInstance => {
            let handle = DataInstanceHandle(reader.read_u32()?);
            state.data_instances.release(scene, handle)?;
        }
        SceneActionId::SetDataFloatArray
        | SceneActionId::SetDataVector2fArray
        | SceneActionId::SetDataVector3fArray
        | SceneActionId::SetDataVector4fArray
        | SceneActionId::SetDataMatrix44fArray
        | SceneActionId::SetDataInt32Array => {
            let handle = DataInstanceHandle(reader.read_u32()?);
            let field = reader.read_u32()?;
            let bytes = reader.read_blob()?;
            let instance = state.data_instances.try_get_mut(scene, handle)?;
            let slot = instance
                .fields
                .get_mut(field as usize)
                .ok_or(MirageError::HandleInvalid {
                    kind: "data-field",
                    handle: field,
                    scene,
                })?;
            slot.bytes = bytes.to_vec();
        }
        SceneActionId::SetDataResource => {
            let handle = DataInstanceHandle(reader.read_u32()?);
            let field = reader.read_u32()?;
            let hash = read_hash(reader)?;
            let instance = state.data_instances.try_get_mut(scene, handle)?;
            let slot = instance
                .fields
                .get_mut(field as usize)
                .ok_or(MirageError::HandleInvalid {
                    kind: "data-field",
                    handle: field,
                    scene,
                })?;
            slot.resource = hash;
        }
        SceneActionId::SetDataTextureSampler => {
            let handle = DataInstanceHandle(reader.read_u32()?);
            let field = reader.read_u32()?;
            let sampler = TextureSamplerHandle(reader.read_u32()?);
            state.texture_samplers.try_get(scene, sampler)?;
            let instance = state.data_instances.try_get_mut(scene, handle)?;
            let slot = instance
                .fields
                .get_mut(field as usize)
                .ok_or(MirageError::HandleInvalid {
                    kind: "data-field",
                    handle: field,
                    scene,
                })?;
            slot.sampler = sampler;
        }

        // ------------------------------------------------ texture samplers
        SceneActionId::AllocateTextureSampler => {
            let handle = TextureSamplerHandle(reader.read_u32()?);
            let states = TextureSamplerStates {
                min_filter: SamplerFilter::from_u8(reader.read_u8()?)?,
                mag_filter: SamplerFilter::from_u8(reader.read_u8()?)?,
                wrap_u: WrapMode::from_u8(reader.read_u8()?)?,
                wrap_v: WrapMode::from_u8(reader.read_u8()?)?,
                wrap_w: WrapMode::from_u8(reader.read_u8()?)?,
                anisotropy: reader.read_u32()?,
            };
            let content = match reader.read_u8()? {
                0 => TextureSamplerContent::ClientTexture(read_hash(reader)?),
                1 => TextureSamplerContent::RenderBuffer(RenderBufferHandle(reader.read_u32()?)),
                2 => TextureSamplerContent::TextureBuffer(TextureBufferHandle(reader.read_u32()?)),
                3 => TextureSamplerContent::StreamTexture(StreamTextureHandle(reader.read_u32()?)),
                other => {
                    return Err(MirageError::InvalidEncoding(format!(
                        "unknown texture sampler content tag {other}"
                    )));
                }
            };
            match content {
                TextureSamplerContent::RenderBuffer(buffer) => {
                    state.render_buffers.try_get(scene, buffer)?;
                }
                TextureSamplerContent::TextureBuffer(buffer) => {
                    state.texture_buffers.try_get(scene, buffer)?;
                }
                TextureSamplerContent::StreamTexture(stream) => {
                    state.stream_textures.try_get(scene, stream)?;
                }
                TextureSamplerContent::ClientTexture(_) => {}
            }
            state
                .texture_samplers
                .allocate_at(scene, handle, TextureSampler { states, content })?;
        }
        SceneActionId::ReleaseTextureSampler => {
            let handle = TextureSamplerHandle(reader.read_u32()?);
            state.texture_samplers.release(scene, handle)?;
        }

        // ------------------------------------------- scene-owned GPU objects
        SceneActionId::AllocateRenderBuffer => {
            let handle = RenderBufferHandle(reader.read_u32()?);
            let width = reader.read_u32()?;
            let height = reader.read_u32()?;
            let format = PixelFormat::from_u32(reader.read_u32()?)?;
            let sample_count = reader.read_u32()?;
            state.render_buffers.allocate_at(
                scene,
                handle,
                RenderBuffer {
                    width,
                    height,
                    format,
                    sample_count,
                },
            )?;
        }
        SceneActionId::ReleaseRenderBuffer => {
            let handle = RenderBufferHandle(reader.read_u32()?);
            state.render_buffers.release(scene, handle)?;
        }
        SceneActionId::AllocateRenderTarget => {
            let handle = RenderTargetHandle(reader.read_u32()?);
            let count = reader.read_u32()?;
            let mut buffers = Vec::with_capacity(count.min(16) as usize);
            for _ in 0..count {
                let buffer = RenderBufferHandle(reader.read_u32()?);
                state.render_buffers.try_get(scene, buffer)?;
                buffers.push(buffer);
            }
            state
                .render_targets
                .allocate_at(scene, handle, RenderTarget { buffers })?;
        }
        SceneActionId::ReleaseRenderTarget => {
            let handle = RenderTargetHandle(reader.read_u32()?);
            state.render_targets.release(scene, handle)?;
        }
        SceneActionId::AllocateBlitPass => {
            let handle = BlitPassHandle(reader.read_u32()?);
            let source = RenderBufferHandle(reader.read_u32()?);
            let destination = RenderBufferHandle(reader.read_u32()?);
            let mut rects = [0_u32; 8];
            for value in &mut rects {
                *value = reader.read_u32()?;
            }
            state.render_buffers.try_get(scene, source)?;
            state.render_buffers.try_get(scene, destination)?;
            state.blit_passes.allocate_at(
                scene,
                handle,
                BlitPass {
                    source,
                    destination,
                    source_rect: [rects[0], rects[1], rects[2], rects[3]],
                    destination_rect: [rects[4], rects[5], rects[6], rects[7]],
                    enabled: true,
                },
            )?;
        }
        SceneActionId::ReleaseBlitPass => {
            let handle = BlitPassHandle(reader.read_u32()?);
            state.blit_passes.release(scene, handle)?;
        }
        SceneActionId::SetBlitPassEnabled => {
            let handle = BlitPassHandle(reader.read_u32()?);
            let enabled = reader.read_bool()?;
            state.blit_passes.try_get_mut(scene, handle)?.enabled = enabled;
        }
        SceneActionId::AllocateDataBuffer => {
            let handle = DataBufferHandle(reader.read_u32()?);
            let kind = DataBufferKind::from_u8(reader.read_u8()?)?;
            let data_type = DataType::from_u32(reader.read_u32()?)?;
            let max_size = reader.read_u32()?;
            state.data_buffers.allocate_at(
                scene,
                handle,
                DataBuffer {
                    kind,
                    data_type,
                    data: vec![0; max_size as usize],
                    used_size: 0,
                },
            )?;
        }
        SceneActionId::ReleaseDataBuffer => {
            let handle = DataBufferHandle(reader.read_u32()?);
            state.data_buffers.release(scene, handle)?;
        }
        SceneActionId::UpdateDataBuffer => {
            let handle = DataBufferHandle(reader.read_u32()?);
            let offset = reader.read_u32()?;
            let bytes = reader.read_blob()?;
            let buffer = state.data_buffers.try_get_mut(scene, handle)?;
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
        }
        SceneActionId::AllocateTextureBuffer => {
            let handle = TextureBufferHandle(reader.read_u32()?);
            let format = PixelFormat::from_u32(reader.read_u32()?)?;
            let texel = format.texel_size().ok_or_else(|| {
                MirageError::InvalidEncoding(format!(
                    "texture buffers require an uncompressed format, got {format:?}"
                ))
            })?;
            let mip_count = reader.read_u32()?;
            let mut mips = Vec::with_capacity(mip_count.min(16) as usize);
            for _ in 0..mip_count {
                let width = reader.read_u32()?;
                let height = reader.read_u32()?;
                mips.push(TextureBufferMip {
                    width,
                    height,
                    data: vec![0; (width * height * texel) as usize],
                });
            }
            state
                .texture_buffers
                .allocate_at(scene, handle, TextureBuffer { format, mips })?;
        }
        SceneActionId::ReleaseTextureBuffer => {
            let handle = TextureBufferHandle(reader.read_u32()?);
            state.texture_buffers.release(scene, handle)?;
        }
        SceneActionId::UpdateTextureBuffer => {
            let handle = TextureBufferHandle(reader.read_u32()?);
            let mip = reader.read_u32()?;
            let mut region = [0_u32; 4];
            for value in &mut region {
                *value = reader.read_u32()?;
            }
            let bytes = reader.read_blob()?;
            let buffer = state.texture_buffers.try_get_mut(scene, handle)?;
            apply_texture_buffer_update(buffer, mip, region, bytes)?;
        }
        SceneActionId::AllocateStreamTexture => {
            let handle = StreamTextureHandle(reader.read_u32()?);
            let source_id = WaylandIviSurfaceId(reader.read_u32()?);
            let fallback = read_hash(reader)?;
            state.stream_textures.allocate_at(
                scene,
                handle,
                StreamTexture {
                    source_id,
                    fallback,
                    force_fallback: false,
                },
            )?;
        }
        SceneActionId::ReleaseStreamTexture => {
            let handle = StreamTextureHandle(reader.read_u32()?);
            state.stream_textures.release(scene, handle)?;
        }
        SceneActionId::SetStreamTextureForceFallback => {
            let handle = StreamTextureHandle(reader.read_u32()?);
            let force = reader.read_bool()?;
            state.stream_textures.try_get_mut(scene, handle)?.force_fallback = force;
        }

        // ------------------------------------------------------------ flush
        SceneActionId::SceneFlush => {
            let version_tag = SceneVersionTag(reader.read_u64()?);
            let time_info = FlushTimeInfo {
                flush_ts: reader.read_i64()?,
                expiration_ts: reader.read_i64()?,
            };
            let resource_changes = ResourceChanges::get_from_action(reader)?;
            return Ok(Some(AppliedFlush {
                version_tag,
                time_info,
                resource_changes,
            }));
        }

        SceneActionId::TestAction => {
            // carries arbitrary payload, ignored outside tests
        }
        SceneActionId::Incomplete => {
            return Err(MirageError::InvalidEncoding(
                "incomplete action reached the dispatcher; batch was not sealed".into(),
            ));
        }
    }
    Ok(None)
}

fn read_vec3(reader: &mut ActionReader<'_>) -> Result<Vec3> {
    Ok(Vec3::new(
        reader.read_f32()?,
        reader.read_f32()?,
        reader.read_f32()?,
    ))
}

fn read_hash(reader: &mut ActionReader<'_>) -> Result<ResourceContentHash> {
    Ok(ResourceContentHash::new(
        reader.read_u64()?,
        reader.read_u64()?,
    ))
}
