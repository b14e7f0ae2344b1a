//! Component data stored in the scene handle tables.

use glam::{Quat, Vec3};

use crate::errors::{MirageError, Result};
use crate::resources::{DataType, PixelFormat, ResourceContentHash};
use crate::scene::handles::{
    DataInstanceHandle, DataLayoutHandle, NodeHandle, RenderBufferHandle, StreamTextureHandle,
    TextureBufferHandle, TextureSamplerHandle,
};
use crate::scene::ids::WaylandIviSurfaceId;

/// A node of the transformation hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub parent: NodeHandle,
    pub children: Vec<NodeHandle>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scaling: Vec3,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            parent: NodeHandle::default(),
            children: Vec::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scaling: Vec3::ONE,
        }
    }
}

/// Which of a renderable's two data instances an action targets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderableDataSlot {
    Geometry = 0,
    Uniforms,
}

impl RenderableDataSlot {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RenderableDataSlot::Geometry),
            1 => Ok(RenderableDataSlot::Uniforms),
            other => Err(MirageError::InvalidEncoding(format!(
                "unknown renderable data slot {other}"
            ))),
        }
    }
}

/// Drawable leaf binding geometry and appearance data.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub node: NodeHandle,
    pub geometry_instance: DataInstanceHandle,
    pub uniform_instance: DataInstanceHandle,
    pub start_index: u32,
    pub index_count: u32,
    pub instance_count: u32,
    pub visible: bool,
}

impl Renderable {
    #[must_use]
    pub fn new(node: NodeHandle) -> Self {
        Self {
            node,
            geometry_instance: DataInstanceHandle::default(),
            uniform_instance: DataInstanceHandle::default(),
            start_index: 0,
            index_count: 0,
            instance_count: 1,
            visible: true,
        }
    }
}

/// One field of a data layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFieldInfo {
    pub data_type: DataType,
    pub element_count: u32,
}

/// Field layout shared by data instances, tied to the effect it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataLayout {
    pub fields: Vec<DataFieldInfo>,
    pub effect_hash: ResourceContentHash,
}

/// Storage of one data-instance field. Scalar arrays live in `bytes`;
/// resource and sampler fields use the dedicated slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataField {
    pub bytes: Vec<u8>,
    pub resource: ResourceContentHash,
    pub sampler: TextureSamplerHandle,
}

/// Concrete values for the fields of a data layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataInstance {
    pub layout: DataLayoutHandle,
    pub fields: Vec<DataField>,
}

impl DataInstance {
    #[must_use]
    pub fn new(layout: DataLayoutHandle, field_count: usize) -> Self {
        Self {
            layout,
            fields: vec![DataField::default(); field_count],
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerFilter {
    Nearest = 0,
    #[default]
    Linear,
    Trilinear,
}

impl SamplerFilter {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SamplerFilter::Nearest),
            1 => Ok(SamplerFilter::Linear),
            2 => Ok(SamplerFilter::Trilinear),
            other => Err(MirageError::InvalidEncoding(format!(
                "unknown sampler filter {other}"
            ))),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Clamp = 0,
    Repeat,
    Mirror,
}

impl WrapMode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WrapMode::Clamp),
            1 => Ok(WrapMode::Repeat),
            2 => Ok(WrapMode::Mirror),
            other => Err(MirageError::InvalidEncoding(format!(
                "unknown wrap mode {other}"
            ))),
        }
    }
}

/// Filtering and addressing states of a texture sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureSamplerStates {
    pub min_filter: SamplerFilter,
    pub mag_filter: SamplerFilter,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub wrap_w: WrapMode,
    pub anisotropy: u32,
}

/// What a texture sampler samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSamplerContent {
    ClientTexture(ResourceContentHash),
    RenderBuffer(RenderBufferHandle),
    TextureBuffer(TextureBufferHandle),
    StreamTexture(StreamTextureHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSampler {
    pub states: TextureSamplerStates,
    pub content: TextureSamplerContent,
}

/// GPU render buffer owned by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderBuffer {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sample_count: u32,
}

/// Ordered set of render buffers renderables draw into.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderTarget {
    pub buffers: Vec<RenderBufferHandle>,
}

/// Rectangle copy between two render buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitPass {
    pub source: RenderBufferHandle,
    pub destination: RenderBufferHandle,
    /// `x, y, width, height` in source pixels.
    pub source_rect: [u32; 4],
    /// `x, y, width, height` in destination pixels.
    pub destination_rect: [u32; 4],
    pub enabled: bool,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBufferKind {
    IndexBuffer = 0,
    VertexBuffer,
}

impl DataBufferKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DataBufferKind::IndexBuffer),
            1 => Ok(DataBufferKind::VertexBuffer),
            other => Err(MirageError::InvalidEncoding(format!(
                "unknown data buffer kind {other}"
            ))),
        }
    }
}

/// Mutable index/vertex buffer owned by the scene. `data.len()` is the
/// reserved maximum; `used_size` the currently valid prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBuffer {
    pub kind: DataBufferKind,
    pub data_type: DataType,
    pub data: Vec<u8>,
    pub used_size: u32,
}

/// One mip level of a texture buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBufferMip {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Mutable texture owned by the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBuffer {
    pub format: PixelFormat,
    pub mips: Vec<TextureBufferMip>,
}

/// Texture fed by an embedded-compositor surface, with a client-resource
/// fallback while the stream is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTexture {
    pub source_id: WaylandIviSurfaceId,
    pub fallback: ResourceContentHash,
    pub force_fallback: bool,
}

/// True when `dims` forms a proper halving mip chain starting at any base.
#[must_use]
pub fn mip_dimensions_valid(dims: &[(u32, u32)]) -> bool {
    if dims.is_empty() || dims.iter().any(|&(w, h)| w == 0 || h == 0) {
        return false;
    }
    dims.windows(2).all(|pair| {
        let (w0, h0) = pair[0];
        let (w1, h1) = pair[1];
        w1 == (w0 / 2).max(1) && h1 == (h0 / 2).max(1)
    })
}
