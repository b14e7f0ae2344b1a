use crate::errors::{MirageError, Result};

/// Pixel storage formats supported by texture resources.
///
/// Compressed formats carry a fixed block footprint; uncompressed formats a
/// fixed texel size. SRGB variants share the footprint of their linear
/// counterparts.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8 = 0,
    Rg8,
    Rgb8,
    Rgba8,
    R16F,
    Rg16F,
    Rgb16F,
    Rgba16F,
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
    Srgb8,
    Srgb8Alpha8,
    Depth16,
    Depth24,
    Depth32,
    Depth24Stencil8,
    Etc2Rgb,
    Etc2Rgba,
    Astc4x4,
    AstcSrgb4x4,
    Astc5x4,
    AstcSrgb5x4,
    Astc5x5,
    AstcSrgb5x5,
    Astc6x5,
    AstcSrgb6x5,
    Astc6x6,
    AstcSrgb6x6,
    Astc8x5,
    AstcSrgb8x5,
    Astc8x6,
    AstcSrgb8x6,
    Astc8x8,
    AstcSrgb8x8,
    Astc10x5,
    AstcSrgb10x5,
    Astc10x6,
    AstcSrgb10x6,
    Astc10x8,
    AstcSrgb10x8,
    Astc10x10,
    AstcSrgb10x10,
    Astc12x10,
    AstcSrgb12x10,
    Astc12x12,
    AstcSrgb12x12,
}

impl PixelFormat {
    /// Block footprint in pixels for compressed formats, `None` otherwise.
    #[must_use]
    pub fn block_size(self) -> Option<(u32, u32)> {
        use PixelFormat::{
            Astc4x4, Astc5x4, Astc5x5, Astc6x5, Astc6x6, Astc8x5, Astc8x6, Astc8x8, Astc10x5,
            Astc10x6, Astc10x8, Astc10x10, Astc12x10, Astc12x12, AstcSrgb4x4, AstcSrgb5x4,
            AstcSrgb5x5, AstcSrgb6x5, AstcSrgb6x6, AstcSrgb8x5, AstcSrgb8x6, AstcSrgb8x8,
            AstcSrgb10x5, AstcSrgb10x6, AstcSrgb10x8, AstcSrgb10x10, AstcSrgb12x10, AstcSrgb12x12,
            Etc2Rgb, Etc2Rgba,
        };
        match self {
            Etc2Rgb | Etc2Rgba | Astc4x4 | AstcSrgb4x4 => Some((4, 4)),
            Astc5x4 | AstcSrgb5x4 => Some((5, 4)),
            Astc5x5 | AstcSrgb5x5 => Some((5, 5)),
            Astc6x5 | AstcSrgb6x5 => Some((6, 5)),
            Astc6x6 | AstcSrgb6x6 => Some((6, 6)),
            Astc8x5 | AstcSrgb8x5 => Some((8, 5)),
            Astc8x6 | AstcSrgb8x6 => Some((8, 6)),
            Astc8x8 | AstcSrgb8x8 => Some((8, 8)),
            Astc10x5 | AstcSrgb10x5 => Some((10, 5)),
            Astc10x6 | AstcSrgb10x6 => Some((10, 6)),
            Astc10x8 | AstcSrgb10x8 => Some((10, 8)),
            Astc10x10 | AstcSrgb10x10 => Some((10, 10)),
            Astc12x10 | AstcSrgb12x10 => Some((12, 10)),
            Astc12x12 | AstcSrgb12x12 => Some((12, 12)),
            _ => None,
        }
    }

    /// Bytes per texel for uncompressed formats, `None` for compressed.
    #[must_use]
    pub fn texel_size(self) -> Option<u32> {
        use PixelFormat::{
            Depth16, Depth24, Depth24Stencil8, Depth32, R8, R16F, R32F, Rg8, Rg16F, Rg32F, Rgb8,
            Rgb16F, Rgb32F, Rgba8, Rgba16F, Rgba32F, Srgb8, Srgb8Alpha8,
        };
        match self {
            R8 => Some(1),
            Rg8 | R16F | Depth16 => Some(2),
            Rgb8 | Srgb8 | Depth24 => Some(3),
            Rgba8 | Srgb8Alpha8 | Rg16F | R32F | Depth32 | Depth24Stencil8 => Some(4),
            Rgb16F => Some(6),
            Rgba16F | Rg32F => Some(8),
            Rgb32F => Some(12),
            Rgba32F => Some(16),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        self.block_size().is_some()
    }

    pub fn from_u32(value: u32) -> Result<Self> {
        if value > PixelFormat::AstcSrgb12x12 as u32 {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown pixel format {value}"
            )));
        }
        // discriminants are contiguous from 0
        Ok(unsafe { std::mem::transmute::<u32, PixelFormat>(value) })
    }
}

/// Element types of array resources and effect inputs.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt16 = 0,
    UInt32,
    Float,
    Vector2F,
    Vector3F,
    Vector4F,
    Int32,
    Vector2I,
    Vector3I,
    Vector4I,
    Matrix22F,
    Matrix33F,
    Matrix44F,
    ByteBlob,
    TextureSampler2D,
    TextureSampler3D,
    TextureSamplerCube,
}

impl DataType {
    /// Size in bytes of one element.
    #[must_use]
    pub fn element_size(self) -> u32 {
        match self {
            DataType::UInt16 => 2,
            DataType::UInt32 | DataType::Float | DataType::Int32 | DataType::ByteBlob => 4,
            DataType::Vector2F | DataType::Vector2I => 8,
            DataType::Vector3F | DataType::Vector3I => 12,
            DataType::Vector4F | DataType::Vector4I | DataType::Matrix22F => 16,
            DataType::Matrix33F => 36,
            DataType::Matrix44F => 64,
            DataType::TextureSampler2D
            | DataType::TextureSampler3D
            | DataType::TextureSamplerCube => 0,
        }
    }

    pub fn from_u32(value: u32) -> Result<Self> {
        if value > DataType::TextureSamplerCube as u32 {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown data type {value}"
            )));
        }
        Ok(unsafe { std::mem::transmute::<u32, DataType>(value) })
    }
}

/// Channel sources for texture swizzling.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureChannel {
    #[default]
    Red = 0,
    Green,
    Blue,
    Alpha,
    Zero,
    One,
}

impl TextureChannel {
    pub fn from_u8(value: u8) -> Result<Self> {
        if value > TextureChannel::One as u8 {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown texture channel {value}"
            )));
        }
        Ok(unsafe { std::mem::transmute::<u8, TextureChannel>(value) })
    }
}

/// Primitive type fed into a geometry shader.
///
/// On the wire the absent case is encoded as `u8::MAX`; the last enum value
/// must stay well below that sentinel.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Points = 0,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Sentinel byte encoding `Option::<DrawMode>::None`.
pub const DRAW_MODE_NONE: u8 = u8::MAX;

impl DrawMode {
    pub fn from_u8(value: u8) -> Result<Self> {
        if value > DrawMode::TriangleFan as u8 {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown draw mode {value}"
            )));
        }
        Ok(unsafe { std::mem::transmute::<u8, DrawMode>(value) })
    }
}

/// Engine-assigned meanings of effect inputs.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FixedSemantics {
    #[default]
    Invalid = 0,
    ModelMatrix,
    ViewMatrix,
    ProjectionMatrix,
    ModelViewMatrix,
    ModelViewProjectionMatrix,
    NormalMatrix,
    CameraWorldPosition,
    DisplayBufferResolution,
    TextTexture,
    TimeMs,
}

impl FixedSemantics {
    pub fn from_u32(value: u32) -> Result<Self> {
        if value > FixedSemantics::TimeMs as u32 {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown semantics {value}"
            )));
        }
        Ok(unsafe { std::mem::transmute::<u32, FixedSemantics>(value) })
    }
}
