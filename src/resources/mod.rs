//! Content-addressed binary resources: identity hashing, per-kind metadata,
//! optional LZ4 compression and the on-disk resource file format.

mod effect;
mod file;
mod formats;
mod hash;
mod resource;
mod texture;

pub use effect::{EFFECT_OFFSET_COUNT, EffectInput, EffectMetadata, EffectOffset};
pub use file::{RESOURCE_FILE_MAGIC, RESOURCE_FILE_VERSION, read_resource_file, write_resource_file};
pub use formats::{DRAW_MODE_NONE, DataType, DrawMode, FixedSemantics, PixelFormat, TextureChannel};
pub use hash::ResourceContentHash;
pub use resource::{ArrayMetadata, CompressionLevel, Resource, ResourceKind, ResourceMetadata};
pub use texture::{TextureKind, TextureMetadata, default_swizzle, mip_extent};
