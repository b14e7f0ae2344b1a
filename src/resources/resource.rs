use std::sync::Arc;

use crate::codec::{BinaryInputStream, BinaryOutputStream};
use crate::errors::{MirageError, Result};
use crate::resources::effect::{EffectMetadata, EffectOffset};
use crate::resources::formats::DataType;
use crate::resources::hash::ResourceContentHash;
use crate::resources::texture::{TextureKind, TextureMetadata};

/// Wire-level resource kind tag.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    IndexArray = 0,
    VertexArray,
    Texture2D,
    Texture3D,
    TextureCube,
    Effect,
}

impl ResourceKind {
    pub fn from_u32(value: u32) -> Result<Self> {
        if value > ResourceKind::Effect as u32 {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown resource kind {value}"
            )));
        }
        Ok(unsafe { std::mem::transmute::<u32, ResourceKind>(value) })
    }
}

/// Metadata of an index or vertex array resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayMetadata {
    pub indices: bool,
    pub element_type: DataType,
    pub element_count: u32,
}

impl ArrayMetadata {
    pub(crate) fn serialize(&self, output: &mut BinaryOutputStream) {
        output.write_u32(self.element_type as u32);
        output.write_u32(self.element_count);
    }

    pub(crate) fn deserialize(indices: bool, input: &mut BinaryInputStream<'_>) -> Result<Self> {
        let element_type = DataType::from_u32(input.read_u32()?)?;
        let element_count = input.read_u32()?;
        Ok(Self {
            indices,
            element_type,
            element_count,
        })
    }
}

/// Kind-tagged resource metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceMetadata {
    Array(ArrayMetadata),
    Texture(TextureMetadata),
    Effect(EffectMetadata),
}

impl ResourceMetadata {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceMetadata::Array(array) if array.indices => ResourceKind::IndexArray,
            ResourceMetadata::Array(_) => ResourceKind::VertexArray,
            ResourceMetadata::Texture(texture) => match texture.kind {
                TextureKind::TwoD => ResourceKind::Texture2D,
                TextureKind::ThreeD => ResourceKind::Texture3D,
                TextureKind::Cube => ResourceKind::TextureCube,
            },
            ResourceMetadata::Effect(_) => ResourceKind::Effect,
        }
    }

    /// Canonical byte sequence used for content hashing and file storage.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = BinaryOutputStream::new();
        self.serialize(&mut output);
        output.release()
    }

    pub(crate) fn serialize(&self, output: &mut BinaryOutputStream) {
        match self {
            ResourceMetadata::Array(array) => array.serialize(output),
            ResourceMetadata::Texture(texture) => texture.serialize(output),
            ResourceMetadata::Effect(effect) => effect.serialize(output),
        }
    }

    pub(crate) fn deserialize(kind: ResourceKind, input: &mut BinaryInputStream<'_>) -> Result<Self> {
        Ok(match kind {
            ResourceKind::IndexArray => {
                ResourceMetadata::Array(ArrayMetadata::deserialize(true, input)?)
            }
            ResourceKind::VertexArray => {
                ResourceMetadata::Array(ArrayMetadata::deserialize(false, input)?)
            }
            ResourceKind::Texture2D => {
                ResourceMetadata::Texture(TextureMetadata::deserialize(TextureKind::TwoD, input)?)
            }
            ResourceKind::Texture3D => {
                ResourceMetadata::Texture(TextureMetadata::deserialize(TextureKind::ThreeD, input)?)
            }
            ResourceKind::TextureCube => {
                ResourceMetadata::Texture(TextureMetadata::deserialize(TextureKind::Cube, input)?)
            }
            ResourceKind::Effect => ResourceMetadata::Effect(EffectMetadata::deserialize(input)?),
        })
    }

    fn validate(&self, name: &str, payload_len: usize) -> Result<()> {
        let invalid = |reason: String| MirageError::InvalidResource {
            name: name.to_string(),
            reason,
        };
        match self {
            ResourceMetadata::Array(array) => {
                if array.element_count == 0 {
                    return Err(invalid("array needs at least one element".into()));
                }
                let expected = array.element_count as usize * array.element_type.element_size() as usize;
                if payload_len != expected {
                    return Err(invalid(format!(
                        "array payload is {payload_len} bytes, {} {:?} elements need {expected}",
                        array.element_count, array.element_type
                    )));
                }
                Ok(())
            }
            ResourceMetadata::Texture(texture) => {
                texture.validate(name)?;
                let expected = texture.total_payload_size();
                if payload_len < expected {
                    return Err(invalid(format!(
                        "texture payload is {payload_len} bytes, mip chain declares {expected}"
                    )));
                }
                Ok(())
            }
            ResourceMetadata::Effect(effect) => {
                effect.validate(name)?;
                let end = effect.byte_offsets[EffectOffset::EndOfData as usize] as usize;
                if payload_len != end {
                    return Err(invalid(format!(
                        "effect payload is {payload_len} bytes, offsets end at {end}"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Speed/ratio tradeoff for [`Resource::compress`]. Both levels use the
/// same LZ4 block codec; `Offline` is reserved for a higher-effort encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Realtime,
    Offline,
}

#[derive(Debug, Clone)]
struct CompressedPayload {
    bytes: Arc<[u8]>,
    uncompressed_size: u32,
}

/// A content-addressed binary resource.
///
/// At least one of the uncompressed and compressed payload representations
/// is always resident; if both are, decompressing the compressed form
/// reproduces the payload byte-for-byte. The hash is frozen at creation and
/// independent of which representation is held.
#[derive(Debug, Clone)]
pub struct Resource {
    metadata: ResourceMetadata,
    hash: ResourceContentHash,
    cache_flag: u32,
    name: String,
    payload: Option<Arc<[u8]>>,
    compressed: Option<CompressedPayload>,
}

impl Resource {
    /// Creates a resource from metadata and an uncompressed payload,
    /// validating both and computing the content hash.
    pub fn create(
        metadata: ResourceMetadata,
        payload: Vec<u8>,
        cache_flag: u32,
        name: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        metadata.validate(&name, payload.len())?;
        let metadata_bytes = metadata.to_bytes();
        let hash = ResourceContentHash::from_content(&metadata_bytes, &payload);
        Ok(Self {
            metadata,
            hash,
            cache_flag,
            name,
            payload: Some(payload.into()),
            compressed: None,
        })
    }

    /// Reassembles a resource from stored parts (resource file reader).
    pub(crate) fn from_stored(
        metadata: ResourceMetadata,
        hash: ResourceContentHash,
        cache_flag: u32,
        payload: Option<Vec<u8>>,
        compressed: Option<(Vec<u8>, u32)>,
    ) -> Result<Self> {
        if payload.is_none() && compressed.is_none() {
            return Err(MirageError::InvalidResource {
                name: String::new(),
                reason: "stored resource carries neither payload representation".into(),
            });
        }
        Ok(Self {
            metadata,
            hash,
            cache_flag,
            name: String::new(),
            payload: payload.map(Into::into),
            compressed: compressed.map(|(bytes, uncompressed_size)| CompressedPayload {
                bytes: bytes.into(),
                uncompressed_size,
            }),
        })
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.metadata.kind()
    }

    #[must_use]
    pub fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn hash(&self) -> ResourceContentHash {
        self.hash
    }

    #[must_use]
    pub fn cache_flag(&self) -> u32 {
        self.cache_flag
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed payload, if resident.
    #[must_use]
    pub fn payload(&self) -> Option<&Arc<[u8]>> {
        self.payload.as_ref()
    }

    /// Compressed payload bytes, if resident.
    #[must_use]
    pub fn compressed_payload(&self) -> Option<&Arc<[u8]>> {
        self.compressed.as_ref().map(|c| &c.bytes)
    }

    /// Size of the uncompressed payload regardless of residency.
    #[must_use]
    pub fn uncompressed_size(&self) -> u32 {
        match (&self.payload, &self.compressed) {
            (Some(payload), _) => payload.len() as u32,
            (None, Some(compressed)) => compressed.uncompressed_size,
            (None, None) => unreachable!("resource without any payload representation"),
        }
    }

    /// Fills the compressed slot. Idempotent; a no-op when only the
    /// compressed representation is resident.
    pub fn compress(&mut self, _level: CompressionLevel) {
        if self.compressed.is_some() {
            return;
        }
        let Some(payload) = &self.payload else {
            return;
        };
        let bytes = lz4_flex::block::compress(payload);
        self.compressed = Some(CompressedPayload {
            bytes: bytes.into(),
            uncompressed_size: payload.len() as u32,
        });
    }

    /// Fills the uncompressed slot from the compressed one. Idempotent.
    pub fn decompress(&mut self) -> Result<()> {
        if self.payload.is_some() {
            return Ok(());
        }
        let compressed = self
            .compressed
            .as_ref()
            .expect("resource without any payload representation");
        let bytes =
            lz4_flex::block::decompress(&compressed.bytes, compressed.uncompressed_size as usize)
                .map_err(|e| MirageError::InvalidResource {
                    name: self.name.clone(),
                    reason: format!("lz4 decompression failed: {e}"),
                })?;
        self.payload = Some(bytes.into());
        Ok(())
    }

    /// Drops the uncompressed representation if a compressed one exists.
    pub fn release_uncompressed(&mut self) {
        if self.compressed.is_some() {
            self.payload = None;
        }
    }

    #[must_use]
    pub fn is_compressed_resident(&self) -> bool {
        self.compressed.is_some()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Resource {}
