use smallvec::SmallVec;

use crate::codec::{BinaryInputStream, BinaryOutputStream};
use crate::errors::{MirageError, Result};
use crate::resources::formats::{PixelFormat, TextureChannel};

/// Dimensionality of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    TwoD,
    ThreeD,
    Cube,
}

/// Size of one mip level along one axis.
#[must_use]
pub fn mip_extent(base: u32, level: u32) -> u32 {
    (base >> level).max(1)
}

/// Metadata of a texture resource.
///
/// The payload is the concatenation of mip levels 0..n; cube textures store
/// six faces in the order `+X -X +Y -Y +Z -Z`, each face as its full mip
/// chain. For cube textures `width == height` is the face size and
/// `depth == 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureMetadata {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: PixelFormat,
    pub swizzle: [TextureChannel; 4],
    /// Declared byte size of each mip level (one face for cube textures).
    pub mip_sizes: SmallVec<[u32; 8]>,
}

impl TextureMetadata {
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.mip_sizes.len() as u32
    }

    /// Total payload byte size implied by the declared mip sizes.
    #[must_use]
    pub fn total_payload_size(&self) -> usize {
        let per_chain: usize = self.mip_sizes.iter().map(|&s| s as usize).sum();
        match self.kind {
            TextureKind::Cube => per_chain * 6,
            _ => per_chain,
        }
    }

    /// Create-time validation per the resource contract.
    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: String| MirageError::InvalidResource {
            name: name.to_string(),
            reason,
        };

        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(invalid(format!(
                "dimensions must be at least 1, got {}x{}x{}",
                self.width, self.height, self.depth
            )));
        }
        if self.kind == TextureKind::Cube && self.width != self.height {
            return Err(invalid(format!(
                "cube faces must be square, got {}x{}",
                self.width, self.height
            )));
        }
        if self.mip_sizes.is_empty() {
            return Err(invalid("texture needs at least one mip level".into()));
        }

        let max_extent = self.width.max(self.height).max(self.depth);
        let max_mips = 32 - max_extent.leading_zeros();
        if self.mip_count() > max_mips {
            return Err(invalid(format!(
                "{} mip levels exceed the maximum of {max_mips} for base size {}x{}x{}",
                self.mip_count(),
                self.width,
                self.height,
                self.depth
            )));
        }

        for (level, &declared) in self.mip_sizes.iter().enumerate() {
            let level = level as u32;
            let (w, h, d) = (
                mip_extent(self.width, level),
                mip_extent(self.height, level),
                mip_extent(self.depth, level),
            );
            if let Some(texel) = self.format.texel_size() {
                let expected = w as usize * h as usize * d as usize * texel as usize;
                if (declared as usize) < expected {
                    return Err(invalid(format!(
                        "mip {level} holds {declared} bytes, needs {expected}"
                    )));
                }
                if declared as usize > expected {
                    log::warn!(
                        "texture '{name}': mip {level} declares {declared} bytes, expected {expected}; excess accepted"
                    );
                }
            } else if let Some((bw, bh)) = self.format.block_size() {
                if w % bw != 0 || h % bh != 0 {
                    return Err(invalid(format!(
                        "mip {level} size {w}x{h} is not a multiple of the {bw}x{bh} block of {:?}",
                        self.format
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn serialize(&self, output: &mut BinaryOutputStream) {
        output.write_u32(self.width);
        output.write_u32(self.height);
        output.write_u32(self.depth);
        output.write_u32(self.format as u32);
        for channel in self.swizzle {
            output.write_u8(channel as u8);
        }
        output.write_u32(self.mip_count());
        for &size in &self.mip_sizes {
            output.write_u32(size);
        }
    }

    pub(crate) fn deserialize(
        kind: TextureKind,
        input: &mut BinaryInputStream<'_>,
    ) -> Result<Self> {
        let width = input.read_u32()?;
        let height = input.read_u32()?;
        let depth = input.read_u32()?;
        let format = PixelFormat::from_u32(input.read_u32()?)?;
        let mut swizzle = [TextureChannel::Red; 4];
        for channel in &mut swizzle {
            *channel = TextureChannel::from_u8(input.read_u8()?)?;
        }
        let mip_count = input.read_u32()?;
        let mut mip_sizes = SmallVec::new();
        for _ in 0..mip_count {
            mip_sizes.push(input.read_u32()?);
        }
        Ok(Self {
            kind,
            width,
            height,
            depth,
            format,
            swizzle,
            mip_sizes,
        })
    }
}

/// Identity swizzle `(R, G, B, A)`.
#[must_use]
pub fn default_swizzle() -> [TextureChannel; 4] {
    [
        TextureChannel::Red,
        TextureChannel::Green,
        TextureChannel::Blue,
        TextureChannel::Alpha,
    ]
}
