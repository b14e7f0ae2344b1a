//! Resource file format ("RSRF").
//!
//! Layout: file header `magic, version, count`, then per resource
//! `hash_hi, hash_lo, kind, cache_flag, is_compressed, uncompressed_size,
//! stored_size, metadata bytes, stored payload bytes`. All integers
//! little-endian. The stored payload is the compressed representation when
//! one is resident, otherwise the raw payload.

use std::io::{Read, Write};

use crate::codec::{BinaryInputStream, BinaryOutputStream};
use crate::errors::{MirageError, Result};
use crate::resources::resource::{Resource, ResourceKind, ResourceMetadata};

pub const RESOURCE_FILE_MAGIC: [u8; 4] = *b"RSRF";
pub const RESOURCE_FILE_VERSION: u32 = 1;

/// Writes all resources into one resource file.
pub fn write_resource_file<W: Write>(writer: &mut W, resources: &[Resource]) -> Result<()> {
    let mut output = BinaryOutputStream::new();
    output.write_bytes(&RESOURCE_FILE_MAGIC);
    output.write_u32(RESOURCE_FILE_VERSION);
    output.write_u32(resources.len() as u32);

    for resource in resources {
        let hash = resource.hash();
        output.write_u64(hash.hi);
        output.write_u64(hash.lo);
        output.write_u32(resource.kind() as u32);
        output.write_u32(resource.cache_flag());

        let stored: &[u8] = match resource.compressed_payload() {
            Some(compressed) => {
                output.write_u8(1);
                compressed
            }
            None => {
                output.write_u8(0);
                resource
                    .payload()
                    .expect("resource without any payload representation")
            }
        };
        output.write_u32(resource.uncompressed_size());
        output.write_u32(stored.len() as u32);
        resource.metadata().serialize(&mut output);
        output.write_bytes(stored);
    }

    writer.write_all(output.as_slice())?;
    Ok(())
}

/// Reads back every resource of a resource file.
pub fn read_resource_file<R: Read>(reader: &mut R) -> Result<Vec<Resource>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let mut input = BinaryInputStream::new(&bytes);

    let mut magic = [0_u8; 4];
    input.read_bytes(&mut magic)?;
    if magic != RESOURCE_FILE_MAGIC {
        return Err(MirageError::InvalidEncoding(format!(
            "bad resource file magic {magic:02x?}"
        )));
    }
    let version = input.read_u32()?;
    if version != RESOURCE_FILE_VERSION {
        return Err(MirageError::InvalidEncoding(format!(
            "unsupported resource file version {version}"
        )));
    }

    let count = input.read_u32()?;
    let mut resources = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        let hash_hi = input.read_u64()?;
        let hash_lo = input.read_u64()?;
        let kind = ResourceKind::from_u32(input.read_u32()?)?;
        let cache_flag = input.read_u32()?;
        let is_compressed = input.read_bool()?;
        let uncompressed_size = input.read_u32()?;
        let stored_size = input.read_u32()?;
        let metadata = ResourceMetadata::deserialize(kind, &mut input)?;
        let stored = input.read_without_copy(stored_size as usize)?.to_vec();

        let resource = if is_compressed {
            Resource::from_stored(
                metadata,
                crate::resources::ResourceContentHash::new(hash_hi, hash_lo),
                cache_flag,
                None,
                Some((stored, uncompressed_size)),
            )?
        } else {
            Resource::from_stored(
                metadata,
                crate::resources::ResourceContentHash::new(hash_hi, hash_lo),
                cache_flag,
                Some(stored),
                None,
            )?
        };
        resources.push(resource);
    }
    Ok(resources)
}
