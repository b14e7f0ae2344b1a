//! Resource Tests
//!
//! Tests for:
//! - Content hash identity and sensitivity to single-byte perturbations
//! - LZ4 compress/decompress round trips and hash stability
//! - Texture mip-chain validation for uncompressed and compressed formats
//! - Effect metadata and payload layout
//! - Resource file round trips

use rand::Rng;
use smallvec::smallvec;

use mirage::errors::MirageError;
use mirage::resources::{
    ArrayMetadata, CompressionLevel, DataType, EffectInput, EffectMetadata, PixelFormat, Resource,
    ResourceContentHash, ResourceKind, ResourceMetadata, TextureKind, TextureMetadata,
    default_swizzle, mip_extent, read_resource_file, write_resource_file,
};

fn texture_2d(width: u32, height: u32, format: PixelFormat, mip_sizes: &[u32]) -> TextureMetadata {
    TextureMetadata {
        kind: TextureKind::TwoD,
        width,
        height,
        depth: 1,
        format,
        swizzle: default_swizzle(),
        mip_sizes: mip_sizes.iter().copied().collect(),
    }
}

fn rgba8_mip_sizes(width: u32, height: u32, levels: u32) -> Vec<u32> {
    (0..levels)
        .map(|level| mip_extent(width, level) * mip_extent(height, level) * 4)
        .collect()
}

fn make_texture(width: u32, height: u32) -> Resource {
    let levels = 32 - width.max(height).leading_zeros();
    let sizes = rgba8_mip_sizes(width, height, levels);
    let total: u32 = sizes.iter().sum();
    let payload: Vec<u8> = (0..total).map(|i| i as u8).collect();
    Resource::create(
        ResourceMetadata::Texture(texture_2d(width, height, PixelFormat::Rgba8, &sizes)),
        payload,
        0,
        "texture",
    )
    .unwrap()
}

// ============================================================================
// Content Hash
// ============================================================================

#[test]
fn equal_content_hashes_equal() {
    let a = make_texture(8, 8);
    let b = make_texture(8, 8);
    assert_eq!(a.hash(), b.hash());
}

#[test]
fn hash_differs_for_different_metadata() {
    let payload: Vec<u8> = vec![0; 64 * 4];
    let a = Resource::create(
        ResourceMetadata::Texture(texture_2d(8, 8, PixelFormat::Rgba8, &[256])),
        payload.clone(),
        0,
        "a",
    )
    .unwrap();
    let b = Resource::create(
        ResourceMetadata::Texture(texture_2d(16, 4, PixelFormat::Rgba8, &[256])),
        payload,
        0,
        "b",
    )
    .unwrap();
    assert_ne!(a.hash(), b.hash());
}

#[test]
fn single_byte_perturbations_change_the_hash() {
    let mut rng = rand::rng();
    let base_payload: Vec<u8> = (0..1024_u32).map(|i| i as u8).collect();
    let metadata = ResourceMetadata::Array(ArrayMetadata {
        indices: false,
        element_type: DataType::Float,
        element_count: 256,
    });
    let base = Resource::create(metadata.clone(), base_payload.clone(), 0, "base").unwrap();

    for _ in 0..1000 {
        let mut payload = base_payload.clone();
        let index = rng.random_range(0..payload.len());
        let flip = rng.random_range(1..=255_u8);
        payload[index] ^= flip;
        let perturbed = Resource::create(metadata.clone(), payload, 0, "perturbed").unwrap();
        assert_ne!(base.hash(), perturbed.hash());
    }
}

#[test]
fn name_and_cache_flag_do_not_affect_the_hash() {
    let payload: Vec<u8> = vec![7; 256];
    let metadata = ResourceMetadata::Array(ArrayMetadata {
        indices: true,
        element_type: DataType::UInt32,
        element_count: 64,
    });
    let a = Resource::create(metadata.clone(), payload.clone(), 0, "first").unwrap();
    let b = Resource::create(metadata, payload, 99, "second").unwrap();
    assert_eq!(a.hash(), b.hash());
}

#[test]
fn invalid_hash_is_not_valid() {
    assert!(!ResourceContentHash::INVALID.is_valid());
    assert!(ResourceContentHash::new(1, 0).is_valid());
}

// ============================================================================
// Compression
// ============================================================================

#[test]
fn hash_stable_across_compress_decompress_cycle() {
    let mut resource = make_texture(32, 32);
    let original_hash = resource.hash();
    let original_payload = resource.payload().unwrap().to_vec();

    resource.compress(CompressionLevel::Realtime);
    assert!(resource.is_compressed_resident());
    assert_eq!(resource.hash(), original_hash);

    resource.release_uncompressed();
    assert!(resource.payload().is_none());
    assert_eq!(resource.hash(), original_hash);

    resource.decompress().unwrap();
    assert_eq!(resource.hash(), original_hash);
    assert_eq!(resource.payload().unwrap().as_ref(), &original_payload[..]);
}

#[test]
fn compress_is_idempotent() {
    let mut resource = make_texture(16, 16);
    resource.compress(CompressionLevel::Realtime);
    let first = resource.compressed_payload().unwrap().to_vec();
    resource.compress(CompressionLevel::Offline);
    assert_eq!(resource.compressed_payload().unwrap().as_ref(), &first[..]);
}

#[test]
fn compression_round_trips_random_payloads() {
    let mut rng = rand::rng();
    for len in [1_usize, 16, 1000, 4096] {
        let payload: Vec<u8> = (0..len * 4).map(|_| rng.random()).collect();
        let mut resource = Resource::create(
            ResourceMetadata::Array(ArrayMetadata {
                indices: false,
                element_type: DataType::Float,
                element_count: len as u32,
            }),
            payload.clone(),
            0,
            "random",
        )
        .unwrap();
        resource.compress(CompressionLevel::Realtime);
        resource.release_uncompressed();
        resource.decompress().unwrap();
        assert_eq!(resource.payload().unwrap().as_ref(), &payload[..]);
    }
}

// ============================================================================
// Texture Validation
// ============================================================================

#[test]
fn full_mip_chains_validate_for_uncompressed_formats() {
    for format in [
        PixelFormat::R8,
        PixelFormat::Rg8,
        PixelFormat::Rgb8,
        PixelFormat::Rgba8,
        PixelFormat::Rgba16F,
        PixelFormat::Rgba32F,
    ] {
        let texel = format.texel_size().unwrap();
        for size in [1_u32, 2, 7, 64, 100, 1024] {
            let levels = 32 - size.leading_zeros();
            let sizes: Vec<u32> = (0..levels)
                .map(|level| {
                    let extent = mip_extent(size, level);
                    extent * extent * texel
                })
                .collect();
            let metadata = texture_2d(size, size, format, &sizes);
            assert!(
                metadata.validate("chain").is_ok(),
                "{format:?} {size}x{size} should validate"
            );
        }
    }
}

#[test]
fn one_texel_short_in_any_mip_is_invalid() {
    let sizes = rgba8_mip_sizes(16, 16, 5);
    for level in 0..sizes.len() {
        let mut short = sizes.clone();
        short[level] -= 4;
        let metadata = texture_2d(16, 16, PixelFormat::Rgba8, &short);
        assert!(
            matches!(
                metadata.validate("short"),
                Err(MirageError::InvalidResource { .. })
            ),
            "mip {level} short by one texel must fail"
        );
    }
}

#[test]
fn oversized_mip_warns_but_validates() {
    let mut sizes = rgba8_mip_sizes(8, 8, 1);
    sizes[0] += 16;
    let metadata = texture_2d(8, 8, PixelFormat::Rgba8, &sizes);
    assert!(metadata.validate("padded").is_ok());
}

#[test]
fn zero_dimension_is_invalid() {
    let metadata = texture_2d(0, 4, PixelFormat::Rgba8, &[64]);
    assert!(metadata.validate("flat").is_err());
}

#[test]
fn too_many_mips_is_invalid() {
    let sizes = rgba8_mip_sizes(4, 4, 4);
    let metadata = texture_2d(4, 4, PixelFormat::Rgba8, &sizes);
    assert!(metadata.validate("deep").is_err());
}

#[test]
fn compressed_formats_require_block_multiples() {
    // 12x12 is a multiple of the ASTC 6x6 block, 10x10 is not
    let ok = texture_2d(12, 12, PixelFormat::Astc6x6, &[144]);
    assert!(ok.validate("aligned").is_ok());

    let bad = texture_2d(10, 10, PixelFormat::Astc6x6, &[144]);
    assert!(matches!(
        bad.validate("unaligned"),
        Err(MirageError::InvalidResource { .. })
    ));
}

#[test]
fn block_size_table_matches_formats() {
    assert_eq!(PixelFormat::Etc2Rgb.block_size(), Some((4, 4)));
    assert_eq!(PixelFormat::AstcSrgb4x4.block_size(), Some((4, 4)));
    assert_eq!(PixelFormat::Astc10x8.block_size(), Some((10, 8)));
    assert_eq!(PixelFormat::AstcSrgb12x12.block_size(), Some((12, 12)));
    assert_eq!(PixelFormat::Rgba8.block_size(), None);
    assert!(PixelFormat::Astc8x6.is_compressed());
    assert!(!PixelFormat::R32F.is_compressed());
}

#[test]
fn cube_faces_must_be_square() {
    let metadata = TextureMetadata {
        kind: TextureKind::Cube,
        width: 8,
        height: 4,
        depth: 1,
        format: PixelFormat::Rgba8,
        swizzle: default_swizzle(),
        mip_sizes: smallvec![256],
    };
    assert!(metadata.validate("lopsided").is_err());
}

// ============================================================================
// Effect Metadata
// ============================================================================

fn sample_effect() -> (EffectMetadata, Vec<u8>) {
    let spirv: Vec<u8> = (0..64_u8).collect();
    let (offsets, payload) = EffectMetadata::build_payload(
        "void main() { vertex(); }",
        "void main() { fragment(); }",
        "",
        &spirv,
        &spirv,
        &[],
    );
    let mut uniform = EffectInput::new("u_mvp", DataType::Matrix44F);
    uniform.uniform_buffer_binding = 1;
    uniform.ubo_element_size = 64;
    let metadata = EffectMetadata {
        uniform_inputs: vec![uniform, EffectInput::new("u_color", DataType::Vector4F)],
        attribute_inputs: vec![EffectInput::new("a_position", DataType::Vector3F)],
        byte_offsets: offsets,
        geometry_input: None,
    };
    (metadata, payload)
}

#[test]
fn effect_payload_sections_are_addressable() {
    let (metadata, payload) = sample_effect();
    assert_eq!(metadata.vertex_shader(&payload), b"void main() { vertex(); }");
    assert_eq!(
        metadata.fragment_shader(&payload),
        b"void main() { fragment(); }"
    );
    assert_eq!(metadata.geometry_shader(&payload), b"");
    assert_eq!(metadata.vertex_spirv(&payload).len(), 64);
    assert_eq!(metadata.fragment_spirv(&payload).len(), 64);
    assert_eq!(metadata.geometry_spirv(&payload).len(), 0);
}

#[test]
fn effect_input_lookup_by_name() {
    let (metadata, _) = sample_effect();
    assert_eq!(metadata.uniform_input_index("u_color"), Some(1));
    assert_eq!(metadata.attribute_input_index("a_position"), Some(0));
    assert_eq!(metadata.uniform_input_index("missing"), None);
}

#[test]
fn effect_resource_round_trips_through_metadata_bytes() {
    let (metadata, payload) = sample_effect();
    let resource = Resource::create(
        ResourceMetadata::Effect(metadata.clone()),
        payload,
        0,
        "effect",
    )
    .unwrap();
    assert_eq!(resource.kind(), ResourceKind::Effect);

    let mut file = Vec::new();
    write_resource_file(&mut file, std::slice::from_ref(&resource)).unwrap();
    let restored = read_resource_file(&mut file.as_slice()).unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].metadata(), &ResourceMetadata::Effect(metadata));
    assert_eq!(restored[0].hash(), resource.hash());
}

#[test]
fn geometry_shader_without_input_primitive_is_invalid() {
    let (offsets, payload) = EffectMetadata::build_payload(
        "v",
        "f",
        "geometry shader body",
        &[],
        &[],
        &[],
    );
    let metadata = EffectMetadata {
        uniform_inputs: Vec::new(),
        attribute_inputs: Vec::new(),
        byte_offsets: offsets,
        geometry_input: None,
    };
    let result = Resource::create(ResourceMetadata::Effect(metadata), payload, 0, "bad");
    assert!(matches!(result, Err(MirageError::InvalidResource { .. })));
}

// ============================================================================
// Resource Files
// ============================================================================

#[test]
fn texture_with_ramp_mips_round_trips_through_a_file() {
    // 4x4 RGBA8 with mip chain 4x4, 2x2, 1x1 and ramp contents
    let sizes = rgba8_mip_sizes(4, 4, 3);
    let total: u32 = sizes.iter().sum();
    let payload: Vec<u8> = (0..total).map(|i| i as u8).collect();
    let resource = Resource::create(
        ResourceMetadata::Texture(texture_2d(4, 4, PixelFormat::Rgba8, &sizes)),
        payload.clone(),
        7,
        "ramp",
    )
    .unwrap();

    let mut file = Vec::new();
    write_resource_file(&mut file, std::slice::from_ref(&resource)).unwrap();
    let restored = read_resource_file(&mut file.as_slice()).unwrap();

    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].hash(), resource.hash());
    assert_eq!(restored[0].cache_flag(), 7);
    assert_eq!(restored[0].metadata(), resource.metadata());
    assert_eq!(restored[0].payload().unwrap().as_ref(), &payload[..]);
}

#[test]
fn compressed_resources_stay_compressed_in_the_file() {
    let mut resource = make_texture(64, 64);
    let hash = resource.hash();
    resource.compress(CompressionLevel::Offline);
    resource.release_uncompressed();

    let mut file = Vec::new();
    write_resource_file(&mut file, std::slice::from_ref(&resource)).unwrap();
    let mut restored = read_resource_file(&mut file.as_slice()).unwrap();

    let restored = &mut restored[0];
    assert!(restored.is_compressed_resident());
    assert!(restored.payload().is_none());
    restored.decompress().unwrap();
    assert_eq!(restored.hash(), hash);
    assert_eq!(
        restored.payload().unwrap().as_ref(),
        make_texture(64, 64).payload().unwrap().as_ref()
    );
}

#[test]
fn bad_magic_is_rejected() {
    let bytes = b"XXXX\x01\x00\x00\x00\x00\x00\x00\x00";
    assert!(matches!(
        read_resource_file(&mut &bytes[..]),
        Err(MirageError::InvalidEncoding(_))
    ));
}

#[test]
fn array_payload_size_must_match_elements() {
    let result = Resource::create(
        ResourceMetadata::Array(ArrayMetadata {
            indices: true,
            element_type: DataType::UInt16,
            element_count: 10,
        }),
        vec![0; 19],
        0,
        "short-indices",
    );
    assert!(matches!(result, Err(MirageError::InvalidResource { .. })));
}
