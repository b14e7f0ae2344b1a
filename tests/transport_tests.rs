//! Wire Format Tests
//!
//! Tests for:
//! - Flush framing: header fields, action table, payload, trailer
//! - Round trips through encode/decode
//! - Splitting back-to-back messages from one buffer
//! - Malformed frames

use glam::Vec3;

use mirage::errors::MirageError;
use mirage::resources::DataType;
use mirage::scene::{
    ClientScene, DataFieldInfo, FlushTimeInfo, SceneId, SceneState, SceneVersionTag,
    apply_scene_actions,
};
use mirage::transport::{FLUSH_MAGIC, decode_scene_update, encode_scene_update};

fn sample_update(scene_id: u64, tag: u64) -> mirage::scene::SceneUpdate {
    let mut scene = ClientScene::new(SceneId(scene_id));
    let node = scene.allocate_node();
    scene.set_translation(node, Vec3::new(4.0, 5.0, 6.0)).unwrap();
    scene.allocate_data_layout(
        vec![DataFieldInfo {
            data_type: DataType::Vector4F,
            element_count: 1,
        }],
        mirage::resources::ResourceContentHash::new(0xAB, 0xCD),
    );
    scene
        .flush(
            SceneVersionTag(tag),
            FlushTimeInfo {
                flush_ts: 111,
                expiration_ts: 222,
            },
        )
        .unwrap()
}

// ============================================================================
// Round Trips
// ============================================================================

#[test]
fn encode_decode_round_trips_the_update() {
    let update = sample_update(42, 7);
    let bytes = encode_scene_update(&update);
    let (decoded, consumed) = decode_scene_update(&bytes).unwrap();

    assert_eq!(consumed, bytes.len());
    assert_eq!(decoded.scene_id, update.scene_id);
    assert_eq!(decoded.version_tag, update.version_tag);
    assert_eq!(decoded.time_info, update.time_info);
    assert_eq!(decoded.actions, update.actions);
    assert_eq!(decoded.resource_changes, update.resource_changes);
}

#[test]
fn decoded_actions_apply_like_the_originals() {
    let update = sample_update(3, 1);
    let bytes = encode_scene_update(&update);
    let (decoded, _) = decode_scene_update(&bytes).unwrap();

    let mut from_original = SceneState::new(SceneId(3));
    apply_scene_actions(&mut from_original, &update.actions).unwrap();
    let mut from_wire = SceneState::new(SceneId(3));
    apply_scene_actions(&mut from_wire, &decoded.actions).unwrap();
    assert_eq!(from_original, from_wire);
}

#[test]
fn two_messages_split_from_one_buffer() {
    let first = sample_update(1, 10);
    let second = sample_update(2, 20);
    let mut buffer = encode_scene_update(&first);
    buffer.extend_from_slice(&encode_scene_update(&second));

    let (decoded_first, consumed) = decode_scene_update(&buffer).unwrap();
    assert_eq!(decoded_first.scene_id, SceneId(1));
    let (decoded_second, rest) = decode_scene_update(&buffer[consumed..]).unwrap();
    assert_eq!(decoded_second.scene_id, SceneId(2));
    assert_eq!(consumed + rest, buffer.len());
}

// ============================================================================
// Header Layout
// ============================================================================

#[test]
fn header_carries_magic_and_ids_in_order() {
    let update = sample_update(0x0102_0304_0506_0708, 9);
    let bytes = encode_scene_update(&update);

    // u32 envelope, then the magic
    assert_eq!(&bytes[4..8], &FLUSH_MAGIC);
    // version u32 little-endian
    assert_eq!(&bytes[8..12], &[1, 0, 0, 0]);
    // scene id u64 little-endian
    assert_eq!(
        &bytes[12..20],
        &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
    );
}

#[test]
fn envelope_length_covers_the_body() {
    let update = sample_update(5, 0);
    let bytes = encode_scene_update(&update);
    let body_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    assert_eq!(body_len + 4, bytes.len());
}

// ============================================================================
// Malformed Frames
// ============================================================================

#[test]
fn truncated_envelope_fails() {
    let update = sample_update(1, 1);
    let bytes = encode_scene_update(&update);
    let error = decode_scene_update(&bytes[..bytes.len() / 2]).unwrap_err();
    assert!(matches!(error, MirageError::TruncatedInput { .. }));
}

#[test]
fn corrupted_magic_fails() {
    let update = sample_update(1, 1);
    let mut bytes = encode_scene_update(&update);
    bytes[4] = b'X';
    assert!(matches!(
        decode_scene_update(&bytes),
        Err(MirageError::InvalidEncoding(_))
    ));
}

#[test]
fn unknown_action_id_fails() {
    let update = sample_update(1, 1);
    let mut bytes = encode_scene_update(&update);
    // first action record's u16 type sits right after the action count
    let type_offset = 4 + 4 + 4 + 8 + 8 + 8 + 8 + 4;
    bytes[type_offset] = 0xFF;
    bytes[type_offset + 1] = 0xFF;
    assert!(matches!(
        decode_scene_update(&bytes),
        Err(MirageError::InvalidEncoding(_))
    ));
}
