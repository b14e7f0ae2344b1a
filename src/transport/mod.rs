//! Wire format of the scene action stream.
//!
//! One flush travels as one framed message: a `u32` envelope with the total
//! message size, the `RSAF` header, the action table, the shared payload
//! buffer and the resource-changes trailer. All integers little-endian.

use bytemuck::Pod;

use crate::codec::{BinaryInputStream, BinaryOutputStream};
use crate::errors::{MirageError, Result};
use crate::scene::{
    FlushTimeInfo, ResourceChanges, SceneActionCollection, SceneActionId, SceneId, SceneUpdate,
    SceneVersionTag,
};

pub const FLUSH_MAGIC: [u8; 4] = *b"RSAF";
pub const STREAM_VERSION: u32 = 1;

/// Encodes one flush into a framed message, envelope included.
#[must_use]
pub fn encode_scene_update(update: &SceneUpdate) -> Vec<u8> {
    let mut body = BinaryOutputStream::with_capacity(
        64 + update.actions.collection_data().len()
            + update.resource_changes.estimate_put_size(),
    );
    body.write_bytes(&FLUSH_MAGIC);
    body.write_u32(STREAM_VERSION);
    body.write_u64(update.scene_id.0);
    body.write_i64(update.time_info.flush_ts);
    body.write_i64(update.time_info.expiration_ts);
    body.write_u64(update.version_tag.0);

    body.write_u32(update.actions.number_of_actions() as u32);
    for action in update.actions.iter() {
        body.write_u16(action.action_id() as u16);
        body.write_u32(action.offset_in_collection());
    }
    body.write_u32(update.actions.collection_data().len() as u32);
    body.write_bytes(update.actions.collection_data());

    write_pod_array(&mut body, &update.resource_changes.added);
    write_pod_array(&mut body, &update.resource_changes.removed);
    write_pod_array(&mut body, &update.resource_changes.scene_resource_actions);

    let body = body.release();
    let mut framed = BinaryOutputStream::with_capacity(4 + body.len());
    framed.write_u32(body.len() as u32);
    framed.write_bytes(&body);
    framed.release()
}

/// Decodes one framed message. Returns the update and the total bytes
/// consumed, so back-to-back messages can be split from one buffer.
pub fn decode_scene_update(bytes: &[u8]) -> Result<(SceneUpdate, usize)> {
    let mut input = BinaryInputStream::new(bytes);
    let body_len = input.read_u32()? as usize;
    if input.remaining() < body_len {
        return Err(MirageError::TruncatedInput {
            needed: body_len,
            available: input.remaining(),
        });
    }

    let mut magic = [0_u8; 4];
    input.read_bytes(&mut magic)?;
    if magic != FLUSH_MAGIC {
        return Err(MirageError::InvalidEncoding(format!(
            "bad flush magic {magic:02x?}"
        )));
    }
    let version = input.read_u32()?;
    if version != STREAM_VERSION {
        return Err(MirageError::InvalidEncoding(format!(
            "unsupported stream version {version}"
        )));
    }
    let scene_id = SceneId(input.read_u64()?);
    let time_info = FlushTimeInfo {
        flush_ts: input.read_i64()?,
        expiration_ts: input.read_i64()?,
    };
    let version_tag = SceneVersionTag(input.read_u64()?);

    let action_count = input.read_u32()?;
    let mut action_infos = Vec::with_capacity(action_count.min(65536) as usize);
    for _ in 0..action_count {
        let id = SceneActionId::from_u16(input.read_u16()?)?;
        let offset = input.read_u32()?;
        action_infos.push((id, offset));
    }
    let payload_len = input.read_u32()? as usize;
    let payload = input.read_without_copy(payload_len)?;

    let mut actions = SceneActionCollection::with_capacity(payload_len, action_infos.len());
    actions.append_raw_data(payload);
    let mut previous = 0_u32;
    for (id, offset) in action_infos {
        if offset < previous || offset as usize > payload_len {
            return Err(MirageError::InvalidEncoding(format!(
                "action offset {offset} breaks monotonicity or payload bounds"
            )));
        }
        previous = offset;
        actions.add_raw_action_info(id, offset);
    }

    let resource_changes = ResourceChanges {
        added: read_pod_array(&mut input)?,
        removed: read_pod_array(&mut input)?,
        scene_resource_actions: read_pod_array(&mut input)?,
    };

    let consumed = input.current_read_bytes();
    Ok((
        SceneUpdate {
            scene_id,
            version_tag,
            time_info,
            actions,
            resource_changes,
        },
        consumed,
    ))
}

fn write_pod_array<T: Pod>(output: &mut BinaryOutputStream, elements: &[T]) {
    output.write_u32(elements.len() as u32);
    if !elements.is_empty() {
        output.write_bytes(bytemuck::cast_slice(elements));
    }
}

fn read_pod_array<T: Pod>(input: &mut BinaryInputStream<'_>) -> Result<Vec<T>> {
    let count = input.read_u32()? as usize;
    if count == 0 {
        return Ok(Vec::new());
    }
    let bytes = input.read_without_copy(count * size_of::<T>())?;
    Ok(bytemuck::pod_collect_to_vec(bytes))
}
