//! Per-flush delta of the resource references and scene-owned GPU objects.
//!
//! Serialized into the terminating flush action (and the transport trailer)
//! as three POD arrays, each a `u32` element count followed by the raw
//! little-endian element bytes.

use bytemuck::{Pod, Zeroable};

use crate::errors::{MirageError, Result};
use crate::resources::ResourceContentHash;
use crate::scene::actions::{ActionReader, SceneActionCollection};

/// GPU-side effect of a scene-owned object mutation, replayed by the
/// renderer when the flush is applied.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneResourceActionKind {
    CreateRenderBuffer = 0,
    DestroyRenderBuffer,
    CreateRenderTarget,
    DestroyRenderTarget,
    CreateBlitPass,
    DestroyBlitPass,
    CreateDataBuffer,
    UpdateDataBuffer,
    DestroyDataBuffer,
    CreateTextureBuffer,
    UpdateTextureBuffer,
    DestroyTextureBuffer,
    CreateStreamTexture,
    DestroyStreamTexture,
}

impl SceneResourceActionKind {
    pub fn from_u32(value: u32) -> Result<Self> {
        if value > SceneResourceActionKind::DestroyStreamTexture as u32 {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown scene resource action {value}"
            )));
        }
        Ok(unsafe { std::mem::transmute::<u32, SceneResourceActionKind>(value) })
    }
}

/// One scene resource action: kind plus the raw handle it targets.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SceneResourceAction {
    kind: u32,
    pub handle: u32,
}

impl SceneResourceAction {
    #[must_use]
    pub fn new(kind: SceneResourceActionKind, handle: u32) -> Self {
        Self {
            kind: kind as u32,
            handle,
        }
    }

    pub fn kind(&self) -> Result<SceneResourceActionKind> {
        SceneResourceActionKind::from_u32(self.kind)
    }
}

/// Resource-reference delta accumulated between two flushes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceChanges {
    /// Client resources referenced for the first time this epoch.
    pub added: Vec<ResourceContentHash>,
    /// Client resources no longer referenced by any live component.
    pub removed: Vec<ResourceContentHash>,
    /// Scene-owned GPU object mutations in occurrence order.
    pub scene_resource_actions: Vec<SceneResourceAction>,
}

impl ResourceChanges {
    pub fn clear(&mut self) {
        self.added.clear();
        self.removed.clear();
        self.scene_resource_actions.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.scene_resource_actions.is_empty()
    }

    /// Serializes into the current action of `collection`.
    pub fn put_to_action(&self, collection: &mut SceneActionCollection) {
        put_pod_array(collection, &self.added);
        put_pod_array(collection, &self.removed);
        put_pod_array(collection, &self.scene_resource_actions);
    }

    /// Deserializes from an action cursor.
    pub fn get_from_action(reader: &mut ActionReader<'_>) -> Result<Self> {
        Ok(Self {
            added: get_pod_array(reader)?,
            removed: get_pod_array(reader)?,
            scene_resource_actions: get_pod_array(reader)?,
        })
    }

    /// Upper bound of the serialized size, for pre-sizing the action buffer.
    #[must_use]
    pub fn estimate_put_size(&self) -> usize {
        3 * size_of::<u32>()
            + self.added.len() * size_of::<ResourceContentHash>()
            + self.removed.len() * size_of::<ResourceContentHash>()
            + self.scene_resource_actions.len() * size_of::<SceneResourceAction>()
    }
}

fn put_pod_array<T: Pod>(collection: &mut SceneActionCollection, elements: &[T]) {
    collection.write_u32(elements.len() as u32);
    if !elements.is_empty() {
        collection.append_raw_data(bytemuck::cast_slice(elements));
    }
}

fn get_pod_array<T: Pod>(reader: &mut ActionReader<'_>) -> Result<Vec<T>> {
    let count = reader.read_u32()? as usize;
    if count == 0 {
        return Ok(Vec::new());
    }
    let bytes = reader.read_without_copy(count * size_of::<T>())?;
    // the wire buffer carries no alignment guarantee
    Ok(bytemuck::pod_collect_to_vec(bytes))
}
