//! Scene action log: an append-only typed record stream sharing one
//! contiguous payload buffer.
//!
//! Every record is a `(type, offset)` pair; a record's size is implied by
//! the offset of its successor (or the end of the buffer). The sentinel
//! [`SceneActionId::Incomplete`] marks an in-flight action that will be
//! continued by the front action of a later [`SceneActionCollection::append`].

use crate::codec::{BinaryInputStream, BinaryOutputStream};
use crate::errors::{MirageError, Result};

/// Type tag of one scene action record.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneActionId {
    // node hierarchy
    AllocateNode = 0,
    ReleaseNode,
    AddChildToNode,
    RemoveChildFromNode,
    SetTranslation,
    SetRotation,
    SetScaling,
    // renderables
    AllocateRenderable,
    ReleaseRenderable,
    SetRenderableDataInstance,
    SetRenderableStartIndex,
    SetRenderableIndexCount,
    SetRenderableInstanceCount,
    SetRenderableVisibility,
    // data layouts and instances
    AllocateDataLayout,
    ReleaseDataLayout,
    AllocateDataInstance,
    ReleaseDataInstance,
    SetDataFloatArray,
    SetDataVector2fArray,
    SetDataVector3fArray,
    SetDataVector4fArray,
    SetDataMatrix44fArray,
    SetDataInt32Array,
    SetDataResource,
    SetDataTextureSampler,
    // texture samplers
    AllocateTextureSampler,
    ReleaseTextureSampler,
    // scene-owned GPU objects
    AllocateRenderBuffer,
    ReleaseRenderBuffer,
    AllocateRenderTarget,
    ReleaseRenderTarget,
    AllocateBlitPass,
    ReleaseBlitPass,
    SetBlitPassEnabled,
    AllocateDataBuffer,
    ReleaseDataBuffer,
    UpdateDataBuffer,
    AllocateTextureBuffer,
    ReleaseTextureBuffer,
    UpdateTextureBuffer,
    AllocateStreamTexture,
    ReleaseStreamTexture,
    SetStreamTextureForceFallback,
    // flush boundary
    SceneFlush,
    // reserved for tests
    TestAction,
    /// In-flight action continued by a later append.
    Incomplete,
}

impl SceneActionId {
    pub fn from_u16(value: u16) -> Result<Self> {
        if value > SceneActionId::Incomplete as u16 {
            return Err(MirageError::InvalidEncoding(format!(
                "unknown scene action id {value}"
            )));
        }
        Ok(unsafe { std::mem::transmute::<u16, SceneActionId>(value) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActionInfo {
    id: SceneActionId,
    offset: u32,
}

/// Ordered sequence of scene actions over one contiguous payload buffer.
#[derive(Debug, Default)]
pub struct SceneActionCollection {
    data: BinaryOutputStream,
    actions: Vec<ActionInfo>,
}

impl SceneActionCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(data_capacity: usize, action_capacity: usize) -> Self {
        Self {
            data: BinaryOutputStream::with_capacity(data_capacity),
            actions: Vec::with_capacity(action_capacity),
        }
    }

    pub fn clear(&mut self) {
        self.data = BinaryOutputStream::new();
        self.actions.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.data.is_empty()
    }

    #[must_use]
    pub fn number_of_actions(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn collection_data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Explicit deep copy; the collection is otherwise move-only.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            data: self.data.clone(),
            actions: self.actions.clone(),
        }
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Starts a new action record at the current end of the payload.
    pub fn begin_action(&mut self, id: SceneActionId) {
        self.actions.push(ActionInfo {
            id,
            offset: self.data.len() as u32,
        });
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.write_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.write_u16(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.write_u32(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.data.write_u64(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.write_i32(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.data.write_i64(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.data.write_f32(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.data.write_bool(value);
    }

    /// Blob write: `u32` length prefix plus the raw bytes.
    pub fn write_blob(&mut self, bytes: &[u8]) {
        self.data.write_u32(bytes.len() as u32);
        self.data.write_bytes(bytes);
    }

    /// Short-form string write (`u8` length, capped at the log string limit).
    pub fn write_str(&mut self, value: &str) {
        self.data.write_short_string(value);
    }

    // ========================================================================
    // Raw initialization (transport reassembly)
    // ========================================================================

    pub fn append_raw_data(&mut self, bytes: &[u8]) {
        self.data.write_bytes(bytes);
    }

    pub fn add_raw_action_info(&mut self, id: SceneActionId, offset: u32) {
        self.actions.push(ActionInfo { id, offset });
    }

    // ========================================================================
    // Append / merge
    // ========================================================================

    /// Appends `other` behind this collection.
    ///
    /// When this collection ends in an [`SceneActionId::Incomplete`] action,
    /// the front action of `other` continues it: the merged record keeps its
    /// original offset, takes the type of the incoming front action and
    /// grows by its size. Remaining actions are appended with shifted
    /// offsets.
    pub fn append(&mut self, other: &SceneActionCollection) {
        let shift = self.data.len() as u32;
        let merge_front = matches!(
            self.actions.last(),
            Some(ActionInfo {
                id: SceneActionId::Incomplete,
                ..
            })
        ) && !other.actions.is_empty();

        let mut incoming = other.actions.iter();
        if merge_front {
            let front = incoming.next().unwrap();
            let last = self.actions.last_mut().unwrap();
            last.id = front.id;
        }
        for info in incoming {
            self.actions.push(ActionInfo {
                id: info.id,
                offset: info.offset + shift,
            });
        }
        self.data.write_bytes(other.collection_data());
    }

    // ========================================================================
    // Reading
    // ========================================================================

    #[must_use]
    pub fn action(&self, index: usize) -> ActionReader<'_> {
        let info = self.actions[index];
        let end = self
            .actions
            .get(index + 1)
            .map_or(self.data.len(), |next| next.offset as usize);
        ActionReader {
            id: info.id,
            offset: info.offset,
            cursor: BinaryInputStream::new(&self.collection_data()[info.offset as usize..end]),
        }
    }

    #[must_use]
    pub fn front(&self) -> ActionReader<'_> {
        self.action(0)
    }

    #[must_use]
    pub fn back(&self) -> ActionReader<'_> {
        self.action(self.actions.len() - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = ActionReader<'_>> {
        (0..self.actions.len()).map(|index| self.action(index))
    }
}

impl PartialEq for SceneActionCollection {
    fn eq(&self, other: &Self) -> bool {
        self.actions == other.actions && self.collection_data() == other.collection_data()
    }
}

impl Eq for SceneActionCollection {}

/// Read cursor over a single action record.
#[derive(Debug, Clone)]
pub struct ActionReader<'a> {
    id: SceneActionId,
    offset: u32,
    cursor: BinaryInputStream<'a>,
}

impl<'a> ActionReader<'a> {
    #[must_use]
    pub fn action_id(&self) -> SceneActionId {
        self.id
    }

    /// Byte offset of this record inside the collection payload.
    #[must_use]
    pub fn offset_in_collection(&self) -> u32 {
        self.offset
    }

    /// Total byte size of this record.
    #[must_use]
    pub fn size(&self) -> usize {
        self.cursor.current_read_bytes() + self.cursor.remaining()
    }

    #[must_use]
    pub fn is_fully_read(&self) -> bool {
        self.cursor.is_fully_read()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.cursor.read_u8()
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.cursor.read_u16()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor.read_u32()
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.cursor.read_u64()
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.cursor.read_i32()
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.cursor.read_i64()
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.cursor.read_f32()
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.cursor.read_bool()
    }

    /// Blob read without copying; the slice borrows the collection payload.
    pub fn read_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.cursor.read_u32()? as usize;
        self.cursor.read_without_copy(len)
    }

    /// Unprefixed zero-copy read of `len` bytes.
    pub fn read_without_copy(&mut self, len: usize) -> Result<&'a [u8]> {
        self.cursor.read_without_copy(len)
    }

    pub fn read_str(&mut self) -> Result<String> {
        self.cursor.read_short_string()
    }
}
