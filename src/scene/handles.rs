//! Scene-local entity handles and the slot tables storing them.
//!
//! Handles are dense `u32` indices chosen by the client and mirrored
//! verbatim by the renderer, so the pool supports allocation at an explicit
//! index as well as picking the next free slot. A handle value stays stable
//! for the lifetime of its entity.

use std::fmt;
use std::marker::PhantomData;

use crate::errors::{MirageError, Result};
use crate::scene::SceneId;

/// Implemented by every typed scene handle.
pub trait SceneHandle: Copy + Eq + fmt::Debug {
    const KIND: &'static str;

    fn from_index(index: u32) -> Self;
    fn index(self) -> u32;

    fn invalid() -> Self {
        Self::from_index(u32::MAX)
    }

    fn is_valid(self) -> bool {
        self.index() != u32::MAX
    }
}

macro_rules! scene_handles {
    ($($(#[$meta:meta])* $name:ident => $kind:literal,)*) => {
        $(
            $(#[$meta])*
            #[repr(transparent)]
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
                     bytemuck::Pod, bytemuck::Zeroable)]
            pub struct $name(pub u32);

            impl SceneHandle for $name {
                const KIND: &'static str = $kind;

                fn from_index(index: u32) -> Self {
                    Self(index)
                }

                fn index(self) -> u32 {
                    self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    <$name as SceneHandle>::invalid()
                }
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    if self.is_valid() {
                        write!(f, concat!($kind, ":{}"), self.0)
                    } else {
                        write!(f, concat!($kind, ":invalid"))
                    }
                }
            }
        )*
    };
}

scene_handles! {
    /// A node of the transformation hierarchy.
    NodeHandle => "node",
    /// A drawable leaf binding geometry and appearance data.
    RenderableHandle => "renderable",
    /// Field layout shared by data instances.
    DataLayoutHandle => "data-layout",
    /// Concrete values for the fields of a data layout.
    DataInstanceHandle => "data-instance",
    /// Sampler states plus the content they sample.
    TextureSamplerHandle => "texture-sampler",
    /// GPU render buffer owned by the scene.
    RenderBufferHandle => "render-buffer",
    /// Set of render buffers renderables draw into.
    RenderTargetHandle => "render-target",
    /// Rectangle copy between two render buffers.
    BlitPassHandle => "blit-pass",
    /// Mutable index/vertex buffer owned by the scene.
    DataBufferHandle => "data-buffer",
    /// Mutable texture owned by the scene.
    TextureBufferHandle => "texture-buffer",
    /// Texture fed by an embedded-compositor surface.
    StreamTextureHandle => "stream-texture",
}

/// Slot table for one entity kind.
///
/// Supports allocation at the next free slot or at an explicit index,
/// release, and iteration in ascending handle order.
#[derive(Debug, Clone)]
pub struct HandlePool<H: SceneHandle, T> {
    slots: Vec<Option<T>>,
    occupied: usize,
    _handle: PhantomData<H>,
}

impl<H: SceneHandle, T> Default for HandlePool<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: SceneHandle, T> HandlePool<H, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            occupied: 0,
            _handle: PhantomData,
        }
    }

    /// Allocates at the first free slot.
    pub fn allocate(&mut self, value: T) -> H {
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = Some(value);
            self.occupied += 1;
            return H::from_index(index as u32);
        }
        self.slots.push(Some(value));
        self.occupied += 1;
        H::from_index((self.slots.len() - 1) as u32)
    }

    /// Allocates at an explicit index, growing the table as needed. Fails
    /// when the slot is already occupied or the handle is the invalid
    /// sentinel.
    pub fn allocate_at(&mut self, scene: SceneId, handle: H, value: T) -> Result<()> {
        if !handle.is_valid() {
            return Err(invalid_handle::<H>(scene, handle));
        }
        let index = handle.index() as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        if self.slots[index].is_some() {
            return Err(invalid_handle::<H>(scene, handle));
        }
        self.slots[index] = Some(value);
        self.occupied += 1;
        Ok(())
    }

    pub fn release(&mut self, scene: SceneId, handle: H) -> Result<T> {
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .ok_or_else(|| invalid_handle::<H>(scene, handle))?;
        let value = slot.take().ok_or_else(|| invalid_handle::<H>(scene, handle))?;
        self.occupied -= 1;
        Ok(value)
    }

    #[must_use]
    pub fn get(&self, handle: H) -> Option<&T> {
        self.slots.get(handle.index() as usize)?.as_ref()
    }

    #[must_use]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.slots.get_mut(handle.index() as usize)?.as_mut()
    }

    /// Fallible lookup used by the action dispatcher.
    pub fn try_get(&self, scene: SceneId, handle: H) -> Result<&T> {
        self.get(handle)
            .ok_or_else(|| invalid_handle::<H>(scene, handle))
    }

    pub fn try_get_mut(&mut self, scene: SceneId, handle: H) -> Result<&mut T> {
        self.slots
            .get_mut(handle.index() as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| invalid_handle::<H>(scene, handle))
    }

    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.occupied
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Iterates occupied slots in ascending handle order.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|v| (H::from_index(index as u32), v)))
    }
}

impl<H: SceneHandle, T: PartialEq> PartialEq for HandlePool<H, T> {
    fn eq(&self, other: &Self) -> bool {
        // trailing free slots do not affect equality
        let trimmed = |slots: &[Option<T>]| {
            let mut end = slots.len();
            while end > 0 && slots[end - 1].is_none() {
                end -= 1;
            }
            end
        };
        let (a, b) = (trimmed(&self.slots), trimmed(&other.slots));
        a == b && self.slots[..a] == other.slots[..b]
    }
}

fn invalid_handle<H: SceneHandle>(scene: SceneId, handle: H) -> MirageError {
    MirageError::HandleInvalid {
        kind: H::KIND,
        handle: handle.index(),
        scene,
    }
}
