use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Globally unique identifier of a scene, chosen by the publishing client.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Default)]
pub struct SceneId(pub u64);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene:{}", self.0)
    }
}

impl fmt::Debug for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneId({})", self.0)
    }
}

/// Monotonically increasing tag a client may attach to a flush.
/// The zero value encodes "untagged" on the wire.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Default, Debug)]
pub struct SceneVersionTag(pub u64);

impl SceneVersionTag {
    pub const NONE: Self = Self(0);

    #[must_use]
    pub fn is_some(self) -> bool {
        self.0 != 0
    }
}

/// Identifier of a display owned by the renderer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct DisplayId(pub u32);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display:{}", self.0)
    }
}

/// Identifier of a display buffer: the display framebuffer or an
/// offscreen buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct DisplayBufferId(pub u32);

impl fmt::Display for DisplayBufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer:{}", self.0)
    }
}

/// Numeric id addressing a wayland surface through the ivi-application
/// protocol.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Default, Debug)]
pub struct WaylandIviSurfaceId(pub u32);

impl fmt::Display for WaylandIviSurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ivi:{}", self.0)
    }
}

/// Timing metadata attached to a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushTimeInfo {
    /// Monotonic timestamp of the flush, nanoseconds.
    pub flush_ts: i64,
    /// Wall-clock expiration timestamp, nanoseconds; 0 means "never".
    pub expiration_ts: i64,
}

impl FlushTimeInfo {
    #[must_use]
    pub fn has_expiration(&self) -> bool {
        self.expiration_ts != 0
    }
}
