//! Events the renderer pushes back to its controlling client.

use crate::resources::ResourceContentHash;
use crate::scene::{DisplayBufferId, DisplayId, SceneId, SceneVersionTag, WaylandIviSurfaceId};

/// Published state of a scene on this renderer, also used as the target of
/// a state request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SceneAvailability {
    Unavailable,
    Available,
    Ready,
    Rendered,
}

/// Structured event pushed over the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    SceneStateChanged {
        scene: SceneId,
        state: SceneAvailability,
    },
    /// A flush with this version tag finished applying.
    SceneFlushed {
        scene: SceneId,
        version: SceneVersionTag,
    },
    SceneExpired {
        scene: SceneId,
    },
    SceneRecovered {
        scene: SceneId,
    },
    /// The action stream of a scene could not be applied; the scene was
    /// forced to `Unavailable` and requires a full re-sync.
    SceneCorrupted {
        scene: SceneId,
        message: String,
    },
    ResourceFailed {
        hash: ResourceContentHash,
    },
    DisplayCreated {
        display: DisplayId,
    },
    DisplayDestroyed {
        display: DisplayId,
    },
    OffscreenBufferCreated {
        display: DisplayId,
        buffer: DisplayBufferId,
    },
    OffscreenBufferDestroyed {
        display: DisplayId,
        buffer: DisplayBufferId,
    },
    OffscreenBufferLinked {
        provider: DisplayBufferId,
        consumer_scene: SceneId,
        consumer_id: u32,
    },
    StreamAvailabilityChanged {
        source: WaylandIviSurfaceId,
        available: bool,
    },
}

/// Sink half of the event stream handed to every subsystem.
pub type EventSender = flume::Sender<RendererEvent>;

/// Receiver half drained by the controlling client.
pub type EventReceiver = flume::Receiver<RendererEvent>;

/// Creates the unbounded event channel.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    flume::unbounded()
}
