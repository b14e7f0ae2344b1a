#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod codec;
pub mod compositor;
pub mod control;
pub mod errors;
pub mod lifecycle;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod transport;
pub mod utils;

pub use codec::{BinaryInputStream, BinaryOutputStream, MAX_STRING_LENGTH, SeekOrigin};
pub use compositor::{CompositorRequest, EmbeddedCompositor};
pub use control::{
    ControlRequest, ControlResponse, RendererControl, RendererEvent, SceneAvailability,
};
pub use errors::{MirageError, Result};
pub use lifecycle::SceneLifecycleController;
pub use renderer::{
    Device, DisplayConfig, DisplayScheduler, FrameBudgets, HeadlessDevice, ResourceCacheConfig,
    ResourceManager,
};
pub use resources::{
    CompressionLevel, PixelFormat, Resource, ResourceContentHash, ResourceKind, ResourceMetadata,
};
pub use scene::{
    ClientScene, SceneActionCollection, SceneActionId, SceneId, SceneState, SceneUpdate,
    SceneVersionTag,
};
pub use transport::{decode_scene_update, encode_scene_update};
