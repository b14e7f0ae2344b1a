//! Scene lifecycle: per-scene state machine on the renderer driven by
//! publication, flushes, resource readiness and control requests.

mod controller;

pub use controller::{SceneLifecycleController, SceneRecord};
