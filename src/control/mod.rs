//! Renderer control API: request dispatch over the display schedulers, the
//! scene lifecycle and the resource cache, plus the pushed event stream.

pub mod events;
mod renderer;

pub use events::{
    EventReceiver, EventSender, RendererEvent, SceneAvailability, event_channel,
};
pub use renderer::{ControlRequest, ControlResponse, DataLink, RendererControl};
