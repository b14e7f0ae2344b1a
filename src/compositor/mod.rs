//! Embedded compositor adapter.
//!
//! Owns the protocol *semantics* of the renderer-embedded wayland server:
//! the surface registry keyed by ivi id, pending/committed buffer slots,
//! frame callbacks and buffer lifetime. The socket plumbing itself lives in
//! the platform layer, which forwards decoded client requests as
//! [`CompositorRequest`] values and delivers the frame callbacks returned
//! from `end_frame`.

mod registry;

pub use registry::{
    CompositorRequest, ConnectionId, EmbeddedCompositor, FrameCallback, StreamContent,
};
