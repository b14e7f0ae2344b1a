//! Binary Codec
//!
//! Endian-neutral serialization primitives shared by the scene action
//! stream, the resource file format and the transport framing. All
//! multi-byte scalars are little-endian on the wire.
//!
//! Strings come in two length-prefixed encodings:
//! - the *short* form (`u8` prefix) used inside scene action payloads,
//!   capped at [`MAX_STRING_LENGTH`] bytes,
//! - the *long* form (`u32` prefix) used by resource metadata.

mod input;
mod output;

pub use input::{BinaryInputStream, SeekOrigin};
pub use output::BinaryOutputStream;

/// Longest string the action-log writer will emit. Longer strings are
/// truncated to this many bytes (a warning is logged).
pub const MAX_STRING_LENGTH: usize = 255;
