//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, MirageError>`. Codec failures are fatal to the
//! enclosing action batch; resource failures are confined to the offending
//! resource and its dependents.

use thiserror::Error;

use crate::resources::ResourceContentHash;
use crate::scene::SceneId;

/// The main error type for the Mirage core runtime.
#[derive(Error, Debug)]
pub enum MirageError {
    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// A read ran past the end of the input buffer.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    TruncatedInput {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// A length prefix or enum tag did not decode to a legal value.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A resource failed its creation- or deserialization-time validation.
    #[error("invalid resource{}: {reason}", name_suffix(.name))]
    InvalidResource {
        /// Diagnostic name of the offending resource
        name: String,
        /// What the validation found
        reason: String,
    },

    /// The GPU layer rejected an upload.
    #[error("upload failed for resource {hash}: {reason}")]
    UploadFailed {
        /// Content hash of the resource
        hash: ResourceContentHash,
        /// Backend-provided reason
        reason: String,
    },

    // ========================================================================
    // Scene Errors
    // ========================================================================
    /// An action referenced a handle that is not allocated in the scene.
    #[error("invalid {kind} handle {handle} in scene {scene}")]
    HandleInvalid {
        /// Handle table the lookup went to
        kind: &'static str,
        /// Raw handle value
        handle: u32,
        /// Scene the action was applied to
        scene: SceneId,
    },

    /// The incoming action stream for a scene could not be applied; the
    /// scene requires a full re-sync.
    #[error("scene {scene} corrupted: {reason}")]
    SceneCorrupted {
        /// Scene that was force-unsubscribed
        scene: SceneId,
        /// First fatal problem encountered
        reason: String,
    },

    // ========================================================================
    // Compositor Errors
    // ========================================================================
    /// A wayland client violated the protocol; the connection is dropped.
    #[error("wayland protocol error on connection {connection}: {reason}")]
    WaylandProtocol {
        /// Offending client connection id
        connection: u32,
        /// Protocol violation description
        reason: String,
    },

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error (resource files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn name_suffix(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!(" '{name}'")
    }
}

/// Alias for `Result<T, MirageError>`.
pub type Result<T> = std::result::Result<T, MirageError>;
