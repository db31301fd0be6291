//! Error types for the Jam engine.
//!
//! Command errors are reported to the caller and logged by the runtime, but
//! they never abort a scheduler tick. Remote and storage failures are
//! resolved internally (fallback descriptor, empty registry) and only show
//! up in logs.

use thiserror::Error;

/// Errors returned by engine commands.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Tempo must be a finite number of beats per minute greater than zero.
    #[error("invalid tempo: {0} bpm")]
    InvalidTempo(f64),

    /// A command referenced a track id that is not part of the project.
    #[error("unknown track: {0}")]
    UnknownTrack(String),

    /// A command referenced a patch id that is not registered.
    #[error("unknown patch: {0}")]
    UnknownPatch(String),

    /// The worker or runtime on the other end of a channel has gone away.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// Errors raised by a remote descriptor service.
///
/// These never reach callers of the generator; they trigger the heuristic
/// fallback instead.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// No remote service is configured.
    #[error("remote descriptor service unavailable")]
    Unavailable,

    /// The request could not be sent or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status code.
    #[error("service returned status {0}")]
    Status(u16),

    /// The response body was not a descriptor.
    #[error("malformed descriptor response: {0}")]
    Decode(String),
}

/// Errors raised by a durable key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying file system failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The key cannot be mapped onto the store (e.g. path separators).
    #[error("invalid store key: {0}")]
    InvalidKey(String),

    /// The value could not be encoded for storage.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
