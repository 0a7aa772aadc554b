use thiserror::Error;

use super::audio_models::Direction;

/// Errors that can occur while negotiating or running the loopback.
///
/// Every variant except `BufferSizeNotAligned` (recovered once during render
/// negotiation) and the runtime transfer failures is fatal to the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoopbackError {
    #[error("{direction} endpoint not found: {name:?}")]
    DeviceNotFound { direction: Direction, name: String },

    #[error("activation failed: {0}")]
    ActivationFailed(String),

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("requested buffer size is not aligned to the device granularity")]
    BufferSizeNotAligned,

    #[error("signal creation failed: {0}")]
    SignalCreationFailed(String),

    #[error("stream start failed: {0}")]
    StartFailed(String),

    #[error("buffer acquire failed: {0}")]
    BufferAcquireFailed(String),

    #[error("buffer release failed: {0}")]
    BufferReleaseFailed(String),

    #[error("wait failed: {0}")]
    WaitFailed(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
