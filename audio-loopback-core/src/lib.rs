//! # audio-loopback-core
//!
//! Platform-agnostic core of the exclusive-mode audio loopback bridge.
//!
//! Captures from one named endpoint and plays the same frames out of another
//! through a fixed-capacity ring buffer, with a constant write-ahead between
//! the two cursors. Platform backends (Windows WASAPI) implement the
//! `AudioBackend` trait and plug into the generic negotiator and engine.
//!
//! ## Architecture
//!
//! ```text
//! audio-loopback-core (this crate)
//! ├── traits/       ← AudioBackend, ExclusiveClient, CaptureStream, RenderStream
//! ├── models/       ← LoopbackError, EngineState, LoopbackConfiguration, StreamFormat, etc.
//! ├── processing/   ← FrameRingBuffer
//! ├── session/      ← negotiate, LoopbackContext, LoopbackEngine
//! └── backend/      ← MockBackend (scripted, hardware-free)
//! ```

pub mod backend;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    Direction, EndpointInfo, EngineDiagnostics, ReferenceTime, StreamFormat, WakeReason, CHANNELS, REFTIMES_PER_SEC,
};
pub use models::config::LoopbackConfiguration;
pub use models::error::LoopbackError;
pub use models::state::EngineState;
pub use processing::ring_buffer::FrameRingBuffer;
pub use session::context::{LoopbackContext, NegotiatedStream};
pub use session::engine::{EngineMonitor, LoopbackEngine};
pub use session::negotiator::{initialize_aligned, negotiate};
pub use traits::backend::{AudioBackend, ExclusiveClient};
pub use traits::stream::{CaptureStream, RenderStream};
