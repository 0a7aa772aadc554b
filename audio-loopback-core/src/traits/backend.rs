use crate::models::audio_models::{Direction, ReferenceTime, StreamFormat, WakeReason};
use crate::models::error::LoopbackError;
use crate::traits::stream::{CaptureStream, RenderStream};

/// An activated audio client bound to one endpoint.
///
/// Every resource a backend hands out releases itself on drop; the
/// negotiator relies on that to unwind partial setups.
pub trait ExclusiveClient {
    /// OS signal type the client can be bound to.
    type Signal;

    /// Minimum period the device supports.
    fn device_period(&self) -> Result<ReferenceTime, LoopbackError>;

    /// Initialize in exclusive, event-driven mode with `period` as both the
    /// buffer duration and the periodicity.
    ///
    /// Must report a rejected period granularity as `BufferSizeNotAligned`.
    fn initialize(&mut self, period: ReferenceTime, format: &StreamFormat) -> Result<(), LoopbackError>;

    /// Buffer size in frames. Valid after `initialize`, and after an
    /// `initialize` rejected with `BufferSizeNotAligned`.
    fn buffer_size(&self) -> Result<u32, LoopbackError>;

    /// Have the device raise `signal` each time it has data or needs data.
    fn bind_signal(&mut self, signal: &Self::Signal) -> Result<(), LoopbackError>;

    fn start(&mut self) -> Result<(), LoopbackError>;

    fn stop(&mut self) -> Result<(), LoopbackError>;
}

/// Platform audio API used by the negotiator and the engine.
///
/// Implemented by:
/// - `WasapiBackend` (Windows)
/// - `MockBackend` (scripted, for tests)
pub trait AudioBackend {
    type Endpoint;
    type Signal;
    type Client: ExclusiveClient<Signal = Self::Signal>;
    type Capture: CaptureStream;
    type Render: RenderStream;

    /// First active endpoint of `direction` whose friendly name equals `name`
    /// exactly. Enumeration failures and misses both yield `DeviceNotFound`.
    fn resolve_endpoint(&self, direction: Direction, name: &str) -> Result<Self::Endpoint, LoopbackError>;

    /// Activate a fresh audio client on `endpoint`.
    fn activate(&self, endpoint: &Self::Endpoint) -> Result<Self::Client, LoopbackError>;

    fn capture_service(&self, client: &Self::Client) -> Result<Self::Capture, LoopbackError>;

    fn render_service(&self, client: &Self::Client) -> Result<Self::Render, LoopbackError>;

    /// Create an auto-reset signal for the stream of `direction`.
    fn create_signal(&self, direction: Direction) -> Result<Self::Signal, LoopbackError>;

    /// Block without timeout until either signal fires.
    fn wait(&self, capture: &Self::Signal, render: &Self::Signal) -> Result<WakeReason, LoopbackError>;
}
