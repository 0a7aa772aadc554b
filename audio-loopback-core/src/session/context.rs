use crate::models::audio_models::{Direction, ReferenceTime, StreamFormat, WakeReason};
use crate::models::error::LoopbackError;
use crate::traits::backend::{AudioBackend, ExclusiveClient};

/// An initialized exclusive-mode client plus the period it was accepted with.
///
/// `stop` is a no-op unless the stream is running, so teardown may call it
/// any number of times. A running stream is stopped when dropped.
pub struct NegotiatedStream<C: ExclusiveClient> {
    client: C,
    direction: Direction,
    period: ReferenceTime,
    started: bool,
}

impl<C: ExclusiveClient> NegotiatedStream<C> {
    pub(crate) fn new(client: C, direction: Direction, period: ReferenceTime) -> Self {
        Self {
            client,
            direction,
            period,
            started: false,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Period the device accepted, in 100ns units.
    pub fn period(&self) -> ReferenceTime {
        self.period
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self) -> Result<(), LoopbackError> {
        if self.started {
            return Ok(());
        }
        self.client.start()?;
        self.started = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), LoopbackError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.client.stop()
    }
}

impl<C: ExclusiveClient> Drop for NegotiatedStream<C> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Failed to stop {} stream: {}", self.direction, e);
        }
    }
}

/// Everything negotiation acquired, owned in one place.
///
/// Built by `negotiate` and moved into the `LoopbackEngine`. Dropping it
/// stops both streams and then releases resources in reverse acquisition
/// order: signals, services, clients, endpoints, and the backend last.
pub struct LoopbackContext<B: AudioBackend> {
    // Field order is drop order.
    pub(crate) render_signal: B::Signal,
    pub(crate) capture_signal: B::Signal,
    pub(crate) render_service: B::Render,
    pub(crate) capture_service: B::Capture,
    pub(crate) render: NegotiatedStream<B::Client>,
    pub(crate) capture: NegotiatedStream<B::Client>,
    pub(crate) render_endpoint: B::Endpoint,
    pub(crate) capture_endpoint: B::Endpoint,
    pub(crate) render_frames: u32,
    pub(crate) format: StreamFormat,
    pub(crate) backend: B,
}

impl<B: AudioBackend> LoopbackContext<B> {
    /// Format shared by both streams.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Frames moved into the render device on every render wake.
    pub fn render_frames(&self) -> u32 {
        self.render_frames
    }

    pub fn capture_period(&self) -> ReferenceTime {
        self.capture.period()
    }

    pub fn render_period(&self) -> ReferenceTime {
        self.render.period()
    }

    pub fn capture_endpoint(&self) -> &B::Endpoint {
        &self.capture_endpoint
    }

    pub fn render_endpoint(&self) -> &B::Endpoint {
        &self.render_endpoint
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Start capture, then render.
    pub(crate) fn start_streams(&mut self) -> Result<(), LoopbackError> {
        self.capture.start()?;
        self.render.start()
    }

    /// Stop whichever streams are running. Failures are logged; teardown continues.
    pub(crate) fn stop_streams(&mut self) {
        for stream in [&mut self.capture, &mut self.render] {
            if let Err(e) = stream.stop() {
                log::warn!("Failed to stop {} stream: {}", stream.direction(), e);
            }
        }
    }

    pub(crate) fn wait(&self) -> Result<WakeReason, LoopbackError> {
        self.backend.wait(&self.capture_signal, &self.render_signal)
    }
}

impl<B: AudioBackend> Drop for LoopbackContext<B> {
    fn drop(&mut self) {
        self.stop_streams();
    }
}
