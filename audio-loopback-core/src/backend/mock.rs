//! Scripted in-memory backend for running the negotiator and the engine
//! without audio hardware.
//!
//! Every resource the backend hands out is recorded in an event log when it
//! is acquired and when it is released, so tests can check teardown order.
//!
//! ```
//! use audio_loopback_core::backend::mock::{MockBackend, MockScript, MockWake};
//! use audio_loopback_core::{negotiate, LoopbackConfiguration, LoopbackEngine};
//!
//! let mut script = MockScript::new("Line In", "Speakers");
//! script.wakes = vec![MockWake::Capture(vec![vec![1, -1, 2, -2]]), MockWake::Render];
//! let (backend, probe) = MockBackend::new(script);
//!
//! let config = LoopbackConfiguration::new("Line In", "Speakers");
//! let engine = LoopbackEngine::new(negotiate(backend, &config).unwrap(), &config).unwrap();
//! probe.stop_when_exhausted(engine.monitor());
//! engine.run().unwrap();
//!
//! assert!(probe.outstanding().is_empty());
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{Direction, ReferenceTime, StreamFormat, WakeReason, CHANNELS};
use crate::models::error::LoopbackError;
use crate::session::engine::EngineMonitor;
use crate::traits::backend::{AudioBackend, ExclusiveClient};
use crate::traits::stream::{CaptureStream, RenderStream};

/// A negotiation or start step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockStep {
    Resolve(Direction),
    Activate(Direction),
    DevicePeriod(Direction),
    Initialize(Direction),
    BufferSize(Direction),
    Service(Direction),
    CreateSignal(Direction),
    BindSignal(Direction),
    Start(Direction),
}

/// One scripted return from `wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockWake {
    /// Queue these interleaved packets, then report `CaptureReady`.
    Capture(Vec<Vec<i16>>),
    Render,
    Other,
}

/// Something observable the backend did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Acquired(String),
    Released(String),
    Initialized {
        direction: Direction,
        period: ReferenceTime,
        format: StreamFormat,
    },
    Started(Direction),
    Stopped(Direction),
}

/// Devices, device behaviour and injected failures for one mock run.
#[derive(Debug, Clone)]
pub struct MockScript {
    pub capture_devices: Vec<String>,
    pub render_devices: Vec<String>,
    pub capture_period: ReferenceTime,
    pub render_period: ReferenceTime,
    /// Render buffer size reported both before and after realignment.
    pub render_buffer_frames: u32,
    /// Render `initialize` calls that are rejected as misaligned before one succeeds.
    pub render_misalignments: usize,
    pub fail_at: Option<MockStep>,
    /// Capture acquires that fail before acquires start succeeding.
    pub capture_acquire_failures: usize,
    /// Render acquires that fail before acquires start succeeding.
    pub render_acquire_failures: usize,
    /// Zero-based index of the rendered period whose release fails.
    pub render_release_failure_at: Option<usize>,
    pub wakes: Vec<MockWake>,
}

impl MockScript {
    /// Two active devices per direction, one of which carries the given name.
    pub fn new(capture_name: &str, render_name: &str) -> Self {
        Self {
            capture_devices: vec!["Microphone (USB Audio Device)".into(), capture_name.into()],
            render_devices: vec![render_name.into(), "Headphones (USB Audio Device)".into()],
            capture_period: 30_000,
            render_period: 30_000,
            render_buffer_frames: 144,
            render_misalignments: 0,
            fail_at: None,
            capture_acquire_failures: 0,
            render_acquire_failures: 0,
            render_release_failure_at: None,
            wakes: Vec::new(),
        }
    }
}

struct MockShared {
    script: MockScript,
    events: Vec<MockEvent>,
    outstanding: Vec<String>,
    wakes: VecDeque<MockWake>,
    packets: VecDeque<Vec<i16>>,
    rendered: Vec<i16>,
    render_periods: usize,
    stop: Option<EngineMonitor>,
}

impl MockShared {
    fn fails(&self, step: MockStep) -> bool {
        self.script.fail_at == Some(step)
    }
}

type Shared = Arc<Mutex<MockShared>>;

/// A named resource that logs its own release exactly once.
pub struct MockResource {
    name: String,
    shared: Shared,
    released: bool,
}

impl MockResource {
    fn acquire(shared: &Shared, name: String) -> Self {
        {
            let mut s = shared.lock();
            s.events.push(MockEvent::Acquired(name.clone()));
            s.outstanding.push(name.clone());
        }
        Self {
            name,
            shared: Arc::clone(shared),
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the resource. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut s = self.shared.lock();
        s.events.push(MockEvent::Released(self.name.clone()));
        if let Some(pos) = s.outstanding.iter().rposition(|n| *n == self.name) {
            s.outstanding.remove(pos);
        }
    }
}

impl Drop for MockResource {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct MockEndpoint {
    direction: Direction,
    _resource: MockResource,
}

pub struct MockClient {
    direction: Direction,
    shared: Shared,
    _resource: MockResource,
}

impl ExclusiveClient for MockClient {
    type Signal = MockResource;

    fn device_period(&self) -> Result<ReferenceTime, LoopbackError> {
        let s = self.shared.lock();
        if s.fails(MockStep::DevicePeriod(self.direction)) {
            return Err(LoopbackError::InitializationFailed("GetDevicePeriod failed".into()));
        }
        Ok(match self.direction {
            Direction::Capture => s.script.capture_period,
            Direction::Render => s.script.render_period,
        })
    }

    fn initialize(&mut self, period: ReferenceTime, format: &StreamFormat) -> Result<(), LoopbackError> {
        let mut s = self.shared.lock();
        s.events.push(MockEvent::Initialized {
            direction: self.direction,
            period,
            format: *format,
        });

        if s.fails(MockStep::Initialize(self.direction)) {
            return Err(LoopbackError::InitializationFailed("Initialize failed".into()));
        }
        if self.direction == Direction::Render && s.script.render_misalignments > 0 {
            s.script.render_misalignments -= 1;
            return Err(LoopbackError::BufferSizeNotAligned);
        }
        Ok(())
    }

    fn buffer_size(&self) -> Result<u32, LoopbackError> {
        let s = self.shared.lock();
        if s.fails(MockStep::BufferSize(self.direction)) {
            return Err(LoopbackError::InitializationFailed("GetBufferSize failed".into()));
        }
        Ok(match self.direction {
            Direction::Capture => StreamFormat::LOOPBACK.frames_for_period(s.script.capture_period),
            Direction::Render => s.script.render_buffer_frames,
        })
    }

    fn bind_signal(&mut self, _signal: &MockResource) -> Result<(), LoopbackError> {
        if self.shared.lock().fails(MockStep::BindSignal(self.direction)) {
            return Err(LoopbackError::SignalCreationFailed("SetEventHandle failed".into()));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), LoopbackError> {
        let mut s = self.shared.lock();
        if s.fails(MockStep::Start(self.direction)) {
            return Err(LoopbackError::StartFailed(format!("{} Start failed", self.direction)));
        }
        s.events.push(MockEvent::Started(self.direction));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LoopbackError> {
        self.shared.lock().events.push(MockEvent::Stopped(self.direction));
        Ok(())
    }
}

pub struct MockCaptureStream {
    shared: Shared,
    _resource: MockResource,
}

impl CaptureStream for MockCaptureStream {
    /// An empty queued packet is consumed by the query that reports it.
    fn next_packet_size(&mut self) -> Result<u32, LoopbackError> {
        let mut s = self.shared.lock();
        match s.packets.front() {
            Some(packet) if packet.is_empty() => {
                s.packets.pop_front();
                Ok(0)
            }
            Some(packet) => Ok((packet.len() / CHANNELS) as u32),
            None => Ok(0),
        }
    }

    fn read_packet(&mut self, sink: &mut dyn FnMut(&[i16])) -> Result<u32, LoopbackError> {
        let packet = {
            let mut s = self.shared.lock();
            if s.script.capture_acquire_failures > 0 {
                s.script.capture_acquire_failures -= 1;
                return Err(LoopbackError::BufferAcquireFailed("capture GetBuffer failed".into()));
            }
            s.packets.pop_front().unwrap_or_default()
        };

        sink(&packet);
        Ok((packet.len() / CHANNELS) as u32)
    }
}

pub struct MockRenderStream {
    shared: Shared,
    _resource: MockResource,
}

impl RenderStream for MockRenderStream {
    fn write_period(&mut self, frames: u32, source: &mut dyn FnMut(&mut [i16])) -> Result<(), LoopbackError> {
        let index = {
            let mut s = self.shared.lock();
            if s.script.render_acquire_failures > 0 {
                s.script.render_acquire_failures -= 1;
                return Err(LoopbackError::BufferAcquireFailed("render GetBuffer failed".into()));
            }
            s.render_periods += 1;
            s.render_periods - 1
        };

        let mut buffer = vec![0i16; frames as usize * CHANNELS];
        source(&mut buffer);

        let mut s = self.shared.lock();
        s.rendered.extend_from_slice(&buffer);
        if s.script.render_release_failure_at == Some(index) {
            return Err(LoopbackError::BufferReleaseFailed("render ReleaseBuffer failed".into()));
        }
        Ok(())
    }
}

/// Scripted `AudioBackend`.
pub struct MockBackend {
    shared: Shared,
}

/// Test-side handle onto a `MockBackend`'s recorded state.
#[derive(Clone)]
pub struct MockProbe {
    shared: Shared,
}

impl MockBackend {
    pub fn new(script: MockScript) -> (Self, MockProbe) {
        let wakes = script.wakes.iter().cloned().collect();
        let shared = Arc::new(Mutex::new(MockShared {
            script,
            events: Vec::new(),
            outstanding: Vec::new(),
            wakes,
            packets: VecDeque::new(),
            rendered: Vec::new(),
            render_periods: 0,
            stop: None,
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockProbe { shared },
        )
    }
}

impl MockProbe {
    pub fn events(&self) -> Vec<MockEvent> {
        self.shared.lock().events.clone()
    }

    /// Names of resources acquired and not yet released, in acquisition order.
    pub fn outstanding(&self) -> Vec<String> {
        self.shared.lock().outstanding.clone()
    }

    /// Every sample handed to the render device so far.
    pub fn rendered(&self) -> Vec<i16> {
        self.shared.lock().rendered.clone()
    }

    /// Make packets available to the next capture pass.
    pub fn queue_capture(&self, packets: Vec<Vec<i16>>) {
        self.shared.lock().packets.extend(packets);
    }

    /// Once the wake script runs out, request a stop through `monitor` instead
    /// of failing the wait.
    pub fn stop_when_exhausted(&self, monitor: EngineMonitor) {
        self.shared.lock().stop = Some(monitor);
    }
}

impl AudioBackend for MockBackend {
    type Endpoint = MockEndpoint;
    type Signal = MockResource;
    type Client = MockClient;
    type Capture = MockCaptureStream;
    type Render = MockRenderStream;

    fn resolve_endpoint(&self, direction: Direction, name: &str) -> Result<MockEndpoint, LoopbackError> {
        let found = {
            let s = self.shared.lock();
            let devices = match direction {
                Direction::Capture => &s.script.capture_devices,
                Direction::Render => &s.script.render_devices,
            };
            !s.fails(MockStep::Resolve(direction)) && devices.iter().any(|d| d == name)
        };
        if !found {
            return Err(LoopbackError::DeviceNotFound {
                direction,
                name: name.to_string(),
            });
        }

        Ok(MockEndpoint {
            direction,
            _resource: MockResource::acquire(&self.shared, format!("{}-endpoint", direction)),
        })
    }

    fn activate(&self, endpoint: &MockEndpoint) -> Result<MockClient, LoopbackError> {
        let direction = endpoint.direction;
        if self.shared.lock().fails(MockStep::Activate(direction)) {
            return Err(LoopbackError::ActivationFailed(format!("{} Activate failed", direction)));
        }
        Ok(MockClient {
            direction,
            shared: Arc::clone(&self.shared),
            _resource: MockResource::acquire(&self.shared, format!("{}-client", direction)),
        })
    }

    fn capture_service(&self, _client: &MockClient) -> Result<MockCaptureStream, LoopbackError> {
        if self.shared.lock().fails(MockStep::Service(Direction::Capture)) {
            return Err(LoopbackError::InitializationFailed("GetService failed".into()));
        }
        Ok(MockCaptureStream {
            shared: Arc::clone(&self.shared),
            _resource: MockResource::acquire(&self.shared, "capture-service".into()),
        })
    }

    fn render_service(&self, _client: &MockClient) -> Result<MockRenderStream, LoopbackError> {
        if self.shared.lock().fails(MockStep::Service(Direction::Render)) {
            return Err(LoopbackError::InitializationFailed("GetService failed".into()));
        }
        Ok(MockRenderStream {
            shared: Arc::clone(&self.shared),
            _resource: MockResource::acquire(&self.shared, "render-service".into()),
        })
    }

    fn create_signal(&self, direction: Direction) -> Result<MockResource, LoopbackError> {
        if self.shared.lock().fails(MockStep::CreateSignal(direction)) {
            return Err(LoopbackError::SignalCreationFailed("CreateEvent failed".into()));
        }
        Ok(MockResource::acquire(&self.shared, format!("{}-signal", direction)))
    }

    fn wait(&self, _capture: &MockResource, _render: &MockResource) -> Result<WakeReason, LoopbackError> {
        let mut s = self.shared.lock();
        match s.wakes.pop_front() {
            Some(MockWake::Capture(packets)) => {
                s.packets.extend(packets);
                Ok(WakeReason::CaptureReady)
            }
            Some(MockWake::Render) => Ok(WakeReason::RenderReady),
            Some(MockWake::Other) => Ok(WakeReason::Other),
            None => match &s.stop {
                Some(monitor) => {
                    monitor.request_stop();
                    Ok(WakeReason::Other)
                }
                None => Err(LoopbackError::WaitFailed("wake script exhausted".into())),
            },
        }
    }
}
