use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{EngineDiagnostics, WakeReason};
use crate::models::config::LoopbackConfiguration;
use crate::models::error::LoopbackError;
use crate::models::state::EngineState;
use crate::processing::ring_buffer::FrameRingBuffer;
use crate::session::context::LoopbackContext;
use crate::traits::backend::AudioBackend;
use crate::traits::stream::{CaptureStream, RenderStream};

/// State and counters shared with `EngineMonitor`s, protected by `parking_lot::Mutex`.
struct EngineStatus {
    state: EngineState,
    diagnostics: EngineDiagnostics,
}

/// Cloneable, thread-safe view of a loopback engine.
#[derive(Clone)]
pub struct EngineMonitor {
    status: Arc<Mutex<EngineStatus>>,
    stop_requested: Arc<AtomicBool>,
}

impl EngineMonitor {
    fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(EngineStatus {
                state: EngineState::Starting,
                diagnostics: EngineDiagnostics::default(),
            })),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> EngineState {
        self.status.lock().state.clone()
    }

    pub fn diagnostics(&self) -> EngineDiagnostics {
        self.status.lock().diagnostics.clone()
    }

    /// Ask the engine to stop. Observed after the next wake is dispatched,
    /// so it takes effect within one device period of a running stream.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Single-threaded, event-driven loopback from the capture stream to the
/// render stream through a `FrameRingBuffer`.
///
/// ```text
/// [capture signal] → capture pass → [ring writeHead] ··· [ring readHead] → render pass ← [render signal]
/// ```
///
/// The engine owns the negotiated context; dropping the engine tears
/// everything down.
pub struct LoopbackEngine<B: AudioBackend> {
    ring: FrameRingBuffer,
    context: LoopbackContext<B>,
    monitor: EngineMonitor,
}

impl<B: AudioBackend> LoopbackEngine<B> {
    pub fn new(context: LoopbackContext<B>, config: &LoopbackConfiguration) -> Result<Self, LoopbackError> {
        let ring = FrameRingBuffer::new(config.ring_capacity_frames, config.write_ahead_frames)?;
        let monitor = EngineMonitor::new();
        {
            let mut status = monitor.status.lock();
            status.diagnostics.write_head = ring.write_head();
            status.diagnostics.read_head = ring.read_head();
        }

        Ok(Self {
            ring,
            context,
            monitor,
        })
    }

    pub fn monitor(&self) -> EngineMonitor {
        self.monitor.clone()
    }

    pub fn state(&self) -> EngineState {
        self.monitor.state()
    }

    pub fn ring(&self) -> &FrameRingBuffer {
        &self.ring
    }

    pub fn context(&self) -> &LoopbackContext<B> {
        &self.context
    }

    /// Start capture, then render. Transitions: starting → running.
    ///
    /// On failure the engine stops whatever did start and becomes `Faulted`.
    pub fn start(&mut self) -> Result<(), LoopbackError> {
        self.set_state(EngineState::Starting);

        if let Err(e) = self.context.start_streams() {
            self.fault(e.clone());
            return Err(e);
        }

        log::info!(
            "Loopback running: {} frames per render period, {} frame cushion",
            self.context.render_frames(),
            self.ring.write_ahead()
        );
        self.set_state(EngineState::Running);
        Ok(())
    }

    /// Start, then wait and dispatch until a fault or a stop request.
    ///
    /// Both outcomes stop the streams before returning; the remaining
    /// resources are released when `self` drops at the end of this call.
    pub fn run(mut self) -> Result<(), LoopbackError> {
        self.start()?;

        let outcome = loop {
            if self.monitor.is_stop_requested() {
                break Ok(());
            }

            let reason = match self.context.wait() {
                Ok(reason) => reason,
                Err(e) => break Err(e),
            };

            if let Err(e) = self.dispatch(reason) {
                break Err(e);
            }
        };

        match &outcome {
            Ok(()) => self.shutdown(),
            Err(e) => self.fault(e.clone()),
        }
        outcome
    }

    /// Handle one wake. Only a fatal render failure returns an error.
    pub fn dispatch(&mut self, reason: WakeReason) -> Result<(), LoopbackError> {
        match reason {
            WakeReason::CaptureReady => {
                self.capture_pass();
                Ok(())
            }
            WakeReason::RenderReady => self.render_pass(),
            WakeReason::Other => {
                self.monitor.status.lock().diagnostics.other_wakes += 1;
                Ok(())
            }
        }
    }

    /// Drain every queued capture packet into the ring.
    ///
    /// A failed acquire is logged and the packet-size query is repeated; a
    /// failed packet-size query ends the pass until the next capture wake.
    fn capture_pass(&mut self) {
        let ring = &mut self.ring;
        let capture = &mut self.context.capture_service;

        let mut packets = 0u64;
        let mut frames = 0u64;
        let mut failures = 0u64;

        loop {
            match capture.next_packet_size() {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Capture packet size query failed: {}", e);
                    break;
                }
            }

            match capture.read_packet(&mut |samples: &[i16]| {
                ring.write_frames(samples);
            }) {
                Ok(n) => {
                    packets += 1;
                    frames += u64::from(n);
                }
                Err(e) => {
                    failures += 1;
                    log::warn!("Skipping capture packet: {}", e);
                }
            }
        }

        let mut status = self.monitor.status.lock();
        let d = &mut status.diagnostics;
        d.capture_wakes += 1;
        d.packets_captured += packets;
        d.frames_captured += frames;
        d.capture_acquire_failures += failures;
        d.write_head = self.ring.write_head();
        d.overruns = self.ring.overruns();
    }

    /// Move one negotiated period from the ring into the render device.
    fn render_pass(&mut self) -> Result<(), LoopbackError> {
        let frames = self.context.render_frames;
        let ring = &mut self.ring;

        let result = self
            .context
            .render_service
            .write_period(frames, &mut |out: &mut [i16]| {
                ring.read_frames(out);
            });

        let mut status = self.monitor.status.lock();
        let d = &mut status.diagnostics;
        d.render_wakes += 1;
        d.read_head = self.ring.read_head();
        d.underruns = self.ring.underruns();

        match result {
            Ok(()) => {
                d.frames_rendered += u64::from(frames);
                Ok(())
            }
            Err(LoopbackError::BufferAcquireFailed(msg)) => {
                d.render_acquire_failures += 1;
                log::warn!("Skipping render period: {}", msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // --- Internal helpers ---

    fn shutdown(&mut self) {
        log::info!("Loopback stopping");
        self.set_state(EngineState::Stopping);
        self.context.stop_streams();
    }

    fn fault(&mut self, error: LoopbackError) {
        log::error!("Loopback faulted: {}", error);
        self.context.stop_streams();
        self.set_state(EngineState::Faulted(error));
    }

    fn set_state(&self, state: EngineState) {
        self.monitor.status.lock().state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockEvent, MockProbe, MockScript, MockStep, MockWake};
    use crate::models::audio_models::Direction;
    use crate::session::negotiator::negotiate;

    const CAPTURE: &str = "Line In";
    const RENDER: &str = "Speakers";

    fn config(capacity: usize, write_ahead: usize) -> LoopbackConfiguration {
        let mut config = LoopbackConfiguration::new(CAPTURE, RENDER);
        config.ring_capacity_frames = capacity;
        config.write_ahead_frames = write_ahead;
        config
    }

    fn engine_with(
        script: MockScript,
        config: &LoopbackConfiguration,
    ) -> (LoopbackEngine<MockBackend>, MockProbe) {
        let (backend, probe) = MockBackend::new(script);
        let context = negotiate(backend, config).unwrap();
        (LoopbackEngine::new(context, config).unwrap(), probe)
    }

    fn packet(frames: usize, value: i16) -> Vec<i16> {
        vec![value; frames * 2]
    }

    #[test]
    fn start_runs_capture_before_render() {
        let (mut engine, probe) = engine_with(MockScript::new(CAPTURE, RENDER), &config(1000, 400));

        engine.start().unwrap();

        assert!(engine.state().is_running());
        let starts: Vec<_> = probe
            .events()
            .into_iter()
            .filter(|e| matches!(e, MockEvent::Started(_)))
            .collect();
        assert_eq!(
            starts,
            vec![
                MockEvent::Started(Direction::Capture),
                MockEvent::Started(Direction::Render)
            ]
        );
    }

    #[test]
    fn render_start_failure_faults_and_stops_capture() {
        let mut script = MockScript::new(CAPTURE, RENDER);
        script.fail_at = Some(MockStep::Start(Direction::Render));
        let (mut engine, probe) = engine_with(script, &config(1000, 400));

        let err = engine.start().err().unwrap();

        assert!(matches!(err, LoopbackError::StartFailed(_)));
        assert_eq!(engine.state(), EngineState::Faulted(err));
        assert!(probe.events().contains(&MockEvent::Stopped(Direction::Capture)));
        assert!(!probe.events().contains(&MockEvent::Stopped(Direction::Render)));
    }

    #[test]
    fn capture_wake_drains_all_queued_packets() {
        let (mut engine, probe) = engine_with(MockScript::new(CAPTURE, RENDER), &config(1000, 400));
        engine.start().unwrap();

        probe.queue_capture(vec![packet(10, 1), packet(0, 0), packet(480, 2), packet(33, 3)]);
        engine.dispatch(WakeReason::CaptureReady).unwrap();

        // The empty packet ends the drain; the rest waits for the next wake.
        assert_eq!(engine.ring().write_head(), 410);
        engine.dispatch(WakeReason::CaptureReady).unwrap();
        assert_eq!(engine.ring().write_head(), (400 + 10 + 480 + 33) % 1000);

        let diagnostics = engine.monitor().diagnostics();
        assert_eq!(diagnostics.capture_wakes, 2);
        assert_eq!(diagnostics.frames_captured, 523);
        assert_eq!(diagnostics.write_head, 923);
    }

    #[test]
    fn render_wake_pulls_one_negotiated_period() {
        let mut script = MockScript::new(CAPTURE, RENDER);
        script.render_buffer_frames = 96;
        let (mut engine, probe) = engine_with(script, &config(1000, 400));
        engine.start().unwrap();

        for m in 1..=25 {
            engine.dispatch(WakeReason::RenderReady).unwrap();
            assert_eq!(engine.ring().read_head(), (m * 96) % 1000);
        }
        assert_eq!(probe.rendered().len(), 25 * 96 * 2);
        assert_eq!(engine.monitor().diagnostics().frames_rendered, 25 * 96);
    }

    #[test]
    fn other_wake_is_ignored() {
        let (mut engine, _probe) = engine_with(MockScript::new(CAPTURE, RENDER), &config(1000, 400));
        engine.start().unwrap();

        engine.dispatch(WakeReason::Other).unwrap();

        assert_eq!(engine.ring().write_head(), 400);
        assert_eq!(engine.ring().read_head(), 0);
        assert_eq!(engine.monitor().diagnostics().other_wakes, 1);
    }

    #[test]
    fn capture_acquire_failure_is_skipped() {
        let mut script = MockScript::new(CAPTURE, RENDER);
        script.capture_acquire_failures = 2;
        let (mut engine, probe) = engine_with(script, &config(1000, 400));
        engine.start().unwrap();

        probe.queue_capture(vec![packet(20, 5)]);
        engine.dispatch(WakeReason::CaptureReady).unwrap();

        assert!(engine.state().is_running());
        assert_eq!(engine.ring().write_head(), 420);
        let diagnostics = engine.monitor().diagnostics();
        assert_eq!(diagnostics.capture_acquire_failures, 2);
        assert_eq!(diagnostics.packets_captured, 1);
    }

    #[test]
    fn render_acquire_failure_skips_the_period() {
        let mut script = MockScript::new(CAPTURE, RENDER);
        script.render_acquire_failures = 1;
        script.render_buffer_frames = 100;
        let (mut engine, _probe) = engine_with(script, &config(1000, 400));
        engine.start().unwrap();

        engine.dispatch(WakeReason::RenderReady).unwrap();
        assert_eq!(engine.ring().read_head(), 0);

        engine.dispatch(WakeReason::RenderReady).unwrap();
        assert_eq!(engine.ring().read_head(), 100);
        assert_eq!(engine.monitor().diagnostics().render_acquire_failures, 1);
    }

    #[test]
    fn render_release_failure_faults_the_run() {
        let mut script = MockScript::new(CAPTURE, RENDER);
        script.render_release_failure_at = Some(1);
        script.wakes = vec![
            MockWake::Render,
            MockWake::Capture(vec![vec![1; 8]]),
            MockWake::Render,
            MockWake::Render,
        ];
        let (engine, probe) = engine_with(script, &config(1000, 400));
        let monitor = engine.monitor();

        let err = engine.run().err().unwrap();

        assert!(matches!(err, LoopbackError::BufferReleaseFailed(_)));
        assert_eq!(monitor.state(), EngineState::Faulted(err));
        assert_eq!(monitor.diagnostics().render_wakes, 2);
        assert!(probe.outstanding().is_empty());
        let events = probe.events();
        assert!(events.contains(&MockEvent::Stopped(Direction::Capture)));
        assert!(events.contains(&MockEvent::Stopped(Direction::Render)));
    }

    #[test]
    fn stop_request_ends_run_with_full_teardown() {
        let mut script = MockScript::new(CAPTURE, RENDER);
        script.wakes = vec![MockWake::Capture(vec![vec![7; 64]]), MockWake::Other, MockWake::Render];
        let (engine, probe) = engine_with(script, &config(1000, 400));
        let monitor = engine.monitor();
        probe.stop_when_exhausted(monitor.clone());

        engine.run().unwrap();

        assert_eq!(monitor.state(), EngineState::Stopping);
        let diagnostics = monitor.diagnostics();
        assert_eq!(diagnostics.capture_wakes, 1);
        assert_eq!(diagnostics.render_wakes, 1);
        assert_eq!(diagnostics.other_wakes, 2);

        let events = probe.events();
        let stop_capture = events
            .iter()
            .position(|e| *e == MockEvent::Stopped(Direction::Capture))
            .unwrap();
        let stop_render = events
            .iter()
            .position(|e| *e == MockEvent::Stopped(Direction::Render))
            .unwrap();
        let first_release = events
            .iter()
            .position(|e| matches!(e, MockEvent::Released(_)))
            .unwrap();
        assert!(stop_capture < stop_render);
        assert!(stop_render < first_release);
        assert!(probe.outstanding().is_empty());
    }

    #[test]
    fn exhausted_wait_without_stop_faults() {
        let (engine, _probe) = engine_with(MockScript::new(CAPTURE, RENDER), &config(1000, 400));
        let monitor = engine.monitor();

        let err = engine.run().err().unwrap();

        assert!(matches!(err, LoopbackError::WaitFailed(_)));
        assert!(monitor.state().is_terminal());
    }
}
