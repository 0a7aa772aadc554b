use crate::models::audio_models::{Direction, ReferenceTime, StreamFormat};
use crate::models::config::LoopbackConfiguration;
use crate::models::error::LoopbackError;
use crate::session::context::{LoopbackContext, NegotiatedStream};
use crate::traits::backend::{AudioBackend, ExclusiveClient};

/// Resolve both endpoints and bring up two exclusive, event-driven streams
/// sharing `StreamFormat::LOOPBACK`.
///
/// Sequence:
/// 1. Resolve capture and render endpoints by exact friendly name
/// 2. Activate a client on each
/// 3. Query each device's minimum period
/// 4. Initialize capture with its minimum period
/// 5. Initialize render with its minimum period, realigning once if rejected
/// 6. Read the accepted render buffer size
/// 7. Get the capture and render services
/// 8. Create one signal per stream and bind it
///
/// Any failure returns early; every resource acquired so far is a local and
/// drops in reverse order on the way out.
pub fn negotiate<B: AudioBackend>(
    backend: B,
    config: &LoopbackConfiguration,
) -> Result<LoopbackContext<B>, LoopbackError> {
    config.validate().map_err(LoopbackError::ConfigurationFailed)?;
    let format = StreamFormat::LOOPBACK;

    let capture_endpoint = backend.resolve_endpoint(Direction::Capture, &config.capture_device_name)?;
    let render_endpoint = backend.resolve_endpoint(Direction::Render, &config.render_device_name)?;
    log::info!(
        "Bridging {:?} -> {:?}",
        config.capture_device_name,
        config.render_device_name
    );

    let mut capture_client = backend.activate(&capture_endpoint)?;
    let render_client = backend.activate(&render_endpoint)?;

    let capture_period = capture_client.device_period()?;
    log::info!("Minimum period for capture device {}", capture_period);
    let render_period = render_client.device_period()?;
    log::info!("Minimum period for render device {}", render_period);

    capture_client.initialize(capture_period, &format)?;
    let (mut render_client, render_period) =
        initialize_aligned(&backend, &render_endpoint, render_client, render_period, &format)?;
    let render_frames = render_client.buffer_size()?;

    let capture_service = backend.capture_service(&capture_client)?;
    let render_service = backend.render_service(&render_client)?;
    log::info!(
        "Render stream accepted {} frames per period ({} units, {})",
        render_frames,
        render_period,
        format
    );

    let capture_signal = backend.create_signal(Direction::Capture)?;
    let render_signal = backend.create_signal(Direction::Render)?;
    capture_client.bind_signal(&capture_signal)?;
    render_client.bind_signal(&render_signal)?;

    Ok(LoopbackContext {
        render_signal,
        capture_signal,
        render_service,
        capture_service,
        render: NegotiatedStream::new(render_client, Direction::Render, render_period),
        capture: NegotiatedStream::new(capture_client, Direction::Capture, capture_period),
        render_endpoint,
        capture_endpoint,
        render_frames,
        format,
        backend,
    })
}

/// Initialize `client` with `period`, retrying exactly once if the device
/// rejects the period's buffer alignment.
///
/// The retry reads the device's buffer size, converts it back to a period,
/// and initializes a freshly activated client (a client whose `initialize`
/// failed cannot be initialized again). Returns the client that succeeded
/// and the period it accepted.
pub fn initialize_aligned<B: AudioBackend>(
    backend: &B,
    endpoint: &B::Endpoint,
    mut client: B::Client,
    period: ReferenceTime,
    format: &StreamFormat,
) -> Result<(B::Client, ReferenceTime), LoopbackError> {
    match client.initialize(period, format) {
        Ok(()) => return Ok((client, period)),
        Err(LoopbackError::BufferSizeNotAligned) => {}
        Err(e) => return Err(e),
    }

    let frames = client.buffer_size()?;
    let aligned = format.period_for_frames(frames);
    log::info!(
        "Aligning buffer size for render device {} ({} frames)",
        aligned,
        frames
    );
    drop(client);

    let mut client = backend.activate(endpoint)?;
    client.initialize(aligned, format).map_err(|e| match e {
        LoopbackError::BufferSizeNotAligned => LoopbackError::InitializationFailed(format!(
            "buffer still not aligned after realigning to {} frames",
            frames
        )),
        other => other,
    })?;
    Ok((client, aligned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockEvent, MockScript, MockStep};

    const CAPTURE: &str = "Line In (Test Interface)";
    const RENDER: &str = "Speakers (Test Interface)";

    fn config() -> LoopbackConfiguration {
        LoopbackConfiguration::new(CAPTURE, RENDER)
    }

    fn script() -> MockScript {
        MockScript::new(CAPTURE, RENDER)
    }

    fn initialized(events: &[MockEvent]) -> Vec<(Direction, ReferenceTime, StreamFormat)> {
        events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Initialized {
                    direction,
                    period,
                    format,
                } => Some((*direction, *period, *format)),
                _ => None,
            })
            .collect()
    }

    fn acquired(events: &[MockEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Acquired(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn released(events: &[MockEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Released(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn both_streams_share_the_loopback_format() {
        let (backend, probe) = MockBackend::new(script());
        let context = negotiate(backend, &config()).unwrap();

        assert_eq!(context.format(), StreamFormat::LOOPBACK);
        let inits = initialized(&probe.events());
        assert_eq!(inits.len(), 2);
        assert_eq!(inits[0].0, Direction::Capture);
        assert_eq!(inits[1].0, Direction::Render);
        assert_eq!(inits[0].2, inits[1].2);
        assert_eq!(inits[0].2.sample_rate, 48_000);
        assert_eq!(inits[0].2.bits_per_sample, 16);
        assert_eq!(inits[0].2.channels, 2);
    }

    #[test]
    fn streams_use_each_device_minimum_period() {
        let mut script = script();
        script.capture_period = 26_667;
        script.render_period = 30_000;
        script.render_buffer_frames = 144;
        let (backend, probe) = MockBackend::new(script);

        let context = negotiate(backend, &config()).unwrap();

        assert_eq!(context.capture_period(), 26_667);
        assert_eq!(context.render_period(), 30_000);
        assert_eq!(context.render_frames(), 144);
        let inits = initialized(&probe.events());
        assert_eq!(inits[0].1, 26_667);
        assert_eq!(inits[1].1, 30_000);
    }

    #[test]
    fn misaligned_render_retries_once_with_derived_period() {
        let mut script = script();
        script.render_period = 30_000;
        script.render_buffer_frames = 152;
        script.render_misalignments = 1;
        let (backend, probe) = MockBackend::new(script);

        let context = negotiate(backend, &config()).unwrap();

        let render_inits: Vec<_> = initialized(&probe.events())
            .into_iter()
            .filter(|(d, _, _)| *d == Direction::Render)
            .collect();
        assert_eq!(render_inits.len(), 2);
        assert_eq!(render_inits[0].1, 30_000);
        assert_eq!(render_inits[1].1, 31_667);
        assert_eq!(context.render_period(), 31_667);
        assert_eq!(context.render_frames(), 152);

        // The rejected client was released before a fresh one was activated.
        let events = probe.events();
        let released_at = events
            .iter()
            .position(|e| *e == MockEvent::Released("render-client".into()))
            .unwrap();
        let reacquired_at = events
            .iter()
            .rposition(|e| *e == MockEvent::Acquired("render-client".into()))
            .unwrap();
        assert!(released_at < reacquired_at);
    }

    #[test]
    fn second_misalignment_is_fatal() {
        let mut script = script();
        script.render_misalignments = 2;
        let (backend, probe) = MockBackend::new(script);

        let err = negotiate(backend, &config()).err().unwrap();

        assert!(matches!(err, LoopbackError::InitializationFailed(_)));
        let render_inits = initialized(&probe.events())
            .into_iter()
            .filter(|(d, _, _)| *d == Direction::Render)
            .count();
        assert_eq!(render_inits, 2);
        assert!(probe.outstanding().is_empty());
    }

    #[test]
    fn unknown_device_name_is_not_found() {
        let config = LoopbackConfiguration::new(CAPTURE, "Speakers (test interface)");
        let (backend, probe) = MockBackend::new(script());

        let err = negotiate(backend, &config).err().unwrap();

        assert_eq!(
            err,
            LoopbackError::DeviceNotFound {
                direction: Direction::Render,
                name: "Speakers (test interface)".into(),
            }
        );
        assert_eq!(released(&probe.events()), vec!["capture-endpoint"]);
    }

    #[test]
    fn failed_enumeration_is_not_found() {
        let mut script = script();
        script.fail_at = Some(MockStep::Resolve(Direction::Capture));
        let (backend, _probe) = MockBackend::new(script);

        let err = negotiate(backend, &config()).err().unwrap();
        assert!(matches!(
            err,
            LoopbackError::DeviceNotFound {
                direction: Direction::Capture,
                ..
            }
        ));
    }

    #[test]
    fn invalid_configuration_acquires_nothing() {
        let (backend, probe) = MockBackend::new(script());
        let err = negotiate(backend, &LoopbackConfiguration::new("", RENDER)).err().unwrap();

        assert!(matches!(err, LoopbackError::ConfigurationFailed(_)));
        assert!(probe.events().is_empty());
    }

    #[test]
    fn failure_at_each_step_releases_only_prior_acquisitions_in_reverse() {
        let steps = [
            MockStep::Resolve(Direction::Capture),
            MockStep::Resolve(Direction::Render),
            MockStep::Activate(Direction::Capture),
            MockStep::Activate(Direction::Render),
            MockStep::DevicePeriod(Direction::Capture),
            MockStep::DevicePeriod(Direction::Render),
            MockStep::Initialize(Direction::Capture),
            MockStep::Initialize(Direction::Render),
            MockStep::BufferSize(Direction::Render),
            MockStep::Service(Direction::Capture),
            MockStep::Service(Direction::Render),
            MockStep::CreateSignal(Direction::Capture),
            MockStep::CreateSignal(Direction::Render),
            MockStep::BindSignal(Direction::Capture),
            MockStep::BindSignal(Direction::Render),
        ];

        for step in steps {
            let mut script = script();
            script.fail_at = Some(step);
            let (backend, probe) = MockBackend::new(script);

            assert!(negotiate(backend, &config()).is_err(), "{:?} should fail", step);

            let events = probe.events();
            let mut expected = acquired(&events);
            expected.reverse();
            assert_eq!(released(&events), expected, "teardown after {:?}", step);
            assert!(probe.outstanding().is_empty(), "leak after {:?}", step);
        }
    }

    #[test]
    fn dropping_context_releases_everything_in_reverse() {
        let (backend, probe) = MockBackend::new(script());
        let context = negotiate(backend, &config()).unwrap();
        assert_eq!(probe.outstanding().len(), 8);

        drop(context);

        let events = probe.events();
        let mut expected = acquired(&events);
        expected.reverse();
        assert_eq!(released(&events), expected);
        assert!(probe.outstanding().is_empty());
    }
}
