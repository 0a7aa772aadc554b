//! WASAPI implementation of `AudioBackend`.

use windows::core::PCWSTR;
use windows::Win32::Foundation::{GetLastError, WAIT_FAILED, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::CLSCTX_ALL;
use windows::Win32::System::Threading::{CreateEventW, WaitForMultipleObjects, INFINITE};

use audio_loopback_core::models::audio_models::{Direction, WakeReason};
use audio_loopback_core::models::error::LoopbackError;
use audio_loopback_core::traits::backend::AudioBackend;

use crate::com::{ComGuard, MmcssRegistration};
use crate::device_enumerator::DeviceEnumerator;
use crate::wasapi_client::{EventSignal, WasapiCaptureStream, WasapiClient, WasapiRenderStream};

/// A resolved endpoint.
pub struct WasapiEndpoint {
    device: IMMDevice,
    direction: Direction,
    name: String,
}

impl WasapiEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// WASAPI backend bound to the thread that created it.
///
/// Creating it initializes COM and registers the thread with MMCSS; both are
/// undone when it drops, after the enumerator is released. The negotiated
/// context keeps the backend as its last field, so every stream interface is
/// gone by then.
pub struct WasapiBackend {
    // Field order is drop order.
    enumerator: DeviceEnumerator,
    mmcss: Option<MmcssRegistration>,
    _com: ComGuard,
}

impl WasapiBackend {
    pub fn new() -> Result<Self, LoopbackError> {
        let com = ComGuard::initialize()?;
        let enumerator = DeviceEnumerator::new()?;
        let mmcss = MmcssRegistration::register();

        Ok(Self {
            enumerator,
            mmcss,
            _com: com,
        })
    }

    pub fn enumerator(&self) -> &DeviceEnumerator {
        &self.enumerator
    }

    pub fn is_pro_audio(&self) -> bool {
        self.mmcss.is_some()
    }

    fn log_available(&self, direction: Direction) {
        match self.enumerator.list_endpoints(direction) {
            Ok(endpoints) if endpoints.is_empty() => log::error!("No active {} endpoints", direction),
            Ok(endpoints) => {
                log::error!("Active {} endpoints:", direction);
                for endpoint in endpoints {
                    let marker = if endpoint.is_default { " (default)" } else { "" };
                    log::error!("  {:?}{}", endpoint.name, marker);
                }
            }
            Err(e) => log::error!("Could not list {} endpoints: {}", direction, e),
        }
    }
}

impl AudioBackend for WasapiBackend {
    type Endpoint = WasapiEndpoint;
    type Signal = EventSignal;
    type Client = WasapiClient;
    type Capture = WasapiCaptureStream;
    type Render = WasapiRenderStream;

    fn resolve_endpoint(&self, direction: Direction, name: &str) -> Result<WasapiEndpoint, LoopbackError> {
        match self.enumerator.find_endpoint(direction, name) {
            Ok(device) => Ok(WasapiEndpoint {
                device,
                direction,
                name: name.to_string(),
            }),
            Err(e) => {
                log::error!("{}", e);
                self.log_available(direction);
                Err(e)
            }
        }
    }

    fn activate(&self, endpoint: &WasapiEndpoint) -> Result<WasapiClient, LoopbackError> {
        let client: IAudioClient = unsafe { endpoint.device.Activate(CLSCTX_ALL, None) }.map_err(|e| {
            LoopbackError::ActivationFailed(format!("{} Activate failed for {:?}: {}", endpoint.direction, endpoint.name, e))
        })?;
        Ok(WasapiClient::new(client, endpoint.direction))
    }

    fn capture_service(&self, client: &WasapiClient) -> Result<WasapiCaptureStream, LoopbackError> {
        let service: IAudioCaptureClient = unsafe { client.audio_client().GetService() }
            .map_err(|e| LoopbackError::InitializationFailed(format!("capture GetService failed: {}", e)))?;
        Ok(WasapiCaptureStream::new(service))
    }

    fn render_service(&self, client: &WasapiClient) -> Result<WasapiRenderStream, LoopbackError> {
        let service: IAudioRenderClient = unsafe { client.audio_client().GetService() }
            .map_err(|e| LoopbackError::InitializationFailed(format!("render GetService failed: {}", e)))?;
        Ok(WasapiRenderStream::new(service))
    }

    fn create_signal(&self, direction: Direction) -> Result<EventSignal, LoopbackError> {
        let handle = unsafe { CreateEventW(None, false, false, PCWSTR::null()) }
            .map_err(|e| LoopbackError::SignalCreationFailed(format!("{} CreateEventW failed: {}", direction, e)))?;
        Ok(EventSignal::new(handle))
    }

    fn wait(&self, capture: &EventSignal, render: &EventSignal) -> Result<WakeReason, LoopbackError> {
        let handles = [capture.handle(), render.handle()];
        let result = unsafe { WaitForMultipleObjects(&handles, false, INFINITE) };

        if result == WAIT_OBJECT_0 {
            Ok(WakeReason::CaptureReady)
        } else if result.0 == WAIT_OBJECT_0.0 + 1 {
            Ok(WakeReason::RenderReady)
        } else if result == WAIT_FAILED {
            let code = unsafe { GetLastError() };
            Err(LoopbackError::WaitFailed(format!(
                "WaitForMultipleObjects failed: {:?}",
                code
            )))
        } else {
            Ok(WakeReason::Other)
        }
    }
}
