//! Windows audio endpoint enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list active capture and render endpoints
//! with their friendly names, and to resolve an endpoint by exact name.

use windows::core::{BSTR, PWSTR};
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use audio_loopback_core::models::audio_models::{Direction, EndpointInfo};
use audio_loopback_core::models::error::LoopbackError;

/// Audio endpoint enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

fn data_flow(direction: Direction) -> EDataFlow {
    match direction {
        Direction::Capture => eCapture,
        Direction::Render => eRender,
    }
}

impl DeviceEnumerator {
    /// Create a new device enumerator.
    ///
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, LoopbackError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| LoopbackError::Unknown(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// List active endpoints of `direction`, in enumeration order.
    pub fn list_endpoints(&self, direction: Direction) -> Result<Vec<EndpointInfo>, LoopbackError> {
        let default_id = self.default_endpoint_id(direction);

        let endpoints = self
            .active_devices(direction)?
            .into_iter()
            .enumerate()
            .filter_map(|(i, device)| {
                let id = Self::device_id(&device)?;
                let name = Self::friendly_name(&device).unwrap_or_else(|| format!("Device {}", i));
                let is_default = default_id.as_deref() == Some(id.as_str());
                Some(EndpointInfo {
                    id,
                    name,
                    direction,
                    is_default,
                })
            })
            .collect();

        Ok(endpoints)
    }

    /// First active endpoint of `direction` whose friendly name equals `name`.
    ///
    /// The comparison is exact: case, whitespace and punctuation all count.
    /// Enumeration failures are reported as `DeviceNotFound` too.
    pub fn find_endpoint(&self, direction: Direction, name: &str) -> Result<IMMDevice, LoopbackError> {
        let not_found = || LoopbackError::DeviceNotFound {
            direction,
            name: name.to_string(),
        };

        let devices = self.active_devices(direction).map_err(|e| {
            log::error!("Could not enumerate {} endpoints: {}", direction, e);
            not_found()
        })?;

        devices
            .into_iter()
            .find(|device| Self::friendly_name(device).as_deref() == Some(name))
            .ok_or_else(not_found)
    }

    fn active_devices(&self, direction: Direction) -> Result<Vec<IMMDevice>, LoopbackError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow(direction), DEVICE_STATE_ACTIVE)
                .map_err(|e| LoopbackError::Unknown(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| LoopbackError::Unknown(format!("GetCount failed: {}", e)))?;

            Ok((0..count).filter_map(|i| collection.Item(i).ok()).collect())
        }
    }

    fn default_endpoint_id(&self, direction: Direction) -> Option<String> {
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(data_flow(direction), eConsole)
                .ok()
                .and_then(|device| Self::device_id(&device))
        }
    }

    fn device_id(device: &IMMDevice) -> Option<String> {
        unsafe {
            let raw: PWSTR = device.GetId().ok()?;
            let id = raw.to_string().ok();
            CoTaskMemFree(Some(raw.0 as *const _));
            id
        }
    }

    /// Read the PKEY_Device_FriendlyName property from a device.
    fn friendly_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ).ok()?;
            let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
            BSTR::try_from(&value).ok().map(|name| name.to_string())
        }
    }
}
