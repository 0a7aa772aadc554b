//! Exclusive-mode, event-driven `IAudioClient` wrappers.
//!
//! All interfaces here release themselves on drop (COM `Release` via the
//! `windows` crate), and event handles are closed by `EventSignal`.

use std::{ptr, slice};

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Media::Audio::*;

use audio_loopback_core::models::audio_models::{Direction, ReferenceTime, StreamFormat, CHANNELS};
use audio_loopback_core::models::error::LoopbackError;
use audio_loopback_core::traits::backend::ExclusiveClient;
use audio_loopback_core::traits::stream::{CaptureStream, RenderStream};

/// Auto-reset Win32 event the audio engine raises once per period.
pub struct EventSignal {
    handle: HANDLE,
}

impl EventSignal {
    pub(crate) fn new(handle: HANDLE) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> HANDLE {
        self.handle
    }

    /// Close the event handle. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.handle.is_invalid() {
            return;
        }
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            log::warn!("CloseHandle failed: {}", e);
        }
        self.handle = HANDLE::default();
    }
}

impl Drop for EventSignal {
    fn drop(&mut self) {
        self.close();
    }
}

/// `WAVEFORMATEX` for integer PCM.
fn wave_format(format: &StreamFormat) -> WAVEFORMATEX {
    WAVEFORMATEX {
        wFormatTag: WAVE_FORMAT_PCM as u16,
        nChannels: format.channels,
        nSamplesPerSec: format.sample_rate,
        nAvgBytesPerSec: format.avg_bytes_per_sec(),
        nBlockAlign: format.block_align(),
        wBitsPerSample: format.bits_per_sample,
        cbSize: 0,
    }
}

/// An activated `IAudioClient` for one endpoint.
pub struct WasapiClient {
    client: IAudioClient,
    direction: Direction,
}

impl WasapiClient {
    pub(crate) fn new(client: IAudioClient, direction: Direction) -> Self {
        Self { client, direction }
    }

    pub(crate) fn audio_client(&self) -> &IAudioClient {
        &self.client
    }
}

impl ExclusiveClient for WasapiClient {
    type Signal = EventSignal;

    fn device_period(&self) -> Result<ReferenceTime, LoopbackError> {
        let mut minimum: ReferenceTime = 0;
        unsafe { self.client.GetDevicePeriod(None, Some(&mut minimum)) }.map_err(|e| {
            LoopbackError::InitializationFailed(format!("{} GetDevicePeriod failed: {}", self.direction, e))
        })?;
        Ok(minimum)
    }

    fn initialize(&mut self, period: ReferenceTime, format: &StreamFormat) -> Result<(), LoopbackError> {
        let wfx = wave_format(format);
        let result = unsafe {
            self.client.Initialize(
                AUDCLNT_SHAREMODE_EXCLUSIVE,
                AUDCLNT_STREAMFLAGS_EVENTCALLBACK,
                period,
                period,
                &wfx,
                None,
            )
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.code() == AUDCLNT_E_BUFFER_SIZE_NOT_ALIGNED => Err(LoopbackError::BufferSizeNotAligned),
            Err(e) => Err(LoopbackError::InitializationFailed(format!(
                "{} IAudioClient::Initialize failed: {}",
                self.direction, e
            ))),
        }
    }

    fn buffer_size(&self) -> Result<u32, LoopbackError> {
        unsafe { self.client.GetBufferSize() }.map_err(|e| {
            LoopbackError::InitializationFailed(format!("{} GetBufferSize failed: {}", self.direction, e))
        })
    }

    fn bind_signal(&mut self, signal: &EventSignal) -> Result<(), LoopbackError> {
        unsafe { self.client.SetEventHandle(signal.handle()) }.map_err(|e| {
            LoopbackError::SignalCreationFailed(format!("{} SetEventHandle failed: {}", self.direction, e))
        })
    }

    fn start(&mut self) -> Result<(), LoopbackError> {
        unsafe { self.client.Start() }
            .map_err(|e| LoopbackError::StartFailed(format!("{} IAudioClient::Start failed: {}", self.direction, e)))
    }

    fn stop(&mut self) -> Result<(), LoopbackError> {
        unsafe { self.client.Stop() }
            .map_err(|e| LoopbackError::Unknown(format!("{} IAudioClient::Stop failed: {}", self.direction, e)))
    }
}

/// `IAudioCaptureClient` reading 16-bit stereo packets.
pub struct WasapiCaptureStream {
    client: IAudioCaptureClient,
    silence: Vec<i16>,
}

impl WasapiCaptureStream {
    pub(crate) fn new(client: IAudioCaptureClient) -> Self {
        Self {
            client,
            silence: Vec::new(),
        }
    }
}

impl CaptureStream for WasapiCaptureStream {
    fn next_packet_size(&mut self) -> Result<u32, LoopbackError> {
        unsafe { self.client.GetNextPacketSize() }
            .map_err(|e| LoopbackError::Unknown(format!("GetNextPacketSize failed: {}", e)))
    }

    fn read_packet(&mut self, sink: &mut dyn FnMut(&[i16])) -> Result<u32, LoopbackError> {
        let mut data: *mut u8 = ptr::null_mut();
        let mut frames: u32 = 0;
        let mut flags: u32 = 0;

        unsafe { self.client.GetBuffer(&mut data, &mut frames, &mut flags, None, None) }
            .map_err(|e| LoopbackError::BufferAcquireFailed(format!("capture GetBuffer failed: {}", e)))?;

        let samples = frames as usize * CHANNELS;
        if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 || data.is_null() {
            self.silence.clear();
            self.silence.resize(samples, 0);
            sink(&self.silence);
        } else {
            // SAFETY: the device hands out `frames` whole frames of the negotiated
            // 16-bit stereo format, valid until ReleaseBuffer.
            sink(unsafe { slice::from_raw_parts(data as *const i16, samples) });
        }

        unsafe { self.client.ReleaseBuffer(frames) }
            .map_err(|e| LoopbackError::BufferReleaseFailed(format!("capture ReleaseBuffer failed: {}", e)))?;
        Ok(frames)
    }
}

/// `IAudioRenderClient` writing 16-bit stereo periods.
pub struct WasapiRenderStream {
    client: IAudioRenderClient,
}

impl WasapiRenderStream {
    pub(crate) fn new(client: IAudioRenderClient) -> Self {
        Self { client }
    }
}

impl RenderStream for WasapiRenderStream {
    fn write_period(&mut self, frames: u32, source: &mut dyn FnMut(&mut [i16])) -> Result<(), LoopbackError> {
        let data = unsafe { self.client.GetBuffer(frames) }
            .map_err(|e| LoopbackError::BufferAcquireFailed(format!("render GetBuffer failed: {}", e)))?;

        // SAFETY: GetBuffer returned room for `frames` frames of the negotiated format.
        let out = unsafe { slice::from_raw_parts_mut(data as *mut i16, frames as usize * CHANNELS) };
        source(out);

        unsafe { self.client.ReleaseBuffer(frames, 0) }
            .map_err(|e| LoopbackError::BufferReleaseFailed(format!("render ReleaseBuffer failed: {}", e)))
    }
}
