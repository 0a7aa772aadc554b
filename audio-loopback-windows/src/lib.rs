//! # audio-loopback-windows
//!
//! Windows WASAPI backend for audio-loopback.
//!
//! Provides:
//! - `WasapiBackend`: `AudioBackend` over exclusive-mode, event-driven `IAudioClient`s
//! - `DeviceEnumerator`: endpoint listing and exact-name resolution via the MMDevice API
//! - `ComGuard` / `MmcssRegistration`: per-thread COM apartment and "Pro Audio" scheduling
//!
//! ## Platform Requirements
//! - Endpoints that accept 48 kHz / 16-bit / stereo PCM in exclusive mode
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use audio_loopback_core::{negotiate, LoopbackConfiguration, LoopbackEngine};
//! use audio_loopback_windows::WasapiBackend;
//!
//! let config = LoopbackConfiguration::default();
//! let context = negotiate(WasapiBackend::new()?, &config)?;
//! LoopbackEngine::new(context, &config)?.run()?;
//! ```

#[cfg(target_os = "windows")]
pub mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_backend;
#[cfg(target_os = "windows")]
pub mod wasapi_client;

#[cfg(target_os = "windows")]
pub use com::{ComGuard, MmcssRegistration};
#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_backend::{WasapiBackend, WasapiEndpoint};
#[cfg(target_os = "windows")]
pub use wasapi_client::{EventSignal, WasapiCaptureStream, WasapiClient, WasapiRenderStream};
