//! `audio-loopback`: bridge the configured capture endpoint to the configured
//! render endpoint until killed.
//!
//! Exits non-zero on any negotiation failure or fatal render error.

use std::process::ExitCode;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(target_os = "windows")]
fn log_diagnostics(monitor: &audio_loopback_core::EngineMonitor) {
    match serde_json::to_string(&monitor.diagnostics()) {
        Ok(json) => log::info!("Engine diagnostics: {}", json),
        Err(e) => log::warn!("Failed to serialize diagnostics: {}", e),
    }
}

#[cfg(target_os = "windows")]
fn run() -> Result<(), audio_loopback_core::LoopbackError> {
    use audio_loopback_core::{negotiate, LoopbackConfiguration, LoopbackEngine};
    use audio_loopback_windows::WasapiBackend;

    let config = LoopbackConfiguration::default();
    let backend = WasapiBackend::new()?;
    let context = negotiate(backend, &config)?;
    let engine = LoopbackEngine::new(context, &config)?;
    let monitor = engine.monitor();

    let outcome = engine.run();
    log_diagnostics(&monitor);
    outcome
}

#[cfg(target_os = "windows")]
fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("audio-loopback failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn main() -> ExitCode {
    init_logging();
    log::error!("audio-loopback requires Windows (WASAPI exclusive mode)");
    ExitCode::FAILURE
}
