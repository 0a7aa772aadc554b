use std::fmt;

use serde::{Deserialize, Serialize};

/// Duration in 100-nanosecond units, as reported and accepted by the audio engine.
pub type ReferenceTime = i64;

/// Number of 100ns units in one second.
pub const REFTIMES_PER_SEC: i64 = 10_000_000;

/// Interleaved samples per frame (left + right).
pub const CHANNELS: usize = 2;

/// Data-flow direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Capture,
    Render,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::Render => f.write_str("render"),
        }
    }
}

/// An active audio endpoint as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointInfo {
    pub id: String,
    pub name: String,
    pub direction: Direction,
    pub is_default: bool,
}

/// PCM stream format shared by the capture and render streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl StreamFormat {
    /// 48 kHz, 16-bit signed integer PCM, stereo interleaved.
    pub const LOOPBACK: Self = Self {
        sample_rate: 48_000,
        bits_per_sample: 16,
        channels: CHANNELS as u16,
    };

    /// Bytes per frame.
    pub fn block_align(&self) -> u16 {
        self.bits_per_sample / 8 * self.channels
    }

    pub fn avg_bytes_per_sec(&self) -> u32 {
        u32::from(self.block_align()) * self.sample_rate
    }

    /// Period that covers exactly `frames` frames, rounded to the nearest 100ns unit.
    ///
    /// Used to realign a rejected exclusive-mode buffer request to the
    /// frame count the device reported.
    pub fn period_for_frames(&self, frames: u32) -> ReferenceTime {
        (REFTIMES_PER_SEC as f64 / f64::from(self.sample_rate) * f64::from(frames) + 0.5) as ReferenceTime
    }

    /// Whole frames contained in `period`.
    pub fn frames_for_period(&self, period: ReferenceTime) -> u32 {
        (period.max(0) as u64 * u64::from(self.sample_rate) / REFTIMES_PER_SEC as u64) as u32
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz / {}-bit PCM / {} ch",
            self.sample_rate, self.bits_per_sample, self.channels
        )
    }
}

/// Why the engine woke from its dual wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeReason {
    /// The capture device has packets queued.
    CaptureReady,
    /// The render device needs its next period.
    RenderReady,
    /// Anything else the wait reported. Ignored.
    Other,
}

/// Counters for observing a running engine.
///
/// Overrun/underrun counts are informational; the transfer paths never act on them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineDiagnostics {
    pub capture_wakes: u64,
    pub render_wakes: u64,
    pub other_wakes: u64,
    pub packets_captured: u64,
    pub frames_captured: u64,
    pub frames_rendered: u64,
    pub capture_acquire_failures: u64,
    pub render_acquire_failures: u64,
    pub overruns: u64,
    pub underruns: u64,
    pub write_head: usize,
    pub read_head: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_format_layout() {
        let format = StreamFormat::LOOPBACK;
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.avg_bytes_per_sec(), 192_000);
        assert_eq!(format.to_string(), "48000 Hz / 16-bit PCM / 2 ch");
    }

    #[test]
    fn period_for_frames_rounds_half_up() {
        let format = StreamFormat::LOOPBACK;
        assert_eq!(format.period_for_frames(480), 100_000);
        // 152 frames = 31666.67 units
        assert_eq!(format.period_for_frames(152), 31_667);
        assert_eq!(format.period_for_frames(0), 0);
    }

    #[test]
    fn frames_for_period_truncates() {
        let format = StreamFormat::LOOPBACK;
        assert_eq!(format.frames_for_period(100_000), 480);
        assert_eq!(format.frames_for_period(31_667), 152);
        assert_eq!(format.frames_for_period(-5), 0);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Capture.to_string(), "capture");
        assert_eq!(Direction::Render.to_string(), "render");
    }
}
