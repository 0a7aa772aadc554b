use serde::{Deserialize, Serialize};

/// Capture endpoint bridged by the shipped binary.
pub const DEFAULT_CAPTURE_DEVICE: &str = "Broadcast Stream Mix (TC-Helicon GoXLR Mini)";

/// Render endpoint bridged by the shipped binary.
pub const DEFAULT_RENDER_DEVICE: &str = "TX-SR252 (NVIDIA High Definition Audio)";

/// Ten seconds of stereo frames at 48 kHz.
pub const DEFAULT_RING_CAPACITY_FRAMES: usize = 480_000;

/// Initial lead of the write cursor over the read cursor.
pub const DEFAULT_WRITE_AHEAD_FRAMES: usize = 400;

/// Configuration for a loopback bridge.
///
/// The defaults are the compile-time constants the binary runs with. The
/// stream format is fixed (`StreamFormat::LOOPBACK`) and deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopbackConfiguration {
    /// Exact friendly name of the capture endpoint (case-sensitive).
    pub capture_device_name: String,

    /// Exact friendly name of the render endpoint (case-sensitive).
    pub render_device_name: String,

    /// Ring buffer capacity in frames (default: 480000).
    pub ring_capacity_frames: usize,

    /// Frames the write cursor starts ahead of the read cursor (default: 400).
    pub write_ahead_frames: usize,
}

impl LoopbackConfiguration {
    pub fn new(capture_device_name: impl Into<String>, render_device_name: impl Into<String>) -> Self {
        Self {
            capture_device_name: capture_device_name.into(),
            render_device_name: render_device_name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capture_device_name.is_empty() {
            return Err("capture device name must not be empty".into());
        }
        if self.render_device_name.is_empty() {
            return Err("render device name must not be empty".into());
        }
        if self.ring_capacity_frames == 0 {
            return Err("ring capacity must be positive".into());
        }
        if self.write_ahead_frames >= self.ring_capacity_frames {
            return Err(format!(
                "write-ahead of {} frames must be smaller than the ring capacity of {} frames",
                self.write_ahead_frames, self.ring_capacity_frames
            ));
        }
        Ok(())
    }
}

impl Default for LoopbackConfiguration {
    fn default() -> Self {
        Self {
            capture_device_name: DEFAULT_CAPTURE_DEVICE.into(),
            render_device_name: DEFAULT_RENDER_DEVICE.into(),
            ring_capacity_frames: DEFAULT_RING_CAPACITY_FRAMES,
            write_ahead_frames: DEFAULT_WRITE_AHEAD_FRAMES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LoopbackConfiguration::default();
        assert_eq!(config.ring_capacity_frames, 480_000);
        assert_eq!(config.write_ahead_frames, 400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_names() {
        let config = LoopbackConfiguration::new("", "Speakers");
        assert!(config.validate().is_err());

        let config = LoopbackConfiguration::new("Line In", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_write_ahead_at_or_beyond_capacity() {
        let mut config = LoopbackConfiguration::new("Line In", "Speakers");
        config.ring_capacity_frames = 400;
        assert!(config.validate().is_err());

        config.ring_capacity_frames = 0;
        config.write_ahead_frames = 0;
        assert!(config.validate().is_err());

        config.ring_capacity_frames = 401;
        config.write_ahead_frames = 400;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let json = r#"{"captureDeviceName":"Line In","renderDeviceName":"Speakers"}"#;
        let config: LoopbackConfiguration = serde_json::from_str(json).unwrap();

        assert_eq!(config.capture_device_name, "Line In");
        assert_eq!(config.render_device_name, "Speakers");
        assert_eq!(config.ring_capacity_frames, DEFAULT_RING_CAPACITY_FRAMES);
        assert_eq!(config.write_ahead_frames, DEFAULT_WRITE_AHEAD_FRAMES);
    }
}
