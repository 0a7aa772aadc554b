use crate::models::error::LoopbackError;

/// Packet-oriented reader over an initialized exclusive-mode capture stream.
///
/// Implemented by:
/// - `WasapiCaptureStream` (Windows, `IAudioCaptureClient`)
/// - `MockCaptureStream` (scripted, for tests)
pub trait CaptureStream {
    /// Frames in the next queued packet, or 0 when the device queue is empty.
    fn next_packet_size(&mut self) -> Result<u32, LoopbackError>;

    /// Acquire the next packet, hand its interleaved 16-bit samples to `sink`,
    /// then release the packet back to the device.
    ///
    /// Returns the number of frames delivered. An acquire failure is reported as
    /// `BufferAcquireFailed` and leaves the packet queued.
    fn read_packet(&mut self, sink: &mut dyn FnMut(&[i16])) -> Result<u32, LoopbackError>;
}

/// Period-oriented writer over an initialized exclusive-mode render stream.
///
/// Implemented by:
/// - `WasapiRenderStream` (Windows, `IAudioRenderClient`)
/// - `MockRenderStream` (scripted, for tests)
pub trait RenderStream {
    /// Acquire a device buffer of `frames` frames, let `source` fill all of its
    /// interleaved samples, then release it to the device.
    ///
    /// A failed acquire is reported as `BufferAcquireFailed` and `source` is not
    /// called. A failed release is reported as `BufferReleaseFailed`.
    fn write_period(&mut self, frames: u32, source: &mut dyn FnMut(&mut [i16])) -> Result<(), LoopbackError>;
}
