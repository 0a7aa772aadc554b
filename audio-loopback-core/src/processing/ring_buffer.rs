use crate::models::audio_models::CHANNELS;
use crate::models::error::LoopbackError;

/// Fixed-capacity circular store of interleaved stereo 16-bit frames.
///
/// The write cursor is advanced only by the capture path and the read cursor
/// only by the render path. Both wrap independently at `capacity`. The write
/// cursor starts `write_ahead` frames in front of the read cursor; nothing
/// stops either cursor from lapping the other. Laps are counted as overruns
/// (writer passed reader) and underruns (reader passed writer) but the data
/// is copied regardless.
///
/// Not synchronized: both paths must run on the same thread.
#[derive(Debug)]
pub struct FrameRingBuffer {
    samples: Vec<i16>,
    capacity: usize,
    write_ahead: usize,
    write_head: usize,
    read_head: usize,
    frames_written: u64,
    frames_read: u64,
    overruns: u64,
    underruns: u64,
}

impl FrameRingBuffer {
    /// Create a zero-filled buffer of `capacity` frames with the write cursor
    /// `write_ahead` frames ahead of the read cursor.
    pub fn new(capacity: usize, write_ahead: usize) -> Result<Self, LoopbackError> {
        if capacity == 0 {
            return Err(LoopbackError::ConfigurationFailed(
                "ring capacity must be positive".into(),
            ));
        }
        if write_ahead >= capacity {
            return Err(LoopbackError::ConfigurationFailed(format!(
                "write-ahead {} does not fit a ring of {} frames",
                write_ahead, capacity
            )));
        }

        Ok(Self {
            samples: vec![0; capacity * CHANNELS],
            capacity,
            write_ahead,
            write_head: write_ahead,
            read_head: 0,
            frames_written: 0,
            frames_read: 0,
            overruns: 0,
            underruns: 0,
        })
    }

    /// Copy interleaved frames in at the write cursor, one frame at a time.
    ///
    /// A trailing odd sample is ignored. Returns the number of frames written.
    pub fn write_frames(&mut self, interleaved: &[i16]) -> usize {
        let mut written = 0;
        for frame in interleaved.chunks_exact(CHANNELS) {
            let base = self.write_head * CHANNELS;
            self.samples[base..base + CHANNELS].copy_from_slice(frame);
            self.write_head = self.advance(self.write_head);
            written += 1;
        }

        if written > 0 {
            self.frames_written += written as u64;
            if self.lead() > self.capacity as i64 {
                self.overruns += 1;
            }
        }
        written
    }

    /// Fill `out` with interleaved frames from the read cursor, one frame at a time.
    ///
    /// Returns the number of frames read.
    pub fn read_frames(&mut self, out: &mut [i16]) -> usize {
        let mut read = 0;
        for frame in out.chunks_exact_mut(CHANNELS) {
            let base = self.read_head * CHANNELS;
            frame.copy_from_slice(&self.samples[base..base + CHANNELS]);
            self.read_head = self.advance(self.read_head);
            read += 1;
        }

        if read > 0 {
            self.frames_read += read as u64;
            if self.lead() < 0 {
                self.underruns += 1;
            }
        }
        read
    }

    /// Next cursor position; `capacity - 1` wraps to `0`.
    fn advance(&self, head: usize) -> usize {
        let next = head + 1;
        if next >= self.capacity {
            0
        } else {
            next
        }
    }

    /// Frames the writer is ahead of the reader, unwrapped.
    ///
    /// Negative once the reader has passed the writer; above `capacity` once
    /// the writer has lapped the reader.
    pub fn lead(&self) -> i64 {
        self.write_ahead as i64 + self.frames_written as i64 - self.frames_read as i64
    }

    pub fn write_head(&self) -> usize {
        self.write_head
    }

    pub fn read_head(&self) -> usize {
        self.read_head
    }

    /// The total capacity of the buffer in frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_ahead(&self) -> usize {
        self.write_ahead
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Transfers after which the writer had lapped the reader.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Transfers after which the reader had passed the writer.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}
