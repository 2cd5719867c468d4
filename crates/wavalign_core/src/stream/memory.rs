//! In-memory PCM stream.

use super::{PcmStream, StreamError, StreamResult};

/// Interleaved samples held in memory.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    samples: Vec<f64>,
    channels: usize,
    bytes_per_sample: usize,
    position: u64,
}

impl MemoryStream {
    /// Create a stream over interleaved samples, reporting 16-bit frames.
    ///
    /// A trailing partial frame is ignored.
    pub fn new(samples: Vec<f64>, channels: usize) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            bytes_per_sample: 2,
            position: 0,
        }
    }

    /// Set the sample width used for `bytes_per_frame`.
    pub fn with_bytes_per_sample(mut self, bytes: usize) -> Self {
        self.bytes_per_sample = bytes;
        self
    }

    /// Total length in whole frames.
    pub fn len_frames(&self) -> u64 {
        (self.samples.len() / self.channels) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len_frames() == 0
    }
}

impl PcmStream for MemoryStream {
    fn channels(&self) -> usize {
        self.channels
    }

    fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample * self.channels
    }

    fn read_frames(&mut self, dest: &mut [f64], frames: usize) -> StreamResult<usize> {
        let remaining = self.len_frames().saturating_sub(self.position) as usize;
        let count = frames.min(remaining).min(dest.len() / self.channels);

        let start = self.position as usize * self.channels;
        let len = count * self.channels;
        dest[..len].copy_from_slice(&self.samples[start..start + len]);

        self.position += count as u64;
        Ok(count)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame: u64) -> StreamResult<()> {
        let len = self.len_frames();
        if frame > len {
            return Err(StreamError::SeekOutOfRange { frame, len });
        }
        self.position = frame;
        Ok(())
    }
}
