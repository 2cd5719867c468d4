//! PCM streams consumed by the synchronizer.
//!
//! A stream yields channel-interleaved `f64` samples frame by frame and can
//! be repositioned by frame index. Two implementations ship with the crate:
//! [`MemoryStream`] for in-memory buffers and [`WavStream`] for WAV files.
//! [`WavSink`] writes frames back out for difference and aligned output.

mod memory;
mod wav;

pub use memory::MemoryStream;
pub use wav::{WavSink, WavStream};

use std::io;

use thiserror::Error;

/// Errors raised by PCM streams.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Seek to frame {frame} past end of stream ({len} frames)")]
    SeekOutOfRange { frame: u64, len: u64 },

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// A seekable source of channel-interleaved PCM frames.
pub trait PcmStream {
    /// Samples per frame.
    fn channels(&self) -> usize;

    /// Size of one frame in the underlying encoding.
    fn bytes_per_frame(&self) -> usize;

    /// Read up to `frames` frames into `dest`, returning how many were read.
    ///
    /// Returns fewer than requested only at end of stream. `dest` must hold
    /// at least `frames * channels()` samples.
    fn read_frames(&mut self, dest: &mut [f64], frames: usize) -> StreamResult<usize>;

    /// Current read position in frames.
    fn position(&self) -> u64;

    /// Move the read position to an absolute frame.
    fn seek(&mut self, frame: u64) -> StreamResult<()>;

    /// Move the read position forward relative to where it is now.
    fn skip_frames(&mut self, frames: u64) -> StreamResult<()> {
        let target = self.position() + frames;
        self.seek(target)
    }
}

/// A destination for channel-interleaved PCM frames.
pub trait PcmSink {
    /// Samples per frame.
    fn channels(&self) -> usize;

    /// Append whole frames of normalized samples.
    fn write_frames(&mut self, samples: &[f64]) -> StreamResult<()>;

    /// Append `frames` frames of silence.
    fn write_silence(&mut self, frames: u64) -> StreamResult<()> {
        let zeros = vec![0.0; self.channels()];
        for _ in 0..frames {
            self.write_frames(&zeros)?;
        }
        Ok(())
    }
}
