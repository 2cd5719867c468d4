//! Best-match alignment of two PCM streams.
//!
//! This module finds the offset between two recordings of the same signal
//! that start at different sample positions, and skips the stream that is
//! ahead so both line up before a sample-by-sample comparison.
//!
//! # Architecture
//!
//! 1. **Transform kernel** (`kernel`): power-of-two real FFT with a reusable
//!    twiddle table, behind the [`TransformKernel`] trait.
//!
//! 2. **Workspace** (`workspace`): twiddle table plus scratch spectra and
//!    per-stream sample buffers, sized once per batch and reused.
//!
//! 3. **Best-match search** (`best_match`): minimum sum of squared
//!    differences over all frame-aligned offsets via one circular
//!    cross-correlation.
//!
//! 4. **Stream synchronizer** (`sync`): buffers both streams, drops common
//!    leading silence, searches in both directions and seeks the winner.
//!
//! # Usage
//!
//! ```no_run
//! use wavalign_core::align::Workspace;
//! use wavalign_core::stream::WavStream;
//!
//! let mut workspace = Workspace::new();
//! workspace.open(16384, 2)?;
//!
//! let mut reference = WavStream::open("reference.wav")?;
//! let mut test = WavStream::open("test.wav")?;
//! let outcome = workspace.align_pair(&mut reference, &mut test)?;
//! println!("moved {:?} by {} frames", outcome.advanced, outcome.offset_frames);
//!
//! workspace.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod best_match;
pub mod kernel;
mod sync;
pub mod types;
mod workspace;

pub use kernel::{PackedRealFft, TransformKernel};
pub use types::{
    ssd_tolerance, AlignError, AlignOutcome, AlignResult, MatchResult, StreamSide,
    FLOAT_EPSILON, MAX_FFT_ORDER, MIN_FFT_ORDER,
};
pub use workspace::{fft_order_for, overhead_factor, Workspace};
