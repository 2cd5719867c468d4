//! Sample-by-sample comparison of two PCM streams.
//!
//! After alignment the remaining overlap of both streams is compared frame
//! by frame. The comparison gathers per-channel difference statistics and
//! can stream either the difference signal or the aligned test signal into
//! a [`PcmSink`].
//!
//! [`batch`] drives whole file pairs and directory trees, reusing one
//! alignment [`Workspace`](crate::align::Workspace) across all pairs.

pub mod batch;
mod stats;

pub use batch::{compare_files, pair_inputs, CompareOptions, FilePair, PairReport};
pub use stats::{effective_bits, ratio_db, ChannelStats, Metrics, PairStats, SessionSummary};

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::align::AlignError;
use crate::stream::{PcmSink, PcmStream, StreamError};

/// Interleaved samples read per stream and chunk.
pub const CHUNK_SAMPLES: usize = 0x20000;

/// What to write into the output sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// `test - reference`.
    #[default]
    Difference,
    /// The test stream, padded so it lines up with the reference.
    AlignedTest,
}

/// Errors raised while comparing streams or files.
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: StreamError,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Input not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot compare a file with itself: {}", .0.display())]
    SameFile(PathBuf),

    #[error("Channel count mismatch: reference has {reference}, test has {test}")]
    ChannelMismatch { reference: usize, test: usize },

    #[error("Empty input: reference has {reference} frames, test has {test}")]
    EmptyInput { reference: u64, test: u64 },

    #[error("No samples compared")]
    NothingCompared,

    #[error("Alignment failed: {0}")]
    Align(#[from] AlignError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Result type for comparisons.
pub type CompareResult<T> = Result<T, CompareError>;

/// Compare two streams from their current positions to the end of the shorter one.
///
/// With [`OutputMode::AlignedTest`] the output starts with silence for the
/// frames the reference is ahead of the test, so it lines up with the
/// reference file.
pub fn compare_streams(
    reference: &mut dyn PcmStream,
    test: &mut dyn PcmStream,
    mut output: Option<&mut dyn PcmSink>,
    mode: OutputMode,
) -> CompareResult<PairStats> {
    let ch = reference.channels();
    if ch == 0 || ch != test.channels() {
        return Err(CompareError::ChannelMismatch {
            reference: ch,
            test: test.channels(),
        });
    }

    if mode == OutputMode::AlignedTest {
        let lead = reference.position().saturating_sub(test.position());
        if let Some(sink) = output.as_deref_mut() {
            sink.write_silence(lead)?;
        }
    }

    let chunk_frames = (CHUNK_SAMPLES / ch).max(1);
    let mut reference_buf = vec![0.0; chunk_frames * ch];
    let mut test_buf = vec![0.0; chunk_frames * ch];
    let mut diff_buf = vec![0.0; chunk_frames * ch];
    let mut stats = PairStats::new(ch);

    loop {
        let read = reference
            .read_frames(&mut reference_buf, chunk_frames)?
            .min(test.read_frames(&mut test_buf, chunk_frames)?);
        if read == 0 {
            break;
        }

        let samples = read * ch;
        stats.push_frames(
            &reference_buf[..samples],
            &test_buf[..samples],
            &mut diff_buf[..samples],
        );

        if let Some(sink) = output.as_deref_mut() {
            match mode {
                OutputMode::Difference => sink.write_frames(&diff_buf[..samples])?,
                OutputMode::AlignedTest => sink.write_frames(&test_buf[..samples])?,
            }
        }
    }

    stats.finish();
    debug!(
        frames = stats.frames,
        bit_exact = stats.is_bit_exact(),
        "Compared streams"
    );
    Ok(stats)
}
