//! Core types for offset search.

use std::collections::TryReserveError;

use serde::{Deserialize, Serialize};

use crate::stream::StreamError;

/// Smallest FFT order a workspace negotiates (1024 points).
pub const MIN_FFT_ORDER: u32 = 10;

/// Largest FFT order a workspace negotiates (16M points).
pub const MAX_FFT_ORDER: u32 = 24;

/// Machine epsilon of single precision floats.
///
/// The minimum-detection tolerance is `FLOAT_EPSILON * (16n + 3) * pwr`, an
/// empirically tuned bound on FFT round-off growth with transform order `n`,
/// scaled by the window power. Keep the formula literal.
pub const FLOAT_EPSILON: f64 = f32::EPSILON as f64;

/// Round-off tolerance for an SSD comparison at transform order `order`.
pub fn ssd_tolerance(order: u32, power: f64) -> f64 {
    FLOAT_EPSILON * (16.0 * order as f64 + 3.0) * power
}

/// Result of a best-match search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Offset into the reference, in interleaved samples (multiple of channel count).
    pub offset_samples: usize,
    /// Sum of squared differences at that offset.
    pub min_ssd: f64,
    /// The comparison window was shrunk to fit the transform.
    pub reduced_window: bool,
}

impl MatchResult {
    /// Offset converted to frames.
    pub fn offset_frames(&self, channels: usize) -> usize {
        self.offset_samples / channels.max(1)
    }
}

/// Which stream of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSide {
    /// First stream of the pair.
    Reference,
    /// Second stream of the pair.
    Test,
}

impl StreamSide {
    /// Index into per-side arrays.
    pub fn index(self) -> usize {
        match self {
            StreamSide::Reference => 0,
            StreamSide::Test => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StreamSide::Reference => "reference",
            StreamSide::Test => "test",
        }
    }
}

/// Outcome of aligning a stream pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignOutcome {
    /// Stream that was seeked forward, `None` when nothing was moved.
    pub advanced: Option<StreamSide>,
    /// Frames the advanced stream was moved by.
    pub offset_frames: u64,
    /// Same distance in bytes of the advanced stream.
    pub byte_offset: u64,
    /// SSD of the winning direction (0.0 when no search ran).
    pub min_ssd: f64,
    /// Leading silence shared by both streams that was skipped while buffering.
    pub common_silence_frames: u64,
    /// The winning search ran on a shrunk comparison window.
    pub reduced_window: bool,
}

impl AlignOutcome {
    /// An outcome that leaves both streams where they were.
    pub fn unchanged(common_silence_frames: u64) -> Self {
        Self {
            advanced: None,
            offset_frames: 0,
            byte_offset: 0,
            min_ssd: 0.0,
            common_silence_frames,
            reduced_window: false,
        }
    }

    /// Whether a stream was repositioned.
    pub fn is_aligned(&self) -> bool {
        self.advanced.is_some()
    }
}

/// Error types for alignment operations.
#[derive(Debug, thiserror::Error)]
pub enum AlignError {
    /// Workspace buffers could not be allocated.
    #[error("Failed to allocate alignment workspace for FFT size {fft_size}")]
    Allocation {
        fft_size: usize,
        #[source]
        source: TryReserveError,
    },

    /// Workspace was never opened or has been closed.
    #[error("Alignment workspace is closed")]
    WorkspaceClosed,

    /// Channel count of zero or above the `max_channels` given to `open`.
    #[error("Invalid channel count: {0}")]
    InvalidChannels(usize),

    /// Streams of a pair disagree on channel count.
    #[error("Channel count mismatch: reference has {reference}, test has {test}")]
    ChannelMismatch { reference: usize, test: usize },

    /// Reading or seeking a stream failed.
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Type alias for alignment results.
pub type AlignResult<T> = Result<T, AlignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_grows_with_order_and_power() {
        let low = ssd_tolerance(10, 1.0);
        assert!(ssd_tolerance(20, 1.0) > low);
        assert!((ssd_tolerance(10, 4.0) - 4.0 * low).abs() < 1e-18);
        assert!((low - f32::EPSILON as f64 * 163.0).abs() < 1e-18);
    }

    #[test]
    fn match_result_converts_to_frames() {
        let result = MatchResult {
            offset_samples: 74,
            min_ssd: 0.0,
            reduced_window: false,
        };
        assert_eq!(result.offset_frames(2), 37);
        assert_eq!(result.offset_frames(1), 74);
    }

    #[test]
    fn stream_side_indexes() {
        assert_eq!(StreamSide::Reference.index(), 0);
        assert_eq!(StreamSide::Test.index(), 1);
        assert_eq!(StreamSide::Test.name(), "test");
    }

    #[test]
    fn outcome_serializes_side_lowercase() {
        let mut outcome = AlignOutcome::unchanged(0);
        outcome.advanced = Some(StreamSide::Test);
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"advanced\":\"test\""));
    }
}
