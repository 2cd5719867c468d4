//! wavalign core - offset search between PCM streams.
//!
//! This crate contains the alignment engine, the post-alignment comparison,
//! PCM stream adapters, configuration and logging setup with no CLI
//! dependencies.

pub mod align;
pub mod compare;
pub mod config;
pub mod logging;
pub mod stream;

pub use align::{AlignError, AlignOutcome, AlignResult, MatchResult, StreamSide, Workspace};
pub use compare::{CompareError, CompareResult, OutputMode, PairStats, SessionSummary};
pub use stream::{MemoryStream, PcmSink, PcmStream, StreamError, WavSink, WavStream};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
