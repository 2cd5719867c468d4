//! Reusable alignment workspace.
//!
//! The workspace owns the twiddle table, the scratch spectra and the two
//! per-stream sample buffers. It is sized once for the largest expected
//! offset and channel count, then reused across many stream pairs. Growth
//! reallocates; smaller requests keep the existing buffers.

use std::collections::TryReserveError;

use rustfft::num_complex::Complex;
use tracing::debug;

use super::best_match::SearchScratch;
use super::kernel::{PackedRealFft, TransformKernel};
use super::types::{AlignError, AlignResult, MatchResult, MAX_FFT_ORDER, MIN_FFT_ORDER};

/// Safety margin of the transform size over the offset range.
///
/// Wide layouts need a larger absolute range per frame, so the margin
/// shrinks as channels grow to bound memory.
pub fn overhead_factor(max_channels: usize) -> usize {
    match max_channels {
        0..=6 => 8,
        7..=12 => 4,
        _ => 2,
    }
}

/// Smallest order in `[MIN_FFT_ORDER, MAX_FFT_ORDER]` whose size covers `required`.
pub fn fft_order_for(required: usize) -> u32 {
    let mut order = MIN_FFT_ORDER;
    while (1usize << order) < required && order < MAX_FFT_ORDER {
        order += 1;
    }
    order
}

fn zeroed<T: Clone>(len: usize, value: T) -> Result<Vec<T>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, value);
    Ok(buf)
}

/// FFT table and scratch buffers shared by a batch of alignments.
///
/// Not meant for concurrent use: give each worker its own workspace or
/// guard one behind a mutex.
pub struct Workspace<K: TransformKernel = PackedRealFft> {
    pub(super) search: SearchScratch<K>,
    /// Per-stream sample buffers, `fft_size` samples each.
    pub(super) buffers: [Vec<f64>; 2],
    pub(super) fft_size: usize,
    pub(super) max_offset_frames: usize,
    pub(super) max_channels: usize,
}

impl Workspace<PackedRealFft> {
    /// Create a closed workspace using the default FFT kernel.
    pub fn new() -> Self {
        Self::with_kernel(PackedRealFft::new())
    }
}

impl Default for Workspace<PackedRealFft> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TransformKernel> Workspace<K> {
    /// Create a closed workspace around a custom kernel.
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            search: SearchScratch::new(kernel),
            buffers: [Vec::new(), Vec::new()],
            fft_size: 0,
            max_offset_frames: 0,
            max_channels: 0,
        }
    }

    /// Size the workspace for offsets up to `max_offset_frames` on streams
    /// with up to `max_channels` channels.
    ///
    /// Buffers only grow: if the current allocation already covers the
    /// request, only the offset and channel bounds are updated. On
    /// allocation failure all buffers are released.
    pub fn open(&mut self, max_offset_frames: usize, max_channels: usize) -> AlignResult<()> {
        if max_channels == 0 {
            return Err(AlignError::InvalidChannels(0));
        }

        let required = overhead_factor(max_channels)
            .saturating_mul(max_offset_frames)
            .saturating_mul(max_channels);
        let order = fft_order_for(required);
        let fft_size = 1usize << order;

        self.max_offset_frames = max_offset_frames;
        self.max_channels = max_channels;
        if fft_size <= self.fft_size {
            debug!(
                fft_size = self.fft_size,
                requested = fft_size,
                "Alignment workspace already large enough"
            );
            return Ok(());
        }

        self.close();
        if let Err(source) = self.allocate(fft_size) {
            self.close();
            return Err(AlignError::Allocation { fft_size, source });
        }
        // A table left over from before a close can be reused.
        if self.search.kernel.table_order() < order {
            self.search.kernel.make_table(order);
        }
        self.search.order = order;
        self.fft_size = fft_size;
        self.max_offset_frames = max_offset_frames;
        self.max_channels = max_channels;

        debug!(
            fft_size,
            order,
            max_offset_frames,
            max_channels,
            "Alignment workspace allocated"
        );
        Ok(())
    }

    fn allocate(&mut self, fft_size: usize) -> Result<(), TryReserveError> {
        let zero = Complex::new(0.0, 0.0);
        for side in 0..2 {
            self.buffers[side] = zeroed(fft_size, 0.0)?;
            self.search.spectra[side] = zeroed(fft_size / 2, zero)?;
        }
        self.search.correlation = zeroed(fft_size, 0.0)?;
        Ok(())
    }

    /// Release all buffers. Safe to call on a closed workspace.
    pub fn close(&mut self) {
        self.search.release();
        self.buffers = [Vec::new(), Vec::new()];
        self.fft_size = 0;
    }

    pub fn is_open(&self) -> bool {
        self.fft_size > 0
    }

    /// Allocated transform size in samples (0 when closed).
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Allocated transform order (0 when closed).
    pub fn log2_fft_size(&self) -> u32 {
        self.search.order
    }

    /// Current search bound in frames.
    pub fn max_offset_frames(&self) -> usize {
        self.max_offset_frames
    }

    /// Widest channel layout accepted by searches.
    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    pub(super) fn ensure_open(&self) -> AlignResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AlignError::WorkspaceClosed)
        }
    }

    pub(super) fn check_channels(&self, channels: usize) -> AlignResult<()> {
        if channels == 0 || channels > self.max_channels.min(self.fft_size) {
            return Err(AlignError::InvalidChannels(channels));
        }
        Ok(())
    }

    /// Find the frame-aligned offset into `reference` where `needle` fits best.
    ///
    /// The reference is truncated to the workspace size; the needle window is
    /// taken from the start of `needle` and zero-padded if it is short.
    pub fn best_match(
        &mut self,
        reference: &[f64],
        needle: &[f64],
        channels: usize,
    ) -> AlignResult<MatchResult> {
        self.ensure_open()?;
        self.check_channels(channels)?;

        let len0 = reference.len().min(self.fft_size) / channels * channels;
        let max_offset = self.max_offset_frames.saturating_mul(channels);
        Ok(self
            .search
            .best_match(&reference[..len0], needle, max_offset, channels))
    }
}
