//! Best-match search: the offset minimizing the sum of squared differences.
//!
//! For a fixed needle window `b` of `len1` samples and a sliding window of
//! the reference `a`, the SSD at offset `off` expands to
//!
//! ```text
//! Σ (a[off + i] - b[i])² = Σ a[off + i]² + Σ b[i]² - 2 Σ a[off + i] b[i]
//! ```
//!
//! The cross term for every offset comes from one circular cross-correlation
//! through the transform kernel; the power term slides in O(1) per step.

use rustfft::num_complex::Complex;
use tracing::{debug, trace};

use super::kernel::{pack_real, unpack_real, TransformKernel};
use super::types::{ssd_tolerance, MatchResult};

/// Transform state and scratch spectra owned by one search at a time.
pub(crate) struct SearchScratch<K> {
    pub(crate) kernel: K,
    /// Negotiated transform order (upper bound for a single search).
    pub(crate) order: u32,
    pub(crate) spectra: [Vec<Complex<f64>>; 2],
    pub(crate) correlation: Vec<f64>,
}

impl<K: TransformKernel> SearchScratch<K> {
    pub(crate) fn new(kernel: K) -> Self {
        Self {
            kernel,
            order: 0,
            spectra: [Vec::new(), Vec::new()],
            correlation: Vec::new(),
        }
    }

    pub(crate) fn release(&mut self) {
        self.order = 0;
        self.spectra = [Vec::new(), Vec::new()];
        self.correlation = Vec::new();
    }

    /// Find where `needle` best fits inside `reference`.
    ///
    /// `reference` must fit the allocated transform; `needle` is read as
    /// zero-padded past its end. `max_offset` and the returned offset are in
    /// interleaved samples, and offsets are only taken on frame boundaries.
    pub(crate) fn best_match(
        &mut self,
        reference: &[f64],
        needle: &[f64],
        max_offset: usize,
        channels: usize,
    ) -> MatchResult {
        let ch = channels;
        let reference_len = reference.len();

        // Half of the reference is the fixed comparison window.
        let mut len0 = reference_len;
        let mut len1 = len0 / 2;
        let max_offset = max_offset.min(len0 * 3 / 4);
        if len1 + max_offset > len0 {
            len1 = len0 - max_offset;
        }

        let mut order = self.order;
        while order > 1 && (1usize << order >> 1) > len0 + len1 {
            order -= 1;
        }
        let fft_size = 1usize << order;

        // Keep len0 + len1 within the circular period.
        let mut reduced_window = false;
        while len0 + len1 > fft_size {
            len0 /= 2;
            len1 /= 2;
            reduced_window = true;
        }
        if reduced_window {
            debug!(
                fft_size,
                reference_len,
                window = len1,
                "Comparison window shrunk to fit transform"
            );
        }
        debug_assert!(max_offset + len1 <= reference_len);

        let cells = fft_size / 2;
        let [reference_spec, needle_spec] = &mut self.spectra;
        let reference_spec = &mut reference_spec[..cells];
        let needle_spec = &mut needle_spec[..cells];

        pack_real(reference_spec, reference.iter().copied());
        // The zero tail past the needle window keeps the correlation from wrapping.
        pack_real(needle_spec, needle.iter().copied().take(len1));

        self.kernel.forward(reference_spec, order);
        self.kernel.forward(needle_spec, order);
        self.kernel.conjugate_multiply(reference_spec, needle_spec, order);
        self.kernel.halve_edge_bins(reference_spec);
        self.kernel.inverse(reference_spec, order);

        let correlation = &mut self.correlation[..fft_size];
        unpack_real(reference_spec, correlation);

        let sample = |buf: &[f64], i: usize| buf.get(i).copied().unwrap_or(0.0);
        let scale = (fft_size / 2) as f64;

        let mut power: f64 = (0..len1)
            .map(|i| sample(reference, i).powi(2) + sample(needle, i).powi(2))
            .sum();
        let mut min_ssd = power;
        let mut min_offset = 0;

        // Sliding window of consecutive SSD values: ssd1 is the candidate.
        let (mut ssd1, mut ssd2) = (power, power);
        for off in 0..max_offset + ch {
            if off % ch == 0 {
                let tolerance = ssd_tolerance(order, power);
                let cross = correlation.get(off).copied().unwrap_or(0.0);
                let ssd0 = ssd1;
                ssd1 = ssd2;
                ssd2 = power - 2.0 * cross / scale;

                if off == 0 {
                    min_ssd = ssd2;
                } else if ssd1 <= ssd0 && ssd1 < ssd2 && ssd1 + tolerance < min_ssd {
                    min_ssd = ssd1;
                    min_offset = off - ch;
                }
            }
            power -= sample(reference, off).powi(2);
            power += sample(reference, off + len1).powi(2);
        }

        trace!(
            order,
            window = len1,
            max_offset,
            offset = min_offset,
            ssd = min_ssd,
            "Best match search finished"
        );

        // Round-off can push a perfect match just below zero.
        MatchResult {
            offset_samples: min_offset,
            min_ssd: min_ssd.max(0.0),
            reduced_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::kernel::PackedRealFft;

    fn scratch(order: u32) -> SearchScratch<PackedRealFft> {
        let mut kernel = PackedRealFft::new();
        kernel.make_table(order);
        let size = 1usize << order;
        SearchScratch {
            kernel,
            order,
            spectra: [
                vec![Complex::new(0.0, 0.0); size / 2],
                vec![Complex::new(0.0, 0.0); size / 2],
            ],
            correlation: vec![0.0; size],
        }
    }

    fn brute_force_ssd(reference: &[f64], needle: &[f64], off: usize, len: usize) -> f64 {
        (0..len).map(|i| (reference[off + i] - needle[i]).powi(2)).sum()
    }

    fn white_noise(len: usize) -> Vec<f64> {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect()
    }

    #[test]
    fn finds_shift_in_mono_noise() {
        let signal = white_noise(1024);
        let needle: Vec<f64> = signal[57..].to_vec();

        let mut search = scratch(11);
        let result = search.best_match(&signal, &needle, 128, 1);

        assert_eq!(result.offset_samples, 57);
        assert!(result.min_ssd >= 0.0);
        assert!(result.min_ssd < 1e-6, "ssd {}", result.min_ssd);
        assert!(!result.reduced_window);
    }

    #[test]
    fn ssd_matches_brute_force() {
        let signal = white_noise(512);
        let needle: Vec<f64> = signal[20..].iter().map(|v| v * 0.9).collect();

        let mut search = scratch(10);
        let result = search.best_match(&signal, &needle, 64, 1);

        assert_eq!(result.offset_samples, 20);
        let expected = brute_force_ssd(&signal, &needle, 20, 256);
        assert!(
            (result.min_ssd - expected).abs() < 1e-8 * expected.max(1.0),
            "fft ssd {} vs brute force {}",
            result.min_ssd,
            expected
        );
    }

    #[test]
    fn offsets_stay_on_frame_boundaries() {
        let frames = white_noise(1024);
        // Stereo: right channel is a scaled copy of the left.
        let interleaved: Vec<f64> = frames.iter().flat_map(|&v| [v, -0.5 * v]).collect();
        let needle: Vec<f64> = interleaved[2 * 33..].to_vec();

        let mut search = scratch(12);
        let result = search.best_match(&interleaved, &needle, 2 * 100, 2);

        assert_eq!(result.offset_samples % 2, 0);
        assert_eq!(result.offset_frames(2), 33);
    }

    #[test]
    fn zero_max_offset_only_checks_origin() {
        let signal = white_noise(512);
        let needle: Vec<f64> = signal[10..].to_vec();

        let mut search = scratch(10);
        let result = search.best_match(&signal, &needle, 0, 1);

        assert_eq!(result.offset_samples, 0);
        let expected = brute_force_ssd(&signal, &needle, 0, 256);
        assert!((result.min_ssd - expected).abs() < 1e-8 * expected);
    }

    #[test]
    fn oversized_window_is_reduced() {
        let signal = white_noise(1024);
        let needle: Vec<f64> = signal[40..].to_vec();

        // 1024 + 512 samples do not fit a 1024-point transform.
        let mut search = scratch(10);
        let result = search.best_match(&signal, &needle, 100, 1);

        assert!(result.reduced_window);
        assert_eq!(result.offset_samples, 40);
    }

    #[test]
    fn residual_is_never_negative() {
        let mut search = scratch(12);
        for (len, shift) in [(1024usize, 0usize), (2048, 1), (2048, 300), (1500, 77)] {
            let signal = white_noise(len);
            let needle: Vec<f64> = signal[shift..].to_vec();
            let result = search.best_match(&signal, &needle, 512, 1);
            assert_eq!(result.offset_samples, shift);
            assert!(result.min_ssd >= 0.0, "ssd {} at {}", result.min_ssd, shift);
        }
    }

    #[test]
    fn empty_reference_yields_origin() {
        let mut search = scratch(10);
        let result = search.best_match(&[], &[1.0, 2.0], 64, 1);
        assert_eq!(result.offset_samples, 0);
        assert_eq!(result.min_ssd, 0.0);
    }
}
