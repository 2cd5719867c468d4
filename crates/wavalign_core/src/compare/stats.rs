//! Difference statistics between a reference and a test signal.
//!
//! Accumulators keep raw sums so per-channel figures can be merged into
//! pair totals and pair totals into a batch summary. Derived figures are
//! computed on demand by [`ChannelStats::metrics`].

use serde::Serialize;

/// `-10 log10(numer / denum)`, `None` when either side is zero.
pub fn ratio_db(numer: f64, denum: f64) -> Option<f64> {
    if numer == 0.0 || denum == 0.0 {
        return None;
    }
    let db = -10.0 * (numer / denum).log10();
    db.is_finite().then_some(db)
}

/// Bits of a uniform quantizer producing the same mean squared error.
pub fn effective_bits(sum_sqr: f64, samples: f64) -> Option<f64> {
    if sum_sqr == 0.0 || samples == 0.0 {
        return None;
    }
    let bits = 1.0 + (1.0 / (12.0 * sum_sqr / samples).sqrt()).log2();
    bits.is_finite().then_some(bits)
}

fn ratio(numer: f64, denum: f64) -> Option<f64> {
    (denum != 0.0).then(|| numer / denum)
}

/// Running sums for one channel, difference defined as `test - reference`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelStats {
    pub diff_max: f64,
    pub diff_min: f64,
    pub diff_sum: f64,
    pub diff_sum_sqr: f64,
    pub reference_sum_sqr: f64,
    pub test_sum_sqr: f64,
    /// Σ d·r, correlation of the error with the signal.
    pub diff_mul_reference: f64,
    /// Σ d[i]·d[i-1], lag-one autocorrelation of the error.
    pub diff_mul_previous: f64,
    #[serde(skip)]
    previous_diff: f64,
}

impl ChannelStats {
    /// Add one sample pair and return the difference.
    pub fn push(&mut self, reference: f64, test: f64) -> f64 {
        let diff = test - reference;
        self.diff_max = self.diff_max.max(diff);
        self.diff_min = self.diff_min.min(diff);
        self.diff_sum += diff;
        self.diff_sum_sqr += diff * diff;
        self.reference_sum_sqr += reference * reference;
        self.test_sum_sqr += test * test;
        self.diff_mul_reference += diff * reference;
        self.diff_mul_previous += diff * self.previous_diff;
        self.previous_diff = diff;
        diff
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &ChannelStats) {
        self.diff_max = self.diff_max.max(other.diff_max);
        self.diff_min = self.diff_min.min(other.diff_min);
        self.diff_sum += other.diff_sum;
        self.diff_sum_sqr += other.diff_sum_sqr;
        self.reference_sum_sqr += other.reference_sum_sqr;
        self.test_sum_sqr += other.test_sum_sqr;
        self.diff_mul_reference += other.diff_mul_reference;
        self.diff_mul_previous += other.diff_mul_previous;
    }

    /// Largest absolute difference.
    pub fn abs_max(&self) -> f64 {
        self.diff_max.abs().max(self.diff_min.abs())
    }

    pub fn is_bit_exact(&self) -> bool {
        self.diff_sum_sqr == 0.0
    }

    /// Derived figures over `samples` accumulated samples.
    pub fn metrics(&self, samples: u64) -> Metrics {
        let n = samples as f64;
        Metrics {
            bit_exact: self.is_bit_exact(),
            abs_max: self.abs_max(),
            abs_max_db: ratio_db(self.abs_max(), 1.0).map(|db| 2.0 * db),
            rms: ratio(self.diff_sum_sqr, n).map_or(0.0, f64::sqrt),
            psnr_square_db: ratio_db(self.diff_sum_sqr, n),
            psnr_sine_db: ratio_db(2.0 * self.diff_sum_sqr, n),
            snr_db: ratio_db(self.diff_sum_sqr, self.reference_sum_sqr),
            effective_bits: effective_bits(self.diff_sum_sqr, n),
            dc_offset: ratio(self.diff_sum, n).unwrap_or(0.0),
            amplification: ratio(self.test_sum_sqr, self.reference_sum_sqr).map(f64::sqrt),
            signal_correlation: ratio(
                self.diff_mul_reference,
                (self.diff_sum_sqr * self.reference_sum_sqr).sqrt(),
            ),
            noise_autocorrelation: ratio(self.diff_mul_previous, self.diff_sum_sqr),
        }
    }
}

/// Figures derived from a [`ChannelStats`] accumulator.
///
/// Decibel values are `None` on an exact match or when the denominator is
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub bit_exact: bool,
    pub abs_max: f64,
    /// Peak difference relative to full scale.
    pub abs_max_db: Option<f64>,
    pub rms: f64,
    /// PSNR against a full-scale square wave.
    pub psnr_square_db: Option<f64>,
    /// PSNR against a full-scale sine.
    pub psnr_sine_db: Option<f64>,
    /// Reference power over difference power.
    pub snr_db: Option<f64>,
    pub effective_bits: Option<f64>,
    pub dc_offset: f64,
    /// `sqrt(test power / reference power)`.
    pub amplification: Option<f64>,
    pub signal_correlation: Option<f64>,
    pub noise_autocorrelation: Option<f64>,
}

/// Statistics of one compared pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairStats {
    /// Frames compared.
    pub frames: u64,
    pub channels: Vec<ChannelStats>,
    /// All channels merged, filled by [`PairStats::finish`].
    pub total: ChannelStats,
}

impl PairStats {
    pub fn new(channels: usize) -> Self {
        Self {
            frames: 0,
            channels: vec![ChannelStats::default(); channels],
            total: ChannelStats::default(),
        }
    }

    /// Accumulate whole interleaved frames, writing `test - reference` into `diff`.
    pub fn push_frames(&mut self, reference: &[f64], test: &[f64], diff: &mut [f64]) {
        let ch = self.channels.len();
        let frames = reference.len().min(test.len()).min(diff.len()) / ch;
        let samples = frames * ch;

        for (i, ((&r, &t), d)) in reference[..samples]
            .iter()
            .zip(&test[..samples])
            .zip(&mut diff[..samples])
            .enumerate()
        {
            *d = self.channels[i % ch].push(r, t);
        }
        self.frames += frames as u64;
    }

    /// Merge the channels into `total`.
    pub fn finish(&mut self) {
        self.total = ChannelStats::default();
        for channel in &self.channels {
            self.total.merge(channel);
        }
    }

    /// Interleaved samples compared.
    pub fn samples(&self) -> u64 {
        self.frames * self.channels.len() as u64
    }

    pub fn is_bit_exact(&self) -> bool {
        self.total.is_bit_exact()
    }

    pub fn metrics(&self) -> Metrics {
        self.total.metrics(self.samples())
    }

    pub fn channel_metrics(&self) -> Vec<Metrics> {
        self.channels.iter().map(|c| c.metrics(self.frames)).collect()
    }
}

/// Totals over a batch of compared pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Pairs attempted.
    pub pairs: u32,
    /// Pairs compared to the end.
    pub compared: u32,
    /// Compared pairs that were not bit-exact.
    pub differing: u32,
    pub total_samples: u64,
    pub totals: ChannelStats,
    /// Largest per-pair mean squared difference, and the test file it came from.
    pub worst_mean_sqr: f64,
    pub worst_mean_sqr_name: Option<String>,
    /// Largest absolute difference seen, and the test file it came from.
    pub worst_abs: f64,
    pub worst_abs_name: Option<String>,
}

impl SessionSummary {
    /// Count a pair that could not be compared.
    pub fn record_failure(&mut self) {
        self.pairs += 1;
    }

    /// Fold a finished pair into the totals.
    pub fn record(&mut self, name: &str, stats: &PairStats) {
        self.pairs += 1;
        self.compared += 1;
        if !stats.is_bit_exact() {
            self.differing += 1;
        }

        let samples = stats.samples();
        self.total_samples += samples;
        self.totals.merge(&stats.total);

        if samples > 0 {
            let mean_sqr = stats.total.diff_sum_sqr / samples as f64;
            if mean_sqr > self.worst_mean_sqr {
                self.worst_mean_sqr = mean_sqr;
                self.worst_mean_sqr_name = Some(name.to_string());
            }
        }
        let abs_max = stats.total.abs_max();
        if abs_max > self.worst_abs {
            self.worst_abs = abs_max;
            self.worst_abs_name = Some(name.to_string());
        }
    }

    /// Every attempted pair was compared and matched exactly.
    pub fn all_bit_exact(&self) -> bool {
        self.compared == self.pairs && self.worst_abs == 0.0
    }

    pub fn metrics(&self) -> Metrics {
        self.totals.metrics(self.total_samples)
    }

    /// PSNR of the worst pair against a full-scale square wave.
    pub fn worst_psnr_db(&self) -> Option<f64> {
        ratio_db(self.worst_mean_sqr, 1.0)
    }
}
