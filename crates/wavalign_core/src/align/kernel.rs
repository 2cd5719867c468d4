//! Power-of-two real FFT kernel used by the offset search.
//!
//! A real sequence of `2^order` values lives in `2^(order - 1)` complex
//! cells, consecutive samples alternating between the real and imaginary
//! slot (`cell k = (x[2k], x[2k + 1])`). The forward transform replaces the
//! cells with the first half of the real spectrum; cell 0 carries the two
//! purely real bins packed together as `(DC, Nyquist)`.

use std::f64::consts::PI;

use rustfft::{num_complex::Complex, FftPlanner};

/// Transform kernel contract consumed by the best-match search.
///
/// All buffers hold `2^(order - 1)` packed cells. Implementations may keep
/// any internal order they like between `forward` and `inverse` as long as
/// `conjugate_multiply` understands it and `inverse` returns time samples in
/// packed order.
pub trait TransformKernel {
    /// Build the twiddle table for transforms up to `2^order` points.
    fn make_table(&mut self, order: u32);

    /// Order the current table supports (0 when none was built).
    fn table_order(&self) -> u32;

    /// In-place real-to-complex transform of `2^order` packed real values.
    fn forward(&mut self, buf: &mut [Complex<f64>], order: u32);

    /// In-place complex-to-real transform.
    ///
    /// Unnormalized with gain `2^order / 2`. The packed DC/Nyquist cell is
    /// read at twice its weight, so spectra must go through
    /// [`halve_edge_bins`](Self::halve_edge_bins) first.
    fn inverse(&mut self, buf: &mut [Complex<f64>], order: u32);

    /// Element-wise `a *= conj(b)` on two spectra.
    fn conjugate_multiply(&self, a: &mut [Complex<f64>], b: &[Complex<f64>], order: u32);

    /// Scale the packed DC/Nyquist cell by one half.
    fn halve_edge_bins(&self, buf: &mut [Complex<f64>]) {
        if let Some(edge) = buf.first_mut() {
            *edge *= 0.5;
        }
    }
}

/// Packed real FFT on top of a half-length `rustfft` complex transform.
pub struct PackedRealFft {
    planner: FftPlanner<f64>,
    order: u32,
    /// `exp(-2πik / 2^order)` for `k < 2^(order - 1)`.
    twiddles: Vec<Complex<f64>>,
}

impl PackedRealFft {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            order: 0,
            twiddles: Vec::new(),
        }
    }

    /// Twiddle `exp(-2πik / 2^order)` read from the table by striding.
    fn twiddle(&self, k: usize, order: u32) -> Complex<f64> {
        debug_assert!(order <= self.order);
        self.twiddles[k << (self.order - order)]
    }

    fn cells(order: u32) -> usize {
        1usize << order.saturating_sub(1)
    }
}

impl Default for PackedRealFft {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformKernel for PackedRealFft {
    fn make_table(&mut self, order: u32) {
        let size = 1usize << order;
        let half = size / 2;
        self.twiddles = (0..half)
            .map(|k| Complex::from_polar(1.0, -2.0 * PI * k as f64 / size as f64))
            .collect();
        self.order = order;
        // Warm the planner cache for the largest length.
        let _ = self.planner.plan_fft_forward(half.max(1));
        let _ = self.planner.plan_fft_inverse(half.max(1));
    }

    fn table_order(&self) -> u32 {
        self.order
    }

    fn forward(&mut self, buf: &mut [Complex<f64>], order: u32) {
        let m = Self::cells(order);
        let buf = &mut buf[..m];
        self.planner.plan_fft_forward(m).process(buf);

        let z0 = buf[0];
        buf[0] = Complex::new(z0.re + z0.im, z0.re - z0.im);

        let minus_half_i = Complex::new(0.0, -0.5);
        for k in 1..=m / 2 {
            let j = m - k;
            let (zk, zj) = (buf[k], buf[j]);

            let even_k = (zk + zj.conj()) * 0.5;
            let odd_k = (zk - zj.conj()) * minus_half_i;
            let even_j = (zj + zk.conj()) * 0.5;
            let odd_j = (zj - zk.conj()) * minus_half_i;

            buf[k] = even_k + self.twiddle(k, order) * odd_k;
            buf[j] = even_j + self.twiddle(j, order) * odd_j;
        }
    }

    fn inverse(&mut self, buf: &mut [Complex<f64>], order: u32) {
        let m = Self::cells(order);
        let buf = &mut buf[..m];

        let edge = buf[0];
        buf[0] = Complex::new(edge.re + edge.im, edge.re - edge.im);

        let half_i = Complex::new(0.0, 0.5);
        for k in 1..=m / 2 {
            let j = m - k;
            let (xk, xj) = (buf[k], buf[j]);

            let even_k = (xk + xj.conj()) * 0.5;
            let odd_k = (xk - xj.conj()) * self.twiddle(k, order).conj();
            let even_j = (xj + xk.conj()) * 0.5;
            let odd_j = (xj - xk.conj()) * self.twiddle(j, order).conj();

            buf[k] = even_k + half_i * odd_k;
            buf[j] = even_j + half_i * odd_j;
        }

        self.planner.plan_fft_inverse(m).process(buf);
    }

    fn conjugate_multiply(&self, a: &mut [Complex<f64>], b: &[Complex<f64>], order: u32) {
        let m = Self::cells(order);
        // DC and Nyquist are real and packed side by side.
        a[0] = Complex::new(a[0].re * b[0].re, a[0].im * b[0].im);
        for (x, y) in a[1..m].iter_mut().zip(&b[1..m]) {
            *x *= y.conj();
        }
    }
}

/// Pack real samples into transform cells, zero-filling past `values`.
pub fn pack_real(cells: &mut [Complex<f64>], values: impl IntoIterator<Item = f64>) {
    let mut values = values.into_iter();
    for cell in cells.iter_mut() {
        let re = values.next().unwrap_or(0.0);
        let im = values.next().unwrap_or(0.0);
        *cell = Complex::new(re, im);
    }
}

/// De-interleave packed cells back into natural sample order.
pub fn unpack_real(cells: &[Complex<f64>], out: &mut [f64]) {
    for (pair, cell) in out.chunks_exact_mut(2).zip(cells) {
        pair[0] = cell.re;
        pair[1] = cell.im;
    }
}
