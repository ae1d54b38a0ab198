use num::{Complex, Zero};

use rustfft::{FftDirection, FftNum, FftPlanner};

fn _fft<T: FftNum>(planner: &mut FftPlanner<T>, data: &mut [Complex<T>], inverse: bool) {
    let len = data.len();
    let fft = planner.plan_fft(
        len,
        if inverse {
            FftDirection::Inverse
        } else {
            FftDirection::Forward
        },
    );
    let scratch_len = fft.get_inplace_scratch_len();
    let mut scratch = vec![Complex::zero(); scratch_len];
    fft.process_with_scratch(data, &mut scratch);
}

/// Azimuthal transforms along one HEALPix ring.
///
/// Rings only come in a handful of lengths, so one planner is kept per
/// transform call and its plans are reused ring after ring.
pub struct RingFft {
    planner: FftPlanner<f64>,
}

impl Default for RingFft {
    fn default() -> Self {
        Self::new()
    }
}

impl RingFft {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Writes `Re[x_0] + 2 Re sum_{m>0} x_m exp(i m phi_j)` for
    /// `phi_j = phi0 + 2 pi j / out.len()`.
    ///
    /// Modes above the Nyquist frequency of the ring alias onto
    /// `m mod nphi`.
    pub fn synthesize_ring(&mut self, xm: &[Complex<f64>], phi0: f64, out: &mut [f64]) {
        let nphi = out.len();
        let mut buf = vec![Complex::<f64>::zero(); nphi];
        for (m, &x) in xm.iter().enumerate() {
            let weight = if m == 0 { 1.0 } else { 2.0 };
            buf[m % nphi] += x * Complex::from_polar(weight, m as f64 * phi0);
        }
        _fft(&mut self.planner, &mut buf, true);
        out.iter_mut().zip(buf.iter()).for_each(|(o, b)| *o = b.re);
    }

    /// Returns `sum_j f_j exp(-i m phi_j)` for `m = 0..=mmax`.
    pub fn analyze_ring(&mut self, values: &[f64], phi0: f64, mmax: usize) -> Vec<Complex<f64>> {
        let nphi = values.len();
        let mut buf: Vec<_> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
        _fft(&mut self.planner, &mut buf, false);
        (0..=mmax)
            .map(|m| buf[m % nphi] * Complex::from_polar(1.0, -(m as f64) * phi0))
            .collect()
    }
}
