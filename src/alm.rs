use ndarray::{Array2, ArrayView1, Zip};
use num::Complex;

use crate::error::{Result, SimError};

/// Number of coefficients of a triangular set with `mmax == lmax`.
pub fn nalm(lmax: usize) -> usize {
    (lmax + 1) * (lmax + 2) / 2
}

/// Inverse of [`nalm`]; `None` when `size` is not triangular.
pub fn lmax_from_size(size: usize) -> Option<usize> {
    if size == 0 {
        return None;
    }
    let lmax = (((1.0 + 8.0 * size as f64).sqrt() - 3.0) / 2.0).round() as usize;
    if nalm(lmax) == size {
        Some(lmax)
    } else {
        None
    }
}

/// Index used by the FITS alm layout, `l^2 + l + m + 1`.
pub fn fits_index(l: usize, m: usize) -> usize {
    l * l + l + m + 1
}

pub fn from_fits_index(index: usize) -> Option<(usize, usize)> {
    if index == 0 {
        return None;
    }
    let i = index - 1;
    let l = (i as f64).sqrt() as usize;
    let l = if (l + 1) * (l + 1) <= i { l + 1 } else { l };
    if i < l * l + l || i - l * l - l > l {
        return None;
    }
    Some((l, i - l * l - l))
}

/// Spherical-harmonic coefficients for m >= 0, stored m-major like healpy.
/// Row 0 is T; rows 1 and 2 are E and B when present.
#[derive(Clone, Debug, PartialEq)]
pub struct Alm {
    lmax: usize,
    data: Array2<Complex<f64>>,
}

impl Alm {
    pub fn zeros(ncomp: usize, lmax: usize) -> Self {
        Self {
            lmax,
            data: Array2::zeros((ncomp, nalm(lmax))),
        }
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn ncomp(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn index(&self, l: usize, m: usize) -> usize {
        debug_assert!(m <= l && l <= self.lmax);
        m * (2 * self.lmax + 1 - m) / 2 + l
    }

    pub fn get(&self, c: usize, l: usize, m: usize) -> Complex<f64> {
        self.data[(c, self.index(l, m))]
    }

    pub fn set(&mut self, c: usize, l: usize, m: usize, v: Complex<f64>) {
        let i = self.index(l, m);
        self.data[(c, i)] = v;
    }

    pub fn component(&self, c: usize) -> ArrayView1<Complex<f64>> {
        self.data.row(c)
    }

    pub fn data(&self) -> &Array2<Complex<f64>> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<Complex<f64>> {
        &mut self.data
    }

    /// `(l, m)` pairs in storage order.
    pub fn lm_iter(&self) -> impl Iterator<Item = (usize, usize)> {
        let lmax = self.lmax;
        (0..=lmax).flat_map(move |m| (m..=lmax).map(move |l| (l, m)))
    }

    pub fn add_assign(&mut self, other: &Alm) -> Result<()> {
        self.check_compatible(other)?;
        self.data += &other.data;
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        self.data.mapv_inplace(|v| v * factor);
    }

    /// Multiplies every coefficient of component `c` by `window[l]`.
    pub fn apply_window(&mut self, c: usize, window: &[f64]) {
        let lmax = self.lmax;
        let mut row = self.data.row_mut(c);
        let mut i = 0;
        for m in 0..=lmax {
            for l in m..=lmax {
                row[i] *= window[l];
                i += 1;
            }
        }
    }

    pub fn max_abs_diff(&self, other: &Alm) -> Result<f64> {
        self.check_compatible(other)?;
        let mut diff = 0.0_f64;
        Zip::from(&self.data).and(&other.data).for_each(|a, b| {
            diff = diff.max((a - b).norm());
        });
        Ok(diff)
    }

    fn check_compatible(&self, other: &Alm) -> Result<()> {
        if self.lmax != other.lmax || self.ncomp() != other.ncomp() {
            return Err(SimError::numeric(format!(
                "band-limit mismatch: lmax {} with {} components vs lmax {} with {} components",
                self.lmax,
                self.ncomp(),
                other.lmax,
                other.ncomp()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangular_sizes() {
        assert_eq!(nalm(0), 1);
        assert_eq!(nalm(2), 6);
        assert_eq!(lmax_from_size(nalm(767)), Some(767));
        assert_eq!(lmax_from_size(7), None);
        assert_eq!(lmax_from_size(0), None);
    }

    #[test]
    fn storage_order_is_m_major() {
        let alm = Alm::zeros(1, 3);
        let order: Vec<_> = alm.lm_iter().map(|(l, m)| alm.index(l, m)).collect();
        assert_eq!(order, (0..nalm(3)).collect::<Vec<_>>());
        assert_eq!(alm.index(3, 0), 3);
        assert_eq!(alm.index(1, 1), 4);
        assert_eq!(alm.index(3, 3), 9);
    }

    #[test]
    fn fits_index_inverts() {
        for l in 0..20 {
            for m in 0..=l {
                assert_eq!(from_fits_index(fits_index(l, m)), Some((l, m)));
            }
        }
        assert_eq!(from_fits_index(0), None);
    }

    #[test]
    fn mismatched_band_limits_are_rejected() {
        let mut a = Alm::zeros(3, 4);
        let b = Alm::zeros(3, 5);
        assert!(matches!(a.add_assign(&b), Err(SimError::Numeric { .. })));
    }
}
