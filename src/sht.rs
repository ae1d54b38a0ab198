//! Spherical-harmonic transforms on the HEALPix RING grid.
//!
//! Polarisation follows `Q +/- iU = -sum (a_E +/- i a_B) {+/-2}Y_lm`, the
//! convention used by HEALPix itself.

use std::f64::consts::PI;

use ndarray::{s, Array2};
use num::{Complex, Zero};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::{
    alm::Alm,
    error::{Result, SimError},
    fft::RingFft,
    healpix::{is_valid_nside, nside2npix, nside2resol, rings},
    map::SkyMap,
    spectrum::PowerSpectrum,
};

/// The transform primitives the synthesizer is written against.
pub trait SignalTransform {
    fn map2alm(&self, map: &SkyMap, lmax: usize) -> Result<Alm>;

    fn alm2map(&self, alm: &Alm, nside: usize) -> Result<SkyMap>;

    /// Draws T, E, B coefficients with the statistics of `spectrum` up to `lmax`.
    fn random_alm(&self, spectrum: &PowerSpectrum, lmax: usize, rng: &mut dyn RngCore) -> Result<Alm>;

    /// Convolves with a symmetric Gaussian of the given FWHM in radians.
    fn smooth_gaussian(&self, alm: &mut Alm, fwhm_rad: f64) -> Result<()>;

    /// Mean pixel spacing in radians.
    fn pixel_resolution(&self, nside: usize) -> f64 {
        nside2resol(nside)
    }

    fn pixel_count(&self, nside: usize) -> usize {
        nside2npix(nside)
    }

    fn max_multipole(&self, alm: &Alm) -> usize {
        alm.lmax()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealpixSht {
    /// Jacobi refinement steps applied after the quadrature analysis.
    pub iter: usize,
}

impl Default for HealpixSht {
    fn default() -> Self {
        Self { iter: 3 }
    }
}

/// Fills `lam[l]` for `l = m..=lmax` with the normalised associated Legendre
/// functions at `cos(theta) = z`, `sin(theta) = s`.
fn legendre_lambda(lmax: usize, m: usize, z: f64, s: f64, lam: &mut [f64]) {
    let mut lmm = 1.0 / (4.0 * PI).sqrt();
    for k in 1..=m {
        let k = k as f64;
        lmm *= -((2.0 * k + 1.0) / (2.0 * k)).sqrt() * s;
    }
    lam[m] = lmm;
    if m < lmax {
        lam[m + 1] = z * (2.0 * m as f64 + 3.0).sqrt() * lmm;
    }
    let mf = m as f64;
    for l in m + 2..=lmax {
        let lf = l as f64;
        let a = ((4.0 * lf * lf - 1.0) / (lf * lf - mf * mf)).sqrt();
        let l1 = lf - 1.0;
        let b = ((l1 * l1 - mf * mf) / (4.0 * l1 * l1 - 1.0)).sqrt();
        lam[l] = a * (z * lam[l - 1] - b * lam[l - 2]);
    }
}

/// Spin-2 functions `(F1, F2)` for `l >= max(2, m)` built from `lam`.
fn spin2_functions(lmax: usize, m: usize, z: f64, s: f64, lam: &[f64], f1: &mut [f64], f2: &mut [f64]) {
    let mf = m as f64;
    let one_on_s2 = 1.0 / (s * s);
    for l in m.max(2)..=lmax {
        let lf = l as f64;
        let norm = 2.0 / ((lf - 1.0) * lf * (lf + 1.0) * (lf + 2.0)).sqrt();
        let fact = ((2.0 * lf + 1.0) / (2.0 * lf - 1.0) * (lf * lf - mf * mf)).sqrt();
        let lam_prev = if l > m { lam[l - 1] } else { 0.0 };
        f1[l] = norm
            * (-((lf - mf * mf) * one_on_s2 + 0.5 * lf * (lf - 1.0)) * lam[l]
                + fact * z * one_on_s2 * lam_prev);
        f2[l] = norm * mf * one_on_s2 * (-(lf - 1.0) * z * lam[l] + fact * lam_prev);
    }
}

pub fn gauss_beam(fwhm_rad: f64, lmax: usize, spin: usize) -> Vec<f64> {
    let sigma = fwhm_rad / (8.0 * 2.0_f64.ln()).sqrt();
    let s2 = (spin * spin) as f64;
    (0..=lmax)
        .map(|l| {
            let l = l as f64;
            (-0.5 * (l * (l + 1.0) - s2) * sigma * sigma).exp()
        })
        .collect()
}

fn check_nside(nside: usize) -> Result<()> {
    if is_valid_nside(nside) {
        Ok(())
    } else {
        Err(SimError::config(format!("nside {} is not a power of two", nside)))
    }
}

fn gaussian_coefficient(rng: &mut dyn RngCore, real: bool) -> Complex<f64> {
    let re: f64 = StandardNormal.sample(rng);
    if real {
        Complex::new(re, 0.0)
    } else {
        let im: f64 = StandardNormal.sample(rng);
        Complex::new(re, im) * std::f64::consts::FRAC_1_SQRT_2
    }
}

impl HealpixSht {
    pub fn new(iter: usize) -> Self {
        Self { iter }
    }

    fn analysis(&self, map: &SkyMap, lmax: usize) -> Alm {
        let nside = map.nside();
        let ncomp = map.ncomp();
        let pol = map.is_polarized();
        let weight = 4.0 * PI / self.pixel_count(nside) as f64;
        let mut alm = Alm::zeros(ncomp, lmax);
        let mut ffts = RingFft::new();
        let mut lam = vec![0.0; lmax + 1];
        let mut f1 = vec![0.0; lmax + 1];
        let mut f2 = vec![0.0; lmax + 1];

        for ring in rings(nside) {
            let gm: Vec<Vec<Complex<f64>>> = (0..ncomp)
                .map(|c| {
                    let values = map.component(c).slice_move(s![ring.pixels()]).to_vec();
                    ffts.analyze_ring(&values, ring.phi0, lmax)
                })
                .collect();
            let data = alm.data_mut();
            let mut base = 0;
            for m in 0..=lmax {
                legendre_lambda(lmax, m, ring.z, ring.sin_theta, &mut lam);
                let gt = gm[0][m] * weight;
                for l in m..=lmax {
                    data[(0, base + l - m)] += gt * lam[l];
                }
                if pol {
                    spin2_functions(lmax, m, ring.z, ring.sin_theta, &lam, &mut f1, &mut f2);
                    let gq = gm[1][m] * weight;
                    let gu = gm[2][m] * weight;
                    let i = Complex::<f64>::i();
                    for l in m.max(2)..=lmax {
                        data[(1, base + l - m)] -= gq * f1[l] + i * gu * f2[l];
                        data[(2, base + l - m)] -= gu * f1[l] - i * gq * f2[l];
                    }
                }
                base += lmax + 1 - m;
            }
        }
        alm
    }
}

impl SignalTransform for HealpixSht {
    fn map2alm(&self, map: &SkyMap, lmax: usize) -> Result<Alm> {
        let mut alm = self.analysis(map, lmax);
        for _ in 0..self.iter {
            let residual = map.sub(&self.alm2map(&alm, map.nside())?)?;
            alm.add_assign(&self.analysis(&residual, lmax))?;
        }
        Ok(alm)
    }

    fn alm2map(&self, alm: &Alm, nside: usize) -> Result<SkyMap> {
        check_nside(nside)?;
        let lmax = alm.lmax();
        let ncomp = alm.ncomp();
        let pol = ncomp == 3;
        let a = alm.data();
        let mut data = Array2::zeros((ncomp, nside2npix(nside)));
        let mut ffts = RingFft::new();
        let mut lam = vec![0.0; lmax + 1];
        let mut f1 = vec![0.0; lmax + 1];
        let mut f2 = vec![0.0; lmax + 1];
        let mut xm = vec![vec![Complex::<f64>::zero(); lmax + 1]; ncomp];
        let mut ring_values = Vec::new();
        let i = Complex::<f64>::i();

        for ring in rings(nside) {
            let mut base = 0;
            for m in 0..=lmax {
                legendre_lambda(lmax, m, ring.z, ring.sin_theta, &mut lam);
                xm[0][m] = (m..=lmax).map(|l| a[(0, base + l - m)] * lam[l]).sum();
                if pol {
                    spin2_functions(lmax, m, ring.z, ring.sin_theta, &lam, &mut f1, &mut f2);
                    let mut q = Complex::zero();
                    let mut u = Complex::zero();
                    for l in m.max(2)..=lmax {
                        let e = a[(1, base + l - m)];
                        let b = a[(2, base + l - m)];
                        q -= e * f1[l] + i * b * f2[l];
                        u -= b * f1[l] - i * e * f2[l];
                    }
                    xm[1][m] = q;
                    xm[2][m] = u;
                }
                base += lmax + 1 - m;
            }
            ring_values.resize(ring.nphi, 0.0);
            for (c, x) in xm.iter().enumerate() {
                ffts.synthesize_ring(x, ring.phi0, &mut ring_values);
                data.row_mut(c)
                    .slice_mut(s![ring.pixels()])
                    .iter_mut()
                    .zip(ring_values.iter())
                    .for_each(|(d, &v)| *d = v);
            }
        }
        SkyMap::from_array(nside, data)
    }

    fn random_alm(&self, spectrum: &PowerSpectrum, lmax: usize, rng: &mut dyn RngCore) -> Result<Alm> {
        if spectrum.lmax() < lmax {
            return Err(SimError::numeric(format!(
                "power spectrum stops at l={} but the band limit is {}",
                spectrum.lmax(),
                lmax
            )));
        }
        let mut alm = Alm::zeros(3, lmax);
        for (l, m) in alm.lm_iter() {
            let z1 = gaussian_coefficient(rng, m == 0);
            let z2 = gaussian_coefficient(rng, m == 0);
            let z3 = gaussian_coefficient(rng, m == 0);
            let (tt, ee, bb, te) = (spectrum.tt[l], spectrum.ee[l], spectrum.bb[l], spectrum.te[l]);
            let (t, e) = if tt > 0.0 {
                let k = te / tt.sqrt();
                (z1 * tt.sqrt(), z1 * k + z2 * (ee - k * k).max(0.0).sqrt())
            } else {
                (Complex::zero(), z2 * ee.sqrt())
            };
            alm.set(0, l, m, t);
            if l >= 2 {
                alm.set(1, l, m, e);
                alm.set(2, l, m, z3 * bb.sqrt());
            }
        }
        Ok(alm)
    }

    fn smooth_gaussian(&self, alm: &mut Alm, fwhm_rad: f64) -> Result<()> {
        if !(fwhm_rad.is_finite() && fwhm_rad >= 0.0) {
            return Err(SimError::config(format!(
                "smoothing FWHM must be non-negative, got {} rad",
                fwhm_rad
            )));
        }
        if fwhm_rad == 0.0 {
            return Ok(());
        }
        alm.apply_window(0, &gauss_beam(fwhm_rad, alm.lmax(), 0));
        if alm.ncomp() == 3 {
            let pol = gauss_beam(fwhm_rad, alm.lmax(), 2);
            alm.apply_window(1, &pol);
            alm.apply_window(2, &pol);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healpix::pix2ang_ring;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn flat_spectrum(lmax: usize, te: f64) -> PowerSpectrum {
        let n = lmax + 1;
        PowerSpectrum::new(vec![1.0; n], vec![1.0; n], vec![0.5; n], vec![te; n]).unwrap()
    }

    fn relative_error(a: &Alm, b: &Alm) -> f64 {
        let scale = a.data().iter().map(|v| v.norm()).fold(0.0, f64::max);
        a.max_abs_diff(b).unwrap() / scale
    }

    #[test]
    fn monopole_is_constant() {
        let mut alm = Alm::zeros(1, 4);
        alm.set(0, 0, 0, Complex::new((4.0 * PI).sqrt(), 0.0));
        let map = HealpixSht::default().alm2map(&alm, 4).unwrap();
        assert!(map.component(0).iter().all(|&v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn constant_map_analyses_to_the_monopole() {
        let sht = HealpixSht::new(0);
        assert_eq!(sht.pixel_count(4), 192);
        let mut map = SkyMap::zeros(4, 1);
        map.component_mut(0).fill(1.0);
        let alm = sht.map2alm(&map, 4).unwrap();
        assert!((alm.get(0, 0, 0).re - (4.0 * PI).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn pure_e_quadrupole_matches_closed_form() {
        let nside = 4;
        let mut alm = Alm::zeros(3, 4);
        alm.set(1, 2, 0, Complex::new(1.0, 0.0));
        let map = HealpixSht::default().alm2map(&alm, nside).unwrap();
        let amp = (15.0 / (32.0 * PI)).sqrt();
        for ipix in 0..map.npix() {
            let (theta, _) = pix2ang_ring(nside, ipix);
            let expected = -amp * theta.sin().powi(2);
            assert!((map.component(1)[ipix] - expected).abs() < 1e-12);
            assert!(map.component(2)[ipix].abs() < 1e-12);
            assert!(map.component(0)[ipix].abs() < 1e-12);
        }
    }

    #[test]
    fn round_trip_recovers_band_limited_coefficients() {
        let nside = 8;
        let lmax = 12;
        let sht = HealpixSht::default();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let alm = sht.random_alm(&flat_spectrum(lmax, 0.3), lmax, &mut rng).unwrap();
        let map = sht.alm2map(&alm, nside).unwrap();
        let back = sht.map2alm(&map, lmax).unwrap();
        assert!(relative_error(&alm, &back) < 1e-3);
    }

    #[test]
    fn random_alm_has_requested_power() {
        let lmax = 200;
        let sht = HealpixSht::default();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let alm = sht.random_alm(&flat_spectrum(lmax, 0.5), lmax, &mut rng).unwrap();
        let (mut tt, mut te, mut n) = (0.0, 0.0, 0.0);
        for (l, m) in alm.lm_iter() {
            if l < 2 {
                continue;
            }
            let t = alm.get(0, l, m);
            let e = alm.get(1, l, m);
            tt += t.norm_sqr();
            te += (t * e.conj()).re;
            n += 1.0;
        }
        assert!((tt / n - 1.0).abs() < 0.05);
        assert!((te / n - 0.5).abs() < 0.05);
        assert_eq!(alm.get(1, 1, 0), Complex::zero());
        assert_eq!(alm.get(0, 5, 0).im, 0.0);
    }

    #[test]
    fn random_alm_is_reproducible() {
        let sht = HealpixSht::default();
        let cl = flat_spectrum(16, 0.1);
        let a = sht.random_alm(&cl, 16, &mut ChaCha20Rng::seed_from_u64(3)).unwrap();
        let b = sht.random_alm(&cl, 16, &mut ChaCha20Rng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn spectrum_shorter_than_band_limit_is_numeric_error() {
        let sht = HealpixSht::default();
        let err = sht
            .random_alm(&flat_spectrum(8, 0.0), 16, &mut ChaCha20Rng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, SimError::Numeric { .. }));
    }

    #[test]
    fn zero_width_smoothing_is_identity() {
        let sht = HealpixSht::default();
        let alm = sht
            .random_alm(&flat_spectrum(10, 0.2), 10, &mut ChaCha20Rng::seed_from_u64(5))
            .unwrap();
        let mut smoothed = alm.clone();
        sht.smooth_gaussian(&mut smoothed, 0.0).unwrap();
        assert_eq!(smoothed, alm);
    }

    #[test]
    fn smoothing_suppresses_small_scales() {
        let sht = HealpixSht::default();
        let mut alm = Alm::zeros(3, 64);
        alm.set(0, 64, 3, Complex::new(1.0, 1.0));
        alm.set(1, 2, 0, Complex::new(1.0, 0.0));
        let fwhm = 1.5_f64.to_radians();
        let sigma2 = fwhm * fwhm / (8.0 * 2.0_f64.ln());
        sht.smooth_gaussian(&mut alm, fwhm).unwrap();
        assert!(alm.get(0, 64, 3).norm() < 0.8 * 2.0_f64.sqrt());
        assert!((alm.get(1, 2, 0).re - (-sigma2).exp()).abs() < 1e-12);
        assert!(sht.smooth_gaussian(&mut alm, -0.1).is_err());
    }

    #[test]
    fn beam_matches_gaussian_width() {
        let fwhm = 30.0_f64.to_radians() / 60.0;
        let b = gauss_beam(fwhm, 100, 0);
        let sigma2 = fwhm * fwhm / (8.0 * 2.0_f64.ln());
        assert_eq!(b[0], 1.0);
        assert!((b[100] - (-0.5 * 100.0 * 101.0 * sigma2).exp()).abs() < 1e-15);
    }
}
