use ndarray::Array2;
use rand::RngCore;
use rand_distr::{Distribution, Normal};

use crate::{
    error::{Result, SimError},
    healpix::{nside2npix, nside2resol_arcmin},
    map::SkyMap,
};

/// Intensity noise is taken as this fraction of the Q/U pixel noise.
pub const INTENSITY_NOISE_FACTOR: f64 = 0.5;

/// Isotropic white noise for one channel at one map resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseModel {
    sigma_pixel: f64,
}

impl NoiseModel {
    /// `sensitivity` and `resolution_arcmin` share the angular unit, e.g.
    /// uK.arcmin and arcmin.
    pub fn new(sensitivity: f64, resolution_arcmin: f64) -> Result<Self> {
        if !(sensitivity.is_finite() && sensitivity >= 0.0) {
            return Err(SimError::config(format!("invalid sensitivity {}", sensitivity)));
        }
        if !(resolution_arcmin.is_finite() && resolution_arcmin > 0.0) {
            return Err(SimError::config(format!(
                "invalid pixel resolution {} arcmin",
                resolution_arcmin
            )));
        }
        Ok(Self {
            sigma_pixel: sensitivity / resolution_arcmin,
        })
    }

    pub fn for_nside(sensitivity: f64, nside: usize) -> Result<Self> {
        Self::new(sensitivity, nside2resol_arcmin(nside))
    }

    /// Per-pixel standard deviation of Q and U.
    pub fn sigma_pixel(&self) -> f64 {
        self.sigma_pixel
    }

    pub fn sigma_intensity(&self) -> f64 {
        self.sigma_pixel * INTENSITY_NOISE_FACTOR
    }

    /// Draws I, then Q, then U, pixel by pixel from `rng`.
    pub fn draw(&self, nside: usize, rng: &mut dyn RngCore) -> Result<SkyMap> {
        let npix = nside2npix(nside);
        let mut data = Array2::zeros((3, npix));
        for (c, sigma) in [self.sigma_intensity(), self.sigma_pixel, self.sigma_pixel]
            .into_iter()
            .enumerate()
        {
            let normal = Normal::new(0.0, sigma)
                .map_err(|e| SimError::numeric(format!("noise distribution: {}", e)))?;
            data.row_mut(c)
                .iter_mut()
                .for_each(|v| *v = normal.sample(&mut *rng));
        }
        SkyMap::from_array(nside, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn std_dev(v: ndarray::ArrayView1<f64>) -> f64 {
        let n = v.len() as f64;
        let mean = v.sum() / n;
        (v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    }

    #[test]
    fn sigma_follows_sensitivity_over_resolution() {
        let model = NoiseModel::new(20.0, 10.0).unwrap();
        assert_eq!(model.sigma_pixel(), 2.0);
        assert_eq!(model.sigma_intensity(), 1.0);
    }

    #[test]
    fn empirical_noise_level_converges() {
        let model = NoiseModel::new(20.0, 10.0).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let map = model.draw(64, &mut rng).unwrap();
        assert!((std_dev(map.component(0)) - 1.0).abs() < 0.02);
        assert!((std_dev(map.component(1)) - 2.0).abs() < 0.04);
        assert!((std_dev(map.component(2)) - 2.0).abs() < 0.04);
    }

    #[test]
    fn same_stream_gives_same_noise() {
        let model = NoiseModel::for_nside(30.0, 4).unwrap();
        let a = model.draw(4, &mut ChaCha20Rng::seed_from_u64(1)).unwrap();
        let b = model.draw(4, &mut ChaCha20Rng::seed_from_u64(1)).unwrap();
        let c = model.draw(4, &mut ChaCha20Rng::seed_from_u64(2)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(NoiseModel::new(-1.0, 10.0).is_err());
        assert!(NoiseModel::new(1.0, 0.0).is_err());
        assert!(NoiseModel::new(f64::NAN, 10.0).is_err());
    }
}
