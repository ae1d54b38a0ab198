use tracing::debug;

use crate::{
    alm::Alm,
    config::Channel,
    error::{Result, SimError},
    map::SkyMap,
    noise::NoiseModel,
    partition::{unit_rng, UnitSeeds, NOISE_STREAM, SIGNAL_STREAM},
    sht::SignalTransform,
    spectrum::PowerSpectrum,
};

/// Common resolution, in arcmin, every channel is brought to.
pub const REFERENCE_FWHM_ARCMIN: f64 = 71.0;

/// FWHM of the Gaussian kernel that takes a channel from its native beam to
/// the reference resolution, in radians.
pub fn smoothing_angle(reference_arcmin: f64, fwhm_arcmin: f64) -> Result<f64> {
    let diff = reference_arcmin - fwhm_arcmin;
    if !diff.is_finite() || diff < 0.0 {
        return Err(SimError::config(format!(
            "beam FWHM {} arcmin is wider than the reference resolution {} arcmin",
            fwhm_arcmin, reference_arcmin
        )));
    }
    Ok((diff / 60.0).to_radians())
}

/// The two maps produced for one unit of work.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesizedSky {
    /// CMB only, no beam, no noise.
    pub cmb: SkyMap,
    /// CMB plus foreground plus noise, smoothed to the reference resolution.
    pub observed: SkyMap,
}

pub struct SkyComponentSynthesizer<'a, T: SignalTransform> {
    transform: &'a T,
    spectrum: &'a PowerSpectrum,
    nside: usize,
    reference_fwhm: f64,
}

impl<'a, T: SignalTransform> SkyComponentSynthesizer<'a, T> {
    pub fn new(transform: &'a T, spectrum: &'a PowerSpectrum, nside: usize, reference_fwhm: f64) -> Self {
        Self {
            transform,
            spectrum,
            nside,
            reference_fwhm,
        }
    }

    /// CMB realisation for `signal_seed`, band-limited like `foreground`.
    pub fn cmb_alm(&self, signal_seed: u64, foreground: &Alm) -> Result<Alm> {
        let lmax = self.transform.max_multipole(foreground);
        let mut rng = unit_rng(signal_seed, SIGNAL_STREAM);
        self.transform.random_alm(self.spectrum, lmax, &mut rng)
    }

    /// Returns the CMB coefficients and `gain * (cmb + foreground) + noise`,
    /// before smoothing.
    pub fn combined_alm(&self, seeds: UnitSeeds, foreground: &Alm, channel: &Channel) -> Result<(Alm, Alm)> {
        if foreground.ncomp() != 3 {
            return Err(SimError::numeric(format!(
                "foreground of channel {} GHz has {} components, expected I, Q and U",
                channel.freq,
                foreground.ncomp()
            )));
        }
        let lmax = self.transform.max_multipole(foreground);
        let cmb = self.cmb_alm(seeds.signal, foreground)?;

        let mut combined = cmb.clone();
        combined.add_assign(foreground)?;
        if channel.gain != 1.0 {
            combined.scale(channel.gain);
        }

        let resolution = self.transform.pixel_resolution(self.nside).to_degrees() * 60.0;
        let noise_model = NoiseModel::new(channel.sens, resolution)?;
        let mut rng = unit_rng(seeds.noise, NOISE_STREAM);
        let noise = noise_model.draw(self.nside, &mut rng)?;
        debug!(
            "channel {} GHz: sigma_pixel={:.4e}, lmax={}",
            channel.freq,
            noise_model.sigma_pixel(),
            lmax
        );
        combined.add_assign(&self.transform.map2alm(&noise, lmax)?)?;
        Ok((cmb, combined))
    }

    pub fn synthesize(&self, seeds: UnitSeeds, foreground: &Alm, channel: &Channel) -> Result<SynthesizedSky> {
        let angle = smoothing_angle(self.reference_fwhm, channel.fwhm)?;
        let (cmb_alm, mut combined) = self.combined_alm(seeds, foreground, channel)?;
        let cmb = self.transform.alm2map(&cmb_alm, self.nside)?;
        self.transform.smooth_gaussian(&mut combined, angle)?;
        let observed = self.transform.alm2map(&combined, self.nside)?;
        Ok(SynthesizedSky { cmb, observed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sht::HealpixSht;
    use std::f64::consts::PI;

    const NSIDE: usize = 4;
    const LMAX: usize = 8;

    fn spectrum() -> PowerSpectrum {
        let n = LMAX + 1;
        let tt: Vec<f64> = (0..n).map(|l| 1.0 / (1.0 + l as f64)).collect();
        let ee: Vec<f64> = tt.iter().map(|v| 0.1 * v).collect();
        let te: Vec<f64> = tt.iter().map(|v| 0.05 * v).collect();
        PowerSpectrum::new(tt, ee, vec![0.01; n], te).unwrap()
    }

    fn foreground() -> Alm {
        let mut fg = Alm::zeros(3, LMAX);
        let lms: Vec<_> = fg.lm_iter().collect();
        for (l, m) in lms {
            let v = num::Complex::new(0.3 / (1.0 + l as f64), 0.1 * m as f64);
            fg.set(0, l, m, v);
            if l >= 2 {
                fg.set(1, l, m, v * 0.2);
                fg.set(2, l, m, v * 0.05);
            }
        }
        fg
    }

    fn channel(fwhm: f64) -> Channel {
        Channel {
            freq: 40.0,
            fwhm,
            tele: "LFT".into(),
            sens: 37.42,
            gain: 1.0,
        }
    }

    const SEEDS: UnitSeeds = UnitSeeds { signal: 10, noise: 4010 };

    #[test]
    fn smoothing_angle_values() {
        assert_eq!(smoothing_angle(71.0, 71.0).unwrap(), 0.0);
        let a = smoothing_angle(71.0, 41.0).unwrap();
        assert!((a - 30.0 / 60.0 * PI / 180.0).abs() < 1e-15);
        assert!(smoothing_angle(71.0, 80.0).unwrap_err().is_configuration());
    }

    #[test]
    fn synthesis_is_deterministic() {
        let sht = HealpixSht::default();
        let cl = spectrum();
        let fg = foreground();
        let synth = SkyComponentSynthesizer::new(&sht, &cl, NSIDE, REFERENCE_FWHM_ARCMIN);
        let a = synth.synthesize(SEEDS, &fg, &channel(41.0)).unwrap();
        let b = synth.synthesize(SEEDS, &fg, &channel(41.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmb.ncomp(), 3);
        assert_eq!(a.observed.npix(), 192);

        let other = UnitSeeds { signal: 10, noise: 4011 };
        let c = synth.synthesize(other, &fg, &channel(41.0)).unwrap();
        assert_eq!(a.cmb, c.cmb);
        assert_ne!(a.observed, c.observed);
    }

    #[test]
    fn zero_angle_leaves_the_sum_unsmoothed() {
        let sht = HealpixSht::default();
        let cl = spectrum();
        let fg = foreground();
        let synth = SkyComponentSynthesizer::new(&sht, &cl, NSIDE, REFERENCE_FWHM_ARCMIN);
        let ch = channel(REFERENCE_FWHM_ARCMIN);

        let (cmb, combined) = synth.combined_alm(SEEDS, &fg, &ch).unwrap();
        let noise = NoiseModel::new(ch.sens, sht.pixel_resolution(NSIDE).to_degrees() * 60.0)
            .unwrap()
            .draw(NSIDE, &mut unit_rng(SEEDS.noise, NOISE_STREAM))
            .unwrap();
        let mut expected = cmb.clone();
        expected.add_assign(&fg).unwrap();
        expected.add_assign(&sht.map2alm(&noise, LMAX).unwrap()).unwrap();
        assert_eq!(combined, expected);

        let sky = synth.synthesize(SEEDS, &fg, &ch).unwrap();
        assert_eq!(sky.observed, sht.alm2map(&combined, NSIDE).unwrap());
        assert_eq!(sky.cmb, sht.alm2map(&cmb, NSIDE).unwrap());
    }

    #[test]
    fn wide_beam_fails_before_producing_maps() {
        let sht = HealpixSht::default();
        let cl = spectrum();
        let synth = SkyComponentSynthesizer::new(&sht, &cl, NSIDE, REFERENCE_FWHM_ARCMIN);
        let err = synth.synthesize(SEEDS, &foreground(), &channel(80.0)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn band_limit_beyond_spectrum_is_numeric() {
        let sht = HealpixSht::default();
        let cl = spectrum();
        let synth = SkyComponentSynthesizer::new(&sht, &cl, NSIDE, REFERENCE_FWHM_ARCMIN);
        let wide = Alm::zeros(3, LMAX + 2);
        let err = synth.synthesize(SEEDS, &wide, &channel(41.0)).unwrap_err();
        assert!(matches!(err, SimError::Numeric { .. }));
    }

    #[test]
    fn gain_scales_the_sky_but_not_the_noise() {
        let sht = HealpixSht::default();
        let cl = spectrum();
        let fg = foreground();
        let synth = SkyComponentSynthesizer::new(&sht, &cl, NSIDE, REFERENCE_FWHM_ARCMIN);
        let mut quiet = channel(41.0);
        quiet.sens = 0.0;
        let (cmb, unit) = synth.combined_alm(SEEDS, &fg, &quiet).unwrap();
        quiet.gain = 2.0;
        let (_, doubled) = synth.combined_alm(SEEDS, &fg, &quiet).unwrap();
        let mut expected = cmb;
        expected.add_assign(&fg).unwrap();
        assert!(unit.max_abs_diff(&expected).unwrap() < 1e-12);
        expected.scale(2.0);
        assert!(doubled.max_abs_diff(&expected).unwrap() < 1e-12);
    }
}
