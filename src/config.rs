use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SimError},
    healpix::is_valid_nside,
    output::OutputWriter,
    partition::{RemainderPolicy, SeedScheme},
    spectrum::{PowerSpectrum, SpectrumUnits},
    synth::smoothing_angle,
    REFERENCE_FWHM_ARCMIN,
};

fn unit_gain() -> f64 {
    1.0
}

/// One frequency channel of the instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// GHz
    pub freq: f64,
    /// Beam FWHM in arcmin.
    pub fwhm: f64,
    pub tele: String,
    /// White-noise level in uK.arcmin.
    pub sens: f64,
    #[serde(default = "unit_gain")]
    pub gain: f64,
}

impl Channel {
    pub fn validate(&self) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        if !(self.freq.is_finite() && self.freq > 0.0) {
            return Err(SimError::config(format!("channel frequency {} is invalid", self.freq)));
        }
        if !ok(self.fwhm) || !ok(self.sens) || !ok(self.gain) {
            return Err(SimError::config(format!(
                "channel {} GHz has invalid fwhm/sens/gain ({}, {}, {})",
                self.freq, self.fwhm, self.sens, self.gain
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentCfg {
    pub channels: Vec<Channel>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkyDataCfg {
    pub gal_dir: PathBuf,
    /// File name of the foreground alm of one channel, with `{tele}` and
    /// `{freq}` (or two positional `{}`) placeholders.
    pub gal_base_name: String,
    pub cmb_spectrum: PathBuf,
    #[serde(default)]
    pub tensor_spectrum: Option<PathBuf>,
    #[serde(default)]
    pub tensor_ratio: f64,
    #[serde(default)]
    pub spectrum_units: SpectrumUnits,
    pub nside: usize,
}

impl SkyDataCfg {
    pub fn foreground_path(&self, channel: &Channel) -> PathBuf {
        self.gal_dir
            .join(render_template(&self.gal_base_name, &channel.tele, channel.freq))
    }

    pub fn load_spectrum(&self) -> Result<PowerSpectrum> {
        let scalar = PowerSpectrum::from_file(&self.cmb_spectrum, self.spectrum_units)?;
        match &self.tensor_spectrum {
            Some(path) if self.tensor_ratio != 0.0 => {
                let tensor = PowerSpectrum::from_file(path, self.spectrum_units)?;
                scalar.with_tensor(&tensor, self.tensor_ratio)
            }
            _ => Ok(scalar),
        }
    }

    /// `3 nside - 1`, the band limit a map of this resolution supports.
    pub fn default_lmax(&self) -> Result<usize> {
        if !is_valid_nside(self.nside) {
            return Err(SimError::config(format!(
                "nside {} is not a power of two",
                self.nside
            )));
        }
        Ok(3 * self.nside - 1)
    }
}

/// Fills `{tele}`/`{freq}` and positional `{}`/`{0}`/`{1}` placeholders; the
/// frequency is rendered as a truncated integer.
pub fn render_template(template: &str, tele: &str, freq: f64) -> String {
    let freq = format!("{}", freq as i64);
    let named = template
        .replace("{tele}", tele)
        .replace("{freq}", &freq)
        .replace("{0}", tele)
        .replace("{1}", &freq);
    let mut out = String::with_capacity(named.len());
    let mut args = [tele, freq.as_str()].into_iter();
    let mut rest = named.as_str();
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        out.push_str(args.next().unwrap_or("{}"));
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimCfg {
    pub workdir: PathBuf,
    pub nmc: usize,
    pub seed: u64,
    pub noise_seed: u64,
    pub nworkers: usize,
    pub remainder: RemainderPolicy,
    pub seed_scheme: SeedScheme,
    /// Common resolution every channel is smoothed to, arcmin.
    pub reference_fwhm: f64,
    pub iter: usize,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("workdir"),
            nmc: 1,
            seed: 10,
            noise_seed: 10,
            nworkers: 1,
            remainder: RemainderPolicy::default(),
            seed_scheme: SeedScheme::default(),
            reference_fwhm: REFERENCE_FWHM_ARCMIN,
            iter: 3,
        }
    }
}

/// Everything a run needs, loaded once and shared read-only by all workers.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub channels: Vec<Channel>,
    pub sky: SkyDataCfg,
    pub sim: SimCfg,
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| SimError::resource(path, e.to_string()))?;
    serde_yaml::from_reader(file)
        .map_err(|e| SimError::config(format!("{}: {}", path.display(), e)))
}

impl RunConfig {
    pub fn load(inst_file: &Path, data_file: &Path, sim: SimCfg) -> Result<Self> {
        let inst: InstrumentCfg = load_yaml(inst_file)?;
        let sky: SkyDataCfg = load_yaml(data_file)?;
        let cfg = Self {
            channels: inst.channels,
            sky,
            sim,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(SimError::config("the instrument has no channels"));
        }
        self.sky.default_lmax()?;
        if self.sim.nmc == 0 {
            return Err(SimError::config("at least one Monte Carlo trial is required"));
        }
        if self.sim.nworkers == 0 || self.sim.nworkers > self.channels.len() {
            return Err(SimError::config(format!(
                "{} workers cannot share {} channels",
                self.sim.nworkers,
                self.channels.len()
            )));
        }
        for channel in &self.channels {
            channel.validate()?;
            smoothing_angle(self.sim.reference_fwhm, channel.fwhm)?;
        }
        // observed maps are named by frequency only
        let writer = OutputWriter::new(&self.sim.workdir, self.sky.nside);
        let mut seen = HashMap::new();
        for (i, channel) in self.channels.iter().enumerate() {
            if let Some(j) = seen.insert(writer.sky_path(channel.freq, 0), i) {
                return Err(SimError::config(format!(
                    "channels {} ({}) and {} ({}) share {} GHz and would write the same sky map",
                    j, self.channels[j].tele, i, channel.tele, channel.freq
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(freq: f64, fwhm: f64) -> Channel {
        Channel {
            freq,
            fwhm,
            tele: "LFT".into(),
            sens: 30.0,
            gain: 1.0,
        }
    }

    fn sky() -> SkyDataCfg {
        SkyDataCfg {
            gal_dir: PathBuf::from("/data/gal"),
            gal_base_name: "gal_{tele}_{freq}.fits".into(),
            cmb_spectrum: PathBuf::from("cl.txt"),
            tensor_spectrum: None,
            tensor_ratio: 0.0,
            spectrum_units: SpectrumUnits::Cl,
            nside: 16,
        }
    }

    #[test]
    fn templates_follow_both_placeholder_styles() {
        assert_eq!(render_template("alm_{tele}_{freq}.fits", "MFT", 100.0), "alm_MFT_100.fits");
        assert_eq!(render_template("alm_{}_{}GHz.fits", "LFT", 68.4), "alm_LFT_68GHz.fits");
        assert_eq!(render_template("alm_{1}_{0}.fits", "HFT", 402.0), "alm_402_HFT.fits");
        assert_eq!(
            sky().foreground_path(&channel(40.0, 70.5)),
            PathBuf::from("/data/gal/gal_LFT_40.fits")
        );
    }

    #[test]
    fn band_limit_follows_nside() {
        assert_eq!(sky().default_lmax().unwrap(), 47);
        let mut s = sky();
        s.nside = 1;
        assert_eq!(s.default_lmax().unwrap(), 2);
        for nside in [0, 12] {
            s.nside = nside;
            assert!(s.default_lmax().unwrap_err().is_configuration());
        }
    }

    #[test]
    fn instrument_yaml_defaults_gain() {
        let inst: InstrumentCfg = serde_yaml::from_str(
            "channels:\n  - {freq: 40.0, fwhm: 70.5, tele: LFT, sens: 37.42}\n",
        )
        .unwrap();
        assert_eq!(inst.channels[0].gain, 1.0);
        assert_eq!(inst.channels[0].tele, "LFT");
    }

    #[test]
    fn validation_catches_bad_runs() {
        let good = RunConfig {
            channels: vec![channel(40.0, 70.5), channel(50.0, 58.5)],
            sky: sky(),
            sim: SimCfg {
                nworkers: 2,
                ..SimCfg::default()
            },
        };
        assert!(good.validate().is_ok());

        let mut too_many = good.clone();
        too_many.sim.nworkers = 3;
        assert!(too_many.validate().unwrap_err().is_configuration());

        let mut wide_beam = good.clone();
        wide_beam.channels[1].fwhm = 80.0;
        assert!(wide_beam.validate().unwrap_err().is_configuration());

        let mut shared_freq = good.clone();
        shared_freq.channels[1].freq = 40.0;
        shared_freq.channels[1].tele = "MFT".into();
        let err = shared_freq.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("LFT") && err.to_string().contains("MFT"));

        let mut bad_nside = good;
        bad_nside.sky.nside = 12;
        assert!(bad_nside.validate().is_err());
    }
}
