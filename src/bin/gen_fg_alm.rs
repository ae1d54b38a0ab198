extern crate cmb_sky_sim;

use std::{
    fs::{
        create_dir_all
        , File
    }
};

use anyhow::{
    Context
    , Result
};

use clap::{
    App
    ,Arg
};

use cmb_sky_sim::{
    config::{
        InstrumentCfg
        , SkyDataCfg
    }
    , fits::{
        write_alm
    }
    , partition::{
        unit_rng
        , SIGNAL_STREAM
    }
    , sht::{
        HealpixSht
        , SignalTransform
    }
    , spectrum::{
        PowerSpectrum
    }
};

// synchrotron-like
const SPECTRAL_INDEX: f64 = -3.0;
const PIVOT_GHZ: f64 = 100.0;

fn foreground_spectrum(amplitude: f64, freq: f64, lmax: usize) -> Result<PowerSpectrum> {
    let scale = (freq / PIVOT_GHZ).powf(2.0 * SPECTRAL_INDEX);
    let tt: Vec<f64> = (0..=lmax)
        .map(|l| amplitude * scale * (l as f64 + 1.0).powf(-2.4))
        .collect();
    let ee = tt.iter().map(|v| 0.1 * v).collect();
    let bb = tt.iter().map(|v| 0.05 * v).collect();
    Ok(PowerSpectrum::new(tt, ee, bb, vec![0.0; lmax + 1])?)
}

fn main() -> Result<()> {
    let matches = App::new("gen_fg_alm")
        .arg(
            Arg::new("inst_file")
                .short('i')
                .long("inst_file")
                .takes_value(true)
                .value_name("yaml")
                .required(true)
                .help("instrument channels"),
        )
        .arg(
            Arg::new("data_file")
                .short('d')
                .long("data_file")
                .takes_value(true)
                .value_name("yaml")
                .required(true)
                .help("sky data file giving gal_dir, gal_base_name and nside"),
        )
        .arg(
            Arg::new("lmax")
                .short('l')
                .long("lmax")
                .takes_value(true)
                .value_name("lmax")
                .help("band limit, 3 nside - 1 by default"),
        )
        .arg(
            Arg::new("amplitude")
                .short('a')
                .long("amplitude")
                .takes_value(true)
                .value_name("uK^2")
                .default_value("100")
                .help("TT power at l=0 and the pivot frequency"),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .takes_value(true)
                .value_name("seed")
                .default_value("2024")
                .help("random seed"),
        )
        .get_matches();

    let inst_file = matches.value_of("inst_file").context("missing --inst_file")?;
    let data_file = matches.value_of("data_file").context("missing --data_file")?;
    let inst: InstrumentCfg = serde_yaml::from_reader(File::open(inst_file).context("open instrument file")?)?;
    let sky: SkyDataCfg = serde_yaml::from_reader(File::open(data_file).context("open sky data file")?)?;
    let lmax = match matches.value_of("lmax") {
        Some(v) => v.parse::<usize>()?,
        None => sky.default_lmax()?,
    };
    let amplitude = matches.value_of("amplitude").unwrap_or("100").parse::<f64>()?;
    let seed = matches.value_of("seed").unwrap_or("2024").parse::<u64>()?;

    create_dir_all(&sky.gal_dir).with_context(|| format!("creating {}", sky.gal_dir.display()))?;
    let sht = HealpixSht::default();
    for (i, ch) in inst.channels.iter().enumerate() {
        let spectrum = foreground_spectrum(amplitude, ch.freq, lmax)?;
        let mut rng = unit_rng(seed.wrapping_add(i as u64), SIGNAL_STREAM);
        let alm = sht.random_alm(&spectrum, lmax, &mut rng)?;
        let path = sky.foreground_path(ch);
        write_alm(&path, &alm)?;
        println!("{} GHz -> {}", ch.freq, path.display());
    }
    Ok(())
}
