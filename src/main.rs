extern crate cmb_sky_sim;

use std::{
    path::PathBuf
    , process::ExitCode
};

use anyhow::{
    Context
    , Result
};

use clap::{
    App
    ,Arg
    ,ArgMatches
};

use tracing::error;

use cmb_sky_sim::{
    config::{
        RunConfig
        , SimCfg
    }
    , logging::{
        init_logger
        , log_header
    }
    , partition::{
        RemainderPolicy
        , SeedScheme
    }
    , run::run
    , REFERENCE_FWHM_ARCMIN
};

fn parsed<T>(matches: &ArgMatches, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = matches
        .value_of(name)
        .with_context(|| format!("missing --{}", name))?;
    raw.parse::<T>()
        .with_context(|| format!("invalid value '{}' for --{}", raw, name))
}

fn sim_cfg(matches: &ArgMatches) -> Result<SimCfg> {
    Ok(SimCfg {
        workdir: PathBuf::from(matches.value_of("workdir").unwrap_or("workdir")),
        nmc: parsed(matches, "nmc")?,
        seed: parsed(matches, "seed")?,
        noise_seed: parsed(matches, "noise_seed")?,
        nworkers: parsed(matches, "nworkers")?,
        remainder: parsed::<RemainderPolicy>(matches, "remainder")?,
        seed_scheme: parsed::<SeedScheme>(matches, "seed_scheme")?,
        reference_fwhm: parsed(matches, "reference_fwhm")?,
        iter: parsed(matches, "iter")?,
    })
}

fn simulate(matches: &ArgMatches) -> Result<()> {
    let inst_file = PathBuf::from(matches.value_of("inst_file").context("missing --inst_file")?);
    let data_file = PathBuf::from(matches.value_of("data_file").context("missing --data_file")?);
    let cfg = RunConfig::load(&inst_file, &data_file, sim_cfg(matches)?)
        .with_context(|| format!("loading {} and {}", inst_file.display(), data_file.display()))?;
    log_header(&cfg);
    let summary = run(&cfg).context("simulation aborted")?;
    if !summary.unassigned.is_empty() {
        println!("channels not simulated: {:?}", summary.unassigned);
    }
    Ok(())
}

fn main() -> ExitCode {
    let reference = REFERENCE_FWHM_ARCMIN.to_string();
    let matches = App::new("cmb_sky_sim")
        .about("Monte Carlo CMB + foreground + noise sky maps for a multi-frequency instrument")
        .arg(
            Arg::new("workdir")
                .short('w')
                .long("workdir")
                .takes_value(true)
                .value_name("dir")
                .default_value("workdir")
                .help("output root; maps go to <dir>/cmb and <dir>/sky"),
        )
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
                .help("sky data: spectra, foreground alms, nside"),
        )
        .arg(
            Arg::new("nmc")
                .short('n')
                .long("nmc")
                .takes_value(true)
                .value_name("n")
                .default_value("1")
                .help("number of Monte Carlo trials"),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .takes_value(true)
                .value_name("seed")
                .default_value("10")
                .help("base CMB seed"),
        )
        .arg(
            Arg::new("noise_seed")
                .long("noise-seed")
                .takes_value(true)
                .value_name("seed")
                .default_value("10")
                .help("base noise seed"),
        )
        .arg(
            Arg::new("nworkers")
                .short('p')
                .long("nworkers")
                .takes_value(true)
                .value_name("n")
                .default_value("1")
                .help("number of parallel workers"),
        )
        .arg(
            Arg::new("remainder")
                .long("remainder")
                .takes_value(true)
                .possible_values(["reject", "drop", "last-worker"])
                .default_value("reject")
                .help("what to do with channels left over by equal blocks"),
        )
        .arg(
            Arg::new("seed_scheme")
                .long("seed-scheme")
                .takes_value(true)
                .possible_values(["hashed", "legacy"])
                .default_value("hashed")
                .help("noise seed derivation"),
        )
        .arg(
            Arg::new("reference_fwhm")
                .long("reference-fwhm")
                .takes_value(true)
                .value_name("arcmin")
                .default_value(&reference)
                .help("common resolution all channels are smoothed to"),
        )
        .arg(
            Arg::new("iter")
                .long("iter")
                .takes_value(true)
                .value_name("n")
                .default_value("3")
                .help("map2alm refinement iterations"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("debug logging"),
        )
        .arg(
            Arg::new("log_file")
                .long("log-file")
                .takes_value(true)
                .value_name("file")
                .help("also write the log to this file"),
        )
        .get_matches();

    let log_file = matches.value_of("log_file").map(PathBuf::from);
    if let Err(e) = init_logger(matches.is_present("verbose"), log_file.as_deref()) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match simulate(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}
