use std::{fs::File, path::Path, sync::Mutex};

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    config::RunConfig,
    error::{Result, SimError},
};

/// Console logging on stderr plus, optionally, a plain copy in `log_file`.
/// `RUST_LOG` overrides the default filter.
pub fn init_logger(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cmb_sky_sim=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cmb_sky_sim=info"))
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(|e| SimError::io(path, e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_thread_names(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| SimError::config(format!("logger already installed: {}", e)))
}

pub fn log_header(cfg: &RunConfig) {
    info!("==============================================================");
    info!("  Monte Carlo CMB sky simulation, {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("==============================================================");
    info!("working directory: {}", cfg.sim.workdir.display());
    info!(
        "{} channels, nside {}, {} trials, {} workers",
        cfg.channels.len(),
        cfg.sky.nside,
        cfg.sim.nmc,
        cfg.sim.nworkers
    );
    info!(
        "seed {}, noise seed {}, seed scheme {}, remainder policy {}",
        cfg.sim.seed, cfg.sim.noise_seed, cfg.sim.seed_scheme, cfg.sim.remainder
    );
    info!("reference resolution {} arcmin", cfg.sim.reference_fwhm);
    for (i, ch) in cfg.channels.iter().enumerate() {
        info!(
            "  channel {:>2}: {:>6} GHz  {:>6.2}'  {:<4} sens {:.2}  gain {}",
            i, ch.freq, ch.fwhm, ch.tele, ch.sens, ch.gain
        );
    }
}
