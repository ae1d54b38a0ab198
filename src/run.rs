//! The worker ensemble: one thread per rank, each owning a fixed block of
//! channels, stepping through the trials in lock-step.

use std::{
    any::Any,
    ops::Range,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Barrier,
    },
    thread,
    time::Instant,
};

use tracing::{debug, error, info, info_span, warn};

use crate::{
    alm::Alm,
    config::RunConfig,
    error::{Result, SimError},
    fits::read_alm,
    output::OutputWriter,
    partition::{SeedPlan, SeedScheme, WorkPartitioner, WorkUnit},
    sht::{HealpixSht, SignalTransform},
    synth::SkyComponentSynthesizer,
};

/// Foreground alm files carry I, Q and U in extensions 1 to 3.
const FOREGROUND_HDUS: [usize; 3] = [1, 2, 3];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub trials: usize,
    pub units: usize,
    pub cmb_files: usize,
    pub sky_files: usize,
    /// Channels left out by `RemainderPolicy::Drop`.
    pub unassigned: Vec<usize>,
}

#[derive(Clone, Copy, Debug, Default)]
struct WorkerStats {
    trials: usize,
    units: usize,
    cmb_files: usize,
    sky_files: usize,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs `f`, turning a panic into an error so the barrier protocol survives it.
fn guarded<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(payload) => Err(SimError::numeric(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

struct Ensemble<'a, T: SignalTransform> {
    cfg: &'a RunConfig,
    partitioner: &'a WorkPartitioner,
    plan: &'a SeedPlan,
    synth: &'a SkyComponentSynthesizer<'a, T>,
    writer: &'a OutputWriter,
    barrier: Barrier,
    abort: AtomicBool,
}

impl<'a, T: SignalTransform + Sync> Ensemble<'a, T> {
    fn fail(&self, unit: WorkUnit, source: SimError) -> SimError {
        self.abort.store(true, Ordering::SeqCst);
        let e = SimError::Worker {
            rank: unit.rank,
            trial: unit.trial,
            channel: unit.channel,
            source: Box::new(source),
        };
        error!("{}", e);
        e
    }

    fn load_foregrounds(&self, rank: usize, channels: Range<usize>) -> Result<Vec<Alm>> {
        channels
            .map(|c| {
                let path = self.cfg.sky.foreground_path(&self.cfg.channels[c]);
                debug!("loading foreground {}", path.display());
                guarded(|| read_alm(&path, &FOREGROUND_HDUS)).map_err(|e| {
                    self.fail(
                        WorkUnit {
                            trial: 0,
                            rank,
                            channel: c,
                        },
                        e,
                    )
                })
            })
            .collect()
    }

    fn process(&self, unit: WorkUnit, foreground: &Alm, write_cmb: bool, stats: &mut WorkerStats) -> Result<()> {
        let channel = &self.cfg.channels[unit.channel];
        let seeds = self.plan.seeds(&unit);
        debug!(
            "trial {} channel {} ({} GHz): signal seed {}, noise seed {}",
            unit.trial, unit.channel, channel.freq, seeds.signal, seeds.noise
        );
        let sky = self.synth.synthesize(seeds, foreground, channel)?;
        if write_cmb {
            self.writer.write_pure(&sky.cmb, unit.trial)?;
            stats.cmb_files += 1;
        }
        self.writer.write_observed(&sky.observed, channel.freq, unit.trial)?;
        stats.sky_files += 1;
        stats.units += 1;
        Ok(())
    }

    fn worker(&self, rank: usize) -> Result<WorkerStats> {
        let _span = info_span!("worker", rank).entered();
        let channels = self.partitioner.channels_for(rank);
        let mut stats = WorkerStats::default();

        let mut failure = None;
        let foregrounds = match self.load_foregrounds(rank, channels.clone()) {
            Ok(f) => f,
            Err(e) => {
                failure = Some(e);
                Vec::new()
            }
        };
        if self.barrier.wait().is_leader() && !self.abort.load(Ordering::SeqCst) {
            info!("setup complete, starting {} trials", self.cfg.sim.nmc);
        }

        if !self.abort.load(Ordering::SeqCst) {
            for trial in 0..self.cfg.sim.nmc {
                let started = Instant::now();
                for (k, channel) in channels.clone().enumerate() {
                    let unit = WorkUnit {
                        trial,
                        rank,
                        channel,
                    };
                    // the CMB map is the same for every channel of a trial
                    let write_cmb = channel == 0;
                    if let Err(e) = guarded(|| self.process(unit, &foregrounds[k], write_cmb, &mut stats)) {
                        failure = Some(self.fail(unit, e));
                        break;
                    }
                }
                let aborted = self.abort.load(Ordering::SeqCst);
                if self.barrier.wait().is_leader() && !aborted {
                    info!(
                        "trial {}/{} done in {:.2} s",
                        trial + 1,
                        self.cfg.sim.nmc,
                        started.elapsed().as_secs_f64()
                    );
                }
                if self.abort.load(Ordering::SeqCst) {
                    break;
                }
                stats.trials += 1;
            }
        }

        self.barrier.wait();
        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

/// Runs the whole simulation with the built-in transform.
pub fn run(cfg: &RunConfig) -> Result<RunSummary> {
    run_with(cfg, &HealpixSht::new(cfg.sim.iter))
}

pub fn run_with<T: SignalTransform + Sync>(cfg: &RunConfig, transform: &T) -> Result<RunSummary> {
    cfg.validate()?;
    let nworkers = cfg.sim.nworkers;
    let partitioner = WorkPartitioner::new(cfg.channels.len(), nworkers, cfg.sim.remainder)?;
    let unassigned: Vec<usize> = partitioner.unassigned().collect();
    if !unassigned.is_empty() {
        warn!(
            "{} channels do not fit into {} equal blocks; channels {:?} will not be simulated",
            cfg.channels.len(),
            nworkers,
            unassigned
        );
    }
    let plan = SeedPlan::new(&partitioner, cfg.sim.seed, cfg.sim.noise_seed, cfg.sim.seed_scheme);
    if plan.scheme == SeedScheme::Legacy {
        warn!("legacy noise seeds repeat across workers and trials; noise realisations will be correlated");
    }

    let spectrum = cfg.sky.load_spectrum()?;
    let writer = OutputWriter::new(&cfg.sim.workdir, cfg.sky.nside);
    writer.create_dirs()?;
    let synth = SkyComponentSynthesizer::new(transform, &spectrum, cfg.sky.nside, cfg.sim.reference_fwhm);

    let ensemble = Ensemble {
        cfg,
        partitioner: &partitioner,
        plan: &plan,
        synth: &synth,
        writer: &writer,
        barrier: Barrier::new(nworkers),
        abort: AtomicBool::new(false),
    };

    let results: Vec<Result<WorkerStats>> = thread::scope(|s| {
        let handles: Vec<_> = (0..nworkers)
            .map(|rank| {
                let ensemble = &ensemble;
                s.spawn(move || ensemble.worker(rank))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join().unwrap_or_else(|payload| {
                    Err(SimError::numeric(format!(
                        "worker {} died: {}",
                        rank,
                        panic_message(payload.as_ref())
                    )))
                })
            })
            .collect()
    });

    let mut summary = RunSummary {
        trials: cfg.sim.nmc,
        unassigned,
        ..RunSummary::default()
    };
    for r in results {
        let stats = r?;
        summary.trials = summary.trials.min(stats.trials);
        summary.units += stats.units;
        summary.cmb_files += stats.cmb_files;
        summary.sky_files += stats.sky_files;
    }
    info!(
        "finished {} trials: {} work units, {} CMB maps, {} observed maps",
        summary.trials, summary.units, summary.cmb_files, summary.sky_files
    );
    Ok(summary)
}
