//! Static assignment of channels to workers and per-unit seed derivation.

use std::{fmt, ops::Range, str::FromStr};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// What happens to the `N mod P` channels left over by equal blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemainderPolicy {
    /// Leave them unassigned (logged as a warning).
    Drop,
    /// Append them to the block of the last rank.
    LastWorker,
    /// Refuse to run unless `P` divides `N`.
    #[default]
    Reject,
}

impl FromStr for RemainderPolicy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop" => Ok(RemainderPolicy::Drop),
            "last-worker" => Ok(RemainderPolicy::LastWorker),
            "reject" => Ok(RemainderPolicy::Reject),
            other => Err(SimError::config(format!("unknown remainder policy '{}'", other))),
        }
    }
}

impl fmt::Display for RemainderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemainderPolicy::Drop => "drop",
            RemainderPolicy::LastWorker => "last-worker",
            RemainderPolicy::Reject => "reject",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkPartitioner {
    nchannels: usize,
    nworkers: usize,
    policy: RemainderPolicy,
}

impl WorkPartitioner {
    pub fn new(nchannels: usize, nworkers: usize, policy: RemainderPolicy) -> Result<Self> {
        if nworkers == 0 {
            return Err(SimError::config("the number of workers must be positive"));
        }
        if nworkers > nchannels {
            return Err(SimError::config(format!(
                "{} workers for {} channels would leave a worker without channels",
                nworkers, nchannels
            )));
        }
        if policy == RemainderPolicy::Reject && nchannels % nworkers != 0 {
            return Err(SimError::config(format!(
                "{} channels do not split evenly over {} workers",
                nchannels, nworkers
            )));
        }
        Ok(Self {
            nchannels,
            nworkers,
            policy,
        })
    }

    pub fn nchannels(&self) -> usize {
        self.nchannels
    }

    pub fn nworkers(&self) -> usize {
        self.nworkers
    }

    pub fn block_size(&self) -> usize {
        self.nchannels / self.nworkers
    }

    /// Contiguous channel indices owned by `rank`.
    pub fn channels_for(&self, rank: usize) -> Range<usize> {
        assert!(rank < self.nworkers, "rank {} out of range", rank);
        let b = self.block_size();
        let start = rank * b;
        let end = if rank + 1 == self.nworkers && self.policy == RemainderPolicy::LastWorker {
            self.nchannels
        } else {
            start + b
        };
        start..end
    }

    /// Channels nobody processes; non-empty only under `RemainderPolicy::Drop`.
    pub fn unassigned(&self) -> Range<usize> {
        let covered = self.channels_for(self.nworkers - 1).end;
        covered..self.nchannels
    }

    pub fn owner_of(&self, channel: usize) -> Option<usize> {
        (0..self.nworkers).find(|&r| self.channels_for(r).contains(&channel))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkUnit {
    pub trial: usize,
    pub rank: usize,
    pub channel: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnitSeeds {
    pub signal: u64,
    pub noise: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedScheme {
    /// Noise seed is a mix of the base seed and `(trial, channel)`; unique per unit.
    #[default]
    Hashed,
    /// `base + 1000 N + t (k + 1)` for the k-th channel of a worker's block.
    /// Collides across workers and trials.
    Legacy,
}

impl FromStr for SeedScheme {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hashed" => Ok(SeedScheme::Hashed),
            "legacy" => Ok(SeedScheme::Legacy),
            other => Err(SimError::config(format!("unknown seed scheme '{}'", other))),
        }
    }
}

impl fmt::Display for SeedScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeedScheme::Hashed => "hashed",
            SeedScheme::Legacy => "legacy",
        })
    }
}

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

fn splitmix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedPlan {
    pub base_seed: u64,
    pub base_noise_seed: u64,
    pub scheme: SeedScheme,
    nchannels: usize,
    block_start: Vec<usize>,
}

impl SeedPlan {
    pub fn new(partitioner: &WorkPartitioner, base_seed: u64, base_noise_seed: u64, scheme: SeedScheme) -> Self {
        Self {
            base_seed,
            base_noise_seed,
            scheme,
            nchannels: partitioner.nchannels(),
            block_start: (0..partitioner.nworkers())
                .map(|r| partitioner.channels_for(r).start)
                .collect(),
        }
    }

    /// Shared by every channel of a trial so all frequencies see the same CMB sky.
    pub fn signal_seed(&self, trial: usize) -> u64 {
        self.base_seed.wrapping_add(trial as u64)
    }

    pub fn noise_seed(&self, unit: &WorkUnit) -> u64 {
        let n = self.nchannels as u64;
        let t = unit.trial as u64;
        match self.scheme {
            SeedScheme::Hashed => {
                let key = t.wrapping_mul(n).wrapping_add(unit.channel as u64);
                splitmix64(
                    self.base_noise_seed
                        .wrapping_add(key.wrapping_mul(GOLDEN_GAMMA)),
                )
            }
            SeedScheme::Legacy => {
                let k = (unit.channel - self.block_start[unit.rank]) as u64;
                self.base_noise_seed
                    .wrapping_add(1000 * n)
                    .wrapping_add(t.wrapping_mul(k + 1))
            }
        }
    }

    pub fn seeds(&self, unit: &WorkUnit) -> UnitSeeds {
        UnitSeeds {
            signal: self.signal_seed(unit.trial),
            noise: self.noise_seed(unit),
        }
    }
}

pub const SIGNAL_STREAM: u64 = 0;
pub const NOISE_STREAM: u64 = 1;

/// A fresh generator for one unit of work; never shared across units.
pub fn unit_rng(seed: u64, stream: u64) -> ChaCha20Rng {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}
