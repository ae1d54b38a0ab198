//! Monte Carlo simulation of multi-frequency CMB sky maps: a random CMB sky
//! drawn from a power spectrum, galactic foregrounds and white noise per
//! channel, smoothed to a common resolution.

#![allow(non_snake_case)]

pub mod alm;
pub mod config;
pub mod error;
pub mod fft;
pub mod fits;
pub mod healpix;
pub mod logging;
pub mod map;
pub mod noise;
pub mod output;
pub mod partition;
pub mod run;
pub mod sht;
pub mod spectrum;
pub mod synth;

pub use crate::{
    error::{Result, SimError},
    synth::REFERENCE_FWHM_ARCMIN,
};
