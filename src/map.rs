use ndarray::{Array2, ArrayView1, ArrayViewMut1};

use crate::{
    error::{Result, SimError},
    healpix::{is_valid_nside, nside2npix},
};

pub const STOKES_NAMES: [&str; 3] = ["I_STOKES", "Q_STOKES", "U_STOKES"];

/// A full-sky RING-ordered map with one (I) or three (I, Q, U) components.
#[derive(Clone, Debug, PartialEq)]
pub struct SkyMap {
    nside: usize,
    data: Array2<f64>,
}

impl SkyMap {
    pub fn zeros(nside: usize, ncomp: usize) -> Self {
        Self {
            nside,
            data: Array2::zeros((ncomp, nside2npix(nside))),
        }
    }

    pub fn from_array(nside: usize, data: Array2<f64>) -> Result<Self> {
        if !is_valid_nside(nside) {
            return Err(SimError::config(format!("invalid nside {}", nside)));
        }
        let ncomp = data.shape()[0];
        if ncomp != 1 && ncomp != 3 {
            return Err(SimError::numeric(format!(
                "a sky map has 1 or 3 components, got {}",
                ncomp
            )));
        }
        if data.shape()[1] != nside2npix(nside) {
            return Err(SimError::numeric(format!(
                "{} pixels do not match nside {}",
                data.shape()[1],
                nside
            )));
        }
        Ok(Self { nside, data })
    }

    pub fn nside(&self) -> usize {
        self.nside
    }

    pub fn npix(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn ncomp(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn is_polarized(&self) -> bool {
        self.ncomp() == 3
    }

    pub fn component(&self, c: usize) -> ArrayView1<f64> {
        self.data.row(c)
    }

    pub fn component_mut(&mut self, c: usize) -> ArrayViewMut1<f64> {
        self.data.row_mut(c)
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn sub(&self, other: &SkyMap) -> Result<SkyMap> {
        if self.nside != other.nside || self.ncomp() != other.ncomp() {
            return Err(SimError::numeric("map shapes differ"));
        }
        Ok(SkyMap {
            nside: self.nside,
            data: &self.data - &other.data,
        })
    }
}
