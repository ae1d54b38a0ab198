use std::{
    f64::consts::PI,
    fs::read_to_string,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SimError},
    fits::read_bintables,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumUnits {
    /// Plain angular power C_l.
    #[default]
    Cl,
    /// l(l+1) C_l / 2pi, as written by Boltzmann codes.
    Dl,
}

/// Highest multipole a spectrum file may list.
pub const MAX_MULTIPOLE: usize = 100_000;

fn multipole(v: f64) -> std::result::Result<usize, String> {
    if v >= 0.0 && v.fract() == 0.0 && v <= MAX_MULTIPOLE as f64 {
        Ok(v as usize)
    } else {
        Err(format!("invalid multipole {}", v))
    }
}

/// TT, EE, BB and TE angular power indexed by multipole.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerSpectrum {
    pub tt: Vec<f64>,
    pub ee: Vec<f64>,
    pub bb: Vec<f64>,
    pub te: Vec<f64>,
}

impl PowerSpectrum {
    pub fn new(tt: Vec<f64>, ee: Vec<f64>, bb: Vec<f64>, te: Vec<f64>) -> Result<Self> {
        let n = tt.len();
        if n == 0 || ee.len() != n || bb.len() != n || te.len() != n {
            return Err(SimError::numeric("power spectrum columns differ in length"));
        }
        let s = Self { tt, ee, bb, te };
        s.check_physical()?;
        Ok(s)
    }

    pub fn lmax(&self) -> usize {
        self.tt.len() - 1
    }

    fn check_physical(&self) -> Result<()> {
        for l in 0..self.tt.len() {
            let (tt, ee, bb, te) = (self.tt[l], self.ee[l], self.bb[l], self.te[l]);
            if ![tt, ee, bb, te].iter().all(|v| v.is_finite()) {
                return Err(SimError::numeric(format!("non-finite power at l={}", l)));
            }
            if tt < 0.0 || ee < 0.0 || bb < 0.0 {
                return Err(SimError::numeric(format!("negative auto-power at l={}", l)));
            }
        }
        Ok(())
    }

    /// Loads a whitespace table (`l TT EE BB TE` or `TT EE BB TE` rows) or a
    /// FITS table whose first four columns are TT, EE, BB, TE.
    pub fn from_file(path: impl AsRef<Path>, units: SpectrumUnits) -> Result<Self> {
        let path = path.as_ref();
        let is_fits = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("fits") || e.eq_ignore_ascii_case("fit"))
            .unwrap_or(false);
        let mut s = if is_fits {
            Self::from_fits(path)?
        } else {
            let text = read_to_string(path).map_err(|e| SimError::resource(path, e.to_string()))?;
            Self::parse_text(&text).map_err(|msg| SimError::resource(path, msg))?
        };
        if units == SpectrumUnits::Dl {
            s.dl_to_cl();
        }
        s.check_physical()?;
        Ok(s)
    }

    fn from_fits(path: &Path) -> Result<Self> {
        let tables = read_bintables(path)?;
        let table = tables
            .first()
            .ok_or_else(|| SimError::resource(path, "no spectrum extension"))?;
        if table.columns.len() < 4 {
            return Err(SimError::resource(path, "expected TT, EE, BB and TE columns"));
        }
        let col = |i: usize| table.columns[i].data.to_f64();
        Self::new(col(0), col(1), col(2), col(3))
    }

    fn parse_text(text: &str) -> std::result::Result<Self, String> {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|x| x.parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| format!("line {}: {}", n + 1, e))?;
            rows.push(row);
        }
        let ncol = rows.first().map(|r| r.len()).ok_or("empty power spectrum")?;
        if rows.iter().any(|r| r.len() != ncol) {
            return Err("rows have differing column counts".into());
        }

        let (mut tt, mut ee, mut bb, mut te) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        match ncol {
            4 => {
                if rows.len() > MAX_MULTIPOLE + 1 {
                    return Err(format!("more than {} multipoles", MAX_MULTIPOLE + 1));
                }
                for r in &rows {
                    tt.push(r[0]);
                    ee.push(r[1]);
                    bb.push(r[2]);
                    te.push(r[3]);
                }
            }
            5 => {
                let ells = rows
                    .iter()
                    .map(|r| multipole(r[0]))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let lmax = ells.iter().copied().max().unwrap_or(0);
                tt = vec![0.0; lmax + 1];
                ee = vec![0.0; lmax + 1];
                bb = vec![0.0; lmax + 1];
                te = vec![0.0; lmax + 1];
                for (&l, r) in ells.iter().zip(&rows) {
                    tt[l] = r[1];
                    ee[l] = r[2];
                    bb[l] = r[3];
                    te[l] = r[4];
                }
            }
            n => return Err(format!("expected 4 or 5 columns, found {}", n)),
        }
        Self::new(tt, ee, bb, te).map_err(|e| e.to_string())
    }

    fn dl_to_cl(&mut self) {
        for l in 0..self.tt.len() {
            let f = if l == 0 {
                0.0
            } else {
                2.0 * PI / (l as f64 * (l as f64 + 1.0))
            };
            self.tt[l] *= f;
            self.ee[l] *= f;
            self.bb[l] *= f;
            self.te[l] *= f;
        }
    }

    /// Adds `ratio` times a tensor template computed for r = 1.
    pub fn with_tensor(&self, tensor: &PowerSpectrum, ratio: f64) -> Result<Self> {
        if !(ratio.is_finite() && ratio >= 0.0) {
            return Err(SimError::config(format!("invalid tensor-to-scalar ratio {}", ratio)));
        }
        let n = self.tt.len();
        let at = |v: &Vec<f64>, l: usize| v.get(l).copied().unwrap_or(0.0);
        let mix = |a: &Vec<f64>, b: &Vec<f64>| -> Vec<f64> {
            (0..n).map(|l| a[l] + ratio * at(b, l)).collect()
        };
        Self::new(
            mix(&self.tt, &tensor.tt),
            mix(&self.ee, &tensor.ee),
            mix(&self.bb, &tensor.bb),
            mix(&self.te, &tensor.te),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_indexed_text() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# l TT EE BB TE").unwrap();
        writeln!(f, "2 10.0 1.0 0.0 2.0").unwrap();
        writeln!(f, "3 8.0 0.5 0.0 -1.0").unwrap();
        let s = PowerSpectrum::from_file(f.path(), SpectrumUnits::Cl).unwrap();
        assert_eq!(s.lmax(), 3);
        assert_eq!(s.tt, vec![0.0, 0.0, 10.0, 8.0]);
        assert_eq!(s.te[3], -1.0);
    }

    #[test]
    fn converts_dl() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "0 0 0 0").unwrap();
        writeln!(f, "0 0 0 0").unwrap();
        writeln!(f, "6.0 3.0 0.0 1.5").unwrap();
        let s = PowerSpectrum::from_file(f.path(), SpectrumUnits::Dl).unwrap();
        assert!((s.tt[2] - 2.0 * PI).abs() < 1e-12);
        assert!((s.ee[2] - PI).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_multipoles_are_resource_errors() {
        for bad in ["1e30", "1e12", "-2", "2.5", "NaN"] {
            let mut f = tempfile::NamedTempFile::new().unwrap();
            writeln!(f, "2 1 1 1 0").unwrap();
            writeln!(f, "{} 1 1 1 0", bad).unwrap();
            let err = PowerSpectrum::from_file(f.path(), SpectrumUnits::Cl).unwrap_err();
            assert!(matches!(err, SimError::Resource { .. }), "{}: {:?}", bad, err);
        }
    }

    #[test]
    fn rejects_negative_power() {
        let err = PowerSpectrum::new(vec![1.0, -1.0], vec![0.0; 2], vec![0.0; 2], vec![0.0; 2]);
        assert!(matches!(err, Err(SimError::Numeric { .. })));
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let err = PowerSpectrum::from_file("/nonexistent/cl.txt", SpectrumUnits::Cl).unwrap_err();
        assert!(matches!(err, SimError::Resource { .. }));
    }

    #[test]
    fn tensor_template_adds_bb() {
        let scalar = PowerSpectrum::new(vec![1.0; 4], vec![0.5; 4], vec![0.0; 4], vec![0.1; 4]).unwrap();
        let tensor = PowerSpectrum::new(vec![0.2; 3], vec![0.1; 3], vec![0.05; 3], vec![0.0; 3]).unwrap();
        let mixed = scalar.with_tensor(&tensor, 0.1).unwrap();
        assert_eq!(mixed.lmax(), 3);
        assert!((mixed.bb[2] - 0.005).abs() < 1e-15);
        assert_eq!(mixed.bb[3], 0.0);
        assert!(scalar.with_tensor(&tensor, -1.0).is_err());
    }
}
