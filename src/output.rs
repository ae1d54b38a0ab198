use std::{
    fs::create_dir_all,
    path::PathBuf,
};

use tracing::debug;

use crate::{
    error::{Result, SimError},
    fits::write_map,
    map::SkyMap,
};

/// Lays out the per-trial CMB maps and per-channel observed maps under one
/// root directory. Existing files are replaced.
#[derive(Clone, Debug)]
pub struct OutputWriter {
    root: PathBuf,
    nside: usize,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>, nside: usize) -> Self {
        Self {
            root: root.into(),
            nside,
        }
    }

    pub fn cmb_dir(&self) -> PathBuf {
        self.root.join("cmb")
    }

    pub fn sky_dir(&self) -> PathBuf {
        self.root.join("sky")
    }

    pub fn cmb_path(&self, trial: usize) -> PathBuf {
        self.cmb_dir()
            .join(format!("cmb_nobeam_ns{}_{}.fits", self.nside, trial))
    }

    /// The frequency keeps its decimal point (`40.0`, `68.4`).
    pub fn sky_path(&self, freq: f64, trial: usize) -> PathBuf {
        self.sky_dir()
            .join(format!("sky_{:?}_sm_ns{}_{}.fits", freq, self.nside, trial))
    }

    pub fn create_dirs(&self) -> Result<()> {
        for dir in [self.cmb_dir(), self.sky_dir()] {
            create_dir_all(&dir).map_err(|e| SimError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn write_pure(&self, map: &SkyMap, trial: usize) -> Result<PathBuf> {
        self.put(map, self.cmb_path(trial))
    }

    pub fn write_observed(&self, map: &SkyMap, freq: f64, trial: usize) -> Result<PathBuf> {
        self.put(map, self.sky_path(freq, trial))
    }

    pub fn write(&self, pure: &SkyMap, observed: &SkyMap, freq: f64, trial: usize) -> Result<()> {
        self.write_pure(pure, trial)?;
        self.write_observed(observed, freq, trial)?;
        Ok(())
    }

    fn put(&self, map: &SkyMap, path: PathBuf) -> Result<PathBuf> {
        if map.nside() != self.nside {
            return Err(SimError::numeric(format!(
                "map has nside {} but the run writes nside {}",
                map.nside(),
                self.nside
            )));
        }
        if let Some(dir) = path.parent() {
            create_dir_all(dir).map_err(|e| SimError::io(dir, e))?;
        }
        write_map(&path, map)?;
        debug!("wrote {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::read_map;

    #[test]
    fn paths_follow_the_naming_template() {
        let w = OutputWriter::new("/out", 256);
        assert_eq!(w.cmb_path(3), PathBuf::from("/out/cmb/cmb_nobeam_ns256_3.fits"));
        assert_eq!(w.sky_path(40.0, 0), PathBuf::from("/out/sky/sky_40.0_sm_ns256_0.fits"));
        assert_eq!(w.sky_path(68.4, 12), PathBuf::from("/out/sky/sky_68.4_sm_ns256_12.fits"));
    }

    #[test]
    fn write_creates_directories_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let w = OutputWriter::new(dir.path().join("run"), 2);
        let mut map = SkyMap::zeros(2, 3);
        map.component_mut(1).fill(1.5);
        w.write(&map, &map, 100.0, 0).unwrap();

        map.component_mut(1).fill(-2.0);
        w.write_observed(&map, 100.0, 0).unwrap();
        assert_eq!(read_map(w.sky_path(100.0, 0)).unwrap(), map);
        assert_eq!(read_map(w.cmb_path(0)).unwrap().component(1)[0], 1.5);
    }

    #[test]
    fn unwritable_destination_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let w = OutputWriter::new(&blocker, 2);
        let err = w.write_pure(&SkyMap::zeros(2, 3), 0).unwrap_err();
        assert!(matches!(err, SimError::Io { .. }));
    }
}
