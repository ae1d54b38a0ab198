use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("cannot load {}: {message}", path.display())]
    Resource { path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("numeric error: {message}")]
    Numeric { message: String },

    #[error("worker {rank} failed at trial {trial}, channel {channel}: {source}")]
    Worker {
        rank: usize,
        trial: usize,
        channel: usize,
        #[source]
        source: Box<SimError>,
    },
}

impl SimError {
    pub fn config(message: impl Into<String>) -> Self {
        SimError::Configuration {
            message: message.into(),
        }
    }

    pub fn resource(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        SimError::Resource {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        SimError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        SimError::Numeric {
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        match self {
            SimError::Configuration { .. } => true,
            SimError::Worker { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
