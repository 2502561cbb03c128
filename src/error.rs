use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("unable to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("training error: {0}")]
    Training(String),
    #[error("session error: {0}")]
    Session(String),
}

impl DedupError {
    pub fn io(path: &Path, source: std::io::Error) -> DedupError {
        DedupError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn config<T: std::fmt::Display>(msg: T) -> DedupError {
        DedupError::Config(msg.to_string())
    }

    pub fn invalid_data<T: std::fmt::Display>(msg: T) -> DedupError {
        DedupError::InvalidData(msg.to_string())
    }

    pub fn training<T: std::fmt::Display>(msg: T) -> DedupError {
        DedupError::Training(msg.to_string())
    }

    pub fn session<T: std::fmt::Display>(msg: T) -> DedupError {
        DedupError::Session(msg.to_string())
    }
}
