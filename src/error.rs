//! Error types for the spatialiser engine.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpatError>;

#[derive(Debug, Error)]
pub enum SpatError {
    /// Invalid configuration, detected before anything starts running.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure reading or parsing a configuration file.
    #[error("config file {path}: {message}")]
    ConfigFile { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OSC error: {0}")]
    Osc(#[from] rosc::OscError),

    #[error("MIDI error: {0}")]
    Midi(String),
}

impl SpatError {
    pub fn config(message: impl Into<String>) -> Self {
        SpatError::Config(message.into())
    }
}
