//! Error types for GardenSonic

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GardenSonicError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Asset loading error: {0}")]
    AssetLoad(String),

    /// The live synthesis process refused to start in this environment.
    #[error("Synthesis handshake failed: {0}")]
    Handshake(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid emitter record {desc:?}: {reason}")]
    RecordParse { desc: String, reason: String },

    #[error("Catalog error: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("No resource pool named {0:?}")]
    UnknownPool(String),

    #[error("A resource pool named {0:?} is already registered")]
    DuplicatePool(String),
}

pub type Result<T> = std::result::Result<T, GardenSonicError>;
