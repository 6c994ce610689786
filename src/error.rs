use std::path::PathBuf;

use thiserror::Error;

/// Failures while locating or parsing dataset files.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dataset file: {0}")]
    Format(String),
}

/// Failures while turning an uploaded image into model input.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not encode image: {0}")]
    Encode(String),
}

/// Errors surfaced by the training session.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("training is already running")]
    AlreadyRunning,

    #[error("no model has been trained yet")]
    NoModel,

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("training thread panicked: {0}")]
    Panicked(String),
}
