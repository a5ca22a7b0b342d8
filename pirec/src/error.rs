use thiserror::Error;

/// Errors returned by the PiRec runner.
#[derive(Debug, Error)]
pub enum PiRecError {
    #[error("pirec: io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pirec: failed to parse config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("pirec: tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("pirec: image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("pirec: dataset error: {0}")]
    Dataset(String),

    #[error("pirec: checkpoint {name}: {reason}")]
    Checkpoint { name: String, reason: String },

    #[error("pirec: {0} evaluated outside inference mode")]
    OutsideInference(String),
}

impl PiRecError {
    pub(crate) fn checkpoint(name: &str, reason: impl Into<String>) -> Self {
        PiRecError::Checkpoint {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
