use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dimensions must be positive: got input_dim={input_dim}, hidden_dim={hidden_dim}")]
    ZeroDimension { input_dim: usize, hidden_dim: usize },
    #[error("hidden_dim ({hidden_dim}) must not exceed input_dim ({input_dim})")]
    HiddenExceedsInput { input_dim: usize, hidden_dim: usize },
    #[error("parameter shape mismatch: expected {expected:?}, got {got:?}")]
    ParamShape { expected: (usize, usize), got: (usize, usize) },
    #[error("batch_size must be positive")]
    EmptyBatch,
    #[error("progress_every must be positive")]
    ZeroProgressInterval,
    #[error("sparsity must lie in [0, 1), got {0}")]
    InvalidSparsity(f64),
    #[error("importance must be finite and non-negative, got {0}")]
    InvalidImportance(f64),
    #[error("learning rate must be finite and non-negative, got {0}")]
    InvalidLearningRate(f64),
    #[error("unknown activation '{0}' (expected linear or relu)")]
    UnknownActivation(String),
    #[error("unknown learning-rate schedule '{0}' (expected constant, linear, cosine or exponential)")]
    UnknownSchedule(String),
    #[error("unknown model variant '{0}' (expected importance or sparse)")]
    UnknownVariant(String),
    #[error("unknown optimizer '{0}' (expected sgd or adamw)")]
    UnknownOptimizer(String),
    #[error("invalid value '{value}' for --{key}")]
    InvalidArgument { key: String, value: String },
    #[error("training is already in progress")]
    AlreadyTraining,
}

pub type Result<T> = std::result::Result<T, Error>;
