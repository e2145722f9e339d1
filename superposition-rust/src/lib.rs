//! Toy tied-weight autoencoder for studying superposition: more sparse input
//! features than hidden units, trained so that the Gram matrix `WᵗW` shows how
//! features share the hidden space.
//!
//! ```no_run
//! use superposition::{Model, ModelConfig, TrainConfig};
//!
//! let mut model = Model::new(&ModelConfig::new(20, 5).with_seed(7))?;
//! let report = model.train(TrainConfig { steps: 500, batch_size: 64, ..TrainConfig::default() })?;
//! let analysis = model.analyze_representation();
//! println!("loss {:.4e}, orthogonality {:.3}", report.final_loss, analysis.orthogonality);
//! # Ok::<(), superposition::Error>(())
//! ```

pub mod analysis;
pub mod batch;
pub mod config;
pub mod error;
pub mod linalg;
pub mod model;
pub mod optimizer;
pub mod train;

pub use analysis::{orthogonality, FeatureQuality, RepresentationAnalysis};
pub use batch::{importance_order, importance_vector};
pub use config::{Activation, CliConfig, LrSchedule, ModelConfig, OptimizerKind, TrainConfig, Variant};
pub use error::{Error, Result};
pub use linalg::Matrix;
pub use model::{Architecture, ForwardPass, Gradients, Loss, Model, Objective, Params};
pub use optimizer::{AdamW, Optimizer};
pub use train::{Progress, Slice, StopHandle, TrainReport, TrainingSession};
