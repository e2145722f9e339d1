// ============================================================================
// CONFIGURATION
// ============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Activation::Linear),
            "relu" => Ok(Activation::Relu),
            _ => Err(Error::UnknownActivation(s.to_string())),
        }
    }
}

/// Which loss functional and update rule a model trains with.
///
/// `Importance`: decoder bias, output ReLU, importance-weighted loss, AdamW.
/// `Sparse`: no bias, reconstruction + L1 penalty on the hidden code, plain SGD,
/// and batches pre-scaled by feature index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Importance,
    Sparse,
}

impl Variant {
    /// Consecutive sub-threshold iterations needed before convergence is declared.
    pub fn patience(self) -> usize {
        match self {
            Variant::Importance => 20,
            Variant::Sparse => 10,
        }
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "importance" | "weighted" => Ok(Variant::Importance),
            "sparse" | "plain" => Ok(Variant::Sparse),
            _ => Err(Error::UnknownVariant(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    AdamW,
}

impl FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adamw" | "adam" => Ok(OptimizerKind::AdamW),
            _ => Err(Error::UnknownOptimizer(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LrSchedule {
    Constant,
    /// `lr * (1 - step / steps)`
    Linear,
    /// `lr * cos(π/2 * step / (steps - 1))`
    Cosine,
    /// `max(min_lr, lr * decay_rate^step)`
    Exponential { min_lr: f64, decay_rate: f64 },
}

impl LrSchedule {
    pub const DEFAULT_MIN_LR: f64 = 1e-4;
    pub const DEFAULT_DECAY_RATE: f64 = 0.999;

    pub fn rate(&self, base: f64, step: usize, steps: usize) -> f64 {
        match *self {
            LrSchedule::Constant => base,
            LrSchedule::Linear => {
                if steps == 0 { return base; }
                base * (1.0 - step as f64 / steps as f64)
            }
            LrSchedule::Cosine => {
                if steps <= 1 { return base; }
                base * (0.5 * std::f64::consts::PI * step as f64 / (steps - 1) as f64).cos()
            }
            LrSchedule::Exponential { min_lr, decay_rate } => {
                (base * decay_rate.powf(step as f64)).max(min_lr)
            }
        }
    }
}

impl FromStr for LrSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "constant" => Ok(LrSchedule::Constant),
            "linear" => Ok(LrSchedule::Linear),
            "cosine" => Ok(LrSchedule::Cosine),
            "exponential" | "exp" => Ok(LrSchedule::Exponential {
                min_lr: Self::DEFAULT_MIN_LR,
                decay_rate: Self::DEFAULT_DECAY_RATE,
            }),
            _ => Err(Error::UnknownSchedule(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub activation: Activation,
    pub variant: Variant,
    /// Overrides the variant's update rule.
    pub optimizer: Option<OptimizerKind>,
    /// SGD only: rescale W's columns to unit norm after every update.
    pub renormalize_columns: bool,
    pub seed: Option<u64>,
}

impl ModelConfig {
    pub fn new(input_dim: usize, hidden_dim: usize) -> Self {
        ModelConfig {
            input_dim,
            hidden_dim,
            activation: Activation::Linear,
            variant: Variant::Importance,
            optimizer: None,
            renormalize_columns: false,
            seed: None,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn optimizer_kind(&self) -> OptimizerKind {
        self.optimizer.unwrap_or(match self.variant {
            Variant::Importance => OptimizerKind::AdamW,
            Variant::Sparse => OptimizerKind::Sgd,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.hidden_dim == 0 {
            return Err(Error::ZeroDimension { input_dim: self.input_dim, hidden_dim: self.hidden_dim });
        }
        if self.hidden_dim > self.input_dim {
            return Err(Error::HiddenExceedsInput { input_dim: self.input_dim, hidden_dim: self.hidden_dim });
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::new(20, 5)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Iteration budget (steps or epochs; one iteration is one batch).
    pub steps: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub lr_schedule: LrSchedule,
    pub sparsity: f64,
    /// Importance decay: the loss weight of feature `i` is `importance^i`.
    pub importance: f64,
    pub sparsity_weight: f64,
    pub convergence_threshold: f64,
    /// Falls back to the model variant's patience.
    pub patience: Option<usize>,
    pub progress_every: usize,
}

impl TrainConfig {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Importance => TrainConfig {
                steps: 10_000,
                batch_size: 1024,
                learning_rate: 1e-3,
                lr_schedule: LrSchedule::Constant,
                sparsity: 0.1,
                importance: 1.0,
                sparsity_weight: 0.0,
                convergence_threshold: 1e-5,
                patience: None,
                progress_every: 10,
            },
            Variant::Sparse => TrainConfig {
                steps: 1000,
                batch_size: 32,
                learning_rate: 0.05,
                lr_schedule: LrSchedule::Exponential {
                    min_lr: LrSchedule::DEFAULT_MIN_LR,
                    decay_rate: LrSchedule::DEFAULT_DECAY_RATE,
                },
                sparsity: 0.8,
                importance: 1.0,
                sparsity_weight: 0.1,
                convergence_threshold: 1e-6,
                patience: None,
                progress_every: 10,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::EmptyBatch);
        }
        if self.progress_every == 0 {
            return Err(Error::ZeroProgressInterval);
        }
        if !(0.0..1.0).contains(&self.sparsity) {
            return Err(Error::InvalidSparsity(self.sparsity));
        }
        if !self.importance.is_finite() || self.importance < 0.0 {
            return Err(Error::InvalidImportance(self.importance));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(Error::InvalidLearningRate(self.learning_rate));
        }
        Ok(())
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig::for_variant(Variant::Importance)
    }
}

/// Settings for the headless host, parsed from `--key=value` arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    pub model: ModelConfig,
    pub train: TrainConfig,
    pub eval_samples: usize,
    pub json: bool,
}

impl CliConfig {
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pairs: Vec<(String, String)> = args
            .into_iter()
            .filter_map(|arg| {
                let arg = arg.as_ref().trim_start_matches("--");
                arg.split_once('=').map(|(k, v)| (k.to_lowercase(), v.to_string()))
            })
            .collect();

        // Train defaults depend on the variant, so resolve it first.
        let mut model = ModelConfig::default();
        if let Some((_, v)) = pairs.iter().find(|(k, _)| k == "variant") {
            model.variant = v.parse()?;
        }
        let mut train = TrainConfig::for_variant(model.variant);
        let mut eval_samples = 500;
        let mut json = false;
        let mut min_lr = None;
        let mut decay_rate = None;

        for (key, value) in &pairs {
            match key.as_str() {
                "inputdim" => model.input_dim = parse_value(key, value)?,
                "hiddendim" => model.hidden_dim = parse_value(key, value)?,
                "activation" => model.activation = value.parse()?,
                "variant" => {}
                "optimizer" => model.optimizer = Some(value.parse()?),
                "renormalize" => model.renormalize_columns = parse_bool(key, value)?,
                "seed" => model.seed = Some(parse_value(key, value)?),
                "steps" | "epochs" => train.steps = parse_value(key, value)?,
                "batchsize" => train.batch_size = parse_value(key, value)?,
                "learningrate" | "initiallearningrate" => train.learning_rate = parse_value(key, value)?,
                "lrschedule" => train.lr_schedule = value.parse()?,
                "minlearningrate" => min_lr = Some(parse_value(key, value)?),
                "decayrate" => decay_rate = Some(parse_value(key, value)?),
                "sparsity" => train.sparsity = parse_value(key, value)?,
                "importance" => train.importance = parse_value(key, value)?,
                "sparsityweight" => train.sparsity_weight = parse_value(key, value)?,
                "convergencethreshold" => train.convergence_threshold = parse_value(key, value)?,
                "patience" => train.patience = Some(parse_value(key, value)?),
                "progressevery" | "logevery" => train.progress_every = parse_value(key, value)?,
                "evalsamples" => eval_samples = parse_value(key, value)?,
                "json" => json = parse_bool(key, value)?,
                _ => {}
            }
        }

        if let LrSchedule::Exponential { min_lr: m, decay_rate: d } = &mut train.lr_schedule {
            if let Some(v) = min_lr { *m = v; }
            if let Some(v) = decay_rate { *d = v; }
        }

        model.validate()?;
        train.validate()?;
        Ok(CliConfig { model, train, eval_samples, json })
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::InvalidArgument { key: key.to_string(), value: value.to_string() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidArgument { key: key.to_string(), value: value.to_string() }),
    }
}
