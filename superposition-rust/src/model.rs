// ============================================================================
// TIED-WEIGHT AUTOENCODER
// h = g_h(W x),  x̂ = g_out(Wᵗ h + b)
// ============================================================================

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::batch::generate_batch;
use crate::config::{Activation, ModelConfig, TrainConfig, Variant};
use crate::error::{Error, Result};
use crate::linalg::{l1_norm, relu, Matrix};
use crate::optimizer::Optimizer;
use crate::train::StopHandle;

impl Activation {
    fn apply(self, v: Vec<f64>) -> Vec<f64> {
        match self {
            Activation::Linear => v,
            Activation::Relu => relu(&v),
        }
    }

    /// Zeroes `grad` wherever the gated value did not pass (pre-activation ≤ 0).
    fn gate_grad(self, grad: &mut [f64], activated: &[f64]) {
        if self == Activation::Relu {
            for (g, &a) in grad.iter_mut().zip(activated) {
                if a <= 0.0 { *g = 0.0; }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Init {
    /// N(0, 2/(input + hidden))
    Xavier,
    /// N(0, 1) with every column scaled to unit norm.
    UnitColumns,
}

/// The fixed shape of the network: where the ReLU gates sit, whether the
/// decoder has a bias, and how W is initialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub hidden: Activation,
    pub output: Activation,
    pub bias: bool,
    pub init: Init,
}

impl Architecture {
    pub fn for_variant(variant: Variant, activation: Activation) -> Self {
        match variant {
            Variant::Importance => Architecture {
                hidden: activation,
                output: Activation::Relu,
                bias: true,
                init: Init::Xavier,
            },
            Variant::Sparse => Architecture {
                hidden: activation,
                output: activation,
                bias: false,
                init: Init::UnitColumns,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// hidden_dim × input_dim
    pub w: Matrix,
    pub bias: Option<Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Gradients {
    pub w: Matrix,
    pub bias: Option<Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForwardPass {
    pub hidden: Vec<f64>,
    pub output: Vec<f64>,
}

/// Loss functional applied to a single sample.
#[derive(Clone, Debug, PartialEq)]
pub enum Objective {
    /// `mean_i(importance[i] · (x[i] − x̂[i])²)`
    ImportanceWeighted { importance: Vec<f64> },
    /// `mse(x, x̂) + sparsity_weight · ‖h‖₁ / |h|`
    SparsityPenalized { sparsity_weight: f64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Loss {
    pub total: f64,
    pub reconstruction: f64,
    pub sparsity: f64,
}

impl Objective {
    pub fn loss(&self, x: &[f64], x_hat: &[f64], h: &[f64]) -> Loss {
        assert_eq!(x.len(), x_hat.len(), "loss: input length {} vs reconstruction length {}", x.len(), x_hat.len());
        let n = x.len() as f64;
        match self {
            Objective::ImportanceWeighted { importance } => {
                assert_eq!(importance.len(), x.len(), "loss: importance length {} vs input length {}", importance.len(), x.len());
                let weighted: f64 = x.iter().zip(x_hat).zip(importance)
                    .map(|((a, b), w)| w * (a - b) * (a - b))
                    .sum();
                let total = weighted / n;
                Loss { total, reconstruction: total, sparsity: 0.0 }
            }
            Objective::SparsityPenalized { sparsity_weight } => {
                let reconstruction = crate::linalg::mse(x, x_hat);
                let sparsity = sparsity_weight * l1_norm(h) / h.len() as f64;
                Loss { total: reconstruction + sparsity, reconstruction, sparsity }
            }
        }
    }

    /// ∂L/∂x̂
    fn output_grad(&self, x: &[f64], x_hat: &[f64]) -> Vec<f64> {
        let n = x.len() as f64;
        match self {
            Objective::ImportanceWeighted { importance } => x.iter().zip(x_hat).zip(importance)
                .map(|((a, b), w)| 2.0 * w * (b - a) / n)
                .collect(),
            Objective::SparsityPenalized { .. } => x.iter().zip(x_hat)
                .map(|(a, b)| 2.0 * (b - a) / n)
                .collect(),
        }
    }

    /// Direct ∂L/∂h contribution from the penalty term.
    fn hidden_penalty_grad(&self, h: &[f64]) -> Option<Vec<f64>> {
        match self {
            Objective::ImportanceWeighted { .. } => None,
            Objective::SparsityPenalized { sparsity_weight } => {
                let scale = sparsity_weight / h.len() as f64;
                Some(h.iter().map(|&v| {
                    if v > 0.0 { scale } else if v < 0.0 { -scale } else { 0.0 }
                }).collect())
            }
        }
    }
}

// ============================================================================
// MODEL
// ============================================================================

pub struct Model {
    config: ModelConfig,
    arch: Architecture,
    params: Params,
    optimizer: Optimizer,
    pub(crate) loss_history: Vec<f64>,
    pub(crate) total_steps: usize,
    pub(crate) running: StopHandle,
    pub(crate) rng: StdRng,
}

impl Model {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let arch = Architecture::for_variant(config.variant, config.activation);
        let mut rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let params = Self::init_params(config, &arch, &mut rng);
        let optimizer = Optimizer::new(
            config.optimizer_kind(),
            config.hidden_dim,
            config.input_dim,
            arch.bias,
            config.renormalize_columns,
        );
        Ok(Model {
            config: config.clone(),
            arch,
            params,
            optimizer,
            loss_history: Vec::new(),
            total_steps: 0,
            running: StopHandle::default(),
            rng,
        })
    }

    fn init_params(config: &ModelConfig, arch: &Architecture, rng: &mut StdRng) -> Params {
        let (h, n) = (config.hidden_dim, config.input_dim);
        let w = match arch.init {
            Init::Xavier => Matrix::random_normal(h, n, 0.0, (2.0 / (n + h) as f64).sqrt(), rng),
            Init::UnitColumns => Matrix::random_normal(h, n, 0.0, 1.0, rng).normalize_columns(),
        };
        Params { w, bias: arch.bias.then(|| vec![0.0; n]) }
    }

    /// Fresh weights, zero bias, empty optimizer state and history. The RNG
    /// stream continues, so a seeded model re-initializes deterministically.
    pub fn reinitialize(&mut self) {
        self.params = Self::init_params(&self.config, &self.arch, &mut self.rng);
        self.optimizer.reset();
        self.loss_history.clear();
        self.total_steps = 0;
    }

    pub fn config(&self) -> &ModelConfig { &self.config }
    pub fn architecture(&self) -> &Architecture { &self.arch }
    pub fn input_dim(&self) -> usize { self.config.input_dim }
    pub fn hidden_dim(&self) -> usize { self.config.hidden_dim }
    /// `(input_dim, hidden_dim)`
    pub fn dims(&self) -> (usize, usize) { (self.config.input_dim, self.config.hidden_dim) }
    pub fn params(&self) -> &Params { &self.params }
    pub fn weights(&self) -> &Matrix { &self.params.w }
    pub fn bias(&self) -> Option<&[f64]> { self.params.bias.as_deref() }
    pub fn optimizer(&self) -> &Optimizer { &self.optimizer }
    pub fn loss_history(&self) -> &[f64] { &self.loss_history }
    pub fn total_steps(&self) -> usize { self.total_steps }

    /// Replaces the parameters. Shapes must match the model's dimensions and
    /// the bias must be present exactly when the architecture has one.
    pub fn set_params(&mut self, params: Params) -> Result<()> {
        let expected = (self.config.hidden_dim, self.config.input_dim);
        if params.w.shape() != expected {
            return Err(Error::ParamShape { expected, got: params.w.shape() });
        }
        match (&params.bias, self.arch.bias) {
            (Some(b), true) if b.len() == self.config.input_dim => {}
            (None, false) => {}
            (b, _) => {
                return Err(Error::ParamShape {
                    expected: (usize::from(self.arch.bias), self.config.input_dim),
                    got: (usize::from(b.is_some()), b.as_ref().map_or(0, Vec::len)),
                })
            }
        }
        self.params = params;
        Ok(())
    }

    pub fn forward(&self, x: &[f64]) -> ForwardPass {
        let hidden = self.arch.hidden.apply(self.params.w.multiply_vector(x));
        let mut z = self.params.w.multiply_vector_transposed(&hidden);
        if let Some(b) = &self.params.bias {
            crate::linalg::vec_axpy_inplace(&mut z, 1.0, b);
        }
        ForwardPass { hidden, output: self.arch.output.apply(z) }
    }

    pub fn compute_loss(&self, x: &[f64], pass: &ForwardPass, objective: &Objective) -> Loss {
        objective.loss(x, &pass.output, &pass.hidden)
    }

    /// Loss and exact parameter gradients for one sample. Does not touch the model.
    pub fn gradients(&self, x: &[f64], objective: &Objective) -> (Loss, Gradients) {
        let w = &self.params.w;
        let pass = self.forward(x);
        let loss = self.compute_loss(x, &pass, objective);

        // ∂L/∂z at the decoder pre-activation.
        let mut dz = objective.output_grad(x, &pass.output);
        self.arch.output.gate_grad(&mut dz, &pass.output);

        // ∂L/∂a at the encoder pre-activation.
        let mut da = w.multiply_vector(&dz);
        if let Some(p) = objective.hidden_penalty_grad(&pass.hidden) {
            crate::linalg::vec_axpy_inplace(&mut da, 1.0, &p);
        }
        self.arch.hidden.gate_grad(&mut da, &pass.hidden);

        // W appears twice: encoder (da ⊗ x) and decoder (h ⊗ dz).
        let mut dw = Matrix::zeros(w.rows, w.cols);
        for i in 0..w.rows {
            let (dai, hi) = (da[i], pass.hidden[i]);
            for j in 0..w.cols {
                dw.data[i * w.cols + j] = dai * x[j] + hi * dz[j];
            }
        }

        let bias = self.params.bias.as_ref().map(|_| dz);
        (loss, Gradients { w: dw, bias })
    }

    pub fn apply(&mut self, grads: &Gradients, lr: f64) {
        self.params = self.optimizer.update(&self.params, grads, lr);
    }

    /// One forward/backward pass and parameter update on a single sample.
    pub fn backward(&mut self, x: &[f64], lr: f64, objective: &Objective) -> Loss {
        let (loss, grads) = self.gradients(x, objective);
        self.apply(&grads, lr);
        loss
    }

    /// Updates once per sample and returns the mean total loss over the batch.
    pub fn train_step(&mut self, batch: &[Vec<f64>], lr: f64, objective: &Objective) -> f64 {
        assert!(!batch.is_empty(), "train_step: empty batch");
        let mut total = 0.0;
        for x in batch {
            total += self.backward(x, lr, objective).total;
        }
        self.total_steps += 1;
        total / batch.len() as f64
    }

    /// Unit-norm sparse inputs. The sparse variant also biases magnitudes by
    /// feature index when `importance < 1`.
    pub fn generate_batch(&mut self, batch_size: usize, sparsity: f64, importance: f64) -> Vec<Vec<f64>> {
        let prescale = match self.config.variant {
            Variant::Sparse => Some(importance),
            Variant::Importance => None,
        };
        generate_batch(self.config.input_dim, batch_size, sparsity, prescale, &mut self.rng)
    }

    /// The loss functional this model trains against under `config`.
    pub fn objective(&self, config: &TrainConfig) -> Objective {
        match self.config.variant {
            Variant::Importance => Objective::ImportanceWeighted {
                importance: crate::batch::importance_vector(self.config.input_dim, config.importance),
            },
            Variant::Sparse => Objective::SparsityPenalized { sparsity_weight: config.sparsity_weight },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::norm;
    use approx::assert_relative_eq;

    fn model(input: usize, hidden: usize, variant: Variant, activation: Activation) -> Model {
        let cfg = ModelConfig::new(input, hidden)
            .with_variant(variant)
            .with_activation(activation)
            .with_seed(42);
        Model::new(&cfg).unwrap()
    }

    #[test]
    fn forward_shapes_for_many_dims() {
        for &(n, h) in &[(1, 1), (4, 2), (5, 5), (20, 3)] {
            for &variant in &[Variant::Importance, Variant::Sparse] {
                for &act in &[Activation::Linear, Activation::Relu] {
                    let m = model(n, h, variant, act);
                    let x = vec![0.5; n];
                    let pass = m.forward(&x);
                    assert_eq!(pass.hidden.len(), h);
                    assert_eq!(pass.output.len(), n);
                }
            }
        }
    }

    #[test]
    fn construction_rejects_bad_dims() {
        assert!(matches!(Model::new(&ModelConfig::new(0, 1)), Err(Error::ZeroDimension { .. })));
        assert!(matches!(Model::new(&ModelConfig::new(3, 4)), Err(Error::HiddenExceedsInput { .. })));
    }

    #[test]
    fn init_matches_variant() {
        let m = model(6, 3, Variant::Sparse, Activation::Linear);
        for j in 0..6 {
            assert_relative_eq!(m.weights().column_norm(j), 1.0, epsilon = 1e-12);
        }
        assert!(m.bias().is_none());
        let m = model(6, 3, Variant::Importance, Activation::Linear);
        assert_eq!(m.bias().unwrap(), &[0.0; 6]);
    }

    #[test]
    fn loss_shapes() {
        let x = [1.0, 0.0, 0.5];
        let x_hat = [0.5, 0.5, 0.5];
        let h = [-1.0, 2.0];
        let weighted = Objective::ImportanceWeighted { importance: vec![1.0, 0.5, 0.25] };
        let l = weighted.loss(&x, &x_hat, &h);
        assert_relative_eq!(l.total, (0.25 + 0.5 * 0.25) / 3.0);
        assert_eq!(l.sparsity, 0.0);

        let penalized = Objective::SparsityPenalized { sparsity_weight: 0.1 };
        let l = penalized.loss(&x, &x_hat, &h);
        assert_relative_eq!(l.reconstruction, 0.5 / 3.0);
        assert_relative_eq!(l.sparsity, 0.1 * 3.0 / 2.0);
        assert_relative_eq!(l.total, l.reconstruction + l.sparsity);
    }

    fn finite_difference_check(m: &mut Model, x: &[f64], objective: &Objective) {
        let (_, grads) = m.gradients(x, objective);
        let base = m.params().clone();
        let eps = 1e-6;
        for k in 0..base.w.data.len() {
            let mut plus = base.clone();
            plus.w.data[k] += eps;
            m.set_params(plus).unwrap();
            let lp = m.compute_loss(x, &m.forward(x), objective).total;
            let mut minus = base.clone();
            minus.w.data[k] -= eps;
            m.set_params(minus).unwrap();
            let lm = m.compute_loss(x, &m.forward(x), objective).total;
            let numeric = (lp - lm) / (2.0 * eps);
            assert_relative_eq!(grads.w.data[k], numeric, epsilon = 1e-6, max_relative = 1e-4);
        }
        if let (Some(b), Some(db)) = (base.bias.clone(), grads.bias.as_ref()) {
            for k in 0..b.len() {
                let mut plus = base.clone();
                plus.bias.as_mut().unwrap()[k] += eps;
                m.set_params(plus).unwrap();
                let lp = m.compute_loss(x, &m.forward(x), objective).total;
                let mut minus = base.clone();
                minus.bias.as_mut().unwrap()[k] -= eps;
                m.set_params(minus).unwrap();
                let lm = m.compute_loss(x, &m.forward(x), objective).total;
                assert_relative_eq!(db[k], (lp - lm) / (2.0 * eps), epsilon = 1e-6, max_relative = 1e-4);
            }
        }
        m.set_params(base).unwrap();
    }

    #[test]
    fn weighted_gradient_matches_finite_differences() {
        let mut m = model(5, 3, Variant::Importance, Activation::Linear);
        let mut params = m.params().clone();
        params.bias = Some(vec![0.3, 0.2, 0.4, 0.1, 0.5]);
        m.set_params(params).unwrap();
        let x = [0.6, 0.0, 0.3, 0.7, 0.2];
        let objective = Objective::ImportanceWeighted { importance: crate::batch::importance_vector(5, 0.8) };
        finite_difference_check(&mut m, &x, &objective);
    }

    #[test]
    fn penalized_gradient_matches_finite_differences() {
        let mut m = model(4, 2, Variant::Sparse, Activation::Linear);
        let x = [0.5, 0.5, 0.5, 0.5];
        finite_difference_check(&mut m, &x, &Objective::SparsityPenalized { sparsity_weight: 0.1 });
    }

    #[test]
    fn dead_relu_outputs_carry_no_gradient() {
        let mut m = model(3, 2, Variant::Importance, Activation::Linear);
        m.set_params(Params {
            w: Matrix::from_rows(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]),
            bias: Some(vec![0.0, 0.0, -1.0]),
        })
        .unwrap();
        let x = [0.6, 0.8, 0.0];
        let (_, grads) = m.gradients(&x, &Objective::ImportanceWeighted { importance: vec![1.0; 3] });
        // Output 2 is clamped at zero: no bias gradient, no decoder gradient through it.
        assert_eq!(grads.bias.as_ref().unwrap()[2], 0.0);
        assert_eq!(grads.w.get(0, 2), 0.0);
        assert_eq!(grads.w.get(1, 2), 0.0);
    }

    #[test]
    fn one_backward_step_reduces_loss_with_adamw() {
        let mut m = model(4, 2, Variant::Importance, Activation::Linear);
        let mut x = vec![1.0; 4];
        let n = norm(&x);
        x.iter_mut().for_each(|v| *v /= n);
        let objective = m.objective(&TrainConfig::default());
        let before = m.compute_loss(&x, &m.forward(&x), &objective).total;
        let reported = m.backward(&x, 1e-3, &objective);
        assert_relative_eq!(reported.total, before);
        let after = m.compute_loss(&x, &m.forward(&x), &objective).total;
        assert!(after < before, "loss went from {} to {}", before, after);
    }

    #[test]
    fn one_backward_step_reduces_loss_with_sgd() {
        let mut m = model(4, 2, Variant::Sparse, Activation::Linear);
        let x = [0.5, 0.5, 0.5, 0.5];
        let objective = Objective::SparsityPenalized { sparsity_weight: 0.1 };
        let before = m.compute_loss(&x, &m.forward(&x), &objective).total;
        m.backward(&x, 1e-3, &objective);
        let after = m.compute_loss(&x, &m.forward(&x), &objective).total;
        assert!(after < before, "loss went from {} to {}", before, after);
    }

    #[test]
    fn train_step_counts_steps_and_averages() {
        let mut m = model(6, 2, Variant::Importance, Activation::Relu);
        let batch = m.generate_batch(8, 0.5, 1.0);
        let objective = m.objective(&TrainConfig::default());
        let expected: f64 = {
            // Mean of per-sample losses as each sample is seen in sequence.
            let mut probe = model(6, 2, Variant::Importance, Activation::Relu);
            probe.set_params(m.params().clone()).unwrap();
            batch.iter().map(|x| probe.backward(x, 0.01, &objective).total).sum::<f64>() / 8.0
        };
        let got = m.train_step(&batch, 0.01, &objective);
        assert_relative_eq!(got, expected, epsilon = 1e-12);
        assert_eq!(m.total_steps(), 1);
    }

    #[test]
    fn set_params_rejects_wrong_shapes() {
        let mut m = model(4, 2, Variant::Importance, Activation::Linear);
        let bad = Params { w: Matrix::zeros(4, 2), bias: Some(vec![0.0; 4]) };
        assert!(matches!(m.set_params(bad), Err(Error::ParamShape { .. })));
        let no_bias = Params { w: Matrix::zeros(2, 4), bias: None };
        assert!(matches!(m.set_params(no_bias), Err(Error::ParamShape { .. })));
    }

    #[test]
    fn reinitialize_resets_state() {
        let mut m = model(4, 2, Variant::Importance, Activation::Linear);
        let before = m.weights().clone();
        let objective = m.objective(&TrainConfig::default());
        let batch = m.generate_batch(4, 0.5, 1.0);
        m.train_step(&batch, 0.01, &objective);
        m.reinitialize();
        assert_ne!(m.weights(), &before);
        assert_eq!(m.bias().unwrap(), &[0.0; 4]);
        assert_eq!(m.total_steps(), 0);
        match m.optimizer() {
            Optimizer::AdamW(a) => assert_eq!(a.t, 0),
            _ => panic!("importance variant trains with AdamW"),
        }
    }
}
