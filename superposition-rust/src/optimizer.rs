// ============================================================================
// UPDATE RULES
// Parameters in, new parameters out. Only the optimizer's own moment
// estimates are mutated.
// ============================================================================

use crate::config::OptimizerKind;
use crate::linalg::{vec_axpy_inplace, Matrix};
use crate::model::{Gradients, Params};

#[derive(Clone, Debug)]
pub enum Optimizer {
    /// `θ ← θ - lr·∇θ`, optionally followed by unit-normalizing W's columns.
    Sgd { renormalize_columns: bool },
    AdamW(AdamW),
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, hidden_dim: usize, input_dim: usize, bias: bool, renormalize_columns: bool) -> Self {
        match kind {
            OptimizerKind::Sgd => Optimizer::Sgd { renormalize_columns },
            OptimizerKind::AdamW => Optimizer::AdamW(AdamW::new(hidden_dim, input_dim, bias)),
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        match self {
            Optimizer::Sgd { .. } => OptimizerKind::Sgd,
            Optimizer::AdamW(_) => OptimizerKind::AdamW,
        }
    }

    pub fn update(&mut self, params: &Params, grads: &Gradients, lr: f64) -> Params {
        match self {
            Optimizer::Sgd { renormalize_columns } => {
                let mut w = params.w.subtract(&grads.w.scale(lr));
                if *renormalize_columns { w.normalize_columns_inplace(); }
                let bias = match (&params.bias, &grads.bias) {
                    (Some(b), Some(db)) => {
                        let mut b = b.clone();
                        vec_axpy_inplace(&mut b, -lr, db);
                        Some(b)
                    }
                    (b, _) => b.clone(),
                };
                Params { w, bias }
            }
            Optimizer::AdamW(adam) => adam.update(params, grads, lr),
        }
    }

    /// Forgets all accumulated moments.
    pub fn reset(&mut self) {
        if let Optimizer::AdamW(adam) = self {
            adam.reset();
        }
    }
}

// ============================================================================
// ADAMW — decoupled weight decay on W only; bias gets plain Adam
// ============================================================================

#[derive(Clone, Debug)]
pub struct AdamW {
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    pub t: u64,
    m_w: Matrix,
    v_w: Matrix,
    m_b: Option<Vec<f64>>,
    v_b: Option<Vec<f64>>,
}

impl AdamW {
    pub const BETA1: f64 = 0.9;
    pub const BETA2: f64 = 0.999;
    pub const EPS: f64 = 1e-8;
    pub const WEIGHT_DECAY: f64 = 1e-4;

    pub fn new(hidden_dim: usize, input_dim: usize, bias: bool) -> Self {
        AdamW {
            beta1: Self::BETA1,
            beta2: Self::BETA2,
            eps: Self::EPS,
            weight_decay: Self::WEIGHT_DECAY,
            t: 0,
            m_w: Matrix::zeros(hidden_dim, input_dim),
            v_w: Matrix::zeros(hidden_dim, input_dim),
            m_b: bias.then(|| vec![0.0; input_dim]),
            v_b: bias.then(|| vec![0.0; input_dim]),
        }
    }

    pub fn reset(&mut self) {
        self.t = 0;
        self.m_w.data.iter_mut().for_each(|x| *x = 0.0);
        self.v_w.data.iter_mut().for_each(|x| *x = 0.0);
        for m in self.m_b.iter_mut().chain(self.v_b.iter_mut()) {
            m.iter_mut().for_each(|x| *x = 0.0);
        }
    }

    pub fn update(&mut self, params: &Params, grads: &Gradients, lr: f64) -> Params {
        assert_eq!(params.w.shape(), self.m_w.shape(), "adamw: parameter shape changed");
        self.t += 1;
        let t = self.t as f64;
        let bc1 = 1.0 - self.beta1.powf(t);
        let bc2 = 1.0 - self.beta2.powf(t);

        let mut w = params.w.clone();
        adam_moments(
            &mut w.data,
            &grads.w.data,
            &mut self.m_w.data,
            &mut self.v_w.data,
            (self.beta1, self.beta2, self.eps),
            (bc1, bc2),
            lr,
            self.weight_decay,
        );

        let bias = match (&params.bias, &grads.bias, &mut self.m_b, &mut self.v_b) {
            (Some(b), Some(db), Some(mb), Some(vb)) => {
                let mut b = b.clone();
                adam_moments(&mut b, db, mb, vb, (self.beta1, self.beta2, self.eps), (bc1, bc2), lr, 0.0);
                Some(b)
            }
            (b, _, _, _) => b.clone(),
        };

        Params { w, bias }
    }
}

#[allow(clippy::too_many_arguments)]
fn adam_moments(
    theta: &mut [f64],
    grad: &[f64],
    m: &mut [f64],
    v: &mut [f64],
    (beta1, beta2, eps): (f64, f64, f64),
    (bc1, bc2): (f64, f64),
    lr: f64,
    weight_decay: f64,
) {
    assert_eq!(theta.len(), grad.len(), "adamw: gradient length {} vs parameter length {}", grad.len(), theta.len());
    for j in 0..theta.len() {
        let g = grad[j];
        m[j] = beta1 * m[j] + (1.0 - beta1) * g;
        v[j] = beta2 * v[j] + (1.0 - beta2) * g * g;
        let m_hat = m[j] / bc1;
        let v_hat = v[j] / bc2;
        theta[j] -= lr * (m_hat / (v_hat.sqrt() + eps) + weight_decay * theta[j]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> Params {
        Params {
            w: Matrix::from_rows(&[vec![1.0, -2.0], vec![0.5, 0.0]]),
            bias: Some(vec![0.3, -0.3]),
        }
    }

    fn grads() -> Gradients {
        Gradients {
            w: Matrix::from_rows(&[vec![0.2, -0.4], vec![1e-3, 0.0]]),
            bias: Some(vec![0.5, -0.25]),
        }
    }

    #[test]
    fn sgd_steps_against_the_gradient() {
        let mut opt = Optimizer::Sgd { renormalize_columns: false };
        let next = opt.update(&params(), &grads(), 0.1);
        assert_relative_eq!(next.w.get(0, 0), 0.98);
        assert_relative_eq!(next.w.get(0, 1), -1.96);
        let b = next.bias.unwrap();
        assert_relative_eq!(b[0], 0.25);
        assert_relative_eq!(b[1], -0.275);
    }

    #[test]
    fn sgd_can_renormalize_columns() {
        let mut opt = Optimizer::Sgd { renormalize_columns: true };
        let next = opt.update(&params(), &grads(), 0.1);
        assert_relative_eq!(next.w.column_norm(0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(next.w.column_norm(1), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn first_adamw_step_moves_by_learning_rate_in_sign_direction() {
        let mut opt = AdamW::new(2, 2, true);
        let p = params();
        let lr = 1e-2;
        let next = opt.update(&p, &grads(), lr);
        assert_eq!(opt.t, 1);
        // m̂/√v̂ = sign(g) on the first step, plus decoupled decay on W.
        let expected = 1.0 - lr * (1.0 + AdamW::WEIGHT_DECAY * 1.0);
        assert_relative_eq!(next.w.get(0, 0), expected, epsilon = 1e-9);
        let expected = -2.0 - lr * (-1.0 + AdamW::WEIGHT_DECAY * -2.0);
        assert_relative_eq!(next.w.get(0, 1), expected, epsilon = 1e-9);
        // Zero gradient: only decay acts on W.
        assert_relative_eq!(next.w.get(1, 1), 0.0);
        // Bias has no decay.
        let b = next.bias.unwrap();
        assert_relative_eq!(b[0], 0.3 - lr, epsilon = 1e-9);
        assert_relative_eq!(b[1], -0.3 + lr, epsilon = 1e-9);
    }

    #[test]
    fn reset_clears_step_counter() {
        let mut opt = Optimizer::AdamW(AdamW::new(2, 2, false));
        let p = Params { w: params().w, bias: None };
        let g = Gradients { w: grads().w, bias: None };
        let _ = opt.update(&p, &g, 1e-3);
        let _ = opt.update(&p, &g, 1e-3);
        opt.reset();
        match &opt {
            Optimizer::AdamW(a) => assert_eq!(a.t, 0),
            _ => unreachable!(),
        }
        assert_eq!(opt.kind(), OptimizerKind::AdamW);
    }
}
