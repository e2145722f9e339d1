// ============================================================================
// SYNTHETIC SPARSE DATA
// ============================================================================

use rand::Rng;

use crate::linalg::{norm, sparse, vec_scale_inplace};

/// `importance[i] = decay^i`. Index 0 is always 1.
pub fn importance_vector(input_dim: usize, decay: f64) -> Vec<f64> {
    (0..input_dim).map(|i| decay.powi(i as i32)).collect()
}

/// Feature indices ordered from most to least important. Ties keep index order.
pub fn importance_order(importance: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..importance.len()).collect();
    idx.sort_by(|&a, &b| importance[b].total_cmp(&importance[a]));
    idx
}

/// Scales `v` to unit length unless its norm is effectively zero.
pub fn normalize_inplace(v: &mut [f64]) {
    let n = norm(v);
    if n > 1e-12 { vec_scale_inplace(v, 1.0 / n); }
}

/// One unit-norm sparse sample. With `prescale = Some(importance)` and
/// `importance < 1`, entry `j` is first multiplied by `(j / input_dim)^(1 - importance)`.
pub fn sample(input_dim: usize, sparsity: f64, prescale: Option<f64>, rng: &mut impl Rng) -> Vec<f64> {
    let mut x = sparse(input_dim, sparsity, rng);
    if let Some(importance) = prescale.filter(|&imp| imp < 1.0) {
        let exponent = 1.0 - importance;
        for (j, v) in x.iter_mut().enumerate() {
            *v *= (j as f64 / input_dim as f64).powf(exponent);
        }
    }
    normalize_inplace(&mut x);
    x
}

pub fn generate_batch(
    input_dim: usize,
    batch_size: usize,
    sparsity: f64,
    prescale: Option<f64>,
    rng: &mut impl Rng,
) -> Vec<Vec<f64>> {
    (0..batch_size).map(|_| sample(input_dim, sparsity, prescale, rng)).collect()
}
