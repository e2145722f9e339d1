// ============================================================================
// REPRESENTATION ANALYSIS
// ============================================================================

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::batch::{importance_vector, sample};
use crate::linalg::Matrix;
use crate::model::Model;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepresentationAnalysis {
    /// `WᵗW`, input_dim × input_dim.
    pub gram: Matrix,
    pub orthogonality: f64,
    /// `‖W_i‖ = sqrt(G_ii)` for each feature direction.
    pub feature_norms: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureQuality {
    /// `max(0, 1 - mean |x_i - x̂_i|)` over samples where feature `i` was active, else 0.
    pub qualities: Vec<f64>,
    pub importance: Vec<f64>,
    /// How many samples had each feature active.
    pub counts: Vec<usize>,
}

/// Diagonal energy over total energy of a square Gram matrix:
/// `sqrt(Σ diag²) / (sqrt(Σ diag² + Σ offdiag²) + 1e-8)`.
pub fn orthogonality(gram: &Matrix) -> f64 {
    assert_eq!(gram.rows, gram.cols, "orthogonality: gram matrix is {}x{}", gram.rows, gram.cols);
    let (mut diag, mut off) = (0.0, 0.0);
    for i in 0..gram.rows {
        for j in 0..gram.cols {
            let g = gram.get(i, j);
            if i == j { diag += g * g; } else { off += g * g; }
        }
    }
    diag.sqrt() / ((diag + off).sqrt() + 1e-8)
}

impl Model {
    pub fn analyze_representation(&self) -> RepresentationAnalysis {
        let w = self.weights();
        let gram = w.transpose().multiply(w);
        let feature_norms = (0..gram.rows).map(|i| gram.get(i, i).max(0.0).sqrt()).collect();
        RepresentationAnalysis { orthogonality: orthogonality(&gram), gram, feature_norms }
    }

    pub fn compute_feature_reconstruction_quality(&self, samples: usize, sparsity: f64, decay: f64) -> FeatureQuality {
        self.compute_feature_reconstruction_quality_with(samples, sparsity, decay, &mut rand::thread_rng())
    }

    /// Same as [`Model::compute_feature_reconstruction_quality`] with a caller-supplied RNG.
    pub fn compute_feature_reconstruction_quality_with(
        &self,
        samples: usize,
        sparsity: f64,
        decay: f64,
        rng: &mut impl Rng,
    ) -> FeatureQuality {
        let n = self.input_dim();
        let mut errors = vec![0.0; n];
        let mut counts = vec![0usize; n];

        for _ in 0..samples {
            let x = sample(n, sparsity, None, rng);
            let x_hat = self.forward(&x).output;
            for j in 0..n {
                if x[j] > 0.0 {
                    errors[j] += (x[j] - x_hat[j]).abs();
                    counts[j] += 1;
                }
            }
        }

        let qualities = errors.iter().zip(&counts)
            .map(|(&e, &c)| if c > 0 { (1.0 - e / c as f64).max(0.0) } else { 0.0 })
            .collect();
        FeatureQuality { qualities, importance: importance_vector(n, decay), counts }
    }
}
