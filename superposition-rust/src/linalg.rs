// ============================================================================
// DENSE LINEAR ALGEBRA PRIMITIVES
// Row-major f64 matrices and plain slices as vectors. Shape mismatches are
// caller bugs and panic immediately.
// ============================================================================

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "from_vec: {} values cannot fill a {}x{} matrix",
            data.len(),
            rows,
            cols
        );
        Matrix { rows, cols, data }
    }

    /// Builds a matrix from nested rows. Every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, r) in rows.iter().enumerate() {
            assert_eq!(r.len(), cols, "from_rows: row {} has {} columns, expected {}", i, r.len(), cols);
            data.extend_from_slice(r);
        }
        Matrix { rows: rows.len(), cols, data }
    }

    /// Entries drawn uniformly from [-scale, scale).
    pub fn random_uniform(rows: usize, cols: usize, scale: f64, rng: &mut impl Rng) -> Self {
        let data = (0..rows * cols).map(|_| (rng.gen::<f64>() - 0.5) * 2.0 * scale).collect();
        Matrix { rows, cols, data }
    }

    pub fn random_normal(rows: usize, cols: usize, mean: f64, std: f64, rng: &mut impl Rng) -> Self {
        Matrix { rows, cols, data: rand_normal(rows * cols, mean, std, rng) }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn multiply(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, other.rows,
            "multiply: {}x{} times {}x{}",
            self.rows, self.cols, other.rows, other.cols
        );
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.data[i * self.cols + k];
                if a == 0.0 { continue; }
                let b_row = other.row(k);
                let o_row = &mut out.data[i * other.cols..(i + 1) * other.cols];
                for (o, b) in o_row.iter_mut().zip(b_row) { *o += a * b; }
            }
        }
        out
    }

    pub fn multiply_vector(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(
            self.cols,
            v.len(),
            "multiply_vector: {}x{} matrix with vector of length {}",
            self.rows,
            self.cols,
            v.len()
        );
        (0..self.rows).map(|i| dot(self.row(i), v)).collect()
    }

    /// `selfᵗ v` without materializing the transpose.
    pub fn multiply_vector_transposed(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(
            self.rows,
            v.len(),
            "multiply_vector_transposed: {}x{} matrix with vector of length {}",
            self.rows,
            self.cols,
            v.len()
        );
        let mut out = vec![0.0; self.cols];
        for (i, &vi) in v.iter().enumerate() {
            if vi == 0.0 { continue; }
            vec_axpy_inplace(&mut out, vi, self.row(i));
        }
        out
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        out
    }

    pub fn add(&self, other: &Matrix) -> Matrix {
        self.assert_same_shape(other, "add");
        Matrix { rows: self.rows, cols: self.cols, data: vec_add(&self.data, &other.data) }
    }

    pub fn subtract(&self, other: &Matrix) -> Matrix {
        self.assert_same_shape(other, "subtract");
        Matrix { rows: self.rows, cols: self.cols, data: vec_sub(&self.data, &other.data) }
    }

    pub fn scale(&self, s: f64) -> Matrix {
        Matrix { rows: self.rows, cols: self.cols, data: vec_scale(&self.data, s) }
    }

    pub fn column_norm(&self, j: usize) -> f64 {
        (0..self.rows).map(|i| self.get(i, j).powi(2)).sum::<f64>().sqrt()
    }

    /// Divides every column by its Euclidean norm. Zero-norm columns stay zero.
    pub fn normalize_columns(&self) -> Matrix {
        let mut out = self.clone();
        out.normalize_columns_inplace();
        out
    }

    pub fn normalize_columns_inplace(&mut self) {
        for j in 0..self.cols {
            let norm = self.column_norm(j);
            if norm > 0.0 {
                for i in 0..self.rows {
                    self.data[i * self.cols + j] /= norm;
                }
            }
        }
    }

    fn assert_same_shape(&self, other: &Matrix, op: &str) {
        assert!(
            self.rows == other.rows && self.cols == other.cols,
            "{}: shape {}x{} does not match {}x{}",
            op,
            self.rows,
            self.cols,
            other.rows,
            other.cols
        );
    }
}

// ============================================================================
// VECTOR OPERATIONS
// ============================================================================

#[inline]
pub fn vec_add(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len(), "vec_add: length {} vs {}", a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x + y).collect()
}

#[inline]
pub fn vec_sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len(), "vec_sub: length {} vs {}", a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

#[inline]
pub fn vec_scale(a: &[f64], s: f64) -> Vec<f64> {
    a.iter().map(|x| x * s).collect()
}

#[inline]
pub fn vec_scale_inplace(a: &mut [f64], s: f64) {
    for x in a.iter_mut() { *x *= s; }
}

/// `a += s * b`
#[inline]
pub fn vec_axpy_inplace(a: &mut [f64], s: f64, b: &[f64]) {
    assert_eq!(a.len(), b.len(), "vec_axpy: length {} vs {}", a.len(), b.len());
    for (x, y) in a.iter_mut().zip(b.iter()) { *x += s * y; }
}

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "dot: length {} vs {}", a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn norm(a: &[f64]) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

pub fn mse(a: &[f64], b: &[f64]) -> f64 {
    let diff = vec_sub(a, b);
    dot(&diff, &diff) / a.len() as f64
}

#[inline]
pub fn relu(a: &[f64]) -> Vec<f64> {
    a.iter().map(|&x| x.max(0.0)).collect()
}

#[inline]
pub fn l1_norm(a: &[f64]) -> f64 {
    a.iter().map(|x| x.abs()).sum()
}

pub fn random_uniform(size: usize, scale: f64, rng: &mut impl Rng) -> Vec<f64> {
    (0..size).map(|_| (rng.gen::<f64>() - 0.5) * 2.0 * scale).collect()
}

/// Box-Muller samples from N(mean, std²).
pub fn rand_normal(n: usize, mean: f64, std: f64, rng: &mut impl Rng) -> Vec<f64> {
    (0..n).map(|_| {
        let u1 = open_unit(rng);
        let u2 = open_unit(rng);
        mean + std * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }).collect()
}

/// A vector with `max(1, floor(size * (1 - sparsity)))` active entries at
/// uniformly shuffled positions, each drawn from (0, 1).
pub fn sparse(size: usize, sparsity: f64, rng: &mut impl Rng) -> Vec<f64> {
    let mut v = vec![0.0; size];
    if size == 0 { return v; }
    let num_active = ((size as f64 * (1.0 - sparsity)).floor() as usize).clamp(1, size);
    let mut idx: Vec<usize> = (0..size).collect();
    for i in (1..idx.len()).rev() { let j = rng.gen_range(0..=i); idx.swap(i, j); }
    for &i in &idx[..num_active] { v[i] = open_unit(rng); }
    v
}

/// Uniform draw from the open interval (0, 1).
#[inline]
fn open_unit(rng: &mut impl Rng) -> f64 {
    loop {
        let u: f64 = rng.gen();
        if u > 0.0 { return u; }
    }
}
