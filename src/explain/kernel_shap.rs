//! Kernel SHAP: model-agnostic local attribution against a reference point.
//!
//! Each coalition `z` of features is evaluated as the model output on a
//! vector taking the instance's value where `z` is set and the baseline's
//! value elsewhere. Attributions are the weighted least squares fit of those
//! outputs under the Shapley kernel, constrained to sum to
//! `f(instance) - f(baseline)`. With every coalition enumerated the result is
//! the exact Shapley value; past `max_exact_features` coalitions are sampled.

use crate::error::ExplanationError;
use crate::feature_extractor::FeatureVector;
use crate::models::classifier::Classifier;
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::time::Instant;
use tracing::debug;

/// Largest schema for which all coalitions are enumerated.
pub const DEFAULT_MAX_EXACT_FEATURES: usize = 10;

/// Coalitions drawn when enumeration is too expensive.
pub const DEFAULT_SAMPLE_BUDGET: usize = 2048;

const PIVOT_EPSILON: f64 = 1e-12;

/// Attribution of one feature for one instance
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct KernelExplainer {
    max_exact_features: usize,
    sample_budget: usize,
}

impl KernelExplainer {
    pub fn new(max_exact_features: usize, sample_budget: usize) -> Self {
        Self {
            // 2^M coalitions must stay addressable
            max_exact_features: max_exact_features.min(20),
            sample_budget: sample_budget.max(1),
        }
    }

    /// One attribution per feature of `instance`, in schema order.
    pub fn attribute(
        &self,
        model: &dyn Classifier,
        instance: &FeatureVector,
        baseline: &FeatureVector,
        deadline: Option<Instant>,
    ) -> Result<Vec<Attribution>, ExplanationError> {
        let m = instance.len();
        if baseline.len() != m {
            return Err(ExplanationError::Degenerate(format!(
                "baseline has {} features, instance has {}",
                baseline.len(),
                m
            )));
        }
        if m == 0 {
            return Ok(Vec::new());
        }

        let f_x = model.predict_proba(instance)?;
        let f_base = model.predict_proba(baseline)?;
        let total = f_x - f_base;

        let values = if m == 1 {
            vec![total]
        } else {
            let coalitions = if m <= self.max_exact_features {
                enumerate_coalitions(m)
            } else {
                sample_coalitions(m, self.sample_budget, &mut rand::thread_rng())
            };

            let mut evaluated = Vec::with_capacity(coalitions.len());
            for (mask, weight) in coalitions {
                check_deadline(deadline)?;
                let perturbed = blend(instance, baseline, &mask);
                let y = model.predict_proba(&perturbed)? - f_base;
                evaluated.push((mask, weight, y));
            }

            solve_constrained(m, total, &evaluated)?
        };

        debug!(
            model = %model.name(),
            f_x,
            f_base,
            attributions = ?values,
            "Kernel SHAP attribution complete"
        );

        Ok(instance
            .schema()
            .columns()
            .iter()
            .zip(values)
            .map(|(feature, value)| Attribution {
                feature: feature.clone(),
                value,
            })
            .collect())
    }
}

impl Default for KernelExplainer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXACT_FEATURES, DEFAULT_SAMPLE_BUDGET)
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), ExplanationError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(ExplanationError::TimedOut),
        _ => Ok(()),
    }
}

/// Instance values where `mask` is set, baseline values elsewhere.
fn blend(instance: &FeatureVector, baseline: &FeatureVector, mask: &[bool]) -> FeatureVector {
    let values = instance
        .values()
        .iter()
        .zip(baseline.values())
        .zip(mask)
        .map(|((&x, &b), &on)| if on { x } else { b })
        .collect();
    instance.with_values(values)
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Shapley kernel weight for a coalition of `size` out of `m` features.
pub fn kernel_weight(m: usize, size: usize) -> f64 {
    (m - 1) as f64 / (binomial(m, size) * size as f64 * (m - size) as f64)
}

/// Every coalition except the empty and full ones, with kernel weights.
fn enumerate_coalitions(m: usize) -> Vec<(Vec<bool>, f64)> {
    (1..(1usize << m) - 1)
        .map(|bits| {
            let mask: Vec<bool> = (0..m).map(|i| bits & (1 << i) != 0).collect();
            let size = bits.count_ones() as usize;
            (mask, kernel_weight(m, size))
        })
        .collect()
}

/// Coalitions drawn with probability proportional to their kernel weight;
/// each then carries unit weight.
fn sample_coalitions<R: Rng>(m: usize, budget: usize, rng: &mut R) -> Vec<(Vec<bool>, f64)> {
    // total kernel mass of all coalitions of a given size
    let size_mass: Vec<f64> = (1..m)
        .map(|s| (m - 1) as f64 / (s as f64 * (m - s) as f64))
        .collect();
    let sizes = match WeightedIndex::new(&size_mass) {
        Ok(sizes) => sizes,
        Err(_) => return Vec::new(),
    };

    (0..budget)
        .map(|_| {
            let size = sizes.sample(&mut *rng) + 1;
            let mut mask = vec![false; m];
            for i in rand::seq::index::sample(&mut *rng, m, size).into_iter() {
                mask[i] = true;
            }
            (mask, 1.0)
        })
        .collect()
}

/// Weighted least squares with `sum(phi) == total`, solved by eliminating
/// the last feature.
fn solve_constrained(
    m: usize,
    total: f64,
    evaluated: &[(Vec<bool>, f64, f64)],
) -> Result<Vec<f64>, ExplanationError> {
    let k = m - 1;
    let mut normal = Array2::<f64>::zeros((k, k));
    let mut rhs = Array1::<f64>::zeros(k);

    for (mask, weight, y) in evaluated {
        let last = if mask[k] { 1.0 } else { 0.0 };
        let target = y - last * total;
        let row: Array1<f64> = mask[..k]
            .iter()
            .map(|&on| (if on { 1.0 } else { 0.0 }) - last)
            .collect();

        for i in 0..k {
            if row[i] == 0.0 {
                continue;
            }
            rhs[i] += weight * row[i] * target;
            for j in 0..k {
                normal[[i, j]] += weight * row[i] * row[j];
            }
        }
    }

    let head = gaussian_solve(normal, rhs).ok_or_else(|| {
        ExplanationError::Degenerate(format!("singular system for {} features", m))
    })?;

    let mut phi = head.to_vec();
    phi.push(total - head.sum());
    Ok(phi)
}

/// Solve `a · x = b` with partial pivoting.
fn gaussian_solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| {
            a[[r1, col]]
                .abs()
                .partial_cmp(&a[[r2, col]].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[[pivot, col]].abs() < PIVOT_EPSILON || !a[[pivot, col]].is_finite() {
            return None;
        }
        if pivot != col {
            for j in 0..n {
                a.swap([col, j], [pivot, j]);
            }
            b.swap(col, pivot);
        }

        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|j| a[[row, j]] * x[j]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}
