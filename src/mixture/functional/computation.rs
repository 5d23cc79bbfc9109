//! Numerical kernels of the functional model
//!
//! Sub-regression weights follow a multinomial logistic law in time:
//! κₛ(t) ∝ exp(αₛ₀ + αₛ₁ t). The first sub-regression is the reference and
//! keeps α₀ = (0, 0), so only `2 (n_sub - 1)` coefficients are free. They are
//! fitted by maximizing
//!
//! ```text
//! C(α) = Σⱼ [ α_{wⱼ,0} + α_{wⱼ,1} tⱼ - ln Σₛ exp(αₛ₀ + αₛ₁ tⱼ) ]
//! ```
//!
//! with Newton steps and a backtracking line search.

use ndarray::{Array1, Array2, ArrayView1};

use crate::statistic::{log_sum_exp, log_to_multi};

/// Upper bound on Newton iterations for the logistic weights
pub const MAX_ITER_OPTIM: usize = 50;

const MAX_LINE_SEARCH: usize = 30;
const OPTIM_TOLERANCE: f64 = 1e-8;
/// Ridge added to the Newton system, which is singular when the labels are separable
const RIDGE: f64 = 1e-8;

/// `v[i, c] = t[i]^c`
pub fn vandermonde(t: &[f64], n_coeff: usize) -> Array2<f64> {
    Array2::from_shape_fn((t.len(), n_coeff), |(i, c)| t[i].powi(c as i32))
}

/// Log weights of every sub-regression at time `t`, normalized
pub fn log_kappa(t: f64, alpha: &Array2<f64>) -> Vec<f64> {
    let mut value: Vec<f64> = alpha.rows().into_iter().map(|a| a[0] + a[1] * t).collect();
    let norm = log_sum_exp(&value);
    value.iter_mut().for_each(|v| *v -= norm);
    value
}

/// Weights of every sub-regression at time `t`
pub fn kappa(t: f64, alpha: &Array2<f64>) -> Vec<f64> {
    let mut value: Vec<f64> = alpha.rows().into_iter().map(|a| a[0] + a[1] * t).collect();
    log_to_multi(&mut value);
    value
}

/// Solves `a x = b` by Gaussian elimination with partial pivoting
///
/// Returns `None` for a (numerically) singular system.
pub fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r, &s| a[[r, col]].abs().total_cmp(&a[[s, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for c in 0..n {
                a.swap([pivot, c], [col, c]);
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor != 0.0 {
                for c in col..n {
                    a[[row, c]] -= factor * a[[col, c]];
                }
                b[row] -= factor * b[col];
            }
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|c| a[[row, c]] * x[c]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

/// Least squares fit through the normal equations
///
/// Returns the coefficients and the standard deviation of the residuals.
pub fn regression(design: &Array2<f64>, y: &Array1<f64>) -> Option<(Array1<f64>, f64)> {
    let xt = design.t();
    let beta = solve(xt.dot(design), xt.dot(y))?;
    let residual = design.dot(&beta) - y;
    let n = residual.len() as f64;
    let mean = residual.sum() / n;
    let sd = (residual.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n).sqrt();
    Some((beta, sd))
}

fn cost(alpha: &Array2<f64>, samples: &[(f64, usize)]) -> f64 {
    samples
        .iter()
        .map(|&(t, w)| log_kappa(t, alpha)[w])
        .sum()
}

/// Gradient and Hessian of the cost with respect to the free coefficients
fn grad_hessian(alpha: &Array2<f64>, samples: &[(f64, usize)]) -> (Array1<f64>, Array2<f64>) {
    let n_free = 2 * (alpha.nrows() - 1);
    let mut grad = Array1::zeros(n_free);
    let mut hessian = Array2::zeros((n_free, n_free));
    for &(t, w) in samples {
        let k = kappa(t, alpha);
        let pow = [1.0, t];
        for p in 0..n_free {
            let (s0, c0) = (p / 2 + 1, p % 2);
            let observed = if w == s0 { 1.0 } else { 0.0 };
            grad[p] += pow[c0] * (observed - k[s0]);
            for q in p..n_free {
                let (s1, c1) = (q / 2 + 1, q % 2);
                let delta = if s0 == s1 { 1.0 } else { 0.0 };
                hessian[[p, q]] -= pow[c0] * pow[c1] * k[s0] * (delta - k[s1]);
            }
        }
    }
    for p in 0..n_free {
        for q in 0..p {
            hessian[[p, q]] = hessian[[q, p]];
        }
    }
    (grad, hessian)
}

/// Maximizes the logistic cost in place, returns the final cost
pub fn optimize_alpha(alpha: &mut Array2<f64>, samples: &[(f64, usize)]) -> f64 {
    let mut current = cost(alpha, samples);
    if alpha.nrows() < 2 {
        return current;
    }
    for _ in 0..MAX_ITER_OPTIM {
        let (grad, hessian) = grad_hessian(alpha, samples);
        let mut system = -hessian;
        system.diag_mut().iter_mut().for_each(|d| *d += RIDGE);
        let direction = solve(system, grad.clone()).unwrap_or(grad);

        let mut step = 1.0;
        let mut improved = false;
        for _ in 0..MAX_LINE_SEARCH {
            let mut candidate = alpha.clone();
            for (p, d) in direction.iter().enumerate() {
                candidate[[p / 2 + 1, p % 2]] += step * d;
            }
            let candidate_cost = cost(&candidate, samples);
            if candidate_cost.is_finite() && candidate_cost >= current {
                let gain = candidate_cost - current;
                *alpha = candidate;
                current = candidate_cost;
                improved = gain > OPTIM_TOLERANCE;
                break;
            }
            step /= 2.0;
        }
        if !improved {
            break;
        }
    }
    current
}

/// Time boundaries splitting the pooled time values into `n_sub` segments of equal size
pub fn global_quantile<'a, I>(times: I, n_sub: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut pooled: Vec<f64> = times.into_iter().flatten().copied().collect();
    if pooled.is_empty() || n_sub == 0 {
        return Vec::new();
    }
    pooled.sort_by(|a, b| a.total_cmp(b));
    let last = pooled.len() - 1;
    let mut quantile = vec![0.0; n_sub + 1];
    quantile[0] = pooled[0];
    quantile[n_sub] = pooled[last];
    for (q, v) in quantile.iter_mut().enumerate().take(n_sub).skip(1) {
        *v = pooled[(q as f64 / n_sub as f64 * last as f64) as usize];
    }
    quantile
}

/// True when `values` holds at least `n` values pairwise separated by more than `epsilon`
pub fn different_values(mut values: Vec<f64>, n: usize, epsilon: f64) -> bool {
    values.sort_by(|a, b| a.total_cmp(b));
    let mut count = 0;
    let mut last = f64::NEG_INFINITY;
    for v in values {
        if v - last > epsilon {
            count += 1;
            last = v;
            if count >= n {
                return true;
            }
        }
    }
    n == 0
}

/// Expected value of the sub-regression `s` at one Vandermonde row
pub fn expectation(row: ArrayView1<f64>, beta: &Array2<f64>, s: usize) -> f64 {
    row.dot(&beta.row(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve(a, b).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
        assert!(solve(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_regression_exact_line() {
        let t: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let design = vandermonde(&t, 2);
        let y = Array1::from_iter(t.iter().map(|v| 1.5 + 2.0 * v));
        let (beta, sd) = regression(&design, &y).unwrap();
        assert!((beta[0] - 1.5).abs() < 1e-9);
        assert!((beta[1] - 2.0).abs() < 1e-9);
        assert!(sd < 1e-9);
    }

    #[test]
    fn test_kappa_is_a_distribution() {
        let alpha = array![[0.0, 0.0], [-5.0, 1.0], [2.0, -0.5]];
        for t in [0.0, 3.0, 10.0] {
            let k = kappa(t, &alpha);
            assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            let lk = log_kappa(t, &alpha);
            assert!((lk[1].exp() - k[1]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_optimize_alpha_switch_point() {
        // sub-regression 0 before t = 5, sub-regression 1 after, with some overlap
        let mut samples = Vec::new();
        for i in 0..100 {
            let t = i as f64 / 10.0;
            let w = if (t < 5.0 && i % 7 != 0) || (t >= 5.0 && i % 7 == 0) { 0 } else { 1 };
            samples.push((t, w));
        }
        let mut alpha = Array2::zeros((2, 2));
        let start = cost(&alpha, &samples);
        let end = optimize_alpha(&mut alpha, &samples);
        assert!(end > start);
        assert_eq!(alpha[[0, 0]], 0.0);
        assert!(alpha[[1, 1]] > 0.0);
        // the weights cross close to the switch point
        let switch = -alpha[[1, 0]] / alpha[[1, 1]];
        assert!((switch - 5.0).abs() < 0.5, "switch at {}", switch);
    }

    #[test]
    fn test_global_quantile() {
        let a = vec![0.0, 1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0, 7.0, 8.0];
        let q = global_quantile([a.as_slice(), b.as_slice()], 2);
        assert_eq!(q, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn test_different_values() {
        assert!(different_values(vec![1.0, 1.0, 2.0], 2, 1e-8));
        assert!(!different_values(vec![1.0, 1.0, 1.0], 2, 1e-8));
    }
}
