//! Bounded limited-memory quasi-Newton minimizer.
//!
//! L-BFGS with gradient projection onto box bounds and an Armijo
//! backtracking line search. Callers supply an [`Objective`] rather than
//! closures, so every objective kind shares one explicit contract:
//! `value(x)` and `gradient(out, x)`.
//!
//! Non-convergence is not an error: the result carries the best iterate
//! together with its iteration/convergence metadata and the caller decides.

use ndarray::Array1;
use seis_types::error::{SeisError, SeisResult};
use std::collections::VecDeque;

/// Functional/gradient contract consumed by the minimizer.
pub trait Objective {
    fn value(&mut self, x: &Array1<f64>) -> SeisResult<f64>;
    fn gradient(&mut self, grad: &mut Array1<f64>, x: &Array1<f64>) -> SeisResult<()>;
}

#[derive(Debug, Clone)]
pub struct MinimizeOptions {
    pub iterations: usize,
    pub f_tol: f64,
    pub g_tol: f64,
    pub step_tol: f64,
    /// Limited-memory pair count.
    pub memory: usize,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        MinimizeOptions {
            iterations: 100,
            f_tol: 1e-12,
            g_tol: 1e-8,
            step_tol: 1e-12,
            memory: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MinimizeResult {
    pub x: Array1<f64>,
    pub fmin: f64,
    pub iterations: usize,
    pub converged: bool,
    pub f_history: Vec<f64>,
}

const ARMIJO_C1: f64 = 1e-4;
const BACKTRACK: f64 = 0.5;
const MAX_LINE_TRIALS: usize = 40;
const CURVATURE_FLOOR: f64 = 1e-12;

fn clamp_to_bounds(x: &mut Array1<f64>, bounds: Option<(&Array1<f64>, &Array1<f64>)>) {
    if let Some((lo, hi)) = bounds {
        for i in 0..x.len() {
            x[i] = x[i].clamp(lo[i], hi[i]);
        }
    }
}

/// Infinity norm of the gradient with components pointing out of an active
/// bound zeroed; the bound-aware convergence measure.
fn projected_gradient_norm(
    x: &Array1<f64>,
    g: &Array1<f64>,
    bounds: Option<(&Array1<f64>, &Array1<f64>)>,
) -> f64 {
    let mut norm = 0.0_f64;
    for i in 0..x.len() {
        let gi = match bounds {
            Some((lo, hi)) => {
                if (x[i] <= lo[i] && g[i] > 0.0) || (x[i] >= hi[i] && g[i] < 0.0) {
                    0.0
                } else {
                    g[i]
                }
            }
            None => g[i],
        };
        norm = norm.max(gi.abs());
    }
    norm
}

fn dot(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Two-loop recursion: `r = H·g` from the limited-memory (s, y) pairs.
fn two_loop(
    g: &Array1<f64>,
    s_hist: &VecDeque<Array1<f64>>,
    y_hist: &VecDeque<Array1<f64>>,
    rho_hist: &VecDeque<f64>,
) -> Array1<f64> {
    let mut q = g.clone();
    let m = s_hist.len();
    let mut alphas = vec![0.0; m];
    for k in (0..m).rev() {
        let a = rho_hist[k] * dot(&s_hist[k], &q);
        alphas[k] = a;
        for i in 0..q.len() {
            q[i] -= a * y_hist[k][i];
        }
    }
    let gamma = if m > 0 {
        let sy = dot(&s_hist[m - 1], &y_hist[m - 1]);
        let yy = dot(&y_hist[m - 1], &y_hist[m - 1]);
        if yy > 0.0 {
            sy / yy
        } else {
            1.0
        }
    } else {
        1.0
    };
    let mut r = q.mapv(|v| v * gamma);
    for k in 0..m {
        let b = rho_hist[k] * dot(&y_hist[k], &r);
        for i in 0..r.len() {
            r[i] += (alphas[k] - b) * s_hist[k][i];
        }
    }
    r
}

/// Minimize `obj` from `x0`, optionally inside `[lower, upper]` boxes.
pub fn minimize(
    obj: &mut dyn Objective,
    x0: &Array1<f64>,
    bounds: Option<(&Array1<f64>, &Array1<f64>)>,
    opts: &MinimizeOptions,
) -> SeisResult<MinimizeResult> {
    if opts.iterations == 0 {
        return Err(SeisError::ConfigError(
            "minimize: iterations must be >= 1".to_string(),
        ));
    }
    if let Some((lo, hi)) = bounds {
        if lo.len() != x0.len() || hi.len() != x0.len() {
            return Err(SeisError::ShapeMismatch {
                expected: format!("bounds of length {}", x0.len()),
                got: format!("lower {}, upper {}", lo.len(), hi.len()),
            });
        }
        if lo.iter().zip(hi.iter()).any(|(l, h)| l > h) {
            return Err(SeisError::ConfigError(
                "minimize: lower bound exceeds upper bound".to_string(),
            ));
        }
    }

    let n = x0.len();
    let mut x = x0.clone();
    clamp_to_bounds(&mut x, bounds);

    let mut g = Array1::zeros(n);
    let mut f = obj.value(&x)?;
    obj.gradient(&mut g, &x)?;

    let mut s_hist: VecDeque<Array1<f64>> = VecDeque::with_capacity(opts.memory);
    let mut y_hist: VecDeque<Array1<f64>> = VecDeque::with_capacity(opts.memory);
    let mut rho_hist: VecDeque<f64> = VecDeque::with_capacity(opts.memory);

    let mut f_history = vec![f];
    let mut converged = false;
    let mut iterations = 0;

    for _ in 0..opts.iterations {
        if !f.is_finite() || g.iter().any(|v| !v.is_finite()) {
            // A non-finite functional would corrupt the curvature pairs;
            // stop and report the last finite iterate.
            break;
        }
        if projected_gradient_norm(&x, &g, bounds) <= opts.g_tol {
            converged = true;
            break;
        }

        let mut d = two_loop(&g, &s_hist, &y_hist, &rho_hist).mapv(|v| -v);
        if dot(&d, &g) >= 0.0 {
            // Not a descent direction; restart from steepest descent.
            s_hist.clear();
            y_hist.clear();
            rho_hist.clear();
            d = g.mapv(|v| -v);
        }

        let mut alpha = if s_hist.is_empty() {
            let gmax = g.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
            1.0 / gmax.max(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..MAX_LINE_TRIALS {
            let mut x_trial = Array1::from_shape_fn(n, |i| x[i] + alpha * d[i]);
            clamp_to_bounds(&mut x_trial, bounds);
            let step = Array1::from_shape_fn(n, |i| x_trial[i] - x[i]);
            let step_norm = step.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
            if step_norm == 0.0 {
                break;
            }
            let f_trial = obj.value(&x_trial)?;
            if f_trial.is_finite() && f_trial <= f + ARMIJO_C1 * dot(&g, &step) {
                accepted = Some((x_trial, f_trial, step, step_norm));
                break;
            }
            alpha *= BACKTRACK;
        }

        let (x_new, f_new, s, step_norm) = match accepted {
            Some(t) => t,
            // Line search exhausted: the projected step cannot reduce f.
            None => break,
        };

        let mut g_new = Array1::zeros(n);
        obj.gradient(&mut g_new, &x_new)?;

        let y = Array1::from_shape_fn(n, |i| g_new[i] - g[i]);
        let sy = dot(&s, &y);
        if sy > CURVATURE_FLOOR * dot(&s, &s).sqrt() * dot(&y, &y).sqrt() {
            if s_hist.len() == opts.memory {
                s_hist.pop_front();
                y_hist.pop_front();
                rho_hist.pop_front();
            }
            rho_hist.push_back(1.0 / sy);
            s_hist.push_back(s);
            y_hist.push_back(y);
        }

        let f_change = (f - f_new).abs();
        x = x_new;
        f = f_new;
        g = g_new;
        iterations += 1;
        f_history.push(f);

        if f_change <= opts.f_tol * f.abs().max(1.0) {
            converged = true;
            break;
        }
        if step_norm <= opts.step_tol {
            converged = true;
            break;
        }
    }

    Ok(MinimizeResult {
        x,
        fmin: f,
        iterations,
        converged,
        f_history,
    })
}
