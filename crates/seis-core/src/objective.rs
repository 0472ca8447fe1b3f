// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Objective Functions
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Objective kinds on the optimization vector.
//!
//! Each kind implements the same `Objective` contract the minimizer
//! consumes. The LS+prior gradient is assembled from two independently
//! computed branches (data misfit through the adjoint simulation, prior
//! distance directly in vector space) and only then combined; the two
//! are never fused into one simulation call.

use crate::engine::ForwardEngine;
use crate::session::Session;
use ndarray::Array1;
use seis_math::lbfgsb::Objective;
use seis_types::error::{SeisError, SeisResult};

/// Which functional the optimizer (or migration driver) evaluates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectiveKind {
    /// Least-squares data misfit.
    Ls,
    /// `α₁·LS(x) + α₂·‖x − prior‖²_w`.
    LsPrior { alpha_data: f64, alpha_prior: f64 },
    /// Single adjoint gradient at the initial vector (migration image).
    Migr,
    /// Migration gradient by finite differences; adjoint validation only.
    MigrFd,
}

/// LS / LS+prior objective over a session.
pub struct SessionObjective<'a, E: ForwardEngine> {
    session: &'a mut Session<E>,
    kind: ObjectiveKind,
}

impl<'a, E: ForwardEngine> SessionObjective<'a, E> {
    pub fn new(session: &'a mut Session<E>, kind: ObjectiveKind) -> SeisResult<Self> {
        match kind {
            ObjectiveKind::Ls | ObjectiveKind::Migr | ObjectiveKind::MigrFd => {}
            ObjectiveKind::LsPrior { alpha_data, alpha_prior } => {
                if !(alpha_data.is_finite() && alpha_prior.is_finite()) {
                    return Err(SeisError::ConfigError(
                        "LS+prior weights must be finite".to_string(),
                    ));
                }
                if session.mx.prior.is_none() || session.mx.prior_weights.is_none() {
                    return Err(SeisError::ConfigError(
                        "LS+prior objective requires a prior vector and weights on the session"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(SessionObjective { session, kind })
    }

    fn prior_value(&self, x: &Array1<f64>) -> f64 {
        match (&self.session.mx.prior, &self.session.mx.prior_weights) {
            (Some(prior), Some(w)) => x
                .iter()
                .zip(prior.iter())
                .zip(w.iter())
                .map(|((x, p), w)| w * (x - p) * (x - p))
                .sum(),
            _ => 0.0,
        }
    }

    /// Gradient of the weighted prior distance, kept separate from the
    /// data branch.
    fn prior_gradient(&self, x: &Array1<f64>, out: &mut Array1<f64>) {
        if let (Some(prior), Some(w)) =
            (&self.session.mx.prior, &self.session.mx.prior_weights)
        {
            for i in 0..x.len() {
                out[i] = 2.0 * w[i] * (x[i] - prior[i]);
            }
        } else {
            out.fill(0.0);
        }
    }
}

impl<'a, E: ForwardEngine> Objective for SessionObjective<'a, E> {
    fn value(&mut self, x: &Array1<f64>) -> SeisResult<f64> {
        self.session.forward(x)?;
        let f_data = self.session.misfit()?;
        Ok(match self.kind {
            ObjectiveKind::LsPrior { alpha_data, alpha_prior } => {
                alpha_data * f_data + alpha_prior * self.prior_value(x)
            }
            _ => f_data,
        })
    }

    fn gradient(&mut self, grad: &mut Array1<f64>, x: &Array1<f64>) -> SeisResult<()> {
        // Forward always precedes the adjoint; the cache makes this free
        // right after a value() at the same vector.
        self.session.forward(x)?;
        self.session.misfit()?;
        self.session.assemble_gradient()?;
        match self.kind {
            ObjectiveKind::LsPrior { alpha_data, alpha_prior } => {
                let mut gp = Array1::zeros(x.len());
                self.prior_gradient(x, &mut gp);
                for i in 0..x.len() {
                    grad[i] = alpha_data * self.session.mx.grad[i] + alpha_prior * gp[i];
                }
            }
            _ => grad.assign(&self.session.mx.grad),
        }
        Ok(())
    }
}

/// Central-difference gradient of the LS functional; O(2N) simulations.
pub fn finite_difference_gradient<E: ForwardEngine>(
    session: &mut Session<E>,
    x: &Array1<f64>,
    step: f64,
) -> SeisResult<Array1<f64>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(SeisError::ConfigError(format!(
            "finite-difference step must be > 0, got {step}"
        )));
    }
    let mut obj = SessionObjective::new(session, ObjectiveKind::Ls)?;
    let n = x.len();
    let mut grad = Array1::zeros(n);
    let mut probe = x.clone();
    for i in 0..n {
        probe[i] = x[i] + step;
        let fp = obj.value(&probe)?;
        probe[i] = x[i] - step;
        let fm = obj.value(&probe)?;
        probe[i] = x[i];
        grad[i] = (fp - fm) / (2.0 * step);
    }
    Ok(grad)
}
