// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Coupling Filters & Joint Inversion
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Source-coupling-filter estimation and the alternating source/model
//! joint inversion.
//!
//! Phase one fixes the model and estimates the coupling filter by
//! unconstrained minimization of `½‖filter ⊛ calculated − observed‖²`;
//! phase two fixes the filter and runs the model optimizer loop. The
//! round trip repeats until the relative change in total misfit drops
//! below tolerance, bounded by minimum and maximum round-trip counts.

use crate::engine::ForwardEngine;
use crate::invert::{invert, InversionOutcome};
use crate::objective::ObjectiveKind;
use crate::session::Session;
use ndarray::Array1;
use seis_math::conv::{conv_causal, conv_kernel_adjoint};
use seis_math::lbfgsb::{minimize, MinimizeOptions, Objective};
use seis_types::config::{OptimizerOptions, RoundTripOptions};
use seis_types::data::Records;
use seis_types::error::{SeisError, SeisResult};

/// `½‖filter ⊛ raw − observed‖²` over the filter coefficients.
struct FilterObjective {
    raw: Records,
    observed: Records,
    col_out: Array1<f64>,
    col_res: Array1<f64>,
}

impl FilterObjective {
    fn new(raw: Records, observed: Records) -> Self {
        let nt = raw.tgrid.nt;
        FilterObjective {
            raw,
            observed,
            col_out: Array1::zeros(nt),
            col_res: Array1::zeros(nt),
        }
    }
}

impl Objective for FilterObjective {
    fn value(&mut self, filter: &Array1<f64>) -> SeisResult<f64> {
        let mut f = 0.0;
        for (is, raw) in self.raw.traces.iter().enumerate() {
            let obs = &self.observed.traces[is];
            for ir in 0..raw.ncols() {
                let col = raw.column(ir).to_owned();
                conv_causal(&col, filter, &mut self.col_out);
                for it in 0..raw.nrows() {
                    let d = self.col_out[it] - obs[[it, ir]];
                    f += d * d;
                }
            }
        }
        Ok(0.5 * f)
    }

    fn gradient(&mut self, grad: &mut Array1<f64>, filter: &Array1<f64>) -> SeisResult<()> {
        grad.fill(0.0);
        let mut gk = Array1::zeros(filter.len());
        for (is, raw) in self.raw.traces.iter().enumerate() {
            let obs = &self.observed.traces[is];
            for ir in 0..raw.ncols() {
                let col = raw.column(ir).to_owned();
                conv_causal(&col, filter, &mut self.col_out);
                for it in 0..raw.nrows() {
                    self.col_res[it] = self.col_out[it] - obs[[it, ir]];
                }
                conv_kernel_adjoint(&col, &self.col_res, &mut gk);
                for k in 0..filter.len() {
                    grad[k] += gk[k];
                }
            }
        }
        Ok(())
    }
}

/// Estimate the session's source coupling filter at the current model.
/// Returns the coupling misfit at the estimated filter.
pub fn estimate_coupling<E: ForwardEngine>(
    session: &mut Session<E>,
    filter_len: usize,
    opts: &OptimizerOptions,
) -> SeisResult<f64> {
    if filter_len == 0 || filter_len > session.tgrid.nt {
        return Err(SeisError::ConfigError(format!(
            "coupling filter length must be in 1..={}, got {filter_len}",
            session.tgrid.nt
        )));
    }

    // The raw engine response at the current vector is the filter input.
    let x = session.mx.x.clone();
    session.forward(&x)?;
    let raw = session.engine().recorded().clone();
    if raw.is_zero() {
        return Err(SeisError::MissingData(
            "calculated data is identically zero; nothing to couple against".to_string(),
        ));
    }

    let mut x0 = Array1::zeros(filter_len);
    let current = session.source_filter();
    for k in 0..filter_len.min(current.len()) {
        x0[k] = current[k];
    }

    let mut objective = FilterObjective::new(raw, session.observed.clone());
    let min_opts = MinimizeOptions {
        iterations: opts.iterations,
        f_tol: opts.f_tol,
        g_tol: opts.g_tol,
        step_tol: opts.step_tol,
        ..Default::default()
    };
    // Coupling estimation is always unconstrained.
    let result = minimize(&mut objective, &x0, None, &min_opts)?;

    session.set_source_filter(result.x)?;
    Ok(result.fmin)
}

#[derive(Debug, Clone)]
pub struct JointResult {
    pub round_trips: usize,
    pub total_misfit: f64,
    pub misfit_history: Vec<f64>,
    pub converged: bool,
    pub filter: Array1<f64>,
}

/// Alternating source/model joint inversion.
pub fn joint_invert<E: ForwardEngine>(
    session: &mut Session<E>,
    kind: ObjectiveKind,
    filter_len: usize,
    opt_opts: &OptimizerOptions,
    round_opts: &RoundTripOptions,
) -> SeisResult<JointResult> {
    match kind {
        ObjectiveKind::Ls | ObjectiveKind::LsPrior { .. } => {}
        other => {
            return Err(SeisError::ConfigError(format!(
                "joint inversion requires an LS-type objective, got {other:?}"
            )))
        }
    }
    if round_opts.max_round_trips < round_opts.min_round_trips || round_opts.max_round_trips == 0 {
        return Err(SeisError::ConfigError(
            "round trips: need max >= min >= 0 and max >= 1".to_string(),
        ));
    }

    let initial_x = session.mx.x.clone();
    let mut misfit_history = Vec::with_capacity(round_opts.max_round_trips);
    let mut prev_total = f64::INFINITY;
    let mut total = f64::INFINITY;
    let mut round_trips = 0;
    let mut converged = false;

    for round in 0..round_opts.max_round_trips {
        round_trips = round + 1;

        estimate_coupling(session, filter_len, opt_opts)?;

        total = match invert(session, kind, opt_opts)? {
            InversionOutcome::Optimized(result) => result.misfit,
            InversionOutcome::Migration(_) => unreachable!("LS-type kinds never migrate"),
        };
        misfit_history.push(total);

        if round_trips >= round_opts.min_round_trips && prev_total.is_finite() {
            let rel = (prev_total - total).abs() / prev_total.abs().max(1e-30);
            if rel < round_opts.tolerance {
                converged = true;
                break;
            }
        }
        prev_total = total;

        // Reinitialization hook: restart the model phase from the
        // original vector on the next round.
        if round_opts.reinitialize && round + 1 < round_opts.max_round_trips {
            session.apply_vector(&initial_x)?;
            session.mx.x.assign(&initial_x);
            session.mx.last_x = None;
        }
    }

    Ok(JointResult {
        round_trips,
        total_misfit: total,
        misfit_history,
        converged,
        filter: session.source_filter().clone(),
    })
}
