// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Optimizer Loop
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Stateless driver around the bounded quasi-Newton routine.
//!
//! LS-type objectives run the full multi-iteration optimization and push
//! the minimizer back through the parameterization into both grids,
//! warm-starting the next invocation. The migration kinds short-circuit:
//! one gradient evaluation at the initial vector, returned as an image.

use crate::engine::ForwardEngine;
use crate::objective::{finite_difference_gradient, ObjectiveKind, SessionObjective};
use crate::session::Session;
use ndarray::{Array1, Array2};
use seis_math::lbfgsb::{minimize, MinimizeOptions};
use seis_types::config::OptimizerOptions;
use seis_types::error::SeisResult;

/// Step used by the finite-difference migration variant.
const MIGR_FD_STEP: f64 = 1e-6;

/// Result of an LS-type optimization run. Non-convergence is reported
/// here, never as an error.
#[derive(Debug, Clone)]
pub struct InversionResult {
    pub x: Array1<f64>,
    pub misfit: f64,
    pub iterations: usize,
    pub converged: bool,
    pub misfit_history: Vec<f64>,
    pub solve_time_ms: f64,
}

/// Per-channel gradient image on the inversion grid.
#[derive(Debug, Clone)]
pub struct MigrationImage {
    pub channels: Vec<Array2<f64>>,
    pub misfit: f64,
}

#[derive(Debug, Clone)]
pub enum InversionOutcome {
    Optimized(InversionResult),
    Migration(MigrationImage),
}

fn image_from_vector<E: ForwardEngine>(
    session: &Session<E>,
    grad: &Array1<f64>,
) -> Vec<Array2<f64>> {
    let coarse = session.map.coarse();
    let (cnz, cnx) = (coarse.nz, coarse.nx);
    let ncc = coarse.ncells();
    (0..session.descriptor.nchannels())
        .map(|ch| Array2::from_shape_fn((cnz, cnx), |(iz, ix)| grad[ch * ncc + iz * cnx + ix]))
        .collect()
}

/// Drive one inversion (or migration) of the session.
pub fn invert<E: ForwardEngine>(
    session: &mut Session<E>,
    kind: ObjectiveKind,
    opts: &OptimizerOptions,
) -> SeisResult<InversionOutcome> {
    let start = std::time::Instant::now();
    let x0 = session.mx.x.clone();

    match kind {
        ObjectiveKind::Migr => {
            session.forward(&x0)?;
            let misfit = session.misfit()?;
            session.assemble_gradient()?;
            let grad = session.mx.grad.clone();
            return Ok(InversionOutcome::Migration(MigrationImage {
                channels: image_from_vector(session, &grad),
                misfit,
            }));
        }
        ObjectiveKind::MigrFd => {
            session.forward(&x0)?;
            let misfit = session.misfit()?;
            let grad = finite_difference_gradient(session, &x0, MIGR_FD_STEP)?;
            return Ok(InversionOutcome::Migration(MigrationImage {
                channels: image_from_vector(session, &grad),
                misfit,
            }));
        }
        ObjectiveKind::Ls | ObjectiveKind::LsPrior { .. } => {}
    }

    // Bounds are computed once per invocation, before iteration starts.
    session.refresh_bounds()?;
    let lower = session.mx.lower.clone();
    let upper = session.mx.upper.clone();

    let min_opts = MinimizeOptions {
        iterations: opts.iterations,
        f_tol: opts.f_tol,
        g_tol: opts.g_tol,
        step_tol: opts.step_tol,
        ..Default::default()
    };

    let result = {
        let mut objective = SessionObjective::new(session, kind)?;
        let bounds = if opts.bounded {
            Some((&lower, &upper))
        } else {
            None
        };
        minimize(&mut objective, &x0, bounds, &min_opts)?
    };

    // Push the minimizer into both the inversion-grid and modeling-grid
    // models and warm-start the next invocation from it.
    session.apply_vector(&result.x)?;
    session.mx.x.assign(&result.x);

    Ok(InversionOutcome::Optimized(InversionResult {
        x: result.x,
        misfit: result.fmin,
        iterations: result.iterations,
        converged: result.converged,
        misfit_history: result.f_history,
        solve_time_ms: start.elapsed().as_secs_f64() * 1000.0,
    }))
}
