// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — End-to-End Inversion Suite
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Whole-pipeline scenarios: synthetic model recovery, joint
//! source/model estimation, and config-driven construction.

use ndarray::Array1;
use seis_core::coupling::{estimate_coupling, joint_invert};
use seis_core::invert::{invert, InversionOutcome};
use seis_core::kirchhoff::KirchhoffEngine;
use seis_core::objective::ObjectiveKind;
use seis_core::parameterization::{MediumParam, ParamDescriptor};
use seis_core::session::{DataMode, Session, SessionOptions};
use seis_math::conv::conv_causal;
use seis_types::config::{InversionConfig, OptimizerOptions, RoundTripOptions};
use seis_types::geometry::AcquisitionGeometry;
use seis_types::grid::{Grid2D, TimeGrid};
use seis_types::medium::{FieldBounds, MediumModel};

fn base_model() -> MediumModel {
    let grid = Grid2D::new(17, 17, 0.0, 1.6, 0.0, 1.6);
    MediumModel::uniform(
        grid,
        2000.0,
        1800.0,
        FieldBounds::new(1500.0, 3000.0).unwrap(),
        FieldBounds::new(1200.0, 2500.0).unwrap(),
    )
    .unwrap()
}

fn synthetic_session(noise: Option<(f64, u64)>) -> Session<KirchhoffEngine> {
    let initial = base_model();
    let mut true_model = initial.clone();
    true_model.vp[[9, 8]] += 150.0;
    true_model.vp[[10, 9]] += 90.0;
    true_model.rho[[8, 8]] += 80.0;
    let tgrid = TimeGrid::new(80, 0.0002, 0.0);
    let geometry = AcquisitionGeometry::surface_line(&initial.grid, 2, 6, 0.1).unwrap();
    let wavelet = tgrid.ricker(250.0, 0.002);
    let engine =
        KirchhoffEngine::new(initial.clone(), tgrid.clone(), geometry.clone(), wavelet).unwrap();
    let descriptor = ParamDescriptor::new(vec![MediumParam::Bulk, MediumParam::Density]).unwrap();
    Session::new(
        engine,
        tgrid,
        geometry,
        initial,
        descriptor,
        DataMode::Synthetic { true_model, noise },
        SessionOptions {
            grid_margin: 3,
            grid_step: 2,
            precondition_factor: 1.0,
            ..Default::default()
        },
    )
    .unwrap()
}

/// Session whose initial model sits off the engine background, so the
/// starting calculated data carries scattered energy (the coupling
/// estimator refuses to work against identically zero data).
fn offset_session() -> Session<KirchhoffEngine> {
    let background = base_model();
    let mut initial = background.clone();
    for iz in 6..12 {
        for ix in 6..12 {
            initial.vp[[iz, ix]] += 40.0;
        }
    }
    let mut true_model = background.clone();
    true_model.vp[[9, 8]] += 150.0;
    true_model.vp[[10, 9]] += 90.0;
    true_model.rho[[8, 8]] += 80.0;
    let tgrid = TimeGrid::new(80, 0.0002, 0.0);
    let geometry = AcquisitionGeometry::surface_line(&background.grid, 2, 6, 0.1).unwrap();
    let wavelet = tgrid.ricker(250.0, 0.002);
    let engine =
        KirchhoffEngine::new(background, tgrid.clone(), geometry.clone(), wavelet).unwrap();
    let descriptor = ParamDescriptor::new(vec![MediumParam::Bulk, MediumParam::Density]).unwrap();
    Session::new(
        engine,
        tgrid,
        geometry,
        initial,
        descriptor,
        DataMode::Synthetic {
            true_model,
            noise: None,
        },
        SessionOptions {
            grid_margin: 3,
            grid_step: 2,
            precondition_factor: 1.0,
            ..Default::default()
        },
    )
    .unwrap()
}

fn optimizer(iterations: usize, bounded: bool) -> OptimizerOptions {
    OptimizerOptions {
        iterations,
        f_tol: 1e-14,
        g_tol: 1e-12,
        step_tol: 1e-14,
        bounded,
    }
}

#[test]
fn synthetic_inversion_recovers_most_of_the_misfit() {
    let mut session = synthetic_session(None);
    let x0 = session.mx.x.clone();
    session.forward(&x0).unwrap();
    let f0 = session.misfit().unwrap();
    assert!(f0 > 0.0);

    let outcome = invert(&mut session, ObjectiveKind::Ls, &optimizer(30, false)).unwrap();
    let result = match outcome {
        InversionOutcome::Optimized(r) => r,
        other => panic!("expected optimized outcome, got {other:?}"),
    };
    assert!(
        result.misfit < 0.5 * f0,
        "expected at least half the misfit gone: {f0} -> {}",
        result.misfit
    );
    // The inverted dense model must have moved toward the true anomaly.
    let dv = session.model.vp[[9, 8]] - 2000.0;
    assert!(dv > 0.0, "velocity anomaly sign must be recovered, got {dv}");
}

#[test]
fn noisy_synthetic_inversion_still_descends() {
    let mut session = synthetic_session(Some((20.0, 11)));
    let x0 = session.mx.x.clone();
    session.forward(&x0).unwrap();
    let f0 = session.misfit().unwrap();

    let outcome = invert(&mut session, ObjectiveKind::Ls, &optimizer(15, false)).unwrap();
    let result = match outcome {
        InversionOutcome::Optimized(r) => r,
        other => panic!("expected optimized outcome, got {other:?}"),
    };
    assert!(result.misfit < f0, "noisy inversion must still descend");
}

#[test]
fn warm_start_second_invocation_continues_descent() {
    let mut session = synthetic_session(None);
    let first = match invert(&mut session, ObjectiveKind::Ls, &optimizer(5, false)).unwrap() {
        InversionOutcome::Optimized(r) => r,
        _ => unreachable!(),
    };
    let second = match invert(&mut session, ObjectiveKind::Ls, &optimizer(5, false)).unwrap() {
        InversionOutcome::Optimized(r) => r,
        _ => unreachable!(),
    };
    assert!(
        second.misfit <= first.misfit * (1.0 + 1e-9),
        "warm-started run must not regress: {} -> {}",
        first.misfit,
        second.misfit
    );
}

#[test]
fn prior_term_pulls_solution_toward_prior() {
    let mut session = synthetic_session(None);
    let nv = session.nvector();
    let prior = session.mx.x.clone();
    session.set_prior(prior.clone(), Array1::from_elem(nv, 1.0)).unwrap();

    // A strongly weighted prior keeps the minimizer near the start.
    let kind = ObjectiveKind::LsPrior {
        alpha_data: 1e-6,
        alpha_prior: 1.0,
    };
    let result = match invert(&mut session, kind, &optimizer(10, false)).unwrap() {
        InversionOutcome::Optimized(r) => r,
        _ => unreachable!(),
    };
    let drift: f64 = result
        .x
        .iter()
        .zip(prior.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    assert!(drift < 1e-2, "dominant prior must pin the solution, drift = {drift}");
}

#[test]
fn joint_inversion_recovers_coupling_distortion() {
    let mut session = offset_session();

    // Distort the observations with a source coupling filter the session
    // does not know about.
    let true_filter = Array1::from_vec(vec![0.9, -0.2, 0.05]);
    let x0 = session.mx.x.clone();
    // Synthesize what the true model records through the true filter: the
    // session's observed data already holds the true-model response, so
    // filter it trace by trace.
    let nt = session.tgrid.nt;
    let mut col_out = Array1::zeros(nt);
    let observed = session.observed.clone();
    let mut distorted = observed.clone();
    for (is, t) in distorted.traces.iter_mut().enumerate() {
        for ir in 0..t.ncols() {
            let col = observed.traces[is].column(ir).to_owned();
            conv_causal(&col, &true_filter, &mut col_out);
            for it in 0..nt {
                t[[it, ir]] = col_out[it];
            }
        }
    }
    session.observed = distorted;
    session.mx.last_x = None;

    session.forward(&x0).unwrap();
    let f0 = session.misfit().unwrap();

    let round_opts = RoundTripOptions {
        min_round_trips: 2,
        max_round_trips: 4,
        tolerance: 1e-8,
        reinitialize: false,
    };
    let result = joint_invert(
        &mut session,
        ObjectiveKind::Ls,
        3,
        &optimizer(10, false),
        &round_opts,
    )
    .unwrap();

    assert!(result.round_trips >= 2);
    assert!(
        result.total_misfit < 0.5 * f0,
        "joint inversion must absorb the coupling distortion: {f0} -> {}",
        result.total_misfit
    );
    assert_eq!(result.filter.len(), 3);
}

#[test]
fn coupling_estimation_requires_calculated_energy() {
    // A session whose current model equals the engine background records
    // nothing, so filter estimation has nothing to couple against.
    let initial = base_model();
    let mut true_model = initial.clone();
    true_model.vp[[9, 8]] += 150.0;
    let tgrid = TimeGrid::new(60, 0.0002, 0.0);
    let geometry = AcquisitionGeometry::surface_line(&initial.grid, 1, 5, 0.1).unwrap();
    let wavelet = tgrid.ricker(250.0, 0.002);
    let engine =
        KirchhoffEngine::new(initial.clone(), tgrid.clone(), geometry.clone(), wavelet).unwrap();
    let descriptor = ParamDescriptor::new(vec![MediumParam::Velocity]).unwrap();
    let mut session = Session::new(
        engine,
        tgrid,
        geometry,
        initial,
        descriptor,
        DataMode::Synthetic {
            true_model,
            noise: None,
        },
        SessionOptions {
            grid_margin: 3,
            grid_step: 2,
            ..Default::default()
        },
    )
    .unwrap();

    let err = estimate_coupling(&mut session, 3, &optimizer(5, false));
    match err {
        Err(seis_types::error::SeisError::MissingData(_)) => {}
        other => panic!("expected missing-data error, got {:?}", other.err()),
    }
}

#[test]
fn config_driven_session_runs_an_iteration() {
    let json = r#"{
        "survey_name": "toy-line",
        "grid_resolution": [17, 17],
        "dimensions": { "z_min": 0.0, "z_max": 1.6, "x_min": 0.0, "x_max": 1.6 },
        "time": { "nt": 80, "dt": 0.0002, "t0": 0.0 },
        "medium": {
            "ref_vp": 2000.0, "ref_rho": 1800.0,
            "vp_min": 1500.0, "vp_max": 3000.0,
            "rho_min": 1200.0, "rho_max": 2500.0
        },
        "acquisition": { "nshot": 2, "nrecv": 6, "depth": 0.1, "fpeak": 250.0 },
        "inversion": {
            "parameterization": ["chi_vp"],
            "grid_margin": 3,
            "grid_step": 2,
            "precondition_factor": 2.0
        },
        "optimizer": { "iterations": 8, "bounded": true }
    }"#;
    let config: InversionConfig = serde_json::from_str(json).unwrap();

    let mut true_model = MediumModel::uniform(
        config.create_grid(),
        config.medium.ref_vp,
        config.medium.ref_rho,
        FieldBounds::new(config.medium.vp_min, config.medium.vp_max).unwrap(),
        FieldBounds::new(config.medium.rho_min, config.medium.rho_max).unwrap(),
    )
    .unwrap();
    true_model.vp[[9, 8]] += 120.0;

    let mut session = Session::from_config(
        &config,
        DataMode::Synthetic {
            true_model,
            noise: None,
        },
    )
    .unwrap();
    assert!(!session.precond.is_identity());

    let outcome = invert(&mut session, ObjectiveKind::Ls, &config.optimizer).unwrap();
    let result = match outcome {
        InversionOutcome::Optimized(r) => r,
        other => panic!("expected optimized outcome, got {other:?}"),
    };
    assert!(result.iterations > 0);
    assert!(result.misfit.is_finite());
    for i in 0..result.x.len() {
        assert!(result.x[i] >= session.mx.lower[i] - 1e-12);
        assert!(result.x[i] <= session.mx.upper[i] + 1e-12);
    }
}
