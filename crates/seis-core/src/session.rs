// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Inversion Session
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! The inversion session: exclusive owner of models, data, optimization
//! variable, grid map, preconditioner and the forward-engine handle.
//!
//! Exactly one session exists per inversion problem. Every component
//! operates by reference into it; nothing keeps a private model copy.
//! All scratch buffers are allocated here once and reused by every
//! functional/gradient evaluation.

use crate::engine::{BufferState, ForwardEngine, SimSpec};
use crate::kirchhoff::KirchhoffEngine;
use crate::misfit;
use crate::parameterization::{
    chain_adjoint, chain_forward, compute_bounds, to_model, to_vector, ParamDescriptor,
};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use seis_math::conv::{conv_causal, xcorr_causal};
use seis_math::interp::{bilinear_sample, GridMap, InterpOrder};
use seis_math::precond::DiagPrecond;
use seis_types::data::Records;
use seis_types::error::{SeisError, SeisResult};
use seis_types::geometry::AcquisitionGeometry;
use seis_types::grid::{Grid2D, TimeGrid};
use seis_types::medium::MediumModel;

/// The optimization variable and its companions. Mutated only by session
/// initialization, the optimizer's line search, and gradient assembly.
#[derive(Debug, Clone)]
pub struct OptVariable {
    pub x: Array1<f64>,
    /// Vector of the most recent simulation; the caching key.
    pub last_x: Option<Array1<f64>>,
    pub lower: Array1<f64>,
    pub upper: Array1<f64>,
    pub grad: Array1<f64>,
    pub prior: Option<Array1<f64>>,
    pub prior_weights: Option<Array1<f64>>,
}

/// Where the observed data comes from.
pub enum DataMode {
    /// Measured records supplied by the caller.
    Field(Records),
    /// Synthesize observations from a known model at construction.
    Synthetic {
        true_model: MediumModel,
        /// Optional (snr, seed) Gaussian noise on the synthesized data.
        noise: Option<(f64, u64)>,
    },
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub grid_margin: usize,
    pub grid_step: usize,
    pub interp_order: InterpOrder,
    pub precondition_factor: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            grid_margin: 4,
            grid_step: 2,
            interp_order: InterpOrder::Linear,
            precondition_factor: 1.0,
        }
    }
}

pub struct Session<E: ForwardEngine> {
    engine: E,
    pub tgrid: TimeGrid,
    pub geometry: AcquisitionGeometry,
    pub descriptor: ParamDescriptor,
    pub map: GridMap,
    pub precond: DiagPrecond,
    /// Dense modeling-grid model.
    pub model: MediumModel,
    /// Coarse inversion-grid model.
    pub model_inv: MediumModel,
    pub observed: Records,
    pub calculated: Records,
    pub residual: Records,
    /// Source coupling filter; length 1 with value 1 means "off".
    source_filter: Array1<f64>,
    pub mx: OptVariable,
    // Scratch storage, allocated once.
    x_raw: Array1<f64>,
    dense_x: Array1<f64>,
    chi_coarse: Vec<Array2<f64>>,
    chi_dense: Vec<Array2<f64>>,
    dvp: Array2<f64>,
    drho: Array2<f64>,
    gchan: Vec<Array2<f64>>,
    col_in: Array1<f64>,
    col_out: Array1<f64>,
}

fn bitwise_eq(a: &Array1<f64>, b: &Array1<f64>) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Restrict a dense field onto the coarse nodes by bilinear sampling.
/// Initialization only; the gradient path goes through `GridMap::spray`.
fn restrict(dense: &Array2<f64>, dense_grid: &Grid2D, coarse: &Grid2D) -> Array2<f64> {
    Array2::from_shape_fn((coarse.nz, coarse.nx), |(iz, ix)| {
        bilinear_sample(dense, dense_grid, coarse.z[iz], coarse.x[ix])
    })
}

impl<E: ForwardEngine> Session<E> {
    /// Construct the session: validate the configuration, resolve the
    /// observed data, build the preconditioner, and initialize the
    /// optimization variable from the initial model.
    pub fn new(
        mut engine: E,
        tgrid: TimeGrid,
        geometry: AcquisitionGeometry,
        initial_model: MediumModel,
        descriptor: ParamDescriptor,
        data: DataMode,
        opts: SessionOptions,
    ) -> SeisResult<Self> {
        geometry.check_within(&initial_model.grid)?;
        let grid = initial_model.grid.clone();
        let coarse = grid.subsample(opts.grid_margin, opts.grid_step);
        if coarse.dz <= 0.0 || coarse.dx <= 0.0 {
            return Err(SeisError::ConfigError(format!(
                "grid margin {} leaves no inversion-grid interior on a {}x{} grid",
                opts.grid_margin, grid.nz, grid.nx
            )));
        }
        let map = GridMap::new(coarse.clone(), grid.clone(), opts.interp_order)?;

        let receivers_per_shot: Vec<usize> =
            geometry.shots.iter().map(|s| s.receivers.len()).collect();
        let calculated = Records::zeroed(tgrid.clone(), &receivers_per_shot);

        // Resolve observed data before anything touches the engine model.
        let observed = match data {
            DataMode::Field(records) => {
                calculated.assert_same_shape(&records)?;
                if records.is_zero() {
                    return Err(SeisError::MissingData(
                        "observed data is identically zero and no synthesis path is configured"
                            .to_string(),
                    ));
                }
                records
            }
            DataMode::Synthetic { true_model, noise } => {
                initial_model.assert_same_grid(&true_model)?;
                if true_model.fields_identical(&initial_model) {
                    return Err(SeisError::ConfigError(
                        "synthetic mode: initial model identical to the true model".to_string(),
                    ));
                }
                engine.update_model(&true_model, None)?;
                engine.configure(&SimSpec::forward(false))?;
                engine.simulate()?;
                let mut records = engine.recorded().clone();
                if let Some((snr, seed)) = noise {
                    let mut rng = StdRng::seed_from_u64(seed);
                    records.add_noise(snr, &mut rng)?;
                }
                records
            }
        };

        // Inversion-grid model: same references and bounds, fields
        // restricted from the dense initial model.
        let model_inv = MediumModel::from_fields(
            coarse.clone(),
            restrict(&initial_model.vp, &grid, &coarse),
            restrict(&initial_model.rho, &grid, &coarse),
            initial_model.ref_vp(),
            initial_model.ref_rho(),
            initial_model.vp_bounds,
            initial_model.rho_bounds,
        )?;

        // Preconditioner from the initial model's illumination.
        engine.update_model(&initial_model, None)?;
        let nch = descriptor.nchannels();
        let precond = if opts.precondition_factor > 1.0 {
            let spec = SimSpec {
                mode: crate::engine::ModelingMode::Forward,
                save_boundary: false,
                want_illumination: true,
            };
            engine.configure(&spec)?;
            engine.simulate()?;
            DiagPrecond::build(
                engine.illumination()?,
                &map,
                opts.precondition_factor,
                nch,
            )?
        } else if opts.precondition_factor == 1.0 {
            DiagPrecond::identity(nch * coarse.ncells())
        } else {
            return Err(SeisError::ConfigError(format!(
                "precondition factor must be >= 1, got {}",
                opts.precondition_factor
            )));
        };

        let mut x = to_vector(&model_inv, &descriptor);
        precond.apply(&mut x)?;
        let (mut lower, mut upper) = compute_bounds(&model_inv, &descriptor)?;
        precond.apply(&mut lower)?;
        precond.apply(&mut upper)?;

        let nv = x.len();
        let mx = OptVariable {
            x,
            last_x: None,
            lower,
            upper,
            grad: Array1::zeros(nv),
            prior: None,
            prior_weights: None,
        };

        let cshape = (coarse.nz, coarse.nx);
        let dshape = (grid.nz, grid.nx);
        let residual = calculated.clone();

        Ok(Session {
            engine,
            tgrid,
            geometry,
            descriptor,
            map,
            precond,
            model: initial_model,
            model_inv,
            observed,
            residual,
            source_filter: Array1::from_vec(vec![1.0]),
            mx,
            x_raw: Array1::zeros(nv),
            dense_x: Array1::zeros(nch * grid.ncells()),
            chi_coarse: (0..nch).map(|_| Array2::zeros(cshape)).collect(),
            chi_dense: (0..nch).map(|_| Array2::zeros(dshape)).collect(),
            dvp: Array2::zeros(dshape),
            drho: Array2::zeros(dshape),
            gchan: (0..nch).map(|_| Array2::zeros(dshape)).collect(),
            col_in: Array1::zeros(calculated.tgrid.nt),
            col_out: Array1::zeros(calculated.tgrid.nt),
            calculated,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn source_filter(&self) -> &Array1<f64> {
        &self.source_filter
    }

    /// Install a new coupling filter. Invalidates the forward cache: the
    /// filter changes the calculated data even at an unchanged vector.
    pub fn set_source_filter(&mut self, filter: Array1<f64>) -> SeisResult<()> {
        if filter.is_empty() || filter.len() > self.tgrid.nt {
            return Err(SeisError::ConfigError(format!(
                "coupling filter length must be in 1..={}, got {}",
                self.tgrid.nt,
                filter.len()
            )));
        }
        self.source_filter = filter;
        self.mx.last_x = None;
        Ok(())
    }

    pub fn nvector(&self) -> usize {
        self.mx.x.len()
    }

    /// Install a prior vector and per-element weights for the LS+prior
    /// objective.
    pub fn set_prior(&mut self, prior: Array1<f64>, weights: Array1<f64>) -> SeisResult<()> {
        if prior.len() != self.nvector() || weights.len() != self.nvector() {
            return Err(SeisError::ShapeMismatch {
                expected: format!("prior/weights of length {}", self.nvector()),
                got: format!("{} / {}", prior.len(), weights.len()),
            });
        }
        self.mx.prior = Some(prior);
        self.mx.prior_weights = Some(weights);
        Ok(())
    }

    /// Unpack `x` into the per-channel coarse contrast fields and
    /// interpolate each onto the dense grid. Leaves `x_raw`, `chi_coarse`
    /// and `chi_dense` populated.
    fn unpack_and_interpolate(&mut self, x: &Array1<f64>) -> SeisResult<()> {
        if x.len() != self.nvector() {
            return Err(SeisError::ShapeMismatch {
                expected: format!("vector of length {}", self.nvector()),
                got: format!("length {}", x.len()),
            });
        }
        self.x_raw.assign(x);
        self.precond.apply_inv(&mut self.x_raw)?;
        let ncc = self.map.coarse().ncells();
        let cnx = self.map.coarse().nx;
        for ch in 0..self.descriptor.nchannels() {
            for i in 0..ncc {
                self.chi_coarse[ch][[i / cnx, i % cnx]] = self.x_raw[ch * ncc + i];
            }
            self.map.interpolate(&self.chi_coarse[ch], &mut self.chi_dense[ch])?;
        }
        Ok(())
    }

    /// Push an optimization vector into both models (the full nonlinear
    /// vector → model update).
    pub fn apply_vector(&mut self, x: &Array1<f64>) -> SeisResult<()> {
        self.unpack_and_interpolate(x)?;
        to_model(&self.x_raw, &self.descriptor, &mut self.model_inv)?;
        let ncd = self.model.grid.ncells();
        for ch in 0..self.descriptor.nchannels() {
            for (i, &v) in self.chi_dense[ch].iter().enumerate() {
                self.dense_x[ch * ncd + i] = v;
            }
        }
        to_model(&self.dense_x, &self.descriptor, &mut self.model)?;
        Ok(())
    }

    fn apply_source_filter(&mut self) {
        let filter_off = self.source_filter.len() == 1 && self.source_filter[0] == 1.0;
        for (is, raw) in self.engine.recorded().traces.iter().enumerate() {
            let out = &mut self.calculated.traces[is];
            if filter_off {
                out.assign(raw);
                continue;
            }
            for ir in 0..raw.ncols() {
                for it in 0..raw.nrows() {
                    self.col_in[it] = raw[[it, ir]];
                }
                conv_causal(&self.col_in, &self.source_filter, &mut self.col_out);
                for it in 0..raw.nrows() {
                    out[[it, ir]] = self.col_out[it];
                }
            }
        }
    }

    /// Forward driver. Skips the simulation entirely when `x` is
    /// bitwise-equal to the last simulated vector and the boundary buffer
    /// is still valid. This is the sole re-simulation-avoidance mechanism
    /// and the dominant-cost guard of the whole inversion.
    pub fn forward(&mut self, x: &Array1<f64>) -> SeisResult<()> {
        if let Some(last) = &self.mx.last_x {
            if bitwise_eq(last, x) && self.engine.buffer_state() == BufferState::Valid {
                return Ok(());
            }
        }
        self.apply_vector(x)?;
        self.engine.update_model(&self.model, None)?;
        self.engine.configure(&SimSpec::forward(true))?;
        self.engine.simulate()?;
        self.apply_source_filter();
        match &mut self.mx.last_x {
            Some(last) => last.assign(x),
            None => self.mx.last_x = Some(x.clone()),
        }
        Ok(())
    }

    /// Evaluate the data misfit against the observed records, leaving the
    /// residual populated for adjoint-source construction.
    pub fn misfit(&mut self) -> SeisResult<f64> {
        misfit::functional_and_gradient(&self.calculated, &self.observed, &mut self.residual)
    }

    /// Assemble the gradient from the current residual, in the exact
    /// adjoint order of the forward map: coupling-filter adjoint →
    /// time-reversed adjoint sources → adjoint simulation → raw gradient
    /// fields → reparameterization chain rule → spray → P⁻¹.
    /// The result lands in `mx.grad`.
    pub fn assemble_gradient(&mut self) -> SeisResult<()> {
        let filter_off = self.source_filter.len() == 1 && self.source_filter[0] == 1.0;
        if !filter_off {
            for is in 0..self.residual.nshots() {
                let trace = &mut self.residual.traces[is];
                for ir in 0..trace.ncols() {
                    for it in 0..trace.nrows() {
                        self.col_in[it] = trace[[it, ir]];
                    }
                    xcorr_causal(&self.col_in, &self.source_filter, &mut self.col_out);
                    for it in 0..trace.nrows() {
                        trace[[it, ir]] = self.col_out[it];
                    }
                }
            }
        }

        let adjoint_sources = self.residual.reversed();
        self.engine.set_adjoint_sources(&adjoint_sources)?;
        self.engine.configure(&SimSpec::adjoint())?;
        self.engine.simulate()?;

        {
            let (gvp, grho) = self.engine.gradient()?;
            self.dvp.assign(gvp);
            self.drho.assign(grho);
        }
        chain_adjoint(
            &self.descriptor,
            &self.model,
            &self.dvp,
            &self.drho,
            &mut self.gchan,
        )?;

        let ncc = self.map.coarse().ncells();
        for ch in 0..self.descriptor.nchannels() {
            self.map.spray(&self.gchan[ch], &mut self.chi_coarse[ch])?;
            for (i, &v) in self.chi_coarse[ch].iter().enumerate() {
                self.mx.grad[ch * ncc + i] = v;
            }
        }
        self.precond.apply_inv(&mut self.mx.grad)?;
        Ok(())
    }

    /// Recompute and store the bound vectors; called once per optimizer
    /// invocation.
    pub fn refresh_bounds(&mut self) -> SeisResult<()> {
        let (mut lower, mut upper) = compute_bounds(&self.model_inv, &self.descriptor)?;
        self.precond.apply(&mut lower)?;
        self.precond.apply(&mut upper)?;
        self.mx.lower = lower;
        self.mx.upper = upper;
        Ok(())
    }
}

impl Session<KirchhoffEngine> {
    /// Build a Kirchhoff-engine session straight from an
    /// [`InversionConfig`]: uniform initial medium at the references, a
    /// surface acquisition line, and a Ricker wavelet at the configured
    /// peak frequency.
    pub fn from_config(
        config: &seis_types::config::InversionConfig,
        data: DataMode,
    ) -> SeisResult<Session<KirchhoffEngine>> {
        use seis_types::medium::FieldBounds;

        config.validate()?;
        let grid = config.create_grid();
        let initial = MediumModel::uniform(
            grid.clone(),
            config.medium.ref_vp,
            config.medium.ref_rho,
            FieldBounds::new(config.medium.vp_min, config.medium.vp_max)?,
            FieldBounds::new(config.medium.rho_min, config.medium.rho_max)?,
        )?;
        let geometry = AcquisitionGeometry::surface_line(
            &grid,
            config.acquisition.nshot,
            config.acquisition.nrecv,
            config.dimensions.z_min + config.acquisition.depth,
        )?;
        let tgrid = config.time.clone();
        let wavelet = tgrid.ricker(config.acquisition.fpeak, 1.5 / config.acquisition.fpeak);
        let engine =
            KirchhoffEngine::new(initial.clone(), tgrid.clone(), geometry.clone(), wavelet)?;
        let descriptor = ParamDescriptor::from_names(&config.inversion.parameterization)?;
        let opts = SessionOptions {
            grid_margin: config.inversion.grid_margin,
            grid_step: config.inversion.grid_step,
            interp_order: InterpOrder::parse(&config.inversion.interp_order)?,
            precondition_factor: config.inversion.precondition_factor,
        };
        Session::new(engine, tgrid, geometry, initial, descriptor, data, opts)
    }

    /// [`Session::from_config`] with the configuration read from a JSON
    /// file.
    pub fn from_config_file(path: &str, data: DataMode) -> SeisResult<Session<KirchhoffEngine>> {
        let config = seis_types::config::InversionConfig::from_file(path)?;
        Self::from_config(&config, data)
    }

    /// Linearized forward map at the current model: δx → data.
    ///
    /// Runs the same chain the production forward differentiates
    /// (P⁻¹, interpolate, reparameterize, Born scatter), so
    /// [`Session::assemble_gradient`] is its exact adjoint. Clobbers the
    /// calculated records.
    pub fn linearized_forward(&mut self, dx: &Array1<f64>) -> SeisResult<Records> {
        self.unpack_and_interpolate(dx)?;
        chain_forward(
            &self.descriptor,
            &self.model,
            &self.chi_dense,
            &mut self.dvp,
            &mut self.drho,
        )?;
        self.engine.born_apply(&self.dvp, &self.drho)?;
        Ok(self.engine.recorded().clone())
    }

    /// Pull a data-space vector back to the optimization space through
    /// the production gradient pipeline.
    pub fn pullback(&mut self, data: &Records) -> SeisResult<Array1<f64>> {
        self.residual.assert_same_shape(data)?;
        for (dst, src) in self.residual.traces.iter_mut().zip(data.traces.iter()) {
            dst.assign(src);
        }
        self.assemble_gradient()?;
        Ok(self.mx.grad.clone())
    }
}
