// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Kirchhoff Reference Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reference [`ForwardEngine`]: single-scattering (Born) modeling with
//! straight-ray traveltime Green's functions in a fixed background medium.
//!
//! Every recorded sample is a linear functional of the scattering
//! strength, so the adjoint run is the exact transpose of the forward
//! run, which is the property the inversion core's gradient depends on.
//! All wavefield, boundary and gradient storage is allocated at
//! construction and reused for every simulation.

use crate::engine::{require_valid_buffer, BufferState, ForwardEngine, ModelingMode, SimSpec};
use ndarray::{Array1, Array2};
use seis_types::data::Records;
use seis_types::error::{SeisError, SeisResult};
use seis_types::geometry::{AcquisitionGeometry, Position};
use seis_types::grid::{Grid2D, TimeGrid};
use seis_types::medium::MediumModel;

/// Fractional-sample delay and geometric amplitude of one ray leg.
#[derive(Debug, Clone, Copy)]
struct RayLeg {
    delay: f64,
    amp: f64,
}

pub struct KirchhoffEngine {
    grid: Grid2D,
    tgrid: TimeGrid,
    geometry: AcquisitionGeometry,
    adjoint_geometry: AcquisitionGeometry,
    wavelet: Array1<f64>,
    background: MediumModel,
    model: MediumModel,
    perturbed: Option<MediumModel>,
    spec: SimSpec,
    records: Records,
    adjoint_sources: Option<Records>,
    /// [shot][source][cell]: source-side leg.
    src_legs: Vec<Vec<Vec<RayLeg>>>,
    /// [shot][receiver][cell]: receiver leg.
    rec_legs: Vec<Vec<Vec<RayLeg>>>,
    /// Boundary-value buffer: per shot the incident wavefield `[nt, ncells]`.
    incident: Vec<Array2<f64>>,
    buffer: BufferState,
    gvp: Array2<f64>,
    grho: Array2<f64>,
    gradient_ready: bool,
    illum: Array2<f64>,
    illum_ready: bool,
    /// Scattering sensitivities per cell, fixed by the background medium.
    svp: Array2<f64>,
    srho: Array2<f64>,
    nsim: usize,
}

fn ray_leg(from: &Position, cell_z: f64, cell_x: f64, vp_bg: f64, dt: f64, h: f64) -> RayLeg {
    let dist = ((from.z - cell_z).powi(2) + (from.x - cell_x).powi(2)).sqrt();
    RayLeg {
        delay: dist / vp_bg / dt,
        amp: 1.0 / dist.max(h),
    }
}

impl KirchhoffEngine {
    pub fn new(
        background: MediumModel,
        tgrid: TimeGrid,
        geometry: AcquisitionGeometry,
        wavelet: Array1<f64>,
    ) -> SeisResult<Self> {
        if wavelet.len() != tgrid.nt {
            return Err(SeisError::ShapeMismatch {
                expected: format!("wavelet of nt={} samples", tgrid.nt),
                got: format!("{} samples", wavelet.len()),
            });
        }
        geometry.check_within(&background.grid)?;

        let grid = background.grid.clone();
        let (nz, nx) = (grid.nz, grid.nx);
        let ncells = grid.ncells();
        let h = grid.dz.min(grid.dx);

        let mut src_legs = Vec::with_capacity(geometry.nshots());
        let mut rec_legs = Vec::with_capacity(geometry.nshots());
        for shot in &geometry.shots {
            let mut per_src: Vec<Vec<RayLeg>> = shot
                .sources
                .iter()
                .map(|_| Vec::with_capacity(ncells))
                .collect();
            for (js, src) in shot.sources.iter().enumerate() {
                for iz in 0..nz {
                    for ix in 0..nx {
                        let vp_bg = background.vp[[iz, ix]];
                        per_src[js].push(ray_leg(src, grid.z[iz], grid.x[ix], vp_bg, tgrid.dt, h));
                    }
                }
            }
            src_legs.push(per_src);

            let mut per_rec = Vec::with_capacity(shot.receivers.len());
            for rec in &shot.receivers {
                let mut legs = Vec::with_capacity(ncells);
                for iz in 0..nz {
                    for ix in 0..nx {
                        let vp_bg = background.vp[[iz, ix]];
                        legs.push(ray_leg(rec, grid.z[iz], grid.x[ix], vp_bg, tgrid.dt, h));
                    }
                }
                per_rec.push(legs);
            }
            rec_legs.push(per_rec);
        }

        let receivers_per_shot: Vec<usize> =
            geometry.shots.iter().map(|s| s.receivers.len()).collect();
        let incident = geometry
            .shots
            .iter()
            .map(|_| Array2::zeros((tgrid.nt, ncells)))
            .collect();

        let svp = Array2::from_shape_fn((nz, nx), |(iz, ix)| 2.0 / background.vp[[iz, ix]]);
        let srho = Array2::from_shape_fn((nz, nx), |(iz, ix)| 1.0 / background.rho[[iz, ix]]);

        Ok(KirchhoffEngine {
            adjoint_geometry: geometry.adjoint(),
            records: Records::zeroed(tgrid.clone(), &receivers_per_shot),
            model: background.clone(),
            perturbed: None,
            spec: SimSpec::forward(false),
            adjoint_sources: None,
            src_legs,
            rec_legs,
            incident,
            buffer: BufferState::NeedsRebuild,
            gvp: Array2::zeros((nz, nx)),
            grho: Array2::zeros((nz, nx)),
            gradient_ready: false,
            illum: Array2::zeros((nz, nx)),
            illum_ready: false,
            svp,
            srho,
            grid,
            tgrid,
            geometry,
            wavelet,
            background,
            nsim: 0,
        })
    }

    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }

    pub fn tgrid(&self) -> &TimeGrid {
        &self.tgrid
    }

    pub fn geometry(&self) -> &AcquisitionGeometry {
        &self.geometry
    }

    /// Geometry of the back-propagation: receivers act as sources.
    pub fn adjoint_geometry(&self) -> &AcquisitionGeometry {
        &self.adjoint_geometry
    }

    pub fn background(&self) -> &MediumModel {
        &self.background
    }

    /// Rebuild the incident wavefields (the boundary-value buffer) for
    /// every shot: the source wavelet delayed and scaled by each
    /// source-group leg.
    fn build_incident(&mut self) {
        let nt = self.tgrid.nt;
        let ncells = self.grid.ncells();
        for (is, _) in self.geometry.shots.iter().enumerate() {
            let u = &mut self.incident[is];
            u.fill(0.0);
            for legs in &self.src_legs[is] {
                for c in 0..ncells {
                    let leg = legs[c];
                    let i0 = leg.delay.floor() as usize;
                    let f = leg.delay - i0 as f64;
                    for itw in 0..nt {
                        let t0 = itw + i0;
                        if t0 < nt {
                            u[[t0, c]] += leg.amp * (1.0 - f) * self.wavelet[itw];
                        }
                        let t1 = itw + i0 + 1;
                        if t1 < nt {
                            u[[t1, c]] += leg.amp * f * self.wavelet[itw];
                        }
                    }
                }
            }
        }
    }

    /// Scattering strength per cell from perturbation fields.
    fn scattering(&self, dvp: &Array2<f64>, drho: &Array2<f64>) -> Array1<f64> {
        let ncells = self.grid.ncells();
        let nx = self.grid.nx;
        Array1::from_shape_fn(ncells, |c| {
            let (iz, ix) = (c / nx, c % nx);
            self.svp[[iz, ix]] * dvp[[iz, ix]] + self.srho[[iz, ix]] * drho[[iz, ix]]
        })
    }

    /// Forward scatter: records = Σ_cells receiver-leg-delayed incident
    /// field times the scattering strength.
    fn scatter(&mut self, strength: &Array1<f64>) {
        let nt = self.tgrid.nt;
        let ncells = self.grid.ncells();
        for (is, _) in self.geometry.shots.iter().enumerate() {
            let u = &self.incident[is];
            let rec = &mut self.records.traces[is];
            rec.fill(0.0);
            for (ir, legs) in self.rec_legs[is].iter().enumerate() {
                for c in 0..ncells {
                    let p = strength[c];
                    if p == 0.0 {
                        continue;
                    }
                    let leg = legs[c];
                    let i0 = leg.delay.floor() as usize;
                    let f = leg.delay - i0 as f64;
                    for it in 0..nt {
                        let mut v = 0.0;
                        if it >= i0 {
                            v += (1.0 - f) * u[[it - i0, c]];
                        }
                        if it >= i0 + 1 {
                            v += f * u[[it - i0 - 1, c]];
                        }
                        rec[[it, ir]] += leg.amp * p * v;
                    }
                }
            }
        }
    }

    /// Exact transpose of [`KirchhoffEngine::scatter`]: correlate the
    /// back-propagated residual with the stored incident field.
    fn image(&self, adj: &Records) -> Array1<f64> {
        let nt = self.tgrid.nt;
        let ncells = self.grid.ncells();
        let mut q = Array1::zeros(ncells);
        for (is, _) in self.geometry.shots.iter().enumerate() {
            let u = &self.incident[is];
            let src = &adj.traces[is];
            for (ir, legs) in self.rec_legs[is].iter().enumerate() {
                for c in 0..ncells {
                    let leg = legs[c];
                    let i0 = leg.delay.floor() as usize;
                    let f = leg.delay - i0 as f64;
                    let mut acc = 0.0;
                    for it in 0..nt {
                        let mut v = 0.0;
                        if it >= i0 {
                            v += (1.0 - f) * u[[it - i0, c]];
                        }
                        if it >= i0 + 1 {
                            v += f * u[[it - i0 - 1, c]];
                        }
                        // Adjoint sources arrive time-reversed; undo the
                        // reversal while correlating.
                        acc += leg.amp * v * src[[nt - 1 - it, ir]];
                    }
                    q[c] += acc;
                }
            }
        }
        q
    }

    fn accumulate_illumination(&mut self) {
        let nx = self.grid.nx;
        self.illum.fill(0.0);
        for u in &self.incident {
            for (c, col) in u.columns().into_iter().enumerate() {
                let e: f64 = col.iter().map(|&v| v * v).sum();
                self.illum[[c / nx, c % nx]] += e;
            }
        }
        // Floor keeps weakly illuminated cells strictly positive for the
        // preconditioner.
        let max = self.illum.iter().cloned().fold(0.0_f64, f64::max);
        if max > 0.0 {
            let floor = max * 1e-9;
            self.illum.mapv_inplace(|v| v.max(floor));
        }
        self.illum_ready = true;
    }

    /// Apply the linearized forward map to explicit perturbation fields,
    /// writing the recorded data. Rebuilds the incident field but leaves
    /// the boundary-buffer state untouched.
    pub fn born_apply(&mut self, dvp: &Array2<f64>, drho: &Array2<f64>) -> SeisResult<()> {
        let shape = (self.grid.nz, self.grid.nx);
        if dvp.dim() != shape || drho.dim() != shape {
            return Err(SeisError::ShapeMismatch {
                expected: format!("{shape:?}"),
                got: format!("dvp {:?}, drho {:?}", dvp.dim(), drho.dim()),
            });
        }
        self.build_incident();
        let strength = self.scattering(dvp, drho);
        self.scatter(&strength);
        Ok(())
    }
}

impl ForwardEngine for KirchhoffEngine {
    fn configure(&mut self, spec: &SimSpec) -> SeisResult<()> {
        if spec.mode == ModelingMode::Born && self.perturbed.is_none() {
            return Err(SeisError::ConfigError(
                "Born modeling requires a perturbed model; call update_model with one".to_string(),
            ));
        }
        self.spec = *spec;
        Ok(())
    }

    fn update_model(
        &mut self,
        model: &MediumModel,
        perturbed: Option<&MediumModel>,
    ) -> SeisResult<()> {
        self.background.assert_same_grid(model)?;
        if let Some(pert) = perturbed {
            self.background.assert_same_grid(pert)?;
            if pert.fields_identical(model) {
                return Err(SeisError::ConfigError(
                    "perturbed model identical to background model; Born linearization degenerate"
                        .to_string(),
                ));
            }
        }
        self.model = model.clone();
        self.perturbed = perturbed.cloned();
        self.buffer = BufferState::NeedsRebuild;
        self.gradient_ready = false;
        Ok(())
    }

    fn set_adjoint_sources(&mut self, sources: &Records) -> SeisResult<()> {
        self.records.assert_same_shape(sources)?;
        self.adjoint_sources = Some(sources.clone());
        Ok(())
    }

    fn simulate(&mut self) -> SeisResult<()> {
        match self.spec.mode {
            ModelingMode::Forward => {
                let dvp = &self.model.vp - &self.background.vp;
                let drho = &self.model.rho - &self.background.rho;
                self.build_incident();
                let strength = self.scattering(&dvp, &drho);
                self.scatter(&strength);
                self.buffer = if self.spec.save_boundary {
                    BufferState::Valid
                } else {
                    BufferState::NeedsRebuild
                };
                if self.spec.want_illumination {
                    self.accumulate_illumination();
                }
            }
            ModelingMode::Born => {
                let pert = self.perturbed.as_ref().ok_or_else(|| {
                    SeisError::ConfigError("Born simulation without a perturbed model".to_string())
                })?;
                let dvp = &pert.vp - &self.model.vp;
                let drho = &pert.rho - &self.model.rho;
                self.build_incident();
                let strength = self.scattering(&dvp, &drho);
                self.scatter(&strength);
            }
            ModelingMode::Adjoint => {
                require_valid_buffer(self.buffer)?;
                let adj = match &self.adjoint_sources {
                    Some(adj) => adj,
                    None => {
                        return Err(SeisError::Sequencing(
                            "adjoint simulation without adjoint sources".to_string(),
                        ))
                    }
                };
                let q = self.image(adj);
                let nx = self.grid.nx;
                for c in 0..self.grid.ncells() {
                    let (iz, ix) = (c / nx, c % nx);
                    self.gvp[[iz, ix]] = self.svp[[iz, ix]] * q[c];
                    self.grho[[iz, ix]] = self.srho[[iz, ix]] * q[c];
                }
                self.gradient_ready = true;
                self.buffer = BufferState::Stale;
            }
        }
        self.nsim += 1;
        Ok(())
    }

    fn recorded(&self) -> &Records {
        &self.records
    }

    fn gradient(&self) -> SeisResult<(&Array2<f64>, &Array2<f64>)> {
        if !self.gradient_ready {
            return Err(SeisError::Sequencing(
                "gradient requested before an adjoint simulation".to_string(),
            ));
        }
        Ok((&self.gvp, &self.grho))
    }

    fn illumination(&self) -> SeisResult<&Array2<f64>> {
        if !self.illum_ready {
            return Err(SeisError::Sequencing(
                "illumination requested before an illuminated forward run".to_string(),
            ));
        }
        Ok(&self.illum)
    }

    fn buffer_state(&self) -> BufferState {
        self.buffer
    }

    fn simulate_count(&self) -> usize {
        self.nsim
    }
}
