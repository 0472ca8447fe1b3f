// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Grids
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 2D computational grid, depth-major: axis 0 = Z (rows), axis 1 = X (cols).
/// All model fields in this workspace are `Array2<f64>` of shape `[nz, nx]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2D {
    pub nz: usize,
    pub nx: usize,
    pub z: Array1<f64>, // Z coordinates [nz] - linspace(z_min, z_max, nz)
    pub x: Array1<f64>, // X coordinates [nx] - linspace(x_min, x_max, nx)
    pub dz: f64,
    pub dx: f64,
}

impl Grid2D {
    pub fn new(nz: usize, nx: usize, z_min: f64, z_max: f64, x_min: f64, x_max: f64) -> Self {
        let z = Array1::linspace(z_min, z_max, nz);
        let x = Array1::linspace(x_min, x_max, nx);
        let dz = if nz > 1 { z[1] - z[0] } else { z_max - z_min };
        let dx = if nx > 1 { x[1] - x[0] } else { x_max - x_min };
        Grid2D { nz, nx, z, x, dz, dx }
    }

    /// Total cell count; the per-field length of a flattened model vector.
    pub fn ncells(&self) -> usize {
        self.nz * self.nx
    }

    /// Coarse inversion grid inset from this grid's boundary by `margin`
    /// cells on every side, with `step` dense cells per coarse interval.
    /// The inset keeps boundary-contaminated gradient samples out of the
    /// optimization vector.
    pub fn subsample(&self, margin: usize, step: usize) -> Grid2D {
        let step = step.max(1);
        let z0 = self.z[0] + margin as f64 * self.dz;
        let z1 = self.z[self.nz - 1] - margin as f64 * self.dz;
        let x0 = self.x[0] + margin as f64 * self.dx;
        let x1 = self.x[self.nx - 1] - margin as f64 * self.dx;
        let nz = (self.nz - 2 * margin + step - 1) / step;
        let nx = (self.nx - 2 * margin + step - 1) / step;
        Grid2D::new(nz.max(2), nx.max(2), z0, z1, x0, x1)
    }
}

/// Uniform time grid shared by source wavelets and recorded data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub nt: usize,
    pub dt: f64,
    pub t0: f64,
}

impl TimeGrid {
    pub fn new(nt: usize, dt: f64, t0: f64) -> Self {
        TimeGrid { nt, dt, t0 }
    }

    pub fn times(&self) -> Array1<f64> {
        Array1::from_iter((0..self.nt).map(|it| self.t0 + it as f64 * self.dt))
    }

    /// Ricker wavelet of peak frequency `fpeak`, delayed so the peak sits
    /// at `tpeak` seconds after `t0`.
    pub fn ricker(&self, fpeak: f64, tpeak: f64) -> Array1<f64> {
        let mut w = Array1::zeros(self.nt);
        for it in 0..self.nt {
            let t = it as f64 * self.dt - tpeak;
            let arg = (PI * fpeak * t).powi(2);
            w[it] = (1.0 - 2.0 * arg) * (-arg).exp();
        }
        w
    }
}
