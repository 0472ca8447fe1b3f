// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Medium
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Subsurface medium: P-velocity and density fields on a `Grid2D`,
//! stored as absolute values with fixed per-field reference scalars.
//!
//! The dimensionless contrast of a field value `m` against its reference
//! `m0` is `χ(m, m0) = m/m0 − 1`; the inverse is `m = m0·(1 + χ)`. Both
//! directions are lossless, and a model's references never change after
//! construction.

use crate::error::{SeisError, SeisResult};
use crate::grid::Grid2D;
use ndarray::Array2;

/// Dimensionless contrast of `value` relative to `reference`.
#[inline]
pub fn chi(value: f64, reference: f64) -> f64 {
    value / reference - 1.0
}

/// Absolute value recovered from a contrast. Exact inverse of [`chi`].
#[inline]
pub fn chi_inv(contrast: f64, reference: f64) -> f64 {
    reference * (1.0 + contrast)
}

/// Physical admissible range of one medium field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBounds {
    pub min: f64,
    pub max: f64,
}

impl FieldBounds {
    pub fn new(min: f64, max: f64) -> SeisResult<Self> {
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || max <= min {
            return Err(SeisError::ConfigError(format!(
                "field bounds must satisfy 0 < min < max, got ({min}, {max})"
            )));
        }
        Ok(FieldBounds { min, max })
    }
}

/// P-velocity and density on a 2-D grid.
#[derive(Debug, Clone)]
pub struct MediumModel {
    pub grid: Grid2D,
    pub vp: Array2<f64>,
    pub rho: Array2<f64>,
    ref_vp: f64,
    ref_rho: f64,
    pub vp_bounds: FieldBounds,
    pub rho_bounds: FieldBounds,
}

impl MediumModel {
    /// Uniform model at the reference values.
    pub fn uniform(
        grid: Grid2D,
        ref_vp: f64,
        ref_rho: f64,
        vp_bounds: FieldBounds,
        rho_bounds: FieldBounds,
    ) -> SeisResult<Self> {
        let shape = (grid.nz, grid.nx);
        Self::from_fields(
            grid,
            Array2::from_elem(shape, ref_vp),
            Array2::from_elem(shape, ref_rho),
            ref_vp,
            ref_rho,
            vp_bounds,
            rho_bounds,
        )
    }

    pub fn from_fields(
        grid: Grid2D,
        vp: Array2<f64>,
        rho: Array2<f64>,
        ref_vp: f64,
        ref_rho: f64,
        vp_bounds: FieldBounds,
        rho_bounds: FieldBounds,
    ) -> SeisResult<Self> {
        let shape = (grid.nz, grid.nx);
        if vp.dim() != shape || rho.dim() != shape {
            return Err(SeisError::ShapeMismatch {
                expected: format!("{:?}", shape),
                got: format!("vp {:?}, rho {:?}", vp.dim(), rho.dim()),
            });
        }
        if ref_vp <= 0.0 || ref_rho <= 0.0 {
            return Err(SeisError::ConfigError(format!(
                "medium references must be > 0, got vp0={ref_vp}, rho0={ref_rho}"
            )));
        }
        Ok(MediumModel {
            grid,
            vp,
            rho,
            ref_vp,
            ref_rho,
            vp_bounds,
            rho_bounds,
        })
    }

    pub fn ref_vp(&self) -> f64 {
        self.ref_vp
    }

    pub fn ref_rho(&self) -> f64 {
        self.ref_rho
    }

    /// Reference bulk modulus K₀ = ρ₀·vp₀².
    pub fn ref_bulk(&self) -> f64 {
        self.ref_rho * self.ref_vp * self.ref_vp
    }

    /// Bulk modulus field K = ρ·vp².
    pub fn bulk(&self) -> Array2<f64> {
        let mut k = Array2::zeros((self.grid.nz, self.grid.nx));
        for iz in 0..self.grid.nz {
            for ix in 0..self.grid.nx {
                let vp = self.vp[[iz, ix]];
                k[[iz, ix]] = self.rho[[iz, ix]] * vp * vp;
            }
        }
        k
    }

    pub fn chi_vp(&self) -> Array2<f64> {
        self.vp.mapv(|v| chi(v, self.ref_vp))
    }

    pub fn chi_rho(&self) -> Array2<f64> {
        self.rho.mapv(|v| chi(v, self.ref_rho))
    }

    pub fn chi_bulk(&self) -> Array2<f64> {
        let k0 = self.ref_bulk();
        self.bulk().mapv(|v| chi(v, k0))
    }

    pub fn assert_same_grid(&self, other: &MediumModel) -> SeisResult<()> {
        if self.grid != other.grid {
            return Err(SeisError::ShapeMismatch {
                expected: format!("grid {}x{}", self.grid.nz, self.grid.nx),
                got: format!("grid {}x{}", other.grid.nz, other.grid.nx),
            });
        }
        Ok(())
    }

    /// Bitwise equality of both fields. Used for the degenerate-model
    /// configuration checks, so it must not tolerate rounding.
    pub fn fields_identical(&self, other: &MediumModel) -> bool {
        self.grid == other.grid
            && self
                .vp
                .iter()
                .zip(other.vp.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
            && self
                .rho
                .iter()
                .zip(other.rho.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}
