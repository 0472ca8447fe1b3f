//! Mapping between the coarse inversion grid and the dense modeling grid.
//!
//! `interpolate` carries coarse-grid values onto the dense grid;
//! `spray` accumulates dense-grid values back onto the coarse grid.
//! Both directions read one shared per-axis weight table, so spray is the
//! exact matrix transpose of interpolate. The adjoint-state gradient
//! requires this to hold to the last bit.

use ndarray::Array2;
use seis_types::error::{SeisError, SeisResult};
use seis_types::grid::Grid2D;

/// Interpolation kernel order, fixed at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpOrder {
    #[default]
    Linear,
    Quadratic,
}

impl InterpOrder {
    pub fn parse(name: &str) -> SeisResult<Self> {
        match name {
            "linear" => Ok(InterpOrder::Linear),
            "quadratic" => Ok(InterpOrder::Quadratic),
            other => Err(SeisError::ConfigError(format!(
                "unknown interpolation order \"{other}\""
            ))),
        }
    }
}

/// One dense sample's footprint on a coarse axis: (coarse index, weight).
type AxisWeights = Vec<(usize, f64)>;

/// Bidirectional coarse ↔ dense grid map with a precomputed weight table.
#[derive(Debug, Clone)]
pub struct GridMap {
    coarse: Grid2D,
    dense: Grid2D,
    order: InterpOrder,
    wz: Vec<AxisWeights>, // [dense.nz]
    wx: Vec<AxisWeights>, // [dense.nx]
}

fn axis_weights(
    order: InterpOrder,
    n_coarse: usize,
    c0: f64,
    dc: f64,
    coords: &[f64],
) -> Vec<AxisWeights> {
    coords
        .iter()
        .map(|&v| {
            let f = (v - c0) / dc;
            match order {
                InterpOrder::Linear => {
                    let i0 = (f.floor() as isize).clamp(0, n_coarse as isize - 2) as usize;
                    let t = (f - i0 as f64).clamp(0.0, 1.0);
                    vec![(i0, 1.0 - t), (i0 + 1, t)]
                }
                InterpOrder::Quadratic => {
                    let im = (f.round() as isize).clamp(1, n_coarse as isize - 2) as usize;
                    let s = (f - im as f64).clamp(-1.0, 1.0);
                    // Quadratic B-spline weights on the 3-node stencil.
                    vec![
                        (im - 1, 0.5 * (0.5 - s) * (0.5 - s)),
                        (im, 0.75 - s * s),
                        (im + 1, 0.5 * (0.5 + s) * (0.5 + s)),
                    ]
                }
            }
        })
        .collect()
}

impl GridMap {
    pub fn new(coarse: Grid2D, dense: Grid2D, order: InterpOrder) -> SeisResult<Self> {
        let min_nodes = match order {
            InterpOrder::Linear => 2,
            InterpOrder::Quadratic => 3,
        };
        if coarse.nz < min_nodes || coarse.nx < min_nodes {
            return Err(SeisError::ConfigError(format!(
                "inversion grid {}x{} too small for {:?} interpolation",
                coarse.nz, coarse.nx, order
            )));
        }
        let wz = axis_weights(order, coarse.nz, coarse.z[0], coarse.dz, coarse_slice(&dense.z));
        let wx = axis_weights(order, coarse.nx, coarse.x[0], coarse.dx, coarse_slice(&dense.x));
        Ok(GridMap {
            coarse,
            dense,
            order,
            wz,
            wx,
        })
    }

    pub fn coarse(&self) -> &Grid2D {
        &self.coarse
    }

    pub fn dense(&self) -> &Grid2D {
        &self.dense
    }

    pub fn order(&self) -> InterpOrder {
        self.order
    }

    fn check(&self, coarse: &Array2<f64>, dense: &Array2<f64>) -> SeisResult<()> {
        if coarse.dim() != (self.coarse.nz, self.coarse.nx)
            || dense.dim() != (self.dense.nz, self.dense.nx)
        {
            return Err(SeisError::ShapeMismatch {
                expected: format!(
                    "coarse {}x{}, dense {}x{}",
                    self.coarse.nz, self.coarse.nx, self.dense.nz, self.dense.nx
                ),
                got: format!("coarse {:?}, dense {:?}", coarse.dim(), dense.dim()),
            });
        }
        Ok(())
    }

    /// Value mapping coarse → dense.
    pub fn interpolate(&self, coarse: &Array2<f64>, dense: &mut Array2<f64>) -> SeisResult<()> {
        self.check(coarse, dense)?;
        for izd in 0..self.dense.nz {
            for ixd in 0..self.dense.nx {
                let mut acc = 0.0;
                for &(izc, wz) in &self.wz[izd] {
                    for &(ixc, wx) in &self.wx[ixd] {
                        acc += wz * wx * coarse[[izc, ixc]];
                    }
                }
                dense[[izd, ixd]] = acc;
            }
        }
        Ok(())
    }

    /// Accumulation mapping dense → coarse; the transpose of
    /// [`GridMap::interpolate`]. Overwrites `coarse`.
    pub fn spray(&self, dense: &Array2<f64>, coarse: &mut Array2<f64>) -> SeisResult<()> {
        self.check(coarse, dense)?;
        coarse.fill(0.0);
        for izd in 0..self.dense.nz {
            for ixd in 0..self.dense.nx {
                let v = dense[[izd, ixd]];
                for &(izc, wz) in &self.wz[izd] {
                    for &(ixc, wx) in &self.wx[ixd] {
                        coarse[[izc, ixc]] += wz * wx * v;
                    }
                }
            }
        }
        Ok(())
    }
}

fn coarse_slice(a: &ndarray::Array1<f64>) -> &[f64] {
    a.as_slice().expect("axis coordinates are contiguous")
}

/// Bilinear point sample of `field` at `(z, x)`, clamped to the grid.
/// Used to restrict a dense field onto coarse nodes at construction; the
/// adjoint-exact coarse↔dense mapping is [`GridMap`], not this.
pub fn bilinear_sample(field: &Array2<f64>, grid: &Grid2D, z: f64, x: f64) -> f64 {
    let fz = (z - grid.z[0]) / grid.dz;
    let fx = (x - grid.x[0]) / grid.dx;

    let iz0 = (fz.floor() as isize).clamp(0, (grid.nz as isize) - 2) as usize;
    let ix0 = (fx.floor() as isize).clamp(0, (grid.nx as isize) - 2) as usize;

    let tz = (fz - iz0 as f64).clamp(0.0, 1.0);
    let tx = (fx - ix0 as f64).clamp(0.0, 1.0);

    let v00 = field[[iz0, ix0]];
    let v10 = field[[iz0 + 1, ix0]];
    let v01 = field[[iz0, ix0 + 1]];
    let v11 = field[[iz0 + 1, ix0 + 1]];

    (1.0 - tz) * ((1.0 - tx) * v00 + tx * v01) + tz * ((1.0 - tx) * v10 + tx * v11)
}
