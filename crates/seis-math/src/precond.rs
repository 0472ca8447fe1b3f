//! Diagonal illumination preconditioner on the optimization vector.
//!
//! Built once at session construction from the simulation's illumination
//! field; `factor == 1` leaves preconditioning off. Because the matrix is
//! diagonal and symmetric, the gradient side uses the plain inverse rather
//! than a separate transpose.

use crate::interp::GridMap;
use ndarray::{Array1, Array2};
use seis_types::error::{SeisError, SeisResult};

#[derive(Debug, Clone)]
pub struct DiagPrecond {
    diag: Array1<f64>,
    identity: bool,
}

impl DiagPrecond {
    /// Identity preconditioner of the given optimization-vector length.
    pub fn identity(len: usize) -> Self {
        DiagPrecond {
            diag: Array1::ones(len),
            identity: true,
        }
    }

    /// Build from a dense-grid illumination field: spray to the inversion
    /// grid, normalize to [0, 1], and form `1 + (factor−1)·ill_norm`,
    /// replicated once per active parameter channel.
    pub fn build(
        illumination: &Array2<f64>,
        map: &GridMap,
        factor: f64,
        nchannels: usize,
    ) -> SeisResult<Self> {
        if !factor.is_finite() || factor < 1.0 {
            return Err(SeisError::ConfigError(format!(
                "precondition factor must be finite and >= 1, got {factor}"
            )));
        }
        if illumination.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
            return Err(SeisError::ConfigError(
                "illumination field must be strictly positive and finite".to_string(),
            ));
        }
        let ncoarse = map.coarse().ncells();
        if factor == 1.0 {
            return Ok(Self::identity(ncoarse * nchannels));
        }

        let mut coarse = Array2::zeros((map.coarse().nz, map.coarse().nx));
        map.spray(illumination, &mut coarse)?;

        let min = coarse.iter().cloned().fold(f64::INFINITY, f64::min);
        coarse.mapv_inplace(|v| v - min);
        let max = coarse.iter().cloned().fold(0.0_f64, f64::max);
        if max > 0.0 {
            coarse.mapv_inplace(|v| v / max);
        }

        let mut diag = Array1::zeros(ncoarse * nchannels);
        for ch in 0..nchannels {
            for (i, &v) in coarse.iter().enumerate() {
                diag[ch * ncoarse + i] = 1.0 + (factor - 1.0) * v;
            }
        }
        Ok(DiagPrecond {
            diag,
            identity: false,
        })
    }

    pub fn len(&self) -> usize {
        self.diag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diag.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    fn check(&self, x: &Array1<f64>) -> SeisResult<()> {
        if x.len() != self.diag.len() {
            return Err(SeisError::ShapeMismatch {
                expected: format!("vector of length {}", self.diag.len()),
                got: format!("length {}", x.len()),
            });
        }
        Ok(())
    }

    /// `P·x`, applied when converting model → vector.
    pub fn apply(&self, x: &mut Array1<f64>) -> SeisResult<()> {
        self.check(x)?;
        if self.identity {
            return Ok(());
        }
        for (v, &d) in x.iter_mut().zip(self.diag.iter()) {
            *v *= d;
        }
        Ok(())
    }

    /// `P⁻¹·x`, applied when converting vector → model and on the gradient.
    pub fn apply_inv(&self, x: &mut Array1<f64>) -> SeisResult<()> {
        self.check(x)?;
        if self.identity {
            return Ok(());
        }
        for (v, &d) in x.iter_mut().zip(self.diag.iter()) {
            *v /= d;
        }
        Ok(())
    }
}
