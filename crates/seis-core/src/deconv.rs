// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Deconvolution Session
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! 1-D deconvolution session: per-receiver Green's functions convolved
//! with a shared source wavelet.
//!
//! The recorded trace at receiver `r` is `d_r = g_r ⊛ w`. Either side of
//! the convolution can be the optimization target while the other stays
//! fixed, so the same session alternates between Green's-function and
//! wavelet estimation, the blind-deconvolution counterpart of the
//! source/model joint inversion.

use ndarray::{Array1, Array2};
use seis_math::conv::{conv_causal, conv_kernel_adjoint, xcorr_causal};
use seis_math::lbfgsb::{minimize, MinimizeOptions, MinimizeResult, Objective};
use seis_types::error::{SeisError, SeisResult};
use seis_types::grid::TimeGrid;

/// Which factor of the convolution is being optimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeconvTarget {
    /// The per-receiver Green's functions, `ntgf × nr` unknowns.
    GreensFunctions,
    /// The shared source wavelet, `nt` unknowns.
    Wavelet,
}

pub struct DeconvSession {
    pub tgrid: TimeGrid,
    pub ntgf: usize,
    pub nr: usize,
    /// Green's functions, `[ntgf, nr]`.
    pub gf: Array2<f64>,
    /// Source wavelet, `[nt]`.
    pub wavelet: Array1<f64>,
    /// Observed records, `[nt, nr]`.
    pub observed: Array2<f64>,
    /// Calculated records, `[nt, nr]`.
    pub calculated: Array2<f64>,
    col: Array1<f64>,
}

impl DeconvSession {
    pub fn new(
        tgrid: TimeGrid,
        ntgf: usize,
        nr: usize,
        observed: Array2<f64>,
    ) -> SeisResult<Self> {
        if ntgf == 0 || ntgf > tgrid.nt {
            return Err(SeisError::ConfigError(format!(
                "Green's-function length must be in 1..={}, got {ntgf}",
                tgrid.nt
            )));
        }
        if observed.dim() != (tgrid.nt, nr) {
            return Err(SeisError::ShapeMismatch {
                expected: format!("observed [{}, {nr}]", tgrid.nt),
                got: format!("{:?}", observed.dim()),
            });
        }
        let nt = tgrid.nt;
        Ok(DeconvSession {
            ntgf,
            nr,
            gf: Array2::zeros((ntgf, nr)),
            wavelet: Array1::zeros(nt),
            observed,
            calculated: Array2::zeros((nt, nr)),
            col: Array1::zeros(nt),
            tgrid,
        })
    }

    pub fn nvector(&self, target: DeconvTarget) -> usize {
        match target {
            DeconvTarget::GreensFunctions => self.ntgf * self.nr,
            DeconvTarget::Wavelet => self.tgrid.nt,
        }
    }

    fn unpack(&mut self, target: DeconvTarget, x: &Array1<f64>) -> SeisResult<()> {
        if x.len() != self.nvector(target) {
            return Err(SeisError::ShapeMismatch {
                expected: format!("vector of length {}", self.nvector(target)),
                got: format!("length {}", x.len()),
            });
        }
        match target {
            DeconvTarget::GreensFunctions => {
                for ir in 0..self.nr {
                    for k in 0..self.ntgf {
                        self.gf[[k, ir]] = x[ir * self.ntgf + k];
                    }
                }
            }
            DeconvTarget::Wavelet => {
                for it in 0..self.tgrid.nt {
                    self.wavelet[it] = x[it];
                }
            }
        }
        Ok(())
    }

    /// Forward map of the chosen target; writes the calculated records.
    pub fn forward(&mut self, target: DeconvTarget, x: &Array1<f64>) -> SeisResult<()> {
        self.unpack(target, x)?;
        let nt = self.tgrid.nt;
        for ir in 0..self.nr {
            let kernel = Array1::from_iter((0..self.ntgf).map(|k| self.gf[[k, ir]]));
            conv_causal(&self.wavelet, &kernel, &mut self.col);
            for it in 0..nt {
                self.calculated[[it, ir]] = self.col[it];
            }
        }
        Ok(())
    }

    /// Exact adjoint of [`DeconvSession::forward`] in the chosen target:
    /// data-space records → target-space vector.
    pub fn adjoint(&mut self, target: DeconvTarget, data: &Array2<f64>) -> SeisResult<Array1<f64>> {
        let nt = self.tgrid.nt;
        if data.dim() != (nt, self.nr) {
            return Err(SeisError::ShapeMismatch {
                expected: format!("data [{nt}, {}]", self.nr),
                got: format!("{:?}", data.dim()),
            });
        }
        let mut out = Array1::zeros(self.nvector(target));
        match target {
            DeconvTarget::GreensFunctions => {
                let mut gk = Array1::zeros(self.ntgf);
                for ir in 0..self.nr {
                    let d = data.column(ir).to_owned();
                    conv_kernel_adjoint(&self.wavelet, &d, &mut gk);
                    for k in 0..self.ntgf {
                        out[ir * self.ntgf + k] = gk[k];
                    }
                }
            }
            DeconvTarget::Wavelet => {
                for ir in 0..self.nr {
                    let kernel = Array1::from_iter((0..self.ntgf).map(|k| self.gf[[k, ir]]));
                    let d = data.column(ir).to_owned();
                    xcorr_causal(&d, &kernel, &mut self.col);
                    for it in 0..nt {
                        out[it] += self.col[it];
                    }
                }
            }
        }
        Ok(out)
    }

    /// Least-squares misfit of the current calculated records, with the
    /// residual written into `residual`.
    fn misfit(&self, residual: &mut Array2<f64>) -> f64 {
        let mut f = 0.0;
        for ((r, &c), &o) in residual
            .iter_mut()
            .zip(self.calculated.iter())
            .zip(self.observed.iter())
        {
            let d = c - o;
            *r = d;
            f += d * d;
        }
        0.5 * f
    }

    /// Estimate one target by unconstrained minimization, holding the
    /// other fixed. Returns the optimizer result; the estimate is left
    /// in the session.
    pub fn estimate(
        &mut self,
        target: DeconvTarget,
        x0: &Array1<f64>,
        opts: &MinimizeOptions,
    ) -> SeisResult<MinimizeResult> {
        let dim = self.observed.dim();
        let mut objective = DeconvObjective {
            session: &mut *self,
            target,
            residual: Array2::zeros(dim),
        };
        let result = minimize(&mut objective, x0, None, opts)?;
        self.unpack(target, &result.x)?;
        Ok(result)
    }
}

struct DeconvObjective<'a> {
    session: &'a mut DeconvSession,
    target: DeconvTarget,
    residual: Array2<f64>,
}

impl<'a> Objective for DeconvObjective<'a> {
    fn value(&mut self, x: &Array1<f64>) -> SeisResult<f64> {
        self.session.forward(self.target, x)?;
        Ok(self.session.misfit(&mut self.residual))
    }

    fn gradient(&mut self, grad: &mut Array1<f64>, x: &Array1<f64>) -> SeisResult<()> {
        self.session.forward(self.target, x)?;
        self.session.misfit(&mut self.residual);
        let g = self.session.adjoint(self.target, &self.residual)?;
        grad.assign(&g);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_session() -> DeconvSession {
        let tgrid = TimeGrid::new(25, 0.004, 0.0);
        let observed = Array2::from_shape_fn((25, 10), |(it, ir)| {
            ((it * 3 + ir * 7) as f64).sin() * 0.5
        });
        let mut s = DeconvSession::new(tgrid, 5, 10, observed).unwrap();
        for k in 0..5 {
            for ir in 0..10 {
                s.gf[[k, ir]] = ((k * 11 + ir * 3 + 1) as f64).sin();
            }
        }
        for it in 0..25 {
            s.wavelet[it] = ((it * 5 + 2) as f64).cos();
        }
        s
    }

    #[test]
    fn test_forward_is_convolution() {
        let mut s = filled_session();
        // Delta Green's function at lag 2 on receiver 0 shifts the wavelet.
        s.gf.fill(0.0);
        s.gf[[2, 0]] = 1.0;
        let x = Array1::from_iter((0..50).map(|i| {
            let (ir, k) = (i / 5, i % 5);
            s.gf[[k, ir]]
        }));
        s.forward(DeconvTarget::GreensFunctions, &x).unwrap();
        for it in 2..25 {
            assert!((s.calculated[[it, 0]] - s.wavelet[it - 2]).abs() < 1e-12);
        }
        assert!(s.calculated.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_adjoint_consistency_both_targets() {
        let mut s = filled_session();
        for target in [DeconvTarget::GreensFunctions, DeconvTarget::Wavelet] {
            let n = s.nvector(target);
            let x = Array1::from_iter((0..n).map(|i| ((i * 7 + 3) as f64).sin()));
            s.forward(target, &x).unwrap();
            let fwd = s.calculated.clone();
            let d = Array2::from_shape_fn((25, 10), |(it, ir)| {
                ((it * 13 + ir * 5 + 1) as f64).cos()
            });
            let adj = s.adjoint(target, &d).unwrap();

            let lhs: f64 = fwd.iter().zip(d.iter()).map(|(a, b)| a * b).sum();
            let rhs: f64 = x.iter().zip(adj.iter()).map(|(a, b)| a * b).sum();
            assert!(
                (lhs - rhs).abs() < 1e-10 * lhs.abs().max(1.0),
                "{target:?}: <Fwd x, d> = {lhs} but <x, Adj d> = {rhs}"
            );
        }
    }

    #[test]
    fn test_estimate_wavelet_recovers_truth() {
        let tgrid = TimeGrid::new(25, 0.004, 0.0);
        let mut truth = DeconvSession::new(tgrid.clone(), 5, 10, Array2::zeros((25, 10))).unwrap();
        for k in 0..5 {
            for ir in 0..10 {
                truth.gf[[k, ir]] = ((k * 7 + ir + 1) as f64).sin();
            }
        }
        let true_wavelet = Array1::from_iter((0..25).map(|it| ((it * 3 + 1) as f64).sin()));
        truth
            .forward(DeconvTarget::Wavelet, &true_wavelet)
            .unwrap();
        let observed = truth.calculated.clone();

        let mut s = DeconvSession::new(tgrid, 5, 10, observed).unwrap();
        s.gf.assign(&truth.gf);
        let x0 = Array1::zeros(25);
        let opts = MinimizeOptions {
            iterations: 200,
            g_tol: 1e-12,
            f_tol: 0.0,
            ..Default::default()
        };
        let result = s.estimate(DeconvTarget::Wavelet, &x0, &opts).unwrap();
        assert!(
            result.fmin < 1e-10,
            "wavelet estimation must fit exactly, got {}",
            result.fmin
        );
    }

    #[test]
    fn test_rejects_oversized_greens_function() {
        let tgrid = TimeGrid::new(10, 0.004, 0.0);
        assert!(DeconvSession::new(tgrid, 11, 4, Array2::zeros((10, 4))).is_err());
    }
}
