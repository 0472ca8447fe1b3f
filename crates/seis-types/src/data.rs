// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Recorded Data
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Time-series recordings indexed by (shot, receiver) on a fixed time grid.

use crate::error::{SeisError, SeisResult};
use crate::grid::TimeGrid;
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Recordings for every shot: `traces[shot]` has shape `[nt, nrecv]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Records {
    pub tgrid: TimeGrid,
    pub traces: Vec<Array2<f64>>,
}

impl Records {
    pub fn zeroed(tgrid: TimeGrid, receivers_per_shot: &[usize]) -> Self {
        let traces = receivers_per_shot
            .iter()
            .map(|&nr| Array2::zeros((tgrid.nt, nr)))
            .collect();
        Records { tgrid, traces }
    }

    pub fn nshots(&self) -> usize {
        self.traces.len()
    }

    /// Shapes of `self` and `other` must match exactly before any misfit
    /// evaluation: same time grid, same shot count, same channel count per
    /// shot.
    pub fn assert_same_shape(&self, other: &Records) -> SeisResult<()> {
        if self.tgrid != other.tgrid || self.nshots() != other.nshots() {
            return Err(SeisError::ShapeMismatch {
                expected: format!("{} shots, nt={}", self.nshots(), self.tgrid.nt),
                got: format!("{} shots, nt={}", other.nshots(), other.tgrid.nt),
            });
        }
        for (is, (a, b)) in self.traces.iter().zip(other.traces.iter()).enumerate() {
            if a.dim() != b.dim() {
                return Err(SeisError::ShapeMismatch {
                    expected: format!("shot {is}: {:?}", a.dim()),
                    got: format!("shot {is}: {:?}", b.dim()),
                });
            }
        }
        Ok(())
    }

    pub fn fill(&mut self, value: f64) {
        for t in &mut self.traces {
            t.fill(value);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.traces.iter().all(|t| t.iter().all(|&v| v == 0.0))
    }

    pub fn dot(&self, other: &Records) -> f64 {
        self.traces
            .iter()
            .zip(other.traces.iter())
            .map(|(a, b)| a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f64>())
            .sum()
    }

    pub fn norm_sq(&self) -> f64 {
        self.dot(self)
    }

    /// Time-reversed copy; the adjoint-source construction step.
    pub fn reversed(&self) -> Records {
        let nt = self.tgrid.nt;
        let traces = self
            .traces
            .iter()
            .map(|t| {
                let nr = t.ncols();
                let mut rev = Array2::zeros((nt, nr));
                for it in 0..nt {
                    for ir in 0..nr {
                        rev[[it, ir]] = t[[nt - 1 - it, ir]];
                    }
                }
                rev
            })
            .collect();
        Records {
            tgrid: self.tgrid.clone(),
            traces,
        }
    }

    /// Add zero-mean Gaussian noise sized so the amplitude signal-to-noise
    /// ratio is `snr` against the current RMS amplitude.
    pub fn add_noise<R: Rng>(&mut self, snr: f64, rng: &mut R) -> SeisResult<()> {
        if snr <= 0.0 {
            return Err(SeisError::ConfigError(format!(
                "snr must be > 0, got {snr}"
            )));
        }
        let nsamp: usize = self.traces.iter().map(|t| t.len()).sum();
        if nsamp == 0 {
            return Ok(());
        }
        let rms = (self.norm_sq() / nsamp as f64).sqrt();
        let sigma = rms / snr;
        if sigma == 0.0 {
            return Ok(());
        }
        let normal = Normal::new(0.0, sigma)
            .map_err(|e| SeisError::ConfigError(format!("noise distribution: {e}")))?;
        for t in &mut self.traces {
            for v in t.iter_mut() {
                *v += normal.sample(rng);
            }
        }
        Ok(())
    }
}
