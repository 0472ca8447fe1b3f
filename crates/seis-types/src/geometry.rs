// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Acquisition Geometry
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{SeisError, SeisResult};
use crate::grid::Grid2D;
use serde::{Deserialize, Serialize};

/// A point in the (Z, X) plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub z: f64,
    pub x: f64,
}

/// One shot: a source group and the receivers recording it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotGeometry {
    pub sources: Vec<Position>,
    pub receivers: Vec<Position>,
}

/// Source and receiver coordinate sets for every shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionGeometry {
    pub shots: Vec<ShotGeometry>,
}

impl AcquisitionGeometry {
    pub fn new(shots: Vec<ShotGeometry>) -> SeisResult<Self> {
        if shots.is_empty() {
            return Err(SeisError::ConfigError(
                "acquisition must contain at least one shot".to_string(),
            ));
        }
        for (is, shot) in shots.iter().enumerate() {
            if shot.sources.is_empty() || shot.receivers.is_empty() {
                return Err(SeisError::ConfigError(format!(
                    "shot {is} must have at least one source and one receiver"
                )));
            }
        }
        Ok(AcquisitionGeometry { shots })
    }

    /// A surface line of `nshot` single-source shots, each recorded by the
    /// same `nrecv` receivers spread across the top of the grid.
    pub fn surface_line(grid: &Grid2D, nshot: usize, nrecv: usize, depth: f64) -> SeisResult<Self> {
        if nshot == 0 || nrecv == 0 {
            return Err(SeisError::ConfigError(
                "surface line requires nshot >= 1 and nrecv >= 1".to_string(),
            ));
        }
        let x0 = grid.x[0];
        let x1 = grid.x[grid.nx - 1];
        let span = x1 - x0;
        let receivers: Vec<Position> = (0..nrecv)
            .map(|ir| Position {
                z: depth,
                x: x0 + span * (ir as f64 + 0.5) / nrecv as f64,
            })
            .collect();
        let shots = (0..nshot)
            .map(|is| ShotGeometry {
                sources: vec![Position {
                    z: depth,
                    x: x0 + span * (is as f64 + 0.5) / nshot as f64,
                }],
                receivers: receivers.clone(),
            })
            .collect();
        AcquisitionGeometry::new(shots)
    }

    pub fn nshots(&self) -> usize {
        self.shots.len()
    }

    /// Geometry for adjoint propagation: per shot, the receiver positions
    /// become the source positions. The source-group count is preserved;
    /// the adjoint of shot `i` still belongs to shot `i`.
    pub fn adjoint(&self) -> AcquisitionGeometry {
        AcquisitionGeometry {
            shots: self
                .shots
                .iter()
                .map(|shot| ShotGeometry {
                    sources: shot.receivers.clone(),
                    receivers: shot.sources.clone(),
                })
                .collect(),
        }
    }

    /// Fail fast when any coordinate falls outside the modeling grid.
    pub fn check_within(&self, grid: &Grid2D) -> SeisResult<()> {
        let inside = |p: &Position| {
            p.z >= grid.z[0]
                && p.z <= grid.z[grid.nz - 1]
                && p.x >= grid.x[0]
                && p.x <= grid.x[grid.nx - 1]
        };
        for (is, shot) in self.shots.iter().enumerate() {
            if let Some(p) = shot.sources.iter().chain(shot.receivers.iter()).find(|p| !inside(p)) {
                return Err(SeisError::ConfigError(format!(
                    "shot {is}: position (z={}, x={}) outside modeling grid",
                    p.z, p.x
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjoint_swaps_and_preserves_shot_count() {
        let grid = Grid2D::new(21, 21, 0.0, 2.0, 0.0, 2.0);
        let geom = AcquisitionGeometry::surface_line(&grid, 3, 7, 0.1).unwrap();
        let adj = geom.adjoint();
        assert_eq!(adj.nshots(), geom.nshots());
        for (f, a) in geom.shots.iter().zip(adj.shots.iter()) {
            assert_eq!(a.sources, f.receivers);
            assert_eq!(a.receivers, f.sources);
        }
    }

    #[test]
    fn test_empty_shot_rejected() {
        let err = AcquisitionGeometry::new(vec![ShotGeometry {
            sources: vec![],
            receivers: vec![Position { z: 0.0, x: 0.0 }],
        }]);
        assert!(err.is_err());
    }

    #[test]
    fn test_check_within_detects_outside() {
        let grid = Grid2D::new(11, 11, 0.0, 1.0, 0.0, 1.0);
        let geom = AcquisitionGeometry::new(vec![ShotGeometry {
            sources: vec![Position { z: 0.5, x: 1.5 }],
            receivers: vec![Position { z: 0.5, x: 0.5 }],
        }])
        .unwrap();
        assert!(geom.check_within(&grid).is_err());
    }
}
