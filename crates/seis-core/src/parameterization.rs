// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Parameterization
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Contrast parameterization: medium ↔ optimization vector.
//!
//! A descriptor selects up to three contrast fields in a fixed order; the
//! optimization vector is their concatenation, each flattened row-major
//! (z rows, then x). `Null` selectors are placeholders for "not inverted"
//! and contribute no vector entries.

use ndarray::{Array1, Array2};
use seis_types::error::{SeisError, SeisResult};
use seis_types::medium::{chi, chi_inv, MediumModel};

/// One invertible medium field, expressed as a contrast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumParam {
    /// Bulk-modulus contrast χK, K = ρ·vp².
    Bulk,
    /// P-velocity contrast χvp.
    Velocity,
    /// Density contrast χρ.
    Density,
    /// Placeholder: field not inverted.
    Null,
}

impl MediumParam {
    pub fn parse(name: &str) -> SeisResult<Self> {
        match name {
            "chi_bulk" => Ok(MediumParam::Bulk),
            "chi_vp" => Ok(MediumParam::Velocity),
            "chi_rho" => Ok(MediumParam::Density),
            "null" => Ok(MediumParam::Null),
            other => Err(SeisError::ConfigError(format!(
                "unknown parameter selector \"{other}\""
            ))),
        }
    }
}

/// Ordered tuple of parameter selectors; the optimization-vector layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    selectors: Vec<MediumParam>,
}

impl ParamDescriptor {
    pub fn new(selectors: Vec<MediumParam>) -> SeisResult<Self> {
        if selectors.is_empty() || selectors.len() > 3 {
            return Err(SeisError::ConfigError(format!(
                "parameterization must name 1..=3 selectors, got {}",
                selectors.len()
            )));
        }
        if selectors.iter().all(|&s| s == MediumParam::Null) {
            return Err(SeisError::ConfigError(
                "parameterization with all-null selectors is invalid".to_string(),
            ));
        }
        if selectors.contains(&MediumParam::Bulk) && selectors.contains(&MediumParam::Velocity) {
            return Err(SeisError::ConfigError(
                "chi_bulk and chi_vp parameterize the same degree of freedom".to_string(),
            ));
        }
        for param in [MediumParam::Bulk, MediumParam::Velocity, MediumParam::Density] {
            if selectors.iter().filter(|&&s| s == param).count() > 1 {
                return Err(SeisError::ConfigError(format!(
                    "duplicate selector {param:?} in parameterization"
                )));
            }
        }
        Ok(ParamDescriptor { selectors })
    }

    pub fn from_names(names: &[String]) -> SeisResult<Self> {
        let selectors = names
            .iter()
            .map(|n| MediumParam::parse(n))
            .collect::<SeisResult<Vec<_>>>()?;
        Self::new(selectors)
    }

    /// Non-null selectors in descriptor order.
    pub fn active(&self) -> impl Iterator<Item = MediumParam> + '_ {
        self.selectors
            .iter()
            .copied()
            .filter(|&s| s != MediumParam::Null)
    }

    /// Number of vector channels (non-null selectors).
    pub fn nchannels(&self) -> usize {
        self.active().count()
    }

    fn has_bulk(&self) -> bool {
        self.selectors.contains(&MediumParam::Bulk)
    }
}

fn contrast_field(model: &MediumModel, param: MediumParam) -> Array2<f64> {
    match param {
        MediumParam::Bulk => model.chi_bulk(),
        MediumParam::Velocity => model.chi_vp(),
        MediumParam::Density => model.chi_rho(),
        MediumParam::Null => unreachable!("null selectors carry no field"),
    }
}

/// Extract the selected contrast fields of `model` into one flat vector.
pub fn to_vector(model: &MediumModel, desc: &ParamDescriptor) -> Array1<f64> {
    let ncells = model.grid.ncells();
    let mut x = Array1::zeros(desc.nchannels() * ncells);
    for (ch, param) in desc.active().enumerate() {
        let field = contrast_field(model, param);
        for (i, &v) in field.iter().enumerate() {
            x[ch * ncells + i] = v;
        }
    }
    x
}

/// Inverse of [`to_vector`]: write the vector's contrast channels back
/// into `target`. Fields absent from the descriptor are left unchanged,
/// which is what makes partial inversions (density-only, …) work.
///
/// The density channel is applied before the bulk channel so that a
/// `{chi_bulk, chi_rho}` vector reconstructs vp from the updated density.
pub fn to_model(x: &Array1<f64>, desc: &ParamDescriptor, target: &mut MediumModel) -> SeisResult<()> {
    let ncells = target.grid.ncells();
    let expected = desc.nchannels() * ncells;
    if x.len() != expected {
        return Err(SeisError::ShapeMismatch {
            expected: format!("vector of length {expected}"),
            got: format!("length {}", x.len()),
        });
    }

    let channel_of = |wanted: MediumParam| -> Option<usize> {
        desc.active().enumerate().find(|&(_, p)| p == wanted).map(|(ch, _)| ch)
    };

    if let Some(ch) = channel_of(MediumParam::Density) {
        let rho0 = target.ref_rho();
        for (i, v) in target.rho.iter_mut().enumerate() {
            *v = chi_inv(x[ch * ncells + i], rho0);
        }
    }
    if let Some(ch) = channel_of(MediumParam::Velocity) {
        let vp0 = target.ref_vp();
        for (i, v) in target.vp.iter_mut().enumerate() {
            *v = chi_inv(x[ch * ncells + i], vp0);
        }
    }
    if let Some(ch) = channel_of(MediumParam::Bulk) {
        let k0 = target.ref_bulk();
        let nx = target.grid.nx;
        for i in 0..ncells {
            let k = chi_inv(x[ch * ncells + i], k0);
            let rho = target.rho[[i / nx, i % nx]];
            target.vp[[i / nx, i % nx]] = (k / rho).sqrt();
        }
    }
    Ok(())
}

/// Lower/upper bound vectors for `model` under `desc`.
///
/// Two boundary models are built at the physical field bounds and both are
/// projected through [`to_vector`]; the element-wise min/max of the two
/// projections is taken afterwards because a contrast can change sign
/// across its reference, so neither boundary model is uniformly "lower".
pub fn compute_bounds(
    model: &MediumModel,
    desc: &ParamDescriptor,
) -> SeisResult<(Array1<f64>, Array1<f64>)> {
    let mut at_min = model.clone();
    let mut at_max = model.clone();
    at_min.vp.fill(model.vp_bounds.min);
    at_min.rho.fill(model.rho_bounds.min);
    at_max.vp.fill(model.vp_bounds.max);
    at_max.rho.fill(model.rho_bounds.max);

    let b1 = to_vector(&at_min, desc);
    let b2 = to_vector(&at_max, desc);
    let lower = Array1::from_shape_fn(b1.len(), |i| b1[i].min(b2[i]));
    let upper = Array1::from_shape_fn(b1.len(), |i| b1[i].max(b2[i]));
    Ok((lower, upper))
}

/// Linearized reparameterization at the current `model`: per-channel
/// contrast perturbation fields → (δvp, δρ) physical perturbations.
///
/// With the bulk selector active, vp = √(K/ρ) couples both channels:
///   δvp = K₀/(2ρvp)·δχK − vpρ₀/(2ρ)·δχρ,  δρ = ρ₀·δχρ.
/// Without it the map is diagonal: δvp = vp₀·δχv, δρ = ρ₀·δχρ.
pub fn chain_forward(
    desc: &ParamDescriptor,
    model: &MediumModel,
    chi_pert: &[Array2<f64>],
    dvp: &mut Array2<f64>,
    drho: &mut Array2<f64>,
) -> SeisResult<()> {
    if chi_pert.len() != desc.nchannels() {
        return Err(SeisError::ShapeMismatch {
            expected: format!("{} perturbation channels", desc.nchannels()),
            got: format!("{}", chi_pert.len()),
        });
    }
    dvp.fill(0.0);
    drho.fill(0.0);
    let (vp0, rho0, k0) = (model.ref_vp(), model.ref_rho(), model.ref_bulk());
    let coupled = desc.has_bulk();
    for (ch, param) in desc.active().enumerate() {
        let pert = &chi_pert[ch];
        match param {
            MediumParam::Bulk => {
                for iz in 0..model.grid.nz {
                    for ix in 0..model.grid.nx {
                        let vp = model.vp[[iz, ix]];
                        let rho = model.rho[[iz, ix]];
                        dvp[[iz, ix]] += k0 / (2.0 * rho * vp) * pert[[iz, ix]];
                    }
                }
            }
            MediumParam::Velocity => {
                for (d, &p) in dvp.iter_mut().zip(pert.iter()) {
                    *d += vp0 * p;
                }
            }
            MediumParam::Density => {
                for (d, &p) in drho.iter_mut().zip(pert.iter()) {
                    *d += rho0 * p;
                }
                if coupled {
                    for iz in 0..model.grid.nz {
                        for ix in 0..model.grid.nx {
                            let vp = model.vp[[iz, ix]];
                            let rho = model.rho[[iz, ix]];
                            dvp[[iz, ix]] -= vp * rho0 / (2.0 * rho) * pert[[iz, ix]];
                        }
                    }
                }
            }
            MediumParam::Null => unreachable!(),
        }
    }
    Ok(())
}

/// Exact adjoint of [`chain_forward`]: (gvp, gρ) physical-sensitivity
/// fields → per-channel contrast gradients. Coefficients mirror the
/// forward map term for term.
pub fn chain_adjoint(
    desc: &ParamDescriptor,
    model: &MediumModel,
    gvp: &Array2<f64>,
    grho: &Array2<f64>,
    out: &mut [Array2<f64>],
) -> SeisResult<()> {
    if out.len() != desc.nchannels() {
        return Err(SeisError::ShapeMismatch {
            expected: format!("{} gradient channels", desc.nchannels()),
            got: format!("{}", out.len()),
        });
    }
    let (vp0, rho0, k0) = (model.ref_vp(), model.ref_rho(), model.ref_bulk());
    let coupled = desc.has_bulk();
    for (ch, param) in desc.active().enumerate() {
        let g = &mut out[ch];
        match param {
            MediumParam::Bulk => {
                for iz in 0..model.grid.nz {
                    for ix in 0..model.grid.nx {
                        let vp = model.vp[[iz, ix]];
                        let rho = model.rho[[iz, ix]];
                        g[[iz, ix]] = k0 / (2.0 * rho * vp) * gvp[[iz, ix]];
                    }
                }
            }
            MediumParam::Velocity => {
                for (g, &v) in g.iter_mut().zip(gvp.iter()) {
                    *g = vp0 * v;
                }
            }
            MediumParam::Density => {
                for (g, &v) in g.iter_mut().zip(grho.iter()) {
                    *g = rho0 * v;
                }
                if coupled {
                    for iz in 0..model.grid.nz {
                        for ix in 0..model.grid.nx {
                            let vp = model.vp[[iz, ix]];
                            let rho = model.rho[[iz, ix]];
                            g[[iz, ix]] -= vp * rho0 / (2.0 * rho) * gvp[[iz, ix]];
                        }
                    }
                }
            }
            MediumParam::Null => unreachable!(),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seis_types::grid::Grid2D;
    use seis_types::medium::FieldBounds;

    fn toy_model() -> MediumModel {
        let grid = Grid2D::new(9, 7, 0.0, 1.0, 0.0, 1.0);
        let mut m = MediumModel::uniform(
            grid,
            2000.0,
            1800.0,
            FieldBounds::new(1500.0, 3000.0).unwrap(),
            FieldBounds::new(1200.0, 2500.0).unwrap(),
        )
        .unwrap();
        for iz in 0..9 {
            for ix in 0..7 {
                m.vp[[iz, ix]] = 2000.0 + 30.0 * iz as f64 - 11.0 * ix as f64;
                m.rho[[iz, ix]] = 1800.0 + 17.0 * ix as f64 + 5.0 * iz as f64;
            }
        }
        m
    }

    fn descriptors() -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new(vec![MediumParam::Bulk, MediumParam::Density]).unwrap(),
            ParamDescriptor::new(vec![MediumParam::Bulk, MediumParam::Null]).unwrap(),
            ParamDescriptor::new(vec![MediumParam::Velocity, MediumParam::Density]).unwrap(),
            ParamDescriptor::new(vec![MediumParam::Velocity, MediumParam::Null]).unwrap(),
        ]
    }

    #[test]
    fn test_all_null_rejected() {
        let err = ParamDescriptor::new(vec![MediumParam::Null, MediumParam::Null]);
        assert!(err.is_err());
    }

    #[test]
    fn test_bulk_and_velocity_conflict() {
        assert!(ParamDescriptor::new(vec![MediumParam::Bulk, MediumParam::Velocity]).is_err());
    }

    #[test]
    fn test_vector_length() {
        let m = toy_model();
        for desc in descriptors() {
            let x = to_vector(&m, &desc);
            assert_eq!(x.len(), desc.nchannels() * m.grid.ncells());
        }
    }

    #[test]
    fn test_round_trip_all_descriptors() {
        let m = toy_model();
        for desc in descriptors() {
            let x = to_vector(&m, &desc);
            let mut back = m.clone();
            // Start the target from a different state to prove the vector
            // fully determines the selected fields.
            back.vp.fill(2100.0);
            if desc.active().any(|p| p == MediumParam::Density) {
                back.rho.fill(1700.0);
            }
            to_model(&x, &desc, &mut back).unwrap();
            for (a, b) in back.vp.iter().zip(m.vp.iter()) {
                assert!((a - b).abs() < 1e-9, "{desc:?}: vp {a} vs {b}");
            }
            for (a, b) in back.rho.iter().zip(m.rho.iter()) {
                assert!((a - b).abs() < 1e-9, "{desc:?}: rho {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_partial_inversion_leaves_other_fields() {
        let m = toy_model();
        let desc = ParamDescriptor::new(vec![MediumParam::Null, MediumParam::Density]).unwrap();
        let x = to_vector(&m, &desc);
        let mut target = m.clone();
        target.vp.fill(2222.0);
        to_model(&x, &desc, &mut target).unwrap();
        assert!(target.vp.iter().all(|&v| (v - 2222.0).abs() < 1e-12));
        for (a, b) in target.rho.iter().zip(m.rho.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bounds_ordered_elementwise() {
        let m = toy_model();
        for desc in descriptors() {
            let (lo, hi) = compute_bounds(&m, &desc).unwrap();
            assert_eq!(lo.len(), hi.len());
            for i in 0..lo.len() {
                assert!(lo[i] <= hi[i], "{desc:?}: bounds unordered at {i}");
            }
            // Contrasts straddle the reference, so the box must contain 0.
            for i in 0..lo.len() {
                assert!(lo[i] < 0.0 && hi[i] > 0.0);
            }
        }
    }

    #[test]
    fn test_chain_adjoint_is_exact_adjoint() {
        let m = toy_model();
        let shape = (m.grid.nz, m.grid.nx);
        for desc in descriptors() {
            let nch = desc.nchannels();
            let pert: Vec<Array2<f64>> = (0..nch)
                .map(|c| {
                    Array2::from_shape_fn(shape, |(i, j)| ((i * 5 + j * 3 + c * 11) as f64).sin())
                })
                .collect();
            let gvp = Array2::from_shape_fn(shape, |(i, j)| ((i * 7 + j) as f64).cos());
            let grho = Array2::from_shape_fn(shape, |(i, j)| ((i + j * 13) as f64).sin());

            let mut dvp = Array2::zeros(shape);
            let mut drho = Array2::zeros(shape);
            chain_forward(&desc, &m, &pert, &mut dvp, &mut drho).unwrap();

            let mut out: Vec<Array2<f64>> = (0..nch).map(|_| Array2::zeros(shape)).collect();
            chain_adjoint(&desc, &m, &gvp, &grho, &mut out).unwrap();

            let lhs: f64 = dvp.iter().zip(gvp.iter()).map(|(a, b)| a * b).sum::<f64>()
                + drho.iter().zip(grho.iter()).map(|(a, b)| a * b).sum::<f64>();
            let rhs: f64 = pert
                .iter()
                .zip(out.iter())
                .map(|(p, g)| p.iter().zip(g.iter()).map(|(a, b)| a * b).sum::<f64>())
                .sum();
            assert!(
                (lhs - rhs).abs() < 1e-9 * lhs.abs().max(1.0),
                "{desc:?}: <Jx, g> = {lhs} but <x, J*g> = {rhs}"
            );
        }
    }
}
