// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Property-Based Tests (proptest) for seis-math
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for seis-math using proptest.
//!
//! Covers: grid-map transpose identity, convolution adjoint pairs,
//! preconditioner round trips, bounded minimizer behavior.

use ndarray::{Array1, Array2};
use proptest::prelude::*;
use seis_math::conv::{conv_causal, conv_kernel_adjoint, xcorr_causal};
use seis_math::interp::{GridMap, InterpOrder};
use seis_math::lbfgsb::{minimize, MinimizeOptions, Objective};
use seis_math::precond::DiagPrecond;
use seis_types::error::SeisResult;
use seis_types::grid::Grid2D;

fn toy_map(n: usize, order: InterpOrder) -> GridMap {
    let dense = Grid2D::new(n, n, 0.0, 1.0, 0.0, 1.0);
    let coarse = dense.subsample(2, 2);
    GridMap::new(coarse, dense, order).unwrap()
}

// ── GridMap Properties ───────────────────────────────────────────────

proptest! {
    /// <interpolate(c), d> == <c, spray(d)> for arbitrary field seeds:
    /// spray must be the exact transpose of interpolate.
    #[test]
    fn gridmap_transpose_identity(n in 12usize..40, seed in 0u64..1000) {
        for order in [InterpOrder::Linear, InterpOrder::Quadratic] {
            let map = toy_map(n, order);
            let (cnz, cnx) = (map.coarse().nz, map.coarse().nx);
            let (dnz, dnx) = (map.dense().nz, map.dense().nx);
            let c = Array2::from_shape_fn((cnz, cnx), |(i, j)| {
                ((i as u64 * 31 + j as u64 * 17 + seed) as f64).sin()
            });
            let d = Array2::from_shape_fn((dnz, dnx), |(i, j)| {
                ((i as u64 * 13 + j as u64 * 7 + seed) as f64).cos()
            });

            let mut ic = Array2::zeros((dnz, dnx));
            map.interpolate(&c, &mut ic).unwrap();
            let mut sd = Array2::zeros((cnz, cnx));
            map.spray(&d, &mut sd).unwrap();

            let lhs: f64 = ic.iter().zip(d.iter()).map(|(a, b)| a * b).sum();
            let rhs: f64 = c.iter().zip(sd.iter()).map(|(a, b)| a * b).sum();
            let scale = lhs.abs().max(rhs.abs()).max(1.0);
            prop_assert!((lhs - rhs).abs() < 1e-10 * scale,
                "{:?}: <Ic,d>={} vs <c,Sd>={}", order, lhs, rhs);
        }
    }

    /// Constants are preserved by interpolation for both kernel orders.
    #[test]
    fn gridmap_partition_of_unity(n in 12usize..40, val in -50.0f64..50.0) {
        for order in [InterpOrder::Linear, InterpOrder::Quadratic] {
            let map = toy_map(n, order);
            let coarse = Array2::from_elem((map.coarse().nz, map.coarse().nx), val);
            let mut dense = Array2::zeros((map.dense().nz, map.dense().nx));
            map.interpolate(&coarse, &mut dense).unwrap();
            for &v in dense.iter() {
                prop_assert!((v - val).abs() < 1e-10,
                    "constant {} mapped to {}", val, v);
            }
        }
    }
}

// ── Convolution Properties ───────────────────────────────────────────

proptest! {
    /// <conv(s), d> == <s, xcorr(d)> for any causal kernel.
    #[test]
    fn conv_xcorr_adjoint(nt in 8usize..60, nf in 1usize..8, seed in 0u64..1000) {
        let s = Array1::from_iter((0..nt).map(|i| ((i as u64 * 7 + seed) as f64).sin()));
        let d = Array1::from_iter((0..nt).map(|i| ((i as u64 * 11 + seed) as f64).cos()));
        let f = Array1::from_iter((0..nf).map(|i| ((i as u64 * 5 + seed + 1) as f64).sin()));

        let mut cs = Array1::zeros(nt);
        conv_causal(&s, &f, &mut cs);
        let mut xd = Array1::zeros(nt);
        xcorr_causal(&d, &f, &mut xd);

        let lhs: f64 = cs.iter().zip(d.iter()).map(|(a, b)| a * b).sum();
        let rhs: f64 = s.iter().zip(xd.iter()).map(|(a, b)| a * b).sum();
        prop_assert!((lhs - rhs).abs() < 1e-9 * lhs.abs().max(1.0));
    }

    /// The kernel-side adjoint pairs with the forward convolution too.
    #[test]
    fn conv_kernel_side_adjoint(nt in 8usize..60, nf in 1usize..8, seed in 0u64..1000) {
        let s = Array1::from_iter((0..nt).map(|i| ((i as u64 * 3 + seed) as f64).sin()));
        let r = Array1::from_iter((0..nt).map(|i| ((i as u64 * 13 + seed) as f64).cos()));
        let f = Array1::from_iter((0..nf).map(|i| ((i as u64 + seed + 2) as f64).sin()));

        let mut fwd = Array1::zeros(nt);
        conv_causal(&s, &f, &mut fwd);
        let mut gk = Array1::zeros(nf);
        conv_kernel_adjoint(&s, &r, &mut gk);

        let lhs: f64 = fwd.iter().zip(r.iter()).map(|(a, b)| a * b).sum();
        let rhs: f64 = f.iter().zip(gk.iter()).map(|(a, b)| a * b).sum();
        prop_assert!((lhs - rhs).abs() < 1e-9 * lhs.abs().max(1.0));
    }
}

// ── Preconditioner Properties ────────────────────────────────────────

proptest! {
    /// P⁻¹(P(x)) == x for every factor >= 1.
    #[test]
    fn precond_inverse_round_trip(factor in 1.0f64..10.0, seed in 0u64..1000) {
        let map = toy_map(20, InterpOrder::Linear);
        let illum = Array2::from_shape_fn((map.dense().nz, map.dense().nx), |(i, j)| {
            1.0 + ((i * 5 + j * 3) as f64 % 11.0) + (seed % 7) as f64 * 0.1
        });
        let p = DiagPrecond::build(&illum, &map, factor, 2).unwrap();
        let mut x = Array1::from_iter(
            (0..p.len()).map(|i| ((i as u64 * 19 + seed) as f64).sin() * 4.0),
        );
        let x0 = x.clone();
        p.apply(&mut x).unwrap();
        p.apply_inv(&mut x).unwrap();
        for (a, b) in x.iter().zip(x0.iter()) {
            prop_assert!((a - b).abs() < 1e-10, "round trip drift: {} vs {}", a, b);
        }
    }

    /// factor == 1 yields the exact identity.
    #[test]
    fn precond_factor_one_identity(seed in 0u64..1000) {
        let map = toy_map(16, InterpOrder::Linear);
        let illum = Array2::from_elem((map.dense().nz, map.dense().nx), 2.0 + (seed % 5) as f64);
        let p = DiagPrecond::build(&illum, &map, 1.0, 1).unwrap();
        prop_assert!(p.is_identity());
        let mut x = Array1::from_iter((0..p.len()).map(|i| (i as f64) * 0.3 - 2.0));
        let x0 = x.clone();
        p.apply(&mut x).unwrap();
        prop_assert_eq!(x, x0);
    }
}

// ── Minimizer Properties ─────────────────────────────────────────────

struct Paraboloid {
    center: Array1<f64>,
}

impl Objective for Paraboloid {
    fn value(&mut self, x: &Array1<f64>) -> SeisResult<f64> {
        Ok(x.iter()
            .zip(self.center.iter())
            .map(|(x, c)| (x - c) * (x - c))
            .sum())
    }

    fn gradient(&mut self, grad: &mut Array1<f64>, x: &Array1<f64>) -> SeisResult<()> {
        for i in 0..x.len() {
            grad[i] = 2.0 * (x[i] - self.center[i]);
        }
        Ok(())
    }
}

proptest! {
    /// The minimizer lands on the paraboloid center from any start.
    #[test]
    fn minimizer_finds_center(n in 2usize..12, shift in -5.0f64..5.0) {
        let mut obj = Paraboloid {
            center: Array1::from_iter((0..n).map(|i| (i as f64 * 0.31).cos() + shift)),
        };
        let x0 = Array1::zeros(n);
        let res = minimize(&mut obj, &x0, None, &MinimizeOptions::default()).unwrap();
        prop_assert!(res.converged);
        for (x, c) in res.x.iter().zip(obj.center.iter()) {
            prop_assert!((x - c).abs() < 1e-4, "minimizer {} vs center {}", x, c);
        }
    }

    /// Bounds are never violated by any iterate the minimizer returns.
    #[test]
    fn minimizer_respects_bounds(n in 2usize..12, shift in 1.0f64..6.0) {
        let mut obj = Paraboloid {
            center: Array1::from_elem(n, shift + 1.0),
        };
        let x0 = Array1::zeros(n);
        let lo = Array1::from_elem(n, -shift);
        let hi = Array1::from_elem(n, shift);
        let res = minimize(&mut obj, &x0, Some((&lo, &hi)), &MinimizeOptions::default()).unwrap();
        for i in 0..n {
            prop_assert!(res.x[i] >= -shift - 1e-12 && res.x[i] <= shift + 1e-12);
        }
        // Center sits above the box, so the upper bound must be active.
        for i in 0..n {
            prop_assert!((res.x[i] - shift).abs() < 1e-4);
        }
    }
}
