//! Least-squares data misfit.
//!
//! `functional_and_gradient` returns the scalar misfit together with the
//! residual field; the residual feeds the adjoint-source construction.

use seis_types::data::Records;
use seis_types::error::SeisResult;

/// `f = ½‖calc − obs‖²`; writes `residual = calc − obs`.
pub fn functional_and_gradient(
    calculated: &Records,
    observed: &Records,
    residual: &mut Records,
) -> SeisResult<f64> {
    calculated.assert_same_shape(observed)?;
    calculated.assert_same_shape(residual)?;
    let mut f = 0.0;
    for (is, res) in residual.traces.iter_mut().enumerate() {
        let calc = &calculated.traces[is];
        let obs = &observed.traces[is];
        for ((r, &c), &o) in res.iter_mut().zip(calc.iter()).zip(obs.iter()) {
            let d = c - o;
            *r = d;
            f += d * d;
        }
    }
    Ok(0.5 * f)
}
