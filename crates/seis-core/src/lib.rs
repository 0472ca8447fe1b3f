//! Adjoint-state full-waveform inversion engine.
//!
//! The engine maps between physical media and optimization vectors,
//! schedules forward/Born/adjoint simulations against a `ForwardEngine`,
//! assembles gradients through reparameterization and grid spraying, and
//! drives the bounded quasi-Newton loop plus the alternating
//! source/model joint inversion.

pub mod coupling;
pub mod deconv;
pub mod engine;
pub mod invert;
pub mod kirchhoff;
pub mod misfit;
pub mod objective;
pub mod parameterization;
pub mod session;
pub mod snapshot;
