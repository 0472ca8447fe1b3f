// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Forward Engine Contract
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! The contract between the inversion engine and the wave propagator.
//!
//! The propagator itself is an external collaborator: anything that can
//! configure wavefields, run a shot, and hand back recorded data, a
//! gradient field and illumination satisfies [`ForwardEngine`]. The
//! inversion core only schedules calls against this trait.

use ndarray::Array2;
use seis_types::data::Records;
use seis_types::error::{SeisError, SeisResult};
use seis_types::medium::MediumModel;

/// Sealed simulation modes. Selected once per call via [`SimSpec`];
/// branch points dispatch on this enum instead of string attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelingMode {
    /// One active wavefield: inject the wavelet, record data. No
    /// backpropagation buffer unless requested, no gradient.
    Forward,
    /// Two coupled wavefields: sourced background field plus an
    /// unsourced scattered field recording scattered energy only.
    Born,
    /// Two active wavefields: the forward field replayed from the stored
    /// boundary buffer, and a residual-sourced back-propagated field.
    /// Produces a gradient field; consumes the boundary buffer.
    Adjoint,
}

impl ModelingMode {
    pub fn active_wavefields(&self) -> usize {
        match self {
            ModelingMode::Forward => 1,
            ModelingMode::Born | ModelingMode::Adjoint => 2,
        }
    }

    pub fn computes_gradient(&self) -> bool {
        matches!(self, ModelingMode::Adjoint)
    }
}

/// Per-call simulation flags, the `configure` half of the §-level
/// external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimSpec {
    pub mode: ModelingMode,
    /// Write the boundary-value buffer during a forward run so a
    /// subsequent adjoint call can replay the incident field.
    pub save_boundary: bool,
    /// Accumulate the illumination field during a forward run.
    pub want_illumination: bool,
}

impl SimSpec {
    pub fn forward(save_boundary: bool) -> Self {
        SimSpec {
            mode: ModelingMode::Forward,
            save_boundary,
            want_illumination: false,
        }
    }

    pub fn born() -> Self {
        SimSpec {
            mode: ModelingMode::Born,
            save_boundary: false,
            want_illumination: false,
        }
    }

    pub fn adjoint() -> Self {
        SimSpec {
            mode: ModelingMode::Adjoint,
            save_boundary: false,
            want_illumination: false,
        }
    }
}

/// Lifecycle of the stored boundary-value buffer.
///
/// A single boolean cannot express "written but already consumed", which
/// is exactly the state an out-of-order adjoint call has to be rejected
/// in, so the buffer carries a tri-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Never written, or invalidated by a model update.
    NeedsRebuild,
    /// Written by the most recent buffered forward call.
    Valid,
    /// Consumed by an adjoint call since it was last written.
    Stale,
}

/// External forward-engine contract consumed by the inversion core.
///
/// Calls mutate the engine in place; wavefield, boundary and gradient
/// storage is allocated once by the implementation and reused across
/// every simulation.
pub trait ForwardEngine {
    /// Select the simulation mode and flags for the next [`simulate`].
    ///
    /// [`simulate`]: ForwardEngine::simulate
    fn configure(&mut self, spec: &SimSpec) -> SeisResult<()>;

    /// Replace the engine's model (and, for Born runs, the perturbed
    /// model) without reallocating wavefield buffers. Invalidates the
    /// boundary buffer.
    fn update_model(
        &mut self,
        model: &MediumModel,
        perturbed: Option<&MediumModel>,
    ) -> SeisResult<()>;

    /// Install adjoint sources (time-reversed residual records) for the
    /// next adjoint run.
    fn set_adjoint_sources(&mut self, sources: &Records) -> SeisResult<()>;

    /// Run the configured simulation to completion (blocking,
    /// deterministic).
    fn simulate(&mut self) -> SeisResult<()>;

    /// Recorded data of the most recent forward or Born run.
    fn recorded(&self) -> &Records;

    /// Gradient fields (∂f/∂vp, ∂f/∂ρ) of the most recent adjoint run.
    fn gradient(&self) -> SeisResult<(&Array2<f64>, &Array2<f64>)>;

    /// Illumination field of the most recent illuminated forward run.
    fn illumination(&self) -> SeisResult<&Array2<f64>>;

    fn buffer_state(&self) -> BufferState;

    /// Total number of simulations run; the caching tests key on this.
    fn simulate_count(&self) -> usize;
}

/// Shared guard for implementations: an adjoint run is only valid with a
/// freshly written boundary buffer.
pub fn require_valid_buffer(state: BufferState) -> SeisResult<()> {
    match state {
        BufferState::Valid => Ok(()),
        BufferState::NeedsRebuild => Err(SeisError::Sequencing(
            "adjoint simulation requires a preceding forward call with boundary buffering enabled"
                .to_string(),
        )),
        BufferState::Stale => Err(SeisError::Sequencing(
            "boundary buffer already consumed; rerun the buffered forward before another adjoint"
                .to_string(),
        )),
    }
}
