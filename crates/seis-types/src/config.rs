// ─────────────────────────────────────────────────────────────────────
// SCPN Seismic Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{SeisError, SeisResult};
use crate::grid::{Grid2D, TimeGrid};
use serde::{Deserialize, Serialize};

/// Top-level inversion configuration, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionConfig {
    pub survey_name: String,
    /// [nz, nx] on the dense modeling grid.
    pub grid_resolution: [usize; 2],
    pub dimensions: GridDimensions,
    pub time: TimeGrid,
    pub medium: MediumConfig,
    pub acquisition: AcquisitionConfig,
    pub inversion: InversionParams,
    pub optimizer: OptimizerOptions,
    #[serde(default)]
    pub round_trips: RoundTripOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridDimensions {
    pub z_min: f64,
    pub z_max: f64,
    pub x_min: f64,
    pub x_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediumConfig {
    pub ref_vp: f64,
    pub ref_rho: f64,
    pub vp_min: f64,
    pub vp_max: f64,
    pub rho_min: f64,
    pub rho_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub nshot: usize,
    pub nrecv: usize,
    /// Depth of the source/receiver line below the grid top.
    #[serde(default)]
    pub depth: f64,
    /// Source wavelet peak frequency [Hz].
    pub fpeak: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionParams {
    /// Ordered parameter selectors, e.g. ["chi_bulk", "chi_rho"] or
    /// ["chi_vp", "null"]. Parsed by the engine crate.
    pub parameterization: Vec<String>,
    /// Inversion-grid inset from the modeling-grid boundary, in cells.
    #[serde(default = "default_grid_margin")]
    pub grid_margin: usize,
    /// Dense cells per coarse inversion-grid interval.
    #[serde(default = "default_grid_step")]
    pub grid_step: usize,
    /// Diagonal preconditioner strength; 1.0 disables preconditioning.
    #[serde(default = "default_precondition_factor")]
    pub precondition_factor: f64,
    /// Interpolation kernel between the grids: "linear" or "quadratic".
    #[serde(default = "default_interp_order")]
    pub interp_order: String,
}

fn default_grid_margin() -> usize {
    4
}
fn default_grid_step() -> usize {
    2
}
fn default_precondition_factor() -> f64 {
    1.0
}
fn default_interp_order() -> String {
    "linear".to_string()
}

/// Options forwarded to the bounded quasi-Newton routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerOptions {
    pub iterations: usize,
    #[serde(default = "default_f_tol")]
    pub f_tol: f64,
    #[serde(default = "default_g_tol")]
    pub g_tol: f64,
    #[serde(default = "default_step_tol")]
    pub step_tol: f64,
    #[serde(default)]
    pub bounded: bool,
}

fn default_f_tol() -> f64 {
    1e-12
}
fn default_g_tol() -> f64 {
    1e-8
}
fn default_step_tol() -> f64 {
    1e-12
}

/// Alternating-minimization round-trip options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTripOptions {
    pub min_round_trips: usize,
    pub max_round_trips: usize,
    pub tolerance: f64,
    /// Reset the model starting vector between rounds.
    #[serde(default)]
    pub reinitialize: bool,
}

impl Default for RoundTripOptions {
    fn default() -> Self {
        RoundTripOptions {
            min_round_trips: 1,
            max_round_trips: 5,
            tolerance: 1e-4,
            reinitialize: false,
        }
    }
}

impl InversionConfig {
    pub fn from_file(path: &str) -> SeisResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn create_grid(&self) -> Grid2D {
        Grid2D::new(
            self.grid_resolution[0],
            self.grid_resolution[1],
            self.dimensions.z_min,
            self.dimensions.z_max,
            self.dimensions.x_min,
            self.dimensions.x_max,
        )
    }

    pub fn validate(&self) -> SeisResult<()> {
        if self.grid_resolution[0] < 3 || self.grid_resolution[1] < 3 {
            return Err(SeisError::ConfigError(
                "grid_resolution must be at least 3x3".to_string(),
            ));
        }
        if self.time.nt == 0 || !(self.time.dt.is_finite() && self.time.dt > 0.0) {
            return Err(SeisError::ConfigError(
                "time grid must have nt >= 1 and dt > 0".to_string(),
            ));
        }
        if self.inversion.parameterization.is_empty() {
            return Err(SeisError::ConfigError(
                "inversion.parameterization must name at least one selector".to_string(),
            ));
        }
        if !self.inversion.precondition_factor.is_finite()
            || self.inversion.precondition_factor < 1.0
        {
            return Err(SeisError::ConfigError(
                "inversion.precondition_factor must be finite and >= 1".to_string(),
            ));
        }
        match self.inversion.interp_order.as_str() {
            "linear" | "quadratic" => {}
            other => {
                return Err(SeisError::ConfigError(format!(
                    "inversion.interp_order must be \"linear\" or \"quadratic\", got \"{other}\""
                )))
            }
        }
        if self.optimizer.iterations == 0 {
            return Err(SeisError::ConfigError(
                "optimizer.iterations must be >= 1".to_string(),
            ));
        }
        if self.round_trips.max_round_trips < self.round_trips.min_round_trips {
            return Err(SeisError::ConfigError(
                "round_trips.max_round_trips must be >= min_round_trips".to_string(),
            ));
        }
        if !(self.round_trips.tolerance.is_finite() && self.round_trips.tolerance > 0.0) {
            return Err(SeisError::ConfigError(
                "round_trips.tolerance must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}
