//! `.npy` export of model and gradient fields for external tooling.
//! Export only; plotting stays outside this workspace.

use crate::engine::ForwardEngine;
use crate::invert::MigrationImage;
use crate::session::Session;
use ndarray::Array2;
use ndarray_npy::write_npy;
use seis_types::error::{SeisError, SeisResult};
use std::path::Path;

fn write_field(path: &Path, field: &Array2<f64>) -> SeisResult<()> {
    write_npy(path, field)
        .map_err(|e| SeisError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}

/// Write the session's dense model fields as `vp.npy` / `rho.npy`.
pub fn save_model<E: ForwardEngine>(session: &Session<E>, dir: &Path) -> SeisResult<()> {
    std::fs::create_dir_all(dir)?;
    write_field(&dir.join("vp.npy"), &session.model.vp)?;
    write_field(&dir.join("rho.npy"), &session.model.rho)?;
    Ok(())
}

/// Write a migration image as one `.npy` per channel.
pub fn save_migration(image: &MigrationImage, dir: &Path) -> SeisResult<()> {
    std::fs::create_dir_all(dir)?;
    for (ch, field) in image.channels.iter().enumerate() {
        write_field(&dir.join(format!("migration_ch{ch}.npy")), field)?;
    }
    Ok(())
}
