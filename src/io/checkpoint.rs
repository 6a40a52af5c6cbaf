//! Checkpoint dump and restore.
//!
//! A checkpoint holds everything the integrator needs to continue
//! bit-for-bit: the prognostic state (halos included) and all three
//! tendency history slots, under a filename encoding the step number.
//! Files are written to a temporary name and renamed into place, so a
//! crash mid-write never corrupts the previous good checkpoint.
//!
//! # File format
//!
//! ```text
//! [magic: 8 bytes] "ARNXCKPT"
//! [version: u32]
//! [step: u64]
//! [nx, ny, layers: u64 each]
//! [h, u, v: full arrays with halo, f64 little-endian]
//! [eta: full array with halo]
//! [current, old, very old tendencies: dh, du, dv each]
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::grid::{Field2D, Field3D, Grid};
use crate::timestep::{State, TendencyHistory};

const MAGIC: &[u8; 8] = b"ARNXCKPT";
const VERSION: u32 = 1;

/// Error raised by checkpoint I/O.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying I/O failure.
    #[error("checkpoint i/o error on {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Bad magic, version or truncated payload.
    #[error("checkpoint {path} is not readable: {reason}")]
    Format {
        /// Offending path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The checkpoint was written for a different grid.
    #[error(
        "checkpoint {path} is for a {found_nx}x{found_ny}x{found_layers} grid, \
         expected {nx}x{ny}x{layers}"
    )]
    GridMismatch {
        /// Offending path.
        path: PathBuf,
        /// Grid width in the file.
        found_nx: usize,
        /// Grid height in the file.
        found_ny: usize,
        /// Layers in the file.
        found_layers: usize,
        /// Expected width.
        nx: usize,
        /// Expected height.
        ny: usize,
        /// Expected layers.
        layers: usize,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Checkpoint file name for a step.
pub fn checkpoint_path(dir: &Path, step: u64) -> PathBuf {
    dir.join(format!("checkpoint.{step:010}.dat"))
}

/// Write a checkpoint for `step`, atomically.
pub fn write_checkpoint(
    dir: &Path,
    step: u64,
    grid: &Grid,
    state: &State,
    history: &TendencyHistory,
) -> Result<PathBuf, CheckpointError> {
    let final_path = checkpoint_path(dir, step);
    let tmp_path = final_path.with_extension("dat.tmp");

    {
        let file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC).map_err(io_err(&tmp_path))?;
        writer
            .write_all(&VERSION.to_le_bytes())
            .map_err(io_err(&tmp_path))?;
        writer
            .write_all(&step.to_le_bytes())
            .map_err(io_err(&tmp_path))?;
        for dim in [grid.nx, grid.ny, grid.layers] {
            writer
                .write_all(&(dim as u64).to_le_bytes())
                .map_err(io_err(&tmp_path))?;
        }

        write_values(&mut writer, state.h.as_slice(), &tmp_path)?;
        write_values(&mut writer, state.u.as_slice(), &tmp_path)?;
        write_values(&mut writer, state.v.as_slice(), &tmp_path)?;
        write_values(&mut writer, state.eta.as_slice(), &tmp_path)?;
        for slot in [&history.current, &history.old, &history.very_old] {
            write_values(&mut writer, slot.dh.as_slice(), &tmp_path)?;
            write_values(&mut writer, slot.du.as_slice(), &tmp_path)?;
            write_values(&mut writer, slot.dv.as_slice(), &tmp_path)?;
        }
        writer.flush().map_err(io_err(&tmp_path))?;
    }

    fs::rename(&tmp_path, &final_path).map_err(io_err(&final_path))?;
    Ok(final_path)
}

/// Restore the state and tendency history from the checkpoint at `step`.
pub fn read_checkpoint(
    dir: &Path,
    step: u64,
    grid: &Grid,
    state: &mut State,
    history: &mut TendencyHistory,
) -> Result<(), CheckpointError> {
    let path = checkpoint_path(dir, step);
    let file = File::open(&path).map_err(io_err(&path))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(io_err(&path))?;
    if &magic != MAGIC {
        return Err(CheckpointError::Format {
            path,
            reason: "bad magic".into(),
        });
    }
    let version = read_u32(&mut reader, &path)?;
    if version != VERSION {
        return Err(CheckpointError::Format {
            path,
            reason: format!("unsupported version {version}"),
        });
    }
    let file_step = read_u64(&mut reader, &path)?;
    if file_step != step {
        return Err(CheckpointError::Format {
            path,
            reason: format!("file records step {file_step}, expected {step}"),
        });
    }
    let found_nx = read_u64(&mut reader, &path)? as usize;
    let found_ny = read_u64(&mut reader, &path)? as usize;
    let found_layers = read_u64(&mut reader, &path)? as usize;
    if (found_nx, found_ny, found_layers) != (grid.nx, grid.ny, grid.layers) {
        return Err(CheckpointError::GridMismatch {
            path,
            found_nx,
            found_ny,
            found_layers,
            nx: grid.nx,
            ny: grid.ny,
            layers: grid.layers,
        });
    }

    read_into_3d(&mut reader, &mut state.h, &path)?;
    read_into_3d(&mut reader, &mut state.u, &path)?;
    read_into_3d(&mut reader, &mut state.v, &path)?;
    read_into_2d(&mut reader, &mut state.eta, &path)?;
    for slot in [
        &mut history.current,
        &mut history.old,
        &mut history.very_old,
    ] {
        read_into_3d(&mut reader, &mut slot.dh, &path)?;
        read_into_3d(&mut reader, &mut slot.du, &path)?;
        read_into_3d(&mut reader, &mut slot.dv, &path)?;
    }
    Ok(())
}

fn write_values<W: Write>(
    writer: &mut W,
    values: &[f64],
    path: &Path,
) -> Result<(), CheckpointError> {
    for value in values {
        writer.write_all(&value.to_le_bytes()).map_err(io_err(path))?;
    }
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R, path: &Path) -> Result<u32, CheckpointError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(io_err(path))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R, path: &Path) -> Result<u64, CheckpointError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(io_err(path))?;
    Ok(u64::from_le_bytes(buf))
}

fn read_into_3d<R: Read>(
    reader: &mut R,
    field: &mut Field3D,
    path: &Path,
) -> Result<(), CheckpointError> {
    let mut buf = [0u8; 8];
    for slot in field.as_mut_slice() {
        reader.read_exact(&mut buf).map_err(io_err(path))?;
        *slot = f64::from_le_bytes(buf);
    }
    Ok(())
}

fn read_into_2d<R: Read>(
    reader: &mut R,
    field: &mut Field2D,
    path: &Path,
) -> Result<(), CheckpointError> {
    let mut buf = [0u8; 8];
    for slot in field.as_mut_slice() {
        reader.read_exact(&mut buf).map_err(io_err(path))?;
        *slot = f64::from_le_bytes(buf);
    }
    Ok(())
}
