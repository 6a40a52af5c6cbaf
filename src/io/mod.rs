//! Raw binary I/O of gridded fields.
//!
//! Input and output files are unformatted streams of little-endian `f64`
//! covering a field's staggered interior, `i` fastest, then `j`, then the
//! layer: H files are `nx × ny (× layers)`, U files `(nx+1) × ny`, V files
//! `nx × (ny+1)`. The halo never touches disk; it is rebuilt by the
//! periodic wrap after reading.
//!
//! Input file-name values starting with `:` are generator specifiers,
//! `:<name>:arg1,arg2,...`, resolved against the built-in idealized input
//! generators instead of the filesystem.

pub mod checkpoint;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::grid::{Field2D, Field3D, Grid, Stagger};

/// Error raised by field I/O.
#[derive(Debug, Error)]
pub enum FieldIoError {
    /// Underlying I/O failure.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file holds the wrong number of values.
    #[error("{path} holds {found} values, expected {expected}")]
    Size {
        /// Offending path.
        path: PathBuf,
        /// Values expected from the grid shape.
        expected: usize,
        /// Values found.
        found: usize,
    },

    /// A generator specifier could not be parsed.
    #[error("malformed generator specifier `{0}`")]
    BadSpecifier(String),

    /// A generator specifier names no built-in generator.
    #[error("unknown input generator `{0}`")]
    UnknownGenerator(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> FieldIoError + '_ {
    move |source| FieldIoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read exactly `expected` doubles from a raw file.
pub fn read_raw(path: &Path, expected: usize) -> Result<Vec<f64>, FieldIoError> {
    let file = File::open(path).map_err(io_err(path))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).map_err(io_err(path))?;
    if bytes.len() != expected * 8 {
        return Err(FieldIoError::Size {
            path: path.to_path_buf(),
            expected,
            found: bytes.len() / 8,
        });
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().expect("8-byte chunk")))
        .collect())
}

/// Read a layered field from a raw file, filling the staggered interior
/// and rebuilding the halo by periodic wrap.
pub fn read_field3(
    path: &Path,
    grid: &Grid,
    stagger: Stagger,
) -> Result<Field3D, FieldIoError> {
    let (ni, nj) = stagger.extent(grid.nx, grid.ny);
    let values = read_raw(path, ni * nj * grid.layers)?;
    let mut field = grid.field3d();
    let mut cursor = values.iter();
    for k in 0..grid.layers {
        for j in 1..=nj {
            for i in 1..=ni {
                field.set(i, j, k, *cursor.next().expect("sized above"));
            }
        }
    }
    field.wrap();
    Ok(field)
}

/// Read a 2D field from a raw file; see [`read_field3`].
pub fn read_field2(
    path: &Path,
    grid: &Grid,
    stagger: Stagger,
) -> Result<Field2D, FieldIoError> {
    let (ni, nj) = stagger.extent(grid.nx, grid.ny);
    let values = read_raw(path, ni * nj)?;
    let mut field = grid.field2d();
    let mut cursor = values.iter();
    for j in 1..=nj {
        for i in 1..=ni {
            field.set(i, j, *cursor.next().expect("sized above"));
        }
    }
    field.wrap();
    Ok(field)
}

/// Write a layered field's staggered interior as raw little-endian `f64`.
pub fn write_field3(
    path: &Path,
    field: &Field3D,
    grid: &Grid,
    stagger: Stagger,
) -> Result<(), FieldIoError> {
    let (ni, nj) = stagger.extent(grid.nx, grid.ny);
    let file = File::create(path).map_err(io_err(path))?;
    let mut writer = BufWriter::new(file);
    for k in 0..grid.layers {
        for j in 1..=nj {
            for i in 1..=ni {
                writer
                    .write_all(&field.get(i, j, k).to_le_bytes())
                    .map_err(io_err(path))?;
            }
        }
    }
    writer.flush().map_err(io_err(path))
}

/// Write a 2D field's staggered interior; see [`write_field3`].
pub fn write_field2(
    path: &Path,
    field: &Field2D,
    grid: &Grid,
    stagger: Stagger,
) -> Result<(), FieldIoError> {
    let (ni, nj) = stagger.extent(grid.nx, grid.ny);
    let file = File::create(path).map_err(io_err(path))?;
    let mut writer = BufWriter::new(file);
    for j in 1..=nj {
        for i in 1..=ni {
            writer
                .write_all(&field.get(i, j).to_le_bytes())
                .map_err(io_err(path))?;
        }
    }
    writer.flush().map_err(io_err(path))
}

/// Read a scalar time series of exactly `expected` doubles.
pub fn read_series(path: &Path, expected: usize) -> Result<Vec<f64>, FieldIoError> {
    read_raw(path, expected)
}

/// A parsed generator specifier: name and numeric arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorSpec {
    /// Generator name, e.g. `rectangular_pool`.
    pub name: String,
    /// Numeric arguments.
    pub args: Vec<f64>,
}

/// How a configured input value resolves.
#[derive(Clone, Debug, PartialEq)]
pub enum InputSource {
    /// Absent or empty: use the built-in default.
    Default,
    /// A raw file to read.
    File(PathBuf),
    /// A built-in generator.
    Generator(GeneratorSpec),
}

/// Resolve a configured file-name value against a run directory.
pub fn resolve_input(
    value: &Option<String>,
    root: &Path,
) -> Result<InputSource, FieldIoError> {
    let Some(value) = value.as_deref() else {
        return Ok(InputSource::Default);
    };
    if value.is_empty() {
        return Ok(InputSource::Default);
    }
    if let Some(rest) = value.strip_prefix(':') {
        let (name, arg_str) = rest
            .split_once(':')
            .ok_or_else(|| FieldIoError::BadSpecifier(value.to_string()))?;
        let args = if arg_str.is_empty() {
            Vec::new()
        } else {
            arg_str
                .split(',')
                .map(|a| a.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| FieldIoError::BadSpecifier(value.to_string()))?
        };
        return Ok(InputSource::Generator(GeneratorSpec {
            name: name.to_string(),
            args,
        }));
    }
    Ok(InputSource::File(root.join(value)))
}
