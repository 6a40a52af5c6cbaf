//! Output scheduling: snapshots, running averages, checkpoints and the
//! diagnostic CSV sink.
//!
//! Each of the four cadences is an interval in seconds converted once to a
//! step count `w = ⌊freq/dt⌋`; an interval of zero disables that output.
//! An emission fires on step `n` when `(n − 1) mod w == 0`.
//!
//! Averages accumulate additively every step (the free surface included)
//! and are divided by the window length on emission; the emission at the
//! very first step is skipped because its window holds a single sample.
//!
//! The diagnostic CSV writers are owned here: the sink is an explicit
//! handle of the scheduler, not a process-wide resource.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{ExternalForcingSection, NumericsSection};
use crate::diagnostics::{field2d_stats, layer_stats};
use crate::forcing::WindForcing;
use crate::grid::{Field2D, Field3D, Grid, Stagger};
use crate::io::checkpoint::{write_checkpoint, CheckpointError};
use crate::io::{write_field2, write_field3, FieldIoError};
use crate::timestep::{State, TendencyHistory};

/// Error raised while emitting output.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Snapshot or average write failed.
    #[error(transparent)]
    Field(#[from] FieldIoError),

    /// Checkpoint write failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Directory creation or CSV write failed.
    #[error("output i/o error on {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Counters for the run summary.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputCounts {
    /// Snapshots written.
    pub snapshots: u64,
    /// Averages written.
    pub averages: u64,
    /// Checkpoints written.
    pub checkpoints: u64,
    /// Diagnostic rows appended.
    pub diagnostic_rows: u64,
}

#[derive(Debug)]
struct DiagWriters {
    h: BufWriter<File>,
    u: BufWriter<File>,
    v: BufWriter<File>,
    eta: Option<BufWriter<File>>,
}

/// The output scheduler.
#[derive(Debug)]
pub struct OutputScheduler {
    output_dir: PathBuf,
    checkpoint_dir: PathBuf,
    snap_every: u64,
    av_every: u64,
    checkpoint_every: u64,
    diag_every: u64,
    debug_level: u8,
    dump_wind: bool,
    n_layer: bool,
    h_sum: Field3D,
    u_sum: Field3D,
    v_sum: Field3D,
    eta_sum: Field2D,
    wind_scratch: Field2D,
    diag: Option<DiagWriters>,
    counts: OutputCounts,
}

fn steps_per(freq: f64, dt: f64) -> u64 {
    if freq <= 0.0 {
        0
    } else {
        (freq / dt).floor() as u64
    }
}

fn due(every: u64, step: u64) -> bool {
    every > 0 && (step - 1) % every == 0
}

fn write_diag_row(
    writer: &mut BufWriter<File>,
    step: u64,
    stats: &[crate::diagnostics::LayerStats],
) -> std::io::Result<()> {
    write!(writer, "{step}")?;
    for s in stats {
        write!(
            writer,
            ",{:.12e},{:.12e},{:.12e},{:.12e}",
            s.mean, s.max, s.min, s.std
        )?;
    }
    writeln!(writer)
}

fn open_diag(path: &Path, layers: usize) -> Result<BufWriter<File>, OutputError> {
    let file = File::create(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    let mut header = String::from("timestep");
    for k in 1..=layers {
        header.push_str(&format!(",mean{k:02},max{k:02},min{k:02},std{k:02}"));
    }
    writeln!(writer, "{header}").map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(writer)
}

impl OutputScheduler {
    /// Create the scheduler, its directories and (when enabled) the
    /// diagnostic CSV files with their headers.
    pub fn new(
        root: &Path,
        grid: &Grid,
        numerics: &NumericsSection,
        forcing: &ExternalForcingSection,
        n_layer: bool,
    ) -> Result<Self, OutputError> {
        let output_dir = root.join("output");
        let checkpoint_dir = root.join("checkpoints");
        for dir in [&output_dir, &checkpoint_dir] {
            fs::create_dir_all(dir).map_err(|source| OutputError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let dt = numerics.dt;
        let diag_every = steps_per(numerics.diag_freq, dt);
        let diag = if diag_every > 0 {
            let eta = if n_layer {
                Some(open_diag(&output_dir.join("diagnostic.eta.csv"), 1)?)
            } else {
                None
            };
            Some(DiagWriters {
                h: open_diag(&output_dir.join("diagnostic.h.csv"), grid.layers)?,
                u: open_diag(&output_dir.join("diagnostic.u.csv"), grid.layers)?,
                v: open_diag(&output_dir.join("diagnostic.v.csv"), grid.layers)?,
                eta,
            })
        } else {
            None
        };

        Ok(Self {
            output_dir,
            checkpoint_dir,
            snap_every: steps_per(numerics.dump_freq, dt),
            av_every: steps_per(numerics.av_freq, dt),
            checkpoint_every: steps_per(numerics.checkpoint_freq, dt),
            diag_every,
            debug_level: numerics.debug_level,
            dump_wind: forcing.dump_wind,
            n_layer,
            h_sum: grid.field3d(),
            u_sum: grid.field3d(),
            v_sum: grid.field3d(),
            eta_sum: grid.field2d(),
            wind_scratch: grid.field2d(),
            diag,
            counts: OutputCounts::default(),
        })
    }

    /// Counters so far.
    pub fn counts(&self) -> OutputCounts {
        self.counts
    }

    /// Accumulate the averaging sums for one completed step.
    pub fn accumulate(&mut self, state: &State) {
        if self.av_every == 0 {
            return;
        }
        self.h_sum.axpy(1.0, &state.h);
        self.u_sum.axpy(1.0, &state.u);
        self.v_sum.axpy(1.0, &state.v);
        if self.n_layer {
            for (sum, value) in self
                .eta_sum
                .as_mut_slice()
                .iter_mut()
                .zip(state.eta.as_slice())
            {
                *sum += value;
            }
        }
    }

    /// Emit whatever is due at global step `step`.
    ///
    /// Returns true when a snapshot was written, so the caller can run the
    /// post-snapshot safety scan.
    #[allow(clippy::too_many_arguments)]
    pub fn emit(
        &mut self,
        step: u64,
        grid: &Grid,
        state: &State,
        history: &TendencyHistory,
        wind: &WindForcing,
        wind_scale: f64,
    ) -> Result<bool, OutputError> {
        let mut snapshot_written = false;

        if due(self.snap_every, step) {
            self.write_snapshot(step, grid, state, history, wind, wind_scale)?;
            snapshot_written = true;
            self.counts.snapshots += 1;
            if self.debug_level >= 1 {
                log::info!("step {step}: snapshot written to {}", self.output_dir.display());
            }
        }

        if due(self.av_every, step) {
            if step > 1 {
                self.write_averages(step, grid)?;
                self.counts.averages += 1;
            }
            self.h_sum.fill(0.0);
            self.u_sum.fill(0.0);
            self.v_sum.fill(0.0);
            self.eta_sum.fill(0.0);
        }

        if due(self.checkpoint_every, step) {
            write_checkpoint(&self.checkpoint_dir, step, grid, state, history)?;
            self.counts.checkpoints += 1;
        }

        if due(self.diag_every, step) {
            self.write_diagnostics(step, grid, state)?;
            self.counts.diagnostic_rows += 1;
        }

        Ok(snapshot_written)
    }

    /// Flush the diagnostic sink (called once at the end of a run).
    pub fn finish(&mut self) -> Result<(), OutputError> {
        if let Some(diag) = &mut self.diag {
            let path = self.output_dir.join("diagnostic.h.csv");
            let flush = |w: &mut BufWriter<File>| w.flush();
            for writer in [&mut diag.h, &mut diag.u, &mut diag.v] {
                flush(writer).map_err(|source| OutputError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            if let Some(eta) = &mut diag.eta {
                flush(eta).map_err(|source| OutputError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn snap_path(&self, field: &str, step: u64) -> PathBuf {
        self.output_dir.join(format!("snap.{field}.{step:010}"))
    }

    fn av_path(&self, field: &str, step: u64) -> PathBuf {
        self.output_dir.join(format!("av.{field}.{step:010}"))
    }

    fn write_snapshot(
        &mut self,
        step: u64,
        grid: &Grid,
        state: &State,
        history: &TendencyHistory,
        wind: &WindForcing,
        wind_scale: f64,
    ) -> Result<(), OutputError> {
        write_field3(&self.snap_path("h", step), &state.h, grid, Stagger::HPoint)?;
        write_field3(&self.snap_path("u", step), &state.u, grid, Stagger::UPoint)?;
        write_field3(&self.snap_path("v", step), &state.v, grid, Stagger::VPoint)?;
        if self.n_layer {
            write_field2(&self.snap_path("eta", step), &state.eta, grid, Stagger::HPoint)?;
        }

        if self.dump_wind {
            self.wind_scratch.copy_from(&wind.wind_x);
            for value in self.wind_scratch.as_mut_slice() {
                *value *= wind_scale;
            }
            let path = self.output_dir.join(format!("wind_x.{step:010}"));
            write_field2(&path, &self.wind_scratch, grid, Stagger::UPoint)?;

            self.wind_scratch.copy_from(&wind.wind_y);
            for value in self.wind_scratch.as_mut_slice() {
                *value *= wind_scale;
            }
            let path = self.output_dir.join(format!("wind_y.{step:010}"));
            write_field2(&path, &self.wind_scratch, grid, Stagger::VPoint)?;
        }

        if self.debug_level >= 2 {
            // The freshest tendencies sit in the old slot, the history
            // having just rotated.
            write_field3(&self.snap_path("dhdt", step), &history.old.dh, grid, Stagger::HPoint)?;
            write_field3(&self.snap_path("dudt", step), &history.old.du, grid, Stagger::UPoint)?;
            write_field3(&self.snap_path("dvdt", step), &history.old.dv, grid, Stagger::VPoint)?;
        }
        Ok(())
    }

    fn write_averages(&mut self, step: u64, grid: &Grid) -> Result<(), OutputError> {
        let inv_w = 1.0 / self.av_every as f64;
        for sum in [&mut self.h_sum, &mut self.u_sum, &mut self.v_sum] {
            for value in sum.as_mut_slice() {
                *value *= inv_w;
            }
        }
        write_field3(&self.av_path("h", step), &self.h_sum, grid, Stagger::HPoint)?;
        write_field3(&self.av_path("u", step), &self.u_sum, grid, Stagger::UPoint)?;
        write_field3(&self.av_path("v", step), &self.v_sum, grid, Stagger::VPoint)?;
        if self.n_layer {
            for value in self.eta_sum.as_mut_slice() {
                *value *= inv_w;
            }
            write_field2(&self.av_path("eta", step), &self.eta_sum, grid, Stagger::HPoint)?;
        }
        Ok(())
    }

    fn write_diagnostics(
        &mut self,
        step: u64,
        grid: &Grid,
        state: &State,
    ) -> Result<(), OutputError> {
        let Some(diag) = &mut self.diag else {
            return Ok(());
        };
        let path = self.output_dir.join("diagnostic.h.csv");
        let map_err = |source| OutputError::Io {
            path: path.clone(),
            source,
        };

        let h_stats = layer_stats(&state.h, grid, Stagger::HPoint);
        let u_stats = layer_stats(&state.u, grid, Stagger::UPoint);
        let v_stats = layer_stats(&state.v, grid, Stagger::VPoint);
        write_diag_row(&mut diag.h, step, &h_stats).map_err(map_err)?;
        write_diag_row(&mut diag.u, step, &u_stats).map_err(map_err)?;
        write_diag_row(&mut diag.v, step, &v_stats).map_err(map_err)?;
        if let Some(eta_writer) = &mut diag.eta {
            let eta_stats = [field2d_stats(&state.eta, grid)];
            write_diag_row(eta_writer, step, &eta_stats).map_err(map_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_per_floors() {
        assert_eq!(steps_per(0.0, 600.0), 0);
        assert_eq!(steps_per(-1.0, 600.0), 0);
        assert_eq!(steps_per(6000.0, 600.0), 10);
        assert_eq!(steps_per(6500.0, 600.0), 10);
        // An interval shorter than one step disables the cadence.
        assert_eq!(steps_per(300.0, 600.0), 0);
    }

    #[test]
    fn test_due_schedule() {
        assert!(due(10, 1));
        assert!(!due(10, 2));
        assert!(due(10, 11));
        assert!(due(10, 21));
        assert!(!due(0, 1));
    }
}
