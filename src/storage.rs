//! Persistent storage for the field and distribution-function histories of a run.
//!
//! Three backing files are allocated at full run length before the first step
//! and then updated in place, batch by batch, addressed by time coordinate.
//! Only the batch being written is ever resident.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{ArrayView2, ArrayView3};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::array_file::ArrayFile;
use crate::axis::{Axis, AxisKind, RunAxes};
use crate::error::{Result, StorageError};
use crate::params;

pub const ELECTRIC_FIELD_FILE: &str = "electric_field_vs_time.kst";
pub const DRIVER_ELECTRIC_FIELD_FILE: &str = "driver_electric_field_vs_time.kst";
pub const DIST_FUNC_FILE: &str = "dist_func_vs_time.kst";

pub const ELECTRIC_FIELD: &str = "electric_field";
pub const DRIVER_ELECTRIC_FIELD: &str = "driver_electric_field";
pub const DIST_FUNC: &str = "distribution_function";

pub struct StorageManager {
    base_path: PathBuf,
    axes: RunAxes,
    electric_field: ArrayFile,
    driver_electric_field: ArrayFile,
    dist_func: ArrayFile,
    // One past the highest time index written so far
    written_end: usize,
    closed: bool,
}

impl StorageManager {
    /// Allocate zero-filled backing files for the whole run under `base_path`.
    ///
    /// Existing files with the same names are truncated.
    pub fn create(base_path: impl AsRef<Path>, axes: RunAxes) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(StorageError::init(&base_path))?;

        let field_axes = vec![axes.time.clone(), axes.space.clone()];
        let f_axes = vec![axes.time.clone(), axes.space.clone(), axes.velocity.clone()];

        let electric_field = ArrayFile::create_zeroed(
            &base_path.join(ELECTRIC_FIELD_FILE),
            ELECTRIC_FIELD,
            field_axes.clone(),
        )?;
        let driver_electric_field = ArrayFile::create_zeroed(
            &base_path.join(DRIVER_ELECTRIC_FIELD_FILE),
            DRIVER_ELECTRIC_FIELD,
            field_axes,
        )?;
        let dist_func =
            ArrayFile::create_zeroed(&base_path.join(DIST_FUNC_FILE), DIST_FUNC, f_axes)?;
        sync_dir(&base_path).map_err(StorageError::init(&base_path))?;

        info!(
            path = %base_path.display(),
            nt = axes.nt(),
            nx = axes.nx(),
            nv = axes.nv(),
            "allocated run storage"
        );

        Ok(Self {
            base_path,
            axes,
            electric_field,
            driver_electric_field,
            dist_func,
            written_end: 0,
            closed: false,
        })
    }

    /// Reattach to the backing files of an earlier run, e.g. to resume it.
    ///
    /// The three files must agree on their time and space coordinates.
    pub fn open_existing(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let electric_field = ArrayFile::open(&base_path.join(ELECTRIC_FIELD_FILE))?;
        let driver_electric_field = ArrayFile::open(&base_path.join(DRIVER_ELECTRIC_FIELD_FILE))?;
        let dist_func = ArrayFile::open(&base_path.join(DIST_FUNC_FILE))?;

        let check = |file: &ArrayFile, kinds: &[AxisKind]| -> Result<()> {
            let found: Vec<AxisKind> = file.axes().iter().map(|a| a.kind()).collect();
            if found != kinds {
                return Err(StorageError::format(
                    file.path(),
                    format!("dims {:?}, expected {:?}", found, kinds),
                ));
            }
            Ok(())
        };
        check(&electric_field, &[AxisKind::Time, AxisKind::Space])?;
        check(&driver_electric_field, &[AxisKind::Time, AxisKind::Space])?;
        check(&dist_func, &[AxisKind::Time, AxisKind::Space, AxisKind::Velocity])?;

        let time = electric_field.axes()[0].clone();
        let space = electric_field.axes()[1].clone();
        for file in [&driver_electric_field, &dist_func] {
            if *file.axes()[0] != *time || *file.axes()[1] != *space {
                return Err(StorageError::format(
                    file.path(),
                    "coordinates differ from the electric field file",
                ));
            }
        }
        let axes = RunAxes {
            time: time.clone(),
            space: space.clone(),
            velocity: dist_func.axes()[2].clone(),
        };

        // Rebind every layout to the shared axis instances
        let electric_field = rebind(electric_field, &axes)?;
        let driver_electric_field = rebind(driver_electric_field, &axes)?;
        let dist_func = rebind(dist_func, &axes)?;

        info!(path = %base_path.display(), nt = axes.nt(), "reopened run storage");
        Ok(Self {
            base_path,
            axes,
            electric_field,
            driver_electric_field,
            dist_func,
            written_end: 0,
            closed: false,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn axes(&self) -> &RunAxes {
        &self.axes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn electric_field_path(&self) -> &Path {
        self.electric_field.path()
    }

    pub fn driver_electric_field_path(&self) -> &Path {
        self.driver_electric_field.path()
    }

    pub fn dist_func_path(&self) -> &Path {
        self.dist_func.path()
    }

    /// Store one batch of consecutive time steps.
    ///
    /// `t_range` must be adjacent coordinates of the time axis. `e` and
    /// `e_driver` are (time, space), `f` is (time, space, velocity). All
    /// validation happens before any file is touched. The three files are then
    /// written and synced one after another; an I/O failure leaves the files
    /// written before it updated and the rest unchanged.
    pub fn write_batch(
        &mut self,
        t_range: &[f64],
        e: ArrayView2<'_, f64>,
        e_driver: ArrayView2<'_, f64>,
        f: ArrayView3<'_, f64>,
    ) -> Result<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        let span = self.axes.time.contiguous_span(t_range)?;
        let (nt, nx, nv) = (span.len(), self.axes.nx(), self.axes.nv());
        check_shape(ELECTRIC_FIELD, &[nt, nx], e.shape())?;
        check_shape(DRIVER_ELECTRIC_FIELD, &[nt, nx], e_driver.shape())?;
        check_shape(DIST_FUNC, &[nt, nx, nv], f.shape())?;

        if span.start < self.written_end {
            warn!(
                start = span.start,
                written_end = self.written_end,
                "batch overlaps or precedes already written time steps; overwriting"
            );
        }

        for (file, values) in [
            (&self.electric_field, e.iter()),
            (&self.driver_electric_field, e_driver.iter()),
        ] {
            file.write_time_slabs(span.start, values)?;
            debug!(array = file.name(), start = span.start, len = nt, "flushed batch");
        }
        self.dist_func.write_time_slabs(span.start, f.iter())?;
        debug!(array = self.dist_func.name(), start = span.start, len = nt, "flushed batch");

        self.written_end = self.written_end.max(span.end);
        Ok(())
    }

    /// Record a configuration mapping as `<base_path>/<filename>.txt`.
    pub fn write_parameters_to_file<T: Serialize + ?Sized>(
        &self,
        params: &T,
        filename: &str,
    ) -> Result<PathBuf> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        let path = params::parameter_path(&self.base_path, filename);
        params::write_parameters(&path, params)?;
        debug!(path = %path.display(), "wrote parameters");
        Ok(path)
    }

    /// Final durable flush. The store accepts nothing afterwards.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        for file in [&self.electric_field, &self.driver_electric_field, &self.dist_func] {
            file.sync()?;
        }
        sync_dir(&self.base_path).map_err(StorageError::io(&self.base_path))?;
        self.closed = true;
        info!(
            path = %self.base_path.display(),
            written_steps = self.written_end,
            "closed run storage"
        );
        Ok(())
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        if !self.closed {
            warn!(path = %self.base_path.display(), "run storage dropped without close()");
        }
    }
}

fn check_shape(name: &'static str, expected: &[usize], found: &[usize]) -> Result<()> {
    if expected != found {
        return Err(StorageError::ShapeMismatch {
            name,
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

fn rebind(file: ArrayFile, axes: &RunAxes) -> Result<ArrayFile> {
    let shared: Vec<Arc<Axis>> = file
        .axes()
        .iter()
        .map(|a| match a.kind() {
            AxisKind::Time => axes.time.clone(),
            AxisKind::Space => axes.space.clone(),
            AxisKind::Velocity => axes.velocity.clone(),
        })
        .collect();
    file.with_axes(shared)
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> std::io::Result<()> {
    fs::File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeled::LabeledArray;
    use ndarray::{Array2, Array3};

    fn small_axes() -> RunAxes {
        RunAxes::new(
            Axis::linspace(AxisKind::Time, 0.0, 4.0, 5).unwrap(),
            Axis::cell_centered(AxisKind::Space, 0.0, 1.0, 2).unwrap(),
            Axis::cell_centered(AxisKind::Velocity, -1.0, 1.0, 2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn shape_mismatch_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StorageManager::create(dir.path(), small_axes()).unwrap();
        let e = Array2::<f64>::ones((2, 2));
        let bad_f = Array3::<f64>::ones((2, 2, 3));
        let err = store
            .write_batch(&[0.0, 1.0], e.view(), e.view(), bad_f.view())
            .unwrap_err();
        assert!(matches!(err, StorageError::ShapeMismatch { name: DIST_FUNC, .. }));

        let stored = LabeledArray::read(store.electric_field_path()).unwrap();
        assert!(stored.data.iter().all(|&v| v == 0.0));
        store.close().unwrap();
    }

    #[test]
    fn writes_after_close_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StorageManager::create(dir.path(), small_axes()).unwrap();
        store.close().unwrap();
        assert!(store.is_closed());

        let e = Array2::<f64>::ones((1, 2));
        let f = Array3::<f64>::ones((1, 2, 2));
        assert!(matches!(
            store.write_batch(&[0.0], e.view(), e.view(), f.view()),
            Err(StorageError::Closed)
        ));
        assert!(matches!(
            store.write_parameters_to_file(&serde_json::json!({"a": 1}), "p"),
            Err(StorageError::Closed)
        ));
        assert!(matches!(store.close(), Err(StorageError::Closed)));
    }

    #[test]
    fn reopened_store_shares_axes_across_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StorageManager::create(dir.path(), small_axes()).unwrap();
        store.close().unwrap();

        let mut reopened = StorageManager::open_existing(dir.path()).unwrap();
        assert_eq!(reopened.axes().nt(), 5);
        assert!(Arc::ptr_eq(
            &reopened.electric_field.axes()[0],
            &reopened.dist_func.axes()[0]
        ));
        reopened.close().unwrap();
    }

    #[test]
    fn create_fails_when_base_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, b"x").unwrap();
        assert!(matches!(
            StorageManager::create(&blocker, small_axes()),
            Err(StorageError::Init { .. })
        ));
    }
}
