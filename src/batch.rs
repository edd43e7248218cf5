use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2};

use crate::error::{Result, StorageError};
use crate::storage::{StorageManager, DIST_FUNC, DRIVER_ELECTRIC_FIELD, ELECTRIC_FIELD};

/// Engine-side accumulator for consecutive time steps.
///
/// Steps are collected until `capacity` is reached and then handed to the
/// store as a single batch, so the I/O cost is paid once per batch.
pub struct BatchBuffer {
    pub times: Vec<f64>,
    pub e: Array2<f64>,
    pub e_driver: Array2<f64>,
    pub f: Array3<f64>,
}

impl BatchBuffer {
    pub fn new(capacity: usize, nx: usize, nv: usize) -> Self {
        BatchBuffer {
            times: Vec::with_capacity(capacity),
            e: Array2::zeros((capacity, nx)),
            e_driver: Array2::zeros((capacity, nx)),
            f: Array3::zeros((capacity, nx, nv)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.e.nrows()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Append one time step.
    pub fn push(
        &mut self,
        t: f64,
        e: ArrayView1<'_, f64>,
        e_driver: ArrayView1<'_, f64>,
        f: ArrayView2<'_, f64>,
    ) -> Result<()> {
        if self.is_full() {
            return Err(StorageError::ShapeMismatch {
                name: "batch",
                expected: vec![self.capacity()],
                found: vec![self.len() + 1],
            });
        }
        let (nx, nv) = (self.e.ncols(), self.f.dim().2);
        for (name, expected, found) in [
            (ELECTRIC_FIELD, vec![nx], e.shape()),
            (DRIVER_ELECTRIC_FIELD, vec![nx], e_driver.shape()),
            (DIST_FUNC, vec![nx, nv], f.shape()),
        ] {
            if expected != found {
                return Err(StorageError::ShapeMismatch {
                    name,
                    expected,
                    found: found.to_vec(),
                });
            }
        }

        let row = self.len();
        self.e.row_mut(row).assign(&e);
        self.e_driver.row_mut(row).assign(&e_driver);
        self.f.slice_mut(s![row, .., ..]).assign(&f);
        self.times.push(t);
        Ok(())
    }

    /// Write the accumulated steps to `store` and start a new batch.
    ///
    /// A no-op when nothing has been pushed. On failure the steps are kept so
    /// the caller can retry the same batch.
    pub fn flush_into(&mut self, store: &mut StorageManager) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let n = self.len();
        store.write_batch(
            &self.times,
            self.e.slice(s![..n, ..]),
            self.e_driver.slice(s![..n, ..]),
            self.f.slice(s![..n, .., ..]),
        )?;
        self.zero();
        Ok(())
    }

    pub fn zero(&mut self) {
        self.times.clear();
        self.e.fill(0.0);
        self.e_driver.fill(0.0);
        self.f.fill(0.0);
    }
}
