use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, Axis as NdAxis, IxDyn};

use crate::array_file::ArrayFile;
use crate::axis::Axis;
use crate::error::{Result, StorageError};

/// In-memory copy of (part of) a stored array together with its coordinates.
#[derive(Debug, Clone)]
pub struct LabeledArray {
    pub name: String,
    pub axes: Vec<Arc<Axis>>,
    pub data: ArrayD<f64>,
}

impl LabeledArray {
    /// Load a whole backing file.
    pub fn read(path: &Path) -> Result<Self> {
        let file = ArrayFile::open(path)?;
        Self::load(&file, 0..file.nt())
    }

    /// Load only the time indices in `range`; the time axis is cut to match.
    pub fn read_time_range(path: &Path, range: Range<usize>) -> Result<Self> {
        let file = ArrayFile::open(path)?;
        Self::load(&file, range)
    }

    fn load(file: &ArrayFile, range: Range<usize>) -> Result<Self> {
        let values = file.read_time_slabs(range.clone())?;
        let time = file.time_axis();
        let mut axes = Vec::with_capacity(file.axes().len());
        axes.push(Arc::new(Axis::new(
            time.kind(),
            time.coords()[range.clone()].to_vec(),
        )?));
        axes.extend(file.axes()[1..].iter().cloned());

        let mut shape = file.shape();
        shape[0] = range.len();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| StorageError::format(file.path(), e.to_string()))?;
        Ok(Self {
            name: file.name().to_string(),
            axes,
            data,
        })
    }

    pub fn time(&self) -> &Axis {
        &self.axes[0]
    }

    /// View of the array at an exact time coordinate.
    pub fn sel_time(&self, t: f64) -> Result<ArrayViewD<'_, f64>> {
        let index = self
            .time()
            .position(t)
            .ok_or(StorageError::CoordinateMismatch { axis: "time", value: t })?;
        Ok(self.data.index_axis(NdAxis(0), index))
    }
}
