//! Self-describing on-disk layout for coordinate-labelled arrays.
//!
//! ```text
//! magic "KSTARRAY" | u32 version | u32 header length | JSON header
//! | coordinates of every dim (f64 LE) | zero padding to 8 bytes | data (f64 LE)
//! ```
//!
//! Data is row-major with time as the slowest dimension, so any contiguous run
//! of time indices is a single contiguous byte range.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::axis::{Axis, AxisKind};
use crate::error::{Result, StorageError};

pub const MAGIC: [u8; 8] = *b"KSTARRAY";
pub const FORMAT_VERSION: u32 = 1;
const DTYPE: &str = "f64le";
const VALUE_BYTES: usize = std::mem::size_of::<f64>();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimHeader {
    pub name: String,
    pub len: usize,
}

/// JSON part of the file header. Coordinates follow it in binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayHeader {
    pub name: String,
    pub dims: Vec<DimHeader>,
    pub dtype: String,
}

/// Layout of one backing file. Holds no open descriptor; every operation
/// opens the file and releases it before returning.
#[derive(Debug, Clone)]
pub struct ArrayFile {
    path: PathBuf,
    name: String,
    axes: Vec<Arc<Axis>>,
    data_offset: u64,
}

impl ArrayFile {
    /// Write a zero-filled array over the full extent of `axes` and sync it.
    ///
    /// The first axis must be time. Zeros are streamed one time slab at a
    /// time so the full array is never resident.
    pub fn create_zeroed(path: &Path, name: &str, axes: Vec<Arc<Axis>>) -> Result<Self> {
        let header = encode_header(name, &axes)?;
        let data_offset = header.len() as u64;
        let layout = Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            axes,
            data_offset,
        };

        // File::create truncates an existing file of the same name
        let file = File::create(path).map_err(StorageError::init(path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header).map_err(StorageError::init(path))?;
        let zeros = vec![0u8; layout.slab_len() * VALUE_BYTES];
        for _ in 0..layout.nt() {
            writer.write_all(&zeros).map_err(StorageError::init(path))?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::Init {
                path: path.to_path_buf(),
                source: e.into_error(),
            })?;
        file.sync_all().map_err(StorageError::init(path))?;
        Ok(layout)
    }

    /// Parse the header of an existing file and check its length.
    ///
    /// Every size read from the file is checked against the file length
    /// before anything is allocated.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(StorageError::io(path))?;
        let file_len = file.metadata().map_err(StorageError::io(path))?.len();

        let mut prefix = [0u8; 16];
        file.read_exact(&mut prefix)
            .map_err(|_| StorageError::format(path, "file shorter than fixed prefix"))?;
        if prefix[..8] != MAGIC {
            return Err(StorageError::format(path, "bad magic"));
        }
        let version = read_u32(&prefix[8..12]);
        if version != FORMAT_VERSION {
            return Err(StorageError::format(
                path,
                format!("unsupported format version {}", version),
            ));
        }
        let header_len = u64::from(read_u32(&prefix[12..16]));
        let mut consumed = prefix.len() as u64 + header_len;
        if consumed > file_len {
            return Err(StorageError::format(
                path,
                format!("header of {} bytes runs past end of file", header_len),
            ));
        }

        let mut json = vec![0u8; header_len as usize];
        file.read_exact(&mut json)
            .map_err(|_| StorageError::format(path, "truncated header"))?;
        let header: ArrayHeader = serde_json::from_slice(&json)
            .map_err(|e| StorageError::format(path, format!("header: {}", e)))?;
        if header.dtype != DTYPE {
            return Err(StorageError::format(
                path,
                format!("unsupported dtype '{}'", header.dtype),
            ));
        }

        let mut axes = Vec::with_capacity(header.dims.len());
        for dim in &header.dims {
            let kind = AxisKind::from_name(&dim.name)
                .ok_or_else(|| StorageError::format(path, format!("unknown dim '{}'", dim.name)))?;
            let n_bytes = dim
                .len
                .checked_mul(VALUE_BYTES)
                .map(|n| n as u64)
                .filter(|&n| n <= file_len - consumed)
                .ok_or_else(|| {
                    let detail = format!(
                        "coordinates of dim '{}' (len {}) run past end of file",
                        dim.name, dim.len
                    );
                    StorageError::format(path, detail)
                })?;
            consumed += n_bytes;
            let mut raw = vec![0u8; n_bytes as usize];
            file.read_exact(&mut raw)
                .map_err(|_| StorageError::format(path, "truncated coordinates"))?;
            axes.push(Arc::new(Axis::new(kind, decode_f64(&raw))?));
        }
        if axes.first().map(|a| a.kind()) != Some(AxisKind::Time) {
            return Err(StorageError::format(path, "first dim must be time"));
        }

        let data_offset = consumed.div_ceil(8) * 8;
        let expected = axes
            .iter()
            .try_fold(VALUE_BYTES as u64, |bytes, a| bytes.checked_mul(a.len() as u64))
            .and_then(|bytes| bytes.checked_add(data_offset));
        if expected != Some(file_len) {
            return Err(StorageError::format(
                path,
                match expected {
                    Some(expected) => format!("expected {} bytes, found {}", expected, file_len),
                    None => "array size overflows".to_string(),
                },
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            name: header.name,
            data_offset,
            axes,
        })
    }

    /// Swap in equal axes, typically shared instances owned by a store.
    pub fn with_axes(mut self, axes: Vec<Arc<Axis>>) -> Result<Self> {
        let same = axes.len() == self.axes.len()
            && axes.iter().zip(&self.axes).all(|(a, b)| **a == **b);
        if !same {
            return Err(StorageError::format(&self.path, "axes differ from file"));
        }
        self.axes = axes;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn axes(&self) -> &[Arc<Axis>] {
        &self.axes
    }

    pub fn time_axis(&self) -> &Axis {
        &self.axes[0]
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.len()).collect()
    }

    pub fn nt(&self) -> usize {
        self.axes[0].len()
    }

    /// Number of values stored per time coordinate.
    pub fn slab_len(&self) -> usize {
        self.axes[1..].iter().map(|a| a.len()).product()
    }

    pub fn numel(&self) -> usize {
        self.nt() * self.slab_len()
    }

    fn slab_offset(&self, t_index: usize) -> u64 {
        self.data_offset + (t_index * self.slab_len() * VALUE_BYTES) as u64
    }

    /// Overwrite the slabs starting at `t_start` with `values` and sync.
    ///
    /// `values` is consumed in row-major order and must hold a whole number of
    /// slabs that fit inside the time extent.
    pub fn write_time_slabs<'a, I>(&self, t_start: usize, values: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let mut bytes = Vec::new();
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let slab_bytes = self.slab_len() * VALUE_BYTES;
        let slabs = bytes.len() / slab_bytes;
        if bytes.len() % slab_bytes != 0 || t_start + slabs > self.nt() {
            return Err(StorageError::ShapeMismatch {
                name: "time slab",
                expected: vec![self.nt().saturating_sub(t_start), self.slab_len()],
                found: vec![bytes.len() / VALUE_BYTES],
            });
        }

        let path = &self.path;
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(StorageError::io(path))?;
        file.seek(SeekFrom::Start(self.slab_offset(t_start)))
            .map_err(StorageError::io(path))?;
        file.write_all(&bytes).map_err(StorageError::io(path))?;
        file.sync_data().map_err(StorageError::io(path))?;
        Ok(())
    }

    /// Read the slabs for a range of time indices, row-major.
    pub fn read_time_slabs(&self, range: Range<usize>) -> Result<Vec<f64>> {
        if range.start > range.end || range.end > self.nt() {
            return Err(StorageError::format(
                &self.path,
                format!("time range {:?} outside 0..{}", range, self.nt()),
            ));
        }
        let path = &self.path;
        let mut file = File::open(path).map_err(StorageError::io(path))?;
        file.seek(SeekFrom::Start(self.slab_offset(range.start)))
            .map_err(StorageError::io(path))?;
        let mut raw = vec![0u8; range.len() * self.slab_len() * VALUE_BYTES];
        file.read_exact(&mut raw).map_err(StorageError::io(path))?;
        Ok(decode_f64(&raw))
    }

    /// Flush file contents and metadata to stable storage.
    pub fn sync(&self) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(StorageError::io(&self.path))?;
        file.sync_all().map_err(StorageError::io(&self.path))
    }
}

fn encode_header(name: &str, axes: &[Arc<Axis>]) -> Result<Vec<u8>> {
    let header = ArrayHeader {
        name: name.to_string(),
        dims: axes
            .iter()
            .map(|a| DimHeader {
                name: a.name().to_string(),
                len: a.len(),
            })
            .collect(),
        dtype: DTYPE.to_string(),
    };
    let json = serde_json::to_vec(&header).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut bytes = Vec::with_capacity(pad8(16 + json.len() + coords_bytes(axes)));
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(json.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&json);
    for axis in axes {
        for c in axis.coords() {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
    }
    bytes.resize(pad8(bytes.len()), 0);
    Ok(bytes)
}

fn coords_bytes(axes: &[Arc<Axis>]) -> usize {
    axes.iter().map(|a| a.len() * VALUE_BYTES).sum()
}

fn pad8(n: usize) -> usize {
    n.div_ceil(8) * 8
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn decode_f64(raw: &[u8]) -> Vec<f64> {
    raw.chunks_exact(VALUE_BYTES)
        .map(|chunk| {
            let mut buf = [0u8; VALUE_BYTES];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect()
}
