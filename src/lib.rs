//! Coordinate-addressed, batched on-disk storage for the field and
//! distribution-function histories of a kinetic plasma run.
//!
//! A run allocates three zero-filled backing files sized for every time step
//! ([`StorageManager::create`]), streams batches of consecutive steps into them
//! ([`StorageManager::write_batch`]) and finalises them once
//! ([`StorageManager::close`]). Each file embeds its own coordinates and can be
//! read back with [`LabeledArray::read`].

pub mod array_file;
pub mod axis;
pub mod batch;
pub mod config;
pub mod error;
pub mod labeled;
pub mod params;
pub mod storage;
pub mod synthetic;
pub mod visualisation;

pub use axis::{Axis, AxisKind, RunAxes};
pub use batch::BatchBuffer;
pub use error::{Result, StorageError};
pub use labeled::LabeledArray;
pub use storage::StorageManager;
