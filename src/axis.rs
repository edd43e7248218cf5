use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{Result, StorageError};

/// Which physical coordinate an axis carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Time,
    Space,
    Velocity,
}

impl AxisKind {
    pub fn name(self) -> &'static str {
        match self {
            AxisKind::Time => "time",
            AxisKind::Space => "space",
            AxisKind::Velocity => "velocity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "time" => Some(AxisKind::Time),
            "space" => Some(AxisKind::Space),
            "velocity" => Some(AxisKind::Velocity),
            _ => None,
        }
    }
}

/// Immutable, strictly increasing coordinate vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    kind: AxisKind,
    coords: Vec<f64>,
}

impl Axis {
    pub fn new(kind: AxisKind, coords: Vec<f64>) -> Result<Self> {
        let invalid = |detail: String| StorageError::InvalidAxis {
            axis: kind.name(),
            detail,
        };
        if coords.is_empty() {
            return Err(invalid("no coordinates".to_string()));
        }
        if let Some(i) = coords.iter().position(|c| !c.is_finite()) {
            return Err(invalid(format!("coordinate {} is {}", i, coords[i])));
        }
        // Binary search below relies on this
        if let Some(i) = coords.windows(2).position(|w| w[1] <= w[0]) {
            return Err(invalid(format!(
                "coordinate {} ({}) does not exceed coordinate {} ({})",
                i + 1,
                coords[i + 1],
                i,
                coords[i]
            )));
        }
        Ok(Self { kind, coords })
    }

    /// `n` evenly spaced points from `start` to `stop`, both included.
    pub fn linspace(kind: AxisKind, start: f64, stop: f64, n: usize) -> Result<Self> {
        let coords = match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (stop - start) / (n - 1) as f64;
                (0..n).map(|i| start + step * i as f64).collect()
            }
        };
        Self::new(kind, coords)
    }

    /// Centres of `n` equal cells spanning `[min, max]`.
    pub fn cell_centered(kind: AxisKind, min: f64, max: f64, n: usize) -> Result<Self> {
        let width = (max - min) / n as f64;
        let coords = (0..n).map(|i| min + width * (i as f64 + 0.5)).collect();
        Self::new(kind, coords)
    }

    pub fn kind(&self) -> AxisKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn value(&self, index: usize) -> Option<f64> {
        self.coords.get(index).copied()
    }

    /// Ordinal position of an exact coordinate value; `-0.0` matches `0.0`.
    pub fn position(&self, value: f64) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }
        // Both sides are finite, so the comparison is total
        self.coords
            .binary_search_by(|c| c.partial_cmp(&value).unwrap_or(Ordering::Less))
            .ok()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.position(value).is_some()
    }

    /// Index range covered by `values`, which must be adjacent coordinates in order.
    pub fn contiguous_span(&self, values: &[f64]) -> Result<Range<usize>> {
        let first = *values.first().ok_or_else(|| StorageError::InvalidAxis {
            axis: self.name(),
            detail: "empty coordinate selection".to_string(),
        })?;
        let start = self.locate(first)?;
        let mut previous = start;
        for &value in &values[1..] {
            let found = self.locate(value)?;
            if found != previous + 1 {
                return Err(StorageError::NonContiguousRange { previous, found });
            }
            previous = found;
        }
        Ok(start..previous + 1)
    }

    fn locate(&self, value: f64) -> Result<usize> {
        self.position(value)
            .ok_or(StorageError::CoordinateMismatch {
                axis: self.name(),
                value,
            })
    }
}

/// The three axes of a run, shared by every stored array.
#[derive(Debug, Clone)]
pub struct RunAxes {
    pub time: Arc<Axis>,
    pub space: Arc<Axis>,
    pub velocity: Arc<Axis>,
}

impl RunAxes {
    pub fn new(time: Axis, space: Axis, velocity: Axis) -> Result<Self> {
        for (axis, expected) in [
            (&time, AxisKind::Time),
            (&space, AxisKind::Space),
            (&velocity, AxisKind::Velocity),
        ] {
            if axis.kind() != expected {
                return Err(StorageError::InvalidAxis {
                    axis: expected.name(),
                    detail: format!("got a '{}' axis", axis.name()),
                });
            }
        }
        Ok(Self {
            time: Arc::new(time),
            space: Arc::new(space),
            velocity: Arc::new(velocity),
        })
    }

    pub fn nt(&self) -> usize {
        self.time.len()
    }

    pub fn nx(&self) -> usize {
        self.space.len()
    }

    pub fn nv(&self) -> usize {
        self.velocity.len()
    }
}
