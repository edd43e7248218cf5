use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::PathBuf;

use crate::axis::{Axis, AxisKind, RunAxes};

/// Phase-space grid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub nx: usize,
    pub nv: usize,
    #[serde(default = "default_k0")]
    pub k0: f64, // Fundamental wavenumber, box length is 2π/k0
    #[serde(default = "default_vmax")]
    pub vmax: f64, // Velocity grid spans [-vmax, vmax]
}

fn default_k0() -> f64 {
    0.3
}

fn default_vmax() -> f64 {
    6.0
}

impl GridConfig {
    fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.nv == 0 {
            return Err(anyhow!("Grid dimensions must be positive (nx={}, nv={})", self.nx, self.nv));
        }
        if self.k0 <= 0.0 || self.vmax <= 0.0 {
            return Err(anyhow!(
                "k0 and vmax must be positive (k0={}, vmax={})",
                self.k0,
                self.vmax
            ));
        }
        Ok(())
    }

    pub fn xmax(&self) -> f64 {
        2.0 * PI / self.k0
    }
}

/// Time axis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    pub nt: usize,
    pub tmax: f64,
}

impl TimeConfig {
    fn validate(&self) -> Result<()> {
        if self.nt < 2 {
            return Err(anyhow!("nt must be at least 2, got {}", self.nt));
        }
        if self.tmax <= 0.0 {
            return Err(anyhow!("tmax must be positive, got {}", self.tmax));
        }
        Ok(())
    }

    pub fn dt(&self) -> f64 {
        self.tmax / (self.nt - 1) as f64
    }
}

/// External driver parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(default = "default_a0")]
    pub a0: f64,
    #[serde(default = "default_w0")]
    pub w0: f64,
    #[serde(default)]
    pub t_off: Option<f64>, // Driver switches off after this time; always on if unset
}

fn default_a0() -> f64 {
    1e-2
}

fn default_w0() -> f64 {
    1.1598
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            a0: default_a0(),
            w0: default_w0(),
            t_off: None,
        }
    }
}

impl DriveConfig {
    fn validate(&self) -> Result<()> {
        if !self.a0.is_finite() || !self.w0.is_finite() {
            return Err(anyhow!("Driver a0 and w0 must be finite (a0={}, w0={})", self.a0, self.w0));
        }
        if let Some(t_off) = self.t_off {
            if t_off < 0.0 {
                return Err(anyhow!("Driver t_off must be non-negative, got {}", t_off));
            }
        }
        Ok(())
    }
}

/// Output location and batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_parameters_name")]
    pub parameters_name: String,
}

fn default_batch_size() -> usize {
    100
}

fn default_parameters_name() -> String {
    "parameters".to_string()
}

impl StorageConfig {
    fn validate(&self, nt: usize) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if self.batch_size > nt {
            eprintln!(
                "Warning: batch_size ({}) exceeds nt ({}), whole run will be a single batch",
                self.batch_size, nt
            );
        }
        if self.parameters_name.is_empty() {
            return Err(anyhow!("parameters_name must not be empty"));
        }
        Ok(())
    }
}

/// Rendering of stored fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualisationConfig {
    #[serde(default = "default_image_width")]
    pub image_width: u32,
    #[serde(default = "default_image_height")]
    pub image_height: u32,
}

fn default_image_width() -> u32 {
    1200
}

fn default_image_height() -> u32 {
    1000
}

impl Default for VisualisationConfig {
    fn default() -> Self {
        Self {
            image_width: default_image_width(),
            image_height: default_image_height(),
        }
    }
}

impl VisualisationConfig {
    fn validate(&self) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(anyhow!(
                "Image dimensions must be positive (width={}, height={})",
                self.image_width,
                self.image_height
            ));
        }
        Ok(())
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub grid: GridConfig,
    pub time: TimeConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub visualisation: VisualisationConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| anyhow!("Failed to parse TOML config: {}", e))?;

        // Validate before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.time.validate()?;
        self.drive.validate()?;
        self.storage.validate(self.time.nt)?;
        self.visualisation.validate()?;
        Ok(())
    }

    /// Build the run axes: cell-centred space and velocity, time including both ends
    pub fn axes(&self) -> Result<RunAxes> {
        let time = Axis::linspace(AxisKind::Time, 0.0, self.time.tmax, self.time.nt)?;
        let space = Axis::cell_centered(AxisKind::Space, 0.0, self.grid.xmax(), self.grid.nx)?;
        let velocity =
            Axis::cell_centered(AxisKind::Velocity, -self.grid.vmax, self.grid.vmax, self.grid.nv)?;
        Ok(RunAxes::new(time, space, velocity)?)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("=== Run Configuration ===");
        println!(
            "Grid: nx={} over [0, {:.4}], nv={} over [-{}, {}]",
            self.grid.nx,
            self.grid.xmax(),
            self.grid.nv,
            self.grid.vmax,
            self.grid.vmax
        );
        println!(
            "Time: nt={}, tmax={}, dt={:.6}",
            self.time.nt,
            self.time.tmax,
            self.time.dt()
        );
        println!(
            "Drive: a0={}, k0={}, w0={}",
            self.drive.a0, self.grid.k0, self.drive.w0
        );
        if let Some(t_off) = self.drive.t_off {
            println!("  Driver off after t={}", t_off);
        }
        let f_bytes = self.time.nt * self.grid.nx * self.grid.nv * 8;
        println!(
            "Storage: {} (batch_size={}, distribution function {:.1} MiB)",
            self.storage.base_dir.display(),
            self.storage.batch_size,
            f_bytes as f64 / (1024.0 * 1024.0)
        );
        println!("=========================");
    }
}
