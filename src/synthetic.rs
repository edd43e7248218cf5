//! Analytic stand-in for the Vlasov time stepper.
//!
//! Produces a damped travelling wave for the field, a sinusoidal driver and a
//! perturbed Maxwellian for the distribution function, and streams them into a
//! [`StorageManager`] batch by batch exactly as a real stepper would.

use ndarray::{Array1, Array2, Zip};
use rayon::prelude::*;
use std::f64::consts::PI;
use tracing::info;

use crate::batch::BatchBuffer;
use crate::config::Config;
use crate::error::Result;
use crate::storage::StorageManager;

/// Landau damping rate of the k = 0.3 electron plasma wave
pub const DEFAULT_DAMPING_RATE: f64 = 0.0126;

#[derive(Clone, Debug)]
pub struct DriveWave {
    pub a0: f64,    // Amplitude
    pub k0: f64,    // Wavenumber
    pub w0: f64,    // Angular frequency
    pub t_off: Option<f64>,
}

impl DriveWave {
    pub fn driver(&self, t: f64, x: f64) -> f64 {
        match self.t_off {
            Some(t_off) if t > t_off => 0.0,
            _ => self.a0 * (self.k0 * x - self.w0 * t).sin(),
        }
    }

    pub fn response(&self, t: f64, x: f64, gamma: f64) -> f64 {
        self.a0 * (-gamma * t).exp() * (self.k0 * x - self.w0 * t).cos()
    }
}

pub struct SyntheticRun {
    pub wave: DriveWave,
    pub damping_rate: f64,
    pub batch_size: usize,
    pub report_period: usize, // How many times to report progress
}

impl SyntheticRun {
    pub fn from_config(config: &Config) -> Self {
        Self {
            wave: DriveWave {
                a0: config.drive.a0,
                k0: config.grid.k0,
                w0: config.drive.w0,
                t_off: config.drive.t_off,
            },
            damping_rate: DEFAULT_DAMPING_RATE,
            batch_size: config.storage.batch_size,
            report_period: 10,
        }
    }

    /// Unit-density, unit-temperature Maxwellian on the velocity grid
    pub fn maxwellian(v: &[f64]) -> Array1<f64> {
        let norm = 1.0 / (2.0 * PI).sqrt();
        v.iter().map(|&v| norm * (-0.5 * v * v).exp()).collect()
    }

    /// Fill one step of field, driver and distribution function.
    pub fn fill_step(
        &self,
        t: f64,
        x: &[f64],
        f0: &Array1<f64>,
        e: &mut Array1<f64>,
        e_driver: &mut Array1<f64>,
        f: &mut Array2<f64>,
    ) {
        let updates: Vec<(f64, f64)> = x
            .par_iter()
            .map(|&xi| (self.wave.response(t, xi, self.damping_rate), self.wave.driver(t, xi)))
            .collect();
        for (i, (ei, di)) in updates.into_iter().enumerate() {
            e[i] = ei;
            e_driver[i] = di;
        }
        // f(x, v) = f0(v) * (1 + E(x))
        Zip::from(f.rows_mut())
            .and(&*e)
            .par_for_each(|mut row, &ei| row.assign(&(f0 * (1.0 + ei))));
    }

    /// Step through the whole time axis of `store`, writing every batch.
    ///
    /// Does not close the store.
    pub fn run(&self, store: &mut StorageManager) -> Result<()> {
        let axes = store.axes().clone();
        let (nt, nx, nv) = (axes.nt(), axes.nx(), axes.nv());
        let x = axes.space.coords();
        let f0 = Self::maxwellian(axes.velocity.coords());

        let mut buffer = BatchBuffer::new(self.batch_size.min(nt), nx, nv);
        let mut e = Array1::<f64>::zeros(nx);
        let mut e_driver = Array1::<f64>::zeros(nx);
        let mut f = Array2::<f64>::zeros((nx, nv));
        let report_every = (nt / self.report_period.max(1)).max(1);

        info!(nt, nx, nv, batch_size = buffer.capacity(), "starting synthetic run");
        for (step, &t) in axes.time.coords().iter().enumerate() {
            self.fill_step(t, x, &f0, &mut e, &mut e_driver, &mut f);
            buffer.push(t, e.view(), e_driver.view(), f.view())?;
            if buffer.is_full() {
                buffer.flush_into(store)?;
            }
            if (step + 1) % report_every == 0 {
                info!("Step {}/{} (t={:.4})", step + 1, nt, t);
            }
        }
        // Partial last batch
        buffer.flush_into(store)?;
        info!("Synthetic run complete");
        Ok(())
    }
}
