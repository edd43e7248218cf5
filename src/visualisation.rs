use ndarray::Ix2;
use plotters::prelude::*;
use std::path::Path;

use crate::labeled::LabeledArray;

pub struct FieldVisualiser {
    width: u32,
    height: u32,
    // Store as a boxed trait object
    gradient: Box<dyn colorgrad::Gradient>,
}

impl FieldVisualiser {
    pub fn new(width: u32, height: u32) -> Self {
        let gradient = Box::new(colorgrad::preset::rd_yl_bu());
        Self {
            width,
            height,
            gradient,
        }
    }

    /// Heatmap of a stored (time, space) field, coloured symmetrically about zero.
    pub fn plot_field(
        &self,
        field: &LabeledArray,
        output: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if field.data.ndim() != 2 {
            return Err(format!(
                "'{}' has {} dims, only (time, space) fields can be plotted",
                field.name,
                field.data.ndim()
            )
            .into());
        }
        let data = field.data.view().into_dimensionality::<Ix2>()?;
        let time = field.axes[0].coords();
        let space = field.axes[1].coords();
        let (nt, nx) = (time.len(), space.len());

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let root = BitMapBackend::new(output, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE)?;

        let max_abs = field.data.iter().map(|&v| v.abs()).fold(0.0_f64, f64::max);
        let min_val = -max_abs;
        let max_val = max_abs;

        let t_edges = cell_edges(time);
        let x_edges = cell_edges(space);
        let mut chart = ChartBuilder::on(&root)
            .caption(&field.name, ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(t_edges[0]..t_edges[nt], x_edges[0]..x_edges[nx])?;

        chart.configure_mesh().x_desc("time").y_desc("space").draw()?;

        chart.draw_series((0..nt).flat_map(|i| {
            let t_edges = &t_edges;
            let x_edges = &x_edges;
            let data = &data;
            (0..nx).map(move |k| {
                let color = self.value_to_color(data[[i, k]], min_val, max_val);
                Rectangle::new(
                    [(t_edges[i], x_edges[k]), (t_edges[i + 1], x_edges[k + 1])],
                    color.filled(),
                )
            })
        }))?;

        root.present()?;
        Ok(())
    }

    fn value_to_color(&self, value: f64, min_val: f64, max_val: f64) -> RGBColor {
        let normalized = if max_val > min_val {
            (value - min_val) / (max_val - min_val)
        } else {
            0.5
        };
        let normalized = normalized.clamp(0.0, 1.0);
        let color_rgba = self.gradient.at(normalized as f32).to_rgba8();
        RGBColor(color_rgba[0], color_rgba[1], color_rgba[2])
    }
}

// Boundaries between neighbouring coordinates, extrapolated at both ends
fn cell_edges(coords: &[f64]) -> Vec<f64> {
    let n = coords.len();
    if n == 1 {
        return vec![coords[0] - 0.5, coords[0] + 0.5];
    }
    let mut edges = Vec::with_capacity(n + 1);
    edges.push(coords[0] - 0.5 * (coords[1] - coords[0]));
    for w in coords.windows(2) {
        edges.push(0.5 * (w[0] + w[1]));
    }
    edges.push(coords[n - 1] + 0.5 * (coords[n - 1] - coords[n - 2]));
    edges
}
