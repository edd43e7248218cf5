use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use kinetic_store::array_file::ArrayFile;
use kinetic_store::config::Config;
use kinetic_store::synthetic::SyntheticRun;
use kinetic_store::visualisation::FieldVisualiser;
use kinetic_store::{LabeledArray, StorageManager};

#[derive(Parser, Debug)]
#[command(name = "kinetic-store")]
#[command(about = "Batched on-disk storage for kinetic plasma runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate the backing files and record the run parameters
    Init {
        /// TOML run configuration
        config: String,
    },
    /// Allocate storage and fill it from the analytic wave model
    Demo {
        /// TOML run configuration
        config: String,
    },
    /// Print the dims, coordinates and value range of a stored array
    Inspect {
        file: PathBuf,
    },
    /// Render a stored (time, space) field as a heatmap
    Plot {
        file: PathBuf,
        #[arg(long, default_value = "field.png")]
        out: PathBuf,
        #[arg(long, default_value_t = 1200)]
        width: u32,
        #[arg(long, default_value_t = 1000)]
        height: u32,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kinetic_store=info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init { config } => {
            let config = Config::from_file(&config)?;
            config.print_summary();
            let mut store = open_run(&config)?;
            store.close()?;
        }
        Command::Demo { config } => {
            let config = Config::from_file(&config)?;
            config.print_summary();
            let mut store = open_run(&config)?;
            SyntheticRun::from_config(&config).run(&mut store)?;
            store.close()?;
            info!("Arrays saved to {}", config.storage.base_dir.display());

            let field = LabeledArray::read(store.electric_field_path())?;
            let out = config.storage.base_dir.join("electric_field.png");
            let visualiser = FieldVisualiser::new(
                config.visualisation.image_width,
                config.visualisation.image_height,
            );
            if let Err(e) = visualiser.plot_field(&field, &out) {
                warn!("Failed to plot electric field: {}", e);
            }
        }
        Command::Inspect { file } => inspect(&file)?,
        Command::Plot {
            file,
            out,
            width,
            height,
        } => {
            let field = LabeledArray::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            FieldVisualiser::new(width, height)
                .plot_field(&field, &out)
                .map_err(|e| anyhow!("Failed to plot {}: {}", file.display(), e))?;
            info!("Saved plot: {}", out.display());
        }
    }
    Ok(())
}

fn open_run(config: &Config) -> Result<StorageManager> {
    let store = StorageManager::create(&config.storage.base_dir, config.axes()?)?;
    let path = store.write_parameters_to_file(config, &config.storage.parameters_name)?;
    info!("Parameters written to {}", path.display());
    Ok(store)
}

fn inspect(path: &Path) -> Result<()> {
    let file = ArrayFile::open(path)?;
    println!("=== {} ===", file.name());
    for axis in file.axes() {
        let coords = axis.coords();
        println!(
            "  {:<9} len={:<6} [{}, {}]",
            axis.name(),
            axis.len(),
            coords[0],
            coords[coords.len() - 1]
        );
    }

    // Scan slab by slab so large distribution functions stay out of memory
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut last_nonzero = None;
    for t in 0..file.nt() {
        let slab = file.read_time_slabs(t..t + 1)?;
        for &v in &slab {
            min = min.min(v);
            max = max.max(v);
        }
        if slab.iter().any(|&v| v != 0.0) {
            last_nonzero = Some(t);
        }
    }
    println!("  values in [{}, {}]", min, max);
    match last_nonzero {
        Some(t) => println!(
            "  last non-zero time step: {} (t={})",
            t,
            file.time_axis().coords()[t]
        ),
        None => println!("  all values are zero"),
    }
    Ok(())
}
