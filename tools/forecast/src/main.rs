//! Forecast tool: reads a project manifest, runs the land-cover forecast
//! pipeline and writes the dictionary, accuracy report, predicted map and
//! area table.
//!
//! Outputs (under `--output`):
//!   transitions.json  dictionary + observed transition counts
//!   accuracy.json     confusion matrix, accuracy, kappa, per-class accuracy
//!   prediction.json   predicted categorical raster for the target year
//!   areas.json        area records per (year, class)
//!   areas.csv         pivoted area table, one row per year
mod manifest;
mod rasters;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lulc_core::pipeline::{ForecastPipeline, ForecastResult};
use lulc_core::transition::{TransitionCount, TransitionEntry};

use crate::manifest::Manifest;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "forecast",
    about = "Project future land cover from two snapshots and static covariates"
)]
struct Args {
    /// Project manifest (JSON)
    manifest: PathBuf,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Override the manifest's seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the manifest's tree count
    #[arg(long)]
    trees: Option<usize>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ── Output files ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TransitionsOut<'a> {
    multiplier: u32,
    labels: BTreeMap<String, String>,
    entries: Vec<&'a TransitionEntry>,
    observed: &'a [TransitionCount],
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).with_context(|| format!("Write failed: {}", path.display()))?;
    info!(path = %path.display(), "written");
    Ok(())
}

fn write_outputs(dir: &Path, result: &ForecastResult) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    write_json(
        dir,
        "transitions.json",
        &TransitionsOut {
            multiplier: result.dictionary.multiplier,
            labels: result.dictionary.to_labels(),
            entries: result.dictionary.entries().collect(),
            observed: &result.transition_summary,
        },
    )?;
    write_json(dir, "accuracy.json", &result.accuracy)?;
    write_json(dir, "prediction.json", &result.prediction.raster)?;
    write_json(dir, "areas.json", &result.areas)?;

    let csv_path = dir.join("areas.csv");
    fs::write(&csv_path, result.area_table.to_csv())
        .with_context(|| format!("Write failed: {}", csv_path.display()))?;
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn run(args: &Args) -> Result<ForecastResult> {
    let mut manifest = Manifest::load(&args.manifest)?;
    if let Some(seed) = args.seed {
        manifest.params.seed = Some(seed);
    }
    if let Some(trees) = args.trees {
        manifest.params.num_trees = trees;
    }
    info!(project = %manifest.name, target_year = manifest.target_year, "loading layers");
    let inputs = manifest.inputs()?;

    let result = ForecastPipeline::new(&manifest.params)
        .run(&inputs)
        .with_context(|| format!("Forecast failed for {}", manifest.name))?;
    write_outputs(&args.output, &result)?;
    Ok(result)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = run(&args)?;
    eprintln!("{}", result.accuracy.matrix);
    info!(
        accuracy = result.accuracy.accuracy,
        kappa = result.accuracy.kappa,
        train = result.train_size,
        test = result.test_size,
        "done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lulc_core::{CategoricalRaster, CovariateRaster, GridExtent};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lulc-forecast-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn put<T: Serialize>(dir: &Path, name: &str, value: &T) {
        fs::write(dir.join(name), serde_json::to_string(value).unwrap()).unwrap();
    }

    #[test]
    fn manifest_run_writes_every_output() {
        let dir = scratch("run");
        let extent = GridExtent::new(12, 12, 73.0, 73.0032, 33.0, 33.0032);
        let start = CategoricalRaster::filled(extent, Some(10));
        let mut end = start.clone();
        for c in 0..12 {
            for r in 6..12 {
                end.set(r, c, Some(50));
            }
        }
        put(&dir, "t0.json", &start);
        put(&dir, "t1.json", &end);
        put(&dir, "flat.json", &CovariateRaster::filled(extent, 100.0));
        fs::write(
            dir.join("project.json"),
            r#"{
                "name": "test",
                "start": { "year": 2014, "path": "t0.json" },
                "end": { "year": 2018, "path": "t1.json" },
                "elevation": "flat.json",
                "distance_to_roads": "flat.json",
                "distance_to_drainage": "flat.json",
                "target_year": 2030,
                "params": { "num_points": 50 }
            }"#,
        )
        .unwrap();

        let args = Args {
            manifest: dir.join("project.json"),
            output: dir.join("out"),
            seed: Some(5),
            trees: Some(5),
            verbose: false,
        };
        let result = run(&args).unwrap();
        assert_eq!(result.target_year, 2030);
        let outputs =
            ["transitions.json", "accuracy.json", "prediction.json", "areas.json", "areas.csv"];
        for name in outputs {
            assert!(args.output.join(name).exists(), "{name} missing");
        }
        let csv = fs::read_to_string(args.output.join("areas.csv")).unwrap();
        assert!(csv.starts_with("year,Tree cover,Shrubland"));
        assert_eq!(csv.lines().count(), 4);

        let text = fs::read_to_string(args.output.join("prediction.json")).unwrap();
        let prediction: CategoricalRaster = serde_json::from_str(&text).unwrap();
        assert_eq!(prediction.extent, extent);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_layer_names_the_file() {
        let dir = scratch("missing");
        fs::write(
            dir.join("project.json"),
            r#"{
                "start": { "year": 2014, "path": "nope.json" },
                "end": { "year": 2018, "path": "nope.json" },
                "elevation": "nope.json",
                "distance_to_roads": "nope.json",
                "distance_to_drainage": "nope.json",
                "target_year": 2030
            }"#,
        )
        .unwrap();
        let args = Args {
            manifest: dir.join("project.json"),
            output: dir.join("out"),
            seed: None,
            trees: None,
            verbose: false,
        };
        let err = run(&args).unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
        let _ = fs::remove_dir_all(&dir);
    }
}
