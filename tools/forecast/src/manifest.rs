//! Project manifest: where the layers live and how to run the forecast.
//!
//! ```json
//! {
//!   "name": "valley",
//!   "bounds": { "min_lon": 73.0, "max_lon": 73.5, "min_lat": 33.0, "max_lat": 33.5 },
//!   "start": { "year": 2014, "path": "lulc2014.tif" },
//!   "end":   { "year": 2018, "path": "lulc2018.tif" },
//!   "elevation": "dem.tif",
//!   "distance_to_roads": "roads.tif",
//!   "distance_to_drainage": "drainage.tif",
//!   "target_year": 2030,
//!   "params": { "num_trees": 50, "seed": 42 }
//! }
//! ```
//! Relative paths resolve against the manifest's directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use lulc_core::pipeline::{ForecastInputs, ForecastParams, Snapshot};
use lulc_core::scheme::ClassificationScheme;

use crate::rasters::{load_categorical, load_covariate, load_region};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Bounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotDef {
    pub year: i32,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_name")]
    pub name: String,
    /// Omitted → the built-in nine-class scheme.
    #[serde(default)]
    pub scheme: Option<ClassificationScheme>,
    /// Geographic bounds for TIFF layers (JSON layers carry their own).
    #[serde(default)]
    pub bounds: Option<Bounds>,
    pub start: SnapshotDef,
    pub end: SnapshotDef,
    pub elevation: PathBuf,
    pub distance_to_roads: PathBuf,
    pub distance_to_drainage: PathBuf,
    pub target_year: i32,
    /// Mask raster; non-zero cells form the area of interest.
    #[serde(default)]
    pub region: Option<PathBuf>,
    /// Per-cell area in m²; omitted → geodesic cell area.
    #[serde(default)]
    pub pixel_area: Option<PathBuf>,
    /// Class value treated as undefined in land-cover layers.
    #[serde(default)]
    pub class_nodata: Option<f64>,
    /// Sentinel treated as nodata in covariate layers.
    #[serde(default)]
    pub covariate_nodata: Option<f64>,
    #[serde(default)]
    pub params: ForecastParams,
    /// Directory the manifest was read from.
    #[serde(skip)]
    pub root: PathBuf,
}

fn default_name() -> String {
    "forecast".to_string()
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let shown = path.display();
        let text = fs::read_to_string(path).with_context(|| format!("Cannot read {shown}"))?;
        let mut manifest: Manifest =
            serde_json::from_str(&text).with_context(|| format!("Invalid manifest: {shown}"))?;
        manifest.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    /// Read every layer and bundle them for the pipeline.
    pub fn inputs(&self) -> Result<ForecastInputs> {
        let bounds = self.bounds.as_ref();
        let class = |p: &Path| load_categorical(&self.resolve(p), bounds, self.class_nodata);
        let covariate = |p: &Path| load_covariate(&self.resolve(p), bounds, self.covariate_nodata);

        let region = match &self.region {
            Some(p) => Some(load_region(&self.name, &self.resolve(p), bounds)?),
            None => None,
        };
        let pixel_area = match &self.pixel_area {
            Some(p) => Some(covariate(p)?),
            None => None,
        };

        Ok(ForecastInputs {
            scheme: self.scheme.clone().unwrap_or_default(),
            start: Snapshot { year: self.start.year, raster: class(&self.start.path)? },
            end: Snapshot { year: self.end.year, raster: class(&self.end.path)? },
            elevation: covariate(&self.elevation)?,
            distance_to_roads: covariate(&self.distance_to_roads)?,
            distance_to_drainage: covariate(&self.distance_to_drainage)?,
            target_year: self.target_year,
            region,
            pixel_area,
        })
    }
}
