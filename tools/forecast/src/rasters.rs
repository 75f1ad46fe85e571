//! Raster loading: JSON grids written by this workspace, or single-band GeoTIFF.
//!
//! TIFF storage order is row 0 = north; grids here are row 0 = `min_lat`.
//! Rows are reversed on load.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use tiff::decoder::{Decoder, DecodingResult};

use lulc_core::{CategoricalRaster, CovariateRaster, GridExtent, Region};

use crate::manifest::Bounds;

/// Decoded single-band image: values in storage order, north row first.
pub struct Band {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f64>,
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

pub fn read_tiff(path: &Path) -> Result<Band> {
    let shown = path.display();
    let bytes = fs::read(path).with_context(|| format!("Cannot read {shown}"))?;
    let mut decoder =
        Decoder::new(Cursor::new(bytes)).with_context(|| format!("Not a valid TIFF: {shown}"))?;
    let (w, h) = decoder.dimensions().with_context(|| format!("Dimensions error: {shown}"))?;
    let image = decoder.read_image().with_context(|| format!("read_image failed: {shown}"))?;

    let values: Vec<f64> = match image {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => bail!("Unsupported pixel type in {}", path.display()),
    };
    let (width, height) = (w as usize, h as usize);
    if values.len() != width * height {
        bail!(
            "{} holds {} samples for {width}x{height}; only single-band images are supported",
            path.display(),
            values.len()
        );
    }
    Ok(Band { width, height, values })
}

impl Band {
    pub fn extent(&self, bounds: &Bounds) -> GridExtent {
        let Bounds { min_lon, max_lon, min_lat, max_lat } = *bounds;
        GridExtent::new(self.width, self.height, min_lon, max_lon, min_lat, max_lat)
    }

    /// Values reordered south row first.
    pub fn south_up(&self) -> Vec<f64> {
        self.values.chunks(self.width.max(1)).rev().flatten().copied().collect()
    }

    /// Class codes; `nodata`, negative and fractional samples are undefined.
    pub fn to_categorical(
        &self,
        bounds: &Bounds,
        nodata: Option<f64>,
    ) -> Result<CategoricalRaster> {
        let cells = self
            .south_up()
            .into_iter()
            .map(|v| {
                let valid = v.is_finite()
                    && Some(v) != nodata
                    && v >= 0.0
                    && v.fract() == 0.0
                    && v <= f64::from(u16::MAX);
                valid.then_some(v as u16)
            })
            .collect();
        Ok(CategoricalRaster::from_cells(self.extent(bounds), cells)?)
    }

    /// Covariate surface; `nodata` becomes NaN.
    pub fn to_covariate(&self, bounds: &Bounds, nodata: Option<f64>) -> Result<CovariateRaster> {
        let data = self
            .south_up()
            .into_iter()
            .map(|v| if Some(v) == nodata { f32::NAN } else { v as f32 })
            .collect();
        Ok(CovariateRaster::from_values(self.extent(bounds), data)?)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid {what}: {}", path.display()))
}

fn require_bounds<'a>(path: &Path, bounds: Option<&'a Bounds>) -> Result<&'a Bounds> {
    bounds.with_context(|| format!("`bounds` is required to place {}", path.display()))
}

pub fn load_categorical(
    path: &Path,
    bounds: Option<&Bounds>,
    nodata: Option<f64>,
) -> Result<CategoricalRaster> {
    if is_json(path) {
        return read_json(path, "categorical raster");
    }
    read_tiff(path)?.to_categorical(require_bounds(path, bounds)?, nodata)
}

pub fn load_covariate(
    path: &Path,
    bounds: Option<&Bounds>,
    nodata: Option<f64>,
) -> Result<CovariateRaster> {
    if is_json(path) {
        return read_json(path, "covariate raster");
    }
    read_tiff(path)?.to_covariate(require_bounds(path, bounds)?, nodata)
}

/// Region from a mask raster: every defined, non-zero cell is inside.
pub fn load_region(name: &str, path: &Path, bounds: Option<&Bounds>) -> Result<Region> {
    let mask = load_categorical(path, bounds, None)?;
    let inside = mask.data.iter().map(|c| c.is_some_and(|v| v != 0)).collect();
    Ok(Region::from_mask(name, mask.extent, inside)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds { min_lon: 0.0, max_lon: 2.0, min_lat: 0.0, max_lat: 2.0 }
    }

    #[test]
    fn rows_are_flipped_south_up() {
        // Storage: north row [1, 2], south row [3, 4].
        let band = Band { width: 2, height: 2, values: vec![1.0, 2.0, 3.0, 4.0] };
        assert_eq!(band.south_up(), vec![3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn categorical_nodata_and_fractions_are_undefined() {
        let band = Band { width: 2, height: 2, values: vec![10.0, 0.0, 20.5, -1.0] };
        let raster = band.to_categorical(&bounds(), Some(0.0)).unwrap();
        assert_eq!(raster.data, vec![None, None, Some(10), None]);
    }

    #[test]
    fn covariate_nodata_becomes_nan() {
        let band = Band { width: 2, height: 1, values: vec![-9999.0, 12.5] };
        let raster = band.to_covariate(&bounds(), Some(-9999.0)).unwrap();
        assert_eq!(raster.value(0), None);
        assert_eq!(raster.value(1), Some(12.5));
    }

    #[test]
    fn tiff_needs_bounds() {
        let err = load_categorical(Path::new("lulc2014.tif"), None, None).unwrap_err();
        assert!(err.to_string().contains("bounds"));
    }
}
