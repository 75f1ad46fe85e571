//! In-memory grids shared by every stage.
//!
//! Storage is row-major with row 0 at `min_lat` (south → north). Categorical
//! cells are `Option<T>`; `None` marks a masked or undefined location.
//! Covariates are f32 with NaN as nodata. Coordinate math uses f64.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LulcError, Result};

/// Mean Earth radius in metres (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Shape and geographic bounds of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridExtent {
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GridExtent {
    pub fn new(
        width: usize,
        height: usize,
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
    ) -> Self {
        Self { width, height, min_lon, max_lon, min_lat, max_lat }
    }

    /// Unit-degree extent anchored at the origin; handy for synthetic grids.
    pub fn unit(width: usize, height: usize) -> Self {
        Self::new(width, height, 0.0, 1.0, 0.0, 1.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Cell size in degrees as (d_lon, d_lat).
    pub fn cell_size_deg(&self) -> (f64, f64) {
        (
            (self.max_lon - self.min_lon) / self.width as f64,
            (self.max_lat - self.min_lat) / self.height as f64,
        )
    }

    /// Area of one cell in `row` on a spherical Earth, in m².
    pub fn cell_area_m2(&self, row: usize) -> f64 {
        let (d_lon, d_lat) = self.cell_size_deg();
        let lat0 = self.min_lat + row as f64 * d_lat;
        let lat1 = lat0 + d_lat;
        EARTH_RADIUS_M * EARTH_RADIUS_M
            * d_lon.to_radians()
            * (lat1.to_radians().sin() - lat0.to_radians().sin()).abs()
    }

    /// Approximate cell edge length in metres, measured at the grid centre.
    pub fn nominal_resolution_m(&self) -> f64 {
        let (d_lon, d_lat) = self.cell_size_deg();
        let mid_lat = 0.5 * (self.min_lat + self.max_lat);
        let dx = EARTH_RADIUS_M * d_lon.to_radians() * mid_lat.to_radians().cos();
        let dy = EARTH_RADIUS_M * d_lat.to_radians();
        (dx * dy).abs().sqrt()
    }

    pub fn same_grid(&self, other: &Self) -> bool {
        const TOL: f64 = 1e-9;
        self.width == other.width
            && self.height == other.height
            && (self.min_lon - other.min_lon).abs() < TOL
            && (self.max_lon - other.max_lon).abs() < TOL
            && (self.min_lat - other.min_lat).abs() < TOL
            && (self.max_lat - other.max_lat).abs() < TOL
    }

    /// Fail with `SpatialMismatch` unless `other` is the same grid.
    pub fn ensure_aligned(&self, layer: &str, other: &Self) -> Result<()> {
        if self.same_grid(other) {
            Ok(())
        } else {
            Err(LulcError::SpatialMismatch {
                layer: layer.to_string(),
                expected: self.to_string(),
                found: other.to_string(),
            })
        }
    }
}

impl fmt::Display for GridExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} [{}..{}, {}..{}]",
            self.width, self.height, self.min_lon, self.max_lon, self.min_lat, self.max_lat
        )
    }
}

/// Grid of discrete values where any location may be undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster<T> {
    pub extent: GridExtent,
    pub data: Vec<Option<T>>,
}

/// Land-cover class codes per location.
pub type CategoricalRaster = Raster<u16>;

/// Transition codes per location.
pub type TransitionRaster = Raster<u32>;

impl<T: Copy> Raster<T> {
    pub fn filled(extent: GridExtent, fill: Option<T>) -> Self {
        Self { data: vec![fill; extent.len()], extent }
    }

    /// Raster with every location defined.
    pub fn from_values(extent: GridExtent, values: Vec<T>) -> Result<Self> {
        Self::from_cells(extent, values.into_iter().map(Some).collect())
    }

    pub fn from_cells(extent: GridExtent, data: Vec<Option<T>>) -> Result<Self> {
        if data.len() != extent.len() {
            return Err(LulcError::InvalidParameter {
                name: "data",
                reason: format!("{} cells supplied for grid {extent}", data.len()),
            });
        }
        Ok(Self { extent, data })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.data[self.extent.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: Option<T>) {
        let i = self.extent.index(row, col);
        self.data[i] = val;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn defined_count(&self) -> usize {
        self.data.iter().filter(|c| c.is_some()).count()
    }

    /// Copy with every location outside `region` undefined.
    pub fn clip(&self, region: &Region) -> Result<Self> {
        self.extent.ensure_aligned("region", &region.extent)?;
        let data = self
            .data
            .iter()
            .zip(&region.mask)
            .map(|(&cell, &inside)| if inside { cell } else { None })
            .collect();
        Ok(Self { extent: self.extent, data })
    }
}

impl<T: Copy + Ord> Raster<T> {
    /// Defined-cell count per distinct value, ordered by value.
    pub fn counts(&self) -> Vec<(T, usize)> {
        let mut tally = std::collections::BTreeMap::new();
        for v in self.data.iter().flatten() {
            *tally.entry(*v).or_insert(0usize) += 1;
        }
        tally.into_iter().collect()
    }
}

/// Continuous covariate surface (elevation, distances). NaN = nodata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateRaster {
    pub extent: GridExtent,
    pub data: Vec<f32>,
}

impl CovariateRaster {
    pub fn filled(extent: GridExtent, fill: f32) -> Self {
        Self { data: vec![fill; extent.len()], extent }
    }

    pub fn from_values(extent: GridExtent, data: Vec<f32>) -> Result<Self> {
        if data.len() != extent.len() {
            return Err(LulcError::InvalidParameter {
                name: "data",
                reason: format!("{} cells supplied for grid {extent}", data.len()),
            });
        }
        Ok(Self { extent, data })
    }

    /// Value at flat index `i`, `None` for nodata.
    #[inline]
    pub fn value(&self, i: usize) -> Option<f32> {
        let v = self.data[i];
        (!v.is_nan()).then_some(v)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[self.extent.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        let i = self.extent.index(row, col);
        self.data[i] = val;
    }

    pub fn clip(&self, region: &Region) -> Result<Self> {
        self.extent.ensure_aligned("region", &region.extent)?;
        let data = self
            .data
            .iter()
            .zip(&region.mask)
            .map(|(&v, &inside)| if inside { v } else { f32::NAN })
            .collect();
        Ok(Self { extent: self.extent, data })
    }

    pub fn min_value(&self) -> f32 {
        self.data.iter().cloned().filter(|v| !v.is_nan()).fold(f32::INFINITY, f32::min)
    }

    pub fn max_value(&self) -> f32 {
        self.data.iter().cloned().filter(|v| !v.is_nan()).fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Area of interest as a cell mask on a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub extent: GridExtent,
    pub mask: Vec<bool>,
}

impl Region {
    /// Region covering the whole grid.
    pub fn full(name: impl Into<String>, extent: GridExtent) -> Self {
        Self { name: name.into(), mask: vec![true; extent.len()], extent }
    }

    pub fn from_mask(name: impl Into<String>, extent: GridExtent, mask: Vec<bool>) -> Result<Self> {
        if mask.len() != extent.len() {
            return Err(LulcError::InvalidParameter {
                name: "mask",
                reason: format!("{} cells supplied for grid {extent}", mask.len()),
            });
        }
        Ok(Self { name: name.into(), extent, mask })
    }

    /// Region made of the defined locations of `raster`.
    pub fn from_defined<T: Copy>(name: impl Into<String>, raster: &Raster<T>) -> Self {
        Self {
            name: name.into(),
            extent: raster.extent,
            mask: raster.data.iter().map(Option::is_some).collect(),
        }
    }

    #[inline]
    pub fn contains(&self, i: usize) -> bool {
        self.mask[i]
    }

    pub fn cell_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn global_cell_areas_sum_to_sphere() {
        let extent = GridExtent::new(36, 18, -180.0, 180.0, -90.0, 90.0);
        let total: f64 =
            (0..extent.height).map(|r| extent.cell_area_m2(r) * extent.width as f64).sum();
        let sphere = 4.0 * std::f64::consts::PI * EARTH_RADIUS_M * EARTH_RADIUS_M;
        assert_relative_eq!(total, sphere, max_relative = 1e-9);
    }

    #[test]
    fn equatorial_cell_wider_than_polar() {
        let extent = GridExtent::new(4, 180, 0.0, 4.0, -90.0, 90.0);
        assert!(extent.cell_area_m2(90) > extent.cell_area_m2(179) * 10.0);
    }

    #[test]
    fn misaligned_grids_fail() {
        let a = GridExtent::unit(4, 4);
        let b = GridExtent::unit(4, 5);
        let err = a.ensure_aligned("elevation", &b).unwrap_err();
        assert!(
            matches!(err, LulcError::SpatialMismatch { ref layer, .. } if layer == "elevation")
        );
        assert!(a.ensure_aligned("same", &GridExtent::unit(4, 4)).is_ok());
    }

    #[test]
    fn clip_undefines_outside_cells() {
        let extent = GridExtent::unit(2, 2);
        let raster = CategoricalRaster::from_values(extent, vec![10, 20, 30, 40]).unwrap();
        let region = Region::from_mask("roi", extent, vec![true, false, false, true]).unwrap();
        let clipped = raster.clip(&region).unwrap();
        assert_eq!(clipped.data, vec![Some(10), None, None, Some(40)]);

        let cov = CovariateRaster::filled(extent, 5.0).clip(&region).unwrap();
        assert_eq!(cov.value(0), Some(5.0));
        assert_eq!(cov.value(1), None);
    }

    #[test]
    fn counts_ignore_undefined() {
        let raster = CategoricalRaster::from_cells(
            GridExtent::unit(2, 2),
            vec![Some(20), Some(10), None, Some(20)],
        )
        .unwrap();
        assert_eq!(raster.counts(), vec![(10, 1), (20, 2)]);
        assert_eq!(raster.defined_count(), 3);
    }

    #[test]
    fn wrong_cell_count_rejected() {
        assert!(CovariateRaster::from_values(GridExtent::unit(2, 2), vec![0.0; 3]).is_err());
    }
}
