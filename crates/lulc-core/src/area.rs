//! Per-class area by time step, flattened into a tidy table for charting.
//!
//! The zonal engine sums per-cell area grouped by class code; this module
//! maps codes back to scheme labels and emits one `AreaRecord` per
//! `(year, class)`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LulcError, Result};
use crate::raster::{CategoricalRaster, CovariateRaster, Region};
use crate::scheme::ClassificationScheme;

/// Square metres per hectare.
pub const M2_PER_HECTARE: f64 = 10_000.0;

/// How a raw class code found in a raster is mapped back to a scheme index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexRecovery {
    /// `code / 10 - 1`, truncated and clamped to `[0, size - 1]`. Only
    /// meaningful for schemes whose codes are exactly `10, 20, .., 10 * size`;
    /// anything else is silently attributed to a neighbouring class.
    DecadeArithmetic,
    /// Direct scheme lookup; codes not in the scheme are attributed to the
    /// last class. Lossy: such area is reported under the wrong label.
    #[default]
    LookupOrClampLast,
    /// Direct scheme lookup; unknown codes fail with `UnknownClassCode`.
    Strict,
}

impl IndexRecovery {
    pub fn recover(self, scheme: &ClassificationScheme, code: u16) -> Result<usize> {
        let last = scheme.size() - 1;
        match self {
            IndexRecovery::DecadeArithmetic => {
                let raw = (f64::from(code) / 10.0 - 1.0).trunc();
                Ok(raw.clamp(0.0, last as f64) as usize)
            }
            IndexRecovery::LookupOrClampLast => Ok(scheme.index_of(code).unwrap_or_else(|_| {
                let label = &scheme.classes()[last].name;
                warn!(code, label = %label, "unregistered class code clamped to last class");
                last
            })),
            IndexRecovery::Strict => scheme.index_of(code),
        }
    }
}

/// One row of the area time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    pub year: i32,
    pub class_code: u16,
    pub class_label: String,
    pub area_hectares: f64,
}

/// Area of each cell in m².
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaSurface {
    /// Spherical-Earth cell area derived from the raster's extent.
    #[default]
    Geodesic,
    /// Externally supplied per-cell area in m².
    PerCell(CovariateRaster),
}

impl AreaSurface {
    fn cell_area(&self, raster: &CategoricalRaster, i: usize) -> f64 {
        match self {
            AreaSurface::Geodesic => raster.extent.cell_area_m2(i / raster.extent.width),
            AreaSurface::PerCell(surface) => surface.value(i).map_or(0.0, f64::from),
        }
    }
}

/// Options forwarded to the zonal engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonalRequest {
    pub region: Option<Region>,
    /// Accept an approximate answer instead of failing above `max_pixels`.
    pub best_effort: bool,
    pub max_pixels: u64,
}

impl Default for ZonalRequest {
    fn default() -> Self {
        Self { region: None, best_effort: true, max_pixels: 1_000_000_000 }
    }
}

/// External capability: area summed per class code, in m², ascending by code.
pub trait ZonalStatistics {
    fn grouped_area(
        &self,
        raster: &CategoricalRaster,
        surface: &AreaSurface,
        request: &ZonalRequest,
    ) -> Result<Vec<(u16, f64)>>;
}

/// In-memory zonal engine. In best-effort mode, inputs over `max_pixels`
/// are reduced to every `k`-th row and column. Each kept cell stands for
/// the part of its `k`×`k` block inside the grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridZonalStats;

impl ZonalStatistics for GridZonalStats {
    fn grouped_area(
        &self,
        raster: &CategoricalRaster,
        surface: &AreaSurface,
        request: &ZonalRequest,
    ) -> Result<Vec<(u16, f64)>> {
        if let AreaSurface::PerCell(s) = surface {
            raster.extent.ensure_aligned("pixel area", &s.extent)?;
        }
        if let Some(region) = &request.region {
            raster.extent.ensure_aligned("region", &region.extent)?;
        }
        let inside = |i: usize| request.region.as_ref().map_or(true, |r| r.contains(i));
        let pixels = request.region.as_ref().map_or(raster.len(), Region::cell_count) as u64;

        let mut stride = 1usize;
        if pixels > request.max_pixels {
            if !request.best_effort {
                return Err(LulcError::collaborator(
                    "zonal statistics",
                    format!("{pixels} pixels exceed the limit of {}", request.max_pixels),
                ));
            }
            stride = (pixels as f64 / request.max_pixels.max(1) as f64).sqrt().ceil() as usize;
            warn!(pixels, stride, "best-effort aggregation at reduced resolution");
        }
        let (width, height) = (raster.extent.width, raster.extent.height);
        // Cells of the kept cell's block that lie inside the grid.
        let block = |start: usize, len: usize| stride.min(len - start) as f64;

        let mut sums: BTreeMap<u16, f64> = BTreeMap::new();
        for (i, cell) in raster.data.iter().enumerate() {
            let Some(code) = *cell else { continue };
            let (r, c) = (i / width, i % width);
            if r % stride != 0 || c % stride != 0 || !inside(i) {
                continue;
            }
            let weight = block(r, height) * block(c, width);
            *sums.entry(code).or_insert(0.0) += surface.cell_area(raster, i) * weight;
        }
        Ok(sums.into_iter().collect())
    }
}

/// Turns categorical snapshots into labelled area records.
#[derive(Debug, Clone)]
pub struct AreaAggregator {
    pub scheme: ClassificationScheme,
    pub recovery: IndexRecovery,
    pub surface: AreaSurface,
    /// Divides m² into the reporting unit (10 000 for hectares).
    pub divisor: f64,
    pub request: ZonalRequest,
}

impl AreaAggregator {
    pub fn new(scheme: ClassificationScheme) -> Self {
        Self {
            scheme,
            recovery: IndexRecovery::default(),
            surface: AreaSurface::default(),
            divisor: M2_PER_HECTARE,
            request: ZonalRequest::default(),
        }
    }

    /// Area records for every `(year, raster)`, in input order then ascending code.
    pub fn aggregate<Z: ZonalStatistics + ?Sized>(
        &self,
        engine: &Z,
        rasters: &[(i32, &CategoricalRaster)],
    ) -> Result<Vec<AreaRecord>> {
        if !(self.divisor.is_finite() && self.divisor > 0.0) {
            return Err(LulcError::InvalidParameter {
                name: "area_divisor",
                reason: format!("{} is not a positive divisor", self.divisor),
            });
        }
        let mut records = Vec::new();
        for &(year, raster) in rasters {
            let groups = engine.grouped_area(raster, &self.surface, &self.request)?;
            for (code, area_m2) in groups {
                let index = self.recovery.recover(&self.scheme, code)?;
                records.push(AreaRecord {
                    year,
                    class_code: code,
                    class_label: self.scheme.classes()[index].name.clone(),
                    area_hectares: area_m2 / self.divisor,
                });
            }
            let classes = records.iter().filter(|r| r.year == year).count();
            info!(year, classes, "area aggregated");
        }
        Ok(records)
    }
}

/// Pivot of area records: one row per year, one column per scheme class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaTable {
    pub years: Vec<i32>,
    pub labels: Vec<String>,
    /// `values[year][label]`; records sharing a label in a year are summed.
    pub values: Vec<Vec<f64>>,
}

impl AreaTable {
    pub fn from_records(records: &[AreaRecord], scheme: &ClassificationScheme) -> Self {
        let mut years: Vec<i32> = records.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        let labels: Vec<String> = scheme.classes().iter().map(|c| c.name.clone()).collect();

        let mut values = vec![vec![0.0; labels.len()]; years.len()];
        for r in records {
            let year = years.binary_search(&r.year);
            let label = labels.iter().position(|l| *l == r.class_label);
            let (Ok(y), Some(l)) = (year, label) else { continue };
            values[y][l] += r.area_hectares;
        }
        Self { years, labels, values }
    }

    /// Total area for the year at row `row`.
    pub fn year_total(&self, row: usize) -> f64 {
        self.values[row].iter().sum()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from("year");
        for label in &self.labels {
            out.push(',');
            out.push_str(&csv_field(label));
        }
        out.push('\n');
        for (year, row) in self.years.iter().zip(&self.values) {
            let _ = write!(out, "{year}");
            for v in row {
                let _ = write!(out, ",{v:.4}");
            }
            out.push('\n');
        }
        out
    }
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridExtent;
    use approx::assert_relative_eq;

    fn two_class() -> ClassificationScheme {
        ClassificationScheme::from_lists(&[10, 20], &["A", "B"], &["000000", "ffffff"]).unwrap()
    }

    #[test]
    fn decade_arithmetic_matches_legacy_rule() {
        let scheme = ClassificationScheme::worldcover();
        let p = IndexRecovery::DecadeArithmetic;
        assert_eq!(p.recover(&scheme, 10).unwrap(), 0);
        assert_eq!(p.recover(&scheme, 80).unwrap(), 7);
        assert_eq!(p.recover(&scheme, 100).unwrap(), 8);
        assert_eq!(p.recover(&scheme, 1000).unwrap(), 8);
        assert_eq!(p.recover(&scheme, 5).unwrap(), 0);
    }

    #[test]
    fn lookup_clamps_unknown_to_last() {
        let scheme = ClassificationScheme::worldcover();
        let p = IndexRecovery::LookupOrClampLast;
        assert_eq!(p.recover(&scheme, 100).unwrap(), 8);
        assert_eq!(p.recover(&scheme, 1000).unwrap(), 8);
        assert_eq!(p.recover(&scheme, 30).unwrap(), 2);
    }

    #[test]
    fn strict_rejects_unknown() {
        let scheme = ClassificationScheme::worldcover();
        assert_eq!(IndexRecovery::Strict.recover(&scheme, 100).unwrap(), 8);
        assert_eq!(
            IndexRecovery::Strict.recover(&scheme, 1000).unwrap_err(),
            LulcError::UnknownClassCode { code: 1000 }
        );
    }

    #[test]
    fn area_is_conserved_per_year() {
        let extent = GridExtent::new(8, 8, 73.0, 73.08, 32.0, 32.08);
        let t0 = CategoricalRaster::filled(extent, Some(10));
        let mut t1 = t0.clone();
        for c in 0..8 {
            for r in 0..4 {
                t1.set(r, c, Some(20));
            }
        }
        let agg = AreaAggregator::new(two_class());
        let records = agg.aggregate(&GridZonalStats, &[(2014, &t0), (2018, &t1)]).unwrap();

        let total_ha: f64 =
            (0..8).map(|r| extent.cell_area_m2(r) * 8.0).sum::<f64>() / M2_PER_HECTARE;
        for year in [2014, 2018] {
            let sum: f64 = records.iter().filter(|r| r.year == year).map(|r| r.area_hectares).sum();
            assert_relative_eq!(sum, total_ha, max_relative = 1e-12);
        }
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].class_label, "A");
        assert_eq!(records[2].class_label, "B");
    }

    #[test]
    fn per_cell_surface_and_region() {
        let extent = GridExtent::unit(2, 2);
        let raster = CategoricalRaster::from_values(extent, vec![10, 20, 20, 20]).unwrap();
        let mut agg = AreaAggregator::new(two_class());
        agg.surface = AreaSurface::PerCell(CovariateRaster::filled(extent, 900.0));
        let mask = vec![true, true, false, true];
        agg.request.region = Some(Region::from_mask("roi", extent, mask).unwrap());
        let records = agg.aggregate(&GridZonalStats, &[(2030, &raster)]).unwrap();
        assert_relative_eq!(records[0].area_hectares, 0.09);
        assert_relative_eq!(records[1].area_hectares, 0.18);
    }

    #[test]
    fn pixel_limit_without_best_effort_fails() {
        let extent = GridExtent::unit(4, 4);
        let raster = CategoricalRaster::filled(extent, Some(10));
        let mut agg = AreaAggregator::new(two_class());
        agg.request = ZonalRequest { region: None, best_effort: false, max_pixels: 4 };
        assert!(matches!(
            agg.aggregate(&GridZonalStats, &[(2014, &raster)]),
            Err(LulcError::CollaboratorFailure { .. })
        ));

        agg.request.best_effort = true;
        agg.surface = AreaSurface::PerCell(CovariateRaster::filled(extent, 1.0));
        let records = agg.aggregate(&GridZonalStats, &[(2014, &raster)]).unwrap();
        // Stride 2 keeps 4 cells, each weighted ×4.
        assert_relative_eq!(records[0].area_hectares * M2_PER_HECTARE, 16.0, max_relative = 1e-12);
    }

    #[test]
    fn best_effort_edge_blocks_are_not_overcounted() {
        let extent = GridExtent::unit(5, 5);
        let raster = CategoricalRaster::filled(extent, Some(10));
        let mut agg = AreaAggregator::new(two_class());
        agg.surface = AreaSurface::PerCell(CovariateRaster::filled(extent, 1.0));
        agg.request = ZonalRequest { region: None, best_effort: true, max_pixels: 4 };
        let records = agg.aggregate(&GridZonalStats, &[(2014, &raster)]).unwrap();
        // Stride 3: blocks of 3×3, 3×2, 2×3 and 2×2 cover the 25 cells.
        let cells = records[0].area_hectares * M2_PER_HECTARE;
        assert_relative_eq!(cells, 25.0, max_relative = 1e-12);
    }

    #[test]
    fn unknown_code_lands_under_last_label() {
        let extent = GridExtent::unit(2, 1);
        let raster = CategoricalRaster::from_values(extent, vec![10, 90]).unwrap();
        let mut agg = AreaAggregator::new(two_class());
        agg.surface = AreaSurface::PerCell(CovariateRaster::filled(extent, 10_000.0));
        let records = agg.aggregate(&GridZonalStats, &[(2018, &raster)]).unwrap();
        assert_eq!(records[1].class_code, 90);
        assert_eq!(records[1].class_label, "B");

        agg.recovery = IndexRecovery::Strict;
        assert!(agg.aggregate(&GridZonalStats, &[(2018, &raster)]).is_err());
    }

    #[test]
    fn table_pivots_and_exports_csv() {
        let records = vec![
            AreaRecord { year: 2018, class_code: 20, class_label: "B".into(), area_hectares: 2.0 },
            AreaRecord { year: 2014, class_code: 10, class_label: "A".into(), area_hectares: 3.0 },
            AreaRecord { year: 2018, class_code: 10, class_label: "A".into(), area_hectares: 1.0 },
        ];
        let table = AreaTable::from_records(&records, &two_class());
        assert_eq!(table.years, vec![2014, 2018]);
        assert_eq!(table.values, vec![vec![3.0, 0.0], vec![1.0, 2.0]]);
        assert_relative_eq!(table.year_total(1), 3.0);
        assert_eq!(table.to_csv(), "year,A,B\n2014,3.0000,0.0000\n2018,1.0000,2.0000\n");
    }

    #[test]
    fn csv_quotes_labels_with_commas() {
        assert_eq!(csv_field("Bare, sparse"), "\"Bare, sparse\"");
        assert_eq!(csv_field("Cropland"), "Cropland");
    }
}
