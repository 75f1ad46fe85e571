//! Per-location feature records and the layered feature set they come from.
//!
//! A `FeatureRasterSet` is the multi-band stack handed to the sampler and the
//! predictor. In training mode it carries the `end` snapshot; in prediction
//! mode `end` is absent and the transition band is the one observed between
//! the two most recent known snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LulcError, Result};
use crate::raster::{CategoricalRaster, CovariateRaster, GridExtent, TransitionRaster};

/// Named band of the feature stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureAttribute {
    Start,
    Transition,
    Elevation,
    DistanceToRoads,
    DistanceToDrainage,
    Year,
    End,
}

impl FeatureAttribute {
    /// Predictor columns in training order.
    pub const PREDICTORS: [FeatureAttribute; 6] = [
        FeatureAttribute::Start,
        FeatureAttribute::Transition,
        FeatureAttribute::Elevation,
        FeatureAttribute::DistanceToRoads,
        FeatureAttribute::DistanceToDrainage,
        FeatureAttribute::Year,
    ];

    pub const TARGET: FeatureAttribute = FeatureAttribute::End;

    pub fn name(self) -> &'static str {
        match self {
            FeatureAttribute::Start => "start",
            FeatureAttribute::Transition => "transition",
            FeatureAttribute::Elevation => "elevation",
            FeatureAttribute::DistanceToRoads => "distance_to_roads",
            FeatureAttribute::DistanceToDrainage => "distance_to_drainage",
            FeatureAttribute::Year => "year",
            FeatureAttribute::End => "end",
        }
    }

    /// True for bands holding class or transition codes.
    pub fn is_categorical(self) -> bool {
        matches!(
            self,
            FeatureAttribute::Start | FeatureAttribute::Transition | FeatureAttribute::End
        )
    }
}

impl fmt::Display for FeatureAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureAttribute {
    type Err = LulcError;

    fn from_str(s: &str) -> Result<Self> {
        [Self::TARGET]
            .into_iter()
            .chain(Self::PREDICTORS)
            .find(|a| a.name() == s)
            .ok_or_else(|| LulcError::missing(s, "not a known feature attribute"))
    }
}

/// Attribute values at one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub start: u16,
    pub transition: u32,
    pub elevation: f32,
    pub distance_to_roads: f32,
    pub distance_to_drainage: f32,
    /// Elapsed years of the window.
    pub year: f32,
    /// Ground-truth class at the window end; `None` in prediction records.
    pub end: Option<u16>,
}

impl FeatureRecord {
    pub fn get(&self, attribute: FeatureAttribute) -> Option<f64> {
        match attribute {
            FeatureAttribute::Start => Some(f64::from(self.start)),
            FeatureAttribute::Transition => Some(f64::from(self.transition)),
            FeatureAttribute::Elevation => Some(f64::from(self.elevation)),
            FeatureAttribute::DistanceToRoads => Some(f64::from(self.distance_to_roads)),
            FeatureAttribute::DistanceToDrainage => Some(f64::from(self.distance_to_drainage)),
            FeatureAttribute::Year => Some(f64::from(self.year)),
            FeatureAttribute::End => self.end.map(f64::from),
        }
    }

    /// Values for `attributes` in order; `MissingFeature` if one is absent.
    pub fn vector(&self, attributes: &[FeatureAttribute]) -> Result<Vec<f64>> {
        attributes
            .iter()
            .map(|&a| self.get(a).ok_or_else(|| LulcError::missing(a.name(), "feature record")))
            .collect()
    }

    /// Target class code; `MissingFeature` on prediction records.
    pub fn target(&self, attribute: FeatureAttribute) -> Result<u16> {
        let v = self
            .get(attribute)
            .ok_or_else(|| LulcError::missing(attribute.name(), "target column"))?;
        code_from_f64(v, attribute)
    }

    /// Build a record from a loosely typed attribute map, as returned by an
    /// external sampling engine. `end` is optional; all predictors are required.
    pub fn from_attributes(attrs: &BTreeMap<String, f64>) -> Result<Self> {
        let need = |a: FeatureAttribute| {
            attrs
                .get(a.name())
                .copied()
                .filter(|v| v.is_finite())
                .ok_or_else(|| LulcError::missing(a.name(), "sampled attribute map"))
        };
        let start = code_from_f64(need(FeatureAttribute::Start)?, FeatureAttribute::Start)?;
        let transition = need(FeatureAttribute::Transition)?;
        if transition < 0.0 || transition.fract() != 0.0 || transition > f64::from(u32::MAX) {
            return Err(LulcError::InvalidParameter {
                name: "transition",
                reason: format!("{transition} is not a transition code"),
            });
        }
        let end = match attrs.get(FeatureAttribute::End.name()) {
            Some(&v) => Some(code_from_f64(v, FeatureAttribute::End)?),
            None => None,
        };
        Ok(Self {
            start,
            transition: transition as u32,
            elevation: need(FeatureAttribute::Elevation)? as f32,
            distance_to_roads: need(FeatureAttribute::DistanceToRoads)? as f32,
            distance_to_drainage: need(FeatureAttribute::DistanceToDrainage)? as f32,
            year: need(FeatureAttribute::Year)? as f32,
            end,
        })
    }
}

fn code_from_f64(v: f64, attribute: FeatureAttribute) -> Result<u16> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u16::MAX) {
        Ok(v as u16)
    } else {
        Err(LulcError::InvalidParameter {
            name: "class code",
            reason: format!("{attribute} value {v} is not a class code"),
        })
    }
}

/// Whether a feature set carries ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMode {
    Training,
    Prediction,
}

/// Inputs for `assemble`; borrowed so callers keep their layers.
#[derive(Debug, Clone, Copy)]
pub struct FeatureInputs<'a> {
    pub start: &'a CategoricalRaster,
    /// `Some` for training, `None` for prediction.
    pub end: Option<&'a CategoricalRaster>,
    pub transition: &'a TransitionRaster,
    pub elevation: &'a CovariateRaster,
    pub distance_to_roads: &'a CovariateRaster,
    pub distance_to_drainage: &'a CovariateRaster,
    pub year_delta: f32,
}

/// Aligned multi-band stack for one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRasterSet {
    pub extent: GridExtent,
    pub start: CategoricalRaster,
    pub end: Option<CategoricalRaster>,
    pub transition: TransitionRaster,
    pub elevation: CovariateRaster,
    pub distance_to_roads: CovariateRaster,
    pub distance_to_drainage: CovariateRaster,
    pub year: f32,
}

/// Stack the window's layers after checking they share one grid.
pub fn assemble(inputs: FeatureInputs<'_>) -> Result<FeatureRasterSet> {
    let extent = inputs.start.extent;
    if let Some(end) = inputs.end {
        extent.ensure_aligned("end", &end.extent)?;
    }
    extent.ensure_aligned("transition", &inputs.transition.extent)?;
    extent.ensure_aligned("elevation", &inputs.elevation.extent)?;
    extent.ensure_aligned("distance_to_roads", &inputs.distance_to_roads.extent)?;
    extent.ensure_aligned("distance_to_drainage", &inputs.distance_to_drainage.extent)?;
    if !inputs.year_delta.is_finite() {
        return Err(LulcError::InvalidParameter {
            name: "year_delta",
            reason: format!("{} is not finite", inputs.year_delta),
        });
    }

    Ok(FeatureRasterSet {
        extent,
        start: inputs.start.clone(),
        end: inputs.end.cloned(),
        transition: inputs.transition.clone(),
        elevation: inputs.elevation.clone(),
        distance_to_roads: inputs.distance_to_roads.clone(),
        distance_to_drainage: inputs.distance_to_drainage.clone(),
        year: inputs.year_delta,
    })
}

impl FeatureRasterSet {
    pub fn mode(&self) -> FeatureMode {
        if self.end.is_some() {
            FeatureMode::Training
        } else {
            FeatureMode::Prediction
        }
    }

    /// Bands present in this stack.
    pub fn attributes(&self) -> Vec<FeatureAttribute> {
        let mut attrs = FeatureAttribute::PREDICTORS.to_vec();
        if self.end.is_some() {
            attrs.push(FeatureAttribute::End);
        }
        attrs
    }

    pub fn has(&self, attribute: FeatureAttribute) -> bool {
        attribute != FeatureAttribute::End || self.end.is_some()
    }

    /// Record at flat index `i`, `None` where any band is undefined.
    pub fn record(&self, i: usize) -> Option<FeatureRecord> {
        let end = match &self.end {
            Some(end) => Some(end.data[i]?),
            None => None,
        };
        Some(FeatureRecord {
            start: self.start.data[i]?,
            transition: self.transition.data[i]?,
            elevation: self.elevation.value(i)?,
            distance_to_roads: self.distance_to_roads.value(i)?,
            distance_to_drainage: self.distance_to_drainage.value(i)?,
            year: self.year,
            end,
        })
    }

    /// All fully defined locations as `(flat index, record)`.
    pub fn records(&self) -> impl Iterator<Item = (usize, FeatureRecord)> + '_ {
        (0..self.extent.len()).filter_map(move |i| self.record(i).map(|r| (i, r)))
    }

    pub fn defined_count(&self) -> usize {
        self.records().count()
    }
}
