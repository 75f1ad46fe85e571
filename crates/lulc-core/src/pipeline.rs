//! Pipeline orchestrator: runs every forecast stage in order.
//!
//! encode → assemble → sample → split → train → evaluate → predict → aggregate.
//! Each stage consumes the previous stage's full output; the first error
//! aborts the run and no partial result is returned.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::area::{
    AreaAggregator, AreaRecord, AreaSurface, AreaTable, GridZonalStats, IndexRecovery, ZonalRequest,
    ZonalStatistics,
};
use crate::classifier::{self, ClassifierConfig, ClassifierEngine, RandomForest};
use crate::error::{LulcError, Result};
use crate::evaluation::{evaluate, AccuracyReport};
use crate::features::{assemble, FeatureAttribute, FeatureInputs};
use crate::predictor::{predict, PredictedRaster};
use crate::raster::{CategoricalRaster, CovariateRaster, Region, TransitionRaster};
use crate::sampling::{
    attach_random_key, split, stratified_sample, GridStratifiedSampler, SampleRequest,
    SamplingEngine, DEFAULT_SPLIT_THRESHOLD,
};
use crate::scheme::ClassificationScheme;
use crate::transition::{summarize, TransitionCount, TransitionDictionary, TransitionEncoder};

// ── Parameters ────────────────────────────────────────────────────────────────

/// Run-level knobs. Every field has a default so a manifest may omit any of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastParams {
    /// Points requested per transition stratum.
    pub num_points: usize,
    /// Sampling scale in metres.
    pub scale_m: f64,
    /// Records with a split key `<=` this value train; the rest test.
    pub split_threshold: f64,
    pub num_trees: usize,
    /// `None` seeds from OS entropy; runs are then not reproducible.
    pub seed: Option<u64>,
    /// m² per reporting unit (10 000 → hectares).
    pub area_divisor: f64,
    pub best_effort: bool,
    pub max_pixels: u64,
    pub index_recovery: IndexRecovery,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            num_points: 1000,
            scale_m: 30.0,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            num_trees: 50,
            seed: None,
            area_divisor: 10_000.0,
            best_effort: true,
            max_pixels: 1_000_000_000,
            index_recovery: IndexRecovery::default(),
            max_depth: None,
            min_samples_leaf: 1,
        }
    }
}

impl ForecastParams {
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |name: &'static str, reason: String| Err(LulcError::InvalidParameter { name, reason });
        if self.num_points == 0 {
            return invalid("num_points", "must be positive".into());
        }
        if !(self.scale_m.is_finite() && self.scale_m > 0.0) {
            return invalid("scale_m", format!("{} is not a positive scale", self.scale_m));
        }
        if !(self.split_threshold > 0.0 && self.split_threshold < 1.0) {
            let reason = format!("{} is outside (0, 1)", self.split_threshold);
            return invalid("split_threshold", reason);
        }
        if self.num_trees == 0 {
            return invalid("num_trees", "must be positive".into());
        }
        if !(self.area_divisor.is_finite() && self.area_divisor > 0.0) {
            let reason = format!("{} is not a positive divisor", self.area_divisor);
            return invalid("area_divisor", reason);
        }
        if self.max_pixels == 0 {
            return invalid("max_pixels", "must be positive".into());
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf", "must be positive".into());
        }
        Ok(())
    }

    /// Forest settings derived from these parameters.
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            num_trees: self.num_trees,
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            seed: self.seed,
        }
    }
}

// ── Inputs / outputs ──────────────────────────────────────────────────────────

/// A categorical land-cover map observed in `year`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub year: i32,
    pub raster: CategoricalRaster,
}

/// Everything one forecast run reads. All rasters must share one grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastInputs {
    pub scheme: ClassificationScheme,
    pub start: Snapshot,
    pub end: Snapshot,
    pub elevation: CovariateRaster,
    pub distance_to_roads: CovariateRaster,
    pub distance_to_drainage: CovariateRaster,
    /// Year to forecast; must be after `end.year`.
    pub target_year: i32,
    /// Area of interest. `None` uses the whole grid.
    pub region: Option<Region>,
    /// Per-cell area in m². `None` uses geodesic cell area.
    pub pixel_area: Option<CovariateRaster>,
}

/// Full output of a forecast run.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub dictionary: TransitionDictionary,
    pub transitions: TransitionRaster,
    pub transition_summary: Vec<TransitionCount>,
    pub accuracy: AccuracyReport,
    pub train_size: usize,
    pub test_size: usize,
    pub target_year: i32,
    pub prediction: PredictedRaster,
    pub areas: Vec<AreaRecord>,
    pub area_table: AreaTable,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Forecast pipeline over pluggable sampling, classification and zonal engines.
///
/// The parameters are fixed at construction and are the only ones `run` reads.
pub struct ForecastPipeline<S = GridStratifiedSampler, C = RandomForest, Z = GridZonalStats> {
    pub sampler: S,
    pub classifier: C,
    pub zonal: Z,
    params: ForecastParams,
}

impl ForecastPipeline {
    /// In-memory engines configured from `params`.
    pub fn new(params: &ForecastParams) -> Self {
        Self {
            sampler: GridStratifiedSampler::new(params.seed),
            classifier: RandomForest { config: params.classifier_config() },
            zonal: GridZonalStats,
            params: params.clone(),
        }
    }
}

impl<S, C, Z> ForecastPipeline<S, C, Z>
where
    S: SamplingEngine,
    C: ClassifierEngine,
    Z: ZonalStatistics,
{
    /// Caller-supplied engines. Engine-level settings (seeds, tree count) are
    /// whatever the engines were built with; `params` drives the other stages.
    pub fn with_engines(sampler: S, classifier: C, zonal: Z, params: ForecastParams) -> Self {
        Self { sampler, classifier, zonal, params }
    }

    pub fn params(&self) -> &ForecastParams {
        &self.params
    }

    /// Run every stage on `inputs`.
    pub fn run(&self, inputs: &ForecastInputs) -> Result<ForecastResult> {
        let params = &self.params;
        params.validate()?;
        let extent = inputs.start.raster.extent;
        if inputs.end.year <= inputs.start.year {
            return Err(LulcError::InvalidParameter {
                name: "end.year",
                reason: format!("{} does not follow {}", inputs.end.year, inputs.start.year),
            });
        }
        if inputs.target_year <= inputs.end.year {
            return Err(LulcError::InvalidParameter {
                name: "target_year",
                reason: format!("{} does not follow {}", inputs.target_year, inputs.end.year),
            });
        }
        if let Some(area) = &inputs.pixel_area {
            extent.ensure_aligned("pixel area", &area.extent)?;
        }

        // ── 1. Region clip ──────────────────────────────────────────────────
        let (start, end) = match &inputs.region {
            Some(region) => (inputs.start.raster.clip(region)?, inputs.end.raster.clip(region)?),
            None => (inputs.start.raster.clone(), inputs.end.raster.clone()),
        };

        // ── 2. Transition encoding ──────────────────────────────────────────
        let encoder = TransitionEncoder::new(inputs.scheme.clone())?;
        let dictionary = encoder.build_dictionary()?;
        let transitions = encoder.apply_to_raster_pair(&start, &end)?;
        let transition_summary = summarize(&dictionary, &transitions)?;
        info!(
            multiplier = dictionary.multiplier,
            observed = transition_summary.len(),
            changed = transition_summary
                .iter()
                .filter(|t| dictionary.get(t.code).is_some_and(|e| e.is_change()))
                .count(),
            "transitions encoded"
        );

        // ── 3. Training window ──────────────────────────────────────────────
        let training = assemble(FeatureInputs {
            start: &start,
            end: Some(&end),
            transition: &transitions,
            elevation: &inputs.elevation,
            distance_to_roads: &inputs.distance_to_roads,
            distance_to_drainage: &inputs.distance_to_drainage,
            year_delta: (inputs.end.year - inputs.start.year) as f32,
        })?;

        // ── 4. Sample + split ───────────────────────────────────────────────
        let request =
            SampleRequest::by_transition(params.num_points, params.scale_m, inputs.region.clone());
        let records = stratified_sample(&self.sampler, &training, &request)?;
        let keyed = attach_random_key(records, params.seed);
        let (train_set, test_set) = split(&keyed, params.split_threshold)?;

        // ── 5. Train + evaluate ─────────────────────────────────────────────
        let model = classifier::train(
            &self.classifier,
            &train_set.features(),
            FeatureAttribute::TARGET,
            &FeatureAttribute::PREDICTORS,
        )?;
        let matrix = evaluate(&model, &test_set.features(), FeatureAttribute::TARGET)?;

        // ── 6. Future window ────────────────────────────────────────────────
        // The observed transition is reused as a structural covariate: the
        // future window's own transition is unknown.
        let future = assemble(FeatureInputs {
            start: &end,
            end: None,
            transition: &transitions,
            elevation: &inputs.elevation,
            distance_to_roads: &inputs.distance_to_roads,
            distance_to_drainage: &inputs.distance_to_drainage,
            year_delta: (inputs.target_year - inputs.end.year) as f32,
        })?;
        let prediction = predict(&model, &future, &inputs.scheme)?;

        // ── 7. Area per year ────────────────────────────────────────────────
        let aggregator = AreaAggregator {
            scheme: inputs.scheme.clone(),
            recovery: params.index_recovery,
            surface: inputs.pixel_area.clone().map_or(AreaSurface::Geodesic, AreaSurface::PerCell),
            divisor: params.area_divisor,
            request: ZonalRequest {
                region: inputs.region.clone(),
                best_effort: params.best_effort,
                max_pixels: params.max_pixels,
            },
        };
        let areas = aggregator.aggregate(
            &self.zonal,
            &[
                (inputs.start.year, &start),
                (inputs.end.year, &end),
                (inputs.target_year, &prediction.raster),
            ],
        )?;
        let area_table = AreaTable::from_records(&areas, &inputs.scheme);

        Ok(ForecastResult {
            dictionary,
            transitions,
            transition_summary,
            accuracy: matrix.report(),
            train_size: train_set.len(),
            test_size: test_set.len(),
            target_year: inputs.target_year,
            prediction,
            areas,
            area_table,
        })
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
