//! Stratified sampling of the feature stack and the random-key train/test split.
//!
//! The policy lives here: stratify by the transition band, request
//! `num_points` per stratum, pass scale and region through. Exact per-stratum
//! counts belong to the `SamplingEngine`. The split is threshold-based on a
//! per-record uniform key, so partition sizes vary with the key draw.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LulcError, Result};
use crate::features::{FeatureAttribute, FeatureRasterSet, FeatureRecord};
use crate::raster::Region;

/// Default fraction of the sample sent to training.
pub const DEFAULT_SPLIT_THRESHOLD: f64 = 0.8;

/// RNG for one consumer of an optional user seed. `None` draws from OS entropy.
pub(crate) fn seeded_rng(seed: Option<u64>, salt: u64) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s ^ salt),
        None => StdRng::from_entropy(),
    }
}

/// Parameters forwarded to the sampling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub class_band: FeatureAttribute,
    /// Points requested per distinct value of `class_band`.
    pub num_points: usize,
    /// Sampling scale in metres.
    pub scale_m: f64,
    pub region: Option<Region>,
}

impl SampleRequest {
    pub fn by_transition(num_points: usize, scale_m: f64, region: Option<Region>) -> Self {
        Self { class_band: FeatureAttribute::Transition, num_points, scale_m, region }
    }
}

/// External capability that draws a stratified point sample from a stack.
pub trait SamplingEngine {
    fn stratified_sample(
        &self,
        features: &FeatureRasterSet,
        request: &SampleRequest,
    ) -> Result<Vec<FeatureRecord>>;
}

/// Validate the request and delegate to `engine`.
pub fn stratified_sample<E: SamplingEngine + ?Sized>(
    engine: &E,
    features: &FeatureRasterSet,
    request: &SampleRequest,
) -> Result<Vec<FeatureRecord>> {
    if !request.class_band.is_categorical() {
        return Err(LulcError::InvalidParameter {
            name: "class_band",
            reason: format!("`{}` is continuous and cannot define strata", request.class_band),
        });
    }
    if !features.has(request.class_band) {
        return Err(LulcError::missing(request.class_band.name(), "stratification band"));
    }
    if request.num_points == 0 {
        return Err(LulcError::InvalidParameter {
            name: "num_points",
            reason: "must be positive".into(),
        });
    }
    if !(request.scale_m.is_finite() && request.scale_m > 0.0) {
        return Err(LulcError::InvalidParameter {
            name: "scale_m",
            reason: format!("{} is not a positive scale", request.scale_m),
        });
    }
    if let Some(region) = &request.region {
        features.extent.ensure_aligned("region", &region.extent)?;
    }
    let records = engine.stratified_sample(features, request)?;
    info!(points = records.len(), band = %request.class_band, "stratified sample drawn");
    Ok(records)
}

/// In-memory sampler over the stack's own grid.
///
/// `scale_m` coarsens the candidate lattice to every `k`-th row and column,
/// where `k` is the scale over the grid's nominal resolution.
#[derive(Debug, Clone, Default)]
pub struct GridStratifiedSampler {
    pub seed: Option<u64>,
}

impl GridStratifiedSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

impl SamplingEngine for GridStratifiedSampler {
    fn stratified_sample(
        &self,
        features: &FeatureRasterSet,
        request: &SampleRequest,
    ) -> Result<Vec<FeatureRecord>> {
        let extent = features.extent;
        let stride = (request.scale_m / extent.nominal_resolution_m()).round().max(1.0) as usize;

        let mut strata: BTreeMap<u64, Vec<FeatureRecord>> = BTreeMap::new();
        for (i, rec) in features.records() {
            let (row, col) = (i / extent.width, i % extent.width);
            if row % stride != 0 || col % stride != 0 {
                continue;
            }
            if request.region.as_ref().is_some_and(|r| !r.contains(i)) {
                continue;
            }
            let Some(key) = rec.get(request.class_band) else { continue };
            strata.entry(key as u64).or_default().push(rec);
        }

        let mut rng = seeded_rng(self.seed, 0x5A3C_9F12_6B7E_4D01);
        let mut out = Vec::new();
        for (key, candidates) in strata {
            let drawn: Vec<FeatureRecord> = if candidates.len() <= request.num_points {
                candidates
            } else {
                candidates.choose_multiple(&mut rng, request.num_points).copied().collect()
            };
            debug!(stratum = key, drawn = drawn.len(), "stratum sampled");
            out.extend(drawn);
        }
        Ok(out)
    }
}

/// A sampled record with its uniform split key in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyedRecord {
    pub record: FeatureRecord,
    pub random: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub records: Vec<KeyedRecord>,
}

impl Sample {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn features(&self) -> Vec<FeatureRecord> {
        self.records.iter().map(|k| k.record).collect()
    }
}

/// Attach an independent uniform key to every record.
/// Without a seed the keys, and hence the split, differ between runs.
pub fn attach_random_key(records: Vec<FeatureRecord>, seed: Option<u64>) -> Sample {
    let mut rng = seeded_rng(seed, 0x9E37_79B9_7F4A_7C15);
    let records = records
        .into_iter()
        .map(|record| KeyedRecord { record, random: rng.gen::<f64>() })
        .collect();
    Sample { records }
}

/// Partition into `(train, test)`: `random <= threshold` trains, the rest test.
pub fn split(sample: &Sample, threshold: f64) -> Result<(Sample, Sample)> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(LulcError::InvalidParameter {
            name: "split_threshold",
            reason: format!("{threshold} is outside [0, 1]"),
        });
    }
    let (train, test): (Vec<KeyedRecord>, Vec<KeyedRecord>) =
        sample.records.iter().partition(|k| k.random <= threshold);
    info!(train = train.len(), test = test.len(), threshold, "sample split");
    Ok((Sample { records: train }, Sample { records: test }))
}
