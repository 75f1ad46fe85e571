//! Pluggable multi-class classifier capability.
//!
//! A `ClassifierEngine` turns training records into a read-only `ClassModel`.
//! The columns are fixed by the caller: predictors in order plus one
//! categorical target. Two engines ship in-tree: a random forest of CART
//! trees and a majority-class baseline.

pub mod forest;
pub mod majority;
pub mod tree;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LulcError, Result};
use crate::features::{FeatureAttribute, FeatureRecord};

pub use forest::{ForestModel, RandomForest};
pub use majority::{MajorityClass, MajorityModel};
pub use tree::DecisionTree;

/// Forest settings. `num_trees` is the only knob the pipeline exposes by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub num_trees: usize,
    /// `None` grows trees until leaves are pure.
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub seed: Option<u64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { num_trees: 50, max_depth: None, min_samples_leaf: 1, seed: None }
    }
}

/// Trained, immutable model.
pub trait ClassModel: Send + Sync {
    /// Predictor columns the model was trained on, in order.
    fn feature_attributes(&self) -> &[FeatureAttribute];

    fn target_attribute(&self) -> FeatureAttribute;

    /// Class codes seen in training, ascending.
    fn classes(&self) -> &[u16];

    /// Predict from a vector laid out as `feature_attributes()`.
    fn classify_vector(&self, x: &[f64]) -> u16;

    fn classify(&self, record: &FeatureRecord) -> Result<u16> {
        let x = record.vector(self.feature_attributes())?;
        Ok(self.classify_vector(&x))
    }
}

pub trait ClassifierEngine {
    type Model: ClassModel;

    fn train(
        &self,
        records: &[FeatureRecord],
        target: FeatureAttribute,
        features: &[FeatureAttribute],
    ) -> Result<Self::Model>;
}

/// Train `engine` on `records`, logging the outcome.
pub fn train<E: ClassifierEngine>(
    engine: &E,
    records: &[FeatureRecord],
    target: FeatureAttribute,
    features: &[FeatureAttribute],
) -> Result<E::Model> {
    let model = engine.train(records, target, features)?;
    info!(
        records = records.len(),
        classes = model.classes().len(),
        target = %target,
        "classifier trained"
    );
    Ok(model)
}

/// Dense training matrix shared by the in-tree engines.
///
/// `x` is row-major `n_samples × n_features`; `y` holds indices into `classes`.
#[derive(Debug, Clone)]
pub struct TrainingTable {
    pub x: Vec<f64>,
    pub y: Vec<usize>,
    pub classes: Vec<u16>,
    pub n_features: usize,
}

impl TrainingTable {
    pub fn from_records(
        records: &[FeatureRecord],
        target: FeatureAttribute,
        features: &[FeatureAttribute],
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(LulcError::EmptyTrainingSet);
        }
        if features.is_empty() {
            return Err(LulcError::InvalidParameter {
                name: "features",
                reason: "no predictor columns".into(),
            });
        }
        if features.contains(&target) {
            return Err(LulcError::InvalidParameter {
                name: "features",
                reason: format!("target `{target}` cannot also be a predictor"),
            });
        }

        let targets = records.iter().map(|r| r.target(target)).collect::<Result<Vec<u16>>>()?;
        let mut classes = targets.clone();
        classes.sort_unstable();
        classes.dedup();

        let mut x = Vec::with_capacity(records.len() * features.len());
        for r in records {
            x.extend(r.vector(features)?);
        }
        let y = targets
            .iter()
            .map(|t| classes.binary_search(t).unwrap_or_default())
            .collect();

        Ok(Self { x, y, classes, n_features: features.len() })
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn value(&self, sample: usize, feature: usize) -> f64 {
        self.x[sample * self.n_features + feature]
    }
}

/// Index of the largest count; ties resolve to the lowest index.
pub(crate) fn argmax(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
        .0
}
