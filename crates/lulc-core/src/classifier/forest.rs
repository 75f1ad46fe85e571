//! Random forest: bagged CART trees with √p features per split, majority vote.
//!
//! Each tree gets its own RNG seeded from the forest seed, so results are the
//! same with or without the `threading` feature.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "threading")]
use rayon::prelude::*;
use tracing::debug;

use super::tree::{DecisionTree, TreeParams};
use super::{argmax, ClassModel, ClassifierConfig, ClassifierEngine, TrainingTable};
use crate::error::{LulcError, Result};
use crate::features::{FeatureAttribute, FeatureRecord};
use crate::sampling::seeded_rng;

#[derive(Debug, Clone, Default)]
pub struct RandomForest {
    pub config: ClassifierConfig,
}

impl RandomForest {
    pub fn new(num_trees: usize) -> Self {
        Self { config: ClassifierConfig { num_trees, ..ClassifierConfig::default() } }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ForestModel {
    trees: Vec<DecisionTree>,
    classes: Vec<u16>,
    features: Vec<FeatureAttribute>,
    target: FeatureAttribute,
}

impl ForestModel {
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

fn fit_tree(table: &TrainingTable, params: TreeParams, seed: u64) -> DecisionTree {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = table.n_samples();
    let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
    DecisionTree::fit(table, &bootstrap, params, &mut rng)
}

impl ClassifierEngine for RandomForest {
    type Model = ForestModel;

    fn train(
        &self,
        records: &[FeatureRecord],
        target: FeatureAttribute,
        features: &[FeatureAttribute],
    ) -> Result<ForestModel> {
        if self.config.num_trees == 0 {
            return Err(LulcError::InvalidParameter {
                name: "num_trees",
                reason: "must be positive".into(),
            });
        }
        let table = TrainingTable::from_records(records, target, features)?;
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            features_per_split: ((table.n_features as f64).sqrt().floor() as usize).max(1),
        };

        let mut rng = seeded_rng(self.config.seed, 0xF0E5_7000_0000_0001);
        let seeds: Vec<u64> = (0..self.config.num_trees).map(|_| rng.gen()).collect();

        #[cfg(feature = "threading")]
        let trees: Vec<DecisionTree> =
            seeds.par_iter().map(|&s| fit_tree(&table, params, s)).collect();
        #[cfg(not(feature = "threading"))]
        let trees: Vec<DecisionTree> = seeds.iter().map(|&s| fit_tree(&table, params, s)).collect();

        debug!(
            trees = trees.len(),
            mean_nodes = trees.iter().map(DecisionTree::node_count).sum::<usize>() / trees.len(),
            "forest grown"
        );

        Ok(ForestModel { trees, classes: table.classes, features: features.to_vec(), target })
    }
}

impl ClassModel for ForestModel {
    fn feature_attributes(&self) -> &[FeatureAttribute] {
        &self.features
    }

    fn target_attribute(&self) -> FeatureAttribute {
        self.target
    }

    fn classes(&self) -> &[u16] {
        &self.classes
    }

    fn classify_vector(&self, x: &[f64]) -> u16 {
        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            votes[tree.predict_index(x)] += 1;
        }
        self.classes[argmax(&votes)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(elevation: f32, end: u16) -> FeatureRecord {
        FeatureRecord {
            start: 10,
            transition: 1010,
            elevation,
            distance_to_roads: 100.0,
            distance_to_drainage: 50.0,
            year: 4.0,
            end: Some(end),
        }
    }

    /// Low ground stays class 10, high ground becomes class 20.
    fn clustered() -> Vec<FeatureRecord> {
        (0..40)
            .map(|i| if i < 20 { rec(100.0 + i as f32, 10) } else { rec(2000.0 + i as f32, 20) })
            .collect()
    }

    #[test]
    fn predictions_stay_in_training_labels() {
        let model = RandomForest::new(10).with_seed(42)
            .train(&clustered(), FeatureAttribute::End, &FeatureAttribute::PREDICTORS)
            .unwrap();
        assert_eq!(model.classes(), &[10, 20]);
        for r in clustered() {
            assert!(model.classes().contains(&model.classify(&r).unwrap()));
        }
    }

    #[test]
    fn separated_clusters_are_learned() {
        let data = clustered();
        let model = RandomForest::new(25).with_seed(7)
            .train(&data, FeatureAttribute::End, &FeatureAttribute::PREDICTORS)
            .unwrap();
        let correct = data.iter().filter(|r| model.classify(r).unwrap() == r.end.unwrap()).count();
        assert!(correct as f64 / data.len() as f64 >= 0.95, "training accuracy {correct}/40");
        assert_eq!(model.num_trees(), 25);
    }

    #[test]
    fn same_seed_same_model_output() {
        let data = clustered();
        let train = |seed| {
            RandomForest::new(5).with_seed(seed)
                .train(&data, FeatureAttribute::End, &FeatureAttribute::PREDICTORS)
                .unwrap()
        };
        let (a, b) = (train(3), train(3));
        let base = rec(1000.0, 10);
        for elevation in [0.0, 500.0, 1000.0, 1500.0, 5000.0] {
            let p = FeatureRecord { elevation, ..base };
            assert_eq!(a.classify(&p).unwrap(), b.classify(&p).unwrap());
        }
    }

    #[test]
    fn zero_trees_rejected() {
        let err = RandomForest::new(0).train(
            &clustered(),
            FeatureAttribute::End,
            &FeatureAttribute::PREDICTORS,
        );
        assert!(matches!(err, Err(LulcError::InvalidParameter { name: "num_trees", .. })));
    }

    #[test]
    fn prediction_records_need_no_target() {
        let model = RandomForest::new(3).with_seed(1)
            .train(&clustered(), FeatureAttribute::End, &[FeatureAttribute::Elevation])
            .unwrap();
        let future = FeatureRecord { end: None, ..rec(150.0, 10) };
        assert_eq!(model.classify(&future).unwrap(), 10);
    }
}
