//! Majority-class baseline: always predicts the most frequent training label.

use super::{argmax, ClassModel, ClassifierEngine, TrainingTable};
use crate::error::Result;
use crate::features::{FeatureAttribute, FeatureRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityClass;

#[derive(Debug, Clone)]
pub struct MajorityModel {
    class: u16,
    classes: Vec<u16>,
    features: Vec<FeatureAttribute>,
    target: FeatureAttribute,
}

impl MajorityModel {
    pub fn class(&self) -> u16 {
        self.class
    }
}

impl ClassifierEngine for MajorityClass {
    type Model = MajorityModel;

    fn train(
        &self,
        records: &[FeatureRecord],
        target: FeatureAttribute,
        features: &[FeatureAttribute],
    ) -> Result<MajorityModel> {
        let table = TrainingTable::from_records(records, target, features)?;
        let mut counts = vec![0usize; table.classes.len()];
        for &y in &table.y {
            counts[y] += 1;
        }
        Ok(MajorityModel {
            class: table.classes[argmax(&counts)],
            classes: table.classes,
            features: features.to_vec(),
            target,
        })
    }
}

impl ClassModel for MajorityModel {
    fn feature_attributes(&self) -> &[FeatureAttribute] {
        &self.features
    }

    fn target_attribute(&self) -> FeatureAttribute {
        self.target
    }

    fn classes(&self) -> &[u16] {
        &self.classes
    }

    fn classify_vector(&self, _x: &[f64]) -> u16 {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(end: u16) -> FeatureRecord {
        FeatureRecord {
            start: 10,
            transition: 1000 + u32::from(end),
            elevation: 0.0,
            distance_to_roads: 0.0,
            distance_to_drainage: 0.0,
            year: 4.0,
            end: Some(end),
        }
    }

    #[test]
    fn predicts_most_frequent_label() {
        let data = [rec(20), rec(10), rec(20), rec(20), rec(10)];
        let model = MajorityClass
            .train(&data, FeatureAttribute::End, &FeatureAttribute::PREDICTORS)
            .unwrap();
        assert_eq!(model.class(), 20);
        assert_eq!(model.classify(&rec(10)).unwrap(), 20);
    }

    #[test]
    fn tie_resolves_to_lowest_code() {
        let data = [rec(20), rec(10)];
        let model = MajorityClass
            .train(&data, FeatureAttribute::End, &FeatureAttribute::PREDICTORS)
            .unwrap();
        assert_eq!(model.class(), 10);
    }
}
