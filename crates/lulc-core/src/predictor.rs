//! Inference pass of a trained model over a future feature stack.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::ClassModel;
use crate::error::{LulcError, Result};
use crate::features::FeatureRasterSet;
use crate::raster::CategoricalRaster;
use crate::scheme::ClassificationScheme;

/// Predicted land cover, tagged with the scheme its codes belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedRaster {
    pub raster: CategoricalRaster,
    pub scheme: ClassificationScheme,
}

/// Classify every defined location of `future`.
///
/// Fails with `MissingFeature` if the stack lacks a band the model was trained
/// on, and with `UnknownClassCode` if the model emits a code outside `scheme`.
/// Locations undefined in any band stay undefined.
pub fn predict<M: ClassModel + ?Sized>(
    model: &M,
    future: &FeatureRasterSet,
    scheme: &ClassificationScheme,
) -> Result<PredictedRaster> {
    if let Some(missing) = model.feature_attributes().iter().find(|a| !future.has(**a)) {
        return Err(LulcError::missing(missing.name(), "future feature stack"));
    }
    if let Some(&unknown) = model.classes().iter().find(|c| !scheme.contains(**c)) {
        return Err(LulcError::UnknownClassCode { code: u32::from(unknown) });
    }

    let mut raster = CategoricalRaster::filled(future.extent, None);
    for (i, record) in future.records() {
        raster.data[i] = Some(model.classify(&record)?);
    }
    info!(cells = raster.defined_count(), "future state predicted");
    Ok(PredictedRaster { raster, scheme: scheme.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierEngine, MajorityClass};
    use crate::features::{assemble, FeatureAttribute, FeatureInputs, FeatureRecord};
    use crate::raster::{CovariateRaster, GridExtent, TransitionRaster};

    fn scheme() -> ClassificationScheme {
        ClassificationScheme::from_lists(&[10, 20], &["A", "B"], &["000000", "ffffff"]).unwrap()
    }

    fn future_stack() -> FeatureRasterSet {
        let extent = GridExtent::unit(2, 2);
        let cells = vec![Some(10), Some(20), None, Some(20)];
        let start = CategoricalRaster::from_cells(extent, cells).unwrap();
        let transition = TransitionRaster::filled(extent, Some(1020));
        let cov = CovariateRaster::filled(extent, 0.0);
        assemble(FeatureInputs {
            start: &start,
            end: None,
            transition: &transition,
            elevation: &cov,
            distance_to_roads: &cov,
            distance_to_drainage: &cov,
            year_delta: 12.0,
        })
        .unwrap()
    }

    fn training(end: u16) -> Vec<FeatureRecord> {
        vec![FeatureRecord {
            start: 10,
            transition: 1020,
            elevation: 0.0,
            distance_to_roads: 0.0,
            distance_to_drainage: 0.0,
            year: 4.0,
            end: Some(end),
        }]
    }

    #[test]
    fn every_defined_location_is_predicted() {
        let model = MajorityClass
            .train(&training(20), FeatureAttribute::End, &FeatureAttribute::PREDICTORS)
            .unwrap();
        let out = predict(&model, &future_stack(), &scheme()).unwrap();
        assert_eq!(out.raster.data, vec![Some(20), Some(20), None, Some(20)]);
        assert_eq!(out.scheme.lookup(20).unwrap(), "B");
    }

    #[test]
    fn missing_band_fails() {
        // `start` stands in as the target so `end` can be a predictor.
        let predictors = [FeatureAttribute::End, FeatureAttribute::Year];
        let model =
            MajorityClass.train(&training(20), FeatureAttribute::Start, &predictors).unwrap();
        let err = predict(&model, &future_stack(), &scheme()).unwrap_err();
        assert_eq!(err, LulcError::missing("end", "future feature stack"));
    }

    #[test]
    fn model_classes_must_belong_to_scheme() {
        let model = MajorityClass
            .train(&training(70), FeatureAttribute::End, &FeatureAttribute::PREDICTORS)
            .unwrap();
        assert_eq!(
            predict(&model, &future_stack(), &scheme()).unwrap_err(),
            LulcError::UnknownClassCode { code: 70 }
        );
    }
}
