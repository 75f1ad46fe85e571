//! Land-use / land-cover change forecasting.
//!
//! Two categorical snapshots plus static covariates are turned into a
//! transition-coded feature stack, sampled, used to train a classifier, and
//! projected onto a future window. Per-class area is reported per year.

pub mod area;
pub mod classifier;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod pipeline;
pub mod predictor;
pub mod raster;
pub mod sampling;
pub mod scheme;
pub mod transition;

pub use error::{LulcError, Result};
pub use pipeline::{ForecastInputs, ForecastParams, ForecastPipeline, ForecastResult, Snapshot};
pub use raster::{CategoricalRaster, CovariateRaster, GridExtent, Region, TransitionRaster};
pub use scheme::ClassificationScheme;
