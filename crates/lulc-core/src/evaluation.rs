//! Confusion matrix and agreement statistics for held-out test records.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::ClassModel;
use crate::error::{LulcError, Result};
use crate::features::{FeatureAttribute, FeatureRecord};

/// Square matrix indexed by class code: rows are truth, columns prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Every code observed in truth or prediction, ascending.
    pub classes: Vec<u16>,
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Cross-tabulate `(truth, prediction)` pairs. Fails with `EmptyTestSet` on no pairs.
    pub fn from_pairs<I: IntoIterator<Item = (u16, u16)>>(pairs: I) -> Result<Self> {
        let pairs: Vec<(u16, u16)> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return Err(LulcError::EmptyTestSet);
        }
        let mut classes: Vec<u16> = pairs.iter().flat_map(|&(t, p)| [t, p]).collect();
        classes.sort_unstable();
        classes.dedup();

        let k = classes.len();
        let mut counts = vec![vec![0u64; k]; k];
        for (t, p) in pairs {
            if let (Ok(ti), Ok(pi)) = (classes.binary_search(&t), classes.binary_search(&p)) {
                counts[ti][pi] += 1;
            }
        }
        Ok(Self { classes, counts })
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Count of records with truth `truth` predicted as `predicted`.
    pub fn count(&self, truth: u16, predicted: u16) -> u64 {
        match (self.classes.binary_search(&truth), self.classes.binary_search(&predicted)) {
            (Ok(t), Ok(p)) => self.counts[t][p],
            _ => 0,
        }
    }

    /// Per-class truth totals, in `classes` order.
    pub fn row_sums(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Per-class prediction totals, in `classes` order.
    pub fn col_sums(&self) -> Vec<u64> {
        (0..self.classes.len()).map(|j| self.counts.iter().map(|row| row[j]).sum()).collect()
    }

    fn diagonal(&self) -> u64 {
        (0..self.classes.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Overall accuracy: trace / total.
    pub fn accuracy(&self) -> f64 {
        self.diagonal() as f64 / self.total() as f64
    }

    /// Cohen's kappa. When chance agreement is total (a single class in both
    /// margins) kappa is 1 for perfect agreement and 0 otherwise.
    pub fn kappa(&self) -> f64 {
        let n = self.total() as f64;
        let po = self.accuracy();
        let pe = self
            .row_sums()
            .iter()
            .zip(self.col_sums())
            .map(|(&r, c)| r as f64 * c as f64)
            .sum::<f64>()
            / (n * n);
        if (1.0 - pe).abs() < 1e-12 {
            return if po >= 1.0 { 1.0 } else { 0.0 };
        }
        (po - pe) / (1.0 - pe)
    }

    /// Producer's accuracy (recall) per class; `None` where the class never occurs in truth.
    pub fn producers_accuracy(&self) -> Vec<Option<f64>> {
        self.row_sums()
            .iter()
            .enumerate()
            .map(|(i, &r)| (r > 0).then(|| self.counts[i][i] as f64 / r as f64))
            .collect()
    }

    /// Consumer's accuracy (precision) per class; `None` where the class is never predicted.
    pub fn consumers_accuracy(&self) -> Vec<Option<f64>> {
        self.col_sums()
            .iter()
            .enumerate()
            .map(|(j, &c)| (c > 0).then(|| self.counts[j][j] as f64 / c as f64))
            .collect()
    }

    pub fn report(&self) -> AccuracyReport {
        AccuracyReport {
            matrix: self.clone(),
            accuracy: self.accuracy(),
            kappa: self.kappa(),
            producers_accuracy: self.producers_accuracy(),
            consumers_accuracy: self.consumers_accuracy(),
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "truth\\pred")?;
        for c in &self.classes {
            write!(f, "{c:>8}")?;
        }
        writeln!(f)?;
        for (c, row) in self.classes.iter().zip(&self.counts) {
            write!(f, "{c:>10}")?;
            for v in row {
                write!(f, "{v:>8}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Serialisable summary of an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub matrix: ConfusionMatrix,
    pub accuracy: f64,
    pub kappa: f64,
    pub producers_accuracy: Vec<Option<f64>>,
    pub consumers_accuracy: Vec<Option<f64>>,
}

/// Predict every test record and cross-tabulate against its `target` value.
pub fn evaluate<M: ClassModel + ?Sized>(
    model: &M,
    test: &[FeatureRecord],
    target: FeatureAttribute,
) -> Result<ConfusionMatrix> {
    if test.is_empty() {
        return Err(LulcError::EmptyTestSet);
    }
    let pairs = test
        .iter()
        .map(|r| Ok((r.target(target)?, model.classify(r)?)))
        .collect::<Result<Vec<_>>>()?;
    let matrix = ConfusionMatrix::from_pairs(pairs)?;
    info!(
        records = test.len(),
        accuracy = matrix.accuracy(),
        kappa = matrix.kappa(),
        "model evaluated"
    );
    Ok(matrix)
}
