//! Class-pair → transition code encoding.
//!
//! A transition from `start` to `end` is encoded as `start * m + end` where
//! `m` is the smallest power of ten strictly greater than the scheme's largest
//! class code. With that multiplier the encoding is injective and
//! `decode` recovers the pair by division.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LulcError, Result};
use crate::raster::{CategoricalRaster, TransitionRaster};
use crate::scheme::ClassificationScheme;

/// Smallest power of ten strictly greater than `max_code`.
pub fn multiplier_for(max_code: u16) -> u32 {
    let mut m = 10u32;
    while m <= u32::from(max_code) {
        m *= 10;
    }
    m
}

/// One entry of the transition dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEntry {
    pub start: u16,
    pub end: u16,
    pub code: u32,
    /// `"<start name> -> <end name>"`.
    pub label: String,
}

impl TransitionEntry {
    pub fn is_change(&self) -> bool {
        self.start != self.end
    }
}

/// Encoder bound to a scheme and a validated multiplier.
#[derive(Debug, Clone)]
pub struct TransitionEncoder {
    scheme: ClassificationScheme,
    multiplier: u32,
}

impl TransitionEncoder {
    /// Encoder using the multiplier derived from the scheme's largest code.
    /// Fails with `EncodingOverflow` when the largest code cannot be
    /// encoded in a `u32`.
    pub fn new(scheme: ClassificationScheme) -> Result<Self> {
        let multiplier = multiplier_for(scheme.max_code());
        Self::with_multiplier(scheme, multiplier)
    }

    /// Encoder with an explicit multiplier; fails with `EncodingOverflow`
    /// unless `multiplier > max_code` and `max_code * multiplier + max_code`
    /// fits in a `u32`.
    pub fn with_multiplier(scheme: ClassificationScheme, multiplier: u32) -> Result<Self> {
        let max_code = u32::from(scheme.max_code());
        let largest = max_code.checked_mul(multiplier).and_then(|v| v.checked_add(max_code));
        if multiplier <= max_code || largest.is_none() {
            return Err(LulcError::EncodingOverflow { max_code, multiplier });
        }
        Ok(Self { scheme, multiplier })
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn scheme(&self) -> &ClassificationScheme {
        &self.scheme
    }

    pub fn encode(&self, start: u16, end: u16) -> Result<u32> {
        self.scheme.index_of(start)?;
        self.scheme.index_of(end)?;
        let overflow = LulcError::EncodingOverflow {
            max_code: u32::from(start.max(end)),
            multiplier: self.multiplier,
        };
        u32::from(start)
            .checked_mul(self.multiplier)
            .and_then(|v| v.checked_add(u32::from(end)))
            .ok_or(overflow)
    }

    pub fn decode(&self, code: u32) -> Result<(u16, u16)> {
        let unknown = || LulcError::UnknownClassCode { code };
        let start = u16::try_from(code / self.multiplier).map_err(|_| unknown())?;
        let end = u16::try_from(code % self.multiplier).map_err(|_| unknown())?;
        if !self.scheme.contains(start) || !self.scheme.contains(end) {
            return Err(unknown());
        }
        Ok((start, end))
    }

    pub fn label(&self, start: u16, end: u16) -> Result<String> {
        Ok(format!("{} -> {}", self.scheme.lookup(start)?, self.scheme.lookup(end)?))
    }

    /// Full cross-product dictionary over the scheme, including self-pairs.
    pub fn build_dictionary(&self) -> Result<TransitionDictionary> {
        let mut pairs = self
            .scheme
            .codes()
            .flat_map(|s| self.scheme.codes().map(move |e| (s, e)));

        let empty = BTreeMap::<u32, TransitionEntry>::new();
        let entries = pairs.try_fold(empty, |mut acc, (start, end)| {
            let code = self.encode(start, end)?;
            let label = self.label(start, end)?;
            if let Some(prev) = acc.get(&code) {
                return Err(LulcError::TransitionCollision {
                    code,
                    first: (prev.start, prev.end),
                    second: (start, end),
                });
            }
            acc.insert(code, TransitionEntry { start, end, code, label });
            Ok(acc)
        })?;

        Ok(TransitionDictionary { multiplier: self.multiplier, entries })
    }

    /// Per-location transition codes; undefined where either input is.
    pub fn apply_to_raster_pair(
        &self,
        start: &CategoricalRaster,
        end: &CategoricalRaster,
    ) -> Result<TransitionRaster> {
        start.extent.ensure_aligned("end snapshot", &end.extent)?;
        let data = start
            .data
            .iter()
            .zip(&end.data)
            .map(|(&s, &e)| match (s, e) {
                (Some(s), Some(e)) => self.encode(s, e).map(Some),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TransitionRaster { extent: start.extent, data })
    }
}

/// Immutable mapping from transition code to its class pair and label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDictionary {
    pub multiplier: u32,
    entries: BTreeMap<u32, TransitionEntry>,
}

impl TransitionDictionary {
    pub fn get(&self, code: u32) -> Option<&TransitionEntry> {
        self.entries.get(&code)
    }

    pub fn label(&self, code: u32) -> Option<&str> {
        self.entries.get(&code).map(|e| e.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by transition code.
    pub fn entries(&self) -> impl Iterator<Item = &TransitionEntry> {
        self.entries.values()
    }

    /// String-keyed view (`"1020" -> "A -> B"`) for printing and JSON export.
    pub fn to_labels(&self) -> BTreeMap<String, String> {
        self.entries.iter().map(|(code, e)| (code.to_string(), e.label.clone())).collect()
    }
}

/// Defined-location count per observed transition, labelled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionCount {
    pub code: u32,
    pub label: String,
    pub cells: usize,
}

/// Tally of observed transitions, ordered by code.
pub fn summarize(
    dictionary: &TransitionDictionary,
    transitions: &TransitionRaster,
) -> Result<Vec<TransitionCount>> {
    transitions
        .counts()
        .into_iter()
        .map(|(code, cells)| {
            let label = dictionary.label(code).ok_or(LulcError::UnknownClassCode { code })?;
            Ok(TransitionCount { code, label: label.to_string(), cells })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridExtent;
    use std::collections::HashSet;

    fn two_class() -> ClassificationScheme {
        ClassificationScheme::from_lists(&[10, 20], &["A", "B"], &["000000", "ffffff"]).unwrap()
    }

    #[test]
    fn multiplier_is_next_power_of_ten() {
        assert_eq!(multiplier_for(9), 10);
        assert_eq!(multiplier_for(20), 100);
        assert_eq!(multiplier_for(99), 100);
        assert_eq!(multiplier_for(100), 1000);
    }

    #[test]
    fn overflow_guard_on_fixed_multiplier() {
        let worldcover = ClassificationScheme::worldcover();
        let err = TransitionEncoder::with_multiplier(worldcover, 100).unwrap_err();
        assert_eq!(err, LulcError::EncodingOverflow { max_code: 100, multiplier: 100 });
        assert!(TransitionEncoder::with_multiplier(two_class(), 100).is_ok());
    }

    #[test]
    fn codes_too_large_for_u32_are_rejected() {
        let colors = ["000000", "ffffff"];
        let scheme = ClassificationScheme::from_lists(&[10, 50000], &["A", "B"], &colors).unwrap();
        assert_eq!(multiplier_for(50000), 100_000);
        let err = TransitionEncoder::new(scheme.clone()).unwrap_err();
        assert_eq!(err, LulcError::EncodingOverflow { max_code: 50000, multiplier: 100_000 });
        assert!(TransitionEncoder::with_multiplier(scheme, 100_000).is_err());

        // Largest code whose self-transition still fits.
        let scheme = ClassificationScheme::from_lists(&[10, 42949], &["A", "B"], &colors).unwrap();
        let enc = TransitionEncoder::new(scheme).unwrap();
        assert_eq!(enc.encode(42949, 42949).unwrap(), 4_294_942_949);
        assert_eq!(enc.build_dictionary().unwrap().len(), 4);
    }

    #[test]
    fn encode_two_class_codes() {
        let enc = TransitionEncoder::new(two_class()).unwrap();
        assert_eq!(enc.multiplier(), 100);
        assert_eq!(enc.encode(10, 10).unwrap(), 1010);
        assert_eq!(enc.encode(10, 20).unwrap(), 1020);
        assert_eq!(enc.label(10, 20).unwrap(), "A -> B");
        assert!(matches!(enc.encode(10, 30), Err(LulcError::UnknownClassCode { code: 30 })));
    }

    #[test]
    fn dictionary_is_bijective_over_cross_product() {
        let scheme = ClassificationScheme::worldcover();
        let enc = TransitionEncoder::new(scheme.clone()).unwrap();
        let dict = enc.build_dictionary().unwrap();
        assert_eq!(dict.len(), scheme.size() * scheme.size());

        let mut seen = HashSet::new();
        for s in scheme.codes() {
            for e in scheme.codes() {
                let code = enc.encode(s, e).unwrap();
                assert!(seen.insert(code), "code {code} produced twice");
                assert_eq!(enc.decode(code).unwrap(), (s, e));
                assert_eq!(dict.get(code).unwrap().start, s);
            }
        }
        assert_eq!(dict.label(10_100).unwrap(), "Tree cover -> Moss and lichen");
        assert_eq!(dict.label(100_010).unwrap(), "Moss and lichen -> Tree cover");
    }

    #[test]
    fn decode_rejects_codes_outside_scheme() {
        let enc = TransitionEncoder::new(two_class()).unwrap();
        assert!(enc.decode(1030).is_err());
        assert!(enc.decode(7).is_err());
    }

    #[test]
    fn raster_pair_propagates_undefined() {
        let enc = TransitionEncoder::new(two_class()).unwrap();
        let extent = GridExtent::unit(3, 1);
        let t0 = CategoricalRaster::from_cells(extent, vec![Some(10), Some(10), None]).unwrap();
        let t1 = CategoricalRaster::from_cells(extent, vec![Some(10), Some(20), Some(20)]).unwrap();
        let tr = enc.apply_to_raster_pair(&t0, &t1).unwrap();
        assert_eq!(tr.data, vec![Some(1010), Some(1020), None]);

        let dict = enc.build_dictionary().unwrap();
        let summary = summarize(&dict, &tr).unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].label, "A -> B");
    }

    #[test]
    fn raster_pair_requires_alignment() {
        let enc = TransitionEncoder::new(two_class()).unwrap();
        let t0 = CategoricalRaster::filled(GridExtent::unit(2, 2), Some(10));
        let t1 = CategoricalRaster::filled(GridExtent::unit(2, 3), Some(10));
        assert!(matches!(
            enc.apply_to_raster_pair(&t0, &t1),
            Err(LulcError::SpatialMismatch { .. })
        ));
    }

    #[test]
    fn dictionary_labels_are_string_keyed() {
        let dict = TransitionEncoder::new(two_class()).unwrap().build_dictionary().unwrap();
        let labels = dict.to_labels();
        assert_eq!(labels.get("2010").map(String::as_str), Some("B -> A"));
    }
}
