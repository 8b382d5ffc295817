//! Lid matching for chamber-like features
//!
//! Every point whose type code requires a lid is matched to the nearest lid within a
//! tolerance that grows with the physical size of both features. Each required point is
//! matched on its own: a lid may be the nearest match of several required points, and no
//! one-to-one assignment is attempted.

use crate::{Dataset, PointFeature};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw diameter values above this are read as millimeters, otherwise as meters
const MILLIMETER_THRESHOLD: f64 = 10.0;

/// Matcher configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct MatcherConfig {
    /// Type codes of features that must have a lid
    pub requires_lid: HashSet<String>,
    /// Type codes of lid features
    pub lid_codes: HashSet<String>,
    /// Attribute keys holding a diameter, tried in order
    pub diameter_keys: Vec<String>,
    /// Minimum matching distance in meters, regardless of feature size
    pub base_tolerance: f64,
    /// Lower radius bound in meters, also used when no diameter is recorded
    pub min_radius: f64,
    /// Upper radius bound in meters
    pub max_radius: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            requires_lid: ["KUM", "SLU", "SAN", "OVK", "SPY"]
                .into_iter()
                .map(String::from)
                .collect(),
            lid_codes: ["LOK"].into_iter().map(String::from).collect(),
            diameter_keys: ["DIMENSJON", "DIMENSION", "DIAMETER", "DIM", "BREDDE"]
                .into_iter()
                .map(String::from)
                .collect(),
            base_tolerance: 0.5,
            min_radius: 0.25,
            max_radius: 2.5,
        }
    }
}

impl MatcherConfig {
    /// Physical radius of a feature in meters
    ///
    /// Uses the first diameter attribute that reads as a positive number. Values above 10 are
    /// taken as millimeters. The result is clamped to `[min_radius, max_radius]`; features
    /// without a usable diameter get `min_radius`.
    pub fn radius(&self, feature: &PointFeature) -> f64 {
        let diameter = self
            .diameter_keys
            .iter()
            .filter_map(|key| feature.attributes.get(key))
            .filter_map(|value| value.as_f64())
            .find(|value| *value > 0.0);

        match diameter {
            Some(raw) => {
                let meters = if raw > MILLIMETER_THRESHOLD {
                    raw / 1000.0
                } else {
                    raw
                };
                (meters / 2.0).clamp(self.min_radius, self.max_radius)
            }
            None => self.min_radius,
        }
    }

    /// Matching tolerance between a required point and a candidate lid
    #[inline]
    pub fn tolerance(&self, point_radius: f64, lid_radius: f64) -> f64 {
        self.base_tolerance
            .max(point_radius + lid_radius.max(self.min_radius))
    }

    #[inline]
    fn is_required(&self, feature: &PointFeature) -> bool {
        self.requires_lid.contains(&feature.type_code)
    }

    #[inline]
    fn is_lid(&self, feature: &PointFeature) -> bool {
        self.lid_codes.contains(&feature.type_code)
    }
}

/// Outcome for one required point
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")
)]
pub enum MatchStatus {
    /// A lid was found within tolerance
    Ok {
        lid_id: String,
        /// Index of the lid in the dataset's point list
        lid_index: usize,
        distance: f64,
        tolerance: f64,
    },
    /// No lid within tolerance
    MissingLid,
}

/// Match result for one required point
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LidMatch {
    pub point_id: String,
    /// Index of the required point in the dataset's point list
    pub point_index: usize,
    pub status: MatchStatus,
}

impl LidMatch {
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self.status, MatchStatus::Ok { .. })
    }
}

/// A lid that no required point selected
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct OrphanLid {
    pub lid_id: String,
    pub lid_index: usize,
}

/// Result of matching a whole dataset
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MatchReport {
    /// One entry per required point, in dataset order
    pub matches: Vec<LidMatch>,
    /// Lids never selected, in dataset order
    pub orphans: Vec<OrphanLid>,
}

impl MatchReport {
    pub fn required_count(&self) -> usize {
        self.matches.len()
    }

    pub fn matched_count(&self) -> usize {
        self.matches.iter().filter(|m| m.is_ok()).count()
    }

    pub fn missing_count(&self) -> usize {
        self.required_count() - self.matched_count()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }
}

/// Match every lid-requiring point of a dataset to its nearest lid
///
/// Among the lids within [`MatcherConfig::tolerance`] of a required point, the one at the
/// smallest 2D distance wins; ties go to the lid listed first.
pub fn match_lids(dataset: &Dataset, config: &MatcherConfig) -> MatchReport {
    #[cfg(feature = "profiling")]
    profiling::scope!("matcher::match_lids");

    let lids: Vec<(usize, &PointFeature, f64)> = dataset
        .points
        .iter()
        .enumerate()
        .filter(|(_, point)| config.is_lid(point))
        .map(|(index, point)| (index, point, config.radius(point)))
        .collect();

    let matches: Vec<LidMatch> = dataset
        .points
        .par_iter()
        .enumerate()
        .filter(|(_, point)| config.is_required(point))
        .map(|(point_index, point)| {
            let point_radius = config.radius(point);
            let nearest = lids
                .iter()
                .filter(|(lid_index, _, _)| *lid_index != point_index)
                .filter_map(|(lid_index, lid, lid_radius)| {
                    let distance = point.geometry.distance_2d(&lid.geometry);
                    let tolerance = config.tolerance(point_radius, *lid_radius);
                    (distance <= tolerance).then_some((*lid_index, *lid, distance, tolerance))
                })
                .fold(None, |best: Option<(usize, &PointFeature, f64, f64)>, candidate| {
                    match best {
                        Some(current) if current.2 <= candidate.2 => Some(current),
                        _ => Some(candidate),
                    }
                });

            let status = match nearest {
                Some((lid_index, lid, distance, tolerance)) => MatchStatus::Ok {
                    lid_id: lid.id.clone(),
                    lid_index,
                    distance,
                    tolerance,
                },
                None => MatchStatus::MissingLid,
            };

            LidMatch {
                point_id: point.id.clone(),
                point_index,
                status,
            }
        })
        .collect();

    let selected: HashSet<usize> = matches
        .iter()
        .filter_map(|m| match m.status {
            MatchStatus::Ok { lid_index, .. } => Some(lid_index),
            MatchStatus::MissingLid => None,
        })
        .collect();

    let orphans: Vec<OrphanLid> = lids
        .iter()
        .filter(|(index, _, _)| !selected.contains(index))
        .map(|(index, lid, _)| OrphanLid {
            lid_id: lid.id.clone(),
            lid_index: *index,
        })
        .collect();

    let report = MatchReport { matches, orphans };
    tracing::debug!(
        required = report.required_count(),
        matched = report.matched_count(),
        orphans = report.orphan_count(),
        "Lid matching finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, Scalar};

    fn chamber(id: &str, x: f64, y: f64) -> PointFeature {
        PointFeature::new(id, "KUM", Coordinate::new(x, y))
    }

    fn lid(id: &str, x: f64, y: f64) -> PointFeature {
        PointFeature::new(id, "LOK", Coordinate::new(x, y))
    }

    fn dataset(points: Vec<PointFeature>) -> Dataset {
        Dataset::new(25832, points, Vec::new())
    }

    #[test]
    fn test_radius_units() {
        let config = MatcherConfig::default();

        // 1000 mm -> 0.5 m radius
        let mm = chamber("K", 0.0, 0.0).with_attribute("DIMENSJON", 1000.0);
        assert!((config.radius(&mm) - 0.5).abs() < 1e-12);

        // 1.6 m -> 0.8 m radius
        let meters = chamber("K", 0.0, 0.0).with_attribute("DIMENSJON", "1.6");
        assert!((config.radius(&meters) - 0.8).abs() < 1e-12);

        // Exactly 10 is meters, clamped to the upper bound
        let ten = chamber("K", 0.0, 0.0).with_attribute("DIMENSJON", 10.0);
        assert_eq!(config.radius(&ten), config.max_radius);

        // Just above 10 is millimeters, clamped to the lower bound
        let tiny = chamber("K", 0.0, 0.0).with_attribute("DIMENSJON", 10.5);
        assert_eq!(config.radius(&tiny), config.min_radius);
    }

    #[test]
    fn test_radius_fallbacks() {
        let config = MatcherConfig::default();

        assert_eq!(config.radius(&chamber("K", 0.0, 0.0)), config.min_radius);

        let unusable = chamber("K", 0.0, 0.0)
            .with_attribute("DIMENSJON", "ukjent")
            .with_attribute("DIAMETER", Scalar::Null)
            .with_attribute("DIM", 0.0)
            .with_attribute("BREDDE", 1200.0);
        assert!((config.radius(&unusable) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_tolerance_formula() {
        let config = MatcherConfig::default();
        assert_eq!(config.tolerance(0.25, 0.25), 0.5);
        assert!((config.tolerance(0.8, 0.5) - 1.3).abs() < 1e-12);
        // Lid radius below the minimum is raised to it
        assert!((config.tolerance(1.0, 0.0) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_identical_coordinates_match() {
        let report = match_lids(
            &dataset(vec![chamber("K1", 5.0, 5.0), lid("L1", 5.0, 5.0)]),
            &MatcherConfig::default(),
        );

        assert_eq!(report.matched_count(), 1);
        assert_eq!(
            report.matches[0].status,
            MatchStatus::Ok {
                lid_id: "L1".into(),
                lid_index: 1,
                distance: 0.0,
                tolerance: 0.5,
            }
        );
        assert!(report.orphans.is_empty());
    }

    #[test]
    fn test_nearest_lid_wins() {
        let chamber = chamber("K1", 0.0, 0.0).with_attribute("DIMENSJON", 2000.0);
        let report = match_lids(
            &dataset(vec![
                lid("FAR", 1.0, 0.0),
                chamber,
                lid("NEAR", 0.0, 0.3),
                lid("OUT", 5.0, 0.0),
            ]),
            &MatcherConfig::default(),
        );

        assert!(matches!(
            &report.matches[0].status,
            MatchStatus::Ok { lid_id, .. } if lid_id == "NEAR"
        ));
        let orphan_ids: Vec<_> = report.orphans.iter().map(|o| o.lid_id.as_str()).collect();
        assert_eq!(orphan_ids, vec!["FAR", "OUT"]);
    }

    #[test]
    fn test_tie_goes_to_first_lid() {
        let report = match_lids(
            &dataset(vec![
                chamber("K1", 0.0, 0.0),
                lid("L1", 0.3, 0.0),
                lid("L2", -0.3, 0.0),
            ]),
            &MatcherConfig::default(),
        );
        assert!(matches!(
            &report.matches[0].status,
            MatchStatus::Ok { lid_id, .. } if lid_id == "L1"
        ));
    }

    #[test]
    fn test_shared_lid_matches_both_points() {
        let report = match_lids(
            &dataset(vec![
                chamber("K1", 0.0, 0.0),
                chamber("K2", 0.6, 0.0),
                lid("L1", 0.3, 0.0),
            ]),
            &MatcherConfig::default(),
        );

        assert_eq!(report.matched_count(), 2);
        for m in &report.matches {
            assert!(matches!(&m.status, MatchStatus::Ok { lid_id, .. } if lid_id == "L1"));
        }
        assert!(report.orphans.is_empty());
    }

    #[test]
    fn test_missing_lid() {
        let report = match_lids(
            &dataset(vec![chamber("K1", 0.0, 0.0), lid("L1", 3.0, 0.0)]),
            &MatcherConfig::default(),
        );

        assert_eq!(report.matches[0].status, MatchStatus::MissingLid);
        assert_eq!(report.missing_count(), 1);
        assert_eq!(report.orphan_count(), 1);
    }

    #[test]
    fn test_large_features_widen_tolerance() {
        let config = MatcherConfig::default();
        let small = match_lids(
            &dataset(vec![chamber("K1", 0.0, 0.0), lid("L1", 1.2, 0.0)]),
            &config,
        );
        assert_eq!(small.matched_count(), 0);

        let large = match_lids(
            &dataset(vec![
                chamber("K1", 0.0, 0.0).with_attribute("DIMENSJON", 2000.0),
                lid("L1", 1.2, 0.0).with_attribute("DIMENSJON", 650.0),
            ]),
            &config,
        );
        // 1.0 + 0.325 >= 1.2
        assert_eq!(large.matched_count(), 1);
    }

    #[test]
    fn test_non_participating_points_are_ignored() {
        let report = match_lids(
            &dataset(vec![
                PointFeature::new("V1", "VEN", Coordinate::new(0.0, 0.0)),
                lid("L1", 0.0, 0.0),
            ]),
            &MatcherConfig::default(),
        );
        assert!(report.matches.is_empty());
        assert_eq!(report.orphan_count(), 1);
    }

    #[test]
    fn test_results_follow_dataset_order() {
        let points: Vec<_> = (0..50)
            .map(|i| chamber(&format!("K{i}"), i as f64 * 10.0, 0.0))
            .chain((0..50).map(|i| lid(&format!("L{i}"), i as f64 * 10.0, 0.1)))
            .collect();
        let report = match_lids(&dataset(points), &MatcherConfig::default());

        for (i, m) in report.matches.iter().enumerate() {
            assert_eq!(m.point_index, i);
            assert!(matches!(
                &m.status,
                MatchStatus::Ok { lid_index, .. } if *lid_index == 50 + i
            ));
        }
        assert!(report.orphans.is_empty());
    }
}
