//! Pipe profile generation
//!
//! Turns a pipe centerline into a dense sequence of evenly spaced points that can be
//! correlated with ground elevation. Each segment is split into equal sub-steps instead of
//! marching a fixed distance along the whole line, so no remainder drifts across segment
//! boundaries and every surveyed vertex is reproduced exactly.

use crate::{Coordinate, Result, SurveyError};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Segments shorter than this are treated as duplicate vertices and not sampled
pub const MIN_SEGMENT_LENGTH: f64 = 1e-4;

/// Slack applied before flooring the step count, absorbs `9.0 / 3.0 = 2.999...` style errors
const STEP_EPSILON: f64 = 1e-9;

/// Upper bound on sub-steps in a single segment
pub const MAX_SEGMENT_STEPS: usize = 1_000_000;

/// Upper bound on the up-front allocation for a profile
const MAX_PREALLOCATED_POINTS: usize = 65_536;

/// A sampled point along a polyline
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ProfilePoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    /// Cumulative 2D distance from the first vertex
    pub dist: f64,
    /// Whether this point is one of the original vertices
    pub is_vertex: bool,
    /// Index of the original vertex, for vertex points
    pub vertex_index: Option<usize>,
}

impl ProfilePoint {
    #[inline]
    fn vertex(coordinate: &Coordinate, index: usize, dist: f64) -> Self {
        Self {
            x: coordinate.x,
            y: coordinate.y,
            z: coordinate.z,
            dist,
            is_vertex: true,
            vertex_index: Some(index),
        }
    }

    /// Position of the point as a coordinate
    #[inline]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }
}

/// Generate profile points along a polyline
///
/// # Arguments
/// * `vertices` - Ordered polyline vertices (2D or 3D)
/// * `spacing` - Nominal distance between samples, must be finite and > 0
///
/// # Returns
/// The profile points in order. Zero vertices give an empty profile, a single vertex gives
/// one point at distance 0. Segments shorter than [`MIN_SEGMENT_LENGTH`] are not sampled,
/// but their end vertex is still emitted (at an unchanged distance).
///
/// A segment of length `L` is split into `max(1, floor(L / spacing))` equal steps, so the
/// effective spacing is never below the nominal one unless the segment itself is shorter.
///
/// A segment with a non-finite length, or one that would need more than
/// [`MAX_SEGMENT_STEPS`] sub-steps, fails with [`SurveyError::SegmentTooLong`].
pub fn profile(vertices: &[Coordinate], spacing: f64) -> Result<Vec<ProfilePoint>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("profile::profile");

    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(SurveyError::InvalidSpacing(spacing));
    }

    let Some(first) = vertices.first() else {
        return Ok(Vec::new());
    };

    let estimate = polyline_length(vertices) / spacing;
    let capacity = (estimate as usize)
        .min(MAX_PREALLOCATED_POINTS)
        .saturating_add(vertices.len());
    let mut points = Vec::with_capacity(capacity);
    points.push(ProfilePoint::vertex(first, 0, 0.0));

    let mut cumulative = 0.0;
    for (index, pair) in vertices.windows(2).enumerate() {
        let (start, end) = (&pair[0], &pair[1]);
        let end_index = index + 1;
        let length = start.distance_2d(end);
        let too_long = || SurveyError::SegmentTooLong {
            segment: index,
            length,
            spacing,
        };

        if !length.is_finite() {
            return Err(too_long());
        }
        if length < MIN_SEGMENT_LENGTH {
            points.push(ProfilePoint::vertex(end, end_index, cumulative));
            continue;
        }

        let ratio = (length / spacing + STEP_EPSILON).floor();
        if ratio > MAX_SEGMENT_STEPS as f64 {
            return Err(too_long());
        }
        let steps = (ratio as usize).max(1);
        let z_pair = start.z.zip(end.z);

        for step in 1..steps {
            let t = step as f64 / steps as f64;
            points.push(ProfilePoint {
                x: start.x + (end.x - start.x) * t,
                y: start.y + (end.y - start.y) * t,
                z: z_pair.map(|(z0, z1)| z0 + (z1 - z0) * t),
                dist: cumulative + length * t,
                is_vertex: false,
                vertex_index: None,
            });
        }

        cumulative += length;
        points.push(ProfilePoint::vertex(end, end_index, cumulative));
    }

    Ok(points)
}

/// Total 2D length of a polyline, skipping segments shorter than [`MIN_SEGMENT_LENGTH`]
///
/// This is the distance reported by the last point of [`profile`].
pub fn polyline_length(vertices: &[Coordinate]) -> f64 {
    vertices
        .windows(2)
        .map(|pair| pair[0].distance_2d(&pair[1]))
        .filter(|length| *length >= MIN_SEGMENT_LENGTH)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn create_test_polyline() -> Vec<Coordinate> {
        vec![
            Coordinate::with_z(0.0, 0.0, 10.0),
            Coordinate::with_z(4.0, 3.0, 9.0),
            Coordinate::new(4.0, 10.0),
            Coordinate::with_z(12.5, 10.0, 7.0),
        ]
    }

    #[test]
    fn test_empty_polyline() {
        assert!(profile(&[], 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_single_vertex() {
        let points = profile(&[Coordinate::with_z(5.0, 6.0, 1.0)], 1.0).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].dist, 0.0);
        assert!(points[0].is_vertex);
        assert_eq!(points[0].vertex_index, Some(0));
        assert_eq!(points[0].z, Some(1.0));
    }

    #[test]
    fn test_invalid_spacing_is_rejected() {
        let line = create_test_polyline();
        assert!(matches!(
            profile(&line, 0.0),
            Err(SurveyError::InvalidSpacing(_))
        ));
        assert!(profile(&line, -1.0).is_err());
        assert!(profile(&line, f64::NAN).is_err());
        assert!(profile(&line, f64::INFINITY).is_err());
    }

    #[test]
    fn test_straight_segment_spacing_three() {
        let line = [Coordinate::new(0.0, 0.0), Coordinate::new(10.0, 0.0)];
        let points = profile(&line, 3.0).unwrap();

        assert_eq!(points.len(), 4);
        let expected = [0.0, 10.0 / 3.0, 20.0 / 3.0, 10.0];
        for (point, dist) in points.iter().zip(expected) {
            assert_close(point.dist, dist);
            assert_close(point.x, dist);
        }
        assert!(points[0].is_vertex && points[3].is_vertex);
        assert!(!points[1].is_vertex && !points[2].is_vertex);
    }

    #[test]
    fn test_exact_multiple_of_spacing() {
        let line = [Coordinate::new(0.0, 0.0), Coordinate::new(9.0, 0.0)];
        let points = profile(&line, 3.0).unwrap();
        let dists: Vec<_> = points.iter().map(|p| p.dist).collect();
        assert_eq!(dists.len(), 4);
        assert_close(dists[1], 3.0);
        assert_close(dists[2], 6.0);
    }

    #[test]
    fn test_segment_shorter_than_spacing() {
        let line = [Coordinate::new(0.0, 0.0), Coordinate::new(0.5, 0.0)];
        let points = profile(&line, 3.0).unwrap();
        assert_eq!(points.len(), 2);
        assert_close(points[1].dist, 0.5);
    }

    #[test]
    fn test_distances_non_decreasing_and_end_at_length() {
        let line = create_test_polyline();
        for spacing in [0.3, 1.0, 2.5, 7.0, 100.0] {
            let points = profile(&line, spacing).unwrap();
            for pair in points.windows(2) {
                assert!(pair[1].dist >= pair[0].dist);
            }
            let last = points.last().unwrap();
            assert_close(last.dist, polyline_length(&line));
            assert_close(last.dist, 5.0 + 7.0 + 8.5);
        }
    }

    #[test]
    fn test_every_vertex_appears_once() {
        let line = create_test_polyline();
        let points = profile(&line, 1.0).unwrap();

        let vertex_points: Vec<_> = points.iter().filter(|p| p.is_vertex).collect();
        assert_eq!(vertex_points.len(), line.len());
        for (index, (point, vertex)) in vertex_points.iter().zip(&line).enumerate() {
            assert_eq!(point.vertex_index, Some(index));
            assert_eq!(point.coordinate(), *vertex);
        }
        assert!(points.iter().all(|p| p.is_vertex == p.vertex_index.is_some()));
        assert_eq!(points.first().unwrap().coordinate(), line[0]);
        assert_eq!(points.last().unwrap().coordinate(), line[3]);
    }

    #[test]
    fn test_z_interpolation_requires_both_endpoints() {
        let line = create_test_polyline();
        let points = profile(&line, 1.0).unwrap();

        // First segment (10.0 -> 9.0 over 5 units): interpolated
        let midpoint = points.iter().find(|p| !p.is_vertex && p.dist < 5.0).unwrap();
        let z = midpoint.z.unwrap();
        assert!(z < 10.0 && z > 9.0);
        assert_close(z, 10.0 - midpoint.dist / 5.0);

        // Segments touching the 2D vertex: no z on interpolated points
        assert!(
            points
                .iter()
                .filter(|p| !p.is_vertex && p.dist > 5.0)
                .all(|p| p.z.is_none())
        );

        // Vertices keep their own z
        let last = points.last().unwrap();
        assert_eq!(last.z, Some(7.0));
    }

    #[test]
    fn test_duplicate_vertices_are_not_sampled() {
        let line = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(2.0, 0.0),
            Coordinate::new(2.0, 0.00001),
            Coordinate::new(4.0, 0.0),
        ];
        let points = profile(&line, 1.0).unwrap();

        // 0, 1, 2 | duplicate 2 | 3, 4
        assert_eq!(points.len(), 6);
        assert_eq!(points[2].vertex_index, Some(1));
        assert_eq!(points[3].vertex_index, Some(2));
        assert_close(points[2].dist, points[3].dist);
        assert!(points.iter().filter(|p| p.is_vertex).count() == 4);
    }

    #[test]
    fn test_oversized_segment_is_rejected() {
        let line = [Coordinate::new(0.0, 0.0), Coordinate::new(1e300, 0.0)];
        assert!(matches!(
            profile(&line, 1.0),
            Err(SurveyError::SegmentTooLong { segment: 0, .. })
        ));

        // Fine for a sane line, too dense for a tiny spacing
        let line = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(5.0, 0.0),
            Coordinate::new(10.0, 0.0),
        ];
        assert!(profile(&line, 1e-3).is_ok());
        assert!(matches!(
            profile(&line, 1e-12),
            Err(SurveyError::SegmentTooLong { segment: 0, .. })
        ));
    }

    #[test]
    fn test_non_finite_segment_is_rejected() {
        let line = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(f64::NAN, 0.0),
        ];
        assert!(matches!(
            profile(&line, 1.0),
            Err(SurveyError::SegmentTooLong { segment: 1, .. })
        ));

        let line = [Coordinate::new(0.0, 0.0), Coordinate::new(f64::INFINITY, 0.0)];
        assert!(profile(&line, 1.0).is_err());
    }

    #[test]
    fn test_profile_is_idempotent() {
        let line = create_test_polyline();
        let first = profile(&line, 0.7).unwrap();
        let second = profile(&line, 0.7).unwrap();
        assert_eq!(first, second);
    }
}
