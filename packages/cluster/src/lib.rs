#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Representative map coordinates for a region's hotspots.
//!
//! Picks `k` hotspots spread as far apart as possible using the greedy
//! farthest-point (k-center) heuristic over great-circle distance. The
//! number of centers grows with the log of the hotspot count so a small
//! county and a whole country both get a readable set of map pins.

use bird_targets_models::{ClusterCenter, GeoPoint};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Tunables for [`desired_clusters`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Multiplier on `log2(n)`.
    pub scale: f64,
    /// Lower bound on the number of centers.
    pub min_k: usize,
    /// Upper bound on the number of centers.
    pub max_k: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            scale: 1.5,
            min_k: 3,
            max_k: 30,
        }
    }
}

/// Great-circle distance between two points in kilometres.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = normalize_longitude_delta(b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Maps a longitude difference into `(-180, 180]`.
fn normalize_longitude_delta(delta: f64) -> f64 {
    let delta = delta % 360.0;
    if delta <= -180.0 {
        delta + 360.0
    } else if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Number of centers for `n` points: `clamp(ceil(scale * log2(n)), min_k, max_k)`.
///
/// `max_k` wins when the bounds are inverted (`min_k > max_k`).
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn desired_clusters(n: usize, params: &ClusterParams) -> usize {
    if n == 0 {
        return params.min_k.min(params.max_k);
    }
    let k = (params.scale * (n as f64).log2()).ceil().max(0.0) as usize;
    k.max(params.min_k).min(params.max_k)
}

/// Greedy farthest-point selection of `k` centers.
///
/// The first center is the point nearest `anchor`, or the first point when
/// there is no anchor. Each following center is the point farthest from
/// all chosen centers; ties go to the earliest point. When there are no
/// more points than `k`, every point is returned in input order.
#[must_use]
pub fn k_center(points: &[GeoPoint], k: usize, anchor: Option<GeoPoint>) -> Vec<GeoPoint> {
    if points.is_empty() || k == 0 {
        return Vec::new();
    }
    if points.len() <= k {
        return points.to_vec();
    }

    let first = anchor.map_or(0, |anchor| nearest_index(points, anchor));
    let mut centers = Vec::with_capacity(k);
    centers.push(points[first]);

    let mut chosen = vec![false; points.len()];
    chosen[first] = true;
    let mut min_dist: Vec<f64> = points
        .iter()
        .map(|p| haversine_km(*p, points[first]))
        .collect();

    while centers.len() < k {
        let mut best = None;
        let mut best_dist = f64::NEG_INFINITY;
        for (i, &d) in min_dist.iter().enumerate() {
            if !chosen[i] && d > best_dist {
                best = Some(i);
                best_dist = d;
            }
        }
        let Some(best) = best else {
            break;
        };

        let center = points[best];
        chosen[best] = true;
        centers.push(center);
        for (slot, point) in min_dist.iter_mut().zip(points) {
            *slot = slot.min(haversine_km(*point, center));
        }
    }

    centers
}

fn nearest_index(points: &[GeoPoint], anchor: GeoPoint) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, point) in points.iter().enumerate() {
        let d = haversine_km(*point, anchor);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Computes cluster centers for a region's hotspots.
///
/// Coordinates are rounded to 3 decimals after selection.
#[must_use]
pub fn generate_clusters(
    points: &[GeoPoint],
    anchor: Option<GeoPoint>,
    params: &ClusterParams,
) -> Vec<ClusterCenter> {
    let k = desired_clusters(points.len(), params);
    let centers = k_center(points, k, anchor);

    log::debug!("Selected {} centers from {} points", centers.len(), points.len());

    centers
        .into_iter()
        .map(|p| ClusterCenter {
            lat: round3(p.lat),
            lng: round3(p.lng),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng)
    }

    #[test]
    fn distance_across_antimeridian() {
        let d = haversine_km(p(0.0, 179.0), p(0.0, -179.0));
        assert!((d - 222.39).abs() < 0.1, "got {d}");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let a = p(40.7, -74.0);
        let b = p(51.5, -0.1);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
        assert!(haversine_km(a, a).abs() < 1e-9);
        // New York to London
        assert!((haversine_km(a, b) - 5570.0).abs() < 20.0);
    }

    #[test]
    fn longitude_delta_range() {
        assert!((normalize_longitude_delta(-358.0) - 2.0).abs() < 1e-9);
        assert!((normalize_longitude_delta(180.0) - 180.0).abs() < 1e-9);
        assert!((normalize_longitude_delta(-180.0) - 180.0).abs() < 1e-9);
        assert!((normalize_longitude_delta(540.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn desired_cluster_counts() {
        let params = ClusterParams::default();
        assert_eq!(desired_clusters(0, &params), 3);
        assert_eq!(desired_clusters(1, &params), 3);
        assert_eq!(desired_clusters(8, &params), 5);
        assert_eq!(desired_clusters(1_000, &params), 15);
        assert_eq!(desired_clusters(10_000_000_000, &params), 30);
    }

    #[test]
    fn inverted_bounds_use_the_upper_bound() {
        let params = ClusterParams {
            scale: 1.5,
            min_k: 10,
            max_k: 4,
        };
        assert_eq!(desired_clusters(0, &params), 4);
        assert_eq!(desired_clusters(2, &params), 4);
        assert_eq!(desired_clusters(1_000, &params), 4);
    }

    #[test]
    fn few_points_are_returned_as_is() {
        let points = vec![p(1.0, 1.0), p(2.0, 2.0), p(3.0, 3.0)];
        assert_eq!(k_center(&points, 3, None), points);
        assert_eq!(k_center(&points, 10, Some(p(3.0, 3.0))), points);
    }

    #[test]
    fn empty_and_zero_k() {
        assert!(k_center(&[], 3, None).is_empty());
        assert!(k_center(&[p(1.0, 1.0), p(2.0, 2.0)], 0, None).is_empty());
        assert!(generate_clusters(&[], None, &ClusterParams::default()).is_empty());
    }

    #[test]
    fn single_center_is_nearest_to_anchor() {
        let points = vec![p(0.0, 0.0), p(10.0, 10.0), p(20.0, 20.0)];
        assert_eq!(k_center(&points, 1, Some(p(11.0, 9.0))), vec![p(10.0, 10.0)]);
        assert_eq!(k_center(&points, 1, None), vec![p(0.0, 0.0)]);
    }

    #[test]
    fn picks_farthest_points() {
        let points = vec![
            p(0.0, 0.0),
            p(0.0, 0.1),
            p(0.0, 50.0),
            p(0.0, 0.2),
            p(0.0, 25.0),
        ];
        let centers = k_center(&points, 3, None);
        assert_eq!(centers, vec![p(0.0, 0.0), p(0.0, 50.0), p(0.0, 25.0)]);
    }

    #[test]
    fn ties_go_to_first_point() {
        let points = vec![p(0.0, 0.0), p(0.0, 10.0), p(0.0, -10.0), p(5.0, 5.0)];
        let centers = k_center(&points, 2, None);
        assert_eq!(centers, vec![p(0.0, 0.0), p(0.0, 10.0)]);
    }

    #[test]
    fn duplicate_points_are_not_picked_twice() {
        let points = vec![p(1.0, 1.0), p(1.0, 1.0), p(1.0, 1.0), p(1.0, 1.0)];
        let centers = k_center(&points, 3, None);
        assert_eq!(centers.len(), 3);
    }

    #[test]
    fn clusters_are_rounded_after_selection() {
        let points = vec![
            p(10.123_456, 20.987_654),
            p(11.0, 21.0),
            p(12.0, 22.0),
            p(13.0, 23.0),
        ];
        let params = ClusterParams {
            scale: 1.0,
            min_k: 1,
            max_k: 1,
        };
        let clusters = generate_clusters(&points, None, &params);
        assert_eq!(clusters, vec![ClusterCenter { lat: 10.123, lng: 20.988 }]);
    }

    #[test]
    fn cluster_count_matches_request_for_large_sets() {
        let points: Vec<_> = (0..100)
            .map(|i| p(f64::from(i) * 0.1, f64::from(i % 10)))
            .collect();
        let clusters = generate_clusters(&points, None, &ClusterParams::default());
        assert_eq!(clusters.len(), desired_clusters(100, &ClusterParams::default()));
    }
}
