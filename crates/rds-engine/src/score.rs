//! Road Distress Score aggregation
//!
//! ```text
//! raw = 1 / (1 + avg_potholes * 3 + avg_rough * 2)
//! RDS = raw^3 * 100 + avg_lanes * 20 + avg_signs * 10
//! avg_RDS = clamp(RDS, 0, 100)
//! ```
//!
//! Potholes and rough-road segments penalise the score; lane markings and
//! signs add to it. The clamp is the only upper bound.

use serde::{Deserialize, Serialize};

use crate::ObservationSeries;

/// Penalty weight per average pothole
pub const POTHOLE_WEIGHT: f64 = 3.0;
/// Penalty weight per average rough-road segment
pub const ROUGH_WEIGHT: f64 = 2.0;
/// Bonus per average lane detection
pub const LANE_WEIGHT: f64 = 20.0;
/// Bonus per average sign detection
pub const SIGN_WEIGHT: f64 = 10.0;
/// Score ceiling
pub const MAX_SCORE: f64 = 100.0;

/// Per-category means and the bounded score for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub avg_potholes: f64,
    pub avg_rough: f64,
    pub avg_lanes: f64,
    pub avg_signs: f64,
    #[serde(rename = "avg_RDS")]
    pub avg_rds: f64,
}

impl Summary {
    /// Reduce a series to its summary. An empty series averages to zero.
    pub fn from_series(series: &ObservationSeries) -> Self {
        if series.is_empty() {
            return Self::from_averages(0.0, 0.0, 0.0, 0.0);
        }

        let n = series.len() as f64;
        let mean = |field: fn(&crate::Observation) -> u32| {
            series.iter().map(|o| field(o) as f64).sum::<f64>() / n
        };

        Self::from_averages(
            mean(|o| o.potholes),
            mean(|o| o.rough),
            mean(|o| o.lanes),
            mean(|o| o.signs),
        )
    }

    pub fn from_averages(avg_potholes: f64, avg_rough: f64, avg_lanes: f64, avg_signs: f64) -> Self {
        Self {
            avg_potholes,
            avg_rough,
            avg_lanes,
            avg_signs,
            avg_rds: distress_score(avg_potholes, avg_rough, avg_lanes, avg_signs),
        }
    }
}

/// Distress penalty term in (0, 1]; exactly 1 for a road without distress
pub fn distress_penalty(avg_potholes: f64, avg_rough: f64) -> f64 {
    1.0 / (1.0 + avg_potholes * POTHOLE_WEIGHT + avg_rough * ROUGH_WEIGHT)
}

/// Road Distress Score clamped into `[0, 100]`
pub fn distress_score(avg_potholes: f64, avg_rough: f64, avg_lanes: f64, avg_signs: f64) -> f64 {
    let raw = distress_penalty(avg_potholes, avg_rough);
    let score = raw.powi(3) * MAX_SCORE + avg_lanes * LANE_WEIGHT + avg_signs * SIGN_WEIGHT;
    score.clamp(0.0, MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Observation;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_series_is_perfect() {
        let summary = Summary::from_series(&ObservationSeries::new());
        assert_eq!(summary, Summary {
            avg_potholes: 0.0,
            avg_rough: 0.0,
            avg_lanes: 0.0,
            avg_signs: 0.0,
            avg_rds: 100.0,
        });
    }

    #[test]
    fn test_clean_frames_score_100() {
        let series: ObservationSeries = vec![Observation::default(); 5].into();
        let summary = Summary::from_series(&series);
        assert_eq!(summary.avg_potholes, 0.0);
        assert_eq!(summary.avg_rds, 100.0);
    }

    #[test]
    fn test_one_pothole_per_frame() {
        let summary = Summary::from_averages(1.0, 0.0, 0.0, 0.0);
        assert!(approx(distress_penalty(1.0, 0.0), 0.25));
        assert!(approx(summary.avg_rds, 1.5625));
    }

    #[test]
    fn test_means_over_series() {
        let series: ObservationSeries = vec![
            Observation::new(2, 1, 0, 3),
            Observation::new(0, 0, 4, 1),
            Observation::new(1, 2, 2, 2),
        ]
        .into();
        let summary = Summary::from_series(&series);
        assert!(approx(summary.avg_potholes, 1.0));
        assert!(approx(summary.avg_rough, 1.0));
        assert!(approx(summary.avg_lanes, 2.0));
        assert!(approx(summary.avg_signs, 2.0));
        // raw = 1/6, raw^3*100 ~= 0.463, plus 40 + 20
        assert!(approx(summary.avg_rds, 100.0 / 216.0 + 60.0));
    }

    #[test]
    fn test_lane_bonus_is_clamped() {
        let summary = Summary::from_averages(0.0, 0.0, 3.0, 2.0);
        assert_eq!(summary.avg_rds, 100.0);
    }

    #[test]
    fn test_rough_weighted_below_potholes() {
        assert!(distress_score(0.0, 1.0, 0.0, 0.0) > distress_score(1.0, 0.0, 0.0, 0.0));
        // raw = 1/3
        assert!(approx(distress_score(0.0, 1.0, 0.0, 0.0), 100.0 / 27.0));
    }

    #[test]
    fn test_summary_serializes_score_key() {
        let json = serde_json::to_value(Summary::from_averages(0.0, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(json["avg_RDS"], 100.0);
        assert!(json.get("avg_rds").is_none());
    }

    proptest! {
        #[test]
        fn prop_score_bounded(p in 0f64..1e6, r in 0f64..1e6, l in 0f64..1e6, s in 0f64..1e6) {
            let score = distress_score(p, r, l, s);
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn prop_no_distress_hits_ceiling(l in 0f64..100.0, s in 0f64..100.0) {
            prop_assert_eq!(distress_penalty(0.0, 0.0), 1.0);
            prop_assert_eq!(distress_score(0.0, 0.0, l, s), 100.0);
        }

        #[test]
        fn prop_more_potholes_never_better(p in 0f64..50.0, extra in 0f64..50.0, r in 0f64..50.0) {
            prop_assert!(distress_score(p + extra, r, 0.0, 0.0) <= distress_score(p, r, 0.0, 0.0));
        }
    }
}
