//! Aggregator: turns per-data-point scores into a ranked leaderboard.
//!
//! The aggregation rules are fixed:
//! 1. A backend's average covers only the data points where it holds a
//!    score record. Skips and parse failures never enter the denominator.
//! 2. Averages are rounded to two decimals; equal rounded averages share a
//!    rank and the next distinct average takes the next rank number.
//! 3. Backends without a single score are listed last, unranked.
//!
//! The result depends only on the set of backends and their scores, never
//! on the order backends were selected in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::DataPointScores;

/// Whether a backend could be ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandingStatus {
    Ranked,
    /// The backend has no valid score at all
    NoScore,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// Shared rank position, `None` for [`StandingStatus::NoScore`]
    pub rank: Option<usize>,
    pub model_id: String,

    /// Average rounded to two decimals
    pub average_score: Option<f64>,

    /// Number of data points that contributed a score
    pub scored_points: usize,
    pub status: StandingStatus,
}

/// Ranked standings, best first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Leaderboard {
    standings: Vec<Standing>,
}

impl Leaderboard {
    pub fn standings(&self) -> &[Standing] {
        &self.standings
    }

    pub fn get(&self, model_id: &str) -> Option<&Standing> {
        self.standings.iter().find(|s| s.model_id == model_id)
    }

    /// Averages keyed by backend id; no-score backends map to `None`.
    pub fn average_scores(&self) -> BTreeMap<String, Option<f64>> {
        self.standings
            .iter()
            .map(|s| (s.model_id.clone(), s.average_score))
            .collect()
    }

    /// Total score records behind the leaderboard.
    pub fn total_scored(&self) -> usize {
        self.standings.iter().map(|s| s.scored_points).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }
}

/// Combines score records into a [`Leaderboard`].
#[derive(Debug, Default)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate scores for the given backends.
    ///
    /// Every backend in `backends` appears in the leaderboard. Score records
    /// for ids outside `backends` are ignored.
    pub fn aggregate(&self, backends: &[String], scores: &[DataPointScores]) -> Leaderboard {
        let mut totals: BTreeMap<&str, (u32, usize)> = backends
            .iter()
            .map(|id| (id.as_str(), (0u32, 0usize)))
            .collect();

        for point in scores {
            for (model_id, record) in &point.scores {
                if let Some((sum, count)) = totals.get_mut(model_id.as_str()) {
                    *sum += u32::from(record.score.value());
                    *count += 1;
                }
            }
        }

        // Averages compared as whole hundredths so ties are exact.
        let mut ranked: Vec<(&str, i64, usize)> = Vec::new();
        let mut unscored: Vec<&str> = Vec::new();
        for (&model_id, &(sum, count)) in &totals {
            if count == 0 {
                unscored.push(model_id);
            } else {
                let hundredths = (f64::from(sum) * 100.0 / count as f64).round() as i64;
                ranked.push((model_id, hundredths, count));
            }
        }

        // Descending average, then id, so the row order is deterministic.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut standings = Vec::with_capacity(totals.len());
        let mut rank = 0;
        let mut previous: Option<i64> = None;
        for (model_id, hundredths, count) in ranked {
            if previous != Some(hundredths) {
                rank += 1;
                previous = Some(hundredths);
            }
            standings.push(Standing {
                rank: Some(rank),
                model_id: model_id.to_string(),
                average_score: Some(hundredths as f64 / 100.0),
                scored_points: count,
                status: StandingStatus::Ranked,
            });
        }

        for model_id in unscored {
            tracing::debug!(model_id = model_id, "Backend has no valid scores");
            standings.push(Standing {
                rank: None,
                model_id: model_id.to_string(),
                average_score: None,
                scored_points: 0,
                status: StandingStatus::NoScore,
            });
        }

        Leaderboard { standings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataPoint, Score, ScoreRecord};
    use proptest::prelude::*;

    fn point(index: usize, scores: &[(&str, u8)]) -> DataPointScores {
        let mut p = DataPointScores::new(index, DataPoint::from("x"));
        for (id, value) in scores {
            p.scores
                .insert(id.to_string(), ScoreRecord::new(Score::new(*value).unwrap()));
        }
        p
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ties_share_rank_without_gap() {
        let board = Aggregator::new().aggregate(
            &ids(&["A", "B", "C"]),
            &[point(0, &[("A", 8), ("B", 8), ("C", 6)])],
        );
        assert_eq!(board.get("A").unwrap().rank, Some(1));
        assert_eq!(board.get("B").unwrap().rank, Some(1));
        assert_eq!(board.get("C").unwrap().rank, Some(2));
    }

    #[test]
    fn test_average_excludes_missing_points() {
        // backend-2 was skipped on the first point and scored 6 on the second.
        let board = Aggregator::new().aggregate(
            &ids(&["backend-1", "backend-2"]),
            &[
                point(0, &[("backend-1", 7)]),
                point(1, &[("backend-1", 5), ("backend-2", 6)]),
            ],
        );

        let first = board.get("backend-1").unwrap();
        let second = board.get("backend-2").unwrap();
        assert_eq!(first.average_score, Some(6.0));
        assert_eq!(first.scored_points, 2);
        assert_eq!(second.average_score, Some(6.0));
        assert_eq!(second.scored_points, 1);
        assert_eq!(first.rank, Some(1));
        assert_eq!(second.rank, Some(1));
    }

    #[test]
    fn test_unscored_backend_flagged_and_last() {
        let board = Aggregator::new().aggregate(
            &ids(&["silent", "loud"]),
            &[point(0, &[("loud", 2)])],
        );

        let standings = board.standings();
        assert_eq!(standings[0].model_id, "loud");
        assert_eq!(standings[1].model_id, "silent");
        assert_eq!(standings[1].status, StandingStatus::NoScore);
        assert_eq!(standings[1].rank, None);
        assert_eq!(standings[1].average_score, None);
        assert_eq!(board.average_scores().get("silent"), Some(&None));
    }

    #[test]
    fn test_average_rounded_to_two_decimals() {
        let board = Aggregator::new().aggregate(
            &ids(&["a", "b"]),
            &[
                point(0, &[("a", 7), ("b", 1)]),
                point(1, &[("a", 8)]),
                point(2, &[("a", 8)]),
            ],
        );
        assert_eq!(board.get("a").unwrap().average_score, Some(7.67));
        assert_eq!(board.total_scored(), 4);
    }

    #[test]
    fn test_unknown_ids_ignored() {
        let board =
            Aggregator::new().aggregate(&ids(&["a", "b"]), &[point(0, &[("a", 4), ("zzz", 9)])]);
        assert!(board.get("zzz").is_none());
        assert_eq!(board.standings().len(), 2);
    }

    #[test]
    fn test_leaderboard_serializes_as_list() {
        let board = Aggregator::new().aggregate(&ids(&["a", "b"]), &[point(0, &[("a", 4)])]);
        let json = serde_json::to_value(&board).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["status"], "ranked");
        assert_eq!(json[1]["rank"], serde_json::Value::Null);
    }

    proptest! {
        #[test]
        fn test_ranking_ignores_backend_order(
            raw in proptest::collection::vec(
                proptest::collection::vec(proptest::option::of(1u8..=10), 3),
                1..6,
            ),
            rotation in 0usize..3,
        ) {
            let names = ["alpha", "beta", "gamma"];
            let scores: Vec<DataPointScores> = raw
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let entries: Vec<(&str, u8)> = names
                        .iter()
                        .zip(row)
                        .filter_map(|(name, s)| s.map(|v| (*name, v)))
                        .collect();
                    point(i, &entries)
                })
                .collect();

            let mut reordered = ids(&names);
            reordered.rotate_left(rotation);

            let board = Aggregator::new().aggregate(&ids(&names), &scores);
            let other = Aggregator::new().aggregate(&reordered, &scores);
            prop_assert_eq!(board, other);
        }

        #[test]
        fn test_ranks_follow_averages(
            values in proptest::collection::vec(1u8..=10, 3),
        ) {
            let names = ["alpha", "beta", "gamma"];
            let entries: Vec<(&str, u8)> =
                names.iter().copied().zip(values.iter().copied()).collect();
            let board = Aggregator::new().aggregate(&ids(&names), &[point(0, &entries)]);

            for pair in board.standings().windows(2) {
                prop_assert!(pair[0].average_score >= pair[1].average_score);
                let same = pair[0].average_score == pair[1].average_score;
                prop_assert_eq!(same, pair[0].rank == pair[1].rank);
            }
        }
    }
}
