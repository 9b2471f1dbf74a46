//! Leaderboard derivation from a statistics snapshot.

use crate::stats::{DeviceStatistics, Statistics};
use serde::Serialize;

/// One ranked entry. Serializes flat:
/// `{"device_id": ..., "total_answers": ..., "total_correct_answers": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardItem {
    pub device_id: String,
    #[serde(flatten)]
    pub stats: DeviceStatistics,
}

/// Rank devices ascending by correct-answer count.
///
/// Each device is placed by binary search on its score; equal scores keep the
/// first-observed order of the snapshot, so re-running over a growing event
/// never reshuffles tied devices.
pub fn build(statistics: &Statistics) -> Vec<LeaderboardItem> {
    let mut ranked: Vec<(usize, LeaderboardItem)> = Vec::with_capacity(statistics.len());
    for (device_id, stats) in statistics.devices() {
        let score = stats.total_correct_answers();
        let position = ranked.partition_point(|(ranked_score, _)| *ranked_score <= score);
        ranked.insert(
            position,
            (
                score,
                LeaderboardItem {
                    device_id: device_id.clone(),
                    stats: stats.clone(),
                },
            ),
        );
    }
    ranked.into_iter().map(|(_, item)| item).collect()
}
