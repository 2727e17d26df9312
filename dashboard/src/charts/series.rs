use serde::Serialize;

use super::aggregate::Aggregation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    /// Bucket start, epoch milliseconds
    pub x: i64,
    pub y: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Series {
    pub name: String,
    #[serde(rename = "data")]
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn total(&self) -> u64 {
        self.points.iter().map(|p| p.y).sum()
    }
}

/// Turns per-series bucket counts into points ordered by bucket key.
/// Series keep the aggregation's order: ranked values first, "Other" last.
pub fn build_series(aggregation: &Aggregation) -> Vec<Series> {
    aggregation
        .series
        .iter()
        .map(|s| Series {
            name: s.name.clone(),
            points: s
                .counts
                .iter()
                .map(|(key, &count)| SeriesPoint {
                    x: key.epoch_millis(),
                    y: count,
                })
                .collect(),
        })
        .collect()
}
