use std::collections::{BTreeMap, HashMap};

use crate::events::AuditEvent;

use super::{BucketKey, Granularity};

pub const EVENTS_SERIES: &str = "Events";
pub const OTHER_SERIES: &str = "Other";

/// Splits the chart into one series per value of `field`, keeping the
/// `top_n` most frequent values and folding the rest into "Other".
#[derive(Debug, Clone, Copy)]
pub struct Breakdown<'a> {
    pub field: &'a str,
    pub top_n: usize,
}

/// The most frequent values of a field, most frequent first. Equal counts
/// keep the order in which values were first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopValues {
    pub values: Vec<String>,
    /// Number of distinct values in the whole event set
    pub distinct: usize,
}

impl TopValues {
    pub fn overflowed(&self) -> bool {
        self.distinct > self.values.len()
    }
}

pub fn top_values(events: &[AuditEvent], field: &str, n: usize) -> TopValues {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let value = event.category(field);
        match index.get(&value) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(value.clone(), counts.len());
                counts.push((value, 1));
            }
        }
    }

    let distinct = counts.len();
    // stable: ties stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    TopValues {
        values: counts.into_iter().take(n).map(|(v, _)| v).collect(),
        distinct,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCounts {
    pub name: String,
    pub counts: BTreeMap<BucketKey, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub series: Vec<SeriesCounts>,
    /// Events left out because their timestamp was missing, unparseable or
    /// outside the representable calendar
    pub skipped: usize,
}

impl Aggregation {
    pub fn total(&self) -> u64 {
        self.series
            .iter()
            .flat_map(|s| s.counts.values())
            .sum()
    }
}

/// Counts events per bucket, per series.
///
/// Every series starts with a zero for each of `buckets`. An event whose
/// timestamp lands outside `buckets` still counts, under its own key.
pub fn aggregate(
    events: &[AuditEvent],
    buckets: &[BucketKey],
    granularity: Granularity,
    breakdown: Option<&Breakdown<'_>>,
) -> Aggregation {
    let seeded: BTreeMap<BucketKey, u64> = buckets.iter().map(|b| (b.clone(), 0)).collect();
    let new_series = |name: &str| SeriesCounts {
        name: name.to_owned(),
        counts: seeded.clone(),
    };

    let Some(breakdown) = breakdown else {
        let mut series = new_series(EVENTS_SERIES);
        let mut skipped = 0;
        for event in events {
            match event.timestamp().and_then(|ts| granularity.key(ts)) {
                Some(key) => *series.counts.entry(key).or_insert(0) += 1,
                None => skipped += 1,
            }
        }
        return Aggregation {
            series: vec![series],
            skipped,
        };
    };

    let top = top_values(events, breakdown.field, breakdown.top_n);
    let positions: HashMap<&str, usize> = top
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| (v.as_str(), i))
        .collect();
    let other = top.values.len();

    let mut series: Vec<SeriesCounts> = top
        .values
        .iter()
        .map(|v| new_series(v.as_str()))
        .collect();
    series.push(new_series(OTHER_SERIES));

    let mut skipped = 0;
    for event in events {
        let Some(key) = event.timestamp().and_then(|ts| granularity.key(ts)) else {
            skipped += 1;
            continue;
        };
        let value = event.category(breakdown.field);
        let idx = positions.get(value.as_str()).copied().unwrap_or(other);
        *series[idx].counts.entry(key).or_insert(0) += 1;
    }

    if !top.overflowed() {
        series.pop();
    }

    Aggregation { series, skipped }
}
