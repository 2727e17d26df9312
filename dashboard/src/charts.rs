pub mod aggregate;
pub mod series;
pub mod svg;

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, Timelike, Utc};
use serde::Serialize;
use tracing::debug;

use crate::events::AuditEvent;
use crate::query::DateRange;

pub use aggregate::Breakdown;
pub use series::{Series, SeriesPoint};

/// Width of a chart bucket. Ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    /// Picks the bucket width for a date range by its span in whole days.
    /// Without a range the chart falls back to daily buckets.
    pub fn for_range(range: Option<&DateRange>) -> Self {
        let Some(range) = range else {
            return Granularity::Day;
        };
        match range.span_days() {
            ..=1 => Granularity::Hour,
            2..=60 => Granularity::Day,
            61..=365 => Granularity::Week,
            _ => Granularity::Month,
        }
    }

    /// Start of the bucket containing `ts`. Weeks start on Monday.
    /// `None` when the bucket start falls outside chrono's date range.
    pub fn truncate(self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = ts.date_naive();
        let midnight = date.and_time(NaiveTime::MIN).and_utc();
        match self {
            Granularity::Hour => midnight.checked_add_signed(Duration::hours(i64::from(ts.hour()))),
            Granularity::Day => Some(midnight),
            Granularity::Week => midnight.checked_sub_signed(Duration::days(i64::from(
                date.weekday().num_days_from_monday(),
            ))),
            Granularity::Month => midnight.checked_sub_signed(Duration::days(i64::from(date.day0()))),
        }
    }

    /// Start of the bucket after the one starting at `bucket_start`.
    fn step(self, bucket_start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Granularity::Hour => bucket_start.checked_add_signed(Duration::hours(1)),
            Granularity::Day => bucket_start.checked_add_signed(Duration::days(1)),
            Granularity::Week => bucket_start.checked_add_signed(Duration::weeks(1)),
            Granularity::Month => bucket_start.checked_add_months(Months::new(1)),
        }
    }

    fn label_format(self) -> &'static str {
        match self {
            Granularity::Hour => "%Y-%m-%d %H:00",
            Granularity::Day | Granularity::Week => "%Y-%m-%d",
            Granularity::Month => "%Y-%m",
        }
    }

    pub fn key(self, ts: DateTime<Utc>) -> Option<BucketKey> {
        let start = self.truncate(ts)?;
        Some(BucketKey {
            label: start.format(self.label_format()).to_string(),
            start,
        })
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        })
    }
}

/// Canonical name of a time bucket.
///
/// Labels are zero-padded (`2024-03-01 07:00`, `2024-03-01`, `2024-03`), so
/// ordering by label is chronological within one granularity. `Ord` compares
/// the label first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    label: String,
    start: DateTime<Utc>,
}

impl BucketKey {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn epoch_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Every bucket from the day containing `start` through the day containing
/// `end`, one granularity step apart. Buckets with no events are included so
/// the x-axis does not depend on the data.
pub fn generate_buckets(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
) -> Vec<BucketKey> {
    let first = Granularity::Day
        .truncate(start)
        .and_then(|day| granularity.truncate(day));
    let last = Granularity::Day
        .truncate(end)
        .and_then(|day| day.checked_add_signed(Duration::days(1) - Duration::nanoseconds(1)))
        .and_then(|instant| granularity.truncate(instant));
    let Some(last) = last else {
        return Vec::new();
    };

    let mut buckets = Vec::new();
    let mut cursor = first;
    while let Some(bucket_start) = cursor {
        if bucket_start > last {
            break;
        }
        buckets.push(BucketKey {
            label: bucket_start.format(granularity.label_format()).to_string(),
            start: bucket_start,
        });
        cursor = granularity.step(bucket_start);
    }
    buckets
}

/// Chart data handed to renderers: named series plus the x-axis bounds,
/// which are the date range endpoints as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub granularity: Granularity,
    pub x_min: i64,
    pub x_max: i64,
    pub series: Vec<Series>,
}

impl Chart {
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.iter().all(|p| p.y == 0))
    }
}

/// Buckets `events` over `range`, split by `breakdown` when given.
///
/// Returns `None` without a range; callers render an empty state instead.
pub fn build_chart(
    range: Option<&DateRange>,
    events: &[AuditEvent],
    breakdown: Option<&Breakdown<'_>>,
) -> Option<Chart> {
    let range = range?;
    let granularity = Granularity::for_range(Some(range));
    let buckets = generate_buckets(range.start(), range.end(), granularity);
    let aggregation = aggregate::aggregate(events, &buckets, granularity, breakdown);
    debug!(
        %granularity,
        buckets = buckets.len(),
        series = aggregation.series.len(),
        skipped = aggregation.skipped,
        "bucketed chart events"
    );

    Some(Chart {
        granularity,
        x_min: range.start().timestamp_millis(),
        x_max: range.end().timestamp_millis(),
        series: series::build_series(&aggregation),
    })
}
