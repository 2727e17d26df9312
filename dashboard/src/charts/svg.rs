use std::collections::BTreeMap;

use chrono::DateTime;
use maud::{Markup, html};

use super::aggregate::OTHER_SERIES;
use super::{Chart, Granularity};
use crate::styles::Charts as ChartClass;

const WIDTH: f64 = 900.0;
const HEIGHT: f64 = 260.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 24.0;
const MARGIN_BOTTOM: f64 = 30.0;

const TEXT_STYLE: &str = "fill: var(--foreground); font-family: inherit";
const SVG_CONTAINER_STYLE: &str = "width:100%;height:auto";

const PALETTE: &[&str] = &[
    "#6cb6ff", "#f69d50", "#8ddb8c", "#f47067", "#dcbdfb", "#c69026", "#96d0ff", "#e275ad",
    "#56d4dd", "#b083f0",
];
const OTHER_COLOR: &str = "#cccccc";

fn series_color(index: usize, name: &str) -> &'static str {
    if name == OTHER_SERIES {
        OTHER_COLOR
    } else {
        PALETTE[index % PALETTE.len()]
    }
}

fn format_time(epoch_millis: i64, granularity: Granularity) -> String {
    let Some(ts) = DateTime::from_timestamp_millis(epoch_millis) else {
        return String::new();
    };
    let format = match granularity {
        Granularity::Hour => "%m-%d %H:00",
        Granularity::Day | Granularity::Week => "%Y-%m-%d",
        Granularity::Month => "%Y-%m",
    };
    ts.format(format).to_string()
}

struct Segment {
    x: f64,
    y: f64,
    height: f64,
    series: usize,
    bucket: i64,
    count: u64,
}

/// One column per bucket, each series stacked in order. A chart without
/// events still draws its zero axis over the range.
pub fn render_stacked_chart(chart: &Chart, label: &str) -> Markup {
    // bucket start -> count per series
    let mut slots: BTreeMap<i64, Vec<u64>> = BTreeMap::new();
    for (i, series) in chart.series.iter().enumerate() {
        for point in &series.points {
            slots
                .entry(point.x)
                .or_insert_with(|| vec![0; chart.series.len()])[i] = point.y;
        }
    }

    let max_total = slots
        .values()
        .map(|counts| counts.iter().sum::<u64>())
        .max()
        .unwrap_or(0)
        .max(1);

    let chart_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let chart_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let bar_w = chart_w / slots.len().max(1) as f64;
    let scale = chart_h / max_total as f64;
    let mut xs: Vec<i64> = slots.keys().copied().collect();
    if xs.is_empty() {
        xs.push(chart.x_min);
        if chart.x_max > chart.x_min {
            xs.push(chart.x_max);
        }
    }

    let mut segments = Vec::new();
    for (i, (x, counts)) in slots.iter().enumerate() {
        let mut top = MARGIN_TOP + chart_h;
        for (s, &count) in counts.iter().enumerate().filter(|(_, c)| **c > 0) {
            let height = count as f64 * scale;
            top -= height;
            segments.push(Segment {
                x: MARGIN_LEFT + i as f64 * bar_w,
                y: top,
                height,
                series: s,
                bucket: *x,
                count,
            });
        }
    }

    html! {
        div.(ChartClass::CHART_CONTAINER) {
            div.(ChartClass::CHART_HEADER) {
                span { (label) }
                @if chart.is_empty() {
                    span { "no events in range" }
                }
                span { (chart.granularity) " buckets" }
            }
            svg viewBox=(format!("0 0 {WIDTH} {HEIGHT}")) xmlns="http://www.w3.org/2000/svg" style=(SVG_CONTAINER_STYLE) {
                rect width=(WIDTH) height=(HEIGHT) style="fill: var(--background)" {}
                text x=(MARGIN_LEFT - 5.0) y=(MARGIN_TOP + 10.0) font-size="10" text-anchor="end" style=(TEXT_STYLE) {
                    (max_total)
                }
                text x=(MARGIN_LEFT - 5.0) y=(MARGIN_TOP + chart_h) font-size="10" text-anchor="end" style=(TEXT_STYLE) { "0" }
                @for seg in &segments {
                    @let name = chart.series[seg.series].name.as_str();
                    rect x=(seg.x) y=(seg.y) width=((bar_w - 1.0).max(0.5)) height=(seg.height) opacity="0.85" style=(format!("fill: {}", series_color(seg.series, name))) {
                        title { (format_time(seg.bucket, chart.granularity)) " " (name) ": " (seg.count) }
                    }
                }
                (write_x_axis(&xs, chart.granularity, chart_w))
            }
            @if chart.series.len() > 1 {
                div.(ChartClass::LEGEND) {
                    @for (s, series) in chart.series.iter().enumerate() {
                        span.(ChartClass::LEGEND_ITEM) {
                            span.(ChartClass::LEGEND_SWATCH) style=(format!("background: {}", series_color(s, &series.name))) {}
                            (series.name) " (" (series.total()) ")"
                        }
                    }
                }
            }
        }
    }
}

fn write_x_axis(xs: &[i64], granularity: Granularity, chart_w: f64) -> Markup {
    let label_y = HEIGHT - 8.0;
    html! {
        @if let Some(first) = xs.first() {
            text x=(MARGIN_LEFT) y=(label_y) font-size="11" text-anchor="start" style=(TEXT_STYLE) {
                (format_time(*first, granularity))
            }
        }
        @if xs.len() > 2 {
            @let mid_x = MARGIN_LEFT + chart_w / 2.0;
            text x=(mid_x) y=(label_y) font-size="11" text-anchor="middle" style=(TEXT_STYLE) {
                (format_time(xs[xs.len() / 2], granularity))
            }
        }
        @if xs.len() > 1 {
            @if let Some(last) = xs.last() {
                @let end_x = MARGIN_LEFT + chart_w;
                text x=(end_x) y=(label_y) font-size="11" text-anchor="end" style=(TEXT_STYLE) {
                    (format_time(*last, granularity))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::{Series, SeriesPoint};

    fn chart(series: Vec<(&str, Vec<u64>)>) -> Chart {
        Chart {
            granularity: Granularity::Day,
            x_min: 0,
            x_max: 0,
            series: series
                .into_iter()
                .map(|(name, ys)| Series {
                    name: name.to_owned(),
                    points: ys
                        .into_iter()
                        .enumerate()
                        .map(|(i, y)| SeriesPoint {
                            x: i as i64 * 86_400_000,
                            y,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn draws_one_segment_per_nonzero_count() {
        let markup = render_stacked_chart(
            &chart(vec![("login", vec![1, 0, 2]), ("Other", vec![3, 0, 0])]),
            "Events by Event",
        )
        .into_string();
        assert_eq!(markup.matches("<rect").count(), 1 + 3);
        assert!(markup.contains(OTHER_COLOR));
        assert!(markup.contains("1970-01-03 login: 2"));
    }

    #[test]
    fn legend_only_for_breakdowns() {
        let single = render_stacked_chart(&chart(vec![("Events", vec![1, 2])]), "Events");
        assert!(!single.into_string().contains(ChartClass::LEGEND));
    }

    #[test]
    fn chart_without_series_still_draws_the_axis() {
        let empty = Chart {
            x_max: 6 * 86_400_000,
            ..chart(vec![])
        };
        let markup = render_stacked_chart(&empty, "Events by Event").into_string();
        assert!(markup.contains("<svg"));
        assert!(markup.contains("no events in range"));
        assert!(markup.contains("1970-01-01"));
        assert!(markup.contains("1970-01-07"));
        assert_eq!(markup.matches("<rect").count(), 1);
    }

    #[test]
    fn all_zero_counts_draw_no_segments() {
        let markup = render_stacked_chart(&chart(vec![("Events", vec![0, 0, 0])]), "Events").into_string();
        assert!(markup.contains("no events in range"));
        assert_eq!(markup.matches("<rect").count(), 1);
    }
}
