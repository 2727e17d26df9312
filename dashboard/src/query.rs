//! Explorer query state.
//!
//! A [`QueryState`] is a plain value: it is serialised into every htmx request
//! and rebuilt from it, and [`QueryState::apply`] is the only way to derive a
//! new one. The server keeps no per-user state.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DEFAULT_SORT_COLUMN, DEFAULT_SORT_ORDER};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range start {start} is after end {end}")]
    Inverted { start: String, end: String },
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("year {0} is outside 0000-9999")]
    YearOutOfRange(i32),
}

const YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Inclusive date range. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = RangeError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, RangeError> {
        for year in [start.year(), end.year()] {
            if !YEARS.contains(&year) {
                return Err(RangeError::YearOutOfRange(year));
            }
        }
        if start > end {
            return Err(RangeError::Inverted {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(DateRange { start, end })
    }

    /// Parses the two `YYYY-MM-DD` values of the date form.
    pub fn parse_days(start: &str, end: &str) -> Result<Self, RangeError> {
        DateRange::new(parse_day(start)?, parse_day(end)?)
    }

    /// The `days` days up to and including `today`. Collapses to `today`
    /// alone when the start would fall before year 0.
    pub fn last_days(today: NaiveDate, days: i64) -> Self {
        let end = today.and_time(NaiveTime::MIN).and_utc();
        let start = Duration::try_days(days.max(0))
            .and_then(|span| end.checked_sub_signed(span))
            .filter(|start| YEARS.contains(&start.year()))
            .unwrap_or(end);
        DateRange { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whole days between the endpoints.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn start_day(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_day(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

fn parse_day(value: &str) -> Result<DateTime<Utc>, RangeError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| RangeError::InvalidDate(value.to_owned()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "ASC")]
    Asc,
    #[default]
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn flipped(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("search term is empty")]
    EmptyTerm,
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A free-text term typed into a column's search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTerm<'a> {
    Substring(&'a str),
    /// Pattern with the leading `/` removed
    Regex(&'a str),
}

impl<'a> SearchTerm<'a> {
    /// Terms starting with `/` are regular expressions.
    pub fn classify(term: &'a str) -> Self {
        match term.strip_prefix('/') {
            Some(pattern) if !pattern.is_empty() => SearchTerm::Regex(pattern),
            _ => SearchTerm::Substring(term),
        }
    }
}

/// Column filters sent to the query API.
///
/// Within a column, exact values, substrings and regexes are OR-ed; separate
/// columns are AND-ed. Regex terms keep their leading `/`. Columns never map
/// to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default, rename = "filters")]
    pub exact: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "substringFilters")]
    pub substring: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "regexFilters")]
    pub regex: BTreeMap<String, Vec<String>>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.substring.is_empty() && self.regex.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.exact.contains_key(column)
            || self.substring.contains_key(column)
            || self.regex.contains_key(column)
    }

    pub fn exact_values(&self, column: &str) -> &[String] {
        self.exact.get(column).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn substring_terms(&self, column: &str) -> &[String] {
        self.substring.get(column).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn regex_terms(&self, column: &str) -> &[String] {
        self.regex.get(column).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn toggle_value(&mut self, column: &str, value: &str) {
        if self.exact_values(column).iter().any(|v| v == value) {
            remove_entry(&mut self.exact, column, value);
        } else {
            push_unique(&mut self.exact, column, value);
        }
    }

    pub fn add_search(&mut self, column: &str, term: &str) -> Result<(), FilterError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(FilterError::EmptyTerm);
        }
        match SearchTerm::classify(term) {
            SearchTerm::Regex(pattern) => {
                Regex::new(pattern).map_err(|source| FilterError::InvalidRegex {
                    pattern: pattern.to_owned(),
                    source,
                })?;
                push_unique(&mut self.regex, column, term);
            }
            SearchTerm::Substring(s) => push_unique(&mut self.substring, column, s),
        }
        Ok(())
    }

    pub fn remove_search(&mut self, column: &str, term: &str) {
        match SearchTerm::classify(term) {
            SearchTerm::Regex(_) => remove_entry(&mut self.regex, column, term),
            SearchTerm::Substring(_) => remove_entry(&mut self.substring, column, term),
        }
    }

    pub fn clear_column(&mut self, column: &str) {
        self.exact.remove(column);
        self.substring.remove(column);
        self.regex.remove(column);
    }

    fn drop_empty(&mut self) {
        for map in [&mut self.exact, &mut self.substring, &mut self.regex] {
            map.retain(|_, values| !values.is_empty());
        }
    }
}

fn push_unique(map: &mut BTreeMap<String, Vec<String>>, column: &str, value: &str) {
    let values = map.entry(column.to_owned()).or_default();
    if !values.iter().any(|v| v == value) {
        values.push(value.to_owned());
    }
}

fn remove_entry(map: &mut BTreeMap<String, Vec<String>>, column: &str, value: &str) {
    if let Some(values) = map.get_mut(column) {
        values.retain(|v| v != value);
        if values.is_empty() {
            map.remove(column);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryState {
    #[serde(default)]
    pub range: Option<DateRange>,
    #[serde(default)]
    pub filters: FilterSet,
    pub page: u32,
    pub page_size: u32,
    pub sort_column: String,
    pub sort_order: SortOrder,
    /// Field the chart is split by
    #[serde(default)]
    pub breakdown: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryAction {
    SetDateRange { range: DateRange },
    ToggleValue { column: String, value: String },
    AddSearch { column: String, term: String },
    RemoveSearch { column: String, term: String },
    ClearColumn { column: String },
    ClearFilters,
    SetPage { page: u32 },
    SetPageSize { page_size: u32 },
    Sort { column: String, order: SortOrder },
    SelectField { field: Option<String> },
}

impl QueryState {
    pub fn new(range: Option<DateRange>, page_size: u32) -> Self {
        QueryState {
            range,
            filters: FilterSet::default(),
            page: 1,
            page_size: page_size.max(1),
            sort_column: DEFAULT_SORT_COLUMN.to_owned(),
            sort_order: DEFAULT_SORT_ORDER,
            breakdown: None,
        }
    }

    /// Decodes the `state` request parameter. Filter lists are re-cleaned
    /// since the value came back from the browser.
    pub fn from_param(param: &str) -> Result<Self, serde_json::Error> {
        let mut state: QueryState = serde_json::from_str(param)?;
        state.filters.drop_empty();
        state.page = state.page.max(1);
        state.page_size = state.page_size.max(1);
        Ok(state)
    }

    pub fn to_param(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Derives the next state. Anything that changes which rows match
    /// sends the table back to page 1.
    pub fn apply(mut self, action: QueryAction) -> Result<Self, FilterError> {
        match action {
            QueryAction::SetDateRange { range } => {
                self.range = Some(range);
                self.page = 1;
            }
            QueryAction::ToggleValue { column, value } => {
                self.filters.toggle_value(&column, &value);
                self.page = 1;
            }
            QueryAction::AddSearch { column, term } => {
                self.filters.add_search(&column, &term)?;
                self.page = 1;
            }
            QueryAction::RemoveSearch { column, term } => {
                self.filters.remove_search(&column, &term);
                self.page = 1;
            }
            QueryAction::ClearColumn { column } => {
                self.filters.clear_column(&column);
                self.page = 1;
            }
            QueryAction::ClearFilters => {
                self.filters = FilterSet::default();
                self.page = 1;
            }
            QueryAction::SetPage { page } => self.page = page.max(1),
            QueryAction::SetPageSize { page_size } => {
                self.page_size = page_size.max(1);
                self.page = 1;
            }
            QueryAction::Sort { column, order } => {
                if column != self.sort_column || order != self.sort_order {
                    self.sort_column = column;
                    self.sort_order = order;
                    self.page = 1;
                }
            }
            QueryAction::SelectField { field } => self.breakdown = field,
        }
        Ok(self)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.page_size)).max(1)
    }
}

/// Body of `POST /api/query`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    #[serde(flatten)]
    pub filters: &'a FilterSet,
    pub page: u32,
    pub page_size: u32,
    pub sort_column: &'a str,
    pub sort_order: SortOrder,
}

impl<'a> From<&'a QueryState> for QueryRequest<'a> {
    fn from(state: &'a QueryState) -> Self {
        QueryRequest {
            filters: &state.filters,
            page: state.page,
            page_size: state.page_size,
            sort_column: &state.sort_column,
            sort_order: state.sort_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn state() -> QueryState {
        let range = DateRange::parse_days("2024-01-01", "2024-01-31").unwrap();
        QueryState::new(Some(range), 100)
    }

    fn on_page(state: QueryState, page: u32) -> QueryState {
        state.apply(QueryAction::SetPage { page }).unwrap()
    }

    #[test]
    fn range_rejects_inverted_endpoints() {
        let err = DateRange::parse_days("2024-02-01", "2024-01-01").unwrap_err();
        assert!(matches!(err, RangeError::Inverted { .. }));
        assert_eq!(
            DateRange::parse_days("2024-02-30", "2024-03-01").unwrap_err(),
            RangeError::InvalidDate("2024-02-30".to_owned())
        );
    }

    #[test]
    fn inverted_range_does_not_deserialize() {
        let raw = json!({ "start": "2024-02-01T00:00:00Z", "end": "2024-01-01T00:00:00Z" });
        assert!(serde_json::from_value::<DateRange>(raw).is_err());
    }

    #[test]
    fn range_rejects_years_beyond_four_digits() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let far = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            DateRange::new(start, far).unwrap_err(),
            RangeError::YearOutOfRange(10_000)
        );
        assert!(matches!(
            DateRange::parse_days("-0001-12-31", "2024-01-01"),
            Err(RangeError::YearOutOfRange(-1))
        ));

        let raw = json!({ "start": "2024-01-01T00:00:00Z", "end": "+262142-12-31T00:00:00Z" });
        assert!(serde_json::from_value::<DateRange>(raw).is_err());
    }

    #[test]
    fn last_days_never_leaves_the_calendar() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let range = DateRange::last_days(today, i64::MAX);
        assert_eq!(range.start_day(), "2024-03-31");
        assert_eq!(range.span_days(), 0);
    }

    #[test]
    fn last_days_ends_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let range = DateRange::last_days(today, 30);
        assert_eq!(range.start_day(), "2024-03-01");
        assert_eq!(range.end_day(), "2024-03-31");
        assert_eq!(range.span_days(), 30);
    }

    #[test]
    fn classifies_search_terms() {
        assert_eq!(SearchTerm::classify("/^ab"), SearchTerm::Regex("^ab"));
        assert_eq!(SearchTerm::classify("/"), SearchTerm::Substring("/"));
        assert_eq!(SearchTerm::classify("notes/"), SearchTerm::Substring("notes/"));
    }

    #[test]
    fn search_terms_land_in_the_right_list() {
        let mut filters = FilterSet::default();
        filters.add_search("filename", "report").unwrap();
        filters.add_search("filename", "/\\.csv$").unwrap();
        filters.add_search("filename", "report").unwrap();

        assert_eq!(filters.substring_terms("filename"), ["report"]);
        assert_eq!(filters.regex_terms("filename"), ["/\\.csv$"]);

        filters.remove_search("filename", "/\\.csv$");
        assert!(filters.regex.is_empty());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let mut filters = FilterSet::default();
        let err = filters.add_search("filename", "/([a-z").unwrap_err();
        assert!(matches!(err, FilterError::InvalidRegex { .. }));
        assert!(filters.is_empty());
        assert!(matches!(
            filters.add_search("filename", "   "),
            Err(FilterError::EmptyTerm)
        ));
    }

    #[test]
    fn toggling_twice_leaves_no_empty_list() {
        let mut filters = FilterSet::default();
        filters.toggle_value("action", "login");
        filters.toggle_value("action", "logout");
        assert_eq!(filters.exact_values("action"), ["login", "logout"]);

        filters.toggle_value("action", "login");
        filters.toggle_value("action", "logout");
        assert!(filters.is_empty());
        assert!(!filters.has_column("action"));
    }

    #[test]
    fn filter_changes_reset_the_page() {
        let s = on_page(state(), 4)
            .apply(QueryAction::ToggleValue {
                column: "action".into(),
                value: "login".into(),
            })
            .unwrap();
        assert_eq!(s.page, 1);

        let s = on_page(s, 3).apply(QueryAction::ClearFilters).unwrap();
        assert_eq!(s.page, 1);
        assert!(s.filters.is_empty());
    }

    #[test]
    fn date_range_keeps_filters() {
        let s = state()
            .apply(QueryAction::AddSearch {
                column: "username".into(),
                term: "ada".into(),
            })
            .unwrap();
        let range = DateRange::parse_days("2024-05-01", "2024-05-02").unwrap();
        let s = on_page(s, 2).apply(QueryAction::SetDateRange { range }).unwrap();
        assert_eq!(s.range, Some(range));
        assert_eq!(s.page, 1);
        assert_eq!(s.filters.substring_terms("username"), ["ada"]);
    }

    #[test]
    fn unchanged_sort_keeps_the_page() {
        let s = on_page(state(), 5);
        let same = s
            .clone()
            .apply(QueryAction::Sort {
                column: "timestamp".into(),
                order: SortOrder::Desc,
            })
            .unwrap();
        assert_eq!(same.page, 5);

        let flipped = s
            .apply(QueryAction::Sort {
                column: "timestamp".into(),
                order: SortOrder::Asc,
            })
            .unwrap();
        assert_eq!(flipped.page, 1);
        assert_eq!(flipped.sort_order, SortOrder::Asc);
    }

    #[test]
    fn page_and_page_size_are_clamped() {
        let s = state().apply(QueryAction::SetPage { page: 0 }).unwrap();
        assert_eq!(s.page, 1);
        let s = on_page(s, 7)
            .apply(QueryAction::SetPageSize { page_size: 0 })
            .unwrap();
        assert_eq!((s.page, s.page_size), (1, 1));
    }

    #[test]
    fn failed_action_leaves_caller_with_previous_state() {
        let before = state();
        let result = before.clone().apply(QueryAction::AddSearch {
            column: "filename".into(),
            term: "/(".into(),
        });
        assert!(result.is_err());
        assert!(before.filters.is_empty());
    }

    #[test]
    fn selecting_a_field_does_not_touch_the_table() {
        let s = on_page(state(), 3)
            .apply(QueryAction::SelectField {
                field: Some("action".into()),
            })
            .unwrap();
        assert_eq!(s.breakdown.as_deref(), Some("action"));
        assert_eq!(s.page, 3);
    }

    #[test]
    fn state_round_trips_through_the_request_param() {
        let s = state()
            .apply(QueryAction::AddSearch {
                column: "filename".into(),
                term: "/tmp".into(),
            })
            .unwrap();
        assert_eq!(QueryState::from_param(&s.to_param()).unwrap(), s);
    }

    #[test]
    fn from_param_drops_empty_lists() {
        let raw = json!({
            "filters": { "filters": { "action": [] }, "regexFilters": { "filename": ["/x"] } },
            "page": 0,
            "page_size": 20,
            "sort_column": "timestamp",
            "sort_order": "ASC"
        });
        let s = QueryState::from_param(&raw.to_string()).unwrap();
        assert!(!s.filters.has_column("action"));
        assert!(s.filters.has_column("filename"));
        assert_eq!(s.page, 1);
        assert!(s.range.is_none());
    }

    #[test]
    fn query_request_uses_wire_names() {
        let s = state()
            .apply(QueryAction::ToggleValue {
                column: "action".into(),
                value: "login".into(),
            })
            .unwrap();
        let body = serde_json::to_value(QueryRequest::from(&s)).unwrap();
        assert_eq!(
            body,
            json!({
                "filters": { "action": ["login"] },
                "substringFilters": {},
                "regexFilters": {},
                "page": 1,
                "pageSize": 100,
                "sortColumn": "timestamp",
                "sortOrder": "DESC"
            })
        );
    }

    #[test]
    fn span_counts_whole_days() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let range = DateRange::new(start, start + Duration::hours(71)).unwrap();
        assert_eq!(range.span_days(), 2);
    }
}
