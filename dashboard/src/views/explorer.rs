use std::sync::Arc;

use axum::extract::{Query, State};
use maud::{Markup, html};
use serde::Deserialize;
use tracing::warn;

use crate::api::{ApiError, ColumnsResponse, FilteredColumnsResponse, QueryResponse};
use crate::charts::{self, Breakdown, svg};
use crate::explorer_config::ExplorerSettings;
use crate::query::{DateRange, QueryAction, QueryState};
use crate::state::AppState;
use crate::styles::{Charts as ChartClass, Explorer as ExplorerClass};

use super::{EXPLORER_TARGET, action_button, resolve_state};

#[derive(Deserialize)]
pub struct ActionQuery {
    state: Option<String>,
    action: Option<String>,
}

#[derive(Deserialize)]
pub struct RangeQuery {
    state: Option<String>,
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    state: Option<String>,
    column: String,
    #[serde(default)]
    term: String,
}

pub async fn explorer_fragment(
    State(app): State<Arc<AppState>>,
    Query(query): Query<ActionQuery>,
) -> Markup {
    let state = resolve_state(&app.settings, query.state.as_deref());
    let (state, notice) = match query.action.as_deref().map(serde_json::from_str::<QueryAction>) {
        None => (state, None),
        Some(Ok(action)) => apply(state, action),
        Some(Err(e)) => {
            warn!("ignoring malformed action: {e}");
            (state, Some(format!("Ignored malformed action: {e}")))
        }
    };
    render(&app, state, notice).await
}

pub async fn range_fragment(
    State(app): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Markup {
    let state = resolve_state(&app.settings, query.state.as_deref());
    let (state, notice) = match DateRange::parse_days(&query.start, &query.end) {
        Ok(range) => apply(state, QueryAction::SetDateRange { range }),
        Err(e) => (state, Some(e.to_string())),
    };
    render(&app, state, notice).await
}

pub async fn search_fragment(
    State(app): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Markup {
    let state = resolve_state(&app.settings, query.state.as_deref());
    let (state, notice) = apply(
        state,
        QueryAction::AddSearch {
            column: query.column,
            term: query.term,
        },
    );
    render(&app, state, notice).await
}

/// A rejected action keeps the previous state and reports why.
fn apply(state: QueryState, action: QueryAction) -> (QueryState, Option<String>) {
    match state.clone().apply(action) {
        Ok(next) => (next, None),
        Err(e) => (state, Some(e.to_string())),
    }
}

struct Snapshot {
    rows: QueryResponse,
    columns: ColumnsResponse,
    available: FilteredColumnsResponse,
}

async fn fetch_snapshot(app: &AppState, state: &QueryState) -> Result<Option<Snapshot>, ApiError> {
    let Some(range) = &state.range else {
        return Ok(None);
    };
    let api = &app.api;
    let (rows, columns, available) = app
        .with_loaded_range(range, move || async move {
            tokio::try_join!(
                api.query(state),
                api.columns(),
                api.filtered_columns(&state.filters),
            )
        })
        .await?;
    Ok(Some(Snapshot {
        rows,
        columns,
        available,
    }))
}

/// Renders the explorer fragment for `state`, querying the audit API.
pub async fn render(app: &AppState, state: QueryState, notice: Option<String>) -> Markup {
    let (snapshot, error) = match fetch_snapshot(app, &state).await {
        Ok(snapshot) => (snapshot, None),
        Err(e) => {
            warn!("audit API request failed: {e}");
            (None, Some(e.to_string()))
        }
    };

    html! {
        @if let Some(notice) = &notice {
            div.(ExplorerClass::NOTICE) { (notice) }
        }
        @if let Some(error) = &error {
            div.(ExplorerClass::ERROR_BANNER) { "Error: " (error) }
        }
        (range_form(&state))
        @match &snapshot {
            Some(snapshot) => {
                (super::filters::render_filters(&app.settings, &state, &snapshot.columns, &snapshot.available))
                (field_selector(&app.settings, &state, &snapshot.columns))
                (chart_section(&app.settings, &state, snapshot))
                (super::table::render_table(&app.settings, &state, &snapshot.rows, &snapshot.columns.column_labels))
                (downloads(&state))
            },
            None => {
                h2 { "> chart" }
                (no_data())
            },
        }
    }
}

fn range_form(state: &QueryState) -> Markup {
    let (start, end) = state
        .range
        .as_ref()
        .map(|r| (r.start_day(), r.end_day()))
        .unwrap_or_default();

    html! {
        form.(ExplorerClass::RANGE_FORM)
            hx-get="/fragments/explorer/range"
            hx-target=(EXPLORER_TARGET)
            hx-swap="innerHTML"
        {
            input type="hidden" name="state" value=(state.to_param());
            label { "from " input type="date" name="start" value=(start) required; }
            label { "to " input type="date" name="end" value=(end) required; }
            button type="submit" { "load" }
        }
    }
}

fn field_selector(settings: &ExplorerSettings, state: &QueryState, columns: &ColumnsResponse) -> Markup {
    let fields = settings.breakdown_columns(columns.columns.keys().map(String::as_str));
    let class = |active: bool| {
        if active {
            format!("{} {}", ExplorerClass::FIELD_BTN, ExplorerClass::FIELD_ACTIVE)
        } else {
            ExplorerClass::FIELD_BTN.to_owned()
        }
    };

    html! {
        div.(ExplorerClass::FIELD_SELECTOR) {
            span { "split by:" }
            (action_button(
                &class(state.breakdown.is_none()),
                state,
                &QueryAction::SelectField { field: None },
                html! { "none" },
            ))
            @for field in &fields {
                (action_button(
                    &class(state.breakdown.as_ref() == Some(field)),
                    state,
                    &QueryAction::SelectField { field: Some(field.clone()) },
                    html! { (settings.column_label(field, &columns.column_labels)) },
                ))
            }
        }
    }
}

fn chart_section(settings: &ExplorerSettings, state: &QueryState, snapshot: &Snapshot) -> Markup {
    let breakdown = state.breakdown.as_deref().map(|field| Breakdown {
        field,
        top_n: settings.top_n,
    });
    let label = match &breakdown {
        Some(b) => format!(
            "Events by {}",
            settings.column_label(b.field, &snapshot.columns.column_labels)
        ),
        None => "Events".to_owned(),
    };

    html! {
        h2 { "> chart" }
        @match charts::build_chart(state.range.as_ref(), &snapshot.rows.chart_data, breakdown.as_ref()) {
            Some(chart) => { (svg::render_stacked_chart(&chart, &label)) },
            None => { (no_data()) },
        }
    }
}

fn no_data() -> Markup {
    html! {
        div.(ChartClass::CHART_CONTAINER) {
            p.(ChartClass::EMPTY_STATE) { "No data available" }
        }
    }
}

fn downloads(state: &QueryState) -> Markup {
    html! {
        div.(ExplorerClass::DOWNLOADS) {
            @for format in ["csv", "parquet"] {
                form method="get" action=(format!("/download/{format}")) {
                    input type="hidden" name="state" value=(state.to_param());
                    button type="submit" { "[download " (format) "]" }
                }
            }
        }
    }
}
