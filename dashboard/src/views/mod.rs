use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::{NaiveDate, Utc};
use maud::{DOCTYPE, Markup, html};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::explorer_config::ExplorerSettings;
use crate::query::{DateRange, QueryAction, QueryState};
use crate::state::AppState;
use crate::styles;

pub mod explorer;
pub mod filters;
pub mod table;

const HTMX_SRC: &str = "https://unpkg.com/htmx.org@2.0.4";

/// Element every explorer action swaps.
pub const EXPLORER_TARGET: &str = "#explorer";
pub const EXPLORER_FRAGMENT: &str = "/fragments/explorer";

#[derive(Deserialize)]
pub struct StateQuery {
    pub state: Option<String>,
}

pub fn page_shell(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                link rel="stylesheet" href="/styles.css";
                script src=(HTMX_SRC) {}
            }
            body {
                main { (content) }
            }
        }
    }
}

pub async fn index(State(app): State<Arc<AppState>>) -> Markup {
    let state = initial_state(&app.settings, Utc::now().date_naive());
    let content = html! {
        h1 { "> audit events" }
        div #explorer {
            (explorer::render(&app, state, None).await)
        }
    };
    page_shell("Audit Events", content)
}

pub async fn styles() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], styles::ALL.as_str())
}

/// The state a fresh page starts from: the last `default_range_days` days.
pub fn initial_state(settings: &ExplorerSettings, today: NaiveDate) -> QueryState {
    let range = DateRange::last_days(today, settings.default_range_days);
    QueryState::new(Some(range), settings.page_size)
}

/// Decodes the `state` parameter, starting over when it is missing or
/// unreadable.
pub fn resolve_state(settings: &ExplorerSettings, param: Option<&str>) -> QueryState {
    let today = Utc::now().date_naive();
    match param.map(QueryState::from_param) {
        Some(Ok(state)) => state,
        Some(Err(e)) => {
            warn!("discarding unreadable query state: {e}");
            initial_state(settings, today)
        }
        None => initial_state(settings, today),
    }
}

/// `hx-vals` payload for a button that applies `action` to `state`.
pub fn action_vals(state: &QueryState, action: &QueryAction) -> String {
    json!({
        "state": state.to_param(),
        "action": serde_json::to_string(action).unwrap_or_default(),
    })
    .to_string()
}

pub fn action_button(class: &str, state: &QueryState, action: &QueryAction, content: Markup) -> Markup {
    html! {
        button.(class)
            hx-get=(EXPLORER_FRAGMENT)
            hx-target=(EXPLORER_TARGET)
            hx-swap="innerHTML"
            hx-vals=(action_vals(state, action))
        {
            (content)
        }
    }
}
