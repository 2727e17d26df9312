use maud::{Markup, html};

use crate::api::{ColumnMeta, ColumnsResponse, FilteredColumnsResponse};
use crate::config::MAX_VALUE_BUTTONS;
use crate::explorer_config::ExplorerSettings;
use crate::query::{QueryAction, QueryState, SearchTerm};
use crate::styles::Explorer as ExplorerClass;

use super::{EXPLORER_TARGET, action_button};

/// Columns holding file paths; their values are shown as basenames.
const PATH_COLUMNS: &[&str] = &["filename"];

pub fn is_path_column(column: &str) -> bool {
    PATH_COLUMNS.contains(&column)
}

/// Last segment of a `/`-separated path.
pub fn short_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => path,
    }
}

fn display_value<'a>(column: &str, value: &'a str) -> &'a str {
    if is_path_column(column) {
        short_path(value)
    } else {
        value
    }
}

/// One control per filterable column, in configured order.
pub fn render_filters(
    settings: &ExplorerSettings,
    state: &QueryState,
    columns: &ColumnsResponse,
    available: &FilteredColumnsResponse,
) -> Markup {
    let names = settings.filter_columns(columns.columns.keys().map(String::as_str));

    html! {
        div.(ExplorerClass::FILTER_PANEL) {
            div.(ExplorerClass::FILTER_TOOLBAR) {
                h2 { "> filters" }
                @if !state.filters.is_empty() {
                    (action_button(ExplorerClass::CHIP_CLEAR, state, &QueryAction::ClearFilters, html! { "[clear all]" }))
                }
            }
            @for name in &names {
                @if let Some(meta) = columns.columns.get(name) {
                    (render_column(
                        name,
                        &settings.column_label(name, &columns.column_labels),
                        meta,
                        available.columns.get(name),
                        state,
                    ))
                }
            }
        }
    }
}

fn render_column(
    column: &str,
    label: &str,
    meta: &ColumnMeta,
    available: Option<&ColumnMeta>,
    state: &QueryState,
) -> Markup {
    let values = available.map_or(meta.values.as_slice(), |m| m.values.as_slice());
    let selected = state.filters.exact_values(column);
    let choices: Vec<&String> = values.iter().filter(|v| !selected.contains(*v)).collect();
    let hidden = choices.len().saturating_sub(MAX_VALUE_BUTTONS);

    html! {
        div.(ExplorerClass::FILTER_COLUMN) {
            div.(ExplorerClass::FILTER_HEADER) {
                strong title=(meta.kind) { (label) }
                span {
                    "(" (values.len()) "/" (meta.values.len()) ")"
                    @if state.filters.has_column(column) {
                        " "
                        (action_button(
                            ExplorerClass::CHIP_CLEAR,
                            state,
                            &QueryAction::ClearColumn { column: column.to_owned() },
                            html! { "[x]" },
                        ))
                    }
                }
            }
            (active_filters(column, state))
            @if !choices.is_empty() {
                div.(ExplorerClass::VALUE_LIST) {
                    @for value in choices.iter().take(MAX_VALUE_BUTTONS) {
                        (action_button(
                            ExplorerClass::VALUE_BTN,
                            state,
                            &QueryAction::ToggleValue { column: column.to_owned(), value: (*value).clone() },
                            html! { span title=(value) { (display_value(column, value)) } },
                        ))
                    }
                    @if hidden > 0 {
                        span.(ExplorerClass::MORE_VALUES) { "+" (hidden) " more, use search" }
                    }
                }
            }
            (search_form(column, label, state))
        }
    }
}

fn active_filters(column: &str, state: &QueryState) -> Markup {
    let exact = state.filters.exact_values(column);
    let substrings = state.filters.substring_terms(column);
    let patterns = state.filters.regex_terms(column);
    if exact.is_empty() && substrings.is_empty() && patterns.is_empty() {
        return html! {};
    }

    let remove = |term: &str| QueryAction::RemoveSearch {
        column: column.to_owned(),
        term: term.to_owned(),
    };

    html! {
        div.(ExplorerClass::ACTIVE_FILTERS) {
            @for value in exact {
                (action_button(
                    ExplorerClass::CHIP,
                    state,
                    &QueryAction::ToggleValue { column: column.to_owned(), value: value.clone() },
                    html! { (display_value(column, value)) " ×" },
                ))
            }
            @for term in substrings {
                (action_button(
                    &format!("{} {}", ExplorerClass::CHIP, ExplorerClass::CHIP_SEARCH),
                    state,
                    &remove(term.as_str()),
                    html! { "contains \"" (term) "\" ×" },
                ))
            }
            @for term in patterns {
                @let pattern = match SearchTerm::classify(term) {
                    SearchTerm::Regex(p) => p,
                    SearchTerm::Substring(s) => s,
                };
                (action_button(
                    &format!("{} {}", ExplorerClass::CHIP, ExplorerClass::CHIP_REGEX),
                    state,
                    &remove(term.as_str()),
                    html! { "matches /" (pattern) "/ ×" },
                ))
            }
        }
    }
}

fn search_form(column: &str, label: &str, state: &QueryState) -> Markup {
    html! {
        form.(ExplorerClass::SEARCH_FORM)
            hx-get="/fragments/explorer/search"
            hx-target=(EXPLORER_TARGET)
            hx-swap="innerHTML"
        {
            input type="hidden" name="state" value=(state.to_param());
            input type="hidden" name="column" value=(column);
            input type="text" name="term" placeholder=(format!("search {}, /regex", label.to_lowercase()));
            button type="submit" { "+" }
        }
    }
}
