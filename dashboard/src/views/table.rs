use std::collections::BTreeMap;

use maud::{Markup, html};

use crate::api::QueryResponse;
use crate::config::PAGE_SIZE_CHOICES;
use crate::explorer_config::ExplorerSettings;
use crate::query::{QueryAction, QueryState, SortOrder};
use crate::styles::Table as TableClass;

use super::action_button;
use super::filters::{is_path_column, short_path};

fn sort_indicator(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => " ▲",
        SortOrder::Desc => " ▼",
    }
}

/// Clicking the sorted column flips its order; any other column starts
/// ascending.
fn next_sort(state: &QueryState, column: &str) -> QueryAction {
    let order = if state.sort_column == column {
        state.sort_order.flipped()
    } else {
        SortOrder::Asc
    };
    QueryAction::Sort {
        column: column.to_owned(),
        order,
    }
}

pub fn render_table(
    settings: &ExplorerSettings,
    state: &QueryState,
    rows: &QueryResponse,
    upstream_labels: &BTreeMap<String, String>,
) -> Markup {
    let columns = settings.table_columns(&rows.data);
    let first = u64::from(state.page.saturating_sub(1)) * u64::from(state.page_size) + 1;
    let last = first + rows.data.len() as u64 - 1;

    html! {
        div.(TableClass::TABLE_WRAPPER) {
            h2 { "> events" }
            @if rows.data.is_empty() {
                p.(TableClass::EMPTY_ROWS) { "No events match the current filters." }
            } @else {
                div.(TableClass::TABLE_META) {
                    "showing " (first) "-" (last) " of " (rows.total) " events"
                }
                table.(TableClass::EVENTS_TABLE) {
                    thead {
                        tr {
                            @for column in &columns {
                                @let active = state.sort_column == *column;
                                @let class = if active {
                                    format!("{} {}", TableClass::SORT_BTN, TableClass::SORT_ACTIVE)
                                } else {
                                    TableClass::SORT_BTN.to_owned()
                                };
                                th {
                                    (action_button(
                                        &class,
                                        state,
                                        &next_sort(state, column),
                                        html! {
                                            (settings.column_label(column, upstream_labels))
                                            @if active { (sort_indicator(state.sort_order)) }
                                        },
                                    ))
                                }
                            }
                        }
                    }
                    tbody {
                        @for row in &rows.data {
                            tr {
                                @for column in &columns {
                                    @let text = row.display(column);
                                    @if is_path_column(column) {
                                        td title=(text) { (short_path(&text)) }
                                    } @else {
                                        td { (text) }
                                    }
                                }
                            }
                        }
                    }
                }
            }
            (pager(state, rows.total))
        }
    }
}

fn pager(state: &QueryState, total: u64) -> Markup {
    let pages = state.total_pages(total);
    let page = u64::from(state.page);

    html! {
        div.(TableClass::PAGER) {
            @if page > 1 {
                (action_button(TableClass::PAGER_BTN, state, &QueryAction::SetPage { page: state.page - 1 }, html! { "<" }))
            } @else {
                button.(TableClass::PAGER_BTN) disabled { "<" }
            }
            span { "page " (page) " of " (pages) }
            @if page < pages {
                (action_button(TableClass::PAGER_BTN, state, &QueryAction::SetPage { page: state.page + 1 }, html! { ">" }))
            } @else {
                button.(TableClass::PAGER_BTN) disabled { ">" }
            }
            span { "rows:" }
            @for &size in PAGE_SIZE_CHOICES {
                @if size == state.page_size {
                    button.(TableClass::PAGER_BTN).(TableClass::PAGE_SIZE_ACTIVE) disabled { (size) }
                } @else {
                    (action_button(TableClass::PAGER_BTN, state, &QueryAction::SetPageSize { page_size: size }, html! { (size) }))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(total: u64) -> QueryResponse {
        serde_json::from_value(json!({
            "data": [
                { "timestamp": "2024-01-02T10:00:00", "action": "open", "filename": "/mnt/a/notes.ipynb", "uuid": "x" },
                { "timestamp": "2024-01-02T09:00:00", "action": "login" }
            ],
            "total": total
        }))
        .unwrap()
    }

    #[test]
    fn sorting_a_new_column_starts_ascending() {
        let state = QueryState::new(None, 20);
        assert_eq!(
            next_sort(&state, "action"),
            QueryAction::Sort {
                column: "action".into(),
                order: SortOrder::Asc
            }
        );
        assert_eq!(
            next_sort(&state, "timestamp"),
            QueryAction::Sort {
                column: "timestamp".into(),
                order: SortOrder::Asc
            }
        );
    }

    #[test]
    fn rows_hide_configured_columns_and_shorten_paths() {
        let markup = render_table(
            &ExplorerSettings::default(),
            &QueryState::new(None, 20),
            &response(2),
            &BTreeMap::new(),
        )
        .into_string();
        assert!(markup.contains("Timestamp ▼"));
        assert!(markup.contains(r#"title="/mnt/a/notes.ipynb">notes.ipynb</td>"#));
        assert!(!markup.contains("UUID"));
        assert!(markup.contains("showing 1-2 of 2 events"));
    }

    #[test]
    fn pager_disables_the_ends() {
        let state = QueryState::new(None, 20);
        let first_page = pager(&state, 45).into_string();
        assert!(first_page.contains("page 1 of 3"));
        assert_eq!(first_page.matches("disabled").count(), 2);

        let last = state.apply(QueryAction::SetPage { page: 3 }).unwrap();
        let last_page = pager(&last, 45).into_string();
        assert!(last_page.contains("page 3 of 3"));
        assert_eq!(last_page.matches("disabled").count(), 2);
    }

    #[test]
    fn empty_result_says_so() {
        let rows = QueryResponse {
            data: Vec::new(),
            chart_data: Vec::new(),
            total: 0,
        };
        let markup = render_table(
            &ExplorerSettings::default(),
            &QueryState::new(None, 20),
            &rows,
            &BTreeMap::new(),
        )
        .into_string();
        assert!(markup.contains("No events match"));
        assert!(markup.contains("page 1 of 1"));
    }
}
