use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::api::{ApiError, ExportFormat};
use crate::charts::{self, Breakdown};
use crate::state::AppState;
use crate::views::{StateQuery, resolve_state};

fn bad_gateway(e: ApiError) -> StatusCode {
    warn!("audit API request failed: {e}");
    StatusCode::BAD_GATEWAY
}

/// Chart series for the given state as JSON. `204` when no range is set.
pub async fn chart_json(
    State(app): State<Arc<AppState>>,
    Query(query): Query<StateQuery>,
) -> Result<Response, StatusCode> {
    let state = resolve_state(&app.settings, query.state.as_deref());
    let Some(range) = &state.range else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let (api, query_state) = (&app.api, &state);
    let rows = app
        .with_loaded_range(range, move || api.query(query_state))
        .await
        .map_err(bad_gateway)?;

    let breakdown = state.breakdown.as_deref().map(|field| Breakdown {
        field,
        top_n: app.settings.top_n,
    });
    let chart = charts::build_chart(Some(range), &rows.chart_data, breakdown.as_ref());
    Ok(Json(chart).into_response())
}

pub async fn download(
    State(app): State<Arc<AppState>>,
    Path(format): Path<ExportFormat>,
    Query(query): Query<StateQuery>,
) -> Result<Response, StatusCode> {
    let state = resolve_state(&app.settings, query.state.as_deref());
    let (api, filters) = (&app.api, &state.filters);
    let export = match &state.range {
        Some(range) => app.with_loaded_range(range, move || api.download(format, filters)).await,
        None => api.download(format, filters).await,
    }
    .map_err(bad_gateway)?;

    Ok((
        [
            (header::CONTENT_TYPE, export.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::to_bytes;
    use axum::routing::{get, post};
    use serde_json::{Value, json};

    use super::*;
    use crate::api::AuditApi;
    use crate::explorer_config::ExplorerSettings;
    use crate::query::{DateRange, QueryAction, QueryState};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn app() -> Arc<AppState> {
        let router = Router::new()
            .route("/api/data", get(|| async { Json(json!({ "total": 3 })) }))
            .route(
                "/api/query",
                post(|| async {
                    Json(json!({
                        "data": [],
                        "chartData": [
                            { "timestamp": "2024-01-01T10:00:00", "action": "open" },
                            { "timestamp": "2024-01-01T12:00:00", "action": "login" },
                            { "timestamp": "2024-01-02T09:00:00", "action": "open" }
                        ],
                        "total": 3
                    }))
                }),
            )
            .route(
                "/api/download/csv",
                post(|| async {
                    (
                        [(header::CONTENT_DISPOSITION, "attachment; filename=events.csv")],
                        "timestamp,action\n",
                    )
                }),
            );
        let api = AuditApi::new(spawn(router).await, None);
        Arc::new(AppState::new(api, ExplorerSettings::default()))
    }

    fn param(state: &QueryState) -> Query<StateQuery> {
        Query(StateQuery {
            state: Some(state.to_param()),
        })
    }

    fn week() -> QueryState {
        let range = DateRange::parse_days("2024-01-01", "2024-01-03").unwrap();
        QueryState::new(Some(range), 20)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn chart_json_returns_daily_series() {
        let state = week()
            .apply(QueryAction::SelectField {
                field: Some("action".into()),
            })
            .unwrap();
        let response = chart_json(State(app().await), param(&state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let chart = body_json(response).await;
        assert_eq!(chart["granularity"], "day");
        let names: Vec<&str> = chart["series"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["open", "login"]);
        assert_eq!(chart["series"][0]["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn chart_json_without_range_is_no_content() {
        let state = QueryState::new(None, 20);
        let response = chart_json(State(app().await), param(&state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway() {
        let api = AuditApi::new("http://127.0.0.1:9", None);
        let app = Arc::new(AppState::new(api, ExplorerSettings::default()));
        let status = chart_json(State(app), param(&week())).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn download_is_served_as_attachment() {
        let response = download(State(app().await), Path(ExportFormat::Csv), param(&week()))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"events.csv\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"timestamp,action\n");
    }
}
