use std::collections::BTreeMap;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::events::{AuditEvent, value_text};
use crate::query::{DateRange, FilterSet, QueryRequest, QueryState};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned {status}: {message}")]
    Server {
        path: String,
        status: StatusCode,
        message: String,
    },
    #[error("could not decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Reply to loading a range. The rows themselves are fetched again through
/// [`AuditApi::query`] so they can be filtered and paged.
#[derive(Debug, Deserialize)]
pub struct LoadResponse {
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// One page of rows for the table
    #[serde(default)]
    pub data: Vec<AuditEvent>,
    /// Every row matching the filters, for the chart
    #[serde(default)]
    pub chart_data: Vec<AuditEvent>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnMeta {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "values_as_text")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnsResponse {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnMeta>,
    #[serde(default)]
    pub column_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilteredColumnsResponse {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnMeta>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn values_as_text<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(values.iter().filter_map(value_text).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Parquet,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Parquet => "parquet",
        }
    }

    fn default_content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Parquet => "application/octet-stream",
        }
    }
}

pub struct Export {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Client for the audit query API.
#[derive(Clone)]
pub struct AuditApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl AuditApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        AuditApi {
            client: Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, token),
            None => builder,
        }
    }

    async fn send(&self, path: &str, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|source| ApiError::Http {
            path: path.to_owned(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_owned(),
        };
        warn!("{path} returned {status}: {message}");
        Err(ApiError::Server {
            path: path.to_owned(),
            status,
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        self.send(path, builder)
            .await?
            .json()
            .await
            .map_err(|source| ApiError::Decode {
                path: path.to_owned(),
                source,
            })
    }

    /// Makes the API load `range` (end day inclusive). Every other call
    /// reads from the most recently loaded range.
    pub async fn load_range(&self, range: &DateRange) -> Result<LoadResponse, ApiError> {
        let path = "/api/data";
        info!("loading {} .. {}", range.start_day(), range.end_day());
        let builder = self
            .request(Method::GET, path)
            .query(&[("start", range.start_day()), ("end", range.end_day())]);
        self.send_json(path, builder).await
    }

    pub async fn query(&self, state: &QueryState) -> Result<QueryResponse, ApiError> {
        let path = "/api/query";
        info!(
            page = state.page,
            page_size = state.page_size,
            sort_column = %state.sort_column,
            sort_order = state.sort_order.as_str(),
            "querying events"
        );
        let builder = self
            .request(Method::POST, path)
            .json(&QueryRequest::from(state));
        self.send_json(path, builder).await
    }

    pub async fn columns(&self) -> Result<ColumnsResponse, ApiError> {
        let path = "/api/columns";
        self.send_json(path, self.request(Method::GET, path)).await
    }

    /// Values still selectable per column when every other column's
    /// filters are applied.
    pub async fn filtered_columns(
        &self,
        filters: &FilterSet,
    ) -> Result<FilteredColumnsResponse, ApiError> {
        let path = "/api/filtered-columns";
        let builder = self.request(Method::POST, path).json(filters);
        self.send_json(path, builder).await
    }

    pub async fn download(
        &self,
        format: ExportFormat,
        filters: &FilterSet,
    ) -> Result<Export, ApiError> {
        let path = format!("/api/download/{}", format.extension());
        info!("exporting filtered events as {}", format.extension());
        let builder = self.request(Method::POST, &path).json(filters);
        let response = self.send(&path, builder).await?;

        let headers = response.headers();
        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| {
                format!(
                    "workspace_audit_events_{}.{}",
                    Utc::now().format("%Y%m%d_%H%M%S"),
                    format.extension()
                )
            });
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(format.default_content_type())
            .to_owned();

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::Decode { path, source })?;

        Ok(Export {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

fn disposition_filename(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_owned())
        .find(|name| !name.is_empty())
}
