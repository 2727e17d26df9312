use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_PAGE_SIZE, DEFAULT_RANGE_DAYS, TOP_N_VALUES};
use crate::events::AuditEvent;

/// Column visibility, labels and chart settings, read from a TOML file.
/// Every key is optional.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ExplorerSettings {
    pub top_n: usize,
    pub page_size: u32,
    pub default_range_days: i64,
    /// Columns that never get a filter control
    pub exclude_columns: Vec<String>,
    /// Columns the chart cannot be split by
    pub field_selector_exclude_columns: Vec<String>,
    pub hidden_table_columns: Vec<String>,
    pub filter_column_order: Vec<String>,
    pub table_column_order: Vec<String>,
    pub column_labels: BTreeMap<String, String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        ExplorerSettings {
            top_n: TOP_N_VALUES,
            page_size: DEFAULT_PAGE_SIZE,
            default_range_days: DEFAULT_RANGE_DAYS,
            exclude_columns: strings(&[
                "uuid",
                "deduplicationId",
                "timestamp",
                "projectId",
                "userId",
                "workspaceName",
                "environmentName",
                "hardwareTierId",
            ]),
            field_selector_exclude_columns: strings(&[
                "uuid",
                "deduplicationId",
                "timestamp",
                "projectId",
                "userId",
            ]),
            hidden_table_columns: strings(&["userId", "uuid", "deduplicationId"]),
            filter_column_order: strings(&[
                "action",
                "username",
                "projectName",
                "workspaceName",
                "filename",
                "environmentName",
                "hardwareTierId",
            ]),
            table_column_order: strings(&[
                "timestamp",
                "username",
                "action",
                "filename",
                "projectName",
                "workspaceName",
                "environmentName",
                "hardwareTierId",
                "projectId",
            ]),
            column_labels: [
                ("timestamp", "Timestamp"),
                ("username", "Username"),
                ("action", "Event"),
                ("filename", "File path"),
                ("projectName", "Project Name"),
                ("workspaceName", "Workspace Name"),
                ("environmentName", "Environment Name"),
                ("environmentRevisionNumber", "Environment Revision Number"),
                ("hardwareTierId", "Hardware Tier"),
                ("projectId", "Project ID"),
                ("workspaceId", "Workspace ID"),
                ("userId", "User ID"),
                ("uuid", "UUID"),
                ("deduplicationId", "Deduplication ID"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect(),
        }
    }
}

impl ExplorerSettings {
    /// Upstream label, then configured label, then the camelCase name split
    /// into words.
    pub fn column_label(&self, column: &str, upstream: &BTreeMap<String, String>) -> String {
        upstream
            .get(column)
            .or_else(|| self.column_labels.get(column))
            .cloned()
            .unwrap_or_else(|| split_camel_case(column))
    }

    pub fn filter_columns<'a>(&self, columns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        ordered(&self.filter_column_order, columns, &self.exclude_columns)
    }

    pub fn breakdown_columns<'a>(&self, columns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        ordered(
            &self.filter_column_order,
            columns,
            &self.field_selector_exclude_columns,
        )
    }

    /// Columns present in `rows`, in table order, minus hidden ones.
    pub fn table_columns(&self, rows: &[AuditEvent]) -> Vec<String> {
        ordered(
            &self.table_column_order,
            rows.iter().flat_map(AuditEvent::columns),
            &self.hidden_table_columns,
        )
    }
}

/// `present` minus `skip`: columns named in `order` first, the rest sorted.
fn ordered<'a>(
    order: &[String],
    present: impl IntoIterator<Item = &'a str>,
    skip: &[String],
) -> Vec<String> {
    let mut present: BTreeSet<&str> = present.into_iter().collect();
    present.retain(|c| !skip.iter().any(|s| s == c));

    let mut columns: Vec<String> = order
        .iter()
        .filter(|c| present.remove(c.as_str()))
        .cloned()
        .collect();
    columns.extend(present.into_iter().map(str::to_owned));
    columns
}

fn split_camel_case(column: &str) -> String {
    let mut label = String::with_capacity(column.len() + 4);
    for c in column.chars() {
        if c.is_ascii_uppercase() {
            label.push(' ');
        }
        label.push(c);
    }
    label.trim().to_owned()
}

/// Loads explorer settings. Returns `ExplorerSettings::default()` if the file
/// doesn't exist; propagates other I/O and parse errors.
pub fn load(path: &Path) -> io::Result<ExplorerSettings> {
    match fs::read_to_string(path) {
        Ok(content) => {
            toml::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ExplorerSettings::default()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(&dir.path().join("explorer.toml")).unwrap();
        assert_eq!(settings, ExplorerSettings::default());
        assert_eq!(settings.top_n, 10);
        assert_eq!(settings.page_size, 100);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explorer.toml");
        fs::write(
            &path,
            "top_n = 3\nhidden_table_columns = []\n\n[column_labels]\naction = \"Action\"\n",
        )
        .unwrap();

        let settings = load(&path).unwrap();
        assert_eq!(settings.top_n, 3);
        assert!(settings.hidden_table_columns.is_empty());
        assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(settings.column_labels.len(), 1);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explorer.toml");
        fs::write(&path, "top_n = \"many\"").unwrap();
        let err = load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn labels_prefer_upstream_then_settings() {
        let settings = ExplorerSettings::default();
        let upstream = BTreeMap::from([("action".to_owned(), "Audit Event".to_owned())]);
        assert_eq!(settings.column_label("action", &upstream), "Audit Event");
        assert_eq!(settings.column_label("filename", &upstream), "File path");
        assert_eq!(settings.column_label("datasetName", &upstream), "dataset Name");
    }

    #[test]
    fn filter_columns_follow_configured_order() {
        let settings = ExplorerSettings::default();
        let columns = settings.filter_columns([
            "zone",
            "filename",
            "uuid",
            "action",
            "timestamp",
            "username",
        ]);
        assert_eq!(columns, vec!["action", "username", "filename", "zone"]);
    }

    #[test]
    fn breakdown_allows_columns_hidden_from_filters() {
        let settings = ExplorerSettings::default();
        let columns = settings.breakdown_columns(["workspaceName", "uuid", "action"]);
        assert_eq!(columns, vec!["action", "workspaceName"]);
    }

    #[test]
    fn table_columns_come_from_rows() {
        let settings = ExplorerSettings::default();
        let rows: Vec<AuditEvent> = vec![
            serde_json::from_value(json!({ "uuid": "1", "action": "login", "timestamp": "t" }))
                .unwrap(),
            serde_json::from_value(json!({ "extra": 1, "username": "ada" })).unwrap(),
        ];
        assert_eq!(
            settings.table_columns(&rows),
            vec!["timestamp", "username", "action", "extra"]
        );
    }
}
