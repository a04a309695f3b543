use crate::db;
use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Workspace settings sections editable through `setup.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupSection {
    Results,
}

impl SetupSection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "results" => Some(Self::Results),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Results => "results",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Results => "setup.results",
        }
    }
}

pub const EXPORT_COLUMN_KEYS: [&str; 9] = [
    "studentId",
    "studentName",
    "cat1",
    "cat2",
    "projectWork",
    "exams",
    "total",
    "position",
    "remarks",
];

fn default_column_labels() -> BTreeMap<String, String> {
    [
        ("studentId", "Student ID"),
        ("studentName", "Name"),
        ("cat1", "CAT 1"),
        ("cat2", "CAT 2"),
        ("projectWork", "Project Work"),
        ("exams", "Exams"),
        ("total", "Total"),
        ("position", "Position"),
        ("remarks", "Remarks"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ResultsSetup {
    pub school_name: String,
    pub column_labels: BTreeMap<String, String>,
    pub include_class_average: bool,
}

impl Default for ResultsSetup {
    fn default() -> Self {
        Self {
            school_name: String::new(),
            column_labels: default_column_labels(),
            include_class_average: true,
        }
    }
}

impl ResultsSetup {
    pub fn label_for<'a>(&'a self, column_key: &'a str) -> &'a str {
        self.column_labels
            .get(column_key)
            .map(String::as_str)
            .unwrap_or(column_key)
    }

    fn validate(&self) -> Result<(), String> {
        for key in self.column_labels.keys() {
            if !EXPORT_COLUMN_KEYS.contains(&key.as_str()) {
                return Err(format!("unknown export column: {}", key));
            }
        }
        Ok(())
    }
}

/// Overlays `patch` onto `base` one level deep; nested objects are merged key
/// by key so a patch can relabel a single column.
fn merge_into(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (k, v) in patch {
        match (base.get_mut(k), v) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (ik, iv) in incoming {
                    existing.insert(ik.clone(), iv.clone());
                }
            }
            _ => {
                base.insert(k.clone(), v.clone());
            }
        }
    }
}

fn parse_results(value: Value) -> Result<ResultsSetup, String> {
    let setup: ResultsSetup = serde_json::from_value(value).map_err(|e| e.to_string())?;
    setup.validate()?;
    Ok(setup)
}

pub fn load_results_setup(conn: &Connection) -> anyhow::Result<ResultsSetup> {
    let mut merged = serde_json::to_value(ResultsSetup::default())?;
    if let Some(Value::Object(saved)) = db::settings_get_json(conn, SetupSection::Results.key())? {
        if let Some(base) = merged.as_object_mut() {
            merge_into(base, &saved);
        }
    }
    parse_results(merged)
        .map_err(anyhow::Error::msg)
        .context("stored results setup is invalid")
}

pub fn section_values(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    match section {
        SetupSection::Results => Ok(serde_json::to_value(load_results_setup(conn)?)?),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("invalid setup: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Validates `patch` against the section schema, stores it and returns the
/// effective values.
pub fn update_section(
    conn: &Connection,
    section: SetupSection,
    patch: &Value,
) -> Result<Value, UpdateError> {
    let Some(patch) = patch.as_object() else {
        return Err(UpdateError::Invalid("patch must be an object".to_string()));
    };
    match section {
        SetupSection::Results => {
            let current = load_results_setup(conn)?;
            let mut merged = serde_json::to_value(&current).map_err(anyhow::Error::from)?;
            if let Some(base) = merged.as_object_mut() {
                merge_into(base, patch);
            }
            let next = parse_results(merged).map_err(UpdateError::Invalid)?;
            let stored = serde_json::to_value(&next).map_err(anyhow::Error::from)?;
            db::settings_set_json(conn, section.key(), &stored)?;
            Ok(stored)
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Results => {
            serde_json::to_value(ResultsSetup::default()).unwrap_or_else(|_| json!({}))
        }
    }
}
