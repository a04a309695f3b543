use crate::config::{ResultsSetup, EXPORT_COLUMN_KEYS};
use crate::grading::{Component, ScoreEntry, NOT_AVAILABLE};
use anyhow::Context;
use std::path::Path;

const CLASS_AVERAGE_LABEL: &str = "Class Average";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportColumn {
    StudentId,
    StudentName,
    Score(Component),
    Total,
    Position,
    Remarks,
}

impl ExportColumn {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "studentId" => Some(Self::StudentId),
            "studentName" => Some(Self::StudentName),
            "total" => Some(Self::Total),
            "position" => Some(Self::Position),
            "remarks" => Some(Self::Remarks),
            other => Component::ALL
                .iter()
                .find(|c| c.key() == other)
                .map(|&c| Self::Score(c)),
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::StudentId => "studentId",
            Self::StudentName => "studentName",
            Self::Score(c) => c.key(),
            Self::Total => "total",
            Self::Position => "position",
            Self::Remarks => "remarks",
        }
    }

    pub fn all() -> Vec<Self> {
        EXPORT_COLUMN_KEYS
            .iter()
            .filter_map(|k| Self::parse(k))
            .collect()
    }

    fn cell(self, e: &ScoreEntry) -> String {
        match self {
            Self::StudentId => e.student_id.clone(),
            Self::StudentName => e.student_name.clone(),
            Self::Score(c) => e.component(c).map(|v| v.to_string()).unwrap_or_default(),
            Self::Total => e.total.map(|v| format!("{:.2}", v)).unwrap_or_default(),
            Self::Position => e.position.clone().unwrap_or_default(),
            Self::Remarks => e.remarks.clone().unwrap_or_default(),
        }
    }
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn push_record(out: &mut String, cells: &[String]) {
    let line = cells
        .iter()
        .map(|c| csv_quote(c))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

/// Renders a ranked roster as CSV, one row per entry in display order.
///
/// With `include_class_average` set and a `total` column selected, a footer
/// row carries the class average under `total` and its label in the first
/// other column.
pub fn render_results_csv(
    entries: &[ScoreEntry],
    columns: &[ExportColumn],
    setup: &ResultsSetup,
    class_average: Option<f64>,
) -> String {
    let mut csv = String::new();
    let header: Vec<String> = columns
        .iter()
        .map(|c| setup.label_for(c.key()).to_string())
        .collect();
    push_record(&mut csv, &header);

    for e in entries {
        let row: Vec<String> = columns.iter().map(|c| c.cell(e)).collect();
        push_record(&mut csv, &row);
    }

    let total_idx = columns.iter().position(|c| *c == ExportColumn::Total);
    if let (true, Some(total_idx)) = (setup.include_class_average, total_idx) {
        let mut footer = vec![String::new(); columns.len()];
        if let Some(label_idx) = (0..columns.len()).find(|&i| i != total_idx) {
            footer[label_idx] = CLASS_AVERAGE_LABEL.to_string();
        }
        footer[total_idx] = class_average
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        push_record(&mut csv, &footer);
    }
    csv
}

pub fn write_export(out_path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(out_path, contents)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))
}
