use serde::Serialize;
use std::cmp::Ordering;

/// Assessed components of a subject score, in the order they appear on a
/// report card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Cat1,
    Cat2,
    ProjectWork,
    Exams,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Cat1,
        Component::Cat2,
        Component::ProjectWork,
        Component::Exams,
    ];

    /// Wire/JSON key.
    pub fn key(self) -> &'static str {
        match self {
            Self::Cat1 => "cat1",
            Self::Cat2 => "cat2",
            Self::ProjectWork => "projectWork",
            Self::Exams => "exams",
        }
    }

    /// Column name in `roster_entries`.
    pub fn column(self) -> &'static str {
        match self {
            Self::Cat1 => "cat1",
            Self::Cat2 => "cat2",
            Self::ProjectWork => "project_work",
            Self::Exams => "exams",
        }
    }

    pub fn max(self) -> f64 {
        match self {
            Self::Cat1 => 10.0,
            Self::Cat2 => 20.0,
            Self::ProjectWork => 20.0,
            Self::Exams => 100.0,
        }
    }

    /// Contribution of a raw component score to the subject total.
    fn weighted(self, raw: f64) -> f64 {
        match self {
            Self::Exams => raw / 2.0,
            _ => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remark {
    Weak,
    Average,
    Good,
}

impl Remark {
    pub const WEAK_BELOW: f64 = 40.0;
    pub const AVERAGE_BELOW: f64 = 60.0;

    pub fn for_total(total: f64) -> Self {
        if total < Self::WEAK_BELOW {
            Self::Weak
        } else if total < Self::AVERAGE_BELOW {
            Self::Average
        } else {
            Self::Good
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weak => "WEAK",
            Self::Average => "AVERAGE",
            Self::Good => "GOOD",
        }
    }
}

/// Label used wherever a total (and therefore a remark or average) is absent.
pub const NOT_AVAILABLE: &str = "N/A";

pub fn remark_label(total: Option<f64>) -> &'static str {
    match total {
        Some(t) => Remark::for_total(t).as_str(),
        None => NOT_AVAILABLE,
    }
}

/// One student's scores for one subject/term.
///
/// `total`, `position` and `remarks` are derived by [`rank_roster`]; they stay
/// `None` until a ranking pass has run over the whole roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub student_id: String,
    pub student_name: String,
    pub cat1: Option<f64>,
    pub cat2: Option<f64>,
    pub project_work: Option<f64>,
    pub exams: Option<f64>,
    pub total: Option<f64>,
    pub position: Option<String>,
    pub remarks: Option<String>,
}

impl ScoreEntry {
    pub fn new(student_id: impl Into<String>, student_name: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            student_name: student_name.into(),
            ..Self::default()
        }
    }

    pub fn component(&self, c: Component) -> Option<f64> {
        match c {
            Component::Cat1 => self.cat1,
            Component::Cat2 => self.cat2,
            Component::ProjectWork => self.project_work,
            Component::Exams => self.exams,
        }
    }

    pub fn set_component(&mut self, c: Component, value: Option<f64>) {
        let slot = match c {
            Component::Cat1 => &mut self.cat1,
            Component::Cat2 => &mut self.cat2,
            Component::ProjectWork => &mut self.project_work,
            Component::Exams => &mut self.exams,
        };
        *slot = value;
    }

    #[cfg(test)]
    pub fn with_scores(
        mut self,
        cat1: Option<f64>,
        cat2: Option<f64>,
        project_work: Option<f64>,
        exams: Option<f64>,
    ) -> Self {
        self.cat1 = cat1;
        self.cat2 = cat2;
        self.project_work = project_work;
        self.exams = exams;
        self
    }
}

/// Rounds half away from zero to 2 decimal places. Values too large to scale
/// already have no fractional digits and are returned unchanged.
pub fn round_2_decimals(x: f64) -> f64 {
    let scaled = x * 100.0;
    if !scaled.is_finite() {
        return x;
    }
    scaled.round() / 100.0
}

/// Reads a loosely-typed score: JSON numbers and numeric strings are taken,
/// everything else (absent, null, text, NaN, infinities) yields `None`.
pub fn coerce_score(raw: Option<&serde_json::Value>) -> Option<f64> {
    let v = match raw? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

pub fn compute_total(entry: &ScoreEntry) -> f64 {
    let sum: f64 = Component::ALL
        .iter()
        .map(|&c| {
            let raw = entry.component(c).filter(|v| v.is_finite()).unwrap_or(0.0);
            c.weighted(raw)
        })
        .sum();
    if !sum.is_finite() {
        return 0.0;
    }
    round_2_decimals(sum)
}

/// `1 -> "1ST"`, `12 -> "12TH"`, `23 -> "23RD"`, `111 -> "111TH"`.
pub fn ordinal_position(rank: usize) -> String {
    let suffix = if (11..=13).contains(&(rank % 100)) {
        "TH"
    } else {
        match rank % 10 {
            1 => "ST",
            2 => "ND",
            3 => "RD",
            _ => "TH",
        }
    };
    format!("{}{}", rank, suffix)
}

/// Ranking pass over a roster snapshot.
///
/// Totals are recomputed, entries are ranked by descending total and each one
/// receives a distinct sequential position; ties keep their roster order.
/// The result is returned in the input (display) order.
pub fn rank_roster(entries: &[ScoreEntry]) -> Vec<ScoreEntry> {
    let totals: Vec<f64> = entries.iter().map(compute_total).collect();

    let mut order: Vec<usize> = (0..entries.len()).collect();
    // `sort_by` is stable, which is what keeps ties in roster order.
    order.sort_by(|&a, &b| totals[b].partial_cmp(&totals[a]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0usize; entries.len()];
    for (i, &idx) in order.iter().enumerate() {
        ranks[idx] = i + 1;
    }

    entries
        .iter()
        .zip(totals)
        .zip(ranks)
        .map(|((e, total), rank)| ScoreEntry {
            total: Some(total),
            position: Some(ordinal_position(rank)),
            remarks: Some(remark_label(Some(total)).to_string()),
            ..e.clone()
        })
        .collect()
}

/// Mean of the totals the entries carry, `None` when no entry has one.
///
/// Entries added since the last ranking pass have no total and are left out,
/// so the average always matches the totals shown alongside it.
pub fn class_average(entries: &[ScoreEntry]) -> Option<f64> {
    let totals: Vec<f64> = entries.iter().filter_map(|e| e.total).collect();
    if totals.is_empty() {
        return None;
    }
    let n = totals.len() as f64;
    let mut mean = totals.iter().sum::<f64>() / n;
    if !mean.is_finite() {
        mean = totals.iter().map(|t| t / n).sum();
    }
    Some(round_2_decimals(mean))
}

/// JSON form of a class average: a number, or `"N/A"` when there is none.
pub fn class_average_json(avg: Option<f64>) -> serde_json::Value {
    match avg {
        Some(v) => serde_json::json!(v),
        None => serde_json::json!(NOT_AVAILABLE),
    }
}
