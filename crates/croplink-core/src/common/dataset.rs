//! Rows backing a report.
//!
//! A [`ReportDataset`] is fetched fresh from the system of record when a
//! render starts, handed to the renderer, and dropped. It is never stored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::types::{ReportKind, ReportRequest};

/// One observation of a time series as stored by the system of record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A single spreadsheet cell.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Date(NaiveDate),
    Text(String),
    Number(f64),
}

/// Header row plus records in chronological order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportDataset {
    kind: ReportKind,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl ReportDataset {
    /// Empty dataset carrying the fixed headers of `kind`.
    #[must_use]
    pub fn new(kind: ReportKind) -> Self {
        Self {
            kind,
            headers: kind.headers().iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }

    /// Builds the dataset for `request` from a series, keeping the points
    /// inside the requested range and ordering them by date.
    #[must_use]
    pub fn from_series(request: &ReportRequest, points: &[HistoryPoint]) -> Self {
        let mut selected: Vec<&HistoryPoint> =
            points.iter().filter(|p| request.contains(p.date)).collect();
        // Stable, so same-day points keep the source order.
        selected.sort_by_key(|p| p.date);

        let mut dataset = Self::new(request.kind());
        for point in selected {
            dataset.rows.push(vec![
                Cell::Date(point.date),
                Cell::Text(request.entity_a().to_string()),
                Cell::Text(request.entity_b().to_string()),
                Cell::Number(point.value),
                Cell::Text(point.unit.clone().unwrap_or_default()),
            ]);
        }
        dataset
    }

    #[must_use]
    pub const fn kind(&self) -> ReportKind {
        self.kind
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
