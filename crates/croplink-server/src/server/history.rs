//! System of record for commodity time series.
//!
//! The marketplace keeps prices, supply, demand and harvests in a relational
//! database behind an ORM. The report flow only needs "ordered rows for two
//! entity keys and a date range", which [`HistorySource`] captures.
//! [`MemoryHistory`] serves series loaded from a JSON seed file.

use anyhow::Context;
use async_trait::async_trait;
use croplink_core::{
    Error, Result,
    dataset::{HistoryPoint, ReportDataset},
    types::{ReportKind, ReportRequest},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Rows for `request`, filtered to its date range and ordered by date.
    ///
    /// An unknown entity pair is `NotFound`; an existing series with no
    /// points in range is an empty dataset.
    async fn fetch(&self, request: &ReportRequest) -> Result<ReportDataset>;
}

/// One series in the seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesRecord {
    pub kind: ReportKind,
    pub entity_a: String,
    pub entity_b: String,
    #[serde(default)]
    pub points: Vec<HistoryPoint>,
}

type SeriesKey = (ReportKind, String, String);

#[derive(Debug, Default)]
pub struct MemoryHistory {
    series: HashMap<SeriesKey, Vec<HistoryPoint>>,
}

impl MemoryHistory {
    /// Appends `points` to the series for `(kind, entity_a, entity_b)`.
    pub fn insert(
        &mut self,
        kind: ReportKind,
        entity_a: &str,
        entity_b: &str,
        points: impl IntoIterator<Item = HistoryPoint>,
    ) {
        self.series
            .entry((kind, entity_a.to_string(), entity_b.to_string()))
            .or_default()
            .extend(points);
    }

    pub fn from_records(records: impl IntoIterator<Item = SeriesRecord>) -> Self {
        let mut history = Self::default();
        for record in records {
            history.insert(record.kind, &record.entity_a, &record.entity_b, record.points);
        }
        history
    }

    /// Loads a JSON array of [`SeriesRecord`]s.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let records: Vec<SeriesRecord> = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        let history = Self::from_records(records);
        tracing::info!(
            series = history.series.len(),
            path = %path.display(),
            "Loaded history seed"
        );
        Ok(history)
    }
}

#[async_trait]
impl HistorySource for MemoryHistory {
    async fn fetch(&self, request: &ReportRequest) -> Result<ReportDataset> {
        let key = (
            request.kind(),
            request.entity_a().to_string(),
            request.entity_b().to_string(),
        );
        let points = self.series.get(&key).ok_or_else(|| {
            let (label_a, label_b) = request.kind().entity_labels();
            Error::not_found(format!(
                "{} for {label_a} {} and {label_b} {}",
                request.kind(),
                request.entity_a(),
                request.entity_b()
            ))
        })?;
        Ok(ReportDataset::from_series(request, points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croplink_core::ErrorCode;

    const SEED: &str = r#"[
        {"kind": "price-history", "entity_a": "C1", "entity_b": "R1", "points": [
            {"date": "2023-01-15", "value": 12500, "unit": "IDR/kg"},
            {"date": "2023-01-01", "value": 12000, "unit": "IDR/kg"},
            {"date": "2023-02-01", "value": 13000, "unit": "IDR/kg"}
        ]},
        {"kind": "harvest-history", "entity_a": "L7", "entity_b": "C1"}
    ]"#;

    fn seeded() -> MemoryHistory {
        MemoryHistory::from_records(serde_json::from_str::<Vec<SeriesRecord>>(SEED).unwrap())
    }

    #[tokio::test]
    async fn fetch_filters_to_range() {
        let request = ReportRequest::parse(
            ReportKind::PriceHistory,
            "C1",
            "R1",
            Some("2023-01-01"),
            Some("2023-01-31"),
        )
        .unwrap();
        let dataset = seeded().fetch(&request).await.unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[tokio::test]
    async fn series_without_points_is_empty_not_missing() {
        let request =
            ReportRequest::parse(ReportKind::HarvestHistory, "L7", "C1", None, None).unwrap();
        assert!(seeded().fetch(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_entities_are_not_found() {
        let history = seeded();
        for (kind, a, b) in [
            (ReportKind::PriceHistory, "C2", "R1"),
            (ReportKind::SupplyHistory, "C1", "R1"),
        ] {
            let request = ReportRequest::parse(kind, a, b, None, None).unwrap();
            let err = history.fetch(&request).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::NotFound);
        }
    }

    #[tokio::test]
    async fn load_reports_bad_json_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = MemoryHistory::load(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("seed.json"));

        std::fs::write(&path, SEED).unwrap();
        let history = MemoryHistory::load(&path).await.unwrap();
        assert_eq!(history.series.len(), 2);
    }

    #[test]
    fn bundled_seed_parses() {
        let records: Vec<SeriesRecord> =
            serde_json::from_str(include_str!("../../seed.example.json")).unwrap();
        let history = MemoryHistory::from_records(records);
        assert_eq!(history.series.len(), 4);
    }
}
