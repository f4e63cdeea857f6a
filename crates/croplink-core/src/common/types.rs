//! # Report request and key types
//!
//! A report is identified by its [`ReportKey`]:
//!
//! ```text
//! <prefix>_<entity_a>_<entity_b>_<start>_<end>
//! ```
//!
//! and every rendered file is named `<ReportKey>_<GenerationStamp>.xlsx`.
//! The key is the only join point between the request that starts a render
//! and the request that later downloads it; there is no job id.
//!
//! ## Two ways to build a key
//!
//! - [`ReportRequest::key`] uses the *parsed* dates, formatted as
//!   [`DATE_FORMAT`]. This is the trigger side.
//! - [`ReportKey::from_raw`] uses the *raw* query text, checked only for a
//!   safe character set. This is the download side.
//!
//! Both agree whenever the client sends canonical `YYYY-MM-DD` text. They
//! disagree for text such as `2023-1-5`, which parses fine but is not
//! reformatted on the download side, so the file is not found. The
//! `download_url` returned at trigger time always carries canonical text.

use crate::common::error::{Error, Result};
use chrono::NaiveDate;
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

use super::stamp::GenerationStamp;

/// Calendar-date format accepted in requests and used in keys.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Extension of every rendered report.
pub const REPORT_EXTENSION: &str = "xlsx";

/// MIME type served with report downloads.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Separator between key components and before the stamp.
pub const KEY_SEPARATOR: char = '_';

/// Key text used for an absent date bound.
pub const OPEN_BOUND: &str = "any";

pub const MAX_ENTITY_ID_LEN: usize = 64;
const MAX_RAW_DATE_LEN: usize = 32;

/// The time series a report is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    PriceHistory,
    SupplyHistory,
    DemandHistory,
    HarvestHistory,
}

impl ReportKind {
    pub const ALL: [Self; 4] = [
        Self::PriceHistory,
        Self::SupplyHistory,
        Self::DemandHistory,
        Self::HarvestHistory,
    ];

    /// Path segment, e.g. `price-history`.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::PriceHistory => "price-history",
            Self::SupplyHistory => "supply-history",
            Self::DemandHistory => "demand-history",
            Self::HarvestHistory => "harvest-history",
        }
    }

    /// First component of the report key.
    #[must_use]
    pub const fn file_prefix(self) -> &'static str {
        match self {
            Self::PriceHistory => "price_history",
            Self::SupplyHistory => "supply_history",
            Self::DemandHistory => "demand_history",
            Self::HarvestHistory => "harvest_history",
        }
    }

    /// Names of the two entities a report is keyed by.
    #[must_use]
    pub const fn entity_labels(self) -> (&'static str, &'static str) {
        match self {
            Self::PriceHistory | Self::SupplyHistory | Self::DemandHistory => {
                ("commodity", "region")
            }
            Self::HarvestHistory => ("land", "commodity"),
        }
    }

    #[must_use]
    pub const fn sheet_name(self) -> &'static str {
        match self {
            Self::PriceHistory => "Price History",
            Self::SupplyHistory => "Supply History",
            Self::DemandHistory => "Demand History",
            Self::HarvestHistory => "Harvest History",
        }
    }

    /// Fixed column labels of the rendered sheet.
    #[must_use]
    pub const fn headers(self) -> [&'static str; 5] {
        match self {
            Self::PriceHistory => ["Date", "Commodity ID", "Region ID", "Price", "Unit"],
            Self::SupplyHistory => ["Date", "Commodity ID", "Region ID", "Supply Quantity", "Unit"],
            Self::DemandHistory => ["Date", "Commodity ID", "Region ID", "Demand Quantity", "Unit"],
            Self::HarvestHistory => ["Date", "Land ID", "Commodity ID", "Harvest Quantity", "Unit"],
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ReportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| Error::invalid(format!("unknown report kind `{s}`")))
    }
}

/// Identifier of a commodity, region or land.
///
/// Restricted to ASCII alphanumerics and `-` so it can be embedded in a file
/// name between `_` separators.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Validates `raw` as an identifier; `label` names it in the error.
    pub fn parse(label: &str, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::invalid(format!("{label} id must not be empty")));
        }
        if raw.len() > MAX_ENTITY_ID_LEN {
            return Err(Error::invalid(format!(
                "{label} id exceeds {MAX_ENTITY_ID_LEN} characters"
            )));
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(Error::invalid(format!(
                "{label} id `{raw}` may only contain letters, digits and '-'"
            )));
        }
        Ok(Self(raw.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Treats absent and blank query values the same way.
fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Parses a calendar date in [`DATE_FORMAT`].
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| {
        Error::invalid(format!(
            "{field} `{raw}` is not a valid date (expected YYYY-MM-DD): {e}"
        ))
    })
}

/// A validated report request. Immutable once accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportRequest {
    kind: ReportKind,
    entity_a: EntityId,
    entity_b: EntityId,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl ReportRequest {
    pub fn new(
        kind: ReportKind,
        entity_a: EntityId,
        entity_b: EntityId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Self> {
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(Error::invalid(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        Ok(Self {
            kind,
            entity_a,
            entity_b,
            start_date,
            end_date,
        })
    }

    /// Validates raw path and query values. Malformed dates are rejected,
    /// never defaulted.
    pub fn parse(
        kind: ReportKind,
        raw_a: &str,
        raw_b: &str,
        raw_start: Option<&str>,
        raw_end: Option<&str>,
    ) -> Result<Self> {
        let (label_a, label_b) = kind.entity_labels();
        let entity_a = EntityId::parse(label_a, raw_a)?;
        let entity_b = EntityId::parse(label_b, raw_b)?;
        let start_date = present(raw_start)
            .map(|raw| parse_date("start_date", raw))
            .transpose()?;
        let end_date = present(raw_end)
            .map(|raw| parse_date("end_date", raw))
            .transpose()?;
        Self::new(kind, entity_a, entity_b, start_date, end_date)
    }

    #[must_use]
    pub const fn kind(&self) -> ReportKind {
        self.kind
    }

    #[must_use]
    pub const fn entity_a(&self) -> &EntityId {
        &self.entity_a
    }

    #[must_use]
    pub const fn entity_b(&self) -> &EntityId {
        &self.entity_b
    }

    #[must_use]
    pub const fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    #[must_use]
    pub const fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    /// Whether `date` falls inside the inclusive range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| date >= start)
            && self.end_date.is_none_or(|end| date <= end)
    }

    /// Canonical start date text, as embedded in keys and download URLs.
    #[must_use]
    pub fn start_text(&self) -> Option<String> {
        self.start_date.map(|d| d.format(DATE_FORMAT).to_string())
    }

    #[must_use]
    pub fn end_text(&self) -> Option<String> {
        self.end_date.map(|d| d.format(DATE_FORMAT).to_string())
    }

    /// Trigger-side key, built from the parsed and reformatted dates.
    #[must_use]
    pub fn key(&self) -> ReportKey {
        ReportKey::compose(
            self.kind,
            self.entity_a.as_str(),
            self.entity_b.as_str(),
            self.start_text().as_deref(),
            self.end_text().as_deref(),
        )
    }
}

/// Deterministic name of a report's parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReportKey {
    kind: ReportKind,
    text: String,
}

impl ReportKey {
    fn compose(
        kind: ReportKind,
        entity_a: &str,
        entity_b: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Self {
        let sep = KEY_SEPARATOR;
        let text = format!(
            "{prefix}{sep}{entity_a}{sep}{entity_b}{sep}{start}{sep}{end}",
            prefix = kind.file_prefix(),
            start = start.unwrap_or(OPEN_BOUND),
            end = end.unwrap_or(OPEN_BOUND),
        );
        Self { kind, text }
    }

    /// Download-side key, built from the raw values exactly as received.
    ///
    /// Identifiers are validated like [`EntityId`]; date text is checked
    /// only for a safe character set and is *not* parsed or reformatted.
    pub fn from_raw(
        kind: ReportKind,
        raw_a: &str,
        raw_b: &str,
        raw_start: Option<&str>,
        raw_end: Option<&str>,
    ) -> Result<Self> {
        let (label_a, label_b) = kind.entity_labels();
        let entity_a = EntityId::parse(label_a, raw_a)?;
        let entity_b = EntityId::parse(label_b, raw_b)?;
        let start = present(raw_start)
            .map(|raw| raw_date_token("start_date", raw))
            .transpose()?;
        let end = present(raw_end)
            .map(|raw| raw_date_token("end_date", raw))
            .transpose()?;
        Ok(Self::compose(
            kind,
            entity_a.as_str(),
            entity_b.as_str(),
            start,
            end,
        ))
    }

    #[must_use]
    pub const fn kind(&self) -> ReportKind {
        self.kind
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Prefix shared by every file generated for this key.
    #[must_use]
    pub fn file_prefix(&self) -> String {
        format!("{}{KEY_SEPARATOR}", self.text)
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `OPEN_BOUND` is refused: it would alias the absent bound in the key.
fn raw_date_token<'a>(field: &str, raw: &'a str) -> Result<&'a str> {
    if raw == OPEN_BOUND {
        return Err(Error::invalid(format!(
            "{field} `{raw}` is not a date; omit the parameter for an open range"
        )));
    }
    if raw.len() <= MAX_RAW_DATE_LEN && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        Ok(raw)
    } else {
        Err(Error::invalid(format!(
            "{field} `{raw}` contains characters not allowed in a report name"
        )))
    }
}

/// Name of one rendered report: `<ReportKey>_<GenerationStamp>.xlsx`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReportFileName {
    key: ReportKey,
    stamp: GenerationStamp,
}

impl ReportFileName {
    #[must_use]
    pub const fn new(key: ReportKey, stamp: GenerationStamp) -> Self {
        Self { key, stamp }
    }

    #[must_use]
    pub const fn key(&self) -> &ReportKey {
        &self.key
    }

    #[must_use]
    pub const fn stamp(&self) -> GenerationStamp {
        self.stamp
    }

    /// Extracts the stamp from `name` if it is a report file for `key`.
    ///
    /// Names for other keys, temporary files and names whose suffix is not
    /// a well-formed stamp yield `None`.
    #[must_use]
    pub fn stamp_of(key: &ReportKey, name: &str) -> Option<GenerationStamp> {
        name.strip_prefix(key.as_str())?
            .strip_prefix(KEY_SEPARATOR)?
            .strip_suffix(REPORT_EXTENSION)?
            .strip_suffix('.')?
            .parse()
            .ok()
    }
}

impl fmt::Display for ReportFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}.{REPORT_EXTENSION}",
            self.key, self.stamp
        )
    }
}
