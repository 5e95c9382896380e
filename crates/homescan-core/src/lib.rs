//! Core domain model for the homescan ingestion pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub const CRATE_NAME: &str = "homescan-core";

/// Upper bound on unrecognized extraction keys kept per record.
pub const MAX_EXTRA_FIELDS: usize = 32;

/// Maximum number of characters kept from a transcript summary.
pub const TRANSCRIPT_SUMMARY_LIMIT: usize = 500;

const RECORD_FILE_EXTENSION: &str = ".json";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("external id is empty")]
    Empty,
    #[error("external id {0:?} contains a path separator or control byte")]
    IllegalCharacter(String),
    #[error("external id {0:?} must not start with '.'")]
    LeadingDot(String),
    #[error("record file name {0:?} is not of the form YYYY-MM-DD_<id>.json")]
    MalformedFileName(String),
}

/// Identity of a stored record: ingestion day plus external item id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub ingestion_date: NaiveDate,
    pub external_id: String,
}

impl RecordKey {
    pub fn new(ingestion_date: NaiveDate, external_id: impl Into<String>) -> Result<Self, KeyError> {
        let external_id = external_id.into();
        validate_external_id(&external_id)?;
        Ok(Self {
            ingestion_date,
            external_id,
        })
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}{}",
            self.ingestion_date.format(DATE_FORMAT),
            self.external_id,
            RECORD_FILE_EXTENSION
        )
    }

    pub fn from_file_name(name: &str) -> Result<Self, KeyError> {
        let malformed = || KeyError::MalformedFileName(name.to_string());
        let stem = name.strip_suffix(RECORD_FILE_EXTENSION).ok_or_else(malformed)?;
        let (date, id) = stem.split_once('_').ok_or_else(malformed)?;
        let ingestion_date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| malformed())?;
        Self::new(ingestion_date, id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ingestion_date.format(DATE_FORMAT), self.external_id)
    }
}

pub fn validate_external_id(id: &str) -> Result<(), KeyError> {
    if id.is_empty() {
        return Err(KeyError::Empty);
    }
    if id.starts_with('.') {
        return Err(KeyError::LeadingDot(id.to_string()));
    }
    if id.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(KeyError::IllegalCharacter(id.to_string()));
    }
    Ok(())
}

/// A discovered item handed out by a candidate source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub external_id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub channel_url: Option<String>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub external_id: String,
    pub source_url: String,
    pub title: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    pub discovered_at: DateTime<Utc>,
}

impl ItemInfo {
    pub fn from_candidate(candidate: &Candidate, discovered_at: DateTime<Utc>) -> Self {
        Self {
            external_id: candidate.external_id.clone(),
            source_url: candidate.url.clone(),
            title: candidate.title.clone(),
            channel: candidate.channel.clone(),
            channel_url: candidate.channel_url.clone(),
            upload_date: candidate.upload_date.clone(),
            duration_seconds: candidate.duration_seconds,
            view_count: candidate.view_count,
            discovered_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum PropertyType {
    IndependentHouse,
    Apartment,
    Villa,
    Plot,
    Commercial,
    Other,
}

impl From<String> for PropertyType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "independent_house" | "individual_house" | "house" => Self::IndependentHouse,
            "apartment" | "flat" => Self::Apartment,
            "villa" => Self::Villa,
            "plot" | "open_plot" => Self::Plot,
            "commercial" => Self::Commercial,
            _ => Self::Other,
        }
    }
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndependentHouse => "independent_house",
            Self::Apartment => "apartment",
            Self::Villa => "villa",
            Self::Plot => "plot",
            Self::Commercial => "commercial",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_ft: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_ft: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_area_sq_yards: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_up_area_sq_ft: Option<f64>,
}

/// Asking price in whole rupees.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Price {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_sq_yard: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floors: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hall: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kitchen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_parking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bike_parking: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Construction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_built: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_width_ft: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floors_allowed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Legal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_loan_eligible: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phone: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Structured fields extracted from one item.
///
/// Known fields are typed; anything else the extractor emits lands in
/// `extra`, which [`PropertyDetails::bound_extras`] caps at
/// [`MAX_EXTRA_FIELDS`] entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Configuration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amenities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construction: Option<Construction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal: Option<Legal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PropertyDetails {
    /// True when the extractor produced nothing describing the property.
    pub fn is_empty(&self) -> bool {
        self.property_type.is_none()
            && self.dimensions.is_none()
            && self.price.is_none()
            && self.location.is_none()
            && self.configuration.is_none()
            && self.amenities.is_empty()
            && self.construction.is_none()
            && self.legal.is_none()
            && self.contact.is_none()
    }

    /// Drops unrecognized keys past [`MAX_EXTRA_FIELDS`], keeping the first ones in key order.
    pub fn bound_extras(&mut self) -> usize {
        if self.extra.len() <= MAX_EXTRA_FIELDS {
            return 0;
        }
        let overflow: Vec<String> = self.extra.keys().skip(MAX_EXTRA_FIELDS).cloned().collect();
        for key in &overflow {
            self.extra.remove(key);
        }
        warn!(dropped = overflow.len(), "dropping unrecognized extraction fields over limit");
        overflow.len()
    }

    pub fn price_amount(&self) -> Option<u64> {
        self.price.as_ref().and_then(|p| p.amount)
    }
}

/// Identifier of one pipeline stage that touched a record, e.g. `transcription` / `whisper-medium`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageId {
    pub stage: String,
    pub id: String,
}

impl StageId {
    pub fn new(stage: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub processed_at: DateTime<Utc>,
    pub ingestion_date: NaiveDate,
    pub run_id: Uuid,
    #[serde(default)]
    pub search_query: String,
    #[serde(default)]
    pub stages: Vec<StageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// What an item processor hands back for one candidate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub extracted_data: PropertyDetails,
    #[serde(default)]
    pub transcript_summary: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageId>,
}

/// One persisted record per successfully processed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub item_info: ItemInfo,
    pub extracted_data: PropertyDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_summary: Option<String>,
    pub processing_info: ProcessingInfo,
}

impl PropertyRecord {
    pub fn assemble(
        candidate: &Candidate,
        item: ExtractedItem,
        run_id: Uuid,
        search_query: &str,
        processed_at: DateTime<Utc>,
        ingestion_date: NaiveDate,
    ) -> Self {
        let mut extracted_data = item.extracted_data;
        extracted_data.bound_extras();
        let confidence = extracted_data.confidence_score;
        Self {
            item_info: ItemInfo::from_candidate(candidate, processed_at),
            extracted_data,
            transcript_summary: item
                .transcript_summary
                .map(|s| s.chars().take(TRANSCRIPT_SUMMARY_LIMIT).collect()),
            processing_info: ProcessingInfo {
                processed_at,
                ingestion_date,
                run_id,
                search_query: search_query.to_string(),
                stages: item.stages,
                confidence,
            },
        }
    }

    pub fn key(&self) -> Result<RecordKey, KeyError> {
        RecordKey::new(
            self.processing_info.ingestion_date,
            self.item_info.external_id.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failure,
    Skipped,
}

impl RunStatus {
    /// Outcome of the per-item loop.
    ///
    /// No failures (including nothing attempted) is success; failures next to
    /// at least one success is partial success; nothing succeeding out of a
    /// non-empty attempt is failure.
    pub fn classify(attempted: usize, succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if succeeded > 0 {
            Self::PartialSuccess
        } else if attempted > 0 {
            Self::Failure
        } else {
            Self::Success
        }
    }

    /// Counts toward "already ran today".
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger row describing one run attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub status: RunStatus,
    pub items_attempted: usize,
    pub items_succeeded: usize,
    pub items_failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub forced: bool,
    #[serde(default)]
    pub index_rebuilt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedItemEntry {
    pub outcome: ItemOutcome,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
