//! Index builder: derives the aggregate snapshot and the flat table from the full
//! record set. Every rebuild recomputes everything from the stored records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use homescan_core::PropertyRecord;
use homescan_storage::{write_atomic, RecordStore, StorageError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::info;

mod tabular;

pub use tabular::{
    flatten_record, ColumnKind, ColumnSpec, TableCell, TabularIndex, COLUMNS, COLUMN_JOINER,
    LIST_DELIMITER,
};

pub const CRATE_NAME: &str = "homescan-index";

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serializing index: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("building index table: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
    #[error("encoding index table: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub last_built: DateTime<Utc>,
    pub total_properties: usize,
    pub schema_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub count: usize,
    pub missing: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total: usize,
    pub numeric: BTreeMap<String, NumericSummary>,
    pub categorical: BTreeMap<String, BTreeMap<String, usize>>,
}

impl IndexStatistics {
    pub fn numeric(&self, field: &str) -> Option<&NumericSummary> {
        self.numeric.get(field)
    }

    pub fn frequency(&self, field: &str, value: &str) -> usize {
        self.categorical
            .get(field)
            .and_then(|table| table.get(value))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub metadata: IndexMetadata,
    pub properties: Vec<PropertyRecord>,
    pub statistics: IndexStatistics,
}

/// Numeric fields summarized in the statistics, in output order.
pub const NUMERIC_FIELDS: [&str; 10] = [
    "price",
    "price_per_sq_yard",
    "plot_area_sq_yards",
    "built_up_area_sq_ft",
    "bedrooms",
    "bathrooms",
    "floors",
    "road_width_ft",
    "age_years",
    "confidence_score",
];

fn numeric_values(record: &PropertyRecord) -> [Option<f64>; 10] {
    let data = &record.extracted_data;
    let price = data.price.as_ref();
    let dims = data.dimensions.as_ref();
    let config = data.configuration.as_ref();
    let build = data.construction.as_ref();
    [
        price.and_then(|p| p.amount).map(|v| v as f64),
        price.and_then(|p| p.price_per_sq_yard).map(|v| v as f64),
        dims.and_then(|d| d.plot_area_sq_yards),
        dims.and_then(|d| d.built_up_area_sq_ft),
        config.and_then(|c| c.bedrooms).map(f64::from),
        config.and_then(|c| c.bathrooms).map(f64::from),
        config.and_then(|c| c.floors).map(f64::from),
        build.and_then(|c| c.road_width_ft),
        build.and_then(|c| c.age_years).map(f64::from),
        data.confidence_score,
    ]
}

fn categorical_values(record: &PropertyRecord) -> Vec<(&'static str, String)> {
    let data = &record.extracted_data;
    let location = data.location.as_ref();
    let mut values = Vec::new();
    let mut push = |field: &'static str, value: Option<&str>| {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            values.push((field, value.to_string()));
        }
    };
    push("property_type", data.property_type.map(|t| t.as_str()));
    push("area", location.and_then(|l| l.area.as_deref()));
    push("city", location.and_then(|l| l.city.as_deref()));
    push(
        "facing_direction",
        data.construction
            .as_ref()
            .and_then(|c| c.facing_direction.as_deref()),
    );
    push(
        "approval_status",
        data.legal.as_ref().and_then(|l| l.approval_status.as_deref()),
    );
    push("channel", Some(record.item_info.channel.as_str()));
    for amenity in &data.amenities {
        push("amenities", Some(amenity.as_str()));
    }
    let date = record.processing_info.ingestion_date.to_string();
    push("ingestion_date", Some(date.as_str()));
    values
}

#[derive(Default)]
struct NumericAccumulator {
    count: usize,
    missing: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl NumericAccumulator {
    fn push(&mut self, value: Option<f64>) {
        match value.filter(|v| v.is_finite()) {
            Some(v) => {
                self.count += 1;
                self.sum += v;
                self.min = Some(self.min.map_or(v, |m| m.min(v)));
                self.max = Some(self.max.map_or(v, |m| m.max(v)));
            }
            None => self.missing += 1,
        }
    }

    fn finish(self) -> NumericSummary {
        NumericSummary {
            count: self.count,
            missing: self.missing,
            min: self.min,
            max: self.max,
            avg: (self.count > 0).then(|| self.sum / self.count as f64),
        }
    }
}

/// Compute the snapshot for `records` as of `built_at`.
///
/// Records are ordered by (ingestion date, external id) first, so the result only
/// depends on the set of records and the clock reading. Missing numeric values are
/// left out of min/max/avg and counted under `missing`.
pub fn rebuild(mut records: Vec<PropertyRecord>, built_at: DateTime<Utc>) -> IndexSnapshot {
    records.sort_by(|a, b| {
        (a.processing_info.ingestion_date, &a.item_info.external_id)
            .cmp(&(b.processing_info.ingestion_date, &b.item_info.external_id))
    });

    let mut numeric: Vec<NumericAccumulator> =
        NUMERIC_FIELDS.iter().map(|_| NumericAccumulator::default()).collect();
    let mut categorical: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

    for record in &records {
        for (acc, value) in numeric.iter_mut().zip(numeric_values(record)) {
            acc.push(value);
        }
        for (field, value) in categorical_values(record) {
            *categorical
                .entry(field.to_string())
                .or_default()
                .entry(value)
                .or_default() += 1;
        }
    }

    let statistics = IndexStatistics {
        total: records.len(),
        numeric: NUMERIC_FIELDS
            .iter()
            .zip(numeric)
            .map(|(name, acc)| (name.to_string(), acc.finish()))
            .collect(),
        categorical,
    };

    IndexSnapshot {
        metadata: IndexMetadata {
            last_built: built_at,
            total_properties: records.len(),
            schema_version: SCHEMA_VERSION,
        },
        properties: records,
        statistics,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexFileDigest {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub last_built: DateTime<Utc>,
    pub total_properties: usize,
    pub files: Vec<IndexFileDigest>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn digest(name: &str, path: &Path, bytes: &[u8]) -> IndexFileDigest {
    IndexFileDigest {
        name: name.to_string(),
        path: path.display().to_string(),
        sha256: sha256_hex(bytes),
        bytes: bytes.len() as u64,
    }
}

/// Write both index files for `snapshot`, each replaced atomically.
pub async fn write_index(
    snapshot: &IndexSnapshot,
    json_path: &Path,
    table_path: &Path,
) -> Result<IndexReport, IndexError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let table = TabularIndex::from_snapshot(snapshot)?.to_parquet()?;

    write_atomic(json_path, &json).await?;
    write_atomic(table_path, &table).await?;

    Ok(IndexReport {
        last_built: snapshot.metadata.last_built,
        total_properties: snapshot.metadata.total_properties,
        files: vec![
            digest("index_json", json_path, &json),
            digest("index_table", table_path, &table),
        ],
    })
}

/// Full rebuild: read every stored record, recompute, rewrite both files.
pub async fn rebuild_from_store(
    store: &RecordStore,
    json_path: &Path,
    table_path: &Path,
    built_at: DateTime<Utc>,
) -> Result<IndexReport, IndexError> {
    let records = store.load_all().await?;
    let snapshot = rebuild(records, built_at);
    let report = write_index(&snapshot, json_path, table_path).await?;
    info!(
        total_properties = report.total_properties,
        json = %json_path.display(),
        table = %table_path.display(),
        "index rebuilt"
    );
    Ok(report)
}

#[derive(Deserialize)]
struct IndexHeader {
    metadata: IndexMetadata,
}

/// Metadata of the index currently on disk, if one was ever written.
pub async fn read_index_metadata(json_path: &Path) -> Result<Option<IndexMetadata>, IndexError> {
    let bytes = match fs::read(json_path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(IndexError::Read {
                path: json_path.to_path_buf(),
                source,
            })
        }
    };
    let header: IndexHeader = serde_json::from_slice(&bytes)?;
    Ok(Some(header.metadata))
}
