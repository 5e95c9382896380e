//! Flat, one-row-per-record projection of the snapshot, written as parquet.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow_array::{ArrayRef, BooleanArray, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use homescan_core::PropertyRecord;
use parquet::arrow::ArrowWriter;
use serde_json::Value;

use crate::{IndexError, IndexSnapshot};

/// Joins nested field names into a column name.
pub const COLUMN_JOINER: &str = ".";
/// Joins the elements of a list field into one cell.
pub const LIST_DELIMITER: &str = "; ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn text(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Text,
    }
}

const fn number(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Number,
    }
}

const fn flag(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Flag,
    }
}

/// The table's columns, in order. Fields outside this list (extractor extras)
/// only appear in the JSON snapshot.
pub const COLUMNS: &[ColumnSpec] = &[
    text("item_info.external_id"),
    text("item_info.source_url"),
    text("item_info.title"),
    text("item_info.channel"),
    text("item_info.channel_url"),
    text("item_info.upload_date"),
    number("item_info.duration_seconds"),
    number("item_info.view_count"),
    text("item_info.discovered_at"),
    text("extracted_data.property_type"),
    number("extracted_data.dimensions.length_ft"),
    number("extracted_data.dimensions.width_ft"),
    number("extracted_data.dimensions.plot_area_sq_yards"),
    number("extracted_data.dimensions.built_up_area_sq_ft"),
    number("extracted_data.price.amount"),
    number("extracted_data.price.price_per_sq_yard"),
    flag("extracted_data.price.negotiable"),
    text("extracted_data.location.area"),
    text("extracted_data.location.sub_area"),
    text("extracted_data.location.city"),
    text("extracted_data.location.state"),
    text("extracted_data.location.landmark"),
    text("extracted_data.location.full_address"),
    number("extracted_data.configuration.bedrooms"),
    number("extracted_data.configuration.bathrooms"),
    number("extracted_data.configuration.floors"),
    flag("extracted_data.configuration.hall"),
    flag("extracted_data.configuration.kitchen"),
    flag("extracted_data.configuration.car_parking"),
    flag("extracted_data.configuration.bike_parking"),
    text("extracted_data.amenities"),
    number("extracted_data.construction.year_built"),
    number("extracted_data.construction.age_years"),
    text("extracted_data.construction.facing_direction"),
    number("extracted_data.construction.road_width_ft"),
    text("extracted_data.construction.construction_type"),
    text("extracted_data.construction.floors_allowed"),
    text("extracted_data.legal.ownership_type"),
    text("extracted_data.legal.approval_status"),
    flag("extracted_data.legal.bank_loan_eligible"),
    text("extracted_data.contact.name"),
    text("extracted_data.contact.phone"),
    text("extracted_data.contact.agency"),
    text("extracted_data.contact.role"),
    text("extracted_data.additional_notes"),
    number("extracted_data.confidence_score"),
    text("transcript_summary"),
    text("processing_info.processed_at"),
    text("processing_info.ingestion_date"),
    text("processing_info.run_id"),
    text("processing_info.search_query"),
    text("processing_info.stages"),
    number("processing_info.confidence"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum TableCell {
    Null,
    Text(String),
    Number(f64),
    Flag(bool),
}

/// Flatten a record into `joined.field.path -> value`.
///
/// Nested objects contribute their leaves; list values collapse into one string
/// joined with [`LIST_DELIMITER`], with object elements rendered as compact JSON.
pub fn flatten_record(record: &PropertyRecord) -> Result<BTreeMap<String, Value>, IndexError> {
    let value = serde_json::to_value(record)?;
    let mut out = BTreeMap::new();
    flatten_into(&mut out, None, value);
    Ok(out)
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: Option<&str>, value: Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = match prefix {
                    Some(prefix) => format!("{prefix}{COLUMN_JOINER}{key}"),
                    None => key,
                };
                flatten_into(out, Some(&name), child);
            }
        }
        Value::Array(items) => {
            if let Some(prefix) = prefix {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(LIST_DELIMITER);
                out.insert(prefix.to_string(), Value::String(joined));
            }
        }
        leaf => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), leaf);
            }
        }
    }
}

fn to_cell(kind: ColumnKind, value: Option<&Value>) -> TableCell {
    match (kind, value) {
        (_, None | Some(Value::Null)) => TableCell::Null,
        (ColumnKind::Number, Some(Value::Number(n))) => {
            n.as_f64().map_or(TableCell::Null, TableCell::Number)
        }
        (ColumnKind::Flag, Some(Value::Bool(b))) => TableCell::Flag(*b),
        (ColumnKind::Text, Some(Value::String(s))) => TableCell::Text(s.clone()),
        (ColumnKind::Text, Some(other)) => TableCell::Text(other.to_string()),
        _ => TableCell::Null,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularIndex {
    rows: Vec<Vec<TableCell>>,
}

impl TabularIndex {
    pub fn from_snapshot(snapshot: &IndexSnapshot) -> Result<Self, IndexError> {
        Self::from_records(&snapshot.properties)
    }

    pub fn from_records(records: &[PropertyRecord]) -> Result<Self, IndexError> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let flat = flatten_record(record)?;
            rows.push(
                COLUMNS
                    .iter()
                    .map(|col| to_cell(col.kind, flat.get(col.name)))
                    .collect(),
            );
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&TableCell> {
        let col = COLUMNS.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.get(col)
    }

    pub fn schema() -> Schema {
        Schema::new(
            COLUMNS
                .iter()
                .map(|col| {
                    let data_type = match col.kind {
                        ColumnKind::Text => DataType::Utf8,
                        ColumnKind::Number => DataType::Float64,
                        ColumnKind::Flag => DataType::Boolean,
                    };
                    Field::new(col.name, data_type, true)
                })
                .collect::<Vec<_>>(),
        )
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch, IndexError> {
        let columns: Vec<ArrayRef> = COLUMNS
            .iter()
            .enumerate()
            .map(|(i, col)| -> ArrayRef {
                let cells = self.rows.iter().map(|row| &row[i]);
                match col.kind {
                    ColumnKind::Text => Arc::new(StringArray::from(
                        cells
                            .map(|c| match c {
                                TableCell::Text(s) => Some(s.as_str()),
                                _ => None,
                            })
                            .collect::<Vec<_>>(),
                    )),
                    ColumnKind::Number => Arc::new(Float64Array::from(
                        cells
                            .map(|c| match c {
                                TableCell::Number(n) => Some(*n),
                                _ => None,
                            })
                            .collect::<Vec<_>>(),
                    )),
                    ColumnKind::Flag => Arc::new(BooleanArray::from(
                        cells
                            .map(|c| match c {
                                TableCell::Flag(b) => Some(*b),
                                _ => None,
                            })
                            .collect::<Vec<_>>(),
                    )),
                }
            })
            .collect();
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), columns)?)
    }

    pub fn to_parquet(&self) -> Result<Vec<u8>, IndexError> {
        let batch = self.to_record_batch()?;
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebuild;
    use arrow_array::Array;
    use chrono::{NaiveDate, TimeZone, Utc};
    use homescan_core::{Candidate, Contact, ExtractedItem, Price, PropertyDetails, StageId};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::io::Write;
    use uuid::Uuid;

    fn record(id: &str, amount: Option<u64>) -> PropertyRecord {
        let candidate = Candidate {
            external_id: id.to_string(),
            url: format!("https://example.test/{id}"),
            title: "Duplex".into(),
            channel: "Realty".into(),
            channel_url: None,
            upload_date: None,
            duration_seconds: Some(180),
            view_count: None,
        };
        let mut details = PropertyDetails {
            price: Some(Price {
                amount,
                price_per_sq_yard: None,
                negotiable: Some(false),
            }),
            amenities: vec!["bore_well".into(), "sump".into(), "solar".into()],
            contact: Some(Contact {
                phone: vec!["98480 12345".into(), "040 2345 6789".into()],
                ..Default::default()
            }),
            ..Default::default()
        };
        details
            .extra
            .insert("vastu_compliant".into(), serde_json::json!(true));
        let item = ExtractedItem {
            extracted_data: details,
            transcript_summary: None,
            stages: vec![StageId::new("extraction", "qwen2.5-7b")],
        };
        PropertyRecord::assemble(
            &candidate,
            item,
            Uuid::nil(),
            "q",
            Utc.with_ymd_and_hms(2026, 1, 14, 7, 0, 0).single().unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 14).unwrap(),
        )
    }

    #[test]
    fn nested_names_are_joined_and_lists_collapsed() {
        let flat = flatten_record(&record("a1", Some(9_000_000))).unwrap();
        assert_eq!(
            flat.get("extracted_data.amenities"),
            Some(&Value::String("bore_well; sump; solar".into()))
        );
        assert_eq!(
            flat.get("extracted_data.contact.phone"),
            Some(&Value::String("98480 12345; 040 2345 6789".into()))
        );
        let stages = flat["processing_info.stages"].as_str().unwrap();
        assert!(stages.contains(r#""stage":"extraction""#));
        assert!(stages.contains(r#""id":"qwen2.5-7b""#));
        assert_eq!(
            flat.get("extracted_data.vastu_compliant"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn cells_follow_column_kinds() {
        let table = TabularIndex::from_records(&[record("a1", Some(9_000_000)), record("a2", None)])
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.cell(0, "extracted_data.price.amount"),
            Some(&TableCell::Number(9_000_000.0))
        );
        assert_eq!(table.cell(1, "extracted_data.price.amount"), Some(&TableCell::Null));
        assert_eq!(
            table.cell(0, "extracted_data.price.negotiable"),
            Some(&TableCell::Flag(false))
        );
        assert_eq!(
            table.cell(1, "item_info.external_id"),
            Some(&TableCell::Text("a2".into()))
        );
        assert_eq!(table.cell(0, "extracted_data.vastu_compliant"), None);
    }

    #[test]
    fn parquet_reads_back_with_fixed_columns() {
        let snapshot = rebuild(vec![record("b", None), record("a", Some(7_500_000))], Utc::now());
        let bytes = TabularIndex::from_snapshot(&snapshot)
            .unwrap()
            .to_parquet()
            .unwrap();
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&bytes).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);

        let batch = &batches[0];
        assert_eq!(batch.num_columns(), COLUMNS.len());
        let ids = batch
            .column_by_name("item_info.external_id")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "a");
        let prices = batch
            .column_by_name("extracted_data.price.amount")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(prices.value(0), 7_500_000.0);
        assert!(prices.is_null(1));
    }

    #[test]
    fn empty_table_still_encodes() {
        let bytes = TabularIndex::default().to_parquet().unwrap();
        assert!(bytes.starts_with(b"PAR1"));
    }
}
