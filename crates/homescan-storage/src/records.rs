//! One JSON file per stored record, named by its [`RecordKey`].

use std::path::{Path, PathBuf};

use homescan_core::{PropertyRecord, RecordKey};
use tokio::fs;
use tracing::{debug, warn};

use crate::atomic::{is_temp_file_name, write_atomic};
use crate::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// An identical record was already on disk under the same key.
    AlreadyStored,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &RecordKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    pub async fn exists(&self, key: &RecordKey) -> Result<bool, StorageError> {
        let path = self.path_for(key);
        fs::try_exists(&path)
            .await
            .map_err(StorageError::io("checking record path", &path))
    }

    /// Persist `record` under its key via temp file + rename.
    ///
    /// Saving the same record twice is harmless; saving a different record under a
    /// key that is already taken fails with [`StorageError::KeyConflict`] and leaves
    /// the stored file as it was.
    pub async fn save(&self, record: &PropertyRecord) -> Result<SaveOutcome, StorageError> {
        let key = record.key()?;
        let path = self.path_for(&key);

        if self.exists(&key).await? {
            let existing = self.load(&key).await?;
            if &existing == record {
                debug!(%key, "record already stored");
                return Ok(SaveOutcome::AlreadyStored);
            }
            return Err(StorageError::KeyConflict {
                key: key.to_string(),
            });
        }

        let bytes = serde_json::to_vec_pretty(record).map_err(|source| StorageError::Serialize {
            what: "property record",
            source,
        })?;
        write_atomic(&path, &bytes).await?;
        debug!(%key, path = %path.display(), bytes = bytes.len(), "record stored");
        Ok(SaveOutcome::Written)
    }

    pub async fn load(&self, key: &RecordKey) -> Result<PropertyRecord, StorageError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => return Err(StorageError::io("reading record", &path)(err)),
        };
        serde_json::from_slice(&bytes).map_err(|err| StorageError::CorruptRecord {
            path,
            reason: err.to_string(),
        })
    }

    pub async fn delete(&self, key: &RecordKey) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(%key, "record deleted");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(StorageError::io("deleting record", &path)(err)),
        }
    }

    /// Lazily walk the keys currently on disk, in directory order.
    ///
    /// Each call starts a fresh walk. A missing root yields nothing.
    pub async fn list(&self) -> Result<RecordKeys, StorageError> {
        match fs::read_dir(&self.root).await {
            Ok(dir) => Ok(RecordKeys {
                dir: Some(dir),
                root: self.root.clone(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(RecordKeys {
                dir: None,
                root: self.root.clone(),
            }),
            Err(err) => Err(StorageError::io("listing records in", &self.root)(err)),
        }
    }

    /// Every key, ordered by ingestion date then external id.
    pub async fn keys(&self) -> Result<Vec<RecordKey>, StorageError> {
        let mut walk = self.list().await?;
        let mut keys = Vec::new();
        while let Some(key) = walk.next_key().await? {
            keys.push(key);
        }
        keys.sort();
        Ok(keys)
    }

    /// Every record in key order. An unparsable file aborts the load.
    pub async fn load_all(&self) -> Result<Vec<PropertyRecord>, StorageError> {
        let mut records = Vec::new();
        for key in self.keys().await? {
            records.push(self.load(&key).await?);
        }
        Ok(records)
    }
}

/// Restartable lazy sequence of stored keys; obtain a new one from [`RecordStore::list`].
#[derive(Debug)]
pub struct RecordKeys {
    dir: Option<fs::ReadDir>,
    root: PathBuf,
}

impl RecordKeys {
    pub async fn next_key(&mut self) -> Result<Option<RecordKey>, StorageError> {
        let Some(dir) = self.dir.as_mut() else {
            return Ok(None);
        };
        loop {
            let entry = dir
                .next_entry()
                .await
                .map_err(StorageError::io("listing records in", &self.root))?;
            let Some(entry) = entry else {
                self.dir = None;
                return Ok(None);
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_temp_file_name(&name) || name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            match RecordKey::from_file_name(&name) {
                Ok(key) => return Ok(Some(key)),
                Err(err) => warn!(file = %name, error = %err, "ignoring stray file in record store"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use homescan_core::{
        Candidate, ExtractedItem, Location, Price, PropertyDetails, PropertyType, StageId,
    };
    use tempfile::tempdir;
    use uuid::Uuid;

    fn record(id: &str, day: u32, amount: Option<u64>) -> PropertyRecord {
        let candidate = Candidate {
            external_id: id.to_string(),
            url: format!("https://example.test/watch?v={id}"),
            title: format!("House {id}"),
            channel: "Realty".into(),
            channel_url: None,
            upload_date: Some("2026-01-10".into()),
            duration_seconds: Some(420),
            view_count: Some(1200),
        };
        let mut details = PropertyDetails {
            property_type: Some(PropertyType::IndependentHouse),
            price: Some(Price {
                amount,
                price_per_sq_yard: None,
                negotiable: Some(true),
            }),
            location: Some(Location {
                area: Some("LB Nagar".into()),
                city: Some("Hyderabad".into()),
                ..Default::default()
            }),
            amenities: vec!["bore_well".into(), "sump".into()],
            confidence_score: Some(0.83),
            ..Default::default()
        };
        details
            .extra
            .insert("vastu_compliant".into(), serde_json::json!(true));
        let item = ExtractedItem {
            extracted_data: details,
            transcript_summary: Some("east facing house".into()),
            stages: vec![
                StageId::new("transcription", "whisper-medium"),
                StageId::new("extraction", "qwen2.5-7b"),
            ],
        };
        let at = Utc.with_ymd_and_hms(2026, 1, day, 8, 15, 30).single().unwrap();
        PropertyRecord::assemble(
            &candidate,
            item,
            Uuid::new_v4(),
            "independent house for sale LB Nagar",
            at,
            NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
        )
    }

    #[tokio::test]
    async fn saved_record_loads_back_equal() {
        let dir = tempdir().expect("tempdir");
        let store = RecordStore::new(dir.path().join("properties"));
        let original = record("abc_123", 14, Some(12_500_000));

        assert_eq!(store.save(&original).await.unwrap(), SaveOutcome::Written);
        let key = original.key().unwrap();
        assert_eq!(store.load(&key).await.unwrap(), original);
        assert!(store.path_for(&key).ends_with("2026-01-14_abc_123.json"));
    }

    #[tokio::test]
    async fn same_key_never_takes_different_content() {
        let dir = tempdir().expect("tempdir");
        let store = RecordStore::new(dir.path());
        let first = record("vid", 14, Some(1));
        store.save(&first).await.unwrap();

        assert_eq!(store.save(&first).await.unwrap(), SaveOutcome::AlreadyStored);
        let mut other = first.clone();
        other.extracted_data.price = None;
        assert!(matches!(
            store.save(&other).await.unwrap_err(),
            StorageError::KeyConflict { .. }
        ));
        assert_eq!(store.load(&first.key().unwrap()).await.unwrap(), first);
    }

    #[tokio::test]
    async fn list_skips_temp_and_stray_files_and_restarts() {
        let dir = tempdir().expect("tempdir");
        let store = RecordStore::new(dir.path());
        store.save(&record("b", 15, None)).await.unwrap();
        store.save(&record("a", 15, None)).await.unwrap();
        store.save(&record("z", 14, None)).await.unwrap();
        std::fs::write(dir.path().join(".1234.10.tmp"), b"partial").unwrap();
        std::fs::write(dir.path().join("README.txt"), b"notes").unwrap();
        std::fs::write(dir.path().join("index.json"), b"{}").unwrap();

        let ids: Vec<String> = store
            .keys()
            .await
            .unwrap()
            .into_iter()
            .map(|k| format!("{k}"))
            .collect();
        assert_eq!(ids, vec!["2026-01-14/z", "2026-01-15/a", "2026-01-15/b"]);

        let mut walk = store.list().await.unwrap();
        let mut count = 0;
        while walk.next_key().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert!(walk.next_key().await.unwrap().is_none());
        assert_eq!(store.keys().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_records_report_not_found() {
        let dir = tempdir().expect("tempdir");
        let store = RecordStore::new(dir.path().join("never-created"));
        let key = RecordKey::new(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), "gone").unwrap();
        assert!(store.load(&key).await.unwrap_err().is_not_found());
        assert!(store.delete(&key).await.unwrap_err().is_not_found());
        assert!(store.keys().await.unwrap().is_empty());

        let stored = record("gone", 1, None);
        let store = RecordStore::new(dir.path());
        store.save(&stored).await.unwrap();
        store.delete(&stored.key().unwrap()).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_record_is_reported_with_its_path() {
        let dir = tempdir().expect("tempdir");
        let store = RecordStore::new(dir.path());
        std::fs::write(dir.path().join("2026-01-02_bad.json"), b"{\"item_info\":").unwrap();
        let err = store.load_all().await.unwrap_err();
        assert!(matches!(err, StorageError::CorruptRecord { .. }));
    }
}
