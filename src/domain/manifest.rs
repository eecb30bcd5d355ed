//! 下載進度 manifest 與錯誤日誌。
//!
//! manifest 是唯一的持久狀態：重新執行時以它判斷哪些資料集已完成，
//! 所以每個欄位都帶 serde default，舊版（無 `dataset_paths`、`version`）也能載入。

use crate::domain::model::{timestamp, DatasetRef, FailureRecord};
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const MANIFEST_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub downloaded: BTreeSet<String>,
    pub dataset_paths: BTreeMap<String, String>,
    pub failed: Vec<FailureRecord>,
    pub datasets_by_category: BTreeMap<String, Vec<String>>,
    pub total_files: u64,
    pub total_records_estimated: u64,
    pub total_size_bytes: u64,
    #[serde(deserialize_with = "timestamp::deserialize_option")]
    pub last_updated: Option<DateTime<Utc>>,
    pub version: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            downloaded: BTreeSet::new(),
            dataset_paths: BTreeMap::new(),
            failed: Vec::new(),
            datasets_by_category: BTreeMap::new(),
            total_files: 0,
            total_records_estimated: 0,
            total_size_bytes: 0,
            last_updated: None,
            version: MANIFEST_VERSION.to_string(),
        }
    }
}

impl Manifest {
    pub fn is_downloaded(&self, dataset: &DatasetRef) -> bool {
        self.downloaded.contains(&dataset.to_string())
    }

    pub fn path_of(&self, dataset: &DatasetRef) -> Option<&str> {
        self.dataset_paths.get(&dataset.to_string()).map(String::as_str)
    }

    /// 標記完成；`path` 為 `None` 時（CLI 批次下載）只記錄狀態
    pub fn record_success(&mut self, dataset: &DatasetRef, path: Option<&str>, category: &str) {
        let key = dataset.to_string();
        self.downloaded.insert(key.clone());
        if let Some(path) = path {
            self.dataset_paths.insert(key.clone(), path.to_string());
        }
        self.add_to_category(category, &key);
    }

    pub fn record_failure(&mut self, dataset: &str, error: &str) -> FailureRecord {
        let record = FailureRecord::new(dataset, error);
        self.failed.push(record.clone());
        record
    }

    pub fn add_to_category(&mut self, category: &str, dataset: &str) {
        let entries = self.datasets_by_category.entry(category.to_string()).or_default();
        if !entries.iter().any(|d| d == dataset) {
            entries.push(dataset.to_string());
        }
    }

    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        self.datasets_by_category
            .iter()
            .map(|(category, datasets)| (category.clone(), datasets.len()))
            .collect()
    }

    pub fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }
}

/// 透過 [`Storage`] 讀寫 manifest
pub struct ManifestStore<S: Storage> {
    storage: S,
    key: String,
}

impl<S: Storage> ManifestStore<S> {
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn load(&self) -> Result<Manifest> {
        self.load_as().await
    }

    pub async fn save(&self, manifest: &mut Manifest) -> Result<()> {
        manifest.touch();
        self.save_as(manifest).await
    }

    /// 其他 manifest 型別（例如 Metron）共用同一套讀寫
    pub async fn load_as<T>(&self) -> Result<T>
    where
        T: Default + for<'de> Deserialize<'de>,
    {
        if !self.storage.exists(&self.key).await {
            tracing::debug!("No manifest at {}, starting fresh", self.key);
            return Ok(T::default());
        }
        let data = self.storage.read_file(&self.key).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub async fn save_as<T: Serialize + Sync>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.storage.write_file(&self.key, &json).await
    }
}

/// 純文字錯誤日誌：`[timestamp] dataset: error`
pub struct FailureLog<S: Storage> {
    storage: S,
    key: String,
}

impl<S: Storage> FailureLog<S> {
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub async fn append(&self, record: &FailureRecord) -> Result<()> {
        let line = format!(
            "[{}] {}: {}\n",
            record.timestamp.to_rfc3339(),
            record.dataset,
            record.error
        );
        self.storage.append_file(&self.key, line.as_bytes()).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::error::HarvestError;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    pub(crate) struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        writes: Arc<Mutex<HashMap<String, usize>>>,
    }

    impl MockStorage {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }

        /// `write_file` 對同一路徑的呼叫次數
        pub(crate) async fn write_count(&self, path: &str) -> usize {
            self.writes.lock().await.get(path).copied().unwrap_or(0)
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                HarvestError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            *self.writes.lock().await.entry(path.to_string()).or_default() += 1;
            Ok(())
        }

        async fn append_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.entry(path.to_string()).or_default().extend_from_slice(data);
            Ok(())
        }

        async fn exists(&self, path: &str) -> bool {
            self.files.lock().await.contains_key(path)
        }
    }

    fn dataset(s: &str) -> DatasetRef {
        s.parse().unwrap()
    }

    #[test]
    fn test_record_success_keeps_category_unique() {
        let mut manifest = Manifest::default();
        let ds = dataset("deepcontractor/marvel-wikia-data");

        manifest.record_success(&ds, Some("/cache/marvel"), "high-value");
        manifest.record_success(&ds, Some("/cache/marvel"), "high-value");

        assert!(manifest.is_downloaded(&ds));
        assert_eq!(manifest.path_of(&ds), Some("/cache/marvel"));
        assert_eq!(manifest.datasets_by_category["high-value"].len(), 1);
        assert_eq!(manifest.category_counts()["high-value"], 1);
    }

    #[test]
    fn test_loads_legacy_manifest_without_paths() {
        let legacy = r#"{
            "downloaded": ["psycon/comic-book-sales-data"],
            "failed": [],
            "datasets_by_category": {"core_publishers": ["psycon/comic-book-sales-data"]},
            "total_size_bytes": 1024,
            "last_updated": null
        }"#;

        let manifest: Manifest = serde_json::from_str(legacy).unwrap();
        assert!(manifest.is_downloaded(&dataset("psycon/comic-book-sales-data")));
        assert!(manifest.dataset_paths.is_empty());
        assert_eq!(manifest.total_size_bytes, 1024);
        assert_eq!(manifest.version, MANIFEST_VERSION);
    }

    #[test]
    fn test_loads_manifest_with_naive_timestamps() {
        let written_by_older_run = r#"{
  "downloaded": ["claudiodavi/superhero-set", "ghost/missing"],
  "dataset_paths": {"claudiodavi/superhero-set": "/home/me/.cache/kagglehub/datasets/claudiodavi/superhero-set/versions/1"},
  "failed": [
    {"dataset": "ghost/missing", "error": "404 Client Error", "timestamp": "2025-10-14T09:12:33.123456"}
  ],
  "datasets_by_category": {"high-value": ["claudiodavi/superhero-set"]},
  "total_files": 2,
  "total_records_estimated": 734,
  "total_size_bytes": 52031,
  "last_updated": "2025-10-14T09:15:02.987654",
  "version": "2.0"
}"#;

        let manifest: Manifest = serde_json::from_str(written_by_older_run).unwrap();
        assert_eq!(manifest.failed[0].dataset, "ghost/missing");
        assert_eq!(
            manifest.last_updated.map(|t| t.to_rfc3339()),
            Some("2025-10-14T09:15:02.987654+00:00".to_string())
        );
        assert_eq!(manifest.total_records_estimated, 734);

        // 重新寫出後帶時區
        let rewritten = serde_json::to_string(&manifest).unwrap();
        assert!(rewritten.contains("2025-10-14T09:12:33.123456Z"));
    }

    #[tokio::test]
    async fn test_store_round_trip_stamps_last_updated() {
        let storage = MockStorage::new();
        let store = ManifestStore::new(storage.clone(), "data/kaggle-manifest.json");

        let mut manifest = store.load().await.unwrap();
        assert_eq!(manifest, Manifest::default());

        manifest.record_success(&dataset("rounakbanik/pokemon"), Some("/p"), "high-value");
        manifest.record_failure("bad/dataset", "403 Forbidden");
        store.save(&mut manifest).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert!(reloaded.last_updated.is_some());
        assert_eq!(reloaded.failed.len(), 1);
        assert_eq!(reloaded, manifest);

        let raw = storage.get_file("data/kaggle-manifest.json").await.unwrap();
        assert!(String::from_utf8(raw).unwrap().contains("\n  \"downloaded\""));
    }

    #[tokio::test]
    async fn test_failure_log_appends_lines() {
        let storage = MockStorage::new();
        let log = FailureLog::new(storage.clone(), "errors.log");

        log.append(&FailureRecord::new("a/b", "first")).await.unwrap();
        log.append(&FailureRecord::new("c/d", "second")).await.unwrap();

        let text = String::from_utf8(storage.get_file("errors.log").await.unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("a/b: first"));
        assert!(lines[1].ends_with("c/d: second"));
    }
}
