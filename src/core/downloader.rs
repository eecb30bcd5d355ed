//! 兩階段 Kaggle 下載：A 階段抓精選清單，B 階段依關鍵字搜尋補充。
//!
//! 每個資料集的失敗只記錄、不中斷整體流程；進度每隔幾筆寫回 manifest，
//! 中斷後重跑會跳過已完成的項目。

use crate::adapters::cache::KaggleCache;
use crate::core::analysis::analyze_dataset;
use crate::core::links::link_dataset;
use crate::core::summary::{build_summary_report, log_summary_report, SummaryReport};
use crate::domain::manifest::{FailureLog, Manifest, ManifestStore};
use crate::domain::model::DatasetRef;
use crate::domain::ports::{DatasetSource, Storage};
use crate::utils::error::{truncate_message, HarvestError, Result};
use crate::utils::monitor::SystemMonitor;
use crate::utils::retry::{retry_with_backoff, RetryPolicy};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const CURATED_CATEGORY: &str = "high-value";

#[derive(Debug, Clone)]
pub struct DownloaderSettings {
    /// symlink 所在目錄
    pub base_dir: PathBuf,
    pub manifest_key: String,
    pub error_log_key: String,
    pub summary_key: String,
    pub retry: RetryPolicy,
    pub checkpoint_every: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub downloaded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    InManifest,
    Cached,
    Download,
}

pub struct Downloader<S: DatasetSource, St: Storage + Clone> {
    source: S,
    cache: KaggleCache,
    storage: St,
    store: ManifestStore<St>,
    failure_log: FailureLog<St>,
    manifest: Manifest,
    settings: DownloaderSettings,
    totals: RunTotals,
    session_start: DateTime<Utc>,
    monitor: SystemMonitor,
}

impl<S: DatasetSource, St: Storage + Clone> Downloader<S, St> {
    pub async fn open(source: S, storage: St, cache: KaggleCache, mut settings: DownloaderSettings) -> Result<Self> {
        settings.checkpoint_every = settings.checkpoint_every.max(1);
        let store = ManifestStore::new(storage.clone(), settings.manifest_key.clone());
        let failure_log = FailureLog::new(storage.clone(), settings.error_log_key.clone());
        let manifest = store.load().await?;
        tokio::fs::create_dir_all(&settings.base_dir).await?;

        Ok(Self {
            source,
            cache,
            storage,
            store,
            failure_log,
            manifest,
            settings,
            totals: RunTotals::default(),
            session_start: Utc::now(),
            monitor: SystemMonitor::default(),
        })
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn totals(&self) -> RunTotals {
        self.totals
    }

    pub async fn save_manifest(&mut self) -> Result<()> {
        self.store.save(&mut self.manifest).await
    }

    pub fn plan(&self, dataset: &DatasetRef) -> PlanStatus {
        if self.recorded_path(dataset).is_some() {
            PlanStatus::InManifest
        } else if self.cache.lookup(dataset).is_some() {
            PlanStatus::Cached
        } else {
            PlanStatus::Download
        }
    }

    fn recorded_path(&self, dataset: &DatasetRef) -> Option<PathBuf> {
        if !self.manifest.is_downloaded(dataset) {
            return None;
        }
        self.manifest
            .path_of(dataset)
            .map(PathBuf::from)
            .filter(|path| path.exists())
    }

    /// 取得單一資料集；失敗時記錄並回傳 `None`
    pub async fn fetch(&mut self, dataset: &DatasetRef, category: &str) -> Option<PathBuf> {
        if let Some(path) = self.recorded_path(dataset) {
            tracing::info!("  ⏭️  Skipping {} (already in manifest)", dataset);
            return Some(path);
        }

        if let Some(cached) = self.cache.lookup(dataset) {
            tracing::info!("  ♻️  Found in cache: {}", dataset);
            self.manifest
                .record_success(dataset, Some(&cached.to_string_lossy()), category);
            self.totals.downloaded += 1;
            return Some(cached);
        }

        tracing::info!("  ⬇️  Downloading {}...", dataset);
        match self.download(dataset).await {
            Ok(path) => {
                tracing::info!("  ✅ Downloaded to: {}", path.display());
                self.manifest
                    .record_success(dataset, Some(&path.to_string_lossy()), category);
                self.totals.downloaded += 1;

                match link_dataset(&self.settings.base_dir, dataset, &path) {
                    Ok(Some(link)) => tracing::info!("  🔗 Symlink created: {}", link.display()),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("  ⚠️  Could not create symlink: {}", e),
                }
                Some(path)
            }
            Err(e) => {
                tracing::error!("  ❌ Failed: {}", dataset);
                tracing::error!("     Error: {}", truncate_message(&e.to_string(), 200));
                self.record_failure(&dataset.to_string(), &e).await;
                None
            }
        }
    }

    async fn download(&self, dataset: &DatasetRef) -> Result<PathBuf> {
        let version = match self.source.latest_version(dataset).await {
            Ok(version) => version.unwrap_or(1),
            Err(e) => {
                tracing::debug!("Version lookup failed for {}: {}", dataset, e);
                1
            }
        };
        let final_dir = self.cache.version_dir(dataset, version);
        let staging = self.cache.staging_dir(dataset, version);
        let label = dataset.to_string();

        // 上次中斷留下的暫存目錄
        if tokio::fs::try_exists(&staging).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&staging).await?;
        }

        let result = retry_with_backoff(&self.settings.retry, &label, || self.source.download(dataset, &staging)).await;
        let downloaded = match result {
            Ok(path) => path,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        // 完整下載後才出現在快取裡
        if let Err(e) = tokio::fs::rename(&staging, &final_dir).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e.into());
        }

        Ok(match downloaded.strip_prefix(&staging) {
            Ok(rest) => final_dir.join(rest),
            Err(_) => downloaded,
        })
    }

    async fn record_failure(&mut self, label: &str, error: &HarvestError) {
        let record = self.manifest.record_failure(label, &error.to_string());
        if let Err(e) = self.failure_log.append(&record).await {
            tracing::warn!("⚠️  Could not write error log: {}", e);
        }
        self.totals.failed += 1;
    }

    async fn checkpoint(&mut self, index: usize) {
        if index % self.settings.checkpoint_every == 0 {
            if let Err(e) = self.save_manifest().await {
                tracing::warn!("⚠️  Could not save manifest: {}", e);
            }
        }
    }

    fn log_stats(path: &Path) {
        let stats = analyze_dataset(path);
        tracing::info!(
            "    📊 Files: {} | Records: {}",
            stats.total_files,
            stats.estimated_records
        );
    }

    /// A 階段：精選資料集
    pub async fn run_curated(&mut self, datasets: &[DatasetRef]) -> Result<()> {
        tracing::info!("{}", "=".repeat(80));
        tracing::info!("PHASE A: Known High-Value Datasets");
        tracing::info!("{}", "=".repeat(80));
        tracing::info!("📋 {} curated datasets to download", datasets.len());

        for (i, dataset) in datasets.iter().enumerate() {
            let index = i + 1;
            tracing::info!("[{}/{}] {}", index, datasets.len(), dataset);
            if let Some(path) = self.fetch(dataset, CURATED_CATEGORY).await {
                Self::log_stats(&path);
            }
            self.checkpoint(index).await;
        }

        self.monitor.log_stats("Phase A");
        self.save_manifest().await
    }

    /// 搜尋各關鍵字，取每個詞前 `max_per_term` 筆尚未下載的結果並去重
    pub async fn discover(&self, terms: &[String], max_per_term: usize) -> Vec<(DatasetRef, String)> {
        let mut discovered = Vec::new();
        let mut seen = HashSet::new();

        for term in terms {
            tracing::info!("🔍 Searching: '{}'", term);
            let results = match retry_with_backoff(&self.settings.retry, term, || self.source.search(term)).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!("  ⚠️  Search error for '{}': {}", term, e);
                    Vec::new()
                }
            };

            if results.is_empty() {
                tracing::info!("   No results");
                continue;
            }
            tracing::info!("   Found {} datasets", results.len());

            for dataset in results.into_iter().take(max_per_term) {
                if self.manifest.is_downloaded(&dataset) {
                    continue;
                }
                if seen.insert(dataset.clone()) {
                    discovered.push((dataset, term.clone()));
                }
            }
        }

        discovered
    }

    /// B 階段：搜尋發現
    pub async fn run_discovery(&mut self, terms: &[String], max_per_term: usize) -> Result<()> {
        tracing::info!("{}", "=".repeat(80));
        tracing::info!("PHASE B: Search Discovery");
        tracing::info!("{}", "=".repeat(80));
        tracing::info!("🔍 Searching {} terms for additional datasets", terms.len());

        let discovered = self.discover(terms, max_per_term).await;
        tracing::info!("📊 Discovered {} unique new datasets", discovered.len());

        if discovered.is_empty() {
            tracing::info!("✅ No new datasets to download");
            return Ok(());
        }

        tracing::info!("⬇️  Downloading discovered datasets...");
        for (i, (dataset, term)) in discovered.iter().enumerate() {
            let index = i + 1;
            tracing::info!("[{}/{}] {} (from '{}')", index, discovered.len(), dataset, term);
            if let Some(path) = self.fetch(dataset, &format!("search-{}", term)).await {
                Self::log_stats(&path);
            }
            self.checkpoint(index).await;
        }

        self.monitor.log_stats("Phase B");
        self.save_manifest().await
    }

    pub async fn generate_summary(&mut self) -> Result<SummaryReport> {
        tracing::info!("{}", "=".repeat(80));
        tracing::info!("GENERATING SUMMARY REPORT");
        tracing::info!("{}", "=".repeat(80));

        let report = build_summary_report(&self.manifest, &self.settings.base_dir, self.session_start);

        self.manifest.total_files = report.total_files;
        self.manifest.total_records_estimated = report.total_records;
        self.manifest.total_size_bytes = report.total_size_bytes;
        self.save_manifest().await?;

        let json = serde_json::to_vec_pretty(&report)?;
        self.storage.write_file(&self.settings.summary_key, &json).await?;

        log_summary_report(
            &report,
            &self.settings.manifest_key,
            &self.settings.summary_key,
            &self.settings.base_dir,
        );
        Ok(report)
    }

    pub async fn run(
        &mut self,
        curated: &[DatasetRef],
        terms: &[String],
        max_per_term: usize,
        skip_search: bool,
    ) -> Result<RunTotals> {
        tracing::info!("📁 Base directory: {}", self.settings.base_dir.display());
        tracing::info!("📋 Manifest: {}", self.store.key());
        tracing::info!("💾 Cache directory: {}", self.cache.root().display());
        tracing::info!("📦 Previously downloaded: {}", self.manifest.downloaded.len());

        self.run_curated(curated).await?;

        if !skip_search {
            self.run_discovery(terms, max_per_term).await?;
        }

        self.generate_summary().await?;
        self.monitor.log_stats("Summary");
        Ok(self.totals)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::manifest::tests::MockStorage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// 依資料集名稱決定回應；錯誤以工廠函式表示，每次呼叫產生新的錯誤
    #[derive(Default)]
    pub(crate) struct MockSource {
        pub(crate) search_results: HashMap<String, Vec<&'static str>>,
        pub(crate) failures: HashMap<String, fn() -> HarvestError>,
        pub(crate) flaky: Mutex<HashMap<String, u32>>,
        /// 寫入一半後失敗的次數
        pub(crate) partial: Mutex<HashMap<String, u32>>,
        pub(crate) downloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DatasetSource for MockSource {
        async fn search(&self, term: &str) -> Result<Vec<DatasetRef>> {
            if term == "broken search" {
                return Err(HarvestError::CommandFailed {
                    command: "kaggle datasets list".into(),
                    stderr: "boom".into(),
                });
            }
            Ok(self
                .search_results
                .get(term)
                .map(|refs| refs.iter().map(|r| r.parse().unwrap()).collect())
                .unwrap_or_default())
        }

        async fn download(&self, dataset: &DatasetRef, dest: &Path) -> Result<PathBuf> {
            let key = dataset.to_string();
            self.downloads.lock().unwrap().push(key.clone());

            if let Some(make_error) = self.failures.get(&key) {
                return Err(make_error());
            }
            {
                let mut flaky = self.flaky.lock().unwrap();
                if let Some(remaining) = flaky.get_mut(&key) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(HarvestError::RateLimited { message: "429".into() });
                    }
                }
            }
            {
                let mut partial = self.partial.lock().unwrap();
                if let Some(remaining) = partial.get_mut(&key) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        std::fs::create_dir_all(dest)?;
                        std::fs::write(dest.join("archive.zip.part"), "PK\x03\x04")?;
                        return Err(HarvestError::ApiError {
                            status: 500,
                            message: "connection reset mid-stream".into(),
                        });
                    }
                }
            }

            std::fs::create_dir_all(dest)?;
            std::fs::write(dest.join("data.csv"), "name\nA\nB\n")?;
            Ok(dest.to_path_buf())
        }
    }

    pub(crate) fn settings(dir: &Path) -> DownloaderSettings {
        DownloaderSettings {
            base_dir: dir.join("kaggle"),
            manifest_key: "kaggle-manifest.json".into(),
            error_log_key: "kaggle/errors.log".into(),
            summary_key: "kaggle-summary.json".into(),
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::ZERO,
                backoff_factor: 2,
            },
            checkpoint_every: 5,
        }
    }

    fn refs(raw: &[&str]) -> Vec<DatasetRef> {
        raw.iter().map(|r| r.parse().unwrap()).collect()
    }

    async fn downloader(source: MockSource, dir: &TempDir, storage: MockStorage) -> Downloader<MockSource, MockStorage> {
        let cache = KaggleCache::new(dir.path().join("cache"));
        Downloader::open(source, storage, cache, settings(dir.path())).await.unwrap()
    }

    #[tokio::test]
    async fn test_fetch_downloads_links_and_records() {
        let dir = TempDir::new().unwrap();
        let mut dl = downloader(MockSource::default(), &dir, MockStorage::new()).await;
        let ds: DatasetRef = "claudiodavi/superhero-set".parse().unwrap();

        let path = dl.fetch(&ds, CURATED_CATEGORY).await.unwrap();

        assert!(path.ends_with("datasets/claudiodavi/superhero-set/versions/1"));
        assert!(dl.manifest().is_downloaded(&ds));
        assert_eq!(dl.manifest().datasets_by_category[CURATED_CATEGORY], vec!["claudiodavi/superhero-set"]);
        assert!(std::fs::symlink_metadata(dir.path().join("kaggle/claudiodavi_superhero-set")).is_ok());
        assert_eq!(dl.totals(), RunTotals { downloaded: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_fetch_skips_manifest_entries_and_uses_cache() {
        let dir = TempDir::new().unwrap();
        let source = MockSource::default();
        let mut dl = downloader(source, &dir, MockStorage::new()).await;

        let cached: DatasetRef = "deepcontractor/dc-wikia-data".parse().unwrap();
        let cached_dir = KaggleCache::new(dir.path().join("cache")).version_dir(&cached, 3);
        std::fs::create_dir_all(&cached_dir).unwrap();

        assert_eq!(dl.plan(&cached), PlanStatus::Cached);
        let path = dl.fetch(&cached, "search-dc comics").await.unwrap();
        assert_eq!(path, cached_dir);
        assert_eq!(dl.plan(&cached), PlanStatus::InManifest);

        // 第二次直接從 manifest 回傳
        assert_eq!(dl.fetch(&cached, "search-dc comics").await.unwrap(), cached_dir);
        assert!(dl.source.downloads.lock().unwrap().is_empty());
        assert_eq!(dl.totals().downloaded, 1);
    }

    #[tokio::test]
    async fn test_retryable_failure_recovers() {
        let dir = TempDir::new().unwrap();
        let source = MockSource::default();
        source.flaky.lock().unwrap().insert("psycon/comic-book-sales-data".into(), 2);
        let mut dl = downloader(source, &dir, MockStorage::new()).await;

        let ds: DatasetRef = "psycon/comic-book-sales-data".parse().unwrap();
        assert!(dl.fetch(&ds, CURATED_CATEGORY).await.is_some());
        assert_eq!(dl.source.downloads.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_logged_not_fatal() {
        let dir = TempDir::new().unwrap();
        let storage = MockStorage::new();
        let mut source = MockSource::default();
        source.failures.insert("ghost/missing".into(), || HarvestError::ApiError {
            status: 404,
            message: "Not Found".into(),
        });
        let mut dl = downloader(source, &dir, storage.clone()).await;

        dl.run_curated(&refs(&["ghost/missing", "rounakbanik/pokemon"])).await.unwrap();

        assert_eq!(dl.totals(), RunTotals { downloaded: 1, failed: 1 });
        assert_eq!(dl.manifest().failed.len(), 1);
        assert_eq!(dl.manifest().failed[0].dataset, "ghost/missing");
        assert_eq!(dl.source.downloads.lock().unwrap().iter().filter(|d| *d == "ghost/missing").count(), 1);

        let log = String::from_utf8(storage.get_file("kaggle/errors.log").await.unwrap()).unwrap();
        assert!(log.contains("ghost/missing: API returned 404"));
        assert!(storage.get_file("kaggle-manifest.json").await.is_some());
    }

    #[tokio::test]
    async fn test_discovery_dedupes_and_respects_limit() {
        let dir = TempDir::new().unwrap();
        let mut source = MockSource::default();
        source
            .search_results
            .insert("marvel".into(), vec!["a/one", "a/two", "a/three"]);
        source.search_results.insert("superhero".into(), vec!["a/two", "b/four"]);
        let mut dl = downloader(source, &dir, MockStorage::new()).await;
        dl.fetch(&"a/one".parse().unwrap(), CURATED_CATEGORY).await.unwrap();

        let terms: Vec<String> = ["marvel", "broken search", "superhero", "nothing"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let found = dl.discover(&terms, 2).await;

        let names: Vec<(String, String)> = found.iter().map(|(d, t)| (d.to_string(), t.clone())).collect();
        assert_eq!(
            names,
            vec![
                ("a/two".to_string(), "marvel".to_string()),
                ("b/four".to_string(), "superhero".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_run_writes_summary() {
        let dir = TempDir::new().unwrap();
        let storage = MockStorage::new();
        let mut source = MockSource::default();
        source.search_results.insert("pokemon".into(), vec!["rounakbanik/pokemon", "x/pokedex"]);
        let mut dl = downloader(source, &dir, storage.clone()).await;

        let totals = dl
            .run(&refs(&["rounakbanik/pokemon"]), &["pokemon".to_string()], 5, false)
            .await
            .unwrap();

        assert_eq!(totals, RunTotals { downloaded: 2, failed: 0 });
        let summary: serde_json::Value =
            serde_json::from_slice(&storage.get_file("kaggle-summary.json").await.unwrap()).unwrap();
        assert_eq!(summary["total_datasets"], 2);
        assert_eq!(summary["total_records"], 4);
        assert_eq!(summary["datasets_by_category"]["search-pokemon"], 1);

        let manifest: Manifest =
            serde_json::from_slice(&storage.get_file("kaggle-manifest.json").await.unwrap()).unwrap();
        assert_eq!(manifest.total_records_estimated, 4);
        assert!(manifest.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_skip_search_only_runs_curated() {
        let dir = TempDir::new().unwrap();
        let mut source = MockSource::default();
        source.search_results.insert("pokemon".into(), vec!["x/pokedex"]);
        let mut dl = downloader(source, &dir, MockStorage::new()).await;

        dl.run(&refs(&["rounakbanik/pokemon"]), &["pokemon".to_string()], 5, true)
            .await
            .unwrap();

        assert_eq!(*dl.source.downloads.lock().unwrap(), vec!["rounakbanik/pokemon".to_string()]);
    }

    #[tokio::test]
    async fn test_interrupted_download_is_refetched() {
        let dir = TempDir::new().unwrap();
        let source = MockSource::default();
        source.partial.lock().unwrap().insert("ghost/corrupt".into(), 1);
        let mut dl = downloader(source, &dir, MockStorage::new()).await;
        let ds: DatasetRef = "ghost/corrupt".parse().unwrap();
        let cache = KaggleCache::new(dir.path().join("cache"));

        assert!(dl.fetch(&ds, CURATED_CATEGORY).await.is_none());
        assert_eq!(dl.plan(&ds), PlanStatus::Download);
        assert!(!cache.staging_dir(&ds, 1).exists());
        assert!(!cache.version_dir(&ds, 1).exists());

        let path = dl.fetch(&ds, CURATED_CATEGORY).await.unwrap();
        assert_eq!(path, cache.version_dir(&ds, 1));
        assert!(path.join("data.csv").exists());
        assert!(!path.join("archive.zip.part").exists());
        assert_eq!(dl.source.downloads.lock().unwrap().len(), 2);
        assert_eq!(dl.totals(), RunTotals { downloaded: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_leftover_staging_dir_is_replaced() {
        let dir = TempDir::new().unwrap();
        let mut dl = downloader(MockSource::default(), &dir, MockStorage::new()).await;
        let ds: DatasetRef = "claudiodavi/superhero-set".parse().unwrap();
        let cache = KaggleCache::new(dir.path().join("cache"));

        let staging = cache.staging_dir(&ds, 1);
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("stale.csv"), "old").unwrap();
        assert_eq!(dl.plan(&ds), PlanStatus::Download);

        let path = dl.fetch(&ds, CURATED_CATEGORY).await.unwrap();
        assert!(path.join("data.csv").exists());
        assert!(!path.join("stale.csv").exists());
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_manifest_checkpoints_every_n_items() {
        let dir = TempDir::new().unwrap();
        let storage = MockStorage::new();
        let cache = KaggleCache::new(dir.path().join("cache"));
        let mut settings = settings(dir.path());
        settings.checkpoint_every = 2;
        let mut dl = Downloader::open(MockSource::default(), storage.clone(), cache, settings)
            .await
            .unwrap();

        dl.run_curated(&refs(&["a/one", "a/two", "a/three", "a/four", "a/five"]))
            .await
            .unwrap();

        // 第 2、4 筆各一次，加上階段結束一次
        assert_eq!(storage.write_count("kaggle-manifest.json").await, 3);
    }

    #[tokio::test]
    async fn test_zero_checkpoint_interval_saves_every_item() {
        let dir = TempDir::new().unwrap();
        let storage = MockStorage::new();
        let cache = KaggleCache::new(dir.path().join("cache"));
        let mut settings = settings(dir.path());
        settings.checkpoint_every = 0;
        let mut dl = Downloader::open(MockSource::default(), storage.clone(), cache, settings)
            .await
            .unwrap();

        dl.run_curated(&refs(&["a/one", "a/two"])).await.unwrap();

        assert_eq!(dl.totals().downloaded, 2);
        assert_eq!(storage.write_count("kaggle-manifest.json").await, 3);
    }
}
