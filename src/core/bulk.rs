//! 依類別關鍵字的大量下載（kaggle-bulk）。
//!
//! 與 [`crate::core::downloader`] 不同：不使用快取，直接下載到
//! `base/<term>/<slug>`，最後掃描整個目錄產生 [`CorpusSummary`]。

use crate::config::toml_config::CategoryTerms;
use crate::core::analysis::directory_size;
use crate::core::summary::{build_corpus_summary, log_corpus_summary, CorpusSummary};
use crate::domain::manifest::{FailureLog, Manifest, ManifestStore};
use crate::domain::model::DatasetRef;
use crate::domain::ports::{DatasetSource, Storage};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use crate::utils::retry::{retry_with_backoff, RetryPolicy};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Clone)]
pub struct BulkSettings {
    pub base_dir: PathBuf,
    pub manifest_key: String,
    pub error_log_key: String,
    pub summary_key: String,
    pub retry: RetryPolicy,
    pub download_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub dataset: DatasetRef,
    pub category: String,
    pub term: String,
}

/// 關鍵字轉成目錄名稱
pub fn safe_term(term: &str) -> String {
    term.replace([' ', '/'], "_")
}

pub struct BulkHarvester<S: DatasetSource, St: Storage + Clone> {
    source: S,
    storage: St,
    store: ManifestStore<St>,
    failure_log: FailureLog<St>,
    manifest: Manifest,
    settings: BulkSettings,
    session_start: DateTime<Utc>,
    monitor: SystemMonitor,
}

impl<S: DatasetSource, St: Storage + Clone> BulkHarvester<S, St> {
    pub async fn open(source: S, storage: St, settings: BulkSettings) -> Result<Self> {
        let store = ManifestStore::new(storage.clone(), settings.manifest_key.clone());
        let failure_log = FailureLog::new(storage.clone(), settings.error_log_key.clone());
        let manifest = store.load().await?;
        tokio::fs::create_dir_all(&settings.base_dir).await?;

        Ok(Self {
            source,
            storage,
            store,
            failure_log,
            manifest,
            settings,
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

    pub async fn save_manifest(&mut self) -> Result<()> {
        self.store.save(&mut self.manifest).await
    }

    async fn log_failure(&mut self, label: &str, error: &str) {
        let record = self.manifest.record_failure(label, error);
        if let Err(e) = self.failure_log.append(&record).await {
            tracing::warn!("⚠️  Could not write error log: {}", e);
        }
    }

    /// 第一階段：搜尋所有類別的所有關鍵字
    pub async fn search_all(&mut self, categories: &[CategoryTerms]) -> Vec<Candidate> {
        tracing::info!("{}", "=".repeat(80));
        tracing::info!("PHASE 1: Searching for datasets");
        tracing::info!("{}", "=".repeat(80));

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();

        for category in categories {
            tracing::info!("📂 Category: {}", category.name.to_uppercase());
            for term in &category.terms {
                tracing::info!("  🔍 Searching: '{}'", term);
                let results = retry_with_backoff(&self.settings.retry, term, || self.source.search(term)).await;

                match results {
                    Ok(results) => {
                        tracing::info!("     Found {} datasets", results.len());
                        for dataset in results {
                            let key = (dataset.clone(), category.name.clone(), term.clone());
                            if seen.insert(key) {
                                candidates.push(Candidate {
                                    dataset,
                                    category: category.name.clone(),
                                    term: term.clone(),
                                });
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("     ⚠️  Search failed: {}", e);
                        self.log_failure(term, &e.to_string()).await;
                    }
                }
            }
        }

        candidates
    }

    /// 第二階段：下載尚未完成的候選項目，回傳 (成功, 失敗)
    pub async fn download_all(&mut self, candidates: &[Candidate]) -> (usize, usize) {
        let pending: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| !self.manifest.is_downloaded(&c.dataset))
            .collect();

        tracing::info!("{}", "=".repeat(80));
        tracing::info!("PHASE 2: Downloading {} datasets", pending.len());
        tracing::info!("{}", "=".repeat(80));

        let (mut downloaded, mut failed) = (0, 0);
        let total = pending.len();

        for (i, candidate) in pending.into_iter().enumerate() {
            let index = i + 1;
            // 同一批次中可能重複出現（不同類別）
            if self.manifest.is_downloaded(&candidate.dataset) {
                continue;
            }

            let dest = self
                .settings
                .base_dir
                .join(safe_term(&candidate.term))
                .join(candidate.dataset.slug());
            tracing::info!("[{}/{}] {} → {}", index, total, candidate.dataset, dest.display());

            let label = candidate.dataset.to_string();
            let result =
                retry_with_backoff(&self.settings.retry, &label, || self.source.download(&candidate.dataset, &dest))
                    .await;

            match result {
                Ok(path) => {
                    self.manifest.record_success(&candidate.dataset, None, &candidate.category);
                    self.manifest.total_size_bytes += directory_size(&path);
                    downloaded += 1;
                    tracing::info!("  ✅ Downloaded");

                    if index < total && !self.settings.download_delay.is_zero() {
                        tokio::time::sleep(self.settings.download_delay).await;
                    }
                }
                Err(e) => {
                    tracing::error!("  ❌ Failed: {}", e);
                    self.log_failure(&label, &e.to_string()).await;
                    failed += 1;
                }
            }

            if index % PROGRESS_EVERY == 0 {
                tracing::info!(
                    "📊 Progress: {}/{} ({} downloaded, {} failed)",
                    index,
                    total,
                    downloaded,
                    failed
                );
                if let Err(e) = self.save_manifest().await {
                    tracing::warn!("⚠️  Could not save manifest: {}", e);
                }
            }
        }

        (downloaded, failed)
    }

    /// 第三階段：統計整個目錄
    pub async fn generate_summary(&mut self) -> Result<CorpusSummary> {
        tracing::info!("{}", "=".repeat(80));
        tracing::info!("PHASE 3: Generating summary");
        tracing::info!("{}", "=".repeat(80));

        let skip: Vec<&str> = [&self.settings.manifest_key, &self.settings.summary_key]
            .into_iter()
            .filter_map(|key| Path::new(key.as_str()).file_name().and_then(|n| n.to_str()))
            .collect();

        let summary = build_corpus_summary(&self.manifest, &self.settings.base_dir, &skip, self.session_start);
        self.manifest.total_records_estimated = summary.total_records;
        self.manifest.total_files = summary.ready_files.len() as u64;
        self.save_manifest().await?;

        let json = serde_json::to_vec_pretty(&summary)?;
        self.storage.write_file(&self.settings.summary_key, &json).await?;
        log_corpus_summary(&summary, &self.settings.summary_key);
        Ok(summary)
    }

    pub async fn run(&mut self, categories: &[CategoryTerms]) -> Result<CorpusSummary> {
        tracing::info!("📁 Base directory: {}", self.settings.base_dir.display());
        tracing::info!("📦 Previously downloaded: {}", self.manifest.downloaded.len());

        let candidates = self.search_all(categories).await;
        let unique: HashSet<&DatasetRef> = candidates.iter().map(|c| &c.dataset).collect();
        tracing::info!(
            "📊 Found {} candidates ({} unique datasets)",
            candidates.len(),
            unique.len()
        );
        self.monitor.log_stats("Phase 1");

        if unique.iter().all(|d| self.manifest.is_downloaded(d)) {
            tracing::info!("✅ All datasets already downloaded");
        } else {
            let (downloaded, failed) = self.download_all(&candidates).await;
            tracing::info!("✅ Downloaded: {} | ❌ Failed: {}", downloaded, failed);
            self.save_manifest().await?;
            self.monitor.log_stats("Phase 2");
        }

        self.generate_summary().await
    }
}
