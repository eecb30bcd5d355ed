//! Metron 逐頁抓取。
//!
//! 每一頁處理完就把結果合併寫入 `<output_dir>/<resource>.json` 並存 manifest，
//! 單一項目失敗只記錄；整頁失敗則停止該資源，下次從 `last_page` 之後繼續。

use crate::adapters::metron::{MetronCharacter, MetronClient};
use crate::core::entity::EntityRecord;
use crate::domain::manifest::{FailureLog, ManifestStore};
use crate::domain::model::{timestamp, FailureRecord};
use crate::domain::ports::Storage;
use crate::utils::error::{HarvestError, Result};
use crate::utils::monitor::SystemMonitor;
use crate::utils::retry::{retry_with_backoff, RetryPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronManifest {
    pub scraped: BTreeMap<String, BTreeSet<u64>>,
    pub failed: Vec<FailureRecord>,
    /// 尚未抓完的資源最後完成的頁碼；抓完後移除
    pub last_page: BTreeMap<String, u32>,
    #[serde(deserialize_with = "timestamp::deserialize_option")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MetronManifest {
    pub fn is_scraped(&self, resource: &str, id: u64) -> bool {
        self.scraped.get(resource).is_some_and(|ids| ids.contains(&id))
    }

    pub fn mark_scraped(&mut self, resource: &str, id: u64) {
        self.scraped.entry(resource.to_string()).or_default().insert(id);
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub output_dir: String,
    pub manifest_key: String,
    pub error_log_key: String,
    pub max_pages: Option<u32>,
    pub fetch_details: bool,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeTotals {
    pub pages: u32,
    pub scraped: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct MetronScraper<St: Storage + Clone> {
    client: MetronClient,
    storage: St,
    store: ManifestStore<St>,
    failure_log: FailureLog<St>,
    manifest: MetronManifest,
    settings: ScrapeSettings,
    /// 每個資源目前的完整輸出（含既有內容）
    outputs: BTreeMap<String, Vec<Value>>,
    totals: ScrapeTotals,
    monitor: SystemMonitor,
}

impl<St: Storage + Clone> MetronScraper<St> {
    pub async fn open(client: MetronClient, storage: St, settings: ScrapeSettings) -> Result<Self> {
        let store = ManifestStore::new(storage.clone(), settings.manifest_key.clone());
        let failure_log = FailureLog::new(storage.clone(), settings.error_log_key.clone());
        let manifest = store.load_as::<MetronManifest>().await?;

        Ok(Self {
            client,
            storage,
            store,
            failure_log,
            manifest,
            settings,
            outputs: BTreeMap::new(),
            totals: ScrapeTotals::default(),
            monitor: SystemMonitor::default(),
        })
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn manifest(&self) -> &MetronManifest {
        &self.manifest
    }

    pub fn totals(&self) -> ScrapeTotals {
        self.totals
    }

    pub fn output_key(&self, resource: &str) -> String {
        format!("{}/{}.json", self.settings.output_dir.trim_end_matches('/'), resource)
    }

    /// 寫出所有已載入的輸出檔與 manifest（中斷時也會呼叫）
    pub async fn save_progress(&mut self) -> Result<()> {
        for (resource, records) in &self.outputs {
            let json = serde_json::to_vec_pretty(records)?;
            self.storage.write_file(&self.output_key(resource), &json).await?;
        }
        self.manifest.last_updated = Some(Utc::now());
        self.store.save_as(&self.manifest).await
    }

    async fn load_output(&self, resource: &str) -> Result<Vec<Value>> {
        let key = self.output_key(resource);
        if !self.storage.exists(&key).await {
            return Ok(Vec::new());
        }
        let data = self.storage.read_file(&key).await?;
        match serde_json::from_slice::<Value>(&data)? {
            Value::Array(items) => Ok(items),
            _ => Err(HarvestError::ProcessingError {
                message: format!("{} is not a JSON array", key),
            }),
        }
    }

    async fn record_failure(&mut self, label: &str, error: &HarvestError) {
        let record = FailureRecord::new(label, &error.to_string());
        if let Err(e) = self.failure_log.append(&record).await {
            tracing::warn!("⚠️  Could not write error log: {}", e);
        }
        self.manifest.failed.push(record);
        self.totals.failed += 1;
    }

    async fn scrape_character(&self, item: &Value, id: u64) -> Result<Value> {
        let character: MetronCharacter = if self.settings.fetch_details {
            retry_with_backoff(&self.settings.retry, &format!("character {}", id), || {
                self.client.character(id)
            })
            .await?
        } else {
            serde_json::from_value(item.clone())?
        };

        let first_issue = if self.settings.fetch_details {
            match self.client.first_issue_for_character(id).await {
                Ok(issue) => issue,
                Err(e) => {
                    tracing::warn!("  ⚠️  No first appearance for character {}: {}", id, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(serde_json::to_value(EntityRecord::from_character(&character, first_issue.as_ref()))?)
    }

    async fn scrape_item(&self, resource: &str, item: &Value, id: u64) -> Result<Value> {
        if resource == "character" {
            return self.scrape_character(item, id).await;
        }
        if !self.settings.fetch_details {
            return Ok(item.clone());
        }
        retry_with_backoff(&self.settings.retry, &format!("{} {}", resource, id), || {
            self.client.detail(resource, id)
        })
        .await
    }

    pub async fn scrape_resource(&mut self, resource: &str) -> Result<()> {
        tracing::info!("{}", "=".repeat(80));
        tracing::info!("📚 Resource: {}", resource);
        tracing::info!("{}", "=".repeat(80));

        if !self.outputs.contains_key(resource) {
            let existing = self.load_output(resource).await?;
            tracing::info!("📦 {} existing records", existing.len());
            self.outputs.insert(resource.to_string(), existing);
        }

        let mut page = self.manifest.last_page.get(resource).map_or(1, |last| last + 1);
        let mut fetched_pages = 0u32;

        loop {
            if self.settings.max_pages.is_some_and(|max| fetched_pages >= max) {
                tracing::info!("⏹️  Reached page limit for {}", resource);
                break;
            }

            tracing::info!("📄 {} page {}", resource, page);
            let label = format!("{} page {}", resource, page);
            let listing = retry_with_backoff(&self.settings.retry, &label, || self.client.list(resource, page)).await;
            let listing = match listing {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::error!("  ❌ Failed to list {}: {}", label, e);
                    self.record_failure(&label, &e).await;
                    break;
                }
            };
            fetched_pages += 1;
            self.totals.pages += 1;

            let mut records = Vec::new();
            for item in &listing.results {
                let Some(id) = item.get("id").and_then(Value::as_u64) else {
                    let error = HarvestError::ProcessingError {
                        message: "listing item without numeric id".to_string(),
                    };
                    self.record_failure(&format!("{}/?", resource), &error).await;
                    continue;
                };
                if self.manifest.is_scraped(resource, id) {
                    self.totals.skipped += 1;
                    continue;
                }

                match self.scrape_item(resource, item, id).await {
                    Ok(record) => {
                        records.push(record);
                        self.manifest.mark_scraped(resource, id);
                        self.totals.scraped += 1;
                    }
                    Err(e) => {
                        tracing::warn!("  ⚠️  {} {} failed: {}", resource, id, e);
                        self.record_failure(&format!("{}/{}", resource, id), &e).await;
                    }
                }
            }

            tracing::info!("  ✅ {} new records", records.len());
            self.outputs.entry(resource.to_string()).or_default().extend(records);

            if listing.next.is_none() {
                // 抓完後下次從第一頁重新檢查新項目
                self.manifest.last_page.remove(resource);
                self.save_progress().await?;
                tracing::info!("🏁 {} complete", resource);
                break;
            }

            self.manifest.last_page.insert(resource.to_string(), page);
            self.save_progress().await?;
            page += 1;
        }

        Ok(())
    }

    pub async fn run(&mut self, resources: &[String]) -> Result<ScrapeTotals> {
        tracing::info!("📦 Previously scraped: {}", self.manifest.scraped.values().map(BTreeSet::len).sum::<usize>());

        for resource in resources {
            self.scrape_resource(resource).await?;
            self.monitor.log_stats(resource);
        }

        self.save_progress().await?;
        tracing::info!(
            "📊 Pages: {} | Scraped: {} | Skipped: {} | Failed: {}",
            self.totals.pages,
            self.totals.scraped,
            self.totals.skipped,
            self.totals.failed
        );
        Ok(self.totals)
    }
}
