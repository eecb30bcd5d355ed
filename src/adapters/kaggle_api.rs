use crate::adapters::http::{ensure_success, map_send_error, USER_AGENT};
use crate::config::credentials::KaggleCredentials;
use crate::domain::model::DatasetRef;
use crate::domain::ports::DatasetSource;
use crate::utils::error::{HarvestError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Kaggle REST API (v1)
pub struct KaggleApi {
    client: Client,
    base_url: String,
    credentials: KaggleCredentials,
}

#[derive(Debug, Deserialize)]
struct DatasetListItem {
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetView {
    current_version_number: Option<u32>,
}

impl KaggleApi {
    pub fn new(base_url: &str, credentials: KaggleCredentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn get(&self, url: &str, query: &[(&str, &str)], context: &str) -> Result<Response> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .basic_auth(&self.credentials.username, Some(&self.credentials.key))
            .send()
            .await
            .map_err(|e| map_send_error(e, context))?;

        ensure_success(response, context).await
    }
}

#[async_trait]
impl DatasetSource for KaggleApi {
    async fn search(&self, term: &str) -> Result<Vec<DatasetRef>> {
        let url = format!("{}/datasets/list", self.base_url);
        let context = format!("search '{}'", term);
        let response = self
            .get(&url, &[("search", term), ("page", "1")], &context)
            .await?;

        let items: Vec<DatasetListItem> = response.json().await?;
        let refs = items
            .into_iter()
            .filter_map(|item| item.reference)
            .filter_map(|raw| match raw.parse::<DatasetRef>() {
                Ok(dataset) => Some(dataset),
                Err(e) => {
                    tracing::debug!("Skipping search result: {}", e);
                    None
                }
            })
            .collect();

        Ok(refs)
    }

    async fn download(&self, dataset: &DatasetRef, dest: &Path) -> Result<PathBuf> {
        let url = format!(
            "{}/datasets/download/{}/{}",
            self.base_url,
            dataset.owner(),
            dataset.slug()
        );
        let context = format!("download {}", dataset);
        let response = self.get(&url, &[], &context).await?;

        // 只清理這次建立的目錄；既有內容直接覆寫
        let created = !tokio::fs::try_exists(dest).await.unwrap_or(false);
        tokio::fs::create_dir_all(dest).await?;

        let archive_path = dest.join(format!("{}.zip.part", dataset.slug()));
        let result = fetch_and_extract(response, &archive_path, dest, &context).await;

        if let Err(e) = &result {
            tracing::debug!("Cleaning up after failed download of {}: {}", dataset, e);
            let _ = tokio::fs::remove_file(&archive_path).await;
            if created {
                let _ = tokio::fs::remove_dir_all(dest).await;
            }
        }
        result.map(|_| dest.to_path_buf())
    }

    async fn latest_version(&self, dataset: &DatasetRef) -> Result<Option<u32>> {
        let url = format!(
            "{}/datasets/view/{}/{}",
            self.base_url,
            dataset.owner(),
            dataset.slug()
        );
        let context = format!("view {}", dataset);
        let view: DatasetView = self.get(&url, &[], &context).await?.json().await?;
        Ok(view.current_version_number)
    }
}

async fn fetch_and_extract(mut response: Response, archive_path: &Path, dest: &Path, context: &str) -> Result<()> {
    let mut file = tokio::fs::File::create(archive_path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| map_send_error(e, context))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);
    tracing::debug!("Fetched {} bytes for {}", written, context);

    let archive = archive_path.to_path_buf();
    let target = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive(&archive, &target))
        .await
        .map_err(|e| HarvestError::ProcessingError {
            message: format!("extract task failed: {}", e),
        })??;

    tokio::fs::remove_file(archive_path).await?;
    Ok(())
}

/// 解壓到 `dest`，同名檔案會被覆寫
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest)?;
    Ok(())
}
