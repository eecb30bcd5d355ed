use crate::domain::model::DatasetRef;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// 以 base path 為根的檔案存取（manifest、錯誤日誌、摘要報告）
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn append_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

/// 資料集來源：Kaggle REST API 或 `kaggle` CLI
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn search(&self, term: &str) -> Result<Vec<DatasetRef>>;

    /// 下載並解壓到 `dest`，回傳資料所在目錄
    async fn download(&self, dataset: &DatasetRef, dest: &Path) -> Result<PathBuf>;

    async fn latest_version(&self, _dataset: &DatasetRef) -> Result<Option<u32>> {
        Ok(None)
    }
}
