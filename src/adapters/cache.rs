use crate::domain::model::DatasetRef;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const CACHE_ENV_VAR: &str = "KAGGLEHUB_CACHE";

/// kagglehub 的快取目錄結構：`<root>/datasets/<owner>/<slug>/versions/<n>`
#[derive(Debug, Clone)]
pub struct KaggleCache {
    root: PathBuf,
}

impl KaggleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `KAGGLEHUB_CACHE`，否則 `~/.cache/kagglehub`
    pub fn from_env() -> Self {
        if let Ok(root) = std::env::var(CACHE_ENV_VAR) {
            if !root.trim().is_empty() {
                return Self::new(root);
            }
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".cache").join("kagglehub"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn versions_dir(&self, dataset: &DatasetRef) -> PathBuf {
        self.root
            .join("datasets")
            .join(dataset.owner())
            .join(dataset.slug())
            .join("versions")
    }

    pub fn version_dir(&self, dataset: &DatasetRef, version: u32) -> PathBuf {
        self.versions_dir(dataset).join(version.to_string())
    }

    /// 下載中的暫存目錄，完成後才改名為 `version_dir`
    pub fn staging_dir(&self, dataset: &DatasetRef, version: u32) -> PathBuf {
        self.versions_dir(dataset).join(format!(".{}.partial", version))
    }

    /// 最近修改的版本目錄（略過 `.` 開頭的暫存目錄）
    pub fn lookup(&self, dataset: &DatasetRef) -> Option<PathBuf> {
        let entries = fs::read_dir(self.versions_dir(dataset)).ok()?;

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|entry| {
                let meta = entry.metadata().ok()?;
                if !meta.is_dir() {
                    return None;
                }
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                Some((modified, entry.path()))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, path)| path)
    }
}
