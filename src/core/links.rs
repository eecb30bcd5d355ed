use crate::domain::model::DatasetRef;
use crate::utils::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub fn link_path(base_dir: &Path, dataset: &DatasetRef) -> PathBuf {
    base_dir.join(dataset.safe_name())
}

/// 在 `base_dir/<owner>_<slug>` 建立指向快取目錄的連結；
/// 來源不存在時不做事並回傳 `None`
pub fn link_dataset(base_dir: &Path, dataset: &DatasetRef, source: &Path) -> Result<Option<PathBuf>> {
    if !source.exists() {
        return Ok(None);
    }

    fs::create_dir_all(base_dir)?;
    let link = link_path(base_dir, dataset);

    if let Ok(meta) = fs::symlink_metadata(&link) {
        // 真實目錄不動，只替換檔案與連結
        if meta.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} is a directory", link.display()),
            )
            .into());
        }
        fs::remove_file(&link)?;
    }

    symlink_dir(source, &link)?;
    Ok(Some(link))
}

#[cfg(unix)]
fn symlink_dir(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn symlink_dir(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(source, link)
}
