//! 資料集檔案統計：檔案數、CSV 列數、JSON 記錄數與大小。

use crate::domain::model::{DatasetStats, FileStat};
use std::fs;
use std::path::{Path, PathBuf};

/// 遞迴列出 `root` 底下的一般檔案；`extension` 為 `None` 時全部列出。
/// 不跟隨指向目錄的 symlink，避免在 base_dir 的連結上重複計算。
pub fn collect_files(root: &Path, extension: Option<&str>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", dir.display(), e);
                continue;
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(_) => continue,
            };
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && matches_extension(&path, extension) {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn matches_extension(path: &Path, extension: Option<&str>) -> bool {
    match extension {
        None => true,
        Some(wanted) => path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(wanted))
            .unwrap_or(false),
    }
}

/// CSV 資料列數（不含標題列）
pub fn count_csv_records(path: &Path) -> crate::utils::error::Result<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let mut count = 0u64;
    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        count += 1;
    }
    Ok(count)
}

/// JSON 陣列算長度，其他值算一筆
pub fn count_json_records(path: &Path) -> crate::utils::error::Result<u64> {
    let data = fs::read(path)?;
    let value: serde_json::Value = serde_json::from_slice(&data)?;
    Ok(match value {
        serde_json::Value::Array(items) => items.len() as u64,
        _ => 1,
    })
}

fn file_stat(root: &Path, path: &Path, size_bytes: u64, records: u64) -> FileStat {
    FileStat {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned(),
        size_bytes,
        records,
    }
}

pub fn analyze_dataset(root: &Path) -> DatasetStats {
    let mut stats = DatasetStats::default();
    if !root.exists() {
        return stats;
    }

    stats.total_files = collect_files(root, None).len() as u64;

    for csv_file in collect_files(root, Some("csv")) {
        let size = fs::metadata(&csv_file).map(|m| m.len()).unwrap_or(0);
        stats.total_size_bytes += size;

        match count_csv_records(&csv_file) {
            Ok(rows) if rows > 0 => {
                stats.estimated_records += rows;
                stats.csv_files.push(file_stat(root, &csv_file, size, rows));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️  Error analyzing {}: {}", csv_file.display(), e),
        }
    }

    for json_file in collect_files(root, Some("json")) {
        let size = fs::metadata(&json_file).map(|m| m.len()).unwrap_or(0);
        stats.total_size_bytes += size;

        match count_json_records(&json_file) {
            Ok(records) => {
                stats.estimated_records += records;
                stats.json_files.push(file_stat(root, &json_file, size, records));
            }
            Err(e) => tracing::warn!("⚠️  Error analyzing {}: {}", json_file.display(), e),
        }
    }

    stats
}

/// 目錄內所有一般檔案的大小總和
pub fn directory_size(root: &Path) -> u64 {
    collect_files(root, None)
        .iter()
        .filter_map(|path| fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum()
}
