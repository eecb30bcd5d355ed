use crate::core::analysis::{analyze_dataset, collect_files, count_csv_records};
use crate::core::links::link_path;
use crate::domain::manifest::{Manifest, MANIFEST_VERSION};
use crate::domain::model::{DatasetRef, FileStat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDetail {
    pub dataset: String,
    pub path: String,
    pub symlink: String,
    pub files: u64,
    pub csv_files: usize,
    pub json_files: usize,
    pub estimated_records: u64,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub file_list: Vec<FileStat>,
}

/// 每個資料集一筆的摘要（comic-harvest）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    pub session_start: DateTime<Utc>,
    pub version: String,
    pub total_datasets: usize,
    pub total_failed: usize,
    pub datasets_by_category: BTreeMap<String, usize>,
    pub total_files: u64,
    pub total_records: u64,
    pub total_size_bytes: u64,
    pub total_size_gb: f64,
    pub dataset_details: Vec<DatasetDetail>,
    pub largest_datasets: Vec<DatasetDetail>,
}

pub fn build_summary_report(manifest: &Manifest, base_dir: &Path, session_start: DateTime<Utc>) -> SummaryReport {
    let mut details = Vec::new();

    for dataset in &manifest.downloaded {
        let Some(path) = manifest.dataset_paths.get(dataset) else {
            continue;
        };
        tracing::debug!("📊 Analyzing: {}", dataset);
        let stats = analyze_dataset(Path::new(path));

        let symlink = match dataset.parse::<DatasetRef>() {
            Ok(parsed) => link_path(base_dir, &parsed).to_string_lossy().into_owned(),
            Err(_) => String::new(),
        };

        let mut file_list = stats.csv_files.clone();
        file_list.extend(stats.json_files.iter().cloned());

        details.push(DatasetDetail {
            dataset: dataset.clone(),
            path: path.clone(),
            symlink,
            files: stats.total_files,
            csv_files: stats.csv_files.len(),
            json_files: stats.json_files.len(),
            estimated_records: stats.estimated_records,
            size_bytes: stats.total_size_bytes,
            size_mb: stats.total_size_bytes as f64 / BYTES_PER_MB,
            file_list,
        });
    }

    // 記錄數由多到少；同數量時依名稱，輸出穩定
    details.sort_by(|a, b| {
        b.estimated_records
            .cmp(&a.estimated_records)
            .then_with(|| a.dataset.cmp(&b.dataset))
    });

    let total_files = details.iter().map(|d| d.files).sum();
    let total_records = details.iter().map(|d| d.estimated_records).sum();
    let total_size_bytes: u64 = details.iter().map(|d| d.size_bytes).sum();

    SummaryReport {
        generated_at: Utc::now(),
        session_start,
        version: MANIFEST_VERSION.to_string(),
        total_datasets: manifest.downloaded.len(),
        total_failed: manifest.failed.len(),
        datasets_by_category: manifest.category_counts(),
        total_files,
        total_records,
        total_size_bytes,
        total_size_gb: total_size_bytes as f64 / BYTES_PER_GB,
        largest_datasets: details.iter().take(10).cloned().collect(),
        dataset_details: details,
    }
}

pub fn log_summary_report(report: &SummaryReport, manifest_path: &str, summary_path: &str, base_dir: &Path) {
    tracing::info!("{}", "=".repeat(80));
    tracing::info!("SUMMARY REPORT");
    tracing::info!("{}", "=".repeat(80));
    tracing::info!("✅ Successfully downloaded: {}", report.total_datasets);
    tracing::info!("❌ Failed: {}", report.total_failed);
    tracing::info!("📁 Total files: {}", report.total_files);
    tracing::info!("📝 Total records: {}", report.total_records);
    tracing::info!("💾 Total size: {:.2} GB", report.total_size_gb);
    tracing::info!("📦 Datasets by category:");
    for (category, count) in &report.datasets_by_category {
        tracing::info!("   - {}: {}", category, count);
    }
    tracing::info!("🏆 Top 5 datasets by record count:");
    for (i, detail) in report.largest_datasets.iter().take(5).enumerate() {
        tracing::info!("   {}. {}", i + 1, detail.dataset);
        tracing::info!(
            "      Records: {} | Files: {} | Size: {:.1} MB",
            detail.estimated_records,
            detail.files,
            detail.size_mb
        );
    }
    tracing::info!("📋 Manifest saved: {}", manifest_path);
    tracing::info!("📊 Full summary: {}", summary_path);
    tracing::info!("🔗 Symlinks created in: {}", base_dir.display());
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LargeFile {
    pub file: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub records: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsByFileType {
    pub csv: u64,
    pub json: u64,
}

/// 掃描整個下載目錄的摘要（kaggle-bulk）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub generated_at: DateTime<Utc>,
    pub session_start: DateTime<Utc>,
    pub total_datasets: usize,
    pub total_failed: usize,
    pub datasets_by_category: BTreeMap<String, usize>,
    pub total_records: u64,
    pub records_by_file_type: RecordsByFileType,
    pub largest_datasets: Vec<LargeFile>,
    pub ready_files: Vec<String>,
    pub total_size_bytes: u64,
    pub total_size_gb: f64,
}

/// `skip_names`：manifest 與摘要本身等不該計入的檔名
pub fn build_corpus_summary(
    manifest: &Manifest,
    base_dir: &Path,
    skip_names: &[&str],
    session_start: DateTime<Utc>,
) -> CorpusSummary {
    let csv_files = collect_files(base_dir, Some("csv"));
    let json_files: Vec<_> = collect_files(base_dir, Some("json"))
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| !skip_names.contains(&name))
                .unwrap_or(true)
        })
        .collect();

    tracing::info!("📁 Found {} CSV files", csv_files.len());
    tracing::info!("📁 Found {} JSON files", json_files.len());

    let relative = |path: &Path| path.strip_prefix(base_dir).unwrap_or(path).to_string_lossy().into_owned();

    let mut largest = Vec::new();
    let mut ready_files = Vec::new();
    let mut by_type = RecordsByFileType::default();

    for csv_file in &csv_files {
        match count_csv_records(csv_file) {
            Ok(rows) if rows > 0 => {
                let size = fs::metadata(csv_file).map(|m| m.len()).unwrap_or(0);
                by_type.csv += rows;
                largest.push(LargeFile {
                    file: relative(csv_file),
                    size_bytes: size,
                    size_mb: size as f64 / BYTES_PER_MB,
                    records: rows,
                });
                ready_files.push(relative(csv_file));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️  Error reading {}: {}", csv_file.display(), e),
        }
    }

    for json_file in &json_files {
        let parsed = fs::read(json_file)
            .map_err(|e| e.to_string())
            .and_then(|data| serde_json::from_slice::<serde_json::Value>(&data).map_err(|e| e.to_string()));

        match parsed {
            // 只有陣列形式的 JSON 算作可處理的記錄
            Ok(serde_json::Value::Array(items)) => {
                let size = fs::metadata(json_file).map(|m| m.len()).unwrap_or(0);
                by_type.json += items.len() as u64;
                largest.push(LargeFile {
                    file: relative(json_file),
                    size_bytes: size,
                    size_mb: size as f64 / BYTES_PER_MB,
                    records: items.len() as u64,
                });
                ready_files.push(relative(json_file));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️  Error reading {}: {}", json_file.display(), e),
        }
    }

    largest.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then_with(|| a.file.cmp(&b.file)));
    largest.truncate(20);

    CorpusSummary {
        generated_at: Utc::now(),
        session_start,
        total_datasets: manifest.downloaded.len(),
        total_failed: manifest.failed.len(),
        datasets_by_category: manifest.category_counts(),
        total_records: by_type.csv + by_type.json,
        records_by_file_type: by_type,
        largest_datasets: largest,
        ready_files,
        total_size_bytes: manifest.total_size_bytes,
        total_size_gb: manifest.total_size_bytes as f64 / BYTES_PER_GB,
    }
}

pub fn log_corpus_summary(summary: &CorpusSummary, summary_path: &str) {
    tracing::info!("{}", "=".repeat(80));
    tracing::info!("SUMMARY REPORT");
    tracing::info!("{}", "=".repeat(80));
    tracing::info!("📊 Total datasets downloaded: {}", summary.total_datasets);
    tracing::info!("📝 Total records: {}", summary.total_records);
    tracing::info!("   - CSV records: {}", summary.records_by_file_type.csv);
    tracing::info!("   - JSON records: {}", summary.records_by_file_type.json);
    tracing::info!("💾 Total storage used: {:.2} GB", summary.total_size_gb);
    tracing::info!("📦 Datasets by category:");
    for (category, count) in &summary.datasets_by_category {
        tracing::info!("   - {}: {}", category, count);
    }
    tracing::info!("🏆 Top 5 largest datasets:");
    for (i, file) in summary.largest_datasets.iter().take(5).enumerate() {
        tracing::info!("   {}. {}", i + 1, file.file);
        tracing::info!("      Size: {:.1} MB | Records: {}", file.size_mb, file.records);
    }
    tracing::info!("📋 Full summary report: {}", summary_path);
    tracing::info!("📁 Ready-to-process files: {}", summary.ready_files.len());
}
