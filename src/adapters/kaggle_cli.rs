use crate::domain::model::DatasetRef;
use crate::domain::ports::DatasetSource;
use crate::utils::error::{truncate_message, HarvestError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// 透過 `kaggle` 命令列工具存取（需要 `pip install kaggle`）
#[derive(Debug, Clone)]
pub struct KaggleCli {
    program: String,
    download_timeout: Duration,
}

impl KaggleCli {
    pub fn new(download_timeout: Duration) -> Self {
        Self::with_program("kaggle", download_timeout)
    }

    pub fn with_program(program: impl Into<String>, download_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            download_timeout,
        }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        tracing::debug!("Running: {}", command_line);

        let child = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HarvestError::Timeout {
                    message: format!("`{}` exceeded {}s", command_line, timeout.as_secs()),
                })
            }
        };

        if output.status.success() {
            return Ok(output);
        }

        Err(classify_failure(&command_line, &String::from_utf8_lossy(&output.stderr)))
    }
}

/// stderr 含 429 / rate limit 視為限流
pub fn classify_failure(command: &str, stderr: &str) -> HarvestError {
    let lowered = stderr.to_lowercase();
    if stderr.contains("429") || lowered.contains("rate limit") {
        return HarvestError::RateLimited {
            message: truncate_message(stderr.trim(), 200),
        };
    }

    let stderr = if stderr.trim().is_empty() {
        "Unknown error".to_string()
    } else {
        truncate_message(stderr.trim(), 200)
    };
    HarvestError::CommandFailed {
        command: command.to_string(),
        stderr,
    }
}

/// 解析 `kaggle datasets list --csv` 的輸出，取 `ref` 欄
pub fn parse_dataset_list(csv_text: &str) -> Result<Vec<DatasetRef>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let ref_index = match reader.headers()?.iter().position(|h| h.trim() == "ref") {
        Some(index) => index,
        None => return Ok(Vec::new()),
    };

    let mut refs = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(raw) = record.get(ref_index) {
            match raw.parse::<DatasetRef>() {
                Ok(dataset) => refs.push(dataset),
                Err(e) => tracing::debug!("Skipping search row: {}", e),
            }
        }
    }
    Ok(refs)
}

#[async_trait]
impl DatasetSource for KaggleCli {
    async fn search(&self, term: &str) -> Result<Vec<DatasetRef>> {
        let output = self
            .run(&["datasets", "list", "-s", term, "--csv"], SEARCH_TIMEOUT)
            .await?;
        parse_dataset_list(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(&self, dataset: &DatasetRef, dest: &Path) -> Result<PathBuf> {
        let created = !tokio::fs::try_exists(dest).await.unwrap_or(false);
        tokio::fs::create_dir_all(dest).await?;

        let reference = dataset.to_string();
        let dest_str = dest.to_string_lossy();
        let result = self
            .run(
                &["datasets", "download", "-d", &reference, "-p", &dest_str, "--unzip"],
                self.download_timeout,
            )
            .await;

        if let Err(e) = result {
            // 失敗時只移除這次建立的目錄
            if created {
                let _ = tokio::fs::remove_dir_all(dest).await;
            }
            return Err(e);
        }
        Ok(dest.to_path_buf())
    }
}
