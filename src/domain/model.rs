use crate::utils::error::{truncate_message, HarvestError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kaggle 資料集識別：`owner/slug`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetRef {
    owner: String,
    slug: String,
}

impl DatasetRef {
    pub fn new(owner: impl Into<String>, slug: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let slug = slug.into();
        if owner.trim().is_empty() || slug.trim().is_empty() || owner.contains('/') || slug.contains('/') {
            return Err(HarvestError::InvalidDatasetRef {
                value: format!("{}/{}", owner, slug),
            });
        }
        Ok(Self { owner, slug })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// 用於 symlink 名稱，例如 `deepcontractor_dc-wikia-data`
    pub fn safe_name(&self) -> String {
        format!("{}_{}", self.owner, self.slug)
    }
}

impl FromStr for DatasetRef {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((owner, slug)) => Self::new(owner, slug).map_err(|_| HarvestError::InvalidDatasetRef {
                value: s.to_string(),
            }),
            None => Err(HarvestError::InvalidDatasetRef { value: s.to_string() }),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.slug)
    }
}

impl Serialize for DatasetRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DatasetRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub const MAX_ERROR_CHARS: usize = 200;

/// 時間戳可能是 RFC 3339，也可能是沒有時區的 ISO 8601（舊版 manifest），後者視為 UTC
pub mod timestamp {
    use super::*;
    use serde::de::Error;

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc()))
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", raw)))
    }

    pub fn deserialize_option<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", raw))),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub dataset: String,
    pub error: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(dataset: impl Into<String>, error: &str) -> Self {
        Self {
            dataset: dataset.into(),
            error: truncate_message(error, MAX_ERROR_CHARS),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStat {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    pub records: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub csv_files: Vec<FileStat>,
    pub json_files: Vec<FileStat>,
    pub total_files: u64,
    pub estimated_records: u64,
    pub total_size_bytes: u64,
}
