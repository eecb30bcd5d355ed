use crate::domain::model::DatasetRef;
use crate::utils::error::{HarvestError, Result};
use crate::utils::retry::RetryPolicy;
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CURATED_DATASETS: &[&str] = &[
    "arunasivapragasam/dc-comics",
    "fivethirtyeight/fivethirtyeight-comic-characters-dataset",
    "mmmarchetti/dc-characters-dataset",
    "dannielr/marvel-superheroes",
    "claudiodavi/superhero-set",
    "jonathanbesomi/comic-characters-dataset",
    "deepcontractor/dc-wikia-data",
    "deepcontractor/marvel-wikia-data",
    "psycon/comic-book-sales-data",
    "rounakbanik/pokemon",
    "mylesoneill/game-of-thrones",
];

pub const DISCOVERY_TERMS: &[&str] = &[
    "marvel",
    "dc comics",
    "pokemon",
    "funko pop",
    "comic prices",
    "superhero",
    "manga",
    "anime",
    "collectibles",
    "cgc grading",
    "box office",
    "comic sales",
    "comic characters",
    "comic books",
    "trading cards",
    "action figures",
    "memorabilia",
];

const CATEGORY_TERMS: &[(&str, &[&str])] = &[
    (
        "core_publishers",
        &[
            "marvel comics", "dc comics", "dark horse comics", "idw comics", "image comics",
            "vertigo comics", "wildstorm", "milestone comics", "valiant comics",
        ],
    ),
    (
        "franchise_universes",
        &[
            "pokemon", "digimon", "yu-gi-oh", "magic gathering", "dragon ball", "naruto",
            "one piece", "bleach", "attack on titan",
        ],
    ),
    (
        "trading_cards",
        &["pokemon tcg", "magic the gathering cards", "yu-gi-oh cards", "comic trading cards", "sports cards"],
    ),
    (
        "toys_figurines",
        &["funko pop", "action figures", "collectible toys", "nendoroid", "figma", "hot toys", "lego", "transformers"],
    ),
    (
        "memorabilia_auctions",
        &["comic auction", "collectible prices", "comic grading", "cgc census", "comic sales data", "auction results"],
    ),
    (
        "art_creative",
        &["comic art", "manga art", "character designs", "comic creators", "illustrators", "graphic novels"],
    ),
    (
        "box_office_media",
        &["box office", "superhero movies", "anime ratings", "comic adaptations", "streaming data"],
    ),
    (
        "character_encyclopedias",
        &["superhero database", "character roster", "villain database", "anime characters", "manga characters"],
    ),
    (
        "financial_pricing",
        &["comic book prices", "collectible values", "grading data", "price guide", "market values"],
    ),
    (
        "meta_terms",
        &[
            "comics", "superheroes", "manga", "anime", "collectibles", "memorabilia", "pop culture",
            "comic books", "graphic novel",
        ],
    ),
    (
        "gaming_collectibles",
        &["retro gaming", "video game collectibles", "nintendo", "playstation", "xbox", "gaming merchandise"],
    ),
    ("additional_publishers", &["boom studios", "dynamite entertainment", "oni press"]),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub paths: PathsConfig,
    pub kaggle: KaggleConfig,
    pub retry: RetryConfig,
    pub metron: MetronConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// 所有相對路徑的根目錄
    pub root: String,
    pub base_dir: String,
    pub manifest: String,
    pub error_log: String,
    pub summary: String,
    pub cache_dir: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            base_dir: "data/kaggle".to_string(),
            manifest: "data/kaggle-manifest.json".to_string(),
            error_log: "data/kaggle/download-errors-v2.log".to_string(),
            summary: "data/kaggle-summary.json".to_string(),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum KaggleBackend {
    #[default]
    Api,
    Cli,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTerms {
    pub name: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KaggleConfig {
    pub backend: KaggleBackend,
    pub api_base: String,
    pub curated: Vec<String>,
    pub search_terms: Vec<String>,
    pub categories: Vec<CategoryTerms>,
    pub max_per_term: usize,
    pub request_timeout_seconds: u64,
    pub download_delay_seconds: u64,
    pub checkpoint_every: usize,
}

impl Default for KaggleConfig {
    fn default() -> Self {
        Self {
            backend: KaggleBackend::Api,
            api_base: "https://www.kaggle.com/api/v1".to_string(),
            curated: CURATED_DATASETS.iter().map(|s| s.to_string()).collect(),
            search_terms: DISCOVERY_TERMS.iter().map(|s| s.to_string()).collect(),
            categories: CATEGORY_TERMS
                .iter()
                .map(|(name, terms)| CategoryTerms {
                    name: name.to_string(),
                    terms: terms.iter().map(|t| t.to_string()).collect(),
                })
                .collect(),
            max_per_term: 5,
            request_timeout_seconds: 300,
            download_delay_seconds: 2,
            checkpoint_every: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_seconds: u64,
    pub backoff_factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_seconds: 5,
            backoff_factor: 2,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.base_delay_seconds),
            backoff_factor: self.backoff_factor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronConfig {
    pub api_base: String,
    pub resources: Vec<String>,
    pub max_pages: Option<u32>,
    pub fetch_details: bool,
    pub rate_limit_ms: u64,
    pub request_timeout_seconds: u64,
    pub output_dir: String,
    pub manifest: String,
    pub error_log: String,
}

impl Default for MetronConfig {
    fn default() -> Self {
        Self {
            api_base: "https://metron.cloud/api".to_string(),
            resources: vec!["character".to_string()],
            max_pages: None,
            fetch_details: true,
            // Metron 限制每分鐘 30 次
            rate_limit_ms: 2000,
            request_timeout_seconds: 10,
            output_dir: "data/metron".to_string(),
            manifest: "data/metron-manifest.json".to_string(),
            error_log: "data/metron/scrape-errors.log".to_string(),
        }
    }
}

pub const METRON_RESOURCES: &[&str] = &[
    "arc", "character", "creator", "imprint", "issue", "publisher", "series", "team", "universe",
];

impl HarvestConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(HarvestError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| HarvestError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${KAGGLE_DATA_ROOT})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| HarvestError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 有 `--config` 就讀檔，否則使用預設值
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn curated_datasets(&self) -> Result<Vec<DatasetRef>> {
        self.kaggle.curated.iter().map(|raw| raw.parse()).collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_secs(self.kaggle.download_delay_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.kaggle.request_timeout_seconds)
    }
}

impl Validate for HarvestConfig {
    fn validate(&self) -> Result<()> {
        validate_path("paths.root", &self.paths.root)?;
        validate_path("paths.base_dir", &self.paths.base_dir)?;
        validate_path("paths.manifest", &self.paths.manifest)?;
        validate_path("paths.error_log", &self.paths.error_log)?;
        validate_path("paths.summary", &self.paths.summary)?;

        validate_url("kaggle.api_base", &self.kaggle.api_base)?;
        validate_positive_number("kaggle.max_per_term", self.kaggle.max_per_term, 1)?;
        validate_positive_number("kaggle.checkpoint_every", self.kaggle.checkpoint_every, 1)?;
        validate_range("kaggle.request_timeout_seconds", self.kaggle.request_timeout_seconds, 1, 3600)?;
        for raw in &self.kaggle.curated {
            raw.parse::<DatasetRef>()?;
        }
        for term in &self.kaggle.search_terms {
            validate_non_empty_string("kaggle.search_terms", term)?;
        }
        for category in &self.kaggle.categories {
            validate_non_empty_string("kaggle.categories.name", &category.name)?;
            for term in &category.terms {
                validate_non_empty_string("kaggle.categories.terms", term)?;
            }
        }

        validate_range("retry.max_retries", self.retry.max_retries, 0, 10)?;
        validate_range("retry.backoff_factor", self.retry.backoff_factor, 1, 10)?;

        validate_url("metron.api_base", &self.metron.api_base)?;
        validate_path("metron.output_dir", &self.metron.output_dir)?;
        validate_path("metron.manifest", &self.metron.manifest)?;
        for resource in &self.metron.resources {
            if !METRON_RESOURCES.contains(&resource.as_str()) {
                return Err(HarvestError::InvalidConfigValueError {
                    field: "metron.resources".to_string(),
                    value: resource.clone(),
                    reason: format!("Unsupported resource. Valid resources: {}", METRON_RESOURCES.join(", ")),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_harvest_plan() {
        let config = HarvestConfig::default();
        assert_eq!(config.kaggle.curated.len(), 11);
        assert_eq!(config.kaggle.search_terms.len(), 17);
        assert_eq!(config.kaggle.categories.len(), 12);
        assert_eq!(config.kaggle.categories[0].name, "core_publishers");
        assert_eq!(config.paths.manifest, "data/kaggle-manifest.json");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_content = r#"
[paths]
base_dir = "/srv/kaggle"

[kaggle]
backend = "cli"
curated = ["rounakbanik/pokemon"]
max_per_term = 2

[[kaggle.categories]]
name = "toys"
terms = ["funko pop", "lego"]

[retry]
base_delay_seconds = 1
"#;

        let config = HarvestConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.paths.base_dir, "/srv/kaggle");
        assert_eq!(config.paths.manifest, "data/kaggle-manifest.json");
        assert_eq!(config.kaggle.backend, KaggleBackend::Cli);
        assert_eq!(config.kaggle.max_per_term, 2);
        assert_eq!(config.kaggle.categories.len(), 1);
        assert_eq!(config.kaggle.search_terms.len(), 17);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry_policy().base_delay, Duration::from_secs(1));
        assert_eq!(config.curated_datasets().unwrap()[0].slug(), "pokemon");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("COMIC_HARVEST_TEST_ROOT", "/mnt/datasets");

        let config = HarvestConfig::from_toml_str(
            r#"
[paths]
root = "${COMIC_HARVEST_TEST_ROOT}"
base_dir = "${COMIC_HARVEST_UNSET_VAR}"
"#,
        )
        .unwrap();

        assert_eq!(config.paths.root, "/mnt/datasets");
        assert_eq!(config.paths.base_dir, "${COMIC_HARVEST_UNSET_VAR}");

        std::env::remove_var("COMIC_HARVEST_TEST_ROOT");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = HarvestConfig::from_toml_str("[kaggle]\ncurated = [\"missing-slash\"]\n").unwrap();
        assert!(config.validate().is_err());

        let config = HarvestConfig::from_toml_str("[kaggle]\napi_base = \"invalid-url\"\n").unwrap();
        assert!(config.validate().is_err());

        let config = HarvestConfig::from_toml_str("[metron]\nresources = [\"villain\"]\n").unwrap();
        assert!(config.validate().is_err());

        assert!(HarvestConfig::from_toml_str("[kaggle]\nmax_per_term = \"five\"\n").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[metron]\nresources = [\"publisher\", \"series\"]\nmax_pages = 3\n")
            .unwrap();

        let config = HarvestConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.metron.resources, vec!["publisher", "series"]);
        assert_eq!(config.metron.max_pages, Some(3));
        assert!(config.validate().is_ok());
    }
}
