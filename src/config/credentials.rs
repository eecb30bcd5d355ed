use crate::utils::error::{HarvestError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Deserialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

// 不把金鑰印進日誌
impl std::fmt::Debug for KaggleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KaggleCredentials")
            .field("username", &self.username)
            .field("key", &"***")
            .finish()
    }
}

impl KaggleCredentials {
    /// `KAGGLE_USERNAME` / `KAGGLE_KEY`，否則 `~/.kaggle/kaggle.json`
    pub fn resolve() -> Result<Self> {
        let json_path = Self::default_json_path();
        Self::resolve_with(|name| std::env::var(name).ok(), json_path.as_deref())
    }

    pub fn resolve_with<F>(lookup: F, kaggle_json: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup("KAGGLE_USERNAME").filter(|v| !v.trim().is_empty());
        let key = lookup("KAGGLE_KEY").filter(|v| !v.trim().is_empty());
        if let (Some(username), Some(key)) = (username, key) {
            return Ok(Self { username, key });
        }

        if let Some(path) = kaggle_json {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let creds: KaggleCredentials = serde_json::from_str(&content)?;
                tracing::debug!("Using Kaggle credentials from {}", path.display());
                return Ok(creds);
            }
        }

        Err(HarvestError::MissingCredentials {
            variables: "KAGGLE_USERNAME and KAGGLE_KEY".to_string(),
        })
    }

    pub fn default_json_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".kaggle").join("kaggle.json"))
    }
}

#[derive(Clone)]
pub struct MetronCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for MetronCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetronCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl MetronCredentials {
    pub fn resolve() -> Result<Self> {
        Self::resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup("METRON_USERNAME").filter(|v| !v.trim().is_empty());
        let password = lookup("METRON_PASSWORD").filter(|v| !v.trim().is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok(Self { username, password }),
            _ => Err(HarvestError::MissingCredentials {
                variables: "METRON_USERNAME and METRON_PASSWORD".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_kaggle_from_env() {
        let creds = KaggleCredentials::resolve_with(
            env(&[("KAGGLE_USERNAME", "collector"), ("KAGGLE_KEY", "abc")]),
            None,
        )
        .unwrap();
        assert_eq!(creds.username, "collector");
        assert!(!format!("{:?}", creds).contains("abc"));
    }

    #[test]
    fn test_kaggle_falls_back_to_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kaggle.json");
        std::fs::write(&path, r#"{"username":"from-file","key":"k"}"#).unwrap();

        let creds = KaggleCredentials::resolve_with(env(&[("KAGGLE_USERNAME", "only-user")]), Some(&path)).unwrap();
        assert_eq!(creds.username, "from-file");
    }

    #[test]
    fn test_kaggle_missing_everything() {
        let dir = TempDir::new().unwrap();
        let err = KaggleCredentials::resolve_with(env(&[]), Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, HarvestError::MissingCredentials { .. }));
    }

    #[test]
    fn test_metron_requires_both() {
        assert!(MetronCredentials::resolve_with(env(&[("METRON_USERNAME", "u")])).is_err());
        let creds =
            MetronCredentials::resolve_with(env(&[("METRON_USERNAME", "u"), ("METRON_PASSWORD", "p")])).unwrap();
        assert_eq!(creds.password, "p");
    }
}
