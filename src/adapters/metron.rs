use crate::adapters::http::{ensure_success, map_send_error, USER_AGENT};
use crate::config::credentials::MetronCredentials;
use crate::utils::error::Result;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetronCharacter {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub alias: Vec<String>,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub creators: Vec<NamedRef>,
    #[serde(default)]
    pub teams: Vec<NamedRef>,
    #[serde(default)]
    pub modified: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesName {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetronIssue {
    pub id: u64,
    pub series: SeriesName,
    pub number: String,
    #[serde(default)]
    pub cover_date: Option<NaiveDate>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Metron REST API，每次請求之間至少間隔 `min_interval`
pub struct MetronClient {
    client: Client,
    base_url: String,
    credentials: MetronCredentials,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl MetronClient {
    pub fn new(
        base_url: &str,
        credentials: MetronCredentials,
        min_interval: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<T> {
        self.throttle().await;

        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header("Accept", "application/json")
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|e| map_send_error(e, context))?;

        let response = ensure_success(response, context).await?;
        Ok(response.json().await?)
    }

    pub async fn list(&self, resource: &str, page: u32) -> Result<Page<serde_json::Value>> {
        self.get_json(
            &format!("{}/", resource),
            &[("page", page.to_string())],
            &format!("list {} page {}", resource, page),
        )
        .await
    }

    pub async fn detail(&self, resource: &str, id: u64) -> Result<serde_json::Value> {
        self.get_json(
            &format!("{}/{}/", resource, id),
            &[],
            &format!("{} {}", resource, id),
        )
        .await
    }

    pub async fn character(&self, id: u64) -> Result<MetronCharacter> {
        self.get_json(&format!("character/{}/", id), &[], &format!("character {}", id))
            .await
    }

    /// 依封面日期排序後的第一本
    pub async fn first_issue_for_character(&self, id: u64) -> Result<Option<MetronIssue>> {
        let page: Page<MetronIssue> = self
            .get_json(
                "issue/",
                &[
                    ("characters", id.to_string()),
                    ("ordering", "cover_date".to_string()),
                ],
                &format!("issues for character {}", id),
            )
            .await?;
        Ok(page.results.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::HarvestError;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> MetronClient {
        throttled_client(server, Duration::ZERO)
    }

    fn throttled_client(server: &MockServer, min_interval: Duration) -> MetronClient {
        MetronClient::new(
            &server.url("/api"),
            MetronCredentials {
                username: "reader".into(),
                password: "pw".into(),
            },
            min_interval,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_page() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/character/")
                .query_param("page", "2")
                .header_exists("authorization");
            then.status(200).json_body(serde_json::json!({
                "count": 3,
                "next": null,
                "previous": "https://metron.cloud/api/character/?page=1",
                "results": [{"id": 7, "name": "Hawkgirl", "modified": "2024-01-01T00:00:00Z"}]
            }));
        });

        let page = client(&server).list("character", 2).await.unwrap();

        mock.assert();
        assert_eq!(page.count, 3);
        assert!(page.next.is_none());
        assert_eq!(page.results[0]["id"], 7);
    }

    #[tokio::test]
    async fn test_character_tolerates_missing_fields() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/character/12/");
            then.status(200).json_body(serde_json::json!({"id": 12, "name": "Rorschach"}));
        });

        let character = client(&server).character(12).await.unwrap();
        assert_eq!(character.name, "Rorschach");
        assert!(character.teams.is_empty());
        assert!(character.desc.is_empty());
    }

    #[tokio::test]
    async fn test_first_issue_for_character() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/issue/")
                .query_param("characters", "5")
                .query_param("ordering", "cover_date");
            then.status(200).json_body(serde_json::json!({
                "count": 2,
                "next": null,
                "results": [
                    {"id": 1, "series": {"name": "Detective Comics"}, "number": "27", "cover_date": "1939-05-01", "image": "https://img/27.jpg"},
                    {"id": 2, "series": {"name": "Batman"}, "number": "1", "cover_date": "1940-04-01"}
                ]
            }));
        });

        let issue = client(&server).first_issue_for_character(5).await.unwrap().unwrap();
        assert_eq!(issue.series.name, "Detective Comics");
        assert_eq!(issue.number, "27");
        assert_eq!(issue.cover_date, NaiveDate::from_ymd_opt(1939, 5, 1));
    }

    #[tokio::test]
    async fn test_unauthorized_is_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/character/1/");
            then.status(401).body("{\"detail\":\"Invalid username/password.\"}");
        });

        let err = client(&server).detail("character", 1).await.unwrap_err();
        assert!(matches!(err, HarvestError::ApiError { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_requests_are_spaced_by_min_interval() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/series/3/");
            then.status(200).json_body(serde_json::json!({"id": 3, "name": "Sandman"}));
        });
        let client = throttled_client(&server, Duration::from_millis(150));

        let started = Instant::now();
        for _ in 0..3 {
            client.detail("series", 3).await.unwrap();
        }

        mock.assert_hits(3);
        // 第一次不等待，之後各等一個間隔
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_issue_page_without_results() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/issue/");
            then.status(200).json_body(serde_json::json!({"count": 0, "next": null}));
        });

        let issue = client(&server).first_issue_for_character(99).await.unwrap();
        assert!(issue.is_none());
    }
}
