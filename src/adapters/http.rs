use crate::utils::error::{truncate_message, HarvestError, Result};
use reqwest::{Response, StatusCode};

pub const USER_AGENT: &str = concat!("comic-harvest/", env!("CARGO_PKG_VERSION"));

/// reqwest 錯誤轉換：逾時獨立成可重試的 `Timeout`
pub fn map_send_error(error: reqwest::Error, context: &str) -> HarvestError {
    if error.is_timeout() {
        HarvestError::Timeout {
            message: format!("{}: {}", context, error),
        }
    } else {
        HarvestError::HttpError(error)
    }
}

/// 429 → `RateLimited`，其他非 2xx → `ApiError`（含截斷後的回應內容）
pub async fn ensure_success(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        format!("{} {}", context, status)
    } else {
        format!("{}: {}", context, truncate_message(body.trim(), 200))
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(HarvestError::RateLimited { message });
    }
    Err(HarvestError::ApiError {
        status: status.as_u16(),
        message,
    })
}
