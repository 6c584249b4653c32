//! HTTP implementation of the accrual service client.

use std::time::Duration;

use async_trait::async_trait;
use common::OrderNumber;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue, RETRY_AFTER};

use crate::client::{AccrualClient, AccrualResponse, Outcome};
use crate::error::{AccrualError, Result};

/// Accrual service client speaking `GET <base>/api/orders/<number>`.
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccrualClient {
    /// Request timeout used when none is configured.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a client for the service at `base_url`.
    ///
    /// The address may omit its scheme (`localhost:8080`), in which case
    /// `http://` is assumed. Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// Returns the normalized service address.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, number: OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    #[tracing::instrument(skip(self))]
    async fn query(&self, number: OrderNumber) -> Result<Outcome> {
        let response = self.client.get(self.order_url(number)).send().await?;
        classify(response).await
    }
}

async fn classify(response: reqwest::Response) -> Result<Outcome> {
    match response.status() {
        StatusCode::NO_CONTENT => Ok(Outcome::NotFound),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response.headers().get(RETRY_AFTER).and_then(parse_retry_after);
            Ok(Outcome::Throttled { retry_after })
        }
        StatusCode::OK => {
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if !is_json(&content_type) {
                return Err(AccrualError::UnexpectedContentType(content_type));
            }

            let body = response.bytes().await?;
            let payload: AccrualResponse = serde_json::from_slice(&body)?;
            Ok(Outcome::Ready(payload))
        }
        status => Err(AccrualError::UnexpectedStatus(status.as_u16())),
    }
}

/// Compares the media type, ignoring parameters and case.
fn is_json(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    media_type.eq_ignore_ascii_case("application/json")
}

/// Parses a `Retry-After` value given in delta-seconds.
///
/// Other forms (HTTP dates, garbage) are logged and ignored.
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Option<Duration> {
    let parsed = value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    if parsed.is_none() {
        tracing::warn!(retry_after = ?value, "ignoring malformed Retry-After header");
    }
    parsed
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AccrualError::InvalidBaseUrl(raw.to_string()));
    }

    let base = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    reqwest::Url::parse(&base).map_err(|_| AccrualError::InvalidBaseUrl(raw.to_string()))?;

    Ok(base)
}
