use std::time::Duration;

use reqwest::{Client, Response};
use url::Url;

use crate::db::SCHEMA_VERSION;

use super::error::{SyncError, SyncResult};
use super::protocol::{PullResponse, PushRequest, SyncProtocol};

/// The network side of the sync engine, selected once at construction.
pub enum SyncChannel {
    Watermelon(WatermelonClient),
}

impl SyncChannel {
    pub fn connect(protocol: SyncProtocol, api_url: &str, timeout: Duration) -> SyncResult<Self> {
        match protocol {
            SyncProtocol::Watermelon => Ok(SyncChannel::Watermelon(WatermelonClient::new(
                api_url, timeout,
            )?)),
        }
    }

    pub fn protocol(&self) -> SyncProtocol {
        match self {
            SyncChannel::Watermelon(_) => SyncProtocol::Watermelon,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            SyncChannel::Watermelon(client) => client.base_url.as_str(),
        }
    }

    pub async fn pull(&self, token: &str, last_pulled_at: Option<i64>) -> SyncResult<PullResponse> {
        match self {
            SyncChannel::Watermelon(client) => client.pull(token, last_pulled_at).await,
        }
    }

    pub async fn push(&self, token: &str, last_pulled_at: i64, request: &PushRequest) -> SyncResult<()> {
        match self {
            SyncChannel::Watermelon(client) => client.push(token, last_pulled_at, request).await,
        }
    }
}

pub struct WatermelonClient {
    client: Client,
    base_url: String,
}

impl WatermelonClient {
    pub fn new(api_url: &str, timeout: Duration) -> SyncResult<Self> {
        let parsed =
            Url::parse(api_url).map_err(|e| SyncError::InvalidEndpoint(format!("{}: {}", api_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::InvalidEndpoint(api_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("cloudy-reader/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn pull(&self, token: &str, last_pulled_at: Option<i64>) -> SyncResult<PullResponse> {
        let mut query = vec![("schemaVersion", SCHEMA_VERSION.to_string())];
        if let Some(cursor) = last_pulled_at {
            query.push(("lastPulledAt", cursor.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/sync/pull", self.base_url))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;

        let body = check_status(response).await?.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| SyncError::Protocol(format!("invalid pull response: {}", e)))
    }

    async fn push(&self, token: &str, last_pulled_at: i64, request: &PushRequest) -> SyncResult<()> {
        let response = self
            .client
            .post(format!("{}/sync/push", self.base_url))
            .bearer_auth(token)
            .query(&[("lastPulledAt", last_pulled_at.to_string())])
            .json(request)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Status {
        status: status.as_u16(),
        body,
    })
}
