//! reqwest-backed [`RemoteApi`]

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Ack, FilterResponse, PositionRecord, PositionsResponse, RemoteApi, ViewFilter};
use crate::auth::{TokenSource, bearer_token};
use crate::error::{Result, SyncError};
use crate::types::ViewType;

pub struct HttpApi {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn filter_path(&self, device_id: &str, view: ViewType) -> String {
        format!("{}/filters/{}/{}", self.base_url, device_id, view.filter_segment())
    }

    fn positions_path(&self, device_id: &str, view: ViewType) -> String {
        format!(
            "{}/filters/{}/sensor-positions/{}",
            self.base_url,
            device_id,
            view.positions_segment()
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        // Unauthenticated requests are allowed through; the server decides
        match bearer_token(self.tokens.as_ref()) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "GET");
        let response = self.request(Method::GET, url).send().await?;
        decode(check_status(response).await?).await
    }

    async fn send_json<B: Serialize + ?Sized>(&self, method: Method, url: &str, body: &B) -> Result<()> {
        debug!(url, %method, "Sending");
        let response = self.request(method, url).json(body).send().await?;
        let ack: Ack = decode(check_status(response).await?).await?;
        if !ack.success {
            warn!(url, reason = %ack.reason(), "Server rejected write");
            return Err(SyncError::Server {
                status: StatusCode::OK.as_u16(),
                message: ack.reason(),
            });
        }
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Ack>(&body)
        .map(|ack| ack.reason())
        .unwrap_or(body);
    Err(SyncError::Server {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn get_filter(&self, device_id: &str, view: ViewType) -> Result<FilterResponse> {
        self.get_json(&self.filter_path(device_id, view)).await
    }

    async fn save_filter(&self, device_id: &str, view: ViewType, filter: &ViewFilter) -> Result<()> {
        self.send_json(Method::POST, &self.filter_path(device_id, view), filter)
            .await
    }

    async fn get_positions(&self, device_id: &str, view: ViewType) -> Result<PositionsResponse> {
        self.get_json(&self.positions_path(device_id, view)).await
    }

    async fn save_positions(&self, device_id: &str, view: ViewType, positions: &[PositionRecord]) -> Result<()> {
        let body = json!({ "positions": positions });
        self.send_json(Method::POST, &self.positions_path(device_id, view), &body)
            .await
    }

    async fn patch_global(&self, field: &str, value: Value) -> Result<()> {
        let url = format!("{}/filters/global/{}", self.base_url, field);
        self.send_json(Method::PATCH, &url, &json!({ "value": value }))
            .await
    }
}
