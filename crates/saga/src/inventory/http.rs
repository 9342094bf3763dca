//! HTTP transport for the grocery service's lot ("transaction") endpoints.
//!
//! Responses are wrapped in an envelope `{ "body": ..., "errorMessage": "..." }`.
//! A non-empty `errorMessage` is a business rejection even when the HTTP
//! status is a success.

use std::time::Duration;

use async_trait::async_trait;
use common::{AuthContext, ItemId, LotId};
use domain::{InventoryLot, LotLink};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::InventoryClient;
use crate::error::InventoryError;

/// Header carrying a pre-validated user identifier.
pub const USER_HEADER: &str = "iv-user";

/// Connection settings for [`HttpInventoryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpInventoryConfig {
    /// Service root, e.g. `http://grocery:8080`.
    pub base_url: String,
    /// Per-request timeout covering connect, send and body read.
    pub timeout: Duration,
}

impl HttpInventoryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    body: Option<serde_json::Value>,
    #[serde(default)]
    error_message: Option<String>,
}

/// [`InventoryClient`] speaking HTTP to the grocery service.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    pub fn new(config: HttpInventoryConfig) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InventoryError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lot_url(&self, item_id: ItemId, lot_id: LotId) -> String {
        format!("{}/api/item/{}/transaction/{}", self.base_url, item_id, lot_id)
    }

    fn lots_url(&self, item_id: ItemId) -> String {
        format!("{}/api/item/{}/transaction", self.base_url, item_id)
    }

    fn authorize(request: RequestBuilder, auth: &AuthContext) -> RequestBuilder {
        match auth {
            AuthContext::Bearer(token) => request.bearer_auth(token),
            AuthContext::User(user) => request.header(USER_HEADER, user),
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        link: LotLink,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        let response = Self::authorize(request, auth)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response, link).await
    }
}

fn transport_error(err: reqwest::Error) -> InventoryError {
    if err.is_timeout() {
        InventoryError::Network(format!("request timed out: {err}"))
    } else {
        InventoryError::Network(err.to_string())
    }
}

async fn decode(response: Response, link: LotLink) -> Result<InventoryLot, InventoryError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(InventoryError::NotFound(link));
    }
    if status.is_server_error() {
        return Err(InventoryError::Network(format!(
            "inventory service returned HTTP {status}"
        )));
    }

    let bytes = response.bytes().await.map_err(transport_error)?;
    let envelope: Envelope = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(_) if status.is_client_error() => {
            return Err(InventoryError::RemoteRejected(format!("HTTP {status}")));
        }
        Err(e) => return Err(InventoryError::Decode(e.to_string())),
    };

    if let Some(message) = envelope.error_message.filter(|m| !m.is_empty()) {
        return Err(InventoryError::RemoteRejected(message));
    }
    if status.is_client_error() {
        return Err(InventoryError::RemoteRejected(format!("HTTP {status}")));
    }

    let body = match envelope.body {
        None | Some(serde_json::Value::Null) => return Err(InventoryError::NotFound(link)),
        Some(body) => body,
    };
    let lot: InventoryLot =
        serde_json::from_value(body).map_err(|e| InventoryError::Decode(e.to_string()))?;

    // The service answers a missing lot with a zero-valued body.
    if lot.id.is_nil() {
        return Err(InventoryError::NotFound(link));
    }
    Ok(lot)
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    #[tracing::instrument(skip_all, fields(%item_id, %lot_id))]
    async fn get_lot_detail(
        &self,
        item_id: ItemId,
        lot_id: LotId,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        let request = self.client.get(self.lot_url(item_id, lot_id));
        self.send(request, LotLink::new(item_id, lot_id), auth).await
    }

    #[tracing::instrument(skip_all, fields(%item_id, lot_id = %lot.id, available = lot.available_quantity))]
    async fn apply_lot(
        &self,
        item_id: ItemId,
        lot: &InventoryLot,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        let request = self.client.patch(self.lots_url(item_id)).json(lot);
        self.send(request, LotLink::new(item_id, lot.id), auth).await
    }
}
