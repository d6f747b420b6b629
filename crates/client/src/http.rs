//! Thin HTTP client over the sync/experiment/attachment/signature surface.
//! Retries network errors with exponential backoff; a 409 is surfaced as
//! [`ClientError::Conflict`] rather than retried, since a stale base needs
//! the caller to re-fetch the effective entry, not a resend.

use std::time::Duration;

use tokio::sync::RwLock;

use crate::error::ClientError;
use crate::types::OutboxOperation;
use crate::wire::{ConflictDto, ConflictsPageDto, DownloadDto, EffectiveViewDto, HistoryDto, SessionDto, SyncPageDto};

const MAX_RETRIES: u32 = 3;

pub struct SyncClient {
    http: reqwest::Client,
    base_url: String,
    access_token: RwLock<Option<String>>,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), access_token: RwLock::new(None) }
    }

    pub fn with_token(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: RwLock::new(Some(access_token.into())),
        }
    }

    pub async fn set_access_token(&self, token: String) {
        *self.access_token.write().await = Some(token);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bearer(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token.read().await.as_ref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `GET /healthz`. Never authenticated; any reachable response (even a
    /// non-2xx one) counts as "online" — only a transport failure means
    /// offline.
    pub async fn check_connectivity(&self) -> bool {
        self.http.get(self.url("/healthz")).timeout(Duration::from_secs(5)).send().await.is_ok()
    }

    pub async fn login(&self, email: &str, password: &str, device_name: &str) -> Result<SessionDto, ClientError> {
        let body = serde_json::json!({ "email": email, "password": password, "deviceName": device_name });
        let session: SessionDto = self.send_json(self.http.post(self.url("/v1/auth/login")).json(&body)).await?;
        self.set_access_token(session.access_token.clone()).await;
        Ok(session)
    }

    pub async fn refresh(&self, refresh_token: &str, device_name: &str) -> Result<SessionDto, ClientError> {
        let body = serde_json::json!({ "refreshToken": refresh_token, "deviceName": device_name });
        let session: SessionDto = self.send_json(self.http.post(self.url("/v1/auth/refresh")).json(&body)).await?;
        self.set_access_token(session.access_token.clone()).await;
        Ok(session)
    }

    /// `GET /v1/sync/pull?cursor=N&limit=L`.
    pub async fn pull(&self, cursor: i64, limit: i64) -> Result<SyncPageDto, ClientError> {
        let req = self.bearer(self.http.get(self.url("/v1/sync/pull"))).await;
        let req = req.query(&[("cursor", cursor), ("limit", limit)]);
        self.send_json(req).await
    }

    /// `GET /v1/sync/conflicts?limit=L`.
    pub async fn list_conflicts(&self, limit: i64) -> Result<Vec<ConflictDto>, ClientError> {
        let req = self.bearer(self.http.get(self.url("/v1/sync/conflicts"))).await;
        let req = req.query(&[("limit", limit)]);
        let page: ConflictsPageDto = self.send_json(req).await?;
        Ok(page.conflicts)
    }

    pub async fn get_effective_view(&self, experiment_id: &str) -> Result<EffectiveViewDto, ClientError> {
        let req = self.bearer(self.http.get(self.url(&format!("/v1/experiments/{experiment_id}")))).await;
        self.send_json(req).await
    }

    pub async fn get_history(&self, experiment_id: &str) -> Result<HistoryDto, ClientError> {
        let req = self.bearer(self.http.get(self.url(&format!("/v1/experiments/{experiment_id}/history")))).await;
        self.send_json(req).await
    }

    pub async fn get_download_url(&self, attachment_id: &str) -> Result<DownloadDto, ClientError> {
        let req = self
            .bearer(self.http.get(self.url(&format!("/v1/attachments/{attachment_id}/download"))))
            .await;
        self.send_json(req).await
    }

    /// Replay a single queued write against its endpoint, retrying network
    /// failures with exponential backoff. A server-reported conflict (409)
    /// is returned as `Err(ClientError::Conflict(_))` on the first attempt;
    /// it is the caller's job to decide whether to surface it or drop the
    /// queued operation.
    pub async fn submit(&self, operation: &OutboxOperation) -> Result<serde_json::Value, ClientError> {
        let mut delay = Duration::from_millis(500);
        let mut attempt = 0;
        loop {
            match self.submit_once(operation).await {
                Ok(value) => return Ok(value),
                Err(ClientError::Conflict(artifact)) => return Err(ClientError::Conflict(artifact)),
                Err(err) if attempt >= MAX_RETRIES => return Err(err),
                Err(_) => {
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    async fn submit_once(&self, operation: &OutboxOperation) -> Result<serde_json::Value, ClientError> {
        let (path, body) = match operation {
            OutboxOperation::CreateExperiment { title, original_body } => (
                "/v1/experiments".to_string(),
                serde_json::json!({ "title": title, "originalBody": original_body }),
            ),
            OutboxOperation::AddAddendum { experiment_id, base_entry_id, body } => (
                format!("/v1/experiments/{experiment_id}/addendums"),
                serde_json::json!({ "baseEntryId": base_entry_id.to_string(), "body": body }),
            ),
            OutboxOperation::CompleteExperiment { experiment_id } => {
                (format!("/v1/experiments/{experiment_id}/complete"), serde_json::json!({}))
            }
            OutboxOperation::InitiateAttachment { experiment_id, object_key, size_bytes, mime_type } => (
                "/v1/attachments/initiate".to_string(),
                serde_json::json!({
                    "experimentId": experiment_id.to_string(),
                    "objectKey": object_key,
                    "sizeBytes": size_bytes,
                    "mimeType": mime_type,
                }),
            ),
            OutboxOperation::CompleteAttachment { attachment_id, checksum, size_bytes } => (
                format!("/v1/attachments/{attachment_id}/complete"),
                serde_json::json!({ "checksum": checksum, "sizeBytes": size_bytes }),
            ),
            OutboxOperation::Sign { experiment_id, password, signature_type, meaning } => (
                "/v1/signatures".to_string(),
                serde_json::json!({
                    "experimentId": experiment_id.to_string(),
                    "password": password,
                    "signatureType": signature_type,
                    "meaning": meaning,
                }),
            ),
        };

        let req = self.http.post(self.url(&path)).json(&body);
        let req = self.bearer(req).await;

        let response = req.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::CONFLICT {
            let artifact: ConflictDto =
                response.json().await.map_err(|e| ClientError::Parse(e.to_string()))?;
            return Err(ClientError::Conflict(artifact));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status: status.as_u16(), message });
        }

        response.json().await.map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status: status.as_u16(), message });
        }
        response.json().await.map_err(|e| ClientError::Parse(e.to_string()))
    }
}
