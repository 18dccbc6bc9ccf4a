//! Request layer for the remote agent: read-only dry-runs and state-mutating messages.

use crate::{
    error::RemoteError,
    protocol::{RawResponse, ResultEnvelope, Tag},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Wire-level access to the computation platform.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Simulated call. Must not mutate the target process.
    async fn dry_run(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError>;

    /// Signed message whose result is read back once processed.
    async fn message(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError>;
}

/// HTTP transport talking to a compute unit (reads) and a message relay (writes).
#[derive(Clone)]
pub struct HttpTransport {
    cu_url: String,
    relay_url: String,
    signer: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct DryRunRequest<'a> {
    #[serde(rename = "Id")]
    id: &'a str,
    #[serde(rename = "Target")]
    target: &'a str,
    #[serde(rename = "Owner")]
    owner: &'a str,
    #[serde(rename = "Anchor")]
    anchor: &'a str,
    #[serde(rename = "Data")]
    data: &'a str,
    #[serde(rename = "Tags")]
    tags: &'a [Tag],
}

#[derive(Debug, Serialize)]
struct RelayMessageRequest<'a> {
    process: &'a str,
    tags: &'a [Tag],
    signer: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RelayMessageResponse {
    id: String,
}

impl HttpTransport {
    pub fn new(cu_url: String, relay_url: String, signer: Option<String>) -> Self {
        Self {
            cu_url: cu_url.trim_end_matches('/').to_string(),
            relay_url: relay_url.trim_end_matches('/').to_string(),
            signer,
            http: reqwest::Client::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        let resp = self.http.get(url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(RemoteError::network(format!("HTTP {}: {}", status, error)));
        }

        Ok(resp.json().await?)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let resp = self.http.post(url).json(body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(RemoteError::network(format!("HTTP {}: {}", status, error)));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dry_run(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError> {
        let url = format!(
            "{}/dry-run?process-id={}",
            self.cu_url,
            urlencoding::encode(process_id)
        );
        let owner = self.signer.as_deref().unwrap_or("1234");
        let body = DryRunRequest {
            id: "1234",
            target: process_id,
            owner,
            anchor: "0",
            data: "1234",
            tags,
        };
        let envelope: ResultEnvelope = self.post(&url, &body).await?;
        Ok(envelope.into())
    }

    async fn message(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError> {
        let url = format!("{}/message", self.relay_url);
        let body = RelayMessageRequest {
            process: process_id,
            tags,
            signer: self.signer.as_deref(),
        };
        let sent: RelayMessageResponse = self.post(&url, &body).await?;
        debug!(process_id, message_id = %sent.id, "message accepted by relay");

        let result_url = format!(
            "{}/result/{}?process-id={}",
            self.cu_url,
            urlencoding::encode(&sent.id),
            urlencoding::encode(process_id)
        );
        let envelope: ResultEnvelope = self.get(&result_url).await?;
        Ok(envelope.into())
    }
}

/// Agent client. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct AgentClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Read-only dry-run. Free to retry.
    pub async fn query(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError> {
        debug!(process_id, action = action_of(tags), "query");
        let call = self.transport.dry_run(process_id, tags);
        self.finish(process_id, call).await
    }

    /// State-mutating message. Calls are not serialised here; callers that
    /// need an order must await each one before issuing the next.
    pub async fn send(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError> {
        debug!(process_id, action = action_of(tags), "send");
        let call = self.transport.message(process_id, tags);
        self.finish(process_id, call).await
    }

    async fn finish(
        &self,
        process_id: &str,
        call: impl std::future::Future<Output = Result<RawResponse, RemoteError>>,
    ) -> Result<RawResponse, RemoteError> {
        let raw = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                RemoteError::timeout(format!(
                    "{} did not answer within {:?}",
                    process_id, self.timeout
                ))
            })??;

        match &raw.error {
            Some(error) => Err(RemoteError::rejected(error.clone())),
            None => Ok(raw),
        }
    }
}

fn action_of(tags: &[Tag]) -> &str {
    tags.iter()
        .find(|t| t.name == "Action")
        .map(|t| t.value.as_str())
        .unwrap_or("?")
}
