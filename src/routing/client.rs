//! Shard Client
//!
//! Speaks the storage node protocol over HTTP and sorts every failure into one
//! of two buckets: the node could not be reached (`RemoteUnreachable`), or it
//! was reached and said no (`RemoteRejected`, body passed through as-is).
//! Nothing is retried.

use reqwest::{Method, Response};
use serde_json::Value;
use std::time::Duration;

use super::error::RouterError;
use crate::storage::protocol::{ENDPOINT_KV, KeyValueRecord};
use crate::topology::types::Node;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct NodeClient {
    http_client: reqwest::Client,
}

impl NodeClient {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http_client))
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    pub async fn get(&self, node: &Node, key: &str) -> Result<KeyValueRecord, RouterError> {
        let response = self.send(node, Method::GET, key_url(node, key, None), None).await?;
        read_record(node, response).await
    }

    pub async fn put(
        &self,
        node: &Node,
        key: &str,
        value: &Value,
        expected_version: Option<u64>,
    ) -> Result<KeyValueRecord, RouterError> {
        let url = key_url(node, key, expected_version);
        let response = self.send(node, Method::PUT, url, Some(value)).await?;
        read_record(node, response).await
    }

    pub async fn patch(
        &self,
        node: &Node,
        key: &str,
        delta: &Value,
        expected_version: Option<u64>,
    ) -> Result<KeyValueRecord, RouterError> {
        let url = key_url(node, key, expected_version);
        let response = self.send(node, Method::PATCH, url, Some(delta)).await?;
        read_record(node, response).await
    }

    pub async fn list_keys(&self, node: &Node) -> Result<Vec<String>, RouterError> {
        let response = self.send(node, Method::GET, node.url(ENDPOINT_KV), None).await?;
        response
            .json::<Vec<String>>()
            .await
            .map_err(|cause| RouterError::InvalidResponse {
                node: node.id.clone(),
                cause,
            })
    }

    async fn send(
        &self,
        node: &Node,
        method: Method,
        url: String,
        body: Option<&Value>,
    ) -> Result<Response, RouterError> {
        tracing::debug!("{} {} -> {}", method, url, node.id);

        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|cause| RouterError::RemoteUnreachable {
                node: node.id.clone(),
                address: node.address.clone(),
                cause,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // An unreadable error body still counts as a rejection; pass on what we have.
        let body = response.text().await.unwrap_or_default();
        Err(RouterError::RemoteRejected {
            node: node.id.clone(),
            status,
            body,
        })
    }
}

fn key_url(node: &Node, key: &str, expected_version: Option<u64>) -> String {
    let mut url = node.url(&format!("{}/{}", ENDPOINT_KV, urlencoding::encode(key)));
    if let Some(version) = expected_version {
        url.push_str(&format!("?ifVersion={}", version));
    }
    url
}

async fn read_record(node: &Node, response: Response) -> Result<KeyValueRecord, RouterError> {
    response
        .json::<KeyValueRecord>()
        .await
        .map_err(|cause| RouterError::InvalidResponse {
            node: node.id.clone(),
            cause,
        })
}
