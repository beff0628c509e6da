//! HTTP adapter for the release-hosting API.
//!
//! Speaks a GitHub-style releases REST surface:
//! `GET  {base}/releases/tags/{tag}`
//! `POST {base}/releases`
//! `DELETE {base}/releases/{id}`
//! `POST {base}/releases/{id}/assets?name={filename}`
//!
//! The bearer token is passed through opaquely; the core never inspects it.

use async_trait::async_trait;
use forge_core::ids::ReleaseId;
use forge_core::ports::ReleaseHost;
use forge_core::release::ReleaseRecord;
use forge_core::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct HttpReleaseHost {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    prerelease: bool,
}

#[derive(Debug, Serialize)]
struct CreateReleaseRequest<'a> {
    tag_name: &'a str,
    name: &'a str,
    prerelease: bool,
}

impl HttpReleaseHost {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }

    /// Transport errors and 5xx responses are worth retrying; other rejected
    /// requests are not.
    fn transport_err(e: reqwest::Error) -> Error {
        Error::Publish {
            message: format!("request failed: {e}"),
            retryable: true,
        }
    }

    fn status_err(context: &str, status: StatusCode) -> Error {
        Error::Publish {
            message: format!("{context}: unexpected status {status}"),
            retryable: status.is_server_error(),
        }
    }
}

#[async_trait]
impl ReleaseHost for HttpReleaseHost {
    async fn find_release(&self, tag: &str) -> Result<Option<ReleaseRecord>> {
        let res = self
            .request(reqwest::Method::GET, &format!("/releases/tags/{tag}"))
            .send()
            .await
            .map_err(Self::transport_err)?;

        match res.status() {
            StatusCode::OK => {
                let body: ReleaseResponse = res.json().await.map_err(Self::transport_err)?;
                debug!(tag, id = body.id, "Found existing release");
                Ok(Some(ReleaseRecord {
                    id: ReleaseId::new(body.id.to_string()),
                    tag: body.tag_name,
                    title: body.name.unwrap_or_default(),
                    prerelease: body.prerelease,
                }))
            }
            // First publish: no release under the tag yet.
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Self::status_err("find release", status)),
        }
    }

    async fn delete_release(&self, id: &ReleaseId) -> Result<()> {
        let res = self
            .request(reqwest::Method::DELETE, &format!("/releases/{id}"))
            .send()
            .await
            .map_err(Self::transport_err)?;

        match res.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            // Already gone; deletion is idempotent.
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(Self::status_err("delete release", status)),
        }
    }

    async fn create_release(
        &self,
        tag: &str,
        title: &str,
        prerelease: bool,
    ) -> Result<ReleaseId> {
        let payload = CreateReleaseRequest {
            tag_name: tag,
            name: title,
            prerelease,
        };

        let res = self
            .request(reqwest::Method::POST, "/releases")
            .json(&payload)
            .send()
            .await
            .map_err(Self::transport_err)?;

        match res.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let body: ReleaseResponse = res.json().await.map_err(Self::transport_err)?;
                debug!(tag, id = body.id, "Release created");
                Ok(ReleaseId::new(body.id.to_string()))
            }
            status => Err(Self::status_err("create release", status)),
        }
    }

    async fn upload_asset(&self, id: &ReleaseId, filename: &str, bytes: Vec<u8>) -> Result<()> {
        let res = self
            .request(reqwest::Method::POST, &format!("/releases/{id}/assets"))
            .query(&[("name", filename)])
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(Self::transport_err)?;

        match res.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            status => Err(Self::status_err("upload asset", status)),
        }
    }
}
