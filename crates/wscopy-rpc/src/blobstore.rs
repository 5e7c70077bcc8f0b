//! Blob store (Shock) client.
//!
//! # Design
//! - Downloads stream chunk by chunk into the staging file; the file is
//!   truncated at the start of each attempt so a retry never appends.
//! - Uploads reopen the staged file per attempt and send it as the body.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::{Body, RequestBuilder, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;
use wscopy_core::{BlobNode, BlobStore, ServiceError, ServiceResult};

use crate::transport::{Transport, request_error, status_error};

const SERVICE: &str = "Shock";
const MD5_KEY: &str = "md5";

#[derive(Deserialize)]
struct NodeEnvelope {
    #[serde(default)]
    data: Option<RawNode>,
    #[serde(default)]
    error: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    file: RawFile,
}

#[derive(Deserialize)]
struct RawFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    checksum: BTreeMap<String, String>,
}

impl From<RawNode> for BlobNode {
    fn from(raw: RawNode) -> Self {
        let RawNode { id, mut file } = raw;
        Self {
            id,
            filename: file.name,
            size: file.size,
            md5: file.checksum.remove(MD5_KEY),
        }
    }
}

/// REST client for the blob store.
#[derive(Clone)]
pub struct ShockClient {
    endpoint: String,
    base: Url,
    token: Option<String>,
    transport: Transport,
}

impl ShockClient {
    /// Build a client for the blob store at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the parse failure when `endpoint` is not an absolute URL that
    /// can carry path segments.
    pub fn new(
        endpoint: &str,
        token: Option<String>,
        transport: Transport,
    ) -> Result<Self, url::ParseError> {
        let base = Url::parse(endpoint)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self {
            endpoint: endpoint.to_string(),
            base,
            token,
            transport,
        })
    }

    fn node_url(&self, id: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("node");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("OAuth {token}")),
            None => request,
        }
    }

    async fn node_once(&self, id: &str) -> ServiceResult<BlobNode> {
        let method = "get_node";
        let response = self
            .authorize(self.transport.http().get(self.node_url(Some(id))))
            .send()
            .await
            .map_err(|error| request_error(SERVICE, method, &error))?;
        decode_node(method, response).await
    }

    async fn download_once(&self, id: &str, destination: &Path) -> ServiceResult<u64> {
        let method = "download_node";
        let mut url = self.node_url(Some(id));
        url.set_query(Some("download"));
        let response = self
            .authorize(self.transport.http().get(url))
            .send()
            .await
            .map_err(|error| request_error(SERVICE, method, &error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(status_error(SERVICE, method, status, &body));
        }

        let io_error = |source: std::io::Error| ServiceError::Io {
            operation: "write_download",
            path: destination.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(io_error)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| request_error(SERVICE, method, &error))?;
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        Ok(written)
    }

    async fn upload_once(&self, filename: &str, source: &Path) -> ServiceResult<BlobNode> {
        let method = "create_node";
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|error| ServiceError::Io {
                operation: "open_upload",
                path: source.to_path_buf(),
                source: error,
            })?;
        let mut url = self.node_url(None);
        url.query_pairs_mut().append_pair("filename", filename);
        let response = self
            .authorize(self.transport.http().post(url))
            .body(Body::from(file))
            .send()
            .await
            .map_err(|error| request_error(SERVICE, method, &error))?;
        decode_node(method, response).await
    }
}

#[async_trait]
impl BlobStore for ShockClient {
    fn url(&self) -> &str {
        &self.endpoint
    }

    async fn node(&self, id: &str) -> ServiceResult<BlobNode> {
        self.transport
            .with_retry(SERVICE, "get_node", move || self.node_once(id))
            .await
    }

    async fn download(&self, id: &str, destination: &Path) -> ServiceResult<u64> {
        let written = self
            .transport
            .with_retry(SERVICE, "download_node", move || {
                self.download_once(id, destination)
            })
            .await?;
        debug!(node = id, bytes = written, path = %destination.display(), "blob downloaded");
        Ok(written)
    }

    async fn upload(&self, filename: &str, source: &Path) -> ServiceResult<BlobNode> {
        let node = self
            .transport
            .with_retry(SERVICE, "create_node", move || {
                self.upload_once(filename, source)
            })
            .await?;
        debug!(node = %node.id, bytes = node.size, filename, "blob uploaded");
        Ok(node)
    }
}

async fn decode_node(method: &str, response: Response) -> ServiceResult<BlobNode> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|error| request_error(SERVICE, method, &error))?;
    match serde_json::from_slice::<NodeEnvelope>(&body) {
        Ok(NodeEnvelope {
            data: Some(node), ..
        }) if status.is_success() => Ok(node.into()),
        _ if !status.is_success() => Err(status_error(SERVICE, method, status, &body)),
        Ok(NodeEnvelope { error, .. }) => Err(ServiceError::rejected(
            SERVICE,
            method,
            error
                .map(|messages| messages.join("; "))
                .unwrap_or_else(|| "response carries no node".to_string()),
        )),
        Err(error) => Err(ServiceError::decode(SERVICE, method, error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Client;

    use super::*;
    use crate::retry::RetryPolicy;

    fn client(endpoint: &str) -> Result<ShockClient, url::ParseError> {
        ShockClient::new(
            endpoint,
            Some("token".into()),
            Transport::new(Client::new(), RetryPolicy::none()),
        )
    }

    #[test]
    fn node_urls_extend_the_base_path() -> anyhow::Result<()> {
        let shock = client("https://ci.example.org/services/shock-api")?;
        assert_eq!(
            shock.node_url(Some("abc")).as_str(),
            "https://ci.example.org/services/shock-api/node/abc"
        );
        let trailing = client("https://ci.example.org/services/shock-api/")?;
        assert_eq!(
            trailing.node_url(None).as_str(),
            "https://ci.example.org/services/shock-api/node"
        );
        assert_eq!(trailing.url(), "https://ci.example.org/services/shock-api/");
        Ok(())
    }

    #[test]
    fn raw_node_maps_checksum() -> anyhow::Result<()> {
        let raw: RawNode = serde_json::from_value(serde_json::json!({
            "id": "n1",
            "file": {"name": "reads.fq", "size": 12, "checksum": {"md5": "abc"}}
        }))?;
        let node = BlobNode::from(raw);
        assert_eq!(node.md5.as_deref(), Some("abc"));
        assert_eq!(node.size, 12);
        Ok(())
    }
}
