//! Handle service client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wscopy_core::{HandleRecord, HandleRegistry, NewHandle, ServiceError, ServiceResult};

use crate::jsonrpc::JsonRpcClient;
use crate::transport::Transport;

const SERVICE: &str = "AbstractHandle";
const HANDLE_TYPE: &str = "shock";

#[derive(Deserialize)]
struct RawHandle {
    hid: String,
    id: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    remote_md5: Option<String>,
}

#[derive(Serialize)]
struct PersistParams<'a> {
    id: &'a str,
    filename: &'a str,
    #[serde(rename = "type")]
    handle_type: &'static str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_md5: Option<&'a str>,
}

/// JSON-RPC client for the handle service.
#[derive(Clone)]
pub struct HandleClient {
    rpc: JsonRpcClient,
}

impl HandleClient {
    /// Build a client for the handle service at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the parse failure when `endpoint` is not an absolute URL.
    pub fn new(
        endpoint: &str,
        token: Option<String>,
        transport: Transport,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            rpc: JsonRpcClient::new(SERVICE, endpoint, token, transport)?,
        })
    }
}

#[async_trait]
impl HandleRegistry for HandleClient {
    async fn resolve(&self, hid: &str) -> ServiceResult<HandleRecord> {
        let method = "hids_to_handles";
        let handles: Vec<RawHandle> = self.rpc.call(method, &[hid]).await?;
        let handle = handles
            .into_iter()
            .find(|handle| handle.hid == hid)
            .ok_or_else(|| ServiceError::rejected(SERVICE, method, format!("unknown handle {hid}")))?;
        Ok(HandleRecord {
            hid: handle.hid,
            blob_id: handle.id,
            filename: handle.file_name,
            url: handle.url,
            md5: handle.remote_md5,
        })
    }

    async fn persist(&self, handle: NewHandle) -> ServiceResult<String> {
        let params = PersistParams {
            id: &handle.blob_id,
            filename: &handle.filename,
            handle_type: HANDLE_TYPE,
            url: &handle.url,
            remote_md5: handle.md5.as_deref(),
        };
        self.rpc.call("persist_handle", &params).await
    }
}
