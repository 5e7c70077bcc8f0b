//! Sample service client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use wscopy_core::{
    DataLink, NewDataLink, ObjectRef, SampleRecord, SampleService, SampleVersion, ServiceResult,
};

use crate::jsonrpc::JsonRpcClient;
use crate::transport::Transport;

const SERVICE: &str = "SampleService";

#[derive(Deserialize)]
struct LinksResult {
    links: Vec<DataLink>,
}

#[derive(Deserialize)]
struct NewLinkResult {
    new_link: DataLink,
}

#[derive(Serialize)]
struct LinkParams<'a> {
    upa: ObjectRef,
    dataid: Option<&'a str>,
    id: &'a str,
    version: u64,
    node: &'a str,
    update: bool,
}

/// JSON-RPC client for the sample service.
#[derive(Clone)]
pub struct SampleClient {
    rpc: JsonRpcClient,
}

impl SampleClient {
    /// Build a client for the sample service at `endpoint`.
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
impl SampleService for SampleClient {
    async fn data_links(&self, upa: ObjectRef) -> ServiceResult<Vec<DataLink>> {
        let result: LinksResult = self
            .rpc
            .call("get_data_links_from_data", &json!({"upa": upa}))
            .await?;
        Ok(result.links)
    }

    async fn sample_via_data(
        &self,
        upa: ObjectRef,
        sample: &SampleVersion,
    ) -> ServiceResult<SampleRecord> {
        let params = json!({"upa": upa, "id": sample.id, "version": sample.version});
        self.rpc.call("get_sample_via_data", &params).await
    }

    async fn create_sample(&self, sample: SampleRecord) -> ServiceResult<SampleVersion> {
        self.rpc
            .call("create_sample", &json!({"sample": sample}))
            .await
    }

    async fn create_data_link(&self, link: NewDataLink) -> ServiceResult<DataLink> {
        let params = LinkParams {
            upa: link.upa,
            dataid: link.dataid.as_deref(),
            id: &link.sample.id,
            version: link.sample.version,
            node: &link.node,
            update: true,
        };
        let result: NewLinkResult = self.rpc.call("create_data_link", &params).await?;
        Ok(result.new_link)
    }
}
