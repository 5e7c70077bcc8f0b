//! Workspace service client.
//!
//! # Design
//! - Object info arrives as an 11-element positional tuple; it is decoded into
//!   [`ObjectInfo`] here and nowhere else.
//! - Reference paths are sent joined with `;`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use wscopy_core::{
    ListQuery, ObjectInfo, ObjectRecord, ObjectRef, ProvenanceAction, SaveRequest, ServiceError,
    ServiceResult, TypeString, Workspace,
};

use crate::jsonrpc::JsonRpcClient;
use crate::transport::Transport;

const SERVICE: &str = "Workspace";
const HANDLE_ID_KEY: &str = "handle";

/// `[objid, name, type, save_date, version, saved_by, wsid, workspace, chsum, size, meta]`
type RawInfo = (
    u64,
    String,
    String,
    String,
    u64,
    String,
    u64,
    String,
    String,
    u64,
    Option<BTreeMap<String, String>>,
);

#[derive(Deserialize)]
struct ObjectsData {
    data: Vec<RawObject>,
}

#[derive(Deserialize)]
struct RawObject {
    data: Value,
    info: RawInfo,
    #[serde(default)]
    extracted_ids: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
struct SaveParams<'a> {
    id: u64,
    objects: [ObjectSave<'a>; 1],
}

#[derive(Serialize)]
struct ObjectSave<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    type_string: String,
    data: &'a Value,
    meta: &'a BTreeMap<String, String>,
    provenance: &'a [ProvenanceAction],
}

/// JSON-RPC client for the workspace service.
#[derive(Clone)]
pub struct WorkspaceClient {
    rpc: JsonRpcClient,
}

impl WorkspaceClient {
    /// Build a client for the workspace at `endpoint`.
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
impl Workspace for WorkspaceClient {
    fn url(&self) -> &str {
        self.rpc.endpoint()
    }

    async fn list_objects(&self, query: &ListQuery) -> ServiceResult<Vec<ObjectInfo>> {
        let method = "list_objects";
        let mut params = Map::new();
        params.insert("ids".into(), json!([query.container]));
        params.insert(
            "includeMetadata".into(),
            json!(u8::from(query.include_metadata)),
        );
        if let Some(type_name) = &query.type_name {
            params.insert("type".into(), json!(type_name));
        }
        if !query.metadata_filter.is_empty() {
            params.insert("meta".into(), json!(query.metadata_filter));
        }
        let raw: Vec<RawInfo> = self.rpc.call(method, &Value::Object(params)).await?;
        raw.into_iter().map(|info| decode_info(method, info)).collect()
    }

    async fn get_object(&self, path: &[ObjectRef]) -> ServiceResult<ObjectRecord> {
        let method = "get_objects2";
        let reference = path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";");
        let params = json!({"objects": [{"ref": reference}]});
        let response: ObjectsData = self.rpc.call(method, &params).await?;
        let object = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::decode(SERVICE, method, "no object returned"))?;
        let RawObject {
            data,
            info,
            mut extracted_ids,
        } = object;
        Ok(ObjectRecord {
            info: decode_info(method, info)?,
            data,
            extracted_handles: extracted_ids.remove(HANDLE_ID_KEY).unwrap_or_default(),
        })
    }

    async fn save_object(&self, request: SaveRequest) -> ServiceResult<ObjectInfo> {
        let method = "save_objects";
        let params = SaveParams {
            id: request.container,
            objects: [ObjectSave {
                name: &request.name,
                type_string: request.type_string.to_string(),
                data: &request.data,
                meta: &request.metadata,
                provenance: &request.provenance,
            }],
        };
        let saved: Vec<RawInfo> = self.rpc.call(method, &params).await?;
        let info = saved
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::decode(SERVICE, method, "no object info returned"))?;
        decode_info(method, info)
    }

    async fn type_fingerprint(&self, type_string: &TypeString) -> ServiceResult<String> {
        let method = "translate_to_MD5_types";
        let wanted = type_string.to_string();
        let mut fingerprints: BTreeMap<String, String> =
            self.rpc.call(method, &[wanted.as_str()]).await?;
        fingerprints.remove(&wanted).ok_or_else(|| {
            ServiceError::decode(SERVICE, method, format!("no fingerprint for {wanted}"))
        })
    }

    async fn types_for_fingerprint(&self, fingerprint: &str) -> ServiceResult<Vec<String>> {
        let method = "translate_from_MD5_types";
        let mut types: BTreeMap<String, Vec<String>> =
            self.rpc.call(method, &[fingerprint]).await?;
        Ok(types.remove(fingerprint).unwrap_or_default())
    }
}

fn decode_info(method: &str, raw: RawInfo) -> ServiceResult<ObjectInfo> {
    let (
        object,
        name,
        type_string,
        saved_at,
        version,
        saved_by,
        container,
        container_name,
        checksum,
        size,
        metadata,
    ) = raw;
    let type_string = TypeString::parse(&type_string)
        .map_err(|error| ServiceError::decode(SERVICE, method, error.to_string()))?;
    Ok(ObjectInfo {
        reference: ObjectRef::new(container, object, version),
        name,
        type_string,
        saved_at,
        saved_by,
        container_name,
        checksum,
        size,
        metadata: metadata.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_tuple_decodes_into_named_fields() -> anyhow::Result<()> {
        let raw: RawInfo = serde_json::from_value(json!([
            12,
            "ecoli",
            "KBaseGenomes.Genome-14.2",
            "2024-03-01T10:00:00+0000",
            3,
            "someone",
            106_867,
            "genomes",
            "0a1b",
            2048,
            {"copy_source_upa": "1/2/3"}
        ]))?;
        let info = decode_info("list_objects", raw)?;
        assert_eq!(info.reference, ObjectRef::new(106_867, 12, 3));
        assert_eq!(info.type_string.name(), "KBaseGenomes.Genome");
        assert_eq!(info.container_name, "genomes");
        assert_eq!(info.size, 2048);
        assert_eq!(
            info.metadata.get("copy_source_upa").map(String::as_str),
            Some("1/2/3")
        );
        Ok(())
    }

    #[test]
    fn null_metadata_is_empty() -> anyhow::Result<()> {
        let raw: RawInfo = serde_json::from_value(json!([
            1, "a", "KBaseGenomeAnnotations.Assembly-6.0", "", 1, "", 5, "ws", "", 0, null
        ]))?;
        assert!(decode_info("list_objects", raw)?.metadata.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_type_is_a_decode_error() -> anyhow::Result<()> {
        let raw: RawInfo = serde_json::from_value(json!([
            1, "a", "KBaseGenomes.Genome-x.y", "", 1, "", 5, "ws", "", 0, null
        ]))?;
        assert!(matches!(
            decode_info("list_objects", raw),
            Err(ServiceError::Decode { .. })
        ));
        Ok(())
    }
}
