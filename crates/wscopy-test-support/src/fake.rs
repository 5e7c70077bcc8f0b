//! In-memory environment implementing the workspace, handle, blob, and sample
//! collaborators.
//!
//! Behaves like the real services where the engine depends on it: saving under
//! an existing name adds a version, listings return latest versions only,
//! a bare type saves as the latest registered version, and a sample created
//! with an `id` becomes a new version of that sample.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use wscopy_core::{
    BlobNode, BlobStore, DataLink, Environment, HandleRecord, HandleRegistry, ListQuery,
    NewDataLink, NewHandle, ObjectInfo, ObjectRecord, ObjectRef, SampleRecord, SampleService,
    SampleVersion, SaveRequest, ServiceError, ServiceResult, TypeString, Workspace,
};

const SERVICE: &str = "Fake";

/// Hex digest standing in for the MD5 a blob store computes on ingest.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest
        .iter()
        .take(16)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// One environment: workspace, handle registry, blob store, and sample service.
pub struct FakeEnvironment {
    url: String,
    blob_url: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<(u64, u64), Vec<StoredObject>>,
    names: HashMap<(u64, String), u64>,
    types: Vec<(String, String)>,
    handles: BTreeMap<String, HandleRecord>,
    nodes: BTreeMap<String, StoredBlob>,
    samples: BTreeMap<String, Vec<SampleRecord>>,
    links: Vec<DataLink>,
    calls: BTreeMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<bool>>,
    corrupt_uploads: bool,
    short_downloads: bool,
    next_handle: u64,
    next_node: u64,
    next_sample: u64,
}

struct StoredObject {
    info: ObjectInfo,
    data: Value,
    handles: Vec<String>,
}

struct StoredBlob {
    node: BlobNode,
    bytes: Vec<u8>,
}

impl FakeEnvironment {
    /// Empty environment rooted at `base` (e.g. `https://source.test/services`).
    #[must_use]
    pub fn new(base: &str) -> Arc<Self> {
        Arc::new(Self {
            url: format!("{base}/ws"),
            blob_url: format!("{base}/shock-api"),
            state: Mutex::new(State::default()),
        })
    }

    /// Bundle this fake as every collaborator of an environment.
    #[must_use]
    pub fn environment(self: &Arc<Self>) -> Environment {
        Environment {
            workspace: self.clone(),
            handles: self.clone(),
            blobs: self.clone(),
            samples: self.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn call(&self, method: &'static str) -> ServiceResult<()> {
        let mut state = self.state();
        *state.calls.entry(method).or_default() += 1;
        match state
            .failures
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            Some(retryable) => Err(ServiceError::Transport {
                service: SERVICE,
                method: method.to_string(),
                status: Some(if retryable { 503 } else { 400 }),
                retryable,
                detail: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    // --- seeding -----------------------------------------------------------

    /// Register `type_string` (`Module.Type-major.minor`) under `fingerprint`.
    pub fn register_type(&self, type_string: &str, fingerprint: &str) {
        self.state()
            .types
            .push((type_string.to_string(), fingerprint.to_string()));
    }

    /// Store an object without type checks or call accounting.
    pub fn insert_object(
        &self,
        container: u64,
        name: &str,
        type_string: &str,
        data: Value,
    ) -> ObjectInfo {
        self.insert_object_with_metadata(container, name, type_string, data, BTreeMap::new())
    }

    /// Store an object with user metadata, without type checks or call accounting.
    pub fn insert_object_with_metadata(
        &self,
        container: u64,
        name: &str,
        type_string: &str,
        data: Value,
        metadata: BTreeMap<String, String>,
    ) -> ObjectInfo {
        let parsed = TypeString::parse(type_string)
            .unwrap_or_else(|_| TypeString::new(type_string, None));
        self.state().store(container, name, parsed, data, metadata)
    }

    /// Store `bytes` as a blob node and register a handle for it.
    pub fn put_blob(&self, filename: &str, bytes: &[u8]) -> String {
        let mut state = self.state();
        let node = state.add_node(filename, bytes.to_vec(), content_digest(bytes));
        state.add_handle(&node, &self.blob_url)
    }

    /// Store a sample version; its `id` and `version` fields identify it.
    pub fn add_sample(&self, record: SampleRecord) {
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.state().samples.entry(id).or_default().push(record);
    }

    /// Attach a data link.
    pub fn add_link(&self, link: DataLink) {
        self.state().links.push(link);
    }

    /// Fail the next call to `method` with a transport error.
    pub fn fail_next(&self, method: &'static str, retryable: bool) {
        self.state()
            .failures
            .entry(method)
            .or_default()
            .push_back(retryable);
    }

    /// Report a wrong checksum for every later upload.
    pub fn corrupt_uploads(&self) {
        self.state().corrupt_uploads = true;
    }

    /// Deliver one byte less than the node size on every later download.
    pub fn short_downloads(&self) {
        self.state().short_downloads = true;
    }

    // --- inspection --------------------------------------------------------

    /// Times `method` was invoked.
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or_default()
    }

    /// Latest version of every object in `container`, with metadata.
    #[must_use]
    pub fn latest(&self, container: u64) -> Vec<ObjectInfo> {
        self.state()
            .latest_in(container)
            .map(|stored| stored.info.clone())
            .collect()
    }

    /// Stored payload of `reference`.
    #[must_use]
    pub fn data(&self, reference: ObjectRef) -> Option<Value> {
        self.state()
            .version(reference)
            .map(|stored| stored.data.clone())
    }

    /// Number of versions saved across all objects of `container`.
    #[must_use]
    pub fn version_count(&self, container: u64) -> usize {
        self.state()
            .objects
            .iter()
            .filter(|((stored_container, _), _)| *stored_container == container)
            .map(|(_, versions)| versions.len())
            .sum()
    }

    /// Number of distinct samples.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.state().samples.len()
    }

    /// Latest version of sample `id`.
    #[must_use]
    pub fn sample(&self, id: &str) -> Option<SampleRecord> {
        self.state()
            .samples
            .get(id)
            .and_then(|versions| versions.last().cloned())
    }

    /// Every data link.
    #[must_use]
    pub fn links(&self) -> Vec<DataLink> {
        self.state().links.clone()
    }

    /// Bytes behind handle `hid`.
    #[must_use]
    pub fn blob_bytes(&self, hid: &str) -> Option<Vec<u8>> {
        let state = self.state();
        let handle = state.handles.get(hid)?;
        state
            .nodes
            .get(&handle.blob_id)
            .map(|blob| blob.bytes.clone())
    }

    /// Handle record for `hid`.
    #[must_use]
    pub fn handle(&self, hid: &str) -> Option<HandleRecord> {
        self.state().handles.get(hid).cloned()
    }

    /// Number of blob nodes stored.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state().nodes.len()
    }
}

impl State {
    fn store(
        &mut self,
        container: u64,
        name: &str,
        type_string: TypeString,
        data: Value,
        metadata: BTreeMap<String, String>,
    ) -> ObjectInfo {
        let next_id = self
            .objects
            .keys()
            .filter(|(stored_container, _)| *stored_container == container)
            .count() as u64
            + 1;
        let object = *self
            .names
            .entry((container, name.to_string()))
            .or_insert(next_id);
        let versions = self.objects.entry((container, object)).or_default();
        let reference = ObjectRef::new(container, object, versions.len() as u64 + 1);
        let rendered = data.to_string();
        let info = ObjectInfo {
            reference,
            name: name.to_string(),
            type_string,
            saved_at: "2024-01-01T00:00:00+0000".to_string(),
            saved_by: "fake".to_string(),
            container_name: format!("container_{container}"),
            checksum: content_digest(rendered.as_bytes()),
            size: rendered.len() as u64,
            metadata,
        };
        let handles = extract_handles(&data);
        versions.push(StoredObject {
            info: info.clone(),
            data,
            handles,
        });
        info
    }

    fn latest_in(&self, container: u64) -> impl Iterator<Item = &StoredObject> {
        self.objects
            .iter()
            .filter(move |((stored_container, _), _)| *stored_container == container)
            .filter_map(|(_, versions)| versions.last())
    }

    fn version(&self, reference: ObjectRef) -> Option<&StoredObject> {
        let index = usize::try_from(reference.version.checked_sub(1)?).ok()?;
        self.objects
            .get(&(reference.container, reference.object))?
            .get(index)
    }

    fn resolve_save_type(&self, requested: &TypeString) -> Option<TypeString> {
        let registered = self
            .types
            .iter()
            .filter_map(|(raw, _)| TypeString::parse(raw).ok());
        match requested.version() {
            Some(_) => registered.into_iter().find(|known| known == requested),
            None => registered
                .filter(|known| known.name() == requested.name())
                .max_by_key(TypeString::version),
        }
    }

    fn add_node(&mut self, filename: &str, bytes: Vec<u8>, md5: String) -> BlobNode {
        self.next_node += 1;
        let node = BlobNode {
            id: format!("node-{}", self.next_node),
            filename: filename.to_string(),
            size: bytes.len() as u64,
            md5: Some(md5),
        };
        self.nodes.insert(
            node.id.clone(),
            StoredBlob {
                node: node.clone(),
                bytes,
            },
        );
        node
    }

    fn add_handle(&mut self, node: &BlobNode, url: &str) -> String {
        self.next_handle += 1;
        let hid = format!("KBH_{}", self.next_handle);
        self.handles.insert(
            hid.clone(),
            HandleRecord {
                hid: hid.clone(),
                blob_id: node.id.clone(),
                filename: Some(node.filename.clone()),
                url: Some(url.to_string()),
                md5: node.md5.clone(),
            },
        );
        hid
    }
}

fn extract_handles(data: &Value) -> Vec<String> {
    data.as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(key, _)| key.ends_with("_handle_ref"))
                .filter_map(|(_, value)| value.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn references(data: &Value, target: &str) -> bool {
    match data {
        Value::String(value) => value == target,
        Value::Array(values) => values.iter().any(|value| references(value, target)),
        Value::Object(fields) => fields.values().any(|value| references(value, target)),
        _ => false,
    }
}

fn rejected(method: &str, message: impl Into<String>) -> ServiceError {
    ServiceError::rejected(SERVICE, method, message)
}

#[async_trait]
impl Workspace for FakeEnvironment {
    fn url(&self) -> &str {
        &self.url
    }

    async fn list_objects(&self, query: &ListQuery) -> ServiceResult<Vec<ObjectInfo>> {
        self.call("list_objects")?;
        let state = self.state();
        Ok(state
            .latest_in(query.container)
            .filter(|stored| {
                query
                    .type_name
                    .as_deref()
                    .is_none_or(|name| stored.info.type_string.name() == name)
            })
            .filter(|stored| {
                query
                    .metadata_filter
                    .iter()
                    .all(|(key, value)| stored.info.metadata.get(key) == Some(value))
            })
            .map(|stored| {
                let mut info = stored.info.clone();
                if !query.include_metadata {
                    info.metadata.clear();
                }
                info
            })
            .collect())
    }

    async fn get_object(&self, path: &[ObjectRef]) -> ServiceResult<ObjectRecord> {
        self.call("get_object")?;
        let state = self.state();
        let Some(last) = path.last() else {
            return Err(rejected("get_object", "empty reference path"));
        };
        for pair in path.windows(2) {
            let holder = state
                .version(pair[0])
                .ok_or_else(|| rejected("get_object", format!("no object {}", pair[0])))?;
            if !references(&holder.data, &pair[1].to_string()) {
                return Err(rejected(
                    "get_object",
                    format!("{} does not reference {}", pair[0], pair[1]),
                ));
            }
        }
        let stored = state
            .version(*last)
            .ok_or_else(|| rejected("get_object", format!("no object {last}")))?;
        Ok(ObjectRecord {
            info: stored.info.clone(),
            data: stored.data.clone(),
            extracted_handles: stored.handles.clone(),
        })
    }

    async fn save_object(&self, request: SaveRequest) -> ServiceResult<ObjectInfo> {
        self.call("save_object")?;
        let mut state = self.state();
        let type_string = state
            .resolve_save_type(&request.type_string)
            .ok_or_else(|| {
                rejected(
                    "save_object",
                    format!("type {} is not registered", request.type_string),
                )
            })?;
        Ok(state.store(
            request.container,
            &request.name,
            type_string,
            request.data,
            request.metadata,
        ))
    }

    async fn type_fingerprint(&self, type_string: &TypeString) -> ServiceResult<String> {
        self.call("type_fingerprint")?;
        let wanted = type_string.to_string();
        self.state()
            .types
            .iter()
            .find(|(raw, _)| *raw == wanted)
            .map(|(_, fingerprint)| fingerprint.clone())
            .ok_or_else(|| rejected("type_fingerprint", format!("type {wanted} is not registered")))
    }

    async fn types_for_fingerprint(&self, fingerprint: &str) -> ServiceResult<Vec<String>> {
        self.call("types_for_fingerprint")?;
        Ok(self
            .state()
            .types
            .iter()
            .filter(|(_, known)| known == fingerprint)
            .map(|(raw, _)| raw.clone())
            .collect())
    }
}

#[async_trait]
impl HandleRegistry for FakeEnvironment {
    async fn resolve(&self, hid: &str) -> ServiceResult<HandleRecord> {
        self.call("resolve_handle")?;
        self.state()
            .handles
            .get(hid)
            .cloned()
            .ok_or_else(|| rejected("resolve_handle", format!("no handle {hid}")))
    }

    async fn persist(&self, handle: NewHandle) -> ServiceResult<String> {
        self.call("persist_handle")?;
        let mut state = self.state();
        let node = state
            .nodes
            .get(&handle.blob_id)
            .map(|blob| blob.node.clone())
            .ok_or_else(|| rejected("persist_handle", format!("no node {}", handle.blob_id)))?;
        Ok(state.add_handle(&node, &handle.url))
    }
}

#[async_trait]
impl BlobStore for FakeEnvironment {
    fn url(&self) -> &str {
        &self.blob_url
    }

    async fn node(&self, id: &str) -> ServiceResult<BlobNode> {
        self.call("node")?;
        self.state()
            .nodes
            .get(id)
            .map(|blob| blob.node.clone())
            .ok_or_else(|| rejected("node", format!("no node {id}")))
    }

    async fn download(&self, id: &str, destination: &Path) -> ServiceResult<u64> {
        self.call("download")?;
        let bytes = {
            let state = self.state();
            let blob = state
                .nodes
                .get(id)
                .ok_or_else(|| rejected("download", format!("no node {id}")))?;
            let mut bytes = blob.bytes.clone();
            if state.short_downloads {
                bytes.pop();
            }
            bytes
        };
        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|source| ServiceError::Io {
                operation: "write_download",
                path: destination.to_path_buf(),
                source,
            })?;
        Ok(bytes.len() as u64)
    }

    async fn upload(&self, filename: &str, source: &Path) -> ServiceResult<BlobNode> {
        self.call("upload")?;
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|error| ServiceError::Io {
                operation: "read_upload",
                path: source.to_path_buf(),
                source: error,
            })?;
        let mut state = self.state();
        let md5 = if state.corrupt_uploads {
            "0".repeat(32)
        } else {
            content_digest(&bytes)
        };
        Ok(state.add_node(filename, bytes, md5))
    }
}

#[async_trait]
impl SampleService for FakeEnvironment {
    async fn data_links(&self, upa: ObjectRef) -> ServiceResult<Vec<DataLink>> {
        self.call("data_links")?;
        Ok(self
            .state()
            .links
            .iter()
            .filter(|link| link.upa == upa)
            .cloned()
            .collect())
    }

    async fn sample_via_data(
        &self,
        upa: ObjectRef,
        sample: &SampleVersion,
    ) -> ServiceResult<SampleRecord> {
        self.call("sample_via_data")?;
        let state = self.state();
        if !state
            .links
            .iter()
            .any(|link| link.upa == upa && link.sample() == *sample)
        {
            return Err(rejected(
                "sample_via_data",
                format!("{upa} is not linked to sample {sample}"),
            ));
        }
        let index = usize::try_from(sample.version.saturating_sub(1)).unwrap_or(usize::MAX);
        state
            .samples
            .get(&sample.id)
            .and_then(|versions| versions.get(index))
            .cloned()
            .ok_or_else(|| rejected("sample_via_data", format!("no sample {sample}")))
    }

    async fn create_sample(&self, mut sample: SampleRecord) -> ServiceResult<SampleVersion> {
        self.call("create_sample")?;
        let mut state = self.state();
        let id = match sample.get("id").and_then(Value::as_str) {
            Some(existing) if state.samples.contains_key(existing) => existing.to_string(),
            Some(missing) => {
                return Err(rejected(
                    "create_sample",
                    format!("sample {missing} does not exist"),
                ));
            }
            None => {
                state.next_sample += 1;
                format!("sample-{}", state.next_sample)
            }
        };
        let versions = state.samples.entry(id.clone()).or_default();
        let version = versions.len() as u64 + 1;
        sample.insert("id".to_string(), Value::from(id.clone()));
        sample.insert("version".to_string(), Value::from(version));
        versions.push(sample);
        Ok(SampleVersion::new(id, version))
    }

    async fn create_data_link(&self, link: NewDataLink) -> ServiceResult<DataLink> {
        self.call("create_data_link")?;
        let mut state = self.state();
        if !state.samples.contains_key(&link.sample.id) {
            return Err(rejected(
                "create_data_link",
                format!("no sample {}", link.sample),
            ));
        }
        state
            .links
            .retain(|existing| !(existing.upa == link.upa && existing.dataid == link.dataid));
        let created = DataLink {
            upa: link.upa,
            dataid: link.dataid,
            sample_id: link.sample.id,
            version: link.sample.version,
            node: link.node,
        };
        state.links.push(created.clone());
        Ok(created)
    }
}
