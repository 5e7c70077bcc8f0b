//! Collaborator interfaces implemented by the RPC clients and by test fakes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::model::{
    BlobNode, DataLink, HandleRecord, ListQuery, NewDataLink, NewHandle, ObjectInfo, ObjectRecord,
    ObjectRef, SampleRecord, SampleVersion, SaveRequest, TypeString,
};

/// Versioned object store holding typed objects in containers.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Service URL; recorded in idempotency markers as the environment identity.
    fn url(&self) -> &str;

    /// Enumerate the latest version of every matching object (no pagination).
    async fn list_objects(&self, query: &ListQuery) -> ServiceResult<Vec<ObjectInfo>>;

    /// Fetch one object. A path longer than one element reaches the last
    /// object through the references held by the preceding ones.
    async fn get_object(&self, path: &[ObjectRef]) -> ServiceResult<ObjectRecord>;

    /// Persist a new object version.
    async fn save_object(&self, request: SaveRequest) -> ServiceResult<ObjectInfo>;

    /// Translate a versioned type into its content fingerprint.
    async fn type_fingerprint(&self, type_string: &TypeString) -> ServiceResult<String>;

    /// Type strings registered under a content fingerprint (possibly none).
    async fn types_for_fingerprint(&self, fingerprint: &str) -> ServiceResult<Vec<String>>;
}

/// Registry mapping opaque handle identifiers to blob-store nodes.
#[async_trait]
pub trait HandleRegistry: Send + Sync {
    /// Resolve a handle identifier.
    async fn resolve(&self, hid: &str) -> ServiceResult<HandleRecord>;

    /// Register a new handle and return its identifier.
    async fn persist(&self, handle: NewHandle) -> ServiceResult<String>;
}

/// Content store for large binary payloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Base URL recorded in newly minted handles.
    fn url(&self) -> &str;

    /// Fetch node metadata.
    async fn node(&self, id: &str) -> ServiceResult<BlobNode>;

    /// Stream a node's bytes into `destination`, returning the byte count.
    async fn download(&self, id: &str, destination: &Path) -> ServiceResult<u64>;

    /// Stream `source` into a new node named `filename`.
    async fn upload(&self, filename: &str, source: &Path) -> ServiceResult<BlobNode>;
}

/// Sample metadata service holding versioned samples and their data links.
#[async_trait]
pub trait SampleService: Send + Sync {
    /// Links attached to an object.
    async fn data_links(&self, upa: ObjectRef) -> ServiceResult<Vec<DataLink>>;

    /// Fetch a sample through an object that links to it.
    async fn sample_via_data(
        &self,
        upa: ObjectRef,
        sample: &SampleVersion,
    ) -> ServiceResult<SampleRecord>;

    /// Create a new sample and return its id and version.
    async fn create_sample(&self, sample: SampleRecord) -> ServiceResult<SampleVersion>;

    /// Link an object to a sample node, replacing any link on the same data.
    async fn create_data_link(&self, link: NewDataLink) -> ServiceResult<DataLink>;
}

/// The four collaborators making up one deployment.
#[derive(Clone)]
pub struct Environment {
    /// Object store.
    pub workspace: Arc<dyn Workspace>,
    /// Handle registry.
    pub handles: Arc<dyn HandleRegistry>,
    /// Blob store.
    pub blobs: Arc<dyn BlobStore>,
    /// Sample service.
    pub samples: Arc<dyn SampleService>,
}

impl Environment {
    /// Identity of this environment as recorded in idempotency markers.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.workspace.url()
    }
}
