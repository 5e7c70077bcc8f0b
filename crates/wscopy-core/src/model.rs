//! Typed carriers for objects, types, blobs, handles, and sample links.
//!
//! # Design
//! - Identifiers that travel as strings on the wire (`1/2/3`,
//!   `Module.Type-1.0`) are parsed once into named structures.
//! - Nothing here performs IO; the engine and the RPC clients share these types.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModelError;

/// Metadata key recording the source object reference of a copy.
pub const COPY_SOURCE_UPA: &str = "copy_source_upa";
/// Metadata key recording the source workspace URL of a copy.
pub const COPY_SOURCE_URL: &str = "copy_source_url";

/// One immutable version of one object inside one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectRef {
    /// Container (workspace) identifier.
    pub container: u64,
    /// Object identifier within the container.
    pub object: u64,
    /// Object version.
    pub version: u64,
}

impl ObjectRef {
    /// Construct a reference from its three components.
    #[must_use]
    pub const fn new(container: u64, object: u64, version: u64) -> Self {
        Self {
            container,
            object,
            version,
        }
    }

    /// Rendering usable inside an object name, where `/` is not allowed.
    #[must_use]
    pub fn name_suffix(&self) -> String {
        format!("{}_{}_{}", self.container, self.object, self.version)
    }
}

impl Display for ObjectRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}/{}", self.container, self.object, self.version)
    }
}

impl FromStr for ObjectRef {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidObjectRef {
            value: value.to_string(),
        };
        let mut parts = value.trim().split('/');
        let mut next = || -> Result<u64, ModelError> {
            parts
                .next()
                .and_then(|part| part.parse::<u64>().ok())
                .ok_or_else(invalid)
        };
        let reference = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(reference)
    }
}

impl TryFrom<String> for ObjectRef {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectRef> for String {
    fn from(value: ObjectRef) -> Self {
        value.to_string()
    }
}

/// Numeric `major.minor` version of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl Display for TypeVersion {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}", self.major, self.minor)
    }
}

/// Fully-qualified type identifier, optionally pinned to a version.
///
/// A bare name (no version) asks the target registry for its latest
/// accepted version of the type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeString {
    name: String,
    version: Option<TypeVersion>,
}

impl TypeString {
    /// Build a type string from a name and optional version.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<TypeVersion>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Parse `Module.Type` or `Module.Type-major.minor`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidTypeString` when the name is empty or the
    /// version suffix is not two dot-separated integers.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidTypeString {
            value: value.to_string(),
        };
        let trimmed = value.trim();
        let (name, version) = match trimmed.split_once('-') {
            Some((name, raw)) => {
                let (major, minor) = raw.split_once('.').ok_or_else(invalid)?;
                let version = TypeVersion {
                    major: major.parse().map_err(|_| invalid())?,
                    minor: minor.parse().map_err(|_| invalid())?,
                };
                (name, Some(version))
            }
            None => (trimmed, None),
        };
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(name, version))
    }

    /// Type name without the version suffix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pinned version, if any.
    #[must_use]
    pub const fn version(&self) -> Option<TypeVersion> {
        self.version
    }

    /// Same type name with the version removed.
    #[must_use]
    pub fn bare(&self) -> Self {
        Self::new(self.name.clone(), None)
    }

    /// Same type name pinned to `version`.
    #[must_use]
    pub fn with_version(&self, version: TypeVersion) -> Self {
        Self::new(self.name.clone(), Some(version))
    }
}

impl Display for TypeString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => write!(formatter, "{}-{version}", self.name),
            None => formatter.write_str(&self.name),
        }
    }
}

impl FromStr for TypeString {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TypeString {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TypeString> for String {
    fn from(value: TypeString) -> Self {
        value.to_string()
    }
}

/// Listing entry describing one stored object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Reference of this object version.
    pub reference: ObjectRef,
    /// Display name, unique within its container.
    pub name: String,
    /// Stored type.
    pub type_string: TypeString,
    /// Save timestamp as reported by the service.
    pub saved_at: String,
    /// User that saved the object.
    pub saved_by: String,
    /// Name of the owning container.
    pub container_name: String,
    /// Content checksum reported by the service.
    pub checksum: String,
    /// Serialized payload size in bytes.
    pub size: u64,
    /// User metadata; empty unless requested from the listing.
    pub metadata: BTreeMap<String, String>,
}

impl ObjectInfo {
    /// Idempotency marker recorded on this object, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the metadata carries only half of a marker or
    /// the recorded source reference cannot be parsed.
    pub fn marker(&self) -> Result<Option<IdempotencyMarker>, ModelError> {
        IdempotencyMarker::from_metadata(&self.metadata)
    }
}

/// Full object: listing info, payload, and extracted handle identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// Object listing info.
    pub info: ObjectInfo,
    /// Structured payload.
    pub data: Value,
    /// Handle identifiers the service extracted from the payload.
    pub extracted_handles: Vec<String>,
}

/// Sidecar metadata tying a target object to the source object it was copied from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyMarker {
    /// Source object version that was copied.
    pub source: ObjectRef,
    /// Source workspace service URL.
    pub source_url: String,
}

impl IdempotencyMarker {
    /// Build a marker for `source` copied from the workspace at `source_url`.
    #[must_use]
    pub fn new(source: ObjectRef, source_url: impl Into<String>) -> Self {
        Self {
            source,
            source_url: source_url.into(),
        }
    }

    /// Render the marker as object metadata.
    #[must_use]
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (COPY_SOURCE_UPA.to_string(), self.source.to_string()),
            (COPY_SOURCE_URL.to_string(), self.source_url.clone()),
        ])
    }

    /// Read a marker back from object metadata.
    ///
    /// # Errors
    ///
    /// Returns an error when only the reference is present or it does not parse.
    pub fn from_metadata(metadata: &BTreeMap<String, String>) -> Result<Option<Self>, ModelError> {
        let Some(upa) = metadata.get(COPY_SOURCE_UPA) else {
            return Ok(None);
        };
        let source_url = metadata
            .get(COPY_SOURCE_URL)
            .ok_or(ModelError::IncompleteMarker {
                field: COPY_SOURCE_URL,
            })?;
        Ok(Some(Self::new(upa.parse()?, source_url.clone())))
    }

    /// Whether this marker was written by a copy from `source_url`.
    #[must_use]
    pub fn is_from(&self, source_url: &str) -> bool {
        self.source_url == source_url
    }
}

/// How the planner recognises objects that were already copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Compare idempotency markers (robust to renames).
    #[default]
    Marker,
    /// Compare display names.
    Name,
}

impl MatchStrategy {
    /// Lowercase label used in logs and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Marker => "marker",
            Self::Name => "name",
        }
    }
}

/// Object listing request against one container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    /// Container to enumerate.
    pub container: u64,
    /// Optional bare type name filter.
    pub type_name: Option<String>,
    /// Whether user metadata should be returned.
    pub include_metadata: bool,
    /// Only return objects whose metadata contains all of these pairs.
    pub metadata_filter: BTreeMap<String, String>,
}

impl ListQuery {
    /// List every object in `container`.
    #[must_use]
    pub fn container(container: u64) -> Self {
        Self {
            container,
            ..Self::default()
        }
    }

    /// Restrict the listing to a type name.
    #[must_use]
    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Ask for user metadata in the listing.
    #[must_use]
    pub const fn with_metadata(mut self) -> Self {
        self.include_metadata = true;
        self
    }

    /// Filter on one metadata key/value pair.
    #[must_use]
    pub fn where_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata_filter.insert(key.into(), value.into());
        self
    }
}

/// Provenance entry attached to a saved copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceAction {
    /// Free-text description.
    pub description: String,
    /// ISO-8601 timestamp of the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Request to persist a brand-new object version in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    /// Destination container.
    pub container: u64,
    /// Display name.
    pub name: String,
    /// Type to save under.
    pub type_string: TypeString,
    /// Payload.
    pub data: Value,
    /// User metadata (carries the idempotency marker).
    pub metadata: BTreeMap<String, String>,
    /// Provenance actions.
    pub provenance: Vec<ProvenanceAction>,
}

/// Blob-store node metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobNode {
    /// Node identifier.
    pub id: String,
    /// Original file name.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
    /// MD5 recorded by the store, when known.
    pub md5: Option<String>,
}

/// Handle registry entry resolving a handle to a blob node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRecord {
    /// Handle identifier.
    pub hid: String,
    /// Blob-store node the handle points at.
    pub blob_id: String,
    /// File name recorded with the handle.
    pub filename: Option<String>,
    /// Blob store URL recorded with the handle.
    pub url: Option<String>,
    /// MD5 recorded with the handle.
    pub md5: Option<String>,
}

/// Request to mint a handle in the target registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHandle {
    /// Blob-store node to bind.
    pub blob_id: String,
    /// File name of the node.
    pub filename: String,
    /// Blob store URL.
    pub url: String,
    /// Checksum reported by the target store.
    pub md5: Option<String>,
}

/// A (sample id, sample version) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleVersion {
    /// Sample identifier.
    pub id: String,
    /// Sample version.
    pub version: u64,
}

impl SampleVersion {
    /// Build a sample version pair.
    #[must_use]
    pub fn new(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl Display for SampleVersion {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.id, self.version)
    }
}

/// Full sample document as returned by the sample service.
pub type SampleRecord = Map<String, Value>;

/// Association between a node of a sample and an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLink {
    /// Linked object.
    pub upa: ObjectRef,
    /// Sub-object identifier within the linked object.
    #[serde(default)]
    pub dataid: Option<String>,
    /// Sample identifier.
    #[serde(rename = "id")]
    pub sample_id: String,
    /// Sample version.
    pub version: u64,
    /// Sample node name.
    pub node: String,
}

impl DataLink {
    /// Sample id/version this link points at.
    #[must_use]
    pub fn sample(&self) -> SampleVersion {
        SampleVersion::new(self.sample_id.clone(), self.version)
    }
}

/// Request to link an object to a sample node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDataLink {
    /// Object to link.
    pub upa: ObjectRef,
    /// Sub-object identifier, if the link targets one.
    pub dataid: Option<String>,
    /// Sample to link to.
    pub sample: SampleVersion,
    /// Sample node name.
    pub node: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ref_parses_and_renders() -> Result<(), ModelError> {
        let reference: ObjectRef = "106867/12/3".parse()?;
        assert_eq!(reference, ObjectRef::new(106_867, 12, 3));
        assert_eq!(reference.to_string(), "106867/12/3");
        assert_eq!(reference.name_suffix(), "106867_12_3");
        Ok(())
    }

    #[test]
    fn object_ref_rejects_malformed_input() {
        for value in ["", "1/2", "1/2/3/4", "ws/name/1", "1/2/x"] {
            assert!(value.parse::<ObjectRef>().is_err(), "{value} should not parse");
        }
    }

    #[test]
    fn type_string_round_trips_versions() -> Result<(), ModelError> {
        let versioned = TypeString::parse("KBaseGenomes.Genome-17.2")?;
        assert_eq!(versioned.name(), "KBaseGenomes.Genome");
        assert_eq!(
            versioned.version(),
            Some(TypeVersion {
                major: 17,
                minor: 2
            })
        );
        assert_eq!(versioned.to_string(), "KBaseGenomes.Genome-17.2");
        assert_eq!(versioned.bare().to_string(), "KBaseGenomes.Genome");
        Ok(())
    }

    #[test]
    fn type_string_rejects_non_numeric_versions() {
        assert!(TypeString::parse("Mod.Type-1.x").is_err());
        assert!(TypeString::parse("Mod.Type-1").is_err());
        assert!(TypeString::parse("-1.0").is_err());
    }

    #[test]
    fn type_versions_order_numerically() {
        let low = TypeVersion { major: 2, minor: 9 };
        let high = TypeVersion {
            major: 2,
            minor: 10,
        };
        assert!(high > low);
    }

    #[test]
    fn marker_round_trips_through_metadata() -> Result<(), ModelError> {
        let marker = IdempotencyMarker::new(ObjectRef::new(1, 2, 3), "https://src/ws");
        let metadata = marker.to_metadata();
        assert_eq!(IdempotencyMarker::from_metadata(&metadata)?, Some(marker));
        assert_eq!(IdempotencyMarker::from_metadata(&BTreeMap::new())?, None);
        Ok(())
    }

    #[test]
    fn marker_without_url_is_incomplete() {
        let metadata = BTreeMap::from([(COPY_SOURCE_UPA.to_string(), "1/2/3".to_string())]);
        assert_eq!(
            IdempotencyMarker::from_metadata(&metadata),
            Err(ModelError::IncompleteMarker {
                field: COPY_SOURCE_URL
            })
        );
    }

    #[test]
    fn data_link_decodes_wire_names() -> anyhow::Result<()> {
        let link: DataLink = serde_json::from_value(serde_json::json!({
            "linkid": "abc",
            "upa": "1/2/3",
            "dataid": null,
            "id": "sample-1",
            "version": 1,
            "node": "root",
            "created": 0
        }))?;
        assert_eq!(link.upa, ObjectRef::new(1, 2, 3));
        assert_eq!(link.sample(), SampleVersion::new("sample-1", 1));
        Ok(())
    }
}
