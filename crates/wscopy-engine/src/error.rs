//! # Design
//!
//! - One taxonomy for every engine failure; collaborator failures are wrapped
//!   with the operation that issued them.
//! - `Stage` wraps a cause with the object and the step it was in when it failed,
//!   so reports always carry object identity, stage, and cause.
//! - Run-level conditions (listing limits, unsupported sample versions, unknown
//!   types, a corrupt concordance) are fatal even when per-object isolation is on.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use wscopy_core::{ModelError, ObjectRef, ServiceError};

/// Result alias for engine operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Steps an object moves through while it is copied or linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Source and target listings are compared.
    Plan,
    /// Full object is read from the source.
    Fetch,
    /// Target type version is chosen.
    ResolveType,
    /// Per-type payload transforms run.
    Sanitize,
    /// Parent reference is reused or copied.
    ResolveReferences,
    /// Blobs behind handle fields are copied.
    TransferBlobs,
    /// Object and marker are saved in the target.
    Persist,
    /// Sample links are propagated to the copy.
    Link,
}

impl Stage {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Fetch => "fetch",
            Self::ResolveType => "resolve_type",
            Self::Sanitize => "sanitize",
            Self::ResolveReferences => "resolve_references",
            Self::TransferBlobs => "transfer_blobs",
            Self::Persist => "persist",
            Self::Link => "link",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors raised by the migration engine.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A collaborator call failed.
    #[error("{operation} failed")]
    Service {
        /// Engine operation issuing the call.
        operation: &'static str,
        /// Underlying collaborator error.
        #[source]
        source: ServiceError,
    },
    /// A parent object does not belong to the expected type family.
    #[error("parent {parent} of {object} has type {actual}, expected {expected}")]
    SchemaMismatch {
        /// Object declaring the reference.
        object: ObjectRef,
        /// Referenced parent.
        parent: ObjectRef,
        /// Expected type name.
        expected: String,
        /// Type name actually found.
        actual: String,
    },
    /// A linked sample is not at version 1.
    #[error("sample {sample_id} linked to {object} is at version {version}; only version 1 can be copied")]
    UnsupportedSampleVersion {
        /// Sample identifier.
        sample_id: String,
        /// Version the link points at.
        version: u64,
        /// Source object carrying the link.
        object: ObjectRef,
    },
    /// No profile is registered for a type.
    #[error("no type profile registered for {type_name}")]
    UnknownType {
        /// Type name without version.
        type_name: String,
    },
    /// A listing reached the non-paginated enumeration limit.
    #[error("listing container {container} returned {count} objects, reaching the limit of {limit}")]
    ScaleLimit {
        /// Container that was listed.
        container: u64,
        /// Number of objects returned.
        count: usize,
        /// Configured limit.
        limit: usize,
    },
    /// A reference field does not hold an object reference.
    #[error("field {field} holds an invalid object reference")]
    InvalidReference {
        /// Payload field.
        field: String,
        /// Offending value, rendered as JSON.
        value: String,
        /// Parse failure, when the value was a string.
        #[source]
        source: Option<ModelError>,
    },
    /// The object payload is not a mapping.
    #[error("payload of {type_name} is not a mapping")]
    InvalidPayload {
        /// Type name of the object.
        type_name: String,
    },
    /// A parent type itself declares a parent.
    #[error("parent type {type_name} declares its own parent reference")]
    NestedReference {
        /// Parent type name.
        type_name: String,
    },
    /// A profile was registered twice.
    #[error("type profile for {type_name} registered twice")]
    DuplicateProfile {
        /// Type name.
        type_name: String,
    },
    /// The target blob store reported a different checksum than the source.
    #[error("checksum mismatch for handle {handle}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Source handle.
        handle: String,
        /// Source checksum.
        expected: String,
        /// Target checksum, or `missing`.
        actual: String,
    },
    /// The payload still holds a handle that no handle field of the profile covers.
    #[error("payload of {object} references handle {handle} outside the profile's handle fields")]
    UnmappedHandle {
        /// Source object.
        object: ObjectRef,
        /// Source handle left in the payload.
        handle: String,
    },
    /// Fewer or more bytes moved than the source node declares.
    #[error("transfer of handle {handle} moved {actual} bytes, expected {expected}")]
    TransferIncomplete {
        /// Source handle.
        handle: String,
        /// Declared size.
        expected: u64,
        /// Observed size.
        actual: u64,
    },
    /// The concordance file could not be parsed.
    #[error("concordance file is malformed at line {line}: {reason}")]
    Concordance {
        /// File path.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Static description of the problem.
        reason: &'static str,
    },
    /// Local IO failure.
    #[error("local io failure during {operation}")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// An object failed at a specific stage.
    #[error("{object} failed at stage {stage}")]
    Stage {
        /// Object being processed.
        object: ObjectRef,
        /// Stage in progress.
        stage: Stage,
        /// Cause.
        #[source]
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    pub(crate) const fn service(operation: &'static str, source: ServiceError) -> Self {
        Self::Service { operation, source }
    }

    pub(crate) const fn io(operation: &'static str, path: PathBuf, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }

    /// Attribute this error to `object` at `stage`. Errors already attributed to
    /// the same object keep their original stage.
    #[must_use]
    pub fn at(self, object: ObjectRef, stage: Stage) -> Self {
        match self {
            Self::Stage {
                object: existing, ..
            } if existing == object => self,
            other => Self::Stage {
                object,
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Outermost stage this error was attributed to.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether the error must stop the whole run regardless of isolation settings.
    #[must_use]
    pub fn is_fatal_for_run(&self) -> bool {
        match self {
            Self::Stage { source, .. } => source.is_fatal_for_run(),
            Self::ScaleLimit { .. }
            | Self::UnsupportedSampleVersion { .. }
            | Self::UnknownType { .. }
            | Self::Concordance { .. } => true,
            _ => false,
        }
    }

    /// Innermost engine error, skipping stage attribution.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach stage context to engine results.
pub(crate) trait StageExt<T> {
    fn at(self, object: ObjectRef, stage: Stage) -> MigrateResult<T>;
}

impl<T> StageExt<T> for MigrateResult<T> {
    fn at(self, object: ObjectRef, stage: Stage) -> MigrateResult<T> {
        self.map_err(|error| error.at(object, stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale_limit() -> MigrateError {
        MigrateError::ScaleLimit {
            container: 7,
            count: 10,
            limit: 10,
        }
    }

    #[test]
    fn stage_wrapping_preserves_first_attribution() {
        let object = ObjectRef::new(1, 2, 3);
        let error = scale_limit()
            .at(object, Stage::Fetch)
            .at(object, Stage::Persist);
        assert_eq!(error.stage(), Some(Stage::Fetch));
        assert!(matches!(error.root(), MigrateError::ScaleLimit { .. }));
        assert_eq!(error.to_string(), "1/2/3 failed at stage fetch");
    }

    #[test]
    fn parent_failures_nest_under_the_child() {
        let parent = ObjectRef::new(1, 9, 1);
        let child = ObjectRef::new(1, 2, 3);
        let error = MigrateError::InvalidPayload {
            type_name: "KBaseGenomeAnnotations.Assembly".into(),
        }
        .at(parent, Stage::Sanitize)
        .at(child, Stage::ResolveReferences);
        assert_eq!(error.stage(), Some(Stage::ResolveReferences));
        assert!(matches!(error.root(), MigrateError::InvalidPayload { .. }));
    }

    #[test]
    fn fatal_classification_looks_through_stages() {
        let object = ObjectRef::new(1, 2, 3);
        assert!(scale_limit().at(object, Stage::Plan).is_fatal_for_run());
        let checksum = MigrateError::ChecksumMismatch {
            handle: "KBH_1".into(),
            expected: "a".into(),
            actual: "b".into(),
        };
        assert!(!checksum.at(object, Stage::TransferBlobs).is_fatal_for_run());
    }

    #[test]
    fn stage_labels_are_stable() {
        assert_eq!(Stage::ResolveReferences.as_str(), "resolve_references");
        assert_eq!(Stage::TransferBlobs.to_string(), "transfer_blobs");
    }
}
