#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Environment-neutral object model and collaborator interfaces.
//!
//! Layout: `model.rs` (object references, type strings, blob/handle/sample
//! carriers), `service.rs` (async collaborator traits and the `Environment`
//! bundle), `error.rs` (transport and model errors).

pub mod error;
pub mod model;
pub mod service;

pub use error::{ModelError, ServiceError, ServiceResult};
pub use model::{
    BlobNode, COPY_SOURCE_UPA, COPY_SOURCE_URL, DataLink, HandleRecord, IdempotencyMarker,
    ListQuery, MatchStrategy, NewDataLink, NewHandle, ObjectInfo, ObjectRecord, ObjectRef,
    ProvenanceAction, SampleRecord, SampleVersion, SaveRequest, TypeString, TypeVersion,
};
pub use service::{BlobStore, Environment, HandleRegistry, SampleService, Workspace};
