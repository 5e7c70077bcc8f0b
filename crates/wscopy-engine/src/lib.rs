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

//! Migration engine copying typed objects, their blobs, and their sample links
//! between two independent environments.
//!
//! Layout:
//! - `planner.rs`: which source objects still need a copy.
//! - `resolver.rs`: source type to target type mapping, memoised per run.
//! - `sanitize.rs` / `profile.rs`: per-type payload transforms, handle fields, and parent links.
//! - `transfer.rs`: blob copy through a staging file plus handle minting.
//! - `reference.rs`: parent lookup/copy and in-run name deduplication.
//! - `migrate.rs`: per-object stage sequencing and the run loop.
//! - `concordance.rs` / `samples.rs`: durable sample mapping and link propagation.

pub mod concordance;
pub mod error;
pub mod migrate;
pub mod planner;
pub mod profile;
pub mod reference;
pub mod resolver;
pub mod samples;
pub mod sanitize;
pub mod transfer;

pub use concordance::{Concordance, ConcordanceEntry};
pub use error::{MigrateError, MigrateResult, Stage};
pub use migrate::{
    CopiedObject, DEFAULT_LISTING_LIMIT, FailedObject, MigrationSettings, Migrator, RunState,
    RunSummary,
};
pub use planner::{CopyPlan, PlanRequest, pending_objects, plan};
pub use profile::{ASSEMBLY_TYPE, GENOME_TYPE, ParentLink, ProfileRegistry, TypeProfile};
pub use reference::{NameRegistry, find_copy};
pub use resolver::{TypeResolver, select_latest};
pub use samples::{LinkSettings, LinkSummary, SampleLinker};
pub use sanitize::{PayloadFn, Transform};
pub use transfer::{BlobTransfer, TransferredBlob};
