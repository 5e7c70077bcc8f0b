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

//! Remote clients for the services of one deployment.
//!
//! Layout: `transport.rs` (shared HTTP client, failure classification, retry
//! loop), `retry.rs` (backoff schedule), `jsonrpc.rs` (JSON-RPC 1.1 envelope),
//! `workspace.rs`, `handle.rs`, `samples.rs` (typed JSON-RPC clients),
//! `blobstore.rs` (REST blob store), `environment.rs` (wiring into an
//! `Environment`).

pub mod blobstore;
pub mod environment;
pub mod handle;
pub mod jsonrpc;
pub mod retry;
pub mod samples;
pub mod transport;
pub mod workspace;

pub use blobstore::ShockClient;
pub use environment::{ServiceEndpoints, connect};
pub use handle::HandleClient;
pub use jsonrpc::JsonRpcClient;
pub use retry::RetryPolicy;
pub use samples::SampleClient;
pub use transport::{DEFAULT_TIMEOUT, Transport};
pub use workspace::WorkspaceClient;
