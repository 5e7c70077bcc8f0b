#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_panics_doc)]

//! Shared test helpers used across integration suites.
//! Layout: fake.rs (in-memory environment implementing every collaborator trait),
//! fixtures.rs (object and sample builders).

pub mod fake;
pub mod fixtures;

pub use fake::{FakeEnvironment, content_digest};
pub use fixtures::{data_link, sample_record};
