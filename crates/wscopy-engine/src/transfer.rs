//! Blob copy between environments through a local staging file.
//!
//! # Design
//! - Upload needs a replayable body, so bytes are staged on disk rather than
//!   piped from the source to the target.
//! - The staging directory is a `TempDir` owned by the transfer call; it is
//!   removed on every exit path.
//! - A size mismatch always fails. Checksum agreement is enforced when
//!   `verify_checksums` is set and the source recorded an MD5.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};
use wscopy_core::{BlobNode, Environment, NewHandle};

use crate::error::{MigrateError, MigrateResult};

const STAGING_PREFIX: &str = "wscopy-blob-";
const STAGED_FILE: &str = "payload";

/// Outcome of one blob transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredBlob {
    /// Handle identifier in the source.
    pub source_handle: String,
    /// Newly minted handle identifier in the target.
    pub target_handle: String,
    /// Target blob node.
    pub node: BlobNode,
}

/// Copies blobs referenced through handles.
#[derive(Debug, Clone, Default)]
pub struct BlobTransfer {
    staging_dir: Option<PathBuf>,
    verify_checksums: bool,
}

impl BlobTransfer {
    /// Transfer staging in the system temp directory.
    #[must_use]
    pub const fn new(verify_checksums: bool) -> Self {
        Self {
            staging_dir: None,
            verify_checksums,
        }
    }

    /// Stage downloads under `dir` instead of the system temp directory.
    #[must_use]
    pub fn staging_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Copy the blob behind `source_handle` and mint a target handle for it.
    ///
    /// # Errors
    ///
    /// Returns an error when any collaborator call fails, staging fails, the
    /// byte count differs from the declared size, or checksums disagree.
    pub async fn transfer(
        &self,
        source: &Environment,
        target: &Environment,
        source_handle: &str,
    ) -> MigrateResult<TransferredBlob> {
        let record = source
            .handles
            .resolve(source_handle)
            .await
            .map_err(|error| MigrateError::service("resolve_handle", error))?;
        let source_node = source
            .blobs
            .node(&record.blob_id)
            .await
            .map_err(|error| MigrateError::service("fetch_blob_node", error))?;

        let staging = self.staging()?;
        let staged = staging.path().join(STAGED_FILE);
        let downloaded = source
            .blobs
            .download(&source_node.id, &staged)
            .await
            .map_err(|error| MigrateError::service("download_blob", error))?;
        ensure_size(source_handle, source_node.size, downloaded)?;
        debug!(handle = source_handle, node = %source_node.id, bytes = downloaded, "blob staged");

        let uploaded = target
            .blobs
            .upload(&source_node.filename, &staged)
            .await
            .map_err(|error| MigrateError::service("upload_blob", error))?;
        drop(staging);

        ensure_size(source_handle, source_node.size, uploaded.size)?;
        if self.verify_checksums {
            verify_checksum(source_handle, &source_node, &uploaded)?;
        }

        let target_handle = target
            .handles
            .persist(NewHandle {
                blob_id: uploaded.id.clone(),
                filename: uploaded.filename.clone(),
                url: target.blobs.url().to_string(),
                md5: uploaded.md5.clone(),
            })
            .await
            .map_err(|error| MigrateError::service("persist_handle", error))?;
        info!(
            source_handle,
            target_handle = %target_handle,
            node = %uploaded.id,
            bytes = uploaded.size,
            "blob transferred"
        );

        Ok(TransferredBlob {
            source_handle: source_handle.to_string(),
            target_handle,
            node: uploaded,
        })
    }

    fn staging(&self) -> MigrateResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        match &self.staging_dir {
            Some(dir) => builder
                .tempdir_in(dir)
                .map_err(|source| MigrateError::io("create_staging_dir", dir.clone(), source)),
            None => builder.tempdir().map_err(|source| {
                MigrateError::io("create_staging_dir", std::env::temp_dir(), source)
            }),
        }
    }

    /// Directory staging files are created in, when overridden.
    #[must_use]
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }
}

fn ensure_size(handle: &str, expected: u64, actual: u64) -> MigrateResult<()> {
    if expected != actual {
        return Err(MigrateError::TransferIncomplete {
            handle: handle.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn verify_checksum(handle: &str, source: &BlobNode, target: &BlobNode) -> MigrateResult<()> {
    let Some(expected) = source.md5.as_deref() else {
        debug!(handle, "source node has no recorded md5; skipping checksum check");
        return Ok(());
    };
    match target.md5.as_deref() {
        Some(actual) if actual.eq_ignore_ascii_case(expected) => Ok(()),
        actual => Err(MigrateError::ChecksumMismatch {
            handle: handle.to_string(),
            expected: expected.to_string(),
            actual: actual.unwrap_or("missing").to_string(),
        }),
    }
}
