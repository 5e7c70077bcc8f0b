//! Per-object copy sequencing and the run loop.
//!
//! # Design
//! - Objects move through fetch, type resolution, sanitising, reference
//!   resolution, blob transfer, and persist, strictly one at a time.
//! - Persist is the only target-side object write; the idempotency marker is
//!   saved with the object in the same call, so a failure before it leaves no
//!   partial object behind. Blobs and handles minted before a failed persist
//!   are orphaned and never reused.
//! - Per-run caches (type mappings, claimed names, parent copies) live in
//!   `RunState` and are never shared across runs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, error, info};
use wscopy_core::{
    Environment, IdempotencyMarker, MatchStrategy, ObjectInfo, ObjectRecord, ObjectRef,
    ProvenanceAction, SaveRequest, TypeString,
};
use wscopy_telemetry::Metrics;

use crate::error::{MigrateError, MigrateResult, Stage, StageExt};
use crate::planner::{self, CopyPlan, PlanRequest};
use crate::profile::{ProfileRegistry, TypeProfile};
use crate::reference::NameRegistry;
use crate::resolver::TypeResolver;
use crate::transfer::BlobTransfer;

/// Maximum number of objects the workspace returns from one listing.
pub const DEFAULT_LISTING_LIMIT: usize = 10_000;

/// Knobs for one migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    /// Source container id.
    pub source_container: u64,
    /// Target container id.
    pub target_container: u64,
    /// Bare type name of the objects to copy.
    pub type_name: String,
    /// How existing copies are recognised.
    pub strategy: MatchStrategy,
    /// Listing size treated as truncated.
    pub listing_limit: usize,
    /// Record failed objects and keep going instead of stopping.
    pub continue_on_error: bool,
    /// Require the target blob checksum to match the source.
    pub verify_checksums: bool,
    /// Directory for blob staging files.
    pub staging_dir: Option<PathBuf>,
}

impl MigrationSettings {
    /// Settings with defaults for everything but the containers and type.
    #[must_use]
    pub fn new(source_container: u64, target_container: u64, type_name: impl Into<String>) -> Self {
        Self {
            source_container,
            target_container,
            type_name: type_name.into(),
            strategy: MatchStrategy::default(),
            listing_limit: DEFAULT_LISTING_LIMIT,
            continue_on_error: false,
            verify_checksums: true,
            staging_dir: None,
        }
    }

    fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            source_container: self.source_container,
            target_container: self.target_container,
            type_name: Some(self.type_name.clone()),
            strategy: self.strategy,
            listing_limit: self.listing_limit,
        }
    }
}

/// Caches owned by a single run.
#[derive(Debug, Default)]
pub struct RunState {
    pub(crate) types: TypeResolver,
    pub(crate) names: NameRegistry,
    pub(crate) parents: HashMap<ObjectRef, ObjectRef>,
}

impl RunState {
    /// Fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Type resolver for this run.
    #[must_use]
    pub const fn types(&self) -> &TypeResolver {
        &self.types
    }

    /// Names claimed in the target during this run.
    #[must_use]
    pub const fn names(&self) -> &NameRegistry {
        &self.names
    }

    /// Target copy already used for a source parent in this run.
    #[must_use]
    pub fn parent_copy(&self, source: &ObjectRef) -> Option<ObjectRef> {
        self.parents.get(source).copied()
    }
}

/// A successfully copied object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedObject {
    /// Source reference.
    pub source: ObjectRef,
    /// Target reference.
    pub target: ObjectRef,
    /// Name used in the target.
    pub name: String,
}

/// An object that failed while isolation was enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedObject {
    /// Source reference.
    pub object: ObjectRef,
    /// Stage the failure was attributed to.
    pub stage: Option<Stage>,
    /// Rendered error chain.
    pub reason: String,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Objects the planner found pending.
    pub planned: usize,
    /// Objects skipped because a copy already existed.
    pub already_copied: usize,
    /// Objects copied.
    pub copied: Vec<CopiedObject>,
    /// Objects that failed (only populated with isolation enabled).
    pub failed: Vec<FailedObject>,
}

pub(crate) struct Prepared {
    pub(crate) source: ObjectInfo,
    pub(crate) target_type: TypeString,
    pub(crate) payload: Map<String, Value>,
    pub(crate) extracted_handles: Vec<String>,
}

/// Drives copies from a source environment into a target environment.
pub struct Migrator {
    pub(crate) source: Environment,
    pub(crate) target: Environment,
    pub(crate) profiles: ProfileRegistry,
    pub(crate) settings: MigrationSettings,
    pub(crate) transfer: BlobTransfer,
    pub(crate) metrics: Option<Metrics>,
}

impl Migrator {
    /// Build a migrator.
    #[must_use]
    pub fn new(
        source: Environment,
        target: Environment,
        profiles: ProfileRegistry,
        settings: MigrationSettings,
    ) -> Self {
        let mut transfer = BlobTransfer::new(settings.verify_checksums);
        if let Some(dir) = &settings.staging_dir {
            transfer = transfer.staging_in(dir.clone());
        }
        Self {
            source,
            target,
            profiles,
            settings,
            transfer,
            metrics: None,
        }
    }

    /// Record progress counters into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run settings.
    #[must_use]
    pub const fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    /// Compute the pending set without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` when the active type has no profile, `ScaleLimit`
    /// when a listing reaches the limit, or a service error.
    pub async fn plan(&self) -> MigrateResult<CopyPlan> {
        self.profiles.get(&self.settings.type_name)?;
        planner::plan(
            self.source.workspace.as_ref(),
            self.target.workspace.as_ref(),
            &self.settings.plan_request(),
        )
        .await
    }

    /// Plan and copy every pending object with fresh run state.
    ///
    /// # Errors
    ///
    /// Returns the first failure, or only run-level failures when
    /// `continue_on_error` is set.
    pub async fn run(&self) -> MigrateResult<RunSummary> {
        let mut state = RunState::new();
        self.run_with_state(&mut state).await
    }

    /// Plan and copy every pending object, reusing `state`.
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::run`].
    pub async fn run_with_state(&self, state: &mut RunState) -> MigrateResult<RunSummary> {
        let started = Instant::now();
        let plan = self.plan().await.map_err(|err| {
            error!(error = %err, "planning failed");
            err
        })?;
        let total = plan.pending.len();
        info!(
            type_name = %self.settings.type_name,
            source_total = plan.source_total,
            already_copied = plan.already_copied,
            pending = total,
            "migration planned"
        );

        let mut summary = RunSummary {
            planned: total,
            already_copied: plan.already_copied,
            ..RunSummary::default()
        };
        for (index, info) in plan.pending.iter().enumerate() {
            let object_started = Instant::now();
            match self.migrate_object(state, info).await {
                Ok(copy) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_object_copied();
                    }
                    info!(
                        object = %info.reference,
                        target = %copy.reference,
                        name = %copy.name,
                        progress = %format!("{}/{total}", index + 1),
                        elapsed_ms = elapsed_ms(object_started),
                        total_elapsed_ms = elapsed_ms(started),
                        "object copied"
                    );
                    summary.copied.push(CopiedObject {
                        source: info.reference,
                        target: copy.reference,
                        name: copy.name,
                    });
                }
                Err(err) => {
                    let stage = err.stage();
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_object_failed(stage.map_or("unknown", Stage::as_str));
                    }
                    error!(
                        object = %info.reference,
                        stage = stage.map_or("unknown", Stage::as_str),
                        error = %error_chain(&err),
                        "object migration failed"
                    );
                    if !self.settings.continue_on_error || err.is_fatal_for_run() {
                        return Err(err);
                    }
                    summary.failed.push(FailedObject {
                        object: info.reference,
                        stage,
                        reason: error_chain(&err),
                    });
                }
            }
        }

        info!(
            copied = summary.copied.len(),
            failed = summary.failed.len(),
            elapsed_ms = elapsed_ms(started),
            "migration finished"
        );
        Ok(summary)
    }

    /// Copy one source object, resolving its parent first.
    ///
    /// # Errors
    ///
    /// Returns the failure attributed to the object and stage it occurred in.
    pub async fn migrate_object(
        &self,
        state: &mut RunState,
        info: &ObjectInfo,
    ) -> MigrateResult<ObjectInfo> {
        let object = info.reference;
        let profile = self
            .profiles
            .get(info.type_string.name())
            .at(object, Stage::ResolveType)?;
        let record = self
            .source
            .workspace
            .get_object(&[object])
            .await
            .map_err(|source| MigrateError::service("get_object", source))
            .at(object, Stage::Fetch)?;

        let mut prepared = self.prepare(state, record, profile).await?;
        if let Some(link) = profile.parent_link() {
            let parent = self
                .resolve_parent(state, &prepared, link)
                .await
                .at(object, Stage::ResolveReferences)?;
            prepared
                .payload
                .insert(link.field.to_string(), Value::String(parent.to_string()));
        }
        self.finish(state, prepared, profile).await
    }

    /// Resolve the target type and sanitize the payload.
    pub(crate) async fn prepare(
        &self,
        state: &mut RunState,
        record: ObjectRecord,
        profile: &TypeProfile,
    ) -> MigrateResult<Prepared> {
        let object = record.info.reference;
        let target_type = state
            .types
            .resolve(
                self.source.workspace.as_ref(),
                self.target.workspace.as_ref(),
                &record.info.type_string,
            )
            .await
            .at(object, Stage::ResolveType)?;
        let payload = profile
            .sanitize_fields(record.data)
            .at(object, Stage::Sanitize)?;
        debug!(object = %object, target_type = %target_type, "object prepared");
        Ok(Prepared {
            source: record.info,
            target_type,
            payload,
            extracted_handles: record.extracted_handles,
        })
    }

    /// Transfer blobs and persist the object with its marker.
    pub(crate) async fn finish(
        &self,
        state: &mut RunState,
        mut prepared: Prepared,
        profile: &TypeProfile,
    ) -> MigrateResult<ObjectInfo> {
        let object = prepared.source.reference;
        self.transfer_blobs(&mut prepared, profile)
            .await
            .at(object, Stage::TransferBlobs)?;

        let name = state.names.claim(&prepared.source.name, object);
        let marker = IdempotencyMarker::new(object, self.source.identity());
        let request = SaveRequest {
            container: self.settings.target_container,
            name,
            type_string: prepared.target_type,
            data: Value::Object(prepared.payload),
            metadata: marker.to_metadata(),
            provenance: vec![ProvenanceAction {
                description: format!("Copied from {} {object}", self.source.identity()),
                time: Some(provenance_time(Utc::now())),
            }],
        };
        self.target
            .workspace
            .save_object(request)
            .await
            .map_err(|source| MigrateError::service("save_object", source))
            .at(object, Stage::Persist)
    }

    async fn transfer_blobs(
        &self,
        prepared: &mut Prepared,
        profile: &TypeProfile,
    ) -> MigrateResult<()> {
        let mut minted: HashMap<String, String> = HashMap::new();
        for field in profile.handle_fields() {
            let Some(Value::String(source_handle)) = prepared.payload.get(*field) else {
                continue;
            };
            let source_handle = source_handle.clone();
            let target_handle = if let Some(existing) = minted.get(&source_handle) {
                existing.clone()
            } else {
                let blob = self
                    .transfer
                    .transfer(&self.source, &self.target, &source_handle)
                    .await?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_blob(blob.node.size);
                }
                minted.insert(source_handle.clone(), blob.target_handle.clone());
                blob.target_handle
            };
            prepared
                .payload
                .insert((*field).to_string(), Value::String(target_handle));
        }

        let unmapped = prepared.extracted_handles.iter().find(|handle| {
            !minted.contains_key(*handle)
                && prepared.payload.values().any(|value| mentions(value, handle))
        });
        match unmapped.cloned() {
            Some(handle) => Err(MigrateError::UnmappedHandle {
                object: prepared.source.reference,
                handle,
            }),
            None => Ok(()),
        }
    }
}

/// Whether `handle` still appears anywhere in `value`.
fn mentions(value: &Value, handle: &str) -> bool {
    match value {
        Value::String(text) => text == handle,
        Value::Array(items) => items.iter().any(|item| mentions(item, handle)),
        Value::Object(fields) => fields.values().any(|item| mentions(item, handle)),
        _ => false,
    }
}

/// Workspace timestamps are whole seconds with a `Z` zone.
fn provenance_time(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn error_chain(err: &MigrateError) -> String {
    let mut rendered = err.to_string();
    let mut current: Option<&dyn std::error::Error> = std::error::Error::source(err);
    while let Some(cause) = current {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_marker_matching_and_verification() {
        let settings = MigrationSettings::new(1, 2, "KBaseGenomes.Genome");
        assert_eq!(settings.strategy, MatchStrategy::Marker);
        assert_eq!(settings.listing_limit, DEFAULT_LISTING_LIMIT);
        assert!(settings.verify_checksums);
        assert!(!settings.continue_on_error);
        assert_eq!(
            settings.plan_request().type_name.as_deref(),
            Some("KBaseGenomes.Genome")
        );
    }

    #[test]
    fn provenance_time_drops_fractions_and_uses_zulu() {
        let now = DateTime::parse_from_rfc3339("2024-03-01T10:00:05.123456789+00:00")
            .map(|time| time.with_timezone(&Utc));
        assert!(matches!(
            now.map(provenance_time).as_deref(),
            Ok("2024-03-01T10:00:05Z")
        ));
    }

    #[test]
    fn error_chain_renders_every_cause() {
        let err = MigrateError::ScaleLimit {
            container: 3,
            count: 5,
            limit: 5,
        }
        .at(ObjectRef::new(1, 2, 3), Stage::Plan);
        assert_eq!(
            error_chain(&err),
            "1/2/3 failed at stage plan: listing container 3 returned 5 objects, reaching the limit of 5"
        );
    }
}
