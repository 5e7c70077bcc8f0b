//! Parent reference resolution: reuse an existing target copy or copy the
//! parent on demand, one hop deep.
//!
//! # Design
//! - Existing copies are found by idempotency marker in the target container.
//! - A parent's type family is checked against the declaring profile both for
//!   reused copies and for fresh source fetches; a mismatch is never retried.
//! - Claimed names are tracked for the run only; collisions get a suffix
//!   derived from the source reference.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{info, warn};
use wscopy_core::{COPY_SOURCE_UPA, ListQuery, ObjectInfo, ObjectRef, Workspace};

use crate::error::{MigrateError, MigrateResult, Stage, StageExt};
use crate::migrate::{Migrator, Prepared, RunState};
use crate::planner::check_limit;
use crate::profile::ParentLink;

/// Names used in the target during one run.
#[derive(Debug, Default)]
pub struct NameRegistry {
    claimed: HashSet<String>,
}

impl NameRegistry {
    /// Claim `name` for `source`, suffixing it with the source reference when
    /// another object already claimed it in this run.
    pub fn claim(&mut self, name: &str, source: ObjectRef) -> String {
        if self.claimed.insert(name.to_string()) {
            return name.to_string();
        }
        let suffixed = format!("{name}_{}", source.name_suffix());
        warn!(name, renamed = %suffixed, object = %source, "target name already used in this run");
        self.claimed.insert(suffixed.clone());
        suffixed
    }

    /// Mark `name` as taken by an object that already exists in the target.
    pub fn reserve(&mut self, name: &str) {
        self.claimed.insert(name.to_string());
    }

    /// Whether `name` was claimed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.claimed.contains(name)
    }
}

/// Existing target copy of `source`, looked up by idempotency marker.
///
/// Several matching copies can only come from concurrent runs; the lowest
/// reference is chosen so repeated runs agree.
///
/// # Errors
///
/// Returns `ScaleLimit` when the listing reaches `listing_limit`, or a service
/// error when the listing fails.
pub async fn find_copy(
    target: &dyn Workspace,
    container: u64,
    source: ObjectRef,
    source_url: &str,
    listing_limit: usize,
) -> MigrateResult<Option<ObjectInfo>> {
    let query = ListQuery::container(container)
        .with_metadata()
        .where_metadata(COPY_SOURCE_UPA, source.to_string());
    let listed = target
        .list_objects(&query)
        .await
        .map_err(|error| MigrateError::service("find_existing_copy", error))?;
    check_limit(container, listed.len(), listing_limit)?;

    let mut copies: Vec<ObjectInfo> = listed
        .into_iter()
        .filter(|info| {
            matches!(info.marker(), Ok(Some(marker)) if marker.source == source && marker.is_from(source_url))
        })
        .collect();
    copies.sort_by_key(|info| info.reference);
    if copies.len() > 1 {
        warn!(
            object = %source,
            copies = copies.len(),
            chosen = %copies[0].reference,
            "several target objects carry the same copy marker"
        );
    }
    Ok(copies.into_iter().next())
}

impl Migrator {
    /// Target reference to substitute for the parent named by `link` in `child`.
    pub(crate) async fn resolve_parent(
        &self,
        state: &mut RunState,
        child: &Prepared,
        link: ParentLink,
    ) -> MigrateResult<ObjectRef> {
        let child_ref = child.source.reference;
        let parent_ref = parent_reference(&child.payload, link.field)?;
        if let Some(copy) = state.parent_copy(&parent_ref) {
            return Ok(copy);
        }

        let existing = find_copy(
            self.target.workspace.as_ref(),
            self.settings.target_container,
            parent_ref,
            self.source.identity(),
            self.settings.listing_limit,
        )
        .await?;
        let resolved = if let Some(copy) = existing {
            ensure_family(child_ref, parent_ref, link, copy.type_string.name())?;
            state.names.reserve(&copy.name);
            if let Some(metrics) = &self.metrics {
                metrics.inc_parent_reused();
            }
            info!(object = %child_ref, parent = %parent_ref, copy = %copy.reference, "reusing parent copy");
            copy.reference
        } else {
            let copy = self.copy_parent(state, child_ref, parent_ref, link).await?;
            if let Some(metrics) = &self.metrics {
                metrics.inc_parent_copied();
            }
            info!(object = %child_ref, parent = %parent_ref, copy = %copy.reference, "parent copied");
            copy.reference
        };

        state.parents.insert(parent_ref, resolved);
        Ok(resolved)
    }

    async fn copy_parent(
        &self,
        state: &mut RunState,
        child_ref: ObjectRef,
        parent_ref: ObjectRef,
        link: ParentLink,
    ) -> MigrateResult<ObjectInfo> {
        let record = self
            .source
            .workspace
            .get_object(&[child_ref, parent_ref])
            .await
            .map_err(|error| MigrateError::service("get_parent_object", error))
            .at(parent_ref, Stage::Fetch)?;
        ensure_family(child_ref, parent_ref, link, record.info.type_string.name())?;

        let profile = self.profiles.get(link.type_name)?;
        if profile.parent_link().is_some() {
            return Err(MigrateError::NestedReference {
                type_name: link.type_name.to_string(),
            });
        }
        let prepared = self.prepare(state, record, profile).await?;
        self.finish(state, prepared, profile).await
    }
}

fn parent_reference(
    payload: &serde_json::Map<String, Value>,
    field: &'static str,
) -> MigrateResult<ObjectRef> {
    match payload.get(field) {
        Some(Value::String(raw)) => raw.parse().map_err(|error| MigrateError::InvalidReference {
            field: field.to_string(),
            value: raw.clone(),
            source: Some(error),
        }),
        other => Err(MigrateError::InvalidReference {
            field: field.to_string(),
            value: other.map_or_else(|| "null".to_string(), Value::to_string),
            source: None,
        }),
    }
}

fn ensure_family(
    object: ObjectRef,
    parent: ObjectRef,
    link: ParentLink,
    actual: &str,
) -> MigrateResult<()> {
    if actual == link.type_name {
        return Ok(());
    }
    Err(MigrateError::SchemaMismatch {
        object,
        parent,
        expected: link.type_name.to_string(),
        actual: actual.to_string(),
    })
}
