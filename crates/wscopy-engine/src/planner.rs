//! Decide which source objects still need a copy.
//!
//! # Design
//! - Listings are not paginated; a listing that reaches the limit stops the run
//!   instead of being silently truncated.
//! - Output keeps source listing order and lists each source reference once.
//! - Marker matching only trusts markers written by copies from the same
//!   source workspace URL.

use std::collections::HashSet;

use tracing::{debug, warn};
use wscopy_core::{ListQuery, MatchStrategy, ObjectInfo, ObjectRef, Workspace};

use crate::error::{MigrateError, MigrateResult};

/// Inputs to a planning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    /// Source container.
    pub source_container: u64,
    /// Target container.
    pub target_container: u64,
    /// Restrict both listings to this type name.
    pub type_name: Option<String>,
    /// How existing copies are recognised.
    pub strategy: MatchStrategy,
    /// Listing size at which enumeration is considered truncated.
    pub listing_limit: usize,
}

/// Result of a planning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    /// Distinct source objects listed.
    pub source_total: usize,
    /// Source objects that already have a copy.
    pub already_copied: usize,
    /// Source objects still to copy, in source listing order.
    pub pending: Vec<ObjectInfo>,
}

/// List both containers and compute the pending set.
///
/// # Errors
///
/// Returns `ScaleLimit` when either listing reaches the limit, or a service
/// error when a listing fails.
pub async fn plan(
    source: &dyn Workspace,
    target: &dyn Workspace,
    request: &PlanRequest,
) -> MigrateResult<CopyPlan> {
    let mut source_query = ListQuery::container(request.source_container);
    let mut target_query = ListQuery::container(request.target_container);
    if let Some(type_name) = &request.type_name {
        source_query = source_query.of_type(type_name.clone());
        target_query = target_query.of_type(type_name.clone());
    }
    if request.strategy == MatchStrategy::Marker {
        target_query = target_query.with_metadata();
    }

    let source_objects = source
        .list_objects(&source_query)
        .await
        .map_err(|source| MigrateError::service("list_source_objects", source))?;
    check_limit(
        request.source_container,
        source_objects.len(),
        request.listing_limit,
    )?;
    let target_objects = target
        .list_objects(&target_query)
        .await
        .map_err(|source| MigrateError::service("list_target_objects", source))?;
    check_limit(
        request.target_container,
        target_objects.len(),
        request.listing_limit,
    )?;

    let pending = pending_objects(
        &source_objects,
        &target_objects,
        request.strategy,
        source.url(),
    );
    let source_total = source_objects
        .iter()
        .map(|info| info.reference)
        .collect::<HashSet<_>>()
        .len();
    debug!(
        source_total,
        target_total = target_objects.len(),
        pending = pending.len(),
        strategy = request.strategy.as_str(),
        "copy plan computed"
    );
    Ok(CopyPlan {
        source_total,
        already_copied: source_total - pending.len(),
        pending,
    })
}

/// Source objects without a copy in `target`, in source order, each once.
#[must_use]
pub fn pending_objects(
    source: &[ObjectInfo],
    target: &[ObjectInfo],
    strategy: MatchStrategy,
    source_url: &str,
) -> Vec<ObjectInfo> {
    let copied = match strategy {
        MatchStrategy::Marker => Copied::Refs(copied_refs(target, source_url)),
        MatchStrategy::Name => Copied::Names(target.iter().map(|info| info.name.as_str()).collect()),
    };

    let mut seen = HashSet::new();
    source
        .iter()
        .filter(|info| seen.insert(info.reference))
        .filter(|info| !copied.contains(info))
        .cloned()
        .collect()
}

enum Copied<'a> {
    Refs(HashSet<ObjectRef>),
    Names(HashSet<&'a str>),
}

impl Copied<'_> {
    fn contains(&self, info: &ObjectInfo) -> bool {
        match self {
            Self::Refs(refs) => refs.contains(&info.reference),
            Self::Names(names) => names.contains(info.name.as_str()),
        }
    }
}

fn copied_refs(target: &[ObjectInfo], source_url: &str) -> HashSet<ObjectRef> {
    target
        .iter()
        .filter_map(|info| match info.marker() {
            Ok(Some(marker)) if marker.is_from(source_url) => Some(marker.source),
            Ok(_) => None,
            Err(error) => {
                warn!(object = %info.reference, error = %error, "ignoring unreadable copy marker");
                None
            }
        })
        .collect()
}

pub(crate) const fn check_limit(container: u64, count: usize, limit: usize) -> MigrateResult<()> {
    if count >= limit {
        return Err(MigrateError::ScaleLimit {
            container,
            count,
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use wscopy_core::{IdempotencyMarker, TypeString};

    use super::*;

    const SOURCE_URL: &str = "https://source.example/services/ws";

    fn info(reference: ObjectRef, name: &str) -> ObjectInfo {
        ObjectInfo {
            reference,
            name: name.to_string(),
            type_string: TypeString::new("KBaseGenomes.Genome", None),
            saved_at: "2024-01-01T00:00:00+0000".into(),
            saved_by: "someone".into(),
            container_name: "container".into(),
            checksum: "0".into(),
            size: 1,
            metadata: BTreeMap::new(),
        }
    }

    fn copy_of(source: ObjectRef, url: &str, target: ObjectRef, name: &str) -> ObjectInfo {
        let mut copy = info(target, name);
        copy.metadata = IdempotencyMarker::new(source, url).to_metadata();
        copy
    }

    #[test]
    fn marker_strategy_skips_marked_copies_only() {
        let a = ObjectRef::new(1, 1, 1);
        let b = ObjectRef::new(1, 2, 4);
        let source = vec![info(a, "a"), info(b, "b")];
        let target = vec![copy_of(a, SOURCE_URL, ObjectRef::new(9, 1, 1), "renamed")];
        let pending = pending_objects(&source, &target, MatchStrategy::Marker, SOURCE_URL);
        assert_eq!(pending, vec![info(b, "b")]);
    }

    #[test]
    fn markers_from_other_sources_do_not_count() {
        let a = ObjectRef::new(1, 1, 1);
        let target = vec![copy_of(
            a,
            "https://elsewhere.example/services/ws",
            ObjectRef::new(9, 1, 1),
            "a",
        )];
        let pending = pending_objects(&[info(a, "a")], &target, MatchStrategy::Marker, SOURCE_URL);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn newer_source_versions_need_a_new_copy() {
        let copied = ObjectRef::new(1, 1, 1);
        let newer = ObjectRef::new(1, 1, 2);
        let target = vec![copy_of(copied, SOURCE_URL, ObjectRef::new(9, 1, 1), "a")];
        let pending =
            pending_objects(&[info(newer, "a")], &target, MatchStrategy::Marker, SOURCE_URL);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn name_strategy_compares_display_names() {
        let source = vec![
            info(ObjectRef::new(1, 1, 1), "a"),
            info(ObjectRef::new(1, 2, 1), "b"),
        ];
        let target = vec![info(ObjectRef::new(9, 5, 1), "a")];
        let pending = pending_objects(&source, &target, MatchStrategy::Name, SOURCE_URL);
        assert_eq!(pending, vec![info(ObjectRef::new(1, 2, 1), "b")]);
    }

    #[test]
    fn duplicate_source_entries_appear_once_in_order() {
        let a = ObjectRef::new(1, 1, 1);
        let b = ObjectRef::new(1, 2, 1);
        let source = vec![info(b, "b"), info(a, "a"), info(b, "b")];
        let pending = pending_objects(&source, &[], MatchStrategy::Marker, SOURCE_URL);
        assert_eq!(pending, vec![info(b, "b"), info(a, "a")]);
    }

    #[test]
    fn half_written_markers_are_ignored() {
        let a = ObjectRef::new(1, 1, 1);
        let mut broken = info(ObjectRef::new(9, 1, 1), "a");
        broken
            .metadata
            .insert(wscopy_core::COPY_SOURCE_UPA.into(), a.to_string());
        let pending = pending_objects(&[info(a, "a")], &[broken], MatchStrategy::Marker, SOURCE_URL);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn limit_is_reached_at_equality() {
        assert!(check_limit(1, 9, 10).is_ok());
        assert!(matches!(
            check_limit(1, 10, 10),
            Err(MigrateError::ScaleLimit {
                container: 1,
                count: 10,
                limit: 10
            })
        ));
    }
}
