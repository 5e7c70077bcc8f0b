//! Source-to-target type resolution through content fingerprints.
//!
//! # Design
//! - A source type maps to its fingerprint in the source registry; the target
//!   registry lists every type string sharing that fingerprint.
//! - Highest numeric `(major, minor)` wins. Candidates for a different type
//!   name or without a numeric version are ignored.
//! - No candidate means the bare type name, which the target store resolves to
//!   its latest accepted version.
//! - Results are memoised for the lifetime of one resolver (one run).

use std::collections::HashMap;

use tracing::{debug, warn};
use wscopy_core::{TypeString, Workspace};

use crate::error::{MigrateError, MigrateResult};

/// Memoising source-to-target type resolver owned by a single run.
#[derive(Debug, Default)]
pub struct TypeResolver {
    cache: HashMap<TypeString, TypeString>,
    lookups: usize,
}

impl TypeResolver {
    /// Empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `source_type` into the equivalent target type.
    ///
    /// # Errors
    ///
    /// Returns an error when either registry call fails.
    pub async fn resolve(
        &mut self,
        source: &dyn Workspace,
        target: &dyn Workspace,
        source_type: &TypeString,
    ) -> MigrateResult<TypeString> {
        if let Some(hit) = self.cache.get(source_type) {
            debug!(source_type = %source_type, target_type = %hit, "type resolution cache hit");
            return Ok(hit.clone());
        }

        self.lookups += 1;
        let fingerprint = source
            .type_fingerprint(source_type)
            .await
            .map_err(|source| MigrateError::service("translate_type_to_fingerprint", source))?;
        let candidates = target
            .types_for_fingerprint(&fingerprint)
            .await
            .map_err(|source| MigrateError::service("translate_fingerprint_to_types", source))?;

        let resolved = if let Some(latest) = select_latest(source_type.name(), &candidates) {
            debug!(source_type = %source_type, target_type = %latest, "type resolved by fingerprint");
            latest
        } else {
            warn!(
                source_type = %source_type,
                fingerprint = %fingerprint,
                "no target type shares the fingerprint; falling back to the latest target version"
            );
            source_type.bare()
        };

        self.cache.insert(source_type.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Registry lookups performed so far (cache misses).
    #[must_use]
    pub const fn lookups(&self) -> usize {
        self.lookups
    }

    /// Cached resolution for `source_type`, if any.
    #[must_use]
    pub fn cached(&self, source_type: &TypeString) -> Option<&TypeString> {
        self.cache.get(source_type)
    }
}

/// Pick the highest `(major, minor)` candidate named `name`.
///
/// Candidates that fail to parse, carry no version, or belong to another type
/// name are skipped.
#[must_use]
pub fn select_latest(name: &str, candidates: &[String]) -> Option<TypeString> {
    candidates
        .iter()
        .filter_map(|candidate| match TypeString::parse(candidate) {
            Ok(parsed) if parsed.name() == name && parsed.version().is_some() => Some(parsed),
            Ok(parsed) => {
                debug!(candidate = %parsed, expected = name, "ignoring fingerprint candidate");
                None
            }
            Err(error) => {
                warn!(candidate = %candidate, error = %error, "ignoring unparseable type candidate");
                None
            }
        })
        .max_by_key(TypeString::version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn highest_major_minor_wins_numerically() -> anyhow::Result<()> {
        let picked = select_latest(
            "KBaseGenomes.Genome",
            &strings(&[
                "KBaseGenomes.Genome-9.2",
                "KBaseGenomes.Genome-10.0",
                "KBaseGenomes.Genome-9.10",
            ]),
        );
        assert_eq!(picked, Some(TypeString::parse("KBaseGenomes.Genome-10.0")?));
        Ok(())
    }

    #[test]
    fn non_numeric_and_foreign_candidates_are_skipped() -> anyhow::Result<()> {
        let picked = select_latest(
            "KBaseGenomes.Genome",
            &strings(&[
                "KBaseGenomes.Genome-beta.1",
                "Other.Genome-99.0",
                "KBaseGenomes.Genome",
                "KBaseGenomes.Genome-3.1",
            ]),
        );
        assert_eq!(picked, Some(TypeString::parse("KBaseGenomes.Genome-3.1")?));
        Ok(())
    }

    #[test]
    fn empty_candidate_list_has_no_latest() {
        assert_eq!(select_latest("KBaseGenomes.Genome", &[]), None);
    }
}
