//! Per-type capabilities: payload transforms, blob handle fields, and the
//! optional parent reference.
//!
//! # Design
//! - Profiles are keyed by bare type name and registered independently; adding
//!   a type never touches another entry.
//! - A type without a profile cannot be migrated.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{MigrateError, MigrateResult};
use crate::sanitize::{self, Transform};

/// Assembly type family.
pub const ASSEMBLY_TYPE: &str = "KBaseGenomeAnnotations.Assembly";
/// Genome type family.
pub const GENOME_TYPE: &str = "KBaseGenomes.Genome";

/// Payload field holding a reference to a parent object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    /// Payload field carrying the parent reference.
    pub field: &'static str,
    /// Type family the parent must belong to.
    pub type_name: &'static str,
}

/// Capabilities of one type.
#[derive(Debug, Clone)]
pub struct TypeProfile {
    type_name: &'static str,
    transforms: Vec<Transform>,
    handle_fields: Vec<&'static str>,
    parent: Option<ParentLink>,
}

impl TypeProfile {
    /// Profile with no transforms, handles, or parent.
    #[must_use]
    pub const fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            transforms: Vec::new(),
            handle_fields: Vec::new(),
            parent: None,
        }
    }

    /// Append a payload transform.
    #[must_use]
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Declare a top-level field holding a blob handle.
    #[must_use]
    pub fn handle_field(mut self, field: &'static str) -> Self {
        self.handle_fields.push(field);
        self
    }

    /// Declare the parent reference field and its type family.
    #[must_use]
    pub fn parent(mut self, field: &'static str, type_name: &'static str) -> Self {
        self.parent = Some(ParentLink { field, type_name });
        self
    }

    /// Bare type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Ordered transforms.
    #[must_use]
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// Fields holding blob handles.
    #[must_use]
    pub fn handle_fields(&self) -> &[&'static str] {
        &self.handle_fields
    }

    /// Parent reference, if the type declares one.
    #[must_use]
    pub const fn parent_link(&self) -> Option<ParentLink> {
        self.parent
    }

    /// Run every transform over `payload`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` when `payload` is not a mapping.
    pub fn sanitize(&self, payload: Value) -> MigrateResult<Value> {
        self.sanitize_fields(payload).map(Value::Object)
    }

    pub(crate) fn sanitize_fields(&self, payload: Value) -> MigrateResult<Map<String, Value>> {
        let Value::Object(mut fields) = payload else {
            return Err(MigrateError::InvalidPayload {
                type_name: self.type_name.to_string(),
            });
        };
        sanitize::apply_all(self.type_name, &self.transforms, &mut fields);
        Ok(fields)
    }
}

/// Registry of type profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<&'static str, TypeProfile>,
}

impl ProfileRegistry {
    /// Registry with no profiles.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assembly and genome profiles.
    #[must_use]
    pub fn builtin() -> Self {
        let mut profiles = BTreeMap::new();
        for profile in [assembly_profile(), genome_profile()] {
            profiles.insert(profile.type_name(), profile);
        }
        Self { profiles }
    }

    /// Add a profile.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateProfile` when the type already has one.
    pub fn register(&mut self, profile: TypeProfile) -> MigrateResult<()> {
        if self.profiles.contains_key(profile.type_name()) {
            return Err(MigrateError::DuplicateProfile {
                type_name: profile.type_name().to_string(),
            });
        }
        self.profiles.insert(profile.type_name(), profile);
        Ok(())
    }

    /// Profile for `type_name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` when no profile is registered.
    pub fn get(&self, type_name: &str) -> MigrateResult<&TypeProfile> {
        self.profiles
            .get(type_name)
            .ok_or_else(|| MigrateError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    /// Sanitize `payload` with the profile of `type_name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` for unregistered types and `InvalidPayload` for
    /// non-mapping payloads.
    pub fn sanitize(&self, type_name: &str, payload: Value) -> MigrateResult<Value> {
        self.get(type_name)?.sanitize(payload)
    }

    /// Registered type names in order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.profiles.keys().copied()
    }
}

fn assembly_profile() -> TypeProfile {
    TypeProfile::new(ASSEMBLY_TYPE)
        .transform(Transform::DropField("fasta_handle_info"))
        .handle_field("fasta_handle_ref")
}

fn genome_profile() -> TypeProfile {
    TypeProfile::new(GENOME_TYPE)
        .transform(Transform::DropField("taxon_ref"))
        .transform(Transform::RejectEntries {
            list: "ontology_events",
            marker: "ontology_ref",
        })
        .handle_field("genbank_handle_ref")
        .handle_field("gff_handle_ref")
        .handle_field("fasta_handle_ref")
        .parent("assembly_ref", ASSEMBLY_TYPE)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builtin_registry_knows_assemblies_and_genomes() -> anyhow::Result<()> {
        let registry = ProfileRegistry::builtin();
        assert_eq!(
            registry.type_names().collect::<Vec<_>>(),
            vec![ASSEMBLY_TYPE, GENOME_TYPE]
        );
        let genome = registry.get(GENOME_TYPE)?;
        assert_eq!(
            genome.parent_link(),
            Some(ParentLink {
                field: "assembly_ref",
                type_name: ASSEMBLY_TYPE
            })
        );
        assert_eq!(genome.handle_fields().len(), 3);
        assert!(registry.get(ASSEMBLY_TYPE)?.parent_link().is_none());
        Ok(())
    }

    #[test]
    fn unknown_types_are_rejected() {
        let registry = ProfileRegistry::builtin();
        let err = registry.sanitize("KBaseFBA.FBAModel", json!({}));
        assert!(matches!(err, Err(MigrateError::UnknownType { type_name }) if type_name == "KBaseFBA.FBAModel"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ProfileRegistry::builtin();
        let err = registry.register(TypeProfile::new(GENOME_TYPE));
        assert!(matches!(err, Err(MigrateError::DuplicateProfile { .. })));
    }

    #[test]
    fn registering_a_type_leaves_others_untouched() -> anyhow::Result<()> {
        let mut registry = ProfileRegistry::builtin();
        registry.register(TypeProfile::new("KBaseSets.ReadsSet"))?;
        let payload = json!({"taxon_ref": "1/2/3", "items": []});
        assert_eq!(
            registry.sanitize("KBaseSets.ReadsSet", payload.clone())?,
            payload
        );
        assert_eq!(
            registry.sanitize(GENOME_TYPE, payload)?,
            json!({"items": []})
        );
        Ok(())
    }

    #[test]
    fn genome_sanitizing_strips_source_artifacts() -> anyhow::Result<()> {
        let registry = ProfileRegistry::builtin();
        let cleaned = registry.sanitize(
            GENOME_TYPE,
            json!({
                "id": "g1",
                "taxon_ref": "5/6/7",
                "ontology_events": [{"ontology_ref": "1/1/1"}, {"method": "manual"}]
            }),
        )?;
        assert_eq!(
            cleaned,
            json!({"id": "g1", "ontology_events": [{"method": "manual"}]})
        );
        Ok(())
    }

    #[test]
    fn non_mapping_payloads_are_invalid() {
        let registry = ProfileRegistry::builtin();
        assert!(matches!(
            registry.sanitize(ASSEMBLY_TYPE, json!([1, 2])),
            Err(MigrateError::InvalidPayload { .. })
        ));
    }
}
