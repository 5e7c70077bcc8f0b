//! Payload transforms applied before an object is saved in the target.

use serde_json::{Map, Value};
use tracing::trace;

/// Free-form payload edit.
pub type PayloadFn = fn(&mut Map<String, Value>);

/// One structural edit of an object payload.
#[derive(Debug, Clone)]
pub enum Transform {
    /// Remove a top-level field.
    DropField(&'static str),
    /// In the list stored under `list`, drop every mapping entry carrying `marker`.
    RejectEntries {
        /// Top-level list field.
        list: &'static str,
        /// Key whose presence rejects an entry.
        marker: &'static str,
    },
    /// Arbitrary edit.
    Custom {
        /// Label used in logs.
        name: &'static str,
        /// Edit to run.
        apply: PayloadFn,
    },
}

impl Transform {
    /// Apply the edit in place.
    pub fn apply(&self, payload: &mut Map<String, Value>) {
        match self {
            Self::DropField(field) => {
                payload.remove(*field);
            }
            Self::RejectEntries { list, marker } => {
                if let Some(Value::Array(entries)) = payload.get_mut(*list) {
                    entries.retain(|entry| {
                        entry
                            .as_object()
                            .is_none_or(|fields| !fields.contains_key(*marker))
                    });
                }
            }
            Self::Custom { apply, .. } => apply(payload),
        }
    }

    /// Label used in logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::DropField(field) => format!("drop {field}"),
            Self::RejectEntries { list, marker } => format!("reject {list}[*] with {marker}"),
            Self::Custom { name, .. } => (*name).to_string(),
        }
    }
}

/// Apply `transforms` in order, tracing each one as it runs.
pub(crate) fn apply_all(
    type_name: &str,
    transforms: &[Transform],
    payload: &mut Map<String, Value>,
) {
    for transform in transforms {
        trace!(type_name, transform = %transform.describe(), "applying transform");
        transform.apply(payload);
    }
}
