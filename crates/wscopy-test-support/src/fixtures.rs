//! Builders for sample service fixtures.

use serde_json::{Value, json};
use wscopy_core::{DataLink, ObjectRef, SampleRecord};

/// Sample document with one root node, shaped like the sample service returns it.
#[must_use]
pub fn sample_record(id: &str, version: u64, name: &str) -> SampleRecord {
    let value = json!({
        "id": id,
        "version": version,
        "name": name,
        "user": "owner",
        "save_date": 1_700_000_000_000_u64,
        "node_tree": [{
            "id": "root",
            "type": "BioReplicate",
            "parent": null,
            "meta_controlled": {},
            "meta_user": {}
        }]
    });
    match value {
        Value::Object(map) => map,
        _ => SampleRecord::new(),
    }
}

/// Link from `upa` to node `node` of sample `id` at `version`.
#[must_use]
pub fn data_link(upa: ObjectRef, id: &str, version: u64, node: &str) -> DataLink {
    DataLink {
        upa,
        dataid: None,
        sample_id: id.to_string(),
        version,
        node: node.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_record_carries_identity() {
        let record = sample_record("s-1", 1, "soil");
        assert_eq!(record.get("id"), Some(&Value::from("s-1")));
        assert_eq!(record.get("version"), Some(&Value::from(1)));
    }
}
