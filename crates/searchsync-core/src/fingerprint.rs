//! Content-addressed identifiers.
//!
//! A record's `objectID` is the SHA-256 of its canonical JSON encoding with
//! the `objectID` field itself removed. Canonical means object keys are
//! written in sorted order at every depth, so the identifier does not depend
//! on field order, wall-clock time, or anything but the record's content.
//!
//! The same hashing backs the settings fingerprint stored in the remote
//! index (see [`crate::settings`]).

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::Record;

/// Field excluded from a record's own fingerprint.
pub const OBJECT_ID_FIELD: &str = "objectID";

/// Compute the content fingerprint of a record.
pub fn fingerprint(record: &Record) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        map.remove(OBJECT_ID_FIELD);
    }
    Ok(fingerprint_value(&value))
}

/// Set `record.object_id` to the record's fingerprint.
pub fn assign_object_id(record: &mut Record) -> Result<(), serde_json::Error> {
    record.object_id = fingerprint(record)?;
    Ok(())
}

/// SHA-256 (lowercase hex) of the canonical encoding of `value`.
///
/// `serde_json::Map` keeps keys sorted unless the `preserve_order` feature
/// is enabled, so the compact encoding is already canonical.
pub fn fingerprint_value(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
