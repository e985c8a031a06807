//! Core data models used throughout searchsync.
//!
//! A [`Record`] is one indexable unit of content. Records are created by the
//! hierarchy extractor, identified by their content fingerprint, shrunk to
//! fit the remote size quota, and finally pushed to the remote index.

use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of heading levels tracked in a record hierarchy (`h1`..`h6`).
pub const HIERARCHY_DEPTH: usize = 6;

/// Kind of site document a record was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Page,
    Post,
    Document,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Page => "page",
            RecordType::Post => "post",
            RecordType::Document => "document",
        }
    }
}

/// Snapshot of the open headings at the moment a node was extracted.
///
/// `lvl0` holds the innermost open `h1`, `lvl5` the innermost open `h6`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub lvl0: Option<String>,
    pub lvl1: Option<String>,
    pub lvl2: Option<String>,
    pub lvl3: Option<String>,
    pub lvl4: Option<String>,
    pub lvl5: Option<String>,
}

impl Hierarchy {
    pub fn from_levels(levels: &[Option<String>; HIERARCHY_DEPTH]) -> Self {
        let [lvl0, lvl1, lvl2, lvl3, lvl4, lvl5] = levels.clone();
        Self {
            lvl0,
            lvl1,
            lvl2,
            lvl3,
            lvl4,
            lvl5,
        }
    }

    pub fn levels(&self) -> [Option<&str>; HIERARCHY_DEPTH] {
        [
            self.lvl0.as_deref(),
            self.lvl1.as_deref(),
            self.lvl2.as_deref(),
            self.lvl3.as_deref(),
            self.lvl4.as_deref(),
            self.lvl5.as_deref(),
        ]
    }
}

/// Default ranking signals attached to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weight {
    /// Higher when the enclosing heading is shallower.
    pub heading: i64,
    /// 0-based index of the node among the document's emitted records.
    pub position: usize,
}

/// One indexable unit of content.
///
/// Serializes to the JSON object pushed to the remote index. Unknown fields
/// (document metadata, hook additions) are kept in [`Record::extra`] and
/// flattened into the top-level object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "objectID", default)]
    pub object_id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub hierarchy: Hierarchy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    pub weight: Weight,
    pub tag_name: String,
    pub html: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt_text: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Record {
    /// Byte length of the record's JSON encoding.
    pub fn serialized_size(&self) -> Result<usize, serde_json::Error> {
        serialized_size(self)
    }
}

/// Byte length of the JSON encoding of `value`, without buffering it.
pub fn serialized_size<T: Serialize + ?Sized>(value: &T) -> Result<usize, serde_json::Error> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.0)
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
