//! Record shrinking.
//!
//! The remote index enforces a per-record size quota. [`fit_to_size`]
//! degrades a record's excerpt in stages until its JSON encoding fits:
//!
//! 1. already small enough → unchanged
//! 2. no `excerpt_html` → [`ShrinkError::Unshrinkable`]
//! 3. `excerpt_html` replaced by the plain `excerpt_text`
//! 4. `excerpt_text` halved by word count, mirrored into `excerpt_html`
//! 5. both excerpts removed, or [`ShrinkError::StillTooBig`]
//!
//! Fields are only ever shortened or removed.

use serde_json::Value;
use thiserror::Error;

use crate::models::Record;

/// Serialized size of one top-level record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSize {
    pub name: String,
    pub bytes: usize,
}

#[derive(Debug, Error)]
pub enum ShrinkError {
    #[error("record for {} is {size} bytes (max {max}) and has no excerpt to shrink", .record.url)]
    Unshrinkable {
        record: Box<Record>,
        size: usize,
        max: usize,
        largest_fields: Vec<FieldSize>,
    },

    #[error("record for {} is still {size} bytes (max {max}) after removing its excerpts", .record.url)]
    StillTooBig {
        record: Box<Record>,
        size: usize,
        max: usize,
        largest_fields: Vec<FieldSize>,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ShrinkError {
    /// The record as it was when shrinking gave up.
    pub fn record(&self) -> Option<&Record> {
        match self {
            ShrinkError::Unshrinkable { record, .. } | ShrinkError::StillTooBig { record, .. } => {
                Some(record)
            }
            ShrinkError::Serialize(_) => None,
        }
    }

    pub fn largest_fields(&self) -> &[FieldSize] {
        match self {
            ShrinkError::Unshrinkable { largest_fields, .. }
            | ShrinkError::StillTooBig { largest_fields, .. } => largest_fields,
            ShrinkError::Serialize(_) => &[],
        }
    }
}

/// Shrink `record` until its JSON encoding is at most `max_bytes` long.
pub fn fit_to_size(record: Record, max_bytes: usize) -> Result<Record, ShrinkError> {
    let size = record.serialized_size()?;
    if size <= max_bytes {
        return Ok(record);
    }

    if record.excerpt_html.is_none() {
        let largest_fields = largest_fields(&record)?;
        return Err(ShrinkError::Unshrinkable {
            record: Box::new(record),
            size,
            max: max_bytes,
            largest_fields,
        });
    }

    let mut record = record;

    // Drop the markup overhead.
    record.excerpt_html = Some(record.excerpt_text.clone().unwrap_or_default());
    if record.serialized_size()? <= max_bytes {
        return Ok(record);
    }

    let halved = halve_words(record.excerpt_html.as_deref().unwrap_or_default());
    if record.excerpt_text.is_some() {
        record.excerpt_text = Some(halved.clone());
    }
    record.excerpt_html = Some(halved);
    if record.serialized_size()? <= max_bytes {
        return Ok(record);
    }

    record.excerpt_text = None;
    record.excerpt_html = None;
    let size = record.serialized_size()?;
    if size <= max_bytes {
        return Ok(record);
    }

    let largest_fields = largest_fields(&record)?;
    Err(ShrinkError::StillTooBig {
        record: Box::new(record),
        size,
        max: max_bytes,
        largest_fields,
    })
}

/// First half of the words of `text`, joined by single spaces.
fn halve_words(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words[..words.len() / 2].join(" ")
}

/// Top-level fields of `record` ordered by serialized size, largest first.
pub fn largest_fields(record: &Record) -> Result<Vec<FieldSize>, serde_json::Error> {
    let value = serde_json::to_value(record)?;
    let Value::Object(map) = value else {
        return Ok(Vec::new());
    };

    let mut fields = map
        .iter()
        .map(|(name, value)| {
            Ok(FieldSize {
                name: name.clone(),
                bytes: crate::models::serialized_size(value)?,
            })
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    fields.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.name.cmp(&b.name)));
    Ok(fields)
}
