//! Errors raised while building records and reconciling the remote index.
//!
//! Every variant is fatal for the current run. [`SyncError::remediation`]
//! turns the known failure modes into a hint printed next to the error.

use thiserror::Error;

use searchsync_core::extract::ExtractError;
use searchsync_core::shrink::{FieldSize, ShrinkError};
use searchsync_core::store::{RemoteError, RemoteErrorKind};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("no records to push to index '{index}'")]
    NoRecords { index: String },

    #[error("record for {url} is {size} bytes (max {max}) and has no excerpt to shrink")]
    Unshrinkable {
        url: String,
        title: Option<String>,
        size: usize,
        max: usize,
        largest_fields: Vec<FieldSize>,
    },

    #[error("record for {url} is still {size} bytes (max {max}) after removing its excerpts")]
    StillTooBig {
        url: String,
        title: Option<String>,
        size: usize,
        max: usize,
        largest_fields: Vec<FieldSize>,
    },

    #[error("remote index rejected record {} as too big ({} bytes)", .object_id.as_deref().unwrap_or("<unknown>"), .size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string()))]
    RecordTooBigRemote {
        object_id: Option<String>,
        size: Option<usize>,
        max_record_size: usize,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Remote(RemoteError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("upload task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Wrap a remote failure, promoting size rejections to
    /// [`SyncError::RecordTooBigRemote`].
    pub fn from_remote(err: RemoteError, max_record_size: usize) -> Self {
        match &err.kind {
            RemoteErrorKind::RecordTooBig { object_id, size } => SyncError::RecordTooBigRemote {
                object_id: object_id.clone(),
                size: *size,
                max_record_size,
                source: err,
            },
            _ => SyncError::Remote(err),
        }
    }

    /// Suggested fix, if the failure is a known one.
    pub fn remediation(&self) -> Option<String> {
        match self {
            SyncError::Credentials(_) => Some(
                "Set index.application_id and index.index_name in the config file, and export \
                 an admin API key in the environment variable named by index.api_key_env \
                 (ALGOLIA_API_KEY by default)."
                    .to_string(),
            ),
            SyncError::NoRecords { .. } => Some(
                "No page produced a record. Check that site.root points at the built site, \
                 and that site.files_to_exclude and site.nodes_to_index do not filter out \
                 every page."
                    .to_string(),
            ),
            SyncError::Unshrinkable {
                title,
                largest_fields,
                ..
            } => Some(format!(
                "Page {} has no excerpt that could be shortened. Split it into smaller \
                 paragraphs or exclude it with site.files_to_exclude. Largest fields: {}.",
                describe_title(title),
                describe_fields(largest_fields)
            )),
            SyncError::StillTooBig {
                title,
                largest_fields,
                ..
            } => Some(format!(
                "Page {} is too big even without excerpts. Split its long paragraphs or \
                 exclude it with site.files_to_exclude. Largest fields: {}.",
                describe_title(title),
                describe_fields(largest_fields)
            )),
            SyncError::RecordTooBigRemote {
                max_record_size, ..
            } => Some(format!(
                "indexing.max_record_size is {} bytes, which is above the record size limit \
                 of your plan. Lower it to match the remote limit.",
                max_record_size
            )),
            SyncError::Remote(err) => err.remediation(),
            SyncError::Extract(_) => {
                Some("site.nodes_to_index must be a valid CSS selector.".to_string())
            }
            SyncError::Serialize(_) | SyncError::Task(_) => None,
        }
    }
}

impl From<ShrinkError> for SyncError {
    fn from(err: ShrinkError) -> Self {
        match err {
            ShrinkError::Unshrinkable {
                record,
                size,
                max,
                largest_fields,
            } => SyncError::Unshrinkable {
                url: record.url,
                title: record.title,
                size,
                max,
                largest_fields,
            },
            ShrinkError::StillTooBig {
                record,
                size,
                max,
                largest_fields,
            } => SyncError::StillTooBig {
                url: record.url,
                title: record.title,
                size,
                max,
                largest_fields,
            },
            ShrinkError::Serialize(e) => SyncError::Serialize(e),
        }
    }
}

fn describe_title(title: &Option<String>) -> String {
    match title {
        Some(title) => format!("'{}'", title),
        None => "<untitled>".to_string(),
    }
}

fn describe_fields(fields: &[FieldSize]) -> String {
    fields
        .iter()
        .take(3)
        .map(|field| format!("{} ({} bytes)", field.name, field.bytes))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_remote_size_rejection() {
        let remote = RemoteError::new(
            "upsert_objects",
            Some("docs"),
            Some(400),
            "Record at the position 0 objectID=abc123 is too big size=20480 bytes",
        );
        let err = SyncError::from_remote(remote, 15_000);
        match &err {
            SyncError::RecordTooBigRemote {
                object_id, size, ..
            } => {
                assert_eq!(object_id.as_deref(), Some("abc123"));
                assert_eq!(*size, Some(20480));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.remediation().unwrap().contains("15000"));
        assert_eq!(
            err.to_string(),
            "remote index rejected record abc123 as too big (20480 bytes)"
        );
    }

    #[test]
    fn other_remote_errors_stay_remote() {
        let remote = RemoteError::new("browse", Some("docs"), Some(403), "Invalid API key");
        let err = SyncError::from_remote(remote, 10_000);
        assert!(matches!(err, SyncError::Remote(_)));
        assert!(err.remediation().unwrap().contains("admin key"));
    }

    #[test]
    fn shrink_failure_keeps_page_identity() {
        let err = SyncError::StillTooBig {
            url: "/guide.html".to_string(),
            title: Some("Guide".to_string()),
            size: 12_000,
            max: 10_000,
            largest_fields: vec![
                FieldSize {
                    name: "html".to_string(),
                    bytes: 9000,
                },
                FieldSize {
                    name: "text".to_string(),
                    bytes: 2000,
                },
            ],
        };
        assert!(err.to_string().contains("/guide.html"));
        let hint = err.remediation().unwrap();
        assert!(hint.contains("'Guide'"));
        assert!(hint.contains("html (9000 bytes), text (2000 bytes)"));
    }
}
