//! Remote search store abstraction.
//!
//! The [`RemoteStore`] trait is the whole contract searchsync needs from the
//! hosted search service: batch upsert/delete of records, a paginated
//! listing of object identifiers, settings get/set, and index move/delete.
//! Implementations must be `Send + Sync`; the indexer shares one store
//! across concurrently running upload batches.
//!
//! Every mutating call is expected to return only once the change is
//! visible on the remote side, so that a `move_index` issued after an
//! upload never publishes a half-filled index.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Record;
use crate::settings::Settings;

/// One page of a full object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowsePage {
    pub object_ids: Vec<String>,
    /// Cursor for the next page; `None` on the last page.
    pub cursor: Option<String>,
}

/// Classification of a remote failure, used to suggest a remediation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteErrorKind {
    InvalidCredentials,
    UnknownApplicationId,
    /// The API key may not touch this index (often the `_tmp` index).
    IndexNotAllowed,
    RecordTooBig {
        object_id: Option<String>,
        size: Option<usize>,
    },
    TooManyRecords,
    UnknownSetting {
        name: Option<String>,
    },
    /// The request never produced an HTTP response.
    Transport,
    Other,
}

/// A failed call to the remote store.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed{}{}: {message}", fmt_index(.index), fmt_status(.status))]
pub struct RemoteError {
    pub operation: String,
    pub index: Option<String>,
    pub status: Option<u16>,
    /// Message extracted from the remote JSON error body, or the raw body.
    pub message: String,
    pub kind: RemoteErrorKind,
}

fn fmt_index(index: &Option<String>) -> String {
    index
        .as_ref()
        .map(|name| format!(" on index '{}'", name))
        .unwrap_or_default()
}

fn fmt_status(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {})", code))
        .unwrap_or_default()
}

impl RemoteError {
    /// Build an error, classifying it from its status and message.
    pub fn new(
        operation: impl Into<String>,
        index: Option<&str>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let kind = classify(status, &message);
        Self {
            operation: operation.into(),
            index: index.map(str::to_string),
            status,
            message,
            kind,
        }
    }

    /// Build an error from an HTTP error response body.
    ///
    /// The remote service answers with `{"message": "...", "status": 400}`;
    /// anything else is kept verbatim.
    pub fn from_response(operation: &str, index: Option<&str>, status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| json.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        Self::new(operation, index, Some(status), message)
    }

    /// Suggested fix, if the failure is a known one.
    pub fn remediation(&self) -> Option<String> {
        let index = self.index.as_deref().unwrap_or("<index>");
        let hint = match &self.kind {
            RemoteErrorKind::InvalidCredentials => {
                "Check the application id and make sure the API key is an admin key \
                 (or a key with addObject, deleteObject, browse, settings, editSettings \
                 and deleteIndex rights)."
                    .to_string()
            }
            RemoteErrorKind::UnknownApplicationId => {
                "The application id could not be resolved. Check `index.application_id`."
                    .to_string()
            }
            RemoteErrorKind::IndexNotAllowed => format!(
                "The API key is not allowed to write to '{}'. Keys restricted to an index \
                 pattern must also cover the temporary '{}_tmp' index used in atomic mode.",
                index, index
            ),
            RemoteErrorKind::RecordTooBig { object_id, size } => format!(
                "The remote index rejected record {} ({} bytes). Lower \
                 `indexing.max_record_size` to match your plan's record size limit.",
                object_id.as_deref().unwrap_or("<unknown>"),
                size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string())
            ),
            RemoteErrorKind::TooManyRecords => {
                "Your plan's record quota is exhausted. Exclude files with \
                 `site.files_to_exclude` or index fewer nodes with `site.nodes_to_index`."
                    .to_string()
            }
            RemoteErrorKind::UnknownSetting { name } => format!(
                "The remote index does not know the setting '{}'. Check the [settings] table.",
                name.as_deref().unwrap_or("<unknown>")
            ),
            RemoteErrorKind::Transport => {
                "The remote service could not be reached. Check your network connection."
                    .to_string()
            }
            RemoteErrorKind::Other => return None,
        };
        Some(hint)
    }
}

/// Classify a remote failure from its HTTP status and message.
pub fn classify(status: Option<u16>, message: &str) -> RemoteErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("is too big") {
        return RemoteErrorKind::RecordTooBig {
            object_id: value_after(message, "objectID=").map(str::to_string),
            size: value_after(message, "size=").and_then(|s| {
                s.trim_end_matches(|c: char| !c.is_ascii_digit())
                    .parse()
                    .ok()
            }),
        };
    }
    if lower.contains("index not allowed") {
        return RemoteErrorKind::IndexNotAllowed;
    }
    if lower.contains("record quota") || lower.contains("too many records") {
        return RemoteErrorKind::TooManyRecords;
    }
    if lower.contains("invalid object attributes") || lower.contains("unknown setting") {
        let name = value_after(message, "attributes: ")
            .or_else(|| value_after(message, "setting: "))
            .map(str::to_string);
        return RemoteErrorKind::UnknownSetting { name };
    }
    if lower.contains("invalid application-id") || lower.contains("invalid api key") {
        return RemoteErrorKind::InvalidCredentials;
    }

    match status {
        Some(401) | Some(403) => RemoteErrorKind::InvalidCredentials,
        Some(_) => RemoteErrorKind::Other,
        None if lower.contains("dns") || lower.contains("lookup") => {
            RemoteErrorKind::UnknownApplicationId
        }
        None => RemoteErrorKind::Transport,
    }
}

/// The whitespace-delimited token following `marker` in `message`.
fn value_after<'a>(message: &'a str, marker: &str) -> Option<&'a str> {
    let start = message.find(marker)? + marker.len();
    message[start..]
        .split_whitespace()
        .next()
        .filter(|token| !token.is_empty())
}

/// Abstract remote search store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`check_access`](RemoteStore::check_access) | Verify credentials before any write |
/// | [`upsert_objects`](RemoteStore::upsert_objects) | Add or replace one batch of records |
/// | [`delete_objects`](RemoteStore::delete_objects) | Delete records by `objectID` |
/// | [`browse_object_ids`](RemoteStore::browse_object_ids) | One page of the full id listing |
/// | [`get_settings`](RemoteStore::get_settings) | Current settings, `None` if no index |
/// | [`set_settings`](RemoteStore::set_settings) | Replace settings (creates the index) |
/// | [`move_index`](RemoteStore::move_index) | Atomically rename an index over another |
/// | [`delete_index`](RemoteStore::delete_index) | Drop an index (missing is not an error) |
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn check_access(&self) -> Result<(), RemoteError>;

    async fn upsert_objects(&self, index: &str, records: &[Record]) -> Result<(), RemoteError>;

    async fn delete_objects(&self, index: &str, object_ids: &[String]) -> Result<(), RemoteError>;

    /// List object ids, starting after `cursor` (or at the beginning).
    ///
    /// A missing index yields an empty last page.
    async fn browse_object_ids(
        &self,
        index: &str,
        cursor: Option<&str>,
    ) -> Result<BrowsePage, RemoteError>;

    async fn get_settings(&self, index: &str) -> Result<Option<Settings>, RemoteError>;

    async fn set_settings(&self, index: &str, settings: &Settings) -> Result<(), RemoteError>;

    /// Replace `destination` with `source` in one indivisible step.
    async fn move_index(&self, source: &str, destination: &str) -> Result<(), RemoteError>;

    async fn delete_index(&self, index: &str) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_record_too_big() {
        let kind = classify(
            Some(400),
            "Record at the position 3 objectID=deadbeef is too big size=109196 bytes. \
             Contact us if you need an extended quota",
        );
        assert_eq!(
            kind,
            RemoteErrorKind::RecordTooBig {
                object_id: Some("deadbeef".to_string()),
                size: Some(109196),
            }
        );
    }

    #[test]
    fn classifies_credentials_and_transport() {
        assert_eq!(
            classify(Some(403), "Invalid Application-ID or API key"),
            RemoteErrorKind::InvalidCredentials
        );
        assert_eq!(classify(Some(401), "nope"), RemoteErrorKind::InvalidCredentials);
        assert_eq!(
            classify(None, "error trying to connect: dns error: failed to lookup address"),
            RemoteErrorKind::UnknownApplicationId
        );
        assert_eq!(classify(None, "connection reset"), RemoteErrorKind::Transport);
        assert_eq!(classify(Some(500), "boom"), RemoteErrorKind::Other);
    }

    #[test]
    fn classifies_index_and_settings_errors() {
        assert_eq!(
            classify(Some(403), "Index not allowed with this API key"),
            RemoteErrorKind::IndexNotAllowed
        );
        assert_eq!(
            classify(
                Some(400),
                "Invalid object attributes: customRankingz near line:1 column:456"
            ),
            RemoteErrorKind::UnknownSetting {
                name: Some("customRankingz".to_string())
            }
        );
        assert_eq!(
            classify(Some(403), "Record quota exceeded, change plan or delete records."),
            RemoteErrorKind::TooManyRecords
        );
    }

    #[test]
    fn parses_json_error_body() {
        let err = RemoteError::from_response(
            "set_settings",
            Some("docs"),
            400,
            r#"{"message":"Invalid object attributes: foo near line:1","status":400}"#,
        );
        assert_eq!(err.message, "Invalid object attributes: foo near line:1");
        assert_eq!(err.status, Some(400));
        assert_eq!(
            err.to_string(),
            "set_settings failed on index 'docs' (HTTP 400): Invalid object attributes: foo near line:1"
        );
        assert!(err.remediation().unwrap().contains("foo"));
    }

    #[test]
    fn keeps_non_json_body() {
        let err = RemoteError::from_response("browse", None, 502, "  Bad Gateway\n");
        assert_eq!(err.message, "Bad Gateway");
        assert_eq!(err.kind, RemoteErrorKind::Other);
        assert!(err.remediation().is_none());
    }
}
