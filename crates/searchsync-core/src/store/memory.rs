//! In-memory [`RemoteStore`] implementation for tests and dry experiments.
//!
//! Indices live in a `HashMap` behind `std::sync::RwLock`. Every mutating
//! call is appended to a call log so tests can assert exactly which remote
//! writes a reconciliation run performed. Failures can be injected per
//! operation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::models::Record;
use crate::settings::Settings;

use super::{BrowsePage, RemoteError, RemoteStore};

/// A mutating call received by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Upsert { index: String, object_ids: Vec<String> },
    Delete { index: String, object_ids: Vec<String> },
    SetSettings { index: String },
    MoveIndex { source: String, destination: String },
    DeleteIndex { index: String },
}

#[derive(Debug, Clone, Default)]
struct StoredIndex {
    objects: BTreeMap<String, Value>,
    settings: Settings,
}

/// In-memory remote store.
pub struct InMemoryRemoteStore {
    indices: RwLock<HashMap<String, StoredIndex>>,
    calls: RwLock<Vec<StoreCall>>,
    page_size: usize,
    deny_access: RwLock<bool>,
    /// Number of upserts that still succeed before upserts start failing.
    upserts_before_failure: RwLock<Option<usize>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Store whose browse pages hold at most `page_size` ids.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            page_size: page_size.max(1),
            deny_access: RwLock::new(false),
            upserts_before_failure: RwLock::new(None),
        }
    }

    /// Seed an index with bare objects carrying only an `objectID`.
    pub fn seed_object_ids(&self, index: &str, object_ids: &[&str]) {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        let stored = indices.entry(index.to_string()).or_default();
        for id in object_ids {
            stored
                .objects
                .insert(id.to_string(), serde_json::json!({ "objectID": id }));
        }
    }

    pub fn seed_settings(&self, index: &str, settings: Settings) {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        indices.entry(index.to_string()).or_default().settings = settings;
    }

    /// Reject [`check_access`](RemoteStore::check_access) as if the key were invalid.
    pub fn deny_access(&self) {
        *self.deny_access.write().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Let `successes` upserts through, then fail every later upsert.
    pub fn fail_upserts_after(&self, successes: usize) {
        *self
            .upserts_before_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(successes);
    }

    pub fn index_exists(&self, index: &str) -> bool {
        self.indices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(index)
    }

    /// Sorted object ids of an index (empty if it does not exist).
    pub fn object_ids(&self, index: &str) -> Vec<String> {
        self.indices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|stored| stored.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, index: &str, object_id: &str) -> Option<Value> {
        self.indices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .and_then(|stored| stored.objects.get(object_id).cloned())
    }

    pub fn settings(&self, index: &str) -> Option<Settings> {
        self.indices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|stored| stored.settings.clone())
    }

    /// Every mutating call received so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record_call(&self, call: StoreCall) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn take_upsert_permit(&self) -> bool {
        let mut remaining = self
            .upserts_before_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match remaining.as_mut() {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn check_access(&self) -> Result<(), RemoteError> {
        if *self.deny_access.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(RemoteError::new(
                "check_access",
                None,
                Some(403),
                "Invalid Application-ID or API key",
            ));
        }
        Ok(())
    }

    async fn upsert_objects(&self, index: &str, records: &[Record]) -> Result<(), RemoteError> {
        if !self.take_upsert_permit() {
            return Err(RemoteError::new(
                "upsert_objects",
                Some(index),
                Some(500),
                "injected upsert failure",
            ));
        }

        let mut values = Vec::with_capacity(records.len());
        for record in records {
            let value = serde_json::to_value(record).map_err(|e| {
                RemoteError::new("upsert_objects", Some(index), Some(400), e.to_string())
            })?;
            values.push((record.object_id.clone(), value));
        }

        self.record_call(StoreCall::Upsert {
            index: index.to_string(),
            object_ids: values.iter().map(|(id, _)| id.clone()).collect(),
        });
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        let stored = indices.entry(index.to_string()).or_default();
        stored.objects.extend(values);
        Ok(())
    }

    async fn delete_objects(&self, index: &str, object_ids: &[String]) -> Result<(), RemoteError> {
        self.record_call(StoreCall::Delete {
            index: index.to_string(),
            object_ids: object_ids.to_vec(),
        });
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(stored) = indices.get_mut(index) {
            for id in object_ids {
                stored.objects.remove(id);
            }
        }
        Ok(())
    }

    async fn browse_object_ids(
        &self,
        index: &str,
        cursor: Option<&str>,
    ) -> Result<BrowsePage, RemoteError> {
        let offset = match cursor {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                RemoteError::new("browse", Some(index), Some(400), "invalid cursor")
            })?,
            None => 0,
        };

        let indices = self.indices.read().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = indices.get(index) else {
            return Ok(BrowsePage::default());
        };

        let object_ids: Vec<String> = stored
            .objects
            .keys()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        let next = offset + object_ids.len();
        let cursor = (next < stored.objects.len()).then(|| next.to_string());
        Ok(BrowsePage { object_ids, cursor })
    }

    async fn get_settings(&self, index: &str) -> Result<Option<Settings>, RemoteError> {
        Ok(self.settings(index))
    }

    async fn set_settings(&self, index: &str, settings: &Settings) -> Result<(), RemoteError> {
        self.record_call(StoreCall::SetSettings {
            index: index.to_string(),
        });
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        indices.entry(index.to_string()).or_default().settings = settings.clone();
        Ok(())
    }

    async fn move_index(&self, source: &str, destination: &str) -> Result<(), RemoteError> {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        let Some(moved) = indices.remove(source) else {
            return Err(RemoteError::new(
                "move_index",
                Some(source),
                Some(404),
                "Index does not exist",
            ));
        };
        indices.insert(destination.to_string(), moved);
        drop(indices);

        self.record_call(StoreCall::MoveIndex {
            source: source.to_string(),
            destination: destination.to_string(),
        });
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), RemoteError> {
        self.record_call(StoreCall::DeleteIndex {
            index: index.to_string(),
        });
        self.indices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(index);
        Ok(())
    }
}
