//! Record transformation hooks.
//!
//! A [`Hooks`] implementation can rewrite or drop records between
//! extraction and fingerprinting. Both methods default to the identity, so
//! an implementation only overrides what it needs.

use searchsync_core::extract::ExtractedNode;
use searchsync_core::models::Record;

pub trait Hooks: Send + Sync {
    /// Called once per extracted record. Returning `None` drops it.
    fn before_indexing_each(&self, record: Record, _node: &ExtractedNode) -> Option<Record> {
        Some(record)
    }

    /// Called once with every record of the site, in document order.
    fn before_indexing_all(&self, records: Vec<Record>) -> Vec<Record> {
        records
    }
}

/// Leaves every record untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}
