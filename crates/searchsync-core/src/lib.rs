//! # searchsync core
//!
//! Runtime-agnostic logic for searchsync: the record model, heading-aware
//! HTML extraction, content fingerprints, record shrinking, settings
//! planning, and the [`store::RemoteStore`] trait with an in-memory
//! implementation.
//!
//! This crate performs no network or filesystem I/O.

pub mod extract;
pub mod fingerprint;
pub mod models;
pub mod settings;
pub mod shrink;
pub mod store;
