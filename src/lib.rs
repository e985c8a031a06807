//! # searchsync
//!
//! Keep a hosted search index in sync with a statically built site.
//!
//! searchsync reads the HTML output of a static-site build, splits every
//! page into one record per paragraph (annotated with its heading
//! hierarchy), gives each record a content-derived `objectID`, shrinks
//! records to the index's size quota, and reconciles the result with the
//! remote index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌───────────┐   ┌──────────┐
//! │   Site   │──▶│       Pipeline       │──▶│  Indexer  │──▶│  Remote  │
//! │  scan    │   │ extract+hooks+id+fit │   │ diff/atom │   │  index   │
//! └──────────┘   └──────────────────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export ALGOLIA_API_KEY=...
//! searchsync records --output records.json   # inspect records locally
//! searchsync push --dry-run                  # show what would change
//! searchsync push                            # reconcile the index
//! searchsync settings                        # push index settings only
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`site`] | Built-site scanner |
//! | [`hooks`] | Record transformation hooks |
//! | [`pipeline`] | Site documents to final records |
//! | [`indexer`] | Diff and atomic reconciliation, settings sync |
//! | [`remote`] | Algolia REST client |
//! | [`error`] | Run errors and remediation hints |
//! | [`push`] | Command orchestration |

pub mod config;
pub mod error;
pub mod hooks;
pub mod indexer;
pub mod pipeline;
pub mod push;
pub mod remote;
pub mod site;

pub use searchsync_core::{extract, fingerprint, models, settings, shrink, store};
