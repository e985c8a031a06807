//! Index reconciliation.
//!
//! The [`Indexer`] pushes a record set to a [`RemoteStore`] using one of two
//! strategies:
//!
//! - **Diff** ([`Indexer::run_diff_mode`]): compare `objectID`s with the live
//!   index, delete the stale ones and upload only the new ones. Since an
//!   `objectID` is a content fingerprint, unchanged records are never
//!   re-uploaded.
//! - **Atomic** ([`Indexer::run_atomic_mode`]): fill `<index>_tmp` with the
//!   whole record set and its settings, then move it over the live index
//!   in one step.
//!
//! Both finish with settings synchronization, keyed on the fingerprint
//! stored in the remote `userData.settingID`.
//!
//! ```text
//! Init ──▶ DiffSync ───┐
//!   │                  ├──▶ SettingsSync ──▶ Done
//!   └───▶ AtomicSync ──┘
//!            (any step) ──▶ Failed
//! ```
//!
//! With `dry_run` set, remote reads still happen but every mutating call
//! is replaced by a log line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use searchsync_core::models::Record;
use searchsync_core::settings::{
    local_settings, merge_settings, plan_settings, setting_id, Settings, SettingsPlan,
};
use searchsync_core::store::{RemoteErrorKind, RemoteStore};

use crate::config::Config;
use crate::error::SyncError;

/// Suffix of the temporary index used by atomic mode.
pub const TMP_INDEX_SUFFIX: &str = "_tmp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    #[default]
    Diff,
    Atomic,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Diff => "diff",
            SyncStrategy::Atomic => "atomic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    DiffSync,
    AtomicSync,
    SettingsSync,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub index_name: String,
    pub strategy: SyncStrategy,
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub max_record_size: usize,
    pub dry_run: bool,
    /// User overrides for the built-in settings.
    pub settings: Settings,
    /// Stored next to the settings fingerprint.
    pub plugin_version: String,
}

impl IndexerOptions {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            strategy: SyncStrategy::Diff,
            batch_size: 1000,
            max_in_flight: 1,
            max_record_size: 10_000,
            dry_run: false,
            settings: Settings::new(),
            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            strategy: config.indexing.mode,
            batch_size: config.indexing.batch_size,
            max_in_flight: config.indexing.max_in_flight,
            max_record_size: config.indexing.max_record_size,
            dry_run: config.indexing.dry_run,
            settings: config.settings.clone(),
            ..Self::new(config.index.index_name.trim())
        }
    }

    pub fn tmp_index_name(&self) -> String {
        format!("{}{}", self.index_name, TMP_INDEX_SUFFIX)
    }
}

/// Identifier-level difference between the local and remote record sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Local ids absent remotely, sorted.
    pub to_add: Vec<String>,
    /// Remote ids absent locally, sorted.
    pub to_delete: Vec<String>,
}

impl ReconciliationPlan {
    pub fn between(local_ids: &[String], remote_ids: &[String]) -> Self {
        let local: BTreeSet<&String> = local_ids.iter().collect();
        let remote: BTreeSet<&String> = remote_ids.iter().collect();
        Self {
            to_add: local.difference(&remote).map(|id| (*id).clone()).collect(),
            to_delete: remote.difference(&local).map(|id| (*id).clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsOutcome {
    Pushed { setting_id: String },
    /// Dry run: the settings would have been pushed.
    WouldPush { setting_id: String },
    /// Remote fingerprint matches. `drifted_keys` were edited remotely.
    UpToDate { drifted_keys: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub index: String,
    pub strategy: SyncStrategy,
    pub dry_run: bool,
    pub records: usize,
    pub uploaded: usize,
    pub deleted: usize,
    pub batches: usize,
    pub settings: SettingsOutcome,
}

/// Outcome of [`Indexer::update_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub batches: usize,
    pub records: usize,
}

pub struct Indexer {
    store: Arc<dyn RemoteStore>,
    options: IndexerOptions,
    state: RunState,
}

impl Indexer {
    /// Check credentials and return an indexer in [`RunState::Init`].
    pub async fn init(
        store: Arc<dyn RemoteStore>,
        options: IndexerOptions,
    ) -> Result<Self, SyncError> {
        if options.index_name.is_empty() {
            return Err(SyncError::Credentials(
                "index.index_name is not set".to_string(),
            ));
        }

        store.check_access().await.map_err(|err| match err.kind {
            RemoteErrorKind::InvalidCredentials | RemoteErrorKind::UnknownApplicationId => {
                SyncError::Credentials(err.to_string())
            }
            _ => SyncError::Remote(err),
        })?;

        debug!(index = %options.index_name, "remote access granted");
        Ok(Self {
            store,
            options,
            state: RunState::Init,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn options(&self) -> &IndexerOptions {
        &self.options
    }

    /// Push `records` with the configured strategy.
    pub async fn run(&mut self, records: &[Record]) -> Result<RunReport, SyncError> {
        if records.is_empty() {
            self.state = RunState::Failed;
            return Err(SyncError::NoRecords {
                index: self.options.index_name.clone(),
            });
        }

        info!(
            index = %self.options.index_name,
            strategy = self.options.strategy.as_str(),
            records = records.len(),
            dry_run = self.options.dry_run,
            "starting push"
        );
        match self.options.strategy {
            SyncStrategy::Diff => self.run_diff_mode(records).await,
            SyncStrategy::Atomic => self.run_atomic_mode(records).await,
        }
    }

    /// Delete stale records, upload new ones, then sync settings.
    pub async fn run_diff_mode(&mut self, records: &[Record]) -> Result<RunReport, SyncError> {
        self.state = RunState::DiffSync;
        let live = self.options.index_name.clone();

        let remote_ids = self.remote_object_ids(&live).await?;
        let local_ids = Self::local_object_ids(records);
        let plan = ReconciliationPlan::between(&local_ids, &remote_ids);
        info!(
            index = %live,
            remote = remote_ids.len(),
            local = local_ids.len(),
            to_add = plan.to_add.len(),
            to_delete = plan.to_delete.len(),
            "diff computed"
        );

        let deleted = self.delete_records_by_id(&live, &plan.to_delete).await?;

        let to_add: BTreeSet<&str> = plan.to_add.iter().map(String::as_str).collect();
        let new_records: Vec<Record> = records
            .iter()
            .filter(|record| to_add.contains(record.object_id.as_str()))
            .cloned()
            .collect();
        let upload = self.update_records(&live, &new_records).await?;

        self.state = RunState::SettingsSync;
        let settings = self.update_settings(&live).await?;
        self.state = RunState::Done;

        Ok(RunReport {
            index: live,
            strategy: SyncStrategy::Diff,
            dry_run: self.options.dry_run,
            records: records.len(),
            uploaded: upload.records,
            deleted,
            batches: upload.batches,
            settings,
        })
    }

    /// Rebuild the index under `<index>_tmp` and move it over the live one.
    pub async fn run_atomic_mode(&mut self, records: &[Record]) -> Result<RunReport, SyncError> {
        self.state = RunState::AtomicSync;
        let live = self.options.index_name.clone();
        let tmp = self.options.tmp_index_name();

        if self.options.dry_run {
            info!(index = %tmp, "dry run: would clear temporary index");
        } else {
            let result = self.store.delete_index(&tmp).await;
            self.check(result)?;
        }

        let upload = self.update_records(&tmp, records).await?;

        self.state = RunState::SettingsSync;
        let remote = self.store.get_settings(&live).await;
        let remote = self.check(remote)?;
        let local = local_settings(&self.options.settings);
        let local_id = setting_id(&local);
        let merged = merge_settings(
            remote.as_ref(),
            &local,
            &local_id,
            &self.options.plugin_version,
        );

        let settings = if self.options.dry_run {
            info!(index = %tmp, setting_id = %local_id, "dry run: would apply settings");
            info!(from = %tmp, to = %live, "dry run: would move index");
            SettingsOutcome::WouldPush {
                setting_id: local_id,
            }
        } else {
            let result = self.store.set_settings(&tmp, &merged).await;
            self.check(result)?;
            let result = self.store.move_index(&tmp, &live).await;
            self.check(result)?;
            info!(from = %tmp, to = %live, "index moved");
            SettingsOutcome::Pushed {
                setting_id: local_id,
            }
        };
        self.state = RunState::Done;

        Ok(RunReport {
            index: live,
            strategy: SyncStrategy::Atomic,
            dry_run: self.options.dry_run,
            records: records.len(),
            uploaded: upload.records,
            deleted: 0,
            batches: upload.batches,
            settings,
        })
    }

    /// Upload `records` to `index` in batches, at most `max_in_flight`
    /// batches at a time.
    ///
    /// After the first failed batch no further batch starts; batches
    /// already in flight are awaited before the error is returned.
    pub async fn update_records(
        &mut self,
        index: &str,
        records: &[Record],
    ) -> Result<UploadSummary, SyncError> {
        let batch_size = self.options.batch_size.max(1);
        let total = records.len().div_ceil(batch_size);
        if total == 0 {
            return Ok(UploadSummary::default());
        }

        if self.options.dry_run {
            for (number, batch) in records.chunks(batch_size).enumerate() {
                info!(
                    index,
                    batch = number + 1,
                    total,
                    records = batch.len(),
                    "dry run: would upload batch"
                );
            }
            return Ok(UploadSummary {
                batches: total,
                records: records.len(),
            });
        }

        let max_in_flight = self.options.max_in_flight.max(1);
        let mut pending = records.chunks(batch_size).enumerate();
        let mut join_set = JoinSet::new();
        let mut summary = UploadSummary::default();
        let mut first_error: Option<SyncError> = None;

        loop {
            while first_error.is_none() && join_set.len() < max_in_flight {
                let Some((number, batch)) = pending.next() else {
                    break;
                };
                let store = Arc::clone(&self.store);
                let index = index.to_string();
                let batch = batch.to_vec();
                join_set.spawn(async move {
                    debug!(
                        index = %index,
                        batch = number + 1,
                        total,
                        records = batch.len(),
                        "uploading batch"
                    );
                    store
                        .upsert_objects(&index, &batch)
                        .await
                        .map(|()| batch.len())
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            match joined {
                Ok(Ok(count)) => {
                    summary.batches += 1;
                    summary.records += count;
                }
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error =
                            Some(SyncError::from_remote(err, self.options.max_record_size));
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(SyncError::Task(join_err.to_string()));
                    }
                }
            }
        }

        if let Some(err) = first_error {
            warn!(
                index,
                uploaded_batches = summary.batches,
                total,
                "upload stopped after a failed batch"
            );
            self.state = RunState::Failed;
            return Err(err);
        }

        info!(
            index,
            batches = summary.batches,
            records = summary.records,
            "records uploaded"
        );
        Ok(summary)
    }

    /// Delete `ids` from `index` in one call. Returns the number deleted.
    pub async fn delete_records_by_id(
        &mut self,
        index: &str,
        ids: &[String],
    ) -> Result<usize, SyncError> {
        if ids.is_empty() {
            return Ok(0);
        }
        if self.options.dry_run {
            info!(index, records = ids.len(), "dry run: would delete records");
            return Ok(ids.len());
        }

        let result = self.store.delete_objects(index, ids).await;
        self.check(result)?;
        info!(index, records = ids.len(), "records deleted");
        Ok(ids.len())
    }

    /// Every `objectID` of `index`, sorted. A missing index has none.
    pub async fn remote_object_ids(&mut self, index: &str) -> Result<Vec<String>, SyncError> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .store
                .browse_object_ids(index, cursor.as_deref())
                .await;
            let page = self.check(page)?;
            ids.extend(page.object_ids);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// The `objectID` of every record, sorted.
    pub fn local_object_ids(records: &[Record]) -> Vec<String> {
        let mut ids: Vec<String> = records.iter().map(|r| r.object_id.clone()).collect();
        ids.sort();
        ids
    }

    /// Push the local settings to `index` unless its stored fingerprint
    /// already matches.
    pub async fn update_settings(&mut self, index: &str) -> Result<SettingsOutcome, SyncError> {
        let local = local_settings(&self.options.settings);
        let remote = self.store.get_settings(index).await;
        let remote = self.check(remote)?;

        match plan_settings(&local, remote.as_ref(), &self.options.plugin_version) {
            SettingsPlan::Push(settings) => {
                let setting_id = setting_id(&local);
                if self.options.dry_run {
                    info!(index, setting_id = %setting_id, "dry run: would push settings");
                    return Ok(SettingsOutcome::WouldPush { setting_id });
                }
                let result = self.store.set_settings(index, &settings).await;
                self.check(result)?;
                info!(index, setting_id = %setting_id, "settings pushed");
                Ok(SettingsOutcome::Pushed { setting_id })
            }
            SettingsPlan::UpToDate { drifted_keys } => {
                if drifted_keys.is_empty() {
                    debug!(index, "settings up to date");
                } else {
                    warn!(
                        index,
                        keys = ?drifted_keys,
                        "settings were changed by manual dashboard editing; they will be \
                         overwritten the next time the configured settings change"
                    );
                }
                Ok(SettingsOutcome::UpToDate { drifted_keys })
            }
        }
    }

    /// Map a remote result, moving to [`RunState::Failed`] on error.
    fn check<T>(
        &mut self,
        result: Result<T, searchsync_core::store::RemoteError>,
    ) -> Result<T, SyncError> {
        result.map_err(|err| {
            self.state = RunState::Failed;
            SyncError::from_remote(err, self.options.max_record_size)
        })
    }
}
