//! Configuration parsing and validation.
//!
//! searchsync is configured through a TOML file (default
//! `./config/searchsync.toml`):
//!
//! ```toml
//! [site]
//! root = "./_site"
//! base_url = "/"
//! files_to_exclude = ["index.html", "404.html"]
//! nodes_to_index = "p"
//!
//! [index]
//! application_id = "MYAPPID"
//! index_name = "my_site"
//! api_key_env = "ALGOLIA_API_KEY"
//!
//! [indexing]
//! mode = "diff"
//! batch_size = 1000
//!
//! [settings]
//! typoTolerance = "min"
//! ```
//!
//! Only `[site]` is required. The API key itself is never stored in the
//! file; it is read from the environment variable named by
//! `index.api_key_env`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use searchsync_core::extract::DEFAULT_NODES_TO_INDEX;
use searchsync_core::settings::Settings;

use crate::indexer::SyncStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    /// Overrides for the built-in index settings, key by key.
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    /// Directory holding the built site.
    pub root: PathBuf,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_extensions_to_index")]
    pub extensions_to_index: Vec<String>,
    /// Globs relative to `root`.
    #[serde(default = "default_files_to_exclude")]
    pub files_to_exclude: Vec<String>,
    /// CSS selector of the nodes that become records.
    #[serde(default = "default_nodes_to_index")]
    pub nodes_to_index: String,
    #[serde(default = "default_post_globs")]
    pub post_globs: Vec<String>,
    #[serde(default)]
    pub document_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_base_url() -> String {
    "/".to_string()
}
fn default_extensions_to_index() -> Vec<String> {
    vec!["html".to_string()]
}
fn default_files_to_exclude() -> Vec<String> {
    vec!["index.html".to_string(), "404.html".to_string()]
}
fn default_nodes_to_index() -> String {
    DEFAULT_NODES_TO_INDEX.to_string()
}
fn default_post_globs() -> Vec<String> {
    vec!["**/[0-9][0-9][0-9][0-9]/[0-9][0-9]/[0-9][0-9]/**".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub index_name: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            index_name: String::new(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl IndexConfig {
    /// The API key from the environment, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

fn default_api_key_env() -> String {
    "ALGOLIA_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default)]
    pub mode: SyncStrategy,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Byte limit on the JSON encoding of one record.
    #[serde(default = "default_max_record_size")]
    pub max_record_size: usize,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            mode: SyncStrategy::default(),
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            max_record_size: default_max_record_size(),
            dry_run: false,
        }
    }
}

fn default_batch_size() -> usize {
    1000
}
fn default_max_in_flight() -> usize {
    1
}
fn default_max_record_size() -> usize {
    10_000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate site
    if config.site.extensions_to_index.is_empty() {
        anyhow::bail!("site.extensions_to_index must not be empty");
    }
    if config.site.nodes_to_index.trim().is_empty() {
        anyhow::bail!("site.nodes_to_index must not be empty");
    }

    // Validate indexing
    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }
    if config.indexing.max_in_flight == 0 {
        anyhow::bail!("indexing.max_in_flight must be > 0");
    }
    if config.indexing.max_record_size == 0 {
        anyhow::bail!("indexing.max_record_size must be > 0");
    }

    if config.index.index_name.ends_with("_tmp") {
        anyhow::bail!(
            "index.index_name '{}' must not end with '_tmp' (reserved for atomic mode)",
            config.index.index_name
        );
    }

    Ok(config)
}
