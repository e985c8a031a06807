//! Index settings planning.
//!
//! The settings pushed to the remote index are the built-in defaults
//! overridden key by key by the user's configuration. Their fingerprint is
//! stored in the remote settings themselves, under
//! `userData.settingID`, so a later run can tell whether anything changed
//! without diffing the whole blob:
//!
//! | Remote state                          | Plan                          |
//! |---------------------------------------|-------------------------------|
//! | index missing / no stored id          | [`SettingsPlan::Push`]        |
//! | stored id differs from local id       | [`SettingsPlan::Push`]        |
//! | stored id matches                     | [`SettingsPlan::UpToDate`]    |
//!
//! When the ids match, managed keys (those we push) whose remote value no
//! longer equals the local one are reported as drift: someone edited them
//! outside of searchsync, and we deliberately do not revert them.

use serde_json::{json, Map, Value};

use crate::fingerprint::fingerprint_value;

/// Reserved settings key holding searchsync metadata.
pub const USER_DATA_KEY: &str = "userData";
/// Fingerprint of the local settings, inside [`USER_DATA_KEY`].
pub const SETTING_ID_KEY: &str = "settingID";
/// Version of the tool that last pushed the settings.
pub const PLUGIN_VERSION_KEY: &str = "pluginVersion";

pub type Settings = Map<String, Value>;

/// What to do with the remote settings of one index.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsPlan {
    /// Write these settings (remote base, local overrides, fresh `userData`).
    Push(Settings),
    /// Nothing to write. `drifted_keys` lists managed keys edited remotely.
    UpToDate { drifted_keys: Vec<String> },
}

/// Built-in settings for records produced by the hierarchy extractor.
pub fn default_settings() -> Settings {
    let value = json!({
        "distinct": true,
        "attributeForDistinct": "url",
        "attributesForFaceting": ["type", "searchable(tags)", "title"],
        "searchableAttributes": [
            "title",
            "hierarchy.lvl0",
            "hierarchy.lvl1",
            "hierarchy.lvl2",
            "hierarchy.lvl3",
            "hierarchy.lvl4",
            "hierarchy.lvl5",
            "unordered(text)",
            "unordered(tags)"
        ],
        "customRanking": ["desc(date)", "desc(weight.heading)", "asc(weight.position)"],
        "attributesToSnippet": ["text:55"],
        "snippetEllipsisText": "…",
        "highlightPreTag": "<em class=\"searchsync-highlight\">",
        "highlightPostTag": "</em>",
        "unretrievableAttributes": ["excerpt_text"]
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Defaults overridden by `overrides`, key by key.
pub fn local_settings(overrides: &Settings) -> Settings {
    let mut settings = default_settings();
    for (key, value) in overrides {
        settings.insert(key.clone(), value.clone());
    }
    settings.remove(USER_DATA_KEY);
    settings
}

/// Fingerprint of a set of local settings.
pub fn setting_id(local: &Settings) -> String {
    fingerprint_value(&Value::Object(local.clone()))
}

/// The fingerprint stored in a remote settings blob, if any.
pub fn remote_setting_id(remote: &Settings) -> Option<&str> {
    remote
        .get(USER_DATA_KEY)
        .and_then(|data| data.get(SETTING_ID_KEY))
        .and_then(Value::as_str)
}

/// Settings to write: `remote` as a base, `local` on top, and a fresh
/// `userData` block carrying `setting_id`.
pub fn merge_settings(
    remote: Option<&Settings>,
    local: &Settings,
    setting_id: &str,
    version: &str,
) -> Settings {
    let mut merged = remote.cloned().unwrap_or_default();
    for (key, value) in local {
        merged.insert(key.clone(), value.clone());
    }

    let mut user_data = match merged.remove(USER_DATA_KEY) {
        Some(Value::Object(existing)) => existing,
        _ => Map::new(),
    };
    user_data.insert(SETTING_ID_KEY.to_string(), json!(setting_id));
    user_data.insert(PLUGIN_VERSION_KEY.to_string(), json!(version));
    merged.insert(USER_DATA_KEY.to_string(), Value::Object(user_data));
    merged
}

/// Managed keys whose remote value differs from the local one, sorted.
pub fn drifted_keys(local: &Settings, remote: &Settings) -> Vec<String> {
    let mut keys: Vec<String> = local
        .iter()
        .filter(|(key, value)| remote.get(key.as_str()) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();
    keys.sort();
    keys
}

/// Decide what to do with the remote settings of one index.
pub fn plan_settings(local: &Settings, remote: Option<&Settings>, version: &str) -> SettingsPlan {
    let local_id = setting_id(local);
    match remote {
        Some(remote) if remote_setting_id(remote) == Some(local_id.as_str()) => {
            SettingsPlan::UpToDate {
                drifted_keys: drifted_keys(local, remote),
            }
        }
        _ => SettingsPlan::Push(merge_settings(remote, local, &local_id, version)),
    }
}
