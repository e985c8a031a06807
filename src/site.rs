//! Built-site scanner.
//!
//! Walks the output directory of a static-site build and turns every
//! indexable page into a [`SiteDocument`]: its HTML plus the page-level
//! metadata copied onto each of its records.
//!
//! Page metadata is read from the rendered markup:
//!
//! | Source | Field |
//! |--------|-------|
//! | `<title>` | `title` |
//! | `meta[property="article:published_time"]`, else `time[datetime]` | `date` |
//! | `meta[property="article:tag"]` (repeatable) | `tags` |
//! | first non-empty `<p>`, else `meta[name="description"]` | `excerpt_html` / `excerpt_text` |
//! | `meta[name="searchsync:<key>"]` | extra field `<key>` |
//!
//! The URL comes from the path relative to the site root (`index.html`
//! maps to its directory) and the record type from `post_globs` /
//! `document_globs`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use globset::{Glob, GlobSet, GlobSetBuilder};
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use searchsync_core::extract::collapse_whitespace;
use searchsync_core::models::RecordType;

use crate::config::SiteConfig;

/// Prefix of `<meta name>` attributes copied into records as extra fields.
pub const META_PREFIX: &str = "searchsync:";

/// One rendered page of the site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDocument {
    /// Path relative to the site root, `/`-separated.
    pub path: String,
    pub url: String,
    pub record_type: RecordType,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub date: Option<i64>,
    pub tags: Vec<String>,
    pub excerpt_html: Option<String>,
    pub excerpt_text: Option<String>,
    pub extra: BTreeMap<String, Value>,
    pub html: String,
}

pub fn scan_site(config: &SiteConfig) -> Result<Vec<SiteDocument>> {
    let root = &config.root;
    if !root.is_dir() {
        bail!("Site root does not exist or is not a directory: {}", root.display());
    }

    let exclude_set = build_globset(&config.files_to_exclude)?;
    let classifier = TypeClassifier::new(config)?;
    let meta = MetaSelectors::new();

    let mut documents = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative_path(relative);

        if !has_indexed_extension(path, &config.extensions_to_index) {
            continue;
        }
        if exclude_set.is_match(&rel_str) {
            debug!(path = %rel_str, "excluded");
            continue;
        }

        let html = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record_type = classifier.classify(&rel_str);
        documents.push(parse_document(&rel_str, html, record_type, &config.base_url, &meta));
    }

    // Sort for deterministic ordering
    documents.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(documents)
}

/// Build a [`SiteDocument`] from one page's HTML.
pub fn parse_document(
    relative_path: &str,
    html: String,
    record_type: RecordType,
    base_url: &str,
    meta: &MetaSelectors,
) -> SiteDocument {
    let parsed = Html::parse_document(&html);

    let title = parsed
        .select(&meta.title)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let date = parsed
        .select(&meta.published_time)
        .filter_map(|m| m.value().attr("content"))
        .chain(
            parsed
                .select(&meta.time)
                .filter_map(|t| t.value().attr("datetime")),
        )
        .find_map(parse_date);

    let tags = parsed
        .select(&meta.tags)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let (excerpt_html, excerpt_text) = match parsed
        .select(&meta.paragraph)
        .map(|p| (p.html(), collapse_whitespace(&p.text().collect::<String>())))
        .find(|(_, text)| !text.is_empty())
    {
        Some((html, text)) => (Some(html), Some(text)),
        None => {
            let description = parsed
                .select(&meta.description)
                .filter_map(|m| m.value().attr("content"))
                .map(collapse_whitespace)
                .find(|d| !d.is_empty());
            (description.clone(), description)
        }
    };

    let mut extra = BTreeMap::new();
    for element in parsed.select(&meta.custom) {
        let (Some(name), Some(content)) =
            (element.value().attr("name"), element.value().attr("content"))
        else {
            continue;
        };
        if let Some(key) = name.strip_prefix(META_PREFIX).filter(|k| !k.is_empty()) {
            extra.insert(key.to_string(), Value::String(content.to_string()));
        }
    }

    SiteDocument {
        path: relative_path.to_string(),
        url: url_for(base_url, relative_path),
        record_type,
        title,
        slug: slug_for(relative_path),
        date,
        tags,
        excerpt_html,
        excerpt_text,
        extra,
        html,
    }
}

/// Selectors for page metadata, compiled once per scan.
pub struct MetaSelectors {
    title: Selector,
    published_time: Selector,
    time: Selector,
    tags: Selector,
    description: Selector,
    paragraph: Selector,
    custom: Selector,
}

impl MetaSelectors {
    pub fn new() -> Self {
        Self {
            title: Selector::parse("head title").expect("title selector"),
            published_time: Selector::parse(r#"meta[property="article:published_time"]"#)
                .expect("published_time selector"),
            time: Selector::parse("time[datetime]").expect("time selector"),
            tags: Selector::parse(r#"meta[property="article:tag"]"#).expect("tag selector"),
            description: Selector::parse(r#"meta[name="description"]"#)
                .expect("description selector"),
            paragraph: Selector::parse("body p").expect("paragraph selector"),
            custom: Selector::parse(r#"meta[name^="searchsync:"]"#).expect("custom meta selector"),
        }
    }
}

impl Default for MetaSelectors {
    fn default() -> Self {
        Self::new()
    }
}

struct TypeClassifier {
    posts: GlobSet,
    documents: GlobSet,
}

impl TypeClassifier {
    fn new(config: &SiteConfig) -> Result<Self> {
        Ok(Self {
            posts: build_globset(&config.post_globs)?,
            documents: build_globset(&config.document_globs)?,
        })
    }

    fn classify(&self, relative_path: &str) -> RecordType {
        if self.posts.is_match(relative_path) {
            RecordType::Post
        } else if self.documents.is_match(relative_path) {
            RecordType::Document
        } else {
            RecordType::Page
        }
    }
}

/// Epoch seconds of an RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
fn parse_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc().timestamp())
}

/// Public URL of a page. `index.html` maps to its directory.
fn url_for(base_url: &str, relative_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = match relative_path.rsplit_once('/') {
        Some((dir, "index.html")) => format!("{}/", dir),
        None if relative_path == "index.html" => String::new(),
        _ => relative_path.to_string(),
    };
    format!("{}/{}", base, path)
}

/// File stem, or the directory name for `index.html` pages.
fn slug_for(relative_path: &str) -> Option<String> {
    let mut segments = relative_path.rsplit('/');
    let file = segments.next()?;
    let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
    if stem == "index" {
        return segments.next().map(str::to_string);
    }
    Some(stem.to_string()).filter(|s| !s.is_empty())
}

fn relative_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn has_indexed_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
