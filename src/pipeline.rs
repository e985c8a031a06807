//! Record building pipeline.
//!
//! Turns scanned site documents into the final record set:
//! extraction → per-record hooks → site-wide hooks → `objectID`
//! fingerprint → size fitting. Documents are extracted on blocking tasks
//! and reassembled in document order, so the output never depends on
//! scheduling.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info};

use searchsync_core::extract::{ExtractedNode, HierarchyExtractor};
use searchsync_core::fingerprint::assign_object_id;
use searchsync_core::models::Record;
use searchsync_core::shrink::fit_to_size;

use crate::error::SyncError;
use crate::hooks::Hooks;
use crate::site::SiteDocument;

/// Build the records of every document, in document order.
pub async fn build_records(
    documents: Vec<SiteDocument>,
    nodes_to_index: &str,
    max_record_size: usize,
    hooks: Arc<dyn Hooks>,
) -> Result<Vec<Record>, SyncError> {
    let extractor = Arc::new(HierarchyExtractor::new(nodes_to_index)?);
    let document_count = documents.len();
    let limit = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    let mut per_document: Vec<Option<Vec<Record>>> = vec![None; document_count];
    let mut join_set = JoinSet::new();
    let mut pending = documents.into_iter().enumerate();

    loop {
        while join_set.len() < limit {
            let Some((position, document)) = pending.next() else {
                break;
            };
            let extractor = Arc::clone(&extractor);
            let hooks = Arc::clone(&hooks);
            join_set.spawn_blocking(move || {
                (position, document_records(&extractor, &document, hooks.as_ref()))
            });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        let (position, records) = joined.map_err(|e| SyncError::Task(e.to_string()))?;
        per_document[position] = Some(records);
    }

    let records: Vec<Record> = per_document.into_iter().flatten().flatten().collect();
    let extracted = records.len();
    let records = hooks.before_indexing_all(records);

    let mut seen = HashSet::new();
    let mut finished = Vec::with_capacity(records.len());
    for mut record in records {
        assign_object_id(&mut record)?;
        if !seen.insert(record.object_id.clone()) {
            debug!(object_id = %record.object_id, url = %record.url, "duplicate record skipped");
            continue;
        }
        finished.push(fit_to_size(record, max_record_size)?);
    }

    info!(
        documents = document_count,
        extracted,
        records = finished.len(),
        "records built"
    );
    Ok(finished)
}

/// Extract one document and run the per-record hook on each record.
fn document_records(
    extractor: &HierarchyExtractor,
    document: &SiteDocument,
    hooks: &dyn Hooks,
) -> Vec<Record> {
    let nodes = extractor.extract(&document.html);
    debug!(path = %document.path, nodes = nodes.len(), "extracted");
    nodes
        .into_iter()
        .filter_map(|node| {
            let record = record_from_node(document, &node);
            hooks.before_indexing_each(record, &node)
        })
        .collect()
}

/// A record for `node`, carrying the page-level metadata of `document`.
///
/// The `objectID` is left empty until fingerprinting.
pub fn record_from_node(document: &SiteDocument, node: &ExtractedNode) -> Record {
    Record {
        object_id: String::new(),
        url: document.url.clone(),
        record_type: document.record_type,
        title: document.title.clone(),
        slug: document.slug.clone(),
        date: document.date,
        tags: document.tags.clone(),
        hierarchy: node.hierarchy.clone(),
        anchor: node.anchor.clone(),
        weight: node.weight,
        tag_name: node.tag_name.clone(),
        html: node.html.clone(),
        text: node.text.clone(),
        excerpt_html: document.excerpt_html.clone(),
        excerpt_text: document.excerpt_text.clone(),
        extra: document.extra.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoHooks;
    use crate::site::{parse_document, MetaSelectors};
    use searchsync_core::fingerprint::fingerprint;
    use searchsync_core::models::RecordType;

    fn doc(path: &str, body: &str) -> SiteDocument {
        parse_document(
            path,
            format!("<html><head><title>{path}</title></head><body>{body}</body></html>"),
            RecordType::Page,
            "/",
            &MetaSelectors::new(),
        )
    }

    fn site() -> Vec<SiteDocument> {
        vec![
            doc("a.html", "<h1>A</h1><p>one</p><h2 id=\"more\">More</h2><p>two</p>"),
            doc("b.html", "<p>three</p>"),
            doc("c.html", "<div>no paragraphs</div>"),
        ]
    }

    #[tokio::test]
    async fn records_follow_document_order() {
        let records = build_records(site(), "p", 10_000, Arc::new(NoHooks))
            .await
            .unwrap();
        let texts: Vec<_> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);

        let two = &records[1];
        assert_eq!(two.url, "/a.html");
        assert_eq!(two.anchor.as_deref(), Some("more"));
        assert_eq!(two.hierarchy.lvl0.as_deref(), Some("A"));
        assert_eq!(two.hierarchy.lvl1.as_deref(), Some("More"));
        assert_eq!(two.excerpt_text.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn object_ids_are_content_fingerprints() {
        let first = build_records(site(), "p", 10_000, Arc::new(NoHooks))
            .await
            .unwrap();
        let second = build_records(site(), "p", 10_000, Arc::new(NoHooks))
            .await
            .unwrap();
        assert_eq!(first, second);
        for record in &first {
            assert_eq!(record.object_id, fingerprint(record).unwrap());
        }
    }

    struct DropShortAndTag;

    impl Hooks for DropShortAndTag {
        fn before_indexing_each(&self, mut record: Record, node: &ExtractedNode) -> Option<Record> {
            if node.text.len() < 4 {
                return None;
            }
            record
                .extra
                .insert("source".to_string(), serde_json::json!(node.tag_name));
            Some(record)
        }

        fn before_indexing_all(&self, mut records: Vec<Record>) -> Vec<Record> {
            records.reverse();
            records
        }
    }

    #[tokio::test]
    async fn hooks_transform_and_filter() {
        let records = build_records(site(), "p", 10_000, Arc::new(DropShortAndTag))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "three");
        assert_eq!(records[0].extra["source"], serde_json::json!("p"));
    }

    #[tokio::test]
    async fn oversized_record_fails_the_build() {
        let long = "word ".repeat(400);
        let docs = vec![doc("big.html", &format!("<div>{long}</div>"))];
        let err = build_records(docs, "div", 500, Arc::new(NoHooks))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unshrinkable { .. }));
    }

    #[tokio::test]
    async fn invalid_selector_is_reported() {
        let err = build_records(site(), "p[", 10_000, Arc::new(NoHooks))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Extract(_)));
    }
}
