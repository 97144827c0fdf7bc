use crate::engine::{DocumentExtraction, ExtractionEngine};
use crate::schema::DocumentText;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Hex SHA-256 over the document's pages and lines.
///
/// Page and line boundaries are part of the digest, so moving a line to the
/// next page changes the fingerprint. The document id is not included.
pub fn content_fingerprint(doc: &DocumentText) -> String {
    let mut hasher = Sha256::new();
    for page in &doc.pages {
        for line in page {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"\x0c");
    }
    hex::encode(hasher.finalize())
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<DocumentExtraction>>,
    // document id -> fingerprint last extracted under that id
    documents: HashMap<String, String>,
}

/// Extraction results keyed by content fingerprint.
///
/// The cache is an ordinary value owned by the caller; share it behind an
/// `Arc` if several threads extract. All access goes through one mutex, so
/// a lookup and the insert that follows it cannot interleave with another
/// caller's.
#[derive(Default)]
pub struct ResultCache {
    state: Mutex<CacheState>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock cannot leave the maps half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached extraction for `doc`'s content, extracting on a miss.
    ///
    /// If `doc.id` was last seen with different content, the stale entry is
    /// evicted before the new result is stored.
    pub fn get_or_extract(
        &self,
        engine: &ExtractionEngine,
        doc: &DocumentText,
    ) -> Arc<DocumentExtraction> {
        let fingerprint = content_fingerprint(doc);
        let mut state = self.lock();

        if let Some(previous) = state.documents.get(&doc.id).cloned() {
            if previous != fingerprint {
                info!(
                    "Document '{}' changed since it was extracted ({} -> {}); evicting stale result",
                    doc.id,
                    short(&previous),
                    short(&fingerprint)
                );
                evict_if_unreferenced(&mut state, &previous, &doc.id);
            }
        }

        if let Some(hit) = state.entries.get(&fingerprint).cloned() {
            debug!("Cache hit for '{}' ({})", doc.id, short(&fingerprint));
            state.documents.insert(doc.id.clone(), fingerprint);
            return hit;
        }

        debug!("Cache miss for '{}' ({})", doc.id, short(&fingerprint));
        let extraction = Arc::new(engine.extract_all(doc));

        state
            .entries
            .insert(fingerprint.clone(), Arc::clone(&extraction));
        state.documents.insert(doc.id.clone(), fingerprint);
        extraction
    }

    pub fn get(&self, fingerprint: &str) -> Option<Arc<DocumentExtraction>> {
        self.lock().entries.get(fingerprint).cloned()
    }

    /// Cached result for the content last extracted under `document_id`.
    pub fn get_document(&self, document_id: &str) -> Option<Arc<DocumentExtraction>> {
        let state = self.lock();
        let fingerprint = state.documents.get(document_id)?;
        state.entries.get(fingerprint).cloned()
    }

    pub fn invalidate(&self, fingerprint: &str) -> bool {
        let mut state = self.lock();
        state.documents.retain(|_, fp| fp != fingerprint);
        state.entries.remove(fingerprint).is_some()
    }

    pub fn invalidate_document(&self, document_id: &str) -> bool {
        let mut state = self.lock();
        match state.documents.remove(document_id) {
            Some(fingerprint) => {
                evict_if_unreferenced(&mut state, &fingerprint, document_id);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.documents.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

// Identical content may be registered under several ids; only drop the
// entry when no other id still points at it.
fn evict_if_unreferenced(state: &mut CacheState, fingerprint: &str, document_id: &str) {
    let shared = state
        .documents
        .iter()
        .any(|(id, fp)| id != document_id && fp == fingerprint);
    if !shared {
        state.entries.remove(fingerprint);
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, total: &str) -> DocumentText {
        DocumentText::from_page_texts(
            id,
            [format!(
                "Balance Sheet\nAs at 31 March 2024   As at 31 March 2023\nTotal assets  {}  100.00",
                total
            )],
        )
    }

    #[test]
    fn test_fingerprint_tracks_content_and_pages() {
        let a = DocumentText::from_page_texts("a", ["one\ntwo"]);
        let b = DocumentText::from_page_texts("b", ["one\ntwo"]);
        let split = DocumentText::from_page_texts("a", ["one", "two"]);

        assert_eq!(content_fingerprint(&a), content_fingerprint(&b));
        assert_ne!(content_fingerprint(&a), content_fingerprint(&split));
    }

    #[test]
    fn test_hit_returns_shared_result() {
        let engine = ExtractionEngine::with_standard_config().unwrap();
        let cache = ResultCache::new();

        let first = cache.get_or_extract(&engine, &doc("report.pdf", "200.00"));
        let second = cache.get_or_extract(&engine, &doc("report.pdf", "200.00"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&first.fingerprint).is_some());
    }

    #[test]
    fn test_changed_document_evicts_stale_entry() {
        let engine = ExtractionEngine::with_standard_config().unwrap();
        let cache = ResultCache::new();

        let old = cache.get_or_extract(&engine, &doc("report.pdf", "200.00"));
        let new = cache.get_or_extract(&engine, &doc("report.pdf", "300.00"));

        assert_ne!(old.fingerprint, new.fingerprint);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&old.fingerprint).is_none());
        assert_eq!(
            cache.get_document("report.pdf").unwrap().fingerprint,
            new.fingerprint
        );
    }

    #[test]
    fn test_shared_content_survives_other_id_changing() {
        let engine = ExtractionEngine::with_standard_config().unwrap();
        let cache = ResultCache::new();

        let shared = cache.get_or_extract(&engine, &doc("a.pdf", "200.00"));
        cache.get_or_extract(&engine, &doc("b.pdf", "200.00"));
        cache.get_or_extract(&engine, &doc("b.pdf", "300.00"));

        assert!(cache.get(&shared.fingerprint).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_id_moving_to_cached_content_evicts_its_old_entry() {
        let engine = ExtractionEngine::with_standard_config().unwrap();
        let cache = ResultCache::new();

        let original = cache.get_or_extract(&engine, &doc("a.pdf", "200.00"));
        let other = cache.get_or_extract(&engine, &doc("b.pdf", "300.00"));
        let moved = cache.get_or_extract(&engine, &doc("a.pdf", "300.00"));

        assert!(Arc::ptr_eq(&other, &moved));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&original.fingerprint).is_none());
        assert_eq!(
            cache.get_document("a.pdf").unwrap().fingerprint,
            other.fingerprint
        );
    }

    #[test]
    fn test_invalidation() {
        let engine = ExtractionEngine::with_standard_config().unwrap();
        let cache = ResultCache::new();

        let result = cache.get_or_extract(&engine, &doc("report.pdf", "200.00"));
        assert!(cache.invalidate_document("report.pdf"));
        assert!(!cache.invalidate_document("report.pdf"));
        assert!(cache.is_empty());

        cache.get_or_extract(&engine, &doc("report.pdf", "200.00"));
        assert!(cache.invalidate(&result.fingerprint));
        assert!(cache.get_document("report.pdf").is_none());

        cache.get_or_extract(&engine, &doc("report.pdf", "200.00"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
