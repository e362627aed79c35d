use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::authz::QueryFilter;
use crate::error::{PropdexError, Result};
use crate::models::{Acl, PropertySet};
use crate::uri::path_within;

use super::snapshot::{Segment, documents_checksum, read_snapshot, write_snapshot};
use super::{
    IndexDocument, IndexedResourceData, PropertyQuery, PropertySetIndex, RandomAccessor,
};

/// Property-set index held in memory, optionally persisted as a JSON
/// snapshot on every commit.
pub struct InMemoryPropertySetIndex {
    committed: RwLock<Arc<Segment>>,
    staged: Mutex<Option<Segment>>,
    write_locked: AtomicBool,
    cluster_read_only: AtomicBool,
    snapshot_path: Option<PathBuf>,
}

impl std::fmt::Debug for InMemoryPropertySetIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPropertySetIndex")
            .field("snapshot_path", &self.snapshot_path)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryPropertySetIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPropertySetIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::from_segment(Segment::empty(), None)
    }

    /// Opens (or starts) an index persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let segment = match read_snapshot(&path)? {
            Some(segment) => {
                info!(
                    path = %path.display(),
                    documents = segment.document_count(),
                    "loaded index snapshot"
                );
                segment
            }
            None => Segment::empty(),
        };
        Ok(Self::from_segment(segment, Some(path)))
    }

    fn from_segment(segment: Segment, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            committed: RwLock::new(Arc::new(segment)),
            staged: Mutex::new(None),
            write_locked: AtomicBool::new(false),
            cluster_read_only: AtomicBool::new(false),
            snapshot_path,
        }
    }

    pub fn set_cluster_shared_read_only(&self, read_only: bool) {
        self.cluster_read_only.store(read_only, Ordering::SeqCst);
    }

    /// Stages a raw document under `uri`, bypassing encoding.
    pub fn add_document(&self, uri: &str, document: IndexDocument) -> Result<()> {
        self.with_staged(|segment| {
            segment
                .documents
                .entry(uri.to_string())
                .or_default()
                .push(document);
        })
    }

    pub fn document_count(&self) -> Result<usize> {
        Ok(self.committed()?.document_count())
    }

    /// Runs `query` against committed documents, trimmed by `filter`.
    pub fn search(
        &self,
        query: &PropertyQuery,
        filter: Option<&QueryFilter>,
        limit: usize,
    ) -> Result<Vec<PropertySet>> {
        let segment = self.committed()?;
        let mut out = Vec::new();
        for (key, entries) in &segment.documents {
            if out.len() >= limit {
                break;
            }
            let Some(document) = entries.first() else {
                continue;
            };
            if !query.matches_fields(key, document) {
                continue;
            }
            if filter.is_some_and(|filter| !filter.matches(document)) {
                continue;
            }
            match document.decode(key) {
                Ok(set) if query.matches_decoded(&set) => out.push(set),
                Ok(_) => {}
                Err(err) => warn!(uri = %key, error = %err, "skipping undecodable index document"),
            }
        }
        Ok(out)
    }

    fn committed(&self) -> Result<Arc<Segment>> {
        let guard = self
            .committed
            .read()
            .map_err(|_| PropdexError::mutex_poisoned("index committed segment"))?;
        Ok(Arc::clone(&guard))
    }

    fn with_staged<T>(&self, f: impl FnOnce(&mut Segment) -> T) -> Result<T> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("index staging"))?;
        if staged.is_none() {
            let base = self.committed()?;
            *staged = Some(Segment::clone(&base));
        }
        let Some(segment) = staged.as_mut() else {
            return Err(PropdexError::Internal("index staging unavailable".to_string()));
        };
        Ok(f(segment))
    }
}

impl PropertySetIndex for InMemoryPropertySetIndex {
    fn add_property_set(&self, set: &PropertySet, acl: &Acl) -> Result<()> {
        let document = IndexDocument::encode(set, acl)?;
        self.add_document(&set.uri.as_path(), document)
    }

    fn delete_property_set(&self, uri: &str) -> Result<usize> {
        self.with_staged(|segment| segment.documents.remove(uri).map_or(0, |entries| entries.len()))
    }

    fn delete_property_set_tree(&self, uri: &str) -> Result<usize> {
        self.with_staged(|segment| {
            let doomed = segment
                .documents
                .range(uri.to_string()..)
                .take_while(|(key, _)| key.starts_with(uri))
                .filter(|(key, _)| path_within(key, uri))
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            let mut removed = 0usize;
            for key in doomed {
                if let Some(entries) = segment.documents.remove(&key) {
                    removed += entries.len();
                }
            }
            removed
        })
    }

    fn lock(&self) -> bool {
        self.write_locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn unlock(&self) {
        self.write_locked.store(false, Ordering::Release);
    }

    fn commit(&self) -> Result<()> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("index staging"))?;
        let Some(mut segment) = staged.take() else {
            return Ok(());
        };
        segment.checksum = documents_checksum(&segment.documents);
        if let Some(path) = &self.snapshot_path
            && let Err(err) = write_snapshot(path, &segment)
        {
            *staged = Some(segment);
            return Err(err);
        }
        let documents = segment.document_count();
        let mut committed = self
            .committed
            .write()
            .map_err(|_| PropdexError::mutex_poisoned("index committed segment"))?;
        *committed = Arc::new(segment);
        debug!(documents, "index committed");
        Ok(())
    }

    fn rollback(&self) {
        if let Ok(mut staged) = self.staged.lock()
            && staged.take().is_some()
        {
            debug!("index staged writes discarded");
        }
    }

    fn is_cluster_shared_read_only(&self) -> bool {
        self.cluster_read_only.load(Ordering::SeqCst)
    }

    fn random_accessor(&self) -> Result<Box<dyn RandomAccessor + '_>> {
        Ok(Box::new(SegmentAccessor {
            segment: self.committed()?,
        }))
    }

    fn ordered_uri_iterator(&self) -> Result<Box<dyn Iterator<Item = String> + Send + '_>> {
        let segment = self.committed()?;
        let uris = segment
            .documents
            .iter()
            .flat_map(|(key, entries)| std::iter::repeat_n(key.clone(), entries.len()))
            .collect::<Vec<_>>();
        Ok(Box::new(uris.into_iter()))
    }

    fn validate_storage_facility(&self) -> Result<()> {
        let segment = self.committed()?;
        let actual = documents_checksum(&segment.documents);
        if actual != segment.checksum {
            return Err(PropdexError::StorageCorrupted(format!(
                "checksum mismatch: recorded {}, computed {actual}",
                segment.checksum
            )));
        }
        for (key, entries) in &segment.documents {
            for document in entries {
                if let Some(stored_uri) = document.uri()
                    && stored_uri != key
                {
                    return Err(PropdexError::StorageCorrupted(format!(
                        "document keyed {key} stores uri {stored_uri}"
                    )));
                }
            }
        }
        Ok(())
    }
}

struct SegmentAccessor {
    segment: Arc<Segment>,
}

impl RandomAccessor for SegmentAccessor {
    fn count_instances(&self, uri: &str) -> Result<usize> {
        Ok(self.segment.documents.get(uri).map_or(0, Vec::len))
    }

    fn property_set_by_uri(&self, uri: &str) -> Result<Option<PropertySet>> {
        self.segment
            .documents
            .get(uri)
            .and_then(|entries| entries.first())
            .map(|document| document.decode(uri))
            .transpose()
    }

    fn internal_data(&self, uri: &str) -> Result<Option<IndexedResourceData>> {
        self.segment
            .documents
            .get(uri)
            .and_then(|entries| entries.first())
            .map(|document| document.decode_internals(uri))
            .transpose()
    }
}
