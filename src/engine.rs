//! The index manager.
//!
//! An [`Index`] owns one index directory. Writers go through a single write
//! token; readers query the published [`IndexSnapshot`] and never block on
//! writers. Changes become visible to queries at [`Index::commit`].

pub mod config;
pub mod manifest;
pub mod merge;
pub mod search;
pub mod snapshot;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::analysis::analyzer::analyzer::Analyzer;
use crate::error::{QuarryError, Result};
use crate::lexical::core::document::{Document, StoredDocument};
use crate::lexical::core::term::Term;
use crate::lexical::index::inverted::segment::reader::SegmentReader;
use crate::lexical::index::inverted::segment::writer::write_segment;
use crate::lexical::index::inverted::segment::{SegmentInfo, parse_file_name};
use crate::lexical::index::inverted::writer::ActiveSegment;
use crate::lexical::query::Query;
use crate::lexical::query::builder::QueryBuilder;
use crate::lexical::search::evaluator::{SegmentSource, search};
use crate::maintenance::deletion::{
    DeletionBitmap, decode_deletion_file, deletion_file_name, encode_deletion_file,
};
use crate::storage::Storage;
use crate::storage::file::{FileStorage, TEMP_SUFFIX};

use self::config::IndexConfig;
use self::manifest::Manifest;
use self::merge::{MergeRequest, MergeWorker};
use self::search::{CancellationToken, DocAddress, IndexStats, SearchHit};
use self::snapshot::{IndexSnapshot, SegmentView};

/// A full-text index.
///
/// `Index` is `Send + Sync`; share it between threads with an `Arc`.
///
/// # Example
///
/// ```no_run
/// use quarry::{Document, Index, IndexConfig, Term};
///
/// # fn main() -> quarry::Result<()> {
/// let index = Index::open("/tmp/people", IndexConfig::default())?;
/// index.add_document(
///     Document::builder()
///         .add_text("name", "Kemp test")
///         .add_integer("age", 26)
///         .build(),
/// )?;
/// index.commit()?;
///
/// let query = index.query_builder().phrase("name", "Kemp test")?;
/// let hits = index.query(&query, 10)?;
/// assert_eq!(hits.len(), 1);
///
/// index.delete_by_term(&Term::integer("age", 26))?;
/// index.commit()?;
/// assert!(index.query(&query, 10)?.is_empty());
/// index.close()
/// # }
/// ```
pub struct Index {
    inner: Arc<IndexInner>,
    worker: Mutex<Option<MergeWorker>>,
}

/// State shared between the [`Index`] handle and its merge worker.
pub(crate) struct IndexInner {
    name: String,
    storage: Arc<dyn Storage>,
    config: IndexConfig,
    writer: Mutex<WriterState>,
    snapshot: ArcSwap<IndexSnapshot>,
    merging: AtomicBool,
    last_merge_error: Mutex<Option<String>>,
    corrupt_segments: Vec<u64>,
    closed: AtomicBool,
}

/// Everything guarded by the write token.
struct WriterState {
    /// Documents not yet flushed.
    active: ActiveSegment,

    /// Segments written since the last commit. Their deletions live in the
    /// view and are persisted at commit.
    flushed: Vec<SegmentView>,

    /// Deletions on committed segments not yet committed, keyed by segment id.
    pending_deletions: BTreeMap<u64, DeletionBitmap>,

    /// Smallest segment id not reserved yet.
    next_segment_id: u64,

    /// The last manifest written.
    manifest: Manifest,

    /// Whether anything changed since the last commit.
    dirty: bool,
}

impl WriterState {
    fn reserve_segment_id(&mut self) -> u64 {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        id
    }

    fn pending_docs(&self) -> u64 {
        self.active.live_count() as u64
            + self
                .flushed
                .iter()
                .map(|view| view.live_count() as u64)
                .sum::<u64>()
    }

    /// Run `op`; if it fails, restore the state it started from. Deletion
    /// state is only captured when `deletes` is set.
    fn atomically<T>(
        &mut self,
        deletes: bool,
        op: impl FnOnce(&mut WriterState) -> Result<T>,
    ) -> Result<T> {
        let mark = WriterMark {
            segment_id: self.active.segment_id(),
            active_docs: self.active.doc_count(),
            dirty: self.dirty,
            deletions: deletes.then(|| DeletionMark {
                active: self.active.tombstones(),
                flushed: self.flushed.clone(),
                pending: self.pending_deletions.clone(),
            }),
        };
        let result = op(self);
        if result.is_err() {
            self.rollback(mark);
        }
        result
    }

    fn rollback(&mut self, mark: WriterMark) {
        if self.active.segment_id() == mark.segment_id {
            self.active.truncate(mark.active_docs);
        }
        if let Some(deletions) = mark.deletions {
            if self.active.segment_id() == mark.segment_id {
                self.active.restore_tombstones(&deletions.active);
            }
            self.flushed = deletions.flushed;
            self.pending_deletions = deletions.pending;
        }
        self.dirty = mark.dirty;
    }
}

/// Writer state a failed write rolls back to.
struct WriterMark {
    segment_id: u64,
    active_docs: u32,
    dirty: bool,
    deletions: Option<DeletionMark>,
}

struct DeletionMark {
    active: DeletionBitmap,
    flushed: Vec<SegmentView>,
    pending: BTreeMap<u64, DeletionBitmap>,
}

impl Index {
    /// Open the index stored in directory `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>, config: IndexConfig) -> Result<Index> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(path)?);
        Index::open_with_storage(storage, name, config)
    }

    /// Open the index called `name` under `root`, one directory per index.
    pub fn open_in(root: impl AsRef<Path>, name: &str, config: IndexConfig) -> Result<Index> {
        validate_index_name(name)?;
        Index::open(root.as_ref().join(name), config)
    }

    /// Open an index on arbitrary storage.
    ///
    /// Segments that fail validation are skipped and reported through
    /// [`Index::corrupt_segments`]; files no committed manifest refers to are
    /// removed.
    pub fn open_with_storage(
        storage: Arc<dyn Storage>,
        name: impl Into<String>,
        config: IndexConfig,
    ) -> Result<Index> {
        let name = name.into();
        config.validate()?;

        let manifest = Manifest::load(storage.as_ref())?.unwrap_or_default();
        let mut views = Vec::with_capacity(manifest.segments.len());
        let mut corrupt_segments = Vec::new();
        for info in &manifest.segments {
            match load_segment(&storage, info) {
                Ok(view) => views.push(Arc::new(view)),
                Err(e) => {
                    error!(
                        "index '{name}': skipping segment {}: {e}",
                        info.segment_id
                    );
                    corrupt_segments.push(info.segment_id);
                }
            }
        }

        collect_garbage(storage.as_ref(), &manifest);

        let first_id = manifest.next_segment_id;
        let state = WriterState {
            active: ActiveSegment::new(first_id),
            flushed: Vec::new(),
            pending_deletions: BTreeMap::new(),
            next_segment_id: first_id + 1,
            manifest,
            dirty: false,
        };
        let snapshot = IndexSnapshot::new(state.manifest.generation, views);

        info!(
            "opened index '{name}' at {}: generation {}, {} segments, {} live documents",
            storage.location(),
            snapshot.generation,
            snapshot.segments.len(),
            snapshot.live_count()
        );

        let background_merge = config.background_merge;
        let inner = Arc::new(IndexInner {
            name,
            storage,
            config,
            writer: Mutex::new(state),
            snapshot: ArcSwap::from_pointee(snapshot),
            merging: AtomicBool::new(false),
            last_merge_error: Mutex::new(None),
            corrupt_segments,
            closed: AtomicBool::new(false),
        });
        let worker = if background_merge {
            Some(MergeWorker::spawn(inner.clone())?)
        } else {
            None
        };

        Ok(Index {
            inner,
            worker: Mutex::new(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    /// A query builder using this index's analyzers.
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.inner.config.analyzer.clone())
    }

    /// Add a document. It becomes visible at the next commit.
    ///
    /// If the add or the flush it triggers fails, the document is not kept.
    pub fn add_document(&self, doc: Document) -> Result<DocAddress> {
        let analyzer = self.inner.config.analyzer.clone();
        self.add_document_with_analyzer(doc, analyzer.as_ref())
    }

    /// Add a document analyzed with `analyzer` instead of the configured one.
    pub fn add_document_with_analyzer(
        &self,
        doc: Document,
        analyzer: &dyn Analyzer,
    ) -> Result<DocAddress> {
        let mut state = self.inner.lock_writer()?;
        let mut addresses = state.atomically(false, |state| {
            self.inner.add_locked(state, std::slice::from_ref(&doc), analyzer)
        })?;
        addresses
            .pop()
            .ok_or_else(|| QuarryError::index("add produced no address"))
    }

    /// Add documents in order, as one unit: if any of them or the flush that
    /// follows fails, none is kept. Flush thresholds are checked once, after
    /// the last document.
    pub fn add_documents(&self, docs: Vec<Document>) -> Result<Vec<DocAddress>> {
        for doc in &docs {
            doc.validate()?;
        }
        let mut state = self.inner.lock_writer()?;
        let analyzer = self.inner.config.analyzer.clone();
        state.atomically(false, |state| {
            self.inner.add_locked(state, &docs, analyzer.as_ref())
        })
    }

    /// Delete every document matching `query`, committed or not. Returns the
    /// number of documents deleted.
    pub fn delete_by_query(&self, query: &Query) -> Result<u64> {
        query.validate()?;
        let mut state = self.inner.lock_writer()?;
        state.atomically(true, |state| self.inner.delete_locked(state, query))
    }

    /// Delete every document containing `term`.
    pub fn delete_by_term(&self, term: &Term) -> Result<u64> {
        self.delete_by_query(&Query::Term(term.clone()))
    }

    /// Delete every document.
    pub fn delete_all(&self) -> Result<u64> {
        let mut state = self.inner.lock_writer()?;
        let state = &mut *state;

        let mut deleted = state.active.delete_all() as u64;
        for view in &mut state.flushed {
            let mut deletions = (*view.deletions).clone();
            deleted += deletions.delete_all() as u64;
            view.deletions = Arc::new(deletions);
        }
        let snapshot = self.inner.snapshot.load_full();
        for view in &snapshot.segments {
            let pending = state
                .pending_deletions
                .entry(view.segment_id())
                .or_insert_with(|| DeletionBitmap::new(view.reader.doc_count()));
            let mut effective = (*view.deletions).clone();
            effective.union_with(pending);
            deleted += effective.live_count() as u64;
            pending.delete_all();
        }
        if deleted > 0 {
            state.dirty = true;
        }
        debug!("index '{}': deleted all {deleted} documents", self.inner.name);
        Ok(deleted)
    }

    /// Replace the documents containing `term` with `doc`.
    ///
    /// The deletion and the addition become visible in the same commit.
    pub fn update_by_term(&self, term: &Term, doc: Document) -> Result<DocAddress> {
        let mut addresses = self.update_documents(term, vec![doc])?;
        addresses
            .pop()
            .ok_or_else(|| QuarryError::index("update added no document"))
    }

    /// Replace the documents containing `term` with `docs`. On failure
    /// neither the deletion nor any addition is kept.
    pub fn update_documents(&self, term: &Term, docs: Vec<Document>) -> Result<Vec<DocAddress>> {
        let query = Query::Term(term.clone());
        query.validate()?;
        for doc in &docs {
            doc.validate()?;
        }
        let mut state = self.inner.lock_writer()?;
        let analyzer = self.inner.config.analyzer.clone();
        state.atomically(true, |state| {
            self.inner.delete_locked(state, &query)?;
            self.inner.add_locked(state, &docs, analyzer.as_ref())
        })
    }

    /// Make every change since the last commit durable and visible.
    ///
    /// Returns `false` when there was nothing to commit.
    pub fn commit(&self) -> Result<bool> {
        let committed = {
            let mut state = self.inner.lock_writer()?;
            self.inner.commit_locked(&mut state)?
        };
        if committed {
            self.request_merge();
        }
        Ok(committed)
    }

    /// Top `limit` hits of `query` on the committed state.
    pub fn query(&self, query: &Query, limit: usize) -> Result<Vec<SearchHit>> {
        self.inner.run_query(query, Some(limit), None)
    }

    /// Every hit of `query`, ranked.
    pub fn query_all(&self, query: &Query) -> Result<Vec<SearchHit>> {
        self.inner.run_query(query, None, None)
    }

    /// Like [`Index::query`], abandoning the search once `cancel` is set.
    pub fn query_with_cancel(
        &self,
        query: &Query,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        self.inner.run_query(query, Some(limit), Some(cancel))
    }

    /// Stored fields of a committed, live document.
    pub fn get_document(&self, address: DocAddress) -> Result<StoredDocument> {
        self.inner.ensure_open()?;
        let snapshot = self.inner.snapshot.load();
        let view = snapshot.segment(address.segment).ok_or_else(|| {
            QuarryError::not_found(format!(
                "index '{}' has no segment {}",
                self.inner.name, address.segment
            ))
        })?;
        if view.deletions.is_deleted(address.doc) {
            return Err(QuarryError::not_found(format!(
                "document {address} is deleted or out of range"
            )));
        }
        view.reader.stored_fields(address.doc)
    }

    /// Run the merge policy until it selects nothing. Returns whether any
    /// merge ran. Does nothing when another merge is in progress.
    pub fn maybe_merge(&self) -> Result<bool> {
        self.inner.maybe_merge()
    }

    /// Merge until at most `max_segments` committed segments remain and none
    /// carries deletions if only one is left. Returns the number of merges.
    pub fn force_merge(&self, max_segments: usize) -> Result<usize> {
        self.inner.force_merge(max_segments)
    }

    /// Counters describing the committed and pending state.
    pub fn stats(&self) -> Result<IndexStats> {
        let pending_docs = self.inner.lock_writer()?.pending_docs();
        let snapshot = self.inner.snapshot.load();
        let doc_count = snapshot
            .segments
            .iter()
            .map(|view| view.reader.doc_count() as u64)
            .sum::<u64>();
        let live_docs = snapshot.live_count();
        Ok(IndexStats {
            generation: snapshot.generation,
            segment_ids: snapshot.segments.iter().map(|v| v.segment_id()).collect(),
            doc_count,
            live_docs,
            deleted_docs: doc_count - live_docs,
            pending_docs,
            corrupt_segments: self.inner.corrupt_segments.clone(),
        })
    }

    /// Segments skipped at open because they failed validation.
    pub fn corrupt_segments(&self) -> &[u64] {
        &self.inner.corrupt_segments
    }

    /// Message of the last failed background merge, if any.
    pub fn last_merge_error(&self) -> Option<String> {
        self.inner.last_merge_error.lock().clone()
    }

    /// Commit pending changes and stop the merge worker. Later operations
    /// fail.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.commit();
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown();
        }
        info!("closed index '{}'", self.inner.name);
        result.map(|_| ())
    }

    fn request_merge(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.request(MergeRequest::Check);
        }
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.shutdown();
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.inner.name)
            .field("location", &self.inner.storage.location())
            .field("generation", &self.inner.snapshot.load().generation)
            .finish()
    }
}

impl IndexInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QuarryError::index(format!(
                "index '{}' is closed",
                self.name
            )));
        }
        Ok(())
    }

    /// Acquire the write token, waiting at most `write_lock_timeout`.
    fn lock_writer(&self) -> Result<MutexGuard<'_, WriterState>> {
        self.ensure_open()?;
        self.writer
            .try_lock_for(self.config.write_lock_timeout)
            .ok_or_else(|| {
                QuarryError::concurrency(format!(
                    "timed out after {:?} waiting for the write lock of index '{}'",
                    self.config.write_lock_timeout, self.name
                ))
            })
    }

    /// Add `docs` to the active segment, then flush it if it reached a
    /// threshold. Callers roll back through [`WriterState::atomically`].
    fn add_locked(
        &self,
        state: &mut WriterState,
        docs: &[Document],
        analyzer: &dyn Analyzer,
    ) -> Result<Vec<DocAddress>> {
        let mut addresses = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc_id = state.active.add_document(doc, analyzer)?;
            addresses.push(DocAddress::new(state.active.segment_id(), doc_id));
            state.dirty = true;
        }

        if state.active.doc_count() as usize >= self.config.flush_threshold_docs
            || state.active.memory_usage() >= self.config.flush_threshold_bytes
        {
            self.flush_locked(state)?;
        }
        Ok(addresses)
    }

    /// Write the active segment to storage. The segment becomes visible at
    /// the next commit.
    fn flush_locked(&self, state: &mut WriterState) -> Result<()> {
        if state.active.is_empty() {
            return Ok(());
        }
        if state.active.live_count() == 0 {
            let next_id = state.reserve_segment_id();
            let discarded = state.active.take(next_id);
            debug!(
                "index '{}': discarded fully deleted segment {}",
                self.name,
                discarded.segment_id()
            );
            return Ok(());
        }

        let info = write_segment(&self.storage, &state.active)?;
        let reader = match SegmentReader::open(&self.storage, info.segment_id) {
            Ok(reader) => Arc::new(reader),
            Err(e) => {
                self.delete_files([info.file_name()]);
                return Err(e);
            }
        };
        let deletions = reader.tombstones().clone();

        let next_id = state.reserve_segment_id();
        state.active.take(next_id);
        debug!(
            "index '{}': flushed segment {} with {} documents",
            self.name, info.segment_id, info.doc_count
        );
        state.flushed.push(SegmentView::new(info, reader, deletions));
        Ok(())
    }

    fn delete_locked(&self, state: &mut WriterState, query: &Query) -> Result<u64> {
        let mut deleted = 0u64;

        let active_hits = search(query, &[&state.active as &dyn SegmentSource], None, None)?;
        for hit in active_hits {
            if state.active.delete(hit.doc_id) {
                deleted += 1;
            }
        }

        for view in &mut state.flushed {
            let hits = search(query, &[&*view as &dyn SegmentSource], None, None)?;
            if hits.is_empty() {
                continue;
            }
            let mut deletions = (*view.deletions).clone();
            for hit in hits {
                if deletions.delete(hit.doc_id)? {
                    deleted += 1;
                }
            }
            view.deletions = Arc::new(deletions);
        }

        let snapshot = self.snapshot.load_full();
        for view in &snapshot.segments {
            let effective = match state.pending_deletions.get(&view.segment_id()) {
                Some(pending) => {
                    let mut effective = (*view.deletions).clone();
                    effective.union_with(pending);
                    view.with_deletions(view.info.clone(), effective)
                }
                None => (**view).clone(),
            };
            let hits = search(query, &[&effective as &dyn SegmentSource], None, None)?;
            if hits.is_empty() {
                continue;
            }
            let pending = state
                .pending_deletions
                .entry(view.segment_id())
                .or_insert_with(|| DeletionBitmap::new(view.reader.doc_count()));
            for hit in hits {
                if pending.delete(hit.doc_id)? {
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            state.dirty = true;
        }
        debug!("index '{}': {query} deleted {deleted} documents", self.name);
        Ok(deleted)
    }

    /// Persist a deletion file for `info` and return the updated info.
    fn write_deletions(
        &self,
        info: &SegmentInfo,
        deletions: &DeletionBitmap,
        generation: u64,
    ) -> Result<SegmentInfo> {
        let data = encode_deletion_file(info.segment_id, deletions)?;
        self.storage
            .write_atomic(&deletion_file_name(info.segment_id, generation), &data)?;
        Ok(SegmentInfo {
            deletion_generation: generation,
            deleted_count: deletions.deleted_count(),
            ..info.clone()
        })
    }

    fn commit_locked(&self, state: &mut WriterState) -> Result<bool> {
        if !state.dirty {
            return Ok(false);
        }
        self.flush_locked(state)?;

        let snapshot = self.snapshot.load_full();
        let generation = state.manifest.generation + 1;
        let mut infos = Vec::with_capacity(state.manifest.segments.len() + state.flushed.len());
        let mut views = Vec::with_capacity(infos.capacity());
        let mut discarded = Vec::new();

        for info in &state.manifest.segments {
            let Some(view) = snapshot.segment(info.segment_id) else {
                // Skipped at open; keep it listed so its files survive.
                infos.push(info.clone());
                continue;
            };
            match state.pending_deletions.get(&info.segment_id) {
                Some(pending) if pending.has_deletions() => {
                    let mut deletions = (*view.deletions).clone();
                    deletions.union_with(pending);
                    if deletions.is_fully_deleted() {
                        continue;
                    }
                    let info = self.write_deletions(&view.info, &deletions, generation)?;
                    views.push(Arc::new(view.with_deletions(info.clone(), deletions)));
                    infos.push(info);
                }
                _ => {
                    infos.push(view.info.clone());
                    views.push(view.clone());
                }
            }
        }

        for view in &state.flushed {
            if view.deletions.is_fully_deleted() {
                discarded.push(view.info.file_name());
                continue;
            }
            let info = if view.deletions.deleted_count() > view.reader.tombstones().deleted_count()
            {
                self.write_deletions(&view.info, &view.deletions, generation)?
            } else {
                view.info.clone()
            };
            views.push(Arc::new(view.with_deletions(
                info.clone(),
                (*view.deletions).clone(),
            )));
            infos.push(info);
        }

        let manifest = state.manifest.next(infos, state.next_segment_id);
        manifest.save(self.storage.as_ref())?;
        self.snapshot
            .store(Arc::new(IndexSnapshot::new(manifest.generation, views)));

        let live = manifest.referenced_files();
        let obsolete = state
            .manifest
            .referenced_files()
            .into_iter()
            .filter(|name| !live.contains(name))
            .chain(discarded);
        self.delete_files(obsolete);

        info!(
            "committed index '{}' generation {}: {} segments, {} live documents",
            self.name,
            manifest.generation,
            manifest.segments.len(),
            manifest.live_count()
        );

        state.manifest = manifest;
        state.flushed.clear();
        state.pending_deletions.clear();
        state.dirty = false;
        Ok(true)
    }

    /// Best-effort removal of files no manifest refers to any more.
    fn delete_files(&self, names: impl IntoIterator<Item = String>) {
        for name in names {
            if let Err(e) = self.storage.delete_file(&name) {
                warn!("index '{}': failed to delete {name}: {e}", self.name);
            }
        }
    }

    fn run_query(
        &self,
        query: &Query,
        limit: Option<usize>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<SearchHit>> {
        self.ensure_open()?;
        let snapshot = self.snapshot.load_full();
        let hits = search(query, &snapshot.sources(), limit, cancel)?;

        hits.into_iter()
            .map(|hit| {
                let view = snapshot.segment(hit.segment_id).ok_or_else(|| {
                    QuarryError::index(format!(
                        "hit in segment {} outside the snapshot",
                        hit.segment_id
                    ))
                })?;
                Ok(SearchHit {
                    address: DocAddress::new(hit.segment_id, hit.doc_id),
                    score: hit.score,
                    document: view.reader.stored_fields(hit.doc_id)?,
                })
            })
            .collect()
    }
}

/// Open a committed segment and apply its deletion file.
fn load_segment(storage: &Arc<dyn Storage>, info: &SegmentInfo) -> Result<SegmentView> {
    let reader = SegmentReader::open(storage, info.segment_id)?;
    if reader.doc_count() != info.doc_count {
        return Err(QuarryError::corrupt(
            reader.name(),
            format!(
                "holds {} documents, manifest records {}",
                reader.doc_count(),
                info.doc_count
            ),
        ));
    }
    let mut deletions = reader.tombstones().clone();
    if let Some(file_name) = info.deletion_file_name() {
        let data = storage.read_file(&file_name)?;
        let committed =
            decode_deletion_file(&file_name, info.segment_id, info.doc_count, &data)?;
        deletions.union_with(&committed);
    }
    Ok(SegmentView::new(info.clone(), Arc::new(reader), deletions))
}

/// Remove temporary files and segment or deletion files `manifest` does not
/// reference: leftovers of crashed writes and uncommitted flushes.
fn collect_garbage(storage: &dyn Storage, manifest: &Manifest) {
    let files = match storage.list_files() {
        Ok(files) => files,
        Err(e) => {
            warn!("cannot list {} for cleanup: {e}", storage.location());
            return;
        }
    };
    let referenced: HashSet<String> = manifest.referenced_files();
    for name in files {
        let orphan = name.ends_with(TEMP_SUFFIX)
            || (parse_file_name(&name).is_some() && !referenced.contains(&name));
        if !orphan {
            continue;
        }
        match storage.delete_file(&name) {
            Ok(()) => warn!("removed orphan file {name} from {}", storage.location()),
            Err(e) => warn!("failed to remove orphan file {name}: {e}"),
        }
    }
}

fn validate_index_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(QuarryError::input(format!("invalid index name {name:?}")))
    }
}
