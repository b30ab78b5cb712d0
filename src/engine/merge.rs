//! Segment merging and the background merge worker.
//!
//! A merge reads immutable segments without holding the write token. Only
//! installing the result takes it: deletions that arrived while the merge
//! ran are carried over to the merged segment, a manifest without the
//! sources is written and the new snapshot is published.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::engine::IndexInner;
use crate::engine::snapshot::{IndexSnapshot, SegmentView};
use crate::error::{QuarryError, Result};
use crate::lexical::index::inverted::segment::SegmentInfo;
use crate::lexical::index::inverted::segment::merge_engine::{
    MergeSource, MergedSegment, merge_segments,
};
use crate::lexical::index::inverted::segment::merge_policy::MergeCandidate;
use crate::lexical::index::inverted::segment::reader::SegmentReader;
use crate::maintenance::deletion::DeletionBitmap;

/// Messages understood by the merge worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRequest {
    /// Run the merge policy.
    Check,
    /// Exit the worker loop.
    Shutdown,
}

/// A dedicated thread running merges on request.
pub(crate) struct MergeWorker {
    sender: Sender<MergeRequest>,
    handle: Option<JoinHandle<()>>,
}

impl MergeWorker {
    pub(crate) fn spawn(inner: Arc<IndexInner>) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name(format!("quarry-merge-{}", inner.name))
            .spawn(move || worker_loop(inner, receiver))
            .map_err(|e| QuarryError::io("spawn merge worker", e))?;
        Ok(MergeWorker {
            sender,
            handle: Some(handle),
        })
    }

    pub(crate) fn request(&self, request: MergeRequest) {
        if self.sender.send(request).is_err() {
            warn!("merge worker is gone, dropping {request:?}");
        }
    }

    /// Stop the worker and wait for a running merge to finish.
    pub(crate) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.sender.send(MergeRequest::Shutdown);
        if handle.join().is_err() {
            error!("merge worker panicked");
        }
    }
}

impl Drop for MergeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(inner: Arc<IndexInner>, receiver: Receiver<MergeRequest>) {
    while let Ok(request) = receiver.recv() {
        if request == MergeRequest::Shutdown {
            break;
        }
        // Coalesce checks queued behind this one.
        if receiver.try_iter().any(|r| r == MergeRequest::Shutdown) {
            break;
        }
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }
        match inner.maybe_merge() {
            Ok(_) => {
                *inner.last_merge_error.lock() = None;
            }
            Err(e) => {
                error!("background merge of index '{}' failed: {e}", inner.name);
                *inner.last_merge_error.lock() = Some(e.to_string());
            }
        }
    }
    debug!("merge worker of index '{}' stopped", inner.name);
}

/// Holds the merge flag; clears it on drop.
struct MergeGuard<'a>(&'a AtomicBool);

impl<'a> MergeGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| MergeGuard(flag))
    }
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl IndexInner {
    fn committed_infos(&self) -> Vec<SegmentInfo> {
        self.snapshot
            .load()
            .segments
            .iter()
            .map(|view| view.info.clone())
            .collect()
    }

    pub(crate) fn maybe_merge(&self) -> Result<bool> {
        self.ensure_open()?;
        let Some(_guard) = MergeGuard::acquire(&self.merging) else {
            return Ok(false);
        };
        let policy = self.config.merge_policy();
        let mut merged = false;
        while let Some(candidate) = policy.select(&self.committed_infos()) {
            self.merge(&candidate)?;
            merged = true;
        }
        Ok(merged)
    }

    pub(crate) fn force_merge(&self, max_segments: usize) -> Result<usize> {
        self.ensure_open()?;
        let _guard = MergeGuard::acquire(&self.merging).ok_or_else(|| {
            QuarryError::concurrency(format!(
                "a merge of index '{}' is already running",
                self.name
            ))
        })?;
        let policy = self.config.merge_policy();
        let mut merges = 0;
        while let Some(candidate) = policy.select_forced(&self.committed_infos(), max_segments) {
            self.merge(&candidate)?;
            merges += 1;
        }
        Ok(merges)
    }

    /// Merge the segments of `candidate` into a new segment and publish it.
    fn merge(&self, candidate: &MergeCandidate) -> Result<()> {
        let (segment_id, sources) = {
            let mut state = self.lock_writer()?;
            let snapshot = self.snapshot.load();
            let sources = candidate
                .segment_ids
                .iter()
                .map(|id| {
                    snapshot
                        .segment(*id)
                        .map(|view| MergeSource {
                            reader: view.reader.clone(),
                            deletions: view.deletions.clone(),
                        })
                        .ok_or_else(|| {
                            QuarryError::index(format!("segment {id} is not committed"))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            (state.reserve_segment_id(), sources)
        };

        info!(
            "index '{}': merging segments {:?} ({} live documents, {:?}) into segment {segment_id}",
            self.name, candidate.segment_ids, candidate.live_docs, candidate.reason
        );

        let merged = merge_segments(&sources)?;
        let written = if merged.is_empty() {
            None
        } else {
            Some(merged.write(&self.storage, segment_id)?)
        };

        let result = self.install_merge(&sources, &merged, written.clone());
        if result.is_err() {
            if let Some(info) = written {
                self.delete_files([info.file_name()]);
            }
        }
        result
    }

    /// Replace the merge sources by the merged segment under the write token.
    fn install_merge(
        &self,
        sources: &[MergeSource],
        merged: &MergedSegment,
        written: Option<SegmentInfo>,
    ) -> Result<()> {
        let mut state = self.lock_writer()?;
        let state = &mut *state;
        let snapshot = self.snapshot.load_full();
        let generation = state.manifest.generation + 1;
        let source_ids: HashSet<u64> = sources.iter().map(|s| s.reader.segment_id()).collect();

        let mut merged_view = None;
        let mut merged_pending = None;
        let mut discarded = Vec::new();

        if let Some(info) = written {
            let mut committed = DeletionBitmap::new(info.doc_count);
            let mut pending = DeletionBitmap::new(info.doc_count);
            for source in sources {
                let id = source.reader.segment_id();
                let Some(doc_map) = merged.doc_map(id) else {
                    continue;
                };
                // A source missing from the snapshot was dropped as fully deleted.
                let current = snapshot.segment(id);
                let uncommitted = state.pending_deletions.get(&id);
                for old_doc in 0..source.reader.doc_count() {
                    let Some(new_doc) = doc_map.get(old_doc) else {
                        continue;
                    };
                    if current.is_none_or(|view| view.deletions.is_deleted(old_doc)) {
                        committed.delete(new_doc)?;
                    } else if uncommitted.is_some_and(|p| p.is_deleted(old_doc)) {
                        pending.delete(new_doc)?;
                    }
                }
            }

            if committed.is_fully_deleted() {
                discarded.push(info.file_name());
            } else {
                let reader = Arc::new(SegmentReader::open(&self.storage, info.segment_id)?);
                let info = if committed.has_deletions() {
                    self.write_deletions(&info, &committed, generation)?
                } else {
                    info
                };
                merged_view = Some(Arc::new(SegmentView::new(info, reader, committed)));
                if pending.has_deletions() {
                    merged_pending = Some(pending);
                }
            }
        }

        let mut infos: Vec<SegmentInfo> = state
            .manifest
            .segments
            .iter()
            .filter(|info| !source_ids.contains(&info.segment_id))
            .cloned()
            .collect();
        let mut views: Vec<Arc<SegmentView>> = snapshot
            .segments
            .iter()
            .filter(|view| !source_ids.contains(&view.segment_id()))
            .cloned()
            .collect();
        if let Some(view) = &merged_view {
            infos.push(view.info.clone());
            views.push(view.clone());
        }

        let manifest = state.manifest.next(infos, state.next_segment_id);
        manifest.save(self.storage.as_ref())?;
        self.snapshot
            .store(Arc::new(IndexSnapshot::new(manifest.generation, views)));

        let live = manifest.referenced_files();
        let obsolete: Vec<String> = state
            .manifest
            .referenced_files()
            .into_iter()
            .filter(|name| !live.contains(name))
            .chain(discarded)
            .collect();
        self.delete_files(obsolete);

        for id in &source_ids {
            state.pending_deletions.remove(id);
        }
        if let (Some(view), Some(pending)) = (&merged_view, merged_pending) {
            state.pending_deletions.insert(view.segment_id(), pending);
        }

        info!(
            "index '{}': merge committed as generation {}, {} segments remain",
            self.name,
            manifest.generation,
            manifest.segments.len()
        );
        state.manifest = manifest;
        Ok(())
    }
}
