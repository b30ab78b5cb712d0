use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use quarry::storage::file::FileStorageConfig;
use quarry::storage::{StorageConfig, StorageFactory};
use quarry::{Document, FieldValue, Index, IndexConfig, Query, QuarryError, Term};

fn open_index(dir: &TempDir, config: IndexConfig) -> quarry::Result<Index> {
    let storage_config = StorageConfig::File(FileStorageConfig::new(dir.path()));
    let storage = StorageFactory::create(storage_config)?;
    Index::open_with_storage(storage, "merges", config)
}

fn note(id: i64) -> Document {
    Document::builder()
        .add_integer("id", id)
        .add_text("body", format!("note number {id} shared"))
        .add_float("weight", id as f64 / 2.0)
        .build()
}

/// Stored values of every live document, keyed by id.
fn live_documents(index: &Index) -> quarry::Result<BTreeMap<i64, (String, f64)>> {
    let hits = index.query_all(&Query::term("body", "shared"))?;
    Ok(hits
        .into_iter()
        .map(|hit| {
            let doc = hit.document;
            let id = doc.get("id").and_then(FieldValue::as_integer).unwrap();
            let body = doc.get_text("body").unwrap().to_string();
            let weight = doc.get("weight").and_then(FieldValue::as_float).unwrap();
            (id, (body, weight))
        })
        .collect())
}

#[test]
fn test_force_merge_preserves_live_documents() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(
        &temp_dir,
        IndexConfig::builder()
            .background_merge(false)
            .flush_threshold_docs(3)
            .build(),
    )?;
    for id in 0..20 {
        index.add_document(note(id))?;
    }
    index.commit()?;
    for id in [2, 5, 11, 19] {
        index.delete_by_term(&Term::integer("id", id))?;
    }
    index.commit()?;

    let before = live_documents(&index)?;
    assert_eq!(before.len(), 16);
    assert!(index.stats()?.segment_count() > 1);

    assert!(index.force_merge(1)? >= 1);

    let stats = index.stats()?;
    assert_eq!(stats.segment_count(), 1);
    assert_eq!(stats.live_docs, 16);
    assert_eq!(stats.deleted_docs, 0);
    assert_eq!(live_documents(&index)?, before);

    // New addresses resolve to the merged segment.
    for hit in index.query_all(&Query::term("body", "shared"))? {
        assert_eq!(hit.address.segment, stats.segment_ids[0]);
        assert_eq!(index.get_document(hit.address)?, hit.document);
    }

    // Only the merged segment remains on disk.
    let segment_files: Vec<String> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("seg_"))
        .collect();
    assert_eq!(segment_files.len(), 1, "{segment_files:?}");

    drop(index);
    let reopened = open_index(&temp_dir, IndexConfig::builder().background_merge(false).build())?;
    assert_eq!(live_documents(&reopened)?, before);
    Ok(())
}

#[test]
fn test_force_merge_expunges_deletions_of_single_segment() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(&temp_dir, IndexConfig::builder().background_merge(false).build())?;
    index.add_documents((0..5).map(note).collect())?;
    index.commit()?;
    index.delete_by_term(&Term::integer("id", 0))?;
    index.commit()?;
    assert_eq!(index.stats()?.deleted_docs, 1);

    assert_eq!(index.force_merge(1)?, 1);
    let stats = index.stats()?;
    assert_eq!(stats.deleted_docs, 0);
    assert_eq!(stats.live_docs, 4);

    // Nothing left to do.
    assert_eq!(index.force_merge(1)?, 0);
    Ok(())
}

#[test]
fn test_maybe_merge_follows_policy() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(
        &temp_dir,
        IndexConfig::builder()
            .background_merge(false)
            .merge_segment_count_threshold(3)
            .merge_factor(2)
            .build(),
    )?;
    for id in 0..3 {
        index.add_document(note(id))?;
        index.commit()?;
    }
    assert!(!index.maybe_merge()?);

    for id in 3..7 {
        index.add_document(note(id))?;
        index.commit()?;
    }
    assert_eq!(index.stats()?.segment_count(), 7);
    assert!(index.maybe_merge()?);
    assert!(index.stats()?.segment_count() <= 3);
    assert_eq!(live_documents(&index)?.len(), 7);
    Ok(())
}

#[test]
fn test_background_merge_reduces_segments() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(
        &temp_dir,
        IndexConfig::builder()
            .merge_segment_count_threshold(2)
            .merge_factor(2)
            .build(),
    )?;
    for id in 0..8 {
        index.add_document(note(id))?;
        index.commit()?;
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while index.stats()?.segment_count() > 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(index.stats()?.segment_count() <= 2);
    assert_eq!(live_documents(&index)?.len(), 8);
    assert_eq!(index.last_merge_error(), None);
    index.close()
}

#[test]
fn test_merged_documents_stay_deletable() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(
        &temp_dir,
        IndexConfig::builder()
            .background_merge(false)
            .flush_threshold_docs(2)
            .build(),
    )?;
    index.add_documents((0..6).map(note).collect())?;
    index.commit()?;
    index.force_merge(1)?;

    assert_eq!(index.delete_by_term(&Term::integer("id", 4))?, 1);
    index.commit()?;
    let live = live_documents(&index)?;
    assert_eq!(live.len(), 5);
    assert!(!live.contains_key(&4));
    Ok(())
}

#[test]
fn test_merge_on_closed_index_fails() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(&temp_dir, IndexConfig::builder().background_merge(false).build())?;
    index.close()?;
    assert!(matches!(index.force_merge(1), Err(QuarryError::Index { .. })));
    Ok(())
}
