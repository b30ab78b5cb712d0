use std::fs;

use tempfile::TempDir;

use quarry::storage::file::FileStorageConfig;
use quarry::storage::{StorageConfig, StorageFactory};
use quarry::{Document, Index, IndexConfig, Query};

fn open_index(dir: &TempDir) -> quarry::Result<Index> {
    let storage_config = StorageConfig::File(FileStorageConfig::new(dir.path()));
    let storage = StorageFactory::create(storage_config)?;
    let config = IndexConfig::builder()
        .background_merge(false)
        .flush_threshold_docs(1)
        .build();
    Index::open_with_storage(storage, "recovery", config)
}

fn doc(text: &str) -> Document {
    Document::builder().add_text("body", text).build()
}

fn file_names(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_corrupt_segment_is_skipped() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    {
        let index = open_index(&temp_dir)?;
        index.add_document(doc("alpha common"))?;
        index.add_document(doc("beta common"))?;
        index.commit()?;
        assert_eq!(index.stats()?.segment_ids, vec![0, 1]);
    }

    // Flip a byte inside the body of segment 0.
    let path = temp_dir.path().join("seg_00000000.seg");
    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&path, data).unwrap();

    let index = open_index(&temp_dir)?;
    assert_eq!(index.corrupt_segments(), &[0]);
    assert_eq!(index.stats()?.corrupt_segments, vec![0]);

    let hits = index.query_all(&Query::term("body", "common"))?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.get_text("body"), Some("beta common"));

    // The healthy part of the index stays writable, and the corrupt file is kept.
    index.add_document(doc("gamma common"))?;
    index.commit()?;
    assert_eq!(index.query_all(&Query::term("body", "common"))?.len(), 2);
    assert!(path.exists());
    Ok(())
}

#[test]
fn test_truncated_segment_is_skipped() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    {
        let index = open_index(&temp_dir)?;
        index.add_document(doc("alpha"))?;
        index.commit()?;
    }
    let path = temp_dir.path().join("seg_00000000.seg");
    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..10]).unwrap();

    let index = open_index(&temp_dir)?;
    assert_eq!(index.corrupt_segments(), &[0]);
    assert!(index.query_all(&Query::term("body", "alpha"))?.is_empty());
    Ok(())
}

#[test]
fn test_uncommitted_flush_leaves_no_visible_segment() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    {
        let index = open_index(&temp_dir)?;
        index.add_document(doc("committed"))?;
        index.commit()?;
        // Flushed to disk but never committed.
        index.add_document(doc("orphan"))?;
        index.add_document(doc("orphan"))?;
        assert!(file_names(&temp_dir).len() > 2);
    }

    let index = open_index(&temp_dir)?;
    assert!(index.query_all(&Query::term("body", "orphan"))?.is_empty());
    assert_eq!(index.query_all(&Query::term("body", "committed"))?.len(), 1);
    assert_eq!(file_names(&temp_dir), vec!["manifest.json", "seg_00000000.seg"]);
    Ok(())
}

#[test]
fn test_orphan_files_are_collected() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    {
        let index = open_index(&temp_dir)?;
        index.add_document(doc("kept"))?;
        index.commit()?;
    }
    fs::write(temp_dir.path().join("seg_00000042.seg"), b"junk").unwrap();
    fs::write(temp_dir.path().join("seg_00000000_9.del"), b"junk").unwrap();
    fs::write(temp_dir.path().join("manifest.json.tmp"), b"{").unwrap();
    fs::write(temp_dir.path().join("notes.txt"), b"not ours").unwrap();

    let index = open_index(&temp_dir)?;
    assert!(index.corrupt_segments().is_empty());
    assert_eq!(
        file_names(&temp_dir),
        vec!["manifest.json", "notes.txt", "seg_00000000.seg"]
    );
    assert_eq!(index.query_all(&Query::term("body", "kept"))?.len(), 1);
    Ok(())
}

#[test]
fn test_garbled_manifest_fails_to_open() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("manifest.json"), b"{ not json").unwrap();
    assert!(open_index(&temp_dir).is_err());
}

#[test]
fn test_segment_ids_are_not_reused_after_reopen() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    {
        let index = open_index(&temp_dir)?;
        index.add_document(doc("one"))?;
        index.commit()?;
    }
    let index = open_index(&temp_dir)?;
    let address = index.add_document(doc("two"))?;
    index.commit()?;
    assert!(address.segment > 0);
    assert_eq!(index.stats()?.segment_count(), 2);
    Ok(())
}
