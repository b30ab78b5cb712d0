use tempfile::TempDir;

use quarry::storage::file::FileStorageConfig;
use quarry::storage::{StorageConfig, StorageFactory};
use quarry::{Document, FieldValue, Index, IndexConfig, Query, Term};

fn open_index(dir: &TempDir, config: IndexConfig) -> quarry::Result<Index> {
    let storage_config = StorageConfig::File(FileStorageConfig::new(dir.path()));
    let storage = StorageFactory::create(storage_config)?;
    Index::open_with_storage(storage, "deletions", config)
}

fn config() -> IndexConfig {
    IndexConfig::builder().background_merge(false).build()
}

fn article(id: i64, title: &str) -> Document {
    Document::builder()
        .add_integer("id", id)
        .add_text("title", title)
        .build()
}

#[test]
fn test_deletion_is_visible_only_after_commit() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(&temp_dir, config())?;
    index.add_document(article(1, "Hello Quarry"))?;
    index.commit()?;

    let query = Query::term("title", "hello");
    assert_eq!(index.delete_by_term(&Term::integer("id", 1))?, 1);
    assert_eq!(index.query_all(&query)?.len(), 1, "still visible before commit");

    index.commit()?;
    assert!(index.query_all(&query)?.is_empty());
    Ok(())
}

#[test]
fn test_deletions_survive_reopen() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    {
        let index = open_index(&temp_dir, config())?;
        index.add_documents(vec![
            article(1, "first post"),
            article(2, "second post"),
            article(3, "third post"),
        ])?;
        index.commit()?;
        index.delete_by_term(&Term::integer("id", 2))?;
        index.close()?;
    }

    let index = open_index(&temp_dir, config())?;
    let hits = index.query_all(&Query::term("title", "post"))?;
    let mut ids: Vec<i64> = hits
        .iter()
        .filter_map(|hit| hit.document.get("id").and_then(FieldValue::as_integer))
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 3]);

    let stats = index.stats()?;
    assert_eq!(stats.live_docs, 2);
    assert_eq!(stats.deleted_docs, 1);
    Ok(())
}

#[test]
fn test_delete_by_query() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(&temp_dir, config())?;
    index.add_documents(vec![
        article(1, "rust search engine"),
        article(2, "rust web server"),
        article(3, "go search engine"),
    ])?;
    index.commit()?;

    let query = Query::and(vec![
        Query::term("title", "rust"),
        Query::not(Query::term("title", "web")),
    ]);
    assert_eq!(index.delete_by_query(&query)?, 1);
    index.commit()?;

    assert!(index.query_all(&query)?.is_empty());
    assert_eq!(index.query_all(&Query::term("title", "rust"))?.len(), 1);
    assert_eq!(index.query_all(&Query::term("title", "engine"))?.len(), 1);
    Ok(())
}

#[test]
fn test_deletes_reach_flushed_segments() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(
        &temp_dir,
        IndexConfig::builder()
            .background_merge(false)
            .flush_threshold_docs(1)
            .build(),
    )?;
    index.add_document(article(1, "flushed"))?;
    index.add_document(article(2, "flushed"))?;
    assert_eq!(index.delete_by_term(&Term::integer("id", 1))?, 1);
    index.commit()?;

    let hits = index.query_all(&Query::term("title", "flushed"))?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.get("id").and_then(FieldValue::as_integer), Some(2));
    // The fully deleted segment is not committed.
    assert_eq!(index.stats()?.segment_count(), 1);
    Ok(())
}

#[test]
fn test_delete_all() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(&temp_dir, config())?;
    index.add_documents(vec![article(1, "a"), article(2, "b")])?;
    index.commit()?;
    index.add_document(article(3, "c"))?;

    assert_eq!(index.delete_all()?, 3);
    index.commit()?;

    let stats = index.stats()?;
    assert_eq!(stats.live_docs, 0);
    assert_eq!(stats.pending_docs, 0);
    assert!(stats.segment_ids.is_empty());

    let segment_files = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .filter(|entry| {
            let name = entry.as_ref().unwrap().file_name();
            name.to_string_lossy().starts_with("seg_")
        })
        .count();
    assert_eq!(segment_files, 0);
    Ok(())
}

#[test]
fn test_update_by_term_keeps_one_version() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(&temp_dir, config())?;
    index.add_document(article(7, "draft"))?;
    index.commit()?;

    for title in ["revised", "final"] {
        index.update_by_term(&Term::integer("id", 7), article(7, title))?;
        index.commit()?;
    }

    let hits = index.query_all(&Query::Term(Term::integer("id", 7)))?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.get_text("title"), Some("final"));
    assert!(index.query_all(&Query::term("title", "draft"))?.is_empty());
    Ok(())
}

#[test]
fn test_update_documents_replaces_a_group() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(&temp_dir, config())?;
    let chapter = |n: i64, text: &str| {
        Document::builder()
            .add_string("book", "dune")
            .add_integer("chapter", n)
            .add_text("text", text)
            .build()
    };
    index.add_documents(vec![chapter(1, "old one"), chapter(2, "old two")])?;
    index.commit()?;

    let addresses = index.update_documents(
        &Term::new("book", "dune"),
        vec![chapter(1, "new one"), chapter(2, "new two"), chapter(3, "new three")],
    )?;
    assert_eq!(addresses.len(), 3);
    index.commit()?;

    assert!(index.query_all(&Query::term("text", "old"))?.is_empty());
    assert_eq!(index.query_all(&Query::term("text", "new"))?.len(), 3);
    assert_eq!(index.query_all(&Query::term("book", "dune"))?.len(), 3);
    Ok(())
}
