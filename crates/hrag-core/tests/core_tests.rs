use std::collections::HashSet;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

use hrag_core::chunker::Chunker;
use hrag_core::config::ChunkingConfig;
use hrag_core::loader::DocumentLoader;
use hrag_core::types::Document;
use hrag_core::Error;

fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}

#[test]
fn load_dir_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let mut f = fs::File::create(dir.join("a.txt")).unwrap();
    writeln!(f, "Short text").unwrap();

    let outcome = DocumentLoader::default().load_dir(dir).expect("load");

    assert_eq!(outcome.documents.len(), 1);
    assert_eq!(outcome.documents[0].id, "a.txt");
    assert_eq!(outcome.documents[0].raw_text.trim(), "Short text");
    assert!(outcome.skipped.is_empty());
}

#[test]
fn load_dir_filters_extensions_and_sorts() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("topic")).unwrap();
    fs::write(dir.join("b.txt"), "bravo").unwrap();
    fs::write(dir.join("topic/a.md"), "alpha").unwrap();
    fs::write(dir.join("image.png"), [0u8, 1, 2]).unwrap();

    let outcome = DocumentLoader::default().load_dir(dir).expect("load");
    let ids: Vec<&str> = outcome.documents.iter().map(|d| d.id.as_str()).collect();

    assert_eq!(ids, vec!["b.txt", "topic/a.md"]);
}

#[test]
fn load_dir_limited_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("b.txt"), "charlie delta").unwrap();

    let outcome = DocumentLoader::default().load_dir_limited(dir, 1).expect("load limited");

    assert_eq!(outcome.documents.len(), 1, "limited to one source document");
}

#[cfg(unix)]
#[test]
fn load_dir_skips_unreadable_files_and_keeps_the_rest() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    std::os::unix::fs::symlink(dir.join("gone.txt"), dir.join("b.txt")).unwrap();
    std::os::unix::fs::symlink(dir.join("a.txt"), dir.join("c.md")).unwrap();

    let outcome = DocumentLoader::default().load_dir(dir).expect("unreadable files are not fatal");
    let ids: Vec<&str> = outcome.documents.iter().map(|d| d.id.as_str()).collect();

    assert_eq!(ids, vec!["a.txt", "c.md"]);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].path, dir.join("b.txt"));
}

#[test]
fn load_dir_missing_directory_is_configuration_error() {
    let tmp = TempDir::new().unwrap();
    let err = DocumentLoader::default().load_dir(&tmp.path().join("nope")).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn chunk_default_config_yields_one_parent_with_children() {
    let chunker = Chunker::new(ChunkingConfig { child_words: 10, child_overlap: 2, ..ChunkingConfig::default() }).unwrap();
    let doc = Document::new("notes/a.txt", words(35), "/tmp/notes/a.txt");

    let groups = chunker.chunk(&doc).expect("chunk");

    assert_eq!(groups.len(), 1, "exactly one parent per document");
    let group = &groups[0];
    assert_eq!(group.parent.document_id, "notes/a.txt");
    assert!(!group.children.is_empty());
    for child in &group.children {
        assert_eq!(child.parent_id, group.parent.id);
        assert!(child.text.split_whitespace().count() <= 10);
    }
    // windows of 10 with overlap 2 over 35 words: 0-10, 8-18, 16-26, 24-34, 32-35
    assert_eq!(group.children.len(), 5);
    assert!(group.children[1].text.starts_with("w8 w9"));
}

#[test]
fn chunk_is_deterministic() {
    let chunker = Chunker::new(ChunkingConfig { parent_words: 50, parent_overlap: 5, child_words: 12, child_overlap: 3 }).unwrap();
    let doc = Document::new("d.txt", words(130), "d.txt");

    let first = chunker.chunk(&doc).unwrap();
    let second = chunker.chunk(&doc).unwrap();

    assert_eq!(first, second);
    let ids: HashSet<&str> = first.iter().flat_map(|g| g.children.iter().map(|c| c.id.as_str())).collect();
    let total: usize = first.iter().map(|g| g.children.len()).sum();
    assert_eq!(ids.len(), total, "child ids are unique");
}

#[test]
fn chunk_coarse_split_produces_multiple_parents() {
    let chunker = Chunker::new(ChunkingConfig { parent_words: 40, parent_overlap: 0, child_words: 10, child_overlap: 0 }).unwrap();
    let doc = Document::new("long.txt", words(100), "long.txt");

    let groups = chunker.chunk(&doc).unwrap();

    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0].parent.id, "long.txt#p0000");
    assert_eq!(groups[2].children.len(), 2);
    assert_eq!(groups[2].children[0].id, "long.txt#p0002/c0000");
}

#[test]
fn chunk_rejects_empty_and_binary_text() {
    let chunker = Chunker::default();
    let empty = Document::new("empty.txt", "  \n\t ", "empty.txt");
    let binary = Document::new("bin.txt", "abc\0def", "bin.txt");
    let garbled = Document::new("bad.txt", "\u{FFFD}\u{FFFD}\u{FFFD} ok", "bad.txt");

    for doc in [empty, binary, garbled] {
        match chunker.chunk(&doc) {
            Err(Error::MalformedDocument { doc_id, .. }) => assert_eq!(doc_id, doc.id),
            other => panic!("expected MalformedDocument for {}, got {:?}", doc.id, other),
        }
    }
}

#[test]
fn chunker_rejects_invalid_overlap() {
    let err = Chunker::new(ChunkingConfig { child_words: 5, child_overlap: 5, ..ChunkingConfig::default() }).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}
