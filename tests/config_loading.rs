//! Loading resource definitions from a directory of JSON files.

use rest_scaffold::{load_registry, ConfigError};
use std::fs;

#[tokio::test]
async fn loads_single_resources_and_arrays_in_file_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a_book.json"),
        r#"{ "name": "Book", "columns": [{ "name": "id", "type": "integer" }, { "name": "title", "type": "text" }] }"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("b_more.json"),
        r#"[
            { "name": "Author", "columns": [{ "name": "id", "type": "integer" }] },
            { "name": "Shelf", "path_segment": "shelves", "columns": [{ "name": "id", "type": "bigint" }] }
        ]"#,
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let registry = load_registry(dir.path()).await.unwrap();
    let names: Vec<&str> = registry.resources().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["Book", "Author", "Shelf"]);
    assert!(registry.by_segment("shelves").is_some());
    assert!(registry.by_segment("shelf").is_none());
}

#[tokio::test]
async fn malformed_files_name_the_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.json"), "{ \"name\": ").unwrap();
    match load_registry(dir.path()).await.unwrap_err() {
        ConfigError::Load(msg) => assert!(msg.contains("broken.json"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn missing_directory_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_registry(dir.path().join("nope")).await.unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}
