#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tempfile::TempDir;
use warden::config::{IndexConfig, DATA_DIR_NAME};
use warden::db;
use warden::index::{CancelToken, ProjectIndex, ScanResult};
use warden::memory::MemoryStore;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&mut conn).unwrap();
    conn
}

/// Create a temp project tree from `(relative path, contents)` pairs.
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (path, contents) in files {
        write_file(tmp.path(), path, contents);
    }
    tmp
}

pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

pub fn open_index(root: &Path) -> ProjectIndex {
    ProjectIndex::open(root, &root.join(DATA_DIR_NAME), IndexConfig::default()).unwrap()
}

pub fn open_memory(root: &Path) -> MemoryStore {
    MemoryStore::open_in(&root.join(DATA_DIR_NAME), Duration::from_secs(5), 20).unwrap()
}

pub fn scan(index: &ProjectIndex) -> ScanResult {
    index.scan(&CancelToken::new()).unwrap()
}

/// Three Rust files chained by symbol references: `c` calls into `b`,
/// `b` calls into `a`.
pub fn chained_project() -> TempDir {
    project(&[
        ("src/a.rs", "pub fn alpha_helper() -> u32 {\n    1\n}\n"),
        (
            "src/b.rs",
            "pub fn beta_entry() -> u32 {\n    alpha_helper() + 1\n}\n",
        ),
        (
            "src/c.rs",
            "fn main() {\n    println!(\"{}\", beta_entry());\n}\n",
        ),
    ])
}
