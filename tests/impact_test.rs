mod helpers;

use helpers::{chained_project, open_index, project, scan, write_file};
use warden::error::WardenError;
use warden::index::impact::MAX_IMPACT_DEPTH;

#[test]
fn direct_and_transitive_dependents() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);

    let report = index.impact("src/a.rs", Some(3)).unwrap();
    assert_eq!(report.subject, "src/a.rs");
    assert_eq!(report.affected, vec!["src/b.rs", "src/c.rs"]);

    assert_eq!(report.direct.len(), 1);
    assert_eq!(report.direct[0].path, "src/b.rs");
    assert_eq!(report.direct[0].depth, 1);
    assert_eq!(report.direct[0].via, "src/a.rs");

    assert_eq!(report.transitive.len(), 1);
    assert_eq!(report.transitive[0].path, "src/c.rs");
    assert_eq!(report.transitive[0].depth, 2);
    assert_eq!(report.transitive[0].via, "src/b.rs");
    assert!(!report.truncated);
}

#[test]
fn depth_one_stops_at_direct_dependents() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);

    let report = index.impact("src/a.rs", Some(1)).unwrap();
    assert_eq!(report.affected, vec!["src/b.rs"]);
    assert!(report.transitive.is_empty());
    assert!(report.truncated);
}

#[test]
fn depth_is_clamped() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);

    assert_eq!(index.impact("src/a.rs", Some(0)).unwrap().max_depth, 1);
    assert_eq!(
        index.impact("src/a.rs", Some(50)).unwrap().max_depth,
        MAX_IMPACT_DEPTH
    );
}

#[test]
fn leaf_file_has_no_dependents() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);

    let report = index.impact("./src/c.rs", None).unwrap();
    assert_eq!(report.subject, "src/c.rs");
    assert!(report.affected.is_empty());
}

#[test]
fn unindexed_path_is_not_found() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);

    let err = index.impact("src/missing.rs", None).unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

#[test]
fn cycles_terminate() {
    let tmp = project(&[
        ("x.py", "def ping():\n    return pong()\n"),
        ("y.py", "def pong():\n    return ping()\n"),
    ]);
    let index = open_index(tmp.path());
    scan(&index);

    let report = index.impact("x.py", Some(MAX_IMPACT_DEPTH)).unwrap();
    assert_eq!(report.affected, vec!["y.py"]);
}

#[test]
fn edges_follow_edits() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);

    // b stops calling into a
    write_file(tmp.path(), "src/b.rs", "pub fn beta_entry() -> u32 {\n    2\n}\n");
    scan(&index);

    let report = index.impact("src/a.rs", None).unwrap();
    assert!(report.affected.is_empty());
}
