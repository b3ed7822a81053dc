//! On-disk index snapshot.
//!
//! Layout: `WIDX` magic, format version (u32 LE), CRC32 of the payload
//! (u32 LE), then the JSON payload. Any mismatch means the snapshot is
//! discarded and the next scan rebuilds from scratch.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::graph::{GraphData, IndexGraph};
use crate::error::{WardenError, WardenResult};

pub const SNAPSHOT_FILE_NAME: &str = "index.snap";

const MAGIC: &[u8; 4] = b"WIDX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;

pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SNAPSHOT_FILE_NAME)
}

/// Why a snapshot could not be used.
#[derive(Debug, PartialEq, Eq)]
pub enum SnapshotProblem {
    Missing,
    Corrupt(String),
}

/// Read the snapshot. Never fails hard: callers fall back to an empty graph.
pub fn load(data_dir: &Path) -> Result<IndexGraph, SnapshotProblem> {
    let path = snapshot_path(data_dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotProblem::Missing)
        }
        Err(err) => return Err(SnapshotProblem::Corrupt(err.to_string())),
    };
    decode(&bytes).map_err(SnapshotProblem::Corrupt)
}

fn decode(bytes: &[u8]) -> Result<IndexGraph, String> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err("bad magic".into());
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(format!("unsupported format version {version}"));
    }
    let expected = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let payload = &bytes[HEADER_LEN..];
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(format!("checksum mismatch: {actual:08x} != {expected:08x}"));
    }
    let data: GraphData = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
    Ok(IndexGraph::from_data(data))
}

fn encode(graph: &IndexGraph) -> WardenResult<Vec<u8>> {
    let payload = serde_json::to_vec(&graph.to_data())?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Write via a temp file and rename so readers see the old or the new
/// snapshot, never a torn one.
pub fn save(data_dir: &Path, graph: &IndexGraph) -> WardenResult<()> {
    fs::create_dir_all(data_dir)?;
    let bytes = encode(graph)?;
    let path = snapshot_path(data_dir);
    let tmp = path.with_extension("snap.tmp");

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        WardenError::storage("index snapshot", e)
    })?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "index snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::graph::FileUpdate;
    use crate::index::parser::{LanguageParser, PythonParser};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_graph() -> IndexGraph {
        let mut graph = IndexGraph::default();
        let now = Utc::now();
        graph.begin_generation(now);
        graph.apply(
            FileUpdate {
                path: "app.py".into(),
                content_hash: "abc".into(),
                language: "python".into(),
                size_bytes: 10,
                parsed: PythonParser.parse("def main():\n    pass\n"),
                parse_error: None,
            },
            now,
        );
        graph.relink();
        graph
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let graph = sample_graph();
        save(tmp.path(), &graph).unwrap();
        let loaded = load(tmp.path()).unwrap();
        assert_eq!(loaded.file_count(), 1);
        assert_eq!(loaded.generation(), graph.generation());
        assert!(loaded.file_by_path("app.py").is_some());
    }

    #[test]
    fn missing_snapshot_is_reported() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load(tmp.path()).unwrap_err(), SnapshotProblem::Missing);
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let tmp = TempDir::new().unwrap();
        save(tmp.path(), &sample_graph()).unwrap();
        let path = snapshot_path(tmp.path());
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();
        assert!(matches!(load(tmp.path()), Err(SnapshotProblem::Corrupt(_))));
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        fs::write(snapshot_path(tmp.path()), b"WID").unwrap();
        assert!(matches!(load(tmp.path()), Err(SnapshotProblem::Corrupt(_))));
    }
}
