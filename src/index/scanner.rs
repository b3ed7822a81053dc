//! Working-tree walk and the cross-process scan lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use crate::error::{WardenError, WardenResult};

pub const LOCK_FILE_NAME: &str = "index.lock";

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A file found by the walk.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub relative: String,
    pub absolute: PathBuf,
    pub size_bytes: u64,
}

/// Walks a project root, `.gitignore` aware.
pub struct FileScanner {
    root: PathBuf,
    data_dir: PathBuf,
    exclude: Vec<String>,
    max_file_bytes: u64,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            data_dir: data_dir.as_ref().to_path_buf(),
            exclude: Vec::new(),
            max_file_bytes: u64::MAX,
        }
    }

    pub fn exclude(mut self, globs: &[String]) -> Self {
        self.exclude = globs.to_vec();
        self
    }

    pub fn max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = limit;
        self
    }

    /// Every indexable file, sorted by relative path.
    pub fn scan(&self) -> WardenResult<Vec<WalkedFile>> {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .follow_links(false);

        if !self.exclude.is_empty() {
            let mut overrides = OverrideBuilder::new(&self.root);
            for glob in &self.exclude {
                overrides
                    .add(&format!("!{glob}"))
                    .map_err(|e| WardenError::InvalidInput(format!("exclude glob {glob}: {e}")))?;
            }
            let overrides = overrides
                .build()
                .map_err(|e| WardenError::InvalidInput(format!("exclude globs: {e}")))?;
            builder.overrides(overrides);
        }

        let data_dir = self.data_dir.clone();
        builder.filter_entry(move |entry| {
            let path = entry.path();
            let is_git = entry.file_name() == ".git";
            !is_git && path != data_dir
        });

        let mut files = Vec::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size_bytes > self.max_file_bytes {
                tracing::debug!(path = %entry.path().display(), size_bytes, "skipping large file");
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            files.push(WalkedFile {
                relative: normalize_relative(rel),
                absolute: entry.path().to_path_buf(),
                size_bytes,
            });
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        tracing::debug!(root = %self.root.display(), files = files.len(), "walk complete");
        Ok(files)
    }
}

/// `/`-separated form of a relative path.
pub fn normalize_relative(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => Some(os.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Exclusive advisory lock on `<data>/index.lock`; released on drop.
pub struct ScanLock {
    file: File,
}

impl ScanLock {
    /// Poll for the lock until `deadline`.
    pub fn acquire(data_dir: &Path, deadline: Instant) -> WardenResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    tracing::debug!(
                        path = %path.display(),
                        waited_ms = start.elapsed().as_millis() as u64,
                        "index lock acquired"
                    );
                    return Ok(Self { file });
                }
                Err(_) if Instant::now() < deadline => thread::sleep(LOCK_POLL_INTERVAL),
                Err(_) => return Err(WardenError::timeout("scan", path.display().to_string())),
            }
        }
    }
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn walk_skips_data_dir_git_and_excludes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "src/main.rs", "fn main() {}");
        write(root, "vendor/lib.rs", "fn vendored() {}");
        write(root, ".git/config", "[core]");
        write(root, ".warden/index.snap", "x");
        write(root, ".github/ci.yml", "on: push");

        let files = FileScanner::new(root, root.join(".warden"))
            .exclude(&["vendor/**".to_string()])
            .scan()
            .unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(paths, vec![".github/ci.yml", "src/main.rs"]);
    }

    #[test]
    fn large_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "big.txt", &"x".repeat(100));
        write(tmp.path(), "small.txt", "x");
        let files = FileScanner::new(tmp.path(), tmp.path().join(".warden"))
            .max_file_bytes(10)
            .scan()
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "small.txt");
    }

    #[test]
    fn second_lock_times_out() {
        let tmp = TempDir::new().unwrap();
        let _held = ScanLock::acquire(tmp.path(), Instant::now() + Duration::from_secs(1)).unwrap();
        let err = ScanLock::acquire(tmp.path(), Instant::now() + Duration::from_millis(50))
            .err()
            .unwrap();
        assert!(matches!(err, WardenError::Timeout { .. }));
    }
}
