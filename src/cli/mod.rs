pub mod context;
pub mod doctor;
pub mod gate;
pub mod index;
pub mod memory;
pub mod risk;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden::config::WardenConfig;
use warden::index::{CancelToken, ProjectIndex, ScanResult};
use warden::memory::MemoryStore;

/// Resolved project root, config, and output mode shared by every command.
pub struct Workspace {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub config: WardenConfig,
    pub json: bool,
}

impl Workspace {
    pub fn new(root: Option<&Path>, config: WardenConfig, json: bool) -> Result<Self> {
        let root = match root {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir().context("failed to read current directory")?,
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("project root not found: {}", root.display()))?;
        let data_dir = config.resolved_data_dir(&root);
        Ok(Self {
            root,
            data_dir,
            config,
            json,
        })
    }

    pub fn index(&self) -> Result<ProjectIndex> {
        ProjectIndex::open(&self.root, &self.data_dir, self.config.index.clone())
            .with_context(|| format!("failed to open index for {}", self.root.display()))
    }

    pub fn memory(&self) -> Result<MemoryStore> {
        MemoryStore::open_in(
            &self.data_dir,
            self.config.storage.store_timeout(),
            self.config.memory.page_size,
        )
        .context("failed to open memory store")
    }

    /// Open the index and bring it up to date before a query.
    pub fn refreshed_index(&self, cancel: &CancelToken) -> Result<(ProjectIndex, ScanResult)> {
        let index = self.index()?;
        let result = scan_with_spinner(&index, cancel)?;
        Ok((index, result))
    }

    /// Print `value` as JSON in `--json` mode, else run `human`.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

/// Run a scan with a stderr spinner.
pub fn scan_with_spinner(index: &ProjectIndex, cancel: &CancelToken) -> Result<ScanResult> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg}")
            .expect("valid template"),
    );
    pb.set_message(format!("indexing {}", index.root().display()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = index.scan(cancel);
    pb.finish_and_clear();
    Ok(result?)
}

/// Shorten long text for one-line display.
pub fn preview(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let cut: String = single_line.chars().take(max_chars).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 3), "ééé...");
        assert_eq!(preview("a\nb", 10), "a b");
    }
}
