//! CLI memory commands: `remember`, `recall`, `forget`, `learn`.

use anyhow::Result;
use serde_json::json;

use warden::memory::types::Observation;

use super::{preview, Workspace};

pub fn remember(ws: &Workspace, key: &str, value: &str) -> Result<()> {
    let entry = ws.memory()?.remember(key, value)?;
    ws.emit(&entry, |e| {
        println!("Remembered {} (revision {}).", e.key, e.revision);
    })
}

pub fn recall(ws: &Workspace, query: &str) -> Result<()> {
    let hits = ws.memory()?.recall(query)?;
    ws.emit(&hits, |hits| {
        if hits.is_empty() {
            println!("No memories found.");
            return;
        }
        for (i, hit) in hits.iter().enumerate() {
            println!(
                "  {}. {} (score: {:.2}, updated: {}, accessed: {})",
                i + 1,
                hit.entry.key,
                hit.score,
                hit.entry.updated_at,
                hit.entry.access_count
            );
            println!("     {}", preview(&hit.entry.value, 120));
        }
    })
}

pub fn forget(ws: &Workspace, key: &str) -> Result<()> {
    let removed = ws.memory()?.forget(key)?;
    let result = json!({ "key": key, "removed": removed });
    ws.emit(&result, |_| {
        if removed {
            println!("Forgot {key}.");
        } else {
            println!("Nothing stored under {key}.");
        }
    })
}

pub fn learn(ws: &Workspace, text: &str, namespace: &str) -> Result<()> {
    let entry = ws.memory()?.learn(&Observation::new(namespace, text))?;
    ws.emit(&entry, |e| {
        println!("Learned {}.", e.key);
    })
}
