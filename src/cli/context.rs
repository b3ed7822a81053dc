//! CLI `autocontext` command.

use anyhow::Result;

use warden::context::{autocontext as assemble, ContextBundle};
use warden::index::CancelToken;

use super::{preview, Workspace};

pub fn autocontext(ws: &Workspace, cancel: &CancelToken) -> Result<()> {
    let index = ws.index()?;
    let memory = ws.memory()?;
    let bundle = assemble(&index, &memory, &ws.config.context, cancel)?;
    ws.emit(&bundle, print_bundle)
}

fn print_bundle(b: &ContextBundle) {
    println!(
        "Context for generation {} ({} files indexed, ~{} tokens{})",
        b.scan.generation,
        b.scan.files,
        b.token_estimate,
        if b.truncated { ", truncated" } else { "" }
    );

    println!();
    println!("Recently changed:");
    if b.recent_files.is_empty() {
        println!("  (none)");
    }
    for f in &b.recent_files {
        println!("  {} [{}] {} symbol(s)", f.path, f.language, f.symbols);
    }

    if !b.related_files.is_empty() {
        println!();
        println!("Depends on:");
        for p in &b.related_files {
            println!("  {p}");
        }
    }

    if !b.memories.is_empty() {
        println!();
        println!("Memories:");
        for m in &b.memories {
            println!("  {}: {}", m.entry.key, preview(&m.entry.value, 100));
        }
    }

    if !b.assessments.is_empty() {
        println!();
        println!("Last gate assessments:");
        for a in &b.assessments {
            println!("  {} {:.2} ({})", a.subject, a.primary_score(), a.level);
        }
    }

    if !b.hotspots.is_empty() {
        println!();
        println!("Hotspots:");
        for h in &b.hotspots {
            println!("  {} (fan-in {})", h.path, h.fan_in);
        }
    }

    println!();
    println!("{} open TODO/FIXME marker(s).", b.open_markers);
}
