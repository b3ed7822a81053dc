//! CLI `doctor` command: memory store health and index snapshot status.

use anyhow::{Context, Result};
use serde::Serialize;

use warden::db::HealthReport;
use warden::index::snapshot::{self, SnapshotProblem};
use warden::memory::DB_FILE_NAME;

use super::Workspace;

#[derive(Serialize)]
struct DoctorReport {
    data_dir: String,
    store_bytes: u64,
    store: HealthReport,
    snapshot: SnapshotStatus,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum SnapshotStatus {
    Ok {
        generation: u64,
        files: usize,
        symbols: usize,
    },
    Missing,
    Corrupt {
        detail: String,
    },
}

pub fn doctor(ws: &Workspace) -> Result<bool> {
    let store = ws
        .memory()?
        .health()
        .context("failed to run health check")?;
    let store_bytes = std::fs::metadata(ws.data_dir.join(DB_FILE_NAME))
        .map(|m| m.len())
        .unwrap_or(0);

    let snapshot = match snapshot::load(&ws.data_dir) {
        Ok(graph) => SnapshotStatus::Ok {
            generation: graph.generation(),
            files: graph.file_count(),
            symbols: graph.symbol_count(),
        },
        Err(SnapshotProblem::Missing) => SnapshotStatus::Missing,
        Err(SnapshotProblem::Corrupt(detail)) => SnapshotStatus::Corrupt { detail },
    };

    let report = DoctorReport {
        data_dir: ws.data_dir.display().to_string(),
        store_bytes,
        store,
        snapshot,
    };
    let healthy = report.store.integrity_ok;
    ws.emit(&report, print_report)?;
    Ok(healthy)
}

fn print_report(r: &DoctorReport) {
    println!("Warden Health Report");
    println!("====================");
    println!();
    println!("Data dir:          {}", r.data_dir);
    println!("Store size:        {}", format_bytes(r.store_bytes));
    println!("Schema version:    {}", r.store.schema_version);
    println!("Store revision:    {}", r.store.revision);
    println!();
    println!("Row counts:");
    println!("  Memories:        {}", r.store.memory_count);
    println!("  Audit log:       {}", r.store.log_count);
    println!();
    if r.store.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED");
        println!("  The store is quarantined and rebuilt empty on the next open.");
    }
    println!();
    match &r.snapshot {
        SnapshotStatus::Ok {
            generation,
            files,
            symbols,
        } => println!("Index snapshot:    generation {generation}, {files} files, {symbols} symbols"),
        SnapshotStatus::Missing => println!("Index snapshot:    none yet (run `warden scan`)"),
        SnapshotStatus::Corrupt { detail } => {
            println!("Index snapshot:    CORRUPT ({detail}), rebuilt on next scan")
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
