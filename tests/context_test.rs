mod helpers;

use helpers::{chained_project, open_index, open_memory, scan, write_file};
use warden::config::{ContextConfig, WardenConfig};
use warden::context::{autocontext, AUTOCONTEXT_NAMESPACE};
use warden::gate::Gate;
use warden::index::CancelToken;
use warden::risk::RiskPredictor;

#[test]
fn first_run_covers_new_files_and_audits_once() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    let memory = open_memory(tmp.path());

    let bundle = autocontext(&index, &memory, &ContextConfig::default(), &CancelToken::new()).unwrap();
    assert_eq!(bundle.scan.added, 3);
    let recent: Vec<&str> = bundle.recent_files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(recent, vec!["src/a.rs", "src/b.rs", "src/c.rs"]);
    assert!(bundle.hotspots.iter().any(|h| h.path == "src/a.rs" && h.fan_in == 1));

    let audits = memory.recent_in_namespace(AUTOCONTEXT_NAMESPACE, 10).unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].key, bundle.audit_key);
    assert_eq!(memory.health().unwrap().memory_count, 1);
}

#[test]
fn recent_edit_pulls_related_memories_and_dependencies() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);
    let memory = open_memory(tmp.path());
    memory
        .remember("src/b.rs", "beta_entry must stay allocation free")
        .unwrap();
    memory.remember("unrelated", "lunch at noon").unwrap();

    write_file(tmp.path(), "src/b.rs", "pub fn beta_entry() -> u32 {\n    alpha_helper() * 2\n}\n");

    let bundle = autocontext(&index, &memory, &ContextConfig::default(), &CancelToken::new()).unwrap();
    assert_eq!(bundle.scan.modified, 1);
    assert_eq!(bundle.recent_files.len(), 1);
    assert_eq!(bundle.recent_files[0].path, "src/b.rs");
    assert_eq!(bundle.related_files, vec!["src/a.rs"]);

    let keys: Vec<&str> = bundle.memories.iter().map(|m| m.entry.key.as_str()).collect();
    assert_eq!(keys, vec!["src/b.rs"]);
    // context reads do not count as user access
    assert_eq!(memory.get("src/b.rs").unwrap().unwrap().access_count, 0);
}

#[test]
fn prior_gate_assessments_are_attached() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);
    let memory = open_memory(tmp.path());
    let config = WardenConfig::default();
    let predictor = RiskPredictor::new(&index, memory.clone(), &config).unwrap();
    Gate::new(&predictor, &config.gate)
        .run(&["src/c.rs".into()], &memory)
        .unwrap();

    write_file(tmp.path(), "src/c.rs", "fn main() {\n    let _ = beta_entry();\n}\n");
    let bundle = autocontext(&index, &memory, &config.context, &CancelToken::new()).unwrap();

    assert_eq!(bundle.assessments.len(), 2);
    assert!(bundle.assessments.iter().all(|a| a.subject == "src/c.rs"));
    // gate records are never surfaced as plain memories
    assert!(bundle.memories.is_empty());
}

#[test]
fn token_budget_truncates_memories() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    let memory = open_memory(tmp.path());
    for i in 0..5 {
        memory
            .remember(&format!("src/a.rs:{i}"), &"long note about alpha ".repeat(20))
            .unwrap();
    }

    let config = ContextConfig {
        token_budget: 200,
        ..ContextConfig::default()
    };
    let bundle = autocontext(&index, &memory, &config, &CancelToken::new()).unwrap();
    assert!(bundle.truncated);
    assert!(bundle.memories.len() < 5);
    assert!(bundle.token_estimate <= 200);
}

#[test]
fn repeated_gate_runs_do_not_crowd_out_memories() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);
    let memory = open_memory(tmp.path());
    memory.remember("perf", "src/b.rs must stay allocation free").unwrap();

    let config = WardenConfig::default();
    let predictor = RiskPredictor::new(&index, memory.clone(), &config).unwrap();
    let gate = Gate::new(&predictor, &config.gate);
    for _ in 0..config.context.max_memories + 2 {
        gate.run(&["src/b.rs".into()], &memory).unwrap();
    }

    write_file(tmp.path(), "src/b.rs", "pub fn beta_entry() -> u32 {\n    alpha_helper() + 3\n}\n");
    let bundle = autocontext(&index, &memory, &config.context, &CancelToken::new()).unwrap();
    let keys: Vec<&str> = bundle.memories.iter().map(|m| m.entry.key.as_str()).collect();
    assert_eq!(keys, vec!["perf"]);
}
