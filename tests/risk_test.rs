mod helpers;

use helpers::{chained_project, open_index, open_memory, project, scan, write_file};
use warden::config::WardenConfig;
use warden::error::WardenError;
use warden::gate::{self, GateDecision, Verdict};
use warden::risk::{AssessmentKind, RiskPredictor, RiskScorer, SeverityLevel};

fn predictor_for(root: &std::path::Path) -> RiskPredictor {
    let index = open_index(root);
    scan(&index);
    RiskPredictor::new(&index, open_memory(root), &WardenConfig::default()).unwrap()
}

#[test]
fn hardcoded_password_is_critical() {
    let tmp = project(&[("settings.py", "password = \"secret123\"\n")]);
    let predictor = predictor_for(tmp.path());

    let a = predictor.security_scan("settings.py").unwrap();
    assert_eq!(a.kind, AssessmentKind::Security);
    assert!((a.security_score - 0.9).abs() < 1e-9);
    assert_eq!(a.level, SeverityLevel::Critical);
    assert_eq!(a.signals[0].name, "hardcoded-credential");
}

#[test]
fn clean_file_scores_zero() {
    let tmp = chained_project();
    let predictor = predictor_for(tmp.path());

    let a = predictor.security_scan("src/a.rs").unwrap();
    assert_eq!(a.security_score, 0.0);
    assert_eq!(a.level, SeverityLevel::None);
}

#[test]
fn unindexed_file_is_not_found() {
    let tmp = chained_project();
    let predictor = predictor_for(tmp.path());

    assert!(matches!(
        predictor.predict_bugs("nope.rs"),
        Err(WardenError::NotFound { .. })
    ));
    assert!(matches!(
        predictor.security_scan("nope.rs"),
        Err(WardenError::NotFound { .. })
    ));
}

#[test]
fn bug_risk_is_bounded_and_repeatable() {
    let tmp = chained_project();
    let predictor = predictor_for(tmp.path());

    let first = predictor.predict_bugs("src/b.rs").unwrap();
    let second = predictor.predict_bugs("src/b.rs").unwrap();
    assert_eq!(first.bug_risk, second.bug_risk);
    assert!((0.0..=1.0).contains(&first.bug_risk));

    let names: Vec<&str> = first.signals.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["churn", "symbols", "fan_in", "fan_out", "history"]);
    let sum: f64 = first.signals.iter().map(|s| s.contribution).sum();
    assert!((sum - first.bug_risk).abs() < 1e-9);
}

#[test]
fn fan_in_counts_referencing_files() {
    let tmp = chained_project();
    let predictor = predictor_for(tmp.path());

    let shared = predictor.predict_bugs("src/a.rs").unwrap();
    let leaf = predictor.predict_bugs("src/c.rs").unwrap();
    let fan_in = |a: &warden::risk::RiskAssessment| {
        a.signals.iter().find(|s| s.name == "fan_in").unwrap().raw
    };
    assert_eq!(fan_in(&shared), 1.0);
    assert_eq!(fan_in(&leaf), 0.0);
}

#[test]
fn churn_grows_with_edits() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);
    let memory = open_memory(tmp.path());
    let config = WardenConfig::default();

    let before = RiskPredictor::new(&index, memory.clone(), &config)
        .unwrap()
        .predict_bugs("src/c.rs")
        .unwrap();

    for n in 0..3 {
        write_file(
            tmp.path(),
            "src/c.rs",
            &format!("fn main() {{\n    println!(\"{{}}\", beta_entry() + {n});\n}}\n"),
        );
        scan(&index);
    }

    let after = RiskPredictor::new(&index, memory, &config)
        .unwrap()
        .predict_bugs("src/c.rs")
        .unwrap();
    assert!(after.bug_risk > before.bug_risk);
}

#[test]
fn blocked_history_raises_bug_risk() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);
    let memory = open_memory(tmp.path());
    let config = WardenConfig::default();
    let predictor = RiskPredictor::new(&index, memory.clone(), &config).unwrap();

    let before = predictor.predict_bugs("src/c.rs").unwrap();

    let mut trigger = predictor.security_scan("src/c.rs").unwrap();
    trigger.level = SeverityLevel::Critical;
    let decision = GateDecision {
        id: "018f0000-0000-7000-8000-000000000001".into(),
        subject: vec!["src/c.rs".into()],
        verdict: Verdict::Block,
        triggering: vec![trigger.clone()],
        assessments: vec![trigger],
        errors: vec![],
        reason: "blocked: src/c.rs".into(),
        decided_at: chrono::Utc::now(),
    };
    gate::record(&memory, &decision).unwrap();

    let after = predictor.predict_bugs("src/c.rs").unwrap();
    let history = after.signals.iter().find(|s| s.name == "history").unwrap();
    assert_eq!(history.raw, 1.0);
    assert!(after.bug_risk > before.bug_risk);
}

#[test]
fn risk_score_defaults_to_latest_changes() {
    let tmp = chained_project();
    let index = open_index(tmp.path());
    scan(&index);
    write_file(tmp.path(), "src/b.rs", "pub fn beta_entry() -> u32 {\n    alpha_helper() + 2\n}\n");
    scan(&index);

    let predictor = RiskPredictor::new(&index, open_memory(tmp.path()), &WardenConfig::default()).unwrap();
    let summary = predictor.risk_score(&[]);
    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.files[0].path, "src/b.rs");

    let explicit = predictor.risk_score(&["src/a.rs".into(), "missing.rs".into()]);
    assert_eq!(explicit.files.len(), 1);
    assert_eq!(explicit.errors.len(), 1);
}

#[test]
fn history_is_not_crowded_out_by_similar_paths() {
    let tmp = project(&[
        ("a.py", "def a():\n    return 1\n"),
        ("data.py", "def load():\n    return []\n"),
    ]);
    let index = open_index(tmp.path());
    scan(&index);
    let memory = open_memory(tmp.path());
    let predictor = RiskPredictor::new(&index, memory.clone(), &WardenConfig::default()).unwrap();

    let blocked = |n: usize, path: &str| {
        let mut trigger = predictor.security_scan(path).unwrap();
        trigger.level = SeverityLevel::Critical;
        GateDecision {
            id: format!("018f0000-0000-7000-8000-{n:012}"),
            subject: vec![path.into()],
            verdict: Verdict::Block,
            triggering: vec![trigger.clone()],
            assessments: vec![trigger],
            errors: vec![],
            reason: format!("blocked: {path}"),
            decided_at: chrono::Utc::now(),
        }
    };

    gate::record(&memory, &blocked(0, "a.py")).unwrap();
    for n in 1..=60 {
        gate::record(&memory, &blocked(n, "data.py")).unwrap();
    }

    let a = predictor.predict_bugs("a.py").unwrap();
    let history = a.signals.iter().find(|s| s.name == "history").unwrap();
    assert_eq!(history.raw, 1.0);
}
