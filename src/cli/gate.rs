//! CLI `gate` and `setup-hook` commands.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

use warden::gate::{self, Gate, GateDecision, Verdict};
use warden::index::CancelToken;
use warden::risk::RiskPredictor;

use super::Workspace;

const HOOK_MARKER: &str = "installed by warden setup-hook";

/// Staged files (added, copied, modified, renamed) relative to the repo root.
fn staged_files(root: &Path) -> Result<Vec<String>> {
    let output = Command::new("git")
        .args(["diff", "--cached", "--name-only", "--diff-filter=ACMR"])
        .current_dir(root)
        .output()
        .context("failed to run git")?;
    if !output.status.success() {
        bail!(
            "git diff --cached failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Evaluate the files and return the process exit code for the verdict.
pub fn gate(ws: &Workspace, files: &[String], cancel: &CancelToken) -> Result<u8> {
    let files = if files.is_empty() {
        staged_files(&ws.root)?
    } else {
        files.to_vec()
    };

    let (index, _) = ws.refreshed_index(cancel)?;
    let files: Vec<String> = files.iter().map(|f| index.normalize_path(f)).collect();
    let memory = ws.memory()?;
    let predictor = RiskPredictor::new(&index, memory.clone(), &ws.config)?;
    let decision = Gate::new(&predictor, &ws.config.gate).run(&files, &memory)?;

    ws.emit(&decision, print_decision)?;
    Ok(decision.verdict.exit_code())
}

fn print_decision(decision: &GateDecision) {
    for a in &decision.triggering {
        println!("  {} {:.2} ({})", a.subject, a.primary_score(), a.level);
        for signal in a.signals.iter().filter(|s| s.contribution > 0.0) {
            println!("    {} {:.3}", signal.name, signal.contribution);
        }
    }
    match decision.verdict {
        Verdict::Allow => println!("{}", decision.reason),
        Verdict::Block => eprintln!("{}", decision.reason),
    }
}

/// Install the pre-commit hook into `.git/hooks`.
pub fn setup_hook(ws: &Workspace, force: bool) -> Result<()> {
    let git_dir = ws.root.join(".git");
    if !git_dir.is_dir() {
        bail!("{} is not a git repository", ws.root.display());
    }
    let hooks = git_dir.join("hooks");
    std::fs::create_dir_all(&hooks)
        .with_context(|| format!("failed to create {}", hooks.display()))?;

    let hook_path = hooks.join("pre-commit");
    if hook_path.exists() && !force {
        let existing = std::fs::read_to_string(&hook_path).unwrap_or_default();
        if !existing.contains(HOOK_MARKER) {
            bail!(
                "{} already exists and was not installed by warden (use --force to replace it)",
                hook_path.display()
            );
        }
    }

    let program = std::env::current_exe().context("failed to locate the warden binary")?;
    let script = gate::hook_script(&program.to_string_lossy());
    std::fs::write(&hook_path, script)
        .with_context(|| format!("failed to write {}", hook_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&hook_path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to make {} executable", hook_path.display()))?;
    }

    tracing::info!(path = %hook_path.display(), "pre-commit hook installed");
    let result = serde_json::json!({ "hook": hook_path.display().to_string() });
    ws.emit(&result, |_| println!("Installed {}", hook_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_script_carries_marker() {
        assert!(gate::hook_script("/usr/bin/warden").contains(HOOK_MARKER));
    }
}
