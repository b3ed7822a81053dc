//! Local code intelligence for a single project tree.
//!
//! Warden keeps an incremental index of the files in a project, a durable
//! key/value memory store, and a risk predictor built on both. A commit gate
//! uses the predictor to block risky changes, and every decision is written
//! back to memory so later predictions can learn from it.
//!
//! # Architecture
//!
//! - **Index**: file walk with `ignore`, per-file parse on a rayon pool,
//!   dependency graph persisted as a checksummed snapshot
//! - **Storage**: SQLite (WAL) with an append-only audit log and a
//!   monotonic revision clock
//! - **Risk**: weighted bug-risk signals from churn, structure and gate
//!   history, plus regex security rules
//! - **Surface**: one CLI with exit codes 0 (ok), 1 (error), 2 (gate block)
//!
//! # Modules
//!
//! - [`config`]: TOML config files and environment overrides
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`index`]: project scan, dependency graph, impact analysis, search
//! - [`memory`]: remember, recall, forget, learn
//! - [`risk`]: bug-risk prediction, security scan, review
//! - [`gate`]: commit gate and hook script
//! - [`context`]: token-budgeted context bundle

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod gate;
pub mod index;
pub mod memory;
pub mod risk;
