//! repoarchive - Unattended backups for local git working trees
//!
//! Each run commits pending changes in every configured working tree, mirrors
//! the trees (without their `.git` metadata) into subdirectories of a single
//! archive repository, and commits the archive.
//!
//! ## Modules
//!
//! - [`config`]: YAML configuration, path expansion and CLI overrides
//! - [`git`]: Subprocess wrapper over the `git` executable
//! - [`mirror`]: Path resolution, nesting guard and tree copying
//! - [`backup`]: The three-phase backup engine and its run report
//! - [`health`]: Preflight checks for `repoarchive doctor`
//! - [`watch`]: Periodic runner

pub mod backup;
pub mod config;
pub mod git;
pub mod health;
pub mod mirror;
pub mod watch;

pub use backup::{BackupEngine, PushStatus, RunReport, TreeOutcome};
pub use config::Config;
pub use git::GitClient;
pub use health::HealthCheck;
pub use watch::Watcher;
