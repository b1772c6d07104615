//! Backup Engine - Orchestrates the three backup phases
//!
//! A run commits every dirty source tree, mirrors each source tree into the
//! archive, then commits the archive. Trees are handled one at a time and a
//! failure in one tree never stops the rest of the run.

use crate::config::Config;
use crate::git::{GitClient, StatusCheck};
use crate::mirror;
use anyhow::Result;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Commit message prefix for source trees
pub const COMMIT_PREFIX: &str = "Auto backup";

/// Commit message prefix for the archive
pub const MIRROR_COMMIT_PREFIX: &str = "Auto backup mirror";

/// Log label used for the archive tree
const MASTER_LABEL: &str = "MASTER";

/// What happened to a single tree in one phase
#[derive(Debug, Clone, PartialEq)]
pub enum TreeOutcome {
    /// Pending changes were committed
    Committed {
        path: PathBuf,
        message: String,
        push: PushStatus,
    },
    /// Nothing to commit
    Clean { path: PathBuf },
    /// Tree contents were copied into the archive
    Mirrored {
        path: PathBuf,
        destination: PathBuf,
    },
    /// A precondition did not hold
    Skipped { path: PathBuf, reason: String },
    /// Git or the filesystem reported an error
    Failed { path: PathBuf, error: String },
}

/// Result of the optional push after a commit
#[derive(Debug, Clone, PartialEq)]
pub enum PushStatus {
    Disabled,
    Pushed,
    Failed(String),
}

impl TreeOutcome {
    pub fn path(&self) -> &Path {
        match self {
            TreeOutcome::Committed { path, .. }
            | TreeOutcome::Clean { path }
            | TreeOutcome::Mirrored { path, .. }
            | TreeOutcome::Skipped { path, .. }
            | TreeOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TreeOutcome::Failed { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, TreeOutcome::Skipped { .. })
    }
}

/// Everything a run did, phase by phase
#[derive(Debug, Clone)]
pub struct RunReport {
    pub commits: Vec<TreeOutcome>,
    pub mirrors: Vec<TreeOutcome>,
    pub archive: TreeOutcome,
    pub duration: Duration,
}

impl RunReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &TreeOutcome> {
        self.commits
            .iter()
            .chain(self.mirrors.iter())
            .chain(std::iter::once(&self.archive))
    }

    /// Commits made, archive included
    pub fn committed(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, TreeOutcome::Committed { .. }))
            .count()
    }

    pub fn mirrored(&self) -> usize {
        self.mirrors
            .iter()
            .filter(|o| matches!(o, TreeOutcome::Mirrored { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes().filter(|o| o.is_skip()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes().filter(|o| o.is_failure()).count()
    }

    pub fn push_failures(&self) -> usize {
        self.outcomes()
            .filter(|o| {
                matches!(
                    o,
                    TreeOutcome::Committed {
                        push: PushStatus::Failed(_),
                        ..
                    }
                )
            })
            .count()
    }
}

/// `"<prefix> <local time, second precision>"`, e.g. `Auto backup 2024-05-01T09:30:00`
pub fn backup_message(prefix: &str, now: DateTime<Local>) -> String {
    format!("{} {}", prefix, now.format("%Y-%m-%dT%H:%M:%S"))
}

/// Drives the commit, mirror and archive-commit phases over the configured trees
#[derive(Debug, Clone)]
pub struct BackupEngine {
    config: Config,
    git: GitClient,
}

impl BackupEngine {
    /// Create a new engine with the given configuration
    pub fn new(config: Config) -> Self {
        Self::with_git_client(config, GitClient::new())
    }

    pub fn with_git_client(config: Config, git: GitClient) -> Self {
        Self { config, git }
    }

    /// Run all three phases. Never fails; per-tree problems are recorded in
    /// the report.
    pub async fn run(&self) -> RunReport {
        let start_time = Instant::now();
        let sources = self.config.source_paths();
        let archive = self.config.archive_path();

        info!(
            "Starting backup of {} tree(s) into {}",
            sources.len(),
            archive.display()
        );

        let mut commits = Vec::with_capacity(sources.len());
        for tree in &sources {
            let outcome = self.commit_if_dirty(tree).await;
            commits.push(settle(tree, "per-tree commit", outcome));
        }

        let mut mirrors = Vec::with_capacity(sources.len());
        for tree in &sources {
            let outcome = self.mirror_into_archive(tree, &archive);
            mirrors.push(settle(tree, "archive mirror", outcome));
        }

        let outcome = self.commit_archive(&archive).await;
        let archive = settle(&archive, "archive commit", outcome);

        let report = RunReport {
            commits,
            mirrors,
            archive,
            duration: start_time.elapsed(),
        };

        info!(
            "Backup completed in {:.2}s: {} commit(s), {} mirror(s), {} skipped, {} failed",
            report.duration.as_secs_f64(),
            report.committed(),
            report.mirrored(),
            report.skipped(),
            report.failed()
        );

        report
    }

    /// Commit pending changes in a source tree
    pub async fn commit_if_dirty(&self, tree: &Path) -> Result<TreeOutcome> {
        let label = tree.display().to_string();
        self.commit_tree(tree, &label, COMMIT_PREFIX, self.config.push.sources)
            .await
    }

    /// Commit whatever the mirror phase changed in the archive
    pub async fn commit_archive(&self, archive: &Path) -> Result<TreeOutcome> {
        self.commit_tree(
            archive,
            MASTER_LABEL,
            MIRROR_COMMIT_PREFIX,
            self.config.push.archive,
        )
        .await
    }

    /// Replace `<archive>/<tree name>` with a fresh copy of `tree`
    pub fn mirror_into_archive(&self, tree: &Path, archive: &Path) -> Result<TreeOutcome> {
        let label = tree.display().to_string();

        if !tree.is_dir() {
            return Ok(skipped(tree, &label, "not a directory, skipping mirror"));
        }

        if !archive.is_dir() {
            return Ok(skipped(
                tree,
                &label,
                format!("archive {} is not a directory", archive.display()),
            ));
        }

        if !GitClient::is_repository(archive) {
            return Ok(skipped(
                tree,
                &label,
                format!("archive {} is not a git repo", archive.display()),
            ));
        }

        let source_path = mirror::resolve(tree)?;
        let archive_path = mirror::resolve(archive)?;

        let Some(destination) = mirror::destination_for(&source_path, &archive_path) else {
            return Ok(skipped(tree, &label, "tree path has no base name, skipping mirror"));
        };

        if let Some(reason) = mirror::nesting_conflict(&source_path, &archive_path, &destination) {
            return Ok(skipped(tree, &label, format!("{}; skipping copy", reason)));
        }

        let stats = mirror::replace_mirror(&source_path, &destination)?;
        debug!(
            "[{}] copied {} file(s), {} byte(s)",
            tree.display(),
            stats.files,
            stats.bytes
        );
        info!(
            "[{}] mirrored {} -> {}",
            MASTER_LABEL,
            tree.display(),
            destination.display()
        );

        Ok(TreeOutcome::Mirrored {
            path: tree.to_path_buf(),
            destination,
        })
    }

    async fn commit_tree(
        &self,
        tree: &Path,
        label: &str,
        prefix: &str,
        push_enabled: bool,
    ) -> Result<TreeOutcome> {
        if !tree.is_dir() {
            return Ok(skipped(tree, label, "not a directory, skipping"));
        }

        if !GitClient::is_repository(tree) {
            return Ok(skipped(tree, label, "not a git repo (no .git), skipping"));
        }

        match self.git.status_porcelain(tree).await? {
            StatusCheck::Clean => {
                info!("[{}] no changes", label);
                return Ok(TreeOutcome::Clean {
                    path: tree.to_path_buf(),
                });
            }
            StatusCheck::Failed(stderr) => {
                // A failed status query counts as "no changes"
                warn!("[{}] git status failed: {}", label, stderr);
                return Ok(TreeOutcome::Clean {
                    path: tree.to_path_buf(),
                });
            }
            StatusCheck::Dirty => {}
        }

        let message = backup_message(prefix, Local::now());

        self.git.add_all(tree).await?;

        let commit = self.git.commit(tree, &message).await?;
        if !commit.success() {
            let error = format!("commit returned {}: {}", commit.code_display(), commit.stderr);
            error!("[{}] {}", label, error);
            return Ok(TreeOutcome::Failed {
                path: tree.to_path_buf(),
                error,
            });
        }
        info!("[{}] committed changes: {}", label, message);

        let push = if push_enabled {
            self.push(tree, label).await
        } else {
            PushStatus::Disabled
        };

        Ok(TreeOutcome::Committed {
            path: tree.to_path_buf(),
            message,
            push,
        })
    }

    async fn push(&self, tree: &Path, label: &str) -> PushStatus {
        match self.git.push(tree).await {
            Ok(output) if output.success() => {
                info!("[{}] pushed to remote", label);
                PushStatus::Pushed
            }
            Ok(output) => {
                error!("[{}] push failed: {}", label, output.stderr);
                PushStatus::Failed(output.stderr)
            }
            Err(e) => {
                error!("[{}] push failed: {:#}", label, e);
                PushStatus::Failed(format!("{:#}", e))
            }
        }
    }
}

/// Turn an unexpected error into a recorded failure for `tree`
fn settle(tree: &Path, phase: &str, outcome: Result<TreeOutcome>) -> TreeOutcome {
    outcome.unwrap_or_else(|e| {
        error!("[{}] unexpected error during {}: {:#}", tree.display(), phase, e);
        TreeOutcome::Failed {
            path: tree.to_path_buf(),
            error: format!("{:#}", e),
        }
    })
}

fn skipped(tree: &Path, label: &str, reason: impl Into<String>) -> TreeOutcome {
    let reason = reason.into();
    warn!("[{}] {}", label, reason);
    TreeOutcome::Skipped {
        path: tree.to_path_buf(),
        reason,
    }
}
