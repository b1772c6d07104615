//! System health checks for repoarchive
//!
//! Preflight checks behind `repoarchive doctor`. They only read the
//! filesystem and never touch a repository.

use crate::git::GitClient;
use crate::mirror;
use crate::Config;
use std::path::Path;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Archive repository status
    pub archive: CheckResult,
    /// One entry per configured source tree
    pub sources: Vec<(String, CheckResult)>,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: true,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(config: &Config) -> Self {
        let git = Self::check_git(&GitClient::new()).await;
        let archive_path = config.archive_path();

        Self {
            git,
            archive: Self::check_archive(&archive_path),
            sources: config
                .source_paths()
                .iter()
                .map(|source| {
                    (
                        source.display().to_string(),
                        Self::check_source(source, &archive_path),
                    )
                })
                .collect(),
        }
    }

    /// Git and the archive are required; a bad source only skips that tree
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.archive.passed
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_warning)
            .collect()
    }

    async fn check_git(git: &GitClient) -> CheckResult {
        match git.version().await {
            Ok(version) => CheckResult::ok_with_details("Git installed", version),
            Err(e) => CheckResult::error_with_details(
                "Git not usable",
                format!("{:#}\nInstall git: https://git-scm.com/downloads", e),
            ),
        }
    }

    fn check_archive(archive: &Path) -> CheckResult {
        if !archive.is_dir() {
            return CheckResult::error_with_details(
                "Archive directory does not exist",
                format!("Run: mkdir -p {0} && git -C {0} init", archive.display()),
            );
        }
        if !GitClient::is_repository(archive) {
            return CheckResult::error_with_details(
                "Archive is not a git repository",
                format!("Run: git -C {} init", archive.display()),
            );
        }
        CheckResult::ok_with_details("Archive repository found", archive.display().to_string())
    }

    fn check_source(source: &Path, archive: &Path) -> CheckResult {
        if !source.is_dir() {
            return CheckResult::warning("Not a directory, will be skipped");
        }
        if !GitClient::is_repository(source) {
            return CheckResult::warning_with_details(
                "Not a git repository, commits will be skipped",
                format!("Run: git -C {} init", source.display()),
            );
        }

        if let (Ok(source_path), Ok(archive_path)) =
            (mirror::resolve(source), mirror::resolve(archive))
        {
            if let Some(destination) = mirror::destination_for(&source_path, &archive_path) {
                if let Some(reason) =
                    mirror::nesting_conflict(&source_path, &archive_path, &destination)
                {
                    return CheckResult::warning_with_details(
                        "Mirror will be skipped",
                        reason,
                    );
                }
            }
        }

        CheckResult::ok("Git repository found")
    }

    /// Get all checks for iteration
    pub fn all_checks(&self) -> Vec<(String, &CheckResult)> {
        let mut checks = vec![
            ("Git Installation".to_string(), &self.git),
            ("Archive Repository".to_string(), &self.archive),
        ];
        checks.extend(
            self.sources
                .iter()
                .map(|(name, result)| (format!("Source {}", name), result)),
        );
        checks
    }
}
