use anyhow::{anyhow, Context, Result};
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Name of the metadata directory git keeps inside a working tree
pub const GIT_DIR: &str = ".git";

/// Thin wrapper over the `git` executable. Every call runs to completion
/// before returning; there is no timeout.
#[derive(Debug, Clone)]
pub struct GitClient {
    program: OsString,
}

/// Captured result of a finished git invocation
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code rendered for log lines
    pub fn code_display(&self) -> String {
        match self.code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

/// Answer of `git status --porcelain`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCheck {
    Clean,
    Dirty,
    /// The status query itself failed
    Failed(String),
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Use a different executable in place of `git`
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// A working tree is a directory with a `.git` entry (directory, or file
    /// for worktrees and submodules)
    pub fn is_repository(path: &Path) -> bool {
        path.join(GIT_DIR).exists()
    }

    /// Run git with `args` inside `repo` and capture its output
    pub async fn run(&self, repo: &Path, args: &[&str]) -> Result<GitOutput> {
        debug!("git {} (in {})", args.join(" "), repo.display());

        let output = AsyncCommand::new(&self.program)
            .args(args)
            .current_dir(repo)
            .output()
            .await
            .with_context(|| format!("Failed to execute git {}", args.first().unwrap_or(&"")))?;

        Ok(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    pub async fn status_porcelain(&self, repo: &Path) -> Result<StatusCheck> {
        let output = self.run(repo, &["status", "--porcelain"]).await?;

        if !output.success() {
            return Ok(StatusCheck::Failed(output.stderr));
        }

        if output.stdout.trim().is_empty() {
            Ok(StatusCheck::Clean)
        } else {
            Ok(StatusCheck::Dirty)
        }
    }

    /// Stage everything; a non-zero exit is an error
    pub async fn add_all(&self, repo: &Path) -> Result<()> {
        let output = self.run(repo, &["add", "-A"]).await?;

        if !output.success() {
            return Err(anyhow!(
                "git add -A returned {}: {}",
                output.code_display(),
                output.stderr
            ));
        }

        Ok(())
    }

    /// Commit staged changes. The exit status is left for the caller to judge.
    pub async fn commit(&self, repo: &Path, message: &str) -> Result<GitOutput> {
        self.run(repo, &["commit", "-m", message]).await
    }

    pub async fn push(&self, repo: &Path) -> Result<GitOutput> {
        self.run(repo, &["push"]).await
    }

    /// `git --version`, trimmed
    pub async fn version(&self) -> Result<String> {
        let output = AsyncCommand::new(&self.program)
            .arg("--version")
            .output()
            .await
            .context("Failed to execute git --version")?;

        if !output.status.success() {
            return Err(anyhow!("git --version failed"));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn init_repo() -> (TempDir, GitClient) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let git = GitClient::new();
        for args in [
            vec!["init", "--quiet"],
            vec!["config", "user.name", "Test User"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            let out = git.run(temp_dir.path(), &args).await.unwrap();
            assert!(out.success(), "git {:?} failed: {}", args, out.stderr);
        }
        (temp_dir, git)
    }

    #[test]
    fn test_git_output_success() {
        let ok = GitOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        };
        let failed = GitOutput {
            code: Some(128),
            ..ok.clone()
        };
        let killed = GitOutput { code: None, ..ok.clone() };

        assert!(ok.success());
        assert!(!failed.success());
        assert_eq!(failed.code_display(), "128");
        assert!(!killed.success());
        assert_eq!(killed.code_display(), "signal");
    }

    #[test]
    fn test_is_repository() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!GitClient::is_repository(temp_dir.path()));

        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();
        assert!(GitClient::is_repository(temp_dir.path()));
    }

    #[tokio::test]
    async fn test_status_clean_then_dirty() {
        let (repo, git) = init_repo().await;

        assert_eq!(git.status_porcelain(repo.path()).await.unwrap(), StatusCheck::Clean);

        std::fs::write(repo.path().join("notes.txt"), "hello").unwrap();
        assert_eq!(git.status_porcelain(repo.path()).await.unwrap(), StatusCheck::Dirty);
    }

    #[tokio::test]
    async fn test_status_broken_repository_fails() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".git"), "gitdir: /nonexistent/gitdir\n").unwrap();
        let git = GitClient::new();

        let status = git.status_porcelain(temp_dir.path()).await.unwrap();

        assert!(matches!(status, StatusCheck::Failed(_)));
    }

    #[tokio::test]
    async fn test_add_and_commit() {
        let (repo, git) = init_repo().await;
        std::fs::write(repo.path().join("a.txt"), "a").unwrap();

        git.add_all(repo.path()).await.unwrap();
        let out = git.commit(repo.path(), "first").await.unwrap();
        assert!(out.success(), "commit failed: {}", out.stderr);

        assert_eq!(git.status_porcelain(repo.path()).await.unwrap(), StatusCheck::Clean);

        // Nothing staged: git commit exits non-zero
        let out = git.commit(repo.path(), "empty").await.unwrap();
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_push_without_remote_fails() {
        let (repo, git) = init_repo().await;
        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        git.add_all(repo.path()).await.unwrap();
        git.commit(repo.path(), "first").await.unwrap();

        let out = git.push(repo.path()).await.unwrap();
        assert!(!out.success());
        assert!(!out.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let git = GitClient::with_program("repoarchive-no-such-git-binary");

        assert!(git.run(temp_dir.path(), &["status"]).await.is_err());
        assert!(git.version().await.is_err());
    }

    #[tokio::test]
    async fn test_version() {
        let version = GitClient::new().version().await.unwrap();
        assert!(version.starts_with("git version"));
    }
}
