//! Common test utilities and helpers for repoarchive tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use repoarchive::Config;

/// Run git in `dir`, panicking on failure, and return stdout
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to execute git");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Initialize a repository with a local identity so commits work on any machine
pub fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).expect("Failed to create repo dir");
    git(dir, &["init", "--quiet"]);
    git(dir, &["config", "user.name", "repoarchive tests"]);
    git(dir, &["config", "user.email", "tests@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// Number of commits on HEAD (0 for an unborn branch)
pub fn commit_count(dir: &Path) -> usize {
    let output = Command::new("git")
        .args(["rev-list", "--count", "HEAD"])
        .current_dir(dir)
        .output()
        .expect("Failed to execute git");
    if !output.status.success() {
        return 0;
    }
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .unwrap_or(0)
}

pub fn last_subject(dir: &Path) -> String {
    git(dir, &["log", "-1", "--format=%s"]).trim().to_string()
}

/// True if `subject` is `<prefix> YYYY-MM-DDTHH:MM:SS`
pub fn is_backup_subject(subject: &str, prefix: &str) -> bool {
    let Some(stamp) = subject.strip_prefix(prefix).and_then(|s| s.strip_prefix(' ')) else {
        return false;
    };
    chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S").is_ok()
}

/// A temp directory holding source trees and an archive repository
pub struct Workspace {
    pub temp_dir: TempDir,
    pub archive: PathBuf,
    pub sources: Vec<PathBuf>,
}

impl Workspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let archive = temp_dir.path().join("master");
        init_repo(&archive);
        Self {
            temp_dir,
            archive,
            sources: Vec::new(),
        }
    }

    /// Create and register a source repository named `name`
    pub fn add_source(&mut self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        init_repo(&path);
        self.sources.push(path.clone());
        path
    }

    /// Register a source path without creating anything
    pub fn add_missing_source(&mut self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        self.sources.push(path.clone());
        path
    }

    pub fn config(&self) -> Config {
        Config {
            sources: self
                .sources
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            archive: self.archive.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    pub fn write_config(&self) -> PathBuf {
        let path = self.temp_dir.path().join("config.yml");
        self.config().save(&path).expect("Failed to write test config");
        path
    }
}

pub fn write_file(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    std::fs::write(path, contents).expect("Failed to write file");
}

/// Relative path -> contents for every file under `dir`
pub fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(dir).unwrap().to_path_buf();
            let contents = std::fs::read(e.path()).unwrap();
            (relative, contents)
        })
        .collect();
    files.sort();
    files
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
