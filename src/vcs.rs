//! Version-control queries.
//!
//! The scan needs three things from the repository it runs in: which
//! manifest and allow files exist, which files changed against a branch,
//! and when a file was last modified. [`GitRepository`] answers them by
//! running `git`; [`WorkingTree`] answers them from the filesystem alone for
//! trees that are not under git.
//!
//! All paths are relative to the root and use `/` as separator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directories never searched for manifests outside of git.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Returns a short name for log messages.
    fn name(&self) -> &'static str;

    /// The directory every returned path is relative to.
    fn root(&self) -> &Path;

    /// Lists existing files whose name is one of `file_names`, at any depth.
    async fn list_files(&self, file_names: &[&str]) -> Result<Vec<String>>;

    /// Lists files that differ between `branch` and `HEAD`.
    async fn changed_files(&self, branch: &str) -> Result<Vec<String>>;

    /// Returns when `path` was last modified.
    async fn last_modified(&self, path: &str) -> Result<DateTime<Utc>>;
}

/// A git work tree, queried through the `git` command line.
pub struct GitRepository {
    root: PathBuf,
}

impl GitRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// True if `root` is inside a git work tree and `git` can be run.
    pub async fn is_work_tree(root: &Path) -> bool {
        Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(root)
            .stdin(Stdio::null())
            .output()
            .await
            .map(|output| {
                output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true"
            })
            .unwrap_or(false)
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        trace!(?args, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Vcs(format!("Failed to execute git. Is git installed? {}", e)))?;

        if !output.status.success() {
            return Err(Error::Vcs(format!(
                "git {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Splits `-z` output. Paths come back verbatim, without core.quotePath escaping.
fn nul_separated(output: &str) -> Vec<String> {
    output
        .split('\0')
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

async fn is_file(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

async fn file_mtime(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    let modified = metadata.modified().map_err(|e| Error::io(path, e))?;
    Ok(DateTime::<Utc>::from(modified))
}

#[async_trait]
impl VersionControl for GitRepository {
    fn name(&self) -> &'static str {
        "git"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    /// Tracked and untracked files are both listed, honouring ignore rules.
    /// Files deleted from disk but still in the index are dropped.
    async fn list_files(&self, file_names: &[&str]) -> Result<Vec<String>> {
        let patterns: Vec<String> = file_names
            .iter()
            .flat_map(|name| [name.to_string(), format!("**/{}", name)])
            .collect();

        let mut args = vec!["ls-files", "-z", "--cached", "--others", "--exclude-standard", "--"];
        args.extend(patterns.iter().map(String::as_str));
        let listed = nul_separated(&self.git(&args).await?);

        let mut files = Vec::with_capacity(listed.len());
        for file in listed {
            if is_file(&self.root.join(&file)).await? {
                files.push(file);
            } else {
                debug!(file, "Ignoring listed file missing from disk");
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    async fn changed_files(&self, branch: &str) -> Result<Vec<String>> {
        // --relative keeps paths relative to the root when it is a subdirectory
        let output = self
            .git(&["diff", "-z", "--name-only", "--relative", branch, "HEAD"])
            .await?;
        Ok(nul_separated(&output))
    }

    /// Committer time of the last commit touching `path`, or the filesystem
    /// modification time for files git has no history for.
    async fn last_modified(&self, path: &str) -> Result<DateTime<Utc>> {
        let committed = self
            .git(&["log", "-1", "--format=%ct", "--", path])
            .await
            .ok()
            .and_then(|output| output.trim().parse::<i64>().ok())
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0));

        match committed {
            Some(time) => Ok(time),
            None => {
                debug!(path, "No git history, using file modification time");
                file_mtime(&self.root.join(path)).await
            }
        }
    }
}

/// A plain directory tree without version control.
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl VersionControl for WorkingTree {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn list_files(&self, file_names: &[&str]) -> Result<Vec<String>> {
        let mut files: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_dir() && SKIPPED_DIRS.iter().any(|dir| *dir == name))
            })
            .flatten()
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                file_names.iter().any(|wanted| *wanted == name)
            })
            .filter_map(|entry| self.relative(entry.path()))
            .collect();

        files.sort();
        Ok(files)
    }

    async fn changed_files(&self, _branch: &str) -> Result<Vec<String>> {
        Err(Error::Config(format!(
            "--diff needs a git repository, but {} is not inside one",
            self.root.display()
        )))
    }

    async fn last_modified(&self, path: &str) -> Result<DateTime<Utc>> {
        file_mtime(&self.root.join(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, path: &str) {
        let full = dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, "{}").unwrap();
    }

    #[tokio::test]
    async fn test_working_tree_lists_matching_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "package-lock.json");
        touch(&dir, "web/package-lock.json");
        touch(&dir, "web/node_modules/dep/package-lock.json");
        touch(&dir, ".git/package-lock.json");
        touch(&dir, "ios/Package.resolved");
        touch(&dir, "web/package.json");

        let tree = WorkingTree::new(dir.path());
        let files = tree
            .list_files(&["package-lock.json", "Package.resolved"])
            .await
            .unwrap();

        assert_eq!(
            files,
            vec!["ios/Package.resolved", "package-lock.json", "web/package-lock.json"]
        );
    }

    #[tokio::test]
    async fn test_working_tree_rejects_diff() {
        let dir = TempDir::new().unwrap();
        let err = WorkingTree::new(dir.path())
            .changed_files("main")
            .await
            .unwrap_err();
        assert!(err.is_usage_error());
    }

    #[tokio::test]
    async fn test_working_tree_mtime() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "yarn.lock");

        let tree = WorkingTree::new(dir.path());
        let modified = tree.last_modified("yarn.lock").await.unwrap();
        assert!((Utc::now() - modified).num_seconds().abs() < 60);

        assert!(matches!(
            tree.last_modified("missing.lock").await,
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn test_nul_separated() {
        assert_eq!(
            nul_separated("a/yarn.lock\0café/yarn.lock\0"),
            vec!["a/yarn.lock", "café/yarn.lock"]
        );
        assert!(nul_separated("").is_empty());
    }

    #[tokio::test]
    async fn test_git_lists_non_ascii_paths_verbatim() {
        let dir = TempDir::new().unwrap();
        let initialized = Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);
        if !initialized {
            // git is not installed
            return;
        }
        touch(&dir, "café/yarn.lock");
        touch(&dir, "yarn.lock");

        let repo = GitRepository::new(dir.path());
        let files = repo.list_files(&["yarn.lock"]).await.unwrap();
        assert_eq!(files, vec!["café/yarn.lock", "yarn.lock"]);
    }

    #[tokio::test]
    async fn test_plain_directory_is_not_a_work_tree() {
        let dir = TempDir::new().unwrap();
        // tempdirs live outside any repository
        assert!(!GitRepository::is_work_tree(dir.path()).await);
    }
}
