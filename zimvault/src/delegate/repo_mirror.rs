//! Git repository mirroring.
//!
//! Each repository is cloned once into `<mirror_dir>/<owner>/<name>` and
//! fast-forwarded on later runs. When a fast-forward is impossible (force
//! pushes, rewritten history) the clone is reset hard to its upstream.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Delegate, DelegateError, DelegateResult, DelegateSummary};
use crate::config::RepositoryConfig;
use crate::transport::join_url;

/// Interval between checks on a running git command.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What happened to a repository during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Cloned,
    FastForwarded,
    Reset,
}

/// Failure to synchronise one repository.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("cannot derive owner/name from '{0}'")]
    InvalidIdent(String),

    #[error("failed to create {}: {source}", path.display())]
    Prepare { path: PathBuf, source: io::Error },

    #[error("failed to run {binary}: {source}")]
    Spawn { binary: String, source: io::Error },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("git {command} timed out after {timeout_secs}s")]
    TimedOut { command: String, timeout_secs: u64 },

    #[error("{pull}; reset failed: {reset}")]
    ResetFailed {
        pull: Box<RepoError>,
        reset: Box<RepoError>,
    },
}

/// Repository mirror delegate using the system `git` binary.
///
/// Git runs non-interactively: credential prompts are disabled, so a private
/// or missing repository fails instead of waiting for input. Each command is
/// killed once `git_timeout` expires.
#[derive(Debug, Clone)]
pub struct RepoMirror {
    config: RepositoryConfig,
}

impl RepoMirror {
    pub fn new(config: RepositoryConfig) -> Self {
        Self { config }
    }

    /// Clone URL for an identifier.
    ///
    /// `owner/name` expands against the base URL; full URLs are used as is.
    pub fn clone_url(&self, ident: &str) -> String {
        if is_full_url(ident) {
            ident.to_string()
        } else {
            join_url(&self.config.base_url, &format!("{}.git", ident))
        }
    }

    /// Local clone directory for an identifier.
    ///
    /// Uses the last two path segments, so `https://host/owner/name.git`
    /// and `owner/name` map to the same place.
    pub fn local_dir(&self, ident: &str) -> Option<PathBuf> {
        let path = ident.trim_end_matches('/').trim_end_matches(".git");
        let path = path.rsplit_once(':').map_or(path, |(_, p)| p);
        let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
        let name = segments.next()?;
        let owner = segments.next()?;
        if [owner, name].iter().any(|s| *s == "." || *s == "..") {
            return None;
        }
        Some(self.config.mirror_dir.join(owner).join(name))
    }

    /// Clone or update one repository.
    pub fn sync(&self, ident: &str) -> Result<SyncAction, RepoError> {
        let dir = self
            .local_dir(ident)
            .ok_or_else(|| RepoError::InvalidIdent(ident.to_string()))?;

        if !dir.join(".git").exists() {
            if let Some(parent) = dir.parent() {
                fs::create_dir_all(parent).map_err(|source| RepoError::Prepare {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let url = self.clone_url(ident);
            let dir_arg = dir.to_string_lossy().into_owned();
            self.git(None, &["clone", "--quiet", url.as_str(), dir_arg.as_str()])?;
            return Ok(SyncAction::Cloned);
        }

        match self.git(Some(&dir), &["pull", "--ff-only", "--quiet"]) {
            Ok(()) => Ok(SyncAction::FastForwarded),
            Err(pull_err) => {
                warn!(repo = ident, error = %pull_err, "Fast-forward failed, resetting to upstream");
                self.git(Some(&dir), &["fetch", "--all", "--prune", "--quiet"])
                    .and_then(|_| self.git(Some(&dir), &["reset", "--hard", "--quiet", "@{upstream}"]))
                    .map_err(|reset_err| RepoError::ResetFailed {
                        pull: Box::new(pull_err),
                        reset: Box::new(reset_err),
                    })?;
                Ok(SyncAction::Reset)
            }
        }
    }

    fn git(&self, dir: Option<&Path>, args: &[&str]) -> Result<(), RepoError> {
        let subcommand = args.first().copied().unwrap_or_default().to_string();
        let mut command = Command::new(&self.config.git_binary);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!(git = %self.config.git_binary, args = ?args, "Running git");

        let mut child = command.spawn().map_err(|source| RepoError::Spawn {
            binary: self.config.git_binary.clone(),
            source,
        })?;

        // Read while polling so the pipe never fills
        let stderr = child.stderr.take();
        let reader = thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text);
            }
            text
        });

        let timeout = self.config.git_timeout;
        let status = wait_with_deadline(&mut child, timeout).map_err(|source| RepoError::Spawn {
            binary: self.config.git_binary.clone(),
            source,
        })?;

        match status {
            Some(status) if status.success() => Ok(()),
            Some(_) => Err(RepoError::Git {
                command: subcommand,
                stderr: reader.join().unwrap_or_default().trim().to_string(),
            }),
            None => {
                warn!(args = ?args, timeout_secs = timeout.as_secs(), "Git command killed after timeout");
                Err(RepoError::TimedOut {
                    command: subcommand,
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}

/// Wait for `child`, killing it once `timeout` has elapsed.
///
/// Returns `None` when the child was killed.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // The child may have exited since try_wait
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn is_full_url(ident: &str) -> bool {
    ident.contains("://") || ident.starts_with("git@")
}

impl Delegate for RepoMirror {
    fn name(&self) -> &'static str {
        "repositories"
    }

    fn run(&self) -> DelegateResult<DelegateSummary> {
        let mut summary = DelegateSummary::default();
        if self.config.repositories.is_empty() {
            debug!("No repositories configured");
            return Ok(summary);
        }

        fs::create_dir_all(&self.config.mirror_dir).map_err(|e| DelegateError::Prepare {
            path: self.config.mirror_dir.clone(),
            source: e,
        })?;

        for ident in &self.config.repositories {
            match self.sync(ident) {
                Ok(action) => {
                    info!(repo = %ident, action = ?action, "Repository synchronised");
                    summary.fetched.push(ident.clone());
                }
                Err(e) => {
                    warn!(repo = %ident, error = %e, "Repository sync failed");
                    summary.fail(ident.clone(), e.to_string());
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mirror(dir: &Path, repos: &[&str], git: &str) -> RepoMirror {
        mirror_with_timeout(dir, repos, git, Duration::from_secs(60))
    }

    fn mirror_with_timeout(dir: &Path, repos: &[&str], git: &str, timeout: Duration) -> RepoMirror {
        RepoMirror::new(RepositoryConfig {
            mirror_dir: dir.to_path_buf(),
            repositories: repos.iter().map(|r| r.to_string()).collect(),
            base_url: "https://github.com".to_string(),
            git_binary: git.to_string(),
            git_timeout: timeout,
        })
    }

    /// Write an executable shell script standing in for `git`.
    #[cfg(unix)]
    fn fake_git(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-git");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_clone_url() {
        let m = mirror(Path::new("/m"), &[], "git");
        assert_eq!(
            m.clone_url("kiwix/kiwix-tools"),
            "https://github.com/kiwix/kiwix-tools.git"
        );
        assert_eq!(
            m.clone_url("https://gitlab.example/a/b.git"),
            "https://gitlab.example/a/b.git"
        );
    }

    #[test]
    fn test_local_dir() {
        let m = mirror(Path::new("/m"), &[], "git");
        let expected = Some(PathBuf::from("/m/kiwix/kiwix-tools"));

        assert_eq!(m.local_dir("kiwix/kiwix-tools"), expected);
        assert_eq!(
            m.local_dir("https://github.com/kiwix/kiwix-tools.git"),
            expected
        );
        assert_eq!(m.local_dir("git@github.com:kiwix/kiwix-tools.git"), expected);
        assert_eq!(m.local_dir("kiwix-tools"), None);
        assert_eq!(m.local_dir("../kiwix-tools"), None);
    }

    #[test]
    fn test_failures_do_not_stop_siblings() {
        let temp = TempDir::new().unwrap();
        let m = mirror(
            temp.path(),
            &["kiwix/kiwix-tools", "bogus", "openzim/libzim"],
            "/nonexistent/git-binary",
        );

        let summary = m.run().unwrap();

        assert!(summary.fetched.is_empty());
        let failed: Vec<_> = summary.failures.iter().map(|f| f.item.as_str()).collect();
        assert_eq!(failed, vec!["kiwix/kiwix-tools", "bogus", "openzim/libzim"]);
        assert!(summary.failures[0].reason.contains("failed to run"));
    }

    #[test]
    fn test_existing_clone_takes_update_path() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("kiwix/kiwix-tools/.git")).unwrap();
        let m = mirror(temp.path(), &["kiwix/kiwix-tools"], "/nonexistent/git-binary");

        let err = m.sync("kiwix/kiwix-tools").unwrap_err();

        match err {
            RepoError::ResetFailed { pull, reset } => {
                assert!(matches!(*pull, RepoError::Spawn { .. }));
                assert!(matches!(*reset, RepoError::Spawn { .. }));
            }
            other => panic!("Expected ResetFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_ident() {
        let temp = TempDir::new().unwrap();
        let m = mirror(temp.path(), &[], "git");
        assert!(matches!(
            m.sync("no-owner"),
            Err(RepoError::InvalidIdent(ident)) if ident == "no-owner"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_git_is_killed_at_timeout() {
        let temp = TempDir::new().unwrap();
        let git = fake_git(temp.path(), "exec sleep 30");
        let m = mirror_with_timeout(
            &temp.path().join("mirrors"),
            &["kiwix/kiwix-tools"],
            &git,
            Duration::from_millis(300),
        );

        let started = Instant::now();
        let summary = m.run().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].reason.contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn test_git_runs_without_prompts() {
        let temp = TempDir::new().unwrap();
        let env_file = temp.path().join("env.txt");
        let git = fake_git(
            temp.path(),
            &format!(
                "echo \"prompt=$GIT_TERMINAL_PROMPT askpass=[$GIT_ASKPASS]\" > '{}'\necho 'Repository not found' >&2\nexit 128",
                env_file.display()
            ),
        );
        let m = mirror(&temp.path().join("mirrors"), &["kiwix/private"], &git);

        let err = m.sync("kiwix/private").unwrap_err();

        match err {
            RepoError::Git { command, stderr } => {
                assert_eq!(command, "clone");
                assert_eq!(stderr, "Repository not found");
            }
            other => panic!("Expected Git error, got {:?}", other),
        }
        let env = fs::read_to_string(&env_file).unwrap();
        assert_eq!(env.trim(), "prompt=0 askpass=[]");
    }

    #[test]
    fn test_no_repositories_is_noop() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("mirrors");
        let m = mirror(&dir, &[], "git");

        let summary = m.run().unwrap();

        assert_eq!(summary, DelegateSummary::default());
        assert!(!dir.exists());
    }
}
