// ABOUTME: Minimal git driver for committing and pushing mirrored content files
// ABOUTME: Runs the system git binary asynchronously, one change at a time per repository

use crate::util::{clean_path, is_subdirectory};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(clean_path(path))
    } else {
        Ok(clean_path(&std::env::current_dir()?.join(path)))
    }
}

/// One lock per repository root, shared by every `Repo` opened on it.
fn repo_lock(root: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    locks.entry(root.to_path_buf()).or_default().clone()
}

fn describe_failure(args: &[&str], output: &Output) -> Error {
    let streams: Vec<String> = [&output.stderr, &output.stdout]
        .iter()
        .map(|s| String::from_utf8_lossy(s).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Error::Git(format!(
        "git {} exited with {}: {}",
        args.first().copied().unwrap_or_default(),
        output.status,
        streams.join("; ")
    ))
}

#[derive(Debug, Clone)]
pub struct Repo {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl Repo {
    /// Open the repository at `git_dir`, which must contain `content_dir`.
    pub fn open(git_dir: &Path, content_dir: &Path) -> Result<Self> {
        let root = absolute(git_dir)?;
        let content_dir = absolute(content_dir)?;
        if !is_subdirectory(&root, &content_dir) {
            return Err(Error::Git(format!(
                "content directory {} is not inside git directory {}",
                content_dir.display(),
                root.display()
            )));
        }
        let lock = repo_lock(&root);
        Ok(Repo { root, lock })
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(repo = %self.root.display(), ?args, "Running git");
        Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Git(format!("failed to launch git: {}", e)))
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(describe_failure(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn relative(&self, file: &Path) -> Result<String> {
        let file = absolute(file)?;
        file.strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|_| Error::Git(format!("{} is outside the repository", file.display())))
    }

    /// Whether the index differs from HEAD for `pathspec`.
    async fn has_staged(&self, pathspec: &str) -> Result<bool> {
        let args = ["diff", "--cached", "--quiet", "--", pathspec];
        let output = self.run(&args).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(describe_failure(&args, &output)),
        }
    }

    pub async fn has_remote(&self) -> Result<bool> {
        Ok(!self.git(&["remote"]).await?.trim().is_empty())
    }

    /// Stage, commit and push a single file change, including its removal.
    ///
    /// Returns `false` when the file already matches HEAD and nothing was committed.
    pub async fn record_change(&self, file: &Path, message: &str) -> Result<bool> {
        let pathspec = self.relative(file)?;
        let _guard = self.lock.lock().await;

        self.git(&["add", "--all", "--", pathspec.as_str()]).await?;
        if !self.has_staged(&pathspec).await? {
            debug!(repo = %self.root.display(), file = %pathspec, "No changes to record");
            return Ok(false);
        }
        self.git(&["commit", "-m", message, "--", pathspec.as_str()]).await?;

        if self.has_remote().await? {
            self.git(&["push"]).await?;
            info!(repo = %self.root.display(), message, "Committed and pushed");
        } else {
            warn!(repo = %self.root.display(), "No git remote configured; committed without pushing");
        }
        Ok(true)
    }
}
