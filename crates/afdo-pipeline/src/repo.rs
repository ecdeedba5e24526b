//! Versioned repository holding the ledgers

use crate::error::PipelineResult;
use crate::tool::{ToolInvocation, ToolRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pull, inspect, commit and push a checkout
pub trait VersionedRepo: Send + Sync {
    /// Sync `refspec` from `remote` into the checkout
    fn pull(&self, remote: &str, refspec: &str) -> PipelineResult<()>;

    /// Porcelain status of tracked files; empty when clean
    fn status(&self) -> PipelineResult<String>;

    /// Working tree diff
    fn diff(&self) -> PipelineResult<String>;

    /// Commit every tracked modification
    fn commit_all(&self, message: &str) -> PipelineResult<()>;

    /// Push HEAD to `refspec` on `remote`
    fn push(&self, remote: &str, refspec: &str) -> PipelineResult<()>;
}

/// Git checkout driven through `git -C <path>`
pub struct GitRepo {
    path: PathBuf,
    runner: Arc<dyn ToolRunner>,
}

impl GitRepo {
    /// Create new git repository handle
    pub fn new(path: impl Into<PathBuf>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            path: path.into(),
            runner,
        }
    }

    /// Checkout path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn git<I, S>(&self, args: I) -> PipelineResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = ToolInvocation::new("git")
            .arg("-C")
            .arg(self.path.display().to_string())
            .args(args);
        Ok(self.runner.run_checked(&invocation)?.stdout)
    }
}

impl VersionedRepo for GitRepo {
    fn pull(&self, remote: &str, refspec: &str) -> PipelineResult<()> {
        self.git(["pull", remote, refspec]).map(drop)
    }

    fn status(&self) -> PipelineResult<String> {
        self.git(["status", "--porcelain", "-uno"])
    }

    fn diff(&self) -> PipelineResult<String> {
        self.git(["diff"])
    }

    fn commit_all(&self, message: &str) -> PipelineResult<()> {
        self.git(["commit", "-a", "-m", message]).map(drop)
    }

    fn push(&self, remote: &str, refspec: &str) -> PipelineResult<()> {
        self.git(["push".to_string(), remote.to_string(), format!("HEAD:{}", refspec)])
            .map(drop)
    }
}
