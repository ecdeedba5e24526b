//! Remote artifact store adapters
//!
//! Locations are `scheme://bucket/path` URLs or plain local paths. Copies may
//! go in either direction or between two remote locations.

use crate::error::{PipelineError, PipelineResult};
use crate::tool::{ToolInvocation, ToolRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Whether `location` names a remote object rather than a local path
pub fn is_remote(location: &str) -> bool {
    location.contains("://")
}

/// Existence, listing and copy against an object store
pub trait RemoteStore: Send + Sync {
    /// Whether an object exists at `url`
    fn exists(&self, url: &str) -> PipelineResult<bool>;

    /// Full URLs of the objects directly under `url`
    fn list(&self, url: &str) -> PipelineResult<Vec<String>>;

    /// Copy `source` to `dest`; either side may be local
    fn copy(&self, source: &str, dest: &str) -> PipelineResult<()>;
}

/// Store backed by a local directory
///
/// `gs://bucket/a/b` maps to `<root>/bucket/a/b`. Used for dry runs and tests.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create new local store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local path backing `location`
    pub fn resolve(&self, location: &str) -> PathBuf {
        match location.split_once("://") {
            Some((_, rest)) => self.root.join(rest.trim_matches('/')),
            None => PathBuf::from(location),
        }
    }
}

impl RemoteStore for LocalStore {
    fn exists(&self, url: &str) -> PipelineResult<bool> {
        Ok(self.resolve(url).is_file())
    }

    fn list(&self, url: &str) -> PipelineResult<Vec<String>> {
        let dir = self.resolve(url);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| PipelineError::io(&dir, e))? {
            let entry = entry.map_err(|e| PipelineError::io(&dir, e))?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| afdo_config::join_url(url, &name))
            .collect())
    }

    fn copy(&self, source: &str, dest: &str) -> PipelineResult<()> {
        let from = self.resolve(source);
        let to = self.resolve(dest);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        debug!(from = %from.display(), to = %to.display(), "copying");
        fs::copy(&from, &to).map_err(|e| PipelineError::io(&from, e))?;
        Ok(())
    }
}

/// Store driven through the `gsutil` command line
pub struct GsutilStore {
    runner: Arc<dyn ToolRunner>,
}

impl GsutilStore {
    /// Create new gsutil store
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    fn gsutil(&self) -> ToolInvocation {
        ToolInvocation::new("gsutil")
    }
}

impl RemoteStore for GsutilStore {
    fn exists(&self, url: &str) -> PipelineResult<bool> {
        if !is_remote(url) {
            return Ok(Path::new(url).exists());
        }
        let output = self.runner.run(&self.gsutil().arg("stat").arg(url))?;
        Ok(output.success())
    }

    fn list(&self, url: &str) -> PipelineResult<Vec<String>> {
        let invocation = self.gsutil().arg("ls").arg(url);
        let output = self.runner.run(&invocation)?;

        if !output.success() {
            if output.stderr.contains("matched no objects") {
                return Ok(Vec::new());
            }
            return Err(PipelineError::ToolFailed {
                command: invocation.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.ends_with('/'))
            .map(String::from)
            .collect())
    }

    fn copy(&self, source: &str, dest: &str) -> PipelineResult<()> {
        let mut invocation = self.gsutil().arg("cp");
        if is_remote(dest) {
            invocation = invocation.args(["-a", "public-read"]);
        }
        info!(source, dest, "copying artifact");
        self.runner.run_checked(&invocation.arg(source).arg(dest))?;
        Ok(())
    }
}
