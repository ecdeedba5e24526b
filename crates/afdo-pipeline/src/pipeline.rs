//! Pipeline entry points
//!
//! A [`Pipeline`] owns the configuration and the external collaborators and
//! dispatches each stage to the handler registered for the artifact type.

use crate::error::{PipelineError, PipelineResult};
use crate::handlers::{ArtifactType, HandlerContext, HandlerRegistry, InputArtifacts, PrepareResult};
use crate::repo::VersionedRepo;
use crate::store::RemoteStore;
use crate::target::{BuildTarget, Chroot, Toolchain};
use crate::tool::ToolRunner;
use afdo_artifact::{rank_benchmark, rank_cwp, rank_merged, ProfileFamily};
use afdo_config::PipelineConfig;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Toolchain profile artifact pipeline
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn RemoteStore>,
    runner: Arc<dyn ToolRunner>,
    repo: Option<Arc<dyn VersionedRepo>>,
    chroot: Option<Chroot>,
    chrome_root: Option<PathBuf>,
    build_target: Option<BuildTarget>,
    registry: HandlerRegistry,
    now: Option<DateTime<Utc>>,
}

impl Pipeline {
    /// Create new pipeline with the default handlers
    pub fn new(config: PipelineConfig, store: Arc<dyn RemoteStore>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            config,
            store,
            runner,
            repo: None,
            chroot: None,
            chrome_root: None,
            build_target: None,
            registry: HandlerRegistry::default(),
            now: None,
        }
    }

    /// Set the checkout holding the version ledgers
    pub fn with_repo(mut self, repo: Arc<dyn VersionedRepo>) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Run toolchain commands in this chroot
    pub fn with_chroot(mut self, chroot: Chroot) -> Self {
        self.chroot = Some(chroot);
        self
    }

    /// Set the Chrome source checkout
    pub fn with_chrome_root(mut self, chrome_root: impl Into<PathBuf>) -> Self {
        self.chrome_root = Some(chrome_root.into());
        self
    }

    /// Set the build target
    pub fn with_build_target(mut self, build_target: BuildTarget) -> Self {
        self.build_target = Some(build_target);
        self
    }

    /// Replace the handler registry
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Pin the current time (staleness checks, dated file names)
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn context<'a>(&'a self, inputs: &'a InputArtifacts) -> HandlerContext<'a> {
        HandlerContext {
            config: &self.config,
            store: self.store.as_ref(),
            toolchain: Toolchain::new(self.runner.as_ref(), self.chroot.as_ref()),
            chrome_root: self.chrome_root.as_deref(),
            build_target: self.build_target.as_ref(),
            inputs,
            repo: self.repo.as_deref(),
            now: self.now.unwrap_or_else(Utc::now),
        }
    }

    /// Decide whether building `artifact` is needed
    ///
    /// Runs outside the chroot, before the build. May patch descriptors.
    pub fn prepare_for_build(&self, artifact: ArtifactType, inputs: &InputArtifacts) -> PipelineResult<PrepareResult> {
        let handler = self.registry.get(artifact)?;
        let result = handler.prepare(&self.context(inputs))?;
        info!(%artifact, %result, "prepared");
        Ok(result)
    }

    /// Package the built `artifact` into `output_dir`
    pub fn bundle_artifacts(&self, artifact: ArtifactType, output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        if !output_dir.is_dir() {
            return Err(PipelineError::io(
                output_dir,
                io::Error::new(io::ErrorKind::NotFound, "output directory does not exist"),
            ));
        }

        let inputs = InputArtifacts::new();
        let handler = self.registry.get(artifact)?;
        let files = handler.bundle(&self.context(&inputs), output_dir)?;
        info!(%artifact, count = files.len(), "bundled");
        Ok(files)
    }

    /// Upload bundled files of `artifact` to the unvetted tier
    pub fn upload_artifacts(&self, artifact: ArtifactType, files: &[PathBuf]) -> PipelineResult<Vec<String>> {
        let inputs = InputArtifacts::new();
        let handler = self.registry.get(artifact)?;
        let uploaded = handler.upload(&self.context(&inputs), files)?;
        info!(%artifact, count = uploaded.len(), "uploaded");
        Ok(uploaded)
    }

    /// Promote the verified `artifact` and publish it where needed
    ///
    /// Returns false when nothing new was uploaded.
    pub fn upload_and_publish_vetted(&self, artifact: ArtifactType) -> PipelineResult<bool> {
        let inputs = InputArtifacts::new();
        let handler = self.registry.get(artifact)?;
        let published = handler.publish(&self.context(&inputs))?;
        info!(%artifact, published, "upload and publish finished");
        Ok(published)
    }

    /// Full URL of the newest `family` artifact in `location` for `branch`
    ///
    /// The branch defaults to the one of the Chrome being built. Handlers use
    /// [`HandlerContext::find_latest`], which returns only the file name.
    pub fn latest_artifact(&self, location: &str, family: ProfileFamily, branch: Option<u32>) -> PipelineResult<String> {
        let inputs = InputArtifacts::new();
        let ctx = self.context(&inputs);
        let branch = match branch {
            Some(branch) => branch,
            None => ctx.chrome_branch()?,
        };

        match family {
            ProfileFamily::Benchmark => ctx.latest_url(location, branch, rank_benchmark),
            ProfileFamily::Cwp => ctx.latest_url(location, branch, rank_cwp),
            ProfileFamily::Merged => ctx.latest_url(location, branch, rank_merged),
        }
    }
}
