//! Pipeline construction from command line flags

use afdo_config::{ConfigLoader, PipelineConfig};
use afdo_pipeline::{
    BuildTarget, Chroot, GitRepo, GsutilStore, LocalStore, Pipeline, ProcessRunner, RemoteStore,
    ToolRunner,
};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Flags shared by every subcommand
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Path to afdo.toml (default: nearest ancestor of the working directory)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Build target, e.g. `eve` or `eve_kernelnext`
    #[arg(long, short = 'b', global = true)]
    pub board: Option<String>,

    /// SDK chroot on the host
    #[arg(long, global = true)]
    pub chroot: Option<PathBuf>,

    /// Chrome source checkout
    #[arg(long, global = true)]
    pub chrome_root: Option<PathBuf>,

    /// Run tools directly instead of entering the chroot
    #[arg(long, global = true)]
    pub inside_chroot: bool,

    /// Serve remote URLs from this directory instead of gsutil
    #[arg(long, global = true, env = "AFDO_STORE_ROOT")]
    pub store_root: Option<PathBuf>,

    /// Output JSON instead of plain text
    #[arg(long, global = true, env = "AFDO_JSON")]
    pub json: bool,
}

impl GlobalArgs {
    /// Effective configuration
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let loader = ConfigLoader::new();
        let loaded = match &self.config {
            Some(path) => loader
                .load_from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => loader
                .load_from_directory(&std::env::current_dir()?)
                .context("Failed to load afdo.toml")?,
        };

        if let Some(root) = &loaded.config_root {
            debug!(root = %root.display(), "using afdo.toml");
        }
        Ok(loaded.config)
    }

    fn chroot(&self) -> Option<Chroot> {
        let mut chroot = Chroot::new(self.chroot.clone()?);
        if self.inside_chroot {
            chroot = chroot.already_inside();
        }
        Some(chroot)
    }

    /// Pipeline wired to real tools, or to a local store for dry runs
    pub fn pipeline(&self) -> Result<Pipeline> {
        let config = self.load_config()?;
        let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new());

        let store: Arc<dyn RemoteStore> = match &self.store_root {
            Some(root) => Arc::new(LocalStore::new(root)),
            None => Arc::new(GsutilStore::new(runner.clone())),
        };
        let repo = Arc::new(GitRepo::new(config.toolchain.utils_path.clone(), runner.clone()));

        let mut pipeline = Pipeline::new(config, store, runner).with_repo(repo);
        if let Some(chroot) = self.chroot() {
            pipeline = pipeline.with_chroot(chroot);
        }
        if let Some(chrome_root) = &self.chrome_root {
            pipeline = pipeline.with_chrome_root(chrome_root);
        }
        if let Some(board) = &self.board {
            pipeline = pipeline.with_build_target(BuildTarget::new(board));
        }
        Ok(pipeline)
    }
}

/// Print `value` as pretty JSON
pub fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
