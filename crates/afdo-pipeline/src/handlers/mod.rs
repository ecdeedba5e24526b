//! Per-artifact stage handlers
//!
//! Each artifact type has one handler implementing [`ArtifactHandler`]. The
//! [`HandlerRegistry`] maps types to handlers so new families can be added
//! with [`HandlerRegistry::register`] without touching dispatch.

mod chrome_afdo;
mod clang_tidy;
mod kernel_afdo;
mod llvm_pgo;
mod orderfile;

pub use chrome_afdo::{UnverifiedChromeAfdoHandler, VerifiedChromeAfdoHandler};
pub use clang_tidy::ClangWarningsHandler;
pub use kernel_afdo::VerifiedKernelAfdoHandler;
pub use llvm_pgo::LlvmPgoHandler;
pub use orderfile::{UnverifiedOrderfileHandler, VerifiedOrderfileHandler};

use crate::descriptor::{Descriptor, DescriptorPatcher, DescriptorSet};
use crate::error::{PipelineError, PipelineResult};
use crate::repo::VersionedRepo;
use crate::store::RemoteStore;
use crate::target::{BuildTarget, Chroot, Toolchain};
use afdo_artifact::{basename, find_latest};
use afdo_config::PipelineConfig;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Artifact families the pipeline knows how to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactType {
    UnverifiedOrderingFile,
    VerifiedOrderingFile,
    ChromeClangWarningsFile,
    UnverifiedLlvmPgoFile,
    UnverifiedChromeAfdoFile,
    VerifiedChromeAfdoFile,
    VerifiedKernelAfdoFile,
}

impl ArtifactType {
    pub fn all() -> [ArtifactType; 7] {
        [
            Self::UnverifiedOrderingFile,
            Self::VerifiedOrderingFile,
            Self::ChromeClangWarningsFile,
            Self::UnverifiedLlvmPgoFile,
            Self::UnverifiedChromeAfdoFile,
            Self::VerifiedChromeAfdoFile,
            Self::VerifiedKernelAfdoFile,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnverifiedOrderingFile => "UnverifiedOrderingFile",
            Self::VerifiedOrderingFile => "VerifiedOrderingFile",
            Self::ChromeClangWarningsFile => "ChromeClangWarningsFile",
            Self::UnverifiedLlvmPgoFile => "UnverifiedLlvmPgoFile",
            Self::UnverifiedChromeAfdoFile => "UnverifiedChromeAfdoFile",
            Self::VerifiedChromeAfdoFile => "VerifiedChromeAfdoFile",
            Self::VerifiedKernelAfdoFile => "VerifiedKernelAfdoFile",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = PipelineError;

    fn from_str(s: &str) -> PipelineResult<Self> {
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PipelineError::unsupported(format!("Unknown artifact type '{}'", s)))
    }
}

/// Outcome of the prepare stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrepareResult {
    #[default]
    Unspecified,
    /// The artifact does not exist yet; build it
    Needed,
    /// Not implemented for this family
    Unknown,
    /// The artifact already exists; skip the build
    Pointless,
}

impl fmt::Display for PrepareResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "UNSPECIFIED"),
            Self::Needed => write!(f, "NEEDED"),
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Pointless => write!(f, "POINTLESS"),
        }
    }
}

/// Input artifact name under which upstream locations are supplied
pub mod inputs {
    pub const UNVERIFIED_ORDERING_FILE: &str = "UnverifiedOrderingFile";
    pub const UNVERIFIED_BENCHMARK_AFDO: &str = "UnverifiedChromeBenchmarkAfdoFile";
    pub const UNVERIFIED_CWP_AFDO: &str = "UnverifiedChromeCwpAfdoFile";
    pub const UNVERIFIED_KERNEL_AFDO: &str = "UnverifiedKernelCwpAfdoFile";
}

/// Locations of upstream artifacts, keyed by input artifact name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputArtifacts {
    locations: BTreeMap<String, Vec<String>>,
}

impl InputArtifacts {
    /// Create empty input set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a location for `name`
    pub fn with_location(mut self, name: impl Into<String>, location: impl Into<String>) -> Self {
        self.locations.entry(name.into()).or_default().push(location.into());
        self
    }

    /// Locations supplied for `name`, or `default` when none were
    pub fn locations(&self, name: &str, default: String) -> Vec<String> {
        match self.locations.get(name) {
            Some(locations) if !locations.is_empty() => locations.clone(),
            _ => vec![default],
        }
    }
}

/// Everything a handler may touch while running a stage
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub config: &'a PipelineConfig,
    pub store: &'a dyn RemoteStore,
    pub toolchain: Toolchain<'a>,
    pub chrome_root: Option<&'a Path>,
    pub build_target: Option<&'a BuildTarget>,
    pub inputs: &'a InputArtifacts,
    pub repo: Option<&'a dyn VersionedRepo>,
    pub now: DateTime<Utc>,
}

impl<'a> HandlerContext<'a> {
    pub fn chroot(&self) -> Option<&'a Chroot> {
        self.toolchain.chroot()
    }

    pub fn require_chroot(&self) -> PipelineResult<&'a Chroot> {
        self.chroot()
            .ok_or_else(|| PipelineError::unsupported("this stage must run with an SDK chroot"))
    }

    pub fn require_chrome_root(&self) -> PipelineResult<&'a Path> {
        self.chrome_root
            .ok_or_else(|| PipelineError::unsupported("this stage needs a Chrome source root"))
    }

    pub fn require_build_target(&self) -> PipelineResult<&'a BuildTarget> {
        self.build_target
            .ok_or_else(|| PipelineError::unsupported("this stage needs a build target"))
    }

    pub fn require_repo(&self) -> PipelineResult<&'a dyn VersionedRepo> {
        self.repo
            .ok_or_else(|| PipelineError::unsupported("publishing needs the toolchain-utils checkout"))
    }

    /// Descriptors of the configured overlay
    pub fn descriptors(&self) -> DescriptorSet {
        DescriptorSet::new(self.config.chrome.overlay.clone())
    }

    pub fn patcher(&self) -> DescriptorPatcher<'a> {
        DescriptorPatcher::new(self.toolchain).with_build_target(self.build_target)
    }

    /// Stable Chrome descriptor
    pub fn chrome_descriptor(&self) -> PipelineResult<Descriptor> {
        let chrome = &self.config.chrome;
        self.descriptors().stable(&chrome.category, &chrome.package)
    }

    /// Release branch of the Chrome being built
    pub fn chrome_branch(&self) -> PipelineResult<u32> {
        let descriptor = self.chrome_descriptor()?;
        descriptor.coordinate.branch().ok_or_else(|| {
            PipelineError::InvalidDescriptor(format!(
                "cannot derive a release branch from {}",
                descriptor.coordinate
            ))
        })
    }

    /// Full URL of the newest artifact in `location` for `branch`
    pub fn latest_url<K, F>(&self, location: &str, branch: u32, rank: F) -> PipelineResult<String>
    where
        K: Ord,
        F: Fn(&str) -> Option<K>,
    {
        let entries = self.store.list(location)?;
        find_latest(entries.iter().map(String::as_str), branch, rank)
            .map_err(|e| PipelineError::latest(location, e))
    }

    /// File name of the newest artifact in `location` for the Chrome branch
    ///
    /// Same search as [`Self::latest_url`], stripped to the last path segment.
    pub fn find_latest<K, F>(&self, location: &str, rank: F) -> PipelineResult<String>
    where
        K: Ord,
        F: Fn(&str) -> Option<K>,
    {
        let latest = self.latest_url(location, self.chrome_branch()?, rank)?;
        let name = basename(&latest).to_string();
        info!(location, %name, "latest artifact");
        Ok(name)
    }

    /// Search `locations` in order; returns the first hit and its location
    pub fn find_latest_in<K, F>(&self, locations: &[String], rank: F) -> PipelineResult<(String, String)>
    where
        K: Ord,
        F: Fn(&str) -> Option<K> + Copy,
    {
        let mut last_error = None;
        for location in locations {
            match self.find_latest(location, rank) {
                Ok(name) => return Ok((name, location.clone())),
                Err(err) if err.is_not_found() => {
                    warn!(location = %location, error = %err, "no eligible artifact");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::unsupported("no input locations to search")))
    }
}

/// Stage logic for one artifact family
pub trait ArtifactHandler: Send + Sync {
    /// Decide whether the build is needed; may patch descriptors
    fn prepare(&self, ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult>;

    /// Package build outputs into `output_dir`, returning the produced files
    fn bundle(&self, ctx: &HandlerContext<'_>, output_dir: &Path) -> PipelineResult<Vec<PathBuf>>;

    /// Upload bundled files to the unvetted tier, returning their URLs
    fn upload(&self, _ctx: &HandlerContext<'_>, _files: &[PathBuf]) -> PipelineResult<Vec<String>> {
        Err(PipelineError::unsupported("upload is not supported for this artifact"))
    }

    /// Promote the verified artifact; false when there was nothing new
    fn publish(&self, _ctx: &HandlerContext<'_>) -> PipelineResult<bool> {
        Err(PipelineError::unsupported("publishing is not supported for this artifact"))
    }
}

/// Artifact type to handler
pub struct HandlerRegistry {
    handlers: HashMap<ArtifactType, Box<dyn ArtifactHandler>>,
}

impl HandlerRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register (or replace) the handler for `artifact`
    pub fn register(&mut self, artifact: ArtifactType, handler: Box<dyn ArtifactHandler>) {
        self.handlers.insert(artifact, handler);
    }

    pub fn with_handler(mut self, artifact: ArtifactType, handler: Box<dyn ArtifactHandler>) -> Self {
        self.register(artifact, handler);
        self
    }

    pub fn get(&self, artifact: ArtifactType) -> PipelineResult<&dyn ArtifactHandler> {
        self.handlers
            .get(&artifact)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| PipelineError::unsupported(format!("No handler registered for {}", artifact)))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
            .with_handler(ArtifactType::UnverifiedOrderingFile, Box::new(UnverifiedOrderfileHandler))
            .with_handler(ArtifactType::VerifiedOrderingFile, Box::new(VerifiedOrderfileHandler))
            .with_handler(ArtifactType::ChromeClangWarningsFile, Box::new(ClangWarningsHandler))
            .with_handler(ArtifactType::UnverifiedLlvmPgoFile, Box::new(LlvmPgoHandler))
            .with_handler(ArtifactType::UnverifiedChromeAfdoFile, Box::new(UnverifiedChromeAfdoHandler))
            .with_handler(ArtifactType::VerifiedChromeAfdoFile, Box::new(VerifiedChromeAfdoHandler))
            .with_handler(ArtifactType::VerifiedKernelAfdoFile, Box::new(VerifiedKernelAfdoHandler))
    }
}

/// Copy every file under `from` into `to`, keeping relative paths
///
/// Existing files in `to` that are not part of the copy are left alone.
/// Returns the destination paths.
pub fn copy_dir_contents(from: &Path, to: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut copied = Vec::new();

    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            PipelineError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        fs::copy(entry.path(), &dest).map_err(|e| PipelineError::io(entry.path(), e))?;
        copied.push(dest);
    }

    Ok(copied)
}

/// File name component as UTF-8
pub(crate) fn file_name_of(path: &Path) -> PipelineResult<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::io(path, std::io::Error::from(std::io::ErrorKind::InvalidInput)))
}
