//! Toolchain profile artifact pipeline
//!
//! Orchestrates the lifecycle of AFDO profiles and orderfiles:
//! - Prepare: decide whether a build is needed, patching descriptors
//! - Bundle: package build outputs
//! - Upload: store new artifacts in the unvetted tier
//! - Publish: promote verified artifacts and update the version ledger
//!
//! External tools, the object store and the ledger checkout are reached
//! through the [`ToolRunner`], [`RemoteStore`] and [`VersionedRepo`] traits.

pub mod compress;
pub mod descriptor;
pub mod error;
pub mod handlers;
pub mod merge;
pub mod pipeline;
pub mod poll;
pub mod publish;
pub mod repo;
pub mod store;
pub mod target;
pub mod tool;

pub use descriptor::{Descriptor, DescriptorPatcher, DescriptorSet, UpdateRules};
pub use error::{PipelineError, PipelineResult};
pub use handlers::{
    ArtifactHandler, ArtifactType, HandlerContext, HandlerRegistry, InputArtifacts, PrepareResult,
};
pub use merge::{create_release_profile, merge_weighted, redact, ReleaseProfileSources};
pub use pipeline::Pipeline;
pub use poll::wait_for_artifact;
pub use publish::{publish_ledger, upload_if_absent, PublishedArtifacts};
pub use repo::{GitRepo, VersionedRepo};
pub use store::{GsutilStore, LocalStore, RemoteStore};
pub use target::{BuildTarget, Chroot, Toolchain};
pub use tool::{ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
