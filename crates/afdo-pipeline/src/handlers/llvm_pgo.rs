//! LLVM PGO profiles (not produced yet)

use super::{ArtifactHandler, HandlerContext, PrepareResult};
use crate::error::PipelineResult;
use std::path::{Path, PathBuf};

pub struct LlvmPgoHandler;

impl ArtifactHandler for LlvmPgoHandler {
    fn prepare(&self, _ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        Ok(PrepareResult::Unknown)
    }

    fn bundle(&self, _ctx: &HandlerContext<'_>, _output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}
