//! Clang-tidy warnings collected from a Chrome build

use super::{ArtifactHandler, HandlerContext, PrepareResult};
use crate::error::{PipelineError, PipelineResult};
use crate::tool::ToolInvocation;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Packages the clang-tidy warnings tarball; always built
pub struct ClangWarningsHandler;

impl ClangWarningsHandler {
    /// Tarball name, e.g. `eve.20191107.clang_tidy_warnings.tar.xz`
    pub fn tarball_name(ctx: &HandlerContext<'_>, target: &str) -> String {
        format!("{}.{}.clang_tidy_warnings.tar.xz", target, ctx.now.format("%Y%m%d"))
    }
}

impl ArtifactHandler for ClangWarningsHandler {
    fn prepare(&self, _ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        Ok(PrepareResult::Needed)
    }

    fn bundle(&self, ctx: &HandlerContext<'_>, output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        let chroot = ctx.require_chroot()?;
        let target = ctx.require_build_target()?;

        let tmp = chroot.tmp_dir();
        let work = tempfile::Builder::new()
            .prefix("clang-tidy")
            .tempdir_in(&tmp)
            .map_err(|e| PipelineError::io(&tmp, e))?;

        let tarball = Self::tarball_name(ctx, &target.name);
        ctx.toolchain.run(
            ToolInvocation::new("cros_generate_tidy_warnings")
                .arg("--out-file")
                .arg(tarball.as_str())
                .arg("--out-dir")
                .arg(ctx.toolchain.arg(work.path()))
                .arg("--board")
                .arg(target.name.as_str())
                .arg("--logs-dir")
                .arg(format!("/tmp/clang-tidy-logs/{}", target.name))
                .with_cwd(&chroot.path),
        )?;

        let generated = work.path().join(&tarball);
        let bundled = output_dir.join(&tarball);
        fs::copy(&generated, &bundled).map_err(|e| PipelineError::io(&generated, e))?;

        info!(path = %bundled.display(), "bundled clang-tidy warnings");
        Ok(vec![bundled])
    }
}
