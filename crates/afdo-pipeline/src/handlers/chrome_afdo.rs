//! Chrome AFDO profiles
//!
//! Benchmark profiles are generated from perf data collected by hardware
//! tests. Verification merges the newest benchmark and CWP profiles into a
//! release profile, builds Chrome with it and uploads it to the release tier.

use super::{file_name_of, inputs, ArtifactHandler, HandlerContext, PrepareResult};
use crate::compress::{compress_files, decompress_file};
use crate::descriptor::UpdateRules;
use crate::error::{PipelineError, PipelineResult};
use crate::merge::{create_release_profile, ReleaseProfileSources};
use crate::poll::wait_for_artifact;
use crate::publish::upload_if_absent;
use crate::target::Chroot;
use crate::tool::ToolInvocation;
use afdo_artifact::{
    rank_benchmark, rank_cwp, ArtifactLocation, CompressionSuffix, CwpArch, PackageCoordinate,
};
use afdo_config::join_url;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

const CREATE_LLVM_PROF: &str = "/usr/bin/create_llvm_prof";
const UNSTRIPPED_NAME: &str = "chrome.unstripped";
const DEBUG_BINARY: &str = "usr/lib/debug/opt/google/chrome/chrome.debug";
const AFDO_FILE_VARIABLE: &str = "UNVETTED_AFDO_FILE";

/// `<package>-<arch>-<full version>`, e.g. `chromeos-chrome-amd64-77.0.3849.0_rc-r1`
fn versioned_name(arch: &str, coordinate: &PackageCoordinate) -> String {
    format!("{}-{}-{}", coordinate.package, arch, coordinate.full_version())
}

/// Benchmark profile built for this Chrome
pub fn benchmark_profile_name(arch: &str, coordinate: &PackageCoordinate) -> String {
    format!("{}.afdo", versioned_name(arch, coordinate))
}

/// Perf data for this Chrome; hardware tests only know the version without revision
pub fn perf_data_name(arch: &str, coordinate: &PackageCoordinate) -> String {
    format!("{}-{}-{}.perf.data", coordinate.package, arch, coordinate.version_no_rc())
}

fn symlink(target: &Path, link: &Path) -> PipelineResult<()> {
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link).map_err(|e| PipelineError::io(link, e))?;
    }
    std::os::unix::fs::symlink(target, link).map_err(|e| PipelineError::io(link, e))
}

/// Generates benchmark profiles from perf data
pub struct UnverifiedChromeAfdoHandler;

impl ArtifactHandler for UnverifiedChromeAfdoHandler {
    fn prepare(&self, ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        let coordinate = ctx.chrome_descriptor()?.coordinate;
        let profile = ArtifactLocation::new(
            &ctx.config.storage.benchmark_afdo,
            benchmark_profile_name(&ctx.config.chrome.arch, &coordinate),
            CompressionSuffix::Bz2,
        );
        if ctx.store.exists(&profile.url())? {
            info!(%profile, "benchmark profile already exists");
            return Ok(PrepareResult::Pointless);
        }

        info!(name = %profile.name, "benchmark profile needed");
        Ok(PrepareResult::Needed)
    }

    fn bundle(&self, ctx: &HandlerContext<'_>, output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        let chroot = ctx.require_chroot()?;
        let target = ctx.require_build_target()?;
        let arch = &ctx.config.chrome.arch;
        let coordinate = ctx.chrome_descriptor()?.coordinate;

        let perf_data = ArtifactLocation::new(
            &ctx.config.storage.benchmark_afdo,
            perf_data_name(arch, &coordinate),
            CompressionSuffix::Bz2,
        );
        let perf_url = perf_data.url();
        wait_for_artifact(ctx.store, &perf_url, ctx.config.poll.timeout(), ctx.config.poll.period())?;

        let tmp = chroot.tmp_dir();
        let perf_compressed = tmp.join(perf_data.file_name());
        ctx.store.copy(&perf_url, &perf_compressed.display().to_string())?;
        let perf = tmp.join(&perf_data.name);
        decompress_file(ctx.toolchain.runner(), &perf_compressed, &perf)?;
        info!(path = %perf.display(), "retrieved perf data");

        // create_llvm_prof requires the profiled binary to be named chrome.unstripped
        let debug_binary = target.root.join(DEBUG_BINARY);
        let unstripped = tmp.join(UNSTRIPPED_NAME);
        symlink(&debug_binary, &unstripped)?;

        let afdo_name = benchmark_profile_name(arch, &coordinate);
        let afdo = tmp.join(&afdo_name);
        ctx.toolchain.run(
            ToolInvocation::new(CREATE_LLVM_PROF)
                .arg(format!("--binary={}", ctx.toolchain.arg(&unstripped)))
                .arg(format!("--profile={}", ctx.toolchain.arg(&perf)))
                .arg(format!("--out={}", ctx.toolchain.arg(&afdo))),
        )?;
        info!(%afdo_name, "generated benchmark profile");

        compress_files(
            ctx.toolchain.runner(),
            &[chroot.full_path(&debug_binary), afdo],
            output_dir,
            CompressionSuffix::Bz2,
        )
    }

    fn upload(&self, ctx: &HandlerContext<'_>, files: &[PathBuf]) -> PipelineResult<Vec<String>> {
        let coordinate = ctx.chrome_descriptor()?.coordinate;
        let root = &ctx.config.storage.benchmark_afdo;
        let debug = ArtifactLocation::new(
            root,
            format!("{}.debug", versioned_name(&ctx.config.chrome.arch, &coordinate)),
            CompressionSuffix::Bz2,
        );

        let mut uploaded = Vec::new();
        for file in files {
            let file_name = file_name_of(file)?;
            let dest = if file_name.ends_with(".debug.bz2") {
                debug.url()
            } else {
                ArtifactLocation::from_url(file_name).with_root(root).url()
            };

            if upload_if_absent(ctx.store, &file.display().to_string(), &dest)?.is_some() {
                uploaded.push(dest);
            }
        }
        Ok(uploaded)
    }
}

/// Verifies a release profile merged from the newest benchmark and CWP profiles
pub struct VerifiedChromeAfdoHandler;

impl VerifiedChromeAfdoHandler {
    fn release_profile(ctx: &HandlerContext<'_>, chroot: &Chroot) -> PipelineResult<PathBuf> {
        let value = ctx.chrome_descriptor()?.require_variable(AFDO_FILE_VARIABLE)?;
        Ok(chroot.full_path(value))
    }
}

impl ArtifactHandler for VerifiedChromeAfdoHandler {
    fn prepare(&self, ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        let target = ctx.require_build_target()?;
        let arch: CwpArch = ctx.config.chrome_verifier_arch(&target.board)?.parse()?;
        let storage = &ctx.config.storage;

        let benchmark_locations = ctx
            .inputs
            .locations(inputs::UNVERIFIED_BENCHMARK_AFDO, storage.benchmark_afdo.clone());
        let (benchmark, benchmark_location) = ctx.find_latest_in(&benchmark_locations, rank_benchmark)?;

        let cwp_locations = ctx
            .inputs
            .locations(inputs::UNVERIFIED_CWP_AFDO, join_url(&storage.cwp_afdo, arch.as_str()));
        let (cwp, cwp_location) = ctx.find_latest_in(&cwp_locations, rank_cwp)?;

        let sources = ReleaseProfileSources {
            cwp_url: join_url(&cwp_location, &cwp),
            arch,
            benchmark_url: join_url(&benchmark_location, &benchmark),
        };
        let release_name = sources.release_name()?;

        let vetted = ArtifactLocation::new(storage.release_vetted(), release_name, CompressionSuffix::Xz);
        if ctx.store.exists(&vetted.url())? {
            info!(%vetted, "pointless build: release profile already verified");
            return Ok(PrepareResult::Pointless);
        }

        let Some(chroot) = ctx.chroot() else {
            info!("no chroot: not creating release profile");
            return Ok(PrepareResult::Needed);
        };

        let profile = create_release_profile(
            ctx.store,
            &ctx.toolchain,
            &sources,
            &ctx.config.merge,
            &chroot.tmp_dir(),
        )?;

        let rules = UpdateRules::from([(
            AFDO_FILE_VARIABLE.to_string(),
            chroot.chroot_path(&profile).display().to_string(),
        )]);
        let chrome = &ctx.config.chrome;
        ctx.descriptors()
            .update_descriptors(&ctx.patcher(), &chrome.category, &chrome.package, &rules)?;

        Ok(PrepareResult::Needed)
    }

    fn bundle(&self, ctx: &HandlerContext<'_>, output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        let chroot = ctx.require_chroot()?;
        let profile = Self::release_profile(ctx, chroot)?;
        compress_files(ctx.toolchain.runner(), &[profile], output_dir, CompressionSuffix::Xz)
    }

    fn publish(&self, ctx: &HandlerContext<'_>) -> PipelineResult<bool> {
        let chroot = ctx.require_chroot()?;
        let profile = Self::release_profile(ctx, chroot)?;

        let staging = tempfile::tempdir().map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
        let compressed = compress_files(
            ctx.toolchain.runner(),
            &[profile],
            staging.path(),
            CompressionSuffix::Xz,
        )?;
        let Some(compressed) = compressed.first() else {
            return Err(PipelineError::io(staging.path(), io::Error::from(io::ErrorKind::NotFound)));
        };

        let dest =
            ArtifactLocation::from_url(file_name_of(compressed)?).with_root(ctx.config.storage.release_vetted());
        let uploaded = upload_if_absent(ctx.store, &compressed.display().to_string(), &dest.url())?;
        Ok(uploaded.is_some())
    }
}
