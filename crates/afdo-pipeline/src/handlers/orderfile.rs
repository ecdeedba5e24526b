//! Linker ordering files
//!
//! An unverified orderfile is generated from a Chrome build's symbol table and
//! uploaded to the unvetted tier. Verification builds Chrome against the
//! newest unvetted orderfile and promotes it to the vetted tier.

use super::{
    copy_dir_contents, file_name_of, inputs, ArtifactHandler, HandlerContext, PrepareResult,
};
use crate::compress::compress_files;
use crate::descriptor::UpdateRules;
use crate::error::{PipelineError, PipelineResult};
use crate::publish::upload_if_absent;
use crate::tool::ToolInvocation;
use afdo_artifact::{
    rank_merged, ArtifactLocation, CompressionSuffix, CwpArch, MergedKind, MergedProfileName,
};
use afdo_config::join_url;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Release profile Chrome currently ships for silvermont, relative to the Chrome root
const NEWEST_PROFILE_FILE: &str = "src/chromeos/profiles/silvermont.afdo.newest.txt";
const ORDERFILE_SUFFIX: &str = ".orderfile";
const POST_PROCESS_SCRIPT: &str = "orderfile/post_process_orderfile.py";

const ORDERFILE_VARIABLE: &str = "UNVETTED_ORDERFILE";
const ORDERFILE_LOCATION_VARIABLE: &str = "UNVETTED_ORDERFILE_LOCATION";

/// Orderfile name for the Chrome checked out at `chrome_root`
///
/// Derived from the silvermont release profile Chrome records, re-labelled
/// under the `field` architecture.
pub fn orderfile_name(chrome_root: &Path) -> PipelineResult<MergedProfileName> {
    let path = chrome_root.join(NEWEST_PROFILE_FILE);
    let content = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;

    let recorded = MergedProfileName::parse(content.trim())?;
    Ok(recorded.relabel(MergedKind::Orderfile, CwpArch::Field))
}

fn not_found(path: &Path, what: &str) -> PipelineError {
    PipelineError::io(path, io::Error::new(io::ErrorKind::NotFound, what.to_string()))
}

/// Builds a new orderfile from the Chrome binary
pub struct UnverifiedOrderfileHandler;

impl ArtifactHandler for UnverifiedOrderfileHandler {
    fn prepare(&self, ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        let name = orderfile_name(ctx.require_chrome_root()?)?.to_string();

        let locations = ctx.inputs.locations(
            inputs::UNVERIFIED_ORDERING_FILE,
            ctx.config.storage.orderfile_unvetted.clone(),
        );
        let orderfile = ArtifactLocation::new(&locations[0], &name, CompressionSuffix::Xz);
        if ctx.store.exists(&orderfile.url())? {
            info!(%orderfile, "orderfile already exists");
            return Ok(PrepareResult::Pointless);
        }

        info!(%name, "no unverified orderfile found");
        Ok(PrepareResult::Needed)
    }

    fn bundle(&self, ctx: &HandlerContext<'_>, output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        let chroot = ctx.require_chroot()?;
        let target = ctx.require_build_target()?;
        let name = orderfile_name(ctx.require_chrome_root()?)?.to_string();
        let stem = name.strip_suffix(ORDERFILE_SUFFIX).unwrap_or(&name);

        let chrome_binary = PathBuf::from(format!(
            "/var/cache/chromeos-chrome/chrome-src-internal/src/out_{}/Release/chrome",
            target.name
        ));
        let input_orderfile = target.root.join("opt/google/chrome/chrome.orderfile.txt");

        if !chroot.full_path(&chrome_binary).exists() {
            return Err(not_found(&chroot.full_path(&chrome_binary), "Chrome binary missing in chroot"));
        }
        if !chroot.full_path(&input_orderfile).exists() {
            return Err(not_found(
                &chroot.full_path(&input_orderfile),
                "no orderfile generated by the build",
            ));
        }

        let tmp = chroot.tmp_dir();
        let work = tempfile::Builder::new()
            .prefix("orderfile")
            .tempdir_in(&tmp)
            .map_err(|e| PipelineError::io(&tmp, e))?;

        let symbols = work.path().join(format!("{}.nm", stem));
        ctx.toolchain.run(
            ToolInvocation::new("llvm-nm")
                .arg("-n")
                .arg(chrome_binary.display().to_string())
                .with_stdout(&symbols),
        )?;

        let orderfile = work.path().join(format!("{}{}", stem, ORDERFILE_SUFFIX));
        let script = ctx.config.toolchain.utils_path.join(POST_PROCESS_SCRIPT);
        ctx.toolchain.run(
            ToolInvocation::new(script.display().to_string())
                .arg("--chrome")
                .arg(ctx.toolchain.arg(&symbols))
                .arg("--input")
                .arg(input_orderfile.display().to_string())
                .arg("--output")
                .arg(ctx.toolchain.arg(&orderfile)),
        )?;

        let staging = work.path().join("out");
        fs::create_dir_all(&staging).map_err(|e| PipelineError::io(&staging, e))?;
        compress_files(
            ctx.toolchain.runner(),
            &[symbols, orderfile],
            &staging,
            CompressionSuffix::Xz,
        )?;

        let files = copy_dir_contents(&staging, output_dir)?;
        info!(count = files.len(), "bundled orderfile");
        Ok(files)
    }

    fn upload(&self, ctx: &HandlerContext<'_>, files: &[PathBuf]) -> PipelineResult<Vec<String>> {
        let mut uploaded = Vec::new();
        for file in files {
            let dest = ArtifactLocation::from_url(file_name_of(file)?)
                .with_root(&ctx.config.storage.orderfile_unvetted)
                .url();
            if upload_if_absent(ctx.store, &file.display().to_string(), &dest)?.is_some() {
                uploaded.push(dest);
            }
        }
        Ok(uploaded)
    }
}

/// Verifies the newest unvetted orderfile
pub struct VerifiedOrderfileHandler;

impl VerifiedOrderfileHandler {
    /// Unvetted orderfile the Chrome descriptor currently builds with
    fn verified_orderfile(ctx: &HandlerContext<'_>) -> PipelineResult<ArtifactLocation> {
        let name = ctx.chrome_descriptor()?.require_variable(ORDERFILE_VARIABLE)?;
        Ok(ArtifactLocation::new(
            &ctx.config.storage.orderfile_unvetted,
            name,
            CompressionSuffix::Xz,
        ))
    }
}

impl ArtifactHandler for VerifiedOrderfileHandler {
    fn prepare(&self, ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        let locations = ctx.inputs.locations(
            inputs::UNVERIFIED_ORDERING_FILE,
            ctx.config.storage.orderfile_unvetted.clone(),
        );
        // Only the first location's sibling is checked for a vetted copy.
        let vetted_root = match locations[0].trim_end_matches('/').rsplit_once('/') {
            Some((parent, _)) => join_url(parent, "vetted"),
            None => "vetted".to_string(),
        };

        let (name, location) = ctx.find_latest_in(&locations, rank_merged)?;
        let unvetted = ArtifactLocation::from_url(&join_url(&location, &name));

        let vetted = unvetted.with_root(vetted_root);
        if ctx.store.exists(&vetted.url())? {
            info!(%vetted, "pointless build: orderfile already verified");
            return Ok(PrepareResult::Pointless);
        }

        if ctx.chroot().is_some() {
            let descriptor = ctx.chrome_descriptor()?;
            let rules = UpdateRules::from([
                (ORDERFILE_VARIABLE.to_string(), unvetted.name),
                (ORDERFILE_LOCATION_VARIABLE.to_string(), unvetted.root),
            ]);
            ctx.patcher().patch(&descriptor, &rules, true)?;
        } else {
            info!("no chroot: not patching descriptor");
        }

        Ok(PrepareResult::Needed)
    }

    fn bundle(&self, ctx: &HandlerContext<'_>, output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        let chroot = ctx.require_chroot()?;
        let target = ctx.require_build_target()?;

        let name = Self::verified_orderfile(ctx)?.file_name();
        let installed = chroot.full_path(target.root.join("opt/google/chrome").join(&name));
        let bundled = output_dir.join(&name);

        fs::copy(&installed, &bundled).map_err(|e| PipelineError::io(&installed, e))?;
        Ok(vec![bundled])
    }

    fn publish(&self, ctx: &HandlerContext<'_>) -> PipelineResult<bool> {
        let unvetted = Self::verified_orderfile(ctx)?;
        let vetted = unvetted.with_root(&ctx.config.storage.orderfile_vetted);

        let uploaded = upload_if_absent(ctx.store, &unvetted.url(), &vetted.url())?;
        Ok(uploaded.is_some())
    }
}
