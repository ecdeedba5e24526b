//! Kernel AFDO profiles
//!
//! Kernel profiles come from CWP per kernel version. Verification patches the
//! kernel descriptor with the newest fresh profile; publication promotes it
//! and records it in the kernel ledger.

use super::{inputs, ArtifactHandler, HandlerContext, PrepareResult};
use crate::descriptor::UpdateRules;
use crate::error::PipelineResult;
use crate::publish::{publish_ledger, upload_if_absent, PublishedArtifacts};
use afdo_artifact::{rank_cwp, ArtifactLocation, CompressionSuffix, CwpProfileVersion};
use afdo_config::join_url;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const KERNEL_CATEGORY: &str = "sys-kernel";
const PROFILE_VERSION_VARIABLE: &str = "AFDO_PROFILE_VERSION";
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Kernel package for a kernel version, e.g. `4.4` -> `chromeos-kernel-4_4`
pub fn kernel_package(version: &str) -> String {
    format!("chromeos-kernel-{}", version.replace('.', "_"))
}

/// Whole days between the profile's collection clock and `now`
pub fn profile_age_days(profile: &CwpProfileVersion, now: DateTime<Utc>) -> i64 {
    let clock = i64::try_from(profile.clock).unwrap_or(i64::MAX);
    (now.timestamp() - clock) / SECONDS_PER_DAY
}

/// Verifies and publishes kernel profiles
pub struct VerifiedKernelAfdoHandler;

impl ArtifactHandler for VerifiedKernelAfdoHandler {
    fn prepare(&self, ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        let target = ctx.require_build_target()?;
        let version = ctx.config.kernel_verifier_version(&target.board)?;
        let storage = &ctx.config.storage;

        let locations = ctx.inputs.locations(
            inputs::UNVERIFIED_KERNEL_AFDO,
            join_url(&storage.kernel_profile, version),
        );
        let (name, location) = ctx.find_latest_in(&locations, rank_cwp)?;
        let unvetted = ArtifactLocation::from_url(&join_url(&location, &name));

        let vetted = unvetted.with_root(join_url(&storage.kernel_vetted(), version));
        if ctx.store.exists(&vetted.url())? {
            info!(%vetted, "pointless build: kernel profile already verified");
            return Ok(PrepareResult::Pointless);
        }

        let profile = CwpProfileVersion::parse(&name)?;
        let in_descriptor = unvetted.name;
        let age = profile_age_days(&profile, ctx.now);
        let kernel = &ctx.config.kernel;
        if age > kernel.allowed_stale_days {
            warn!(kernel = version, profile = %in_descriptor, age, "kernel profile expired, skipping");
            return Ok(PrepareResult::Pointless);
        }
        if age > kernel.warn_stale_days {
            warn!(
                kernel = version,
                profile = %in_descriptor,
                age,
                expires_in = kernel.allowed_stale_days - age,
                "kernel profile is getting stale"
            );
        }

        if ctx.chroot().is_some() {
            let rules = UpdateRules::from([(PROFILE_VERSION_VARIABLE.to_string(), in_descriptor)]);
            ctx.descriptors()
                .update_descriptors(&ctx.patcher(), KERNEL_CATEGORY, &kernel_package(version), &rules)?;
        } else {
            info!("no chroot: not patching descriptor");
        }

        Ok(PrepareResult::Needed)
    }

    fn bundle(&self, _ctx: &HandlerContext<'_>, _output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn publish(&self, ctx: &HandlerContext<'_>) -> PipelineResult<bool> {
        let target = ctx.require_build_target()?;
        let version = ctx.config.kernel_verifier_version(&target.board)?;
        let package = kernel_package(version);
        let storage = &ctx.config.storage;

        let artifact = ctx
            .descriptors()
            .stable(KERNEL_CATEGORY, &package)?
            .require_variable(PROFILE_VERSION_VARIABLE)?;
        let unvetted = ArtifactLocation::new(
            join_url(&storage.kernel_profile, version),
            artifact,
            CompressionSuffix::GcovXz,
        );
        let vetted = unvetted.with_root(join_url(&storage.kernel_vetted(), version));

        let uploaded = upload_if_absent(ctx.store, &unvetted.url(), &vetted.url())?;
        if uploaded.is_none() {
            info!(%package, "nothing new to publish");
            return Ok(false);
        }

        let title = format!("afdo_metadata: Publish new profiles for kernel {}.", version);
        let updates = PublishedArtifacts::from([(package, uploaded)]);
        publish_ledger(
            ctx.require_repo()?,
            &ctx.config.toolchain,
            &ctx.config.toolchain.kernel_ledger_path(),
            &updates,
            Some(&title),
        )?;
        Ok(true)
    }
}
