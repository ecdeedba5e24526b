//! End-to-end stage tests for every artifact family
//!
//! Tools are recorded by [`RecordingRunner`], the store is a [`LocalStore`]
//! over a temporary directory and the ledger checkout is a [`FakeRepo`].

mod common;

use afdo_artifact::ProfileFamily;
use afdo_pipeline::handlers::inputs;
use afdo_pipeline::{
    ArtifactHandler, ArtifactType, HandlerContext, HandlerRegistry, InputArtifacts, PipelineError,
    PipelineResult, PrepareResult,
};
use common::{Fixture, DAY, NOW, RECORDED_KERNEL_PROFILE};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PREBUILT: &str = "gs://chromeos-prebuilt/afdo-job";
const ORDERFILE: &str =
    "chromeos-chrome-orderfile-field-77-3809.38-1562580965-benchmark-77.0.3849.0-r1.orderfile";
const BENCHMARK_PROFILE: &str = "chromeos-chrome-amd64-77.0.3849.0_rc-r1.afdo";
const CWP_PROFILE: &str = "R77-3809.38-1562580965.afdo.xz";
const RELEASE_PROFILE: &str =
    "chromeos-chrome-amd64-broadwell-77-3809.38-1562580965-benchmark-77.0.3849.0-r1-redacted.afdo";

fn url(path: &str) -> String {
    format!("{}/{}", PREBUILT, path)
}

fn kernel_profile(clock: i64) -> String {
    format!("R77-12371.11-{}", clock)
}

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn output_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("unrelated.txt"), "keep me").unwrap();
    dir
}

// ============================================================================
// Unverified orderfile
// ============================================================================

#[test]
fn test_unverified_orderfile_needed_when_absent() {
    let fixture = Fixture::new();
    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::UnverifiedOrderingFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Needed);
}

#[test]
fn test_unverified_orderfile_prepare_is_idempotent_when_present() {
    let fixture = Fixture::new();
    fixture.put(&url(&format!("orderfiles/unvetted/{}.xz", ORDERFILE)), "orderfile");
    let pipeline = fixture.pipeline();

    for _ in 0..2 {
        let result = pipeline
            .prepare_for_build(ArtifactType::UnverifiedOrderingFile, &InputArtifacts::new())
            .unwrap();
        assert_eq!(result, PrepareResult::Pointless);
    }

    assert!(fixture.runner.invocations().is_empty());
    assert_eq!(
        Fixture::descriptor_names(&fixture.chrome_dir()),
        vec![common::CHROME_DESCRIPTOR.to_string(), "chromeos-chrome-9999.ebuild".to_string()]
    );
}

#[test]
fn test_unverified_orderfile_prepare_honors_input_location() {
    let fixture = Fixture::new();
    fixture.put(&url(&format!("elsewhere/{}.xz", ORDERFILE)), "orderfile");
    let inputs = InputArtifacts::new().with_location(inputs::UNVERIFIED_ORDERING_FILE, url("elsewhere"));

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::UnverifiedOrderingFile, &inputs)
        .unwrap();
    assert_eq!(result, PrepareResult::Pointless);
}

#[test]
fn test_unverified_orderfile_prepare_needs_only_chrome_root() {
    let fixture = Fixture::new();
    fixture.put(&url(&format!("orderfiles/unvetted/{}.xz", ORDERFILE)), "orderfile");

    let result = fixture
        .pipeline_without_chroot()
        .with_chrome_root(fixture.chrome_root())
        .prepare_for_build(ArtifactType::UnverifiedOrderingFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Pointless);
}

#[test]
fn test_unverified_orderfile_prepare_without_chrome_root_is_unsupported() {
    let fixture = Fixture::new();
    let err = fixture
        .pipeline_without_chroot()
        .prepare_for_build(ArtifactType::UnverifiedOrderingFile, &InputArtifacts::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Unsupported(_)), "got {:?}", err);
}

#[test]
fn test_unverified_orderfile_bundle_and_upload() {
    let fixture = Fixture::new();
    let chroot = fixture.chroot_path();
    write_file(
        &chroot.join("var/cache/chromeos-chrome/chrome-src-internal/src/out_eve/Release/chrome"),
        "elf",
    );
    write_file(&chroot.join("build/eve/opt/google/chrome/chrome.orderfile.txt"), "symbols");
    let out = output_dir();
    let pipeline = fixture.pipeline();

    let files = pipeline
        .bundle_artifacts(ArtifactType::UnverifiedOrderingFile, out.path())
        .unwrap();

    let stem = ORDERFILE.trim_end_matches(".orderfile");
    assert_eq!(
        files,
        vec![
            out.path().join(format!("{}.nm.xz", stem)),
            out.path().join(format!("{}.xz", ORDERFILE)),
        ]
    );
    assert!(files.iter().all(|file| file.is_file()));
    assert_eq!(fs::read_to_string(out.path().join("unrelated.txt")).unwrap(), "keep me");

    let nm = fixture.runner.find("llvm-nm").unwrap();
    assert_eq!(
        nm.args,
        vec![
            "-n".to_string(),
            "/var/cache/chromeos-chrome/chrome-src-internal/src/out_eve/Release/chrome".to_string(),
        ]
    );
    assert!(nm.stdout.is_some());

    let uploaded = pipeline
        .upload_artifacts(ArtifactType::UnverifiedOrderingFile, &files)
        .unwrap();
    assert_eq!(
        uploaded,
        vec![
            url(&format!("orderfiles/unvetted/{}.nm.xz", stem)),
            url(&format!("orderfiles/unvetted/{}.xz", ORDERFILE)),
        ]
    );

    let again = pipeline
        .upload_artifacts(ArtifactType::UnverifiedOrderingFile, &files)
        .unwrap();
    assert!(again.is_empty());
}

#[test]
fn test_unverified_orderfile_bundle_requires_chrome_binary() {
    let fixture = Fixture::new();
    let out = output_dir();

    let err = fixture
        .pipeline()
        .bundle_artifacts(ArtifactType::UnverifiedOrderingFile, out.path())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
    assert!(fixture.runner.invocations().is_empty());
}

// ============================================================================
// Verified orderfile
// ============================================================================

const OLDER_ORDERFILE: &str =
    "chromeos-chrome-orderfile-field-77-3809.38-1562580965-benchmark-77.0.3849.0-r1.orderfile.xz";
const NEWER_ORDERFILE: &str =
    "chromeos-chrome-orderfile-field-77-3809.38-1562580965-benchmark-77.0.3850.0-r1.orderfile.xz";

fn put_unvetted_orderfiles(fixture: &Fixture) {
    for name in [OLDER_ORDERFILE, NEWER_ORDERFILE] {
        fixture.put(&url(&format!("orderfiles/unvetted/{}", name)), name);
    }
    fixture.put(&url("orderfiles/unvetted/latest-chromeos-chrome-orderfile.xz"), "pointer");
}

#[test]
fn test_verified_orderfile_prepare_patches_stable_descriptor() {
    let fixture = Fixture::new();
    put_unvetted_orderfiles(&fixture);

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedOrderingFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Needed);

    let stable = fixture.chrome_dir().join("chromeos-chrome-77.0.3849.0_rc-r2.ebuild");
    let content = fs::read_to_string(&stable).unwrap();
    assert!(content.contains(&format!(
        "UNVETTED_ORDERFILE=\"{}\"",
        NEWER_ORDERFILE.trim_end_matches(".xz")
    )));
    assert!(content.contains(&format!("UNVETTED_ORDERFILE_LOCATION=\"{}\"", url("orderfiles/unvetted"))));

    // The unpinned descriptor is not part of orderfile verification.
    assert_eq!(
        fs::read_to_string(fixture.chrome_dir().join("chromeos-chrome-9999.ebuild")).unwrap(),
        common::chrome_descriptor_content()
    );
    assert_eq!(fixture.runner.programs(), vec!["ebuild-eve"]);
}

#[test]
fn test_verified_orderfile_pointless_when_vetted() {
    let fixture = Fixture::new();
    put_unvetted_orderfiles(&fixture);
    fixture.put(&url(&format!("orderfiles/vetted/{}", NEWER_ORDERFILE)), "vetted");

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedOrderingFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Pointless);
    assert!(fixture.chrome_dir().join(common::CHROME_DESCRIPTOR).exists());
    assert!(fixture.runner.invocations().is_empty());
}

#[test]
fn test_verified_orderfile_without_candidates_is_not_found() {
    let fixture = Fixture::new();

    let err = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedOrderingFile, &InputArtifacts::new())
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_verified_orderfile_without_chroot_skips_patch() {
    let fixture = Fixture::new();
    put_unvetted_orderfiles(&fixture);

    let result = fixture
        .pipeline_without_chroot()
        .prepare_for_build(ArtifactType::VerifiedOrderingFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Needed);
    assert!(fixture.chrome_dir().join(common::CHROME_DESCRIPTOR).exists());
}

#[test]
fn test_verified_orderfile_bundle_and_publish() {
    let fixture = Fixture::new();
    put_unvetted_orderfiles(&fixture);
    let pipeline = fixture.pipeline();
    pipeline
        .prepare_for_build(ArtifactType::VerifiedOrderingFile, &InputArtifacts::new())
        .unwrap();

    write_file(
        &fixture.chroot_path().join("build/eve/opt/google/chrome").join(NEWER_ORDERFILE),
        "installed",
    );
    let out = output_dir();
    let files = pipeline
        .bundle_artifacts(ArtifactType::VerifiedOrderingFile, out.path())
        .unwrap();
    assert_eq!(files, vec![out.path().join(NEWER_ORDERFILE)]);

    assert!(pipeline.upload_and_publish_vetted(ArtifactType::VerifiedOrderingFile).unwrap());
    assert!(fixture.exists(&url(&format!("orderfiles/vetted/{}", NEWER_ORDERFILE))));
    assert!(!pipeline.upload_and_publish_vetted(ArtifactType::VerifiedOrderingFile).unwrap());
}

// ============================================================================
// Kernel AFDO
// ============================================================================

fn put_kernel_profile(fixture: &Fixture, clock: i64) -> String {
    let name = kernel_profile(clock);
    fixture.put(&url(&format!("cwp/kernel/4.4/{}.gcov.xz", name)), "gcov");
    name
}

#[test]
fn test_kernel_prepare_patches_both_descriptors() {
    let fixture = Fixture::new();
    put_kernel_profile(&fixture, NOW - 10 * DAY);
    let fresh = put_kernel_profile(&fixture, NOW - 3 * DAY);

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedKernelAfdoFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Needed);

    assert_eq!(
        Fixture::descriptor_names(&fixture.kernel_dir()),
        vec![
            "chromeos-kernel-4_4-4.4.190-r3.ebuild".to_string(),
            "chromeos-kernel-4_4-9999.ebuild".to_string(),
        ]
    );
    for file in ["chromeos-kernel-4_4-4.4.190-r3.ebuild", "chromeos-kernel-4_4-9999.ebuild"] {
        let content = fs::read_to_string(fixture.kernel_dir().join(file)).unwrap();
        assert!(content.contains(&format!("AFDO_PROFILE_VERSION=\"{}\"", fresh)));
    }
    assert_eq!(fixture.runner.programs(), vec!["ebuild-eve", "ebuild-eve"]);
}

#[test]
fn test_kernel_prepare_skips_expired_profile() {
    let fixture = Fixture::new();
    put_kernel_profile(&fixture, NOW - 60 * DAY);

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedKernelAfdoFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Pointless);
    assert!(fixture.kernel_dir().join(common::KERNEL_DESCRIPTOR).exists());
    assert!(fixture.runner.invocations().is_empty());
}

#[test]
fn test_kernel_prepare_warns_but_proceeds_on_aging_profile() {
    let fixture = Fixture::new();
    put_kernel_profile(&fixture, NOW - 20 * DAY);

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedKernelAfdoFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Needed);
}

#[test]
fn test_kernel_prepare_pointless_when_vetted() {
    let fixture = Fixture::new();
    let name = put_kernel_profile(&fixture, NOW - 3 * DAY);
    fixture.put(&url(&format!("vetted/kernel/4.4/{}.gcov.xz", name)), "gcov");

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedKernelAfdoFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Pointless);
    assert!(fixture.runner.invocations().is_empty());
}

#[test]
fn test_kernel_prepare_rejects_unknown_board() {
    let fixture = Fixture::new();
    let pipeline = afdo_pipeline::Pipeline::new(
        fixture.config.clone(),
        fixture.store.clone(),
        fixture.runner.clone(),
    )
    .with_build_target(afdo_pipeline::BuildTarget::new("zork"));

    let err = pipeline
        .prepare_for_build(ArtifactType::VerifiedKernelAfdoFile, &InputArtifacts::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn test_kernel_publish_promotes_and_updates_ledger() {
    let fixture = Fixture::new();
    let fresh = put_kernel_profile(&fixture, NOW - 3 * DAY);
    let pipeline = fixture.pipeline();
    pipeline
        .prepare_for_build(ArtifactType::VerifiedKernelAfdoFile, &InputArtifacts::new())
        .unwrap();

    let out = output_dir();
    assert!(pipeline
        .bundle_artifacts(ArtifactType::VerifiedKernelAfdoFile, out.path())
        .unwrap()
        .is_empty());

    assert!(pipeline.upload_and_publish_vetted(ArtifactType::VerifiedKernelAfdoFile).unwrap());
    assert!(fixture.exists(&url(&format!("vetted/kernel/4.4/{}.gcov.xz", fresh))));

    let ledger = fs::read_to_string(fixture.ledger_path()).unwrap();
    assert!(ledger.contains(&fresh));
    assert!(!ledger.contains(RECORDED_KERNEL_PROFILE));

    let calls = fixture.repo.calls();
    let commit = calls.iter().find(|call| call.starts_with("commit ")).unwrap();
    assert!(commit.starts_with("commit afdo_metadata: Publish new profiles for kernel 4.4.\n\n"));
    assert!(calls.last().unwrap().starts_with("push "));

    assert!(!pipeline.upload_and_publish_vetted(ArtifactType::VerifiedKernelAfdoFile).unwrap());
}

#[test]
fn test_kernel_publish_rejects_older_profile() {
    let fixture = Fixture::new();
    put_kernel_profile(&fixture, 1_564_000_000);
    let pipeline = afdo_pipeline::Pipeline::new(
        fixture.config.clone(),
        fixture.store.clone(),
        fixture.runner.clone(),
    )
    .with_repo(fixture.repo.clone())
    .with_chroot(fixture.chroot())
    .with_build_target(afdo_pipeline::BuildTarget::new("eve"))
    .with_now(chrono::DateTime::from_timestamp(1_564_000_000 + DAY, 0).unwrap());

    pipeline
        .prepare_for_build(ArtifactType::VerifiedKernelAfdoFile, &InputArtifacts::new())
        .unwrap();
    let err = pipeline
        .upload_and_publish_vetted(ArtifactType::VerifiedKernelAfdoFile)
        .unwrap_err();
    assert!(matches!(err, PipelineError::StaleArtifact { .. }));
    assert_eq!(fs::read_to_string(fixture.ledger_path()).unwrap(), common::ledger_content());
}

// ============================================================================
// Clang-tidy warnings and LLVM PGO
// ============================================================================

#[test]
fn test_clang_tidy_always_needed_and_bundled_with_date() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();
    assert_eq!(
        pipeline
            .prepare_for_build(ArtifactType::ChromeClangWarningsFile, &InputArtifacts::new())
            .unwrap(),
        PrepareResult::Needed
    );

    let out = output_dir();
    let files = pipeline
        .bundle_artifacts(ArtifactType::ChromeClangWarningsFile, out.path())
        .unwrap();
    assert_eq!(files, vec![out.path().join("eve.20191002.clang_tidy_warnings.tar.xz")]);
    assert!(files[0].is_file());
    assert!(out.path().join("unrelated.txt").is_file());

    let generate = fixture.runner.find("cros_generate_tidy_warnings").unwrap();
    assert_eq!(generate.cwd, Some(fixture.chroot_path()));
    assert!(generate.args.windows(2).any(|pair| pair == ["--board", "eve"]));
    assert!(generate
        .args
        .windows(2)
        .any(|pair| pair == ["--logs-dir", "/tmp/clang-tidy-logs/eve"]));
}

#[test]
fn test_llvm_pgo_is_unknown() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();

    assert_eq!(
        pipeline
            .prepare_for_build(ArtifactType::UnverifiedLlvmPgoFile, &InputArtifacts::new())
            .unwrap(),
        PrepareResult::Unknown
    );
    let out = output_dir();
    assert!(pipeline
        .bundle_artifacts(ArtifactType::UnverifiedLlvmPgoFile, out.path())
        .unwrap()
        .is_empty());
}

// ============================================================================
// Chrome AFDO
// ============================================================================

#[test]
fn test_unverified_chrome_afdo_pointless_when_profile_exists() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline_without_chroot();
    assert_eq!(
        pipeline
            .prepare_for_build(ArtifactType::UnverifiedChromeAfdoFile, &InputArtifacts::new())
            .unwrap(),
        PrepareResult::Needed
    );

    fixture.put(&url(&format!("llvm/{}.bz2", BENCHMARK_PROFILE)), "profile");
    assert_eq!(
        pipeline
            .prepare_for_build(ArtifactType::UnverifiedChromeAfdoFile, &InputArtifacts::new())
            .unwrap(),
        PrepareResult::Pointless
    );
}

#[test]
fn test_unverified_chrome_afdo_bundle_times_out_without_perf_data() {
    let fixture = Fixture::new();
    let out = output_dir();

    let err = fixture
        .pipeline()
        .bundle_artifacts(ArtifactType::UnverifiedChromeAfdoFile, out.path())
        .unwrap_err();
    assert!(err.is_not_ready());
}

#[test]
fn test_unverified_chrome_afdo_bundle_and_upload() {
    let fixture = Fixture::new();
    fixture.put(&url("llvm/chromeos-chrome-amd64-77.0.3849.0.perf.data.bz2"), "perf");
    write_file(
        &fixture
            .chroot_path()
            .join("build/eve/usr/lib/debug/opt/google/chrome/chrome.debug"),
        "debug",
    );
    let out = output_dir();
    let pipeline = fixture.pipeline();

    let files = pipeline
        .bundle_artifacts(ArtifactType::UnverifiedChromeAfdoFile, out.path())
        .unwrap();
    assert_eq!(
        files,
        vec![
            out.path().join("chrome.debug.bz2"),
            out.path().join(format!("{}.bz2", BENCHMARK_PROFILE)),
        ]
    );

    let tmp = fixture.chroot_path().join("tmp");
    let create = fixture.runner.find("/usr/bin/create_llvm_prof").unwrap();
    assert_eq!(
        create.args,
        vec![
            format!("--binary={}", tmp.join("chrome.unstripped").display()),
            format!("--profile={}", tmp.join("chromeos-chrome-amd64-77.0.3849.0.perf.data").display()),
            format!("--out={}", tmp.join(BENCHMARK_PROFILE).display()),
        ]
    );
    assert_eq!(
        fs::read_link(tmp.join("chrome.unstripped")).unwrap(),
        PathBuf::from("/build/eve/usr/lib/debug/opt/google/chrome/chrome.debug")
    );

    let uploaded = pipeline
        .upload_artifacts(ArtifactType::UnverifiedChromeAfdoFile, &files)
        .unwrap();
    assert_eq!(
        uploaded,
        vec![
            url("llvm/chromeos-chrome-amd64-77.0.3849.0_rc-r1.debug.bz2"),
            url(&format!("llvm/{}.bz2", BENCHMARK_PROFILE)),
        ]
    );
}

fn put_merge_sources(fixture: &Fixture) {
    fixture.put(&url(&format!("llvm/{}.bz2", BENCHMARK_PROFILE)), "benchmark");
    fixture.put(
        &url("llvm/chromeos-chrome-amd64-77.0.3849.0_rc-r1-merged.afdo.bz2"),
        "merged",
    );
    fixture.put(&url(&format!("cwp/chrome/broadwell/{}", CWP_PROFILE)), "cwp");
}

#[test]
fn test_verified_chrome_afdo_prepare_creates_release_profile() {
    let fixture = Fixture::new();
    put_merge_sources(&fixture);

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedChromeAfdoFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Needed);

    let profile = fixture.chroot_path().join("tmp").join(RELEASE_PROFILE);
    assert!(profile.is_file());

    let expected = format!("UNVETTED_AFDO_FILE=\"/tmp/{}\"", RELEASE_PROFILE);
    for file in ["chromeos-chrome-77.0.3849.0_rc-r2.ebuild", "chromeos-chrome-9999.ebuild"] {
        let content = fs::read_to_string(fixture.chrome_dir().join(file)).unwrap();
        assert!(content.contains(&expected), "{} lacks the release profile", file);
    }

    let merge = fixture
        .runner
        .invocations()
        .into_iter()
        .find(|inv| inv.args.iter().any(|arg| arg.starts_with("-weighted-input=")))
        .unwrap();
    assert!(merge.args.iter().any(|arg| arg.starts_with("-weighted-input=75,")));
    assert!(merge.args.iter().any(|arg| arg.starts_with("-weighted-input=25,")));
}

#[test]
fn test_verified_chrome_afdo_pointless_when_vetted() {
    let fixture = Fixture::new();
    put_merge_sources(&fixture);
    fixture.put(&url(&format!("vetted/release/{}.xz", RELEASE_PROFILE)), "vetted");

    let result = fixture
        .pipeline()
        .prepare_for_build(ArtifactType::VerifiedChromeAfdoFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Pointless);
    assert!(fixture.runner.invocations().is_empty());
}

#[test]
fn test_verified_chrome_afdo_bundle_and_publish() {
    let fixture = Fixture::new();
    put_merge_sources(&fixture);
    let pipeline = fixture.pipeline();
    pipeline
        .prepare_for_build(ArtifactType::VerifiedChromeAfdoFile, &InputArtifacts::new())
        .unwrap();

    let out = output_dir();
    let files = pipeline
        .bundle_artifacts(ArtifactType::VerifiedChromeAfdoFile, out.path())
        .unwrap();
    assert_eq!(files, vec![out.path().join(format!("{}.xz", RELEASE_PROFILE))]);

    assert!(pipeline.upload_and_publish_vetted(ArtifactType::VerifiedChromeAfdoFile).unwrap());
    assert!(fixture.exists(&url(&format!("vetted/release/{}.xz", RELEASE_PROFILE))));
    assert!(!pipeline.upload_and_publish_vetted(ArtifactType::VerifiedChromeAfdoFile).unwrap());
}

// ============================================================================
// Dispatch
// ============================================================================

struct AlwaysNeeded;

impl ArtifactHandler for AlwaysNeeded {
    fn prepare(&self, _ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        Ok(PrepareResult::Needed)
    }

    fn bundle(&self, _ctx: &HandlerContext<'_>, _output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_registered_handler_is_dispatched() {
    let fixture = Fixture::new();
    let registry = HandlerRegistry::new().with_handler(ArtifactType::UnverifiedLlvmPgoFile, Box::new(AlwaysNeeded));
    let pipeline = fixture.pipeline().with_registry(registry);

    assert_eq!(
        pipeline
            .prepare_for_build(ArtifactType::UnverifiedLlvmPgoFile, &InputArtifacts::new())
            .unwrap(),
        PrepareResult::Needed
    );
    assert!(matches!(
        pipeline.prepare_for_build(ArtifactType::VerifiedKernelAfdoFile, &InputArtifacts::new()),
        Err(PipelineError::Unsupported(_))
    ));
}

#[test]
fn test_unsupported_stages() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();

    assert!(matches!(
        pipeline.upload_and_publish_vetted(ArtifactType::ChromeClangWarningsFile),
        Err(PipelineError::Unsupported(_))
    ));
    assert!(matches!(
        pipeline.upload_artifacts(ArtifactType::VerifiedKernelAfdoFile, &[]),
        Err(PipelineError::Unsupported(_))
    ));
}

#[test]
fn test_bundle_requires_existing_output_dir() {
    let fixture = Fixture::new();
    let missing = fixture.path().join("no-such-dir");

    let err = fixture
        .pipeline()
        .bundle_artifacts(ArtifactType::UnverifiedLlvmPgoFile, &missing)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
}

#[test]
fn test_latest_artifact_defaults_to_chrome_branch() {
    let fixture = Fixture::new();
    put_merge_sources(&fixture);
    fixture.put(&url("llvm/chromeos-chrome-amd64-76.0.3800.0_rc-r1.afdo.bz2"), "old branch");
    let pipeline = fixture.pipeline();

    let latest = pipeline
        .latest_artifact(&url("llvm"), ProfileFamily::Benchmark, None)
        .unwrap();
    assert_eq!(latest, url(&format!("llvm/{}.bz2", BENCHMARK_PROFILE)));

    let err = pipeline
        .latest_artifact(&url("llvm"), ProfileFamily::Benchmark, Some(80))
        .unwrap_err();
    assert!(err.is_not_found());
}

/// Needed only when the handler-side search yields `expected`
struct LatestNameHandler {
    location: String,
    expected: String,
}

impl ArtifactHandler for LatestNameHandler {
    fn prepare(&self, ctx: &HandlerContext<'_>) -> PipelineResult<PrepareResult> {
        let name = ctx.find_latest(&self.location, afdo_artifact::rank_benchmark)?;
        Ok(if name == self.expected {
            PrepareResult::Needed
        } else {
            PrepareResult::Pointless
        })
    }

    fn bundle(&self, _ctx: &HandlerContext<'_>, _output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_find_latest_is_file_name_of_latest_artifact() {
    let fixture = Fixture::new();
    put_merge_sources(&fixture);
    let location = url("llvm");

    let latest = fixture
        .pipeline()
        .latest_artifact(&location, ProfileFamily::Benchmark, None)
        .unwrap();
    let expected = latest.rsplit('/').next().unwrap().to_string();
    assert_eq!(expected, format!("{}.bz2", BENCHMARK_PROFILE));

    let handler = LatestNameHandler { location, expected };
    let registry = HandlerRegistry::new().with_handler(ArtifactType::UnverifiedLlvmPgoFile, Box::new(handler));
    let result = fixture
        .pipeline()
        .with_registry(registry)
        .prepare_for_build(ArtifactType::UnverifiedLlvmPgoFile, &InputArtifacts::new())
        .unwrap();
    assert_eq!(result, PrepareResult::Needed);
}
