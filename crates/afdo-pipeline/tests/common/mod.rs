//! Shared fixtures for pipeline integration tests
#![allow(dead_code)]

use afdo_config::PipelineConfig;
use afdo_pipeline::{
    BuildTarget, Chroot, LocalStore, Pipeline, PipelineResult, RemoteStore, ToolInvocation,
    ToolOutput, ToolRunner, VersionedRepo,
};
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const NOW: i64 = 1_570_000_000;
pub const DAY: i64 = 24 * 60 * 60;

pub const CHROME_DESCRIPTOR: &str = "chromeos-chrome-77.0.3849.0_rc-r1.ebuild";
pub const KERNEL_DESCRIPTOR: &str = "chromeos-kernel-4_4-4.4.190-r2.ebuild";
pub const RECORDED_KERNEL_PROFILE: &str = "R77-12371.0-1565000000";
pub const NEWEST_RELEASE_PROFILE: &str =
    "chromeos-chrome-amd64-silvermont-77-3809.38-1562580965-benchmark-77.0.3849.0-r1-redacted.afdo.xz";

pub fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(NOW, 0).unwrap()
}

pub fn chrome_descriptor_content() -> String {
    r#"EAPI=7
UNVETTED_ORDERFILE="chromeos-chrome-orderfile-field-76-3700.1-1560000000-benchmark-76.0.3800.0-r1"
UNVETTED_ORDERFILE_LOCATION=""
UNVETTED_AFDO_FILE=""
inherit chromium-source
"#
    .to_string()
}

pub fn kernel_descriptor_content() -> String {
    format!(
        "EAPI=7\nAFDO_PROFILE_VERSION=\"{}\"\ninherit cros-kernel2\n",
        RECORDED_KERNEL_PROFILE
    )
}

pub fn ledger_content() -> String {
    format!(
        "{{\n    \"chromeos-kernel-4_4\": {{\n        \"name\": \"{}\"\n    }},\n    \"benchmark\": {{\n        \"name\": \"chromeos-chrome-amd64-77.0.3849.0_rc-r1.afdo\"\n    }}\n}}\n",
        RECORDED_KERNEL_PROFILE
    )
}

// ============================================================================
// Fakes
// ============================================================================

/// Records invocations and fakes the files tools would write
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<ToolInvocation>>,
    failing: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner on which `program` exits with status 1
    pub fn failing(program: &str) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            failing: Some(program.to_string()),
        }
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations().into_iter().map(|inv| inv.program).collect()
    }

    pub fn find(&self, program: &str) -> Option<ToolInvocation> {
        self.invocations().into_iter().find(|inv| inv.program == program)
    }
}

fn written_outputs(invocation: &ToolInvocation) -> Vec<PathBuf> {
    let mut outputs = Vec::new();
    let mut out_file = None;
    let mut out_dir = None;

    let mut args = invocation.args.iter();
    while let Some(arg) = args.next() {
        if let Some(path) = arg.strip_prefix("--out=").or_else(|| arg.strip_prefix("-output=")) {
            outputs.push(PathBuf::from(path));
        } else if arg == "--output" || arg == "-output" {
            outputs.extend(args.next().map(PathBuf::from));
        } else if arg == "--out-file" {
            out_file = args.next().cloned();
        } else if arg == "--out-dir" {
            out_dir = args.next().cloned();
        }
    }
    if let (Some(file), Some(dir)) = (out_file, out_dir) {
        outputs.push(Path::new(&dir).join(file));
    }
    outputs.extend(invocation.stdout.clone());
    outputs
}

impl ToolRunner for RecordingRunner {
    fn run(&self, invocation: &ToolInvocation) -> PipelineResult<ToolOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());

        if self.failing.as_deref() == Some(invocation.program.as_str()) {
            return Ok(ToolOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "simulated failure".to_string(),
            });
        }

        for output in written_outputs(invocation) {
            if output.parent().is_some_and(Path::is_dir) {
                fs::write(&output, format!("{} output\n", invocation.program)).unwrap();
            }
        }
        Ok(ToolOutput::ok(""))
    }
}

/// In-memory ledger checkout
pub struct FakeRepo {
    calls: Mutex<Vec<String>>,
    status: String,
}

impl FakeRepo {
    /// Checkout reporting a modified ledger
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status: " M afdo_metadata/kernel_afdo.json\n".to_string(),
        }
    }

    /// Checkout that never shows modifications
    pub fn clean() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status: String::new(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl VersionedRepo for FakeRepo {
    fn pull(&self, remote: &str, refspec: &str) -> PipelineResult<()> {
        self.record(format!("pull {} {}", remote, refspec));
        Ok(())
    }

    fn status(&self) -> PipelineResult<String> {
        self.record("status".to_string());
        Ok(self.status.clone())
    }

    fn diff(&self) -> PipelineResult<String> {
        self.record("diff".to_string());
        Ok(String::new())
    }

    fn commit_all(&self, message: &str) -> PipelineResult<()> {
        self.record(format!("commit {}", message));
        Ok(())
    }

    fn push(&self, remote: &str, refspec: &str) -> PipelineResult<()> {
        self.record(format!("push {} {}", remote, refspec));
        Ok(())
    }
}

// ============================================================================
// Fixture
// ============================================================================

/// Overlay, chroot, store and ledger checkout in a temporary directory
pub struct Fixture {
    pub root: TempDir,
    pub config: PipelineConfig,
    pub store: Arc<LocalStore>,
    pub runner: Arc<RecordingRunner>,
    pub repo: Arc<FakeRepo>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_runner(RecordingRunner::new())
    }

    pub fn with_runner(runner: RecordingRunner) -> Self {
        let root = TempDir::new().unwrap();
        let path = root.path();

        let chrome_dir = path.join("overlay/chromeos-base/chromeos-chrome");
        fs::create_dir_all(&chrome_dir).unwrap();
        fs::write(chrome_dir.join(CHROME_DESCRIPTOR), chrome_descriptor_content()).unwrap();
        fs::write(chrome_dir.join("chromeos-chrome-9999.ebuild"), chrome_descriptor_content()).unwrap();

        let kernel_dir = path.join("overlay/sys-kernel/chromeos-kernel-4_4");
        fs::create_dir_all(&kernel_dir).unwrap();
        fs::write(kernel_dir.join(KERNEL_DESCRIPTOR), kernel_descriptor_content()).unwrap();
        fs::write(kernel_dir.join("chromeos-kernel-4_4-9999.ebuild"), kernel_descriptor_content()).unwrap();

        fs::create_dir_all(path.join("chroot/tmp")).unwrap();
        let profiles = path.join("chrome/src/chromeos/profiles");
        fs::create_dir_all(&profiles).unwrap();
        fs::write(profiles.join("silvermont.afdo.newest.txt"), format!("{}\n", NEWEST_RELEASE_PROFILE)).unwrap();

        let metadata = path.join("utils/afdo_metadata");
        fs::create_dir_all(&metadata).unwrap();
        fs::write(metadata.join("kernel_afdo.json"), ledger_content()).unwrap();

        let mut config = PipelineConfig::default();
        config.chrome.overlay = path.join("overlay");
        config.toolchain.utils_path = path.join("utils");
        config.poll.timeout_secs = 0;
        config.poll.period_secs = 1;

        Self {
            config,
            store: Arc::new(LocalStore::new(path.join("store"))),
            runner: Arc::new(runner),
            repo: Arc::new(FakeRepo::new()),
            root,
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn chroot_path(&self) -> PathBuf {
        self.path().join("chroot")
    }

    pub fn chroot(&self) -> Chroot {
        Chroot::new(self.chroot_path()).already_inside()
    }

    pub fn chrome_root(&self) -> PathBuf {
        self.path().join("chrome")
    }

    /// Pipeline for board `eve` with the chroot and ledger checkout wired in
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config.clone(), self.store.clone(), self.runner.clone())
            .with_repo(self.repo.clone())
            .with_chroot(self.chroot())
            .with_chrome_root(self.chrome_root())
            .with_build_target(BuildTarget::new("eve"))
            .with_now(now())
    }

    /// Pipeline without a chroot
    pub fn pipeline_without_chroot(&self) -> Pipeline {
        Pipeline::new(self.config.clone(), self.store.clone(), self.runner.clone())
            .with_build_target(BuildTarget::new("eve"))
            .with_now(now())
    }

    /// Place an object in the store
    pub fn put(&self, url: &str, content: &str) {
        let path = self.store.resolve(url);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn exists(&self, url: &str) -> bool {
        self.store.exists(url).unwrap()
    }

    pub fn chrome_dir(&self) -> PathBuf {
        self.path().join("overlay/chromeos-base/chromeos-chrome")
    }

    pub fn kernel_dir(&self) -> PathBuf {
        self.path().join("overlay/sys-kernel/chromeos-kernel-4_4")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.path().join("utils/afdo_metadata/kernel_afdo.json")
    }

    /// Descriptor file names in a package directory, sorted
    pub fn descriptor_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
