//! Pipeline Configuration (afdo.toml)
//!
//! Every section is optional in the file; missing sections and fields fall
//! back to the production defaults below.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PREBUILT_ROOT: &str = "gs://chromeos-prebuilt/afdo-job";

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// Remote storage layout
    pub storage: StorageConfig,

    /// Release profile merge policy
    pub merge: MergeConfig,

    /// Kernel profile freshness policy
    pub kernel: KernelConfig,

    /// Board eligibility tables
    pub boards: BoardConfig,

    /// Upstream artifact polling bounds
    pub poll: PollConfig,

    /// Toolchain-utils checkout holding the version ledgers
    pub toolchain: ToolchainConfig,

    /// Chrome package settings
    pub chrome: ChromeConfig,
}

/// Remote storage roots, one per artifact family and tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Unvetted ordering files
    pub orderfile_unvetted: String,

    /// Vetted ordering files
    pub orderfile_vetted: String,

    /// Benchmark profiles, perf data and debug binaries
    pub benchmark_afdo: String,

    /// CWP profiles for Chrome, one directory per architecture
    pub cwp_afdo: String,

    /// Kernel profiles, one directory per kernel version
    pub kernel_profile: String,

    /// Root of all vetted profile tiers
    pub vetted_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            orderfile_unvetted: format!("{}/orderfiles/unvetted", PREBUILT_ROOT),
            orderfile_vetted: format!("{}/orderfiles/vetted", PREBUILT_ROOT),
            benchmark_afdo: format!("{}/llvm", PREBUILT_ROOT),
            cwp_afdo: format!("{}/cwp/chrome", PREBUILT_ROOT),
            kernel_profile: format!("{}/cwp/kernel", PREBUILT_ROOT),
            vetted_root: format!("{}/vetted", PREBUILT_ROOT),
        }
    }
}

impl StorageConfig {
    /// Vetted kernel profiles
    pub fn kernel_vetted(&self) -> String {
        join_url(&self.vetted_root, "kernel")
    }

    /// Vetted release (merged and redacted) profiles
    pub fn release_vetted(&self) -> String {
        join_url(&self.vetted_root, "release")
    }
}

/// Merge weights for release profiles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct MergeConfig {
    /// Weight of the CWP profile; the benchmark profile gets the remainder of 100
    pub cwp_weight: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { cwp_weight: 75 }
    }
}

impl MergeConfig {
    /// Weight of the benchmark profile
    pub fn benchmark_weight(&self) -> u32 {
        100u32.saturating_sub(self.cwp_weight)
    }
}

/// Kernel profile staleness thresholds (days)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct KernelConfig {
    /// Profiles older than this are never verified
    pub allowed_stale_days: i64,

    /// Profiles older than this raise a warning
    pub warn_stale_days: i64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            allowed_stale_days: 42,
            warn_stale_days: 14,
        }
    }
}

/// Board eligibility tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct BoardConfig {
    /// Boards able to collect LBR perf data for benchmark profiles
    pub afdo_generators: Vec<String>,

    /// Board -> CWP architecture used to verify Chrome profiles
    pub chrome_verifiers: BTreeMap<String, String>,

    /// Board -> kernel version used to verify kernel profiles
    pub kernel_verifiers: BTreeMap<String, String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        let pairs = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            afdo_generators: vec!["chell".to_string(), "samus".to_string()],
            chrome_verifiers: pairs(&[
                ("samus", "silvermont"),
                ("snappy", "airmont"),
                ("eve", "broadwell"),
            ]),
            kernel_verifiers: pairs(&[("lulu", "3.14"), ("chell", "3.18"), ("eve", "4.4")]),
        }
    }
}

/// Polling bounds for upstream artifacts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct PollConfig {
    /// Give up after this many seconds
    pub timeout_secs: u64,

    /// Seconds between existence checks
    pub period_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3 * 60 * 60,
            period_secs: 30,
        }
    }
}

impl PollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Toolchain-utils checkout settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ToolchainConfig {
    /// Local checkout path
    pub utils_path: PathBuf,

    /// Remote repository URL
    pub utils_repo: String,

    /// Ref pulled before touching a ledger
    pub pull_ref: String,

    /// Ref pushed to for review and auto-submit
    pub push_ref: String,

    /// Kernel ledger, relative to the checkout
    pub kernel_ledger: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            utils_path: PathBuf::from("/mnt/host/source/src/third_party/toolchain-utils"),
            utils_repo: "https://chromium.googlesource.com/chromiumos/third_party/toolchain-utils"
                .to_string(),
            pull_ref: "refs/heads/main".to_string(),
            push_ref: "refs/for/main%submit".to_string(),
            kernel_ledger: PathBuf::from("afdo_metadata/kernel_afdo.json"),
        }
    }
}

impl ToolchainConfig {
    /// Absolute path of the kernel ledger
    pub fn kernel_ledger_path(&self) -> PathBuf {
        self.utils_path.join(&self.kernel_ledger)
    }
}

/// Chrome package settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ChromeConfig {
    /// Architecture tag used in benchmark profile names
    pub arch: String,

    /// Package category of Chrome
    pub category: String,

    /// Package name of Chrome
    pub package: String,

    /// Overlay holding the build descriptors
    pub overlay: PathBuf,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            arch: "amd64".to_string(),
            category: "chromeos-base".to_string(),
            package: "chromeos-chrome".to_string(),
            overlay: PathBuf::from("/mnt/host/source/src/third_party/chromiumos-overlay"),
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.merge.cwp_weight > 100 {
            return Err(ConfigError::invalid(
                "merge.cwp_weight",
                format!("{} exceeds 100", self.merge.cwp_weight),
            ));
        }

        if self.poll.period_secs == 0 {
            return Err(ConfigError::invalid("poll.period_secs", "period cannot be zero"));
        }

        if self.kernel.warn_stale_days > self.kernel.allowed_stale_days {
            return Err(ConfigError::invalid(
                "kernel.warn_stale_days",
                "warning threshold is past the expiry threshold",
            ));
        }

        for (field, url) in [
            ("storage.orderfile_unvetted", &self.storage.orderfile_unvetted),
            ("storage.orderfile_vetted", &self.storage.orderfile_vetted),
            ("storage.benchmark_afdo", &self.storage.benchmark_afdo),
            ("storage.cwp_afdo", &self.storage.cwp_afdo),
            ("storage.kernel_profile", &self.storage.kernel_profile),
            ("storage.vetted_root", &self.storage.vetted_root),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::invalid(field, "location cannot be empty"));
            }
        }

        Ok(())
    }

    /// Does this board have the capability of generating its own AFDO data?
    pub fn can_generate_afdo_data(&self, board: &str) -> bool {
        self.boards.afdo_generators.iter().any(|b| b == board)
    }

    /// Is the board eligible to verify kernel AFDO profiles?
    pub fn can_verify_kernel_afdo(&self, board: &str) -> bool {
        self.boards.kernel_verifiers.contains_key(board)
    }

    /// CWP architecture used when verifying Chrome profiles on `board`
    pub fn chrome_verifier_arch(&self, board: &str) -> ConfigResult<&str> {
        self.boards
            .chrome_verifiers
            .get(board)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownBoard {
                board: board.to_string(),
                table: "boards.chrome_verifiers".to_string(),
            })
    }

    /// Kernel version verified on `board`
    pub fn kernel_verifier_version(&self, board: &str) -> ConfigResult<&str> {
        self.boards
            .kernel_verifiers
            .get(board)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownBoard {
                board: board.to_string(),
                table: "boards.kernel_verifiers".to_string(),
            })
    }
}

/// Join a relative name onto a storage root
pub fn join_url(root: &str, name: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), name.trim_start_matches('/'))
}
