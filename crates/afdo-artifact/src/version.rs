//! Profile names and their version tuples
//!
//! Every profile family has a fixed textual grammar. Parsing never returns a
//! partial result: input either matches the whole grammar or yields a
//! [`NameError`] carrying the offending string. Formatting is the exact
//! inverse, so `parse(format(v)) == v` for every valid version.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static BENCHMARK_PROFILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^chromeos-chrome-amd64-
        (\d+)\.                 # major
        (\d+)\.                 # minor
        (\d+)\.                 # build
        (\d+)                   # patch
        (?:_rc)?-r(\d+)         # revision
        (-merged)?\.
        afdo(?:\.bz2)?$",
    )
    .expect("benchmark profile grammar")
});

static CWP_PROFILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^R(\d+)-                # major
        (\d+)\.                 # build
        (\d+)-                  # patch
        (\d+)                   # clock
        (?:\.afdo|\.gcov)?      # chrome profiles carry .afdo, kernel profiles .gcov
        (?:\.xz)?$",
    )
    .expect("cwp profile grammar")
});

static MERGED_PROFILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^chromeos-chrome
        -(orderfile|amd64)
        -(field|silvermont|airmont|broadwell)
        -(\d+)                  # cwp major
        -(\d+)                  # cwp build
        \.(\d+)                 # cwp patch
        -(\d+)                  # cwp clock
        -benchmark
        -(\d+)                  # benchmark major
        \.(\d+)                 # benchmark minor
        \.(\d+)                 # benchmark build
        \.(\d+)                 # benchmark patch
        -r(\d+)                 # benchmark revision
        (-merged)?
        (\.orderfile|-redacted\.afdo)
        (?:\.xz)?$",
    )
    .expect("merged profile grammar")
});

/// Profile family, used for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileFamily {
    /// Sample profile built from benchmark runs
    Benchmark,
    /// Fleet-wide (CWP) telemetry profile
    Cwp,
    /// Orderfile or release profile combining both families
    Merged,
}

impl fmt::Display for ProfileFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Benchmark => write!(f, "benchmark profile"),
            Self::Cwp => write!(f, "CWP profile"),
            Self::Merged => write!(f, "merged profile"),
        }
    }
}

/// Name parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Unparseable {family} name: {name}")]
    Unparseable { family: ProfileFamily, name: String },

    #[error("Merged profile name embeds an already merged benchmark profile: {name}")]
    DoubleMerged { name: String },

    #[error("Mismatched prefix and suffix in merged profile name: {name}")]
    MismatchedKind { name: String },

    #[error("Unknown CWP architecture '{name}'")]
    UnknownArch { name: String },
}

impl NameError {
    fn unparseable(family: ProfileFamily, name: &str) -> Self {
        Self::Unparseable {
            family,
            name: name.to_string(),
        }
    }

    /// The offending input
    pub fn name(&self) -> &str {
        match self {
            Self::Unparseable { name, .. }
            | Self::DoubleMerged { name }
            | Self::MismatchedKind { name }
            | Self::UnknownArch { name } => name,
        }
    }
}

fn number<T: FromStr>(caps: &Captures<'_>, index: usize, family: ProfileFamily, name: &str) -> Result<T, NameError> {
    caps[index]
        .parse()
        .map_err(|_| NameError::unparseable(family, name))
}

/// Version of a benchmark profile, e.g. `chromeos-chrome-amd64-77.0.3849.0_rc-r1.afdo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenchmarkProfileVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub patch: u32,
    pub revision: u32,
    /// Already merged with other profiles; never a source for new merges
    pub is_merged: bool,
}

impl BenchmarkProfileVersion {
    /// Create an unmerged version
    pub fn new(major: u32, minor: u32, build: u32, patch: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            patch,
            revision,
            is_merged: false,
        }
    }

    /// Parse a benchmark profile name
    ///
    /// The `_rc` marker and the `.bz2` compression suffix are optional.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let family = ProfileFamily::Benchmark;
        let caps = BENCHMARK_PROFILE_NAME
            .captures(name)
            .ok_or_else(|| NameError::unparseable(family, name))?;

        Ok(Self {
            major: number(&caps, 1, family, name)?,
            minor: number(&caps, 2, family, name)?,
            build: number(&caps, 3, family, name)?,
            patch: number(&caps, 4, family, name)?,
            revision: number(&caps, 5, family, name)?,
            is_merged: caps.get(6).is_some(),
        })
    }

    /// Three-way comparison on (major, minor, build, patch, revision)
    pub fn compare(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.build, self.patch, self.revision).cmp(&(
            other.major,
            other.minor,
            other.build,
            other.patch,
            other.revision,
        ))
    }

    /// Dotted version without revision, e.g. `77.0.3849.0`
    pub fn dotted(&self) -> String {
        format!("{}.{}.{}.{}", self.major, self.minor, self.build, self.patch)
    }
}

impl Ord for BenchmarkProfileVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other).then(self.is_merged.cmp(&other.is_merged))
    }
}

impl PartialOrd for BenchmarkProfileVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BenchmarkProfileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chromeos-chrome-amd64-{}_rc-r{}{}.afdo",
            self.dotted(),
            self.revision,
            if self.is_merged { "-merged" } else { "" }
        )
    }
}

impl FromStr for BenchmarkProfileVersion {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Version of a CWP profile, e.g. `R77-3809.38-1562580965.afdo`
///
/// Kernel profiles share the grammar with a `.gcov` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CwpProfileVersion {
    pub major: u32,
    pub build: u32,
    pub patch: u32,
    /// Collection timestamp (seconds since the epoch); the freshness signal
    pub clock: u64,
}

impl CwpProfileVersion {
    pub fn new(major: u32, build: u32, patch: u32, clock: u64) -> Self {
        Self {
            major,
            build,
            patch,
            clock,
        }
    }

    /// Parse a CWP or kernel profile name, with or without suffixes
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let family = ProfileFamily::Cwp;
        let caps = CWP_PROFILE_NAME
            .captures(name)
            .ok_or_else(|| NameError::unparseable(family, name))?;

        Ok(Self {
            major: number(&caps, 1, family, name)?,
            build: number(&caps, 2, family, name)?,
            patch: number(&caps, 3, family, name)?,
            clock: number(&caps, 4, family, name)?,
        })
    }

    /// Three-way comparison on (major, build, patch, clock)
    pub fn compare(&self, other: &Self) -> Ordering {
        (self.major, self.build, self.patch, self.clock).cmp(&(
            other.major,
            other.build,
            other.patch,
            other.clock,
        ))
    }
}

impl Ord for CwpProfileVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for CwpProfileVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CwpProfileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}-{}.{}-{}", self.major, self.build, self.patch, self.clock)
    }
}

impl FromStr for CwpProfileVersion {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Architecture tag of a CWP profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CwpArch {
    /// Fleet-wide profile used for orderfiles
    Field,
    Silvermont,
    Airmont,
    Broadwell,
}

impl CwpArch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Field => "field",
            Self::Silvermont => "silvermont",
            Self::Airmont => "airmont",
            Self::Broadwell => "broadwell",
        }
    }

    /// All architectures
    pub fn all() -> [CwpArch; 4] {
        [Self::Field, Self::Silvermont, Self::Airmont, Self::Broadwell]
    }
}

impl fmt::Display for CwpArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CwpArch {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|arch| arch.as_str() == s)
            .ok_or_else(|| NameError::UnknownArch {
                name: s.to_string(),
            })
    }
}

/// Kind of artifact built from a CWP + benchmark pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergedKind {
    /// Symbol ordering for the linker
    Orderfile,
    /// Merged and redacted release profile
    ReleaseProfile,
}

impl MergedKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Orderfile => "orderfile",
            Self::ReleaseProfile => "amd64",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Orderfile => ".orderfile",
            Self::ReleaseProfile => "-redacted.afdo",
        }
    }
}

/// Name combining a CWP and a benchmark version
///
/// Examples:
/// `silvermont-77-3809.38-1562580965-benchmark-77.0.3849.0-r1`
pub fn combined_name(cwp: &CwpProfileVersion, arch: CwpArch, benchmark: &BenchmarkProfileVersion) -> String {
    format!(
        "{}-{}-{}.{}-{}-benchmark-{}-r{}",
        arch,
        cwp.major,
        cwp.build,
        cwp.patch,
        cwp.clock,
        benchmark.dotted(),
        benchmark.revision
    )
}

/// Parsed orderfile or release profile name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergedProfileName {
    pub kind: MergedKind,
    pub arch: CwpArch,
    pub cwp: CwpProfileVersion,
    pub benchmark: BenchmarkProfileVersion,
}

impl MergedProfileName {
    pub fn new(
        kind: MergedKind,
        arch: CwpArch,
        cwp: CwpProfileVersion,
        benchmark: BenchmarkProfileVersion,
    ) -> Self {
        Self {
            kind,
            arch,
            cwp,
            benchmark,
        }
    }

    /// Parse an orderfile or release profile name
    ///
    /// Rejects names whose benchmark component is itself merged.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let family = ProfileFamily::Merged;
        let caps = MERGED_PROFILE_NAME
            .captures(name)
            .ok_or_else(|| NameError::unparseable(family, name))?;

        let kind = match (&caps[1], &caps[13]) {
            ("orderfile", ".orderfile") => MergedKind::Orderfile,
            ("amd64", "-redacted.afdo") => MergedKind::ReleaseProfile,
            _ => {
                return Err(NameError::MismatchedKind {
                    name: name.to_string(),
                })
            }
        };

        if caps.get(12).is_some() {
            return Err(NameError::DoubleMerged {
                name: name.to_string(),
            });
        }

        Ok(Self {
            kind,
            arch: caps[2].parse()?,
            cwp: CwpProfileVersion {
                major: number(&caps, 3, family, name)?,
                build: number(&caps, 4, family, name)?,
                patch: number(&caps, 5, family, name)?,
                clock: number(&caps, 6, family, name)?,
            },
            benchmark: BenchmarkProfileVersion::new(
                number(&caps, 7, family, name)?,
                number(&caps, 8, family, name)?,
                number(&caps, 9, family, name)?,
                number(&caps, 10, family, name)?,
                number(&caps, 11, family, name)?,
            ),
        })
    }

    /// (benchmark, CWP) versions embedded in the name
    pub fn versions(&self) -> (BenchmarkProfileVersion, CwpProfileVersion) {
        (self.benchmark, self.cwp)
    }

    /// Same versions relabelled under another kind and architecture
    pub fn relabel(&self, kind: MergedKind, arch: CwpArch) -> Self {
        Self { kind, arch, ..*self }
    }
}

impl fmt::Display for MergedProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chromeos-chrome-{}-{}{}",
            self.kind.prefix(),
            combined_name(&self.cwp, self.arch, &self.benchmark),
            self.kind.suffix()
        )
    }
}

impl FromStr for MergedProfileName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
