//! Weighted profile merging and redaction
//!
//! Both steps drive `llvm-profdata` (plus the textual redaction filter) as
//! opaque tools. A failure in any step aborts the whole operation.

use crate::compress::decompress_file;
use crate::error::{PipelineError, PipelineResult};
use crate::store::RemoteStore;
use crate::target::Toolchain;
use crate::tool::ToolInvocation;
use afdo_artifact::{
    basename, combined_name, BenchmarkProfileVersion, CompressionSuffix, CwpArch, CwpProfileVersion,
    MergedKind, MergedProfileName, NameError,
};
use afdo_config::MergeConfig;
use std::path::{Path, PathBuf};
use tracing::info;

const PROFDATA: &str = "llvm-profdata";
const REDACT: &str = "redact_textual_afdo_profile";

/// Merge sample profiles, scaling each input by its weight
pub fn merge_weighted(
    toolchain: &Toolchain<'_>,
    inputs: &[(PathBuf, u32)],
    output: &Path,
    compbinary: bool,
) -> PipelineResult<()> {
    if inputs.is_empty() {
        return Err(PipelineError::NoMergeInputs {
            output: output.to_path_buf(),
        });
    }

    let mut invocation = ToolInvocation::new(PROFDATA)
        .args(["merge", "-sample"])
        .arg(format!("-output={}", toolchain.arg(output)));
    for (path, weight) in inputs {
        invocation = invocation.arg(format!("-weighted-input={},{}", weight, toolchain.arg(path)));
    }
    if compbinary {
        invocation = invocation.arg("-compbinary");
    }

    info!(output = %output.display(), inputs = inputs.len(), "merging profiles");
    toolchain.run(invocation).map(drop)
}

/// Strip unstable (identical-code-folded) symbols from a profile
///
/// Converts to text, filters through the redactor and converts back to the
/// compact binary form.
pub fn redact(toolchain: &Toolchain<'_>, input: &Path, output: &Path) -> PipelineResult<()> {
    let text_temp = with_suffix(input, ".text.temp");
    let redacted_temp = with_suffix(input, ".redacted.temp");

    toolchain.run(
        ToolInvocation::new(PROFDATA)
            .args(["merge", "-sample", "-text"])
            .arg(toolchain.arg(input))
            .arg("-output")
            .arg(toolchain.arg(&text_temp)),
    )?;

    toolchain.run(
        ToolInvocation::new(REDACT)
            .with_stdin(&text_temp)
            .with_stdout(&redacted_temp),
    )?;

    toolchain.run(
        ToolInvocation::new(PROFDATA)
            .args(["merge", "-sample", "-compbinary"])
            .arg(toolchain.arg(&redacted_temp))
            .arg("-output")
            .arg(toolchain.arg(output)),
    )?;

    info!(output = %output.display(), "redacted profile");
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Inputs of a release profile
#[derive(Debug, Clone)]
pub struct ReleaseProfileSources {
    /// CWP profile URL (`.xz`)
    pub cwp_url: String,
    /// CWP architecture
    pub arch: CwpArch,
    /// Benchmark profile URL (`.bz2`)
    pub benchmark_url: String,
}

impl ReleaseProfileSources {
    fn versions(&self) -> PipelineResult<(CwpProfileVersion, BenchmarkProfileVersion)> {
        let cwp = CwpProfileVersion::parse(basename(&self.cwp_url))?;
        let benchmark_name = basename(&self.benchmark_url);
        let benchmark = BenchmarkProfileVersion::parse(benchmark_name)?;
        if benchmark.is_merged {
            return Err(NameError::DoubleMerged {
                name: benchmark_name.to_string(),
            }
            .into());
        }
        Ok((cwp, benchmark))
    }

    /// File name of the redacted release profile
    pub fn release_name(&self) -> PipelineResult<String> {
        let (cwp, benchmark) = self.versions()?;
        Ok(MergedProfileName::new(MergedKind::ReleaseProfile, self.arch, cwp, benchmark).to_string())
    }
}

/// Fetch, merge and redact a release profile into `work_dir`
///
/// Returns the path of the redacted profile.
pub fn create_release_profile(
    store: &dyn RemoteStore,
    toolchain: &Toolchain<'_>,
    sources: &ReleaseProfileSources,
    weights: &MergeConfig,
    work_dir: &Path,
) -> PipelineResult<PathBuf> {
    let (cwp, benchmark) = sources.versions()?;

    let mut local = Vec::with_capacity(2);
    for url in [&sources.cwp_url, &sources.benchmark_url] {
        let file_name = basename(url);
        let compressed = work_dir.join(file_name);
        store.copy(url, &compressed.display().to_string())?;

        let suffix = CompressionSuffix::detect(file_name);
        let uncompressed = work_dir.join(suffix.strip(file_name));
        decompress_file(toolchain.runner(), &compressed, &uncompressed)?;
        local.push(uncompressed);
    }

    let merged = work_dir.join(format!(
        "chromeos-chrome-amd64-{}",
        combined_name(&cwp, sources.arch, &benchmark)
    ));
    let inputs = [
        (local[0].clone(), weights.cwp_weight),
        (local[1].clone(), weights.benchmark_weight()),
    ];
    merge_weighted(toolchain, &inputs, &merged, false)?;

    let redacted = work_dir.join(sources.release_name()?);
    redact(toolchain, &merged, &redacted)?;

    Ok(redacted)
}
