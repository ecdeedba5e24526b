//! Compression helpers around `xz` and `bzip2`

use crate::error::{PipelineError, PipelineResult};
use crate::tool::{ToolInvocation, ToolRunner};
use afdo_artifact::CompressionSuffix;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn compressor(suffix: CompressionSuffix) -> Option<&'static str> {
    match suffix {
        CompressionSuffix::None => None,
        CompressionSuffix::Bz2 => Some("bzip2"),
        CompressionSuffix::Xz | CompressionSuffix::GcovXz => Some("xz"),
    }
}

/// Compress `input` into `output`
pub fn compress_file(
    runner: &dyn ToolRunner,
    input: &Path,
    output: &Path,
    suffix: CompressionSuffix,
) -> PipelineResult<()> {
    match compressor(suffix) {
        Some(program) => {
            let invocation = ToolInvocation::new(program)
                .arg("-c")
                .arg(input.display().to_string())
                .with_stdout(output);
            runner.run_checked(&invocation).map(drop)
        }
        None => fs::copy(input, output)
            .map(drop)
            .map_err(|e| PipelineError::io(input, e)),
    }
}

/// Decompress `input` into `output`, picking the tool from the input suffix
pub fn decompress_file(runner: &dyn ToolRunner, input: &Path, output: &Path) -> PipelineResult<()> {
    let name = input.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    match compressor(CompressionSuffix::detect(name)) {
        Some(program) => {
            let invocation = ToolInvocation::new(program)
                .args(["-d", "-c"])
                .arg(input.display().to_string())
                .with_stdout(output);
            runner.run_checked(&invocation).map(drop)
        }
        None => fs::copy(input, output)
            .map(drop)
            .map_err(|e| PipelineError::io(input, e)),
    }
}

/// Compress each target into `output_dir` as `<basename><suffix>`
///
/// Returns the compressed paths in target order.
pub fn compress_files(
    runner: &dyn ToolRunner,
    targets: &[PathBuf],
    output_dir: &Path,
    suffix: CompressionSuffix,
) -> PipelineResult<Vec<PathBuf>> {
    let mut compressed = Vec::with_capacity(targets.len());

    for target in targets {
        if !target.exists() {
            return Err(PipelineError::io(
                target,
                io::Error::new(io::ErrorKind::NotFound, "file to compress does not exist"),
            ));
        }
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::io(target, io::Error::from(io::ErrorKind::InvalidInput)))?;
        let output = output_dir.join(suffix.append(name));
        compress_file(runner, target, &output, suffix)?;
        compressed.push(output);
    }

    Ok(compressed)
}
