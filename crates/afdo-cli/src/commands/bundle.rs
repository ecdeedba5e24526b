//! Bundle command - package build outputs

use crate::setup::{print_json, GlobalArgs};
use afdo_pipeline::ArtifactType;
use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct BundleArgs {
    /// Artifact type, e.g. `UnverifiedOrderingFile`
    pub artifact: ArtifactType,

    /// Existing directory to place the bundled files in
    #[arg(long, short = 'o')]
    pub output_dir: PathBuf,
}

pub fn run(global: &GlobalArgs, args: BundleArgs) -> Result<()> {
    let pipeline = global.pipeline()?;

    let files = match pipeline.bundle_artifacts(args.artifact, &args.output_dir) {
        Ok(files) => files,
        Err(e) if e.is_not_ready() => {
            return Err(e).context("Build outputs never appeared; is the build still running?")
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to bundle {}", args.artifact));
        }
    };

    if global.json {
        let paths: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        print_json(&json!({ "artifact": args.artifact.as_str(), "files": paths }))?;
    } else {
        for file in &files {
            println!("{}", file.display());
        }
    }
    Ok(())
}
