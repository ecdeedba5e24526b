//! Upload command - push bundled files to the unvetted tier

use crate::setup::{print_json, GlobalArgs};
use afdo_pipeline::ArtifactType;
use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Artifact type, e.g. `UnverifiedChromeAfdoFile`
    pub artifact: ArtifactType,

    /// Files produced by `bundle`
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(global: &GlobalArgs, args: UploadArgs) -> Result<()> {
    let pipeline = global.pipeline()?;
    let uploaded = pipeline
        .upload_artifacts(args.artifact, &args.files)
        .with_context(|| format!("Failed to upload {}", args.artifact))?;

    if global.json {
        print_json(&json!({ "artifact": args.artifact.as_str(), "uploaded": uploaded }))?;
    } else if uploaded.is_empty() {
        println!("Nothing uploaded");
    } else {
        for url in &uploaded {
            println!("{}", url);
        }
    }
    Ok(())
}
