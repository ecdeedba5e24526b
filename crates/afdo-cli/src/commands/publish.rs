//! Publish command - promote a verified artifact

use crate::setup::{print_json, GlobalArgs};
use afdo_pipeline::ArtifactType;
use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Artifact type, e.g. `VerifiedKernelAfdoFile`
    pub artifact: ArtifactType,
}

pub fn run(global: &GlobalArgs, args: PublishArgs) -> Result<()> {
    let pipeline = global.pipeline()?;
    let published = pipeline
        .upload_and_publish_vetted(args.artifact)
        .with_context(|| format!("Failed to publish {}", args.artifact))?;

    if global.json {
        print_json(&json!({ "artifact": args.artifact.as_str(), "published": published }))?;
    } else if published {
        println!("Published {}", args.artifact);
    } else {
        println!("{} already published", args.artifact);
    }
    Ok(())
}
