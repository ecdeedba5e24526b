//! Prepare command - decide whether an artifact needs building

use crate::setup::{print_json, GlobalArgs};
use afdo_pipeline::{ArtifactType, InputArtifacts};
use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

#[derive(Debug, Args)]
pub struct PrepareArgs {
    /// Artifact type, e.g. `VerifiedKernelAfdoFile`
    pub artifact: ArtifactType,

    /// Upstream artifact location as NAME=LOCATION (repeatable)
    #[arg(long = "input", value_name = "NAME=LOCATION", value_parser = parse_input)]
    pub inputs: Vec<(String, String)>,
}

fn parse_input(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, location)) if !name.is_empty() && !location.is_empty() => {
            Ok((name.to_string(), location.to_string()))
        }
        _ => Err(format!("expected NAME=LOCATION, got '{}'", raw)),
    }
}

pub fn run(global: &GlobalArgs, args: PrepareArgs) -> Result<()> {
    let pipeline = global.pipeline()?;
    let inputs = args
        .inputs
        .into_iter()
        .fold(InputArtifacts::new(), |acc, (name, location)| acc.with_location(name, location));

    let result = pipeline
        .prepare_for_build(args.artifact, &inputs)
        .with_context(|| format!("Failed to prepare {}", args.artifact))?;

    if global.json {
        print_json(&json!({
            "artifact": args.artifact.as_str(),
            "result": result.to_string(),
        }))?;
    } else {
        println!("{}", result);
    }
    Ok(())
}
