//! Latest command - newest artifact in a location

use crate::setup::{print_json, GlobalArgs};
use afdo_artifact::ProfileFamily;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde_json::json;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Family {
    Benchmark,
    Cwp,
    Merged,
}

impl From<Family> for ProfileFamily {
    fn from(family: Family) -> Self {
        match family {
            Family::Benchmark => ProfileFamily::Benchmark,
            Family::Cwp => ProfileFamily::Cwp,
            Family::Merged => ProfileFamily::Merged,
        }
    }
}

#[derive(Debug, Args)]
pub struct LatestArgs {
    /// Remote directory to search
    pub location: String,

    /// How names in the location are ranked
    #[arg(long, value_enum)]
    pub family: Family,

    /// Chrome milestone to restrict to (default: from the Chrome descriptor)
    #[arg(long)]
    pub branch: Option<u32>,
}

pub fn run(global: &GlobalArgs, args: LatestArgs) -> Result<()> {
    let pipeline = global.pipeline()?;
    let latest = pipeline
        .latest_artifact(&args.location, args.family.into(), args.branch)
        .with_context(|| format!("No usable artifact in {}", args.location))?;

    if global.json {
        print_json(&json!({ "location": args.location, "latest": latest }))?;
    } else {
        println!("{}", latest);
    }
    Ok(())
}
