//! Ranking and latest-artifact selection
//!
//! A rank is the comparable key derived from a parsed name. Names that fail to
//! parse, or that are not eligible as merge sources, have no rank and are
//! never selected.

use crate::location::basename;
use crate::version::{BenchmarkProfileVersion, CwpProfileVersion, MergedProfileName};
use std::cmp::Ordering;

/// Ledger coordinate ranked as a benchmark profile
pub const BENCHMARK_COORDINATE: &str = "benchmark";

/// Legacy pointer files kept next to real artifacts
const LATEST_POINTER_MARKER: &str = "latest-";

/// Errors from [`find_latest`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LatestError {
    #[error("No artifact found for branch {branch} or {previous}")]
    NotFound { branch: u32, previous: u32 },

    #[error("No valid artifact among {count} candidates for branch {branch} (e.g. '{example}')")]
    NoValidArtifact {
        branch: u32,
        count: usize,
        example: String,
    },
}

/// Rank a benchmark profile; merged profiles are not ranked
pub fn rank_benchmark(name: &str) -> Option<BenchmarkProfileVersion> {
    BenchmarkProfileVersion::parse(basename(name))
        .ok()
        .filter(|version| !version.is_merged)
}

/// Rank a CWP or kernel profile by its collection clock
pub fn rank_cwp(name: &str) -> Option<u64> {
    CwpProfileVersion::parse(basename(name))
        .ok()
        .map(|version| version.clock)
}

/// Rank an orderfile or release profile by (benchmark, CWP) versions
pub fn rank_merged(name: &str) -> Option<(BenchmarkProfileVersion, CwpProfileVersion)> {
    MergedProfileName::parse(basename(name))
        .ok()
        .map(|merged| merged.versions())
}

/// Whether `name` carries the marker of release branch `branch`
///
/// Benchmark-derived names embed `-77.` while CWP names start with `R77-`.
pub fn is_on_branch(name: &str, branch: u32) -> bool {
    name.contains(&format!("R{}-", branch)) || name.contains(&format!("-{}.", branch))
}

/// Pick the highest ranked entry for `branch`, falling back to `branch - 1`
///
/// Equal ranks are broken by the lexicographically greatest name.
pub fn find_latest<'a, I, K, F>(entries: I, branch: u32, rank: F) -> Result<String, LatestError>
where
    I: IntoIterator<Item = &'a str>,
    K: Ord,
    F: Fn(&str) -> Option<K>,
{
    let entries: Vec<&str> = entries
        .into_iter()
        .filter(|entry| !entry.contains(LATEST_POINTER_MARKER))
        .collect();

    let previous = branch.saturating_sub(1);
    let mut selected_branch = branch;
    let mut candidates: Vec<&str> = entries
        .iter()
        .copied()
        .filter(|entry| is_on_branch(entry, branch))
        .collect();

    if candidates.is_empty() && previous != branch {
        selected_branch = previous;
        candidates = entries
            .iter()
            .copied()
            .filter(|entry| is_on_branch(entry, previous))
            .collect();
    }

    let Some(&example) = candidates.first() else {
        return Err(LatestError::NotFound { branch, previous });
    };

    candidates
        .iter()
        .filter_map(|entry| rank(entry).map(|key| (key, *entry)))
        .max()
        .map(|(_, entry)| entry.to_string())
        .ok_or_else(|| LatestError::NoValidArtifact {
            branch: selected_branch,
            count: candidates.len(),
            example: example.to_string(),
        })
}

/// Compare a candidate ledger value against the recorded one
///
/// `Greater` means `candidate` is strictly newer. An unrankable recorded value
/// is outranked by any rankable candidate.
pub fn compare_ledger_names(coordinate: &str, recorded: &str, candidate: &str) -> Ordering {
    if coordinate == BENCHMARK_COORDINATE {
        rank_benchmark(candidate).cmp(&rank_benchmark(recorded))
    } else {
        rank_cwp(candidate).cmp(&rank_cwp(recorded))
    }
}
