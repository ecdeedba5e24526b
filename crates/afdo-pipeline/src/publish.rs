//! Vetted artifact upload and ledger publication
//!
//! The ledger lives in a shared checkout that several builders may update at
//! once. Every publication pulls first, then refuses any update that is not
//! strictly newer than what the ledger already records.

use crate::error::{PipelineError, PipelineResult};
use crate::repo::VersionedRepo;
use crate::store::{is_remote, RemoteStore};
use afdo_artifact::{compare_ledger_names, ArtifactLocation, VersionLedger};
use afdo_config::ToolchainConfig;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::info;

/// Commit title used when the caller does not supply one
pub const DEFAULT_TITLE: &str = "afdo_metadata: Publish new profiles.";

/// Ledger coordinate to newly uploaded artifact name
///
/// `None` marks a coordinate with nothing new to publish.
pub type PublishedArtifacts = BTreeMap<String, Option<String>>;

/// Copy `source` to `dest` unless `dest` already exists
///
/// Returns the artifact name (file name without compression suffix) when a
/// copy happened.
pub fn upload_if_absent(store: &dyn RemoteStore, source: &str, dest: &str) -> PipelineResult<Option<String>> {
    if !is_remote(source) && !Path::new(source).is_file() {
        return Err(PipelineError::io(
            source,
            io::Error::new(io::ErrorKind::NotFound, "file to upload does not exist"),
        ));
    }

    if store.exists(dest)? {
        info!(dest, "already uploaded, skipping");
        return Ok(None);
    }

    info!(source, dest, "uploading artifact");
    store.copy(source, dest)?;

    Ok(Some(ArtifactLocation::from_url(dest).name))
}

/// Record uploaded artifacts in the ledger and push the change for review
///
/// Sequence: pull, load, validate every update, write, check the working
/// tree changed, log the diff, commit, push. Validation failures leave the
/// ledger file untouched.
pub fn publish_ledger(
    repo: &dyn VersionedRepo,
    toolchain: &ToolchainConfig,
    ledger_path: &Path,
    uploaded: &PublishedArtifacts,
    title: Option<&str>,
) -> PipelineResult<()> {
    repo.pull(&toolchain.utils_repo, &toolchain.pull_ref)?;

    let mut ledger = VersionLedger::from_file(ledger_path)?;
    let mut message = format!("{}\n\n", title.unwrap_or(DEFAULT_TITLE));

    for (coordinate, artifact) in uploaded {
        let Some(artifact) = artifact else {
            continue;
        };

        let recorded = ledger
            .get_name(coordinate)
            .ok_or_else(|| PipelineError::MissingCoordinate {
                coordinate: coordinate.clone(),
                path: ledger_path.to_path_buf(),
            })?
            .to_string();

        if compare_ledger_names(coordinate, &recorded, artifact) != Ordering::Greater {
            return Err(PipelineError::StaleArtifact {
                coordinate: coordinate.clone(),
                recorded,
                candidate: artifact.clone(),
            });
        }

        ledger.set_name(coordinate, artifact);
        message.push_str(&format!("Update {} from {} to {}\n", coordinate, recorded, artifact));
    }

    ledger.write_to_file(ledger_path)?;

    let modifications = repo.status()?;
    if modifications.trim().is_empty() {
        return Err(PipelineError::LedgerUnchanged {
            path: ledger_path.to_path_buf(),
        });
    }
    info!(status = %modifications.trim_end(), "ledger checkout modified");

    let diff = repo.diff()?;
    info!(diff = %diff.trim_end(), "ledger diff");

    repo.commit_all(&message)?;
    repo.push(&toolchain.utils_repo, &toolchain.push_ref)?;

    info!(path = %ledger_path.display(), "published ledger update");
    Ok(())
}
