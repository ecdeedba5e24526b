//! Vetted uploads and ledger publication

mod common;

use afdo_pipeline::publish::DEFAULT_TITLE;
use afdo_pipeline::{publish_ledger, upload_if_absent, PipelineError, PublishedArtifacts};
use common::{FakeRepo, Fixture, RECORDED_KERNEL_PROFILE};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::fs;

const UNVETTED: &str = "gs://chromeos-prebuilt/afdo-job/cwp/kernel/4.4/R77-12371.11-1569740800.gcov.xz";
const VETTED: &str = "gs://chromeos-prebuilt/afdo-job/vetted/kernel/4.4/R77-12371.11-1569740800.gcov.xz";

fn updates(pairs: &[(&str, Option<&str>)]) -> PublishedArtifacts {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
        .collect()
}

// ============================================================================
// upload_if_absent
// ============================================================================

#[test]
fn test_upload_happens_once() {
    let fixture = Fixture::new();
    fixture.put(UNVETTED, "profile");

    let first = upload_if_absent(fixture.store.as_ref(), UNVETTED, VETTED).unwrap();
    assert_eq!(first.as_deref(), Some("R77-12371.11-1569740800"));
    assert!(fixture.exists(VETTED));

    let second = upload_if_absent(fixture.store.as_ref(), UNVETTED, VETTED).unwrap();
    assert_eq!(second, None);
}

#[test]
fn test_upload_of_missing_local_file_fails() {
    let fixture = Fixture::new();
    let missing = fixture.path().join("nothing.afdo.bz2");

    let err = upload_if_absent(fixture.store.as_ref(), &missing.display().to_string(), VETTED).unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
    assert!(!fixture.exists(VETTED));
}

// ============================================================================
// publish_ledger
// ============================================================================

#[test]
fn test_newer_artifact_is_committed_and_pushed() {
    let fixture = Fixture::new();
    let ledger = fixture.ledger_path();

    publish_ledger(
        fixture.repo.as_ref(),
        &fixture.config.toolchain,
        &ledger,
        &updates(&[("chromeos-kernel-4_4", Some("R77-12371.11-1569740800"))]),
        Some("afdo_metadata: Publish new profiles for kernel 4.4."),
    )
    .unwrap();

    let content = fs::read_to_string(&ledger).unwrap();
    assert!(content.contains("\"R77-12371.11-1569740800\""));
    assert!(!content.contains(RECORDED_KERNEL_PROFILE));
    assert!(content.ends_with('\n'));

    let toolchain = &fixture.config.toolchain;
    assert_eq!(
        fixture.repo.calls(),
        vec![
            format!("pull {} {}", toolchain.utils_repo, toolchain.pull_ref),
            "status".to_string(),
            "diff".to_string(),
            format!(
                "commit afdo_metadata: Publish new profiles for kernel 4.4.\n\nUpdate chromeos-kernel-4_4 from {} to R77-12371.11-1569740800\n",
                RECORDED_KERNEL_PROFILE
            ),
            format!("push {} {}", toolchain.utils_repo, toolchain.push_ref),
        ]
    );
}

#[test]
fn test_default_title() {
    let fixture = Fixture::new();

    publish_ledger(
        fixture.repo.as_ref(),
        &fixture.config.toolchain,
        &fixture.ledger_path(),
        &updates(&[("chromeos-kernel-4_4", Some("R77-12371.11-1569740800"))]),
        None,
    )
    .unwrap();

    let commit = fixture
        .repo
        .calls()
        .into_iter()
        .find(|call| call.starts_with("commit "))
        .unwrap();
    assert!(commit.starts_with(&format!("commit {}\n\n", DEFAULT_TITLE)));
}

#[rstest]
#[case::older("R77-12371.0-1564000000")]
#[case::same(RECORDED_KERNEL_PROFILE)]
fn test_stale_artifact_is_rejected(#[case] candidate: &str) {
    let fixture = Fixture::new();
    let ledger = fixture.ledger_path();

    let err = publish_ledger(
        fixture.repo.as_ref(),
        &fixture.config.toolchain,
        &ledger,
        &updates(&[("chromeos-kernel-4_4", Some(candidate))]),
        None,
    )
    .unwrap_err();

    match err {
        PipelineError::StaleArtifact {
            coordinate,
            recorded,
            candidate: rejected,
        } => {
            assert_eq!(coordinate, "chromeos-kernel-4_4");
            assert_eq!(recorded, RECORDED_KERNEL_PROFILE);
            assert_eq!(rejected, candidate);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fs::read_to_string(&ledger).unwrap(), common::ledger_content());
    assert!(!fixture.repo.calls().iter().any(|call| call.starts_with("commit")));
}

#[test]
fn test_benchmark_coordinate_ranks_by_version() {
    let fixture = Fixture::new();

    publish_ledger(
        fixture.repo.as_ref(),
        &fixture.config.toolchain,
        &fixture.ledger_path(),
        &updates(&[("benchmark", Some("chromeos-chrome-amd64-77.0.3850.0_rc-r1.afdo"))]),
        None,
    )
    .unwrap();

    let err = publish_ledger(
        fixture.repo.as_ref(),
        &fixture.config.toolchain,
        &fixture.ledger_path(),
        &updates(&[("benchmark", Some("chromeos-chrome-amd64-77.0.3849.0_rc-r9.afdo"))]),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::StaleArtifact { .. }));
}

#[test]
fn test_unknown_coordinate_is_rejected() {
    let fixture = Fixture::new();

    let err = publish_ledger(
        fixture.repo.as_ref(),
        &fixture.config.toolchain,
        &fixture.ledger_path(),
        &updates(&[("chromeos-kernel-5_10", Some("R77-12371.11-1569740800"))]),
        None,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::MissingCoordinate { coordinate, .. } if coordinate == "chromeos-kernel-5_10"));
    assert_eq!(fs::read_to_string(fixture.ledger_path()).unwrap(), common::ledger_content());
}

#[test]
fn test_unchanged_checkout_is_not_committed() {
    let mut fixture = Fixture::new();
    fixture.repo = std::sync::Arc::new(FakeRepo::clean());

    let err = publish_ledger(
        fixture.repo.as_ref(),
        &fixture.config.toolchain,
        &fixture.ledger_path(),
        &updates(&[("chromeos-kernel-4_4", None)]),
        None,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::LedgerUnchanged { .. }));
    let calls = fixture.repo.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("pull "));
    assert_eq!(calls[1], "status");
}
