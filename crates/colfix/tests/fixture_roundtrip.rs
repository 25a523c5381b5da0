//! Generate suites into a temporary directory, then read everything back:
//! replay against a fresh oracle, compare manifests, check persisted
//! catalogs.

use std::fs;
use std::path::Path;

use colfix::catalog::{verify_persisted, write_snapshot};
use colfix::config::{GeneratorConfig, SuiteSizes};
use colfix::dataset::Dataset;
use colfix::orchestrator::{MANIFEST_FILE, Orchestrator, RunManifest, sha256_hex};
use colfix::replay::replay_suites;
use colfix::suites::Suite;
use colfix_error::ColfixError;

const ROWS: usize = 2_000;

fn config(dir: &Path, seed: u64) -> GeneratorConfig {
    GeneratorConfig {
        dataset_dir: dir.to_path_buf(),
        seed,
        sizes: SuiteSizes::uniform(ROWS),
        ..GeneratorConfig::default()
    }
}

fn generate(dir: &Path, seed: u64, suites: &[Suite]) -> RunManifest {
    Orchestrator::new(config(dir, seed))
        .generate(suites)
        .expect("generation succeeds")
}

#[test]
fn every_suite_replays_byte_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = generate(dir.path(), 3, &Suite::ALL);
    assert_eq!(manifest.scenario_count(), 65);

    let report = replay_suites(&config(dir.path(), 3), &Suite::ALL).expect("replay matches");
    assert_eq!(report.scenarios, 65);
    assert_eq!(report.suites, Suite::ALL.to_vec());
}

#[test]
fn later_suites_replay_on_their_own() {
    let dir = tempfile::tempdir().expect("tempdir");
    let suites = [Suite::Index, Suite::Update];
    generate(dir.path(), 21, &suites);
    let report = replay_suites(&config(dir.path(), 21), &suites).expect("replay matches");
    assert_eq!(report.scenarios, 25 + 6);
}

#[test]
fn same_seed_same_bytes() {
    let a = tempfile::tempdir().expect("tempdir");
    let b = tempfile::tempdir().expect("tempdir");
    // A shared engine prefix keeps the dataset directory out of the load
    // paths, so scripts are comparable across directories too.
    let run = |dir: &Path| {
        let mut config = config(dir, 99);
        config.engine_path_prefix = "/fixtures".to_owned();
        Orchestrator::new(config)
            .generate(&Suite::ALL)
            .expect("generation succeeds")
    };
    let first = run(a.path());
    let second = run(b.path());

    let hashes = |m: &RunManifest| -> Vec<(String, String)> {
        m.artifacts()
            .map(|r| (r.file.clone(), r.sha256.clone()))
            .collect()
    };
    assert!(first.artifacts().any(|r| r.file.ends_with(".dsl")));
    assert_eq!(hashes(&first), hashes(&second));
    assert_eq!(first, second);

    for record in first.artifacts() {
        let bytes = fs::read(a.path().join(&record.file)).expect("artifact exists");
        assert_eq!(sha256_hex(&bytes), record.sha256, "{}", record.file);
        assert_eq!(bytes.len() as u64, record.bytes);
        let other = fs::read(b.path().join(&record.file)).expect("artifact exists");
        assert_eq!(bytes, other, "{}", record.file);
    }
}

#[test]
fn engine_prefix_makes_scripts_location_independent() {
    let a = tempfile::tempdir().expect("tempdir");
    let b = tempfile::tempdir().expect("tempdir");
    let with_prefix = |dir: &Path| {
        let mut config = config(dir, 5);
        config.engine_path_prefix = "/srv/fixtures".to_owned();
        Orchestrator::new(config)
            .generate(&[Suite::Scan, Suite::Batch])
            .expect("generation succeeds")
    };
    let first = with_prefix(a.path());
    let second = with_prefix(b.path());
    assert_eq!(first.suites, second.suites);

    let script = fs::read_to_string(a.path().join("test01gen.dsl")).expect("script");
    assert!(script.contains("load(\"/srv/fixtures/data1_generated.csv\")"), "{script}");
}

#[test]
fn different_seeds_change_random_data_only() {
    let a = tempfile::tempdir().expect("tempdir");
    let b = tempfile::tempdir().expect("tempdir");
    let first = generate(a.path(), 1, &[Suite::Scan]);
    let second = generate(b.path(), 2, &[Suite::Scan]);
    let hash_of = |m: &RunManifest, file: &str| {
        m.artifacts()
            .find(|r| r.file == file)
            .map(|r| r.sha256.clone())
            .expect("artifact recorded")
    };
    assert_eq!(
        hash_of(&first, "data1_generated.csv"),
        hash_of(&second, "data1_generated.csv")
    );
    assert_ne!(
        hash_of(&first, "data2_generated.csv"),
        hash_of(&second, "data2_generated.csv")
    );
}

#[test]
fn checkin_select_prints_first_twenty_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    generate(dir.path(), 7, &[Suite::Scan]);

    let data = Dataset::read_from_dir(dir.path(), "data1_generated.csv").expect("dataset");
    assert_eq!(data.row_count(), 1000);
    let col2 = data.columns()[1].values();

    let expected = fs::read_to_string(dir.path().join("test02gen.exp")).expect("expected");
    let groups: Vec<&str> = expected.split("\n\n").collect();
    assert_eq!(groups.len(), 2);
    let first: Vec<i64> = groups[0]
        .lines()
        .map(|l| l.parse().expect("integer line"))
        .collect();
    assert_eq!(first, col2[..20]);
    assert_eq!(groups[1].lines().count(), 13);
    assert!(expected.ends_with('\n') && !expected.ends_with("\n\n"));

    let script = fs::read_to_string(dir.path().join("test02gen.dsl")).expect("script");
    assert!(script.contains("=select(db1.tbl1.col1,null,20)"), "{script}");
}

#[test]
fn timing_only_join_scripts_expect_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    generate(dir.path(), 13, &[Suite::Join]);
    for id in [54, 55, 58, 59] {
        let exp = fs::read_to_string(dir.path().join(format!("test{id}gen.exp"))).expect("exp");
        assert!(exp.is_empty(), "test{id} expects {exp:?}");
    }
}

#[test]
fn tampered_expectation_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    generate(dir.path(), 8, &[Suite::Scan]);
    let path = dir.path().join("test03gen.exp");
    fs::write(&path, "1.00\n").expect("tamper");

    let err = replay_suites(&config(dir.path(), 8), &[Suite::Scan]).expect_err("mismatch");
    match err {
        ColfixError::ReplayMismatch { scenario, .. } => assert_eq!(scenario, 3),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn manifest_on_disk_matches_returned_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = generate(dir.path(), 4, &[Suite::Batch]);
    let text = fs::read_to_string(dir.path().join(MANIFEST_FILE)).expect("manifest");
    assert_eq!(RunManifest::from_json(&text).expect("parses"), manifest);
    assert_eq!(manifest.suites.len(), 1);
    assert_eq!(
        manifest.suites[0].seed,
        colfix::derive_suite_seed(4, Suite::Batch.index())
    );
}

#[test]
fn replayed_database_verifies_against_its_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    generate(dir.path(), 17, &[Suite::Scan, Suite::Batch]);
    let report =
        replay_suites(&config(dir.path(), 17), &[Suite::Scan, Suite::Batch]).expect("replays");
    let db = report.database.expect("scan creates the database");

    let persisted = dir.path().join("persist");
    write_snapshot(&db, &persisted).expect("snapshot");
    verify_persisted(&db, &persisted).expect("snapshot matches");

    fs::remove_file(persisted.join("tbl3_batch.col2")).expect("remove column file");
    assert!(verify_persisted(&db, &persisted).is_err());
}
