//! Run orchestration: generate the requested suites, then write datasets,
//! scripts, expected outputs and the run manifest.
//!
//! Every suite is generated in memory before the first file is written, so a
//! scenario invariant failure leaves the output directory untouched.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use colfix_error::{ColfixError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::RngSpec;
use crate::config::{GeneratorConfig, SuiteSizes};
use crate::scenario::artifact_stem;
use crate::suites::{Suite, SuiteOutput};

const TARGET: &str = "colfix.orchestrator";

/// Schema identifier written into `manifest.json`.
pub const MANIFEST_SCHEMA_V1: &str = "colfix.manifest.v1";

/// File name of the run manifest inside the dataset directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One written file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// File name relative to the dataset directory.
    pub file: String,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the contents.
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteRecord {
    pub suite: Suite,
    /// Seed of the suite's own random stream.
    pub seed: u64,
    pub artifacts: Vec<ArtifactRecord>,
}

/// Everything needed to trace a set of artifacts back to its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: String,
    pub seed: u64,
    pub rng: RngSpec,
    pub sizes: SuiteSizes,
    pub suites: Vec<SuiteRecord>,
}

impl RunManifest {
    /// # Errors
    ///
    /// Returns a format error if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ColfixError::format("json", e))
    }

    /// # Errors
    ///
    /// Returns a format error if the JSON is malformed.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ColfixError::format("json", e))
    }

    /// Every artifact of every suite, in write order.
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.suites.iter().flat_map(|s| s.artifacts.iter())
    }

    pub fn scenario_count(&self) -> usize {
        self.artifacts()
            .filter(|a| a.file.ends_with(".dsl"))
            .count()
    }
}

/// Drives generation for one configuration.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: GeneratorConfig,
}

impl Orchestrator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Generate `suites` and write their artifacts plus `manifest.json`.
    ///
    /// # Errors
    ///
    /// Configuration errors before anything runs, scenario invariant errors
    /// before anything is written, and I/O errors while writing.
    pub fn generate(&self, suites: &[Suite]) -> Result<RunManifest> {
        self.config.validate()?;
        info!(
            target: TARGET,
            seed = self.config.seed,
            suites = suites.len(),
            dir = %self.config.dataset_dir.display(),
            "generation started"
        );

        let outputs = suites
            .iter()
            .map(|suite| {
                suite.generate(&self.config).inspect_err(|e| {
                    error!(target: TARGET, suite = suite.as_str(), error = %e, "suite aborted");
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let dir = &self.config.dataset_dir;
        fs::create_dir_all(dir).map_err(|e| ColfixError::BadDirectory {
            path: dir.clone(),
            detail: e.to_string(),
        })?;

        let mut records = Vec::with_capacity(outputs.len());
        for output in &outputs {
            records.push(write_suite(dir, output)?);
        }
        let manifest = RunManifest {
            schema_version: MANIFEST_SCHEMA_V1.to_owned(),
            seed: self.config.seed,
            rng: RngSpec::default(),
            sizes: self.config.sizes.clone(),
            suites: records,
        };
        fs::write(dir.join(MANIFEST_FILE), manifest.to_pretty_json()?)?;
        info!(
            target: TARGET,
            scenarios = manifest.scenario_count(),
            artifacts = manifest.artifacts().count(),
            "generation finished"
        );
        Ok(manifest)
    }
}

fn write_suite(dir: &Path, output: &SuiteOutput) -> Result<SuiteRecord> {
    let mut artifacts = Vec::new();
    for dataset in &output.datasets {
        let bytes = dataset.to_csv_bytes()?;
        artifacts.push(write_artifact(dir, dataset.file_name(), &bytes)?);
    }
    for generated in &output.scenarios {
        let stem = artifact_stem(generated.scenario.id);
        artifacts.push(write_artifact(
            dir,
            &format!("{stem}.dsl"),
            generated.script.as_bytes(),
        )?);
        artifacts.push(write_artifact(
            dir,
            &format!("{stem}.exp"),
            generated.expected.as_bytes(),
        )?);
    }
    info!(
        target: TARGET,
        suite = output.suite.as_str(),
        artifacts = artifacts.len(),
        "suite written"
    );
    Ok(SuiteRecord {
        suite: output.suite,
        seed: output.seed,
        artifacts,
    })
}

fn write_artifact(dir: &Path, file: &str, contents: &[u8]) -> Result<ArtifactRecord> {
    fs::write(dir.join(file), contents)?;
    let record = ArtifactRecord {
        file: file.to_owned(),
        bytes: contents.len() as u64,
        sha256: sha256_hex(contents),
    };
    debug!(target: TARGET, file, bytes = record.bytes, "artifact written");
    Ok(record)
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(dir: &Path) -> GeneratorConfig {
        GeneratorConfig {
            dataset_dir: dir.to_path_buf(),
            sizes: SuiteSizes::uniform(1_000),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn writes_scan_suite_and_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = Orchestrator::new(small_config(dir.path()))
            .generate(&[Suite::Scan])
            .expect("scan generates");
        assert_eq!(manifest.scenario_count(), 9);
        for name in ["data1_generated.csv", "test01gen.dsl", "test09gen.exp", MANIFEST_FILE] {
            assert!(dir.path().join(name).is_file(), "{name} missing");
        }
        let text = fs::read_to_string(dir.path().join(MANIFEST_FILE)).expect("manifest");
        let parsed = RunManifest::from_json(&text).expect("parses");
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.schema_version, MANIFEST_SCHEMA_V1);
    }

    #[test]
    fn invalid_config_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out");
        let mut config = small_config(&out);
        config.sizes.scan_rows = 0;
        let err = Orchestrator::new(config)
            .generate(&[Suite::Scan])
            .expect_err("rejected");
        assert!(err.is_configuration());
        assert!(!out.exists());
    }
}
