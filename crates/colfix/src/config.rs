//! Generator configuration.
//!
//! One [`GeneratorConfig`] is threaded through every suite; nothing reads
//! paths or sizes from globals. Values come from [`Default`], optionally a
//! JSON file, then the `COLFIX_SEED` environment variable, then launcher
//! flags, and are checked by [`GeneratorConfig::validate`] before any
//! generation starts.

use std::fs;
use std::path::{Path, PathBuf};

use colfix_error::{ColfixError, Result};
use serde::{Deserialize, Serialize};

use crate::{COLFIX_SEED, SEED_ENV, SEED_MIN};

/// Smallest row count any suite accepts. Below this the selectivity windows
/// of the historical scenarios collapse to nothing.
pub const MIN_ROWS: usize = 100;

/// Largest row count any suite accepts; keeps every generated value inside
/// the engine's 4-byte integer storage.
pub const MAX_ROWS: usize = 50_000_000;

/// The update suite performs 100 random deletes and needs enough rows left
/// afterwards to pick random positions from.
pub const MIN_UPDATE_ROWS: usize = 1_000;

/// Row counts and distribution parameters, one knob per suite table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteSizes {
    /// Rows of `tbl2` (the check-in table `tbl1` is always 1000 rows).
    pub scan_rows: usize,
    /// Rows of `tbl3_batch`.
    pub batch_rows: usize,
    /// Rows of `tbl4_ctrl`, `tbl4` and `tbl4_clustered_btree`.
    pub index_rows: usize,
    /// Rows of `tbl5_fact`.
    pub fact_rows: usize,
    /// Rows of `tbl5_dim1`.
    pub dim1_rows: usize,
    /// Rows of `tbl5_dim2`.
    pub dim2_rows: usize,
    /// Rows of each of `tbl5_sel1` and `tbl5_sel2`.
    pub selectivity_rows: usize,
    /// Rows of `tbl5` before the update scenarios run.
    pub update_rows: usize,
    /// Zipf exponent of the join key columns.
    pub zipf_exponent: f64,
    /// Distinct join key values.
    pub zipf_distinct: usize,
}

impl Default for SuiteSizes {
    fn default() -> Self {
        Self {
            scan_rows: 10_000,
            batch_rows: 10_000,
            index_rows: 10_000,
            fact_rows: 10_000,
            dim1_rows: 1_000,
            dim2_rows: 1_000,
            selectivity_rows: 10_000,
            update_rows: 10_000,
            zipf_exponent: 1.0,
            zipf_distinct: 100,
        }
    }
}

impl SuiteSizes {
    /// Every suite table at `rows` rows, dimensions at a tenth of that.
    pub fn uniform(rows: usize) -> Self {
        Self {
            scan_rows: rows,
            batch_rows: rows,
            index_rows: rows,
            fact_rows: rows,
            dim1_rows: (rows / 10).max(MIN_ROWS),
            dim2_rows: (rows / 10).max(MIN_ROWS),
            selectivity_rows: rows,
            update_rows: rows.max(MIN_UPDATE_ROWS),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        let tables = [
            ("scan_rows", self.scan_rows),
            ("batch_rows", self.batch_rows),
            ("index_rows", self.index_rows),
            ("fact_rows", self.fact_rows),
            ("dim1_rows", self.dim1_rows),
            ("dim2_rows", self.dim2_rows),
            ("selectivity_rows", self.selectivity_rows),
            ("update_rows", self.update_rows),
        ];
        for (field, rows) in tables {
            if !(MIN_ROWS..=MAX_ROWS).contains(&rows) {
                return Err(ColfixError::config(
                    field,
                    format!("{rows} rows is outside {MIN_ROWS}..={MAX_ROWS}"),
                ));
            }
        }
        if self.update_rows < MIN_UPDATE_ROWS {
            return Err(ColfixError::config(
                "update_rows",
                format!("needs at least {MIN_UPDATE_ROWS} rows, got {}", self.update_rows),
            ));
        }
        if !self.zipf_exponent.is_finite() || self.zipf_exponent <= 0.0 || self.zipf_distinct < 1 {
            return Err(ColfixError::InvalidZipf {
                exponent: self.zipf_exponent,
                n_distinct: self.zipf_distinct,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Where datasets, scripts, expected outputs and the manifest are written.
    pub dataset_dir: PathBuf,
    /// Directory the engine sees the datasets under, used in `load(...)`.
    /// Empty means the same as `dataset_dir`.
    pub engine_path_prefix: String,
    /// Run seed; suites derive their own streams from it.
    pub seed: u64,
    pub sizes: SuiteSizes,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("generated_data"),
            engine_path_prefix: String::new(),
            seed: COLFIX_SEED,
            sizes: SuiteSizes::default(),
        }
    }
}

impl GeneratorConfig {
    /// Read a config from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// I/O errors, or a format error for malformed JSON.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| ColfixError::format("json", e))
    }

    /// Apply `COLFIX_SEED` if set.
    ///
    /// # Errors
    ///
    /// A configuration error if the variable is set but not a `u64`.
    pub fn apply_env(&mut self) -> Result<()> {
        match std::env::var(SEED_ENV) {
            Ok(raw) => {
                self.seed = raw.trim().parse::<u64>().map_err(|e| {
                    ColfixError::config("seed", format!("{SEED_ENV}={raw:?}: {e}"))
                })?;
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    /// # Errors
    ///
    /// A configuration error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.seed < SEED_MIN {
            return Err(ColfixError::config("seed", "0 is reserved"));
        }
        if self.dataset_dir.as_os_str().is_empty() {
            return Err(ColfixError::config("dataset_dir", "must not be empty"));
        }
        if self.dataset_dir.is_file() {
            return Err(ColfixError::BadDirectory {
                path: self.dataset_dir.clone(),
                detail: "is a regular file".to_owned(),
            });
        }
        if self.engine_path_prefix.contains('"') {
            return Err(ColfixError::config(
                "engine_path_prefix",
                "must not contain a double quote",
            ));
        }
        self.sizes.validate()
    }

    /// Path written into `load(...)` for a dataset file.
    pub fn engine_path(&self, file_name: &str) -> String {
        if self.engine_path_prefix.is_empty() {
            self.dataset_dir.join(file_name).display().to_string()
        } else {
            format!("{}/{file_name}", self.engine_path_prefix.trim_end_matches('/'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GeneratorConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn rejects_small_tables() {
        let mut config = GeneratorConfig::default();
        config.sizes.batch_rows = 10;
        let err = config.validate().expect_err("too small");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("batch_rows"));
    }

    #[test]
    fn rejects_bad_zipf() {
        for (exponent, distinct) in [(0.0, 10), (-1.0, 10), (f64::NAN, 10), (1.0, 0)] {
            let mut config = GeneratorConfig::default();
            config.sizes.zipf_exponent = exponent;
            config.sizes.zipf_distinct = distinct;
            assert!(matches!(
                config.validate(),
                Err(ColfixError::InvalidZipf { .. })
            ));
        }
    }

    #[test]
    fn rejects_reserved_seed() {
        let config = GeneratorConfig {
            seed: 0,
            ..GeneratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn engine_path_uses_prefix() {
        let mut config = GeneratorConfig::default();
        config.engine_path_prefix = "/cs165/staff_test/".to_owned();
        assert_eq!(
            config.engine_path("data1_generated.csv"),
            "/cs165/staff_test/data1_generated.csv"
        );
        config.engine_path_prefix.clear();
        assert!(config.engine_path("x.csv").ends_with("x.csv"));
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: GeneratorConfig =
            serde_json::from_str(r#"{"seed": 7, "sizes": {"scan_rows": 500}}"#).expect("parse");
        assert_eq!(config.seed, 7);
        assert_eq!(config.sizes.scan_rows, 500);
        assert_eq!(config.sizes.batch_rows, SuiteSizes::default().batch_rows);
    }

    #[test]
    fn uniform_sizes_validate() {
        let config = GeneratorConfig {
            sizes: SuiteSizes::uniform(200),
            ..GeneratorConfig::default()
        };
        config.validate().expect("uniform sizes are valid");
        assert_eq!(config.sizes.update_rows, MIN_UPDATE_ROWS);
    }
}
