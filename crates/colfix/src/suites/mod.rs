//! The numbered test suites.
//!
//! Each suite synthesizes its tables, then builds its scenarios in id order
//! against one interpreter, so later scenarios see the mutations of earlier
//! ones exactly as the engine will. A suite draws every random value from its
//! own [`Synthesizer`], seeded by [`derive_suite_seed`], and therefore
//! produces the same artifacts whether it runs alone or with the others.

mod batch;
mod index;
mod join;
mod scan;
mod update;

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use colfix_error::{ColfixError, Result};
use colfix_types::TableRef;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GeneratorConfig;
use crate::dataset::Dataset;
use crate::interpret::Interpreter;
use crate::scenario::{GeneratedScenario, ScenarioBuilder};
use crate::synth::Synthesizer;
use crate::{DB_NAME, derive_suite_seed};

const TARGET: &str = "colfix.orchestrator";

/// How many parameter draws a suite makes before giving up on finding a
/// non-empty selection.
const MAX_REDRAWS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suite {
    Scan,
    Batch,
    Index,
    Join,
    Update,
}

impl Suite {
    pub const ALL: [Self; 5] = [Self::Scan, Self::Batch, Self::Index, Self::Join, Self::Update];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Batch => "batch",
            Self::Index => "index",
            Self::Join => "join",
            Self::Update => "update",
        }
    }

    /// Position in [`Self::ALL`], used for seed derivation.
    pub const fn index(self) -> u16 {
        match self {
            Self::Scan => 0,
            Self::Batch => 1,
            Self::Index => 2,
            Self::Join => 3,
            Self::Update => 4,
        }
    }

    /// Scenario ids the suite produces.
    pub const fn ids(self) -> RangeInclusive<u32> {
        match self {
            Self::Scan => 1..=9,
            Self::Batch => 10..=19,
            Self::Index => 20..=44,
            Self::Join => 45..=59,
            Self::Update => 60..=65,
        }
    }

    /// Only the scan suite runs `create(db,...)`; the others expect the
    /// database to exist.
    pub const fn creates_database(self) -> bool {
        matches!(self, Self::Scan)
    }

    /// Parse a launcher argument: a suite name or `all`.
    ///
    /// # Errors
    ///
    /// A configuration error for anything else.
    pub fn parse_selection(arg: &str) -> Result<Vec<Self>> {
        if arg == "all" {
            Ok(Self::ALL.to_vec())
        } else {
            arg.parse().map(|s| vec![s])
        }
    }

    /// Synthesize the suite's datasets and build its scenarios in memory.
    ///
    /// # Errors
    ///
    /// The first configuration or scenario invariant error; nothing is
    /// written by this call.
    pub fn generate(self, config: &GeneratorConfig) -> Result<SuiteOutput> {
        let seed = derive_suite_seed(config.seed, self.index());
        info!(target: TARGET, suite = self.as_str(), seed, "generating suite");
        let mut cx = SuiteContext::new(config, self, seed);
        match self {
            Self::Scan => scan::build(&mut cx)?,
            Self::Batch => batch::build(&mut cx)?,
            Self::Index => index::build(&mut cx)?,
            Self::Join => join::build(&mut cx)?,
            Self::Update => update::build(&mut cx)?,
        }
        let ids: Vec<u32> = cx.scenarios.iter().map(|s| s.scenario.id).collect();
        if !ids.iter().copied().eq(self.ids()) {
            return Err(ColfixError::invariant(format!(
                "suite {self} built scenarios {ids:?}"
            )));
        }
        info!(
            target: TARGET,
            suite = self.as_str(),
            scenarios = cx.scenarios.len(),
            datasets = cx.datasets.len(),
            "suite generated"
        );
        Ok(SuiteOutput {
            suite: self,
            seed,
            datasets: cx.datasets,
            scenarios: cx.scenarios,
        })
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suite {
    type Err = ColfixError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|suite| suite.as_str() == s)
            .ok_or_else(|| {
                ColfixError::config(
                    "suite",
                    format!("unknown suite {s:?}; expected scan, batch, index, join, update or all"),
                )
            })
    }
}

/// Everything one suite produced, not yet written.
#[derive(Debug, Clone)]
pub struct SuiteOutput {
    pub suite: Suite,
    pub seed: u64,
    pub datasets: Vec<Dataset>,
    pub scenarios: Vec<GeneratedScenario>,
}

/// State threaded through a suite's builders.
pub(crate) struct SuiteContext<'c> {
    pub(crate) config: &'c GeneratorConfig,
    pub(crate) synth: Synthesizer,
    pub(crate) interp: Interpreter,
    pub(crate) datasets: Vec<Dataset>,
    pub(crate) scenarios: Vec<GeneratedScenario>,
}

impl<'c> SuiteContext<'c> {
    fn new(config: &'c GeneratorConfig, suite: Suite, seed: u64) -> Self {
        let interp = if suite.creates_database() {
            Interpreter::new()
        } else {
            Interpreter::with_database(DB_NAME)
        };
        Self {
            config,
            synth: Synthesizer::new(seed),
            interp,
            datasets: Vec::new(),
            scenarios: Vec::new(),
        }
    }

    /// Register a dataset for `load` steps and for writing.
    pub(crate) fn add_dataset(&mut self, dataset: Dataset) {
        self.interp.register_dataset(dataset.clone());
        self.datasets.push(dataset);
    }

    /// `load(...)` path of a dataset file.
    pub(crate) fn load_path(&self, file_name: &str) -> String {
        self.config.engine_path(file_name)
    }

    /// Start scenario `id`. Takes the fields apart so that the builder and
    /// the synthesizer can be used side by side.
    pub(crate) fn scenario(&mut self, id: u32) -> Result<(ScenarioBuilder<'_>, &mut Synthesizer)> {
        Ok((ScenarioBuilder::new(id, &mut self.interp)?, &mut self.synth))
    }
}

/// `db1.<name>`
pub(crate) fn table(name: &str) -> Result<TableRef> {
    TableRef::new(DB_NAME, name)
}

/// `col1` .. `col{n}`
pub(crate) fn column_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("col{i}")).collect()
}

/// A dataset whose columns are named `col1` .. `col{n}`.
pub(crate) fn numbered_dataset(
    file_name: &str,
    table: &TableRef,
    columns: Vec<Vec<i64>>,
) -> Result<Dataset> {
    let names = column_names(columns.len());
    Dataset::new(file_name, table.clone(), names.into_iter().zip(columns).collect())
}

/// Declare `table` with numbered columns and load it from `load_path`.
pub(crate) fn create_and_load(
    b: &mut ScenarioBuilder<'_>,
    table: &TableRef,
    columns: usize,
    load_path: String,
) -> Result<()> {
    let names = column_names(columns);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    b.create_table(table, &names)?;
    b.load(load_path)
}

/// Row count as a value bound.
pub(crate) fn rows_i64(rows: usize) -> Result<i64> {
    i64::try_from(rows).map_err(|_| ColfixError::config("rows", format!("{rows} is too large")))
}

/// `floor(rows * fraction)`, as the historical scripts computed bounds.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn scaled(rows: i64, fraction: f64) -> i64 {
    (rows as f64 * fraction) as i64
}

/// Draw with `draw` until `accept` holds, so that `min`/`max` and chained
/// selects are never asked to work on an empty selection.
pub(crate) fn draw_until<T>(
    synth: &mut Synthesizer,
    mut draw: impl FnMut(&mut Synthesizer) -> Result<T>,
    accept: impl Fn(&T) -> bool,
) -> Result<T> {
    for _ in 0..MAX_REDRAWS {
        let candidate = draw(synth)?;
        if accept(&candidate) {
            return Ok(candidate);
        }
    }
    Err(ColfixError::invariant(format!(
        "no non-empty selection after {MAX_REDRAWS} draws"
    )))
}

/// Draw `n` query parameters up front, for scenario pairs that must run the
/// same queries.
pub(crate) fn draw_many(
    synth: &mut Synthesizer,
    n: usize,
    low: i64,
    high: i64,
) -> Result<Vec<i64>> {
    (0..n).map(|_| synth.pick(low, high)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteSizes;

    #[test]
    fn suite_names_round_trip() {
        for suite in Suite::ALL {
            assert_eq!(suite.as_str().parse::<Suite>().expect("known"), suite);
        }
        assert!("scans".parse::<Suite>().is_err());
        assert_eq!(Suite::parse_selection("all").expect("all").len(), 5);
    }

    #[test]
    fn ids_cover_one_to_sixty_five() {
        let ids: Vec<u32> = Suite::ALL.into_iter().flat_map(Suite::ids).collect();
        assert_eq!(ids, (1..=65).collect::<Vec<_>>());
    }

    #[test]
    fn every_suite_builds_at_small_sizes() {
        let config = GeneratorConfig {
            sizes: SuiteSizes::uniform(1_000),
            ..GeneratorConfig::default()
        };
        for suite in Suite::ALL {
            let out = suite.generate(&config).expect("suite builds");
            assert_eq!(out.scenarios.len(), suite.ids().count(), "{suite}");
            assert!(!out.datasets.is_empty(), "{suite}");
        }
    }

    #[test]
    fn draw_until_gives_up() {
        let mut s = Synthesizer::new(1);
        let err = draw_until(&mut s, |s| s.pick(0, 10), |_| false).expect_err("never accepted");
        assert!(err.to_string().contains("draws"));
    }
}
