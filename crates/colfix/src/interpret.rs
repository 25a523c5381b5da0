//! Step interpreter: evaluates scenario steps against the oracle.
//!
//! The interpreter owns the database, the datasets that `load` steps refer
//! to, and the handle environment of the scenario in progress. It enforces
//! the statement rules the engine assumes:
//!
//! - every handle is bound once per scenario and used only after binding;
//! - a handle derived from a table is unusable once that table is mutated;
//! - positions fetch, update or delete only rows of the table they were
//!   selected from;
//! - a batch holds only selects over inputs bound before the batch opened;
//! - a batch may sit inside a single-core bracket, never the reverse;
//! - brackets close before `shutdown` and before the scenario ends.

use std::collections::HashMap;
use std::path::PathBuf;

use colfix_error::{ColfixError, Result};
use colfix_oracle as oracle;
use colfix_types::{
    ColumnRef, Database, Handle, PositionSet, Scalar, Table, TableRef, Vector,
};
use tracing::{debug, trace};

use crate::dataset::Dataset;
use crate::render::{self, ExpectedDocument, Printable};
use crate::scenario::{Source, Step};

const TARGET: &str = "colfix.scenario";

/// A bound handle's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Positions(PositionSet),
    Vector(Vector),
    Scalar(Scalar),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Positions(_) => "positions",
            Self::Vector(_) => "vector",
            Self::Scalar(_) => "scalar",
        }
    }
}

/// Table name and version a value was derived from.
type Provenance = Vec<(String, u64)>;

#[derive(Debug)]
struct Binding {
    value: Value,
    derived_from: Provenance,
}

/// Per-scenario state.
#[derive(Debug)]
struct Frame {
    id: u32,
    env: HashMap<Handle, Binding>,
    /// Handles bound since `batch_queries()`, `None` outside a batch.
    batch: Option<Vec<Handle>>,
    single_core: bool,
    shut_down: bool,
    output: ExpectedDocument,
}

impl Frame {
    fn new(id: u32) -> Self {
        Self {
            id,
            env: HashMap::new(),
            batch: None,
            single_core: false,
            shut_down: false,
            output: ExpectedDocument::new(),
        }
    }

    /// Look up a handle, rejecting it if any table it was derived from has
    /// changed since.
    fn get(&self, db: &Database, handle: &Handle) -> Result<&Binding> {
        let binding = self.env.get(handle).ok_or_else(|| ColfixError::UnknownHandle {
            name: handle.to_string(),
        })?;
        for (table, version) in &binding.derived_from {
            if db.table(table)?.version() != *version {
                return Err(ColfixError::StaleHandle {
                    name: handle.to_string(),
                    table: table.clone(),
                });
            }
        }
        Ok(binding)
    }

    fn positions(&self, db: &Database, handle: &Handle) -> Result<(&PositionSet, &Provenance)> {
        let b = self.get(db, handle)?;
        match &b.value {
            Value::Positions(p) => Ok((p, &b.derived_from)),
            other => Err(wrong_kind(handle, "positions", other)),
        }
    }

    /// Positions that must index rows of `table`: the handle has to be
    /// derived from that table, not merely be in range for it.
    fn positions_of(
        &self,
        db: &Database,
        handle: &Handle,
        table: &str,
    ) -> Result<(&PositionSet, &Provenance)> {
        let (p, from) = self.positions(db, handle)?;
        if !from.iter().any(|(name, _)| name == table) {
            return Err(ColfixError::invariant(format!(
                "positions {handle} were not selected from table {table}"
            )));
        }
        Ok((p, from))
    }

    fn vector(&self, db: &Database, handle: &Handle) -> Result<(&Vector, &Provenance)> {
        let b = self.get(db, handle)?;
        match &b.value {
            Value::Vector(v) => Ok((v, &b.derived_from)),
            other => Err(wrong_kind(handle, "vector", other)),
        }
    }

    fn bind(&mut self, handle: &Handle, value: Value, derived_from: Provenance) -> Result<()> {
        if self.env.contains_key(handle) {
            return Err(ColfixError::DuplicateHandle {
                name: handle.to_string(),
            });
        }
        trace!(target: TARGET, handle = %handle, kind = value.kind(), "bind");
        if let Some(batch) = self.batch.as_mut() {
            batch.push(handle.clone());
        }
        self.env.insert(
            handle.clone(),
            Binding {
                value,
                derived_from,
            },
        );
        Ok(())
    }

    fn bound_in_batch(&self, handle: &Handle) -> bool {
        self.batch.as_ref().is_some_and(|b| b.contains(handle))
    }
}

fn wrong_kind(handle: &Handle, expected: &'static str, actual: &Value) -> ColfixError {
    ColfixError::HandleKind {
        name: handle.to_string(),
        expected,
        actual: actual.kind(),
    }
}

fn illegal(step: &Step, context: &'static str) -> ColfixError {
    ColfixError::IllegalStatement {
        statement: step.keyword().to_owned(),
        context,
    }
}

fn merge(a: &Provenance, b: &Provenance) -> Provenance {
    let mut out = a.clone();
    for entry in b {
        if !out.contains(entry) {
            out.push(entry.clone());
        }
    }
    out
}

/// Evaluates steps one scenario at a time. The database persists across
/// scenarios the way the engine's state persists across client sessions.
#[derive(Debug, Default)]
pub struct Interpreter {
    database: Option<Database>,
    datasets: HashMap<String, Dataset>,
    dataset_dir: Option<PathBuf>,
    frame: Option<Frame>,
}

impl Interpreter {
    /// An interpreter with no database; the first scenario must create it.
    pub fn new() -> Self {
        Self::default()
    }

    /// An interpreter whose database already exists, as after an earlier
    /// run of the suite that creates it.
    pub fn with_database(name: &str) -> Self {
        Self {
            database: Some(Database::new(name)),
            ..Self::default()
        }
    }

    /// Read datasets that were not registered from `dir` on first `load`.
    #[must_use]
    pub fn with_dataset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dataset_dir = Some(dir.into());
        self
    }

    /// Make a dataset available to `load` steps under its file name.
    pub fn register_dataset(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.file_name().to_owned(), dataset);
    }

    pub fn into_database(self) -> Option<Database> {
        self.database
    }

    fn db(&self) -> Result<&Database> {
        self.database
            .as_ref()
            .ok_or_else(|| ColfixError::invariant("no database has been created"))
    }

    /// # Errors
    ///
    /// `NoSuchTable` if the database is missing, has another name, or lacks
    /// the table.
    pub fn table(&self, table: &TableRef) -> Result<&Table> {
        let db = self.db()?;
        if db.name() != table.db {
            return Err(ColfixError::NoSuchTable {
                name: table.to_string(),
            });
        }
        db.table(&table.table)
    }

    /// Open scenario `id` with an empty handle environment.
    ///
    /// # Errors
    ///
    /// An invariant violation if another scenario is still open.
    pub fn begin(&mut self, id: u32) -> Result<()> {
        if let Some(open) = &self.frame {
            return Err(ColfixError::invariant(format!(
                "scenario {} is still open",
                open.id
            )));
        }
        debug!(target: TARGET, scenario = id, "begin");
        self.frame = Some(Frame::new(id));
        Ok(())
    }

    /// Close the scenario in progress and return its expected output.
    ///
    /// # Errors
    ///
    /// `IllegalStatement` if a bracket is still open. The scenario is
    /// closed either way.
    pub fn finish(&mut self) -> Result<String> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| ColfixError::invariant("no scenario in progress"))?;
        if frame.batch.is_some() {
            return Err(ColfixError::IllegalStatement {
                statement: "batch_queries".to_owned(),
                context: "without a matching batch_execute",
            });
        }
        if frame.single_core {
            return Err(ColfixError::IllegalStatement {
                statement: "single_core".to_owned(),
                context: "without a matching single_core_execute",
            });
        }
        debug!(
            target: TARGET,
            scenario = frame.id,
            handles = frame.env.len(),
            "finish"
        );
        Ok(frame.output.render())
    }

    /// Evaluate one step.
    ///
    /// # Errors
    ///
    /// Any scenario invariant violation. Oracle mutations are atomic, so on
    /// error the database is as it was before the step.
    pub fn execute(&mut self, step: &Step) -> Result<()> {
        let Self {
            database,
            datasets,
            dataset_dir,
            frame,
        } = self;
        let frame = frame
            .as_mut()
            .ok_or_else(|| ColfixError::invariant("no scenario in progress"))?;
        trace!(target: TARGET, scenario = frame.id, statement = step.keyword(), "execute");

        match step {
            Step::Comment(_) => return Ok(()),
            Step::Gap => {
                frame.output.gap();
                return Ok(());
            }
            _ if frame.shut_down => return Err(illegal(step, "after shutdown")),
            _ => {}
        }
        if frame.batch.is_some() {
            match step {
                Step::Select { .. } | Step::BatchExecute => {}
                Step::SelectOn {
                    positions, values, ..
                } => {
                    if frame.bound_in_batch(positions) || frame.bound_in_batch(values) {
                        return Err(illegal(step, "on a result of the same batch"));
                    }
                }
                _ => return Err(illegal(step, "inside a batch")),
            }
        }

        match step {
            Step::Comment(_) | Step::Gap => Ok(()),
            Step::CreateDb { name } => {
                if let Some(db) = database {
                    return Err(ColfixError::AlreadyExists {
                        name: db.name().to_owned(),
                    });
                }
                *database = Some(Database::new(name.as_str()));
                Ok(())
            }
            Step::CreateTable { table, columns } => {
                table_db(database, table)?.create_table(&table.table, *columns)?;
                Ok(())
            }
            Step::CreateColumn { column } => {
                table_mut(database, &column.table)?.add_column(&column.column)
            }
            Step::CreateIndex { column, spec } => {
                table_mut(database, &column.table)?.set_index(&column.column, *spec)
            }
            Step::Load { path } => {
                let file_name = path.rsplit('/').next().unwrap_or(path);
                let dataset = resolve_dataset(datasets, dataset_dir.as_ref(), file_name)?;
                let table = table_mut(database, dataset.table())?;
                let names: Vec<&str> = table.columns().iter().map(|c| c.name()).collect();
                let loaded: Vec<&str> = dataset.columns().iter().map(|c| c.name()).collect();
                if names != loaded {
                    return Err(ColfixError::invariant(format!(
                        "{file_name} has columns {loaded:?}, {} declares {names:?}",
                        dataset.table()
                    )));
                }
                table.load(
                    dataset
                        .columns()
                        .iter()
                        .map(|c| c.values().to_vec())
                        .collect(),
                )?;
                debug!(
                    target: TARGET,
                    file = file_name,
                    table = %dataset.table(),
                    rows = dataset.row_count(),
                    "load"
                );
                Ok(())
            }
            Step::Select {
                out,
                column,
                predicate,
            } => {
                let (values, from) = column_values(database, column)?;
                let result = oracle::select(values, *predicate);
                frame.bind(out, Value::Positions(result), from)
            }
            Step::SelectOn {
                out,
                positions,
                values,
                predicate,
            } => {
                let db = require(database)?;
                let (p, pf) = frame.positions(db, positions)?;
                let (v, vf) = frame.vector(db, values)?;
                let result = oracle::select_on(p, v, *predicate)?;
                let from = merge(pf, vf);
                frame.bind(out, Value::Positions(result), from)
            }
            Step::Fetch {
                out,
                column,
                positions,
            } => {
                let (values, cf) = column_values(database, column)?;
                let db = require(database)?;
                let (p, pf) = frame.positions_of(db, positions, &column.table.table)?;
                let result = oracle::fetch(values, p)?;
                let from = merge(&cf, pf);
                frame.bind(out, Value::Vector(result), from)
            }
            Step::Aggregate { out, kind, source } => {
                let result = match source {
                    Source::Handle(h) => {
                        let (v, _) = frame.vector(require(database)?, h)?;
                        oracle::aggregate(v.as_slice(), *kind)?
                    }
                    Source::Column(c) => oracle::aggregate(column_values(database, c)?.0, *kind)?,
                };
                frame.bind(out, Value::Scalar(result), Vec::new())
            }
            Step::Arith {
                out,
                op,
                left,
                right,
            } => {
                let db = require(database)?;
                let (a, af) = frame.vector(db, left)?;
                let (b, bf) = frame.vector(db, right)?;
                let result = oracle::elementwise(a, b, *op)?;
                let from = merge(af, bf);
                frame.bind(out, Value::Vector(result), from)
            }
            Step::Join {
                left_out,
                right_out,
                left_values,
                left_positions,
                right_values,
                right_positions,
                strategy,
            } => {
                if left_out == right_out {
                    return Err(ColfixError::DuplicateHandle {
                        name: left_out.to_string(),
                    });
                }
                let db = require(database)?;
                let (lv, lvf) = frame.vector(db, left_values)?;
                let (lp, lpf) = frame.positions(db, left_positions)?;
                let (rv, rvf) = frame.vector(db, right_values)?;
                let (rp, rpf) = frame.positions(db, right_positions)?;
                let result = oracle::join(lv, lp, rv, rp, *strategy)?;
                let left_from = merge(lvf, lpf);
                let right_from = merge(rvf, rpf);
                let (l, r) = result.into_parts();
                frame.bind(left_out, Value::Positions(l), left_from)?;
                frame.bind(right_out, Value::Positions(r), right_from)
            }
            Step::Insert { table, values } => {
                check_storable(values.iter().copied())?;
                oracle::insert(table_mut(database, table)?, values)
            }
            Step::Update {
                column,
                positions,
                value,
            } => {
                check_storable(std::iter::once(*value))?;
                let (p, _) =
                    frame.positions_of(require(database)?, positions, &column.table.table)?;
                let p = p.clone();
                oracle::update(
                    table_mut(database, &column.table)?,
                    &p,
                    &column.column,
                    *value,
                )
            }
            Step::Delete { table, positions } => {
                let (p, _) = frame.positions_of(require(database)?, positions, &table.table)?;
                let p = p.clone();
                oracle::delete(table_mut(database, table)?, &p)
            }
            Step::Print { handles } => {
                let db = require(database)?;
                let items = handles
                    .iter()
                    .map(|h| match &frame.get(db, h)?.value {
                        Value::Scalar(s) => Ok(Printable::Scalar(*s)),
                        Value::Vector(v) => Ok(Printable::Vector(v)),
                        other @ Value::Positions(_) => {
                            Err(wrong_kind(h, "vector or scalar", other))
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                let lines = render::print_lines(&items)?;
                frame.output.push_lines(lines);
                Ok(())
            }
            Step::BatchBegin => {
                frame.batch = Some(Vec::new());
                Ok(())
            }
            Step::BatchExecute => match frame.batch.take() {
                Some(bound) => {
                    debug!(target: TARGET, queries = bound.len(), "batch");
                    Ok(())
                }
                None => Err(illegal(step, "without batch_queries")),
            },
            Step::SingleCore => {
                if frame.single_core {
                    return Err(illegal(step, "inside another single_core"));
                }
                frame.single_core = true;
                Ok(())
            }
            Step::SingleCoreExecute => {
                if !frame.single_core {
                    return Err(illegal(step, "without single_core"));
                }
                frame.single_core = false;
                Ok(())
            }
            Step::Shutdown => {
                if frame.single_core {
                    return Err(illegal(step, "inside single_core"));
                }
                frame.shut_down = true;
                Ok(())
            }
        }
    }
}

fn require(database: &Option<Database>) -> Result<&Database> {
    database
        .as_ref()
        .ok_or_else(|| ColfixError::invariant("no database has been created"))
}

fn table_db<'a>(database: &'a mut Option<Database>, table: &TableRef) -> Result<&'a mut Database> {
    match database.as_mut() {
        Some(db) if db.name() == table.db => Ok(db),
        Some(_) => Err(ColfixError::NoSuchTable {
            name: table.to_string(),
        }),
        None => Err(ColfixError::invariant("no database has been created")),
    }
}

fn table_mut<'a>(database: &'a mut Option<Database>, table: &TableRef) -> Result<&'a mut Table> {
    table_db(database, table)?.table_mut(&table.table)
}

/// Values of a column with the provenance of a value read from it.
fn column_values<'a>(
    database: &'a Option<Database>,
    column: &ColumnRef,
) -> Result<(&'a [i64], Provenance)> {
    let db = require(database)?;
    if db.name() != column.table.db {
        return Err(ColfixError::NoSuchTable {
            name: column.table.to_string(),
        });
    }
    let table = db.table(&column.table.table)?;
    let values = table.column(&column.column)?.values();
    Ok((values, vec![(table.name().to_owned(), table.version())]))
}

fn resolve_dataset<'a>(
    datasets: &'a mut HashMap<String, Dataset>,
    dir: Option<&PathBuf>,
    file_name: &str,
) -> Result<&'a Dataset> {
    if !datasets.contains_key(file_name) {
        let Some(dir) = dir else {
            return Err(ColfixError::invariant(format!(
                "load of unknown dataset {file_name}"
            )));
        };
        let dataset = Dataset::read_from_dir(dir, file_name)?;
        datasets.insert(file_name.to_owned(), dataset);
    }
    datasets
        .get(file_name)
        .ok_or_else(|| ColfixError::invariant(format!("load of unknown dataset {file_name}")))
}

/// Engine columns hold 4-byte integers.
fn check_storable(values: impl IntoIterator<Item = i64>) -> Result<()> {
    for v in values {
        if i32::try_from(v).is_err() {
            return Err(ColfixError::invariant(format!(
                "value {v} does not fit a 4-byte integer"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colfix_types::{AggregateKind, RangePredicate};

    fn h(name: &str) -> Handle {
        Handle::new(name).expect("handle")
    }

    fn tbl() -> TableRef {
        TableRef::new("db1", "t").expect("table")
    }

    fn col(name: &str) -> ColumnRef {
        tbl().column(name).expect("column")
    }

    /// Database with `t(a, b)` loaded from a registered dataset.
    fn loaded() -> Interpreter {
        let mut interp = Interpreter::new();
        interp.register_dataset(
            Dataset::new(
                "t.csv",
                tbl(),
                vec![
                    ("a".into(), vec![0, 1, 2, 3, 4]),
                    ("b".into(), vec![10, 11, 12, 13, 14]),
                ],
            )
            .expect("dataset"),
        );
        interp.begin(0).expect("begin");
        for step in [
            Step::CreateDb { name: "db1".into() },
            Step::CreateTable {
                table: tbl(),
                columns: 2,
            },
            Step::CreateColumn { column: col("a") },
            Step::CreateColumn { column: col("b") },
            Step::Load {
                path: "/data/t.csv".into(),
            },
        ] {
            interp.execute(&step).expect("setup step");
        }
        interp.finish().expect("finish");
        interp
    }

    fn select(out: &str, column: &str, predicate: RangePredicate) -> Step {
        Step::Select {
            out: h(out),
            column: col(column),
            predicate,
        }
    }

    #[test]
    fn select_fetch_print() {
        let mut interp = loaded();
        interp.begin(1).expect("begin");
        interp
            .execute(&select("s1", "a", RangePredicate::below(2)))
            .expect("select");
        interp
            .execute(&Step::Fetch {
                out: h("f1"),
                column: col("b"),
                positions: h("s1"),
            })
            .expect("fetch");
        interp
            .execute(&Step::Print {
                handles: vec![h("f1")],
            })
            .expect("print");
        assert_eq!(interp.finish().expect("finish"), "10\n11\n");
    }

    #[test]
    fn handles_are_scoped_to_one_scenario() {
        let mut interp = loaded();
        interp.begin(1).expect("begin");
        interp
            .execute(&select("s1", "a", RangePredicate::below(2)))
            .expect("select");
        assert!(matches!(
            interp.execute(&select("s1", "a", RangePredicate::below(3))),
            Err(ColfixError::DuplicateHandle { .. })
        ));
        interp.finish().expect("finish");
        interp.begin(2).expect("begin");
        assert!(matches!(
            interp.execute(&Step::Print {
                handles: vec![h("s1")]
            }),
            Err(ColfixError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn mutation_makes_handles_stale() {
        let mut interp = loaded();
        interp.begin(1).expect("begin");
        interp
            .execute(&select("s1", "a", RangePredicate::at_least(3)))
            .expect("select");
        interp
            .execute(&Step::Insert {
                table: tbl(),
                values: vec![9, 19],
            })
            .expect("insert");
        let err = interp
            .execute(&Step::Fetch {
                out: h("f1"),
                column: col("b"),
                positions: h("s1"),
            })
            .expect_err("stale");
        assert!(matches!(err, ColfixError::StaleHandle { .. }));
    }

    #[test]
    fn aggregates_survive_mutation() {
        let mut interp = loaded();
        interp.begin(1).expect("begin");
        interp
            .execute(&Step::Aggregate {
                out: h("a1"),
                kind: AggregateKind::Sum,
                source: Source::Column(col("a")),
            })
            .expect("sum");
        interp
            .execute(&Step::Insert {
                table: tbl(),
                values: vec![5, 15],
            })
            .expect("insert");
        interp
            .execute(&Step::Print {
                handles: vec![h("a1")],
            })
            .expect("print scalar");
        assert_eq!(interp.finish().expect("finish"), "10\n");
    }

    #[test]
    fn batch_rejects_dependent_selects_and_mutations() {
        let mut interp = loaded();
        interp.begin(1).expect("begin");
        interp.execute(&Step::BatchBegin).expect("batch");
        interp
            .execute(&select("s1", "a", RangePredicate::below(3)))
            .expect("select");
        assert!(
            interp
                .execute(&Step::Insert {
                    table: tbl(),
                    values: vec![1, 1],
                })
                .is_err()
        );
        assert!(interp.execute(&Step::SingleCore).is_err());
        interp.execute(&Step::BatchExecute).expect("execute");
        assert!(interp.execute(&Step::BatchExecute).is_err());
    }

    #[test]
    fn brackets_must_close() {
        let mut interp = loaded();
        interp.begin(1).expect("begin");
        interp.execute(&Step::SingleCore).expect("single core");
        interp.execute(&Step::BatchBegin).expect("batch in single core");
        interp.execute(&Step::BatchExecute).expect("close batch");
        assert!(interp.execute(&Step::Shutdown).is_err());
        assert!(interp.finish().is_err());

        interp.begin(2).expect("begin after failed finish");
        interp.execute(&Step::Shutdown).expect("shutdown");
        assert!(
            interp
                .execute(&select("s1", "a", RangePredicate::below(1)))
                .is_err()
        );
        interp
            .execute(&Step::Comment("after".into()))
            .expect("comments are fine");
    }

    #[test]
    fn load_checks_declared_columns() {
        let mut interp = Interpreter::new();
        interp.register_dataset(
            Dataset::new("t.csv", tbl(), vec![("x".into(), vec![1])]).expect("dataset"),
        );
        interp.begin(0).expect("begin");
        interp
            .execute(&Step::CreateDb { name: "db1".into() })
            .expect("db");
        interp
            .execute(&Step::CreateTable {
                table: tbl(),
                columns: 1,
            })
            .expect("table");
        interp
            .execute(&Step::CreateColumn { column: col("a") })
            .expect("column");
        assert!(
            interp
                .execute(&Step::Load {
                    path: "t.csv".into()
                })
                .is_err()
        );
        assert!(
            interp
                .execute(&Step::Load {
                    path: "missing.csv".into()
                })
                .is_err()
        );
    }
}
