//! Declarative scenarios and the builder that produces them.
//!
//! A [`Scenario`] is an ordered list of [`Step`]s. The same list is rendered
//! to a command script by [`crate::emit`] and evaluated by
//! [`crate::interpret::Interpreter`] to produce the expected output, so the
//! two can never drift apart.
//!
//! [`ScenarioBuilder`] executes every step against the live interpreter at
//! the moment it is appended. A scenario therefore fails at the step that
//! breaks an invariant, and later parameters can be chosen from the oracle
//! state the earlier steps produced.

use std::collections::HashMap;

use colfix_error::Result;
use colfix_types::{
    AggregateKind, ArithOp, ColumnRef, Handle, IndexSpec, JoinStrategy, RangePredicate, Table,
    TableRef,
};

use crate::interpret::Interpreter;

/// Input of an aggregate: a bound vector or a whole column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Handle(Handle),
    Column(ColumnRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `-- text`
    Comment(String),
    /// Separates two groups of expected output by a blank line.
    Gap,
    CreateDb {
        name: String,
    },
    CreateTable {
        table: TableRef,
        columns: usize,
    },
    CreateColumn {
        column: ColumnRef,
    },
    CreateIndex {
        column: ColumnRef,
        spec: IndexSpec,
    },
    /// Bulk load; `path` is the path as the engine sees it.
    Load {
        path: String,
    },
    Select {
        out: Handle,
        column: ColumnRef,
        predicate: RangePredicate,
    },
    SelectOn {
        out: Handle,
        positions: Handle,
        values: Handle,
        predicate: RangePredicate,
    },
    Fetch {
        out: Handle,
        column: ColumnRef,
        positions: Handle,
    },
    Aggregate {
        out: Handle,
        kind: AggregateKind,
        source: Source,
    },
    Arith {
        out: Handle,
        op: ArithOp,
        left: Handle,
        right: Handle,
    },
    Join {
        left_out: Handle,
        right_out: Handle,
        left_values: Handle,
        left_positions: Handle,
        right_values: Handle,
        right_positions: Handle,
        strategy: JoinStrategy,
    },
    Insert {
        table: TableRef,
        values: Vec<i64>,
    },
    Update {
        column: ColumnRef,
        positions: Handle,
        value: i64,
    },
    Delete {
        table: TableRef,
        positions: Handle,
    },
    Print {
        handles: Vec<Handle>,
    },
    BatchBegin,
    BatchExecute,
    SingleCore,
    SingleCoreExecute,
    Shutdown,
}

impl Step {
    /// Statement keyword, used in error messages and logs.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Comment(_) => "--",
            Self::Gap => "blank line",
            Self::CreateDb { .. } => "create(db)",
            Self::CreateTable { .. } => "create(tbl)",
            Self::CreateColumn { .. } => "create(col)",
            Self::CreateIndex { .. } => "create(idx)",
            Self::Load { .. } => "load",
            Self::Select { .. } | Self::SelectOn { .. } => "select",
            Self::Fetch { .. } => "fetch",
            Self::Aggregate { kind, .. } => kind.as_str(),
            Self::Arith { op, .. } => op.as_str(),
            Self::Join { .. } => "join",
            Self::Insert { .. } => "relational_insert",
            Self::Update { .. } => "relational_update",
            Self::Delete { .. } => "relational_delete",
            Self::Print { .. } => "print",
            Self::BatchBegin => "batch_queries",
            Self::BatchExecute => "batch_execute",
            Self::SingleCore => "single_core",
            Self::SingleCoreExecute => "single_core_execute",
            Self::Shutdown => "shutdown",
        }
    }
}

/// One numbered test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub id: u32,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// `test{NN}gen`
    pub fn stem(&self) -> String {
        artifact_stem(self.id)
    }
}

pub fn artifact_stem(id: u32) -> String {
    format!("test{id:02}gen")
}

/// A scenario with its rendered command script and expected output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScenario {
    pub scenario: Scenario,
    pub script: String,
    pub expected: String,
}

/// Builds a scenario while executing it.
pub struct ScenarioBuilder<'a> {
    interp: &'a mut Interpreter,
    id: u32,
    steps: Vec<Step>,
    counters: HashMap<&'static str, usize>,
}

impl<'a> ScenarioBuilder<'a> {
    /// # Errors
    ///
    /// Fails if the interpreter is already inside a scenario.
    pub fn new(id: u32, interp: &'a mut Interpreter) -> Result<Self> {
        interp.begin(id)?;
        Ok(Self {
            interp,
            id,
            steps: Vec::new(),
            counters: HashMap::new(),
        })
    }

    /// Next unused handle with the given prefix: `s1`, `s2`, ...
    fn handle(&mut self, prefix: &'static str) -> Result<Handle> {
        let n = self.counters.entry(prefix).or_insert(0);
        *n += 1;
        Handle::new(format!("{prefix}{n}"))
    }

    fn push(&mut self, step: Step) -> Result<()> {
        self.interp.execute(&step)?;
        self.steps.push(step);
        Ok(())
    }

    /// Current state of a table, as the next step would see it.
    pub fn table(&self, table: &TableRef) -> Result<&Table> {
        self.interp.table(table)
    }

    pub fn comment(&mut self, text: impl Into<String>) -> Result<()> {
        self.push(Step::Comment(text.into()))
    }

    /// Comment lines, one step each.
    pub fn comments(&mut self, lines: &[&str]) -> Result<()> {
        lines.iter().try_for_each(|l| self.comment(*l))
    }

    pub fn gap(&mut self) -> Result<()> {
        self.push(Step::Gap)
    }

    pub fn create_db(&mut self, name: &str) -> Result<()> {
        self.push(Step::CreateDb {
            name: name.to_owned(),
        })
    }

    /// Declare a table and its columns in order.
    pub fn create_table(&mut self, table: &TableRef, columns: &[&str]) -> Result<()> {
        self.push(Step::CreateTable {
            table: table.clone(),
            columns: columns.len(),
        })?;
        for name in columns {
            self.push(Step::CreateColumn {
                column: table.column(name)?,
            })?;
        }
        Ok(())
    }

    pub fn create_index(&mut self, column: &ColumnRef, spec: IndexSpec) -> Result<()> {
        self.push(Step::CreateIndex {
            column: column.clone(),
            spec,
        })
    }

    pub fn load(&mut self, path: impl Into<String>) -> Result<()> {
        self.push(Step::Load { path: path.into() })
    }

    pub fn select(&mut self, column: &ColumnRef, predicate: RangePredicate) -> Result<Handle> {
        self.select_as("s", column, predicate)
    }

    /// [`Self::select`] with a handle prefix other than `s`.
    pub fn select_as(
        &mut self,
        prefix: &'static str,
        column: &ColumnRef,
        predicate: RangePredicate,
    ) -> Result<Handle> {
        let out = self.handle(prefix)?;
        self.push(Step::Select {
            out: out.clone(),
            column: column.clone(),
            predicate,
        })?;
        Ok(out)
    }

    pub fn select_on(
        &mut self,
        positions: &Handle,
        values: &Handle,
        predicate: RangePredicate,
    ) -> Result<Handle> {
        let out = self.handle("s")?;
        self.push(Step::SelectOn {
            out: out.clone(),
            positions: positions.clone(),
            values: values.clone(),
            predicate,
        })?;
        Ok(out)
    }

    pub fn fetch(&mut self, column: &ColumnRef, positions: &Handle) -> Result<Handle> {
        let out = self.handle("f")?;
        self.push(Step::Fetch {
            out: out.clone(),
            column: column.clone(),
            positions: positions.clone(),
        })?;
        Ok(out)
    }

    pub fn aggregate(&mut self, kind: AggregateKind, source: Source) -> Result<Handle> {
        let out = self.handle("a")?;
        self.push(Step::Aggregate {
            out: out.clone(),
            kind,
            source,
        })?;
        Ok(out)
    }

    /// Aggregate of a bound vector.
    pub fn aggregate_of(&mut self, kind: AggregateKind, vector: &Handle) -> Result<Handle> {
        self.aggregate(kind, Source::Handle(vector.clone()))
    }

    pub fn arith(&mut self, op: ArithOp, left: &Handle, right: &Handle) -> Result<Handle> {
        let out = self.handle("v")?;
        self.push(Step::Arith {
            out: out.clone(),
            op,
            left: left.clone(),
            right: right.clone(),
        })?;
        Ok(out)
    }

    /// Returns the (left, right) position handles.
    pub fn join(
        &mut self,
        left: (&Handle, &Handle),
        right: (&Handle, &Handle),
        strategy: JoinStrategy,
    ) -> Result<(Handle, Handle)> {
        let left_out = self.handle("t")?;
        let right_out = self.handle("t")?;
        self.push(Step::Join {
            left_out: left_out.clone(),
            right_out: right_out.clone(),
            left_values: left.0.clone(),
            left_positions: left.1.clone(),
            right_values: right.0.clone(),
            right_positions: right.1.clone(),
            strategy,
        })?;
        Ok((left_out, right_out))
    }

    pub fn insert(&mut self, table: &TableRef, values: &[i64]) -> Result<()> {
        self.push(Step::Insert {
            table: table.clone(),
            values: values.to_vec(),
        })
    }

    pub fn update(&mut self, column: &ColumnRef, positions: &Handle, value: i64) -> Result<()> {
        self.push(Step::Update {
            column: column.clone(),
            positions: positions.clone(),
            value,
        })
    }

    pub fn delete(&mut self, table: &TableRef, positions: &Handle) -> Result<()> {
        self.push(Step::Delete {
            table: table.clone(),
            positions: positions.clone(),
        })
    }

    pub fn print(&mut self, handles: &[&Handle]) -> Result<()> {
        self.push(Step::Print {
            handles: handles.iter().map(|h| (*h).clone()).collect(),
        })
    }

    pub fn batch_begin(&mut self) -> Result<()> {
        self.push(Step::BatchBegin)
    }

    pub fn batch_execute(&mut self) -> Result<()> {
        self.push(Step::BatchExecute)
    }

    pub fn single_core(&mut self) -> Result<()> {
        self.push(Step::SingleCore)
    }

    pub fn single_core_execute(&mut self) -> Result<()> {
        self.push(Step::SingleCoreExecute)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.push(Step::Shutdown)
    }

    /// Close the scenario and render both artifacts.
    ///
    /// # Errors
    ///
    /// Fails if a bracket is still open.
    pub fn finish(self) -> Result<GeneratedScenario> {
        let expected = self.interp.finish()?;
        let scenario = Scenario {
            id: self.id,
            steps: self.steps,
        };
        let script = crate::emit::script(&scenario.steps);
        Ok(GeneratedScenario {
            scenario,
            script,
            expected,
        })
    }
}
