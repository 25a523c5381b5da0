//! Script replay: parse written `.dsl` files back into steps, run them on a
//! fresh interpreter that reads the written CSV files, and compare what
//! they print with the written `.exp` files.

use std::fs;
use std::path::Path;

use colfix_error::{ColfixError, Result};
use colfix_types::{ColumnRef, Database, Handle, IndexSpec, RangePredicate, TableRef};
use tracing::{debug, info, warn};

use crate::DB_NAME;
use crate::config::GeneratorConfig;
use crate::interpret::Interpreter;
use crate::scenario::{Source, Step, artifact_stem};
use crate::suites::Suite;

const TARGET: &str = "colfix.replay";

/// Parse a whole script, one step per line.
///
/// # Errors
///
/// `ScriptSyntax` naming the first line that does not parse.
pub fn parse_script(text: &str) -> Result<Vec<Step>> {
    text.lines()
        .enumerate()
        .map(|(i, line)| parse_line(i + 1, line))
        .collect()
}

/// Parse one line; `line_no` is only used in errors. A blank line is a group
/// gap.
///
/// # Errors
///
/// `ScriptSyntax` for anything outside the command language.
pub fn parse_line(line_no: usize, line: &str) -> Result<Step> {
    let line = line.trim_end();
    if line.is_empty() {
        return Ok(Step::Gap);
    }
    if let Some(text) = line.strip_prefix("--") {
        return Ok(Step::Comment(
            text.strip_prefix(' ').unwrap_or(text).to_owned(),
        ));
    }
    if line == "shutdown" {
        return Ok(Step::Shutdown);
    }
    let syntax = |detail: String| ColfixError::syntax(line_no, detail);
    let open = line
        .find('(')
        .ok_or_else(|| syntax(format!("expected a call: {line:?}")))?;
    let body = line[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| syntax(format!("missing closing parenthesis: {line:?}")))?;
    let (outputs, verb) = match line[..open].split_once('=') {
        Some((lhs, verb)) => (lhs.split(',').map(str::trim).collect(), verb.trim()),
        None => (Vec::new(), line[..open].trim()),
    };
    let args = split_args(body);
    Call {
        line_no,
        verb,
        outputs,
        args,
    }
    .into_step()
}

/// Split call arguments on commas outside double quotes.
fn split_args(body: &str) -> Vec<&str> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                args.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(body[start..].trim());
    args
}

struct Call<'a> {
    line_no: usize,
    verb: &'a str,
    outputs: Vec<&'a str>,
    args: Vec<&'a str>,
}

impl Call<'_> {
    fn err(&self, detail: impl std::fmt::Display) -> ColfixError {
        ColfixError::syntax(self.line_no, format!("{}: {detail}", self.verb))
    }

    fn arity(&self, outputs: usize, args: usize) -> Result<()> {
        if self.outputs.len() != outputs || self.args.len() != args {
            return Err(self.err(format!(
                "expected {outputs} result(s) and {args} argument(s), got {} and {}",
                self.outputs.len(),
                self.args.len()
            )));
        }
        Ok(())
    }

    fn out(&self, i: usize) -> Result<Handle> {
        Handle::new(self.outputs[i]).map_err(|e| self.err(e))
    }

    fn handle(&self, i: usize) -> Result<Handle> {
        Handle::new(self.args[i]).map_err(|e| self.err(e))
    }

    fn column(&self, i: usize) -> Result<ColumnRef> {
        self.args[i].parse().map_err(|e| self.err(e))
    }

    fn table(&self, i: usize) -> Result<TableRef> {
        self.args[i].parse().map_err(|e| self.err(e))
    }

    fn int(&self, i: usize) -> Result<i64> {
        self.args[i]
            .parse()
            .map_err(|e| self.err(format!("{:?}: {e}", self.args[i])))
    }

    fn bound(&self, i: usize) -> Result<Option<i64>> {
        if self.args[i] == "null" {
            Ok(None)
        } else {
            self.int(i).map(Some)
        }
    }

    fn predicate(&self, low: usize) -> Result<RangePredicate> {
        RangePredicate::new(self.bound(low)?, self.bound(low + 1)?).map_err(|e| self.err(e))
    }

    fn quoted(&self, i: usize) -> Result<String> {
        self.args[i]
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .map(str::to_owned)
            .ok_or_else(|| self.err(format!("expected a quoted string, got {}", self.args[i])))
    }

    fn keyword<T: std::str::FromStr<Err = ColfixError>>(&self, i: usize) -> Result<T> {
        self.args[i].parse().map_err(|e| self.err(e))
    }

    fn into_step(self) -> Result<Step> {
        match self.verb {
            "create" => self.create(),
            "load" => {
                self.arity(0, 1)?;
                Ok(Step::Load {
                    path: self.quoted(0)?,
                })
            }
            "select" if self.args.len() == 3 => {
                self.arity(1, 3)?;
                Ok(Step::Select {
                    out: self.out(0)?,
                    column: self.column(0)?,
                    predicate: self.predicate(1)?,
                })
            }
            "select" => {
                self.arity(1, 4)?;
                Ok(Step::SelectOn {
                    out: self.out(0)?,
                    positions: self.handle(0)?,
                    values: self.handle(1)?,
                    predicate: self.predicate(2)?,
                })
            }
            "fetch" => {
                self.arity(1, 2)?;
                Ok(Step::Fetch {
                    out: self.out(0)?,
                    column: self.column(0)?,
                    positions: self.handle(1)?,
                })
            }
            "sum" | "avg" | "min" | "max" => {
                self.arity(1, 1)?;
                let source = if self.args[0].contains('.') {
                    Source::Column(self.column(0)?)
                } else {
                    Source::Handle(self.handle(0)?)
                };
                Ok(Step::Aggregate {
                    out: self.out(0)?,
                    kind: self.verb.parse().map_err(|e| self.err(e))?,
                    source,
                })
            }
            "add" | "sub" => {
                self.arity(1, 2)?;
                Ok(Step::Arith {
                    out: self.out(0)?,
                    op: self.verb.parse().map_err(|e| self.err(e))?,
                    left: self.handle(0)?,
                    right: self.handle(1)?,
                })
            }
            "join" => {
                self.arity(2, 5)?;
                Ok(Step::Join {
                    left_out: self.out(0)?,
                    right_out: self.out(1)?,
                    left_values: self.handle(0)?,
                    left_positions: self.handle(1)?,
                    right_values: self.handle(2)?,
                    right_positions: self.handle(3)?,
                    strategy: self.keyword(4)?,
                })
            }
            "relational_insert" => {
                if !self.outputs.is_empty() || self.args.len() < 2 {
                    return Err(self.err("expected a table and at least one value"));
                }
                Ok(Step::Insert {
                    table: self.table(0)?,
                    values: (1..self.args.len())
                        .map(|i| self.int(i))
                        .collect::<Result<_>>()?,
                })
            }
            "relational_update" => {
                self.arity(0, 3)?;
                Ok(Step::Update {
                    column: self.column(0)?,
                    positions: self.handle(1)?,
                    value: self.int(2)?,
                })
            }
            "relational_delete" => {
                self.arity(0, 2)?;
                Ok(Step::Delete {
                    table: self.table(0)?,
                    positions: self.handle(1)?,
                })
            }
            "print" => {
                if !self.outputs.is_empty() || self.args.is_empty() {
                    return Err(self.err("expected at least one handle"));
                }
                Ok(Step::Print {
                    handles: (0..self.args.len())
                        .map(|i| self.handle(i))
                        .collect::<Result<_>>()?,
                })
            }
            "batch_queries" => self.bare(Step::BatchBegin),
            "batch_execute" => self.bare(Step::BatchExecute),
            "single_core" => self.bare(Step::SingleCore),
            "single_core_execute" => self.bare(Step::SingleCoreExecute),
            other => Err(ColfixError::syntax(
                self.line_no,
                format!("unknown statement {other:?}"),
            )),
        }
    }

    fn bare(&self, step: Step) -> Result<Step> {
        self.arity(0, 0)?;
        Ok(step)
    }

    fn create(&self) -> Result<Step> {
        let what = self.args.first().copied().unwrap_or_default();
        match what {
            "db" => {
                self.arity(0, 2)?;
                Ok(Step::CreateDb {
                    name: self.quoted(1)?,
                })
            }
            "tbl" => {
                self.arity(0, 4)?;
                let table = TableRef::new(self.args[2], &self.quoted(1)?).map_err(|e| self.err(e))?;
                let columns = self.args[3]
                    .parse()
                    .map_err(|e| self.err(format!("column count: {e}")))?;
                Ok(Step::CreateTable { table, columns })
            }
            "col" => {
                self.arity(0, 3)?;
                let column = self
                    .table(2)?
                    .column(&self.quoted(1)?)
                    .map_err(|e| self.err(e))?;
                Ok(Step::CreateColumn { column })
            }
            "idx" => {
                self.arity(0, 4)?;
                Ok(Step::CreateIndex {
                    column: self.column(1)?,
                    spec: IndexSpec {
                        layout: self.keyword(2)?,
                        clustering: self.keyword(3)?,
                    },
                })
            }
            other => Err(self.err(format!("unknown object kind {other:?}"))),
        }
    }
}

/// Outcome of a successful replay.
#[derive(Debug)]
pub struct ReplayReport {
    pub suites: Vec<Suite>,
    pub scenarios: usize,
    /// Oracle state after the last scenario, for catalog verification.
    pub database: Option<Database>,
}

/// Replay the written artifacts of `suites`, in order, on one interpreter.
///
/// # Errors
///
/// I/O and syntax errors reading the artifacts, the first scenario
/// invariant violation, or `ReplayMismatch` for the first scenario whose
/// output differs from its `.exp` file.
pub fn replay_suites(config: &GeneratorConfig, suites: &[Suite]) -> Result<ReplayReport> {
    let dir = &config.dataset_dir;
    let interp = match suites.first() {
        Some(s) if s.creates_database() => Interpreter::new(),
        _ => Interpreter::with_database(DB_NAME),
    };
    let mut interp = interp.with_dataset_dir(dir);
    let mut scenarios = 0;
    for &suite in suites {
        for id in suite.ids() {
            replay_scenario(&mut interp, dir, id)?;
            scenarios += 1;
        }
        info!(target: TARGET, suite = suite.as_str(), "suite replayed");
    }
    Ok(ReplayReport {
        suites: suites.to_vec(),
        scenarios,
        database: interp.into_database(),
    })
}

/// Replay one scenario from `dir`.
///
/// # Errors
///
/// As [`replay_suites`].
pub fn replay_scenario(interp: &mut Interpreter, dir: &Path, id: u32) -> Result<()> {
    let stem = artifact_stem(id);
    let script = fs::read_to_string(dir.join(format!("{stem}.dsl")))?;
    let expected = fs::read_to_string(dir.join(format!("{stem}.exp")))?;
    let steps = parse_script(&script)?;
    debug!(target: TARGET, scenario = id, steps = steps.len(), "replaying");

    interp.begin(id)?;
    let run = steps.iter().try_for_each(|step| interp.execute(step));
    let actual = interp.finish();
    run?;
    let actual = actual?;
    if let Some(detail) = first_difference(&expected, &actual) {
        warn!(target: TARGET, scenario = id, %detail, "replay diverged");
        return Err(ColfixError::ReplayMismatch {
            scenario: id,
            detail,
        });
    }
    Ok(())
}

/// Describe the first line where `actual` departs from `expected`.
fn first_difference(expected: &str, actual: &str) -> Option<String> {
    if expected == actual {
        return None;
    }
    let mut exp = expected.lines();
    let mut act = actual.lines();
    let mut line = 1;
    loop {
        match (exp.next(), act.next()) {
            (Some(e), Some(a)) if e == a => line += 1,
            (None, None) => return Some(format!("line {line}: line endings differ")),
            (e, a) => {
                return Some(format!(
                    "line {line}: expected {}, got {}",
                    e.map_or_else(|| "end of output".to_owned(), |e| format!("{e:?}")),
                    a.map_or_else(|| "end of output".to_owned(), |a| format!("{a:?}")),
                ));
            }
        }
    }
}
