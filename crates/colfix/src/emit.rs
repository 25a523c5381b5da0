//! Command-script rendering: one line per step.

use std::fmt;

use colfix_types::RangePredicate;

use crate::scenario::{Source, Step};

struct Bound(Option<i64>);

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("null"),
        }
    }
}

fn bounds(p: RangePredicate) -> (Bound, Bound) {
    (Bound(p.low()), Bound(p.high()))
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(h) => write!(f, "{h}"),
            Self::Column(c) => write!(f, "{c}"),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment(text) if text.is_empty() => f.write_str("--"),
            Self::Comment(text) => write!(f, "-- {text}"),
            Self::Gap => Ok(()),
            Self::CreateDb { name } => write!(f, "create(db,\"{name}\")"),
            Self::CreateTable { table, columns } => {
                write!(f, "create(tbl,\"{}\",{},{columns})", table.table, table.db)
            }
            Self::CreateColumn { column } => {
                write!(f, "create(col,\"{}\",{})", column.column, column.table)
            }
            Self::CreateIndex { column, spec } => {
                write!(f, "create(idx,{column},{},{})", spec.layout, spec.clustering)
            }
            Self::Load { path } => write!(f, "load(\"{path}\")"),
            Self::Select {
                out,
                column,
                predicate,
            } => {
                let (lo, hi) = bounds(*predicate);
                write!(f, "{out}=select({column},{lo},{hi})")
            }
            Self::SelectOn {
                out,
                positions,
                values,
                predicate,
            } => {
                let (lo, hi) = bounds(*predicate);
                write!(f, "{out}=select({positions},{values},{lo},{hi})")
            }
            Self::Fetch {
                out,
                column,
                positions,
            } => write!(f, "{out}=fetch({column},{positions})"),
            Self::Aggregate { out, kind, source } => write!(f, "{out}={kind}({source})"),
            Self::Arith {
                out,
                op,
                left,
                right,
            } => write!(f, "{out}={op}({left},{right})"),
            Self::Join {
                left_out,
                right_out,
                left_values,
                left_positions,
                right_values,
                right_positions,
                strategy,
            } => write!(
                f,
                "{left_out},{right_out}=join({left_values},{left_positions},{right_values},{right_positions},{strategy})"
            ),
            Self::Insert { table, values } => {
                write!(f, "relational_insert({table}")?;
                for v in values {
                    write!(f, ",{v}")?;
                }
                f.write_str(")")
            }
            Self::Update {
                column,
                positions,
                value,
            } => write!(f, "relational_update({column},{positions},{value})"),
            Self::Delete { table, positions } => {
                write!(f, "relational_delete({table},{positions})")
            }
            Self::Print { handles } => {
                f.write_str("print(")?;
                for (i, h) in handles.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{h}")?;
                }
                f.write_str(")")
            }
            Self::BatchBegin => f.write_str("batch_queries()"),
            Self::BatchExecute => f.write_str("batch_execute()"),
            Self::SingleCore => f.write_str("single_core()"),
            Self::SingleCoreExecute => f.write_str("single_core_execute()"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// The script text: one line per step, newline-terminated.
pub fn script(steps: &[Step]) -> String {
    let mut out = String::new();
    for step in steps {
        out.push_str(&step.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use colfix_types::{
        AggregateKind, Clustering, ColumnRef, Handle, IndexLayout, IndexSpec, JoinStrategy,
        TableRef,
    };

    fn h(name: &str) -> Handle {
        Handle::new(name).expect("handle")
    }

    fn col(s: &str) -> ColumnRef {
        s.parse().expect("column ref")
    }

    #[test]
    fn ddl_statements() {
        let t = TableRef::new("db1", "tbl1").expect("table");
        assert_eq!(
            Step::CreateDb { name: "db1".into() }.to_string(),
            "create(db,\"db1\")"
        );
        assert_eq!(
            Step::CreateTable {
                table: t.clone(),
                columns: 2
            }
            .to_string(),
            "create(tbl,\"tbl1\",db1,2)"
        );
        assert_eq!(
            Step::CreateColumn {
                column: col("db1.tbl1.col1")
            }
            .to_string(),
            "create(col,\"col1\",db1.tbl1)"
        );
        assert_eq!(
            Step::CreateIndex {
                column: col("db1.tbl4.col3"),
                spec: IndexSpec {
                    layout: IndexLayout::Btree,
                    clustering: Clustering::Clustered
                }
            }
            .to_string(),
            "create(idx,db1.tbl4.col3,btree,clustered)"
        );
    }

    #[test]
    fn selects_render_null_bounds() {
        let s = Step::Select {
            out: h("s1"),
            column: col("db1.tbl1.col1"),
            predicate: RangePredicate::below(20),
        };
        assert_eq!(s.to_string(), "s1=select(db1.tbl1.col1,null,20)");
        let s = Step::SelectOn {
            out: h("s2"),
            positions: h("s1"),
            values: h("f1"),
            predicate: RangePredicate::at_least(-5),
        };
        assert_eq!(s.to_string(), "s2=select(s1,f1,-5,null)");
    }

    #[test]
    fn queries_and_mutations() {
        let t = TableRef::new("db1", "tbl5").expect("table");
        assert_eq!(
            Step::Aggregate {
                out: h("a1"),
                kind: AggregateKind::Avg,
                source: Source::Column(col("db1.tbl5.col1"))
            }
            .to_string(),
            "a1=avg(db1.tbl5.col1)"
        );
        assert_eq!(
            Step::Join {
                left_out: h("t1"),
                right_out: h("t2"),
                left_values: h("f1"),
                left_positions: h("p1"),
                right_values: h("f2"),
                right_positions: h("p2"),
                strategy: JoinStrategy::GraceHash,
            }
            .to_string(),
            "t1,t2=join(f1,p1,f2,p2,grace-hash)"
        );
        assert_eq!(
            Step::Insert {
                table: t.clone(),
                values: vec![-1, 2, 3]
            }
            .to_string(),
            "relational_insert(db1.tbl5,-1,2,3)"
        );
        assert_eq!(
            Step::Delete {
                table: t,
                positions: h("d1")
            }
            .to_string(),
            "relational_delete(db1.tbl5,d1)"
        );
    }

    #[test]
    fn script_keeps_blank_and_comment_lines() {
        let steps = vec![
            Step::Comment("Load the data".into()),
            Step::Comment(String::new()),
            Step::Gap,
            Step::Print {
                handles: vec![h("a1"), h("a2")],
            },
            Step::Shutdown,
        ];
        assert_eq!(
            script(&steps),
            "-- Load the data\n--\n\nprint(a1,a2)\nshutdown\n"
        );
    }
}
