//! Read-only statement guard.
//!
//! Statements coming from the reasoning agent are parsed with the SQLite
//! dialect, restricted to a single query, and have every relation rewritten
//! from the logical name the agent sees (`GPS`) to the physical table that
//! holds it (`log_<id>_GPS`). Any relation that is neither a table of the
//! namespace nor a CTE defined by the statement itself is rejected.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use sqlparser::ast::{
    Ident, ObjectName, Query, SetExpr, Statement, TableAlias, TableFactor, Visit, VisitMut,
    Visitor, VisitorMut,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use super::QueryFailure;

/// Logical name (lowercased) to physical table name.
pub type TableMap = HashMap<String, String>;

/// Validate `sql` and rewrite it against `tables`.
pub fn prepare(sql: &str, tables: &TableMap) -> Result<String, QueryFailure> {
    let trimmed = sql.trim();
    if trimmed.trim_end_matches(';').trim().is_empty() {
        return Err(QueryFailure::Empty);
    }

    let mut statements = Parser::parse_sql(&SQLiteDialect {}, trimmed)
        .map_err(|e| QueryFailure::Parse(e.to_string()))?;

    if statements.len() != 1 {
        return Err(QueryFailure::NotReadOnly(format!(
            "expected exactly one statement, found {}",
            statements.len()
        )));
    }
    let mut statement = statements.remove(0);
    if !matches!(statement, Statement::Query(_)) {
        return Err(QueryFailure::NotReadOnly(format!(
            "{} statements are not allowed",
            statement_keyword(&statement)
        )));
    }

    let mut inspector = QueryInspector::default();
    if let ControlFlow::Break(reason) = Visit::visit(&statement, &mut inspector) {
        return Err(QueryFailure::NotReadOnly(reason));
    }

    let mut rewriter = RelationRewriter {
        tables,
        ctes: &inspector.ctes,
    };
    if let ControlFlow::Break(failure) = VisitMut::visit(&mut statement, &mut rewriter) {
        return Err(failure);
    }

    Ok(statement.to_string())
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("unknown")
        .to_uppercase()
}

/// Collects CTE names and rejects query bodies that write.
#[derive(Default)]
struct QueryInspector {
    ctes: HashSet<String>,
}

impl QueryInspector {
    fn check_body(body: &SetExpr) -> ControlFlow<String> {
        match body {
            SetExpr::Select(select) if select.into.is_some() => {
                ControlFlow::Break("SELECT INTO is not allowed".to_string())
            }
            SetExpr::Insert(_) | SetExpr::Update(_) => {
                ControlFlow::Break("data modification is not allowed".to_string())
            }
            SetExpr::Table(_) => ControlFlow::Break("TABLE statements are not allowed".to_string()),
            SetExpr::SetOperation { left, right, .. } => {
                Self::check_body(left)?;
                Self::check_body(right)
            }
            _ => ControlFlow::Continue(()),
        }
    }
}

impl Visitor for QueryInspector {
    type Break = String;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        Self::check_body(&query.body)
    }
}

struct RelationRewriter<'a> {
    tables: &'a TableMap,
    ctes: &'a HashSet<String>,
}

impl VisitorMut for RelationRewriter<'_> {
    type Break = QueryFailure;

    fn pre_visit_table_factor(&mut self, factor: &mut TableFactor) -> ControlFlow<Self::Break> {
        let TableFactor::Table {
            name, alias, args, ..
        } = factor
        else {
            return ControlFlow::Continue(());
        };

        let display = name.to_string();
        if args.is_some() {
            return ControlFlow::Break(QueryFailure::UnknownTable(display));
        }
        let [ident] = name.0.as_slice() else {
            return ControlFlow::Break(QueryFailure::UnknownTable(display));
        };

        let key = ident.value.to_lowercase();
        if self.ctes.contains(&key) {
            return ControlFlow::Continue(());
        }
        let Some(physical) = self.tables.get(&key) else {
            return ControlFlow::Break(QueryFailure::UnknownTable(ident.value.clone()));
        };

        // Keep `ALT.alt` style qualifiers working after the rename.
        if alias.is_none() {
            *alias = Some(TableAlias {
                name: Ident::with_quote('"', ident.value.clone()),
                columns: Vec::new(),
            });
        }
        *name = ObjectName(vec![Ident::with_quote('"', physical.clone())]);
        ControlFlow::Continue(())
    }
}
