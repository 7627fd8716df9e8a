//! Lowers a `sqlparser` AST into a [`SelectStmt`]. Lexing and grammar are `sqlparser`'s job;
//! this module only walks the already-validated AST into the narrower shape the planner needs.

use crate::select_stmt::{
    FromList, GroupByClause, HavingClause, OrderByClause, SelectList, SelectStmt, TableRef,
};
use crate::term::{BoolFactor, BoolFactorTerm, Term, WhereClause};
use crate::value_expr::{ColumnRef, SelectEntry, ValueExpr};
use observability_deps::tracing::debug;
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::ParserError;

#[derive(Debug, thiserror::Error)]
pub enum LowerError {
    #[error("sql parse error: {0}")]
    Parse(#[from] ParserError),
    #[error("expected exactly one SELECT statement, got {0}")]
    NotASingleSelect(usize),
    #[error("unsupported query shape: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, LowerError>;

/// Parse `sql` and lower it into a [`SelectStmt`]. Anything beyond a single flat `SELECT`
/// (set operations, CTEs, subqueries in FROM) is rejected rather than guessed at.
pub fn parse_select(sql: &str) -> Result<SelectStmt> {
    let dialect = GenericDialect {};
    let statements = sqlparser::parser::Parser::parse_sql(&dialect, sql)?;
    if statements.len() != 1 {
        return Err(LowerError::NotASingleSelect(statements.len()));
    }
    let query = match &statements[0] {
        Statement::Query(q) => q.as_ref(),
        other => return Err(LowerError::Unsupported(format!("{other}"))),
    };
    lower_query(query)
}

fn lower_query(query: &Query) -> Result<SelectStmt> {
    let select = match &*query.body {
        SetExpr::Select(s) => s.as_ref(),
        other => {
            return Err(LowerError::Unsupported(format!(
                "non-SELECT query body: {other}"
            )))
        }
    };

    let mut stmt = lower_select(select)?;

    if !query.order_by.is_empty() {
        stmt.order_by = Some(OrderByClause(
            query.order_by.iter().map(|e| e.to_string()).collect(),
        ));
    }
    if let Some(limit) = &query.limit {
        if let Expr::Value(sqlparser::ast::Value::Number(n, _)) = limit {
            stmt.limit = n.parse::<i64>().ok();
        }
    }
    Ok(stmt)
}

fn lower_select(select: &Select) -> Result<SelectStmt> {
    let select_list = SelectList {
        entries: select
            .projection
            .iter()
            .map(lower_select_item)
            .collect::<Result<Vec<_>>>()?,
    };

    let from_list = if select.from.is_empty() {
        None
    } else {
        let mut tables = Vec::new();
        for twj in &select.from {
            tables.push(lower_table_factor(&twj.relation)?);
        }
        Some(FromList { tables })
    };

    let where_clause = select
        .selection
        .as_ref()
        .map(lower_expr_to_term)
        .transpose()?
        .map(WhereClause::new);

    let group_by = if select.group_by.is_empty() {
        None
    } else {
        Some(GroupByClause(
            select.group_by.iter().map(|e| e.to_string()).collect(),
        ))
    };

    let having = select
        .having
        .as_ref()
        .map(|expr| HavingClause(expr.to_string()));

    debug!(
        n_projection = select_list.entries.len(),
        has_where = where_clause.is_some(),
        "lowered SELECT into IR"
    );

    Ok(SelectStmt {
        has_distinct: select.distinct,
        select_list,
        from_list,
        where_clause,
        group_by,
        having,
        order_by: None,
        limit: None,
    })
}

fn lower_select_item(item: &SelectItem) -> Result<SelectEntry> {
    match item {
        SelectItem::UnnamedExpr(expr) => Ok(SelectEntry {
            expr: lower_expr_to_value(expr),
            alias: None,
        }),
        SelectItem::ExprWithAlias { expr, alias } => Ok(SelectEntry {
            expr: lower_expr_to_value(expr),
            alias: Some(alias.value.clone()),
        }),
        SelectItem::Wildcard => Ok(SelectEntry {
            expr: ValueExpr::Raw("*".to_string()),
            alias: None,
        }),
        SelectItem::QualifiedWildcard(prefix) => Ok(SelectEntry {
            expr: ValueExpr::Raw(format!("{prefix}.*")),
            alias: None,
        }),
    }
}

fn lower_table_factor(factor: &TableFactor) -> Result<TableRef> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let idents = &name.0;
            let (db, table) = match idents.len() {
                1 => (None, idents[0].value.clone()),
                2 => (Some(idents[0].value.clone()), idents[1].value.clone()),
                n => {
                    return Err(LowerError::Unsupported(format!(
                        "table name with {n} parts: {name}"
                    )))
                }
            };
            Ok(TableRef {
                db,
                table,
                alias: alias.as_ref().map(|a| a.name.value.clone()),
            })
        }
        other => Err(LowerError::Unsupported(format!("FROM clause: {other}"))),
    }
}

fn lower_expr_to_value(expr: &Expr) -> ValueExpr {
    match expr {
        Expr::Identifier(ident) => ValueExpr::Column(ColumnRef::new(ident.value.clone())),
        Expr::CompoundIdentifier(parts) => {
            let names: Vec<_> = parts.iter().map(|p| p.value.clone()).collect();
            match names.as_slice() {
                [table, column] => {
                    ValueExpr::Column(ColumnRef::qualified("", table.clone(), column.clone()))
                }
                [db, table, column] => {
                    ValueExpr::Column(ColumnRef::qualified(db.clone(), table.clone(), column.clone()))
                }
                _ => ValueExpr::Raw(expr.to_string()),
            }
        }
        Expr::Function(func) => {
            let name = func.name.to_string();
            let is_aggregate = matches!(
                name.to_ascii_uppercase().as_str(),
                "COUNT" | "SUM" | "AVG" | "MIN" | "MAX"
            );
            let args = func
                .args
                .iter()
                .filter_map(|arg| match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(lower_expr_to_value(e)),
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
                        Some(ValueExpr::Raw("*".to_string()))
                    }
                    _ => None,
                })
                .collect();
            ValueExpr::FunctionCall {
                name,
                args,
                is_aggregate,
            }
        }
        other => ValueExpr::Raw(other.to_string()),
    }
}

fn lower_expr_to_term(expr: &Expr) -> Result<Term> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => Ok(Term::And(vec![
            lower_expr_to_term(left)?,
            lower_expr_to_term(right)?,
        ])),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => Ok(Term::Or(vec![
            lower_expr_to_term(left)?,
            lower_expr_to_term(right)?,
        ])),
        Expr::Nested(inner) => lower_expr_to_term(inner),
        Expr::BinaryOp { left, op, right } => {
            Ok(Term::Factor(BoolFactor::single(
                BoolFactorTerm::ValueExprPredicate {
                    left: lower_expr_to_value(left),
                    op: op.to_string(),
                    right: lower_expr_to_value(right),
                },
            )))
        }
        other => Ok(Term::Factor(BoolFactor::single(BoolFactorTerm::Pass(
            other.to_string(),
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select_with_where() {
        let stmt = parse_select("SELECT objectId FROM Object WHERE chunkId = 5").unwrap();
        assert_eq!(stmt.select_list.entries.len(), 1);
        assert!(stmt.from_list.is_some());
        assert!(stmt.where_clause.is_some());
    }

    #[test]
    fn parses_aggregate_select_list() {
        let stmt = parse_select("SELECT COUNT(*) FROM Object").unwrap();
        assert!(stmt.select_list.has_aggregate());
    }

    #[test]
    fn rejects_multiple_statements() {
        let err = parse_select("SELECT 1; SELECT 2").unwrap_err();
        assert!(matches!(err, LowerError::NotASingleSelect(2)));
    }

    #[test]
    fn where_clause_with_or_lowers_to_or_term() {
        let stmt =
            parse_select("SELECT objectId FROM Object WHERE chunkId = 1 OR chunkId = 2").unwrap();
        let where_clause = stmt.where_clause.unwrap();
        assert!(matches!(where_clause.root, Some(Term::Or(_))));
    }
}
