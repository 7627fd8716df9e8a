use crate::term::WhereClause;
use crate::value_expr::{ColumnRef, SelectEntry};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FromList {
    pub tables: Vec<TableRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub db: Option<String>,
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            db: None,
            table: table.into(),
            alias: None,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(db) = &self.db {
            write!(f, "{db}.{}", self.table)?;
        } else {
            write!(f, "{}", self.table)?;
        }
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

impl fmt::Display for FromList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.tables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectList {
    pub entries: Vec<SelectEntry>,
}

impl SelectList {
    pub fn has_aggregate(&self) -> bool {
        self.entries.iter().any(|e| e.expr.contains_aggregate())
    }

    pub fn find_column_refs(&self, out: &mut Vec<ColumnRef>) {
        for e in &self.entries {
            e.expr.find_column_refs(out);
        }
    }
}

impl fmt::Display for SelectList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderByClause(pub Vec<String>);

impl fmt::Display for OrderByClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupByClause(pub Vec<String>);

impl fmt::Display for GroupByClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HavingClause(pub String);

impl fmt::Display for HavingClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The parsed and (after plugins run) rewritten form of a single `SELECT` statement.
///
/// A user query lowers to one `SelectStmt`; the query session then derives a parallel-execution
/// copy per chunk ([`SelectStmt::clone`]) and, if aggregation requires a second pass, a merge
/// statement ([`SelectStmt::copy_merge`]) run once over the concatenated chunk results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStmt {
    pub has_distinct: bool,
    pub select_list: SelectList,
    pub from_list: Option<FromList>,
    pub where_clause: Option<WhereClause>,
    pub group_by: Option<GroupByClause>,
    pub having: Option<HavingClause>,
    pub order_by: Option<OrderByClause>,
    pub limit: Option<i64>,
}

impl SelectStmt {
    pub fn has_where_clause(&self) -> bool {
        self.where_clause.is_some()
    }

    pub fn has_order_by(&self) -> bool {
        self.order_by.is_some()
    }

    pub fn set_from_list_as_table(&mut self, table: TableRef) {
        self.from_list = Some(FromList { tables: vec![table] });
    }

    /// A full, independently-owned copy of every clause: what gets handed to the per-chunk
    /// parallel portion before the physical-plugin pass mutates it.
    pub fn clone_deep(&self) -> Self {
        self.clone()
    }

    /// The statement run once, after chunk results are merged: select list, ORDER BY, GROUP BY
    /// and HAVING survive, FROM and WHERE do not, since a merge query reads the merge table
    /// rather than any original source table and must not re-apply a per-row restriction meant
    /// for the original column set.
    pub fn copy_merge(&self) -> Self {
        Self {
            has_distinct: self.has_distinct,
            select_list: self.select_list.clone(),
            from_list: None,
            where_clause: None,
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
        }
    }

    /// Render the statement as executable SQL: `SELECT [DISTINCT] ... FROM ... [WHERE ...]
    /// [GROUP BY ...] [HAVING ...] [ORDER BY ...] [LIMIT n]`.
    pub fn render_query_template(&self) -> String {
        let mut out = String::from("SELECT ");
        if self.has_distinct {
            out.push_str("DISTINCT ");
        }
        out.push_str(&self.select_list.to_string());
        if let Some(from_list) = &self.from_list {
            out.push_str(" FROM ");
            out.push_str(&from_list.to_string());
        }
        if let Some(where_clause) = &self.where_clause {
            out.push_str(" WHERE ");
            out.push_str(&where_clause.to_string());
        }
        self.push_post_clauses(&mut out);
        if let Some(limit) = self.limit {
            out.push_str(&format!(" LIMIT {limit}"));
        }
        out
    }

    /// Render just the post-parallel (merge-query) portion: `GROUP BY`/`HAVING`/`ORDER BY`, no
    /// `SELECT`/`FROM`/`WHERE`/`LIMIT`. Used to describe what the merge statement contributes
    /// beyond the select list.
    pub fn render_post_template(&self) -> String {
        let mut out = String::new();
        self.push_post_clauses(&mut out);
        out.trim_start().to_string()
    }

    fn push_post_clauses(&self, out: &mut String) {
        if let Some(group_by) = &self.group_by {
            out.push_str(" GROUP BY ");
            out.push_str(&group_by.to_string());
        }
        if let Some(having) = &self.having {
            out.push_str(" HAVING ");
            out.push_str(&having.to_string());
        }
        if let Some(order_by) = &self.order_by {
            out.push_str(" ORDER BY ");
            out.push_str(&order_by.to_string());
        }
    }
}

impl fmt::Display for SelectStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_query_template())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{BoolFactor, BoolFactorTerm, Term};
    use crate::value_expr::ValueExpr;

    fn sample_stmt() -> SelectStmt {
        SelectStmt {
            has_distinct: false,
            select_list: SelectList {
                entries: vec![SelectEntry {
                    expr: ValueExpr::Column(ColumnRef::new("objectId")),
                    alias: None,
                }],
            },
            from_list: Some(FromList {
                tables: vec![TableRef::new("Object")],
            }),
            where_clause: Some(WhereClause::new(Term::Factor(BoolFactor::single(
                BoolFactorTerm::Pass("chunkId = 1".to_string()),
            )))),
            group_by: None,
            having: None,
            order_by: None,
            limit: None,
        }
    }

    #[test]
    fn renders_select_from_where() {
        let stmt = sample_stmt();
        assert_eq!(
            stmt.render_query_template(),
            "SELECT objectId FROM Object WHERE chunkId = 1"
        );
    }

    #[test]
    fn renders_limit_only_when_set() {
        let mut stmt = sample_stmt();
        stmt.limit = Some(10);
        assert!(stmt.render_query_template().ends_with("LIMIT 10"));
        stmt.limit = None;
        assert!(!stmt.render_query_template().contains("LIMIT"));
    }

    #[test]
    fn copy_merge_drops_from_and_where_but_keeps_select_list() {
        let mut stmt = sample_stmt();
        stmt.group_by = Some(GroupByClause(vec!["objectId".to_string()]));
        let merged = stmt.copy_merge();
        assert!(merged.from_list.is_none());
        assert!(merged.where_clause.is_none());
        assert_eq!(merged.select_list, stmt.select_list);
        assert_eq!(merged.group_by, stmt.group_by);
    }

    #[test]
    fn clone_deep_is_independent_of_original() {
        let stmt = sample_stmt();
        let mut cloned = stmt.clone_deep();
        cloned.has_distinct = true;
        assert!(!stmt.has_distinct);
        assert_ne!(stmt, cloned);
    }

    #[test]
    fn post_template_omits_select_and_from() {
        let mut stmt = sample_stmt();
        stmt.order_by = Some(OrderByClause(vec!["objectId".to_string()]));
        let post = stmt.render_post_template();
        assert_eq!(post, "ORDER BY objectId");
    }
}
