use std::fmt;

/// A reference to a column, optionally qualified by database and table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub db: Option<String>,
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            db: None,
            table: None,
            column: column.into(),
        }
    }

    pub fn qualified(
        db: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            db: Some(db.into()),
            table: Some(table.into()),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = &self.table {
            if let Some(db) = &self.db {
                write!(f, "{db}.{table}.{}", self.column)
            } else {
                write!(f, "{table}.{}", self.column)
            }
        } else {
            write!(f, "{}", self.column)
        }
    }
}

/// A scalar expression appearing in a select list, predicate or ORDER BY/GROUP BY clause.
///
/// Kept intentionally shallow: the plugin pipeline only needs to recognize column references,
/// aggregate function calls and opaque literal/expression text, never to evaluate the expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Column(ColumnRef),
    /// A function call such as `COUNT(*)` or `AVG(col)`; `is_aggregate` drives `needs_merge`.
    FunctionCall {
        name: String,
        args: Vec<ValueExpr>,
        is_aggregate: bool,
    },
    /// Anything else the parser produced verbatim (literals, arithmetic, casts...).
    Raw(String),
}

impl ValueExpr {
    pub fn is_star(&self) -> bool {
        matches!(self, ValueExpr::Raw(s) if s == "*")
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            ValueExpr::FunctionCall { is_aggregate, .. } if *is_aggregate => true,
            ValueExpr::FunctionCall { args, .. } => args.iter().any(ValueExpr::contains_aggregate),
            _ => false,
        }
    }

    pub fn find_column_refs(&self, out: &mut Vec<ColumnRef>) {
        match self {
            ValueExpr::Column(c) => out.push(c.clone()),
            ValueExpr::FunctionCall { args, .. } => {
                for a in args {
                    a.find_column_refs(out);
                }
            }
            ValueExpr::Raw(_) => {}
        }
    }
}

impl fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpr::Column(c) => write!(f, "{c}"),
            ValueExpr::FunctionCall { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            ValueExpr::Raw(s) => write!(f, "{s}"),
        }
    }
}

/// A single entry in a select list: an expression plus its optional output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectEntry {
    pub expr: ValueExpr,
    pub alias: Option<String>,
}

impl fmt::Display for SelectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}
