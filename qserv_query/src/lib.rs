//! Intermediate representation produced by parsing a query and consumed by the plugin pipeline:
//! [`SelectStmt`] plus the boolean term tree making up its WHERE clause.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod parse;
pub mod select_stmt;
pub mod term;
pub mod value_expr;

pub use parse::{parse_select, LowerError};
pub use select_stmt::{
    FromList, GroupByClause, HavingClause, OrderByClause, SelectList, SelectStmt, TableRef,
};
pub use term::{AndTerm, BoolFactor, BoolFactorTerm, OrTerm, Term, WhereClause};
pub use value_expr::{ColumnRef, SelectEntry, ValueExpr};
