//! The fixed pipeline of analysis passes a parsed statement goes through before the query
//! session can map it onto chunks: duplicate-expression removal, WHERE-clause normalization,
//! aggregation detection, table resolution, spatial-restrictor extraction and scan costing.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod context;
pub mod passes;
pub mod plugin;

pub use context::{QueryContext, Restrictor, ScanInfo, ScanTableInfo};
pub use plugin::{Plan, PluginError, QueryPlugin, Result};

use observability_deps::tracing::trace;
use passes::{
    AggregatePlugin, DnfPlugin, DuplicateSelectExprPlugin, MatchTablePlugin, PostPlugin,
    QservRestrictorPlugin, ScanTablePlugin, TablePlugin, WherePlugin,
};
use qserv_query::SelectStmt;

/// Build the standard plugin chain in the fixed order every statement goes through.
pub fn standard_pipeline(interactive_chunk_limit: u32) -> Vec<Box<dyn QueryPlugin>> {
    vec![
        Box::new(DuplicateSelectExprPlugin),
        Box::new(WherePlugin),
        Box::new(DnfPlugin),
        Box::new(AggregatePlugin),
        Box::new(TablePlugin),
        Box::new(MatchTablePlugin),
        Box::new(QservRestrictorPlugin),
        Box::new(PostPlugin),
        Box::new(ScanTablePlugin::new(interactive_chunk_limit)),
    ]
}

/// Run every plugin's logical pass over `stmt` in order.
pub fn apply_logical_passes(
    plugins: &[Box<dyn QueryPlugin>],
    stmt: &mut SelectStmt,
    ctx: &mut QueryContext,
) -> Result<()> {
    for plugin in plugins {
        plugin.apply_logical(stmt, ctx)?;
        trace!(plugin = plugin.name(), "applied logical pass");
    }
    Ok(())
}

/// Run every plugin's physical pass over the parallel/merge split in order.
pub fn apply_physical_passes(
    plugins: &[Box<dyn QueryPlugin>],
    plan: &mut Plan<'_>,
    ctx: &mut QueryContext,
) -> Result<()> {
    for plugin in plugins {
        plugin.apply_physical(plan, ctx)?;
        trace!(plugin = plugin.name(), "applied physical pass");
    }
    Ok(())
}

/// Run every plugin's final pass, once chunk enumeration is complete.
pub fn apply_final_passes(plugins: &[Box<dyn QueryPlugin>], ctx: &mut QueryContext) -> Result<()> {
    for plugin in plugins {
        plugin.apply_final(ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_pipeline_has_nine_named_passes_in_order() {
        let plugins = standard_pipeline(1000);
        let names: Vec<_> = plugins.iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec![
                "DuplicateSelectExpr",
                "Where",
                "Dnf",
                "Aggregate",
                "Table",
                "MatchTable",
                "QservRestrictor",
                "Post",
                "ScanTable",
            ]
        );
    }

    #[test]
    fn logical_passes_propagate_errors() {
        let plugins = standard_pipeline(1000);
        let mut stmt = SelectStmt::default();
        let mut ctx = QueryContext::new("lsst");
        assert!(apply_logical_passes(&plugins, &mut stmt, &mut ctx).is_ok());
    }
}
