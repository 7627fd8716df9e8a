use crate::context::QueryContext;
use qserv_query::SelectStmt;
use snafu::prelude::*;

#[derive(Debug, Snafu)]
pub enum PluginError {
    #[snafu(display("analysis failed in {plugin}: {reason}"))]
    Analysis { plugin: &'static str, reason: String },
}

pub type Result<T, E = PluginError> = std::result::Result<T, E>;

/// One pass of query analysis, mirroring the original planner's plugin chain: every plugin gets
/// a chance to rewrite the statement (`apply_logical`), and then a second chance once the
/// statement has been split into a parallel/merge pair (`apply_physical`).
pub trait QueryPlugin: std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Mutate the as-parsed statement in place, before it's split into parallel/merge copies.
    fn apply_logical(&self, _stmt: &mut SelectStmt, _ctx: &mut QueryContext) -> Result<()> {
        Ok(())
    }

    /// Mutate the parallel/merge split, once it exists.
    fn apply_physical(&self, _plan: &mut Plan, _ctx: &mut QueryContext) -> Result<()> {
        Ok(())
    }

    /// Run once, after every chunk has been enumerated (e.g. to pick a scan rating once the
    /// final chunk count is known).
    fn apply_final(&self, _ctx: &mut QueryContext) -> Result<()> {
        Ok(())
    }
}

/// The split between the per-chunk parallel portion and the post-merge portion of a statement,
/// handed to every plugin's physical pass.
#[derive(Debug)]
pub struct Plan<'a> {
    pub original: &'a SelectStmt,
    pub parallel: Vec<SelectStmt>,
    pub merge: SelectStmt,
    pub has_merge: bool,
}
