use observability_deps::tracing::debug;
use parking_lot::Mutex;
use qserv_query::{SelectStmt, TableRef};

/// What's left to do once every chunk result has landed: the concrete result tables that were
/// produced, and (if the query needed a second pass) the merge query to run over them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub result_tables: Vec<String>,
    pub merge_query: Option<String>,
}

/// Collects the per-chunk result tables each [`JobQuery`](crate::job_query::JobQuery) produces
/// and, once all of them have landed, builds the single merge query that reduces them to the
/// user's final result set.
///
/// Mirrors the original dispatcher's infile merger in spirit: workers write their chunk results
/// into their own tables rather than streaming rows back here, and the merge query is just
/// ordinary SQL run once those tables exist.
#[derive(Debug, Default)]
pub struct InfileMerger {
    result_tables: Mutex<Vec<String>>,
}

impl InfileMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_result_table(&self, table: impl Into<String>) {
        let table = table.into();
        debug!(table = %table, "recording chunk result table");
        self.result_tables.lock().push(table);
    }

    pub fn result_table_count(&self) -> usize {
        self.result_tables.lock().len()
    }

    /// Build the [`MergeOutcome`]. When `merge_stmt` is `Some`, it's rendered against
    /// `merge_table` (the table the caller has already concatenated every chunk result into);
    /// otherwise the per-chunk result tables are the final answer as-is.
    pub fn finalize(&self, merge_stmt: Option<&SelectStmt>, merge_table: &str) -> MergeOutcome {
        let result_tables = self.result_tables.lock().clone();
        let merge_query = merge_stmt.map(|stmt| {
            let mut stmt = stmt.clone();
            stmt.set_from_list_as_table(TableRef::new(merge_table));
            stmt.render_query_template()
        });
        MergeOutcome {
            result_tables,
            merge_query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qserv_query::parse_select;

    #[test]
    fn finalize_without_merge_stmt_just_lists_result_tables() {
        let merger = InfileMerger::new();
        merger.record_result_table("result_1");
        merger.record_result_table("result_2");
        let outcome = merger.finalize(None, "merge_table");
        assert_eq!(outcome.result_tables, vec!["result_1", "result_2"]);
        assert!(outcome.merge_query.is_none());
    }

    #[test]
    fn finalize_with_merge_stmt_renders_against_the_merge_table() {
        let merger = InfileMerger::new();
        merger.record_result_table("result_1");
        let stmt = parse_select("SELECT COUNT(*) FROM Object").unwrap().copy_merge();
        let outcome = merger.finalize(Some(&stmt), "merge_table");
        let query = outcome.merge_query.unwrap();
        assert!(query.contains("FROM merge_table"));
    }
}
