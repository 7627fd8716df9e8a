use crate::chunk_spec::{ChunkSpec, ChunkSpecFragmenter, DUMMY_CHUNK};
use crate::mapping::{ChunkQuerySpec, QueryMapping};
use observability_deps::tracing::{debug, trace};
use qserv_plugins::{self as plugins, Plan, QueryContext, QueryPlugin};
use qserv_query::{parse_select, LowerError, SelectStmt};
use snafu::prelude::*;

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("could not parse query: {source}"))]
    Parse { source: LowerError },
    #[snafu(display("no query has been analyzed yet"))]
    NotAnalyzed,
    #[snafu(display("query analysis failed: {reason}"))]
    Analysis { reason: String },
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Default cutoff (in chunks touched) below which a query is treated as interactive and gets
/// dispatch priority over full-table scans.
pub const DEFAULT_INTERACTIVE_CHUNK_LIMIT: u32 = 100;

/// Owns one user query end to end: parsing, running the plugin pipeline, enumerating the
/// chunks it must visit and building the per-chunk worker queries.
///
/// Mirrors the reference planner's `QuerySession`: `_stmt` is the as-analyzed statement,
/// `_stmtParallel` the (possibly single) per-chunk copy, `_stmtMerge` the post-aggregation
/// statement run once over concatenated chunk results.
pub struct QuerySession {
    default_db: String,
    interactive_chunk_limit: u32,
    plugins: Vec<Box<dyn QueryPlugin>>,
    context: QueryContext,
    original: String,
    stmt: Option<SelectStmt>,
    stmt_parallel: Vec<SelectStmt>,
    stmt_merge: Option<SelectStmt>,
    chunks: Vec<ChunkSpec>,
    scan_interactive: bool,
    is_dummy: bool,
    mapping: QueryMapping,
}

impl QuerySession {
    pub fn new(default_db: impl Into<String>) -> Self {
        Self::with_interactive_chunk_limit(default_db, DEFAULT_INTERACTIVE_CHUNK_LIMIT)
    }

    pub fn with_interactive_chunk_limit(default_db: impl Into<String>, limit: u32) -> Self {
        let default_db = default_db.into();
        Self {
            context: QueryContext::new(default_db.clone()),
            default_db,
            interactive_chunk_limit: limit,
            plugins: plugins::standard_pipeline(limit),
            original: String::new(),
            stmt: None,
            stmt_parallel: Vec::new(),
            stmt_merge: None,
            chunks: Vec::new(),
            scan_interactive: true,
            is_dummy: false,
            mapping: QueryMapping::default(),
        }
    }

    /// Parse and run the full plugin pipeline over `sql`. On success, [`Self::stmt_parallel`]
    /// and (if aggregation is needed) [`Self::merge_stmt`] are populated.
    pub fn analyze_query(&mut self, sql: &str) -> Result<()> {
        self.original = sql.to_string();
        let mut stmt = parse_select(sql).context(ParseSnafu)?;

        plugins::apply_logical_passes(&self.plugins, &mut stmt, &mut self.context)
            .map_err(|e| SessionError::Analysis {
                reason: e.to_string(),
            })?;

        self.mapping.sub_chunk_tables = stmt
            .from_list
            .iter()
            .flat_map(|from_list| &from_list.tables)
            .map(|table| {
                let db = table.db.clone().unwrap_or_else(|| self.default_db.clone());
                (db, table.table.clone())
            })
            .collect();

        let parallel = stmt.clone_deep();
        let merge = stmt.copy_merge();
        self.stmt = Some(stmt);
        self.stmt_parallel = vec![parallel];
        self.stmt_merge = Some(merge);

        let original_stmt = self.stmt.as_ref().expect("just set");
        let mut plan = Plan {
            original: original_stmt,
            parallel: self.stmt_parallel.clone(),
            merge: self.stmt_merge.clone().expect("just set"),
            has_merge: false,
        };
        plugins::apply_physical_passes(&self.plugins, &mut plan, &mut self.context)
            .map_err(|e| SessionError::Analysis {
                reason: e.to_string(),
            })?;
        self.stmt_parallel = plan.parallel;
        self.stmt_merge = Some(plan.merge);

        debug!(original = %self.original, needs_merge = self.needs_merge(), "query session analyzed statement");
        Ok(())
    }

    pub fn needs_merge(&self) -> bool {
        self.context.needs_merge
    }

    pub fn has_chunks(&self) -> bool {
        self.context.has_chunks()
    }

    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    pub fn dominant_db(&self) -> &str {
        if self.context.dominant_db.is_empty() {
            &self.default_db
        } else {
            &self.context.dominant_db
        }
    }

    pub fn add_chunk(&mut self, chunk: ChunkSpec) {
        trace!(chunk_id = chunk.chunk_id, "adding chunk to query session");
        self.context.chunk_count += 1;
        self.chunks.push(chunk);
    }

    pub fn set_scan_interactive(&mut self) {
        if self.context.chunk_count > self.interactive_chunk_limit {
            self.scan_interactive = false;
        }
    }

    pub fn scan_interactive(&self) -> bool {
        self.scan_interactive
    }

    /// Replace any enumerated chunks with the single dummy chunk, for queries with no spatial
    /// restriction at all (e.g. `SELECT 1`).
    pub fn set_dummy(&mut self) {
        self.is_dummy = true;
        self.context.chunk_count = 1;
        self.chunks.clear();
        self.chunks.push(ChunkSpec::new(DUMMY_CHUNK, vec![1]));
    }

    pub fn is_dummy(&self) -> bool {
        self.is_dummy
    }

    pub fn chunks(&self) -> &[ChunkSpec] {
        &self.chunks
    }

    pub fn merge_stmt(&self) -> Option<&SelectStmt> {
        if self.needs_merge() {
            self.stmt_merge.as_ref()
        } else {
            None
        }
    }

    /// Run every plugin's final pass and, if no chunk was ever enumerated, fall back to the
    /// dummy chunk so the query still executes somewhere.
    pub fn finalize(&mut self) -> Result<()> {
        plugins::apply_final_passes(&self.plugins, &mut self.context)
            .map_err(|e| SessionError::Analysis {
                reason: e.to_string(),
            })?;
        if self.chunks.is_empty() {
            self.set_dummy();
        }
        Ok(())
    }

    pub fn make_query_templates(&self) -> Vec<String> {
        self.stmt_parallel
            .iter()
            .map(|s| s.render_query_template())
            .collect()
    }

    fn build_chunk_queries(&self, templates: &[String], chunk_spec: &ChunkSpec) -> Vec<String> {
        templates
            .iter()
            .map(|t| self.mapping.apply(chunk_spec, t))
            .collect()
    }

    /// Build the worker-bound [`ChunkQuerySpec`] for one chunk, fragmenting it first if it has
    /// more sub-chunks than fit in a single request.
    pub fn build_chunk_query_spec(&self, templates: &[String], chunk_spec: &ChunkSpec) -> ChunkQuerySpec {
        let mut spec = ChunkQuerySpec::new(
            self.dominant_db().to_string(),
            chunk_spec.chunk_id,
            self.context.scan_info.clone(),
            self.scan_interactive,
        );
        spec.sub_chunk_tables = self.mapping.sub_chunk_tables.clone();

        if chunk_spec.should_split() {
            let mut frag = ChunkSpecFragmenter::new(chunk_spec.clone());
            let first_piece = frag.get();
            spec.queries = self.build_chunk_queries(templates, &first_piece);
            spec.sub_chunk_ids = first_piece.sub_chunks;
            frag.next();
            spec.next_fragment = self.build_fragment_chain(templates, &mut frag);
        } else {
            spec.queries = self.build_chunk_queries(templates, chunk_spec);
            spec.sub_chunk_ids = chunk_spec.sub_chunks.clone();
        }
        spec
    }

    fn build_fragment_chain(
        &self,
        templates: &[String],
        frag: &mut ChunkSpecFragmenter,
    ) -> Option<Box<ChunkQuerySpec>> {
        if frag.is_done() {
            return None;
        }
        let piece = frag.get();
        let mut spec = ChunkQuerySpec::new(
            self.dominant_db().to_string(),
            piece.chunk_id,
            self.context.scan_info.clone(),
            self.scan_interactive,
        );
        spec.sub_chunk_tables = self.mapping.sub_chunk_tables.clone();
        spec.queries = self.build_chunk_queries(templates, &piece);
        spec.sub_chunk_ids = piece.sub_chunks;
        frag.next();
        spec.next_fragment = self.build_fragment_chain(templates, frag);
        Some(Box::new(spec))
    }
}
