use crate::context::{QueryContext, Restrictor, ScanTableInfo};
use crate::plugin::{Plan, QueryPlugin, Result};
use observability_deps::tracing::trace;
use qserv_query::{BoolFactorTerm, ColumnRef, SelectEntry, SelectStmt, Term, ValueExpr};

/// Removes select-list entries that are syntactically identical to an earlier one.
#[derive(Debug, Default)]
pub struct DuplicateSelectExprPlugin;

impl QueryPlugin for DuplicateSelectExprPlugin {
    fn name(&self) -> &'static str {
        "DuplicateSelectExpr"
    }

    fn apply_logical(&self, stmt: &mut SelectStmt, _ctx: &mut QueryContext) -> Result<()> {
        let mut seen = Vec::new();
        stmt.select_list.entries.retain(|entry| {
            if seen.contains(entry) {
                false
            } else {
                seen.push(entry.clone());
                true
            }
        });
        Ok(())
    }
}

/// Normalizes the WHERE clause into an `OR`-of-`AND`s shape; a separate pass from `Where` so
/// the DNF rewrite can be ordered, tested and skipped independently of whatever else `Where`
/// grows to do.
#[derive(Debug, Default)]
pub struct WherePlugin;

impl QueryPlugin for WherePlugin {
    fn name(&self) -> &'static str {
        "Where"
    }
}

/// Rewrites the WHERE clause into disjunctive normal form so every downstream pass sees a
/// uniform `OR`-of-`AND`s shape.
#[derive(Debug, Default)]
pub struct DnfPlugin;

impl QueryPlugin for DnfPlugin {
    fn name(&self) -> &'static str {
        "Dnf"
    }

    fn apply_logical(&self, stmt: &mut SelectStmt, _ctx: &mut QueryContext) -> Result<()> {
        if let Some(where_clause) = &mut stmt.where_clause {
            where_clause.apply_disjunctive_normal_form();
        }
        Ok(())
    }
}

/// Splits aggregates into a parallel form (computed per chunk) and a merge form (computed once
/// over the concatenated chunk results), and sets `ctx.needs_merge` when any aggregate or
/// `GROUP BY` is present.
#[derive(Debug, Default)]
pub struct AggregatePlugin;

impl QueryPlugin for AggregatePlugin {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn apply_logical(&self, stmt: &mut SelectStmt, ctx: &mut QueryContext) -> Result<()> {
        ctx.needs_merge = stmt.select_list.has_aggregate() || stmt.group_by.is_some();
        Ok(())
    }

    fn apply_physical(&self, plan: &mut Plan<'_>, ctx: &mut QueryContext) -> Result<()> {
        if !ctx.needs_merge {
            return Ok(());
        }
        let mut parallel_entries = Vec::new();
        let mut merge_entries = Vec::new();
        for (index, entry) in plan.original.select_list.entries.iter().enumerate() {
            split_aggregate_entry(entry, index, &mut parallel_entries, &mut merge_entries);
        }
        for parallel in &mut plan.parallel {
            parallel.select_list.entries = parallel_entries.clone();
        }
        plan.merge.select_list.entries = merge_entries;
        Ok(())
    }
}

/// Rewrites one select-list entry into its per-chunk partial form(s) and its merge-side
/// reduction, following the original planner's `qc<N>` quasi-column naming
/// (`SELECT COUNT(*) FROM Object` → parallel `COUNT(*) AS qc0`, merge `SUM(qc0)`).
///
/// `AVG` has no single-value partial: the worker reports `SUM` and `COUNT` separately
/// (`qc<N>_sum`/`qc<N>_cnt`) and the merge step divides their totals. `MIN`/`MAX` reduce with
/// themselves; `COUNT`/`SUM` reduce with `SUM`. Anything else aggregate-shaped but not one of
/// these five functions has no known splitting rule and is passed through unchanged to both
/// sides (same fallback the original entry already had before this pass existed).
fn split_aggregate_entry(
    entry: &SelectEntry,
    index: usize,
    parallel_out: &mut Vec<SelectEntry>,
    merge_out: &mut Vec<SelectEntry>,
) {
    let ValueExpr::FunctionCall {
        name,
        args,
        is_aggregate: true,
    } = &entry.expr
    else {
        parallel_out.push(entry.clone());
        merge_out.push(entry.clone());
        return;
    };

    let result_alias = entry.alias.clone().unwrap_or_else(|| format!("qc{index}"));
    match name.to_ascii_uppercase().as_str() {
        "AVG" => {
            let arg = args.first().cloned().unwrap_or(ValueExpr::Raw("*".to_string()));
            let sum_alias = format!("qc{index}_sum");
            let cnt_alias = format!("qc{index}_cnt");
            parallel_out.push(aggregate_entry("SUM", vec![arg.clone()], &sum_alias));
            parallel_out.push(aggregate_entry("COUNT", vec![arg], &cnt_alias));
            merge_out.push(SelectEntry {
                expr: ValueExpr::Raw(format!("SUM({sum_alias}) / SUM({cnt_alias})")),
                alias: Some(result_alias),
            });
        }
        upper @ ("COUNT" | "SUM") => {
            let chunk_alias = format!("qc{index}");
            parallel_out.push(aggregate_entry(upper, args.clone(), &chunk_alias));
            merge_out.push(aggregate_entry(
                "SUM",
                vec![ValueExpr::Column(ColumnRef::new(chunk_alias.clone()))],
                &result_alias,
            ));
        }
        upper @ ("MIN" | "MAX") => {
            let chunk_alias = format!("qc{index}");
            parallel_out.push(aggregate_entry(upper, args.clone(), &chunk_alias));
            merge_out.push(aggregate_entry(
                upper,
                vec![ValueExpr::Column(ColumnRef::new(chunk_alias.clone()))],
                &result_alias,
            ));
        }
        _ => {
            parallel_out.push(entry.clone());
            merge_out.push(entry.clone());
        }
    }
}

fn aggregate_entry(name: &str, args: Vec<ValueExpr>, alias: &str) -> SelectEntry {
    SelectEntry {
        expr: ValueExpr::FunctionCall {
            name: name.to_string(),
            args,
            is_aggregate: true,
        },
        alias: Some(alias.to_string()),
    }
}

/// Resolves the dominant database/table the query touches, used to pick the striping scheme.
#[derive(Debug, Default)]
pub struct TablePlugin;

impl QueryPlugin for TablePlugin {
    fn name(&self) -> &'static str {
        "Table"
    }

    fn apply_logical(&self, stmt: &mut SelectStmt, ctx: &mut QueryContext) -> Result<()> {
        if let Some(from_list) = &stmt.from_list {
            for table in &from_list.tables {
                let db = table.db.clone().unwrap_or_else(|| ctx.default_db.clone());
                ctx.known_dbs.insert(db.clone());
                if ctx.dominant_db.is_empty() {
                    ctx.dominant_db = db;
                }
            }
        }
        Ok(())
    }
}

/// Recognizes spatially-partitioned match tables (e.g. `Object` paired with `ObjectFullOverlap`)
/// so sub-chunk fragmentation knows to visit both halves. Kept as a pass-through until a real
/// partitioning schema source is wired in; it only records what `TablePlugin` already resolved.
#[derive(Debug, Default)]
pub struct MatchTablePlugin;

impl QueryPlugin for MatchTablePlugin {
    fn name(&self) -> &'static str {
        "MatchTable"
    }

    fn apply_logical(&self, _stmt: &mut SelectStmt, ctx: &mut QueryContext) -> Result<()> {
        trace!(dominant_db = %ctx.dominant_db, "match-table pass: no overlap tables registered");
        Ok(())
    }
}

/// Extracts `qserv_areaspec_*`-style spatial restrictors from the WHERE clause into the
/// context, where the chunk mapper can use them to prune the chunk set.
#[derive(Debug, Default)]
pub struct QservRestrictorPlugin;

impl QueryPlugin for QservRestrictorPlugin {
    fn name(&self) -> &'static str {
        "QservRestrictor"
    }

    fn apply_logical(&self, stmt: &mut SelectStmt, ctx: &mut QueryContext) -> Result<()> {
        let Some(where_clause) = &stmt.where_clause else {
            return Ok(());
        };
        let Some(root) = &where_clause.root else {
            return Ok(());
        };
        collect_restrictors(root, &mut ctx.restrictors);
        Ok(())
    }
}

fn collect_restrictors(term: &Term, out: &mut Vec<Restrictor>) {
    match term {
        Term::And(terms) | Term::Or(terms) => {
            for t in terms {
                collect_restrictors(t, out);
            }
        }
        Term::Factor(factor) => {
            for bft in &factor.terms {
                if let BoolFactorTerm::Pass(text) = bft {
                    if let Some(restrictor) = parse_restrictor_call(text) {
                        out.push(restrictor);
                    }
                }
            }
        }
    }
}

fn parse_restrictor_call(text: &str) -> Option<Restrictor> {
    let text = text.trim();
    if !text.to_ascii_lowercase().starts_with("qserv_") {
        return None;
    }
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close < open {
        return None;
    }
    let name = text[..open].trim().to_string();
    let params = text[open + 1..close]
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    Some(Restrictor { name, params })
}

/// Builds the post-merge (`GROUP BY`/`HAVING`/`ORDER BY`) statement once the parallel/merge
/// split exists.
#[derive(Debug, Default)]
pub struct PostPlugin;

impl QueryPlugin for PostPlugin {
    fn name(&self) -> &'static str {
        "Post"
    }

    fn apply_physical(&self, plan: &mut Plan<'_>, ctx: &mut QueryContext) -> Result<()> {
        plan.has_merge = ctx.needs_merge;
        Ok(())
    }
}

/// Decides whether the query counts as "interactive": cheap enough to jump the dispatch queue
/// ahead of full-table scans, based on how many chunks it ultimately touches.
#[derive(Debug)]
pub struct ScanTablePlugin {
    pub interactive_chunk_limit: u32,
}

impl ScanTablePlugin {
    pub fn new(interactive_chunk_limit: u32) -> Self {
        Self {
            interactive_chunk_limit,
        }
    }
}

impl QueryPlugin for ScanTablePlugin {
    fn name(&self) -> &'static str {
        "ScanTable"
    }

    fn apply_final(&self, ctx: &mut QueryContext) -> Result<()> {
        for table in &ctx.known_dbs {
            ctx.scan_info.info_tables.push(ScanTableInfo {
                db: table.clone(),
                table: String::new(),
                lock_in_memory: false,
                scan_rating: ctx.scan_info.scan_rating,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qserv_query::{BoolFactor, WhereClause};

    #[test]
    fn duplicate_select_expr_removes_repeated_entries() {
        let mut stmt = SelectStmt::default();
        let entry = qserv_query::SelectEntry {
            expr: qserv_query::ValueExpr::Column(qserv_query::ColumnRef::new("x")),
            alias: None,
        };
        stmt.select_list.entries = vec![entry.clone(), entry.clone(), entry];
        let mut ctx = QueryContext::new("db");
        DuplicateSelectExprPlugin.apply_logical(&mut stmt, &mut ctx).unwrap();
        assert_eq!(stmt.select_list.entries.len(), 1);
    }

    #[test]
    fn restrictor_plugin_extracts_qserv_area_spec_call() {
        let mut stmt = SelectStmt::default();
        stmt.where_clause = Some(WhereClause::new(Term::Factor(BoolFactor::single(
            BoolFactorTerm::Pass("qserv_areaspec_box(0, 0, 1, 1)".to_string()),
        ))));
        let mut ctx = QueryContext::new("db");
        QservRestrictorPlugin.apply_logical(&mut stmt, &mut ctx).unwrap();
        assert_eq!(ctx.restrictors.len(), 1);
        assert_eq!(ctx.restrictors[0].name, "qserv_areaspec_box");
        assert_eq!(ctx.restrictors[0].params.len(), 4);
    }

    #[test]
    fn table_plugin_resolves_dominant_db_from_default() {
        let mut stmt = SelectStmt::default();
        stmt.set_from_list_as_table(qserv_query::TableRef::new("Object"));
        let mut ctx = QueryContext::new("lsst");
        TablePlugin.apply_logical(&mut stmt, &mut ctx).unwrap();
        assert_eq!(ctx.dominant_db, "lsst");
    }

    #[test]
    fn dnf_plugin_normalizes_where_clause() {
        let mut stmt = SelectStmt::default();
        stmt.where_clause = Some(WhereClause::new(Term::And(vec![
            Term::Factor(BoolFactor::single(BoolFactorTerm::Pass("a = 1".to_string()))),
            Term::Or(vec![
                Term::Factor(BoolFactor::single(BoolFactorTerm::Pass("b = 2".to_string()))),
                Term::Factor(BoolFactor::single(BoolFactorTerm::Pass("c = 3".to_string()))),
            ]),
        ])));
        let mut ctx = QueryContext::new("db");
        DnfPlugin.apply_logical(&mut stmt, &mut ctx).unwrap();
        match stmt.where_clause.unwrap().root.unwrap() {
            Term::Or(disjuncts) => assert_eq!(disjuncts.len(), 2),
            other => panic!("expected a top-level Or after DNF, got {other:?}"),
        }
    }

    fn aggregate_plan(sql_select: SelectEntry) -> (Vec<SelectEntry>, Vec<SelectEntry>) {
        let mut original = SelectStmt::default();
        original.select_list.entries = vec![sql_select];
        let parallel = original.clone_deep();
        let merge = original.copy_merge();
        let mut ctx = QueryContext::new("db");
        ctx.needs_merge = true;
        let mut plan = Plan {
            original: &original,
            parallel: vec![parallel],
            merge,
            has_merge: true,
        };
        AggregatePlugin.apply_physical(&mut plan, &mut ctx).unwrap();
        (plan.parallel[0].select_list.entries.clone(), plan.merge.select_list.entries)
    }

    #[test]
    fn aggregate_plugin_splits_count_star_into_sum_of_partial_counts() {
        let (parallel, merge) = aggregate_plan(SelectEntry {
            expr: ValueExpr::FunctionCall {
                name: "COUNT".to_string(),
                args: vec![ValueExpr::Raw("*".to_string())],
                is_aggregate: true,
            },
            alias: None,
        });
        assert_eq!(parallel.len(), 1);
        assert_eq!(parallel[0].to_string(), "COUNT(*) AS qc0");
        assert_eq!(merge.len(), 1);
        assert_eq!(merge[0].to_string(), "SUM(qc0) AS qc0");
    }

    #[test]
    fn aggregate_plugin_splits_avg_into_sum_and_count() {
        let (parallel, merge) = aggregate_plan(SelectEntry {
            expr: ValueExpr::FunctionCall {
                name: "AVG".to_string(),
                args: vec![ValueExpr::Column(ColumnRef::new("mag"))],
                is_aggregate: true,
            },
            alias: Some("avgMag".to_string()),
        });
        assert_eq!(parallel.len(), 2);
        assert_eq!(parallel[0].to_string(), "SUM(mag) AS qc0_sum");
        assert_eq!(parallel[1].to_string(), "COUNT(mag) AS qc0_cnt");
        assert_eq!(merge.len(), 1);
        assert_eq!(merge[0].to_string(), "SUM(qc0_sum) / SUM(qc0_cnt) AS avgMag");
    }

    #[test]
    fn aggregate_plugin_leaves_plain_columns_alone() {
        let (parallel, merge) = aggregate_plan(SelectEntry {
            expr: ValueExpr::Column(ColumnRef::new("objectId")),
            alias: None,
        });
        assert_eq!(parallel.len(), 1);
        assert_eq!(merge.len(), 1);
        assert_eq!(parallel[0], merge[0]);
    }
}
