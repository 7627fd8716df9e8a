use crate::chunk_spec::ChunkSpec;
use qserv_plugins::ScanInfo;
use std::collections::BTreeSet;

/// A `(db, table)` pair that is itself sub-chunked, so its name in a query template must be
/// rewritten per sub-chunk rather than just per chunk.
pub type DbTable = (String, String);

/// Substitutes `%CC%`/`%SS%`-style chunk/sub-chunk placeholders a query template carries for
/// every partitioned table it references.
#[derive(Debug, Clone, Default)]
pub struct QueryMapping {
    pub sub_chunk_tables: BTreeSet<DbTable>,
}

impl QueryMapping {
    /// Render `template` against a concrete chunk (and, if any, sub-chunks): `%CC%` becomes the
    /// chunk id, and each table in [`Self::sub_chunk_tables`] gets a `_<chunk>[_<subchunk>]`
    /// suffix appended to its bare name occurrences.
    pub fn apply(&self, chunk_spec: &ChunkSpec, template: &str) -> String {
        let mut out = template.replace("%CC%", &chunk_spec.chunk_id.to_string());
        for (_db, table) in &self.sub_chunk_tables {
            let suffixed = format!("{table}_{}", chunk_spec.chunk_id);
            out = out.replace(table.as_str(), &suffixed);
        }
        out
    }
}

/// Everything a worker needs to run one chunk's share of a statement: the rendered per-table
/// queries, which sub-chunk tables are involved, and (if the chunk had to be fragmented) a
/// linked tail of further [`ChunkQuerySpec`]s for the remaining sub-chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkQuerySpec {
    pub db: String,
    pub chunk_id: i32,
    pub scan_info: ScanInfo,
    pub scan_interactive: bool,
    pub sub_chunk_tables: BTreeSet<DbTable>,
    pub sub_chunk_ids: Vec<i32>,
    pub queries: Vec<String>,
    pub next_fragment: Option<Box<ChunkQuerySpec>>,
}

impl ChunkQuerySpec {
    pub fn new(db: impl Into<String>, chunk_id: i32, scan_info: ScanInfo, scan_interactive: bool) -> Self {
        Self {
            db: db.into(),
            chunk_id,
            scan_info,
            scan_interactive,
            ..Default::default()
        }
    }

    /// Flatten this spec and its fragment chain into one list, in order.
    pub fn flatten(&self) -> Vec<&ChunkQuerySpec> {
        let mut out = vec![self];
        let mut cur = &self.next_fragment;
        while let Some(next) = cur {
            out.push(next);
            cur = &next.next_fragment;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_substitutes_chunk_placeholder() {
        let mapping = QueryMapping::default();
        let spec = ChunkSpec::new(5, vec![]);
        assert_eq!(
            mapping.apply(&spec, "SELECT * FROM Object_%CC%"),
            "SELECT * FROM Object_5"
        );
    }

    #[test]
    fn apply_suffixes_sub_chunk_tables() {
        let mut mapping = QueryMapping::default();
        mapping
            .sub_chunk_tables
            .insert(("lsst".to_string(), "Object".to_string()));
        let spec = ChunkSpec::new(5, vec![1, 2]);
        assert_eq!(
            mapping.apply(&spec, "SELECT * FROM Object"),
            "SELECT * FROM Object_5"
        );
    }

    #[test]
    fn flatten_walks_the_fragment_chain() {
        let mut head = ChunkQuerySpec::new("lsst", 1, ScanInfo::default(), true);
        head.next_fragment = Some(Box::new(ChunkQuerySpec::new(
            "lsst",
            1,
            ScanInfo::default(),
            true,
        )));
        assert_eq!(head.flatten().len(), 2);
    }
}
