use std::collections::BTreeSet;

/// A restriction extracted from the WHERE clause that narrows which chunks a query must visit,
/// e.g. `qserv_areaspec_box(ra1, decl1, ra2, decl2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Restrictor {
    pub name: String,
    pub params: Vec<String>,
}

/// Per-table scan cost hint used to decide whether a query counts as "interactive" (cheap,
/// prioritized ahead of full-table scans).
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTableInfo {
    pub db: String,
    pub table: String,
    pub lock_in_memory: bool,
    pub scan_rating: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanInfo {
    pub scan_rating: u32,
    pub info_tables: Vec<ScanTableInfo>,
}

/// State threaded through every plugin pass: what's been learned about the statement so far,
/// independent of the statement's own syntax tree.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub default_db: String,
    pub dominant_db: String,
    pub known_dbs: BTreeSet<String>,
    pub chunk_count: u32,
    pub needs_merge: bool,
    pub restrictors: Vec<Restrictor>,
    pub scan_info: ScanInfo,
}

impl QueryContext {
    pub fn new(default_db: impl Into<String>) -> Self {
        Self {
            default_db: default_db.into(),
            ..Default::default()
        }
    }

    pub fn has_chunks(&self) -> bool {
        self.chunk_count > 0
    }

    pub fn contains_db(&self, db: &str) -> bool {
        self.known_dbs.contains(db)
    }
}
