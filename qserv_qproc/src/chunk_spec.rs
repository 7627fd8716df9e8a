/// The special chunk number used when a query has no spatial restriction and must run against
/// a single placeholder "dummy" chunk rather than being fanned out at all.
pub const DUMMY_CHUNK: i32 = 1234567890;

/// Above this many sub-chunks in one go, a [`ChunkSpec`] gets split into fragments so no single
/// worker request carries an unreasonably large `IN (...)` list.
pub const MAX_SUB_CHUNKS_PER_FRAGMENT: usize = 1000;

/// A chunk, plus the sub-chunks within it a query actually needs to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    pub chunk_id: i32,
    pub sub_chunks: Vec<i32>,
}

impl ChunkSpec {
    pub fn new(chunk_id: i32, sub_chunks: Vec<i32>) -> Self {
        Self { chunk_id, sub_chunks }
    }

    pub fn whole_chunk(chunk_id: i32) -> Self {
        Self {
            chunk_id,
            sub_chunks: Vec::new(),
        }
    }

    pub fn should_split(&self) -> bool {
        self.sub_chunks.len() > MAX_SUB_CHUNKS_PER_FRAGMENT
    }
}

/// Splits a [`ChunkSpec`] with many sub-chunks into fixed-size fragments, each small enough to
/// ship as one worker request.
#[derive(Debug)]
pub struct ChunkSpecFragmenter {
    chunk_id: i32,
    remaining: std::vec::IntoIter<Vec<i32>>,
    current: Option<Vec<i32>>,
}

impl ChunkSpecFragmenter {
    pub fn new(spec: ChunkSpec) -> Self {
        let fragments: Vec<Vec<i32>> = spec
            .sub_chunks
            .chunks(MAX_SUB_CHUNKS_PER_FRAGMENT)
            .map(|c| c.to_vec())
            .collect();
        let mut remaining = fragments.into_iter();
        let current = remaining.next();
        Self {
            chunk_id: spec.chunk_id,
            remaining,
            current,
        }
    }

    pub fn is_done(&self) -> bool {
        self.current.is_none()
    }

    pub fn get(&self) -> ChunkSpec {
        ChunkSpec::new(
            self.chunk_id,
            self.current.clone().unwrap_or_default(),
        )
    }

    pub fn next(&mut self) {
        self.current = self.remaining.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_split_only_above_the_fragment_threshold() {
        let small = ChunkSpec::new(1, (0..10).collect());
        assert!(!small.should_split());
        let big = ChunkSpec::new(1, (0..(MAX_SUB_CHUNKS_PER_FRAGMENT as i32 + 1)).collect());
        assert!(big.should_split());
    }

    #[test]
    fn fragmenter_walks_every_sub_chunk_exactly_once() {
        let total = MAX_SUB_CHUNKS_PER_FRAGMENT * 2 + 5;
        let spec = ChunkSpec::new(7, (0..total as i32).collect());
        let mut frag = ChunkSpecFragmenter::new(spec);
        let mut seen = Vec::new();
        while !frag.is_done() {
            let s = frag.get();
            assert_eq!(s.chunk_id, 7);
            seen.extend(s.sub_chunks);
            frag.next();
        }
        assert_eq!(seen.len(), total);
    }
}
