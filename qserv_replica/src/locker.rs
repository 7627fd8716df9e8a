use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;

/// A chunk within one database family, the unit [`ChunkLocker`] arbitrates ownership of.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    pub database_family: String,
    pub number: u32,
}

impl Chunk {
    pub fn new(database_family: impl Into<String>, number: u32) -> Self {
        Self {
            database_family: database_family.into(),
            number,
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk ({}:{})", self.database_family, self.number)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("ChunkLocker: owner must not be empty")]
pub struct EmptyOwnerError;

/// A bijective chunk<->owner map: at most one owner may hold a chunk at a time, and every
/// owner's held chunks can be released in bulk (e.g. when a job finishes or a controller loses
/// contact with it).
#[derive(Debug, Default)]
pub struct ChunkLocker {
    chunk_to_owner: Mutex<BTreeMap<Chunk, String>>,
    owner_to_chunks: Mutex<BTreeMap<String, Vec<Chunk>>>,
}

impl ChunkLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, chunk: &Chunk) -> bool {
        self.chunk_to_owner.lock().contains_key(chunk)
    }

    pub fn owner_of(&self, chunk: &Chunk) -> Option<String> {
        self.chunk_to_owner.lock().get(chunk).cloned()
    }

    /// Claim `chunk` for `owner`. Returns `true` if `owner` now holds it (either newly
    /// acquired, or it already did); `false` if a *different* owner holds it.
    pub fn lock(&self, chunk: Chunk, owner: &str) -> Result<bool, EmptyOwnerError> {
        if owner.is_empty() {
            return Err(EmptyOwnerError);
        }
        let mut chunk_to_owner = self.chunk_to_owner.lock();
        if let Some(existing) = chunk_to_owner.get(&chunk) {
            return Ok(existing == owner);
        }
        chunk_to_owner.insert(chunk.clone(), owner.to_string());
        self.owner_to_chunks
            .lock()
            .entry(owner.to_string())
            .or_default()
            .push(chunk);
        Ok(true)
    }

    /// Release `chunk` regardless of who holds it. Returns the prior owner, if any.
    pub fn release(&self, chunk: &Chunk) -> Option<String> {
        let owner = self.chunk_to_owner.lock().remove(chunk)?;
        let mut owner_to_chunks = self.owner_to_chunks.lock();
        if let Some(chunks) = owner_to_chunks.get_mut(&owner) {
            chunks.retain(|c| c != chunk);
            if chunks.is_empty() {
                owner_to_chunks.remove(&owner);
            }
        }
        Some(owner)
    }

    /// Release every chunk held by `owner`, returning them.
    pub fn release_owner(&self, owner: &str) -> Result<Vec<Chunk>, EmptyOwnerError> {
        if owner.is_empty() {
            return Err(EmptyOwnerError);
        }
        let chunks = self.owner_to_chunks.lock().remove(owner).unwrap_or_default();
        let mut chunk_to_owner = self.chunk_to_owner.lock();
        for chunk in &chunks {
            chunk_to_owner.remove(chunk);
        }
        Ok(chunks)
    }
}
