//! Chunks: the modules emitted into one entry's output file

use super::ModuleId;

/// A chunk is a group of modules that will be bundled together
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Entry name (used for output filename)
    pub name: String,

    /// Modules run at startup, in declaration order
    pub entry_ids: Vec<ModuleId>,

    /// Module IDs included in this chunk
    pub module_ids: Vec<ModuleId>,
}

impl Chunk {
    /// Create a new entry chunk
    pub fn entry(name: String, entry_ids: Vec<ModuleId>, module_ids: Vec<ModuleId>) -> Self {
        Self {
            name,
            entry_ids,
            module_ids,
        }
    }
}
