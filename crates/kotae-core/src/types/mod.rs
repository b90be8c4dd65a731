pub mod candidate;
pub mod entry;

pub use candidate::{MatchCandidate, Tier};
pub use entry::{EntryId, EntryRecord, EntryUpdate, KnowledgeEntry, NewEntry, DEFAULT_AUTHOR};
