//! Per-source read positions

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How far a source log has been made durable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCursor {
    /// Byte offset after the last complete line applied
    pub offset: u64,
    /// Records consumed so far
    pub records: u64,
    /// File length when the cursor was recorded
    pub file_len: u64,
}

/// Cursors for every known source, keyed by path.
///
/// Loaded from the store, handed to the controller and handed back with
/// the positions that became durable during the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorSet {
    cursors: HashMap<PathBuf, SyncCursor>,
}

impl CursorSet {
    pub fn get(&self, path: &Path) -> Option<&SyncCursor> {
        self.cursors.get(path)
    }

    /// Cursor for `path`, or the zero cursor if the source is unseen
    pub fn position(&self, path: &Path) -> SyncCursor {
        self.cursors.get(path).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, path: PathBuf, cursor: SyncCursor) {
        self.cursors.insert(path, cursor);
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &SyncCursor)> {
        self.cursors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_source_starts_at_zero() {
        let mut cursors = CursorSet::default();
        let path = PathBuf::from("/logs/a.jsonl");
        assert!(cursors.get(&path).is_none());
        assert_eq!(cursors.position(&path), SyncCursor::default());

        cursors.insert(
            path.clone(),
            SyncCursor {
                offset: 10,
                records: 1,
                file_len: 10,
            },
        );
        assert_eq!(cursors.position(&path).offset, 10);
        assert_eq!(cursors.len(), 1);
    }
}
