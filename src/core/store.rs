//! Store abstraction for proofgate's local state.
//!
//! A store is the `.proofgate/data/` directory of a project: the SQLite
//! database plus the append-only JSONL audit logs that sit beside it.

use std::path::{Path, PathBuf};

/// Store type discriminator.
///
/// - `Project`: the `.proofgate/data/` directory discovered from the working tree
/// - `Scratch`: a throwaway root (QA runs, tests) that nothing else reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Project,
    Scratch,
}

/// Store handle representing one proofgate state workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Store type
    pub kind: StoreKind,
    /// Absolute path to the store root directory
    pub root: PathBuf,
}

impl Store {
    pub fn project(root: &Path) -> Self {
        Self {
            kind: StoreKind::Project,
            root: root.to_path_buf(),
        }
    }

    pub fn scratch(root: &Path) -> Self {
        Self {
            kind: StoreKind::Scratch,
            root: root.to_path_buf(),
        }
    }

    pub fn events_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.events.jsonl", name))
    }
}
