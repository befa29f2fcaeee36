//! Enumeration of every stream in a compound file.
//!
//! Two passes over the directory:
//!
//! 1. A depth-first walk from the root using an explicit worklist, yielding
//!    each reachable stream with the names of its ancestor storages.
//! 2. A linear scan of the raw directory table that yields stream slots the
//!    walk never reached (orphans), each under its bare name.
//!
//! Failures inside the walk (over-deep nesting, cycles, bad links, odd entry
//! types) are yielded as `Err` items and only prune the affected branch.

use crate::compound::{CompoundFile, EntryKind, StreamHandle};
use crate::error::CompoundError;
use std::io::{Read, Seek};

/// Deepest storage nesting the walk will descend into.
pub const MAX_STORAGE_DEPTH: usize = 100;

/// A stream found by [`Streams`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Found by the table scan rather than the tree walk
    pub orphan: bool,
    /// Storage names from the root down to the stream itself, never empty
    pub path: Vec<String>,
    /// Type of the directory slot
    pub kind: EntryKind,
    /// Handle for reading the stream bytes
    pub handle: StreamHandle,
}

impl StreamEntry {
    /// Slash-joined path for diagnostics.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }
}

struct Pending {
    id: u32,
    parent_path: Vec<String>,
    /// Nesting level of this entry; children of the root sit at level 1
    depth: usize,
}

/// Single-pass iterator over the streams of a compound file.
pub struct Streams<'a, R: Read + Seek> {
    file: &'a CompoundFile<R>,
    pending: Vec<Pending>,
    visited: Vec<bool>,
    root_error: Option<CompoundError>,
    scan_next: usize,
}

impl<'a, R: Read + Seek> Streams<'a, R> {
    fn new(file: &'a CompoundFile<R>) -> Self {
        let mut visited = vec![false; file.entries().len()];
        let root = file.root();
        visited[root.id as usize] = true;

        let mut streams = Streams {
            file,
            pending: Vec::new(),
            visited,
            root_error: None,
            scan_next: 0,
        };

        match file.children(root.id) {
            Ok(children) => streams.push_children(children, Vec::new(), 1),
            Err(e) => streams.root_error = Some(e),
        }
        streams
    }

    fn push_children(&mut self, children: Vec<u32>, parent_path: Vec<String>, depth: usize) {
        // Reverse so the stack pops children in directory order
        for id in children.into_iter().rev() {
            self.pending.push(Pending {
                id,
                parent_path: parent_path.clone(),
                depth,
            });
        }
    }

    fn next_reachable(&mut self) -> Option<Result<StreamEntry, CompoundError>> {
        while let Some(pending) = self.pending.pop() {
            // Ids come from CompoundFile::children, which bounds-checks them
            let Some(entry) = self.file.entry(pending.id) else {
                continue;
            };

            let mut path = pending.parent_path;
            path.push(entry.name.clone());

            if self.visited[entry.id as usize] {
                return Some(Err(CompoundError::Cycle {
                    id: entry.id,
                    path: path.join("/"),
                }));
            }
            self.visited[entry.id as usize] = true;

            match entry.kind {
                EntryKind::Stream => {
                    return Some(Ok(StreamEntry {
                        orphan: false,
                        path,
                        kind: entry.kind,
                        handle: entry.handle(),
                    }));
                }
                EntryKind::Storage => {
                    if pending.depth > MAX_STORAGE_DEPTH {
                        return Some(Err(CompoundError::TooDeep {
                            path: path.join("/"),
                            limit: MAX_STORAGE_DEPTH,
                        }));
                    }
                    match self.file.children(entry.id) {
                        Ok(children) => self.push_children(children, path, pending.depth + 1),
                        Err(e) => return Some(Err(e)),
                    }
                }
                kind => {
                    return Some(Err(CompoundError::UnexpectedEntry {
                        path: path.join("/"),
                        kind,
                    }));
                }
            }
        }
        None
    }

    fn next_orphan(&mut self) -> Option<StreamEntry> {
        let entries = self.file.entries();
        while let Some(entry) = entries.get(self.scan_next) {
            self.scan_next += 1;
            if entry.kind == EntryKind::Stream && !self.visited[entry.id as usize] {
                return Some(StreamEntry {
                    orphan: true,
                    path: vec![entry.name.clone()],
                    kind: entry.kind,
                    handle: entry.handle(),
                });
            }
        }
        None
    }
}

impl<R: Read + Seek> Iterator for Streams<'_, R> {
    type Item = Result<StreamEntry, CompoundError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.root_error.take() {
            return Some(Err(e));
        }
        if let Some(item) = self.next_reachable() {
            return Some(item);
        }
        self.next_orphan().map(Ok)
    }
}

impl<R: Read + Seek> CompoundFile<R> {
    /// Every stream in the file: reachable ones first, then orphans.
    pub fn streams(&self) -> Streams<'_, R> {
        Streams::new(self)
    }
}
