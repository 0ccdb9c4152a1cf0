//! In-memory path hierarchy of a mounted image
//!
//! The tree is filled once while the image is parsed and only read afterwards,
//! so lookups need no locking. Directories exist only as ancestors of inserted
//! files; an XDVDFS directory with no files anywhere below it never shows up.

pub mod attributes;
pub mod entry;

pub use attributes::{Attributes, Ownership, DIRECTORY_PERMISSIONS, FILE_PERMISSIONS};
pub use entry::{NodeKind, PathNode};

use crate::xdvdfs::FormatError;

/// Path-indexed hierarchy of files and directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTree {
    root: PathNode,
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTree {
    /// Create a tree holding only the root directory
    pub fn new() -> Self {
        Self {
            root: PathNode::root(),
        }
    }

    pub fn root(&self) -> &PathNode {
        &self.root
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Insert a file at `relative_path` (no leading `/`).
    ///
    /// Missing parent directories are created. A name that is already taken
    /// fails with [`FormatError::DuplicateEntry`]; the first entry is kept and the
    /// tree is left unchanged.
    pub fn insert(&mut self, relative_path: &str, offset: u64, size: u64) -> Result<(), FormatError> {
        if relative_path.split('/').any(str::is_empty) {
            return Err(FormatError::InvalidPath(relative_path.to_owned()));
        }
        insert_below(&mut self.root, relative_path, relative_path, offset, size)
    }

    /// Look up an absolute path such as `/media/intro.xmv`; `/` is the root.
    ///
    /// A single trailing `/` is accepted when the path names a directory.
    pub fn find_entry(&self, absolute_path: &str) -> Option<&PathNode> {
        let relative = absolute_path.strip_prefix('/')?;
        let (mut rest, wants_directory) = match relative.strip_suffix('/') {
            Some(trimmed) => (trimmed, true),
            None => (relative, false),
        };
        if wants_directory && (rest.is_empty() || rest.ends_with('/')) {
            return None;
        }

        let mut node = &self.root;
        loop {
            if rest.is_empty() {
                return (!wants_directory || node.is_directory()).then_some(node);
            }
            let (component, tail) = rest.split_once('/').unwrap_or((rest, ""));
            if component.is_empty() {
                return None;
            }
            node = node.child(component)?;
            rest = tail;
        }
    }
}

fn insert_below(
    node: &mut PathNode,
    full_path: &str,
    remainder: &str,
    offset: u64,
    size: u64,
) -> Result<(), FormatError> {
    match remainder.split_once('/') {
        Some((directory, rest)) => {
            let child = match node.child(directory).map(PathNode::is_directory) {
                Some(false) => {
                    return Err(FormatError::DuplicateEntry(full_path.to_owned()));
                }
                Some(true) => node.child_mut(directory),
                None => Some(node.attach(PathNode::new_directory(directory.to_owned()))),
            };
            match child {
                Some(child) => insert_below(child, full_path, rest, offset, size),
                None => Err(FormatError::InvalidPath(full_path.to_owned())),
            }
        }
        None => {
            if node.child(remainder).is_some() {
                return Err(FormatError::DuplicateEntry(full_path.to_owned()));
            }
            node.attach(PathNode::new_file(remainder.to_owned(), offset, size));
            Ok(())
        }
    }
}
