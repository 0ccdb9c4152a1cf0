//! Nodes of the in-memory path tree

use std::collections::BTreeMap;

/// Type of tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// A single file or directory in the mounted image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNode {
    name: String,
    kind: NodeKind,
    /// Absolute byte offset of the file data in the image (files only)
    data_offset: u64,
    /// File size in bytes (0 for directories)
    size: u64,
    /// Number of direct children that are directories
    subdirectory_count: u32,
    children: BTreeMap<String, PathNode>,
}

impl PathNode {
    /// Create root directory node
    pub(crate) fn root() -> Self {
        Self::new_directory(String::new())
    }

    pub(crate) fn new_directory(name: String) -> Self {
        Self {
            name,
            kind: NodeKind::Directory,
            data_offset: 0,
            size: 0,
            subdirectory_count: 0,
            children: BTreeMap::new(),
        }
    }

    pub(crate) fn new_file(name: String, data_offset: u64, size: u64) -> Self {
        Self {
            name,
            kind: NodeKind::File,
            data_offset,
            size,
            subdirectory_count: 0,
            children: BTreeMap::new(),
        }
    }

    /// Name of this node, empty for the root
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Check if this is a directory
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Check if this is a file
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn subdirectory_count(&self) -> u32 {
        self.subdirectory_count
    }

    /// Direct child by exact name
    pub fn child(&self, name: &str) -> Option<&PathNode> {
        self.children.get(name)
    }

    /// Direct children, ordered by name
    pub fn children(&self) -> impl Iterator<Item = &PathNode> {
        self.children.values()
    }

    pub(crate) fn child_mut(&mut self, name: &str) -> Option<&mut PathNode> {
        self.children.get_mut(name)
    }

    /// Attach a child; the caller has checked the name is free
    pub(crate) fn attach(&mut self, child: PathNode) -> &mut PathNode {
        if child.is_directory() {
            self.subdirectory_count += 1;
        }
        self.children.entry(child.name.clone()).or_insert(child)
    }

    /// Number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children.values().map(PathNode::node_count).sum::<usize>()
    }
}
