//! stat-style attributes derived from tree nodes

use std::time::SystemTime;

use super::entry::{NodeKind, PathNode};
use crate::xdvdfs::ImageTimes;

/// r-x for owner, group and other
pub const DIRECTORY_PERMISSIONS: u16 = 0o555;

/// r-- for owner, group and other
pub const FILE_PERMISSIONS: u16 = 0o444;

/// Owner reported for every node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    /// Identity of the running process
    pub fn current() -> Self {
        // SAFETY: getuid/getgid cannot fail and touch no memory.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self { uid, gid }
    }
}

/// Attributes of one node as reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub kind: NodeKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl PathNode {
    /// Derive attributes; ownership and times come from the image, not the tree
    pub fn attributes(&self, owner: Ownership, times: ImageTimes) -> Attributes {
        let (perm, nlink, size) = match self.kind() {
            // 2 + subdirectories keeps find(1) leaf optimisation correct
            NodeKind::Directory => (DIRECTORY_PERMISSIONS, 2 + self.subdirectory_count(), 0),
            NodeKind::File => (FILE_PERMISSIONS, 1, self.size()),
        };
        Attributes {
            kind: self.kind(),
            size,
            perm,
            nlink,
            uid: owner.uid,
            gid: owner.gid,
            atime: times.atime,
            mtime: times.mtime,
            ctime: times.ctime,
        }
    }
}
