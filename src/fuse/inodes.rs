//! Inode number allocation for path-addressed filesystems

use std::collections::HashMap;

/// Inode of the mount root, fixed by the kernel protocol
pub const ROOT_INODE: u64 = 1;

/// Two-way map between inode numbers and absolute paths.
///
/// Numbers are handed out on first sight and never reused, so the kernel sees
/// the same inode for a path for as long as the mount lives.
#[derive(Debug)]
pub struct InodeTable {
    /// `paths[i]` belongs to inode `i + 1`
    paths: Vec<String>,
    inodes: HashMap<String, u64>,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut inodes = HashMap::new();
        inodes.insert("/".to_string(), ROOT_INODE);
        Self {
            paths: vec!["/".to_string()],
            inodes,
        }
    }

    /// Path registered for `ino`
    pub fn path(&self, ino: u64) -> Option<&str> {
        let index = usize::try_from(ino.checked_sub(1)?).ok()?;
        self.paths.get(index).map(String::as_str)
    }

    /// Inode for `path`, allocating one if the path is new
    pub fn assign(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        self.paths.push(path.to_owned());
        let ino = self.paths.len() as u64;
        self.inodes.insert(path.to_owned(), ino);
        ino
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Join a directory path and a child name
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Directory containing `path`; the root is its own parent
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_preassigned() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INODE), Some("/"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.path(0), None);
        assert_eq!(table.path(2), None);
    }

    #[test]
    fn test_assign_is_stable() {
        let mut table = InodeTable::new();
        let media = table.assign("/media");
        let intro = table.assign("/media/intro.xmv");
        assert_eq!(media, 2);
        assert_eq!(intro, 3);
        assert_eq!(table.assign("/media"), media);
        assert_eq!(table.assign("/"), ROOT_INODE);
        assert_eq!(table.path(intro), Some("/media/intro.xmv"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_path_joining() {
        assert_eq!(child_path("/", "default.xbe"), "/default.xbe");
        assert_eq!(child_path("/media", "intro.xmv"), "/media/intro.xmv");
        assert_eq!(parent_path("/media/intro.xmv"), "/media");
        assert_eq!(parent_path("/media"), "/");
        assert_eq!(parent_path("/"), "/");
    }
}
