//! FUSE binding for path-addressed filesystems
//!
//! The kernel talks in inode numbers while [`PathFilesystem`] is addressed by
//! absolute paths. [`XdvdFuse`] keeps the mapping between the two and turns
//! every [`FilesystemError`] into an errno reply.

pub mod inodes;
pub mod options;

pub use inodes::{InodeTable, ROOT_INODE};
pub use options::build_mount_options;

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::path::Path;
use std::time::Duration;

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEntry, ReplyOpen, Request,
};
use thiserror::Error;

use crate::config::MountConfig;
use crate::tree::{Attributes, NodeKind};
use crate::xdvdfs::{FilesystemError, OpenIntent, PathFilesystem, SECTOR_SIZE};
use inodes::{child_path, parent_path};

#[derive(Debug, Error)]
pub enum FuseError {
    #[error("Invalid mountpoint: {0}")]
    InvalidMountpoint(String),

    #[error("Mount IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failed operation, logged once before it is answered with an errno
struct FailedOp<'a> {
    error: &'a FilesystemError,
    operation: &'static str,
    ino: u64,
}

impl FailedOp<'_> {
    fn log_and_errno(&self) -> c_int {
        let errno = self.error.errno();
        // Misses are routine for lookups.
        if errno == libc::ENOENT {
            log::debug!("{} on inode {}: {}", self.operation, self.ino, self.error);
        } else {
            log::warn!("{} on inode {} failed: {}", self.operation, self.ino, self.error);
        }
        errno
    }
}

/// One listed directory entry with its inode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub ino: u64,
    pub kind: FileType,
    pub name: String,
}

/// Adapter from [`PathFilesystem`] to [`fuser::Filesystem`]
pub struct XdvdFuse<F: PathFilesystem> {
    /// `None` once the kernel has torn the mount down
    fs: Option<F>,
    inodes: InodeTable,
    ttl: Duration,
}

impl<F: PathFilesystem> XdvdFuse<F> {
    pub fn new(fs: F, ttl: Duration) -> Self {
        Self {
            fs: Some(fs),
            inodes: InodeTable::new(),
            ttl,
        }
    }

    fn fs(&self) -> Result<&F, FilesystemError> {
        self.fs.as_ref().ok_or_else(|| {
            FilesystemError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "filesystem already torn down",
            ))
        })
    }

    fn path_of(&self, ino: u64) -> Result<String, FilesystemError> {
        self.inodes
            .path(ino)
            .map(str::to_owned)
            .ok_or_else(|| FilesystemError::NotFound(format!("inode {}", ino)))
    }

    /// Attributes of a known inode
    pub fn attr_of(&self, ino: u64) -> Result<FileAttr, FilesystemError> {
        let path = self.path_of(ino)?;
        let attributes = self.fs()?.get_attributes(&path)?;
        Ok(to_file_attr(ino, &attributes))
    }

    /// Resolve `name` inside directory `parent`, assigning an inode on success
    pub fn lookup_child(&mut self, parent: u64, name: &OsStr) -> Result<FileAttr, FilesystemError> {
        let parent_path = self.path_of(parent)?;
        let name = name
            .to_str()
            .ok_or_else(|| FilesystemError::NotFound(name.to_string_lossy().into_owned()))?;
        let path = child_path(&parent_path, name);
        let attributes = self.fs()?.get_attributes(&path)?;
        let ino = self.inodes.assign(&path);
        Ok(to_file_attr(ino, &attributes))
    }

    pub fn open_inode(&self, ino: u64, flags: i32) -> Result<(), FilesystemError> {
        let path = self.path_of(ino)?;
        self.fs()?.open(&path, OpenIntent::from_flags(flags))
    }

    pub fn read_inode(&self, ino: u64, offset: u64, size: u32) -> Result<Vec<u8>, FilesystemError> {
        let path = self.path_of(ino)?;
        let mut buf = vec![0u8; size as usize];
        let read = self.fs()?.read(&path, &mut buf, offset)?;
        buf.truncate(read);
        Ok(buf)
    }

    pub fn open_directory_inode(&self, ino: u64) -> Result<(), FilesystemError> {
        let path = self.path_of(ino)?;
        self.fs()?.open_directory(&path)
    }

    /// Full listing of a directory with inodes assigned to every entry
    pub fn list_directory(&mut self, ino: u64) -> Result<Vec<ListedEntry>, FilesystemError> {
        let path = self.path_of(ino)?;
        let entries = self.fs()?.read_directory(&path)?;

        let mut listed = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry_ino = match entry.name.as_str() {
                "." => ino,
                ".." => self.inodes.assign(parent_path(&path)),
                name => self.inodes.assign(&child_path(&path, name)),
            };
            listed.push(ListedEntry {
                ino: entry_ino,
                kind: to_file_type(entry.kind),
                name: entry.name,
            });
        }
        Ok(listed)
    }
}

fn to_file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

/// Convert node attributes to the kernel's view
pub fn to_file_attr(ino: u64, attributes: &Attributes) -> FileAttr {
    FileAttr {
        ino,
        size: attributes.size,
        blocks: attributes.size.div_ceil(512),
        atime: attributes.atime,
        mtime: attributes.mtime,
        ctime: attributes.ctime,
        crtime: attributes.ctime,
        kind: to_file_type(attributes.kind),
        perm: attributes.perm,
        nlink: attributes.nlink,
        uid: attributes.uid,
        gid: attributes.gid,
        rdev: 0,
        blksize: SECTOR_SIZE as u32,
        flags: 0,
    }
}

impl<F: PathFilesystem> Filesystem for XdvdFuse<F> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        log::info!("Mounted");
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(fs) = self.fs.take() {
            log::debug!("releasing {} inodes", self.inodes.len());
            fs.teardown();
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_child(parent, name) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(error) => {
                let op = FailedOp { error: &error, operation: "lookup", ino: parent };
                reply.error(op.log_and_errno());
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr_of(ino) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(error) => {
                let op = FailedOp { error: &error, operation: "getattr", ino };
                reply.error(op.log_and_errno());
            }
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_inode(ino, flags) {
            Ok(()) => reply.opened(0, 0),
            Err(error) => {
                let op = FailedOp { error: &error, operation: "open", ino };
                reply.error(op.log_and_errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.read_inode(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(error) => {
                let op = FailedOp { error: &error, operation: "read", ino };
                reply.error(op.log_and_errno());
            }
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_directory_inode(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(error) => {
                let op = FailedOp { error: &error, operation: "opendir", ino };
                reply.error(op.log_and_errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.list_directory(ino) {
            Ok(entries) => entries,
            Err(error) => {
                let op = FailedOp { error: &error, operation: "readdir", ino };
                reply.error(op.log_and_errno());
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            // The offset handed back is where the next call resumes.
            if reply.add(entry.ino, i as i64 + 1, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }
}

/// Mount `fs` read-only at `mountpoint` and serve it until unmounted
pub fn mount<F: PathFilesystem + 'static>(
    fs: F,
    mountpoint: &Path,
    config: &MountConfig,
    extra_options: &[String],
) -> Result<(), FuseError> {
    if mountpoint.as_os_str().is_empty() {
        return Err(FuseError::InvalidMountpoint(
            "mountpoint cannot be empty".to_owned(),
        ));
    }
    if !mountpoint.is_dir() {
        return Err(FuseError::InvalidMountpoint(format!(
            "{} is not a directory",
            mountpoint.display()
        )));
    }

    let options = build_mount_options(config, extra_options);
    log::debug!("mount options: {:?}", options);
    fuser::mount2(XdvdFuse::new(fs, config.attr_ttl()), mountpoint, &options)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Ownership, PathTree};
    use crate::xdvdfs::{DirectoryEntry, ImageTimes};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Tree-backed filesystem whose file contents are all `b'x'`
    struct TreeFs {
        tree: PathTree,
        torn_down: Arc<AtomicBool>,
    }

    impl PathFilesystem for TreeFs {
        fn get_attributes(&self, path: &str) -> Result<Attributes, FilesystemError> {
            self.tree
                .find_entry(path)
                .map(|n| n.attributes(Ownership { uid: 1, gid: 2 }, ImageTimes::default()))
                .ok_or_else(|| FilesystemError::NotFound(path.to_owned()))
        }

        fn open(&self, path: &str, intent: OpenIntent) -> Result<(), FilesystemError> {
            self.get_attributes(path)?;
            match intent {
                OpenIntent::Read => Ok(()),
                OpenIntent::Write => Err(FilesystemError::ReadOnly(path.to_owned())),
            }
        }

        fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, FilesystemError> {
            let attrs = self.get_attributes(path)?;
            if attrs.kind == NodeKind::Directory {
                return Err(FilesystemError::IsDirectory(path.to_owned()));
            }
            let n = attrs.size.saturating_sub(offset).min(buf.len() as u64) as usize;
            buf[..n].fill(b'x');
            Ok(n)
        }

        fn open_directory(&self, path: &str) -> Result<(), FilesystemError> {
            match self.get_attributes(path)?.kind {
                NodeKind::Directory => Ok(()),
                NodeKind::File => Err(FilesystemError::NotADirectory(path.to_owned())),
            }
        }

        fn read_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, FilesystemError> {
            self.open_directory(path)?;
            let node = self
                .tree
                .find_entry(path)
                .ok_or_else(|| FilesystemError::NotFound(path.to_owned()))?;
            let mut entries = vec![
                DirectoryEntry::new(".", NodeKind::Directory),
                DirectoryEntry::new("..", NodeKind::Directory),
            ];
            entries.extend(node.children().map(|c| DirectoryEntry::new(c.name(), c.kind())));
            Ok(entries)
        }

        fn teardown(self) {
            self.torn_down.store(true, Ordering::SeqCst);
        }
    }

    fn fuse() -> (XdvdFuse<TreeFs>, Arc<AtomicBool>) {
        let mut tree = PathTree::new();
        tree.insert("default.xbe", 0, 1000).unwrap();
        tree.insert("media/intro.xmv", 0, 10).unwrap();
        let torn_down = Arc::new(AtomicBool::new(false));
        let fs = TreeFs {
            tree,
            torn_down: Arc::clone(&torn_down),
        };
        (XdvdFuse::new(fs, Duration::from_secs(1)), torn_down)
    }

    #[test]
    fn test_root_attributes() {
        let (fuse, _) = fuse();
        let attr = fuse.attr_of(ROOT_INODE).unwrap();
        assert_eq!(attr.ino, ROOT_INODE);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o555);
        assert_eq!(attr.nlink, 3);
        assert_eq!(attr.uid, 1);
        assert_eq!(attr.gid, 2);
    }

    #[test]
    fn test_lookup_assigns_stable_inodes() {
        let (mut fuse, _) = fuse();
        let media = fuse.lookup_child(ROOT_INODE, OsStr::new("media")).unwrap();
        let intro = fuse.lookup_child(media.ino, OsStr::new("intro.xmv")).unwrap();
        assert_eq!(intro.kind, FileType::RegularFile);
        assert_eq!(intro.size, 10);
        assert_eq!(intro.blocks, 1);
        assert_eq!(intro.blksize, 2048);

        let again = fuse.lookup_child(media.ino, OsStr::new("intro.xmv")).unwrap();
        assert_eq!(again.ino, intro.ino);
        assert_eq!(fuse.attr_of(intro.ino).unwrap(), intro);
    }

    #[test]
    fn test_lookup_missing_is_enoent() {
        let (mut fuse, _) = fuse();
        let err = fuse.lookup_child(ROOT_INODE, OsStr::new("nope")).unwrap_err();
        assert_eq!(err.errno(), libc::ENOENT);
        assert_eq!(fuse.attr_of(999).unwrap_err().errno(), libc::ENOENT);
    }

    #[test]
    fn test_listing_matches_lookup() {
        let (mut fuse, _) = fuse();
        let listing = fuse.list_directory(ROOT_INODE).unwrap();
        let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, [".", "..", "default.xbe", "media"]);
        assert_eq!(listing[0].ino, ROOT_INODE);
        assert_eq!(listing[1].ino, ROOT_INODE);

        let media = fuse.lookup_child(ROOT_INODE, OsStr::new("media")).unwrap();
        assert_eq!(listing[3].ino, media.ino);
        assert_eq!(listing[3].kind, FileType::Directory);

        let inner = fuse.list_directory(media.ino).unwrap();
        assert_eq!(inner[0].ino, media.ino);
        assert_eq!(inner[1].ino, ROOT_INODE);
    }

    #[test]
    fn test_wrong_type_errnos() {
        let (mut fuse, _) = fuse();
        let xbe = fuse.lookup_child(ROOT_INODE, OsStr::new("default.xbe")).unwrap();
        assert_eq!(fuse.list_directory(xbe.ino).unwrap_err().errno(), libc::ENOTDIR);
        assert_eq!(
            fuse.open_directory_inode(xbe.ino).unwrap_err().errno(),
            libc::ENOTDIR
        );
        assert_eq!(
            fuse.read_inode(ROOT_INODE, 0, 16).unwrap_err().errno(),
            libc::EISDIR
        );
    }

    #[test]
    fn test_open_and_read() {
        let (mut fuse, _) = fuse();
        let xbe = fuse.lookup_child(ROOT_INODE, OsStr::new("default.xbe")).unwrap();
        assert!(fuse.open_inode(xbe.ino, libc::O_RDONLY).is_ok());
        assert_eq!(
            fuse.open_inode(xbe.ino, libc::O_RDWR).unwrap_err().errno(),
            libc::EROFS
        );
        assert_eq!(fuse.read_inode(xbe.ino, 990, 64).unwrap(), vec![b'x'; 10]);
        assert!(fuse.read_inode(xbe.ino, 1000, 64).unwrap().is_empty());
    }

    #[test]
    fn test_destroy_tears_down_once() {
        let (mut fuse, torn_down) = fuse();
        fuse.destroy();
        assert!(torn_down.load(Ordering::SeqCst));
        assert_eq!(fuse.attr_of(ROOT_INODE).unwrap_err().errno(), libc::EIO);
        fuse.destroy();
    }

    #[test]
    fn test_mount_rejects_bad_mountpoint() {
        let (fuse, _) = fuse();
        let fs = fuse.fs.unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            mount(fs, file.path(), &MountConfig::default(), &[]),
            Err(FuseError::InvalidMountpoint(_))
        ));
    }
}
