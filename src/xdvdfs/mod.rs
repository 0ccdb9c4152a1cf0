//! XDVDFS image access
//!
//! Xbox game discs store their data in XDVDFS, a filesystem where each
//! directory is one table of records laid out as a binary search tree.
//!
//! [`XdvdFilesystem`] is the mounted view: it scans the image for the volume
//! descriptor, walks every directory table into a [`PathTree`] once and then
//! serves path-addressed requests through [`PathFilesystem`].

pub mod accessor;
pub mod directory;
pub mod filesystem;
pub mod reader;
pub mod volume;

pub use accessor::FileAccessor;
pub use directory::{
    build_tree, DirectoryRecord, DirectoryTreeParser, SkipReason, SkippedEntry, TreeBuild,
    DEFAULT_MAX_PATH_LEN,
};
pub use filesystem::{DirectoryEntry, FilesystemError, FormatError, OpenIntent, PathFilesystem};
pub use reader::{ImageReader, ImageSource, ImageTimes, SECTOR_SIZE};
pub use volume::{locate, VolumeDescriptor, VolumeLocation, XDVD_SIGNATURE};

use crate::config::MountConfig;
use crate::tree::{Attributes, NodeKind, Ownership, PathTree};

/// A parsed image ready to be mounted
#[derive(Debug)]
pub struct XdvdFilesystem {
    tree: PathTree,
    accessor: FileAccessor,
    location: VolumeLocation,
    descriptor: VolumeDescriptor,
    skipped: Vec<SkippedEntry>,
    owner: Ownership,
}

impl XdvdFilesystem {
    /// Scan `reader` for the volume descriptor and build the path tree.
    ///
    /// Only a missing signature is fatal. Directory tables or entries that
    /// cannot be used are logged and listed in [`XdvdFilesystem::skipped`].
    pub fn initialize(reader: ImageReader, config: &MountConfig) -> Result<Self, FormatError> {
        let (location, descriptor) = locate(&reader)?;
        if let Some(created) = descriptor.created() {
            log::debug!("image mastered {:?}", created);
        }

        let TreeBuild { tree, skipped } = build_tree(&reader, location, config.max_path_len);

        log::info!(
            "Loaded {} entries ({} skipped)",
            tree.node_count() - 1,
            skipped.len()
        );

        Ok(Self {
            tree,
            accessor: FileAccessor::new(reader),
            location,
            descriptor,
            skipped,
            owner: Ownership::current(),
        })
    }

    pub fn tree(&self) -> &PathTree {
        &self.tree
    }

    pub fn location(&self) -> VolumeLocation {
        self.location
    }

    pub fn descriptor(&self) -> &VolumeDescriptor {
        &self.descriptor
    }

    /// Everything left out of the tree during initialization
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Report a different owner for every node
    pub fn with_owner(mut self, owner: Ownership) -> Self {
        self.owner = owner;
        self
    }
}

impl PathFilesystem for XdvdFilesystem {
    fn get_attributes(&self, path: &str) -> Result<Attributes, FilesystemError> {
        let node = self
            .tree
            .find_entry(path)
            .ok_or_else(|| FilesystemError::NotFound(path.to_owned()))?;
        Ok(node.attributes(self.owner, self.accessor.reader().times()))
    }

    fn open(&self, path: &str, intent: OpenIntent) -> Result<(), FilesystemError> {
        self.accessor.open(&self.tree, path, intent)
    }

    fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, FilesystemError> {
        self.accessor.read(&self.tree, path, offset, buf)
    }

    fn open_directory(&self, path: &str) -> Result<(), FilesystemError> {
        match self.tree.find_entry(path) {
            None => Err(FilesystemError::NotFound(path.to_owned())),
            Some(node) if !node.is_directory() => {
                Err(FilesystemError::NotADirectory(path.to_owned()))
            }
            Some(_) => Ok(()),
        }
    }

    fn read_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, FilesystemError> {
        let node = self
            .tree
            .find_entry(path)
            .ok_or_else(|| FilesystemError::NotFound(path.to_owned()))?;
        if !node.is_directory() {
            return Err(FilesystemError::NotADirectory(path.to_owned()));
        }

        let mut entries = Vec::with_capacity(node.children().count() + 2);
        entries.push(DirectoryEntry::new(".", NodeKind::Directory));
        entries.push(DirectoryEntry::new("..", NodeKind::Directory));
        entries.extend(
            node.children()
                .map(|child| DirectoryEntry::new(child.name(), child.kind())),
        );
        Ok(entries)
    }

    fn teardown(self) {
        log::info!("Unmounting, releasing {} entries", self.tree.node_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ROOT_SECTOR: u32 = 33;
    const SUB_SECTOR: u32 = 34;
    const DATA_SECTOR: u32 = 35;
    const ATTR_DIR: u8 = directory::ATTRIBUTE_DIRECTORY;

    fn record(left: u16, right: u16, sector: u32, size: u32, attributes: u8, name: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&left.to_le_bytes());
        bytes.extend_from_slice(&right.to_le_bytes());
        bytes.extend_from_slice(&sector.to_le_bytes());
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.push(attributes);
        bytes.push(name.len() as u8);
        bytes.extend_from_slice(name.as_bytes());
        bytes
    }

    fn put(image: &mut [u8], sector: u32, bytes: &[u8]) {
        let start = sector as usize * SECTOR_SIZE as usize;
        image[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// /readme.txt (11 bytes) and /sub/data.bin (5000 bytes)
    fn image() -> Vec<u8> {
        let mut image = vec![0u8; 40 * SECTOR_SIZE as usize];
        let mut descriptor = XDVD_SIGNATURE.to_vec();
        descriptor.extend_from_slice(&ROOT_SECTOR.to_le_bytes());
        descriptor.extend_from_slice(&64u32.to_le_bytes());
        put(&mut image, 32, &descriptor);

        // "readme.txt" at 0, right subtree "sub" at 0x1C
        let mut root = record(0, 0x1C / 4, DATA_SECTOR, 11, 0x20, "readme.txt");
        root.resize(0x1C, 0xFF);
        root.extend(record(0, 0, SUB_SECTOR, 64, ATTR_DIR, "sub"));
        root.resize(64, 0xFF);
        put(&mut image, ROOT_SECTOR, &root);

        let mut sub = record(0, 0, DATA_SECTOR + 1, 5000, 0x20, "data.bin");
        sub.resize(64, 0xFF);
        put(&mut image, SUB_SECTOR, &sub);

        put(&mut image, DATA_SECTOR, b"hello xbox!");
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 200) as u8).collect();
        put(&mut image, DATA_SECTOR + 1, &data);
        image
    }

    fn mounted() -> XdvdFilesystem {
        let reader = ImageReader::from_source(Cursor::new(image()));
        XdvdFilesystem::initialize(reader, &MountConfig::default())
            .unwrap()
            .with_owner(Ownership { uid: 0, gid: 0 })
    }

    #[test]
    fn test_initialize_builds_tree() {
        let fs = mounted();
        assert!(fs.skipped().is_empty());
        assert_eq!(fs.location().base_offset, 0);
        assert_eq!(fs.location().root_sector, ROOT_SECTOR);
        assert_eq!(fs.descriptor().sector, 32);
        assert_eq!(fs.tree().node_count(), 4);
    }

    #[test]
    fn test_initialize_without_signature_fails() {
        let reader = ImageReader::from_source(Cursor::new(vec![0u8; 4 * SECTOR_SIZE as usize]));
        let err = XdvdFilesystem::initialize(reader, &MountConfig::default()).unwrap_err();
        assert_eq!(err, FormatError::SignatureNotFound);
    }

    #[test]
    fn test_get_attributes() {
        let fs = mounted();
        let root = fs.get_attributes("/").unwrap();
        assert_eq!(root.kind, NodeKind::Directory);
        assert_eq!(root.nlink, 3);

        let file = fs.get_attributes("/sub/data.bin").unwrap();
        assert_eq!(file.kind, NodeKind::File);
        assert_eq!(file.size, 5000);
        assert_eq!(file.perm, 0o444);

        assert!(matches!(
            fs.get_attributes("/nope"),
            Err(FilesystemError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_through_filesystem() {
        let fs = mounted();
        let mut buf = [0u8; 32];
        let n = fs.read("/readme.txt", &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hello xbox!");

        let mut buf = [0u8; 100];
        let n = fs.read("/sub/data.bin", &mut buf, 4950).unwrap();
        assert_eq!(n, 50);
        assert_eq!(buf[0], (4950 % 200) as u8);
    }

    #[test]
    fn test_read_directory_lists_dots_first() {
        let fs = mounted();
        let names: Vec<String> = fs
            .read_directory("/")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, [".", "..", "readme.txt", "sub"]);

        let sub = fs.read_directory("/sub").unwrap();
        assert_eq!(sub.len(), 3);
        assert_eq!(sub[2], DirectoryEntry::new("data.bin", NodeKind::File));
    }

    #[test]
    fn test_directory_operations_on_files() {
        let fs = mounted();
        assert!(fs.open_directory("/sub").is_ok());
        assert!(matches!(
            fs.open_directory("/readme.txt"),
            Err(FilesystemError::NotADirectory(_))
        ));
        assert!(matches!(
            fs.read_directory("/readme.txt"),
            Err(FilesystemError::NotADirectory(_))
        ));
        assert!(matches!(
            fs.open_directory("/missing"),
            Err(FilesystemError::NotFound(_))
        ));
    }

    #[test]
    fn test_open_is_read_only() {
        let fs = mounted();
        assert!(fs.open("/readme.txt", OpenIntent::Read).is_ok());
        assert_eq!(
            fs.open("/readme.txt", OpenIntent::Write).unwrap_err().errno(),
            libc::EROFS
        );
    }

    #[test]
    fn test_path_limit_from_config() {
        let reader = ImageReader::from_source(Cursor::new(image()));
        let config = MountConfig {
            max_path_len: 8,
            ..MountConfig::default()
        };
        let fs = XdvdFilesystem::initialize(reader, &config).unwrap();
        // "readme.txt" and "sub/data.bin" both exceed 8 bytes
        assert_eq!(fs.skipped().len(), 2);
        assert_eq!(fs.tree().node_count(), 1);
    }
}
