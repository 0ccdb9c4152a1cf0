//! Host-facing filesystem contract and its error types

use crate::tree::{Attributes, NodeKind};
use thiserror::Error;

/// Problems with the on-disk structure of an image
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("XDVD signature (MICROSOFT*XBOX*MEDIA) not found")]
    SignatureNotFound,

    #[error("Path exceeds {limit} bytes: {path}")]
    NameTooLong { path: String, limit: usize },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Malformed directory record at offset 0x{offset:X} in {directory}: {reason}")]
    MalformedRecord {
        directory: String,
        offset: usize,
        reason: &'static str,
    },

    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("Sector 0x{0:X} lies before the start of the image")]
    SectorOutOfRange(u32),
}

/// Errors returned by filesystem operations
#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Read-only filesystem: {0}")]
    ReadOnly(String),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FilesystemError {
    /// Operation applied to the wrong kind of node
    pub fn is_wrong_type(&self) -> bool {
        matches!(self, Self::IsDirectory(_) | Self::NotADirectory(_))
    }

    /// errno reported to the host
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::IsDirectory(_) => libc::EISDIR,
            Self::NotADirectory(_) => libc::ENOTDIR,
            Self::ReadOnly(_) => libc::EROFS,
            Self::Format(_) => libc::EIO,
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Access mode requested by an open call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenIntent {
    Read,
    Write,
}

impl OpenIntent {
    /// Classify `open(2)` flags; anything but `O_RDONLY` asks for write access
    pub fn from_flags(flags: i32) -> Self {
        if flags & libc::O_ACCMODE == libc::O_RDONLY {
            Self::Read
        } else {
            Self::Write
        }
    }
}

/// One name produced by `read_directory`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: NodeKind,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Path-addressed operations a host mount framework dispatches into.
///
/// Every path is absolute (`/` is the root). Implementations must tolerate
/// concurrent calls.
pub trait PathFilesystem: Send + Sync {
    /// Attributes of the node at `path`
    fn get_attributes(&self, path: &str) -> Result<Attributes, FilesystemError>;

    /// Validate an open; no handle state is kept
    fn open(&self, path: &str, intent: OpenIntent) -> Result<(), FilesystemError>;

    /// Read into `buf` starting at `offset`, returning the number of bytes filled
    fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, FilesystemError>;

    /// Validate that `path` is a directory
    fn open_directory(&self, path: &str) -> Result<(), FilesystemError>;

    /// `.`, `..` and every direct child of the directory at `path`
    fn read_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, FilesystemError>;

    /// Release everything held for the mount
    fn teardown(self)
    where
        Self: Sized,
    {
    }
}
