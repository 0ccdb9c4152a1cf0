//! XDVDFS directory table parsing
//!
//! Each directory is stored as one contiguous table of records forming a
//! binary search tree. A record is a 14-byte header followed by the name:
//!
//! ```text
//! 0x00  u16  left subtree offset / 4  (0 = none)
//! 0x02  u16  right subtree offset / 4 (0 = none)
//! 0x04  u32  first sector of the file or directory table
//! 0x08  u32  size in bytes
//! 0x0C  u8   attributes (0x10 = directory)
//! 0x0D  u8   name length
//! 0x0E  ..   name bytes, not terminated
//! ```
//!
//! All integers are little-endian. Records are visited left, self, right.

use std::collections::HashSet;
use std::io;

use thiserror::Error;

use super::filesystem::FormatError;
use super::reader::ImageReader;
use super::volume::VolumeLocation;
use crate::tree::PathTree;

/// Size of the fixed part of a directory record
pub const RECORD_HEADER_SIZE: usize = 14;

/// Attribute bit marking a subdirectory
pub const ATTRIBUTE_DIRECTORY: u8 = 0x10;

/// Default limit for accumulated path length
pub const DEFAULT_MAX_PATH_LEN: usize = 1024;

/// Fixed part of one directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryRecord {
    /// Byte offset of the left subtree in the table
    pub left: usize,
    /// Byte offset of the right subtree in the table
    pub right: usize,
    pub data_sector: u32,
    pub data_size: u32,
    pub attributes: u8,
    pub name_length: u8,
}

impl DirectoryRecord {
    /// Decode the header of the record at `offset`.
    ///
    /// Returns `None` if the table ends before a full header, which is how an
    /// absent subtree (or the padding after the last record) is recognised.
    pub fn parse(table: &[u8], offset: usize) -> Option<Self> {
        let header = table.get(offset..offset.checked_add(RECORD_HEADER_SIZE)?)?;
        Some(Self {
            left: usize::from(u16::from_le_bytes([header[0], header[1]])) * 4,
            right: usize::from(u16::from_le_bytes([header[2], header[3]])) * 4,
            data_sector: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
            data_size: u32::from_le_bytes([header[8], header[9], header[10], header[11]]),
            attributes: header[12],
            name_length: header[13],
        })
    }

    /// Check if this record describes a subdirectory
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTRIBUTE_DIRECTORY != 0
    }

    /// Raw name bytes of the record at `offset`
    pub fn name_bytes<'a>(&self, table: &'a [u8], offset: usize) -> Option<&'a [u8]> {
        let start = offset + RECORD_HEADER_SIZE;
        table.get(start..start + usize::from(self.name_length))
    }
}

/// Why part of the image was left out of the tree
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Format(#[from] FormatError),
}

/// A directory table or entry dropped while building the tree
#[derive(Debug)]
pub struct SkippedEntry {
    /// Path of the directory or entry, relative to the root
    pub path: String,
    pub reason: SkipReason,
}

/// Result of walking a whole volume
#[derive(Debug)]
pub struct TreeBuild {
    pub tree: PathTree,
    pub skipped: Vec<SkippedEntry>,
}

/// Walk the whole volume starting at its root directory
pub fn build_tree(reader: &ImageReader, location: VolumeLocation, max_path_len: usize) -> TreeBuild {
    let mut tree = PathTree::new();
    let mut parser = DirectoryTreeParser::new(reader, location, max_path_len);
    parser.parse_directory(location.root_sector, location.root_size, "", &mut tree);
    TreeBuild {
        tree,
        skipped: parser.into_skipped(),
    }
}

/// Recursive decoder for directory tables
pub struct DirectoryTreeParser<'a> {
    reader: &'a ImageReader,
    location: VolumeLocation,
    max_path_len: usize,
    skipped: Vec<SkippedEntry>,
    /// Table sectors from the root down to the directory being walked
    ancestors: Vec<u32>,
    /// Every table sector loaded so far
    loaded: HashSet<u32>,
}

impl<'a> DirectoryTreeParser<'a> {
    pub fn new(reader: &'a ImageReader, location: VolumeLocation, max_path_len: usize) -> Self {
        Self {
            reader,
            location,
            max_path_len,
            skipped: Vec::new(),
            ancestors: Vec::new(),
            loaded: HashSet::new(),
        }
    }

    /// Everything dropped so far
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    pub fn into_skipped(self) -> Vec<SkippedEntry> {
        self.skipped
    }

    /// Load the directory table at `sector` and insert every file below it.
    ///
    /// `path_prefix` is empty for the root and otherwise ends with `/`. A table
    /// that cannot be read drops this subtree only; entries inserted earlier stay.
    pub fn parse_directory(&mut self, sector: u32, size: u32, path_prefix: &str, tree: &mut PathTree) {
        log::info!(
            "loading directory {} @ sector 0x{:X}, 0x{:X} bytes",
            if path_prefix.is_empty() { "(root)" } else { path_prefix },
            sector,
            size
        );

        if size == 0 {
            return;
        }

        let Some(offset) = self.location.sector_offset(sector) else {
            self.skip(path_prefix, FormatError::SectorOutOfRange(sector).into());
            return;
        };

        let table = match self.reader.read_bytes(offset, size as usize) {
            Ok(table) => table,
            Err(e) => {
                self.skip(path_prefix, e.into());
                return;
            }
        };

        self.loaded.insert(sector);
        self.ancestors.push(sector);
        self.walk_table(&table, path_prefix, tree);
        self.ancestors.pop();
    }

    /// In-order walk of one table with an explicit stack
    fn walk_table(&mut self, table: &[u8], path_prefix: &str, tree: &mut PathTree) {
        let mut visited = HashSet::new();
        let mut pending: Vec<(usize, DirectoryRecord)> = Vec::new();
        let mut next = Some(0usize);

        loop {
            while let Some(offset) = next.take() {
                // A header needs 14 bytes; anything shorter is an absent subtree.
                let Some(record) = DirectoryRecord::parse(table, offset) else {
                    break;
                };
                if !visited.insert(offset) {
                    self.skip_malformed(path_prefix, offset, "subtree pointer loops back");
                    break;
                }
                pending.push((offset, record));
                if record.left != 0 {
                    next = Some(record.left);
                }
            }

            let Some((offset, record)) = pending.pop() else {
                break;
            };
            self.visit_record(table, offset, &record, path_prefix, tree);
            if record.right != 0 {
                next = Some(record.right);
            }
        }
    }

    fn visit_record(
        &mut self,
        table: &[u8],
        offset: usize,
        record: &DirectoryRecord,
        path_prefix: &str,
        tree: &mut PathTree,
    ) {
        let name = match record_name(table, offset, record) {
            Ok(name) => name,
            Err(reason) => {
                self.skip_malformed(path_prefix, offset, reason);
                return;
            }
        };

        let mut path = String::with_capacity(path_prefix.len() + name.len() + 1);
        path.push_str(path_prefix);
        path.push_str(&name);

        if record.is_directory() {
            if record.data_size != 0 {
                if self.ancestors.contains(&record.data_sector) {
                    self.skip_malformed(path_prefix, offset, "directory table loops back to an ancestor");
                    return;
                }
                if self.loaded.contains(&record.data_sector) {
                    self.skip_malformed(path_prefix, offset, "directory table already belongs to another directory");
                    return;
                }
            }
            path.push('/');
            if let Err(e) = self.check_length(&path) {
                self.skip(&path, e.into());
                return;
            }
            self.parse_directory(record.data_sector, record.data_size, &path, tree);
            return;
        }

        if let Err(e) = self.check_length(&path) {
            self.skip(&path, e.into());
            return;
        }

        let Some(data_offset) = self.location.sector_offset(record.data_sector) else {
            self.skip(&path, FormatError::SectorOutOfRange(record.data_sector).into());
            return;
        };

        log::debug!(
            "inserting {}: sector 0x{:X}, 0x{:X} bytes, attribute byte = 0x{:X}",
            path,
            record.data_sector,
            record.data_size,
            record.attributes
        );

        if let Err(e) = tree.insert(&path, data_offset, u64::from(record.data_size)) {
            self.skip(&path, e.into());
        }
    }

    fn check_length(&self, path: &str) -> Result<(), FormatError> {
        if path.len() > self.max_path_len {
            return Err(FormatError::NameTooLong {
                path: path.to_owned(),
                limit: self.max_path_len,
            });
        }
        Ok(())
    }

    fn skip_malformed(&mut self, path_prefix: &str, offset: usize, reason: &'static str) {
        let error = FormatError::MalformedRecord {
            directory: display_prefix(path_prefix).to_owned(),
            offset,
            reason,
        };
        self.skip(path_prefix, error.into());
    }

    fn skip(&mut self, path: &str, reason: SkipReason) {
        log::warn!("skipping {}: {}", display_prefix(path), reason);
        self.skipped.push(SkippedEntry {
            path: path.to_owned(),
            reason,
        });
    }
}

fn display_prefix(path: &str) -> &str {
    if path.is_empty() {
        "(root)"
    } else {
        path
    }
}

/// Decode and validate the name of a record
fn record_name(table: &[u8], offset: usize, record: &DirectoryRecord) -> Result<String, &'static str> {
    let bytes = record
        .name_bytes(table, offset)
        .ok_or("name runs past the end of the table")?;
    if bytes.is_empty() {
        return Err("empty name");
    }
    if bytes.contains(&b'/') || bytes.contains(&0) {
        return Err("name contains '/' or NUL");
    }
    if bytes == b"." || bytes == b".." {
        return Err("name is a dot entry");
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
