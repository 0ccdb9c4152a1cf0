//! Bounded file data access

use super::filesystem::{FilesystemError, OpenIntent};
use super::reader::ImageReader;
use crate::tree::PathTree;

/// Reads file contents out of the shared image handle
#[derive(Debug)]
pub struct FileAccessor {
    reader: ImageReader,
}

impl FileAccessor {
    pub fn new(reader: ImageReader) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &ImageReader {
        &self.reader
    }

    /// Check that `path` exists and is not being opened for writing
    pub fn open(&self, tree: &PathTree, path: &str, intent: OpenIntent) -> Result<(), FilesystemError> {
        if tree.find_entry(path).is_none() {
            return Err(FilesystemError::NotFound(path.to_owned()));
        }
        if intent == OpenIntent::Write {
            return Err(FilesystemError::ReadOnly(path.to_owned()));
        }
        Ok(())
    }

    /// Read file data at `offset` into `buf`, clipped to the end of the file.
    ///
    /// Reading at or past the end returns 0. A short read from the image is
    /// returned as is.
    pub fn read(
        &self,
        tree: &PathTree,
        path: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, FilesystemError> {
        let node = tree
            .find_entry(path)
            .ok_or_else(|| FilesystemError::NotFound(path.to_owned()))?;
        if node.is_directory() {
            return Err(FilesystemError::IsDirectory(path.to_owned()));
        }

        if offset >= node.size() {
            return Ok(0);
        }
        let remaining = node.size() - offset;
        let length = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));

        let read = self
            .reader
            .read_at(node.data_offset() + offset, &mut buf[..length])?;
        if read < length {
            log::debug!(
                "short read on {}: {} of {} bytes at offset {}",
                path,
                read,
                length,
                offset
            );
        }
        Ok(read)
    }
}
