//! Shared backing resource for an XDVDFS image
//!
//! Every byte that leaves the image goes through [`ImageReader`]. The source has a
//! single seek cursor, so each positioned read holds the lock across exactly one
//! seek+read pair.

use std::fs::{File, Metadata};
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Logical sector size of XDVDFS media
pub const SECTOR_SIZE: u64 = 2048;

/// Anything the image can be read from
pub trait ImageSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ImageSource for T {}

/// Timestamps reported for every node of a mounted image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTimes {
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl ImageTimes {
    fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            atime: unix_time(metadata.atime(), metadata.atime_nsec()),
            mtime: unix_time(metadata.mtime(), metadata.mtime_nsec()),
            ctime: unix_time(metadata.ctime(), metadata.ctime_nsec()),
        }
    }
}

impl Default for ImageTimes {
    fn default() -> Self {
        Self {
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
        }
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = u32::try_from(nsecs).unwrap_or(0);
    match u64::try_from(secs) {
        Ok(secs) => UNIX_EPOCH + Duration::new(secs, nanos),
        Err(_) => UNIX_EPOCH,
    }
}

/// The single shared image handle
pub struct ImageReader {
    source: Mutex<Box<dyn ImageSource>>,
    /// Second handle on the same file, only used for `fstat`
    metadata_handle: Option<File>,
}

impl ImageReader {
    /// Open an image file read-only
    pub fn open(path: &Path) -> Result<Self, io::Error> {
        let file = File::open(path)?;
        let metadata_handle = file.try_clone()?;
        Ok(Self {
            source: Mutex::new(Box::new(BufReader::new(file))),
            metadata_handle: Some(metadata_handle),
        })
    }

    /// Wrap an arbitrary seekable source (in-memory images, tests)
    pub fn from_source<S: ImageSource + 'static>(source: S) -> Self {
        Self {
            source: Mutex::new(Box::new(source)),
            metadata_handle: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn ImageSource>> {
        // A panic mid-read leaves only the cursor position behind, and every
        // read seeks first.
        self.source.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read up to `buf.len()` bytes at `offset`.
    ///
    /// Stops early only at end of image; the returned count may be short.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, io::Error> {
        let mut source = self.lock();
        source.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Read exactly `length` bytes at `offset`, failing on a short read.
    ///
    /// The buffer grows with the data actually read, so a length taken from a
    /// corrupt record cannot force a huge allocation up front.
    pub fn read_bytes(&self, offset: u64, length: usize) -> Result<Vec<u8>, io::Error> {
        let mut buffer = Vec::new();
        {
            let mut source = self.lock();
            source.seek(SeekFrom::Start(offset))?;
            (&mut **source).take(length as u64).read_to_end(&mut buffer)?;
        }
        let read = buffer.len();
        if read != length {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "short read at byte {}: wanted {} bytes, got {}",
                    offset, length, read
                ),
            ));
        }
        Ok(buffer)
    }

    /// Read a single sector at the given LBA
    pub fn read_sector(&self, lba: u64) -> Result<Vec<u8>, io::Error> {
        self.read_bytes(lba * SECTOR_SIZE, SECTOR_SIZE as usize)
    }

    /// Timestamps of the backing file, queried now.
    ///
    /// Sources without a file behind them report the Unix epoch.
    pub fn times(&self) -> ImageTimes {
        match &self.metadata_handle {
            Some(file) => match file.metadata() {
                Ok(metadata) => ImageTimes::from_metadata(&metadata),
                Err(e) => {
                    log::warn!("fstat on image failed: {}", e);
                    ImageTimes::default()
                }
            },
            None => ImageTimes::default(),
        }
    }
}

impl std::fmt::Debug for ImageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageReader")
            .field("file_backed", &self.metadata_handle.is_some())
            .finish_non_exhaustive()
    }
}
