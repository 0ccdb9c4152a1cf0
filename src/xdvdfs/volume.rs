//! XDVDFS volume descriptor detection
//!
//! The volume descriptor is the first sector that starts with
//! `MICROSOFT*XBOX*MEDIA`. Sector numbers inside the filesystem are counted from
//! a point 32 sectors before that descriptor, which is why the base offset can be
//! negative for images that were trimmed in front of the descriptor.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::filesystem::FormatError;
use super::reader::{ImageReader, SECTOR_SIZE};

/// Signature at the start of the volume descriptor sector
pub const XDVD_SIGNATURE: &[u8; 20] = b"MICROSOFT*XBOX*MEDIA";

/// Distance in sectors between the filesystem origin and the volume descriptor
pub const DESCRIPTOR_SECTOR: u64 = 32;

const ROOT_SECTOR_OFFSET: usize = 0x14;
const ROOT_SIZE_OFFSET: usize = 0x18;
const TIMESTAMP_OFFSET: usize = 0x1C;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01
const FILETIME_UNIX_DIFF_SECS: u64 = 11_644_473_600;

/// Where the filesystem lives inside the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLocation {
    /// Byte offset of filesystem sector 0, relative to the image start
    pub base_offset: i64,
    /// Sector of the root directory table
    pub root_sector: u32,
    /// Size of the root directory table in bytes
    pub root_size: u32,
}

impl VolumeLocation {
    /// Absolute image offset of a filesystem sector, `None` if it falls before the image
    pub fn sector_offset(&self, sector: u32) -> Option<u64> {
        let offset = i128::from(self.base_offset) + i128::from(sector) * i128::from(SECTOR_SIZE);
        u64::try_from(offset).ok()
    }
}

/// Decoded volume descriptor sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    /// Image sector the signature was found in
    pub sector: u64,
    pub root_sector: u32,
    pub root_size: u32,
    /// Raw FILETIME stamp (100ns ticks since 1601)
    pub timestamp: [u8; 8],
}

impl VolumeDescriptor {
    /// Parse a volume descriptor from raw sector data
    ///
    /// Returns `None` when the sector does not carry the signature.
    pub fn parse(sector: &[u8], sector_index: u64) -> Option<Self> {
        if sector.len() < TIMESTAMP_OFFSET + 8 || !sector.starts_with(XDVD_SIGNATURE) {
            return None;
        }

        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&sector[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]);

        Some(Self {
            sector: sector_index,
            root_sector: read_u32_le(sector, ROOT_SECTOR_OFFSET),
            root_size: read_u32_le(sector, ROOT_SIZE_OFFSET),
            timestamp,
        })
    }

    /// Filesystem location implied by this descriptor
    pub fn location(&self) -> VolumeLocation {
        let descriptor_offset = i128::from(self.sector) * i128::from(SECTOR_SIZE);
        let base = descriptor_offset - i128::from(DESCRIPTOR_SECTOR * SECTOR_SIZE);
        VolumeLocation {
            base_offset: i64::try_from(base).unwrap_or(i64::MAX),
            root_sector: self.root_sector,
            root_size: self.root_size,
        }
    }

    /// Mastering time, if the stamp is a plausible FILETIME
    pub fn created(&self) -> Option<SystemTime> {
        let ticks = u64::from_le_bytes(self.timestamp);
        let secs = (ticks / 10_000_000).checked_sub(FILETIME_UNIX_DIFF_SECS)?;
        let nanos = (ticks % 10_000_000) * 100;
        UNIX_EPOCH.checked_add(Duration::new(secs, nanos as u32))
    }

    fn timestamp_hex(&self) -> String {
        self.timestamp
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Scan the image sector by sector for the volume descriptor
pub fn locate(reader: &ImageReader) -> Result<(VolumeLocation, VolumeDescriptor), FormatError> {
    let mut lba = 0u64;
    loop {
        let sector = match reader.read_sector(lba) {
            Ok(sector) => sector,
            Err(e) => {
                log::debug!("signature scan stopped at sector {}: {}", lba, e);
                log::error!(
                    "XDVD signature ({}) not found",
                    String::from_utf8_lossy(XDVD_SIGNATURE)
                );
                return Err(FormatError::SignatureNotFound);
            }
        };

        if let Some(descriptor) = VolumeDescriptor::parse(&sector, lba) {
            let location = descriptor.location();
            log::info!(
                "root @ sector 0x{:X}, 0x{:X} bytes; time = {}",
                descriptor.root_sector,
                descriptor.root_size,
                descriptor.timestamp_hex()
            );
            log::debug!(
                "volume descriptor at sector {}, filesystem base offset {}",
                lba,
                location.base_offset
            );
            return Ok((location, descriptor));
        }

        lba += 1;
    }
}
