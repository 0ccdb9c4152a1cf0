//! xdvdfs-mount library
//!
//! Read-only access to Xbox DVD filesystem (XDVDFS) images and a FUSE binding
//! that mounts them.

pub mod cli;
pub mod config;
pub mod fuse;
pub mod logging;
pub mod tree;
pub mod xdvdfs;

pub use config::MountConfig;
pub use xdvdfs::{FilesystemError, FormatError, ImageReader, PathFilesystem, XdvdFilesystem};
