//! xdvdfs-mount
//!
//! Mounts an Xbox DVD image read-only through FUSE.

use std::process::ExitCode;

use xdvdfs_mount::cli::{usage, CliArgs};
use xdvdfs_mount::{fuse, logging, ImageReader, MountConfig, XdvdFilesystem};

fn main() -> ExitCode {
    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_else(|| "xdvdfs-mount".to_string());

    let args = match CliArgs::parse(argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n", e);
            eprint!("{}", usage(&program));
            return ExitCode::FAILURE;
        }
    };

    logging::init(args.verbosity);

    let config = match MountConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let reader = match ImageReader::open(&args.image) {
        Ok(reader) => reader,
        Err(e) => {
            log::error!("Cannot open {}: {}", args.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let fs = match XdvdFilesystem::initialize(reader, &config) {
        Ok(fs) => fs,
        Err(e) => {
            log::error!("{}: {}", args.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "Mounting {} at {}",
        args.image.display(),
        args.mountpoint.display()
    );
    if let Err(e) = fuse::mount(fs, &args.mountpoint, &config, &args.mount_options) {
        log::error!("{}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
