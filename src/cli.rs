//! Command-line parsing for `xdvdfs-mount`

use std::path::PathBuf;
use thiserror::Error;

use crate::logging::Verbosity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing image file or mount point")]
    MissingArguments,

    #[error("option {0} needs a value")]
    MissingValue(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub image: PathBuf,
    pub mountpoint: PathBuf,
    pub verbosity: Verbosity,
    pub config: Option<PathBuf>,
    /// Words from every `-o` option, plus unrecognised flags
    pub mount_options: Vec<String>,
}

impl CliArgs {
    /// Parse arguments, excluding the program name.
    ///
    /// `-q` and `-d` may appear anywhere. `-f` and `-s` are accepted and
    /// ignored since the mount always runs in the foreground. Any other flag
    /// is handed to the mount as is.
    pub fn parse<I, S>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut positional = Vec::new();
        let mut verbosity = Verbosity::Normal;
        let mut config = None;
        let mut mount_options = Vec::new();

        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-q" => verbosity = Verbosity::Quiet,
                "-d" => {
                    if verbosity != Verbosity::Quiet {
                        verbosity = Verbosity::Debug;
                    }
                }
                "-f" | "-s" => {}
                "-o" => {
                    let value = args.next().ok_or_else(|| UsageError::MissingValue(arg.clone()))?;
                    push_options(&mut mount_options, &value);
                }
                "--config" => {
                    let value = args.next().ok_or_else(|| UsageError::MissingValue(arg.clone()))?;
                    config = Some(PathBuf::from(value));
                }
                _ => {
                    if let Some(value) = arg.strip_prefix("-o").filter(|v| !v.is_empty()) {
                        push_options(&mut mount_options, value);
                    } else if let Some(value) = arg.strip_prefix("--config=") {
                        config = Some(PathBuf::from(value));
                    } else if arg.starts_with('-') && arg.len() > 1 {
                        mount_options.push(arg);
                    } else {
                        positional.push(arg);
                    }
                }
            }
        }

        if positional.len() < 2 {
            return Err(UsageError::MissingArguments);
        }
        if positional.len() > 2 {
            return Err(UsageError::UnexpectedArgument(positional.swap_remove(2)));
        }
        let mountpoint = PathBuf::from(positional.pop().unwrap_or_default());
        let image = PathBuf::from(positional.pop().unwrap_or_default());

        Ok(Self {
            image,
            mountpoint,
            verbosity,
            config,
            mount_options,
        })
    }
}

fn push_options(options: &mut Vec<String>, value: &str) {
    options.extend(
        value
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_owned),
    );
}

/// Help text printed on a usage error
pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} <image_file> <mount_point> [<options>] [<FUSE options>]\n\n\
         Options:\n\
         \t-q              quiet mode (print only error messages)\n\
         \t-d              debug output\n\
         \t--config <file> read mount settings from <file>\n\n\
         FUSE options:\n\
         \t-o opt[,opt...] mount options (allow_other, auto_unmount, ...)\n\
         \t-f, -s          accepted for compatibility, ignored\n"
    )
}
