//! Mount option assembly

use fuser::MountOption;

use crate::config::MountConfig;

/// Options for a read-only mount, followed by anything passed with `-o`
pub fn build_mount_options(config: &MountConfig, extra: &[String]) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::RO,
        MountOption::FSName(config.fs_name.clone()),
        MountOption::Subtype("xdvdfs".to_owned()),
    ];

    if config.allow_other {
        opts.push(MountOption::AllowOther);
    }
    if config.auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }

    for option in extra {
        match parse_option(option) {
            Some(MountOption::RW) => {
                log::warn!("ignoring mount option 'rw', image is mounted read-only");
            }
            Some(parsed) if !opts.contains(&parsed) => opts.push(parsed),
            Some(_) => {}
            None => log::warn!("ignoring empty mount option"),
        }
    }

    opts
}

/// Translate one `-o` word into a typed option where fuser knows it
fn parse_option(option: &str) -> Option<MountOption> {
    let option = option.trim();
    if option.is_empty() {
        return None;
    }
    let parsed = match option {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "noatime" => MountOption::NoAtime,
        "nodev" => MountOption::NoDev,
        "nosuid" => MountOption::NoSuid,
        "noexec" => MountOption::NoExec,
        _ => match option.split_once('=') {
            Some(("fsname", value)) => MountOption::FSName(value.to_owned()),
            Some(("subtype", value)) => MountOption::Subtype(value.to_owned()),
            _ => MountOption::CUSTOM(option.to_owned()),
        },
    };
    Some(parsed)
}
