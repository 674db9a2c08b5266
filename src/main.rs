use std::path::PathBuf;

use argh::FromArgs;

/// mount a reMarkable tablet's document store as a read-only folder/page
/// hierarchy
#[derive(FromArgs)]
struct RemfsArgs {
    /// path to the flat UUID-keyed store (the tablet's `xochitl` data directory, or a synced copy of it)
    #[argh(option, default = "PathBuf::from(\"./xochitl\")")]
    source: PathBuf,

    /// expose the mount to other users (passes `allow_other` to the kernel)
    #[argh(switch)]
    allow_other: bool,

    /// where to mount the virtual filesystem
    #[argh(positional)]
    mountpoint: PathBuf,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args: RemfsArgs = argh::from_env();

    if !args.source.is_dir() {
        color_eyre::eyre::bail!("source {:?} is not a directory", args.source);
    }
    if !args.mountpoint.is_dir() {
        color_eyre::eyre::bail!("mountpoint {:?} is not a directory", args.mountpoint);
    }

    tracing::info!("indexing {:?}", args.source);
    let index = remfs::NameIndex::build(&args.source);

    let options = remfs::RemFs::mount_options(args.allow_other);
    let filesystem = remfs::RemFs::new(index);

    tracing::info!("mounting at {:?}", args.mountpoint);
    fuser::mount2(filesystem, &args.mountpoint, &options)?;

    Ok(())
}
