use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use log::LevelFilter;
use nix::unistd::{Gid, Group, Uid, User};

use streamtar::{stream_file, ArchiveSession, MemberMetadata};

/// Pack files into a tar archive, optionally gzip-compressing each one on the fly.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Path to the output archive file. It must be seekable, so not a pipe.
    #[arg(short, long)]
    output_path: PathBuf,

    /// Add the files to an existing archive instead of starting a new one. A missing archive is
    /// created.
    #[arg(short, long)]
    append: bool,

    /// Compress each file with gzip and store it as `<name>.gz`.
    #[arg(short = 'z', long)]
    gzip: bool,

    /// Gzip compression level.
    #[arg(long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: u32,

    /// List of files (i.e. their paths) to pack up.
    #[arg(required(true))]
    input_files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.debug {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    colog::default_builder().filter_level(level).init();

    if cli.input_files.is_empty() {
        bail!("No input files provided. Atleast one input file is required.");
    }
    log::info!(
        "{} an archive at {}, for files: {}",
        if cli.append { "Appending to" } else { "Creating" },
        cli.output_path.display(),
        cli.input_files
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );

    let session = if cli.append {
        let outfile = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&cli.output_path)
            .with_context(|| format!("Unable to open {}", cli.output_path.display()))?;
        ArchiveSession::append(outfile).with_context(|| {
            format!(
                "{} is not an archive that can be appended to",
                cli.output_path.display()
            )
        })?
    } else {
        let outfile = File::create(&cli.output_path)
            .with_context(|| format!("Unable to create {}", cli.output_path.display()))?;
        ArchiveSession::open(outfile)?
    };
    let mut session = session.with_compression_level(cli.level);
    for path in &cli.input_files {
        pack_file(&mut session, path, cli.gzip)?;
    }
    session.close()?;
    log::info!("Done.");
    Ok(())
}

fn pack_file(session: &mut ArchiveSession<File>, path: &Path, gzip: bool) -> anyhow::Result<()> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Unable to read metadata of: {}", path.display()))?;
    if !metadata.is_file() {
        bail!(
            "{} is not a regular file. Only regular files are supported.",
            path.display()
        );
    }
    let file_name = path
        .file_name()
        .and_then(|os_str| os_str.to_str())
        .with_context(|| "Unable to get filename from path")?;

    let mut member_metadata = MemberMetadata::from_fs(file_name, &metadata);
    let (uname, gname) = owner_names(member_metadata.uid, member_metadata.gid);
    member_metadata = member_metadata.owner_names(uname, gname);

    if gzip {
        member_metadata.name = format!("{}.gz", file_name);
        let mut member = session.new_compressed_member(&member_metadata)?;
        stream_file(path, &mut member)?;
        let summary = member.close()?;
        log::info!(
            "Added {} ({} bytes, {} compressed)",
            summary.name,
            metadata.len(),
            summary.size
        );
    } else {
        let mut member = session.new_member(&member_metadata)?;
        stream_file(path, &mut member)?;
        let summary = member.close()?;
        log::info!("Added {} ({} bytes)", summary.name, summary.size);
    }
    Ok(())
}

/// Resolve user and group names; unknown ids are left blank.
fn owner_names(uid: u64, gid: u64) -> (String, String) {
    let uname = u32::try_from(uid)
        .ok()
        .and_then(|uid| User::from_uid(Uid::from_raw(uid)).ok().flatten())
        .map(|user| user.name)
        .unwrap_or_default();
    let gname = u32::try_from(gid)
        .ok()
        .and_then(|gid| Group::from_gid(Gid::from_raw(gid)).ok().flatten())
        .map(|group| group.name)
        .unwrap_or_default();
    (uname, gname)
}
