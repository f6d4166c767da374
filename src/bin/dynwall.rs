use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dynwall::{DynwallError, FfmpegAvifEncoder, FfmpegAvifOpts, MetaData, WallpaperWriter};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dynwall", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pack images and their metadata into an AVIF dynamic wallpaper (requires `ffmpeg` on PATH).
    Build(BuildArgs),
}

#[derive(Parser, Debug)]
struct BuildArgs {
    /// Input manifest JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output AVIF path.
    #[arg(long)]
    out: PathBuf,

    /// Encoder worker threads (defaults to the available parallelism).
    #[arg(long)]
    threads: Option<usize>,

    /// `ffmpeg` executable.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// AV1 encoder passed to ffmpeg.
    #[arg(long, default_value = "libaom-av1")]
    codec: String,
}

/// One manifest entry: an image file plus its metadata keys.
#[derive(Deserialize, Debug)]
struct ManifestEntry {
    #[serde(rename = "FileName")]
    file_name: PathBuf,
    #[serde(flatten)]
    meta: MetaData,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Build(args) => cmd_build(args),
    }
}

fn read_manifest(path: &Path) -> anyhow::Result<Vec<ManifestEntry>> {
    let f = File::open(path).with_context(|| format!("open manifest '{}'", path.display()))?;
    let r = BufReader::new(f);
    let entries: Vec<ManifestEntry> = serde_json::from_reader(r)
        .map_err(DynwallError::from)
        .with_context(|| format!("parse manifest '{}'", path.display()))?;
    if entries.is_empty() {
        return Err(DynwallError::validation(format!(
            "manifest '{}' lists no images",
            path.display()
        ))
        .into());
    }
    Ok(entries)
}

fn cmd_build(args: BuildArgs) -> anyhow::Result<()> {
    let entries = read_manifest(&args.in_path)?;
    let base = args.in_path.parent().unwrap_or_else(|| Path::new("."));

    let mut images = Vec::with_capacity(entries.len());
    for entry in &entries {
        let path = base.join(&entry.file_name);
        let img = image::open(&path).with_context(|| format!("load image '{}'", path.display()))?;
        images.push(img);
    }

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    if !WallpaperWriter::can_write_path(&args.out) {
        anyhow::bail!("cannot write to '{}'", args.out.display());
    }

    let opts = FfmpegAvifOpts {
        program: args.ffmpeg,
        codec: args.codec,
    };
    let mut writer = WallpaperWriter::with_encoder(FfmpegAvifEncoder::factory(opts))
        .with_opts(dynwall::WriterOpts {
            max_threads: args.threads,
        });
    writer.set_images(&images);
    writer.set_meta_data(entries.iter().map(|e| e.meta).collect::<Vec<_>>());

    let report = writer.flush_to_path(&args.out)?;
    for dropped in &report.dropped {
        eprintln!(
            "warning: skipped '{}': {}",
            entries[dropped.index].file_name.display(),
            dropped.reason
        );
    }
    if let Some(err) = writer.last_error() {
        return Err(err).with_context(|| format!("write '{}'", args.out.display()));
    }

    println!(
        "wrote {} ({} of {} frames, {} bytes)",
        args.out.display(),
        report.frames_encoded,
        report.frames_submitted,
        report.bytes_written
    );
    Ok(())
}
