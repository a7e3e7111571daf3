//! Command line front end for image collections.
//!
//! - `info <dir>`: print the collection's name, CRS, envelope and default
//!   granule
//! - `read <dir>`: run one read and print the result's geometry, optionally
//!   saving the pixels as an image

mod output;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use coverage_common::{BoundingBox, GridGeometry};
use image_collection::{
    ImageCollectionFormat, ImageCollectionReader, OverviewPolicy, ReadParameter, ReaderConfig,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use output::{save_block, CollectionSummary, ReadSummary};

#[derive(Parser, Debug)]
#[command(name = "coverage-cli")]
#[command(about = "Read a directory of raster images as one coverage")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe a collection
    Info {
        /// Collection directory
        dir: PathBuf,
    },
    /// Read from a collection
    Read(ReadArgs),
}

#[derive(ClapArgs, Debug)]
struct ReadArgs {
    /// Collection directory
    dir: PathBuf,

    /// Requested bounding box: minx,miny,maxx,maxy
    #[arg(long)]
    bbox: Option<String>,

    /// Requested raster size WxH, used with --bbox
    #[arg(long, default_value = "512x512")]
    size: String,

    /// Overview policy: nearest, quality, speed or ignore
    #[arg(long, default_value = "nearest")]
    policy: String,

    /// Granule to read, relative to the collection directory
    #[arg(long)]
    path: Option<String>,

    /// Decode only the tiles intersecting the request
    #[arg(long, env = "IMAGE_COLLECTION_DIRECT_READ")]
    direct_read: bool,

    /// Background values, comma separated
    #[arg(long)]
    background: Option<String>,

    /// Suggested tile size W,H
    #[arg(long)]
    tile_size: Option<String>,

    /// Write the pixels to this image file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    match args.command {
        Command::Info { dir } => {
            let reader = open(&dir)?;
            println!("{}", serde_json::to_string_pretty(&CollectionSummary::of(&reader))?);
        }
        Command::Read(read) => run_read(read)?,
    }
    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn open(dir: &std::path::Path) -> Result<ImageCollectionReader> {
    let config = ReaderConfig::from_env();
    let format = ImageCollectionFormat;
    if !format.accepts(dir) {
        bail!("{} is not a directory", dir.display());
    }
    ImageCollectionReader::open(dir, config)
        .with_context(|| format!("Failed to open collection {}", dir.display()))
}

fn run_read(args: ReadArgs) -> Result<()> {
    let reader = open(&args.dir)?;
    let params = parameters(&args)?;

    let Some(result) = reader.read(&params).context("Read failed")? else {
        println!("null");
        info!("Request does not overlap the coverage");
        return Ok(());
    };

    println!("{}", serde_json::to_string_pretty(&ReadSummary::of(&result))?);
    if let Some(output) = &args.output {
        save_block(&result, output)?;
        info!(path = %output.display(), "Wrote image");
    }
    Ok(())
}

fn parameters(args: &ReadArgs) -> Result<Vec<ReadParameter>> {
    let policy = OverviewPolicy::parse(&args.policy)
        .with_context(|| format!("Unknown overview policy '{}'", args.policy))?;

    let mut params = vec![
        ReadParameter::OverviewPolicy(policy),
        ReadParameter::UseDirectRead(args.direct_read),
    ];

    if let Some(bbox) = &args.bbox {
        let bbox = BoundingBox::from_csv(bbox).context("Invalid --bbox")?;
        let (width, height) = parse_size(&args.size)?;
        let grid = GridGeometry::from_envelope(bbox, width, height).context("Invalid request grid")?;
        params.push(ReadParameter::GridGeometry(grid));
    }
    if let Some(path) = &args.path {
        params.push(ReadParameter::Filter(format!("PATH='{}'", path.replace('\'', "''"))));
    }
    if let Some(background) = &args.background {
        let values = background
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Invalid --background")?;
        params.push(ReadParameter::BackgroundValues(values));
    }
    if let Some(tile_size) = &args.tile_size {
        params.push(ReadParameter::SuggestedTileSize(tile_size.clone()));
    }
    Ok(params)
}

fn parse_size(size: &str) -> Result<(usize, usize)> {
    let (w, h) = size
        .split_once(['x', 'X'])
        .with_context(|| format!("Invalid --size '{}', expected WxH", size))?;
    let w: usize = w.trim().parse().context("Invalid width")?;
    let h: usize = h.trim().parse().context("Invalid height")?;
    if w == 0 || h == 0 {
        bail!("--size must be positive");
    }
    Ok((w, h))
}
