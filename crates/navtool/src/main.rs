// tilenav - navigation mesh build and query tool
// Consolidated entrypoint:
// - build-map: every nav tile of a map
// - build-adt: the nav tiles of a single ADT
// - query: load a built map and run a point-to-point path

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use tilenav_mapbuild::MeshSettings;
use tilenav_utility::log::{initialize_logging, map_log_level};
use tilenav_utility::math::Vec3;

#[derive(Parser, Debug)]
#[command(name = "tilenav")]
#[command(about = "Navigation mesh build and query tools")]
#[command(version)]
struct Cli {
    /// Console log level (0=Minimum, 1=Error, 2=Detail, 3=Full/Debug, 4=Trace)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<i32>,

    /// Log directory; console only when unset
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every nav tile of a map
    BuildMap(BuildMapArgs),
    /// Build the nav tiles of one ADT
    BuildAdt(BuildAdtArgs),
    /// Run a path query against built data
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct BuildMapArgs {
    /// Map name (matches Maps/<name>/<name>.wdt under the data directory)
    map_name: String,

    /// Input data directory
    #[arg(short = 'd', long = "data", default_value = "Data")]
    data_dir: PathBuf,

    /// Output directory (created if absent)
    #[arg(short = 'o', long = "output", default_value = "nav")]
    output_dir: PathBuf,

    /// Mesh settings JSON (per-map overrides)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct BuildAdtArgs {
    map_name: String,

    /// ADT coordinate (format: X,Y)
    #[arg(value_parser = parse_coordinate)]
    adt: Coordinate,

    #[arg(short = 'd', long = "data", default_value = "Data")]
    data_dir: PathBuf,

    #[arg(short = 'o', long = "output", default_value = "nav")]
    output_dir: PathBuf,

    #[arg(long = "config")]
    config: Option<PathBuf>,

    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    map_name: String,

    /// Start point (format: x,y,z)
    #[arg(value_parser = parse_point)]
    start: Point,

    /// End point (format: x,y,z)
    #[arg(value_parser = parse_point)]
    end: Point,

    /// Built nav data directory
    #[arg(short = 'n', long = "nav", default_value = "nav")]
    nav_dir: PathBuf,

    /// Apply the detail-mesh smoothing pass
    #[arg(long)]
    smooth: bool,

    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Clone, Debug)]
struct Coordinate {
    x: i32,
    y: i32,
}

fn parse_coordinate(input: &str) -> Result<Coordinate, String> {
    let mut parts = input.split(',');
    let x = parts
        .next()
        .ok_or_else(|| "Missing X".to_string())?
        .trim()
        .parse::<i32>()
        .map_err(|_| "Invalid X".to_string())?;
    let y = parts
        .next()
        .ok_or_else(|| "Missing Y".to_string())?
        .trim()
        .parse::<i32>()
        .map_err(|_| "Invalid Y".to_string())?;
    Ok(Coordinate { x, y })
}

#[derive(Clone, Debug)]
struct Point {
    x: f32,
    y: f32,
    z: f32,
}

fn parse_point(input: &str) -> Result<Point, String> {
    let parts: Vec<&str> = input.split(',').collect();
    if parts.len() != 3 {
        return Err("Expected x,y,z".to_string());
    }
    let mut values = [0.0f32; 3];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part
            .trim()
            .parse::<f32>()
            .map_err(|_| format!("Invalid coordinate '{}'", part))?;
    }
    Ok(Point {
        x: values[0],
        y: values[1],
        z: values[2],
    })
}

fn resolve_threads(threads: Option<usize>) -> usize {
    threads.unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
}

fn run_build_map(args: BuildMapArgs) -> anyhow::Result<()> {
    let threads = resolve_threads(args.threads);
    let settings = MeshSettings::load(args.config.as_deref(), &args.map_name)?;

    let summary = tilenav_mapbuild::build_map(
        &args.data_dir,
        &args.output_dir,
        &args.map_name,
        threads,
        settings,
    )?;

    tracing::info!(
        "{}: {} tiles, {:.1}% complete",
        args.map_name,
        summary.total_tiles,
        summary.percent_complete * 100.0
    );
    Ok(())
}

fn run_build_adt(args: BuildAdtArgs) -> anyhow::Result<()> {
    let threads = resolve_threads(args.threads);
    let settings = MeshSettings::load(args.config.as_deref(), &args.map_name)?;

    let summary = tilenav_mapbuild::build_adt(
        &args.data_dir,
        &args.output_dir,
        &args.map_name,
        args.adt.x,
        args.adt.y,
        threads,
        settings,
    )?;

    tracing::info!(
        "{} ({}, {}): {} tiles, {:.1}% complete",
        args.map_name,
        args.adt.x,
        args.adt.y,
        summary.total_tiles,
        summary.percent_complete * 100.0
    );
    Ok(())
}

fn run_query(args: QueryArgs) -> anyhow::Result<()> {
    let settings = MeshSettings::load(args.config.as_deref(), &args.map_name)?;
    let map = tilenav_pathfind::Map::load(&args.nav_dir, &args.map_name, settings)?;

    let start = Vec3::new(args.start.x, args.start.y, args.start.z);
    let end = Vec3::new(args.end.x, args.end.y, args.end.z);

    if map.has_global_wmo() {
        map.load_global_wmo()?;
    } else {
        // load the ADTs under both endpoints
        for point in [start, end] {
            let (adt_x, adt_y) = tilenav_utility::convert::world_to_adt(point)?;
            map.load_adt(adt_x, adt_y)?;
        }
    }

    match map.find_path(start, end, args.smooth)? {
        Some(path) => {
            tracing::info!("path with {} vertices:", path.len());
            for v in &path {
                println!("{:.3} {:.3} {:.3}", v.x, v.y, v.z);
            }
        }
        None => {
            tracing::warn!("no path found");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let console_level = map_log_level(cli.log_level.unwrap_or(2));
    initialize_logging(cli.log_dir.as_deref(), console_level);

    match cli.command {
        Command::BuildMap(args) => run_build_map(args),
        Command::BuildAdt(args) => run_build_adt(args),
        Command::Query(args) => run_query(args),
    }
}
