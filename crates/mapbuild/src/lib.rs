// tilenav - Offline navigation mesh builder
// Produces per-ADT nav archives and the shared model BVH area from parsed
// world geometry.

pub mod builder;
pub mod common;
pub mod meshfiles;
pub mod pipeline;
pub mod settings;

use std::path::Path;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use tilenav_parser::Data;
use tilenav_recast::Context;
use tilenav_utility::{Error, Result};

pub use builder::MeshBuilder;
pub use settings::MeshSettings;

/// Map names an obstacle table may be copied from; consumed by the runtime.
pub const GAMEOBJECT_PATHS_FILE: &str = "gameobject_paths.txt";

#[derive(Clone, Copy, Debug, Default)]
pub struct BuildSummary {
    pub total_tiles: usize,
    pub percent_complete: f32,
}

/// Build every nav tile of a map.
pub fn build_map(
    data_dir: &Path,
    output_dir: &Path,
    map_name: &str,
    threads: usize,
    settings: MeshSettings,
) -> Result<BuildSummary> {
    let data = Data::new(data_dir)?;
    let builder = MeshBuilder::new(data, output_dir, map_name, settings)?;
    run_build(data_dir, output_dir, map_name, threads, &builder)?;

    Ok(BuildSummary {
        total_tiles: builder.total_tiles(),
        percent_complete: builder.percent_complete(),
    })
}

/// Build only the nav tiles of one ADT.
pub fn build_adt(
    data_dir: &Path,
    output_dir: &Path,
    map_name: &str,
    adt_x: i32,
    adt_y: i32,
    threads: usize,
    settings: MeshSettings,
) -> Result<BuildSummary> {
    let data = Data::new(data_dir)?;
    let builder = MeshBuilder::new_for_adt(data, output_dir, map_name, settings, adt_x, adt_y)?;
    run_build(data_dir, output_dir, map_name, threads, &builder)?;

    Ok(BuildSummary {
        total_tiles: builder.total_tiles(),
        percent_complete: builder.percent_complete(),
    })
}

fn run_build(
    data_dir: &Path,
    output_dir: &Path,
    map_name: &str,
    threads: usize,
    builder: &MeshBuilder,
) -> Result<()> {
    if builder.is_global_wmo() {
        info!("{}: global WMO map, building single-threaded", map_name);
        let ctx = Context::new()?;
        builder.build_global_wmo(&ctx)?;
    } else {
        info!(
            "{}: building {} tiles on {} thread(s)",
            map_name,
            builder.total_tiles(),
            threads
        );

        let fatal: Mutex<Option<Error>> = Mutex::new(None);

        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
        {
            Ok(pool) => pool.scope(|scope| {
                for _ in 0..threads.max(1) {
                    scope.spawn(|_| worker(builder, &fatal));
                }
            }),
            Err(err) => {
                warn!("failed to create thread pool: {}, using single thread", err);
                worker(builder, &fatal);
            }
        }

        if let Some(err) = fatal.into_inner() {
            return Err(err);
        }
    }

    copy_gameobject_paths(data_dir, output_dir, map_name)?;
    Ok(())
}

/// One worker: pull tiles until the queue drains or the build aborts.
fn worker(builder: &MeshBuilder, fatal: &Mutex<Option<Error>>) {
    let ctx = match Context::new() {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("worker failed to start: {}", err);
            record_fatal(fatal, err);
            builder.abort();
            return;
        }
    };

    while let Some((tile_x, tile_y)) = builder.next_tile() {
        match builder.build_and_serialize_tile(&ctx, tile_x, tile_y) {
            Ok(()) => {}
            Err(err @ Error::Io(_)) => {
                // archive write failures are fatal for the map
                error!("tile ({}, {}): {}", tile_x, tile_y, err);
                record_fatal(fatal, err);
                builder.abort();
                return;
            }
            Err(err) => {
                warn!("tile ({}, {}) skipped: {}", tile_x, tile_y, err);
            }
        }
    }
}

fn record_fatal(fatal: &Mutex<Option<Error>>, err: Error) {
    let mut guard = fatal.lock();
    if guard.is_none() {
        *guard = Some(err);
    }
}

/// The display-id to model-path table rides along with the build output so
/// the runtime can resolve temporary obstacles.
fn copy_gameobject_paths(data_dir: &Path, output_dir: &Path, map_name: &str) -> Result<()> {
    let source = data_dir.join("GameObjectPaths.txt");
    if !source.exists() {
        return Ok(());
    }

    let dir = output_dir.join(map_name);
    std::fs::create_dir_all(&dir)?;
    std::fs::copy(&source, dir.join(GAMEOBJECT_PATHS_FILE))?;
    Ok(())
}
