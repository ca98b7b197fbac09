// The tile build orchestrator.
//
// Workers pull nav-tile coordinates from a shared queue.  Before touching a
// tile they take a reference on every world chunk it overlaps, which parses
// the owning ADTs on first use and keeps them resident until the last
// referencing tile finishes.  Output aggregates per ADT; an archive is only
// written once all of its tiles have arrived.
//
// All mutable scheduler state sits behind one mutex and is only reachable
// through whole operations on MeshBuilder; no raw state crosses a thread
// boundary.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tilenav_parser::adt::Adt;
use tilenav_parser::{Data, Map};
use tilenav_recast::Context;
use tilenav_utility::aabb_tree::AabbTree;
use tilenav_utility::math::BoundingBox;
use tilenav_utility::stream::ByteStream;
use tilenav_utility::{convert, Error, Result, ADT_GRID, ADT_SIZE, CHUNK_GRID, CHUNK_SIZE,
    MAX_COORDINATE};

use crate::common::area;
use crate::meshfiles::{self, flatten_model_name, MeshFile, TileOutput};
use crate::pipeline::{self, TileGeometry, TileMesh};
use crate::settings::MeshSettings;

/// Chunks per side of the world chunk grid.
const WORLD_CHUNKS: i32 = ADT_GRID * CHUNK_GRID;

fn chunk_index(gx: i32, gy: i32) -> usize {
    (gy * WORLD_CHUNKS + gx) as usize
}

struct BuilderState {
    pending: VecDeque<(i32, i32)>,
    /// One counter per world chunk; heap-allocated, the grid is a million
    /// cells.
    chunk_refs: Vec<i32>,
    in_progress: HashMap<(i32, i32), MeshFile>,
    bvh_wmos: HashSet<String>,
    bvh_doodads: HashSet<String>,
    starting_tiles: usize,
    completed_tiles: usize,
}

/// Everything a worker gathered for one tile before the voxel pipeline runs.
struct PreparedTile {
    chunk_range: ChunkRange,
    geometry: TileGeometry,
    wmo_ids: Vec<u32>,
    doodad_ids: Vec<u32>,
}

#[derive(Clone, Copy, Debug)]
struct ChunkRange {
    gx0: i32,
    gy0: i32,
    gx1: i32,
    gy1: i32,
}

impl ChunkRange {
    fn adts(&self) -> impl Iterator<Item = (i32, i32)> {
        let (ax0, ax1) = (self.gx0 / CHUNK_GRID, self.gx1 / CHUNK_GRID);
        let (ay0, ay1) = (self.gy0 / CHUNK_GRID, self.gy1 / CHUNK_GRID);
        (ay0..=ay1).flat_map(move |ay| (ax0..=ax1).map(move |ax| (ax, ay)))
    }
}

pub struct MeshBuilder {
    map: Map,
    output: PathBuf,
    settings: MeshSettings,
    state: Mutex<BuilderState>,
    abort: AtomicBool,
}

impl MeshBuilder {
    /// Queue every nav tile of every known ADT.
    pub fn new(
        data: Data,
        output: impl Into<PathBuf>,
        map_name: &str,
        settings: MeshSettings,
    ) -> Result<MeshBuilder> {
        let map = Map::open(data, map_name)?;
        let mut pending = VecDeque::new();

        if map.global_wmo_instance().is_none() {
            for adt_y in 0..ADT_GRID {
                for adt_x in 0..ADT_GRID {
                    if map.has_adt(adt_x, adt_y) {
                        push_adt_tiles(&mut pending, adt_x, adt_y, settings.tiles_per_adt);
                    }
                }
            }
        }

        Ok(Self::with_pending(map, output.into(), settings, pending))
    }

    /// Queue only the nav tiles of a single ADT.
    pub fn new_for_adt(
        data: Data,
        output: impl Into<PathBuf>,
        map_name: &str,
        settings: MeshSettings,
        adt_x: i32,
        adt_y: i32,
    ) -> Result<MeshBuilder> {
        let map = Map::open(data, map_name)?;
        if !map.has_adt(adt_x, adt_y) {
            return Err(Error::NotFound(format!(
                "{}: no ADT at ({}, {})",
                map_name, adt_x, adt_y
            )));
        }

        let mut pending = VecDeque::new();
        push_adt_tiles(&mut pending, adt_x, adt_y, settings.tiles_per_adt);
        Ok(Self::with_pending(map, output.into(), settings, pending))
    }

    fn with_pending(
        map: Map,
        output: PathBuf,
        settings: MeshSettings,
        pending: VecDeque<(i32, i32)>,
    ) -> MeshBuilder {
        let starting_tiles = match map.global_wmo_instance() {
            // tiles covered by the global model's footprint
            Some(instance) => {
                let (tx0, ty0, tx1, ty1) =
                    nav_tiles_for_bounds(&instance.bounds, settings.tiles_per_adt);
                ((tx1 - tx0 + 1) * (ty1 - ty0 + 1)) as usize
            }
            None => pending.len(),
        };

        MeshBuilder {
            map,
            output,
            settings,
            state: Mutex::new(BuilderState {
                pending,
                chunk_refs: vec![0; (WORLD_CHUNKS * WORLD_CHUNKS) as usize],
                in_progress: HashMap::new(),
                bvh_wmos: HashSet::new(),
                bvh_doodads: HashSet::new(),
                starting_tiles,
                completed_tiles: 0,
            }),
            abort: AtomicBool::new(false),
        }
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn settings(&self) -> &MeshSettings {
        &self.settings
    }

    pub fn is_global_wmo(&self) -> bool {
        self.map.global_wmo_instance().is_some()
    }

    pub fn total_tiles(&self) -> usize {
        self.state.lock().starting_tiles
    }

    pub fn percent_complete(&self) -> f32 {
        let state = self.state.lock();
        if state.starting_tiles == 0 {
            return 1.0;
        }
        state.completed_tiles as f32 / state.starting_tiles as f32
    }

    /// Best-effort cancellation; in-flight tiles complete, nothing new is
    /// handed out.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn next_tile(&self) -> Option<(i32, i32)> {
        if self.abort.load(Ordering::Relaxed) {
            return None;
        }
        self.state.lock().pending.pop_front()
    }

    /// Build one tile end to end: claim chunks, gather geometry, voxelize,
    /// hand the result to the owning ADT's aggregator, release chunks.
    pub fn build_and_serialize_tile(&self, ctx: &Context, tile_x: i32, tile_y: i32) -> Result<()> {
        let prepared = self.prepare_tile(tile_x, tile_y)?;

        let mesh = match pipeline::build_tile(
            ctx,
            &self.settings,
            tile_x,
            tile_y,
            &prepared.geometry,
        ) {
            Ok(mesh) => mesh,
            Err(err @ Error::TooManyVerts { .. }) | Err(err @ Error::VoxelLibraryFailure(_)) => {
                // drop the tile, keep the map going
                warn!("tile ({}, {}) dropped: {}", tile_x, tile_y, err);
                TileMesh::empty()
            }
            Err(err) => {
                self.remove_chunk_references(prepared.chunk_range);
                return Err(err);
            }
        };

        let output = TileOutput {
            tile_x,
            tile_y,
            heightfield: mesh.snapshot,
            blob: mesh.blob,
            wmo_ids: prepared.wmo_ids,
            doodad_ids: prepared.doodad_ids,
        };

        self.remove_chunk_references(prepared.chunk_range);
        self.add_tile_output(output)
    }

    /// Claim chunk references and gather the tile's triangle soup.  No voxel
    /// work happens here.  On failure the references are released again.
    fn prepare_tile(&self, tile_x: i32, tile_y: i32) -> Result<PreparedTile> {
        let chunk_range = self.chunk_range(tile_x, tile_y);
        let adts = self.add_chunk_references(chunk_range)?;

        match self.gather_tile_geometry(chunk_range, &adts) {
            Ok(prepared) => Ok(prepared),
            Err(err) => {
                self.remove_chunk_references(chunk_range);
                Err(err)
            }
        }
    }

    fn gather_tile_geometry(
        &self,
        chunk_range: ChunkRange,
        adts: &HashMap<(i32, i32), Arc<Adt>>,
    ) -> Result<PreparedTile> {
        let mut geometry = TileGeometry::default();
        let mut wmo_ids = BTreeSet::new();
        let mut doodad_ids = BTreeSet::new();

        for gy in chunk_range.gy0..=chunk_range.gy1 {
            for gx in chunk_range.gx0..=chunk_range.gx1 {
                let key = (gx / CHUNK_GRID, gy / CHUNK_GRID);
                let Some(adt) = adts.get(&key) else {
                    continue;
                };
                let chunk = adt.chunk(gx % CHUNK_GRID, gy % CHUNK_GRID);

                if !chunk.terrain_indices.is_empty() {
                    geometry.solid.push_world(
                        &chunk.terrain_vertices,
                        &chunk.terrain_indices,
                        area::ADT,
                    );
                }
                if !chunk.liquid_indices.is_empty() {
                    geometry.liquid.push_world(
                        &chunk.liquid_vertices,
                        &chunk.liquid_indices,
                        area::LIQUID,
                    );
                }

                wmo_ids.extend(chunk.wmo_instances.iter().copied());
                doodad_ids.extend(chunk.doodad_instances.iter().copied());
            }
        }

        for &id in &wmo_ids {
            let Some(instance) = self.map.get_wmo_instance(id) else {
                continue;
            };
            let mut vertices = Vec::new();
            let mut indices = Vec::new();
            instance.build_triangles(&mut vertices, &mut indices);
            geometry.solid.push_world(&vertices, &indices, area::WMO);

            let mut liquid_vertices = Vec::new();
            let mut liquid_indices = Vec::new();
            instance.build_liquid_triangles(&mut liquid_vertices, &mut liquid_indices);
            if !liquid_indices.is_empty() {
                geometry
                    .liquid
                    .push_world(&liquid_vertices, &liquid_indices, area::LIQUID);
            }

            self.serialize_wmo_bvh(&instance.model_file, &instance.model.aabb_tree)?;
        }

        for &id in &doodad_ids {
            let Some(instance) = self.map.get_doodad_instance(id) else {
                continue;
            };
            let mut vertices = Vec::new();
            let mut indices = Vec::new();
            instance.build_triangles(&mut vertices, &mut indices);
            geometry.solid.push_world(&vertices, &indices, area::DOODAD);

            self.serialize_doodad_bvh(&instance.model_file, &instance.model.aabb_tree)?;
        }

        Ok(PreparedTile {
            chunk_range,
            geometry,
            wmo_ids: wmo_ids.into_iter().collect(),
            doodad_ids: doodad_ids.into_iter().collect(),
        })
    }

    /// Chunks overlapping the tile's extent, border apron included.
    fn chunk_range(&self, tile_x: i32, tile_y: i32) -> ChunkRange {
        let bounds = convert::nav_tile_bounds(tile_x, tile_y, self.settings.tiles_per_adt);
        let pad = self.settings.border_size() as f32 * self.settings.cell_size();

        let gx0 = (((MAX_COORDINATE - (bounds.max.y + pad)) / CHUNK_SIZE).floor() as i32)
            .clamp(0, WORLD_CHUNKS - 1);
        let gx1 = (((MAX_COORDINATE - (bounds.min.y - pad)) / CHUNK_SIZE).floor() as i32)
            .clamp(0, WORLD_CHUNKS - 1);
        let gy0 = (((MAX_COORDINATE - (bounds.max.x + pad)) / CHUNK_SIZE).floor() as i32)
            .clamp(0, WORLD_CHUNKS - 1);
        let gy1 = (((MAX_COORDINATE - (bounds.min.x - pad)) / CHUNK_SIZE).floor() as i32)
            .clamp(0, WORLD_CHUNKS - 1);

        ChunkRange { gx0, gy0, gx1, gy1 }
    }

    /// Parse every ADT covered by the range (first reference wins) and bump
    /// the chunk counters.  Nothing is incremented if a parse fails.
    fn add_chunk_references(&self, range: ChunkRange) -> Result<HashMap<(i32, i32), Arc<Adt>>> {
        let mut state = self.state.lock();

        let mut adts = HashMap::new();
        for (adt_x, adt_y) in range.adts() {
            if self.map.has_adt(adt_x, adt_y) {
                adts.insert((adt_x, adt_y), self.map.get_adt(adt_x, adt_y)?);
            }
        }

        for gy in range.gy0..=range.gy1 {
            for gx in range.gx0..=range.gx1 {
                state.chunk_refs[chunk_index(gx, gy)] += 1;
            }
        }

        Ok(adts)
    }

    /// Drop the tile's chunk references; ADTs whose counters all reach zero
    /// are unloaded.
    fn remove_chunk_references(&self, range: ChunkRange) {
        let mut state = self.state.lock();

        for gy in range.gy0..=range.gy1 {
            for gx in range.gx0..=range.gx1 {
                let counter = &mut state.chunk_refs[chunk_index(gx, gy)];
                debug_assert!(*counter > 0);
                *counter -= 1;
            }
        }

        for (adt_x, adt_y) in range.adts() {
            if !self.map.has_adt(adt_x, adt_y) {
                continue;
            }
            let mut live = false;
            for chunk_y in 0..CHUNK_GRID {
                for chunk_x in 0..CHUNK_GRID {
                    let gx = adt_x * CHUNK_GRID + chunk_x;
                    let gy = adt_y * CHUNK_GRID + chunk_y;
                    if state.chunk_refs[chunk_index(gx, gy)] > 0 {
                        live = true;
                        break;
                    }
                }
                if live {
                    break;
                }
            }
            if !live {
                self.map.unload_adt(adt_x, adt_y);
            }
        }
    }

    /// Record a finished tile; when its ADT is complete, write the archive.
    fn add_tile_output(&self, output: TileOutput) -> Result<()> {
        let expected = (self.settings.tiles_per_adt * self.settings.tiles_per_adt) as usize;
        let adt = convert::nav_tile_to_adt(output.tile_x, output.tile_y, self.settings.tiles_per_adt);

        let finished = {
            let mut state = self.state.lock();
            state.completed_tiles += 1;

            let file = state
                .in_progress
                .entry(adt)
                .or_insert_with(|| MeshFile::new(expected));
            file.add_tile(output);

            if file.is_complete() {
                state.in_progress.remove(&adt)
            } else {
                None
            }
        };

        if let Some(file) = finished {
            self.write_archive(&meshfiles::adt_archive_name(adt.0, adt.1), &file)?;
            debug!("adt ({}, {}) archive written", adt.0, adt.1);
        }

        Ok(())
    }

    fn write_archive(&self, name: &str, file: &MeshFile) -> Result<()> {
        let dir = self.output.join(self.map.name());
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(name), file.serialize())?;
        Ok(())
    }

    fn serialize_wmo_bvh(&self, model_file: &str, tree: &AabbTree) -> Result<()> {
        let newly_seen = self.state.lock().bvh_wmos.insert(model_file.to_string());
        if newly_seen {
            self.write_bvh(model_file, tree)?;
        }
        Ok(())
    }

    fn serialize_doodad_bvh(&self, model_file: &str, tree: &AabbTree) -> Result<()> {
        let newly_seen = self.state.lock().bvh_doodads.insert(model_file.to_string());
        if newly_seen {
            self.write_bvh(model_file, tree)?;
        }
        Ok(())
    }

    fn write_bvh(&self, model_file: &str, tree: &AabbTree) -> Result<()> {
        let dir = self.output.join("bvh");
        std::fs::create_dir_all(&dir)?;

        let mut stream = ByteStream::new();
        tree.serialize(&mut stream);
        std::fs::write(dir.join(flatten_model_name(model_file)), stream.contents())?;
        Ok(())
    }

    /// Build a map that is one global WMO instead of terrain: every nav tile
    /// under the model's footprint, single-threaded, into global.nav.
    pub fn build_global_wmo(&self, ctx: &Context) -> Result<()> {
        let instance = self
            .map
            .global_wmo_instance()
            .ok_or(Error::Unsupported("map has terrain, not a global WMO"))?;

        let (tx0, ty0, tx1, ty1) = nav_tiles_for_bounds(&instance.bounds, self.settings.tiles_per_adt);
        let expected = ((tx1 - tx0 + 1) * (ty1 - ty0 + 1)) as usize;
        info!(
            "{}: global WMO covers tiles ({}, {})..({}, {})",
            self.map.name(),
            tx0,
            ty0,
            tx1,
            ty1
        );

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        instance.build_triangles(&mut vertices, &mut indices);

        let mut liquid_vertices = Vec::new();
        let mut liquid_indices = Vec::new();
        instance.build_liquid_triangles(&mut liquid_vertices, &mut liquid_indices);

        self.serialize_wmo_bvh(&instance.model_file, &instance.model.aabb_tree)?;

        let mut doodad_ids = Vec::new();
        let mut doodad_geometry: Vec<(Vec<_>, Vec<_>)> = Vec::new();
        for &id in &instance.embedded_doodads {
            if let Some(doodad) = self.map.get_doodad_instance(id) {
                let mut dv = Vec::new();
                let mut di = Vec::new();
                doodad.build_triangles(&mut dv, &mut di);
                doodad_geometry.push((dv, di));
                doodad_ids.push(id);
                self.serialize_doodad_bvh(&doodad.model_file, &doodad.model.aabb_tree)?;
            }
        }

        let mut file = MeshFile::new(expected);
        for tile_y in ty0..=ty1 {
            for tile_x in tx0..=tx1 {
                let mut geometry = TileGeometry::default();
                geometry.solid.push_world(&vertices, &indices, area::WMO);
                if !liquid_indices.is_empty() {
                    geometry
                        .liquid
                        .push_world(&liquid_vertices, &liquid_indices, area::LIQUID);
                }
                for (dv, di) in &doodad_geometry {
                    geometry.solid.push_world(dv, di, area::DOODAD);
                }

                let mesh = match pipeline::build_tile(ctx, &self.settings, tile_x, tile_y, &geometry)
                {
                    Ok(mesh) => mesh,
                    Err(err) => {
                        // any failure on the lone structure is fatal for the map
                        return Err(err);
                    }
                };

                file.add_tile(TileOutput {
                    tile_x,
                    tile_y,
                    heightfield: mesh.snapshot,
                    blob: mesh.blob,
                    wmo_ids: vec![instance.id],
                    doodad_ids: doodad_ids.clone(),
                });

                self.state.lock().completed_tiles += 1;
            }
        }

        self.write_archive(meshfiles::GLOBAL_ARCHIVE_NAME, &file)
    }

    #[cfg(test)]
    fn chunk_refs_all_zero(&self) -> bool {
        self.state.lock().chunk_refs.iter().all(|&c| c == 0)
    }

    #[cfg(test)]
    fn aggregators_in_progress(&self) -> usize {
        self.state.lock().in_progress.len()
    }
}

fn push_adt_tiles(pending: &mut VecDeque<(i32, i32)>, adt_x: i32, adt_y: i32, tiles_per_adt: i32) {
    let (tx0, ty0, tx1, ty1) = convert::adt_nav_tiles(adt_x, adt_y, tiles_per_adt);
    for tile_y in ty0..ty1 {
        for tile_x in tx0..tx1 {
            pending.push_back((tile_x, tile_y));
        }
    }
}

/// Inclusive nav tile range covering a 2D bounding box.
fn nav_tiles_for_bounds(bounds: &BoundingBox, tiles_per_adt: i32) -> (i32, i32, i32, i32) {
    let tile_size = ADT_SIZE / tiles_per_adt as f32;
    let grid = ADT_GRID * tiles_per_adt;

    let tx0 = (((MAX_COORDINATE - bounds.max.y) / tile_size).floor() as i32).clamp(0, grid - 1);
    let tx1 = (((MAX_COORDINATE - bounds.min.y) / tile_size).floor() as i32).clamp(0, grid - 1);
    let ty0 = (((MAX_COORDINATE - bounds.max.x) / tile_size).floor() as i32).clamp(0, grid - 1);
    let ty1 = (((MAX_COORDINATE - bounds.min.x) / tile_size).floor() as i32).clamp(0, grid - 1);

    (tx0, ty0, tx1, ty1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilenav_parser::fixtures;

    fn builder_for_flat_map(adts: &[(i32, i32)]) -> (tempfile::TempDir, MeshBuilder) {
        let dir = tempfile::tempdir().unwrap();
        fixtures::install_flat_map(dir.path(), "plains", adts, 0.0).unwrap();
        let out = dir.path().join("nav");
        let data = Data::new(dir.path()).unwrap();
        let builder = MeshBuilder::new(data, out, "plains", MeshSettings::default()).unwrap();
        (dir, builder)
    }

    /// Drain the queue the way a worker does, but skip the voxel stage so
    /// the orchestration invariants can be checked without the native
    /// library.
    fn drain_without_voxels(builder: &MeshBuilder) {
        while let Some((tile_x, tile_y)) = builder.next_tile() {
            let prepared = builder.prepare_tile(tile_x, tile_y).unwrap();
            assert!(
                !prepared.geometry.solid.is_empty(),
                "flat terrain must produce triangles"
            );
            let output = TileOutput {
                tile_x,
                tile_y,
                heightfield: Vec::new(),
                blob: Vec::new(),
                wmo_ids: prepared.wmo_ids.clone(),
                doodad_ids: prepared.doodad_ids.clone(),
            };
            builder.remove_chunk_references(prepared.chunk_range);
            builder.add_tile_output(output).unwrap();
        }
    }

    #[test]
    fn test_queue_seeds_every_tile_of_known_adts() {
        let (_dir, builder) = builder_for_flat_map(&[(32, 32), (33, 32)]);
        assert_eq!(builder.total_tiles(), 2 * 8 * 8);
    }

    #[test]
    fn test_refcounts_balance_and_aggregators_drain() {
        let (dir, builder) = builder_for_flat_map(&[(32, 32)]);

        drain_without_voxels(&builder);

        assert!(builder.chunk_refs_all_zero());
        assert_eq!(builder.aggregators_in_progress(), 0);
        assert!((builder.percent_complete() - 1.0).abs() < 1e-6);
        // the ADT was unloaded once its last tile finished
        assert_eq!(builder.map().loaded_adt_count(), 0);

        let archive = dir.path().join("nav").join("plains").join("32_32.nav");
        assert!(archive.exists(), "completed ADT must be written");
        let tiles =
            meshfiles::read_archive(std::fs::read(&archive).unwrap(), "32_32.nav").unwrap();
        assert_eq!(tiles.len(), 64);
    }

    #[test]
    fn test_archive_bytes_are_reproducible() {
        let (dir_a, builder_a) = builder_for_flat_map(&[(32, 32)]);
        drain_without_voxels(&builder_a);

        let (dir_b, builder_b) = builder_for_flat_map(&[(32, 32)]);
        // consume in a scrambled order: pull everything, then process
        let mut tiles = Vec::new();
        while let Some(t) = builder_b.next_tile() {
            tiles.push(t);
        }
        tiles.reverse();
        for (tile_x, tile_y) in tiles {
            let prepared = builder_b.prepare_tile(tile_x, tile_y).unwrap();
            let output = TileOutput {
                tile_x,
                tile_y,
                heightfield: Vec::new(),
                blob: Vec::new(),
                wmo_ids: prepared.wmo_ids.clone(),
                doodad_ids: prepared.doodad_ids.clone(),
            };
            builder_b.remove_chunk_references(prepared.chunk_range);
            builder_b.add_tile_output(output).unwrap();
        }

        let a = std::fs::read(dir_a.path().join("nav").join("plains").join("32_32.nav")).unwrap();
        let b = std::fs::read(dir_b.path().join("nav").join("plains").join("32_32.nav")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_abort_drains_queue() {
        let (_dir, builder) = builder_for_flat_map(&[(32, 32)]);
        assert!(builder.next_tile().is_some());
        builder.abort();
        assert!(builder.next_tile().is_none());
    }

    #[test]
    fn test_corrupt_adt_fails_without_partial_aggregator() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::install_flat_map(dir.path(), "plains", &[(32, 32)], 0.0).unwrap();

        let adt_path = dir
            .path()
            .join("Maps")
            .join("plains")
            .join("plains_32_32.adt");
        let bytes = std::fs::read(&adt_path).unwrap();
        std::fs::write(&adt_path, &bytes[..100]).unwrap();

        let data = Data::new(dir.path()).unwrap();
        let builder =
            MeshBuilder::new(data, dir.path().join("nav"), "plains", MeshSettings::default())
                .unwrap();

        let (tile_x, tile_y) = builder.next_tile().unwrap();
        let result = builder.prepare_tile(tile_x, tile_y);
        assert!(matches!(result, Err(Error::Corrupt(_))));
        assert!(builder.chunk_refs_all_zero());
        assert_eq!(builder.aggregators_in_progress(), 0);
    }

    #[test]
    fn test_doodad_models_serialized_once() {
        let dir = tempfile::tempdir().unwrap();
        let map_dir = dir.path().join("Maps").join("plains");
        std::fs::create_dir_all(&map_dir).unwrap();

        let (vertices, indices) = fixtures::cube_soup(2.0);
        std::fs::write(
            dir.path().join("crate.m2"),
            fixtures::write_doodad_file(&vertices, &indices),
        )
        .unwrap();

        std::fs::write(map_dir.join("plains.wdt"), fixtures::write_wdt(&[(32, 32)])).unwrap();
        // the same doodad instance overlaps many chunks and tiles; its model
        // must be serialized exactly once
        std::fs::write(
            map_dir.join("plains_32_32.adt"),
            fixtures::write_adt(
                0.0,
                &["crate.m2"],
                &[fixtures::FixtureDoodad {
                    name_id: 0,
                    unique_id: 1,
                    position: tilenav_utility::math::Vec3::new(-266.0, -266.0, 1.0),
                    rotation: tilenav_utility::math::Vec3::new(0.0, 0.0, 0.0),
                    scale: 1.0,
                }],
                &[],
                &[],
                None,
            ),
        )
        .unwrap();

        let data = Data::new(dir.path()).unwrap();
        let builder =
            MeshBuilder::new(data, dir.path().join("nav"), "plains", MeshSettings::default())
                .unwrap();
        drain_without_voxels(&builder);

        let bvh_dir = dir.path().join("nav").join("bvh");
        let entries: Vec<_> = std::fs::read_dir(&bvh_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
