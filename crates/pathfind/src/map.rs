// The runtime navigation map: archives on disk in, path queries and
// temporary obstacle operations out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use tilenav_mapbuild::common::{poly_flags, HeightfieldSnapshot};
use tilenav_mapbuild::meshfiles::{self, TileOutput};
use tilenav_mapbuild::settings::MeshSettings;
use tilenav_mapbuild::GAMEOBJECT_PATHS_FILE;
use tilenav_recast::{Context, NavMesh, NavMeshParams, NavMeshQuery};
use tilenav_utility::convert;
use tilenav_utility::math::{Matrix, Vec3};
use tilenav_utility::{Error, Result, ADT_GRID, MAX_COORDINATE};

use crate::model::{parse_obstacle_paths, ModelCache, TemporaryDoodad};
use crate::tile::Tile;

/// Query node pool size.
const MAX_QUERY_NODES: i32 = 2048;
/// Polygon corridor length cap.
const MAX_PATH_POLYS: usize = 256;
/// Straight path vertex cap.
const MAX_STRAIGHT_POINTS: usize = 256;
/// Nearest-poly search extents in the voxel library's axes.
const QUERY_EXTENTS: [f32; 3] = [5.0, 500.0, 5.0];

/// Shared model cache capacity.
const MODEL_CACHE_CAPACITY: usize = 64;

pub struct Map {
    map_name: String,
    nav_dir: PathBuf,
    map_dir: PathBuf,
    settings: MeshSettings,

    navmesh: RwLock<NavMesh>,
    tiles: RwLock<HashMap<(i32, i32), Tile>>,

    /// Serializes obstacle operations; tile and navmesh writes happen under
    /// this lock.
    obstacle_op: Mutex<()>,
    obstacles: RwLock<HashMap<u64, Arc<TemporaryDoodad>>>,
    obstacle_paths: HashMap<u32, String>,
    models: Mutex<ModelCache>,

    has_global_wmo: bool,
    global_loaded: RwLock<bool>,
}

impl Map {
    /// Open a built map.  Archives are located but no tiles are loaded yet.
    pub fn load(maps_dir: &Path, map_name: &str, settings: MeshSettings) -> Result<Map> {
        let map_dir = maps_dir.join(map_name);
        if !map_dir.is_dir() {
            return Err(Error::NotFound(map_dir.display().to_string()));
        }

        let navmesh = NavMesh::new(&runtime_navmesh_params(&settings))?;

        let obstacle_paths = {
            let path = map_dir.join(GAMEOBJECT_PATHS_FILE);
            match std::fs::read_to_string(&path) {
                Ok(text) => parse_obstacle_paths(&text),
                Err(_) => HashMap::new(),
            }
        };

        let has_global_wmo = map_dir.join(meshfiles::GLOBAL_ARCHIVE_NAME).exists();

        info!(
            "{}: opened ({} obstacle paths{})",
            map_name,
            obstacle_paths.len(),
            if has_global_wmo { ", global WMO" } else { "" }
        );

        Ok(Map {
            map_name: map_name.to_string(),
            nav_dir: maps_dir.to_path_buf(),
            map_dir,
            settings,
            navmesh: RwLock::new(navmesh),
            tiles: RwLock::new(HashMap::new()),
            obstacle_op: Mutex::new(()),
            obstacles: RwLock::new(HashMap::new()),
            obstacle_paths,
            models: Mutex::new(ModelCache::new(MODEL_CACHE_CAPACITY)),
            has_global_wmo,
            global_loaded: RwLock::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.map_name
    }

    pub fn has_global_wmo(&self) -> bool {
        self.has_global_wmo
    }

    pub fn loaded_tile_count(&self) -> usize {
        self.tiles.read().len()
    }

    pub fn temporary_obstacle_count(&self) -> usize {
        self.obstacles.read().len()
    }

    /// Current navmesh blob of a loaded tile; empty when nothing walkable.
    pub fn tile_blob(&self, tile_x: i32, tile_y: i32) -> Option<Vec<u8>> {
        self.tiles
            .read()
            .get(&(tile_x, tile_y))
            .map(|t| t.blob().to_vec())
    }

    /// Load every nav tile of one ADT.  Returns false when no archive
    /// exists for it.
    pub fn load_adt(&self, adt_x: i32, adt_y: i32) -> Result<bool> {
        if self.has_global_wmo {
            return Err(Error::Unsupported(
                "global WMO maps have no ADTs to load",
            ));
        }
        if adt_x < 0 || adt_x >= ADT_GRID || adt_y < 0 || adt_y >= ADT_GRID {
            return Err(Error::Outside {
                x: adt_x as f32,
                y: adt_y as f32,
            });
        }

        let path = self.map_dir.join(meshfiles::adt_archive_name(adt_x, adt_y));
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Error::Io(e)),
        };

        let entries = meshfiles::read_archive(bytes, &path.display().to_string())?;
        self.insert_tiles(entries)?;
        Ok(true)
    }

    /// Load the tiles of a global-WMO map.
    pub fn load_global_wmo(&self) -> Result<bool> {
        if !self.has_global_wmo {
            return Ok(false);
        }
        {
            let loaded = self.global_loaded.read();
            if *loaded {
                return Ok(true);
            }
        }

        let path = self.map_dir.join(meshfiles::GLOBAL_ARCHIVE_NAME);
        let bytes = std::fs::read(&path)?;
        let entries = meshfiles::read_archive(bytes, &path.display().to_string())?;
        self.insert_tiles(entries)?;
        *self.global_loaded.write() = true;
        Ok(true)
    }

    fn insert_tiles(&self, entries: Vec<TileOutput>) -> Result<()> {
        let ctx = Context::new()?;
        let _op = self.obstacle_op.lock();
        let mut tiles = self.tiles.write();
        let mut navmesh = self.navmesh.write();

        for entry in entries {
            if entry.heightfield.is_empty() {
                continue; // tile had no geometry at build time
            }
            if tiles.contains_key(&(entry.tile_x, entry.tile_y)) {
                continue;
            }

            let snapshot = HeightfieldSnapshot::from_bytes(&entry.heightfield)?;
            let tile = Tile::load(
                &ctx,
                &self.settings,
                &mut navmesh,
                entry.tile_x,
                entry.tile_y,
                snapshot,
                entry.blob,
            )?;
            tiles.insert((entry.tile_x, entry.tile_y), tile);
        }

        debug!("{}: {} tiles loaded", self.map_name, tiles.len());
        Ok(())
    }

    /// A* over the navmesh plus straight-path extraction.  Ok(None) means
    /// no path connects the points.
    pub fn find_path(&self, start: Vec3, end: Vec3, smooth: bool) -> Result<Option<Vec<Vec3>>> {
        let navmesh = self.navmesh.read();
        let query = NavMeshQuery::new(&navmesh, MAX_QUERY_NODES)?;

        let start_r = convert::to_recast(start);
        let end_r = convert::to_recast(end);

        let include = poly_flags::QUERY_INCLUDE;
        let Some((start_ref, start_pt)) =
            query.find_nearest_poly(start_r, QUERY_EXTENTS, include, 0)?
        else {
            return Ok(None);
        };
        let Some((end_ref, end_pt)) = query.find_nearest_poly(end_r, QUERY_EXTENTS, include, 0)?
        else {
            return Ok(None);
        };

        let polys = query.find_path(
            start_ref,
            end_ref,
            start_pt,
            end_pt,
            include,
            0,
            MAX_PATH_POLYS,
        )?;
        if polys.is_empty() {
            return Ok(None);
        }

        let mut points =
            query.find_straight_path(start_pt, end_pt, &polys, MAX_STRAIGHT_POINTS)?;
        if points.is_empty() {
            return Ok(None);
        }

        if smooth {
            for point in points.iter_mut() {
                if let Some((poly, projected)) =
                    query.find_nearest_poly(*point, [1.0, 50.0, 1.0], include, 0)?
                {
                    if let Some(height) = query.poly_height(poly, projected)? {
                        point[1] = height;
                    }
                }
            }
        }

        let mut path: Vec<Vec3> = Vec::with_capacity(points.len());
        for point in points {
            let world = convert::from_recast(point);
            if path.last() != Some(&world) {
                path.push(world);
            }
        }

        Ok(Some(path))
    }

    /// Insert a temporary obstacle rotated around Z by `orientation`.
    pub fn add_game_object(
        &self,
        guid: u64,
        display_id: u32,
        position: Vec3,
        orientation: f32,
    ) -> Result<()> {
        self.add_game_object_transformed(
            guid,
            display_id,
            position,
            Matrix::rotation_z(orientation),
        )
    }

    /// Insert a temporary obstacle with an explicit rotation matrix.
    pub fn add_game_object_transformed(
        &self,
        guid: u64,
        display_id: u32,
        position: Vec3,
        rotation: Matrix,
    ) -> Result<()> {
        let _op = self.obstacle_op.lock();

        if self.obstacles.read().contains_key(&guid) {
            return Err(Error::AlreadyExists(guid));
        }

        let entry = self.obstacle_paths.get(&display_id).ok_or_else(|| {
            Error::NotFound(format!("display id {} has no model path", display_id))
        })?;

        // the leading path segment discriminates the model kind; the rest is
        // the model filename inside the shared BVH area
        match entry.chars().next() {
            Some('d') | Some('D') => {}
            _ => return Err(Error::Unsupported("temporary WMO obstacles")),
        }
        let model_file = entry
            .split_once(|c| c == '\\' || c == '/')
            .map(|(_, rest)| rest)
            .unwrap_or(entry.as_str());

        let model = self
            .models
            .lock()
            .get_or_load(&self.nav_dir, model_file)?;

        let transform = Matrix::translation(position).multiply(&rotation);
        let doodad = Arc::new(TemporaryDoodad::new(guid, display_id, model, transform));

        let ctx = Context::new()?;
        let mut tiles = self.tiles.write();
        let mut navmesh = self.navmesh.write();

        let affected: Vec<(i32, i32)> = tiles
            .iter()
            .filter(|(_, tile)| tile.bounds.intersects_2d(&doodad.bounds))
            .map(|(coord, _)| *coord)
            .collect();

        let mut processed: Vec<(i32, i32)> = Vec::new();
        let mut failure = None;
        for coord in &affected {
            let Some(tile) = tiles.get_mut(coord) else {
                continue;
            };
            match tile.add_temporary_doodad(&ctx, &self.settings, &mut navmesh, guid, doodad.clone())
            {
                Ok(()) => processed.push(*coord),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            // put every touched tile back the way it was
            for coord in &processed {
                if let Some(tile) = tiles.get_mut(coord) {
                    let _ = tile.remove_temporary_doodad(&ctx, &self.settings, &mut navmesh, guid);
                }
            }
            return Err(err);
        }

        self.obstacles.write().insert(guid, doodad);
        debug!(
            "{}: game object {:#x} added, {} tiles rebuilt",
            self.map_name,
            guid,
            affected.len()
        );
        Ok(())
    }

    /// Remove a temporary obstacle and rebuild the tiles it touched.
    pub fn remove_game_object(&self, guid: u64) -> Result<()> {
        let _op = self.obstacle_op.lock();

        if self.obstacles.write().remove(&guid).is_none() {
            warn!("{}: game object {:#x} is not present", self.map_name, guid);
            return Ok(());
        }

        let ctx = Context::new()?;
        let mut tiles = self.tiles.write();
        let mut navmesh = self.navmesh.write();

        for tile in tiles.values_mut() {
            if tile.has_obstacle(guid) {
                tile.remove_temporary_doodad(&ctx, &self.settings, &mut navmesh, guid)?;
            }
        }

        debug!("{}: game object {:#x} removed", self.map_name, guid);
        Ok(())
    }
}

fn runtime_navmesh_params(settings: &MeshSettings) -> NavMeshParams {
    NavMeshParams {
        origin: [-MAX_COORDINATE, -4096.0, -MAX_COORDINATE],
        tile_width: settings.tile_size(),
        tile_height: settings.tile_size(),
        max_tiles: 4096,
        max_polys: 1 << 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_map_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Map::load(dir.path(), "nowhere", MeshSettings::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[cfg(not(feature = "recast"))]
    #[test]
    fn test_load_without_native_library_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("plains")).unwrap();
        assert!(matches!(
            Map::load(dir.path(), "plains", MeshSettings::default()),
            Err(Error::VoxelLibraryFailure(_))
        ));
    }
}
