// A loaded nav tile: the retained heightfield, the pristine archived
// snapshot it came from, the current navmesh blob and the temporary
// obstacles standing on it.
//
// Obstacle insertion rasterizes into the retained field; removal starts
// over from the pristine snapshot and re-rasterizes whatever remains.
// Voxels are never subtracted in place.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use tilenav_mapbuild::common::HeightfieldSnapshot;
use tilenav_mapbuild::pipeline;
use tilenav_mapbuild::settings::MeshSettings;
use tilenav_recast::{Context, Heightfield, NavMesh, TileRef};
use tilenav_utility::convert;
use tilenav_utility::math::BoundingBox;
use tilenav_utility::Result;

pub struct Tile {
    pub x: i32,
    pub y: i32,
    pub bounds: BoundingBox,
    /// The archived terrain voxels, never modified after load.
    snapshot: HeightfieldSnapshot,
    /// The live field: pristine terrain plus every current obstacle.
    heightfield: Heightfield,
    /// The blob currently inserted in the navmesh; empty when the tile has
    /// no navigable surface.
    blob: Vec<u8>,
    tile_ref: Option<TileRef>,
    temporary_doodads: HashMap<u64, Arc<crate::model::TemporaryDoodad>>,
}

impl Tile {
    /// Materialize a tile from its archive entry and insert its blob into
    /// the navmesh.
    pub fn load(
        ctx: &Context,
        settings: &MeshSettings,
        navmesh: &mut NavMesh,
        tile_x: i32,
        tile_y: i32,
        snapshot: HeightfieldSnapshot,
        blob: Vec<u8>,
    ) -> Result<Tile> {
        let heightfield = snapshot.restore(ctx)?;

        let mut bounds = convert::nav_tile_bounds(tile_x, tile_y, settings.tiles_per_adt);
        bounds.min.z = snapshot.bmin[1];
        bounds.max.z = snapshot.bmax[1];

        let tile_ref = if blob.is_empty() {
            None
        } else {
            Some(navmesh.add_tile(blob.clone())?)
        };

        Ok(Tile {
            x: tile_x,
            y: tile_y,
            bounds,
            snapshot,
            heightfield,
            blob,
            tile_ref,
            temporary_doodads: HashMap::new(),
        })
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn has_obstacle(&self, guid: u64) -> bool {
        self.temporary_doodads.contains_key(&guid)
    }

    pub fn obstacle_count(&self) -> usize {
        self.temporary_doodads.len()
    }

    /// Rasterize a new obstacle into the retained field and swap the
    /// navmesh tile.
    pub fn add_temporary_doodad(
        &mut self,
        ctx: &Context,
        settings: &MeshSettings,
        navmesh: &mut NavMesh,
        guid: u64,
        doodad: Arc<crate::model::TemporaryDoodad>,
    ) -> Result<()> {
        pipeline::rasterize_doodad(
            ctx,
            settings,
            &mut self.heightfield,
            &doodad.translated_vertices,
            doodad.model.aabb_tree.indices(),
        )?;
        pipeline::filter_with_terrain_preserved(ctx, settings, &mut self.heightfield);

        self.temporary_doodads.insert(guid, doodad);
        self.swap_navmesh_tile(ctx, settings, navmesh)
    }

    /// Drop an obstacle and rebuild the field from the pristine snapshot
    /// plus whatever obstacles remain.
    pub fn remove_temporary_doodad(
        &mut self,
        ctx: &Context,
        settings: &MeshSettings,
        navmesh: &mut NavMesh,
        guid: u64,
    ) -> Result<()> {
        if self.temporary_doodads.remove(&guid).is_none() {
            return Ok(());
        }

        let mut heightfield = self.snapshot.restore(ctx)?;

        if !self.temporary_doodads.is_empty() {
            // deterministic order so the result is independent of the
            // removal history
            let mut remaining: Vec<_> = self.temporary_doodads.values().cloned().collect();
            remaining.sort_by_key(|d| d.guid);

            for doodad in &remaining {
                pipeline::rasterize_doodad(
                    ctx,
                    settings,
                    &mut heightfield,
                    &doodad.translated_vertices,
                    doodad.model.aabb_tree.indices(),
                )?;
            }
            pipeline::filter_with_terrain_preserved(ctx, settings, &mut heightfield);
        }

        self.heightfield = heightfield;
        self.swap_navmesh_tile(ctx, settings, navmesh)
    }

    /// Produce a fresh blob from the current field and atomically replace
    /// the navmesh tile: remove the old ref, insert the new one, all under
    /// the caller's navmesh write lock.
    fn swap_navmesh_tile(
        &mut self,
        ctx: &Context,
        settings: &MeshSettings,
        navmesh: &mut NavMesh,
    ) -> Result<()> {
        let blob = pipeline::finish_tile(ctx, settings, &self.heightfield, self.x, self.y)?;

        if let Some(old_ref) = self.tile_ref.take() {
            navmesh.remove_tile(old_ref)?;
        }

        match blob {
            Some(blob) => {
                self.tile_ref = Some(navmesh.add_tile(blob.clone())?);
                self.blob = blob;
            }
            None => {
                debug!("tile ({}, {}) has no navigable surface left", self.x, self.y);
                self.blob = Vec::new();
            }
        }

        Ok(())
    }
}
