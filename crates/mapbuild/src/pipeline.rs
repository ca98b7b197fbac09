// The voxel pipeline: triangle soup in, serialized heightfield + navmesh
// tile blob out.
//
// Two passes here diverge from the voxel library's stock behavior and
// together encode the movement rule that NPCs walk terrain of any slope but
// climb buildings and props only up to walkableClimb:
//
//  - the ledge filter runs with terrain span areas saved and restored, so
//    terrain is exempt from ledge culling;
//  - the compact heightfield is built with an effectively infinite climb and
//    a custom pass then severs connections exceeding walkableClimb unless
//    both sides are terrain.

use tilenav_recast::{
    clear_unwalkable_triangles, CompactHeightfield, Context, ContourSet, Heightfield, PolyMesh,
    PolyMeshDetail, TileParams,
};
use tilenav_utility::convert;
use tilenav_utility::math::Vec3;
use tilenav_utility::{Error, Result};

use crate::common::{area, poly_flags, HeightfieldSnapshot};
use crate::settings::MeshSettings;

/// Triangles in the voxel library's coordinate convention, one area byte per
/// triangle.
#[derive(Default)]
pub struct TriangleBatch {
    pub vertices: Vec<f32>,
    pub indices: Vec<i32>,
    pub areas: Vec<u8>,
}

impl TriangleBatch {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Append a world-space soup under a single area class.
    pub fn push_world(&mut self, vertices: &[Vec3], indices: &[u32], area_flag: u8) {
        let offset = (self.vertices.len() / 3) as i32;
        convert::vertices_to_recast(vertices, &mut self.vertices);
        self.indices
            .extend(indices.iter().map(|&i| i as i32 + offset));
        self.areas
            .extend(std::iter::repeat(area_flag).take(indices.len() / 3));
    }
}

/// Everything rasterized into one tile.
#[derive(Default)]
pub struct TileGeometry {
    /// Terrain, WMO and doodad triangles; slope-filtered.
    pub solid: TriangleBatch,
    /// Liquid surfaces; never slope-filtered.
    pub liquid: TriangleBatch,
}

/// Build output for one tile.  Both buffers are empty when the tile has no
/// geometry; `blob` alone is empty when voxels exist but nothing walkable
/// survived.
pub struct TileMesh {
    pub snapshot: Vec<u8>,
    pub blob: Vec<u8>,
}

impl TileMesh {
    pub fn empty() -> TileMesh {
        TileMesh {
            snapshot: Vec::new(),
            blob: Vec::new(),
        }
    }
}

/// Run the full pipeline for one nav tile.
pub fn build_tile(
    ctx: &Context,
    settings: &MeshSettings,
    tile_x: i32,
    tile_y: i32,
    geometry: &TileGeometry,
) -> Result<TileMesh> {
    if geometry.solid.is_empty() && geometry.liquid.is_empty() {
        return Ok(TileMesh::empty());
    }

    let (bmin, bmax) = tile_field_bounds(settings, tile_x, tile_y, geometry);
    let field_size = settings.field_size();

    let mut heightfield = Heightfield::new(
        ctx,
        field_size,
        field_size,
        bmin,
        bmax,
        settings.cell_size(),
        settings.cell_height,
    )?;

    if !geometry.solid.is_empty() {
        let mut areas = geometry.solid.areas.clone();
        clear_unwalkable_triangles(
            ctx,
            settings.walkable_slope,
            &geometry.solid.vertices,
            &geometry.solid.indices,
            &mut areas,
        );
        heightfield.rasterize_triangles(
            ctx,
            &geometry.solid.vertices,
            &geometry.solid.indices,
            &areas,
            settings.voxel_walkable_climb,
        )?;
    }

    if !geometry.liquid.is_empty() {
        heightfield.rasterize_triangles(
            ctx,
            &geometry.liquid.vertices,
            &geometry.liquid.indices,
            &geometry.liquid.areas,
            settings.voxel_walkable_climb,
        )?;
    }

    filter_with_terrain_preserved(ctx, settings, &mut heightfield);

    let snapshot = HeightfieldSnapshot::capture(
        &heightfield,
        bmin,
        bmax,
        settings.cell_size(),
        settings.cell_height,
    );

    let blob = finish_tile(ctx, settings, &heightfield, tile_x, tile_y)?;

    Ok(TileMesh {
        snapshot: snapshot.to_bytes(),
        blob: blob.unwrap_or_default(),
    })
}

/// Heightfield bounds for a tile: the tile's 2D extent plus the border
/// apron, vertical range from the geometry.
fn tile_field_bounds(
    settings: &MeshSettings,
    tile_x: i32,
    tile_y: i32,
    geometry: &TileGeometry,
) -> ([f32; 3], [f32; 3]) {
    let bounds = convert::nav_tile_bounds(tile_x, tile_y, settings.tiles_per_adt);
    let pad = settings.border_size() as f32 * settings.cell_size();

    let mut min_y = f32::MAX;
    let mut max_y = f32::MIN;
    for batch in [&geometry.solid, &geometry.liquid] {
        for v in batch.vertices.chunks_exact(3) {
            min_y = min_y.min(v[1]);
            max_y = max_y.max(v[1]);
        }
    }
    if min_y > max_y {
        min_y = 0.0;
        max_y = 0.0;
    }

    (
        [
            -bounds.max.y - pad,
            min_y - settings.cell_height,
            -bounds.max.x - pad,
        ],
        [
            -bounds.min.y + pad,
            max_y + settings.cell_height,
            -bounds.min.x + pad,
        ],
    )
}

/// Rasterize one doodad's world-space triangles into an existing field.
/// Used by the runtime when temporary obstacles change.
pub fn rasterize_doodad(
    ctx: &Context,
    settings: &MeshSettings,
    heightfield: &mut Heightfield,
    world_vertices: &[Vec3],
    indices: &[u32],
) -> Result<()> {
    let mut batch = TriangleBatch::default();
    batch.push_world(world_vertices, indices, area::DOODAD);

    clear_unwalkable_triangles(
        ctx,
        settings.walkable_slope,
        &batch.vertices,
        &batch.indices,
        &mut batch.areas,
    );
    heightfield.rasterize_triangles(
        ctx,
        &batch.vertices,
        &batch.indices,
        &batch.areas,
        settings.voxel_walkable_climb,
    )
}

/// The stock span filters, with terrain spans exempted from ledge culling:
/// save every span carrying the terrain bit, run the ledge filter, then put
/// the bit back.
pub fn filter_with_terrain_preserved(
    ctx: &Context,
    settings: &MeshSettings,
    heightfield: &mut Heightfield,
) {
    let columns = heightfield.width() * heightfield.height();

    let mut terrain_spans: Vec<(i32, Vec<usize>)> = Vec::new();
    for column in 0..columns {
        let spans = heightfield.column_spans(column);
        let indices: Vec<usize> = spans
            .iter()
            .enumerate()
            .filter(|(_, s)| s.area & area::ADT != 0)
            .map(|(i, _)| i)
            .collect();
        if !indices.is_empty() {
            terrain_spans.push((column, indices));
        }
    }

    heightfield.filter_ledge_spans(
        ctx,
        settings.voxel_walkable_height,
        settings.voxel_walkable_climb,
    );

    for (column, indices) in terrain_spans {
        let spans = heightfield.column_spans(column);
        for index in indices {
            heightfield.set_span_area(column, index, spans[index].area | area::ADT);
        }
    }

    heightfield.filter_walkable_low_height_spans(ctx, settings.voxel_walkable_height);
    heightfield.filter_low_hanging_walkable_obstacles(ctx, settings.voxel_walkable_climb);
}

/// Steps from heightfield compaction to the finished navmesh blob.  Returns
/// None when the tile has no navigable surface.
pub fn finish_tile(
    ctx: &Context,
    settings: &MeshSettings,
    heightfield: &Heightfield,
    tile_x: i32,
    tile_y: i32,
) -> Result<Option<Vec<u8>>> {
    // climb is enforced by the custom pass below, not by compaction
    let mut chf = CompactHeightfield::build(
        ctx,
        settings.voxel_walkable_height,
        i32::MAX,
        heightfield,
    )?;

    selectively_enforce_walkable_climb(&mut chf, settings.voxel_walkable_climb);

    chf.build_distance_field(ctx)?;
    chf.build_regions(
        ctx,
        settings.border_size(),
        settings.min_region_size * settings.min_region_size,
        settings.merge_region_size * settings.merge_region_size,
    )?;

    let cset = ContourSet::build(
        ctx,
        &chf,
        settings.max_simplification_error,
        settings.max_edge_len(),
    )?;
    if cset.count() == 0 {
        return Ok(None);
    }

    let mut pmesh = PolyMesh::build(ctx, &cset, settings.vertices_per_polygon)?;
    if pmesh.vertex_count() >= 0xFFFF {
        return Err(Error::TooManyVerts { tile_x, tile_y });
    }

    let dmesh = PolyMeshDetail::build(
        ctx,
        &pmesh,
        &chf,
        settings.detail_sample_distance,
        settings.detail_sample_max_error,
    )?;

    for poly in 0..pmesh.poly_count() {
        let poly_area = pmesh.area(poly);
        if poly_area != 0 {
            pmesh.set_flags(poly, poly_flags::WALKABLE | poly_area as u16);
        }
    }

    let params = TileParams {
        tile_x,
        tile_y,
        walkable_height: settings.walkable_height_world(),
        walkable_radius: settings.walkable_radius_world(),
        walkable_climb: settings.walkable_climb_world(),
        cell_size: settings.cell_size(),
        cell_height: settings.cell_height,
    };

    tilenav_recast::create_nav_mesh_data(&pmesh, &dmesh, &params)
}

/// The voxel library supports one walkable climb value; NPCs need climb
/// enforcement on buildings and props while walking terrain of any slope.
/// The compact field is built with an unbounded climb and this pass severs
/// every connection whose height delta exceeds the limit, unless both spans
/// are terrain.
pub fn selectively_enforce_walkable_climb(chf: &mut CompactHeightfield, walkable_climb: i32) {
    let (width, height, _) = chf.dims();

    for y in 0..height {
        for x in 0..width {
            let (first, count) = chf.cell(y * width + x);

            for span in first as i32..(first + count) as i32 {
                let (span_y, span_area) = chf.span_info(span);

                for dir in 0..4 {
                    let Some(neighbor) = chf.connection(x, y, span, dir) else {
                        continue;
                    };
                    let (neighbor_y, neighbor_area) = chf.span_info(neighbor);

                    if (neighbor_y as i32 - span_y as i32).abs() <= walkable_climb {
                        continue;
                    }

                    if span_area & area::ADT != 0 && neighbor_area & area::ADT != 0 {
                        continue;
                    }

                    chf.sever_connection(span, dir);
                }
            }
        }
    }
}
