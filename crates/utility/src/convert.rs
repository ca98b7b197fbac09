// World / tile / chunk coordinate folding.
//
// The world grid is rotated a quarter turn relative to tile indices: world Y
// falls as tile X rises, and world X falls as tile Y rises.  Every conversion
// below must reproduce that fold exactly or terrain and models stop lining up.

use crate::math::{BoundingBox, Vec3};
use crate::{Error, Result, ADT_GRID, ADT_SIZE, CHUNK_GRID, CHUNK_SIZE, MAX_COORDINATE};

/// World position -> owning ADT tile.
pub fn world_to_adt(v: Vec3) -> Result<(i32, i32)> {
    let adt_x = ((MAX_COORDINATE - v.y) / ADT_SIZE).floor() as i32;
    let adt_y = ((MAX_COORDINATE - v.x) / ADT_SIZE).floor() as i32;

    if adt_x < 0 || adt_x >= ADT_GRID || adt_y < 0 || adt_y >= ADT_GRID {
        return Err(Error::Outside { x: v.x, y: v.y });
    }

    Ok((adt_x, adt_y))
}

/// World position -> owning ADT tile and chunk within it.
pub fn world_to_adt_chunk(v: Vec3) -> Result<(i32, i32, i32, i32)> {
    let (adt_x, adt_y) = world_to_adt(v)?;

    let adt_max_y = MAX_COORDINATE - adt_x as f32 * ADT_SIZE;
    let adt_max_x = MAX_COORDINATE - adt_y as f32 * ADT_SIZE;

    let chunk_x = (((adt_max_y - v.y) / CHUNK_SIZE) as i32).clamp(0, CHUNK_GRID - 1);
    let chunk_y = (((adt_max_x - v.x) / CHUNK_SIZE) as i32).clamp(0, CHUNK_GRID - 1);

    Ok((adt_x, adt_y, chunk_x, chunk_y))
}

/// Center of the given chunk, in world coordinates (z = 0).
pub fn adt_chunk_center(adt_x: i32, adt_y: i32, chunk_x: i32, chunk_y: i32) -> Vec3 {
    let y = MAX_COORDINATE - adt_x as f32 * ADT_SIZE - (chunk_x as f32 + 0.5) * CHUNK_SIZE;
    let x = MAX_COORDINATE - adt_y as f32 * ADT_SIZE - (chunk_y as f32 + 0.5) * CHUNK_SIZE;
    Vec3::new(x, y, 0.0)
}

/// Horizontal bounds of an ADT tile.  The vertical extent is unbounded since
/// it is only known once the terrain has been parsed.
pub fn adt_bounds(adt_x: i32, adt_y: i32) -> BoundingBox {
    let max_y = MAX_COORDINATE - adt_x as f32 * ADT_SIZE;
    let max_x = MAX_COORDINATE - adt_y as f32 * ADT_SIZE;
    BoundingBox::new(
        Vec3::new(max_x - ADT_SIZE, max_y - ADT_SIZE, f32::MIN),
        Vec3::new(max_x, max_y, f32::MAX),
    )
}

/// Horizontal bounds of one nav tile, given the nav tiles per ADT ratio.
pub fn nav_tile_bounds(tile_x: i32, tile_y: i32, tiles_per_adt: i32) -> BoundingBox {
    let tile_size = ADT_SIZE / tiles_per_adt as f32;
    let max_y = MAX_COORDINATE - tile_x as f32 * tile_size;
    let max_x = MAX_COORDINATE - tile_y as f32 * tile_size;
    BoundingBox::new(
        Vec3::new(max_x - tile_size, max_y - tile_size, f32::MIN),
        Vec3::new(max_x, max_y, f32::MAX),
    )
}

/// ADT tile -> the range of nav tiles covering it, inclusive start,
/// exclusive end.
pub fn adt_nav_tiles(adt_x: i32, adt_y: i32, tiles_per_adt: i32) -> (i32, i32, i32, i32) {
    (
        adt_x * tiles_per_adt,
        adt_y * tiles_per_adt,
        (adt_x + 1) * tiles_per_adt,
        (adt_y + 1) * tiles_per_adt,
    )
}

/// Nav tile -> owning ADT.
pub fn nav_tile_to_adt(tile_x: i32, tile_y: i32, tiles_per_adt: i32) -> (i32, i32) {
    (tile_x / tiles_per_adt, tile_y / tiles_per_adt)
}

/// World coordinates -> the voxel library's Y-up convention.
pub fn to_recast(v: Vec3) -> [f32; 3] {
    [-v.y, v.z, -v.x]
}

/// Voxel library coordinates -> world.
pub fn from_recast(v: [f32; 3]) -> Vec3 {
    Vec3::new(-v[2], -v[0], v[1])
}

/// Flatten a vertex list into the voxel library's interleaved layout.
pub fn vertices_to_recast(vertices: &[Vec3], out: &mut Vec<f32>) {
    out.reserve(vertices.len() * 3);
    for v in vertices {
        let r = to_recast(*v);
        out.extend_from_slice(&r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_center_round_trips() {
        for adt_x in [0, 1, 31, 32, 63] {
            for adt_y in [0, 17, 32, 63] {
                for chunk_x in [0, 7, 15] {
                    for chunk_y in [0, 8, 15] {
                        let center = adt_chunk_center(adt_x, adt_y, chunk_x, chunk_y);
                        let (ax, ay, cx, cy) = world_to_adt_chunk(center).unwrap();
                        assert_eq!(
                            (ax, ay, cx, cy),
                            (adt_x, adt_y, chunk_x, chunk_y),
                            "round trip failed for adt ({}, {}) chunk ({}, {})",
                            adt_x,
                            adt_y,
                            chunk_x,
                            chunk_y
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_world_axes_are_rotated() {
        // moving in -y must advance adt_x, moving in -x must advance adt_y
        let origin = Vec3::new(0.0, 0.0, 0.0);
        let (x0, y0) = world_to_adt(origin).unwrap();
        assert_eq!((x0, y0), (32, 32));

        let (x1, _) = world_to_adt(Vec3::new(0.0, -ADT_SIZE, 0.0)).unwrap();
        assert_eq!(x1, 33);

        let (_, y2) = world_to_adt(Vec3::new(-ADT_SIZE, 0.0, 0.0)).unwrap();
        assert_eq!(y2, 33);
    }

    #[test]
    fn test_outside_world_is_an_error() {
        let far = Vec3::new(MAX_COORDINATE * 2.0, 0.0, 0.0);
        assert!(matches!(world_to_adt(far), Err(Error::Outside { .. })));
    }

    #[test]
    fn test_recast_round_trip() {
        let v = Vec3::new(1.5, -2.5, 3.25);
        let r = to_recast(v);
        let back = from_recast(r);
        assert_eq!(v, back);
    }

    #[test]
    fn test_nav_tile_bounds_nest_in_adt() {
        let adt = adt_bounds(32, 48);
        let (tx0, ty0, tx1, ty1) = adt_nav_tiles(32, 48, 8);
        for tx in tx0..tx1 {
            for ty in ty0..ty1 {
                let tile = nav_tile_bounds(tx, ty, 8);
                assert!(tile.min.x >= adt.min.x - 1e-3 && tile.max.x <= adt.max.x + 1e-3);
                assert!(tile.min.y >= adt.min.y - 1e-3 && tile.max.y <= adt.max.y + 1e-3);
                assert_eq!(nav_tile_to_adt(tx, ty, 8), (32, 48));
            }
        }
    }
}
