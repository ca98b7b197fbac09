// ADT terrain tiles.
//
// A tile is 16x16 chunks; each chunk carries a 9x9 outer + 8x8 center height
// grid, a hole bitmap, an optional liquid layer, and the ids of every model
// instance overlapping it.  Terrain triangles fan around the center vertex,
// four per quad, skipping holes.

use tilenav_utility::convert;
use tilenav_utility::math::{BoundingBox, Vec3};
use tilenav_utility::stream::{tag, ByteStream};
use tilenav_utility::{Error, Result, ADT_SIZE, CHUNK_GRID, CHUNK_SIZE, MAX_COORDINATE};

const ADT_VERSION: u32 = 18;

const MVER: u32 = tag(b"MVER");
const MMDX: u32 = tag(b"MMDX");
const MWMO: u32 = tag(b"MWMO");
const MDDF: u32 = tag(b"MDDF");
const MODF: u32 = tag(b"MODF");
const MCNK: u32 = tag(b"MCNK");
const MCVT: u32 = tag(b"MCVT");
const MCLQ: u32 = tag(b"MCLQ");

/// Outer height grid side (9x9), center grid side (8x8).
const OUTER: usize = 9;
const INNER: usize = 8;
const UNIT: f32 = CHUNK_SIZE / INNER as f32;

/// A doodad placement read from MDDF, before instance creation.
#[derive(Clone, Debug)]
pub struct DoodadPlacement {
    pub name_id: usize,
    pub unique_id: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
}

/// A WMO placement read from MODF.
#[derive(Clone, Debug)]
pub struct WmoPlacement {
    pub name_id: usize,
    pub unique_id: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub doodad_set: u16,
}

/// Everything parsed straight out of the file; the map layer resolves
/// placements into instances and fills the chunk id lists.
pub struct AdtFile {
    pub doodad_names: Vec<String>,
    pub wmo_names: Vec<String>,
    pub doodad_placements: Vec<DoodadPlacement>,
    pub wmo_placements: Vec<WmoPlacement>,
    pub adt: Adt,
}

pub struct AdtChunk {
    pub hole_map: [[bool; INNER]; INNER],
    /// Chunk-local vertex/index soup, world space.
    pub terrain_vertices: Vec<Vec3>,
    pub terrain_indices: Vec<u32>,
    pub liquid_vertices: Vec<Vec3>,
    pub liquid_indices: Vec<u32>,
    pub wmo_instances: Vec<u32>,
    pub doodad_instances: Vec<u32>,
    pub area_id: u32,
    pub min_z: f32,
    pub max_z: f32,
}

pub struct Adt {
    pub x: i32,
    pub y: i32,
    pub bounds: BoundingBox,
    chunks: Vec<AdtChunk>,
}

impl Adt {
    pub fn chunk(&self, chunk_x: i32, chunk_y: i32) -> &AdtChunk {
        &self.chunks[(chunk_y * CHUNK_GRID + chunk_x) as usize]
    }

    pub(crate) fn chunk_mut(&mut self, chunk_x: i32, chunk_y: i32) -> &mut AdtChunk {
        &mut self.chunks[(chunk_y * CHUNK_GRID + chunk_x) as usize]
    }

    pub fn chunks(&self) -> impl Iterator<Item = &AdtChunk> {
        self.chunks.iter()
    }

    pub fn parse(stream: &mut ByteStream, adt_x: i32, adt_y: i32, context: &str) -> Result<AdtFile> {
        let size = stream
            .find_chunk(MVER)?
            .ok_or_else(|| Error::corrupt(format!("{}: missing MVER", context)))?;
        if size != 4 {
            return Err(Error::corrupt(format!("{}: bad MVER size", context)));
        }
        let version = stream.read_u32()?;
        if version != ADT_VERSION {
            return Err(Error::UnsupportedVersion {
                context: context.to_string(),
                expected: ADT_VERSION,
                found: version,
            });
        }

        let mut doodad_names = Vec::new();
        let mut wmo_names = Vec::new();
        let mut doodad_placements = Vec::new();
        let mut wmo_placements = Vec::new();
        let mut chunks: Vec<Option<AdtChunk>> = Vec::with_capacity(256);
        chunks.resize_with(256, || None);

        let mut min_z = f32::MAX;
        let mut max_z = f32::MIN;

        while let Some(header) = stream.read_chunk_header()? {
            match header.tag {
                MMDX => {
                    let mut table =
                        ByteStream::wrap(stream.read_bytes(header.size)?, context.to_string());
                    while table.remaining() > 0 {
                        doodad_names.push(table.read_cstring()?);
                    }
                }
                MWMO => {
                    let mut table =
                        ByteStream::wrap(stream.read_bytes(header.size)?, context.to_string());
                    while table.remaining() > 0 {
                        wmo_names.push(table.read_cstring()?);
                    }
                }
                MDDF => {
                    let entries = header.size / 36;
                    for _ in 0..entries {
                        let name_id = stream.read_u32()? as usize;
                        let unique_id = stream.read_u32()?;
                        let position = stream.read_vec3()?;
                        let rotation = stream.read_vec3()?;
                        let scale = stream.read_u16()? as f32 / 1024.0;
                        stream.skip(2)?; // flags
                        doodad_placements.push(DoodadPlacement {
                            name_id,
                            unique_id,
                            position,
                            rotation,
                            scale,
                        });
                    }
                }
                MODF => {
                    let entries = header.size / 64;
                    for _ in 0..entries {
                        let name_id = stream.read_u32()? as usize;
                        let unique_id = stream.read_u32()?;
                        let position = stream.read_vec3()?;
                        let rotation = stream.read_vec3()?;
                        stream.skip(24)?; // placement bounds, recomputed from geometry
                        stream.skip(2)?; // flags
                        let doodad_set = stream.read_u16()?;
                        stream.skip(4)?; // name set + padding
                        wmo_placements.push(WmoPlacement {
                            name_id,
                            unique_id,
                            position,
                            rotation,
                            doodad_set,
                        });
                    }
                }
                MCNK => {
                    let body =
                        ByteStream::wrap(stream.read_bytes(header.size)?, context.to_string());
                    let (index_x, index_y, chunk) =
                        parse_chunk(body, adt_x, adt_y, context)?;
                    min_z = min_z.min(chunk.min_z);
                    max_z = max_z.max(chunk.max_z);
                    chunks[index_y * CHUNK_GRID as usize + index_x] = Some(chunk);
                }
                _ => stream.skip(header.size)?,
            }
        }

        let chunks: Vec<AdtChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, c)| match c {
                Some(chunk) => Ok(chunk),
                None => Err(Error::corrupt(format!(
                    "{}: missing chunk {} of 256",
                    context, i
                ))),
            })
            .collect::<Result<_>>()?;

        if min_z > max_z {
            min_z = 0.0;
            max_z = 0.0;
        }

        let mut bounds = convert::adt_bounds(adt_x, adt_y);
        bounds.min.z = min_z;
        bounds.max.z = max_z;

        Ok(AdtFile {
            doodad_names,
            wmo_names,
            doodad_placements,
            wmo_placements,
            adt: Adt {
                x: adt_x,
                y: adt_y,
                bounds,
                chunks,
            },
        })
    }
}

/// Parse one MCNK body: fixed header, then MCVT / MCLQ sub-chunks.
fn parse_chunk(
    mut body: ByteStream,
    adt_x: i32,
    adt_y: i32,
    context: &str,
) -> Result<(usize, usize, AdtChunk)> {
    let index_x = body.read_u32()? as usize;
    let index_y = body.read_u32()? as usize;
    let area_id = body.read_u32()?;
    let holes = body.read_u32()?;
    let position_z = body.read_f32()?;

    if index_x >= CHUNK_GRID as usize || index_y >= CHUNK_GRID as usize {
        return Err(Error::corrupt(format!(
            "{}: chunk index ({}, {}) out of range",
            context, index_x, index_y
        )));
    }

    let mut hole_map = [[false; INNER]; INNER];
    for hole_y in 0..4 {
        for hole_x in 0..4 {
            if holes & (1 << (hole_y * 4 + hole_x)) != 0 {
                for dy in 0..2 {
                    for dx in 0..2 {
                        hole_map[hole_y * 2 + dy][hole_x * 2 + dx] = true;
                    }
                }
            }
        }
    }

    // chunk-local origin (maximum world x/y corner)
    let chunk_max_y = MAX_COORDINATE - adt_x as f32 * ADT_SIZE - index_x as f32 * CHUNK_SIZE;
    let chunk_max_x = MAX_COORDINATE - adt_y as f32 * ADT_SIZE - index_y as f32 * CHUNK_SIZE;

    let mut chunk = AdtChunk {
        hole_map,
        terrain_vertices: Vec::new(),
        terrain_indices: Vec::new(),
        liquid_vertices: Vec::new(),
        liquid_indices: Vec::new(),
        wmo_instances: Vec::new(),
        doodad_instances: Vec::new(),
        area_id,
        min_z: f32::MAX,
        max_z: f32::MIN,
    };

    while let Some(header) = body.read_chunk_header()? {
        match header.tag {
            MCVT => {
                if header.size != (OUTER * OUTER + INNER * INNER) * 4 {
                    return Err(Error::corrupt(format!("{}: bad MCVT size", context)));
                }

                // outer 9x9 grid first
                for row in 0..OUTER {
                    for col in 0..OUTER {
                        let z = position_z + body.read_f32()?;
                        chunk.terrain_vertices.push(Vec3::new(
                            chunk_max_x - row as f32 * UNIT,
                            chunk_max_y - col as f32 * UNIT,
                            z,
                        ));
                    }
                }

                // center 8x8 grid
                for row in 0..INNER {
                    for col in 0..INNER {
                        let z = position_z + body.read_f32()?;
                        chunk.terrain_vertices.push(Vec3::new(
                            chunk_max_x - (row as f32 + 0.5) * UNIT,
                            chunk_max_y - (col as f32 + 0.5) * UNIT,
                            z,
                        ));
                    }
                }

                // 4 triangles fanned around each quad center
                for row in 0..INNER {
                    for col in 0..INNER {
                        if chunk.hole_map[row][col] {
                            continue;
                        }

                        let tl = (row * OUTER + col) as u32;
                        let tr = tl + 1;
                        let bl = ((row + 1) * OUTER + col) as u32;
                        let br = bl + 1;
                        let center = (OUTER * OUTER + row * INNER + col) as u32;

                        chunk.terrain_indices.extend_from_slice(&[
                            tl, center, tr, tr, center, br, br, center, bl, bl, center, tl,
                        ]);
                    }
                }
            }
            MCLQ => {
                if header.size != OUTER * OUTER * 4 + INNER * INNER {
                    return Err(Error::corrupt(format!("{}: bad MCLQ size", context)));
                }

                let mut heights = [0.0f32; OUTER * OUTER];
                for h in heights.iter_mut() {
                    *h = body.read_f32()?;
                }
                let flags = body.read_bytes(INNER * INNER)?;

                let offset = chunk.liquid_vertices.len() as u32;
                for row in 0..OUTER {
                    for col in 0..OUTER {
                        chunk.liquid_vertices.push(Vec3::new(
                            chunk_max_x - row as f32 * UNIT,
                            chunk_max_y - col as f32 * UNIT,
                            heights[row * OUTER + col],
                        ));
                    }
                }

                for row in 0..INNER {
                    for col in 0..INNER {
                        if flags[row * INNER + col] & 0x0F == 0x0F {
                            continue;
                        }
                        let v0 = offset + (row * OUTER + col) as u32;
                        let v1 = v0 + 1;
                        let v2 = offset + ((row + 1) * OUTER + col + 1) as u32;
                        let v3 = offset + ((row + 1) * OUTER + col) as u32;
                        chunk
                            .liquid_indices
                            .extend_from_slice(&[v0, v2, v1, v0, v3, v2]);
                    }
                }
            }
            _ => body.skip(header.size)?,
        }
    }

    for v in chunk.terrain_vertices.iter().chain(&chunk.liquid_vertices) {
        chunk.min_z = chunk.min_z.min(v.z);
        chunk.max_z = chunk.max_z.max(v.z);
    }
    if chunk.min_z > chunk.max_z {
        chunk.min_z = 0.0;
        chunk.max_z = 0.0;
    }

    Ok((index_x, index_y, chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn chunk_body(holes: u32, liquid: Option<f32>) -> ByteStream {
        let mut body = ByteStream::new();
        body.write_u32(3); // index x
        body.write_u32(5); // index y
        body.write_u32(12); // area id
        body.write_u32(holes);
        body.write_f32(100.0); // base height

        let heights = [0u8; (OUTER * OUTER + INNER * INNER) * 4];
        body.append(&fixtures::chunk(b"MCVT", &heights));

        if let Some(level) = liquid {
            let mut liq = ByteStream::new();
            for _ in 0..OUTER * OUTER {
                liq.write_f32(level);
            }
            liq.append(&[0u8; INNER * INNER]);
            body.append(&fixtures::chunk(b"MCLQ", liq.contents()));
        }

        ByteStream::wrap(body.into_inner(), "chunk")
    }

    #[test]
    fn test_chunk_without_holes_or_liquid() {
        let (index_x, index_y, chunk) = parse_chunk(chunk_body(0, None), 32, 32, "test").unwrap();
        assert_eq!((index_x, index_y), (3, 5));
        assert_eq!(chunk.area_id, 12);
        assert_eq!(chunk.terrain_vertices.len(), OUTER * OUTER + INNER * INNER);
        // 64 quads, 4 triangles each
        assert_eq!(chunk.terrain_indices.len(), 64 * 4 * 3);
        assert!(chunk.liquid_vertices.is_empty());
        assert!((chunk.min_z - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_hole_bit_skips_its_quads() {
        // one hole bit covers a 2x2 quad block
        let (_, _, chunk) = parse_chunk(chunk_body(1, None), 32, 32, "test").unwrap();
        assert!(chunk.hole_map[0][0] && chunk.hole_map[1][1]);
        assert!(!chunk.hole_map[0][2] && !chunk.hole_map[2][0]);
        assert_eq!(chunk.terrain_indices.len(), (64 - 4) * 4 * 3);
    }

    #[test]
    fn test_liquid_layer_emits_quads() {
        let (_, _, chunk) = parse_chunk(chunk_body(0, Some(105.0)), 32, 32, "test").unwrap();
        assert_eq!(chunk.liquid_vertices.len(), OUTER * OUTER);
        assert_eq!(chunk.liquid_indices.len(), 64 * 2 * 3);
        assert!((chunk.max_z - 105.0).abs() < 1e-4);
        assert!(chunk.liquid_vertices.iter().all(|v| (v.z - 105.0).abs() < 1e-4));
    }
}
