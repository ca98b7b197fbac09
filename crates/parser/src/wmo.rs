// WMO (building) models: root file, group files, embedded doodad sets and
// group liquids.

use std::collections::BTreeSet;
use std::sync::Arc;

use tilenav_utility::aabb_tree::AabbTree;
use tilenav_utility::convert;
use tilenav_utility::math::{BoundingBox, Matrix, Vec3};
use tilenav_utility::stream::{tag, ByteStream};
use tilenav_utility::{Error, Result, CHUNK_SIZE};

use crate::data::Data;
use crate::AdtChunkLocation;

const WMO_VERSION: u32 = 17;

const MVER: u32 = tag(b"MVER");
const MOHD: u32 = tag(b"MOHD");
const MODS: u32 = tag(b"MODS");
const MODN: u32 = tag(b"MODN");
const MODD: u32 = tag(b"MODD");
const MOGP: u32 = tag(b"MOGP");
const MOVT: u32 = tag(b"MOVT");
const MOVI: u32 = tag(b"MOVI");
const MLIQ: u32 = tag(b"MLIQ");

/// Liquid grid cell edge inside WMO groups.
const LIQUID_TILE_SIZE: f32 = CHUNK_SIZE / 8.0;

/// One embedded doodad placement, model-local.
#[derive(Clone, Debug)]
pub struct WmoDoodadPlacement {
    pub model_file: String,
    pub transform: Matrix,
}

pub struct WmoModel {
    pub file_name: String,
    pub aabb_tree: AabbTree,
    /// Liquid surfaces from all groups, model-local.
    pub liquid_vertices: Vec<Vec3>,
    pub liquid_indices: Vec<u32>,
    pub doodad_sets: Vec<Vec<WmoDoodadPlacement>>,
}

impl WmoModel {
    /// Parse the root file and every group file it references.
    pub fn parse(data: &Data, file_name: &str) -> Result<WmoModel> {
        let mut root = data.open(file_name)?;

        expect_version(&mut root, file_name)?;

        let mohd_size = root
            .find_chunk(MOHD)?
            .ok_or_else(|| Error::corrupt(format!("{}: missing MOHD", file_name)))?;
        if mohd_size < 8 {
            return Err(Error::corrupt(format!("{}: short MOHD", file_name)));
        }
        let group_count = root.read_u32()? as usize;
        let doodad_set_count = root.read_u32()? as usize;
        root.skip(mohd_size - 8)?;

        // doodad sets: name[20] start count pad
        let mut set_ranges = Vec::with_capacity(doodad_set_count);
        if let Some(size) = root.find_chunk(MODS)? {
            let entries = size / 32;
            for _ in 0..entries {
                root.skip(20)?;
                let start = root.read_u32()? as usize;
                let count = root.read_u32()? as usize;
                root.skip(4)?;
                set_ranges.push((start, count));
            }
        }

        // doodad name table
        let mut doodad_names = Vec::new();
        if let Some(size) = root.find_chunk(MODN)? {
            let mut table = ByteStream::wrap(root.read_bytes(size)?, format!("{}: MODN", file_name));
            while table.remaining() > 0 {
                doodad_names.push(table.read_cstring()?);
            }
        }

        // doodad placements: name_id pos quat scale color, 40 bytes each
        let mut placements = Vec::new();
        if let Some(size) = root.find_chunk(MODD)? {
            let entries = size / 40;
            for _ in 0..entries {
                // the high byte of the name field carries flags
                let name_id = (root.read_u32()? & 0x00FF_FFFF) as usize;
                let position = root.read_vec3()?;
                let qx = root.read_f32()?;
                let qy = root.read_f32()?;
                let qz = root.read_f32()?;
                let qw = root.read_f32()?;
                let scale = root.read_f32()?;
                root.skip(4)?; // color

                let name = doodad_names.get(name_id).ok_or_else(|| {
                    Error::corrupt(format!("{}: MODD references name {}", file_name, name_id))
                })?;

                let transform = Matrix::translation(position)
                    .multiply(&Matrix::from_quaternion(qx, qy, qz, qw))
                    .multiply(&Matrix::scaling(scale));

                placements.push(WmoDoodadPlacement {
                    model_file: name.clone(),
                    transform,
                });
            }
        }

        let mut doodad_sets = Vec::with_capacity(set_ranges.len());
        for (start, count) in set_ranges {
            let end = (start + count).min(placements.len());
            doodad_sets.push(placements.get(start..end).unwrap_or(&[]).to_vec());
        }

        // group geometry
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut liquid_vertices = Vec::new();
        let mut liquid_indices = Vec::new();

        let base = file_name
            .strip_suffix(".wmo")
            .or_else(|| file_name.strip_suffix(".WMO"))
            .unwrap_or(file_name);

        for group in 0..group_count {
            let group_name = format!("{}_{:03}.wmo", base, group);
            let mut stream = data.open(&group_name)?;
            parse_group(
                &mut stream,
                &group_name,
                &mut vertices,
                &mut indices,
                &mut liquid_vertices,
                &mut liquid_indices,
            )?;
        }

        Ok(WmoModel {
            file_name: file_name.to_string(),
            aabb_tree: AabbTree::build(vertices, indices),
            liquid_vertices,
            liquid_indices,
            doodad_sets,
        })
    }
}

fn expect_version(stream: &mut ByteStream, context: &str) -> Result<()> {
    let size = stream
        .find_chunk(MVER)?
        .ok_or_else(|| Error::corrupt(format!("{}: missing MVER", context)))?;
    if size != 4 {
        return Err(Error::corrupt(format!("{}: bad MVER size", context)));
    }
    let version = stream.read_u32()?;
    if version != WMO_VERSION {
        return Err(Error::UnsupportedVersion {
            context: context.to_string(),
            expected: WMO_VERSION,
            found: version,
        });
    }
    Ok(())
}

fn parse_group(
    stream: &mut ByteStream,
    context: &str,
    vertices: &mut Vec<Vec3>,
    indices: &mut Vec<u32>,
    liquid_vertices: &mut Vec<Vec3>,
    liquid_indices: &mut Vec<u32>,
) -> Result<()> {
    expect_version(stream, context)?;

    let mogp_size = stream
        .find_chunk(MOGP)?
        .ok_or_else(|| Error::corrupt(format!("{}: missing MOGP", context)))?;
    let mut body = ByteStream::wrap(stream.read_bytes(mogp_size)?, context.to_string());

    // group header: flags + bounds
    body.skip(4)?;
    body.read_bounds()?;

    let vertex_offset = vertices.len() as u32;
    let mut group_indices: Vec<u32> = Vec::new();

    while let Some(header) = body.read_chunk_header()? {
        match header.tag {
            MOVT => {
                let count = header.size / 12;
                for _ in 0..count {
                    vertices.push(body.read_vec3()?);
                }
            }
            MOVI => {
                let count = header.size / 2;
                for _ in 0..count {
                    group_indices.push(body.read_u16()? as u32 + vertex_offset);
                }
            }
            MLIQ => {
                parse_group_liquid(&mut body, context, liquid_vertices, liquid_indices)?;
            }
            _ => body.skip(header.size)?,
        }
    }

    if group_indices.len() % 3 != 0 {
        return Err(Error::corrupt(format!(
            "{}: group index count not divisible by 3",
            context
        )));
    }

    indices.extend(group_indices);
    Ok(())
}

fn parse_group_liquid(
    body: &mut ByteStream,
    context: &str,
    liquid_vertices: &mut Vec<Vec3>,
    liquid_indices: &mut Vec<u32>,
) -> Result<()> {
    let verts_x = body.read_u32()? as usize;
    let verts_y = body.read_u32()? as usize;
    let tiles_x = body.read_u32()? as usize;
    let tiles_y = body.read_u32()? as usize;
    let corner = body.read_vec3()?;

    if verts_x != tiles_x + 1 || verts_y != tiles_y + 1 {
        return Err(Error::corrupt(format!("{}: inconsistent MLIQ grid", context)));
    }

    let mut heights = Vec::with_capacity(verts_x * verts_y);
    for _ in 0..verts_x * verts_y {
        heights.push(body.read_f32()?);
    }
    let flags = body.read_bytes(tiles_x * tiles_y)?;

    let offset = liquid_vertices.len() as u32;
    for y in 0..verts_y {
        for x in 0..verts_x {
            liquid_vertices.push(Vec3::new(
                corner.x + x as f32 * LIQUID_TILE_SIZE,
                corner.y + y as f32 * LIQUID_TILE_SIZE,
                heights[y * verts_x + x],
            ));
        }
    }

    for y in 0..tiles_y {
        for x in 0..tiles_x {
            // 0xF marks a dead cell
            if flags[y * tiles_x + x] & 0x0F == 0x0F {
                continue;
            }
            let v0 = offset + (y * verts_x + x) as u32;
            let v1 = v0 + 1;
            let v2 = offset + ((y + 1) * verts_x + x + 1) as u32;
            let v3 = offset + ((y + 1) * verts_x + x) as u32;
            liquid_indices.extend_from_slice(&[v0, v2, v1, v0, v3, v2]);
        }
    }

    Ok(())
}

pub struct WmoInstance {
    pub id: u32,
    pub model_file: String,
    pub doodad_set: u16,
    pub transform: Matrix,
    pub bounds: BoundingBox,
    pub adt_chunks: BTreeSet<AdtChunkLocation>,
    /// Ids of the doodad instances spawned from the chosen doodad set.
    pub embedded_doodads: Vec<u32>,
    pub model: Arc<WmoModel>,
}

impl WmoInstance {
    pub fn new(id: u32, doodad_set: u16, model: Arc<WmoModel>, transform: Matrix) -> WmoInstance {
        let mut bounds = BoundingBox::empty();
        let mut adt_chunks = BTreeSet::new();

        for &v in model.aabb_tree.vertices() {
            let world = transform.transform(v);
            bounds.update(world);
            if let Ok((adt_x, adt_y, chunk_x, chunk_y)) = convert::world_to_adt_chunk(world) {
                adt_chunks.insert(AdtChunkLocation {
                    adt_x: adt_x as u8,
                    adt_y: adt_y as u8,
                    chunk_x: chunk_x as u8,
                    chunk_y: chunk_y as u8,
                });
            }
        }

        WmoInstance {
            id,
            model_file: model.file_name.clone(),
            doodad_set,
            transform,
            bounds,
            adt_chunks,
            embedded_doodads: Vec::new(),
            model,
        }
    }

    /// World-space solid triangle soup.
    pub fn build_triangles(&self, vertices: &mut Vec<Vec3>, indices: &mut Vec<u32>) {
        let offset = vertices.len() as u32;
        vertices.extend(
            self.model
                .aabb_tree
                .vertices()
                .iter()
                .map(|&v| self.transform.transform(v)),
        );
        indices.extend(self.model.aabb_tree.indices().iter().map(|&i| i + offset));
    }

    /// World-space liquid triangle soup.
    pub fn build_liquid_triangles(&self, vertices: &mut Vec<Vec3>, indices: &mut Vec<u32>) {
        let offset = vertices.len() as u32;
        vertices.extend(
            self.model
                .liquid_vertices
                .iter()
                .map(|&v| self.transform.transform(v)),
        );
        indices.extend(self.model.liquid_indices.iter().map(|&i| i + offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn parse_with_placements(placements: &[fixtures::FixtureWmoDoodad]) -> WmoModel {
        let dir = tempfile::tempdir().unwrap();
        let (vertices, indices) = fixtures::cube_soup(4.0);
        let files = fixtures::write_wmo_files_with_doodads(
            "keep",
            &vertices,
            &indices,
            &["bench.m2", "tree.m2"],
            placements,
        );
        for (name, bytes) in files {
            std::fs::write(dir.path().join(&name), bytes).unwrap();
        }

        let data = Data::new(dir.path()).unwrap();
        WmoModel::parse(&data, "keep.wmo").unwrap()
    }

    #[test]
    fn test_parse_without_doodad_sets() {
        let model = parse_with_placements(&[]);
        assert!(model.doodad_sets.is_empty());
        assert_eq!(model.aabb_tree.vertices().len(), 8);
        assert_eq!(model.aabb_tree.indices().len(), 36);
    }

    #[test]
    fn test_doodad_set_records_stay_aligned() {
        let origin = Vec3::new(0.0, 0.0, 0.0);
        let model = parse_with_placements(&[
            fixtures::FixtureWmoDoodad {
                name_id: 0,
                position: Vec3::new(1.0, 2.0, 3.0),
                scale: 1.0,
            },
            // flag bits in the high byte of the name field
            fixtures::FixtureWmoDoodad {
                name_id: 0x0100_0000 | 1,
                position: Vec3::new(-5.0, 0.0, 2.5),
                scale: 0.5,
            },
            fixtures::FixtureWmoDoodad {
                name_id: 0,
                position: Vec3::new(8.0, -1.0, 0.0),
                scale: 2.0,
            },
        ]);

        assert_eq!(model.doodad_sets.len(), 1);
        let set = &model.doodad_sets[0];
        assert_eq!(set.len(), 3);

        assert_eq!(set[0].model_file, "bench.m2");
        // the flag byte is masked off the name index
        assert_eq!(set[1].model_file, "tree.m2");
        assert_eq!(set[2].model_file, "bench.m2");

        // records beyond the first read from the right offsets
        let p1 = set[1].transform.transform(origin);
        assert!((p1.x + 5.0).abs() < 1e-5);
        assert!(p1.y.abs() < 1e-5);
        assert!((p1.z - 2.5).abs() < 1e-5);

        let p2 = set[2].transform.transform(origin);
        assert!((p2.x - 8.0).abs() < 1e-5);
        assert!((p2.y + 1.0).abs() < 1e-5);

        // scale rides through the placement transform
        let unit = set[2].transform.transform(Vec3::new(1.0, 0.0, 0.0));
        assert!((unit.x - 10.0).abs() < 1e-4);
    }
}
