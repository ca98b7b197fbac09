// Doodad (prop) models and their world placements.
//
// Collision geometry for a doodad is the bounding vertex/triangle soup
// addressed by count/offset pairs in the MD20 header; render data is never
// touched.

use std::collections::BTreeSet;
use std::sync::Arc;

use tilenav_utility::aabb_tree::AabbTree;
use tilenav_utility::convert;
use tilenav_utility::math::{BoundingBox, Matrix, Vec3};
use tilenav_utility::stream::ByteStream;
use tilenav_utility::{Error, Result};

use crate::AdtChunkLocation;

const MD20_MAGIC: &[u8; 4] = b"MD20";
const MD20_VERSION: u32 = 264;

pub struct DoodadModel {
    pub file_name: String,
    pub aabb_tree: AabbTree,
}

impl DoodadModel {
    pub fn parse(file_name: &str, stream: &mut ByteStream) -> Result<DoodadModel> {
        let magic = stream.read_bytes(4)?;
        if magic != MD20_MAGIC {
            return Err(Error::corrupt(format!("{}: bad MD20 magic", file_name)));
        }

        let version = stream.read_u32()?;
        if version != MD20_VERSION {
            return Err(Error::UnsupportedVersion {
                context: file_name.to_string(),
                expected: MD20_VERSION,
                found: version,
            });
        }

        let vertex_count = stream.read_u32()? as usize;
        let vertex_offset = stream.read_u32()? as usize;
        let index_count = stream.read_u32()? as usize;
        let index_offset = stream.read_u32()? as usize;

        if index_count % 3 != 0 {
            return Err(Error::corrupt(format!(
                "{}: collision index count not divisible by 3",
                file_name
            )));
        }

        stream.seek(vertex_offset)?;
        let mut vertices = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            vertices.push(stream.read_vec3()?);
        }

        stream.seek(index_offset)?;
        let mut indices = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            indices.push(stream.read_u16()? as u32);
        }

        Ok(DoodadModel {
            file_name: file_name.to_string(),
            aabb_tree: AabbTree::build(vertices, indices),
        })
    }
}

pub struct DoodadInstance {
    pub id: u32,
    pub model_file: String,
    pub transform: Matrix,
    pub bounds: BoundingBox,
    /// Model vertices pre-transformed into world space; indices come from
    /// the model's tree.
    pub translated_vertices: Vec<Vec3>,
    /// Chunks this instance overlaps, across all ADTs.
    pub adt_chunks: BTreeSet<AdtChunkLocation>,
    pub model: Arc<DoodadModel>,
}

impl DoodadInstance {
    pub fn new(id: u32, model: Arc<DoodadModel>, transform: Matrix) -> DoodadInstance {
        let mut translated_vertices = Vec::with_capacity(model.aabb_tree.vertices().len());
        let mut bounds = BoundingBox::empty();
        let mut adt_chunks = BTreeSet::new();

        for &v in model.aabb_tree.vertices() {
            let world = transform.transform(v);
            bounds.update(world);
            // geometry can poke past the edge of the world; those vertices
            // simply belong to no chunk
            if let Ok((adt_x, adt_y, chunk_x, chunk_y)) = convert::world_to_adt_chunk(world) {
                adt_chunks.insert(AdtChunkLocation {
                    adt_x: adt_x as u8,
                    adt_y: adt_y as u8,
                    chunk_x: chunk_x as u8,
                    chunk_y: chunk_y as u8,
                });
            }
            translated_vertices.push(world);
        }

        DoodadInstance {
            id,
            model_file: model.file_name.clone(),
            transform,
            bounds,
            translated_vertices,
            adt_chunks,
            model,
        }
    }

    /// World-space triangle soup for rasterization.
    pub fn build_triangles(&self, vertices: &mut Vec<Vec3>, indices: &mut Vec<u32>) {
        let offset = vertices.len() as u32;
        vertices.extend_from_slice(&self.translated_vertices);
        indices.extend(self.model.aabb_tree.indices().iter().map(|&i| i + offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_doodad_file;

    fn unit_quad() -> (Vec<Vec3>, Vec<u16>) {
        (
            vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_parse_round_trip() {
        let (vertices, indices) = unit_quad();
        let bytes = write_doodad_file(&vertices, &indices);
        let mut stream = ByteStream::wrap(bytes, "quad.m2");
        let model = DoodadModel::parse("quad.m2", &mut stream).unwrap();
        assert_eq!(model.aabb_tree.vertices().len(), 4);
        assert_eq!(model.aabb_tree.indices().len(), 6);
    }

    #[test]
    fn test_version_mismatch() {
        let (vertices, indices) = unit_quad();
        let mut bytes = write_doodad_file(&vertices, &indices);
        bytes[4..8].copy_from_slice(&263u32.to_le_bytes());
        let mut stream = ByteStream::wrap(bytes, "quad.m2");
        assert!(matches!(
            DoodadModel::parse("quad.m2", &mut stream),
            Err(Error::UnsupportedVersion { found: 263, .. })
        ));
    }

    #[test]
    fn test_instance_translates_and_folds_chunks() {
        let (vertices, indices) = unit_quad();
        let bytes = write_doodad_file(&vertices, &indices);
        let mut stream = ByteStream::wrap(bytes, "quad.m2");
        let model = Arc::new(DoodadModel::parse("quad.m2", &mut stream).unwrap());

        let transform = Matrix::translation(Vec3::new(100.0, 50.0, 20.0));
        let instance = DoodadInstance::new(7, model, transform);

        assert_eq!(instance.translated_vertices.len(), 4);
        assert!((instance.bounds.min.z - 20.0).abs() < 1e-5);
        assert!(!instance.adt_chunks.is_empty());
        // a 2x2 quad spans at most a few neighboring chunks
        assert!(instance.adt_chunks.len() <= 4);
    }
}
