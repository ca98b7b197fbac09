// AABB tree over triangle soup.
//
// Median-split on the longest axis of the triangle centroids, leaves capped
// at a small triangle count.  The build is fully deterministic so serialized
// trees are byte-stable for identical input, which the model archive relies
// on.

use crate::math::{BoundingBox, Ray, Vec3};
use crate::stream::ByteStream;
use crate::{Error, Result};

const SERIAL_MAGIC: u32 = u32::from_le_bytes(*b"NAVT");
const SERIAL_VERSION: u32 = 1;

/// Triangles per leaf before splitting stops.
pub const DEFAULT_LEAF_SIZE: usize = 4;

#[derive(Clone, Copy, Debug)]
pub struct Hit {
    /// Ray parameter of the intersection.
    pub t: f32,
    /// Index of the intersected triangle (into indices()/3).
    pub triangle: usize,
}

#[derive(Clone, Debug)]
enum NodeKind {
    Branch { left: u32, right: u32 },
    Leaf { start: u32, count: u32 },
}

#[derive(Clone, Debug)]
struct Node {
    bounds: BoundingBox,
    kind: NodeKind,
}

#[derive(Clone, Debug)]
pub struct AabbTree {
    nodes: Vec<Node>,
    vertices: Vec<Vec3>,
    indices: Vec<u32>,
    // triangle ids in tree order; leaves reference ranges of this
    triangles: Vec<u32>,
}

impl AabbTree {
    pub fn build(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self::build_with_leaf_size(vertices, indices, DEFAULT_LEAF_SIZE)
    }

    pub fn build_with_leaf_size(vertices: Vec<Vec3>, indices: Vec<u32>, leaf_size: usize) -> Self {
        assert!(indices.len() % 3 == 0, "index count must be a multiple of 3");
        let triangle_count = indices.len() / 3;

        let mut tree = AabbTree {
            nodes: Vec::new(),
            vertices,
            indices,
            triangles: (0..triangle_count as u32).collect(),
        };

        if triangle_count > 0 {
            let bounds: Vec<BoundingBox> = (0..triangle_count)
                .map(|i| tree.triangle_bounds(i))
                .collect();
            let centroids: Vec<Vec3> = bounds.iter().map(|b| b.center()).collect();
            tree.subdivide(0, triangle_count, &bounds, &centroids, leaf_size.max(1));
        }

        tree
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn bounds(&self) -> BoundingBox {
        match self.nodes.first() {
            Some(root) => root.bounds,
            None => BoundingBox::empty(),
        }
    }

    fn triangle_bounds(&self, triangle: usize) -> BoundingBox {
        let i0 = self.indices[triangle * 3] as usize;
        let i1 = self.indices[triangle * 3 + 1] as usize;
        let i2 = self.indices[triangle * 3 + 2] as usize;
        let mut bounds = BoundingBox::from_point(self.vertices[i0]);
        bounds.update(self.vertices[i1]);
        bounds.update(self.vertices[i2]);
        bounds
    }

    /// Build the subtree over triangles[start..start+count].  Returns the
    /// index of the created node.
    fn subdivide(
        &mut self,
        start: usize,
        count: usize,
        bounds: &[BoundingBox],
        centroids: &[Vec3],
        leaf_size: usize,
    ) -> u32 {
        let mut node_bounds = BoundingBox::empty();
        for &t in &self.triangles[start..start + count] {
            node_bounds.merge(&bounds[t as usize]);
        }

        let node_index = self.nodes.len() as u32;
        self.nodes.push(Node {
            bounds: node_bounds,
            kind: NodeKind::Leaf {
                start: start as u32,
                count: count as u32,
            },
        });

        if count <= leaf_size {
            return node_index;
        }

        // longest axis of the centroid spread
        let mut lo = centroids[self.triangles[start] as usize];
        let mut hi = lo;
        for &t in &self.triangles[start..start + count] {
            lo = lo.min(centroids[t as usize]);
            hi = hi.max(centroids[t as usize]);
        }
        let spread = hi - lo;
        let axis = if spread.x >= spread.y && spread.x >= spread.z {
            0
        } else if spread.y >= spread.z {
            1
        } else {
            2
        };

        let key = |v: Vec3| match axis {
            0 => v.x,
            1 => v.y,
            _ => v.z,
        };

        // median split; ties fall back on the triangle id so the ordering is
        // total and the build deterministic
        let mid = count / 2;
        self.triangles[start..start + count].select_nth_unstable_by(mid, |&a, &b| {
            key(centroids[a as usize])
                .partial_cmp(&key(centroids[b as usize]))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let left = self.subdivide(start, mid, bounds, centroids, leaf_size);
        let right = self.subdivide(start + mid, count - mid, bounds, centroids, leaf_size);
        self.nodes[node_index as usize].kind = NodeKind::Branch { left, right };
        node_index
    }

    /// Nearest intersection along the ray.  Equal-distance hits resolve to
    /// the lowest triangle index.
    pub fn ray_cast(&self, ray: &Ray) -> Option<Hit> {
        if self.nodes.is_empty() {
            return None;
        }

        let mut best: Option<Hit> = None;
        let mut stack = vec![0u32];

        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];

            match ray.intersect_box(&node.bounds) {
                None => continue,
                Some(entry) => {
                    if let Some(hit) = best {
                        if entry > hit.t {
                            continue;
                        }
                    }
                }
            }

            match node.kind {
                NodeKind::Branch { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Leaf { start, count } => {
                    for &t in &self.triangles[start as usize..(start + count) as usize] {
                        if let Some(t_hit) = self.intersect_triangle(ray, t as usize) {
                            let better = match best {
                                None => true,
                                Some(hit) => {
                                    t_hit < hit.t
                                        || (t_hit == hit.t && (t as usize) < hit.triangle)
                                }
                            };
                            if better {
                                best = Some(Hit {
                                    t: t_hit,
                                    triangle: t as usize,
                                });
                            }
                        }
                    }
                }
            }
        }

        best
    }

    /// Moller-Trumbore, front and back faces.
    fn intersect_triangle(&self, ray: &Ray, triangle: usize) -> Option<f32> {
        let v0 = self.vertices[self.indices[triangle * 3] as usize];
        let v1 = self.vertices[self.indices[triangle * 3 + 1] as usize];
        let v2 = self.vertices[self.indices[triangle * 3 + 2] as usize];

        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let p = ray.direction.cross(e2);
        let det = e1.dot(p);

        if det.abs() < 1e-9 {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = ray.origin - v0;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(e1);
        let v = ray.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = e2.dot(q) * inv_det;
        if t >= 0.0 {
            Some(t)
        } else {
            None
        }
    }

    // ---- Serialization (model BVH archive) ----

    pub fn serialize(&self, out: &mut ByteStream) {
        out.write_u32(SERIAL_MAGIC);
        out.write_u32(SERIAL_VERSION);

        out.write_u32(self.nodes.len() as u32);
        for node in &self.nodes {
            out.write_bounds(&node.bounds);
            match node.kind {
                NodeKind::Branch { left, right } => {
                    out.write_u8(0);
                    out.write_u32(left);
                    out.write_u32(right);
                }
                NodeKind::Leaf { start, count } => {
                    out.write_u8(1);
                    out.write_u32(start);
                    out.write_u32(count);
                }
            }
        }

        out.write_u32(self.triangles.len() as u32);
        for &t in &self.triangles {
            out.write_u32(t);
        }

        out.write_u32(self.vertices.len() as u32);
        for v in &self.vertices {
            out.write_vec3(*v);
        }

        out.write_u32(self.indices.len() as u32);
        for &i in &self.indices {
            out.write_u32(i);
        }
    }

    pub fn deserialize(stream: &mut ByteStream) -> Result<Self> {
        let magic = stream.read_u32()?;
        if magic != SERIAL_MAGIC {
            return Err(Error::corrupt("bvh: bad magic"));
        }
        let version = stream.read_u32()?;
        if version != SERIAL_VERSION {
            return Err(Error::UnsupportedVersion {
                context: "bvh".to_string(),
                expected: SERIAL_VERSION,
                found: version,
            });
        }

        let node_count = stream.read_u32()? as usize;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let bounds = stream.read_bounds()?;
            let kind = match stream.read_u8()? {
                0 => NodeKind::Branch {
                    left: stream.read_u32()?,
                    right: stream.read_u32()?,
                },
                1 => NodeKind::Leaf {
                    start: stream.read_u32()?,
                    count: stream.read_u32()?,
                },
                other => {
                    return Err(Error::corrupt(format!("bvh: unknown node kind {}", other)))
                }
            };
            nodes.push(Node { bounds, kind });
        }

        let triangle_count = stream.read_u32()? as usize;
        let mut triangles = Vec::with_capacity(triangle_count);
        for _ in 0..triangle_count {
            triangles.push(stream.read_u32()?);
        }

        let vertex_count = stream.read_u32()? as usize;
        let mut vertices = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            vertices.push(stream.read_vec3()?);
        }

        let index_count = stream.read_u32()? as usize;
        let mut indices = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            indices.push(stream.read_u32()?);
        }

        Ok(AabbTree {
            nodes,
            vertices,
            indices,
            triangles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit quads in the z=0 plane arranged along x.
    fn quad_strip(quads: usize) -> (Vec<Vec3>, Vec<u32>) {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for q in 0..quads {
            let x = q as f32;
            let base = vertices.len() as u32;
            vertices.push(Vec3::new(x, 0.0, 0.0));
            vertices.push(Vec3::new(x + 1.0, 0.0, 0.0));
            vertices.push(Vec3::new(x + 1.0, 1.0, 0.0));
            vertices.push(Vec3::new(x, 1.0, 0.0));
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        (vertices, indices)
    }

    #[test]
    fn test_ray_hits_nearest_surface() {
        let (vertices, indices) = quad_strip(16);
        let tree = AabbTree::build(vertices, indices);

        let ray = Ray::new(Vec3::new(5.5, 0.5, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = tree.ray_cast(&ray).expect("expected a hit");
        assert!((hit.t - 10.0).abs() < 1e-4);
        // quad 5, first triangle of the pair
        assert_eq!(hit.triangle / 2, 5);
    }

    #[test]
    fn test_ray_miss() {
        let (vertices, indices) = quad_strip(4);
        let tree = AabbTree::build(vertices, indices);
        let ray = Ray::new(Vec3::new(-3.0, 0.5, 10.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(tree.ray_cast(&ray).is_none());
    }

    #[test]
    fn test_coincident_triangles_tie_break_low_index() {
        // two identical triangles; the cast must report the first
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let indices = vec![0, 1, 2, 0, 1, 2];
        let tree = AabbTree::build(vertices, indices);
        let ray = Ray::new(Vec3::new(0.25, 0.25, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = tree.ray_cast(&ray).unwrap();
        assert_eq!(hit.triangle, 0);
    }

    #[test]
    fn test_serialize_round_trip_is_byte_stable() {
        let (vertices, indices) = quad_strip(9);
        let tree = AabbTree::build(vertices, indices);

        let mut first = ByteStream::new();
        tree.serialize(&mut first);

        let mut reader = ByteStream::wrap(first.contents().to_vec(), "bvh");
        let restored = AabbTree::deserialize(&mut reader).unwrap();

        let mut second = ByteStream::new();
        restored.serialize(&mut second);
        assert_eq!(first.contents(), second.contents());

        // restored tree still answers queries
        let ray = Ray::new(Vec3::new(2.5, 0.5, 1.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(restored.ray_cast(&ray).is_some());
    }

    #[test]
    fn test_empty_soup() {
        let tree = AabbTree::build(Vec::new(), Vec::new());
        let ray = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(tree.ray_cast(&ray).is_none());
    }
}
