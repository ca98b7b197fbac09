// Runtime models and temporary obstacle instances.
//
// The runtime never parses game files; it reads the serialized AABB trees
// the builder wrote into the shared BVH area.  Models load on demand through
// a small LRU keyed by filename.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use tilenav_mapbuild::meshfiles::flatten_model_name;
use tilenav_utility::aabb_tree::AabbTree;
use tilenav_utility::math::{BoundingBox, Matrix, Vec3};
use tilenav_utility::stream::ByteStream;
use tilenav_utility::{Error, Result};

pub struct RuntimeModel {
    pub file_name: String,
    pub aabb_tree: AabbTree,
}

impl RuntimeModel {
    pub fn load(nav_dir: &Path, file_name: &str) -> Result<RuntimeModel> {
        let path = nav_dir.join("bvh").join(flatten_model_name(file_name));
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;

        let mut stream = ByteStream::wrap(bytes, file_name.to_string());
        Ok(RuntimeModel {
            file_name: file_name.to_string(),
            aabb_tree: AabbTree::deserialize(&mut stream)?,
        })
    }
}

/// LRU cache of runtime models, shared across the map.
pub struct ModelCache {
    capacity: usize,
    entries: HashMap<String, Arc<RuntimeModel>>,
    order: VecDeque<String>,
}

impl ModelCache {
    pub fn new(capacity: usize) -> ModelCache {
        ModelCache {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_or_load(&mut self, nav_dir: &Path, file_name: &str) -> Result<Arc<RuntimeModel>> {
        if let Some(model) = self.entries.get(file_name) {
            let model = model.clone();
            self.touch(file_name);
            return Ok(model);
        }

        let model = Arc::new(RuntimeModel::load(nav_dir, file_name)?);
        self.entries.insert(file_name.to_string(), model.clone());
        self.order.push_back(file_name.to_string());

        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }

        Ok(model)
    }

    fn touch(&mut self, file_name: &str) {
        if let Some(pos) = self.order.iter().position(|n| n == file_name) {
            self.order.remove(pos);
            self.order.push_back(file_name.to_string());
        }
    }
}

/// A doodad inserted at runtime.  Lives until explicit removal; every tile
/// it intersects holds a strong reference.
pub struct TemporaryDoodad {
    pub guid: u64,
    pub display_id: u32,
    pub model_file: String,
    pub transform: Matrix,
    pub bounds: BoundingBox,
    pub translated_vertices: Vec<Vec3>,
    pub model: Arc<RuntimeModel>,
}

impl TemporaryDoodad {
    pub fn new(
        guid: u64,
        display_id: u32,
        model: Arc<RuntimeModel>,
        transform: Matrix,
    ) -> TemporaryDoodad {
        let mut translated_vertices = Vec::with_capacity(model.aabb_tree.vertices().len());
        let mut bounds = BoundingBox::empty();
        for &v in model.aabb_tree.vertices() {
            let world = transform.transform(v);
            bounds.update(world);
            translated_vertices.push(world);
        }

        TemporaryDoodad {
            guid,
            display_id,
            model_file: model.file_name.clone(),
            transform,
            bounds,
            translated_vertices,
            model,
        }
    }
}

/// Parse the display-id to model-path table written beside the archives.
/// One entry per line: `<display id> <tab> <path>`.
pub fn parse_obstacle_paths(text: &str) -> HashMap<u32, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((id, path)) = line.split_once('\t') else {
            continue;
        };
        if let Ok(id) = id.trim().parse::<u32>() {
            out.insert(id, path.trim().to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_obstacle_paths() {
        let table = "# comment\n42\tdoodad\\crate.m2\n\n77\twmo\\keep.wmo\nbogus line\n";
        let parsed = parse_obstacle_paths(table);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&42], "doodad\\crate.m2");
        assert_eq!(parsed[&77], "wmo\\keep.wmo");
    }

    #[test]
    fn test_model_cache_evicts_least_recent() {
        let dir = tempfile::tempdir().unwrap();
        let bvh_dir = dir.path().join("bvh");
        std::fs::create_dir_all(&bvh_dir).unwrap();

        for name in ["a.m2", "b.m2", "c.m2"] {
            let tree = AabbTree::build(
                vec![
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                ],
                vec![0, 1, 2],
            );
            let mut stream = ByteStream::new();
            tree.serialize(&mut stream);
            std::fs::write(bvh_dir.join(flatten_model_name(name)), stream.contents()).unwrap();
        }

        let mut cache = ModelCache::new(2);
        cache.get_or_load(dir.path(), "a.m2").unwrap();
        cache.get_or_load(dir.path(), "b.m2").unwrap();
        // touch a so b becomes the eviction candidate
        cache.get_or_load(dir.path(), "a.m2").unwrap();
        cache.get_or_load(dir.path(), "c.m2").unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.entries.contains_key("a.m2"));
        assert!(cache.entries.contains_key("c.m2"));
        assert!(!cache.entries.contains_key("b.m2"));
    }

    #[test]
    fn test_missing_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bvh")).unwrap();
        let mut cache = ModelCache::new(4);
        assert!(matches!(
            cache.get_or_load(dir.path(), "nope.m2"),
            Err(Error::NotFound(_))
        ));
    }
}
