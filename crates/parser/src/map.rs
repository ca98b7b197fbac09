// The parsed world: WDT table of contents, lazily-parsed ADTs, and the
// central arenas owning every model and instance.
//
// Instances hold stable integer ids and chunks store id lists, so the object
// graph stays acyclic: Map -> arenas -> models, Adt -> chunk -> ids.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use tilenav_utility::math::{Matrix, Vec3};
use tilenav_utility::stream::{tag, ByteStream};
use tilenav_utility::{Error, Result, ADT_GRID};

use crate::adt::{Adt, AdtFile};
use crate::data::Data;
use crate::doodad::{DoodadInstance, DoodadModel};
use crate::wmo::{WmoInstance, WmoModel};

const WDT_VERSION: u32 = 18;

const MVER: u32 = tag(b"MVER");
const MPHD: u32 = tag(b"MPHD");
const MAIN: u32 = tag(b"MAIN");
const MWMO: u32 = tag(b"MWMO");
const MODF: u32 = tag(b"MODF");

/// MPHD flag: the map is a single global WMO instead of terrain.
const MPHD_GLOBAL_WMO: u32 = 0x1;

/// Instance id reserved for the global WMO.
pub const GLOBAL_WMO_ID: u32 = u32::MAX;

/// First id handed to doodads embedded in WMO doodad sets; MDDF unique ids
/// live well below this.
const SYNTHETIC_ID_BASE: u32 = 0x8000_0000;

pub struct Map {
    name: String,
    data: Data,
    has_adt: Box<[[bool; ADT_GRID as usize]; ADT_GRID as usize]>,

    adts: RwLock<HashMap<(i32, i32), Arc<Adt>>>,

    wmo_models: RwLock<HashMap<String, Arc<WmoModel>>>,
    doodad_models: RwLock<HashMap<String, Arc<DoodadModel>>>,
    wmo_instances: RwLock<HashMap<u32, Arc<WmoInstance>>>,
    doodad_instances: RwLock<HashMap<u32, Arc<DoodadInstance>>>,

    global_wmo: Option<Arc<WmoInstance>>,

    next_synthetic_id: AtomicU32,
}

impl Map {
    /// Parse the top-level world file and enumerate ADTs.  No terrain is
    /// parsed until it is asked for.
    pub fn open(data: Data, map_name: &str) -> Result<Map> {
        let wdt_name = format!("Maps/{0}/{0}.wdt", map_name);
        let mut stream = data.open(&wdt_name)?;

        let size = stream
            .find_chunk(MVER)?
            .ok_or_else(|| Error::corrupt(format!("{}: missing MVER", wdt_name)))?;
        if size != 4 {
            return Err(Error::corrupt(format!("{}: bad MVER size", wdt_name)));
        }
        let version = stream.read_u32()?;
        if version != WDT_VERSION {
            return Err(Error::UnsupportedVersion {
                context: wdt_name,
                expected: WDT_VERSION,
                found: version,
            });
        }

        let mut flags = 0u32;
        if let Some(size) = stream.find_chunk(MPHD)? {
            flags = stream.read_u32()?;
            stream.skip(size - 4)?;
        }

        let mut has_adt = Box::new([[false; ADT_GRID as usize]; ADT_GRID as usize]);
        let size = stream
            .find_chunk(MAIN)?
            .ok_or_else(|| Error::corrupt(format!("{}: missing MAIN", wdt_name)))?;
        if size != (ADT_GRID * ADT_GRID * 8) as usize {
            return Err(Error::corrupt(format!("{}: bad MAIN size", wdt_name)));
        }
        for adt_y in 0..ADT_GRID as usize {
            for adt_x in 0..ADT_GRID as usize {
                let entry_flags = stream.read_u32()?;
                stream.skip(4)?;
                has_adt[adt_x][adt_y] = entry_flags & 0x1 != 0;
            }
        }

        let mut map = Map {
            name: map_name.to_string(),
            data,
            has_adt,
            adts: RwLock::new(HashMap::new()),
            wmo_models: RwLock::new(HashMap::new()),
            doodad_models: RwLock::new(HashMap::new()),
            wmo_instances: RwLock::new(HashMap::new()),
            doodad_instances: RwLock::new(HashMap::new()),
            global_wmo: None,
            next_synthetic_id: AtomicU32::new(SYNTHETIC_ID_BASE),
        };

        if flags & MPHD_GLOBAL_WMO != 0 {
            let size = stream
                .find_chunk(MWMO)?
                .ok_or_else(|| Error::corrupt(format!("{}.wdt: missing MWMO", map_name)))?;
            let mut table = ByteStream::wrap(stream.read_bytes(size)?, "MWMO");
            let wmo_name = table.read_cstring()?;

            stream
                .find_chunk(MODF)?
                .ok_or_else(|| Error::corrupt(format!("{}.wdt: missing MODF", map_name)))?;
            stream.skip(8)?; // name id + unique id, fixed for the global wmo
            let position = stream.read_vec3()?;
            let rotation = stream.read_vec3()?;
            stream.skip(26)?;
            let doodad_set = stream.read_u16()?;

            let model = map.ensure_wmo_model(&wmo_name)?;
            let transform = placement_transform(position, rotation, 1.0);
            let mut instance = WmoInstance::new(GLOBAL_WMO_ID, doodad_set, model, transform);
            instance.embedded_doodads =
                map.create_embedded_doodads(&instance.model, doodad_set, &instance.transform)?;
            let instance = Arc::new(instance);
            map.wmo_instances
                .get_mut()
                .insert(GLOBAL_WMO_ID, instance.clone());
            map.global_wmo = Some(instance);
        }

        Ok(map)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn has_adt(&self, adt_x: i32, adt_y: i32) -> bool {
        if adt_x < 0 || adt_x >= ADT_GRID || adt_y < 0 || adt_y >= ADT_GRID {
            return false;
        }
        self.has_adt[adt_x as usize][adt_y as usize]
    }

    /// Some maps are a single building rather than open terrain.
    pub fn global_wmo_instance(&self) -> Option<Arc<WmoInstance>> {
        self.global_wmo.clone()
    }

    pub fn get_wmo_instance(&self, id: u32) -> Option<Arc<WmoInstance>> {
        self.wmo_instances.read().get(&id).cloned()
    }

    pub fn get_doodad_instance(&self, id: u32) -> Option<Arc<DoodadInstance>> {
        self.doodad_instances.read().get(&id).cloned()
    }

    pub fn loaded_adt_count(&self) -> usize {
        self.adts.read().len()
    }

    /// Get (parsing on first request) the ADT at the given grid coordinate.
    pub fn get_adt(&self, adt_x: i32, adt_y: i32) -> Result<Arc<Adt>> {
        if !self.has_adt(adt_x, adt_y) {
            return Err(Error::NotFound(format!(
                "{}: no ADT at ({}, {})",
                self.name, adt_x, adt_y
            )));
        }

        if let Some(adt) = self.adts.read().get(&(adt_x, adt_y)) {
            return Ok(adt.clone());
        }

        let mut guard = self.adts.write();
        if let Some(adt) = guard.get(&(adt_x, adt_y)) {
            return Ok(adt.clone());
        }

        let adt = self.parse_adt(adt_x, adt_y)?;
        guard.insert((adt_x, adt_y), adt.clone());
        Ok(adt)
    }

    /// Drop a parsed ADT and garbage-collect instances and models no loaded
    /// ADT references anymore.
    pub fn unload_adt(&self, adt_x: i32, adt_y: i32) {
        let removed = self.adts.write().remove(&(adt_x, adt_y));
        if removed.is_none() {
            return;
        }

        let loaded: HashSet<(i32, i32)> = self.adts.read().keys().copied().collect();
        let referenced = |instance_chunks: &std::collections::BTreeSet<crate::AdtChunkLocation>| {
            instance_chunks
                .iter()
                .any(|c| loaded.contains(&(c.adt_x as i32, c.adt_y as i32)))
        };

        {
            let mut instances = self.doodad_instances.write();
            instances.retain(|_, instance| referenced(&instance.adt_chunks));
        }
        {
            let mut instances = self.wmo_instances.write();
            instances.retain(|id, instance| *id == GLOBAL_WMO_ID || referenced(&instance.adt_chunks));
        }

        // models with no surviving instance
        self.doodad_models
            .write()
            .retain(|_, model| Arc::strong_count(model) > 1);
        self.wmo_models
            .write()
            .retain(|_, model| Arc::strong_count(model) > 1);

        debug!(
            "{}: unloaded adt ({}, {}), {} still loaded",
            self.name,
            adt_x,
            adt_y,
            loaded.len()
        );
    }

    fn parse_adt(&self, adt_x: i32, adt_y: i32) -> Result<Arc<Adt>> {
        let file_name = format!("Maps/{0}/{0}_{1}_{2}.adt", self.name, adt_x, adt_y);
        let mut stream = self.data.open(&file_name)?;
        let mut file = Adt::parse(&mut stream, adt_x, adt_y, &file_name)?;

        self.resolve_doodad_placements(&mut file, adt_x, adt_y)?;
        self.resolve_wmo_placements(&mut file, adt_x, adt_y)?;

        debug!("{}: parsed {}", self.name, file_name);
        Ok(Arc::new(file.adt))
    }

    fn resolve_doodad_placements(&self, file: &mut AdtFile, adt_x: i32, adt_y: i32) -> Result<()> {
        for p in std::mem::take(&mut file.doodad_placements) {
            let instance = match self.get_doodad_instance(p.unique_id) {
                Some(instance) => instance,
                None => {
                    let name = file.doodad_names.get(p.name_id).ok_or_else(|| {
                        Error::corrupt(format!("MDDF references name {}", p.name_id))
                    })?;
                    let model = self.ensure_doodad_model(name)?;
                    let transform = placement_transform(p.position, p.rotation, p.scale);
                    let instance = Arc::new(DoodadInstance::new(p.unique_id, model, transform));
                    self.doodad_instances
                        .write()
                        .entry(p.unique_id)
                        .or_insert(instance)
                        .clone()
                }
            };

            for loc in &instance.adt_chunks {
                if (loc.adt_x as i32, loc.adt_y as i32) == (adt_x, adt_y) {
                    file.adt
                        .chunk_mut(loc.chunk_x as i32, loc.chunk_y as i32)
                        .doodad_instances
                        .push(instance.id);
                }
            }
        }
        Ok(())
    }

    fn resolve_wmo_placements(&self, file: &mut AdtFile, adt_x: i32, adt_y: i32) -> Result<()> {
        for p in std::mem::take(&mut file.wmo_placements) {
            let instance = match self.get_wmo_instance(p.unique_id) {
                Some(instance) => instance,
                None => {
                    let name = file.wmo_names.get(p.name_id).ok_or_else(|| {
                        Error::corrupt(format!("MODF references name {}", p.name_id))
                    })?;
                    let model = self.ensure_wmo_model(name)?;
                    let transform = placement_transform(p.position, p.rotation, 1.0);
                    let mut instance =
                        WmoInstance::new(p.unique_id, p.doodad_set, model, transform);
                    instance.embedded_doodads = self.create_embedded_doodads(
                        &instance.model,
                        p.doodad_set,
                        &instance.transform,
                    )?;
                    let instance = Arc::new(instance);
                    self.wmo_instances
                        .write()
                        .entry(p.unique_id)
                        .or_insert(instance)
                        .clone()
                }
            };

            for loc in &instance.adt_chunks {
                if (loc.adt_x as i32, loc.adt_y as i32) == (adt_x, adt_y) {
                    file.adt
                        .chunk_mut(loc.chunk_x as i32, loc.chunk_y as i32)
                        .wmo_instances
                        .push(instance.id);
                }
            }

            // embedded doodads attach like any other doodad
            for doodad_id in &instance.embedded_doodads {
                if let Some(doodad) = self.get_doodad_instance(*doodad_id) {
                    for loc in &doodad.adt_chunks {
                        if (loc.adt_x as i32, loc.adt_y as i32) == (adt_x, adt_y) {
                            file.adt
                                .chunk_mut(loc.chunk_x as i32, loc.chunk_y as i32)
                                .doodad_instances
                                .push(doodad.id);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Instantiate the doodads of the chosen set, transformed into world
    /// space through the owning WMO's matrix.
    fn create_embedded_doodads(
        &self,
        model: &Arc<WmoModel>,
        doodad_set: u16,
        wmo_transform: &Matrix,
    ) -> Result<Vec<u32>> {
        let Some(set) = model.doodad_sets.get(doodad_set as usize) else {
            return Ok(Vec::new());
        };

        let mut ids = Vec::with_capacity(set.len());
        for placement in set {
            let doodad_model = self.ensure_doodad_model(&placement.model_file)?;
            let id = self.next_synthetic_id.fetch_add(1, Ordering::Relaxed);
            let transform = wmo_transform.multiply(&placement.transform);
            let instance = Arc::new(DoodadInstance::new(id, doodad_model, transform));
            self.doodad_instances.write().insert(id, instance);
            ids.push(id);
        }
        Ok(ids)
    }

    fn ensure_doodad_model(&self, name: &str) -> Result<Arc<DoodadModel>> {
        if let Some(model) = self.doodad_models.read().get(name) {
            return Ok(model.clone());
        }
        let mut stream = self.data.open(name)?;
        let model = Arc::new(DoodadModel::parse(name, &mut stream)?);
        Ok(self
            .doodad_models
            .write()
            .entry(name.to_string())
            .or_insert(model)
            .clone())
    }

    fn ensure_wmo_model(&self, name: &str) -> Result<Arc<WmoModel>> {
        if let Some(model) = self.wmo_models.read().get(name) {
            return Ok(model.clone());
        }
        let model = Arc::new(WmoModel::parse(&self.data, name)?);
        Ok(self
            .wmo_models
            .write()
            .entry(name.to_string())
            .or_insert(model)
            .clone())
    }
}

/// Transform for MDDF/MODF placements: translate, then Z-Y-X Euler rotation
/// in degrees, then uniform scale.
fn placement_transform(position: Vec3, rotation_deg: Vec3, scale: f32) -> Matrix {
    let rotation = Matrix::rotation_z(rotation_deg.z.to_radians())
        .multiply(&Matrix::rotation_y(rotation_deg.y.to_radians()))
        .multiply(&Matrix::rotation_x(rotation_deg.x.to_radians()));
    let mut out = Matrix::translation(position).multiply(&rotation);
    if scale != 1.0 {
        out = out.multiply(&Matrix::scaling(scale));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn open_map(dir: &Path, name: &str) -> Result<Map> {
        Map::open(Data::new(dir).unwrap(), name)
    }

    use std::path::Path;

    #[test]
    fn test_open_and_lazy_adt() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::install_flat_map(dir.path(), "plains", &[(32, 32), (32, 33)], 5.0).unwrap();

        let map = open_map(dir.path(), "plains").unwrap();
        assert!(map.has_adt(32, 32));
        assert!(map.has_adt(32, 33));
        assert!(!map.has_adt(0, 0));
        assert_eq!(map.loaded_adt_count(), 0);

        let adt = map.get_adt(32, 32).unwrap();
        assert_eq!(map.loaded_adt_count(), 1);
        assert_eq!((adt.x, adt.y), (32, 32));
        assert!((adt.bounds.min.z - 5.0).abs() < 1e-4);

        // parsing is idempotent; the same Arc comes back
        let again = map.get_adt(32, 32).unwrap();
        assert!(Arc::ptr_eq(&adt, &again));

        let chunk = adt.chunk(3, 7);
        assert_eq!(chunk.terrain_vertices.len(), 9 * 9 + 8 * 8);
        assert_eq!(chunk.terrain_indices.len(), 8 * 8 * 4 * 3);
    }

    #[test]
    fn test_missing_adt_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::install_flat_map(dir.path(), "plains", &[(32, 32)], 0.0).unwrap();
        let map = open_map(dir.path(), "plains").unwrap();
        assert!(matches!(map.get_adt(10, 10), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_truncated_adt_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::install_flat_map(dir.path(), "plains", &[(32, 32)], 0.0).unwrap();

        let adt_path = dir
            .path()
            .join("Maps")
            .join("plains")
            .join("plains_32_32.adt");
        let bytes = std::fs::read(&adt_path).unwrap();
        std::fs::write(&adt_path, &bytes[..bytes.len() / 2]).unwrap();

        let map = open_map(dir.path(), "plains").unwrap();
        assert!(matches!(map.get_adt(32, 32), Err(Error::Corrupt(_))));
        // no partially-parsed tile may be retained
        assert_eq!(map.loaded_adt_count(), 0);
    }

    #[test]
    fn test_doodad_placement_creates_instance_and_chunk_refs() {
        let dir = tempfile::tempdir().unwrap();
        let map_dir = dir.path().join("Maps").join("plains");
        std::fs::create_dir_all(&map_dir).unwrap();

        let (vertices, indices) = fixtures::cube_soup(2.0);
        std::fs::create_dir_all(dir.path().join("World")).unwrap();
        std::fs::write(
            dir.path().join("World").join("crate.m2"),
            fixtures::write_doodad_file(&vertices, &indices),
        )
        .unwrap();

        std::fs::write(map_dir.join("plains.wdt"), fixtures::write_wdt(&[(32, 32)])).unwrap();
        std::fs::write(
            map_dir.join("plains_32_32.adt"),
            fixtures::write_adt(
                0.0,
                &["World\\crate.m2"],
                &[fixtures::FixtureDoodad {
                    name_id: 0,
                    unique_id: 77,
                    position: Vec3::new(-266.0, -266.0, 10.0),
                    rotation: Vec3::new(0.0, 0.0, 0.0),
                    scale: 1.0,
                }],
                &[],
                &[],
                None,
            ),
        )
        .unwrap();

        let map = open_map(dir.path(), "plains").unwrap();
        let adt = map.get_adt(32, 32).unwrap();

        let instance = map.get_doodad_instance(77).expect("instance in arena");
        assert_eq!(instance.model_file, "World\\crate.m2");
        assert!((instance.bounds.min.z - 8.0).abs() < 1e-4);

        let referencing: usize = adt
            .chunks()
            .map(|c| c.doodad_instances.iter().filter(|&&id| id == 77).count())
            .sum();
        assert!(referencing > 0, "some chunk must reference the doodad");

        // unloading the only ADT drops the instance and its model
        map.unload_adt(32, 32);
        assert!(map.get_doodad_instance(77).is_none());
    }

    #[test]
    fn test_global_wmo_map() {
        let dir = tempfile::tempdir().unwrap();
        let map_dir = dir.path().join("Maps").join("keep");
        std::fs::create_dir_all(&map_dir).unwrap();

        let (vertices, indices) = fixtures::cube_soup(10.0);
        for (name, bytes) in fixtures::write_wmo_files("keep", &vertices, &indices) {
            std::fs::write(dir.path().join(&name), bytes).unwrap();
        }

        std::fs::write(
            map_dir.join("keep.wdt"),
            fixtures::write_wdt_global_wmo("keep.wmo", Vec3::new(0.0, 0.0, 0.0)),
        )
        .unwrap();

        let map = open_map(dir.path(), "keep").unwrap();
        let global = map.global_wmo_instance().expect("global wmo");
        assert_eq!(global.id, GLOBAL_WMO_ID);
        assert_eq!(global.model.aabb_tree.vertices().len(), 8);
        assert!(!map.has_adt(32, 32));
    }
}
