// Per-ADT output aggregation and the nav archive format.
//
// Workers finish nav tiles in arbitrary order; an aggregator collects them
// per owning ADT and only when every tile inside the ADT has arrived is the
// archive serialized.  Entries sort by (tile_x, tile_y) so archive bytes are
// reproducible for identical inputs.

use std::collections::BTreeMap;

use tilenav_utility::stream::ByteStream;
use tilenav_utility::{Error, Result};

const ARCHIVE_MAGIC: u32 = u32::from_le_bytes(*b"NAV1");
const ARCHIVE_VERSION: u32 = 1;

/// Finished output for one nav tile.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileOutput {
    pub tile_x: i32,
    pub tile_y: i32,
    /// Serialized heightfield snapshot; empty when the tile had no geometry.
    pub heightfield: Vec<u8>,
    /// Navmesh tile blob; empty when nothing walkable survived.
    pub blob: Vec<u8>,
    /// Model instance ids that contributed geometry, ascending.
    pub wmo_ids: Vec<u32>,
    pub doodad_ids: Vec<u32>,
}

/// In-progress archive for one ADT (or for the global WMO of a terrain-less
/// map).  Owned exclusively by the orchestrator.
pub struct MeshFile {
    expected: usize,
    tiles: BTreeMap<(i32, i32), TileOutput>,
}

impl MeshFile {
    pub fn new(expected: usize) -> MeshFile {
        MeshFile {
            expected,
            tiles: BTreeMap::new(),
        }
    }

    pub fn add_tile(&mut self, tile: TileOutput) {
        self.tiles.insert((tile.tile_x, tile.tile_y), tile);
    }

    pub fn is_complete(&self) -> bool {
        self.tiles.len() >= self.expected
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = ByteStream::new();
        out.write_u32(ARCHIVE_MAGIC);
        out.write_u32(ARCHIVE_VERSION);
        out.write_u32(self.tiles.len() as u32);

        let id_sections: Vec<Vec<u8>> = self.tiles.values().map(serialize_ids).collect();

        for (tile, ids) in self.tiles.values().zip(&id_sections) {
            out.write_u32(tile.tile_x as u32);
            out.write_u32(tile.tile_y as u32);
            out.write_u32(tile.heightfield.len() as u32);
            out.write_u32(tile.blob.len() as u32);
            out.write_u32(ids.len() as u32);
        }

        for (tile, ids) in self.tiles.values().zip(&id_sections) {
            out.append(&tile.heightfield);
            out.append(&tile.blob);
            out.append(ids);
        }

        out.into_inner()
    }
}

fn serialize_ids(tile: &TileOutput) -> Vec<u8> {
    let mut out = ByteStream::new();
    out.write_u32(tile.wmo_ids.len() as u32);
    for id in &tile.wmo_ids {
        out.write_u32(*id);
    }
    out.write_u32(tile.doodad_ids.len() as u32);
    for id in &tile.doodad_ids {
        out.write_u32(*id);
    }
    out.into_inner()
}

/// Parse an archive back into its tiles.
pub fn read_archive(bytes: Vec<u8>, context: &str) -> Result<Vec<TileOutput>> {
    let mut stream = ByteStream::wrap(bytes, context.to_string());

    let magic = stream.read_u32()?;
    if magic != ARCHIVE_MAGIC {
        return Err(Error::corrupt(format!("{}: bad archive magic", context)));
    }
    let version = stream.read_u32()?;
    if version != ARCHIVE_VERSION {
        return Err(Error::UnsupportedVersion {
            context: context.to_string(),
            expected: ARCHIVE_VERSION,
            found: version,
        });
    }

    let count = stream.read_u32()? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let tile_x = stream.read_u32()? as i32;
        let tile_y = stream.read_u32()? as i32;
        let heightfield_len = stream.read_u32()? as usize;
        let blob_len = stream.read_u32()? as usize;
        let ids_len = stream.read_u32()? as usize;
        entries.push((tile_x, tile_y, heightfield_len, blob_len, ids_len));
    }

    let mut tiles = Vec::with_capacity(count);
    for (tile_x, tile_y, heightfield_len, blob_len, ids_len) in entries {
        let heightfield = stream.read_bytes(heightfield_len)?;
        let blob = stream.read_bytes(blob_len)?;

        let mut ids = ByteStream::wrap(stream.read_bytes(ids_len)?, context.to_string());
        let wmo_count = ids.read_u32()? as usize;
        let mut wmo_ids = Vec::with_capacity(wmo_count);
        for _ in 0..wmo_count {
            wmo_ids.push(ids.read_u32()?);
        }
        let doodad_count = ids.read_u32()? as usize;
        let mut doodad_ids = Vec::with_capacity(doodad_count);
        for _ in 0..doodad_count {
            doodad_ids.push(ids.read_u32()?);
        }

        tiles.push(TileOutput {
            tile_x,
            tile_y,
            heightfield,
            blob,
            wmo_ids,
            doodad_ids,
        });
    }

    Ok(tiles)
}

/// Archive file name for an ADT.
pub fn adt_archive_name(adt_x: i32, adt_y: i32) -> String {
    format!("{:02}_{:02}.nav", adt_x, adt_y)
}

/// File name of a model's serialized AABB tree inside the shared BVH area.
pub fn flatten_model_name(model_file: &str) -> String {
    let mut flat: String = model_file
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' => '_',
            other => other,
        })
        .collect();
    flat.push_str(".bvh");
    flat
}

/// Archive file name for a global-WMO map.
pub const GLOBAL_ARCHIVE_NAME: &str = "global.nav";

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(x: i32, y: i32, payload: u8) -> TileOutput {
        TileOutput {
            tile_x: x,
            tile_y: y,
            heightfield: vec![payload; 8],
            blob: vec![payload ^ 0xFF; 4],
            wmo_ids: vec![1, 2],
            doodad_ids: vec![9],
        }
    }

    #[test]
    fn test_round_trip() {
        let mut file = MeshFile::new(2);
        file.add_tile(tile(257, 258, 0xAA));
        file.add_tile(tile(256, 258, 0xBB));
        assert!(file.is_complete());

        let bytes = file.serialize();
        let tiles = read_archive(bytes, "test.nav").unwrap();
        assert_eq!(tiles.len(), 2);
        // sorted by coordinate regardless of insertion order
        assert_eq!((tiles[0].tile_x, tiles[0].tile_y), (256, 258));
        assert_eq!(tiles[0].heightfield, vec![0xBB; 8]);
        assert_eq!(tiles[1].wmo_ids, vec![1, 2]);
        assert_eq!(tiles[1].doodad_ids, vec![9]);
    }

    #[test]
    fn test_serialization_is_insertion_order_independent() {
        let mut a = MeshFile::new(3);
        let mut b = MeshFile::new(3);
        for t in [tile(1, 1, 1), tile(0, 1, 2), tile(1, 0, 3)] {
            a.add_tile(t);
        }
        for t in [tile(1, 0, 3), tile(1, 1, 1), tile(0, 1, 2)] {
            b.add_tile(t);
        }
        assert_eq!(a.serialize(), b.serialize());
    }

    #[test]
    fn test_incomplete_until_expected() {
        let mut file = MeshFile::new(2);
        file.add_tile(tile(0, 0, 1));
        assert!(!file.is_complete());
        file.add_tile(tile(0, 1, 1));
        assert!(file.is_complete());
    }

    #[test]
    fn test_truncated_archive_is_corrupt() {
        let mut file = MeshFile::new(1);
        file.add_tile(tile(5, 5, 7));
        let bytes = file.serialize();
        let cut = bytes[..bytes.len() - 3].to_vec();
        assert!(matches!(
            read_archive(cut, "test.nav"),
            Err(Error::Corrupt(_))
        ));
    }
}
