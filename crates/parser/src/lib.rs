// tilenav - World geometry parser
// Immutable model of terrain tiles, building models and prop models, parsed
// on demand from the game's little-endian tagged-chunk files.

pub mod adt;
pub mod data;
pub mod doodad;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod map;
pub mod wmo;

pub use adt::{Adt, AdtChunk};
pub use data::Data;
pub use doodad::{DoodadInstance, DoodadModel};
pub use map::Map;
pub use wmo::{WmoInstance, WmoModel};

/// Location of a single chunk inside the world chunk grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdtChunkLocation {
    pub adt_x: u8,
    pub adt_y: u8,
    pub chunk_x: u8,
    pub chunk_y: u8,
}
