// tilenav - Shared utility library
// Math primitives, coordinate folding, spatial indexing and binary I/O used
// by both the offline builder and the runtime map.

pub mod aabb_tree;
pub mod convert;
pub mod error;
pub mod log;
pub mod math;
pub mod stream;

pub use error::{Error, Result};

/// One side of an ADT tile, in world units
pub const ADT_SIZE: f32 = 1600.0 / 3.0;

/// Number of ADT tiles per side of the world grid
pub const ADT_GRID: i32 = 64;

/// Number of chunks per side of an ADT
pub const CHUNK_GRID: i32 = 16;

/// One side of an ADT chunk, in world units
pub const CHUNK_SIZE: f32 = ADT_SIZE / CHUNK_GRID as f32;

/// Largest world coordinate on either horizontal axis
pub const MAX_COORDINATE: f32 = ADT_SIZE * (ADT_GRID / 2) as f32;
