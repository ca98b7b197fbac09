// Error taxonomy shared across the workspace.
// Every failure carries the offending file, coordinate or identifier so the
// caller can log something actionable without re-deriving context.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("{context}: unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        context: String,
        expected: u32,
        found: u32,
    },

    #[error("coordinate outside world bounds: ({x}, {y})")]
    Outside { x: f32, y: f32 },

    #[error("too many mesh vertices produced for tile ({tile_x}, {tile_y})")]
    TooManyVerts { tile_x: i32, tile_y: i32 },

    #[error("game object {0:#018x} already exists")]
    AlreadyExists(u64),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("voxel library failure: {0}")]
    VoxelLibraryFailure(&'static str),
}

impl Error {
    /// Truncated or malformed input while reading `context`.
    pub fn corrupt(context: impl Into<String>) -> Self {
        Error::Corrupt(context.into())
    }
}
