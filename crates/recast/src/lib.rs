// tilenav - Recast/Detour binding
//
// The voxel/contour/polymesh builder and the navmesh query engine are
// external collaborators; this crate is the thin capability boundary in
// front of them.  With the `recast` feature the bundled C++ sources are
// compiled and driven over FFI; without it an API-identical stand-in reports
// VoxelLibraryFailure from every operation, keeping the rest of the
// workspace compiling and the orchestration logic testable.

#[cfg(feature = "recast")]
mod ffi;
#[cfg(feature = "recast")]
mod native;
#[cfg(feature = "recast")]
pub use native::*;

#[cfg(not(feature = "recast"))]
mod absent;
#[cfg(not(feature = "recast"))]
pub use absent::*;

/// One solid span in a heightfield column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub smin: u16,
    pub smax: u16,
    pub area: u8,
}

/// Detour navmesh initialization parameters.
#[derive(Clone, Copy, Debug)]
pub struct NavMeshParams {
    pub origin: [f32; 3],
    pub tile_width: f32,
    pub tile_height: f32,
    pub max_tiles: i32,
    pub max_polys: i32,
}

/// Per-tile parameters for serializing a navmesh tile blob.
#[derive(Clone, Copy, Debug)]
pub struct TileParams {
    pub tile_x: i32,
    pub tile_y: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub cell_size: f32,
    pub cell_height: f32,
}

/// Stable tile handle inside a NavMesh.
pub type TileRef = u32;

/// Whether the native library is linked into this build.
pub const fn native_library_available() -> bool {
    cfg!(feature = "recast")
}
