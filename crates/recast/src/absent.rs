// Stand-in for builds without the native library.
//
// Constructors fail with VoxelLibraryFailure, so values of these types can
// never exist; the uninhabited field makes every method body provably
// unreachable while keeping signatures identical to the native module.

use std::marker::PhantomData;

use tilenav_utility::{Error, Result};

use crate::{NavMeshParams, Span, TileParams, TileRef};

const UNAVAILABLE: &str = "tilenav-recast built without the 'recast' feature";

#[derive(Clone, Copy)]
enum Never {}

pub struct Context {
    never: Never,
}

impl Context {
    pub fn new() -> Result<Context> {
        Err(Error::VoxelLibraryFailure(UNAVAILABLE))
    }
}

pub fn clear_unwalkable_triangles(
    ctx: &Context,
    _walkable_slope_deg: f32,
    _vertices: &[f32],
    _indices: &[i32],
    _areas: &mut [u8],
) {
    match ctx.never {}
}

pub struct Heightfield {
    never: Never,
}

impl Heightfield {
    pub fn new(
        _ctx: &Context,
        _width: i32,
        _height: i32,
        _bmin: [f32; 3],
        _bmax: [f32; 3],
        _cell_size: f32,
        _cell_height: f32,
    ) -> Result<Heightfield> {
        Err(Error::VoxelLibraryFailure(UNAVAILABLE))
    }

    pub fn width(&self) -> i32 {
        match self.never {}
    }

    pub fn height(&self) -> i32 {
        match self.never {}
    }

    pub fn rasterize_triangles(
        &mut self,
        _ctx: &Context,
        _vertices: &[f32],
        _indices: &[i32],
        _areas: &[u8],
        _flag_merge_threshold: i32,
    ) -> Result<()> {
        match self.never {}
    }

    pub fn add_span(
        &mut self,
        _ctx: &Context,
        _x: i32,
        _y: i32,
        _span: Span,
        _flag_merge_threshold: i32,
    ) -> Result<()> {
        match self.never {}
    }

    pub fn filter_low_hanging_walkable_obstacles(&mut self, _ctx: &Context, _walkable_climb: i32) {
        match self.never {}
    }

    pub fn filter_ledge_spans(
        &mut self,
        _ctx: &Context,
        _walkable_height: i32,
        _walkable_climb: i32,
    ) {
        match self.never {}
    }

    pub fn filter_walkable_low_height_spans(&mut self, _ctx: &Context, _walkable_height: i32) {
        match self.never {}
    }

    pub fn column_spans(&self, _column: i32) -> Vec<Span> {
        match self.never {}
    }

    pub fn set_span_area(&mut self, _column: i32, _span: usize, _area: u8) {
        match self.never {}
    }
}

pub struct CompactHeightfield {
    never: Never,
}

impl CompactHeightfield {
    pub fn build(
        _ctx: &Context,
        _walkable_height: i32,
        _walkable_climb: i32,
        _heightfield: &Heightfield,
    ) -> Result<CompactHeightfield> {
        Err(Error::VoxelLibraryFailure(UNAVAILABLE))
    }

    pub fn dims(&self) -> (i32, i32, i32) {
        match self.never {}
    }

    pub fn cell(&self, _cell: i32) -> (u32, u32) {
        match self.never {}
    }

    pub fn span_info(&self, _span: i32) -> (u16, u8) {
        match self.never {}
    }

    pub fn connection(&self, _x: i32, _y: i32, _span: i32, _dir: i32) -> Option<i32> {
        match self.never {}
    }

    pub fn sever_connection(&mut self, _span: i32, _dir: i32) {
        match self.never {}
    }

    pub fn build_distance_field(&mut self, _ctx: &Context) -> Result<()> {
        match self.never {}
    }

    pub fn build_regions(
        &mut self,
        _ctx: &Context,
        _border_size: i32,
        _min_region_area: i32,
        _merge_region_area: i32,
    ) -> Result<()> {
        match self.never {}
    }
}

pub struct ContourSet {
    never: Never,
}

impl ContourSet {
    pub fn build(
        _ctx: &Context,
        chf: &CompactHeightfield,
        _max_error: f32,
        _max_edge_len: i32,
    ) -> Result<ContourSet> {
        match chf.never {}
    }

    pub fn count(&self) -> i32 {
        match self.never {}
    }
}

pub struct PolyMesh {
    never: Never,
}

impl PolyMesh {
    pub fn build(
        _ctx: &Context,
        cset: &ContourSet,
        _max_verts_per_poly: i32,
    ) -> Result<PolyMesh> {
        match cset.never {}
    }

    pub fn vertex_count(&self) -> i32 {
        match self.never {}
    }

    pub fn poly_count(&self) -> i32 {
        match self.never {}
    }

    pub fn area(&self, _poly: i32) -> u8 {
        match self.never {}
    }

    pub fn set_flags(&mut self, _poly: i32, _flags: u16) {
        match self.never {}
    }
}

pub struct PolyMeshDetail {
    #[allow(dead_code)]
    never: Never,
}

impl PolyMeshDetail {
    pub fn build(
        _ctx: &Context,
        pmesh: &PolyMesh,
        _chf: &CompactHeightfield,
        _sample_dist: f32,
        _sample_max_error: f32,
    ) -> Result<PolyMeshDetail> {
        match pmesh.never {}
    }
}

pub fn create_nav_mesh_data(
    pmesh: &PolyMesh,
    _dmesh: &PolyMeshDetail,
    _tile: &TileParams,
) -> Result<Option<Vec<u8>>> {
    match pmesh.never {}
}

pub struct NavMesh {
    never: Never,
}

impl NavMesh {
    pub fn new(_params: &NavMeshParams) -> Result<NavMesh> {
        Err(Error::VoxelLibraryFailure(UNAVAILABLE))
    }

    pub fn add_tile(&mut self, _data: Vec<u8>) -> Result<TileRef> {
        match self.never {}
    }

    pub fn remove_tile(&mut self, _tile_ref: TileRef) -> Result<()> {
        match self.never {}
    }
}

pub struct NavMeshQuery<'a> {
    never: Never,
    _mesh: PhantomData<&'a NavMesh>,
}

impl<'a> NavMeshQuery<'a> {
    pub fn new(navmesh: &'a NavMesh, _max_nodes: i32) -> Result<NavMeshQuery<'a>> {
        match navmesh.never {}
    }

    pub fn find_nearest_poly(
        &self,
        _center: [f32; 3],
        _extents: [f32; 3],
        _include_flags: u16,
        _exclude_flags: u16,
    ) -> Result<Option<(u32, [f32; 3])>> {
        match self.never {}
    }

    pub fn find_path(
        &self,
        _start_ref: u32,
        _end_ref: u32,
        _start: [f32; 3],
        _end: [f32; 3],
        _include_flags: u16,
        _exclude_flags: u16,
        _max_path: usize,
    ) -> Result<Vec<u32>> {
        match self.never {}
    }

    pub fn find_straight_path(
        &self,
        _start: [f32; 3],
        _end: [f32; 3],
        _polys: &[u32],
        _max_straight: usize,
    ) -> Result<Vec<[f32; 3]>> {
        match self.never {}
    }

    pub fn poly_height(&self, _poly_ref: u32, _pos: [f32; 3]) -> Result<Option<f32>> {
        match self.never {}
    }
}
