// Safe wrappers over the FFI surface.  Every allocation is owned by an RAII
// type; data escapes only as copies or short-lived views.

use std::collections::HashMap;
use std::marker::PhantomData;

use tilenav_utility::{Error, Result};

use crate::ffi;
use crate::{NavMeshParams, Span, TileParams, TileRef};

fn voxel_err(what: &'static str) -> Error {
    Error::VoxelLibraryFailure(what)
}

pub struct Context {
    handle: ffi::rc_context_t,
}

// The handle is only ever touched through &self/&mut self from one thread at
// a time; each worker owns its own context.
unsafe impl Send for Context {}

impl Context {
    pub fn new() -> Result<Context> {
        let handle = unsafe { ffi::rc_alloc_context() };
        if handle.is_null() {
            return Err(voxel_err("rcContext allocation"));
        }
        Ok(Context { handle })
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { ffi::rc_free_context(self.handle) };
    }
}

/// Clear the walkable flag on triangles steeper than the slope limit.
pub fn clear_unwalkable_triangles(
    ctx: &Context,
    walkable_slope_deg: f32,
    vertices: &[f32],
    indices: &[i32],
    areas: &mut [u8],
) {
    debug_assert_eq!(indices.len() / 3, areas.len());
    unsafe {
        ffi::rc_clear_unwalkable_triangles(
            ctx.handle,
            walkable_slope_deg,
            vertices.as_ptr(),
            (vertices.len() / 3) as i32,
            indices.as_ptr(),
            (indices.len() / 3) as i32,
            areas.as_mut_ptr(),
        );
    }
}

pub struct Heightfield {
    handle: ffi::rc_heightfield_t,
    width: i32,
    height: i32,
}

// &self methods only read the underlying field; mutation requires &mut.
unsafe impl Send for Heightfield {}
unsafe impl Sync for Heightfield {}

impl Heightfield {
    pub fn new(
        ctx: &Context,
        width: i32,
        height: i32,
        bmin: [f32; 3],
        bmax: [f32; 3],
        cell_size: f32,
        cell_height: f32,
    ) -> Result<Heightfield> {
        let handle = unsafe { ffi::rc_alloc_heightfield() };
        if handle.is_null() {
            return Err(voxel_err("rcHeightfield allocation"));
        }
        let ok = unsafe {
            ffi::rc_create_heightfield(
                ctx.handle,
                handle,
                width,
                height,
                bmin.as_ptr(),
                bmax.as_ptr(),
                cell_size,
                cell_height,
            )
        };
        if !ok {
            unsafe { ffi::rc_free_heightfield(handle) };
            return Err(voxel_err("rcCreateHeightfield"));
        }
        Ok(Heightfield {
            handle,
            width,
            height,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn rasterize_triangles(
        &mut self,
        ctx: &Context,
        vertices: &[f32],
        indices: &[i32],
        areas: &[u8],
        flag_merge_threshold: i32,
    ) -> Result<()> {
        debug_assert_eq!(indices.len() / 3, areas.len());
        let ok = unsafe {
            ffi::rc_rasterize_triangles(
                ctx.handle,
                vertices.as_ptr(),
                (vertices.len() / 3) as i32,
                indices.as_ptr(),
                areas.as_ptr(),
                (indices.len() / 3) as i32,
                self.handle,
                flag_merge_threshold,
            )
        };
        if ok {
            Ok(())
        } else {
            Err(voxel_err("rcRasterizeTriangles"))
        }
    }

    pub fn add_span(
        &mut self,
        ctx: &Context,
        x: i32,
        y: i32,
        span: Span,
        flag_merge_threshold: i32,
    ) -> Result<()> {
        let ok = unsafe {
            ffi::rc_add_span(
                ctx.handle,
                self.handle,
                x,
                y,
                span.smin,
                span.smax,
                span.area,
                flag_merge_threshold,
            )
        };
        if ok {
            Ok(())
        } else {
            Err(voxel_err("rcAddSpan"))
        }
    }

    pub fn filter_low_hanging_walkable_obstacles(&mut self, ctx: &Context, walkable_climb: i32) {
        unsafe {
            ffi::rc_filter_low_hanging_walkable_obstacles(ctx.handle, walkable_climb, self.handle)
        };
    }

    pub fn filter_ledge_spans(&mut self, ctx: &Context, walkable_height: i32, walkable_climb: i32) {
        unsafe {
            ffi::rc_filter_ledge_spans(ctx.handle, walkable_height, walkable_climb, self.handle)
        };
    }

    pub fn filter_walkable_low_height_spans(&mut self, ctx: &Context, walkable_height: i32) {
        unsafe { ffi::rc_filter_walkable_low_height_spans(ctx.handle, walkable_height, self.handle) };
    }

    /// Solid spans of one column, bottom to top.
    pub fn column_spans(&self, column: i32) -> Vec<Span> {
        let count = unsafe { ffi::rc_heightfield_count_spans(self.handle, column) };
        if count == 0 {
            return Vec::new();
        }
        let mut smin = vec![0u16; count as usize];
        let mut smax = vec![0u16; count as usize];
        let mut area = vec![0u8; count as usize];
        let read = unsafe {
            ffi::rc_heightfield_get_spans(
                self.handle,
                column,
                smin.as_mut_ptr(),
                smax.as_mut_ptr(),
                area.as_mut_ptr(),
                count,
            )
        };
        (0..read as usize)
            .map(|i| Span {
                smin: smin[i],
                smax: smax[i],
                area: area[i],
            })
            .collect()
    }

    pub fn set_span_area(&mut self, column: i32, span: usize, area: u8) {
        unsafe { ffi::rc_heightfield_set_span_area(self.handle, column, span as i32, area) };
    }
}

impl Drop for Heightfield {
    fn drop(&mut self) {
        unsafe { ffi::rc_free_heightfield(self.handle) };
    }
}

pub struct CompactHeightfield {
    handle: ffi::rc_compact_heightfield_t,
}

unsafe impl Send for CompactHeightfield {}

impl CompactHeightfield {
    pub fn build(
        ctx: &Context,
        walkable_height: i32,
        walkable_climb: i32,
        heightfield: &Heightfield,
    ) -> Result<CompactHeightfield> {
        let handle = unsafe { ffi::rc_alloc_compact_heightfield() };
        if handle.is_null() {
            return Err(voxel_err("rcCompactHeightfield allocation"));
        }
        let ok = unsafe {
            ffi::rc_build_compact_heightfield(
                ctx.handle,
                walkable_height,
                walkable_climb,
                heightfield.handle,
                handle,
            )
        };
        if !ok {
            unsafe { ffi::rc_free_compact_heightfield(handle) };
            return Err(voxel_err("rcBuildCompactHeightfield"));
        }
        Ok(CompactHeightfield { handle })
    }

    /// (width, height, span count)
    pub fn dims(&self) -> (i32, i32, i32) {
        let mut width = 0;
        let mut height = 0;
        let mut span_count = 0;
        unsafe { ffi::rc_chf_get_dims(self.handle, &mut width, &mut height, &mut span_count) };
        (width, height, span_count)
    }

    /// (first span index, span count) of the cell.
    pub fn cell(&self, cell: i32) -> (u32, u32) {
        let mut index = 0;
        let mut count = 0;
        unsafe { ffi::rc_chf_cell(self.handle, cell, &mut index, &mut count) };
        (index, count)
    }

    /// (floor, area) of a span.
    pub fn span_info(&self, span: i32) -> (u16, u8) {
        let mut y = 0u16;
        let mut area = 0u8;
        unsafe { ffi::rc_chf_span_info(self.handle, span, &mut y, &mut area) };
        (y, area)
    }

    /// Absolute index of the neighbor span in the given direction.
    pub fn connection(&self, x: i32, y: i32, span: i32, dir: i32) -> Option<i32> {
        let neighbor = unsafe { ffi::rc_chf_connection(self.handle, x, y, span, dir) };
        if neighbor < 0 {
            None
        } else {
            Some(neighbor)
        }
    }

    pub fn sever_connection(&mut self, span: i32, dir: i32) {
        unsafe { ffi::rc_chf_sever_connection(self.handle, span, dir) };
    }

    pub fn build_distance_field(&mut self, ctx: &Context) -> Result<()> {
        let ok = unsafe { ffi::rc_build_distance_field(ctx.handle, self.handle) };
        if ok {
            Ok(())
        } else {
            Err(voxel_err("rcBuildDistanceField"))
        }
    }

    pub fn build_regions(
        &mut self,
        ctx: &Context,
        border_size: i32,
        min_region_area: i32,
        merge_region_area: i32,
    ) -> Result<()> {
        let ok = unsafe {
            ffi::rc_build_regions(
                ctx.handle,
                self.handle,
                border_size,
                min_region_area,
                merge_region_area,
            )
        };
        if ok {
            Ok(())
        } else {
            Err(voxel_err("rcBuildRegions"))
        }
    }
}

impl Drop for CompactHeightfield {
    fn drop(&mut self) {
        unsafe { ffi::rc_free_compact_heightfield(self.handle) };
    }
}

pub struct ContourSet {
    handle: ffi::rc_contour_set_t,
}

unsafe impl Send for ContourSet {}

impl ContourSet {
    pub fn build(
        ctx: &Context,
        chf: &CompactHeightfield,
        max_error: f32,
        max_edge_len: i32,
    ) -> Result<ContourSet> {
        let handle = unsafe { ffi::rc_alloc_contour_set() };
        if handle.is_null() {
            return Err(voxel_err("rcContourSet allocation"));
        }
        let ok = unsafe {
            ffi::rc_build_contours(ctx.handle, chf.handle, max_error, max_edge_len, handle)
        };
        if !ok {
            unsafe { ffi::rc_free_contour_set(handle) };
            return Err(voxel_err("rcBuildContours"));
        }
        Ok(ContourSet { handle })
    }

    pub fn count(&self) -> i32 {
        unsafe { ffi::rc_contour_set_count(self.handle) }
    }
}

impl Drop for ContourSet {
    fn drop(&mut self) {
        unsafe { ffi::rc_free_contour_set(self.handle) };
    }
}

pub struct PolyMesh {
    handle: ffi::rc_poly_mesh_t,
}

unsafe impl Send for PolyMesh {}

impl PolyMesh {
    pub fn build(ctx: &Context, cset: &ContourSet, max_verts_per_poly: i32) -> Result<PolyMesh> {
        let handle = unsafe { ffi::rc_alloc_poly_mesh() };
        if handle.is_null() {
            return Err(voxel_err("rcPolyMesh allocation"));
        }
        let ok =
            unsafe { ffi::rc_build_poly_mesh(ctx.handle, cset.handle, max_verts_per_poly, handle) };
        if !ok {
            unsafe { ffi::rc_free_poly_mesh(handle) };
            return Err(voxel_err("rcBuildPolyMesh"));
        }
        Ok(PolyMesh { handle })
    }

    fn data(&self) -> ffi::RcPolyMeshDataC {
        let mut out: ffi::RcPolyMeshDataC = unsafe { std::mem::zeroed() };
        unsafe { ffi::rc_get_poly_mesh_data(self.handle, &mut out) };
        out
    }

    pub fn vertex_count(&self) -> i32 {
        self.data().nverts
    }

    pub fn poly_count(&self) -> i32 {
        self.data().npolys
    }

    pub fn area(&self, poly: i32) -> u8 {
        let data = self.data();
        debug_assert!(poly < data.npolys);
        unsafe { data.areas.add(poly as usize).read() }
    }

    pub fn set_flags(&mut self, poly: i32, flags: u16) {
        let data = self.data();
        debug_assert!(poly < data.npolys);
        unsafe { data.flags.add(poly as usize).write(flags) };
    }
}

impl Drop for PolyMesh {
    fn drop(&mut self) {
        unsafe { ffi::rc_free_poly_mesh(self.handle) };
    }
}

pub struct PolyMeshDetail {
    handle: ffi::rc_poly_mesh_detail_t,
}

unsafe impl Send for PolyMeshDetail {}

impl PolyMeshDetail {
    pub fn build(
        ctx: &Context,
        pmesh: &PolyMesh,
        chf: &CompactHeightfield,
        sample_dist: f32,
        sample_max_error: f32,
    ) -> Result<PolyMeshDetail> {
        let handle = unsafe { ffi::rc_alloc_poly_mesh_detail() };
        if handle.is_null() {
            return Err(voxel_err("rcPolyMeshDetail allocation"));
        }
        let ok = unsafe {
            ffi::rc_build_poly_mesh_detail(
                ctx.handle,
                pmesh.handle,
                chf.handle,
                sample_dist,
                sample_max_error,
                handle,
            )
        };
        if !ok {
            unsafe { ffi::rc_free_poly_mesh_detail(handle) };
            return Err(voxel_err("rcBuildPolyMeshDetail"));
        }
        Ok(PolyMeshDetail { handle })
    }

    fn data(&self) -> ffi::RcPolyMeshDetailDataC {
        let mut out: ffi::RcPolyMeshDetailDataC = unsafe { std::mem::zeroed() };
        unsafe { ffi::rc_get_poly_mesh_detail_data(self.handle, &mut out) };
        out
    }
}

impl Drop for PolyMeshDetail {
    fn drop(&mut self) {
        unsafe { ffi::rc_free_poly_mesh_detail(self.handle) };
    }
}

/// Serialize a navmesh tile blob from the built meshes.  Returns None when
/// the mesh has no polygons worth emitting.
pub fn create_nav_mesh_data(
    pmesh: &PolyMesh,
    dmesh: &PolyMeshDetail,
    tile: &TileParams,
) -> Result<Option<Vec<u8>>> {
    let pm = pmesh.data();
    let dm = dmesh.data();

    if pm.nverts == 0 || pm.npolys == 0 {
        return Ok(None);
    }
    if dm.meshes.is_null() || dm.verts.is_null() || dm.tris.is_null() {
        return Err(voxel_err("detail mesh missing"));
    }

    let mut params = ffi::DtNavMeshCreateParamsC {
        verts: pm.verts,
        vert_count: pm.nverts,
        polys: pm.polys,
        poly_flags: pm.flags,
        poly_areas: pm.areas,
        poly_count: pm.npolys,
        nvp: pm.nvp,
        detail_meshes: dm.meshes,
        detail_verts: dm.verts,
        detail_verts_count: dm.nverts,
        detail_tris: dm.tris,
        detail_tri_count: dm.ntris,
        tile_x: tile.tile_x,
        tile_y: tile.tile_y,
        tile_layer: 0,
        bmin: pm.bmin,
        bmax: pm.bmax,
        walkable_height: tile.walkable_height,
        walkable_radius: tile.walkable_radius,
        walkable_climb: tile.walkable_climb,
        cs: tile.cell_size,
        ch: tile.cell_height,
        build_bv_tree: true,
        ..Default::default()
    };

    let mut data: *mut u8 = std::ptr::null_mut();
    let mut size: i32 = 0;
    let ok = unsafe { ffi::dt_create_nav_mesh_data(&mut params, &mut data, &mut size) };
    if !ok {
        return Err(voxel_err("dtCreateNavMeshData"));
    }

    let blob = unsafe { std::slice::from_raw_parts(data, size as usize) }.to_vec();
    unsafe { ffi::dt_free(data as *mut std::ffi::c_void) };
    Ok(Some(blob))
}

pub struct NavMesh {
    handle: ffi::dt_nav_mesh_t,
    // addTile borrows the blob for the tile's lifetime; owning the buffers
    // here keeps that sound
    tile_data: HashMap<TileRef, Vec<u8>>,
}

unsafe impl Send for NavMesh {}
unsafe impl Sync for NavMesh {}

impl NavMesh {
    pub fn new(params: &NavMeshParams) -> Result<NavMesh> {
        let handle = unsafe { ffi::dt_alloc_nav_mesh() };
        if handle.is_null() {
            return Err(voxel_err("dtNavMesh allocation"));
        }

        let c_params = ffi::DtNavMeshParamsC {
            orig: params.origin,
            tile_width: params.tile_width,
            tile_height: params.tile_height,
            max_tiles: params.max_tiles,
            max_polys: params.max_polys,
        };

        let status = unsafe { ffi::dt_nav_mesh_init(handle, &c_params) };
        if !unsafe { ffi::dt_status_succeeded(status) } {
            unsafe { ffi::dt_free_nav_mesh(handle) };
            return Err(voxel_err("dtNavMesh::init"));
        }

        Ok(NavMesh {
            handle,
            tile_data: HashMap::new(),
        })
    }

    pub fn add_tile(&mut self, data: Vec<u8>) -> Result<TileRef> {
        let mut tile_ref: TileRef = 0;
        let status = unsafe {
            ffi::dt_nav_mesh_add_tile(
                self.handle,
                data.as_ptr(),
                data.len() as i32,
                0,
                0,
                &mut tile_ref,
            )
        };
        if !unsafe { ffi::dt_status_succeeded(status) } {
            return Err(voxel_err("dtNavMesh::addTile"));
        }
        self.tile_data.insert(tile_ref, data);
        Ok(tile_ref)
    }

    pub fn remove_tile(&mut self, tile_ref: TileRef) -> Result<()> {
        let status = unsafe { ffi::dt_nav_mesh_remove_tile(self.handle, tile_ref) };
        if !unsafe { ffi::dt_status_succeeded(status) } {
            return Err(voxel_err("dtNavMesh::removeTile"));
        }
        self.tile_data.remove(&tile_ref);
        Ok(())
    }
}

impl Drop for NavMesh {
    fn drop(&mut self) {
        unsafe { ffi::dt_free_nav_mesh(self.handle) };
    }
}

pub struct NavMeshQuery<'a> {
    handle: ffi::dt_nav_mesh_query_t,
    _mesh: PhantomData<&'a NavMesh>,
}

impl<'a> NavMeshQuery<'a> {
    pub fn new(navmesh: &'a NavMesh, max_nodes: i32) -> Result<NavMeshQuery<'a>> {
        let handle = unsafe { ffi::dt_alloc_nav_mesh_query() };
        if handle.is_null() {
            return Err(voxel_err("dtNavMeshQuery allocation"));
        }
        let status = unsafe { ffi::dt_nav_mesh_query_init(handle, navmesh.handle, max_nodes) };
        if !unsafe { ffi::dt_status_succeeded(status) } {
            unsafe { ffi::dt_free_nav_mesh_query(handle) };
            return Err(voxel_err("dtNavMeshQuery::init"));
        }
        Ok(NavMeshQuery {
            handle,
            _mesh: PhantomData,
        })
    }

    pub fn find_nearest_poly(
        &self,
        center: [f32; 3],
        extents: [f32; 3],
        include_flags: u16,
        exclude_flags: u16,
    ) -> Result<Option<(u32, [f32; 3])>> {
        let mut nearest_ref = 0u32;
        let mut nearest_point = [0f32; 3];
        let status = unsafe {
            ffi::dt_query_find_nearest_poly(
                self.handle,
                center.as_ptr(),
                extents.as_ptr(),
                include_flags,
                exclude_flags,
                &mut nearest_ref,
                nearest_point.as_mut_ptr(),
            )
        };
        if !unsafe { ffi::dt_status_succeeded(status) } {
            return Err(voxel_err("dtNavMeshQuery::findNearestPoly"));
        }
        if nearest_ref == 0 {
            Ok(None)
        } else {
            Ok(Some((nearest_ref, nearest_point)))
        }
    }

    pub fn find_path(
        &self,
        start_ref: u32,
        end_ref: u32,
        start: [f32; 3],
        end: [f32; 3],
        include_flags: u16,
        exclude_flags: u16,
        max_path: usize,
    ) -> Result<Vec<u32>> {
        let mut polys = vec![0u32; max_path];
        let mut count = 0i32;
        let status = unsafe {
            ffi::dt_query_find_path(
                self.handle,
                start_ref,
                end_ref,
                start.as_ptr(),
                end.as_ptr(),
                include_flags,
                exclude_flags,
                polys.as_mut_ptr(),
                &mut count,
                max_path as i32,
            )
        };
        if !unsafe { ffi::dt_status_succeeded(status) } {
            return Err(voxel_err("dtNavMeshQuery::findPath"));
        }
        polys.truncate(count as usize);
        Ok(polys)
    }

    pub fn find_straight_path(
        &self,
        start: [f32; 3],
        end: [f32; 3],
        polys: &[u32],
        max_straight: usize,
    ) -> Result<Vec<[f32; 3]>> {
        let mut points = vec![0f32; max_straight * 3];
        let mut flags = vec![0u8; max_straight];
        let mut refs = vec![0u32; max_straight];
        let mut count = 0i32;
        let status = unsafe {
            ffi::dt_query_find_straight_path(
                self.handle,
                start.as_ptr(),
                end.as_ptr(),
                polys.as_ptr(),
                polys.len() as i32,
                points.as_mut_ptr(),
                flags.as_mut_ptr(),
                refs.as_mut_ptr(),
                &mut count,
                max_straight as i32,
            )
        };
        if !unsafe { ffi::dt_status_succeeded(status) } {
            return Err(voxel_err("dtNavMeshQuery::findStraightPath"));
        }
        Ok((0..count as usize)
            .map(|i| [points[i * 3], points[i * 3 + 1], points[i * 3 + 2]])
            .collect())
    }

    /// Detail-mesh height under a position inside the polygon.
    pub fn poly_height(&self, poly_ref: u32, pos: [f32; 3]) -> Result<Option<f32>> {
        let mut height = 0f32;
        let status =
            unsafe { ffi::dt_query_get_poly_height(self.handle, poly_ref, pos.as_ptr(), &mut height) };
        if unsafe { ffi::dt_status_succeeded(status) } {
            Ok(Some(height))
        } else {
            Ok(None)
        }
    }
}

impl Drop for NavMeshQuery<'_> {
    fn drop(&mut self) {
        unsafe { ffi::dt_free_nav_mesh_query(self.handle) };
    }
}
