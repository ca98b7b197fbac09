// FFI bindings for the Recast/Detour C wrapper.
//
// These match the extern "C" functions in recast_wrapper.cpp, which wraps
// the C++ APIs of the bundled recastnavigation sources.

#![allow(non_camel_case_types)]

use std::ffi::c_void;

/// Opaque handle for rcContext
pub type rc_context_t = *mut c_void;
/// Opaque handle for rcHeightfield
pub type rc_heightfield_t = *mut c_void;
/// Opaque handle for rcCompactHeightfield
pub type rc_compact_heightfield_t = *mut c_void;
/// Opaque handle for rcContourSet
pub type rc_contour_set_t = *mut c_void;
/// Opaque handle for rcPolyMesh
pub type rc_poly_mesh_t = *mut c_void;
/// Opaque handle for rcPolyMeshDetail
pub type rc_poly_mesh_detail_t = *mut c_void;
/// Opaque handle for dtNavMesh
pub type dt_nav_mesh_t = *mut c_void;
/// Opaque handle for dtNavMeshQuery
pub type dt_nav_mesh_query_t = *mut c_void;

/// Mirror of dt_nav_mesh_create_params_t in recast_wrapper.h
#[repr(C)]
pub struct DtNavMeshCreateParamsC {
    pub verts: *const u16,
    pub vert_count: i32,
    pub polys: *const u16,
    pub poly_flags: *const u16,
    pub poly_areas: *const u8,
    pub poly_count: i32,
    pub nvp: i32,

    pub detail_meshes: *const u32,
    pub detail_verts: *const f32,
    pub detail_verts_count: i32,
    pub detail_tris: *const u8,
    pub detail_tri_count: i32,

    pub user_id: u32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],

    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub cs: f32,
    pub ch: f32,
    pub build_bv_tree: bool,
}

impl Default for DtNavMeshCreateParamsC {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

/// Mirror of dt_nav_mesh_params_t in recast_wrapper.h
#[repr(C)]
pub struct DtNavMeshParamsC {
    pub orig: [f32; 3],
    pub tile_width: f32,
    pub tile_height: f32,
    pub max_tiles: i32,
    pub max_polys: i32,
}

/// Mirror of rc_poly_mesh_data_t in recast_wrapper.h
#[repr(C)]
pub struct RcPolyMeshDataC {
    pub verts: *mut u16,
    pub polys: *mut u16,
    pub regs: *mut u16,
    pub flags: *mut u16,
    pub areas: *mut u8,
    pub nverts: i32,
    pub npolys: i32,
    pub maxpolys: i32,
    pub nvp: i32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub cs: f32,
    pub ch: f32,
    pub border_size: i32,
    pub max_edge_error: f32,
}

/// Mirror of rc_poly_mesh_detail_data_t in recast_wrapper.h
#[repr(C)]
pub struct RcPolyMeshDetailDataC {
    pub meshes: *mut u32,
    pub verts: *mut f32,
    pub tris: *mut u8,
    pub nmeshes: i32,
    pub nverts: i32,
    pub ntris: i32,
}

unsafe impl Send for RcPolyMeshDataC {}
unsafe impl Sync for RcPolyMeshDataC {}
unsafe impl Send for RcPolyMeshDetailDataC {}
unsafe impl Sync for RcPolyMeshDetailDataC {}

extern "C" {
    // rcContext
    pub fn rc_alloc_context() -> rc_context_t;
    pub fn rc_free_context(ctx: rc_context_t);

    // rcHeightfield
    pub fn rc_alloc_heightfield() -> rc_heightfield_t;
    pub fn rc_free_heightfield(hf: rc_heightfield_t);
    pub fn rc_create_heightfield(
        ctx: rc_context_t,
        hf: rc_heightfield_t,
        width: i32,
        height: i32,
        bmin: *const f32,
        bmax: *const f32,
        cs: f32,
        ch: f32,
    ) -> bool;

    // Triangle marking & rasterization
    pub fn rc_clear_unwalkable_triangles(
        ctx: rc_context_t,
        walkable_slope_angle: f32,
        verts: *const f32,
        nv: i32,
        tris: *const i32,
        nt: i32,
        areas: *mut u8,
    );
    pub fn rc_rasterize_triangles(
        ctx: rc_context_t,
        verts: *const f32,
        nv: i32,
        tris: *const i32,
        areas: *const u8,
        nt: i32,
        solid: rc_heightfield_t,
        flag_merge_thr: i32,
    ) -> bool;
    pub fn rc_add_span(
        ctx: rc_context_t,
        hf: rc_heightfield_t,
        x: i32,
        y: i32,
        smin: u16,
        smax: u16,
        area: u8,
        flag_merge_thr: i32,
    ) -> bool;

    // Span access (save/restore of area flags, serialization)
    pub fn rc_heightfield_get_dims(hf: rc_heightfield_t, width: *mut i32, height: *mut i32);
    pub fn rc_heightfield_count_spans(hf: rc_heightfield_t, column: i32) -> i32;
    pub fn rc_heightfield_get_spans(
        hf: rc_heightfield_t,
        column: i32,
        smin: *mut u16,
        smax: *mut u16,
        area: *mut u8,
        max: i32,
    ) -> i32;
    pub fn rc_heightfield_set_span_area(
        hf: rc_heightfield_t,
        column: i32,
        span: i32,
        area: u8,
    ) -> bool;

    // Filters
    pub fn rc_filter_low_hanging_walkable_obstacles(
        ctx: rc_context_t,
        walkable_climb: i32,
        hf: rc_heightfield_t,
    );
    pub fn rc_filter_ledge_spans(
        ctx: rc_context_t,
        walkable_height: i32,
        walkable_climb: i32,
        hf: rc_heightfield_t,
    );
    pub fn rc_filter_walkable_low_height_spans(
        ctx: rc_context_t,
        walkable_height: i32,
        hf: rc_heightfield_t,
    );

    // Compact heightfield
    pub fn rc_alloc_compact_heightfield() -> rc_compact_heightfield_t;
    pub fn rc_free_compact_heightfield(chf: rc_compact_heightfield_t);
    pub fn rc_build_compact_heightfield(
        ctx: rc_context_t,
        walkable_height: i32,
        walkable_climb: i32,
        hf: rc_heightfield_t,
        chf: rc_compact_heightfield_t,
    ) -> bool;

    // Compact span access (selective walkable-climb enforcement)
    pub fn rc_chf_get_dims(
        chf: rc_compact_heightfield_t,
        width: *mut i32,
        height: *mut i32,
        span_count: *mut i32,
    );
    pub fn rc_chf_cell(chf: rc_compact_heightfield_t, cell: i32, index: *mut u32, count: *mut u32);
    pub fn rc_chf_span_info(chf: rc_compact_heightfield_t, span: i32, y: *mut u16, area: *mut u8);
    pub fn rc_chf_connection(
        chf: rc_compact_heightfield_t,
        x: i32,
        y: i32,
        span: i32,
        dir: i32,
    ) -> i32;
    pub fn rc_chf_sever_connection(chf: rc_compact_heightfield_t, span: i32, dir: i32);

    // Distance field & regions
    pub fn rc_build_distance_field(ctx: rc_context_t, chf: rc_compact_heightfield_t) -> bool;
    pub fn rc_build_regions(
        ctx: rc_context_t,
        chf: rc_compact_heightfield_t,
        border_size: i32,
        min_region_area: i32,
        merge_region_area: i32,
    ) -> bool;

    // Contours
    pub fn rc_alloc_contour_set() -> rc_contour_set_t;
    pub fn rc_free_contour_set(cset: rc_contour_set_t);
    pub fn rc_build_contours(
        ctx: rc_context_t,
        chf: rc_compact_heightfield_t,
        max_error: f32,
        max_edge_len: i32,
        cset: rc_contour_set_t,
    ) -> bool;
    pub fn rc_contour_set_count(cset: rc_contour_set_t) -> i32;

    // Poly mesh
    pub fn rc_alloc_poly_mesh() -> rc_poly_mesh_t;
    pub fn rc_free_poly_mesh(mesh: rc_poly_mesh_t);
    pub fn rc_build_poly_mesh(
        ctx: rc_context_t,
        cset: rc_contour_set_t,
        nvp: i32,
        mesh: rc_poly_mesh_t,
    ) -> bool;
    pub fn rc_get_poly_mesh_data(mesh: rc_poly_mesh_t, out: *mut RcPolyMeshDataC);

    // Detail mesh
    pub fn rc_alloc_poly_mesh_detail() -> rc_poly_mesh_detail_t;
    pub fn rc_free_poly_mesh_detail(mesh: rc_poly_mesh_detail_t);
    pub fn rc_build_poly_mesh_detail(
        ctx: rc_context_t,
        mesh: rc_poly_mesh_t,
        chf: rc_compact_heightfield_t,
        sample_dist: f32,
        sample_max_error: f32,
        dmesh: rc_poly_mesh_detail_t,
    ) -> bool;
    pub fn rc_get_poly_mesh_detail_data(
        mesh: rc_poly_mesh_detail_t,
        out: *mut RcPolyMeshDetailDataC,
    );

    // Detour nav mesh
    pub fn dt_create_nav_mesh_data(
        params: *mut DtNavMeshCreateParamsC,
        out_data: *mut *mut u8,
        out_data_size: *mut i32,
    ) -> bool;
    pub fn dt_free(ptr: *mut c_void);

    pub fn dt_alloc_nav_mesh() -> dt_nav_mesh_t;
    pub fn dt_free_nav_mesh(navmesh: dt_nav_mesh_t);
    pub fn dt_nav_mesh_init(navmesh: dt_nav_mesh_t, params: *const DtNavMeshParamsC) -> u32;
    pub fn dt_nav_mesh_add_tile(
        navmesh: dt_nav_mesh_t,
        data: *const u8,
        data_size: i32,
        flags: i32,
        last_ref: u32,
        result: *mut u32,
    ) -> u32;
    pub fn dt_nav_mesh_remove_tile(navmesh: dt_nav_mesh_t, tile_ref: u32) -> u32;

    // Detour query
    pub fn dt_alloc_nav_mesh_query() -> dt_nav_mesh_query_t;
    pub fn dt_free_nav_mesh_query(query: dt_nav_mesh_query_t);
    pub fn dt_nav_mesh_query_init(
        query: dt_nav_mesh_query_t,
        navmesh: dt_nav_mesh_t,
        max_nodes: i32,
    ) -> u32;
    pub fn dt_query_find_nearest_poly(
        query: dt_nav_mesh_query_t,
        center: *const f32,
        extents: *const f32,
        include_flags: u16,
        exclude_flags: u16,
        nearest_ref: *mut u32,
        nearest_point: *mut f32,
    ) -> u32;
    pub fn dt_query_find_path(
        query: dt_nav_mesh_query_t,
        start_ref: u32,
        end_ref: u32,
        start: *const f32,
        end: *const f32,
        include_flags: u16,
        exclude_flags: u16,
        path: *mut u32,
        path_count: *mut i32,
        max_path: i32,
    ) -> u32;
    pub fn dt_query_find_straight_path(
        query: dt_nav_mesh_query_t,
        start: *const f32,
        end: *const f32,
        path: *const u32,
        path_count: i32,
        straight: *mut f32,
        straight_flags: *mut u8,
        straight_refs: *mut u32,
        straight_count: *mut i32,
        max_straight: i32,
    ) -> u32;
    pub fn dt_query_get_poly_height(
        query: dt_nav_mesh_query_t,
        poly_ref: u32,
        pos: *const f32,
        height: *mut f32,
    ) -> u32;

    pub fn dt_status_succeeded(status: u32) -> bool;
}
