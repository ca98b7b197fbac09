// Compile bundled Recast/Detour C++ source plus the C wrapper.
//
// Only compiles when the "recast" feature is enabled.  The upstream sources
// are expected under thirdparty/recastnavigation/ at the workspace root
// (override with RECAST_SRC_DIR) so the build stays binary-compatible with
// the navmesh data produced elsewhere.

fn main() {
    #[cfg(feature = "recast")]
    build_recast_detour();
}

#[cfg(feature = "recast")]
fn build_recast_detour() {
    let recast_dir = std::env::var("RECAST_SRC_DIR")
        .unwrap_or_else(|_| "../../thirdparty/recastnavigation".to_string());
    let recast_dir = std::path::Path::new(&recast_dir);

    let recast_src = recast_dir.join("Recast/Source");
    let recast_sources = [
        "Recast.cpp",
        "RecastAlloc.cpp",
        "RecastArea.cpp",
        "RecastAssert.cpp",
        "RecastContour.cpp",
        "RecastFilter.cpp",
        "RecastLayers.cpp",
        "RecastMesh.cpp",
        "RecastMeshDetail.cpp",
        "RecastRasterization.cpp",
        "RecastRegion.cpp",
    ];

    let detour_src = recast_dir.join("Detour/Source");
    let detour_sources = [
        "DetourAlloc.cpp",
        "DetourAssert.cpp",
        "DetourCommon.cpp",
        "DetourNavMesh.cpp",
        "DetourNavMeshBuilder.cpp",
        "DetourNavMeshQuery.cpp",
        "DetourNode.cpp",
    ];

    let mut build = cc::Build::new();
    build
        .cpp(true)
        .std("c++14")
        .warnings(false)
        .include(recast_dir.join("Recast/Include"))
        .include(recast_dir.join("Detour/Include"));

    for src in &recast_sources {
        build.file(recast_src.join(src));
    }
    for src in &detour_sources {
        build.file(detour_src.join(src));
    }

    build.file("recast_wrapper.cpp");
    build.include(".");
    build.compile("recastdetour");

    println!("cargo:rerun-if-changed=recast_wrapper.cpp");
    println!("cargo:rerun-if-changed=recast_wrapper.h");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=RECAST_SRC_DIR");
}
