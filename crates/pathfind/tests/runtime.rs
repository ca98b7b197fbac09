// End-to-end scenarios against the native voxel library: build a miniature
// world, load it, path across it, and push temporary obstacles through the
// rebuild machinery.  Requires the bundled Recast/Detour sources, so the
// whole file rides on the `recast` feature.

#![cfg(feature = "recast")]

use std::path::Path;

use tilenav_mapbuild::{build_map, MeshSettings};
use tilenav_parser::fixtures;
use tilenav_pathfind::Map;
use tilenav_utility::aabb_tree::AabbTree;
use tilenav_utility::math::Vec3;
use tilenav_utility::stream::ByteStream;
use tilenav_utility::Error;

const OBSTACLE_DISPLAY_ID: u32 = 42;
const OBSTACLE_PATH: &str = "doodad\\block.m2";
/// The table entry minus its discriminating prefix.
const OBSTACLE_MODEL: &str = "block.m2";
const WMO_DISPLAY_ID: u32 = 77;

/// Flat single-ADT world with an obstacle table and a pre-serialized
/// obstacle model in the BVH area.
fn build_world(root: &Path) -> std::path::PathBuf {
    fixtures::install_flat_map(root, "plains", &[(32, 32)], 0.0).unwrap();
    std::fs::write(
        root.join("GameObjectPaths.txt"),
        format!(
            "{}\t{}\n{}\twmo\\keep.wmo\n",
            OBSTACLE_DISPLAY_ID, OBSTACLE_PATH, WMO_DISPLAY_ID
        ),
    )
    .unwrap();

    let out = root.join("nav");
    let summary = build_map(root, &out, "plains", 2, MeshSettings::default()).unwrap();
    assert!((summary.percent_complete - 1.0).abs() < 1e-6);

    // a blocky obstacle model, written straight into the BVH area
    let (vertices, indices) = fixtures::cube_soup(4.0);
    let indices: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
    let tree = AabbTree::build(vertices, indices);
    let mut stream = ByteStream::new();
    tree.serialize(&mut stream);
    let bvh_dir = out.join("bvh");
    std::fs::create_dir_all(&bvh_dir).unwrap();
    std::fs::write(
        bvh_dir.join(tilenav_mapbuild::meshfiles::flatten_model_name(OBSTACLE_MODEL)),
        stream.contents(),
    )
    .unwrap();

    out
}

fn dist_2d(a: Vec3, b: Vec3) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

#[test]
fn test_flat_world_path() {
    let dir = tempfile::tempdir().unwrap();
    let nav = build_world(dir.path());

    let map = Map::load(&nav, "plains", MeshSettings::default()).unwrap();
    assert!(map.load_adt(32, 32).unwrap());
    assert!(map.loaded_tile_count() > 0);

    let start = Vec3::new(-100.0, -100.0, 0.0);
    let end = Vec3::new(-400.0, -400.0, 0.0);
    let path = map
        .find_path(start, end, false)
        .unwrap()
        .expect("flat ground must be pathable");

    assert!(path.len() >= 2);
    assert!(dist_2d(path[0], start) < 1.0);
    assert!(dist_2d(*path.last().unwrap(), end) < 1.0);

    // no duplicate vertices
    for pair in path.windows(2) {
        assert!(pair[0] != pair[1]);
    }
}

#[test]
fn test_obstacle_blocks_and_removal_restores() {
    let dir = tempfile::tempdir().unwrap();
    let nav = build_world(dir.path());

    let map = Map::load(&nav, "plains", MeshSettings::default()).unwrap();
    assert!(map.load_adt(32, 32).unwrap());

    let start = Vec3::new(-200.0, -266.0, 0.0);
    let end = Vec3::new(-330.0, -266.0, 0.0);
    let middle = Vec3::new(-265.0, -266.0, 0.0);

    // baseline blobs for every loaded tile
    let mut baseline = std::collections::HashMap::new();
    for ty in 256..264 {
        for tx in 256..264 {
            if let Some(blob) = map.tile_blob(tx, ty) {
                baseline.insert((tx, ty), blob);
            }
        }
    }
    assert!(!baseline.is_empty());

    map.add_game_object(0xF110_0000_0000_0001, OBSTACLE_DISPLAY_ID, middle, 0.0)
        .unwrap();
    assert_eq!(map.temporary_obstacle_count(), 1);

    // duplicate guids are rejected
    assert!(matches!(
        map.add_game_object(0xF110_0000_0000_0001, OBSTACLE_DISPLAY_ID, middle, 0.0),
        Err(Error::AlreadyExists(_))
    ));

    // the path may fail outright or detour; it must never cross the block
    if let Some(path) = map.find_path(start, end, false).unwrap() {
        for pair in path.windows(2) {
            let steps = 32;
            for step in 0..=steps {
                let t = step as f32 / steps as f32;
                let p = Vec3::new(
                    pair[0].x + (pair[1].x - pair[0].x) * t,
                    pair[0].y + (pair[1].y - pair[0].y) * t,
                    0.0,
                );
                let inside = (p.x - middle.x).abs() < 3.5 && (p.y - middle.y).abs() < 3.5;
                assert!(!inside, "path passes through the obstacle at {:?}", p);
            }
        }
    }

    map.remove_game_object(0xF110_0000_0000_0001).unwrap();
    assert_eq!(map.temporary_obstacle_count(), 0);

    // removal restores every touched tile blob byte for byte
    for ((tx, ty), blob) in &baseline {
        assert_eq!(
            map.tile_blob(*tx, *ty).as_deref(),
            Some(blob.as_slice()),
            "tile ({}, {}) did not return to its archived state",
            tx,
            ty
        );
    }

    // pathable again
    assert!(map.find_path(start, end, false).unwrap().is_some());
}

#[test]
fn test_wmo_obstacles_are_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let nav = build_world(dir.path());

    let map = Map::load(&nav, "plains", MeshSettings::default()).unwrap();
    assert!(map.load_adt(32, 32).unwrap());

    assert!(matches!(
        map.add_game_object(1, WMO_DISPLAY_ID, Vec3::new(-266.0, -266.0, 0.0), 0.0),
        Err(Error::Unsupported(_))
    ));
    assert_eq!(map.temporary_obstacle_count(), 0);
}

#[test]
fn test_obstacle_commutativity() {
    let dir = tempfile::tempdir().unwrap();
    let nav = build_world(dir.path());

    // both inside nav tile (259, 259), footprints disjoint
    let here = Vec3::new(-240.0, -240.0, 0.0);
    let there = Vec3::new(-250.0, -240.0, 0.0);

    let blob_after = |order: &[(u64, Vec3)]| {
        let map = Map::load(&nav, "plains", MeshSettings::default()).unwrap();
        map.load_adt(32, 32).unwrap();
        for (guid, pos) in order {
            map.add_game_object(*guid, OBSTACLE_DISPLAY_ID, *pos, 0.0)
                .unwrap();
        }
        map.tile_blob(259, 259)
    };

    let ab = blob_after(&[(1, here), (2, there)]);
    let ba = blob_after(&[(2, there), (1, here)]);
    assert_eq!(ab, ba);
}
