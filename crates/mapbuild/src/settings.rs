// Mesh build settings.
//
// Defaults are the reference values; per-map overrides load from a JSON file
// keyed by map name, every field optional.

use serde::{Deserialize, Serialize};
use std::path::Path;

use tilenav_utility::{Result, ADT_SIZE};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSettings {
    /// Nav tiles per ADT on each axis.
    #[serde(default = "default_tiles_per_adt")]
    pub tiles_per_adt: i32,
    /// Tile edge in voxels, excluding the border.
    #[serde(default = "default_tile_voxel_size")]
    pub tile_voxel_size: i32,
    #[serde(default = "default_cell_height")]
    pub cell_height: f32,
    /// Degrees; steeper triangles are cleared before rasterization.
    #[serde(default = "default_walkable_slope")]
    pub walkable_slope: f32,
    /// Voxel counts.
    #[serde(default = "default_walkable_climb")]
    pub voxel_walkable_climb: i32,
    #[serde(default = "default_walkable_height")]
    pub voxel_walkable_height: i32,
    #[serde(default = "default_walkable_radius")]
    pub voxel_walkable_radius: i32,
    #[serde(default = "default_max_simplification_error")]
    pub max_simplification_error: f32,
    #[serde(default = "default_min_region_size")]
    pub min_region_size: i32,
    #[serde(default = "default_merge_region_size")]
    pub merge_region_size: i32,
    #[serde(default = "default_vertices_per_polygon")]
    pub vertices_per_polygon: i32,
    #[serde(default = "default_detail_sample_distance")]
    pub detail_sample_distance: f32,
    #[serde(default = "default_detail_sample_max_error")]
    pub detail_sample_max_error: f32,
}

fn default_tiles_per_adt() -> i32 {
    8
}
fn default_tile_voxel_size() -> i32 {
    160
}
fn default_cell_height() -> f32 {
    0.25
}
fn default_walkable_slope() -> f32 {
    50.0
}
fn default_walkable_climb() -> i32 {
    4
}
fn default_walkable_height() -> i32 {
    8
}
fn default_walkable_radius() -> i32 {
    2
}
fn default_max_simplification_error() -> f32 {
    1.8
}
fn default_min_region_size() -> i32 {
    20
}
fn default_merge_region_size() -> i32 {
    40
}
fn default_vertices_per_polygon() -> i32 {
    6
}
fn default_detail_sample_distance() -> f32 {
    3.0
}
fn default_detail_sample_max_error() -> f32 {
    0.25
}

impl Default for MeshSettings {
    fn default() -> Self {
        MeshSettings {
            tiles_per_adt: default_tiles_per_adt(),
            tile_voxel_size: default_tile_voxel_size(),
            cell_height: default_cell_height(),
            walkable_slope: default_walkable_slope(),
            voxel_walkable_climb: default_walkable_climb(),
            voxel_walkable_height: default_walkable_height(),
            voxel_walkable_radius: default_walkable_radius(),
            max_simplification_error: default_max_simplification_error(),
            min_region_size: default_min_region_size(),
            merge_region_size: default_merge_region_size(),
            vertices_per_polygon: default_vertices_per_polygon(),
            detail_sample_distance: default_detail_sample_distance(),
            detail_sample_max_error: default_detail_sample_max_error(),
        }
    }
}

impl MeshSettings {
    /// Load per-map overrides from a JSON config file, falling back to the
    /// defaults when the file or the map key is absent.
    pub fn load(config_path: Option<&Path>, map_name: &str) -> Result<MeshSettings> {
        let Some(path) = config_path else {
            return Ok(MeshSettings::default());
        };
        if !path.exists() {
            return Ok(MeshSettings::default());
        }

        let text = std::fs::read_to_string(path)?;
        let root: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| tilenav_utility::Error::corrupt(format!("{}: {}", path.display(), e)))?;

        match root.get(map_name) {
            Some(overrides) => serde_json::from_value(overrides.clone())
                .map_err(|e| tilenav_utility::Error::corrupt(format!("{}: {}", path.display(), e))),
            None => Ok(MeshSettings::default()),
        }
    }

    /// World-unit edge of one nav tile.
    pub fn tile_size(&self) -> f32 {
        ADT_SIZE / self.tiles_per_adt as f32
    }

    /// Horizontal voxel edge.
    pub fn cell_size(&self) -> f32 {
        self.tile_size() / self.tile_voxel_size as f32
    }

    /// Heightfield border in voxels.
    pub fn border_size(&self) -> i32 {
        self.voxel_walkable_radius + 3
    }

    /// Full heightfield edge in voxels, border included.
    pub fn field_size(&self) -> i32 {
        self.tile_voxel_size + self.border_size() * 2
    }

    pub fn walkable_height_world(&self) -> f32 {
        self.voxel_walkable_height as f32 * self.cell_height
    }

    pub fn walkable_climb_world(&self) -> f32 {
        self.voxel_walkable_climb as f32 * self.cell_height
    }

    pub fn walkable_radius_world(&self) -> f32 {
        self.voxel_walkable_radius as f32 * self.cell_size()
    }

    pub fn max_edge_len(&self) -> i32 {
        self.voxel_walkable_radius * 4
    }

    /// Nav tiles per world axis.
    pub fn tile_grid(&self) -> i32 {
        tilenav_utility::ADT_GRID * self.tiles_per_adt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let s = MeshSettings::default();
        assert_eq!(s.tiles_per_adt, 8);
        assert!((s.tile_size() - ADT_SIZE / 8.0).abs() < 1e-4);
        assert_eq!(s.field_size(), s.tile_voxel_size + 2 * (s.voxel_walkable_radius + 3));
    }

    #[test]
    fn test_override_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.json");
        std::fs::write(&path, r#"{ "Azeroth": { "tilesPerAdt": 4 } }"#).unwrap();

        let s = MeshSettings::load(Some(&path), "Azeroth").unwrap();
        assert_eq!(s.tiles_per_adt, 4);
        // untouched fields keep their defaults
        assert_eq!(s.tile_voxel_size, default_tile_voxel_size());

        let other = MeshSettings::load(Some(&path), "Kalimdor").unwrap();
        assert_eq!(other.tiles_per_adt, 8);
    }
}
