// Synthetic world files for tests.
//
// These writers produce the same tagged-chunk formats the parser reads, so
// integration tests across the workspace can stand up miniature worlds in a
// temp directory without shipping binary blobs.

use std::path::Path;

use tilenav_utility::math::Vec3;
use tilenav_utility::stream::ByteStream;
use tilenav_utility::{Result, ADT_GRID, CHUNK_GRID};

/// Frame a chunk body with its reversed tag and size.
pub fn chunk(name: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&[name[3], name[2], name[1], name[0]]);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn mver(version: u32) -> Vec<u8> {
    chunk(b"MVER", &version.to_le_bytes())
}

/// WDT listing the given ADT coordinates.
pub fn write_wdt(adts: &[(i32, i32)]) -> Vec<u8> {
    let mut main = Vec::with_capacity((ADT_GRID * ADT_GRID * 8) as usize);
    for adt_y in 0..ADT_GRID {
        for adt_x in 0..ADT_GRID {
            let flags: u32 = if adts.contains(&(adt_x, adt_y)) { 1 } else { 0 };
            main.extend_from_slice(&flags.to_le_bytes());
            main.extend_from_slice(&0u32.to_le_bytes());
        }
    }

    let mut out = mver(18);
    out.extend(chunk(b"MPHD", &[0u8; 32]));
    out.extend(chunk(b"MAIN", &main));
    out
}

/// WDT for a map that is a single global WMO.
pub fn write_wdt_global_wmo(wmo_name: &str, position: Vec3) -> Vec<u8> {
    let main = vec![0u8; (ADT_GRID * ADT_GRID * 8) as usize];

    let mut mphd = [0u8; 32];
    mphd[..4].copy_from_slice(&1u32.to_le_bytes());

    let mut name_table = Vec::new();
    name_table.extend_from_slice(wmo_name.as_bytes());
    name_table.push(0);

    let mut modf = ByteStream::new();
    modf.write_u32(0); // name id
    modf.write_u32(0); // unique id
    modf.write_vec3(position);
    modf.write_vec3(Vec3::new(0.0, 0.0, 0.0)); // rotation
    modf.append(&[0u8; 24]); // bounds
    modf.write_u16(0); // flags
    modf.write_u16(0); // doodad set
    modf.write_u16(0); // name set
    modf.write_u16(0);

    let mut out = mver(18);
    out.extend(chunk(b"MPHD", &mphd));
    out.extend(chunk(b"MAIN", &main));
    out.extend(chunk(b"MWMO", &name_table));
    out.extend(chunk(b"MODF", modf.contents()));
    out
}

/// One MDDF-style doodad placement for write_adt.
#[derive(Clone, Debug)]
pub struct FixtureDoodad {
    pub name_id: u32,
    pub unique_id: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
}

/// One MODF-style WMO placement for write_adt.
#[derive(Clone, Debug)]
pub struct FixtureWmo {
    pub name_id: u32,
    pub unique_id: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub doodad_set: u16,
}

/// A full 16x16-chunk ADT with flat terrain at the given height.
pub fn write_flat_adt(height: f32) -> Vec<u8> {
    write_adt(height, &[], &[], &[], &[], None)
}

/// A full ADT: flat terrain, optional doodad/WMO placements and an optional
/// flat liquid plane.
pub fn write_adt(
    height: f32,
    doodad_names: &[&str],
    doodads: &[FixtureDoodad],
    wmo_names: &[&str],
    wmos: &[FixtureWmo],
    liquid_height: Option<f32>,
) -> Vec<u8> {
    let mut out = mver(18);

    if !doodad_names.is_empty() {
        let mut table = Vec::new();
        for name in doodad_names {
            table.extend_from_slice(name.as_bytes());
            table.push(0);
        }
        out.extend(chunk(b"MMDX", &table));
    }

    if !wmo_names.is_empty() {
        let mut table = Vec::new();
        for name in wmo_names {
            table.extend_from_slice(name.as_bytes());
            table.push(0);
        }
        out.extend(chunk(b"MWMO", &table));
    }

    if !doodads.is_empty() {
        let mut body = ByteStream::new();
        for d in doodads {
            body.write_u32(d.name_id);
            body.write_u32(d.unique_id);
            body.write_vec3(d.position);
            body.write_vec3(d.rotation);
            body.write_u16((d.scale * 1024.0) as u16);
            body.write_u16(0); // flags
        }
        out.extend(chunk(b"MDDF", body.contents()));
    }

    if !wmos.is_empty() {
        let mut body = ByteStream::new();
        for w in wmos {
            body.write_u32(w.name_id);
            body.write_u32(w.unique_id);
            body.write_vec3(w.position);
            body.write_vec3(w.rotation);
            body.append(&[0u8; 24]); // bounds
            body.write_u16(0); // flags
            body.write_u16(w.doodad_set);
            body.write_u16(0); // name set
            body.write_u16(0);
        }
        out.extend(chunk(b"MODF", body.contents()));
    }

    for index_y in 0..CHUNK_GRID as u32 {
        for index_x in 0..CHUNK_GRID as u32 {
            let mut body = ByteStream::new();
            body.write_u32(index_x);
            body.write_u32(index_y);
            body.write_u32(0); // area id
            body.write_u32(0); // holes
            body.write_f32(height);

            let heights = [0u8; (9 * 9 + 8 * 8) * 4];
            body.append(&chunk(b"MCVT", &heights));

            if let Some(level) = liquid_height {
                let mut liq = ByteStream::new();
                for _ in 0..9 * 9 {
                    liq.write_f32(level);
                }
                liq.append(&[0u8; 8 * 8]); // all cells live
                body.append(&chunk(b"MCLQ", liq.contents()));
            }

            out.extend(chunk(b"MCNK", body.contents()));
        }
    }

    out
}

/// Synthetic MD20 doodad from a triangle soup.
pub fn write_doodad_file(vertices: &[Vec3], indices: &[u16]) -> Vec<u8> {
    let mut out = ByteStream::new();
    out.append(b"MD20");
    out.write_u32(264);

    let header_end = 4 + 4 + 16;
    let vertex_offset = header_end;
    let index_offset = vertex_offset + vertices.len() * 12;

    out.write_u32(vertices.len() as u32);
    out.write_u32(vertex_offset as u32);
    out.write_u32(indices.len() as u32);
    out.write_u32(index_offset as u32);

    for v in vertices {
        out.write_vec3(*v);
    }
    for &i in indices {
        out.write_u16(i);
    }

    out.into_inner()
}

/// One embedded doodad placement for write_wmo_files_with_doodads.
#[derive(Clone, Debug)]
pub struct FixtureWmoDoodad {
    /// Index into the MODN name list; the high byte may carry flag bits.
    pub name_id: u32,
    pub position: Vec3,
    pub scale: f32,
}

/// Synthetic WMO (root + one group) from a triangle soup.  Returns
/// (file name suffix, bytes) pairs to install under the data root.
pub fn write_wmo_files(base_name: &str, vertices: &[Vec3], indices: &[u16]) -> Vec<(String, Vec<u8>)> {
    write_wmo_files_with_doodads(base_name, vertices, indices, &[], &[])
}

/// Like write_wmo_files, plus one doodad set holding every placement.
pub fn write_wmo_files_with_doodads(
    base_name: &str,
    vertices: &[Vec3],
    indices: &[u16],
    doodad_names: &[&str],
    placements: &[FixtureWmoDoodad],
) -> Vec<(String, Vec<u8>)> {
    let mut root = mver(17);
    let mut mohd = ByteStream::new();
    mohd.write_u32(1); // group count
    mohd.write_u32(if placements.is_empty() { 0 } else { 1 }); // doodad set count
    root.extend(chunk(b"MOHD", mohd.contents()));

    if !placements.is_empty() {
        let mut mods = ByteStream::new();
        let mut set_name = [0u8; 20];
        let label = b"Set_$DefaultGlobal";
        set_name[..label.len()].copy_from_slice(label);
        mods.append(&set_name);
        mods.write_u32(0); // first placement
        mods.write_u32(placements.len() as u32);
        mods.write_u32(0);
        root.extend(chunk(b"MODS", mods.contents()));

        let mut modn = Vec::new();
        for name in doodad_names {
            modn.extend_from_slice(name.as_bytes());
            modn.push(0);
        }
        root.extend(chunk(b"MODN", &modn));

        // 40 bytes per record: name, position, quaternion, scale, color
        let mut modd = ByteStream::new();
        for p in placements {
            modd.write_u32(p.name_id);
            modd.write_vec3(p.position);
            modd.write_f32(0.0);
            modd.write_f32(0.0);
            modd.write_f32(0.0);
            modd.write_f32(1.0);
            modd.write_f32(p.scale);
            modd.write_u32(0);
        }
        root.extend(chunk(b"MODD", modd.contents()));
    }

    let mut group = mver(17);
    let mut body = ByteStream::new();
    body.write_u32(0); // group flags
    let mut bounds = tilenav_utility::math::BoundingBox::empty();
    for v in vertices {
        bounds.update(*v);
    }
    body.write_bounds(&bounds);

    let mut movt = ByteStream::new();
    for v in vertices {
        movt.write_vec3(*v);
    }
    body.append(&chunk(b"MOVT", movt.contents()));

    let mut movi = ByteStream::new();
    for &i in indices {
        movi.write_u16(i);
    }
    body.append(&chunk(b"MOVI", movi.contents()));

    group.extend(chunk(b"MOGP", body.contents()));

    vec![
        (format!("{}.wmo", base_name), root),
        (format!("{}_000.wmo", base_name), group),
    ]
}

/// A unit cube centered on the origin, 2 units on a side.
pub fn cube_soup(half_extent: f32) -> (Vec<Vec3>, Vec<u16>) {
    let e = half_extent;
    let vertices = vec![
        Vec3::new(-e, -e, -e),
        Vec3::new(e, -e, -e),
        Vec3::new(e, e, -e),
        Vec3::new(-e, e, -e),
        Vec3::new(-e, -e, e),
        Vec3::new(e, -e, e),
        Vec3::new(e, e, e),
        Vec3::new(-e, e, e),
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // bottom
        4, 5, 6, 4, 6, 7, // top
        0, 1, 5, 0, 5, 4, // sides
        1, 2, 6, 1, 6, 5, //
        2, 3, 7, 2, 7, 6, //
        3, 0, 4, 3, 4, 7,
    ];
    (vertices, indices)
}

/// Write a minimal flat-terrain map into `root`, returning nothing but
/// leaving the directory ready for Data::new + Map::open.
pub fn install_flat_map(
    root: &Path,
    map_name: &str,
    adts: &[(i32, i32)],
    height: f32,
) -> Result<()> {
    let map_dir = root.join("Maps").join(map_name);
    std::fs::create_dir_all(&map_dir)?;

    std::fs::write(map_dir.join(format!("{}.wdt", map_name)), write_wdt(adts))?;
    for (x, y) in adts {
        std::fs::write(
            map_dir.join(format!("{}_{}_{}.adt", map_name, x, y)),
            write_flat_adt(height),
        )?;
    }
    Ok(())
}
