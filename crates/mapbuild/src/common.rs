// Area and polygon flags shared between the offline builder and the runtime
// map, plus the serialized heightfield snapshot the runtime re-rasterizes
// obstacles over.

use tilenav_recast::{Context, Heightfield, Span};
use tilenav_utility::stream::ByteStream;
use tilenav_utility::{Error, Result};

/// Per-span / per-poly area bits.  Values stay below the voxel library's
/// 6-bit area limit.
pub mod area {
    pub const ADT: u8 = 0x01;
    pub const LIQUID: u8 = 0x02;
    pub const WMO: u8 = 0x04;
    pub const DOODAD: u8 = 0x08;
}

/// Poly flag bits; the area bits are lifted into the low bits and OR'd with
/// Walkable.
pub mod poly_flags {
    pub const WALKABLE: u16 = 0x10;
    /// Everything a ground query accepts.
    pub const QUERY_INCLUDE: u16 = 0xFFFF;
}

const SNAPSHOT_MAGIC: u32 = u32::from_le_bytes(*b"NAVH");
const SNAPSHOT_VERSION: u32 = 1;

/// An owned copy of a heightfield: dimensions, bounds, and the solid spans
/// of every column.  This is what the tile archive stores.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightfieldSnapshot {
    pub width: i32,
    pub height: i32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub cell_size: f32,
    pub cell_height: f32,
    pub columns: Vec<Vec<Span>>,
}

impl HeightfieldSnapshot {
    pub fn capture(
        heightfield: &Heightfield,
        bmin: [f32; 3],
        bmax: [f32; 3],
        cell_size: f32,
        cell_height: f32,
    ) -> HeightfieldSnapshot {
        let width = heightfield.width();
        let height = heightfield.height();
        let columns = (0..width * height)
            .map(|column| heightfield.column_spans(column))
            .collect();
        HeightfieldSnapshot {
            width,
            height,
            bmin,
            bmax,
            cell_size,
            cell_height,
            columns,
        }
    }

    /// Reconstruct a native heightfield holding exactly these spans.
    pub fn restore(&self, ctx: &Context) -> Result<Heightfield> {
        let mut heightfield = Heightfield::new(
            ctx,
            self.width,
            self.height,
            self.bmin,
            self.bmax,
            self.cell_size,
            self.cell_height,
        )?;
        for (column, spans) in self.columns.iter().enumerate() {
            let x = column as i32 % self.width;
            let y = column as i32 / self.width;
            for span in spans {
                heightfield.add_span(ctx, x, y, *span, 0)?;
            }
        }
        Ok(heightfield)
    }

    pub fn serialize(&self, out: &mut ByteStream) {
        out.write_u32(SNAPSHOT_MAGIC);
        out.write_u32(SNAPSHOT_VERSION);
        out.write_i32(self.width);
        out.write_i32(self.height);
        for v in self.bmin.iter().chain(&self.bmax) {
            out.write_f32(*v);
        }
        out.write_f32(self.cell_size);
        out.write_f32(self.cell_height);
        for column in &self.columns {
            out.write_u16(column.len() as u16);
            for span in column {
                out.write_u16(span.smin);
                out.write_u16(span.smax);
                out.write_u8(span.area);
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = ByteStream::new();
        self.serialize(&mut out);
        out.into_inner()
    }

    pub fn deserialize(stream: &mut ByteStream) -> Result<HeightfieldSnapshot> {
        let magic = stream.read_u32()?;
        if magic != SNAPSHOT_MAGIC {
            return Err(Error::corrupt("heightfield snapshot: bad magic"));
        }
        let version = stream.read_u32()?;
        if version != SNAPSHOT_VERSION {
            return Err(Error::UnsupportedVersion {
                context: "heightfield snapshot".to_string(),
                expected: SNAPSHOT_VERSION,
                found: version,
            });
        }

        let width = stream.read_i32()?;
        let height = stream.read_i32()?;
        if width <= 0 || height <= 0 || width > 4096 || height > 4096 {
            return Err(Error::corrupt("heightfield snapshot: bad dimensions"));
        }
        let mut bmin = [0f32; 3];
        let mut bmax = [0f32; 3];
        for v in bmin.iter_mut() {
            *v = stream.read_f32()?;
        }
        for v in bmax.iter_mut() {
            *v = stream.read_f32()?;
        }
        let cell_size = stream.read_f32()?;
        let cell_height = stream.read_f32()?;

        let mut columns = Vec::with_capacity((width * height) as usize);
        for _ in 0..width * height {
            let count = stream.read_u16()? as usize;
            let mut spans = Vec::with_capacity(count);
            for _ in 0..count {
                spans.push(Span {
                    smin: stream.read_u16()?,
                    smax: stream.read_u16()?,
                    area: stream.read_u8()?,
                });
            }
            columns.push(spans);
        }

        Ok(HeightfieldSnapshot {
            width,
            height,
            bmin,
            bmax,
            cell_size,
            cell_height,
            columns,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<HeightfieldSnapshot> {
        let mut stream = ByteStream::wrap(bytes.to_vec(), "heightfield snapshot");
        Self::deserialize(&mut stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_byte_round_trip() {
        let snapshot = HeightfieldSnapshot {
            width: 2,
            height: 2,
            bmin: [-1.0, 0.0, -1.0],
            bmax: [1.0, 10.0, 1.0],
            cell_size: 0.5,
            cell_height: 0.25,
            columns: vec![
                vec![Span {
                    smin: 0,
                    smax: 4,
                    area: area::ADT,
                }],
                vec![],
                vec![
                    Span {
                        smin: 0,
                        smax: 2,
                        area: area::ADT,
                    },
                    Span {
                        smin: 10,
                        smax: 12,
                        area: area::DOODAD,
                    },
                ],
                vec![],
            ],
        };

        let bytes = snapshot.to_bytes();
        let restored = HeightfieldSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot, restored);
        // serialization is stable
        assert_eq!(bytes, restored.to_bytes());
    }

    #[test]
    fn test_snapshot_bad_magic() {
        let mut bytes = HeightfieldSnapshot {
            width: 1,
            height: 1,
            bmin: [0.0; 3],
            bmax: [1.0; 3],
            cell_size: 1.0,
            cell_height: 1.0,
            columns: vec![vec![]],
        }
        .to_bytes();
        bytes[0] ^= 0xFF;
        assert!(HeightfieldSnapshot::from_bytes(&bytes).is_err());
    }
}
