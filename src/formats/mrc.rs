use super::{Dimensions, Endian};

pub(crate) const HEADER_LEN: usize = 1024;

const OFFSET_MODE: usize = 12;
const OFFSET_MZ: usize = 36;
const OFFSET_ISPG: usize = 88;
const OFFSET_MAP: usize = 208;
const OFFSET_MACHST: usize = 212;

const VALID_MODES: &[i32] = &[0, 1, 2, 3, 4, 6, 12, 16, 101];

pub const ISPG_IMAGE_STACK: i32 = 0;
pub const ISPG_VOLUME: i32 = 1;
pub const ISPG_VOLUME_STACK: i32 = 401;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrcHeader {
    pub nx: i32,
    pub ny: i32,
    pub nz: i32,
    pub mode: i32,
    pub mz: i32,
    pub ispg: i32,
    pub big_endian: bool,
}

impl MrcHeader {
    pub fn volume(nx: i32, ny: i32, nz: i32) -> Self {
        Self {
            nx,
            ny,
            nz,
            mode: 2,
            mz: nz,
            ispg: ISPG_VOLUME,
            big_endian: false,
        }
    }

    pub fn image_stack(nx: i32, ny: i32, sections: i32) -> Self {
        Self {
            mz: 1,
            ispg: ISPG_IMAGE_STACK,
            ..Self::volume(nx, ny, sections)
        }
    }

    pub fn volume_stack(nx: i32, ny: i32, depth: i32, count: i32) -> Self {
        Self {
            nz: depth * count,
            mz: depth,
            ispg: ISPG_VOLUME_STACK,
            ..Self::volume(nx, ny, depth)
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("MRC header needs {HEADER_LEN} bytes, got {}", bytes.len()));
        }
        let endian = detect_endian(bytes)?;
        let header = Self {
            nx: endian.i32_at(bytes, 0),
            ny: endian.i32_at(bytes, 4),
            nz: endian.i32_at(bytes, 8),
            mode: endian.i32_at(bytes, OFFSET_MODE),
            mz: endian.i32_at(bytes, OFFSET_MZ),
            ispg: endian.i32_at(bytes, OFFSET_ISPG),
            big_endian: endian == Endian::Big,
        };
        if header.nx <= 0 || header.ny <= 0 || header.nz <= 0 {
            return Err(format!(
                "non-positive dimensions {} x {} x {}",
                header.nx, header.ny, header.nz
            ));
        }
        if !VALID_MODES.contains(&header.mode) {
            return Err(format!("unknown data mode {}", header.mode));
        }
        Ok(header)
    }

    pub fn dimensions(&self) -> Dimensions {
        let (x, y, nz) = (self.nx as u32, self.ny as u32, self.nz as u32);
        match self.ispg {
            ISPG_IMAGE_STACK => Dimensions::new(x, y, 1, nz),
            ISPG_VOLUME_STACK if self.mz > 0 && self.nz % self.mz == 0 => {
                let depth = self.mz as u32;
                Dimensions::new(x, y, depth, nz / depth)
            }
            _ => Dimensions::new(x, y, nz, 1),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        let put = |out: &mut Vec<u8>, offset: usize, value: i32| {
            let word = if self.big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            out[offset..offset + 4].copy_from_slice(&word);
        };
        put(&mut out, 0, self.nx);
        put(&mut out, 4, self.ny);
        put(&mut out, 8, self.nz);
        put(&mut out, OFFSET_MODE, self.mode);
        put(&mut out, 28, self.nx);
        put(&mut out, 32, self.ny);
        put(&mut out, OFFSET_MZ, self.mz);
        put(&mut out, 64, 1);
        put(&mut out, 68, 2);
        put(&mut out, 72, 3);
        put(&mut out, OFFSET_ISPG, self.ispg);
        out[OFFSET_MAP..OFFSET_MAP + 4].copy_from_slice(b"MAP ");
        let stamp: [u8; 4] = if self.big_endian {
            [0x11, 0x11, 0x00, 0x00]
        } else {
            [0x44, 0x44, 0x00, 0x00]
        };
        out[OFFSET_MACHST..OFFSET_MACHST + 4].copy_from_slice(&stamp);
        out
    }
}

fn detect_endian(bytes: &[u8]) -> Result<Endian, String> {
    match bytes[OFFSET_MACHST] {
        0x11 => return Ok(Endian::Big),
        0x44 => return Ok(Endian::Little),
        _ => {}
    }
    // Old writers left the stamp empty; fall back to a plausibility check.
    for endian in [Endian::Little, Endian::Big] {
        let nx = endian.i32_at(bytes, 0);
        let mode = endian.i32_at(bytes, OFFSET_MODE);
        if nx > 0 && nx < (1 << 24) && VALID_MODES.contains(&mode) {
            return Ok(endian);
        }
    }
    Err("cannot determine byte order".to_string())
}
