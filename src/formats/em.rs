use super::{Dimensions, Endian};

pub(crate) const HEADER_LEN: usize = 512;

const MACHINE_SGI: u8 = 3;
const MACHINE_MAC: u8 = 5;
const KNOWN_MACHINES: &[u8] = &[0, 1, 2, 3, 4, 5, 6];
const KNOWN_TYPES: &[u8] = &[1, 2, 4, 5, 8, 9];

pub(crate) fn parse(bytes: &[u8]) -> Result<Dimensions, String> {
    let machine = bytes[0];
    if !KNOWN_MACHINES.contains(&machine) {
        return Err(format!("unknown EM machine code {machine}"));
    }
    let data_type = bytes[3];
    if !KNOWN_TYPES.contains(&data_type) {
        return Err(format!("unknown EM data type {data_type}"));
    }
    let endian = if matches!(machine, MACHINE_SGI | MACHINE_MAC) {
        Endian::Big
    } else {
        Endian::Little
    };
    let nx = endian.i32_at(bytes, 4);
    let ny = endian.i32_at(bytes, 8);
    let nz = endian.i32_at(bytes, 12);
    if nx <= 0 || ny <= 0 || nz <= 0 {
        return Err(format!("non-positive dimensions {nx} x {ny} x {nz}"));
    }
    Ok(Dimensions::new(nx as u32, ny as u32, nz as u32, 1))
}
