use super::{Dimensions, Endian};

pub(crate) const HEADER_MIN_LEN: usize = 27 * 4;

const WORD_NSLICE: usize = 0;
const WORD_NROW: usize = 1;
const WORD_IFORM: usize = 4;
const WORD_NSAM: usize = 11;
const WORD_ISTACK: usize = 23;
const WORD_MAXIM: usize = 25;

const VALID_IFORMS: &[i32] = &[1, 3, -11, -12, -21, -22];

pub(crate) fn parse(bytes: &[u8]) -> Result<Dimensions, String> {
    let endian = [Endian::Little, Endian::Big]
        .into_iter()
        .find(|endian| VALID_IFORMS.contains(&word(bytes, *endian, WORD_IFORM)))
        .ok_or_else(|| "not a SPIDER header (unknown IFORM)".to_string())?;

    let nslice = word(bytes, endian, WORD_NSLICE);
    let nrow = word(bytes, endian, WORD_NROW);
    let nsam = word(bytes, endian, WORD_NSAM);
    if nslice <= 0 || nrow <= 0 || nsam <= 0 {
        return Err(format!(
            "non-positive dimensions {nsam} x {nrow} x {nslice}"
        ));
    }

    let count = if word(bytes, endian, WORD_ISTACK) > 0 {
        word(bytes, endian, WORD_MAXIM).max(1)
    } else {
        1
    };
    Ok(Dimensions::new(
        nsam as u32,
        nrow as u32,
        nslice as u32,
        count as u32,
    ))
}

fn word(bytes: &[u8], endian: Endian, index: usize) -> i32 {
    endian.f32_at(bytes, index * 4) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(words: &[(usize, f32)], big_endian: bool) -> Vec<u8> {
        let mut out = vec![0u8; 256];
        for (index, value) in words {
            let bytes = if big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            out[index * 4..index * 4 + 4].copy_from_slice(&bytes);
        }
        out
    }

    #[test]
    fn parse_volume() {
        let bytes = header(
            &[
                (WORD_NSLICE, 30.0),
                (WORD_NROW, 40.0),
                (WORD_IFORM, 3.0),
                (WORD_NSAM, 50.0),
            ],
            false,
        );
        assert_eq!(parse(&bytes).unwrap().as_tuple(), (50, 40, 30, 1));
    }

    #[test]
    fn parse_big_endian_stack() {
        let bytes = header(
            &[
                (WORD_NSLICE, 16.0),
                (WORD_NROW, 16.0),
                (WORD_IFORM, 3.0),
                (WORD_NSAM, 16.0),
                (WORD_ISTACK, 2.0),
                (WORD_MAXIM, 7.0),
            ],
            true,
        );
        assert_eq!(parse(&bytes).unwrap().as_tuple(), (16, 16, 16, 7));
    }

    #[test]
    fn rejects_unknown_iform() {
        let bytes = header(&[(WORD_IFORM, 42.0)], false);
        assert!(parse(&bytes).is_err());
    }
}
