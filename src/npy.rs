//! NumPy `.npy` codec for the chunk list.
//!
//! Chunks are stored the way `numpy.save` stores a list of Python strings:
//! a 1-D little-endian unicode array (`<U{n}`), each element `n` UTF-32
//! code units wide and NUL-padded. An empty list is written as a `<f8`
//! array of shape `(0,)`, which is what NumPy produces for `[]`.
//!
//! Only what the snapshot needs is supported: 1-D C-order unicode arrays
//! (and empty arrays of any dtype). Pickled object arrays are rejected.

use std::io::{Read, Write};

use crate::snapshot::FormatError;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
/// magic (6) + version (2) + v1 header length (2)
const PREAMBLE_V1: usize = 10;
const ALIGNMENT: usize = 64;

/// Write `chunks` as a `.npy` unicode array.
pub fn write_chunks<W: Write>(w: &mut W, chunks: &[String]) -> std::io::Result<()> {
    let width = chunks
        .iter()
        .map(|c| c.chars().count())
        .max()
        .unwrap_or(0)
        .max(1);

    let descr = if chunks.is_empty() {
        "<f8".to_string()
    } else {
        format!("<U{}", width)
    };
    let header = build_header(&descr, chunks.len());

    w.write_all(MAGIC)?;
    w.write_all(&[1u8, 0u8])?;
    w.write_all(&(header.len() as u16).to_le_bytes())?;
    w.write_all(header.as_bytes())?;

    let mut data = Vec::with_capacity(chunks.len() * width * 4);
    for chunk in chunks {
        let mut written = 0;
        for ch in chunk.chars() {
            data.extend_from_slice(&(ch as u32).to_le_bytes());
            written += 1;
        }
        for _ in written..width {
            data.extend_from_slice(&0u32.to_le_bytes());
        }
    }
    w.write_all(&data)
}

/// Header dict padded with spaces and terminated by `\n` so the data
/// starts on a 64-byte boundary.
fn build_header(descr: &str, len: usize) -> String {
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({},), }}",
        descr, len
    );
    let unpadded = PREAMBLE_V1 + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    header
}

/// Read a chunk list written by [`write_chunks`] or by `numpy.save`.
pub fn read_chunks<R: Read>(r: &mut R) -> Result<Vec<String>, FormatError> {
    let mut magic = [0u8; 6];
    read_exact(r, &mut magic)?;
    if &magic != MAGIC {
        return Err(FormatError::Malformed("not a .npy file".to_string()));
    }

    let mut version = [0u8; 2];
    read_exact(r, &mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            read_exact(r, &mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            read_exact(r, &mut len)?;
            u32::from_le_bytes(len) as usize
        }
        v => {
            return Err(FormatError::Unsupported(format!(".npy version {}", v)));
        }
    };

    let mut header = Vec::new();
    r.by_ref().take(header_len as u64).read_to_end(&mut header)?;
    if header.len() != header_len {
        return Err(FormatError::Malformed("truncated .npy header".to_string()));
    }
    let header = String::from_utf8(header)
        .map_err(|_| FormatError::Malformed(".npy header is not UTF-8".to_string()))?;

    let descr = header_value(&header, "descr")?
        .trim_matches(|c: char| c == '\'' || c == '"')
        .to_string();
    let fortran_order = header_value(&header, "fortran_order")?;
    let shape = parse_shape(header_value(&header, "shape")?)?;

    let len = match shape.as_slice() {
        [n] => *n,
        _ => {
            return Err(FormatError::Unsupported(format!(
                "array shape {:?} (expected 1-D)",
                shape
            )))
        }
    };
    if len == 0 {
        return Ok(Vec::new());
    }
    if fortran_order != "False" {
        return Err(FormatError::Unsupported("Fortran-ordered arrays".to_string()));
    }

    let width: usize = match descr.strip_prefix("<U") {
        Some(w) => w
            .parse()
            .map_err(|_| FormatError::Malformed(format!("dtype {}", descr)))?,
        None if descr.contains('O') => {
            return Err(FormatError::Unsupported(
                "pickled object arrays".to_string(),
            ))
        }
        None => return Err(FormatError::Unsupported(format!("dtype {}", descr))),
    };
    if width == 0 {
        return Err(FormatError::Malformed(format!(
            "zero-width dtype {} for {} elements",
            descr, len
        )));
    }

    let byte_len = len
        .checked_mul(width)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| FormatError::Malformed("array size overflows".to_string()))?;
    let mut data = Vec::new();
    r.by_ref().take(byte_len as u64).read_to_end(&mut data)?;
    if data.len() != byte_len {
        return Err(FormatError::Malformed(format!(
            "truncated array data: expected {} bytes, found {}",
            byte_len,
            data.len()
        )));
    }

    let mut chunks = Vec::with_capacity(len);
    for element in data.chunks_exact(width * 4) {
        let mut s = String::new();
        for unit in element.chunks_exact(4) {
            let code = u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]);
            let ch = char::from_u32(code).ok_or_else(|| {
                FormatError::Malformed(format!("invalid code point {:#x}", code))
            })?;
            s.push(ch);
        }
        // NumPy strips trailing NULs when reading fixed-width strings.
        let trimmed_len = s.trim_end_matches('\0').len();
        s.truncate(trimmed_len);
        chunks.push(s);
    }
    Ok(chunks)
}

/// Raw text of `key`'s value in the header dict, e.g. `'<U5'`, `False`, `(2,)`.
fn header_value<'a>(header: &'a str, key: &str) -> Result<&'a str, FormatError> {
    let missing = || FormatError::Malformed(format!(".npy header has no '{}'", key));
    let needle_single = format!("'{}':", key);
    let needle_double = format!("\"{}\":", key);
    let start = header
        .find(&needle_single)
        .map(|p| p + needle_single.len())
        .or_else(|| header.find(&needle_double).map(|p| p + needle_double.len()))
        .ok_or_else(missing)?;
    let rest = header[start..].trim_start();

    let end = if rest.starts_with('(') {
        rest.find(')').map(|p| p + 1)
    } else if let Some(quote) = rest.chars().next().filter(|c| *c == '\'' || *c == '"') {
        rest[1..].find(quote).map(|p| p + 2)
    } else {
        rest.find(|c: char| c == ',' || c == '}')
    };
    let end = end.ok_or_else(missing)?;
    Ok(rest[..end].trim())
}

fn parse_shape(raw: &str) -> Result<Vec<usize>, FormatError> {
    raw.trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| FormatError::Malformed(format!("shape {}", raw)))
        })
        .collect()
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), FormatError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            FormatError::Malformed("unexpected end of .npy file".to_string())
        }
        _ => FormatError::Io(e),
    })
}
