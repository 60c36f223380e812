//! Minimal NumPy `.npy` reader for float matrices
//!
//! Supports format versions 1.0, 2.0 and 3.0 with little-endian `<f4` or
//! `<f8` data in C order. `<f8` data is narrowed to `f32`.

use ndarray::{ArrayD, IxDyn};
use std::path::Path;

use super::IndexError;

const MAGIC: &[u8] = b"\x93NUMPY";

/// Element types this reader accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F32,
    F64,
}

impl Dtype {
    fn size(self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::F64 => 8,
        }
    }
}

/// Parsed header dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Read a `.npy` file into an `f32` array of whatever rank it holds.
pub fn read_npy(path: &Path) -> Result<ArrayD<f32>, IndexError> {
    let bytes = std::fs::read(path).map_err(|e| IndexError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_npy(&bytes)
}

/// Parse an in-memory `.npy` image.
pub fn parse_npy(bytes: &[u8]) -> Result<ArrayD<f32>, IndexError> {
    if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(IndexError::Format("not a .npy file".to_string()));
    }

    let major = bytes[MAGIC.len()];
    let mut pos = MAGIC.len() + 2;
    let header_len = match major {
        1 => {
            let raw = take(bytes, pos, 2)?;
            pos += 2;
            u16::from_le_bytes([raw[0], raw[1]]) as usize
        }
        2 | 3 => {
            let raw = take(bytes, pos, 4)?;
            pos += 4;
            u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
        }
        other => {
            return Err(IndexError::Format(format!(
                "unsupported .npy version {}",
                other
            )))
        }
    };

    let header_bytes = take(bytes, pos, header_len)?;
    pos += header_len;
    let header_text = std::str::from_utf8(header_bytes)
        .map_err(|_| IndexError::Format("header is not valid text".to_string()))?;
    let header = parse_header(header_text)?;

    if header.fortran_order {
        return Err(IndexError::Format(
            "Fortran-ordered arrays are not supported".to_string(),
        ));
    }

    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| IndexError::Format("array size overflows".to_string()))?;
    let data_len = count
        .checked_mul(header.dtype.size())
        .ok_or_else(|| IndexError::Format("array size overflows".to_string()))?;
    let data = take(bytes, pos, data_len)?;

    let values: Vec<f32> = match header.dtype {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F64 => data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
    };

    ArrayD::from_shape_vec(IxDyn(&header.shape), values)
        .map_err(|e| IndexError::Format(e.to_string()))
}

fn take(bytes: &[u8], pos: usize, len: usize) -> Result<&[u8], IndexError> {
    pos.checked_add(len)
        .and_then(|end| bytes.get(pos..end))
        .ok_or_else(|| IndexError::Format("file is truncated".to_string()))
}

/// Parse the Python dict literal, e.g.
/// `{'descr': '<f4', 'fortran_order': False, 'shape': (10, 512), }`
fn parse_header(text: &str) -> Result<Header, IndexError> {
    let descr = quoted_value(text, "descr")
        .ok_or_else(|| IndexError::Format("header has no 'descr'".to_string()))?;
    let dtype = match descr {
        "<f4" => Dtype::F32,
        "<f8" => Dtype::F64,
        other => {
            return Err(IndexError::Format(format!(
                "unsupported dtype '{}' (expected '<f4' or '<f8')",
                other
            )))
        }
    };

    let fortran = raw_value(text, "fortran_order")
        .ok_or_else(|| IndexError::Format("header has no 'fortran_order'".to_string()))?;
    let fortran_order = if fortran.starts_with("True") {
        true
    } else if fortran.starts_with("False") {
        false
    } else {
        return Err(IndexError::Format(format!(
            "invalid fortran_order value '{}'",
            fortran
        )));
    };

    let shape_text = raw_value(text, "shape")
        .ok_or_else(|| IndexError::Format("header has no 'shape'".to_string()))?;
    let open = shape_text
        .strip_prefix('(')
        .ok_or_else(|| IndexError::Format("shape is not a tuple".to_string()))?;
    let close = open
        .find(')')
        .ok_or_else(|| IndexError::Format("shape tuple is not closed".to_string()))?;
    let shape = open[..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| IndexError::Format(format!("invalid shape dimension '{}'", s)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Header {
        dtype,
        fortran_order,
        shape,
    })
}

/// Text following `'key':`, with leading whitespace removed
fn raw_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{}'", key);
    let after_key = &text[text.find(&needle)? + needle.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?;
    Some(after_colon.trim_start())
}

fn quoted_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let value = raw_value(text, key)?;
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = &value[1..];
    let end = inner.find(quote)?;
    Some(&inner[..end])
}

/// Serialize a C-ordered `<f4` array as a version 1.0 `.npy` image.
#[cfg(test)]
pub(crate) fn encode_f32(shape: &[usize], data: &[f32]) -> Vec<u8> {
    encode(shape, "<f4", &data.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>(), false)
}

#[cfg(test)]
pub(crate) fn encode(shape: &[usize], descr: &str, data: &[u8], fortran_order: bool) -> Vec<u8> {
    let dims = match shape {
        [single] => format!("{},", single),
        _ => shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': {}, 'shape': ({}), }}",
        descr,
        if fortran_order { "True" } else { "False" },
        dims
    );
    // Header is padded with spaces so the data starts on a 64-byte boundary
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_f32_matrix() {
        let bytes = encode_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let array = parse_npy(&bytes).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 2]], 6.0);
    }

    #[test]
    fn test_reads_f64_matrix_as_f32() {
        let data: Vec<u8> = [0.5f64, -1.25].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = encode(&[1, 2], "<f8", &data, false);
        let array = parse_npy(&bytes).unwrap();
        assert_eq!(array.shape(), &[1, 2]);
        assert_eq!(array[[0, 1]], -1.25);
    }

    #[test]
    fn test_reads_version_two_header() {
        let v1 = encode_f32(&[1, 2], &[7.0, 8.0]);
        let header_len = u16::from_le_bytes([v1[8], v1[9]]) as u32;

        let mut v2 = Vec::new();
        v2.extend_from_slice(MAGIC);
        v2.extend_from_slice(&[2, 0]);
        v2.extend_from_slice(&header_len.to_le_bytes());
        v2.extend_from_slice(&v1[10..]);

        let array = parse_npy(&v2).unwrap();
        assert_eq!(array[[0, 1]], 8.0);
    }

    #[test]
    fn test_one_dimensional_shape() {
        let bytes = encode_f32(&[3], &[1.0, 2.0, 3.0]);
        assert_eq!(parse_npy(&bytes).unwrap().shape(), &[3]);
    }

    #[test]
    fn test_rejects_integer_dtype() {
        let bytes = encode(&[1, 1], "<i8", &[0; 8], false);
        let err = parse_npy(&bytes).unwrap_err();
        assert!(matches!(err, IndexError::Format(ref msg) if msg.contains("<i8")), "{:?}", err);
    }

    #[test]
    fn test_rejects_big_endian() {
        let bytes = encode(&[1, 1], ">f4", &[0; 4], false);
        assert!(matches!(parse_npy(&bytes), Err(IndexError::Format(_))));
    }

    #[test]
    fn test_rejects_fortran_order() {
        let bytes = encode(&[1, 1], "<f4", &[0; 4], true);
        let err = parse_npy(&bytes).unwrap_err();
        assert!(err.to_string().contains("Fortran"));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut bytes = encode_f32(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(parse_npy(&bytes), Err(IndexError::Format(_))));
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(matches!(
            parse_npy(b"PK\x03\x04 not numpy"),
            Err(IndexError::Format(_))
        ));
    }

    #[test]
    fn test_header_parsing_tolerates_spacing() {
        let header =
            parse_header("{'descr':'<f4','fortran_order':False,'shape':(4,512)}").unwrap();
        assert_eq!(header.shape, vec![4, 512]);
        assert_eq!(header.dtype, Dtype::F32);
    }
}
