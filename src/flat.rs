//! Flat (brute-force) L2 vector index.
//!
//! Vectors are stored contiguously in insertion order; search computes the
//! squared Euclidean distance to every stored vector. Search only ever
//! returns positions of vectors that exist, so callers never see the `-1`
//! padding some libraries emit when `k` exceeds the index size.
//!
//! # On-disk layout
//!
//! [`FlatL2Index::write_to`] produces the byte layout of a Faiss
//! `IndexFlatL2` (`write_index`), so snapshots can be opened by Faiss and
//! vice versa. All integers are little-endian.
//!
//! ```text
//! Size     Type     Description
//! ──────────────────────────────────────────────
//! 4        [u8; 4]  fourcc "IxF2"
//! 4        i32      d (dimension)
//! 8        i64      ntotal (vector count)
//! 8        i64      dummy (1 << 20)
//! 8        i64      dummy (1 << 20)
//! 1        u8       is_trained (always 1)
//! 4        i32      metric_type (1 = L2)
//! 8        u64      code count in f32 units (ntotal * d)
//! n*d*4    [f32]    vector data
//! ```

use std::cmp::Ordering;
use std::io::{Read, Write};

use crate::snapshot::FormatError;

const FOURCC_FLAT_L2: [u8; 4] = *b"IxF2";
/// Pre-1.5 Faiss wrote every flat index with this tag and the metric in the header.
const FOURCC_FLAT_LEGACY: [u8; 4] = *b"IxFl";
const METRIC_L2: i32 = 1;
const HEADER_DUMMY: i64 = 1 << 20;

/// Returned when a vector's length disagrees with the index dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("vector has {actual} dimensions, index expects {expected}")]
pub struct DimensionError {
    pub expected: usize,
    pub actual: usize,
}

/// An exact-search index over fixed-dimension `f32` vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn ntotal(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The vector inserted at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Append one vector.
    pub fn add(&mut self, vector: &[f32]) -> Result<(), DimensionError> {
        self.check_dimension(vector)?;
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Append several vectors, all or nothing.
    pub fn add_all(&mut self, vectors: &[Vec<f32>]) -> Result<(), DimensionError> {
        for v in vectors {
            self.check_dimension(v)?;
        }
        self.data.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    /// The `k` nearest stored vectors as `(position, squared_distance)`,
    /// nearest first. Equal distances are ordered by position.
    ///
    /// Returns `min(k, ntotal)` results.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, DimensionError> {
        self.check_dimension(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(pos, v)| (pos, squared_l2(query, v)))
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance_then_position);
            scored.truncate(k);
        }
        scored.sort_by(by_distance_then_position);
        Ok(scored)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), DimensionError> {
        if vector.len() != self.dimension {
            return Err(DimensionError {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Serialize in the Faiss `IndexFlatL2` layout.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&FOURCC_FLAT_L2)?;
        w.write_all(&(self.dimension as i32).to_le_bytes())?;
        w.write_all(&(self.ntotal() as i64).to_le_bytes())?;
        w.write_all(&HEADER_DUMMY.to_le_bytes())?;
        w.write_all(&HEADER_DUMMY.to_le_bytes())?;
        w.write_all(&[1u8])?;
        w.write_all(&METRIC_L2.to_le_bytes())?;
        w.write_all(&(self.data.len() as u64).to_le_bytes())?;

        let mut bytes = Vec::with_capacity(self.data.len() * 4);
        for &v in &self.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        w.write_all(&bytes)
    }

    /// Parse a Faiss `IndexFlatL2` written by [`write_to`](Self::write_to)
    /// or by Faiss itself.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, FormatError> {
        let fourcc: [u8; 4] = read_array(r)?;
        if fourcc != FOURCC_FLAT_L2 && fourcc != FOURCC_FLAT_LEGACY {
            return Err(FormatError::Unsupported(format!(
                "index type {:?} (only flat L2 indexes are supported)",
                String::from_utf8_lossy(&fourcc)
            )));
        }

        let d = i32::from_le_bytes(read_array(r)?);
        let ntotal = i64::from_le_bytes(read_array(r)?);
        let _dummy: [u8; 16] = read_array(r)?;
        let _is_trained: [u8; 1] = read_array(r)?;
        let metric = i32::from_le_bytes(read_array(r)?);

        if d <= 0 {
            return Err(FormatError::Malformed(format!("dimension {}", d)));
        }
        if ntotal < 0 {
            return Err(FormatError::Malformed(format!("vector count {}", ntotal)));
        }
        if metric != METRIC_L2 {
            return Err(FormatError::Unsupported(format!(
                "metric type {} (only L2 is supported)",
                metric
            )));
        }

        let dimension = d as usize;
        let expected = (ntotal as usize)
            .checked_mul(dimension)
            .ok_or_else(|| FormatError::Malformed("vector data size overflows".to_string()))?;
        let count = u64::from_le_bytes(read_array(r)?) as usize;
        if count != expected {
            return Err(FormatError::Malformed(format!(
                "code size {} does not match {} vectors of dimension {}",
                count, ntotal, dimension
            )));
        }

        let byte_len = count
            .checked_mul(4)
            .ok_or_else(|| FormatError::Malformed("vector data size overflows".to_string()))?;
        let mut bytes = Vec::new();
        r.by_ref().take(byte_len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != byte_len {
            return Err(FormatError::Malformed(format!(
                "truncated vector data: expected {} bytes, found {}",
                byte_len,
                bytes.len()
            )));
        }

        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { dimension, data })
    }
}

fn by_distance_then_position(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Squared Euclidean distance.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> Result<[u8; N], FormatError> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            FormatError::Malformed("unexpected end of index file".to_string())
        }
        _ => FormatError::Io(e),
    })?;
    Ok(buf)
}
