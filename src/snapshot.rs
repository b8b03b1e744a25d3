//! On-disk snapshot of a vector index: a directory holding the serialized
//! flat index (`index.faiss`) and the positionally aligned chunk list
//! (`chunks.npy`).
//!
//! The two files are always written and read together. Each is written to a
//! temporary sibling and renamed into place, so a crash mid-save leaves the
//! previous file intact rather than a truncated one.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::flat::FlatL2Index;
use crate::index::IndexError;
use crate::npy;

pub const INDEX_FILE: &str = "index.faiss";
pub const CHUNKS_FILE: &str = "chunks.npy";

/// Failure to decode one of the snapshot files.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("malformed file: {0}")]
    Malformed(String),

    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded snapshot: the vectors and their chunks, counts verified equal.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub index: FlatL2Index,
    pub chunks: Vec<String>,
}

impl Snapshot {
    /// Write `index` and `chunks` under `dir`, creating it if needed.
    pub fn write(dir: &Path, index: &FlatL2Index, chunks: &[String]) -> std::io::Result<()> {
        fs::create_dir_all(dir)?;
        write_atomically(&dir.join(INDEX_FILE), |w| index.write_to(w))?;
        write_atomically(&dir.join(CHUNKS_FILE), |w| npy::write_chunks(w, chunks))?;
        Ok(())
    }

    /// Read and cross-check both files under `dir`.
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotFound`] if `dir` does not exist.
    /// - [`IndexError::Corrupt`] if either file is missing or malformed, or
    ///   if the vector and chunk counts differ.
    pub fn read(dir: &Path) -> Result<Self, IndexError> {
        if !dir.is_dir() {
            return Err(IndexError::NotFound(dir.to_path_buf()));
        }

        let index_path = dir.join(INDEX_FILE);
        let chunks_path = dir.join(CHUNKS_FILE);

        let index = FlatL2Index::read_from(&mut open(&index_path)?)
            .map_err(|e| corrupt(&index_path, e))?;
        let chunks =
            npy::read_chunks(&mut open(&chunks_path)?).map_err(|e| corrupt(&chunks_path, e))?;

        if index.ntotal() != chunks.len() {
            return Err(IndexError::Corrupt(format!(
                "{} holds {} vectors but {} holds {} chunks",
                index_path.display(),
                index.ntotal(),
                chunks_path.display(),
                chunks.len()
            )));
        }

        Ok(Self { index, chunks })
    }
}

fn open(path: &Path) -> Result<BufReader<File>, IndexError> {
    match File::open(path) {
        Ok(f) => Ok(BufReader::new(f)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(IndexError::Corrupt(format!(
            "snapshot is incomplete: {} is missing",
            path.display()
        ))),
        Err(e) => Err(IndexError::Io(e)),
    }
}

fn corrupt(path: &Path, err: FormatError) -> IndexError {
    match err {
        FormatError::Io(e) => IndexError::Io(e),
        other => IndexError::Corrupt(format!("{}: {}", path.display(), other)),
    }
}

fn write_atomically<F>(path: &Path, write: F) -> std::io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let tmp = tmp_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> (FlatL2Index, Vec<String>) {
        let mut index = FlatL2Index::new(2);
        index.add(&[1.0, 2.0]).unwrap();
        index.add(&[3.0, 4.0]).unwrap();
        (index, vec!["first".to_string(), "second".to_string()])
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("snap");
        let (index, chunks) = sample();
        Snapshot::write(&dir, &index, &chunks).unwrap();

        assert!(dir.join(INDEX_FILE).is_file());
        assert!(dir.join(CHUNKS_FILE).is_file());
        assert!(!dir.join("index.faiss.tmp").exists());

        let snap = Snapshot::read(&dir).unwrap();
        assert_eq!(snap.index, index);
        assert_eq!(snap.chunks, chunks);
    }

    #[test]
    fn test_missing_dir_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = Snapshot::read(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[test]
    fn test_missing_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let (index, chunks) = sample();
        Snapshot::write(tmp.path(), &index, &chunks).unwrap();
        fs::remove_file(tmp.path().join(CHUNKS_FILE)).unwrap();
        let err = Snapshot::read(tmp.path()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(ref m) if m.contains("incomplete")));
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let (index, _) = sample();
        Snapshot::write(tmp.path(), &index, &["only one".to_string()]).unwrap();
        let err = Snapshot::read(tmp.path()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(ref m) if m.contains("2 vectors")));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let (index, chunks) = sample();
        Snapshot::write(tmp.path(), &index, &chunks).unwrap();
        fs::write(tmp.path().join(INDEX_FILE), b"garbage").unwrap();
        let err = Snapshot::read(tmp.path()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
    }

    #[test]
    fn test_zero_width_chunk_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let (index, chunks) = sample();
        Snapshot::write(tmp.path(), &index, &chunks).unwrap();

        let mut header =
            "{'descr': '<U0', 'fortran_order': False, 'shape': (2,), }".to_string();
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        fs::write(tmp.path().join(CHUNKS_FILE), bytes).unwrap();

        let err = Snapshot::read(tmp.path()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(ref m) if m.contains("zero-width")));
    }
}
