//! Byte-for-byte file comparison.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// Whether two files have identical contents. Sizes are compared first so
/// most differing files are rejected without reading them.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::with_capacity(CHUNK_SIZE, File::open(a)?);
    let mut reader_b = BufReader::with_capacity(CHUNK_SIZE, File::open(b)?);
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];

    loop {
        let read_a = fill(&mut reader_a, &mut buf_a)?;
        let read_b = fill(&mut reader_b, &mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_identical_files() {
        let dir = tempdir().unwrap();
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(dir.path().join("a"), &content).unwrap();
        fs::write(dir.path().join("b"), &content).unwrap();
        assert!(files_identical(&dir.path().join("a"), &dir.path().join("b")).unwrap());
    }

    #[test]
    fn test_same_size_different_tail() {
        let dir = tempdir().unwrap();
        let mut content = vec![7u8; 150_000];
        fs::write(dir.path().join("a"), &content).unwrap();
        content[149_999] = 8;
        fs::write(dir.path().join("b"), &content).unwrap();
        assert!(!files_identical(&dir.path().join("a"), &dir.path().join("b")).unwrap());
    }

    #[test]
    fn test_different_sizes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"abc").unwrap();
        fs::write(dir.path().join("b"), b"abcd").unwrap();
        assert!(!files_identical(&dir.path().join("a"), &dir.path().join("b")).unwrap());
    }

    #[test]
    fn test_empty_files_match() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();
        assert!(files_identical(&dir.path().join("a"), &dir.path().join("b")).unwrap());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"abc").unwrap();
        assert!(files_identical(&dir.path().join("a"), &dir.path().join("gone")).is_err());
    }
}
