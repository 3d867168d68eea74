//! Framed snapshot files shared by the index and the bitmap.
//!
//! ```text
//! [4 bytes: magic][4 bytes: CRC32 of body (LE u32)][N bytes: body]
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{IndexError, IndexResult};

const HEADER_SIZE: usize = 8;

/// Atomically replace `path` with a framed snapshot of `body`.
pub(crate) fn write_snapshot(path: &Path, magic: &[u8; 4], body: &[u8]) -> IndexResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(magic)?;
    tmp.write_all(&crc32fast::hash(body).to_le_bytes())?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;
    Ok(())
}

/// Read and validate a framed snapshot. `Ok(None)` when the file is absent.
pub(crate) fn read_snapshot(path: &Path, magic: &[u8; 4]) -> IndexResult<Option<Vec<u8>>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let corrupt = |reason: &str| IndexError::Corrupt {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    if data.len() < HEADER_SIZE {
        return Err(corrupt("too short"));
    }
    if &data[..4] != magic {
        return Err(corrupt("bad magic"));
    }
    let expected = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let body = &data[HEADER_SIZE..];
    if crc32fast::hash(body) != expected {
        return Err(corrupt("checksum mismatch"));
    }
    Ok(Some(body.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap");
        write_snapshot(&path, b"TEST", b"body bytes").unwrap();
        assert_eq!(
            read_snapshot(&path, b"TEST").unwrap().as_deref(),
            Some(&b"body bytes"[..])
        );
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_snapshot(&dir.path().join("absent"), b"TEST")
            .unwrap()
            .is_none());
    }

    #[test]
    fn overwrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap");
        write_snapshot(&path, b"TEST", b"old").unwrap();
        write_snapshot(&path, b"TEST", b"new").unwrap();
        assert_eq!(read_snapshot(&path, b"TEST").unwrap().unwrap(), b"new");
    }

    #[test]
    fn corruption_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap");
        write_snapshot(&path, b"TEST", b"payload").unwrap();

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0x01;
        fs::write(&path, &data).unwrap();

        assert!(matches!(
            read_snapshot(&path, b"TEST"),
            Err(IndexError::Corrupt { .. })
        ));
        assert!(matches!(
            read_snapshot(&path, b"NOPE"),
            Err(IndexError::Corrupt { .. })
        ));
    }
}
