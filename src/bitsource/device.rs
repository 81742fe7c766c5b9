// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! A device-backed entropy source. Used for both the primary hardware
//! device and the kernel-entropy fallback — they differ only in path.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::BitSource;
use crate::error::SourceError;

pub struct DeviceSource {
    path: PathBuf,
    read_bytes: usize,
    handle: Option<File>,
}

impl DeviceSource {
    pub fn new(path: impl AsRef<Path>, read_bytes: usize) -> Self {
        DeviceSource {
            path: path.as_ref().to_path_buf(),
            read_bytes,
            handle: None,
        }
    }

    fn handle(&mut self) -> Result<&mut File, SourceError> {
        if self.handle.is_none() {
            let file = File::open(&self.path).map_err(|source| SourceError::Open {
                path: self.path.clone(),
                source,
            })?;
            self.handle = Some(file);
        }
        Ok(self.handle.as_mut().expect("just inserted"))
    }
}

impl BitSource for DeviceSource {
    fn read_chunk(&mut self) -> Result<Vec<u8>, SourceError> {
        let read_bytes = self.read_bytes;
        let path = self.path.clone();
        let handle = self.handle()?;
        let mut buf = vec![0u8; read_bytes];
        let n = handle.read(&mut buf).map_err(|source| SourceError::Read {
            path: path.clone(),
            source,
        })?;
        if n == 0 {
            return Err(SourceError::Empty { path });
        }
        buf.truncate(n);
        tracing::trace!(path = %path.display(), size = %crate::utils::format_byte_count(n), "read entropy chunk");
        Ok(buf)
    }

    fn close(&mut self) {
        self.handle = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_requested_number_of_bytes_from_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut source = DeviceSource::new(file.path(), 4);
        let chunk = source.read_chunk().unwrap();
        assert_eq!(chunk, vec![1, 2, 3, 4]);
        source.close();
    }

    #[test]
    fn missing_device_fails_to_open() {
        let mut source = DeviceSource::new("/nonexistent/path/to/device", 4);
        assert!(source.read_chunk().is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let mut source = DeviceSource::new("/dev/null", 4);
        source.close();
        source.close();
    }
}
