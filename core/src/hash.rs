use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Pass-through reader that feeds every byte it hands out into a SHA-256
/// digest.
///
/// Bytes are forwarded unchanged and in order; nothing is buffered beyond the
/// caller's own read buffer. The digest is only meaningful once the consumer
/// has drained the reader, which is why [`HashingReader::finalize`] takes the
/// reader by value: it cannot be called while the consumer still borrows it.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes_read: u64,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Hex-encoded SHA-256 of everything read so far.
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn hash_reader<R: Read>(reader: R) -> io::Result<String> {
    let mut hashing = HashingReader::new(reader);
    io::copy(&mut hashing, &mut io::sink())?;
    Ok(hashing.finalize())
}

/// Streams a file from disk through SHA-256 without loading it whole.
pub fn hash_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::entry(path.display().to_string(), e))?;
    hash_reader(file).map_err(|e| Error::entry(path.display().to_string(), e))
}
