//! Binary codecs for the three on-disk formats (§4.10):
//!
//! - `.hgr`  — compiled graph (`graph`)
//! - `.hnwt` — trained weights (`weights`)
//! - checkpoint — graph digest + full runtime state (`checkpoint`)
//!
//! All three share the same primitive encoding: little-endian integers,
//! length-prefixed strings and vectors, explicit tag bytes for enums.
//! Nothing here depends on `serde` — the wire format is specified
//! byte-for-byte rather than derived, so a hand-rolled codec is the
//! faithful implementation.

pub mod checkpoint;
pub mod graph;
pub mod weights;

use std::io::{self, Read, Write};

pub(crate) fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub(crate) fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u64(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub(crate) fn write_str(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated u8"))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_u64()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_str(&mut self) -> io::Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated field"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

/// Write a full framed file: 4-byte magic, u32 version, then `body`.
pub(crate) fn write_framed(mut w: impl Write, magic: &[u8; 4], version: u32, body: &[u8]) -> io::Result<()> {
    w.write_all(magic)?;
    w.write_all(&version.to_le_bytes())?;
    w.write_all(body)?;
    Ok(())
}

/// Read and validate a framed file's header, returning the body bytes.
pub(crate) fn read_framed(mut r: impl Read, want_magic: &[u8; 4]) -> io::Result<(u32, Vec<u8>)> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != want_magic {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad magic: expected {:?}, found {:?}", want_magic, magic),
        ));
    }
    let mut version_bytes = [0u8; 4];
    r.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    let mut body = Vec::new();
    r.read_to_end(&mut body)?;
    Ok((version, body))
}
