//! The portable serialization format shared by every variant
//! (SPEC_FULL.md §6): `"MAPH"` magic, format version, algorithm id,
//! algorithm-specific parameters, then variant state. All integers are
//! explicitly transcoded via `to_le_bytes`/`from_le_bytes`, so correctness
//! never depends on the host's native endianness — the "transcode" branch
//! of SPEC_FULL.md §9's "transcode or refuse" on big-endian hardware.

use maph_core::error::{Error, Result};

pub const MAGIC: &[u8; 4] = b"MAPH";
pub const FORMAT_VERSION: u32 = 1;

pub const ALGO_RECSPLIT: u32 = 1;
pub const ALGO_CHD: u32 = 2;
pub const ALGO_BBHASH: u32 = 3;
pub const ALGO_FCH: u32 = 4;
pub const ALGO_PTHASH: u32 = 5;

/// Append-only byte buffer builder for the wire format.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    /// Writes the shared header: magic, format version, algorithm id.
    pub fn with_header(algo_id: u32) -> Self {
        let mut w = Writer::new();
        w.buf.extend_from_slice(MAGIC);
        w.write_u32(FORMAT_VERSION);
        w.write_u32(algo_id);
        w
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed byte string.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u64(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed vector of `u64`.
    pub fn write_u64_vec(&mut self, values: &[u64]) {
        self.write_u64(values.len() as u64);
        for &v in values {
            self.write_u64(v);
        }
    }

    /// Length-prefixed vector of `u32`.
    pub fn write_u32_vec(&mut self, values: &[u32]) {
        self.write_u64(values.len() as u64);
        for &v in values {
            self.write_u32(v);
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked cursor over a serialized byte string.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(Error::InvalidFormat("unexpected end of input".into()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("exactly 4 bytes")))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("exactly 8 bytes")))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().expect("exactly 8 bytes")))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u64()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_u64_vec(&mut self) -> Result<Vec<u64>> {
        let len = self.read_u64()? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            out.push(self.read_u64()?);
        }
        Ok(out)
    }

    pub fn read_u32_vec(&mut self) -> Result<Vec<u32>> {
        let len = self.read_u64()? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            out.push(self.read_u32()?);
        }
        Ok(out)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Validate and strip the shared header, returning the algorithm id and a
/// reader positioned at the algorithm-specific payload.
pub fn read_header(bytes: &[u8]) -> Result<(u32, Reader<'_>)> {
    let mut reader = Reader::new(bytes);
    let magic = reader.take(4)?;
    if magic != MAGIC {
        return Err(Error::InvalidFormat("bad magic".into()));
    }
    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(Error::InvalidFormat(format!(
            "unsupported format version {version}"
        )));
    }
    let algo_id = reader.read_u32()?;
    Ok((algo_id, reader))
}
