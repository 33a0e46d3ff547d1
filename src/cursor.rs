use crate::util::read_slice;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Take};

/// Position-tracking view over a seekable source of known length.
///
/// All offsets are absolute. `skip` and `seek_to` only seek, so payload
/// bytes that are skipped are never read from the source.
pub struct BoxCursor<R> {
    inner: R,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> BoxCursor<R> {
    /// Wrap `inner`, measuring its length and rewinding to the start.
    pub fn new(mut inner: R) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, pos: 0, len })
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining_in_scope(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.len
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let v = self.inner.read_u32::<BigEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let v = self.inner.read_u64::<BigEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    /// Advance by `n` bytes without reading them.
    pub fn skip(&mut self, n: u64) -> io::Result<()> {
        if n > self.remaining_in_scope() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("skip of {} bytes past end of source at {:#x}", n, self.pos),
            ));
        }
        self.seek_to(self.pos + n)
    }

    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if offset != self.pos {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }
        Ok(())
    }

    /// Reader limited to the next `len` bytes.
    ///
    /// The tracked position is not updated by reads through the returned
    /// reader; call [`BoxCursor::seek_to`] afterwards.
    pub fn take(&mut self, len: u64) -> Take<&mut R> {
        (&mut self.inner).take(len)
    }

    /// Read `len` bytes at `offset`, leaving the tracked position untouched.
    pub fn read_at(&mut self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        if offset.checked_add(len).is_none_or(|end| end > self.len) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range {:#x}+{} is outside the source", offset, len),
            ));
        }
        let data = read_slice(&mut self.inner, offset, len)?;
        self.inner.seek(SeekFrom::Start(self.pos))?;
        Ok(data)
    }
}
