use std::fmt::Write as _;
use std::io::{self, Read, Seek, SeekFrom};

/// Read exactly `len` bytes at absolute `offset`.
pub fn read_slice<R: Read + Seek>(r: &mut R, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "range too large for memory"))?;
    r.seek(SeekFrom::Start(offset))?;
    let mut v = vec![0u8; len];
    r.read_exact(&mut v)?;
    Ok(v)
}

/// Classic 16-bytes-per-line dump with absolute offsets and an ASCII column.
pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:08x}  {:<48}  |{}|", offs, hexs, ascii);
    }
    out
}
