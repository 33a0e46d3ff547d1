use crate::boxes::{BoxHeader, BoxSize, FourCC};
use crate::cursor::BoxCursor;
use crate::error::{ParseError, Result};
use std::io::{Read, Seek};

fn ensure_available(offset: u64, needed: u64, available: u64) -> Result<()> {
    if available < needed {
        return Err(ParseError::TruncatedHeader {
            offset,
            needed,
            available,
        });
    }
    Ok(())
}

/// Read one box header at the cursor position.
///
/// `available` is the number of bytes left in the enclosing scope; no
/// header byte beyond it is read. An open-ended size (0) is returned as
/// [`BoxSize::OpenEnded`] for the caller to resolve.
pub fn read_box_header<R: Read + Seek>(r: &mut BoxCursor<R>, available: u64) -> Result<BoxHeader> {
    let start = r.position();
    ensure_available(start, 8, available)?;

    let size32 = r.read_u32()?;
    let typ = FourCC(r.read_array()?);
    let mut header_size = 8u64;

    let size = match size32 {
        0 => BoxSize::OpenEnded,
        1 => {
            ensure_available(start, header_size + 8, available)?;
            header_size += 8;
            BoxSize::Large(r.read_u64()?)
        }
        n => BoxSize::Compact(n),
    };

    let mut uuid = None;
    if typ == FourCC::UUID {
        ensure_available(start, header_size + 16, available)?;
        uuid = Some(r.read_array::<16>()?);
        header_size += 16;
    }

    let declared = match size {
        BoxSize::Compact(n) => Some(n as u64),
        BoxSize::Large(n) => Some(n),
        BoxSize::OpenEnded => None,
    };
    if let Some(n) = declared {
        if n < header_size {
            return Err(ParseError::InvalidSize {
                offset: start,
                typ,
                size: n,
                header_size,
            });
        }
    }

    log::trace!("header {} at {:#x}: {:?}, {} header bytes", typ, start, size, header_size);
    Ok(BoxHeader {
        typ,
        uuid,
        size,
        header_size,
        start,
    })
}
