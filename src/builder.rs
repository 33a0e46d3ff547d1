use crate::boxes::{BoxHeader, ByteRange, FullBoxFields, LeafPayload, Mp4Box, NodeKind};
use crate::config::{DEFAULT_MAX_DECODE_LEN, DEFAULT_MAX_DEPTH, ParserConfig};
use crate::cursor::BoxCursor;
use crate::error::{ParseError, Result};
use crate::parser::read_box_header;
use crate::registry::{BoxDecoder, Classification, Registry};
use log::{debug, trace};
use std::io::{Read, Seek};

/// Builds box trees from a cursor, classifying each box via a [`Registry`].
///
/// Descent uses an explicit stack of open containers instead of native
/// recursion, so nesting depth is bounded by `max_depth` alone.
pub struct TreeBuilder<'a> {
    registry: &'a Registry,
    max_depth: usize,
    max_decode_len: u64,
}

// An open container whose children are still being read.
struct Frame {
    header: BoxHeader,
    size: u64,
    end: u64,
    full: Option<FullBoxFields>,
    children: Vec<Mp4Box>,
}

impl Frame {
    fn finish(self) -> Mp4Box {
        Mp4Box {
            header: self.header,
            size: self.size,
            kind: NodeKind::Container {
                full: self.full,
                children: self.children,
            },
        }
    }
}

impl<'a> TreeBuilder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
            max_decode_len: DEFAULT_MAX_DECODE_LEN,
        }
    }

    pub fn from_config(config: &'a ParserConfig) -> Self {
        Self {
            registry: &config.registry,
            max_depth: config.max_depth,
            max_decode_len: config.max_decode_len,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_decode_len(mut self, len: u64) -> Self {
        self.max_decode_len = len;
        self
    }

    /// Parse the box at the cursor, including its whole subtree.
    ///
    /// `available` is the number of bytes left in the enclosing scope. On
    /// success the cursor sits exactly at the end of the box.
    pub fn parse_box<R: Read + Seek>(&self, r: &mut BoxCursor<R>, available: u64) -> Result<Mp4Box> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut scope = available;

        loop {
            let header = read_box_header(r, scope)?;
            let size = header.effective_size(scope);
            if size > scope {
                return Err(ParseError::Overrun {
                    offset: header.start,
                    typ: header.typ,
                    size,
                    available: scope,
                });
            }
            let end = header.start + size;
            trace!("{} at {:#x}, {} bytes, depth {}", header.key(), header.start, size, stack.len());

            let mut finished = match self.registry.classify(&header.key()) {
                class @ (Classification::Container | Classification::FullContainer) => {
                    if stack.len() >= self.max_depth {
                        return Err(ParseError::DepthExceeded {
                            offset: header.start,
                            max_depth: self.max_depth,
                        });
                    }
                    let full = match class {
                        Classification::FullContainer => read_full_prefix(r, &header, end)?,
                        _ => None,
                    };
                    let frame = Frame {
                        header,
                        size,
                        end,
                        full,
                        children: Vec::new(),
                    };
                    if r.position() < end {
                        scope = end - r.position();
                        stack.push(frame);
                        continue;
                    }
                    frame.finish()
                }
                Classification::Recognized(dec) => {
                    let payload = self.decode_leaf(r, &header, dec, end);
                    r.seek_to(end)?;
                    Mp4Box {
                        header,
                        size,
                        kind: NodeKind::Leaf(payload),
                    }
                }
                Classification::Opaque => {
                    let range = ByteRange {
                        offset: r.position(),
                        len: end - r.position(),
                    };
                    r.skip(range.len)?;
                    Mp4Box {
                        header,
                        size,
                        kind: NodeKind::Leaf(LeafPayload::Raw(range)),
                    }
                }
            };

            // Attach to the innermost open container, closing every
            // container whose payload is now fully consumed.
            loop {
                match stack.pop() {
                    None => return Ok(finished),
                    Some(mut parent) => {
                        parent.children.push(finished);
                        let pos = r.position();
                        if pos < parent.end {
                            scope = parent.end - pos;
                            stack.push(parent);
                            break;
                        }
                        finished = parent.finish();
                    }
                }
            }
        }
    }

    /// Parse consecutive boxes from the cursor up to `end`.
    pub fn parse_children<R: Read + Seek>(&self, r: &mut BoxCursor<R>, end: u64) -> Result<Vec<Mp4Box>> {
        let mut kids = Vec::new();
        while r.position() < end {
            let available = end - r.position();
            kids.push(self.parse_box(r, available)?);
        }
        Ok(kids)
    }

    fn decode_leaf<R: Read + Seek>(
        &self,
        r: &mut BoxCursor<R>,
        header: &BoxHeader,
        dec: &dyn BoxDecoder,
        end: u64,
    ) -> LeafPayload {
        let range = ByteRange {
            offset: r.position(),
            len: end - r.position(),
        };
        if range.len > self.max_decode_len {
            debug!("{} at {:#x}: {} byte payload left raw", header.key(), header.start, range.len);
            return LeafPayload::Raw(range);
        }

        let mut limited = r.take(range.len);
        match dec.decode(&mut limited, header) {
            Ok(value) => LeafPayload::Decoded(value),
            Err(e) => {
                debug!("{} at {:#x}: decode failed, keeping raw: {:#}", header.key(), header.start, e);
                LeafPayload::Raw(range)
            }
        }
    }
}

// QuickTime writes `meta` without the version/flags word, so its first
// child (`hdlr`) starts right after the header. Peek before consuming.
fn read_full_prefix<R: Read + Seek>(
    r: &mut BoxCursor<R>,
    header: &BoxHeader,
    end: u64,
) -> Result<Option<FullBoxFields>> {
    let pos = r.position();
    if end - pos >= 8 && &r.read_at(pos + 4, 4)?[..] == b"hdlr" {
        debug!("{} at {:#x} has no version/flags prefix", header.key(), header.start);
        return Ok(None);
    }
    if end - pos < 4 {
        return Err(ParseError::InvalidSize {
            offset: header.start,
            typ: header.typ,
            size: end - header.start,
            header_size: header.header_size + 4,
        });
    }
    let word = r.read_u32()?;
    Ok(Some(FullBoxFields {
        version: (word >> 24) as u8,
        flags: word & 0x00ff_ffff,
    }))
}
