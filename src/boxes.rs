use crate::registry::BoxValue;
use crate::util::read_slice;
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::{Read, Seek};

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const UUID: FourCC = FourCC(*b"uuid");

    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else {
            None
        }
    }
    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}
impl fmt::Debug for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }
impl fmt::Display for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

/// Resolved box type: the 4CC, or the extended 16-byte identifier of a `uuid` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKey {
    FourCC(FourCC),
    Uuid([u8; 16]),
}

impl BoxKey {
    pub fn fourcc(s: &str) -> Option<Self> {
        FourCC::from_str(s).map(BoxKey::FourCC)
    }
}

impl fmt::Display for BoxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxKey::FourCC(cc) => write!(f, "{}", cc),
            BoxKey::Uuid(u) => write!(f, "uuid:{}", hex::encode(u)),
        }
    }
}

impl Serialize for BoxKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// The size field as it was written in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxSize {
    /// 32-bit size field (>= header size).
    Compact(u32),
    /// size field was 1; the value is the 64-bit large size.
    Large(u64),
    /// size field was 0; the box extends to the end of its enclosing scope.
    OpenEnded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxHeader {
    pub typ: FourCC, // raw 4CC, b"uuid" for extended types
    #[serde(serialize_with = "serialize_uuid")]
    pub uuid: Option<[u8; 16]>,
    pub size: BoxSize,
    pub header_size: u64, // 8, 16, 24 or 32
    pub start: u64,       // file offset of header start
}

fn serialize_uuid<S: Serializer>(uuid: &Option<[u8; 16]>, s: S) -> Result<S::Ok, S::Error> {
    match uuid {
        Some(u) => s.serialize_some(&hex::encode(u)),
        None => s.serialize_none(),
    }
}

impl BoxHeader {
    pub fn key(&self) -> BoxKey {
        match self.uuid {
            Some(u) => BoxKey::Uuid(u),
            None => BoxKey::FourCC(self.typ),
        }
    }

    /// Effective size once an open-ended size is resolved against the
    /// bytes remaining in the enclosing scope.
    pub fn effective_size(&self, available: u64) -> u64 {
        match self.size {
            BoxSize::Compact(n) => n as u64,
            BoxSize::Large(n) => n,
            BoxSize::OpenEnded => available,
        }
    }

    /// Re-encode the header exactly as it appeared in the source.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_size as usize);
        let size32 = match self.size {
            BoxSize::Compact(n) => n,
            BoxSize::Large(_) => 1,
            BoxSize::OpenEnded => 0,
        };
        out.extend_from_slice(&size32.to_be_bytes());
        out.extend_from_slice(&self.typ.0);
        if let BoxSize::Large(n) = self.size {
            out.extend_from_slice(&n.to_be_bytes());
        }
        if let Some(u) = &self.uuid {
            out.extend_from_slice(u);
        }
        out
    }
}

/// Offset + length of a payload that has not been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// Read the described bytes from `r`.
    pub fn materialize<R: Read + Seek>(&self, r: &mut R) -> std::io::Result<Vec<u8>> {
        read_slice(r, self.offset, self.len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FullBoxFields {
    pub version: u8,
    pub flags: u32,
}

/// Leaf payload: decoded fields, or the untouched byte range.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafPayload {
    Decoded(BoxValue),
    Raw(ByteRange),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Container {
        /// version/flags prefix of full-box containers such as `meta`
        full: Option<FullBoxFields>,
        children: Vec<Mp4Box>,
    },
    Leaf(LeafPayload),
}

#[derive(Debug, Serialize)]
pub struct Mp4Box {
    pub header: BoxHeader,
    /// Effective size, header included.
    pub size: u64,
    pub kind: NodeKind,
}

impl Mp4Box {
    pub fn typ(&self) -> FourCC {
        self.header.typ
    }

    pub fn key(&self) -> BoxKey {
        self.header.key()
    }

    pub fn start(&self) -> u64 {
        self.header.start
    }

    pub fn end(&self) -> u64 {
        self.header.start + self.size
    }

    pub fn header_size(&self) -> u64 {
        self.header.header_size
    }

    /// Everything after the header, for containers as well as leaves.
    pub fn payload_range(&self) -> ByteRange {
        ByteRange {
            offset: self.header.start + self.header.header_size,
            len: self.size - self.header.header_size,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Container { .. })
    }

    pub fn children(&self) -> &[Mp4Box] {
        match &self.kind {
            NodeKind::Container { children, .. } => children,
            NodeKind::Leaf(_) => &[],
        }
    }

    pub fn decoded(&self) -> Option<&BoxValue> {
        match &self.kind {
            NodeKind::Leaf(LeafPayload::Decoded(v)) => Some(v),
            _ => None,
        }
    }

    /// First direct child with the given 4CC.
    pub fn child(&self, typ: &str) -> Option<&Mp4Box> {
        let cc = FourCC::from_str(typ)?;
        self.children().iter().find(|c| c.header.typ == cc)
    }

    /// Resolve a dotted path relative to this box, e.g. `trak[1].mdia.hdlr`.
    pub fn find(&self, path: &str) -> Option<&Mp4Box> {
        if path.is_empty() {
            return Some(self);
        }
        find_path(self.children(), path)
    }

    /// Depth-first, file-order walk over this box and its descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![(0, self)] }
    }
}

pub struct Walk<'a> {
    stack: Vec<(usize, &'a Mp4Box)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a Mp4Box);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, b) = self.stack.pop()?;
        for c in b.children().iter().rev() {
            self.stack.push((depth + 1, c));
        }
        Some((depth, b))
    }
}

/// Resolve a dotted path such as `moov.trak[1].mdia` against a list of
/// sibling boxes (usually the top-level sequence).
pub fn find_path<'a>(boxes: &'a [Mp4Box], path: &str) -> Option<&'a Mp4Box> {
    let mut level = boxes;
    let mut found = None;
    for seg in path.split('.').filter(|s| !s.is_empty()) {
        let (name, idx) = parse_segment(seg)?;
        let cc = FourCC::from_str(name)?;
        let b = level.iter().filter(|c| c.header.typ == cc).nth(idx)?;
        level = b.children();
        found = Some(b);
    }
    found
}

// "trak[2]" -> ("trak", 2), "mdia" -> ("mdia", 0)
pub(crate) fn parse_segment(seg: &str) -> Option<(&str, usize)> {
    match seg.find('[') {
        Some(open) => {
            let close = seg.strip_suffix(']')?;
            let idx = close[open + 1..].parse().ok()?;
            Some((&seg[..open], idx))
        }
        None => Some((seg, 0)),
    }
}
