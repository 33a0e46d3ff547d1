use crate::boxes::{BoxHeader, BoxKey, FourCC};
use anyhow::{bail, ensure};
use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Cursor, Read};

/// A value returned from a box decoder.
///
/// Built-in decoders return structured data; custom decoders may hand back
/// the bytes they consumed instead.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxValue {
    Bytes(Vec<u8>),
    Structured(StructuredData),
}

/// Structured data for the recognized leaf boxes
#[derive(Debug, Clone, Serialize)]
pub enum StructuredData {
    /// File Type Box (ftyp, styp)
    FileType(FtypData),
    /// Movie Header Box (mvhd)
    MovieHeader(MvhdData),
    /// Track Header Box (tkhd)
    TrackHeader(TkhdData),
    /// Media Header Box (mdhd)
    MediaHeader(MdhdData),
    /// Handler Reference Box (hdlr)
    HandlerReference(HdlrData),
    /// Sample Description Box (stsd)
    SampleDescription(StsdData),
    /// Bootstrap Info Box (abst)
    BootstrapInfo(AbstData),
    /// Fragment Random Access Box (afra)
    FragmentRandomAccess(AfraData),
    /// Movie Fragment Header Box (mfhd)
    MovieFragmentHeader(MfhdData),
    /// Protection System Specific Header Box (pssh)
    ProtectionSystem(PsshData),
}

#[derive(Debug, Clone, Serialize)]
pub struct FtypData {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MvhdData {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub rate: f64,
    pub volume: f32,
    pub next_track_id: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TkhdData {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: f32,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MdhdData {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HdlrData {
    pub version: u8,
    pub flags: u32,
    pub handler_type: FourCC,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StsdData {
    pub version: u8,
    pub flags: u32,
    pub entry_count: u32,
    pub entries: Vec<SampleEntry>,
}

/// Header of one sample entry; the codec-specific body is not decoded.
#[derive(Debug, Clone, Serialize)]
pub struct SampleEntry {
    pub size: u32,
    pub codec: FourCC,
    pub data_reference_index: u16,
    pub width: Option<u16>,
    pub height: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AbstData {
    pub version: u8,
    pub flags: u32,
    pub bootstrap_info_version: u32,
    pub profile: u8,
    pub live: bool,
    pub update: bool,
    pub time_scale: u32,
    pub current_media_time: u64,
    pub smpte_timecode_offset: u64,
    pub movie_identifier: Option<String>,
    pub server_entries: Vec<Option<String>>,
    pub quality_entries: Vec<Option<String>>,
    pub drm_data: Option<String>,
    pub meta_data: Option<String>,
    pub segment_run_tables: Vec<SegmentRunTable>,
    pub fragment_run_tables: Vec<FragmentRunTable>,
}

impl AbstData {
    /// `current_media_time` in seconds; `None` when the time scale is 0.
    pub fn current_media_time_secs(&self) -> Option<f64> {
        ticks_to_secs(self.current_media_time, self.time_scale)
    }
}

/// asrt, nested in abst
#[derive(Debug, Clone, Serialize)]
pub struct SegmentRunTable {
    pub update: bool,
    pub quality_segment_url_modifiers: Vec<Option<String>>,
    pub entries: Vec<SegmentRunEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentRunEntry {
    pub first_segment: u32,
    pub fragments_per_segment: u32,
}

/// afrt, nested in abst
#[derive(Debug, Clone, Serialize)]
pub struct FragmentRunTable {
    pub update: bool,
    pub time_scale: u32,
    pub quality_fragment_url_modifiers: Vec<Option<String>>,
    pub entries: Vec<FragmentRunEntry>,
}

impl FragmentRunTable {
    pub fn timestamp_secs(&self, entry: &FragmentRunEntry) -> Option<f64> {
        ticks_to_secs(entry.first_fragment_timestamp, self.time_scale)
    }

    pub fn duration_secs(&self, entry: &FragmentRunEntry) -> Option<f64> {
        ticks_to_secs(entry.fragment_duration as u64, self.time_scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FragmentRunEntry {
    pub first_fragment: u32,
    pub first_fragment_timestamp: u64,
    pub fragment_duration: u32,
    /// Only present when `fragment_duration` is 0.
    pub discontinuity_indicator: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AfraData {
    pub version: u8,
    pub flags: u32,
    pub time_scale: u32,
    pub local_entries: Vec<AfraEntry>,
    pub global_entries: Vec<AfraGlobalEntry>,
}

impl AfraData {
    /// Time of a local or global entry in seconds.
    pub fn time_secs(&self, time: u64) -> Option<f64> {
        ticks_to_secs(time, self.time_scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AfraEntry {
    pub time: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AfraGlobalEntry {
    pub time: u64,
    pub segment_number: u32,
    pub fragment_number: u32,
    pub afra_offset: u64,
    pub sample_offset: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MfhdData {
    pub version: u8,
    pub flags: u32,
    pub sequence_number: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PsshData {
    pub version: u8,
    pub flags: u32,
    pub system_id: String,
    pub key_ids: Vec<String>,
    pub data: String,
}

/// Trait for leaf field decoders.
///
/// The reader is limited to the payload of the box (everything after the
/// header). Trailing bytes left unread are ignored; an error makes the
/// builder keep the payload as a raw byte range instead.
pub trait BoxDecoder: Send + Sync {
    fn decode(&self, r: &mut dyn Read, hdr: &BoxHeader) -> anyhow::Result<BoxValue>;
}

/// How the tree builder treats a box type.
#[derive(Clone, Copy)]
pub enum Classification<'a> {
    /// Payload is a sequence of boxes.
    Container,
    /// Payload is a version/flags prefix followed by boxes (ISO `meta`).
    /// The prefix is skipped when the payload already starts with an
    /// `hdlr` box, as QuickTime writes it.
    FullContainer,
    Recognized(&'a dyn BoxDecoder),
    Opaque,
}

impl Classification<'_> {
    pub fn is_container(&self) -> bool {
        matches!(self, Classification::Container | Classification::FullContainer)
    }
}

/// Registry of box classifications keyed by `BoxKey` (4CC or UUID).
///
/// The registry is immutable once constructed; use the `with_*` methods
/// to build it fluently. Keys not present are opaque leaves. Registering
/// a key again replaces its earlier classification.
pub struct Registry {
    map: HashMap<BoxKey, Entry>,
}

enum Entry {
    Container { full_box: bool },
    Leaf { name: String, decoder: Box<dyn BoxDecoder> },
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn with_container(mut self, key: BoxKey) -> Self {
        self.map.insert(key, Entry::Container { full_box: false });
        self
    }

    pub fn with_full_container(mut self, key: BoxKey) -> Self {
        self.map.insert(key, Entry::Container { full_box: true });
        self
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and used only for debugging / logging.
    pub fn with_decoder(mut self, key: BoxKey, name: &str, dec: Box<dyn BoxDecoder>) -> Self {
        self.map.insert(
            key,
            Entry::Leaf {
                name: name.to_string(),
                decoder: dec,
            },
        );
        self
    }

    pub fn classify(&self, key: &BoxKey) -> Classification<'_> {
        match self.map.get(key) {
            Some(Entry::Container { full_box: false }) => Classification::Container,
            Some(Entry::Container { full_box: true }) => Classification::FullContainer,
            Some(Entry::Leaf { decoder, .. }) => Classification::Recognized(decoder.as_ref()),
            None => Classification::Opaque,
        }
    }

    /// Name a recognized leaf decoder was registered under.
    pub fn decoder_name(&self, key: &BoxKey) -> Option<&str> {
        match self.map.get(key) {
            Some(Entry::Leaf { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// Try to decode the payload of a box using a registered decoder.
    ///
    /// Returns `None` if no decoder exists for the given key.
    pub fn decode(
        &self,
        key: &BoxKey,
        r: &mut dyn Read,
        hdr: &BoxHeader,
    ) -> Option<anyhow::Result<BoxValue>> {
        match self.classify(key) {
            Classification::Recognized(dec) => Some(dec.decode(r, hdr)),
            _ => None,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------- Helpers ----------

fn read_all(r: &mut dyn Read) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_full_box_header(r: &mut dyn Read) -> anyhow::Result<(u8, u32)> {
    let version = r.read_u8()?;
    let flags = r.read_u24::<BigEndian>()?;
    Ok((version, flags))
}

fn read_fourcc(r: &mut dyn Read) -> anyhow::Result<FourCC> {
    let mut cc = [0u8; 4];
    r.read_exact(&mut cc)?;
    Ok(FourCC(cc))
}

fn skip_bytes(r: &mut dyn Read, n: u64) -> anyhow::Result<()> {
    let copied = std::io::copy(&mut Read::take(&mut *r, n), &mut std::io::sink())?;
    ensure!(copied == n, "payload ended {} bytes early", n - copied);
    Ok(())
}

fn ticks_to_secs(ticks: u64, time_scale: u32) -> Option<f64> {
    (time_scale != 0).then(|| ticks as f64 / time_scale as f64)
}

fn lang_from_u16(code: u16) -> String {
    if code == 0 {
        return "und".to_string();
    }
    let c1 = ((code >> 10) & 0x1F) as u8 + 0x60;
    let c2 = ((code >> 5) & 0x1F) as u8 + 0x60;
    let c3 = (code & 0x1F) as u8 + 0x60;
    format!("{}{}{}", c1 as char, c2 as char, c3 as char,)
}

/// Null-terminated UTF-8 string; an empty string reads as `None`.
fn read_cstring(r: &mut dyn Read) -> anyhow::Result<Option<String>> {
    let mut bytes = Vec::new();
    loop {
        match r.read_u8()? {
            0 => break,
            b => bytes.push(b),
        }
    }
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8(bytes)?))
}

/// u8 count followed by that many null-terminated strings.
fn read_string_table(r: &mut dyn Read) -> anyhow::Result<Vec<Option<String>>> {
    let count = r.read_u8()?;
    (0..count).map(|_| read_cstring(r)).collect()
}

/// Box nested inside a leaf payload (asrt/afrt inside abst). Returns the
/// type and the body bytes so padding in the body is consumed too.
fn read_nested_box(r: &mut dyn Read) -> anyhow::Result<(FourCC, Vec<u8>)> {
    let size32 = r.read_u32::<BigEndian>()?;
    let typ = read_fourcc(r)?;
    let (size, header_size) = if size32 == 1 {
        (r.read_u64::<BigEndian>()?, 16)
    } else {
        (size32 as u64, 8)
    };
    ensure!(size >= header_size, "nested {} has invalid size {}", typ, size);
    let body_len = size - header_size;
    let mut body = Vec::new();
    Read::take(&mut *r, body_len).read_to_end(&mut body)?;
    ensure!(body.len() as u64 == body_len, "nested {} is truncated", typ);
    Ok((typ, body))
}

// ---------- Decoders ----------

// ftyp / styp: major + minor + compatible brands
pub struct FtypDecoder;

impl BoxDecoder for FtypDecoder {
    fn decode(&self, r: &mut dyn Read, hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let buf = read_all(r)?;
        if buf.len() < 8 {
            bail!("{}: payload too short ({} bytes)", hdr.typ, buf.len());
        }

        let major_brand = FourCC([buf[0], buf[1], buf[2], buf[3]]);
        let minor_version = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let compatible_brands = buf[8..]
            .chunks_exact(4)
            .map(|c| FourCC([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(BoxValue::Structured(StructuredData::FileType(FtypData {
            major_brand,
            minor_version,
            compatible_brands,
        })))
    }
}

// mvhd: times, timescale, duration, rate/volume, next track id
pub struct MvhdDecoder;

impl BoxDecoder for MvhdDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;

        let (creation_time, modification_time, timescale, duration) = match version {
            1 => (
                r.read_u64::<BigEndian>()?,
                r.read_u64::<BigEndian>()?,
                r.read_u32::<BigEndian>()?,
                r.read_u64::<BigEndian>()?,
            ),
            0 => (
                r.read_u32::<BigEndian>()? as u64,
                r.read_u32::<BigEndian>()? as u64,
                r.read_u32::<BigEndian>()?,
                r.read_u32::<BigEndian>()? as u64,
            ),
            v => bail!("mvhd: unsupported version {}", v),
        };

        let rate = r.read_i32::<BigEndian>()? as f64 / 65536.0;
        let volume = r.read_i16::<BigEndian>()? as f32 / 256.0;
        // reserved (10), matrix (36), pre_defined (24)
        skip_bytes(r, 10 + 36 + 24)?;
        let next_track_id = r.read_u32::<BigEndian>()?;

        Ok(BoxValue::Structured(StructuredData::MovieHeader(MvhdData {
            version,
            flags,
            creation_time,
            modification_time,
            timescale,
            duration,
            rate,
            volume,
            next_track_id,
        })))
    }
}

// tkhd: track id, duration, width, height
pub struct TkhdDecoder;

impl BoxDecoder for TkhdDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;

        // creation_time, modification_time, track_id, reserved, duration
        let (creation_time, modification_time, track_id, duration) = match version {
            1 => {
                let c = r.read_u64::<BigEndian>()?;
                let m = r.read_u64::<BigEndian>()?;
                let id = r.read_u32::<BigEndian>()?;
                let _ = r.read_u32::<BigEndian>()?;
                (c, m, id, r.read_u64::<BigEndian>()?)
            }
            0 => {
                let c = r.read_u32::<BigEndian>()? as u64;
                let m = r.read_u32::<BigEndian>()? as u64;
                let id = r.read_u32::<BigEndian>()?;
                let _ = r.read_u32::<BigEndian>()?;
                (c, m, id, r.read_u32::<BigEndian>()? as u64)
            }
            v => bail!("tkhd: unsupported version {}", v),
        };

        // reserved[2]
        skip_bytes(r, 8)?;
        let layer = r.read_i16::<BigEndian>()?;
        let alternate_group = r.read_i16::<BigEndian>()?;
        let volume = r.read_i16::<BigEndian>()? as f32 / 256.0;
        // reserved (2), matrix (36)
        skip_bytes(r, 2 + 36)?;
        let width = r.read_u32::<BigEndian>()? as f64 / 65536.0;
        let height = r.read_u32::<BigEndian>()? as f64 / 65536.0;

        Ok(BoxValue::Structured(StructuredData::TrackHeader(TkhdData {
            version,
            flags,
            creation_time,
            modification_time,
            track_id,
            duration,
            layer,
            alternate_group,
            volume,
            width,
            height,
        })))
    }
}

// mdhd: timescale, duration, language
pub struct MdhdDecoder;

impl BoxDecoder for MdhdDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;

        let (creation_time, modification_time, timescale, duration) = match version {
            1 => (
                r.read_u64::<BigEndian>()?,
                r.read_u64::<BigEndian>()?,
                r.read_u32::<BigEndian>()?,
                r.read_u64::<BigEndian>()?,
            ),
            0 => (
                r.read_u32::<BigEndian>()? as u64,
                r.read_u32::<BigEndian>()? as u64,
                r.read_u32::<BigEndian>()?,
                r.read_u32::<BigEndian>()? as u64,
            ),
            v => bail!("mdhd: unsupported version {}", v),
        };
        let language = lang_from_u16(r.read_u16::<BigEndian>()?);

        Ok(BoxValue::Structured(StructuredData::MediaHeader(MdhdData {
            version,
            flags,
            creation_time,
            modification_time,
            timescale,
            duration,
            language,
        })))
    }
}

// hdlr: handler type + name
pub struct HdlrDecoder;

impl BoxDecoder for HdlrDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;
        let _pre_defined = r.read_u32::<BigEndian>()?;
        let handler_type = read_fourcc(r)?;
        skip_bytes(r, 12)?;

        // name runs to a NUL or the end of the payload (QuickTime writes a
        // Pascal string here, which we keep as-is)
        let rest = read_all(r)?;
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let name = String::from_utf8_lossy(&rest[..end]).into_owned();

        Ok(BoxValue::Structured(StructuredData::HandlerReference(HdlrData {
            version,
            flags,
            handler_type,
            name,
        })))
    }
}

// stsd: sample entry headers, plus width/height for visual entries
pub struct StsdDecoder;

const VISUAL_CODECS: &[&[u8; 4]] = &[
    b"avc1", b"avc3", b"hvc1", b"hev1", b"vp08", b"vp09", b"av01", b"mp4v", b"VP6F", b"FLV1",
];

impl BoxDecoder for StsdDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;
        let entry_count = r.read_u32::<BigEndian>()?;
        let buf = read_all(r)?;

        let mut entries = Vec::new();
        let mut pos = 0usize;
        while entries.len() < entry_count as usize && pos < buf.len() {
            let mut cur = Cursor::new(&buf[pos..]);
            let size = cur.read_u32::<BigEndian>()?;
            let codec = read_fourcc(&mut cur)?;
            ensure!(
                size >= 16 && pos + size as usize <= buf.len(),
                "stsd: entry {} has bad size {}",
                codec,
                size
            );
            skip_bytes(&mut cur, 6)?;
            let data_reference_index = cur.read_u16::<BigEndian>()?;

            let (mut width, mut height) = (None, None);
            if VISUAL_CODECS.contains(&&codec.0) && size >= 36 {
                // pre_defined / reserved (16)
                skip_bytes(&mut cur, 16)?;
                width = Some(cur.read_u16::<BigEndian>()?);
                height = Some(cur.read_u16::<BigEndian>()?);
            }

            entries.push(SampleEntry {
                size,
                codec,
                data_reference_index,
                width,
                height,
            });
            pos += size as usize;
        }

        Ok(BoxValue::Structured(StructuredData::SampleDescription(StsdData {
            version,
            flags,
            entry_count,
            entries,
        })))
    }
}

// abst: HDS bootstrap info with nested segment/fragment run tables
pub struct AbstDecoder;

impl BoxDecoder for AbstDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;
        let bootstrap_info_version = r.read_u32::<BigEndian>()?;
        let bits = r.read_u8()?;
        let time_scale = r.read_u32::<BigEndian>()?;
        let current_media_time = r.read_u64::<BigEndian>()?;
        let smpte_timecode_offset = r.read_u64::<BigEndian>()?;
        let movie_identifier = read_cstring(r)?;
        let server_entries = read_string_table(r)?;
        let quality_entries = read_string_table(r)?;
        let drm_data = read_cstring(r)?;
        let meta_data = read_cstring(r)?;

        let mut segment_run_tables = Vec::new();
        for _ in 0..r.read_u8()? {
            let (typ, body) = read_nested_box(r)?;
            ensure!(&typ.0 == b"asrt", "abst: expected asrt, found {}", typ);
            segment_run_tables.push(parse_asrt(&mut Cursor::new(body))?);
        }

        let mut fragment_run_tables = Vec::new();
        for _ in 0..r.read_u8()? {
            let (typ, body) = read_nested_box(r)?;
            ensure!(&typ.0 == b"afrt", "abst: expected afrt, found {}", typ);
            fragment_run_tables.push(parse_afrt(&mut Cursor::new(body))?);
        }

        Ok(BoxValue::Structured(StructuredData::BootstrapInfo(AbstData {
            version,
            flags,
            bootstrap_info_version,
            profile: bits >> 6,
            live: bits & 0x20 != 0,
            update: bits & 0x10 != 0,
            time_scale,
            current_media_time,
            smpte_timecode_offset,
            movie_identifier,
            server_entries,
            quality_entries,
            drm_data,
            meta_data,
            segment_run_tables,
            fragment_run_tables,
        })))
    }
}

fn parse_asrt(r: &mut dyn Read) -> anyhow::Result<SegmentRunTable> {
    let (_version, flags) = read_full_box_header(r)?;
    let quality_segment_url_modifiers = read_string_table(r)?;
    let count = r.read_u32::<BigEndian>()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        entries.push(SegmentRunEntry {
            first_segment: r.read_u32::<BigEndian>()?,
            fragments_per_segment: r.read_u32::<BigEndian>()?,
        });
    }
    Ok(SegmentRunTable {
        update: flags == 1,
        quality_segment_url_modifiers,
        entries,
    })
}

fn parse_afrt(r: &mut dyn Read) -> anyhow::Result<FragmentRunTable> {
    let (_version, flags) = read_full_box_header(r)?;
    let time_scale = r.read_u32::<BigEndian>()?;
    let quality_fragment_url_modifiers = read_string_table(r)?;
    let count = r.read_u32::<BigEndian>()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let first_fragment = r.read_u32::<BigEndian>()?;
        let first_fragment_timestamp = r.read_u64::<BigEndian>()?;
        let fragment_duration = r.read_u32::<BigEndian>()?;
        let discontinuity_indicator = if fragment_duration == 0 {
            Some(r.read_u8()?)
        } else {
            None
        };
        entries.push(FragmentRunEntry {
            first_fragment,
            first_fragment_timestamp,
            fragment_duration,
            discontinuity_indicator,
        });
    }
    Ok(FragmentRunTable {
        update: flags == 1,
        time_scale,
        quality_fragment_url_modifiers,
        entries,
    })
}

// afra: local and global random access points
pub struct AfraDecoder;

impl BoxDecoder for AfraDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;
        let bits = r.read_u8()?;
        let long_ids = bits & 0x80 != 0;
        let long_offsets = bits & 0x40 != 0;
        let has_global = bits & 0x20 != 0;
        let time_scale = r.read_u32::<BigEndian>()?;

        let mut local_entries = Vec::new();
        for _ in 0..r.read_u32::<BigEndian>()? {
            let time = r.read_u64::<BigEndian>()?;
            let offset = read_afra_offset(r, long_offsets)?;
            local_entries.push(AfraEntry { time, offset });
        }

        let mut global_entries = Vec::new();
        if has_global {
            for _ in 0..r.read_u32::<BigEndian>()? {
                global_entries.push(AfraGlobalEntry {
                    time: r.read_u64::<BigEndian>()?,
                    segment_number: read_afra_id(r, long_ids)?,
                    fragment_number: read_afra_id(r, long_ids)?,
                    afra_offset: read_afra_offset(r, long_offsets)?,
                    sample_offset: read_afra_offset(r, long_offsets)?,
                });
            }
        }

        Ok(BoxValue::Structured(StructuredData::FragmentRandomAccess(AfraData {
            version,
            flags,
            time_scale,
            local_entries,
            global_entries,
        })))
    }
}

fn read_afra_id(r: &mut dyn Read, long: bool) -> anyhow::Result<u32> {
    Ok(if long {
        r.read_u32::<BigEndian>()?
    } else {
        r.read_u16::<BigEndian>()? as u32
    })
}

fn read_afra_offset(r: &mut dyn Read, long: bool) -> anyhow::Result<u64> {
    Ok(if long {
        r.read_u64::<BigEndian>()?
    } else {
        r.read_u32::<BigEndian>()? as u64
    })
}

// mfhd: fragment sequence number
pub struct MfhdDecoder;

impl BoxDecoder for MfhdDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;
        let sequence_number = r.read_u32::<BigEndian>()?;
        Ok(BoxValue::Structured(StructuredData::MovieFragmentHeader(MfhdData {
            version,
            flags,
            sequence_number,
        })))
    }
}

// pssh: DRM system id, key ids (v1), opaque init data
pub struct PsshDecoder;

impl BoxDecoder for PsshDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let (version, flags) = read_full_box_header(r)?;
        let mut system_id = [0u8; 16];
        r.read_exact(&mut system_id)?;

        let mut key_ids = Vec::new();
        if version > 0 {
            for _ in 0..r.read_u32::<BigEndian>()? {
                let mut kid = [0u8; 16];
                r.read_exact(&mut kid)?;
                key_ids.push(hex::encode(kid));
            }
        }

        let data_size = r.read_u32::<BigEndian>()? as u64;
        let mut data = Vec::new();
        Read::take(&mut *r, data_size).read_to_end(&mut data)?;
        ensure!(data.len() as u64 == data_size, "pssh: data is truncated");

        Ok(BoxValue::Structured(StructuredData::ProtectionSystem(PsshData {
            version,
            flags,
            system_id: hex::encode(system_id),
            key_ids,
            data: hex::encode(data),
        })))
    }
}

// ---------- Default registry ----------

const CONTAINERS: &[&[u8; 4]] = &[
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"udta", b"moof", b"traf", b"mvex", b"edts",
    b"dinf", b"mfra", b"sinf", b"schi",
];

pub fn default_registry() -> Registry {
    let reg = CONTAINERS
        .iter()
        .fold(Registry::new(), |reg, cc| reg.with_container(BoxKey::FourCC(FourCC(**cc))));

    reg.with_full_container(BoxKey::FourCC(FourCC(*b"meta")))
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"ftyp")),
            "ftyp",
            Box::new(FtypDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"styp")),
            "styp",
            Box::new(FtypDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"mvhd")),
            "mvhd",
            Box::new(MvhdDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"tkhd")),
            "tkhd",
            Box::new(TkhdDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"mdhd")),
            "mdhd",
            Box::new(MdhdDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"hdlr")),
            "hdlr",
            Box::new(HdlrDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"stsd")),
            "stsd",
            Box::new(StsdDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"abst")),
            "abst",
            Box::new(AbstDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"afra")),
            "afra",
            Box::new(AfraDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"mfhd")),
            "mfhd",
            Box::new(MfhdDecoder),
        )
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"pssh")),
            "pssh",
            Box::new(PsshDecoder),
        )
}
