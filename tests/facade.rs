use f4vbox::{F4vParser, LeafPayload, ParseError, ParserConfig, Registry, Source, is_mp4, parse};
use std::cell::Cell;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

fn bx(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = ((8 + payload.len()) as u32).to_be_bytes().to_vec();
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

fn ftyp() -> Vec<u8> {
    let mut p = b"isom".to_vec();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(b"isom");
    bx(b"ftyp", &p)
}

fn temp_file(name: &str, data: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("f4vbox-{}-{}", std::process::id(), name));
    std::fs::write(&path, data).unwrap();
    path
}

// Records the furthest byte offset ever read from the wrapped source.
struct CountingReader {
    inner: Cursor<Vec<u8>>,
    max_read_end: Rc<Cell<u64>>,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        let end = self.inner.position();
        if n > 0 && end > self.max_read_end.get() {
            self.max_read_end.set(end);
        }
        Ok(n)
    }
}

impl Seek for CountingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

struct NoSeek;

impl Read for NoSeek {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl Seek for NoSeek {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "pipe"))
    }
}

#[test]
fn sniff_accepts_ftyp() {
    let data = ftyp();
    assert_eq!(data.len(), 20);
    assert!(is_mp4(data));
}

#[test]
fn sniff_rejects_garbage() {
    assert!(!is_mp4(b"hello world!".as_slice()));
    assert!(!is_mp4(Vec::new()));
    assert!(!is_mp4(b"\0\0\0".as_slice()));

    let mut vendor = 24u32.to_be_bytes().to_vec();
    vendor.extend_from_slice(b"uuid");
    vendor.extend_from_slice(&[0xAB; 16]);
    assert!(!is_mp4(vendor));
}

#[test]
fn sniff_never_fails_on_bad_paths() {
    assert!(!is_mp4("/nonexistent/f4vbox/input.f4v"));
    assert!(!is_mp4(std::env::temp_dir()));
}

#[test]
fn sniff_honors_start_offset() {
    let mut data = vec![0xFFu8; 6];
    data.extend(ftyp());
    let parser = F4vParser::new(ParserConfig::default().with_start_offset(6));
    assert!(parser.is_mp4(data.clone()));
    assert!(!is_mp4(data));
}

#[test]
fn parses_top_level_sequence() {
    let mut data = ftyp();
    data.extend(bx(b"free", &[0u8; 4]));
    data.extend(bx(b"mdat", b"payload"));

    let boxes: Vec<_> = parse(data).unwrap().collect::<Result<_, _>>().unwrap();
    let keys: Vec<String> = boxes.iter().map(|b| b.key().to_string()).collect();
    assert_eq!(keys, ["ftyp", "free", "mdat"]);
    assert_eq!(boxes[1].start(), 20);
    assert_eq!(boxes[2].start(), 32);
    assert_eq!(boxes[2].end(), 47);
    assert!(boxes[0].decoded().is_some());
    assert!(matches!(
        boxes[2].kind,
        f4vbox::NodeKind::Leaf(LeafPayload::Raw(r)) if r.offset == 40 && r.len == 7
    ));
}

#[test]
fn parsing_is_lazy() {
    let mut data = ftyp();
    data.extend(bx(b"mdat", &[0x55u8; 1000]));
    let counter = Rc::new(Cell::new(0));
    let reader = CountingReader {
        inner: Cursor::new(data),
        max_read_end: counter.clone(),
    };

    let mut iter = F4vParser::default().parse_reader(reader).unwrap();
    assert_eq!(counter.get(), 0);

    let first = iter.advance().unwrap().unwrap();
    assert_eq!(first.key().to_string(), "ftyp");
    assert_eq!(counter.get(), 20);

    let second = iter.advance().unwrap().unwrap();
    assert_eq!(second.size, 1008);
    // only the mdat header was read, never its payload
    assert_eq!(counter.get(), 28);

    assert!(iter.advance().unwrap().is_none());
    assert!(!iter.is_open());
}

#[test]
fn overrun_keeps_earlier_boxes() {
    let mut data = ftyp();
    data.extend_from_slice(&100u32.to_be_bytes());
    data.extend_from_slice(b"moov");
    data.extend_from_slice(&[0u8; 8]);

    let mut iter = parse(data.clone()).unwrap();
    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(
        iter.next(),
        Some(Err(ParseError::Overrun { offset: 20, size: 100, available: 16, .. }))
    ));
    assert!(!iter.is_open());
    assert!(iter.next().is_none());
    assert!(iter.next().is_none());

    let partial = F4vParser::default().parse_all(data);
    assert!(!partial.is_complete());
    assert_eq!(partial.boxes.len(), 1);
    assert!(matches!(partial.error, Some(ParseError::Overrun { .. })));
    assert!(partial.into_result().is_err());
}

#[test]
fn empty_source_yields_nothing() {
    let mut iter = parse(Vec::new()).unwrap();
    assert!(iter.next().is_none());
    assert!(!iter.is_open());
}

#[test]
fn start_offset_shifts_first_box() {
    let mut data = b"JUNK".to_vec();
    data.extend(ftyp());
    let parser = F4vParser::new(ParserConfig::default().with_start_offset(4));
    let boxes = parser.parse_all(data).into_result().unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].start(), 4);
    assert_eq!(boxes[0].end(), 24);
}

#[test]
fn path_source_round_trips_spans() {
    let mut data = ftyp();
    data.extend(bx(b"moov", &bx(b"udta", &bx(b"zzzz", b"xyz"))));
    data.extend(bx(b"mdat", &[1, 2, 3, 4, 5]));
    let path = temp_file("roundtrip.f4v", &data);

    let boxes = parse(path.as_path()).unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(boxes.len(), 3);
    for b in boxes.iter().flat_map(|b| b.walk()).map(|(_, b)| b) {
        let mut bytes = b.header.to_bytes();
        let payload = b.payload_range();
        bytes.extend_from_slice(&data[payload.offset as usize..payload.end() as usize]);
        assert_eq!(bytes, &data[b.start() as usize..b.end() as usize], "{}", b.key());
    }

    std::fs::remove_file(path).unwrap();
}

#[test]
fn directory_is_unsupported() {
    let dir = std::env::temp_dir();
    assert!(matches!(parse(dir), Err(ParseError::UnsupportedSource(_))));
}

#[test]
fn missing_path_is_io_error() {
    assert!(matches!(parse("/nonexistent/f4vbox/input.f4v"), Err(ParseError::Io(_))));
}

#[test]
fn unseekable_stream_is_unsupported() {
    assert!(matches!(
        F4vParser::default().parse_reader(NoSeek),
        Err(ParseError::UnsupportedSource(_))
    ));
    let source = Source::Stream(Box::new(NoSeek));
    assert!(matches!(parse(source), Err(ParseError::UnsupportedSource(_))));
}

#[test]
fn read_range_while_open() {
    let mut data = ftyp();
    data.extend(bx(b"mdat", b"abcd"));
    data.extend(bx(b"free", &[]));

    let mut iter = parse(data).unwrap();
    iter.advance().unwrap();
    let mdat = iter.advance().unwrap().unwrap();
    assert_eq!(iter.position(), Some(32));
    assert_eq!(iter.read_range(&mdat.payload_range()).unwrap(), b"abcd");

    // parsing resumes where it stopped
    let free = iter.advance().unwrap().unwrap();
    assert_eq!(free.key().to_string(), "free");
    assert_eq!(free.start(), 32);

    assert!(iter.advance().unwrap().is_none());
    assert!(matches!(
        iter.read_range(&mdat.payload_range()),
        Err(ParseError::UnsupportedSource(_))
    ));
}

#[test]
fn open_ended_top_level_mdat() {
    let mut data = ftyp();
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(b"mdat");
    data.extend_from_slice(&[9u8; 100]);

    let boxes = F4vParser::default().parse_all(data).into_result().unwrap();
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[1].size, 108);
    assert_eq!(boxes[1].payload_range().len, 100);
}

#[test]
fn file_stream_source() {
    let path = temp_file("stream.f4v", &ftyp());
    let file = std::fs::File::open(&path).unwrap();
    assert!(is_mp4(file));

    let file = std::fs::File::open(&path).unwrap();
    let boxes = F4vParser::default().parse_all(file).into_result().unwrap();
    assert_eq!(boxes.len(), 1);
    std::fs::remove_file(path).unwrap();
}

#[test]
fn last_box_payload_is_readable_before_end_is_reported() {
    let mut data = ftyp();
    data.extend(bx(b"mdat", b"tail"));

    let mut iter = parse(data).unwrap();
    iter.advance().unwrap();
    let mdat = iter.advance().unwrap().unwrap();
    assert!(iter.is_open());
    assert_eq!(iter.read_range(&mdat.payload_range()).unwrap(), b"tail");

    assert!(iter.advance().unwrap().is_none());
    assert!(!iter.is_open());
}

#[test]
fn quicktime_udta_meta_keeps_movie_tree() {
    let mut hdlr = vec![0u8; 8];
    hdlr.extend_from_slice(b"mdir");
    hdlr.extend_from_slice(&[0u8; 13]);
    let meta = bx(b"meta", &bx(b"hdlr", &hdlr));
    let mut data = ftyp();
    data.extend(bx(b"moov", &bx(b"udta", &meta)));

    let partial = F4vParser::default().parse_all(data);
    assert!(partial.is_complete(), "{:?}", partial.error);
    assert_eq!(partial.boxes.len(), 2);
    assert!(partial.boxes[1].find("udta.meta.hdlr").is_some());
}

#[test]
fn sniff_borrowed_buffer() {
    let data = ftyp();
    let parser = F4vParser::default();
    assert!(parser.is_mp4_reader(Cursor::new(data.as_slice())));
    assert!(!parser.is_mp4_reader(Cursor::new(&b"hello world!"[..])));
    assert!(!parser.is_mp4_reader(NoSeek));

    let boxes: Vec<_> = parser
        .parse_reader(Cursor::new(data.as_slice()))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(boxes.len(), 1);
}

#[test]
fn shared_registry_is_used_by_every_parser() {
    let registry = Arc::new(Registry::new());
    let config = ParserConfig::default().with_shared_registry(registry.clone());
    let a = F4vParser::new(config.clone());
    let b = F4vParser::new(config);
    assert_eq!(Arc::strong_count(&registry), 3);
    assert!(Arc::ptr_eq(&a.config().registry, &b.config().registry));

    // an empty registry leaves ftyp undecoded
    let boxes = a.parse_all(ftyp()).into_result().unwrap();
    assert!(boxes[0].decoded().is_none());
}
