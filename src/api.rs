use crate::{
    boxes::{BoxHeader, BoxKey, ByteRange, Mp4Box},
    builder::TreeBuilder,
    config::ParserConfig,
    cursor::BoxCursor,
    error::{ParseError, Result},
    known_boxes::KnownBox,
    parser::read_box_header,
};
use log::{debug, warn};
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

/// Anything the parser can read from.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Input to [`F4vParser::parse`] and [`F4vParser::is_mp4`].
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Stream(Box<dyn ReadSeek>),
}

impl From<PathBuf> for Source {
    fn from(p: PathBuf) -> Self {
        Source::Path(p)
    }
}

impl From<&Path> for Source {
    fn from(p: &Path) -> Self {
        Source::Path(p.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(p: &str) -> Self {
        Source::Path(PathBuf::from(p))
    }
}

impl From<Vec<u8>> for Source {
    fn from(b: Vec<u8>) -> Self {
        Source::Bytes(b)
    }
}

/// Copies the buffer. To sniff or parse a borrowed buffer without the copy,
/// pass `std::io::Cursor::new(bytes)` to [`F4vParser::is_mp4_reader`] or
/// [`F4vParser::parse_reader`].
impl From<&[u8]> for Source {
    fn from(b: &[u8]) -> Self {
        Source::Bytes(b.to_vec())
    }
}

impl From<File> for Source {
    fn from(f: File) -> Self {
        Source::Stream(Box::new(f))
    }
}

impl Source {
    fn open(self) -> Result<BoxCursor<Box<dyn ReadSeek>>> {
        let reader: Box<dyn ReadSeek> = match self {
            Source::Path(path) => {
                let meta = std::fs::metadata(&path)?;
                if !meta.is_file() {
                    return Err(ParseError::UnsupportedSource(format!(
                        "{} is not a regular file",
                        path.display()
                    )));
                }
                Box::new(File::open(&path)?)
            }
            Source::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            Source::Stream(stream) => stream,
        };
        open_cursor(reader)
    }
}

fn open_cursor<R: Read + Seek>(reader: R) -> Result<BoxCursor<R>> {
    BoxCursor::new(reader)
        .map_err(|e| ParseError::UnsupportedSource(format!("stream is not seekable: {}", e)))
}

/// Lazy, one-shot sequence of top-level boxes.
///
/// Each call to [`BoxIter::advance`] parses one complete top-level box.
/// The underlying reader stays open until `advance` reports the end of
/// input or a framing error, or the iterator itself is dropped, so the
/// payload of the last box can still be read with [`BoxIter::read_range`].
pub struct BoxIter<R = Box<dyn ReadSeek>> {
    cursor: Option<BoxCursor<R>>,
    config: ParserConfig,
}

impl<R: Read + Seek> BoxIter<R> {
    fn start(mut cursor: BoxCursor<R>, config: ParserConfig) -> Result<Self> {
        cursor.skip(config.start_offset)?;
        Ok(Self {
            cursor: Some(cursor),
            config,
        })
    }

    /// Parse the next top-level box, or `None` once the input is exhausted.
    pub fn advance(&mut self) -> Result<Option<Mp4Box>> {
        let Some(cur) = self.cursor.as_mut() else {
            return Ok(None);
        };
        if cur.at_end() {
            self.cursor = None;
            return Ok(None);
        }

        let available = cur.remaining_in_scope();
        let builder = TreeBuilder::from_config(&self.config);
        match builder.parse_box(cur, available) {
            Ok(b) => Ok(Some(b)),
            Err(e) => {
                warn!("stopping at top-level box: {}", e);
                self.cursor = None;
                Err(e)
            }
        }
    }

    /// Whether the source is still held open.
    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    /// Absolute offset of the next top-level box, while the source is open.
    pub fn position(&self) -> Option<u64> {
        self.cursor.as_ref().map(|c| c.position())
    }

    /// Read a payload range from the still-open source.
    pub fn read_range(&mut self, range: &ByteRange) -> Result<Vec<u8>> {
        match self.cursor.as_mut() {
            Some(cur) => Ok(cur.read_at(range.offset, range.len)?),
            None => Err(ParseError::UnsupportedSource(
                "source already released".to_string(),
            )),
        }
    }

    /// Drain the sequence, keeping every box parsed before a failure.
    pub fn collect_partial(mut self) -> PartialParse {
        let mut boxes = Vec::new();
        loop {
            match self.advance() {
                Ok(Some(b)) => boxes.push(b),
                Ok(None) => return PartialParse { boxes, error: None },
                Err(e) => {
                    return PartialParse {
                        boxes,
                        error: Some(e),
                    };
                }
            }
        }
    }
}

impl<R: Read + Seek> Iterator for BoxIter<R> {
    type Item = Result<Mp4Box>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

impl<R: Read + Seek> FusedIterator for BoxIter<R> {}

/// Top-level boxes parsed before the sequence ended, and the error that
/// ended it, if any.
#[derive(Debug)]
pub struct PartialParse {
    pub boxes: Vec<Mp4Box>,
    pub error: Option<ParseError>,
}

impl PartialParse {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<Mp4Box>> {
        match self.error {
            None => Ok(self.boxes),
            Some(e) => Err(e),
        }
    }
}

// Why a sniffed source is rejected. Never leaves this module.
enum Sniff {
    NotMp4(BoxKey),
    Failed(ParseError),
}

/// Entry point: turns a source into a lazy sequence of box trees.
#[derive(Clone, Default)]
pub struct F4vParser {
    config: ParserConfig,
}

impl F4vParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Open `source` and return the lazy top-level sequence.
    ///
    /// # Example
    /// ```no_run
    /// use f4vbox::F4vParser;
    ///
    /// for b in F4vParser::default().parse("video.f4v")? {
    ///     let b = b?;
    ///     println!("{} {}", b.key(), b.size);
    /// }
    /// # Ok::<(), f4vbox::ParseError>(())
    /// ```
    pub fn parse(&self, source: impl Into<Source>) -> Result<BoxIter> {
        let cursor = source.into().open()?;
        BoxIter::start(cursor, self.config.clone())
    }

    /// Like [`F4vParser::parse`], keeping the concrete reader type.
    pub fn parse_reader<R: Read + Seek>(&self, reader: R) -> Result<BoxIter<R>> {
        BoxIter::start(open_cursor(reader)?, self.config.clone())
    }

    /// Parse every top-level box, returning what was built before any error.
    pub fn parse_all(&self, source: impl Into<Source>) -> PartialParse {
        match self.parse(source) {
            Ok(iter) => iter.collect_partial(),
            Err(e) => PartialParse {
                boxes: Vec::new(),
                error: Some(e),
            },
        }
    }

    /// Cheap check that `source` starts with a plausible top-level box.
    ///
    /// Only the first header is read. Never fails: any error means `false`.
    pub fn is_mp4(&self, source: impl Into<Source>) -> bool {
        let sniffed = source.into().open().map_err(Sniff::Failed).and_then(|cur| self.sniff(cur));
        report_sniff(sniffed)
    }

    /// [`F4vParser::is_mp4`] over any seekable reader, borrowed buffers included.
    pub fn is_mp4_reader<R: Read + Seek>(&self, reader: R) -> bool {
        let sniffed = open_cursor(reader).map_err(Sniff::Failed).and_then(|cur| self.sniff(cur));
        report_sniff(sniffed)
    }

    fn sniff<R: Read + Seek>(&self, mut cur: BoxCursor<R>) -> std::result::Result<BoxHeader, Sniff> {
        cur.skip(self.config.start_offset)
            .map_err(|e| Sniff::Failed(e.into()))?;
        let available = cur.remaining_in_scope();
        let header = read_box_header(&mut cur, available).map_err(Sniff::Failed)?;
        if header.uuid.is_none() && KnownBox::from(header.typ).is_top_level_marker() {
            Ok(header)
        } else {
            Err(Sniff::NotMp4(header.key()))
        }
    }
}

fn report_sniff(sniffed: std::result::Result<BoxHeader, Sniff>) -> bool {
    match sniffed {
        Ok(h) => {
            debug!("is_mp4: first box is {}", h.typ);
            true
        }
        Err(Sniff::NotMp4(key)) => {
            debug!("is_mp4: first box '{}' is not a top-level type", key);
            false
        }
        Err(Sniff::Failed(e)) => {
            debug!("is_mp4: {}", e);
            false
        }
    }
}

/// Parse `source` with the default configuration.
pub fn parse(source: impl Into<Source>) -> Result<BoxIter> {
    F4vParser::default().parse(source)
}

/// [`F4vParser::is_mp4`] with the default configuration.
pub fn is_mp4(source: impl Into<Source>) -> bool {
    F4vParser::default().is_mp4(source)
}
