pub mod api;
pub mod boxes;
pub mod builder;
pub mod config;
pub mod cursor;
pub mod error;
pub mod known_boxes;
pub mod parser;
pub mod registry;
pub mod util;

pub use api::{BoxIter, F4vParser, PartialParse, ReadSeek, Source, is_mp4, parse};
pub use boxes::{BoxHeader, BoxKey, BoxSize, ByteRange, FourCC, FullBoxFields, LeafPayload, Mp4Box, NodeKind, find_path};
pub use builder::TreeBuilder;
pub use config::ParserConfig;
pub use cursor::BoxCursor;
pub use error::{ParseError, Result};
pub use parser::read_box_header;
pub use registry::{BoxDecoder, BoxValue, Classification, Registry, StructuredData, default_registry};
