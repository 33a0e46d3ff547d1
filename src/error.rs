use crate::boxes::FourCC;

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated header at {offset:#x}: need {needed} bytes, {available} available")]
    TruncatedHeader {
        offset: u64,
        needed: u64,
        available: u64,
    },

    #[error("invalid size {size} for '{typ}' at {offset:#x} (header is {header_size} bytes)")]
    InvalidSize {
        offset: u64,
        typ: FourCC,
        size: u64,
        header_size: u64,
    },

    #[error("'{typ}' at {offset:#x} declares {size} bytes but only {available} remain in scope")]
    Overrun {
        offset: u64,
        typ: FourCC,
        size: u64,
        available: u64,
    },

    #[error("nesting deeper than {max_depth} at {offset:#x}")]
    DepthExceeded { offset: u64, max_depth: usize },

    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
