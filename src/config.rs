use crate::registry::{Registry, default_registry};
use std::sync::Arc;

/// Container nesting allowed before parsing fails with `DepthExceeded`.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Recognized leaves with a larger payload are kept as raw byte ranges.
pub const DEFAULT_MAX_DECODE_LEN: u64 = 1 << 20;

/// Parser configuration.
///
/// Cheap to clone: the registry is shared.
#[derive(Clone)]
pub struct ParserConfig {
    pub registry: Arc<Registry>,
    pub max_depth: usize,
    /// Absolute offset where the top-level scope begins.
    pub start_offset: u64,
    pub max_decode_len: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            registry: Arc::new(default_registry()),
            max_depth: DEFAULT_MAX_DEPTH,
            start_offset: 0,
            max_decode_len: DEFAULT_MAX_DECODE_LEN,
        }
    }
}

impl ParserConfig {
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_shared_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_start_offset(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn with_max_decode_len(mut self, len: u64) -> Self {
        self.max_decode_len = len;
        self
    }
}
