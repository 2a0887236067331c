//! Parser interface shared by the level decoder and the batch driver.
//!
//! Options, progress reporting and the file-loading entry points live here so
//! the CLI and batch code can drive any parser the same way.

use std::path::Path;

use xrlevel_core::{Error, ResultExt};

/// Result type alias for parsing operations
pub type ParseResult<T> = xrlevel_core::Result<T>;

/// Progress callback for decode state transitions.
///
/// Borrowed as `Option<&ProgressCallback>` so one closure can serve many
/// concurrent decodes.
pub type ProgressCallback = dyn Fn(ParseProgress) + Send + Sync;

/// Progress information during parsing
#[derive(Debug, Clone)]
pub struct ParseProgress {
    /// Phase just entered
    pub phase: ParsePhase,
    /// Total bytes across the level and any companion files
    pub total_bytes: u64,
    /// Chunks still waiting to be consumed in the level file
    pub chunks_remaining: usize,
    /// Resolved format version, once known
    pub version: Option<u16>,
}

/// Decode pipeline states, entered strictly in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParsePhase {
    /// Chunk framing decoded, nothing interpreted yet
    Start,
    /// Version and quality read
    HeaderParsed,
    /// Tag table selected for the version, companions opened
    SchemaResolved,
    /// Shader and texture tables read, material handles produced
    MaterialsResolved,
    /// Vertex, index and slide-window buffers decoded
    GeometryDecoded,
    /// Visuals, sectors, portals, glows and lights decoded and linked
    GraphDecoded,
    /// Leftover chunks reported, document handed back
    Complete,
}

/// Configuration options for parsing
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Fail with `InvalidData` instead of reporting unconsumed chunks
    pub strict_unknown_chunks: bool,
    /// Whether `parse_file` should look for `.geom`/`.geomx` next to the level
    pub load_companions: bool,
    /// Whether to decode the optional fast-path geometry set
    pub decode_fastpath: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_unknown_chunks: false,
            load_companions: true,
            decode_fastpath: true,
        }
    }
}

impl ParseOptions {
    /// Options that reject anything the schema does not account for
    pub fn strict() -> Self {
        Self {
            strict_unknown_chunks: true,
            ..Self::default()
        }
    }
}

/// Core trait for file format parsers
pub trait Parser: Send + Sync {
    /// The parsed output type
    type Output: Send;

    /// Returns a human-readable name for this parser
    fn name(&self) -> &str;

    /// Returns the format version(s) supported by this parser
    fn supported_versions(&self) -> &[u16] {
        &[]
    }

    /// Parse an in-memory primary file with custom options
    fn parse_bytes(
        &self,
        data: &[u8],
        options: &ParseOptions,
        progress: Option<&ProgressCallback>,
    ) -> ParseResult<Self::Output>;

    /// Parse with default options
    fn parse(&self, data: &[u8]) -> ParseResult<Self::Output> {
        self.parse_bytes(data, &ParseOptions::default(), None)
    }

    /// Parse from a file path
    fn parse_file(&self, path: &Path) -> ParseResult<Self::Output> {
        self.parse_file_with_options(path, &ParseOptions::default(), None)
    }

    /// Parse from a file path with options
    fn parse_file_with_options(
        &self,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&ProgressCallback>,
    ) -> ParseResult<Self::Output> {
        let data = std::fs::read(path)
            .map_err(Error::from)
            .with_context(|| format!("reading {}", path.display()))?;
        self.parse_bytes(&data, options, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert!(!options.strict_unknown_chunks);
        assert!(options.load_companions);
        assert!(options.decode_fastpath);
        assert!(ParseOptions::strict().strict_unknown_chunks);
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(ParsePhase::Start < ParsePhase::HeaderParsed);
        assert!(ParsePhase::MaterialsResolved < ParsePhase::GeometryDecoded);
        assert!(ParsePhase::GraphDecoded < ParsePhase::Complete);
    }
}
