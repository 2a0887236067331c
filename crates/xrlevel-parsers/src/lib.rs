//! xrlevel-parsers
//!
//! Decoder and encoder for X-Ray engine compiled level files.
//!
//! # Supported Versions
//!
//! | Version | Files | Notes |
//! |---------|-------|-------|
//! | 4, 5    | `level` | Texture table, FVF vertices, embedded CFORM |
//! | 8       | `level` | FVF vertices, embedded CFORM |
//! | 9       | `level` | Declarations or old FVF buffers, index buffers |
//! | 10, 11  | `level` | Declarations, index buffers |
//! | 12      | `level` | Slide windows |
//! | 13      | `level`, `level.geom` | Geometry split out |
//! | 14      | `level`, `level.geom`, `level.geomx` | Optional fast-path geometry |
//!
//! # Example
//!
//! ```rust,ignore
//! use xrlevel_parsers::{LevelEncoder, LevelParser, Parser};
//!
//! let decoded = LevelParser::new().parse_file("levels/l01_escape/level".as_ref())?;
//! for diagnostic in decoded.diagnostics.iter() {
//!     println!("{diagnostic}");
//! }
//! let encoded = LevelEncoder::encode(&decoded.document, 14)?;
//! ```

pub mod batch;
pub mod chunked;
pub mod level;
pub mod logging;
pub mod packed;
pub mod registry;
pub mod traits;

// Re-export main types
pub use traits::{ParseOptions, ParsePhase, ParseProgress, ParseResult, Parser, ProgressCallback};

pub use registry::{ChunkTagTable, FormatVersion, LightLayout, SchemaRegistry, HEADER_TAG, SUPPORTED_VERSIONS};

pub use chunked::{decode_chunks, encode_chunks, Chunk, ChunkMap, ChunkWriter, ChunkedReader};

pub use level::{
    companion_path, peek_version, DecodedLevel, DynamicLight, EncodedLevel, GeometrySet, Glow,
    IndexBuffer, IndexedMaterials, LevelDocument, LevelEncoder, LevelParser, LevelSources,
    LevelSummary, MaterialHandle, MaterialResolver, Portal, Sector, SectorId, SlideWindowItem,
    VertexBuffer, VertexElement, VertexFormat, Visual, VisualHeader, VisualHierarchy, VisualId,
};

pub use batch::{decode_batch, BatchOutcome, BatchReport, BatchStatus};
