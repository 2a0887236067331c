//! Common types used across xrlevel
//!
//! Chunk roles name what a numeric chunk tag means once a format version has
//! been resolved. Diagnostics collect non-fatal findings during a decode.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic role of a chunk, independent of the numeric tag used on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkRole {
    /// Version and quality header
    Header,
    /// Shader name table
    Shaders,
    /// Texture name table (legacy versions only)
    Textures,
    /// Vertex buffers
    Vb,
    /// Fixed-function vertex buffers, used by v9 when `Vb` is absent
    VbOld,
    /// Index buffers
    Ib,
    /// Slide window items
    Swis,
    /// Compiled visuals
    Visuals,
    /// Sectors
    Sectors,
    /// Portals
    Portals,
    /// Light-glow proxies
    Glows,
    /// Dynamic lights
    LightDynamic,
    /// Embedded collision form
    Cform,
    /// Root visual sub-record inside a sector
    SectorRoot,
    /// Portal list sub-record inside a sector
    SectorPortals,
}

impl ChunkRole {
    /// Every top-level role, in decode order
    pub const LEVEL_ROLES: [ChunkRole; 13] = [
        ChunkRole::Header,
        ChunkRole::Shaders,
        ChunkRole::Textures,
        ChunkRole::Vb,
        ChunkRole::VbOld,
        ChunkRole::Ib,
        ChunkRole::Swis,
        ChunkRole::Visuals,
        ChunkRole::Sectors,
        ChunkRole::Portals,
        ChunkRole::Glows,
        ChunkRole::LightDynamic,
        ChunkRole::Cform,
    ];

    /// Upper-case name as used in format documentation
    pub fn name(&self) -> &'static str {
        match self {
            ChunkRole::Header => "HEADER",
            ChunkRole::Shaders => "SHADERS",
            ChunkRole::Textures => "TEXTURES",
            ChunkRole::Vb => "VB",
            ChunkRole::VbOld => "VB_OLD",
            ChunkRole::Ib => "IB",
            ChunkRole::Swis => "SWIS",
            ChunkRole::Visuals => "VISUALS",
            ChunkRole::Sectors => "SECTORS",
            ChunkRole::Portals => "PORTALS",
            ChunkRole::Glows => "GLOWS",
            ChunkRole::LightDynamic => "LIGHT_DYNAMIC",
            ChunkRole::Cform => "CFORM",
            ChunkRole::SectorRoot => "SECTOR_ROOT",
            ChunkRole::SectorPortals => "SECTOR_PORTALS",
        }
    }

    /// Whether the role lives in the geometry companion file for split versions
    pub fn is_geometry(&self) -> bool {
        matches!(self, ChunkRole::Vb | ChunkRole::Ib | ChunkRole::Swis)
    }
}

impl fmt::Display for ChunkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Companion geometry files stored next to a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanionKind {
    /// `<level>.geom`, full-detail geometry
    Geom,
    /// `<level>.geomx`, fast-path geometry
    Geomx,
}

impl CompanionKind {
    /// File extension appended to the level path
    pub fn extension(&self) -> &'static str {
        match self {
            CompanionKind::Geom => "geom",
            CompanionKind::Geomx => "geomx",
        }
    }
}

impl fmt::Display for CompanionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// The file a chunk was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFile {
    Level,
    Companion(CompanionKind),
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFile::Level => f.write_str("level"),
            SourceFile::Companion(kind) => write!(f, "companion {kind}"),
        }
    }
}

/// A non-fatal finding reported alongside a decoded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A top-level chunk no decode step consumed
    UnknownChunk {
        tag: u32,
        size: usize,
        source: SourceFile,
    },
    /// A sector sub-chunk with an unrecognized tag
    UnknownSectorChunk {
        sector: u32,
        tag: u32,
        size: usize,
    },
    /// A vertex layout outside the ones the level compiler usually emits
    UnusualVertexFormat {
        buffer: usize,
        fastpath: bool,
        description: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownChunk { tag, size, source } => {
                write!(f, "unknown {source} chunk 0x{tag:X}, size = {size}")
            }
            Diagnostic::UnknownSectorChunk { sector, tag, size } => {
                write!(f, "unknown sector {sector} chunk 0x{tag:X}, size = {size}")
            }
            Diagnostic::UnusualVertexFormat { buffer, fastpath, description } => {
                let set = if *fastpath { "fastpath" } else { "primary" };
                write!(f, "{set} vertex buffer {buffer}: {description}")
            }
        }
    }
}

/// Ordered collection of diagnostics produced by one decode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Tags of every unknown top-level chunk, in report order
    pub fn unknown_chunks(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter_map(|d| match d {
                Diagnostic::UnknownChunk { tag, .. } => Some(*tag),
                _ => None,
            })
            .collect()
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
