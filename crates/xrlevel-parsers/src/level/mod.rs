//! X-Ray level files: document model and decode pipeline.
//!
//! # File Set
//! ```text
//! level        header, shader table, visuals, sectors, portals, glows, lights
//! level.geom   vertex/index/slide-window buffers (v13+)
//! level.geomx  fast-path buffers (v14, optional)
//! ```
//!
//! Decoding runs through [`ParsePhase`] in order. The header is read and the
//! version checked before any other chunk is interpreted, so an unsupported
//! file fails without partial work. Cross-references are resolved in a
//! second step once the lists they point into exist.

pub mod encode;
pub mod geometry;
pub mod materials;
pub mod spatial;
pub mod visuals;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use xrlevel_core::{ChunkRole, CompanionKind, Diagnostic, Diagnostics, Error, ResultExt, SourceFile};

use crate::chunked::{ChunkMap, ChunkedReader};
use crate::packed::PackedReader;
use crate::registry::{ChunkTagTable, FormatVersion, SchemaRegistry, HEADER_TAG, SUPPORTED_VERSIONS};
use crate::traits::{ParseOptions, ParsePhase, ParseProgress, ParseResult, Parser, ProgressCallback};

pub use encode::{EncodedLevel, LevelEncoder};
pub use geometry::{IndexBuffer, SlideWindowItem, VertexBuffer, VertexElement, VertexFormat};
pub use materials::{IndexedMaterials, MaterialHandle, MaterialResolver};
pub use spatial::{DynamicLight, Glow, Portal, Sector, SectorId};
pub use visuals::{Visual, VisualHeader, VisualHierarchy, VisualId};

/// One complete set of GPU buffers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometrySet {
    pub vertex_buffers: Vec<VertexBuffer>,
    /// Empty for versions before v9
    pub index_buffers: Vec<IndexBuffer>,
    /// v12+ only; `None` when the chunk is absent
    pub slide_windows: Option<Vec<SlideWindowItem>>,
}

/// Everything a level file set describes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDocument {
    pub version: FormatVersion,
    pub quality: u16,
    /// Header version of `.geom`, for versions that split geometry out
    pub geom_version: Option<u16>,
    pub shaders: Vec<String>,
    /// v4-v5 only
    pub textures: Option<Vec<String>>,
    /// One handle per shader entry
    pub materials: Vec<MaterialHandle>,
    pub geometry: GeometrySet,
    /// Fast-path set from `.geomx`
    pub fastpath: Option<GeometrySet>,
    pub visuals: VisualHierarchy,
    pub sectors: Vec<Sector>,
    pub portals: Vec<Portal>,
    pub glows: Vec<Glow>,
    pub lights: Vec<DynamicLight>,
    /// Embedded collision form, v9 and earlier, when the level carries one
    pub cform: Option<Vec<u8>>,
}

impl LevelDocument {
    /// An empty document for `version`
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            quality: 0,
            geom_version: version.splits_geometry_file().then(|| version.get()),
            shaders: Vec::new(),
            textures: version.has_textures_chunk().then(Vec::new),
            materials: Vec::new(),
            geometry: GeometrySet::default(),
            fastpath: None,
            visuals: VisualHierarchy::default(),
            sectors: Vec::new(),
            portals: Vec::new(),
            glows: Vec::new(),
            lights: Vec::new(),
            cform: version.embeds_cform().then(Vec::new),
        }
    }

    pub fn sector(&self, id: SectorId) -> Option<&Sector> {
        self.sectors.get(id.index())
    }

    pub fn visual(&self, id: VisualId) -> Option<&Visual> {
        self.visuals.get(id)
    }

    /// Sectors on each side of a portal
    pub fn portal_sectors(&self, portal: &Portal) -> Option<(&Sector, &Sector)> {
        Some((self.sector(portal.front)?, self.sector(portal.back)?))
    }

    /// Shader name behind a glow
    pub fn glow_shader(&self, glow: &Glow) -> Option<&str> {
        self.shaders.get(glow.shader_index as usize).map(String::as_str)
    }

    /// Short per-section counts for display
    pub fn summary(&self) -> LevelSummary {
        LevelSummary {
            version: self.version.get(),
            quality: self.quality,
            shaders: self.shaders.len(),
            textures: self.textures.as_ref().map_or(0, Vec::len),
            vertex_buffers: self.geometry.vertex_buffers.len(),
            index_buffers: self.geometry.index_buffers.len(),
            slide_windows: self.geometry.slide_windows.as_ref().map_or(0, Vec::len),
            fastpath: self.fastpath.is_some(),
            visuals: self.visuals.len(),
            sectors: self.sectors.len(),
            portals: self.portals.len(),
            glows: self.glows.len(),
            lights: self.lights.len(),
            cform_bytes: self.cform.as_ref().map_or(0, Vec::len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub version: u16,
    pub quality: u16,
    pub shaders: usize,
    pub textures: usize,
    pub vertex_buffers: usize,
    pub index_buffers: usize,
    pub slide_windows: usize,
    pub fastpath: bool,
    pub visuals: usize,
    pub sectors: usize,
    pub portals: usize,
    pub glows: usize,
    pub lights: usize,
    pub cform_bytes: usize,
}

/// A decoded document plus everything worth reporting about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedLevel {
    pub document: LevelDocument,
    pub diagnostics: Diagnostics,
}

/// Raw bytes of a level and its companions
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelSources<'a> {
    pub level: &'a [u8],
    pub geom: Option<&'a [u8]>,
    pub geomx: Option<&'a [u8]>,
}

impl<'a> LevelSources<'a> {
    pub fn level(level: &'a [u8]) -> Self {
        Self { level, geom: None, geomx: None }
    }

    pub fn with_geom(mut self, geom: &'a [u8]) -> Self {
        self.geom = Some(geom);
        self
    }

    pub fn with_geomx(mut self, geomx: &'a [u8]) -> Self {
        self.geomx = Some(geomx);
        self
    }

    fn total_bytes(&self) -> u64 {
        [Some(self.level), self.geom, self.geomx]
            .iter()
            .flatten()
            .map(|b| b.len() as u64)
            .sum()
    }
}

/// Path of a companion file: the level path with `.geom`/`.geomx` appended
pub fn companion_path(level: &Path, kind: CompanionKind) -> PathBuf {
    let mut path = level.as_os_str().to_owned();
    path.push(kind.to_string());
    PathBuf::from(path)
}

/// Read only the header of a level or companion file
pub fn peek_version(data: &[u8]) -> ParseResult<(FormatVersion, u16)> {
    let (version, quality) = read_header(find_header(data)?)?;
    Ok((FormatVersion::new(u32::from(version))?, quality))
}

/// Walk records only as far as the header chunk
fn find_header(data: &[u8]) -> ParseResult<&[u8]> {
    ChunkedReader::new(data)
        .find_tag(HEADER_TAG)?
        .ok_or(Error::MissingChunk { role: ChunkRole::Header, tag: HEADER_TAG })
}

fn read_header(payload: &[u8]) -> ParseResult<(u16, u16)> {
    let mut reader = PackedReader::new(payload);
    Ok((reader.u16()?, reader.u16()?))
}

/// Level decode pipeline
#[derive(Clone)]
pub struct LevelParser {
    resolver: Arc<dyn MaterialResolver>,
}

impl Default for LevelParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LevelParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelParser").finish_non_exhaustive()
    }
}

impl LevelParser {
    /// Parser using [`IndexedMaterials`]
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(IndexedMaterials))
    }

    pub fn with_resolver(resolver: Arc<dyn MaterialResolver>) -> Self {
        Self { resolver }
    }

    /// Decode with default options
    pub fn decode(&self, sources: LevelSources<'_>) -> ParseResult<DecodedLevel> {
        self.decode_with_options(sources, &ParseOptions::default(), None)
    }

    pub fn decode_with_options(
        &self,
        sources: LevelSources<'_>,
        options: &ParseOptions,
        progress: Option<&ProgressCallback>,
    ) -> ParseResult<DecodedLevel> {
        let span = tracing::info_span!(
            "decode_level",
            bytes = sources.level.len(),
            version = tracing::field::Empty
        );
        let _guard = span.enter();

        let mut state = DecodeState {
            phase: ParsePhase::Start,
            progress,
            total_bytes: sources.total_bytes(),
            version: None,
            diagnostics: Vec::new(),
        };
        state.enter(ParsePhase::Start, &ChunkMap::default());

        // Header and version gate come before any other chunk is framed
        let (raw_version, quality) = read_header(find_header(sources.level)?)?;
        let (version, table) = SchemaRegistry::resolve_version(u32::from(raw_version))?;
        state.version = Some(version);
        span.record("version", version.get());

        let mut level = ChunkMap::decode(sources.level)?;
        level.pop(HEADER_TAG);
        state.enter(ParsePhase::HeaderParsed, &level);
        tracing::debug!(%version, quality, band = table.band, "schema resolved");

        let mut geom = if version.splits_geometry_file() {
            let data = sources.geom.ok_or(Error::MissingCompanion { kind: CompanionKind::Geom })?;
            Some(open_companion(data, version, CompanionKind::Geom)?)
        } else {
            if sources.geom.is_some() {
                tracing::warn!(%version, "ignoring .geom companion, geometry is embedded");
            }
            None
        };
        let mut geomx = match sources.geomx {
            Some(data) if version.has_fastpath_file() && options.decode_fastpath => {
                Some(open_companion(data, version, CompanionKind::Geomx)?)
            }
            Some(_) if !version.has_fastpath_file() => {
                tracing::warn!(%version, "ignoring .geomx companion");
                None
            }
            _ => None,
        };
        state.enter(ParsePhase::SchemaResolved, &level);

        let shaders = materials::decode_name_table(pop(&mut level, table, ChunkRole::Shaders)?)?;
        let textures = if version.has_textures_chunk() {
            Some(materials::decode_name_table(pop(&mut level, table, ChunkRole::Textures)?)?)
        } else {
            None
        };
        let material_handles = materials::resolve_shader_materials(&shaders, self.resolver.as_ref());
        tracing::debug!(shaders = shaders.len(), textures = textures.as_ref().map(Vec::len), "materials");
        state.enter(ParsePhase::MaterialsResolved, &level);

        let geometry = match geom.as_mut() {
            Some(companion) => decode_geometry(&mut companion.chunks, version, table, false, &mut state)?,
            None => decode_geometry(&mut level, version, table, false, &mut state)?,
        };
        let fastpath = match geomx.as_mut() {
            Some(companion) => Some(decode_geometry(&mut companion.chunks, version, table, true, &mut state)?),
            None => None,
        };
        state.enter(ParsePhase::GeometryDecoded, &level);

        let visuals = visuals::decode_visuals(pop(&mut level, table, ChunkRole::Visuals)?)?;
        let sectors = spatial::decode_sectors(
            pop(&mut level, table, ChunkRole::Sectors)?,
            &visuals,
            &mut state.diagnostics,
        )?;
        let portals = spatial::decode_portals(pop(&mut level, table, ChunkRole::Portals)?, version, sectors.len())?;
        let glows = spatial::decode_glows(
            pop(&mut level, table, ChunkRole::Glows)?,
            version,
            shaders.len(),
            textures.as_ref().map(Vec::len),
            self.resolver.as_ref(),
        )?;
        let lights = spatial::decode_dynamic_lights(pop(&mut level, table, ChunkRole::LightDynamic)?, version)?;
        // Collision data belongs to a separate decoder; keep it when present
        let cform = if version.embeds_cform() {
            level.pop(table.require(ChunkRole::Cform)?).map(<[u8]>::to_vec)
        } else {
            None
        };
        state.enter(ParsePhase::GraphDecoded, &level);

        let geom_version = geom.as_ref().map(|c| c.version);
        let leftovers = [
            (SourceFile::Level, Some(level)),
            (SourceFile::Companion(CompanionKind::Geom), geom.map(|c| c.chunks)),
            (SourceFile::Companion(CompanionKind::Geomx), geomx.map(|c| c.chunks)),
        ];
        for (source, chunks) in leftovers {
            for chunk in chunks.into_iter().flat_map(ChunkMap::into_remaining) {
                if options.strict_unknown_chunks {
                    return Err(Error::invalid_data(format!(
                        "unknown {source} chunk 0x{:X}, size = {}",
                        chunk.tag,
                        chunk.payload.len()
                    )));
                }
                tracing::warn!(%source, tag = chunk.tag, size = chunk.payload.len(), "unknown chunk");
                state.diagnostics.push(Diagnostic::UnknownChunk {
                    tag: chunk.tag,
                    size: chunk.payload.len(),
                    source,
                });
            }
        }
        state.enter(ParsePhase::Complete, &ChunkMap::default());

        let document = LevelDocument {
            version,
            quality,
            geom_version,
            shaders,
            textures,
            materials: material_handles,
            geometry,
            fastpath,
            visuals,
            sectors,
            portals,
            glows,
            lights,
            cform,
        };
        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(state.diagnostics);
        tracing::info!(
            %version,
            visuals = document.visuals.len(),
            sectors = document.sectors.len(),
            diagnostics = diagnostics.len(),
            "level decoded"
        );
        Ok(DecodedLevel { document, diagnostics })
    }
}

impl Parser for LevelParser {
    type Output = DecodedLevel;

    fn name(&self) -> &str {
        "X-Ray level"
    }

    fn supported_versions(&self) -> &[u16] {
        &SUPPORTED_VERSIONS
    }

    fn parse_bytes(
        &self,
        data: &[u8],
        options: &ParseOptions,
        progress: Option<&ProgressCallback>,
    ) -> ParseResult<DecodedLevel> {
        self.decode_with_options(LevelSources::level(data), options, progress)
    }

    /// Reads the level, then `.geom`/`.geomx` next to it when the version uses them
    fn parse_file_with_options(
        &self,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&ProgressCallback>,
    ) -> ParseResult<DecodedLevel> {
        let read = |path: &Path| {
            std::fs::read(path)
                .map_err(Error::from)
                .with_context(|| format!("reading {}", path.display()))
        };
        let level = read(path)?;
        let (version, _) = peek_version(&level)?;

        let mut geom = None;
        let mut geomx = None;
        if options.load_companions {
            let geom_path = companion_path(path, CompanionKind::Geom);
            if version.splits_geometry_file() && geom_path.is_file() {
                geom = Some(read(&geom_path)?);
            }
            let geomx_path = companion_path(path, CompanionKind::Geomx);
            if version.has_fastpath_file() && options.decode_fastpath && geomx_path.is_file() {
                geomx = Some(read(&geomx_path)?);
            }
        }

        let sources = LevelSources {
            level: &level,
            geom: geom.as_deref(),
            geomx: geomx.as_deref(),
        };
        self.decode_with_options(sources, options, progress)
    }
}

struct Companion<'a> {
    version: u16,
    chunks: ChunkMap<'a>,
}

fn open_companion(data: &[u8], version: FormatVersion, kind: CompanionKind) -> ParseResult<Companion<'_>> {
    let (companion_version, _) = read_header(find_header(data)?)?;
    FormatVersion::new(u32::from(companion_version))?;
    if companion_version != version.get() {
        return Err(Error::VersionMismatch { primary: version.get(), companion: companion_version });
    }
    let mut chunks = ChunkMap::decode(data).with_context(|| format!("companion {kind}"))?;
    chunks.pop(HEADER_TAG);
    tracing::debug!(%kind, chunks = chunks.len(), "companion opened");
    Ok(Companion { version: companion_version, chunks })
}

fn pop<'a>(chunks: &mut ChunkMap<'a>, table: &ChunkTagTable, role: ChunkRole) -> ParseResult<&'a [u8]> {
    let tag = table.require(role)?;
    let payload = chunks.pop_required(role, tag)?;
    tracing::debug!(%role, tag, size = payload.len(), "chunk");
    Ok(payload)
}

fn decode_geometry(
    chunks: &mut ChunkMap<'_>,
    version: FormatVersion,
    table: &ChunkTagTable,
    fastpath: bool,
    state: &mut DecodeState<'_>,
) -> ParseResult<GeometrySet> {
    let vb_tag = table.require(ChunkRole::Vb)?;
    let (vb, fixed_function) = match chunks.pop(vb_tag) {
        Some(payload) => (payload, version.fixed_function_vertices()),
        None if version.may_fall_back_to_old_vb() => (pop(chunks, table, ChunkRole::VbOld)?, true),
        None => return Err(Error::MissingChunk { role: ChunkRole::Vb, tag: vb_tag }),
    };
    let (vertex_buffers, unusual) = geometry::decode_vertex_buffers(vb, fixed_function)?;
    for (buffer, description) in unusual {
        tracing::warn!(buffer, fastpath, %description, "unusual vertex format");
        state.diagnostics.push(Diagnostic::UnusualVertexFormat { buffer, fastpath, description });
    }

    let index_buffers = if version.has_index_buffers() {
        geometry::decode_index_buffers(pop(chunks, table, ChunkRole::Ib)?)?
    } else {
        Vec::new()
    };

    let slide_windows = if version.has_slide_windows() {
        let tag = table.require(ChunkRole::Swis)?;
        match chunks.pop(tag) {
            Some(payload) => Some(geometry::decode_slide_windows(payload)?),
            None if fastpath => return Err(Error::MissingChunk { role: ChunkRole::Swis, tag }),
            None => None,
        }
    } else {
        None
    };

    tracing::debug!(
        fastpath,
        vertex_buffers = vertex_buffers.len(),
        index_buffers = index_buffers.len(),
        "geometry"
    );
    Ok(GeometrySet { vertex_buffers, index_buffers, slide_windows })
}

struct DecodeState<'p> {
    phase: ParsePhase,
    progress: Option<&'p ProgressCallback>,
    total_bytes: u64,
    version: Option<FormatVersion>,
    diagnostics: Vec<Diagnostic>,
}

impl DecodeState<'_> {
    fn enter(&mut self, phase: ParsePhase, level: &ChunkMap<'_>) {
        debug_assert!(phase >= self.phase);
        self.phase = phase;
        tracing::trace!(?phase, "decode phase");
        if let Some(callback) = self.progress {
            callback(ParseProgress {
                phase,
                total_bytes: self.total_bytes,
                chunks_remaining: level.len(),
                version: self.version.map(|v| v.get()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_companion_path() {
        let level = Path::new("/levels/l01_escape/level");
        assert_eq!(companion_path(level, CompanionKind::Geom), Path::new("/levels/l01_escape/level.geom"));
        assert_eq!(companion_path(level, CompanionKind::Geomx), Path::new("/levels/l01_escape/level.geomx"));
    }

    #[test]
    fn test_new_document_shape() {
        let v14 = LevelDocument::new(FormatVersion::new(14).unwrap());
        assert_eq!(v14.geom_version, Some(14));
        assert!(v14.textures.is_none());
        assert!(v14.cform.is_none());

        let v5 = LevelDocument::new(FormatVersion::new(5).unwrap());
        assert_eq!(v5.geom_version, None);
        assert_eq!(v5.textures, Some(Vec::new()));
        assert_eq!(v5.cform, Some(Vec::new()));
    }

    #[test]
    fn test_peek_version_rejects_unknown() {
        let data = crate::chunked::encode_chunks([(HEADER_TAG, &[7u8, 0, 0, 0][..])]);
        assert!(matches!(peek_version(&data), Err(Error::UnsupportedVersion { version: 7, .. })));
    }

    #[test]
    fn test_version_gate_runs_before_framing() {
        let mut data = crate::chunked::encode_chunks([(HEADER_TAG, &[7u8, 0, 0, 0][..])]);
        // Trailing record claims 255 bytes but carries one
        data.extend_from_slice(&[0x2, 0, 0, 0, 0xFF, 0, 0, 0, 0xAA]);

        let err = LevelParser::new().decode(LevelSources::level(&data)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { version: 7, .. }), "got {err:?}");
        assert!(matches!(peek_version(&data), Err(Error::UnsupportedVersion { version: 7, .. })));
    }

    #[test]
    fn test_supported_header_with_truncated_record_underruns() {
        let mut data = crate::chunked::encode_chunks([(HEADER_TAG, &[10u8, 0, 0, 0][..])]);
        data.extend_from_slice(&[0x2, 0, 0, 0, 0xFF, 0, 0, 0, 0xAA]);

        let err = LevelParser::new().decode(LevelSources::level(&data)).unwrap_err();
        assert!(matches!(err.root(), Error::BufferUnderrun { .. }), "got {err:?}");
    }

    #[test]
    fn test_header_only_file_fails_on_shaders() {
        let data = crate::chunked::encode_chunks([(HEADER_TAG, &[10u8, 0, 0, 0][..])]);
        let err = LevelParser::new().decode(LevelSources::level(&data)).unwrap_err();
        assert_eq!(err.missing_role(), Some(ChunkRole::Shaders));
    }
}
