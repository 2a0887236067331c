//! Level encode pipeline: document → level file set for a target version.
//!
//! Chunks are emitted in the target band's table order. Anything the target
//! cannot store is refused with `UnsupportedVersion` instead of being dropped.

use xrlevel_core::{ChunkRole, Error, Result};

use super::geometry::{self, VertexBuffer};
use super::{materials, spatial, visuals, GeometrySet, LevelDocument};
use crate::chunked::ChunkWriter;
use crate::packed::PackedWriter;
use crate::registry::{ChunkTagTable, FormatVersion, SchemaRegistry, HEADER_TAG};

/// Bytes for the level and whichever companions the version uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLevel {
    pub level: Vec<u8>,
    pub geom: Option<Vec<u8>>,
    pub geomx: Option<Vec<u8>>,
}

/// Encodes documents to any supported version
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelEncoder;

struct Payloads {
    entries: Vec<(ChunkRole, Vec<u8>)>,
}

impl Payloads {
    fn get(&self, role: ChunkRole) -> Option<&[u8]> {
        self.entries.iter().find(|(r, _)| *r == role).map(|(_, p)| p.as_slice())
    }

    /// Chunks in table order, headed by the header chunk
    fn write(&self, table: &ChunkTagTable, header: &[u8], roles: impl Fn(ChunkRole) -> bool) -> Vec<u8> {
        let mut writer = ChunkWriter::new();
        writer.chunk(HEADER_TAG, header);
        for (role, tag) in table.entries() {
            if role == ChunkRole::Header || !roles(role) {
                continue;
            }
            if let Some(payload) = self.get(role) {
                writer.chunk(tag, payload);
            }
        }
        writer.into_inner()
    }
}

fn refuse(version: FormatVersion, reason: impl Into<String>) -> Error {
    Error::unsupported_version(u32::from(version.get()), reason)
}

impl LevelEncoder {
    pub fn encode(document: &LevelDocument, target: u32) -> Result<EncodedLevel> {
        let (version, table) = SchemaRegistry::resolve_version(target)?;
        let span = tracing::info_span!("encode_level", %version);
        let _guard = span.enter();

        check_representable(document, version)?;

        let mut payloads = Payloads { entries: Vec::new() };
        let mut push = |role: ChunkRole, payload: Vec<u8>| payloads.entries.push((role, payload));

        push(ChunkRole::Shaders, materials::encode_name_table(&document.shaders));
        if version.has_textures_chunk() {
            let textures = document.textures.as_deref().unwrap_or_default();
            push(ChunkRole::Textures, materials::encode_name_table(textures));
        }
        for (role, payload) in geometry_payloads(&document.geometry, version)? {
            push(role, payload);
        }
        push(ChunkRole::Visuals, visuals::encode_visuals(&document.visuals));
        push(ChunkRole::Sectors, spatial::encode_sectors(&document.sectors));
        push(ChunkRole::Portals, spatial::encode_portals(&document.portals, version));
        push(ChunkRole::Glows, spatial::encode_glows(&document.glows, version)?);
        push(ChunkRole::LightDynamic, spatial::encode_dynamic_lights(&document.lights, version)?);
        if let Some(cform) = &document.cform {
            push(ChunkRole::Cform, cform.clone());
        }

        let mut header = PackedWriter::with_capacity(4);
        header.u16(version.get()).u16(document.quality);
        let header = header.into_inner();

        let split = version.splits_geometry_file();
        let level = payloads.write(table, &header, |role| !(split && role.is_geometry()));
        let geom = split.then(|| payloads.write(table, &header, |role| role.is_geometry()));

        let geomx = match &document.fastpath {
            Some(fastpath) => {
                let fast = Payloads { entries: geometry_payloads(fastpath, version)? };
                Some(fast.write(table, &header, |role| role.is_geometry()))
            }
            None => None,
        };

        tracing::debug!(
            level = level.len(),
            geom = geom.as_ref().map(Vec::len),
            geomx = geomx.as_ref().map(Vec::len),
            "encoded"
        );
        Ok(EncodedLevel { level, geom, geomx })
    }
}

fn check_representable(document: &LevelDocument, version: FormatVersion) -> Result<()> {
    if document.textures.is_some() && !version.has_textures_chunk() {
        return Err(refuse(version, "texture table is only stored by v4-v5"));
    }
    if document.cform.is_some() && !version.embeds_cform() {
        return Err(refuse(version, "embedded collision form is only stored up to v9"));
    }
    if document.fastpath.is_some() && !version.has_fastpath_file() {
        return Err(refuse(version, "fast-path geometry is only stored by v14"));
    }
    if let Some(fastpath) = &document.fastpath {
        if fastpath.slide_windows.is_none() {
            return Err(refuse(version, "fast-path geometry needs slide windows"));
        }
    }
    for set in std::iter::once(&document.geometry).chain(document.fastpath.as_ref()) {
        if !set.index_buffers.is_empty() && !version.has_index_buffers() {
            return Err(refuse(version, "index buffers are only stored from v9"));
        }
        if set.slide_windows.is_some() && !version.has_slide_windows() {
            return Err(refuse(version, "slide windows are only stored from v12"));
        }
    }
    Ok(())
}

/// VB role for a buffer list; v9 picks the tag from the layout family
fn vertex_role(buffers: &[VertexBuffer], version: FormatVersion) -> Result<ChunkRole> {
    let fixed = buffers.iter().filter(|b| b.format.is_fixed_function()).count();
    if version.may_fall_back_to_old_vb() {
        return match fixed {
            0 => Ok(ChunkRole::Vb),
            n if n == buffers.len() => Ok(ChunkRole::VbOld),
            _ => Err(refuse(version, "v9 cannot mix FVF and declaration vertex buffers")),
        };
    }
    let expected = if version.fixed_function_vertices() { buffers.len() } else { 0 };
    if fixed != expected {
        let family = if version.fixed_function_vertices() { "FVF" } else { "declaration" };
        return Err(refuse(version, format!("vertex buffers must all use {family} layouts")));
    }
    Ok(ChunkRole::Vb)
}

fn geometry_payloads(set: &GeometrySet, version: FormatVersion) -> Result<Vec<(ChunkRole, Vec<u8>)>> {
    let mut payloads = vec![(
        vertex_role(&set.vertex_buffers, version)?,
        geometry::encode_vertex_buffers(&set.vertex_buffers),
    )];
    if version.has_index_buffers() {
        payloads.push((ChunkRole::Ib, geometry::encode_index_buffers(&set.index_buffers)));
    }
    if let Some(items) = &set.slide_windows {
        payloads.push((ChunkRole::Swis, geometry::encode_slide_windows(items)));
    }
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::geometry::VertexFormat;

    fn version(v: u32) -> FormatVersion {
        FormatVersion::new(v).unwrap()
    }

    #[test]
    fn test_unknown_target_rejected() {
        let document = LevelDocument::new(version(14));
        assert!(matches!(
            LevelEncoder::encode(&document, 6),
            Err(Error::UnsupportedVersion { version: 6, .. })
        ));
    }

    #[test]
    fn test_split_versions_emit_geom() {
        let encoded = LevelEncoder::encode(&LevelDocument::new(version(13)), 13).unwrap();
        assert!(encoded.geom.is_some());
        assert!(encoded.geomx.is_none());

        let encoded = LevelEncoder::encode(&LevelDocument::new(version(12)), 12).unwrap();
        assert!(encoded.geom.is_none());
    }

    #[test]
    fn test_textures_refused_on_modern_target() {
        let document = LevelDocument::new(version(5));
        assert!(matches!(
            LevelEncoder::encode(&document, 10),
            Err(Error::UnsupportedVersion { version: 10, .. })
        ));
    }

    #[test]
    fn test_vertex_role_selection() {
        let fvf = VertexBuffer { format: VertexFormat::Fvf(0x2), vertex_count: 0, data: Vec::new() };
        let decl = VertexBuffer { format: VertexFormat::Declaration(Vec::new()), vertex_count: 0, data: Vec::new() };

        assert_eq!(vertex_role(&[fvf.clone()], version(9)).unwrap(), ChunkRole::VbOld);
        assert_eq!(vertex_role(&[decl.clone()], version(9)).unwrap(), ChunkRole::Vb);
        assert_eq!(vertex_role(&[], version(9)).unwrap(), ChunkRole::Vb);
        assert!(vertex_role(&[fvf.clone(), decl.clone()], version(9)).is_err());
        assert!(vertex_role(&[decl], version(8)).is_err());
        assert!(vertex_role(&[fvf], version(12)).is_err());
    }
}
