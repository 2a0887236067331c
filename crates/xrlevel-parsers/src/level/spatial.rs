//! Sectors, portals, light-glow proxies and dynamic lights.
//!
//! Portal vertices are stored with Y and Z exchanged, converting the engine's
//! Y-up axes to Z-up. Glow and light positions are kept as read; use the
//! `scene_*` helpers for the converted values.

use glam::{Mat3, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use xrlevel_core::{ChunkRole, Diagnostic, Error, Result};

use super::materials::{MaterialHandle, MaterialResolver};
use super::visuals::{VisualHierarchy, VisualId};
use crate::chunked::{decode_chunks, ChunkMap, ChunkWriter};
use crate::packed::{PackedReader, PackedWriter};
use crate::registry::{FormatVersion, LightLayout};

pub const SECTOR_PORTALS_TAG: u32 = 0x1;
pub const SECTOR_ROOT_TAG: u32 = 0x2;

pub const PORTAL_RECORD_SIZE: usize = 80;
pub const PORTAL_MAX_VERTICES: usize = 6;
pub const GLOW_RECORD_SIZE: usize = 18;
pub const GLOW_RECORD_SIZE_LEGACY: usize = 24;
pub const LIGHT_NAME_SIZE: usize = 64;

/// D3D light types
pub const LIGHT_POINT: u32 = 1;
pub const LIGHT_SPOT: u32 = 2;
pub const LIGHT_DIRECTIONAL: u32 = 3;

/// Exchange Y and Z
pub fn swap_yz(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, v.y)
}

/// Sector id, validated against the decoded sectors; also the list index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorId(pub u16);

impl SectorId {
    pub fn index(&self) -> usize {
        usize::from(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    /// Sector id, taken from the sub-chunk tag
    pub id: u16,
    pub root: VisualId,
    /// Portal indices listed by the sector; informational only
    pub portals: Vec<u16>,
}

impl Sector {
    /// Scene object name, e.g. `sector_007`
    pub fn name(&self) -> String {
        format!("sector_{:0>3}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub front: SectorId,
    pub back: SectorId,
    /// Used vertices only, Z-up
    pub vertices: SmallVec<[Vec3; PORTAL_MAX_VERTICES]>,
}

impl Portal {
    pub fn name(index: usize) -> String {
        format!("portal_{index:0>3}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glow {
    pub position: Vec3,
    pub radius: f32,
    pub shader_index: u32,
    /// Present on layouts before v12 only
    pub texture_index: Option<u32>,
    pub material: MaterialHandle,
}

impl Glow {
    pub fn scene_position(&self) -> Vec3 {
        swap_yz(self.position)
    }

    pub fn name(index: usize) -> String {
        format!("glow_{index:0>3}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicLight {
    /// D3D light type, kept as stored
    pub kind: u32,
    /// Stored on v9+, inferred from `kind` before that
    pub controller_id: Option<u32>,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub ambient: Vec4,
    pub position: Vec3,
    pub direction: Vec3,
    pub range: f32,
    pub falloff: f32,
    pub attenuation: [f32; 3],
    pub theta: f32,
    pub phi: f32,
    /// Look rotation derived from `direction`
    pub rotation: Quat,
}

impl DynamicLight {
    pub fn scene_position(&self) -> Vec3 {
        swap_yz(self.position)
    }

    pub fn name(index: usize) -> String {
        format!("light_dynamic_{index:0>3}")
    }
}

/// Controller id implied by the light type on layouts that do not store one
pub fn inferred_controller(kind: u32) -> Option<u32> {
    match kind {
        LIGHT_POINT => Some(2),
        LIGHT_DIRECTIONAL => Some(1),
        _ => None,
    }
}

/// Rotation whose Y axis points along `direction` (given in engine axes)
pub fn look_rotation(direction: Vec3) -> Quat {
    let Some(forward) = swap_yz(direction).try_normalize() else {
        return Quat::IDENTITY;
    };
    let right = forward.cross(Vec3::Z).try_normalize().unwrap_or(Vec3::X);
    let up = right.cross(forward);
    Quat::from_mat3(&Mat3::from_cols(right, forward, up))
}

/// Decode the SECTORS container and check each root against the visual list.
///
/// Sectors come back in id order whatever order they were stored in.
pub fn decode_sectors(
    payload: &[u8],
    visuals: &VisualHierarchy,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<Sector>> {
    let mut sectors = Vec::new();
    for chunk in decode_chunks(payload)? {
        let id = u16::try_from(chunk.tag)
            .map_err(|_| Error::invalid_data(format!("sector id 0x{:X} does not fit 16 bits", chunk.tag)))?;
        let mut sub = ChunkMap::decode(chunk.payload)?;

        let portals = match sub.pop(SECTOR_PORTALS_TAG) {
            Some(list) => {
                if list.len() % 2 != 0 {
                    return Err(Error::MalformedBuffer { what: "sector portal", len: list.len(), record_size: 2 });
                }
                let mut reader = PackedReader::new(list);
                (0..list.len() / 2).map(|_| reader.u16()).collect::<Result<Vec<_>>>()?
            }
            None => Vec::new(),
        };

        let mut root = PackedReader::new(sub.pop_required(ChunkRole::SectorRoot, SECTOR_ROOT_TAG)?);
        let root = visuals.validate(root.u32()?, "sector root visual")?;

        for unknown in sub.into_remaining() {
            tracing::warn!(sector = id, tag = unknown.tag, size = unknown.payload.len(), "unknown sector chunk");
            diagnostics.push(Diagnostic::UnknownSectorChunk {
                sector: u32::from(id),
                tag: unknown.tag,
                size: unknown.payload.len(),
            });
        }
        sectors.push(Sector { id, root, portals });
    }

    // Portals name sectors by id; keep the list in id order so an id is its index
    sectors.sort_by_key(|sector| sector.id);
    for (position, sector) in sectors.iter().enumerate() {
        if usize::from(sector.id) != position {
            return Err(Error::invalid_data(format!(
                "sector ids must run from 0 without gaps, found {} at position {position}",
                sector.id
            )));
        }
    }
    tracing::debug!(count = sectors.len(), "sectors");
    Ok(sectors)
}

pub fn encode_sectors(sectors: &[Sector]) -> Vec<u8> {
    let mut container = ChunkWriter::new();
    for sector in sectors {
        let mut portals = PackedWriter::with_capacity(sector.portals.len() * 2);
        for portal in &sector.portals {
            portals.u16(*portal);
        }
        let mut root = PackedWriter::new();
        root.u32(sector.root.0);

        let mut body = ChunkWriter::new();
        body.chunk(SECTOR_PORTALS_TAG, portals.as_slice())
            .chunk(SECTOR_ROOT_TAG, root.as_slice());
        container.chunk(u32::from(sector.id), &body.into_inner());
    }
    container.into_inner()
}

fn sector_ref(index: u16, sector_count: usize) -> Result<SectorId> {
    if usize::from(index) < sector_count {
        Ok(SectorId(index))
    } else {
        Err(Error::DanglingReference { what: "portal sector", index: u32::from(index), count: sector_count })
    }
}

fn check_record_size(what: &'static str, payload: &[u8], record_size: usize) -> Result<usize> {
    if payload.len() % record_size != 0 {
        return Err(Error::MalformedBuffer { what, len: payload.len(), record_size });
    }
    Ok(payload.len() / record_size)
}

/// Decode the PORTALS array, resolving front/back against `sector_count`
pub fn decode_portals(payload: &[u8], version: FormatVersion, sector_count: usize) -> Result<Vec<Portal>> {
    let count = check_record_size("portal", payload, PORTAL_RECORD_SIZE)?;
    let mut reader = PackedReader::new(payload);
    let mut portals = Vec::with_capacity(count);

    for index in 0..count {
        let front = reader.u16()?;
        let back = reader.u16()?;
        let mut used = if version.portal_count_before_vertices() { Some(reader.u32()?) } else { None };

        let mut vertices = SmallVec::<[Vec3; PORTAL_MAX_VERTICES]>::new();
        for _ in 0..PORTAL_MAX_VERTICES {
            vertices.push(swap_yz(reader.vec3()?));
        }
        if used.is_none() {
            used = Some(reader.u32()?);
        }

        let used = used.unwrap_or_default() as usize;
        if used > PORTAL_MAX_VERTICES {
            return Err(Error::invalid_data(format!("portal {index} uses {used} vertices")));
        }
        vertices.truncate(used);

        portals.push(Portal {
            front: sector_ref(front, sector_count)?,
            back: sector_ref(back, sector_count)?,
            vertices,
        });
    }
    tracing::debug!(count, "portals");
    Ok(portals)
}

pub fn encode_portals(portals: &[Portal], version: FormatVersion) -> Vec<u8> {
    let mut writer = PackedWriter::with_capacity(portals.len() * PORTAL_RECORD_SIZE);
    for portal in portals {
        let start = writer.len();
        let used = portal.vertices.len() as u32;
        writer.u16(portal.front.0).u16(portal.back.0);
        if version.portal_count_before_vertices() {
            writer.u32(used);
        }
        for i in 0..PORTAL_MAX_VERTICES {
            writer.vec3(swap_yz(portal.vertices.get(i).copied().unwrap_or(Vec3::ZERO)));
        }
        if !version.portal_count_before_vertices() {
            writer.u32(used);
        }
        debug_assert_eq!(writer.len() - start, PORTAL_RECORD_SIZE);
    }
    writer.into_inner()
}

/// Decode the GLOWS array.
///
/// The record size follows the version; a payload that does not divide into
/// it is rejected rather than guessed at. `texture_count` is the size of the
/// texture table on versions that store one.
pub fn decode_glows(
    payload: &[u8],
    version: FormatVersion,
    shader_count: usize,
    texture_count: Option<usize>,
    resolver: &dyn MaterialResolver,
) -> Result<Vec<Glow>> {
    let legacy = version.glow_has_texture_index();
    let record_size = if legacy { GLOW_RECORD_SIZE_LEGACY } else { GLOW_RECORD_SIZE };
    let count = check_record_size("glow", payload, record_size)?;
    let mut reader = PackedReader::new(payload);

    let glows = (0..count)
        .map(|_| -> Result<Glow> {
            let position = reader.vec3()?;
            let radius = reader.f32()?;
            let (texture_index, shader_index) = if legacy {
                (Some(reader.u32()?), reader.u32()?)
            } else {
                (None, u32::from(reader.u16()?))
            };
            if shader_index as usize >= shader_count {
                return Err(Error::DanglingReference { what: "glow shader", index: shader_index, count: shader_count });
            }
            if let (Some(texture), Some(count)) = (texture_index, texture_count) {
                if texture as usize >= count {
                    return Err(Error::DanglingReference { what: "glow texture", index: texture, count });
                }
            }
            let material = resolver.resolve(shader_index, texture_index);
            Ok(Glow { position, radius, shader_index, texture_index, material })
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(count, legacy, "glows");
    Ok(glows)
}

/// Encode glows; the caller has already checked representability
pub fn encode_glows(glows: &[Glow], version: FormatVersion) -> Result<Vec<u8>> {
    let legacy = version.glow_has_texture_index();
    let mut writer = PackedWriter::new();
    for glow in glows {
        writer.vec3(glow.position).f32(glow.radius);
        match (legacy, glow.texture_index) {
            (true, Some(texture)) => {
                writer.u32(texture).u32(glow.shader_index);
            }
            (false, None) => {
                let shader = u16::try_from(glow.shader_index).map_err(|_| {
                    Error::unsupported_version(
                        u32::from(version.get()),
                        format!("glow shader index {} needs more than 16 bits", glow.shader_index),
                    )
                })?;
                writer.u16(shader);
            }
            (true, None) => {
                return Err(Error::unsupported_version(
                    u32::from(version.get()),
                    "glow records need a texture index",
                ));
            }
            (false, Some(_)) => {
                return Err(Error::unsupported_version(
                    u32::from(version.get()),
                    "glow records cannot store a texture index",
                ));
            }
        }
    }
    Ok(writer.into_inner())
}

struct LightBody {
    diffuse: Vec4,
    specular: Vec4,
    ambient: Vec4,
    position: Vec3,
    direction: Vec3,
    range: f32,
    falloff: f32,
    attenuation: [f32; 3],
    theta: f32,
    phi: f32,
}

fn read_light_body(reader: &mut PackedReader<'_>) -> Result<LightBody> {
    Ok(LightBody {
        diffuse: reader.vec4()?,
        specular: reader.vec4()?,
        ambient: reader.vec4()?,
        position: reader.vec3()?,
        direction: reader.vec3()?,
        range: reader.f32()?,
        falloff: reader.f32()?,
        attenuation: [reader.f32()?, reader.f32()?, reader.f32()?],
        theta: reader.f32()?,
        phi: reader.f32()?,
    })
}

/// Decode the LIGHT_DYNAMIC array using the version's record layout
pub fn decode_dynamic_lights(payload: &[u8], version: FormatVersion) -> Result<Vec<DynamicLight>> {
    let layout = version.light_record_layout();
    let count = check_record_size("dynamic light", payload, layout.record_size())?;
    let mut reader = PackedReader::new(payload);

    let lights = (0..count)
        .map(|_| -> Result<DynamicLight> {
            let (kind, controller_id) = match layout {
                LightLayout::Modern => {
                    let controller = reader.u32()?;
                    let kind = reader.u32()?;
                    (kind, i32::try_from(controller).ok().map(|c| c as u32))
                }
                LightLayout::V8 | LightLayout::Legacy => {
                    let kind = reader.u32()?;
                    (kind, inferred_controller(kind))
                }
            };
            let body = read_light_body(&mut reader)?;
            match layout {
                LightLayout::Modern => {}
                LightLayout::V8 => {
                    reader.skip(8)?;
                    let name = reader.fixed_string(LIGHT_NAME_SIZE)?;
                    tracing::trace!(%name, "v8 light name");
                }
                LightLayout::Legacy => reader.skip(20)?,
            }
            Ok(DynamicLight {
                kind,
                controller_id,
                diffuse: body.diffuse,
                specular: body.specular,
                ambient: body.ambient,
                position: body.position,
                direction: body.direction,
                range: body.range,
                falloff: body.falloff,
                attenuation: body.attenuation,
                theta: body.theta,
                phi: body.phi,
                rotation: look_rotation(body.direction),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(count, ?layout, "dynamic lights");
    Ok(lights)
}

pub fn encode_dynamic_lights(lights: &[DynamicLight], version: FormatVersion) -> Result<Vec<u8>> {
    let layout = version.light_record_layout();
    let mut writer = PackedWriter::with_capacity(lights.len() * layout.record_size());
    for (index, light) in lights.iter().enumerate() {
        match layout {
            LightLayout::Modern => {
                let controller = match light.controller_id {
                    None => u32::MAX,
                    Some(id) if i32::try_from(id).is_ok() => id,
                    Some(id) => {
                        return Err(Error::unsupported_version(
                            u32::from(version.get()),
                            format!("light {index} controller id {id} is out of range"),
                        ));
                    }
                };
                writer.u32(controller).u32(light.kind);
            }
            LightLayout::V8 | LightLayout::Legacy => {
                if light.controller_id != inferred_controller(light.kind) {
                    return Err(Error::unsupported_version(
                        u32::from(version.get()),
                        format!("light {index} controller id cannot be stored"),
                    ));
                }
                writer.u32(light.kind);
            }
        }
        writer
            .vec4(light.diffuse)
            .vec4(light.specular)
            .vec4(light.ambient)
            .vec3(light.position)
            .vec3(light.direction)
            .f32(light.range)
            .f32(light.falloff)
            .f32(light.attenuation[0])
            .f32(light.attenuation[1])
            .f32(light.attenuation[2])
            .f32(light.theta)
            .f32(light.phi);
        match layout {
            LightLayout::Modern => {}
            LightLayout::V8 => {
                writer.zeros(8 + LIGHT_NAME_SIZE);
            }
            LightLayout::Legacy => {
                writer.zeros(20);
            }
        }
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::materials::IndexedMaterials;
    use crate::level::visuals::{BoundingBox, BoundingSphere, Visual, VisualHeader};

    fn version(v: u32) -> FormatVersion {
        FormatVersion::new(v).unwrap()
    }

    fn hierarchy(count: usize) -> VisualHierarchy {
        let visual = Visual {
            header: VisualHeader {
                format_version: 4,
                model_type: 0,
                shader_id: 0,
                bbox: BoundingBox { min: Vec3::ZERO, max: Vec3::ZERO },
                bsphere: BoundingSphere { center: Vec3::ZERO, radius: 0.0 },
            },
            children: Vec::new(),
            chunks: Vec::new(),
        };
        VisualHierarchy::new(vec![visual; count]).unwrap()
    }

    fn light(kind: u32, controller_id: Option<u32>) -> DynamicLight {
        let direction = Vec3::new(0.0, -1.0, 0.0);
        DynamicLight {
            kind,
            controller_id,
            diffuse: Vec4::new(1.0, 0.9, 0.8, 1.0),
            specular: Vec4::ZERO,
            ambient: Vec4::ZERO,
            position: Vec3::new(1.0, 2.0, 3.0),
            direction,
            range: 10.0,
            falloff: 1.0,
            attenuation: [1.0, 0.0, 0.0],
            theta: 0.5,
            phi: 1.0,
            rotation: look_rotation(direction),
        }
    }

    #[test]
    fn test_sector_name() {
        let sector = Sector { id: 7, root: VisualId(0), portals: vec![] };
        assert_eq!(sector.name(), "sector_007");
        assert_eq!(Portal::name(12), "portal_012");
        assert_eq!(Glow::name(3), "glow_003");
        assert_eq!(DynamicLight::name(0), "light_dynamic_000");
    }

    #[test]
    fn test_sectors_decode() {
        let sectors = vec![
            Sector { id: 0, root: VisualId(1), portals: vec![0, 1] },
            Sector { id: 1, root: VisualId(0), portals: vec![] },
        ];
        let mut diagnostics = Vec::new();
        let decoded = decode_sectors(&encode_sectors(&sectors), &hierarchy(2), &mut diagnostics).unwrap();
        assert_eq!(decoded, sectors);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_sector_root_out_of_range() {
        let sectors = vec![Sector { id: 0, root: VisualId(2), portals: vec![] }];
        let result = decode_sectors(&encode_sectors(&sectors), &hierarchy(2), &mut Vec::new());
        assert!(matches!(result, Err(Error::DanglingReference { index: 2, count: 2, .. })));
    }

    #[test]
    fn test_sector_without_root() {
        let mut body = ChunkWriter::new();
        body.chunk(SECTOR_PORTALS_TAG, &[]);
        let mut container = ChunkWriter::new();
        container.chunk(0, &body.into_inner());

        let err = decode_sectors(&container.into_inner(), &hierarchy(1), &mut Vec::new()).unwrap_err();
        assert_eq!(err.missing_role(), Some(ChunkRole::SectorRoot));
    }

    #[test]
    fn test_unknown_sector_chunk_reported() {
        let mut body = ChunkWriter::new();
        body.chunk(SECTOR_ROOT_TAG, &[0, 0, 0, 0]).chunk(0x9, b"zz");
        let mut container = ChunkWriter::new();
        container.chunk(0, &body.into_inner());

        let mut diagnostics = Vec::new();
        let sectors = decode_sectors(&container.into_inner(), &hierarchy(1), &mut diagnostics).unwrap();
        assert_eq!(sectors[0].id, 0);
        assert_eq!(diagnostics, vec![Diagnostic::UnknownSectorChunk { sector: 0, tag: 0x9, size: 2 }]);
    }

    #[test]
    fn test_sectors_stored_out_of_order_resolve_by_id() {
        let stored = vec![
            Sector { id: 1, root: VisualId(1), portals: vec![] },
            Sector { id: 0, root: VisualId(0), portals: vec![0] },
        ];
        let sectors = decode_sectors(&encode_sectors(&stored), &hierarchy(2), &mut Vec::new()).unwrap();
        assert_eq!(sectors.iter().map(|s| s.id).collect::<Vec<_>>(), vec![0, 1]);

        let mut record = PackedWriter::new();
        record.u16(0).u16(1);
        for _ in 0..PORTAL_MAX_VERTICES {
            record.vec3(Vec3::ZERO);
        }
        record.u32(3);
        let portals = decode_portals(record.as_slice(), version(14), sectors.len()).unwrap();
        assert_eq!(sectors[portals[0].front.index()].name(), "sector_000");
        assert_eq!(sectors[portals[0].back.index()].name(), "sector_001");
        assert_eq!(sectors[portals[0].back.index()].root, VisualId(1));
    }

    #[test]
    fn test_sector_id_gaps_and_duplicates_rejected() {
        let gap = vec![
            Sector { id: 0, root: VisualId(0), portals: vec![] },
            Sector { id: 2, root: VisualId(0), portals: vec![] },
        ];
        let result = decode_sectors(&encode_sectors(&gap), &hierarchy(1), &mut Vec::new());
        assert!(matches!(result, Err(Error::InvalidData { .. })));

        let duplicate = vec![
            Sector { id: 0, root: VisualId(0), portals: vec![] },
            Sector { id: 0, root: VisualId(0), portals: vec![] },
        ];
        let result = decode_sectors(&encode_sectors(&duplicate), &hierarchy(1), &mut Vec::new());
        assert!(matches!(result, Err(Error::InvalidData { .. })));
    }

    #[test]
    fn test_sector_id_must_fit() {
        let mut body = ChunkWriter::new();
        body.chunk(SECTOR_ROOT_TAG, &[0, 0, 0, 0]);
        let mut container = ChunkWriter::new();
        container.chunk(0x1_0000, &body.into_inner());
        let result = decode_sectors(&container.into_inner(), &hierarchy(1), &mut Vec::new());
        assert!(matches!(result, Err(Error::InvalidData { .. })));
    }

    #[test]
    fn test_portal_truncation_and_axis_swap() {
        let mut record = PackedWriter::new();
        record.u16(0).u16(1);
        for i in 0..6 {
            let f = i as f32;
            record.vec3(Vec3::new(f, f + 10.0, f + 20.0));
        }
        record.u32(4);

        let portals = decode_portals(record.as_slice(), version(14), 2).unwrap();
        assert_eq!(portals.len(), 1);
        assert_eq!(portals[0].front, SectorId(0));
        assert_eq!(portals[0].back, SectorId(1));
        assert_eq!(portals[0].vertices.len(), 4);
        assert_eq!(portals[0].vertices[2], Vec3::new(2.0, 22.0, 12.0));
    }

    #[test]
    fn test_legacy_portal_layout() {
        let portal = Portal {
            front: SectorId(1),
            back: SectorId(0),
            vertices: SmallVec::from_slice(&[Vec3::X, Vec3::Y, Vec3::Z]),
        };
        let payload = encode_portals(std::slice::from_ref(&portal), version(5));
        assert_eq!(payload.len(), PORTAL_RECORD_SIZE);
        assert_eq!(&payload[4..8], &[3, 0, 0, 0]);
        assert_eq!(decode_portals(&payload, version(5), 2).unwrap(), vec![portal]);
    }

    #[test]
    fn test_portal_front_equal_to_sector_count() {
        let portal = Portal { front: SectorId(3), back: SectorId(0), vertices: SmallVec::new() };
        let payload = encode_portals(&[portal], version(13));
        assert!(matches!(
            decode_portals(&payload, version(13), 3),
            Err(Error::DanglingReference { what: "portal sector", index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_portal_used_count_too_large() {
        let mut record = PackedWriter::new();
        record.u16(0).u16(0).zeros(72).u32(7);
        assert!(matches!(
            decode_portals(record.as_slice(), version(12), 1),
            Err(Error::InvalidData { .. })
        ));
    }

    #[test]
    fn test_legacy_glow_texture_checked_against_table() {
        let mut record = PackedWriter::new();
        record.vec3(Vec3::ZERO).f32(1.0).u32(3).u32(0);
        let payload = record.into_inner();

        assert!(matches!(
            decode_glows(&payload, version(5), 1, Some(3), &IndexedMaterials),
            Err(Error::DanglingReference { what: "glow texture", index: 3, count: 3 })
        ));
        let glows = decode_glows(&payload, version(5), 1, Some(4), &IndexedMaterials).unwrap();
        assert_eq!(glows[0].texture_index, Some(3));
        // No table to check against on v8-v11
        assert!(decode_glows(&payload, version(8), 1, None, &IndexedMaterials).is_ok());
    }

    #[test]
    fn test_glow_layout_follows_version() {
        let mut legacy = PackedWriter::new();
        legacy.vec3(Vec3::new(1.0, 2.0, 3.0)).f32(0.5).u32(4).u32(1);
        let payload = legacy.into_inner();
        assert_eq!(payload.len(), GLOW_RECORD_SIZE_LEGACY);

        let glows = decode_glows(&payload, version(10), 2, None, &IndexedMaterials).unwrap();
        assert_eq!(glows.len(), 1);
        assert_eq!(glows[0].texture_index, Some(4));
        assert_eq!(glows[0].shader_index, 1);
        assert_eq!(glows[0].position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(glows[0].scene_position(), Vec3::new(1.0, 3.0, 2.0));

        // 24 bytes do not divide into 18-byte records
        assert!(matches!(
            decode_glows(&payload, version(14), 2, None, &IndexedMaterials),
            Err(Error::MalformedBuffer { what: "glow", len: 24, record_size: GLOW_RECORD_SIZE })
        ));
    }

    #[test]
    fn test_glow_dangling_shader() {
        let mut modern = PackedWriter::new();
        modern.vec3(Vec3::ZERO).f32(1.0).u16(5);
        assert!(matches!(
            decode_glows(modern.as_slice(), version(13), 5, None, &IndexedMaterials),
            Err(Error::DanglingReference { what: "glow shader", index: 5, count: 5 })
        ));
    }

    #[test]
    fn test_light_layout_sizes() {
        let lights = vec![light(LIGHT_POINT, Some(2))];
        for (v, size) in [(14, 108), (9, 108), (8, 176), (5, 124), (4, 124)] {
            let payload = encode_dynamic_lights(&lights, version(v)).unwrap();
            assert_eq!(payload.len(), size, "v{v}");
            assert_eq!(decode_dynamic_lights(&payload, version(v)).unwrap(), lights, "v{v}");
        }
    }

    #[test]
    fn test_controller_inference() {
        assert_eq!(inferred_controller(LIGHT_POINT), Some(2));
        assert_eq!(inferred_controller(LIGHT_DIRECTIONAL), Some(1));
        assert_eq!(inferred_controller(LIGHT_SPOT), None);

        let spot = vec![light(LIGHT_SPOT, Some(4))];
        assert!(matches!(
            encode_dynamic_lights(&spot, version(8)),
            Err(Error::UnsupportedVersion { version: 8, .. })
        ));
    }

    #[test]
    fn test_modern_controller_out_of_range_reads_as_none() {
        let mut payload = encode_dynamic_lights(&[light(LIGHT_SPOT, Some(0))], version(12)).unwrap();
        payload[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        let decoded = decode_dynamic_lights(&payload, version(12)).unwrap();
        assert_eq!(decoded[0].controller_id, None);
    }

    #[test]
    fn test_look_rotation() {
        assert_eq!(look_rotation(Vec3::ZERO), Quat::IDENTITY);

        // Engine -Y (down) becomes scene -Z; the rotated Y axis must follow it
        let rotation = look_rotation(Vec3::new(0.0, -1.0, 0.0));
        let forward = rotation * Vec3::Y;
        assert!(forward.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));

        let rotation = look_rotation(Vec3::new(1.0, 0.0, 0.0));
        assert!((rotation * Vec3::Y).abs_diff_eq(Vec3::X, 1e-5));
    }
}
