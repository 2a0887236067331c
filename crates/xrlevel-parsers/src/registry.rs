//! Schema registry: format version → chunk tag table.
//!
//! The level compiler changed chunk numbering several times. Versions that
//! share a numbering are grouped into bands, and each band is plain data
//! here. Behaviour that cuts across bands (record shapes, file splits) is
//! exposed as named predicates on [`FormatVersion`] so decode routines never
//! compare raw version numbers themselves.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use xrlevel_core::{ChunkRole, Error, Result};

/// Versions the registry knows about, oldest first
pub static SUPPORTED_VERSIONS: [u16; 9] = [4, 5, 8, 9, 10, 11, 12, 13, 14];

/// The header chunk tag is the same in every band, which is what makes
/// version detection possible before the schema is known.
pub const HEADER_TAG: u32 = 0x1;

/// A validated on-disk format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormatVersion(u16);

impl FormatVersion {
    /// Validate a raw version number against the supported set
    pub fn new(raw: u32) -> Result<Self> {
        SUPPORTED_VERSIONS
            .iter()
            .copied()
            .find(|&v| u32::from(v) == raw)
            .map(FormatVersion)
            .ok_or_else(|| Error::unsupported_version(raw, supported_list()))
    }

    pub fn get(&self) -> u16 {
        self.0
    }

    /// Every supported version, oldest first
    pub fn all() -> impl Iterator<Item = FormatVersion> {
        SUPPORTED_VERSIONS.iter().map(|&v| FormatVersion(v))
    }

    /// Vertex, index and slide-window chunks live in `<level>.geom`
    pub fn splits_geometry_file(&self) -> bool {
        self.0 >= 13
    }

    /// An optional `<level>.geomx` fast-path companion may exist
    pub fn has_fastpath_file(&self) -> bool {
        self.0 == 14
    }

    /// Vertex buffers use fixed-function FVF layouts
    pub fn fixed_function_vertices(&self) -> bool {
        self.0 <= 8
    }

    /// v9 may carry fixed-function vertices under the `VbOld` tag instead
    pub fn may_fall_back_to_old_vb(&self) -> bool {
        self.0 == 9
    }

    pub fn has_index_buffers(&self) -> bool {
        self.0 >= 9
    }

    pub fn has_slide_windows(&self) -> bool {
        self.0 >= 12
    }

    pub fn has_textures_chunk(&self) -> bool {
        self.0 <= 5
    }

    /// Collision form is embedded in the level rather than in `level.cform`
    pub fn embeds_cform(&self) -> bool {
        self.0 <= 9
    }

    /// Portal `used_vertex_count` precedes the vertex block
    pub fn portal_count_before_vertices(&self) -> bool {
        self.0 <= 5
    }

    /// Glow records carry a separate texture index
    pub fn glow_has_texture_index(&self) -> bool {
        self.0 < 12
    }

    pub fn light_record_layout(&self) -> LightLayout {
        match self.0 {
            v if v >= 9 => LightLayout::Modern,
            8 => LightLayout::V8,
            _ => LightLayout::Legacy,
        }
    }

    /// Roles that must be present in the primary level file.
    ///
    /// On v9 the vertex buffer is "`Vb` or `VbOld`" and is therefore not
    /// listed; the pipeline checks that pair itself.
    pub fn required_roles(&self) -> SmallVec<[ChunkRole; 13]> {
        let mut roles = SmallVec::new();
        roles.push(ChunkRole::Header);
        roles.push(ChunkRole::Shaders);
        if self.has_textures_chunk() {
            roles.push(ChunkRole::Textures);
        }
        if !self.splits_geometry_file() {
            if !self.may_fall_back_to_old_vb() {
                roles.push(ChunkRole::Vb);
            }
            if self.has_index_buffers() {
                roles.push(ChunkRole::Ib);
            }
        }
        roles.extend([
            ChunkRole::Visuals,
            ChunkRole::Sectors,
            ChunkRole::Portals,
            ChunkRole::Glows,
            ChunkRole::LightDynamic,
        ]);
        roles
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Dynamic light record shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightLayout {
    /// v9+: controller id and light kind, 108 bytes
    Modern,
    /// v8: light kind, trailing reserved words and a 64-byte name, 176 bytes
    V8,
    /// v4/v5: light kind and five reserved words, 124 bytes
    Legacy,
}

impl LightLayout {
    pub fn record_size(&self) -> usize {
        match self {
            LightLayout::Modern => 108,
            LightLayout::V8 => 176,
            LightLayout::Legacy => 124,
        }
    }
}

/// Mapping from chunk role to the numeric tag one band uses
#[derive(Debug, PartialEq, Eq)]
pub struct ChunkTagTable {
    /// Human-readable band name
    pub band: &'static str,
    entries: &'static [(ChunkRole, u32)],
}

impl ChunkTagTable {
    /// Tag for a role, if the band has it at all
    pub fn tag(&self, role: ChunkRole) -> Option<u32> {
        self.entries.iter().find(|(r, _)| *r == role).map(|(_, tag)| *tag)
    }

    /// Tag for a role the caller knows the band must define
    pub fn require(&self, role: ChunkRole) -> Result<u32> {
        self.tag(role).ok_or_else(|| {
            Error::invalid_data(format!("chunk role {role} is not defined for band {}", self.band))
        })
    }

    /// Role a numeric tag stands for in this band
    pub fn role_of(&self, tag: u32) -> Option<ChunkRole> {
        self.entries.iter().find(|(_, t)| *t == tag).map(|(role, _)| *role)
    }

    pub fn entries(&self) -> impl Iterator<Item = (ChunkRole, u32)> + '_ {
        self.entries.iter().copied()
    }
}

use ChunkRole::*;

static TABLE_13: ChunkTagTable = ChunkTagTable {
    band: "v13-v14",
    entries: &[
        (Header, 0x1), (Shaders, 0x2), (Visuals, 0x3), (Portals, 0x4),
        (LightDynamic, 0x6), (Glows, 0x7), (Sectors, 0x8),
        (Vb, 0x9), (Ib, 0xA), (Swis, 0xB),
    ],
};

static TABLE_12: ChunkTagTable = ChunkTagTable {
    band: "v12",
    entries: &[
        (Header, 0x1), (Shaders, 0x2), (Visuals, 0x3), (Portals, 0x4),
        (LightDynamic, 0x6), (Glows, 0x7), (Sectors, 0x8),
        (Ib, 0x9), (Vb, 0xA), (Swis, 0xB),
    ],
};

static TABLE_10: ChunkTagTable = ChunkTagTable {
    band: "v10-v11",
    entries: &[
        (Header, 0x1), (Shaders, 0x2), (Visuals, 0x3), (Portals, 0x4),
        (LightDynamic, 0x6), (Glows, 0x7), (Sectors, 0x8),
        (Ib, 0x9), (Vb, 0xA),
    ],
};

static TABLE_9: ChunkTagTable = ChunkTagTable {
    band: "v9",
    entries: &[
        (Header, 0x1), (Shaders, 0x2), (Visuals, 0x3), (VbOld, 0x4),
        (Cform, 0x5), (Portals, 0x6), (LightDynamic, 0x8), (Glows, 0x9),
        (Sectors, 0xA), (Ib, 0xB), (Vb, 0xC),
    ],
};

static TABLE_8: ChunkTagTable = ChunkTagTable {
    band: "v8",
    entries: &[
        (Header, 0x1), (Shaders, 0x2), (Visuals, 0x3), (Vb, 0x4),
        (Cform, 0x5), (Portals, 0x6), (LightDynamic, 0x8), (Glows, 0x9),
        (Sectors, 0xA),
    ],
};

static TABLE_5: ChunkTagTable = ChunkTagTable {
    band: "v5",
    entries: &[
        (Header, 0x1), (Textures, 0x2), (Shaders, 0x3), (Visuals, 0x4),
        (Vb, 0x5), (Cform, 0x6), (Portals, 0x7), (LightDynamic, 0x8),
        (Glows, 0x9), (Sectors, 0xA),
    ],
};

static TABLE_4: ChunkTagTable = ChunkTagTable {
    band: "v4",
    entries: &[
        (Header, 0x1), (Textures, 0x2), (Shaders, 0x3), (Visuals, 0x4),
        (Vb, 0x5), (Cform, 0x6), (Portals, 0x7), (LightDynamic, 0x8),
        (Glows, 0xA), (Sectors, 0xB),
    ],
};

/// (versions, table) pairs; every supported version appears exactly once
static SCHEMAS: [(&[u16], &ChunkTagTable); 7] = [
    (&[13, 14], &TABLE_13),
    (&[12], &TABLE_12),
    (&[10, 11], &TABLE_10),
    (&[9], &TABLE_9),
    (&[8], &TABLE_8),
    (&[5], &TABLE_5),
    (&[4], &TABLE_4),
];

/// Read-only version → schema lookup, safe to share between threads
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// Resolve the tag table for a raw version number
    pub fn resolve(version: u32) -> Result<&'static ChunkTagTable> {
        Self::resolve_version(version).map(|(_, table)| table)
    }

    /// Validate a raw version and return it together with its tag table
    pub fn resolve_version(version: u32) -> Result<(FormatVersion, &'static ChunkTagTable)> {
        let version = FormatVersion::new(version)?;
        Ok((version, Self::table(version)))
    }

    /// Tag table for an already-validated version
    pub fn table(version: FormatVersion) -> &'static ChunkTagTable {
        SCHEMAS
            .iter()
            .find(|(versions, _)| versions.contains(&version.get()))
            .map(|(_, table)| *table)
            // SCHEMAS covers SUPPORTED_VERSIONS, checked by test_every_version_has_one_table
            .unwrap_or(&TABLE_13)
    }

    pub fn supported_versions() -> &'static [u16] {
        &SUPPORTED_VERSIONS
    }
}

fn supported_list() -> String {
    let versions: Vec<String> = SUPPORTED_VERSIONS.iter().map(u16::to_string).collect();
    format!("supported: {}", versions.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_version_has_one_table() {
        for &v in &SUPPORTED_VERSIONS {
            let hits = SCHEMAS.iter().filter(|(versions, _)| versions.contains(&v)).count();
            assert_eq!(hits, 1, "version {v}");
        }
    }

    #[test]
    fn test_tags_unique_within_table() {
        for (_, table) in &SCHEMAS {
            let tags: HashSet<u32> = table.entries().map(|(_, tag)| tag).collect();
            assert_eq!(tags.len(), table.entries().count(), "band {}", table.band);
            assert_eq!(table.tag(ChunkRole::Header), Some(HEADER_TAG));
        }
    }

    #[test]
    fn test_resolve_gate() {
        for raw in 0..=u32::from(u16::MAX) + 16 {
            let supported = SUPPORTED_VERSIONS.iter().any(|&v| u32::from(v) == raw);
            match SchemaRegistry::resolve(raw) {
                Ok(_) => assert!(supported, "{raw} resolved"),
                Err(Error::UnsupportedVersion { version, .. }) => {
                    assert!(!supported, "{raw} rejected");
                    assert_eq!(version, raw);
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert!(SchemaRegistry::resolve(u32::MAX).is_err());
    }

    #[test]
    fn test_bands_share_tables() {
        let v13 = SchemaRegistry::resolve(13).unwrap();
        let v14 = SchemaRegistry::resolve(14).unwrap();
        assert!(std::ptr::eq(v13, v14));
        assert_eq!(SchemaRegistry::resolve(12).unwrap().tag(ChunkRole::Vb), Some(0xA));
        assert_eq!(v13.tag(ChunkRole::Vb), Some(0x9));
        assert_eq!(SchemaRegistry::resolve(9).unwrap().role_of(0x4), Some(ChunkRole::VbOld));
        assert_eq!(SchemaRegistry::resolve(11).unwrap().tag(ChunkRole::Swis), None);
    }

    #[test]
    fn test_predicates() {
        let v = |raw| FormatVersion::new(raw).unwrap();
        assert!(v(13).splits_geometry_file() && !v(12).splits_geometry_file());
        assert!(v(14).has_fastpath_file() && !v(13).has_fastpath_file());
        assert!(v(5).portal_count_before_vertices() && !v(8).portal_count_before_vertices());
        assert!(v(11).glow_has_texture_index() && !v(12).glow_has_texture_index());
        assert_eq!(v(9).light_record_layout(), LightLayout::Modern);
        assert_eq!(v(8).light_record_layout(), LightLayout::V8);
        assert_eq!(v(5).light_record_layout(), LightLayout::Legacy);
        assert_eq!(v(4).light_record_layout(), LightLayout::Legacy);
    }

    #[test]
    fn test_required_roles_are_in_table() {
        for version in FormatVersion::all() {
            let table = SchemaRegistry::table(version);
            for role in version.required_roles() {
                assert!(table.tag(role).is_some(), "{version} lacks {role}");
            }
        }
    }

    #[test]
    fn test_collision_form_is_never_required() {
        for version in FormatVersion::all() {
            assert!(!version.required_roles().contains(&ChunkRole::Cform), "{version}");
        }
        assert!(SchemaRegistry::table(FormatVersion::new(9).unwrap()).tag(ChunkRole::Cform).is_some());
    }
}
