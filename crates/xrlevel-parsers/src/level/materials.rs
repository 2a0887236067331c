//! Shader and texture name tables, and material resolution.
//!
//! A shader name like `effects\glow` maps to an engine material. The decode
//! pipeline does not build materials itself: it hands each shader (and, on
//! legacy files, texture) index to a [`MaterialResolver`] and stores the
//! opaque handle that comes back.

use serde::{Deserialize, Serialize};

use xrlevel_core::Result;

use crate::packed::{PackedReader, PackedWriter};

/// Opaque reference to a material owned by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialHandle(pub u64);

/// Maps table indices to material handles.
///
/// Implementations must be deterministic per decode; any cache they keep is
/// their own business and must not leak state between unrelated levels.
pub trait MaterialResolver: Send + Sync {
    fn resolve(&self, shader_index: u32, texture_index: Option<u32>) -> MaterialHandle;
}

/// Stateless resolver that packs the indices into the handle
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedMaterials;

impl IndexedMaterials {
    /// Recover the indices a handle was built from
    pub fn unpack(handle: MaterialHandle) -> (u32, Option<u32>) {
        let shader = handle.0 as u32;
        let texture = (handle.0 >> 32) as u32;
        (shader, texture.checked_sub(1))
    }
}

impl MaterialResolver for IndexedMaterials {
    fn resolve(&self, shader_index: u32, texture_index: Option<u32>) -> MaterialHandle {
        let texture = texture_index.map_or(0, |t| u64::from(t) + 1);
        MaterialHandle((texture << 32) | u64::from(shader_index))
    }
}

/// Decode a `count` + NUL-terminated strings table (SHADERS, TEXTURES)
pub fn decode_name_table(payload: &[u8]) -> Result<Vec<String>> {
    let mut reader = PackedReader::new(payload);
    let count = reader.u32()?;
    (0..count).map(|_| reader.cstring()).collect()
}

pub fn encode_name_table(names: &[String]) -> Vec<u8> {
    let mut writer = PackedWriter::new();
    writer.u32(names.len() as u32);
    for name in names {
        writer.cstring(name);
    }
    writer.into_inner()
}

/// One handle per shader entry, in table order
pub fn resolve_shader_materials(shaders: &[String], resolver: &dyn MaterialResolver) -> Vec<MaterialHandle> {
    (0..shaders.len() as u32).map(|index| resolver.resolve(index, None)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrlevel_core::Error;

    #[test]
    fn test_name_table() {
        let names = vec!["default".to_string(), "effects\\glow".to_string(), String::new()];
        let payload = encode_name_table(&names);
        assert_eq!(&payload[..4], &[3, 0, 0, 0]);
        assert_eq!(decode_name_table(&payload).unwrap(), names);
    }

    #[test]
    fn test_name_table_count_past_end() {
        let mut payload = PackedWriter::new();
        payload.u32(2).cstring("only_one");
        assert!(matches!(
            decode_name_table(payload.as_slice()),
            Err(Error::BufferUnderrun { .. })
        ));
    }

    #[test]
    fn test_indexed_materials_pack() {
        let resolver = IndexedMaterials;
        let with_texture = resolver.resolve(7, Some(0));
        let without = resolver.resolve(7, None);

        assert_ne!(with_texture, without);
        assert_eq!(IndexedMaterials::unpack(with_texture), (7, Some(0)));
        assert_eq!(IndexedMaterials::unpack(without), (7, None));
        // Same input, same handle
        assert_eq!(resolver.resolve(7, Some(0)), with_texture);
    }

    #[test]
    fn test_resolve_shader_materials() {
        let shaders = vec!["a".to_string(), "b".to_string()];
        let handles = resolve_shader_materials(&shaders, &IndexedMaterials);
        assert_eq!(handles, vec![MaterialHandle(0), MaterialHandle(1)]);
    }
}
