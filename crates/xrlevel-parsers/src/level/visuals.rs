//! Compiled visuals and their parent/child hierarchy.
//!
//! VISUALS is a container with one sub-chunk per visual; the visual's index is
//! its position in that container. Each visual is itself a chunk container
//! whose header and child links are decoded here. Everything else (render
//! data, LOD tables, swap info) is kept as raw sub-chunks.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use xrlevel_core::{Error, Result};

use crate::chunked::{ChunkMap, ChunkWriter};
use crate::packed::{PackedReader, PackedWriter};

/// Tag of the visual header sub-chunk
pub const VISUAL_HEADER_TAG: u32 = 0x1;
/// Tag of the child-link sub-chunk of hierarchy visuals
pub const VISUAL_CHILDREN_TAG: u32 = 0xA;
/// Byte size of the visual header
pub const VISUAL_HEADER_SIZE: usize = 44;

/// Validated index into the visual list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisualId(pub u32);

impl VisualId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualHeader {
    pub format_version: u8,
    pub model_type: u8,
    pub shader_id: u16,
    pub bbox: BoundingBox,
    pub bsphere: BoundingSphere,
}

impl VisualHeader {
    fn read(payload: &[u8]) -> Result<Self> {
        let mut reader = PackedReader::new(payload);
        Ok(Self {
            format_version: reader.u8()?,
            model_type: reader.u8()?,
            shader_id: reader.u16()?,
            bbox: BoundingBox { min: reader.vec3()?, max: reader.vec3()? },
            bsphere: BoundingSphere { center: reader.vec3()?, radius: reader.f32()? },
        })
    }

    fn write(&self) -> Vec<u8> {
        let mut writer = PackedWriter::with_capacity(VISUAL_HEADER_SIZE);
        writer
            .u8(self.format_version)
            .u8(self.model_type)
            .u16(self.shader_id)
            .vec3(self.bbox.min)
            .vec3(self.bbox.max)
            .vec3(self.bsphere.center)
            .f32(self.bsphere.radius);
        writer.into_inner()
    }
}

/// A visual sub-chunk kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChunk {
    pub tag: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    pub header: VisualHeader,
    pub children: Vec<VisualId>,
    /// Undecoded sub-chunks, in file order
    pub chunks: Vec<RawChunk>,
}

/// Every visual plus the derived root list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualHierarchy {
    pub visuals: Vec<Visual>,
    /// Visuals no other visual lists as a child, ascending
    pub roots: Vec<VisualId>,
}

impl VisualHierarchy {
    /// Validate child links and compute roots
    pub fn new(visuals: Vec<Visual>) -> Result<Self> {
        let count = visuals.len();
        let mut parent: Vec<Option<VisualId>> = vec![None; count];

        for (index, visual) in visuals.iter().enumerate() {
            for child in &visual.children {
                if child.index() >= count {
                    return Err(Error::DanglingReference {
                        what: "visual child",
                        index: child.0,
                        count,
                    });
                }
                if let Some(previous) = parent[child.index()].replace(VisualId(index as u32)) {
                    return Err(Error::invalid_data(format!(
                        "visual {} has two parents ({} and {index})",
                        child.0, previous.0
                    )));
                }
            }
        }

        let roots: Vec<VisualId> = parent
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_none())
            .map(|(i, _)| VisualId(i as u32))
            .collect();

        // With one parent each, anything unreachable from a root sits on a cycle
        let mut reached = vec![false; count];
        let mut stack = roots.clone();
        while let Some(next) = stack.pop() {
            reached[next.index()] = true;
            stack.extend(visuals[next.index()].children.iter().copied());
        }
        if let Some(index) = reached.iter().position(|r| !r) {
            return Err(Error::invalid_data(format!("visual {index} is part of a child cycle")));
        }

        Ok(Self { visuals, roots })
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    pub fn get(&self, id: VisualId) -> Option<&Visual> {
        self.visuals.get(id.index())
    }

    /// Check an index read from another record
    pub fn validate(&self, index: u32, what: &'static str) -> Result<VisualId> {
        if (index as usize) < self.visuals.len() {
            Ok(VisualId(index))
        } else {
            Err(Error::DanglingReference { what, index, count: self.visuals.len() })
        }
    }

    /// Depth-first visit of `id` and its descendants
    pub fn descendants(&self, id: VisualId) -> Vec<VisualId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(visual) = self.get(next) {
                stack.extend(visual.children.iter().rev().copied());
            }
        }
        out
    }
}

fn decode_visual(index: usize, payload: &[u8]) -> Result<Visual> {
    let mut chunks = ChunkMap::decode(payload)?;
    let header_payload = chunks
        .pop(VISUAL_HEADER_TAG)
        .ok_or_else(|| Error::invalid_data(format!("visual {index} has no header")))?;
    let header = VisualHeader::read(header_payload)?;

    let children = match chunks.pop(VISUAL_CHILDREN_TAG) {
        Some(links) => {
            let mut reader = PackedReader::new(links);
            let count = reader.u32()?;
            (0..count).map(|_| reader.u32().map(VisualId)).collect::<Result<Vec<_>>>()?
        }
        None => Vec::new(),
    };

    let chunks = chunks
        .into_remaining()
        .into_iter()
        .map(|c| RawChunk { tag: c.tag, data: c.payload.to_vec() })
        .collect();
    Ok(Visual { header, children, chunks })
}

/// Decode the VISUALS container
pub fn decode_visuals(payload: &[u8]) -> Result<VisualHierarchy> {
    let chunks = crate::chunked::decode_chunks(payload)?;
    let visuals = chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| decode_visual(index, chunk.payload))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(count = visuals.len(), "visuals");
    VisualHierarchy::new(visuals)
}

pub fn encode_visuals(hierarchy: &VisualHierarchy) -> Vec<u8> {
    let mut container = ChunkWriter::new();
    for (index, visual) in hierarchy.visuals.iter().enumerate() {
        let mut body = ChunkWriter::new();
        body.chunk(VISUAL_HEADER_TAG, &visual.header.write());
        if !visual.children.is_empty() {
            let mut links = PackedWriter::new();
            links.u32(visual.children.len() as u32);
            for child in &visual.children {
                links.u32(child.0);
            }
            body.chunk(VISUAL_CHILDREN_TAG, links.as_slice());
        }
        for raw in &visual.chunks {
            body.chunk(raw.tag, &raw.data);
        }
        container.chunk(index as u32, &body.into_inner());
    }
    container.into_inner()
}
