//! Vertex buffers, index buffers and slide-window items.
//!
//! Vertex data is kept interleaved and raw; the layout descriptor says how to
//! interpret it. Two descriptor families exist: fixed-function FVF bit masks
//! (old compilers, and v9 files that only carry the old tag) and D3D9 vertex
//! declarations.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use xrlevel_core::{Error, Result};

use crate::packed::{PackedReader, PackedWriter};

// FVF bits
const FVF_POSITION_MASK: u32 = 0x400E;
const FVF_XYZ: u32 = 0x002;
const FVF_XYZRHW: u32 = 0x004;
const FVF_XYZB1: u32 = 0x006;
const FVF_XYZB2: u32 = 0x008;
const FVF_XYZB3: u32 = 0x00A;
const FVF_XYZB4: u32 = 0x00C;
const FVF_XYZB5: u32 = 0x00E;
const FVF_XYZW: u32 = 0x4002;
const FVF_NORMAL: u32 = 0x010;
const FVF_PSIZE: u32 = 0x020;
const FVF_DIFFUSE: u32 = 0x040;
const FVF_SPECULAR: u32 = 0x080;
const FVF_TEXCOUNT_MASK: u32 = 0xF00;
const FVF_TEXCOUNT_SHIFT: u32 = 8;
const FVF_LASTBETA_MASK: u32 = 0x9000;

// Declaration element types and usages
const DECL_END_STREAM: u16 = 0xFF;
const DECLTYPE_FLOAT2: u8 = 1;
const DECLTYPE_FLOAT3: u8 = 2;
const DECLTYPE_D3DCOLOR: u8 = 4;
const DECLTYPE_UBYTE4: u8 = 5;
const DECLTYPE_SHORT2: u8 = 6;
const DECLTYPE_SHORT4: u8 = 7;
const DECLTYPE_UNUSED: u8 = 17;
const DECLUSAGE_POSITION: u8 = 0;

/// Size in bytes of an index-buffer triangle
pub const TRIANGLE_SIZE: usize = 6;
/// Size in bytes of a slide-window record
pub const SLIDE_WINDOW_SIZE: usize = 8;

/// One element of a D3D9 vertex declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexElement {
    pub stream: u16,
    pub offset: u16,
    pub ty: u8,
    pub method: u8,
    pub usage: u8,
    pub usage_index: u8,
}

impl VertexElement {
    /// Byte size of the element's data type
    pub fn type_size(&self) -> Option<usize> {
        let size = match self.ty {
            0 => 4,        // FLOAT1
            1 => 8,        // FLOAT2
            2 => 12,       // FLOAT3
            3 => 16,       // FLOAT4
            4 | 5 => 4,    // D3DCOLOR, UBYTE4
            6 => 4,        // SHORT2
            7 => 8,        // SHORT4
            8 | 9 => 4,    // UBYTE4N, SHORT2N
            10 => 8,       // SHORT4N
            11 => 4,       // USHORT2N
            12 => 8,       // USHORT4N
            13 | 14 => 4,  // UDEC3, DEC3N
            15 => 4,       // FLOAT16_2
            16 => 8,       // FLOAT16_4
            17 => 0,       // UNUSED
            _ => return None,
        };
        Some(size)
    }

    fn is_common_type(&self) -> bool {
        matches!(
            self.ty,
            DECLTYPE_FLOAT2 | DECLTYPE_FLOAT3 | DECLTYPE_D3DCOLOR
                | DECLTYPE_UBYTE4 | DECLTYPE_SHORT2 | DECLTYPE_SHORT4
        )
    }
}

/// How the interleaved vertex data is laid out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexFormat {
    /// Fixed-function flexible vertex format bit mask
    Fvf(u32),
    /// Stride-based vertex declaration
    Declaration(Vec<VertexElement>),
}

impl VertexFormat {
    pub fn is_fixed_function(&self) -> bool {
        matches!(self, VertexFormat::Fvf(_))
    }

    /// Bytes per vertex
    pub fn stride(&self) -> Result<usize> {
        match self {
            VertexFormat::Fvf(fvf) => fvf_stride(*fvf),
            VertexFormat::Declaration(elements) => {
                let mut stride = 0;
                for element in elements.iter().filter(|e| e.stream == 0) {
                    let size = element.type_size().ok_or_else(|| {
                        Error::invalid_data(format!("unknown vertex element type {}", element.ty))
                    })?;
                    stride = stride.max(usize::from(element.offset) + size);
                }
                Ok(stride)
            }
        }
    }

    /// Byte offset of a FLOAT3 position within a vertex, if there is one
    pub fn position_offset(&self) -> Option<usize> {
        match self {
            VertexFormat::Fvf(fvf) if fvf & FVF_POSITION_MASK != 0 => Some(0),
            VertexFormat::Fvf(_) => None,
            VertexFormat::Declaration(elements) => elements
                .iter()
                .find(|e| e.stream == 0 && e.usage == DECLUSAGE_POSITION && e.ty == DECLTYPE_FLOAT3)
                .map(|e| usize::from(e.offset)),
        }
    }

    /// Describe anything about the layout the level compiler does not usually emit
    fn unusual_traits(&self) -> Vec<String> {
        let mut traits = Vec::new();
        match self {
            VertexFormat::Fvf(fvf) => {
                let position = fvf & FVF_POSITION_MASK;
                if position != FVF_XYZ {
                    traits.push(format!("position kind 0x{position:X}"));
                }
                if fvf & FVF_PSIZE != 0 {
                    traits.push("point size".to_string());
                }
                if fvf & FVF_LASTBETA_MASK != 0 {
                    traits.push("last-beta blending".to_string());
                }
                if fvf & FVF_TEXCOUNT_MASK == 0 {
                    traits.push("no texture coordinates".to_string());
                }
            }
            VertexFormat::Declaration(elements) => {
                if self.position_offset().is_none() {
                    traits.push("no FLOAT3 position".to_string());
                }
                if elements.iter().any(|e| e.stream != 0) {
                    traits.push("multiple streams".to_string());
                }
                for element in elements.iter().filter(|e| !e.is_common_type()) {
                    traits.push(format!(
                        "element usage {} index {} has type {}",
                        element.usage, element.usage_index, element.ty
                    ));
                }
            }
        }
        traits
    }
}

fn fvf_stride(fvf: u32) -> Result<usize> {
    let mut stride = match fvf & FVF_POSITION_MASK {
        0 => 0,
        FVF_XYZ => 12,
        FVF_XYZRHW | FVF_XYZB1 | FVF_XYZW => 16,
        FVF_XYZB2 => 20,
        FVF_XYZB3 => 24,
        FVF_XYZB4 => 28,
        FVF_XYZB5 => 32,
        other => return Err(Error::invalid_data(format!("unknown FVF position kind 0x{other:X}"))),
    };
    if fvf & FVF_NORMAL != 0 {
        stride += 12;
    }
    if fvf & FVF_PSIZE != 0 {
        stride += 4;
    }
    if fvf & FVF_DIFFUSE != 0 {
        stride += 4;
    }
    if fvf & FVF_SPECULAR != 0 {
        stride += 4;
    }
    let tex_count = (fvf & FVF_TEXCOUNT_MASK) >> FVF_TEXCOUNT_SHIFT;
    for set in 0..tex_count {
        stride += match (fvf >> (16 + set * 2)) & 0x3 {
            0 => 8,
            1 => 12,
            2 => 16,
            _ => 4,
        };
    }
    Ok(stride)
}

/// Interleaved vertices sharing one layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexBuffer {
    pub format: VertexFormat,
    pub vertex_count: u32,
    pub data: Vec<u8>,
}

impl VertexBuffer {
    /// Engine-space positions, in the engine's axis convention
    pub fn positions(&self) -> Result<Vec<Vec3>> {
        let Some(offset) = self.format.position_offset() else {
            return Ok(Vec::new());
        };
        let stride = self.format.stride()?;
        (0..self.vertex_count as usize)
            .map(|i| {
                let mut reader = PackedReader::new(&self.data);
                reader.skip(i * stride + offset)?;
                reader.vec3()
            })
            .collect()
    }
}

/// Triangle list indices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBuffer {
    pub triangles: Vec<[u16; 3]>,
}

/// A sub-range of an index buffer for partial draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideWindowItem {
    pub start_index: u32,
    pub count: u32,
}

fn read_declaration(reader: &mut PackedReader<'_>) -> Result<Vec<VertexElement>> {
    let mut elements = Vec::new();
    loop {
        let element = VertexElement {
            stream: reader.u16()?,
            offset: reader.u16()?,
            ty: reader.u8()?,
            method: reader.u8()?,
            usage: reader.u8()?,
            usage_index: reader.u8()?,
        };
        if element.stream == DECL_END_STREAM {
            return Ok(elements);
        }
        elements.push(element);
    }
}

/// Decode every vertex buffer in a VB payload.
///
/// Returns the buffers plus `(buffer index, description)` pairs for layouts
/// worth reporting.
pub fn decode_vertex_buffers(
    payload: &[u8],
    fixed_function: bool,
) -> Result<(Vec<VertexBuffer>, Vec<(usize, String)>)> {
    let mut reader = PackedReader::new(payload);
    let buffer_count = reader.u32()?;
    let mut buffers = Vec::new();
    let mut unusual = Vec::new();

    for index in 0..buffer_count as usize {
        let format = if fixed_function {
            VertexFormat::Fvf(reader.u32()?)
        } else {
            VertexFormat::Declaration(read_declaration(&mut reader)?)
        };
        let vertex_count = reader.u32()?;
        let stride = format.stride()?;
        let size = stride.checked_mul(vertex_count as usize).ok_or_else(|| {
            Error::invalid_data(format!("vertex buffer {index} size overflows"))
        })?;
        let data = reader.take(size)?.to_vec();

        let traits = format.unusual_traits();
        if !traits.is_empty() {
            unusual.push((index, traits.join(", ")));
        }
        tracing::debug!(index, vertex_count, stride, fixed_function, "vertex buffer");
        buffers.push(VertexBuffer { format, vertex_count, data });
    }

    Ok((buffers, unusual))
}

/// Decode every index buffer in an IB payload
pub fn decode_index_buffers(payload: &[u8]) -> Result<Vec<IndexBuffer>> {
    let mut reader = PackedReader::new(payload);
    let buffer_count = reader.u32()?;
    let mut buffers = Vec::new();

    for _ in 0..buffer_count {
        let index_count = reader.u32()? as usize;
        let byte_len = index_count * 2;
        if byte_len % TRIANGLE_SIZE != 0 {
            return Err(Error::MalformedBuffer {
                what: "index",
                len: byte_len,
                record_size: TRIANGLE_SIZE,
            });
        }
        let mut triangles = Vec::with_capacity((index_count / 3).min(reader.remaining() / TRIANGLE_SIZE));
        for _ in 0..index_count / 3 {
            triangles.push([reader.u16()?, reader.u16()?, reader.u16()?]);
        }
        buffers.push(IndexBuffer { triangles });
    }

    Ok(buffers)
}

/// Decode a SWIS payload
pub fn decode_slide_windows(payload: &[u8]) -> Result<Vec<SlideWindowItem>> {
    if payload.len() % SLIDE_WINDOW_SIZE != 0 {
        return Err(Error::MalformedBuffer {
            what: "slide window",
            len: payload.len(),
            record_size: SLIDE_WINDOW_SIZE,
        });
    }
    let mut reader = PackedReader::new(payload);
    (0..payload.len() / SLIDE_WINDOW_SIZE)
        .map(|_| -> Result<SlideWindowItem> {
            Ok(SlideWindowItem {
                start_index: reader.u32()?,
                count: reader.u32()?,
            })
        })
        .collect()
}

pub fn encode_vertex_buffers(buffers: &[VertexBuffer]) -> Vec<u8> {
    let mut writer = PackedWriter::new();
    writer.u32(buffers.len() as u32);
    for buffer in buffers {
        match &buffer.format {
            VertexFormat::Fvf(fvf) => {
                writer.u32(*fvf);
            }
            VertexFormat::Declaration(elements) => {
                for e in elements {
                    writer.u16(e.stream).u16(e.offset).u8(e.ty).u8(e.method).u8(e.usage).u8(e.usage_index);
                }
                writer.u16(DECL_END_STREAM).u16(0).u8(DECLTYPE_UNUSED).u8(0).u8(0).u8(0);
            }
        }
        writer.u32(buffer.vertex_count).bytes(&buffer.data);
    }
    writer.into_inner()
}

pub fn encode_index_buffers(buffers: &[IndexBuffer]) -> Vec<u8> {
    let mut writer = PackedWriter::new();
    writer.u32(buffers.len() as u32);
    for buffer in buffers {
        writer.u32(buffer.triangles.len() as u32 * 3);
        for triangle in &buffer.triangles {
            writer.u16(triangle[0]).u16(triangle[1]).u16(triangle[2]);
        }
    }
    writer.into_inner()
}

pub fn encode_slide_windows(items: &[SlideWindowItem]) -> Vec<u8> {
    let mut writer = PackedWriter::with_capacity(items.len() * SLIDE_WINDOW_SIZE);
    for item in items {
        writer.u32(item.start_index).u32(item.count);
    }
    writer.into_inner()
}
