//! Tag + length + payload chunk container.
//!
//! # Format Structure
//! ```text
//! ┌──────────────┬───────────────┬──────────────────────┐
//! │ tag: u32 LE  │ size: u32 LE  │ payload: size bytes  │  repeated to EOF
//! └──────────────┴───────────────┴──────────────────────┘
//! ```
//!
//! No padding, footer or checksum. Decoding never interprets tags; any `u32`
//! is structurally legal. The same framing is used at top level, inside
//! sectors and inside each compiled visual.

use std::collections::HashMap;

use xrlevel_core::{ChunkRole, Error, Result};

use crate::packed::{PackedReader, PackedWriter};

/// Size of the `[tag][size]` record header
pub const CHUNK_HEADER_SIZE: usize = 8;

/// One framed record borrowed from the source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub tag: u32,
    pub payload: &'a [u8],
}

/// Streams chunks in file order
#[derive(Debug, Clone)]
pub struct ChunkedReader<'a> {
    reader: PackedReader<'a>,
    failed: bool,
}

impl<'a> ChunkedReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { reader: PackedReader::new(data), failed: false }
    }

    fn read_chunk(&mut self) -> Result<Chunk<'a>> {
        let tag = self.reader.u32()?;
        let size = self.reader.u32()? as usize;
        let payload = self.reader.take(size)?;
        Ok(Chunk { tag, payload })
    }

    /// Advance until a chunk with `tag` is found, returning its payload
    pub fn find_tag(&mut self, tag: u32) -> Result<Option<&'a [u8]>> {
        for chunk in self.by_ref() {
            let chunk = chunk?;
            if chunk.tag == tag {
                return Ok(Some(chunk.payload));
            }
        }
        Ok(None)
    }
}

impl<'a> Iterator for ChunkedReader<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_exhausted() {
            return None;
        }
        let chunk = self.read_chunk();
        if chunk.is_err() {
            self.failed = true;
        }
        Some(chunk)
    }
}

/// Decode a whole buffer into its chunk sequence
pub fn decode_chunks(data: &[u8]) -> Result<Vec<Chunk<'_>>> {
    ChunkedReader::new(data).collect()
}

/// Tag-indexed view of a chunk sequence with "pop" semantics.
///
/// Duplicate tags are forgiven: the last one wins. Whatever has not been
/// popped by the end of a decode is reported as unknown.
#[derive(Debug, Clone, Default)]
pub struct ChunkMap<'a> {
    slots: Vec<Option<Chunk<'a>>>,
    index: HashMap<u32, usize>,
}

impl<'a> ChunkMap<'a> {
    pub fn from_chunks(chunks: impl IntoIterator<Item = Chunk<'a>>) -> Self {
        let mut map = Self::default();
        for chunk in chunks {
            if let Some(previous) = map.index.insert(chunk.tag, map.slots.len()) {
                tracing::debug!(tag = chunk.tag, "duplicate chunk tag, keeping the last one");
                map.slots[previous] = None;
            }
            map.slots.push(Some(chunk));
        }
        map
    }

    /// Decode a buffer straight into a map
    pub fn decode(data: &'a [u8]) -> Result<Self> {
        Ok(Self::from_chunks(decode_chunks(data)?))
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.index.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Remove and return a payload if present
    pub fn pop(&mut self, tag: u32) -> Option<&'a [u8]> {
        let slot = self.index.remove(&tag)?;
        self.slots[slot].take().map(|chunk| chunk.payload)
    }

    /// Remove and return a payload the schema requires
    pub fn pop_required(&mut self, role: ChunkRole, tag: u32) -> Result<&'a [u8]> {
        self.pop(tag).ok_or(Error::MissingChunk { role, tag })
    }

    /// Chunks nobody popped, in file order
    pub fn into_remaining(self) -> Vec<Chunk<'a>> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Builds a chunk container in caller-specified order
#[derive(Debug, Clone, Default)]
pub struct ChunkWriter {
    writer: PackedWriter,
}

impl ChunkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(&mut self, tag: u32, payload: &[u8]) -> &mut Self {
        self.writer.u32(tag).u32(payload.len() as u32).bytes(payload);
        self
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

/// Encode a chunk sequence
pub fn encode_chunks<'p, I>(chunks: I) -> Vec<u8>
where
    I: IntoIterator<Item = (u32, &'p [u8])>,
{
    let mut writer = ChunkWriter::new();
    for (tag, payload) in chunks {
        writer.chunk(tag, payload);
    }
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_in_order() {
        let data = encode_chunks([(1, &b"ab"[..]), (0xDEAD_BEEF, &b""[..]), (7, &b"xyz"[..])]);
        let chunks = decode_chunks(&data).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], Chunk { tag: 1, payload: b"ab" });
        assert_eq!(chunks[1].tag, 0xDEAD_BEEF);
        assert!(chunks[1].payload.is_empty());
        assert_eq!(chunks[2].payload, b"xyz");
    }

    #[test]
    fn test_truncated_payload_is_underrun() {
        let mut data = encode_chunks([(1, &b"abcd"[..])]);
        data.truncate(data.len() - 1);

        let result = decode_chunks(&data);
        assert!(matches!(result, Err(Error::BufferUnderrun { .. })));
    }

    #[test]
    fn test_reader_stops_after_error() {
        let data = [1u8, 0, 0];
        let mut reader = ChunkedReader::new(&data);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_map_pop_semantics() {
        let data = encode_chunks([(1, &b"a"[..]), (2, &b"b"[..]), (3, &b"c"[..])]);
        let mut map = ChunkMap::decode(&data).unwrap();

        assert_eq!(map.pop(2), Some(&b"b"[..]));
        assert_eq!(map.pop(2), None);
        assert!(matches!(
            map.pop_required(ChunkRole::Glows, 9),
            Err(Error::MissingChunk { role: ChunkRole::Glows, tag: 9 })
        ));

        let remaining: Vec<u32> = map.into_remaining().iter().map(|c| c.tag).collect();
        assert_eq!(remaining, vec![1, 3]);
    }

    #[test]
    fn test_map_duplicate_last_wins() {
        let data = encode_chunks([(5, &b"old"[..]), (6, &b"x"[..]), (5, &b"new"[..])]);
        let mut map = ChunkMap::decode(&data).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.pop(5), Some(&b"new"[..]));
        assert_eq!(map.into_remaining().len(), 1);
    }

    #[test]
    fn test_find_tag_skips_ahead() {
        let data = encode_chunks([(1, &b"h"[..]), (4, &b"p"[..])]);
        let mut reader = ChunkedReader::new(&data);
        assert_eq!(reader.find_tag(4).unwrap(), Some(&b"p"[..]));
        assert_eq!(reader.find_tag(4).unwrap(), None);
    }

    proptest! {
        #[test]
        fn prop_framing_preserves_sequence(
            chunks in proptest::collection::vec(
                (any::<u32>(), proptest::collection::vec(any::<u8>(), 0..64)),
                0..16,
            )
        ) {
            let data = encode_chunks(chunks.iter().map(|(tag, payload)| (*tag, payload.as_slice())));
            let expected_len: usize = chunks.iter().map(|(_, p)| CHUNK_HEADER_SIZE + p.len()).sum();
            prop_assert_eq!(data.len(), expected_len);

            let decoded = decode_chunks(&data).unwrap();
            prop_assert_eq!(decoded.len(), chunks.len());
            for (chunk, (tag, payload)) in decoded.iter().zip(chunks.iter()) {
                prop_assert_eq!(chunk.tag, *tag);
                prop_assert_eq!(chunk.payload, payload.as_slice());
            }
        }
    }
}
