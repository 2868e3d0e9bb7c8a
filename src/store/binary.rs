//! Compact little-endian store encoding.
//!
//! ```text
//! "RAGB" | version u8 | fileCount u16 | { len u16, utf8 }* | chunkCount u32
//!        | timestampLen u16, utf8
//!        | per chunk: textLen u16, utf8 | dims u16, f32 * dims
//!                     | start u32 | end u32 | chunkIndex u32 | sourceIndex u16
//! ```
//!
//! Only text, embedding, offsets and source survive; enrichment and
//! hierarchy fields are dropped.

use anyhow::{bail, Context, Result};

use crate::error::RagError;
use crate::models::{Chunk, ChunkMetadata};

pub const MAGIC: &[u8; 4] = b"RAGB";
pub const VERSION: u8 = 1;
/// Source index meaning "no source file".
pub const NO_SOURCE: u16 = 0xFFFF;

/// Decoded contents of a binary store file.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryStore {
    pub version: u8,
    pub file_paths: Vec<String>,
    pub indexed_at: String,
    pub chunks: Vec<Chunk>,
}

// ─── Encoding ───

pub fn encode(chunks: &[Chunk], file_paths: &[String], indexed_at: &str) -> Result<Vec<u8>, RagError> {
    let mut buf = Vec::with_capacity(estimated_size(chunks, file_paths, indexed_at));
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);

    buf.extend_from_slice(&narrow_u16(file_paths.len(), "file count")?.to_le_bytes());
    for path in file_paths {
        put_str(&mut buf, path, "file path")?;
    }

    buf.extend_from_slice(&narrow_u32(chunks.len(), "chunk count")?.to_le_bytes());
    put_str(&mut buf, indexed_at, "timestamp")?;

    for chunk in chunks {
        put_str(&mut buf, &chunk.text, "chunk text")?;

        buf.extend_from_slice(&narrow_u16(chunk.embedding.len(), "embedding dimensions")?.to_le_bytes());
        for value in &chunk.embedding {
            buf.extend_from_slice(&value.to_le_bytes());
        }

        let meta = &chunk.metadata;
        buf.extend_from_slice(&narrow_u32(meta.start_index, "start index")?.to_le_bytes());
        buf.extend_from_slice(&narrow_u32(meta.end_index, "end index")?.to_le_bytes());
        buf.extend_from_slice(&narrow_u32(meta.chunk_index, "chunk index")?.to_le_bytes());
        buf.extend_from_slice(&source_index(meta, file_paths).to_le_bytes());
    }

    Ok(buf)
}

/// Position of the chunk's source in the path table, `NO_SOURCE` if absent.
fn source_index(meta: &ChunkMetadata, file_paths: &[String]) -> u16 {
    meta.source()
        .and_then(|src| file_paths.iter().position(|p| p == src))
        .and_then(|i| u16::try_from(i).ok())
        .filter(|&i| i != NO_SOURCE)
        .unwrap_or(NO_SOURCE)
}

fn put_str(buf: &mut Vec<u8>, s: &str, field: &'static str) -> Result<(), RagError> {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&narrow_u16(bytes.len(), field)?.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn narrow_u16(len: usize, field: &'static str) -> Result<u16, RagError> {
    u16::try_from(len).map_err(|_| RagError::RecordTooLarge {
        field,
        len,
        max: u16::MAX as usize,
    })
}

fn narrow_u32(len: usize, field: &'static str) -> Result<u32, RagError> {
    u32::try_from(len).map_err(|_| RagError::RecordTooLarge {
        field,
        len,
        max: u32::MAX as usize,
    })
}

fn estimated_size(chunks: &[Chunk], file_paths: &[String], indexed_at: &str) -> usize {
    let header = 4 + 1 + 2 + 4 + 2 + indexed_at.len() + file_paths.iter().map(|p| 2 + p.len()).sum::<usize>();
    let body: usize = chunks
        .iter()
        .map(|c| 2 + c.text.len() + 2 + c.embedding.len() * 4 + 14)
        .sum();
    header + body
}

// ─── Decoding ───

pub fn decode(bytes: &[u8]) -> Result<BinaryStore> {
    let mut r = Reader::new(bytes);

    if r.take(4, "magic")? != MAGIC {
        bail!("not a binary vector store (bad magic)");
    }
    let version = r.u8("version")?;
    if version != VERSION {
        bail!("unsupported binary store version {version}");
    }

    let file_count = r.u16("file count")? as usize;
    let file_paths = (0..file_count)
        .map(|_| r.string("file path"))
        .collect::<Result<Vec<_>>>()?;

    let chunk_count = r.u32("chunk count")? as usize;
    let indexed_at = r.string("timestamp")?;

    let mut chunks = Vec::with_capacity(chunk_count.min(bytes.len() / 18));
    for i in 0..chunk_count {
        let chunk = read_chunk(&mut r, &file_paths).with_context(|| format!("chunk {i}"))?;
        chunks.push(chunk);
    }

    if r.remaining() > 0 {
        tracing::debug!("Binary store has {} trailing bytes", r.remaining());
    }

    Ok(BinaryStore {
        version,
        file_paths,
        indexed_at,
        chunks,
    })
}

fn read_chunk(r: &mut Reader<'_>, file_paths: &[String]) -> Result<Chunk> {
    let text = r.string("chunk text")?;

    let dims = r.u16("embedding dimensions")? as usize;
    let raw = r.take(dims * 4, "embedding")?;
    let embedding = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let start = r.u32("start index")? as usize;
    let end = r.u32("end index")? as usize;
    let chunk_index = r.u32("chunk index")? as usize;
    let source = r.u16("source index")?;

    let mut metadata = ChunkMetadata::new(start, end, chunk_index);
    if let Some(path) = file_paths.get(source as usize) {
        metadata = metadata.with_source(path);
    }

    Ok(Chunk {
        text,
        embedding,
        metadata,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            bail!(
                "truncated store reading {field}: need {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            );
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    fn u16(&mut self, field: &str) -> Result<u16> {
        let b = self.take(2, field)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        let b = self.take(4, field)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, field: &str) -> Result<String> {
        let len = self.u16(field)? as usize;
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec()).with_context(|| format!("{field} is not valid UTF-8"))
    }
}
