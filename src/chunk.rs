//! Sliding-window text chunker.
//!
//! Splits page text into overlapping windows of at most `chunk_size`
//! characters (Unicode scalar values, never bytes), stepping back `overlap`
//! characters between windows. The next window always starts at least one
//! character after the previous start, so any `overlap`, including
//! `overlap >= chunk_size`, terminates.
//!
//! Each chunk gets a deterministic id of the form
//! `{doc_id}_{doc_type}_p{page}_c{index}`, so re-ingesting the same page
//! overwrites rather than duplicates.

use crate::models::{Chunk, ChunkMetadata, DocType, Page};

/// Split text into overlapping windows.
///
/// Leading and trailing whitespace is trimmed first; whitespace-only input
/// yields no chunks. The window that reaches the end of the text is the
/// last one emitted.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);

    // Byte offset of every char boundary, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    let len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < len {
        let end = (start + chunk_size).min(len);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end == len {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Stable id for a chunk.
pub fn chunk_id(doc_id: &str, doc_type: DocType, page: u32, index: usize) -> String {
    format!("{}_{}_p{}_c{}", doc_id, doc_type, page, index)
}

/// Chunk every page of a document. Pages with no text contribute nothing.
pub fn chunk_pages(
    doc_id: &str,
    doc_type: DocType,
    pages: &[Page],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let mut out = Vec::new();
    for page in pages {
        for (index, text) in chunk_text(&page.text, chunk_size, overlap)
            .into_iter()
            .enumerate()
        {
            out.push(Chunk {
                id: chunk_id(doc_id, doc_type, page.page_number, index),
                chunk_index: index,
                text,
                metadata: ChunkMetadata {
                    source: doc_type,
                    page: page.page_number,
                    doc_id: doc_id.to_string(),
                },
            });
        }
    }
    out
}
