use crate::error::ChunkError;

/// Share of the escaped byte length reserved on top for transport framing.
const ENCODING_HEADROOM_PERCENT: usize = 20;

/// One ordered piece of a split payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence_index: usize,
    pub total_chunks: usize,
    pub text: String,
}

/// Splits `text` into pieces of at most `chunk_size` characters.
///
/// Empty input yields exactly one empty chunk. Otherwise no chunk is empty and
/// `total_chunks == ceil(chars / chunk_size)`.
pub fn split(text: &str, chunk_size: usize) -> Result<Vec<Chunk>, ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::InvalidChunkSize);
    }

    let char_count = text.chars().count();
    if char_count == 0 {
        return Ok(vec![Chunk {
            sequence_index: 0,
            total_chunks: 1,
            text: String::new(),
        }]);
    }

    let total_chunks = char_count.div_ceil(chunk_size);
    let mut chunks = Vec::with_capacity(total_chunks);
    let mut start = 0usize;

    for (char_index, (byte_index, _)) in text.char_indices().enumerate() {
        if char_index > 0 && char_index % chunk_size == 0 {
            chunks.push(Chunk {
                sequence_index: chunks.len(),
                total_chunks,
                text: text[start..byte_index].to_string(),
            });
            start = byte_index;
        }
    }

    chunks.push(Chunk {
        sequence_index: chunks.len(),
        total_chunks,
        text: text[start..].to_string(),
    });

    Ok(chunks)
}

/// Upper bound on the bytes `text` occupies once JSON-escaped inside a frame.
///
/// Escaping growth is counted per character, then a further 20% is reserved so
/// the estimate never undershoots what the transport actually writes.
pub fn estimate_encoded_size(text: &str) -> usize {
    let escaped: usize = text.chars().map(escaped_len).sum();
    escaped + (escaped * ENCODING_HEADROOM_PERCENT).div_ceil(100)
}

/// Fails with [`ChunkError::SizeExceeded`] when the estimate is over `max_size`.
pub fn validate(text: &str, max_size: usize) -> Result<(), ChunkError> {
    let actual = estimate_encoded_size(text);
    if actual > max_size {
        return Err(ChunkError::size_exceeded(actual, max_size));
    }
    Ok(())
}

/// Rebuilds the original payload from chunks given in any order.
pub fn reassemble(chunks: &[Chunk]) -> Result<String, ChunkError> {
    let Some(first) = chunks.first() else {
        return Err(ChunkError::EmptyChunkSet);
    };
    let total = first.total_chunks;

    if let Some(mismatch) = chunks.iter().find(|chunk| chunk.total_chunks != total) {
        return Err(ChunkError::InconsistentTotal {
            index: mismatch.sequence_index,
            expected: total,
            found: mismatch.total_chunks,
        });
    }

    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|chunk| chunk.sequence_index);

    for (position, chunk) in ordered.iter().enumerate() {
        if chunk.sequence_index < position {
            return Err(ChunkError::DuplicateChunk {
                index: chunk.sequence_index,
            });
        }
        if chunk.sequence_index > position {
            return Err(ChunkError::MissingChunk {
                index: position,
                total,
            });
        }
    }

    if ordered.len() != total {
        return Err(ChunkError::MissingChunk {
            index: ordered.len(),
            total,
        });
    }

    Ok(ordered.iter().map(|chunk| chunk.text.as_str()).collect())
}

fn escaped_len(ch: char) -> usize {
    match ch {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        ch if (ch as u32) < 0x20 => 6,
        ch => ch.len_utf8(),
    }
}
