/// Width of a poke, one machine word.
pub const WORD: usize = std::mem::size_of::<usize>();

/// One word-sized slice of the payload, offset relative to the payload start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: usize,
    pub bytes: [u8; WORD],
}

/// Split a payload into word-sized chunks.
///
/// Every poke writes a full word, so a payload whose length is not a
/// multiple of `WORD` would clobber the bytes right after it. `fill` holds
/// the target's bytes that follow the payload; the tail chunk is padded
/// from it. Past `fill` the padding is zero, which only ever lands beyond
/// the end of the backing file inside the last mapped page.
pub fn word_chunks(payload: &[u8], fill: &[u8]) -> Vec<Chunk> {
    let mut chunks = Vec::with_capacity(payload.len().div_ceil(WORD));

    for (i, part) in payload.chunks(WORD).enumerate() {
        let mut bytes = [0u8; WORD];
        bytes[..part.len()].copy_from_slice(part);

        for (pad, slot) in bytes.iter_mut().enumerate().skip(part.len()) {
            if let Some(byte) = fill.get(pad - part.len()) {
                *slot = *byte;
            }
        }

        chunks.push(Chunk { offset: i * WORD, bytes });
    }

    chunks
}
