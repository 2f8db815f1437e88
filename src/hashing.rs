//! Content-addressing helpers shared by the chunker, synchronizer, and store
//! adapter. Grounded on the teacher's `vector_store.rs::xxh3_hex`.

use xxhash_rust::xxh3::xxh3_64;

/// Stable hex digest of arbitrary bytes. Used for `chunk_hash` and file
/// content hashes (§3 "content_hash(Chunk.text) = Chunk.chunk_hash").
pub fn xxh3_hex(bytes: &[u8]) -> String {
    format!("{:016x}", xxh3_64(bytes))
}

/// Deterministic record id: `id5(parts joined by \u{1f})`, matching §4.5's
/// `id5(file_path ‖ file_hash ‖ start_line ‖ end_line)` and
/// `id5(chunk_hash)` derivations. Named `id5` after the original's
/// convention; the digit has no numeric meaning beyond "a stable short id".
pub fn id5(parts: &[&str]) -> String {
    let joined = parts.join("\u{1f}");
    xxh3_hex(joined.as_bytes())
}
