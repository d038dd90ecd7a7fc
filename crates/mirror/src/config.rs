//! Mirror configuration.

/// Environment variable controlling the upstream bulk query chunk size.
pub const BULK_CHUNK_SIZE_VAR: &str = "DEPOT_BULK_CHUNK_SIZE";

const DEFAULT_BULK_CHUNK_SIZE: usize = 100;

/// Chunk size for upstream bulk queries.
///
/// Unset, non-integer and non-positive values all fall back to the default
/// of 100.
pub fn bulk_chunk_size() -> usize {
    std::env::var(BULK_CHUNK_SIZE_VAR)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|value| *value > 0)
        .map(|value| value as usize)
        .unwrap_or(DEFAULT_BULK_CHUNK_SIZE)
}
