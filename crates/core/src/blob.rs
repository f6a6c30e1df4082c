//! Blob helpers

/// Bytes inspected when sniffing for binary content
const BINARY_SNIFF_LEN: usize = 8000;

/// Heuristic used by git itself: a NUL byte near the start means binary
pub fn looks_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_SNIFF_LEN)].contains(&0)
}
