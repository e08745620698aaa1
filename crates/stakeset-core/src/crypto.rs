// crates/stakeset-core/src/crypto.rs

use sha2::{Digest, Sha256};

/// Compute SHA-256 over several byte slices fed in order.
///
/// Each part is prefixed with its length as a little-endian `u64`, so
/// different splits of the same bytes hash differently. Used to derive pool
/// and capability ids from a domain tag plus the owner.
pub fn hash_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}
