//! Opaque identifier generation.
//!
//! Used both to correlate requests with responses and to name freshly
//! registered receivers. The two namespaces are allowed to overlap; nothing
//! in this crate assumes otherwise.

use rand::RngCore;

/// 16 bytes of randomness hex-encodes to 32 characters and carries 128 bits
/// of entropy, comfortably above the ≥120 bit floor.
pub const DEFAULT_NONCE_BYTES: usize = 16;

/// Generate a fresh opaque nonce string with `len` bytes of underlying
/// randomness (hex-encoded, so the string is twice as long as `len`).
pub fn generate_with_len(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a fresh nonce using the default entropy budget.
pub fn generate() -> String {
    generate_with_len(DEFAULT_NONCE_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_len_is_32_hex_chars() {
        let n = generate();
        assert_eq!(n.len(), DEFAULT_NONCE_BYTES * 2);
        assert!(n.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn nonces_do_not_collide_over_many_samples() {
        let mut seen = HashSet::new();

        for _ in 0..10_000 {
            assert!(seen.insert(generate()), "nonce collision observed");
        }
    }

    #[test]
    fn custom_length_is_honored() {
        assert_eq!(generate_with_len(4).len(), 8);
        assert_eq!(generate_with_len(32).len(), 64);
    }
}
