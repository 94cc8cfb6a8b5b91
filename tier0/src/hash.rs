//! Content hashing for cache keys.
//!
//! Both content-addressed caches (compiled artifacts and generative
//! results) key on the same digest of the canonical source text, so the
//! algorithm must be stable across reads and writes within a deployment.

use sha2::{Digest, Sha256};

/// SHA-256 digest of the given text, as a lowercase hex string.
///
/// # Examples
///
/// ```
/// use tier0::content_hash;
///
/// let h = content_hash("export default () => 1");
/// assert_eq!(h.len(), 64);
/// assert_eq!(h, content_hash("export default () => 1"));
/// ```
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
    }

    #[test]
    fn known_vector() {
        // sha256("abc")
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn distinct_inputs_distinct_digests() {
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn lowercase_hex() {
        let h = content_hash("hello");
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
