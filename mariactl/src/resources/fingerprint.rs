//! Stable digests over the fields of a desired specification that should trigger a rewrite.
//!
//! Each field is fed to SHA-256 as an 8-byte big-endian length followed by its bytes, so
//! moving characters between adjacent fields always changes the digest. Fields that are
//! not fed in are not covered: changing them will not cause the sub-resource to be
//! rewritten.

use sha2::{Digest, Sha256};

/// Annotation holding the fingerprint a manifest was rendered from.
pub const FINGERPRINT_ANNOTATION: &str = "mariactl.io/config-fingerprint";

#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, value: impl AsRef<[u8]>) -> Self {
        let bytes = value.as_ref();
        self.hasher.update((bytes.len() as u64).to_be_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Feed a map as a count followed by its key/value pairs, in iteration order.
    pub fn map<K, V, I>(mut self, entries: I) -> Self
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        self = self.field((entries.len() as u64).to_string());
        for (key, value) in entries {
            self = self.field(key).field(value);
        }
        self
    }

    /// Lowercase hex of the digest.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_known_vector() {
        let digest = Fingerprint::new().field("0 2 * * *").field("s3://bucket/path").field("app").finish();
        assert_eq!(digest, "c102efb83fe55df38a3d4c29a1fba065ca69e2978ccbc46ec0a40293cbe27788");
    }

    #[test]
    fn test_deterministic_and_fixed_length() {
        let a = Fingerprint::new().field("x").field("y").finish();
        let b = Fingerprint::new().field("x").field("y").finish();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_field_boundaries_matter() {
        let a = Fingerprint::new().field("ab").field("c").finish();
        let b = Fingerprint::new().field("a").field("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_any_covered_change_alters_digest() {
        let base = Fingerprint::new().field("0 2 * * *").field("s3://b").field("app").finish();
        assert_ne!(base, Fingerprint::new().field("0 3 * * *").field("s3://b").field("app").finish());
        assert_ne!(base, Fingerprint::new().field("0 2 * * *").field("s3://c").field("app").finish());
        assert_ne!(base, Fingerprint::new().field("0 2 * * *").field("s3://b").field("").finish());
    }

    #[test]
    fn test_map_order_follows_iteration() {
        let sorted: BTreeMap<&str, &str> = BTreeMap::from([("b", "2"), ("a", "1")]);
        let from_sorted = Fingerprint::new().map(sorted.iter().map(|(k, v)| (*k, *v))).finish();
        let explicit = Fingerprint::new().map([("a", "1"), ("b", "2")]).finish();
        assert_eq!(from_sorted, explicit);

        let empty = Fingerprint::new().map(Vec::<(&str, &str)>::new()).finish();
        assert_ne!(empty, Fingerprint::new().finish());
    }
}
