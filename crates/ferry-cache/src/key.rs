//! Content-addressed cache keys.

use std::collections::BTreeMap;
use std::fmt;

use blake3::Hasher;

/// Opaque cache key: a BLAKE3 hash of everything the artifact depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form, used for store paths and log labels.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Everything a transform depends on, hashed into a [`CacheKey`].
///
/// Field order is fixed and every variable-length field is length-prefixed,
/// so two fingerprints collide only when all inputs are equal. Custom options
/// are sorted by key before hashing for determinism.
#[derive(Debug, Clone)]
pub struct TransformFingerprint<'a> {
    pub source: &'a [u8],
    pub transformer_version: &'a str,
    /// `transformer.cacheVersion` from the bundler config.
    pub cache_version: &'a str,
    pub platform: Option<&'a str>,
    pub dev: bool,
    pub hot: bool,
    pub minify: bool,
    pub inline_requires: bool,
    pub custom_options: &'a BTreeMap<String, String>,
}

impl Default for TransformFingerprint<'_> {
    fn default() -> Self {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        Self {
            source: &[],
            transformer_version: "",
            cache_version: "",
            platform: None,
            dev: false,
            hot: false,
            minify: false,
            inline_requires: false,
            custom_options: &EMPTY,
        }
    }
}

impl TransformFingerprint<'_> {
    pub fn compute(&self) -> CacheKey {
        let mut hasher = Hasher::new();

        hash_bytes(&mut hasher, self.source);
        hash_bytes(&mut hasher, self.transformer_version.as_bytes());
        hash_bytes(&mut hasher, self.cache_version.as_bytes());
        hash_bytes(&mut hasher, self.platform.unwrap_or("").as_bytes());
        hasher.update(&[
            u8::from(self.dev),
            u8::from(self.hot),
            u8::from(self.minify),
            u8::from(self.inline_requires),
        ]);

        // BTreeMap iterates in key order.
        hasher.update(&(self.custom_options.len() as u64).to_le_bytes());
        for (key, value) in self.custom_options {
            hash_bytes(&mut hasher, key.as_bytes());
            hash_bytes(&mut hasher, value.as_bytes());
        }

        CacheKey(*hasher.finalize().as_bytes())
    }
}

fn hash_bytes(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(source: &[u8]) -> TransformFingerprint<'_> {
        TransformFingerprint {
            source,
            transformer_version: "1.0.0",
            cache_version: "test",
            ..TransformFingerprint::default()
        }
    }

    #[test]
    fn equal_inputs_produce_equal_keys() {
        let custom = BTreeMap::new();
        let mut a = fingerprint(b"const x = 1;");
        a.custom_options = &custom;
        let mut b = fingerprint(b"const x = 1;");
        b.custom_options = &custom;
        assert_eq!(a.compute(), b.compute());
    }

    #[test]
    fn source_change_changes_the_key() {
        let custom = BTreeMap::new();
        let mut a = fingerprint(b"const x = 1;");
        a.custom_options = &custom;
        let mut b = fingerprint(b"const x = 2;");
        b.custom_options = &custom;
        assert_ne!(a.compute(), b.compute());
    }

    #[test]
    fn option_flags_affect_the_key() {
        let custom = BTreeMap::new();
        let mut dev = fingerprint(b"x");
        dev.custom_options = &custom;
        dev.dev = true;
        let mut prod = fingerprint(b"x");
        prod.custom_options = &custom;
        assert_ne!(dev.compute(), prod.compute());
    }

    #[test]
    fn platform_affects_the_key() {
        let custom = BTreeMap::new();
        let mut android = fingerprint(b"x");
        android.custom_options = &custom;
        android.platform = Some("android");
        let mut ios = fingerprint(b"x");
        ios.custom_options = &custom;
        ios.platform = Some("ios");
        assert_ne!(android.compute(), ios.compute());
    }

    #[test]
    fn custom_options_are_order_independent() {
        let mut one = BTreeMap::new();
        one.insert("a".to_string(), "1".to_string());
        one.insert("b".to_string(), "2".to_string());

        let mut two = BTreeMap::new();
        two.insert("b".to_string(), "2".to_string());
        two.insert("a".to_string(), "1".to_string());

        let mut fp_one = fingerprint(b"x");
        fp_one.custom_options = &one;
        let mut fp_two = fingerprint(b"x");
        fp_two.custom_options = &two;

        assert_eq!(fp_one.compute(), fp_two.compute());
    }

    #[test]
    fn hex_round_trips_length() {
        let custom = BTreeMap::new();
        let mut fp = fingerprint(b"x");
        fp.custom_options = &custom;
        assert_eq!(fp.compute().to_hex().len(), 64);
    }
}
