//! `RedisKey`: an opaque byte string with hash-tag extraction for routing.

/// The server's advertised per-key size limit (512 MiB).
pub const MAX_KEY_LEN: usize = 512 * 1024 * 1024;

/// An opaque key byte string. Cloning is cheap-ish (owned `Vec<u8>`) but keys
/// are expected to be short; the multiplexer never holds more of them than
/// the in-flight queue depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedisKey(Vec<u8>);

impl RedisKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extract the routing hash tag per spec §3/§4.E: the bytes strictly
    /// between the first `{` and the first subsequent `}` that has a
    /// non-empty payload between them. Falls back to the whole key.
    pub fn hash_tag(&self) -> &[u8] {
        let k = &self.0;
        if let Some(open) = k.iter().position(|&b| b == b'{') {
            if let Some(rel_close) = k[open + 1..].iter().position(|&b| b == b'}') {
                let close = open + 1 + rel_close;
                if close > open + 1 {
                    return &k[open + 1..close];
                }
            }
        }
        k
    }
}

impl From<&str> for RedisKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for RedisKey {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&[u8]> for RedisKey {
    fn from(b: &[u8]) -> Self {
        Self(b.to_vec())
    }
}
