use std::fmt;
use std::str::FromStr;

/// 32-character per-user secret embedded in the announce/scrape/update/report URL.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Passkey(pub [u8; 32]);

#[derive(Debug, thiserror::Error)]
#[error("passkey must be exactly 32 bytes")]
pub struct InvalidPasskey;

impl FromStr for Passkey {
    type Err = InvalidPasskey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        <[u8; 32]>::try_from(bytes)
            .map(Passkey)
            .map_err(|_| InvalidPasskey)
    }
}

impl fmt::Display for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passkey({self})")
    }
}
