use crate::error::{Error, Result};
use blake3::Hasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, fs, io, path::Path, str::FromStr};

const DIGEST_LEN: usize = 16;

/// 128-bit content digest. Identity of a catalog entry and the staleness check
/// for persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; DIGEST_LEN]);

impl Fingerprint {
    #[cfg(test)]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(bytes);
        Self::finish(&hasher)
    }

    /// Streams the whole file. No digest is produced unless every byte was read.
    pub fn of_file(path: &Path) -> Result<Self> {
        let mut file = fs::File::open(path).map_err(|err| Error::io(path, err))?;
        let mut hasher = Hasher::new();
        io::copy(&mut file, &mut hasher).map_err(|err| Error::io(path, err))?;
        Ok(Self::finish(&hasher))
    }

    fn finish(hasher: &Hasher) -> Self {
        let mut out = [0u8; DIGEST_LEN];
        hasher.finalize_xof().fill(&mut out);
        Fingerprint(out)
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(DIGEST_LEN * 2);
        for byte in self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let raw = value.trim();
        if raw.len() != DIGEST_LEN * 2 || !raw.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(Error::InvalidFingerprint(value.to_string()));
        }
        let mut out = [0u8; DIGEST_LEN];
        for (index, slot) in out.iter_mut().enumerate() {
            let pair = &raw[index * 2..index * 2 + 2];
            *slot = u8::from_str_radix(pair, 16)
                .map_err(|_| Error::InvalidFingerprint(value.to_string()))?;
        }
        Ok(Fingerprint(out))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips_and_is_lowercase() {
        let fp = Fingerprint::of_bytes(b"IWAD\0\0\0\0");
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(hex, hex.to_ascii_lowercase());
        assert_eq!(hex.parse::<Fingerprint>().unwrap(), fp);
        assert_eq!(hex.to_ascii_uppercase().parse::<Fingerprint>().unwrap(), fp);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!("abc".parse::<Fingerprint>().is_err());
        assert!("zz".repeat(16).parse::<Fingerprint>().is_err());
        assert!("é".repeat(16).parse::<Fingerprint>().is_err());
        assert!("+f".repeat(16).parse::<Fingerprint>().is_err());
        assert!("-0".repeat(16).parse::<Fingerprint>().is_err());
    }

    #[test]
    fn file_digest_matches_content_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doom2.wad");
        fs::write(&path, b"IWAD some lumps").unwrap();
        assert_eq!(
            Fingerprint::of_file(&path).unwrap(),
            Fingerprint::of_bytes(b"IWAD some lumps")
        );
        assert_ne!(
            Fingerprint::of_file(&path).unwrap(),
            Fingerprint::of_bytes(b"PWAD some lumps")
        );
    }

    #[test]
    fn unreadable_file_has_no_digest() {
        let dir = tempfile::tempdir().unwrap();
        let err = Fingerprint::of_file(&dir.path().join("gone.wad")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
