//! Content digests in the `algorithm:encoded` form used by OCI registries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};

use crate::error::OciError;

/// Hash algorithms understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// SHA-256, the registry default.
    Sha256,

    /// SHA-512
    Sha512,
}

impl Algorithm {
    /// The name used as the digest prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha512 => 128,
        }
    }

    fn encode(&self, content: &[u8]) -> String {
        match self {
            Algorithm::Sha256 => hex::encode(Sha256::digest(content)),
            Algorithm::Sha512 => hex::encode(Sha512::digest(content)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = OciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(OciError::InvalidDigest(format!(
                "unsupported algorithm: {other}"
            ))),
        }
    }
}

/// A validated content digest, e.g. `sha256:9f86d0...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: Algorithm,
    encoded: String,
}

impl Digest {
    /// Digest `content` with SHA-256.
    pub fn from_bytes(content: &[u8]) -> Self {
        Self::with_algorithm(Algorithm::Sha256, content)
    }

    /// Digest `content` with the given algorithm.
    pub fn with_algorithm(algorithm: Algorithm, content: &[u8]) -> Self {
        Digest {
            algorithm,
            encoded: algorithm.encode(content),
        }
    }

    /// The hash algorithm
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex-encoded hash, without the algorithm prefix.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Check whether `content` hashes to this digest.
    pub fn verify(&self, content: &[u8]) -> bool {
        self.algorithm.encode(content) == self.encoded
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = OciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| OciError::InvalidDigest(s.to_owned()))?;
        let algorithm: Algorithm = algorithm.parse()?;

        let valid = encoded.len() == algorithm.encoded_len()
            && encoded
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(OciError::InvalidDigest(s.to_owned()));
        }

        Ok(Digest {
            algorithm,
            encoded: encoded.to_owned(),
        })
    }
}

impl TryFrom<String> for Digest {
    type Error = OciError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_known_content() {
        let digest = Digest::from_bytes(b"hello world");
        assert_eq!(
            digest.to_string(),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(digest.algorithm(), Algorithm::Sha256);
        assert!(digest.verify(b"hello world"));
        assert!(!digest.verify(b"hello world!"));
    }

    #[test]
    fn parse_round_trips_display() {
        let digest = Digest::with_algorithm(Algorithm::Sha512, b"payload");
        let parsed: Digest = digest.to_string().parse().unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn rejects_malformed_digests() {
        for input in [
            "sha256",
            "sha256:",
            "md5:d41d8cd98f00b204e9800998ecf8427e",
            "sha256:ABCDEF",
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcdeZ",
        ] {
            assert!(input.parse::<Digest>().is_err(), "{input} should not parse");
        }
    }

    #[test]
    fn serializes_as_string() {
        let digest = Digest::from_bytes(b"");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{digest}\""));

        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
