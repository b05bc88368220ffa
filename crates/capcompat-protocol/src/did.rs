//! Decentralized identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DidError;
use crate::multibase::{base58btc, varint};

pub const DID_PREFIX: &str = "did:";
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Public key multicodecs accepted inside a `did:key`.
pub mod codes {
    pub const ED25519_PUB: u64 = 0xed;
    pub const RSA_PUB: u64 = 0x1205;
    pub const P256_PUB: u64 = 0x1200;
    pub const P384_PUB: u64 = 0x1201;
    pub const P521_PUB: u64 = 0x1202;
    pub const SECP256K1_PUB: u64 = 0xe7;
    pub const BLS12_381_G1_PUB: u64 = 0xea;
    pub const BLS12_381_G2_PUB: u64 = 0xeb;

    pub const KNOWN: [u64; 8] = [
        ED25519_PUB,
        RSA_PUB,
        P256_PUB,
        P384_PUB,
        P521_PUB,
        SECP256K1_PUB,
        BLS12_381_G1_PUB,
        BLS12_381_G2_PUB,
    ];
}

/// A validated DID string such as `did:key:z6Mk...` or `did:web:example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did(String);

impl Did {
    pub fn parse(input: &str) -> Result<Self, DidError> {
        let rest = input
            .strip_prefix(DID_PREFIX)
            .ok_or_else(|| DidError::MissingPrefix(input.to_string()))?;

        let (method, identifier) = rest
            .split_once(':')
            .ok_or_else(|| DidError::Empty(input.to_string()))?;
        if method.is_empty() || identifier.is_empty() {
            return Err(DidError::Empty(input.to_string()));
        }

        if input.starts_with(DID_KEY_PREFIX) {
            let key = base58btc::decode(identifier).map_err(|e| DidError::InvalidKey {
                did: input.to_string(),
                reason: e.to_string(),
            })?;
            let (code, size) = varint::decode(&key).map_err(|e| DidError::InvalidKey {
                did: input.to_string(),
                reason: e.to_string(),
            })?;
            if !codes::KNOWN.contains(&code) {
                return Err(DidError::UnsupportedCode { code });
            }
            if key.len() == size {
                return Err(DidError::InvalidKey {
                    did: input.to_string(),
                    reason: "empty public key".to_string(),
                });
            }
        }

        Ok(Did(input.to_string()))
    }

    /// Build a `did:key` from a multicodec-tagged public key.
    pub fn from_public_key(code: u64, public_key: &[u8]) -> Self {
        let tagged = varint::tag(code, public_key);
        Did(format!("{DID_KEY_PREFIX}{}", base58btc::encode(&tagged)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DID method, e.g. `key` or `web`.
    pub fn method(&self) -> &str {
        self.0[DID_PREFIX.len()..]
            .split(':')
            .next()
            .unwrap_or_default()
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Did::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Did::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "did:key:z6Mkk89bC3JrVqKie71YEcc5M1SMVxuCgNx6zLZ8SYJsxALi";

    #[test]
    fn test_parse_ed25519_did_key() {
        let did = Did::parse(ALICE).unwrap();
        assert_eq!(did.as_str(), ALICE);
        assert_eq!(did.method(), "key");
    }

    #[test]
    fn test_parse_other_methods() {
        let did = Did::parse("did:web:example.com").unwrap();
        assert_eq!(did.method(), "web");
    }

    #[test]
    fn test_rejects_missing_prefix() {
        assert!(matches!(
            Did::parse("key:z6Mk"),
            Err(DidError::MissingPrefix(_))
        ));
    }

    #[test]
    fn test_rejects_empty_parts() {
        assert!(matches!(Did::parse("did:"), Err(DidError::Empty(_))));
        assert!(matches!(Did::parse("did:key:"), Err(DidError::Empty(_))));
        assert!(matches!(Did::parse("did::abc"), Err(DidError::Empty(_))));
    }

    #[test]
    fn test_rejects_non_multibase_key() {
        assert!(matches!(
            Did::parse("did:key:nonexistent"),
            Err(DidError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_multicodec() {
        let tagged = varint::tag(0x55, &[1, 2, 3]);
        let did = format!("did:key:{}", base58btc::encode(&tagged));
        assert!(matches!(
            Did::parse(&did),
            Err(DidError::UnsupportedCode { code: 0x55 })
        ));
    }

    #[test]
    fn test_from_public_key_round_trips() {
        let did = Did::from_public_key(codes::ED25519_PUB, &[7u8; 32]);
        assert!(did.as_str().starts_with("did:key:z6Mk"));
        assert_eq!(Did::parse(did.as_str()).unwrap(), did);
    }
}
