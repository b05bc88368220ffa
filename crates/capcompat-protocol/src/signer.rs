//! Signing principals decoded from implementation key material.
//!
//! Key material is multicodec tagged so that any implementation can hand
//! its keys to any other:
//!
//! - ed25519: `varint(0x1300) ‖ secret(32) ‖ varint(0xed) ‖ public(32)`
//! - RSA: `varint(0x1305) ‖ PKCS#1 DER private key`

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::Signer as _;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::SignatureEncoding;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::did::{codes, Did};
use crate::error::KeyError;
use crate::multibase::{base64pad, varint};

pub const ED25519_PRIV: u64 = 0x1300;
pub const RSA_PRIV: u64 = 0x1305;

const ED25519_KEY_SIZE: usize = 32;
const ED25519_ENCODED_SIZE: usize = 2 + ED25519_KEY_SIZE + 2 + ED25519_KEY_SIZE;
const RSA_KEY_BITS: usize = 2048;

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    #[default]
    Ed25519,
    Rsa,
}

impl KeyAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "ed25519",
            KeyAlgorithm::Rsa => "rsa",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(KeyAlgorithm::Ed25519),
            "rsa" => Ok(KeyAlgorithm::Rsa),
            other => Err(KeyError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// A principal able to sign payloads and derive its own DID.
#[derive(Clone)]
pub enum Signer {
    Ed25519(ed25519_dalek::SigningKey),
    Rsa(Box<RsaPrivateKey>),
}

impl Signer {
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self, KeyError> {
        match algorithm {
            KeyAlgorithm::Ed25519 => Ok(Signer::Ed25519(ed25519_dalek::SigningKey::generate(
                &mut OsRng,
            ))),
            KeyAlgorithm::Rsa => Self::generate_rsa(RSA_KEY_BITS),
        }
    }

    /// RSA key of a chosen modulus size; [`Signer::generate`] uses 2048 bits.
    pub fn generate_rsa(bits: usize) -> Result<Self, KeyError> {
        let key = RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| KeyError::Rsa(e.to_string()))?;
        Ok(Signer::Rsa(Box::new(key)))
    }

    /// Decode tagged key material produced by an implementation's `key gen`.
    pub fn decode(algorithm: KeyAlgorithm, bytes: &[u8]) -> Result<Self, KeyError> {
        match algorithm {
            KeyAlgorithm::Ed25519 => decode_ed25519(bytes),
            KeyAlgorithm::Rsa => decode_rsa(bytes),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Signer::Ed25519(_) => KeyAlgorithm::Ed25519,
            Signer::Rsa(_) => KeyAlgorithm::Rsa,
        }
    }

    /// Tagged private key bytes, the inverse of [`Signer::decode`].
    pub fn encode(&self) -> Result<Vec<u8>, KeyError> {
        match self {
            Signer::Ed25519(key) => {
                let mut out = varint::tag(ED25519_PRIV, key.as_bytes());
                out.extend(varint::tag(
                    codes::ED25519_PUB,
                    key.verifying_key().as_bytes(),
                ));
                Ok(out)
            }
            Signer::Rsa(key) => {
                let der = key
                    .to_pkcs1_der()
                    .map_err(|e| KeyError::Rsa(e.to_string()))?;
                Ok(varint::tag(RSA_PRIV, der.as_bytes()))
            }
        }
    }

    /// `base64pad` multibase form of [`Signer::encode`], as passed to `--issuer`.
    pub fn format(&self) -> Result<String, KeyError> {
        Ok(base64pad::encode(&self.encode()?))
    }

    pub fn parse(algorithm: KeyAlgorithm, input: &str) -> Result<Self, KeyError> {
        let bytes = base64pad::decode(input)?;
        Self::decode(algorithm, &bytes)
    }

    pub fn did(&self) -> Result<Did, KeyError> {
        match self {
            Signer::Ed25519(key) => Ok(Did::from_public_key(
                codes::ED25519_PUB,
                key.verifying_key().as_bytes(),
            )),
            Signer::Rsa(key) => {
                let der = key
                    .to_public_key()
                    .to_pkcs1_der()
                    .map_err(|e| KeyError::Rsa(e.to_string()))?;
                Ok(Did::from_public_key(codes::RSA_PUB, der.as_bytes()))
            }
        }
    }

    /// Raw signature over `payload`: ed25519, or RSASSA-PKCS1-v1_5 with SHA-256.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, KeyError> {
        match self {
            Signer::Ed25519(key) => Ok(key.sign(payload).to_bytes().to_vec()),
            Signer::Rsa(key) => {
                let signing_key = SigningKey::<Sha256>::new((**key).clone());
                let signature = signing_key
                    .try_sign(payload)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                Ok(signature.to_vec())
            }
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let did = self
            .did()
            .map(|did| did.to_string())
            .unwrap_or_else(|_| "<invalid>".to_string());
        f.debug_struct("Signer")
            .field("algorithm", &self.algorithm())
            .field("did", &did)
            .finish()
    }
}

fn expect_tag(bytes: &[u8], expected: u64) -> Result<usize, KeyError> {
    let (actual, size) = varint::decode(bytes)?;
    if actual != expected {
        return Err(KeyError::Tag { expected, actual });
    }
    Ok(size)
}

fn decode_ed25519(bytes: &[u8]) -> Result<Signer, KeyError> {
    if bytes.len() != ED25519_ENCODED_SIZE {
        return Err(KeyError::Length {
            expected: ED25519_ENCODED_SIZE,
            actual: bytes.len(),
        });
    }

    let offset = expect_tag(bytes, ED25519_PRIV)?;
    let secret: [u8; ED25519_KEY_SIZE] = bytes[offset..offset + ED25519_KEY_SIZE]
        .try_into()
        .map_err(|_| KeyError::Length {
            expected: ED25519_ENCODED_SIZE,
            actual: bytes.len(),
        })?;

    let public_offset = offset + ED25519_KEY_SIZE;
    let size = expect_tag(&bytes[public_offset..], codes::ED25519_PUB)?;
    let public = &bytes[public_offset + size..];

    let key = ed25519_dalek::SigningKey::from_bytes(&secret);
    if key.verifying_key().as_bytes() != public {
        return Err(KeyError::PublicKeyMismatch);
    }
    Ok(Signer::Ed25519(key))
}

fn decode_rsa(bytes: &[u8]) -> Result<Signer, KeyError> {
    let offset = expect_tag(bytes, RSA_PRIV)?;
    let key =
        RsaPrivateKey::from_pkcs1_der(&bytes[offset..]).map_err(|e| KeyError::Rsa(e.to_string()))?;
    Ok(Signer::Rsa(Box::new(key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    #[test]
    fn test_algorithm_parse_is_case_insensitive() {
        assert_eq!("RSA".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Rsa);
        assert_eq!(
            "Ed25519".parse::<KeyAlgorithm>().unwrap(),
            KeyAlgorithm::Ed25519
        );
        assert!("p256".parse::<KeyAlgorithm>().is_err());
        assert_eq!(KeyAlgorithm::default(), KeyAlgorithm::Ed25519);
    }

    #[test]
    fn test_ed25519_encode_layout() {
        let signer = Signer::generate(KeyAlgorithm::Ed25519).unwrap();
        let bytes = signer.encode().unwrap();
        assert_eq!(bytes.len(), 68);
        assert_eq!(&bytes[..2], &[0x80, 0x26]);
        assert_eq!(&bytes[34..36], &[0xed, 0x01]);
    }

    #[test]
    fn test_ed25519_round_trip() {
        let signer = Signer::generate(KeyAlgorithm::Ed25519).unwrap();
        let decoded = Signer::decode(KeyAlgorithm::Ed25519, &signer.encode().unwrap()).unwrap();
        assert_eq!(decoded.did().unwrap(), signer.did().unwrap());
        assert!(decoded.did().unwrap().as_str().starts_with("did:key:z6Mk"));

        let parsed = Signer::parse(KeyAlgorithm::Ed25519, &signer.format().unwrap()).unwrap();
        assert_eq!(parsed.did().unwrap(), signer.did().unwrap());
    }

    #[test]
    fn test_ed25519_rejects_mismatched_public_key() {
        let signer = Signer::generate(KeyAlgorithm::Ed25519).unwrap();
        let mut bytes = signer.encode().unwrap();
        bytes[67] ^= 0xff;
        assert!(matches!(
            Signer::decode(KeyAlgorithm::Ed25519, &bytes),
            Err(KeyError::PublicKeyMismatch)
        ));
    }

    #[test]
    fn test_ed25519_rejects_wrong_length_and_tag() {
        assert!(matches!(
            Signer::decode(KeyAlgorithm::Ed25519, &[0x80, 0x26, 1, 2]),
            Err(KeyError::Length { .. })
        ));
        let mut bytes = Signer::generate(KeyAlgorithm::Ed25519)
            .unwrap()
            .encode()
            .unwrap();
        bytes[0] = 0x81;
        assert!(matches!(
            Signer::decode(KeyAlgorithm::Ed25519, &bytes),
            Err(KeyError::Tag { .. })
        ));
    }

    #[test]
    fn test_ed25519_signature_verifies() {
        let signer = Signer::generate(KeyAlgorithm::Ed25519).unwrap();
        let sig = signer.sign(b"payload").unwrap();
        let Signer::Ed25519(key) = &signer else {
            panic!("expected ed25519 signer");
        };
        let signature = Signature::from_slice(&sig).unwrap();
        assert!(key.verifying_key().verify(b"payload", &signature).is_ok());
    }

    #[test]
    fn test_rsa_round_trip() {
        let signer = Signer::generate_rsa(1024).unwrap();
        let bytes = signer.encode().unwrap();
        assert_eq!(&bytes[..2], &[0x85, 0x26]);

        let decoded = Signer::decode(KeyAlgorithm::Rsa, &bytes).unwrap();
        assert_eq!(decoded.algorithm(), KeyAlgorithm::Rsa);
        let did = decoded.did().unwrap();
        assert_eq!(did, signer.did().unwrap());
        assert!(Did::parse(did.as_str()).is_ok());
        assert!(!decoded.sign(b"payload").unwrap().is_empty());
    }

    #[test]
    fn test_ed25519_bytes_are_not_an_rsa_key() {
        let signer = Signer::generate(KeyAlgorithm::Ed25519).unwrap();
        assert!(Signer::decode(KeyAlgorithm::Rsa, &signer.encode().unwrap()).is_err());
    }
}
