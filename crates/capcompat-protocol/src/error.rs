//! Error taxonomy for the protocol value layer.

use ipld_core::cid::Cid;

/// Errors produced while decoding or inspecting structured records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("failed to parse output as dag-json: {0}")]
    Malformed(String),

    #[error("failed to encode record as dag-json: {0}")]
    Encode(String),

    #[error("record is missing required field: {0}")]
    MissingField(String),

    #[error("record field {field} must be {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },
}

/// Errors produced by DID parsing.
#[derive(Debug, thiserror::Error)]
pub enum DidError {
    #[error("invalid DID \"{0}\", must start with 'did:'")]
    MissingPrefix(String),

    #[error("invalid DID \"{0}\", method and identifier must not be empty")]
    Empty(String),

    #[error("invalid did:key \"{did}\": {reason}")]
    InvalidKey { did: String, reason: String },

    #[error("unsupported DID encoding: multicodec 0x{code:x}")]
    UnsupportedCode { code: u64 },
}

/// Errors produced by multibase and varint decoding.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("expected multibase prefix '{expected}', got {actual:?}")]
    Prefix { expected: char, actual: Option<char> },

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid base58btc: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("truncated varint")]
    TruncatedVarint,

    #[error("varint overflows u64")]
    VarintOverflow,
}

/// Errors produced by signer encoding, decoding and signing.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("unknown key algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("expected {expected} bytes of key material, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("expected multicodec tag 0x{expected:x}, got 0x{actual:x}")]
    Tag { expected: u64, actual: u64 },

    #[error("public key does not match secret key")]
    PublicKeyMismatch,

    #[error("invalid RSA key: {0}")]
    Rsa(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Errors produced while reading or writing CAR archives.
#[derive(Debug, thiserror::Error)]
pub enum CarError {
    #[error("truncated CAR archive: {0}")]
    Truncated(&'static str),

    #[error("invalid CAR header: {0}")]
    Header(String),

    #[error("unsupported CAR version: {0}")]
    Version(u64),

    #[error("invalid CID in CAR section: {0}")]
    Cid(String),

    #[error("failed to encode block: {0}")]
    Encode(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Errors produced while viewing an agent message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message archive has no root")]
    NoRoot,

    #[error("missing block: {0}")]
    MissingBlock(Cid),

    #[error("failed to decode block {cid}: {reason}")]
    Block { cid: Cid, reason: String },

    #[error("invalid message: {0}")]
    Invalid(String),

    #[error("invalid receipt {cid}: {reason}")]
    Receipt { cid: Cid, reason: String },

    #[error(transparent)]
    Car(#[from] CarError),
}

/// Errors produced while issuing a receipt block.
#[derive(Debug, thiserror::Error)]
pub enum ReceiptIssueError {
    #[error(transparent)]
    Car(#[from] CarError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Errors produced by the outbound transport codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("can not decode response with content-type {0:?}")]
    UnsupportedContentType(Option<String>),

    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Errors produced while archiving or extracting delegations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("delegation block {0} is not in the archive")]
    MissingBlock(Cid),

    #[error("archive root is not a delegation variant")]
    NotADelegation,

    #[error(transparent)]
    Car(#[from] CarError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_display() {
        let err = RecordError::MissingField("url".to_string());
        assert!(err.to_string().contains("missing required field: url"));

        let err = RecordError::FieldType {
            field: "key".to_string(),
            expected: "bytes",
        };
        assert_eq!(err.to_string(), "record field key must be bytes");
    }

    #[test]
    fn test_did_error_display() {
        let err = DidError::MissingPrefix("key:z6Mk".to_string());
        assert!(err.to_string().contains("must start with 'did:'"));

        let err = DidError::UnsupportedCode { code: 0x1234 };
        assert!(err.to_string().contains("0x1234"));
    }

    #[test]
    fn test_codec_error_names_content_type() {
        let err = CodecError::UnsupportedContentType(Some("text/html".to_string()));
        assert!(err.to_string().contains("text/html"));
    }
}
