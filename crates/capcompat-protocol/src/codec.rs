//! Outbound transport codec: turns a raw HTTP response, as reported by an
//! implementation's `invoke` command, back into an agent message.

use std::collections::BTreeMap;

use ipld_core::ipld::Ipld;

use crate::car::CarArchive;
use crate::error::{CodecError, MessageError, RecordError};
use crate::message::AgentMessage;
use crate::record::{self, Record};

pub const CAR_CONTENT_TYPE: &str = "application/vnd.ipld.car";

/// The transport envelope `{headers, body}` printed by `invoke`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Header names are stored lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Read the envelope from a decoded record. Header values may be a
    /// single string or a list of strings; lists are joined with `, `.
    pub fn from_record(record: &Record) -> Result<Self, RecordError> {
        let mut headers = BTreeMap::new();
        for (name, value) in record::map_field(record, "headers")? {
            let value = match value {
                Ipld::String(value) => value.clone(),
                Ipld::List(values) => values
                    .iter()
                    .map(|v| match v {
                        Ipld::String(s) => Ok(s.as_str()),
                        _ => Err(RecordError::FieldType {
                            field: format!("headers.{name}"),
                            expected: "a string or list of strings",
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", "),
                _ => {
                    return Err(RecordError::FieldType {
                        field: format!("headers.{name}"),
                        expected: "a string or list of strings",
                    })
                }
            };
            headers.insert(name.to_ascii_lowercase(), value);
        }

        Ok(HttpResponse {
            headers,
            body: record::bytes_field(record, "body")?.to_vec(),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

/// Decodes responses received by a client.
pub trait OutboundCodec {
    /// Media types this codec can decode.
    fn accepts(&self) -> &[&'static str];

    fn decode(&self, response: &HttpResponse) -> Result<AgentMessage, CodecError>;
}

/// The CAR transport: bodies are CARv1 archives rooted at an agent message.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarCodec;

impl OutboundCodec for CarCodec {
    fn accepts(&self) -> &[&'static str] {
        &[CAR_CONTENT_TYPE]
    }

    fn decode(&self, response: &HttpResponse) -> Result<AgentMessage, CodecError> {
        let content_type = response.content_type();
        match content_type.as_deref() {
            Some(media) if self.accepts().contains(&media) => {}
            _ => return Err(CodecError::UnsupportedContentType(content_type)),
        }

        let archive = CarArchive::decode(&response.body).map_err(MessageError::from)?;
        Ok(AgentMessage::view(archive)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::Block;
    use crate::message::{MessageBuilder, Outcome, Receipt};
    use crate::signer::{KeyAlgorithm, Signer};

    fn car_body() -> Vec<u8> {
        let signer = Signer::generate(KeyAlgorithm::Ed25519).unwrap();
        let inv = Block::encode(&Ipld::Integer(7)).unwrap();
        let receipt = Receipt::issue(&signer, inv.cid, Outcome::Ok(Ipld::Null)).unwrap();
        MessageBuilder::new()
            .receipt(inv.cid, receipt)
            .build()
            .unwrap()
            .encode()
            .unwrap()
    }

    #[test]
    fn test_from_record_accepts_string_and_list_headers() {
        let rec = record::map([
            (
                "headers",
                record::map([
                    ("Content-Type", Ipld::String(CAR_CONTENT_TYPE.to_string())),
                    (
                        "Vary",
                        Ipld::List(vec![
                            Ipld::String("a".to_string()),
                            Ipld::String("b".to_string()),
                        ]),
                    ),
                ]),
            ),
            ("body", Ipld::Bytes(vec![1, 2])),
        ]);
        let response = HttpResponse::from_record(&rec).unwrap();
        assert_eq!(response.header("content-type"), Some(CAR_CONTENT_TYPE));
        assert_eq!(response.header("VARY"), Some("a, b"));
        assert_eq!(response.body, vec![1, 2]);
    }

    #[test]
    fn test_from_record_requires_body_bytes() {
        let rec = record::map([
            ("headers", Ipld::Map(BTreeMap::new())),
            ("body", Ipld::String("nope".to_string())),
        ]);
        assert!(matches!(
            HttpResponse::from_record(&rec),
            Err(RecordError::FieldType { .. })
        ));
    }

    #[test]
    fn test_car_codec_decodes_message() {
        let mut response = HttpResponse {
            body: car_body(),
            ..Default::default()
        };
        response.headers.insert(
            "content-type".to_string(),
            format!("{CAR_CONTENT_TYPE}; charset=binary"),
        );
        let message = CarCodec.decode(&response).unwrap();
        assert_eq!(message.receipt_count(), 1);
    }

    #[test]
    fn test_car_codec_rejects_other_content_types() {
        let mut response = HttpResponse {
            body: car_body(),
            ..Default::default()
        };
        assert!(matches!(
            CarCodec.decode(&response),
            Err(CodecError::UnsupportedContentType(None))
        ));

        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        assert!(matches!(
            CarCodec.decode(&response),
            Err(CodecError::UnsupportedContentType(Some(_)))
        ));
    }
}
