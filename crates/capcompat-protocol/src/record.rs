//! Structured records exchanged over process I/O.
//!
//! Every payload an implementation writes to stdout, and every caveat the
//! harness passes on the command line, is a DAG-JSON encoded IPLD value.
//! Byte strings appear as `{"/": {"bytes": "..."}}` and links as
//! `{"/": "<cid>"}`.

use std::collections::BTreeMap;

use ipld_core::ipld::Ipld;

use crate::error::RecordError;

/// A decoded structured record.
pub type Record = Ipld;

pub fn decode(bytes: &[u8]) -> Result<Record, RecordError> {
    serde_ipld_dagjson::from_slice(bytes.trim_ascii())
        .map_err(|e| RecordError::Malformed(e.to_string()))
}

pub fn encode(record: &Record) -> Result<Vec<u8>, RecordError> {
    serde_ipld_dagjson::to_vec(record).map_err(|e| RecordError::Encode(e.to_string()))
}

pub fn encode_string(record: &Record) -> Result<String, RecordError> {
    let bytes = encode(record)?;
    String::from_utf8(bytes).map_err(|e| RecordError::Encode(e.to_string()))
}

/// Look up `name` in a map record.
pub fn field<'a>(record: &'a Record, name: &str) -> Option<&'a Record> {
    match record {
        Ipld::Map(map) => map.get(name),
        _ => None,
    }
}

fn required<'a>(record: &'a Record, name: &str) -> Result<&'a Record, RecordError> {
    match field(record, name) {
        Some(Ipld::Null) | None => Err(RecordError::MissingField(name.to_string())),
        Some(value) => Ok(value),
    }
}

pub fn string_field<'a>(record: &'a Record, name: &str) -> Result<&'a str, RecordError> {
    match required(record, name)? {
        Ipld::String(value) => Ok(value),
        _ => Err(RecordError::FieldType {
            field: name.to_string(),
            expected: "a string",
        }),
    }
}

pub fn bytes_field<'a>(record: &'a Record, name: &str) -> Result<&'a [u8], RecordError> {
    match required(record, name)? {
        Ipld::Bytes(value) => Ok(value),
        _ => Err(RecordError::FieldType {
            field: name.to_string(),
            expected: "bytes",
        }),
    }
}

pub fn map_field<'a>(
    record: &'a Record,
    name: &str,
) -> Result<&'a BTreeMap<String, Record>, RecordError> {
    match required(record, name)? {
        Ipld::Map(value) => Ok(value),
        _ => Err(RecordError::FieldType {
            field: name.to_string(),
            expected: "a map",
        }),
    }
}

/// Build a map record from string keys.
pub fn map<K, I>(entries: I) -> Record
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Record)>,
{
    Ipld::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
}
