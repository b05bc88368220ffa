//! CARv1 archives and dag-cbor blocks.

use ipld_core::cid::multihash::Multihash;
use ipld_core::cid::Cid;
use ipld_core::ipld::Ipld;
use sha2::{Digest, Sha256};

use crate::error::{CarError, EncodingError};
use crate::multibase::varint;
use crate::record;

pub const DAG_CBOR: u64 = 0x71;
pub const SHA2_256: u64 = 0x12;

const CAR_VERSION: u64 = 1;

/// A content-addressed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    pub bytes: Vec<u8>,
}

impl Block {
    /// Encode `value` as dag-cbor and address it with a CIDv1 sha2-256 link.
    pub fn encode(value: &Ipld) -> Result<Self, CarError> {
        let bytes = serde_ipld_dagcbor::to_vec(value).map_err(|e| CarError::Encode(e.to_string()))?;
        let digest = Sha256::digest(&bytes);
        let hash =
            Multihash::<64>::wrap(SHA2_256, &digest).map_err(|e| CarError::Encode(e.to_string()))?;
        Ok(Block {
            cid: Cid::new_v1(DAG_CBOR, hash),
            bytes,
        })
    }

    pub fn decode(&self) -> Result<Ipld, String> {
        serde_ipld_dagcbor::from_slice(&self.bytes).map_err(|e| e.to_string())
    }
}

/// An in-memory CARv1 archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarArchive {
    pub roots: Vec<Cid>,
    pub blocks: Vec<Block>,
}

impl CarArchive {
    pub fn new(roots: Vec<Cid>) -> Self {
        Self {
            roots,
            blocks: Vec::new(),
        }
    }

    pub fn get(&self, cid: &Cid) -> Option<&Block> {
        self.blocks.iter().find(|block| &block.cid == cid)
    }

    /// Add a block unless one with the same CID is already present.
    pub fn insert(&mut self, block: Block) {
        if self.get(&block.cid).is_none() {
            self.blocks.push(block);
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CarError> {
        let (header_len, mut offset) = varint::decode(bytes)?;
        let header_end = offset
            .checked_add(header_len as usize)
            .filter(|end| *end <= bytes.len())
            .ok_or(CarError::Truncated("header"))?;

        let header: Ipld = serde_ipld_dagcbor::from_slice(&bytes[offset..header_end])
            .map_err(|e| CarError::Header(e.to_string()))?;
        let version = match record::field(&header, "version") {
            Some(Ipld::Integer(v)) => u64::try_from(*v).map_err(|e| CarError::Header(e.to_string()))?,
            _ => return Err(CarError::Header("missing version".to_string())),
        };
        if version != CAR_VERSION {
            return Err(CarError::Version(version));
        }
        let roots = match record::field(&header, "roots") {
            Some(Ipld::List(items)) => items
                .iter()
                .map(|item| match item {
                    Ipld::Link(cid) => Ok(*cid),
                    _ => Err(CarError::Header("root is not a link".to_string())),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(CarError::Header("missing roots".to_string())),
        };

        let mut archive = CarArchive::new(roots);
        offset = header_end;
        while offset < bytes.len() {
            let (section_len, size) = varint::decode(&bytes[offset..])?;
            let start = offset + size;
            let end = start
                .checked_add(section_len as usize)
                .filter(|end| *end <= bytes.len())
                .ok_or(CarError::Truncated("block section"))?;
            let section = &bytes[start..end];
            let cid_len = cid_length(section)?;
            let cid =
                Cid::try_from(&section[..cid_len]).map_err(|e| CarError::Cid(e.to_string()))?;
            archive.blocks.push(Block {
                cid,
                bytes: section[cid_len..].to_vec(),
            });
            offset = end;
        }

        Ok(archive)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CarError> {
        let header = record::map([
            ("roots", Ipld::List(self.roots.iter().copied().map(Ipld::Link).collect())),
            ("version", Ipld::Integer(i128::from(CAR_VERSION))),
        ]);
        let header_bytes =
            serde_ipld_dagcbor::to_vec(&header).map_err(|e| CarError::Encode(e.to_string()))?;

        let mut out = varint::encode(header_bytes.len() as u64);
        out.extend(header_bytes);
        for block in &self.blocks {
            let cid_bytes = block.cid.to_bytes();
            out.extend(varint::encode((cid_bytes.len() + block.bytes.len()) as u64));
            out.extend(cid_bytes);
            out.extend_from_slice(&block.bytes);
        }
        Ok(out)
    }
}

/// Byte length of the CID at the front of a CAR section.
fn cid_length(section: &[u8]) -> Result<usize, CarError> {
    // CIDv0 is a bare sha2-256 multihash.
    if section.len() >= 34 && section[0] == 0x12 && section[1] == 0x20 {
        return Ok(34);
    }

    let mut offset = 0;
    // version, codec, multihash code, digest length
    let mut fields = [0u64; 4];
    for field in fields.iter_mut() {
        let (value, size) = varint::decode(&section[offset..])?;
        *field = value;
        offset += size;
    }
    let digest_len = fields[3] as usize;
    let end = offset
        .checked_add(digest_len)
        .filter(|end| *end <= section.len())
        .ok_or(CarError::Encoding(EncodingError::TruncatedVarint))?;
    Ok(end)
}
