//! Agent messages and the receipts they carry.
//!
//! A message is a CAR archive whose root block is
//! `{"ucanto/message@7.1.0": {execute?: [link], report?: {<cid>: link}}}`.
//! Each `report` entry maps the invocation that ran to the receipt block
//! describing its outcome.

use std::collections::BTreeMap;

use ipld_core::cid::Cid;
use ipld_core::ipld::Ipld;

use crate::car::{Block, CarArchive};
use crate::error::{CarError, MessageError, ReceiptIssueError};
use crate::record;
use crate::signer::Signer;

pub const MESSAGE_TAG: &str = "ucanto/message@7.1.0";

/// The result payload of an executed invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ok(Ipld),
    Error(Ipld),
}

impl Outcome {
    pub fn ok(&self) -> Option<&Ipld> {
        match self {
            Outcome::Ok(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Ipld> {
        match self {
            Outcome::Error(value) => Some(value),
            Outcome::Ok(_) => None,
        }
    }

    fn to_ipld(&self) -> Ipld {
        match self {
            Outcome::Ok(value) => record::map([("ok", value.clone())]),
            Outcome::Error(value) => record::map([("error", value.clone())]),
        }
    }
}

/// A decoded receipt block.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub cid: Cid,
    /// Link to the invocation this receipt is for.
    pub ran: Cid,
    pub out: Outcome,
    pub fork: Vec<Cid>,
    pub join: Option<Cid>,
    pub meta: Ipld,
    pub issuer: Option<Ipld>,
    pub proofs: Vec<Cid>,
    pub signature: Vec<u8>,
}

impl Receipt {
    fn view(block: &Block) -> Result<Self, MessageError> {
        let invalid = |reason: String| MessageError::Receipt {
            cid: block.cid,
            reason,
        };

        let root = block.decode().map_err(|reason| MessageError::Block {
            cid: block.cid,
            reason,
        })?;
        let ocm = record::field(&root, "ocm").ok_or_else(|| invalid("missing ocm".into()))?;

        let ran = match record::field(ocm, "ran") {
            Some(Ipld::Link(cid)) => *cid,
            _ => return Err(invalid("ran must be a link".into())),
        };

        let out = match record::field(ocm, "out") {
            Some(Ipld::Map(map)) => match (map.get("ok"), map.get("error")) {
                (Some(ok), None) => Outcome::Ok(ok.clone()),
                (None, Some(error)) => Outcome::Error(error.clone()),
                _ => return Err(invalid("out must have exactly one of ok or error".into())),
            },
            _ => return Err(invalid("out must be a map".into())),
        };

        let fx = record::field(ocm, "fx");
        let fork = match fx.and_then(|fx| record::field(fx, "fork")) {
            Some(Ipld::List(items)) => links(items).map_err(invalid)?,
            None => Vec::new(),
            Some(_) => return Err(invalid("fx.fork must be a list".into())),
        };
        let join = match fx.and_then(|fx| record::field(fx, "join")) {
            Some(Ipld::Link(cid)) => Some(*cid),
            None | Some(Ipld::Null) => None,
            Some(_) => return Err(invalid("fx.join must be a link".into())),
        };

        let proofs = match record::field(ocm, "prf") {
            Some(Ipld::List(items)) => links(items).map_err(invalid)?,
            None => Vec::new(),
            Some(_) => return Err(invalid("prf must be a list".into())),
        };

        let signature = match record::field(&root, "sig") {
            Some(Ipld::Bytes(sig)) => sig.clone(),
            _ => return Err(invalid("sig must be bytes".into())),
        };

        Ok(Receipt {
            cid: block.cid,
            ran,
            out,
            fork,
            join,
            meta: record::field(ocm, "meta")
                .cloned()
                .unwrap_or(Ipld::Map(BTreeMap::new())),
            issuer: record::field(ocm, "iss").cloned(),
            proofs,
            signature,
        })
    }

    /// Issue a receipt for `ran`, signed by `signer` over the dag-cbor
    /// encoding of the outcome model.
    pub fn issue(signer: &Signer, ran: Cid, out: Outcome) -> Result<Block, ReceiptIssueError> {
        let ocm = record::map([
            ("ran", Ipld::Link(ran)),
            ("out", out.to_ipld()),
            ("fx", record::map([("fork", Ipld::List(Vec::new()))])),
            ("meta", Ipld::Map(BTreeMap::new())),
            ("prf", Ipld::List(Vec::new())),
        ]);
        let payload = Block::encode(&ocm)?;
        let signature = signer.sign(&payload.bytes)?;
        Ok(Block::encode(&record::map([
            ("ocm", ocm),
            ("sig", Ipld::Bytes(signature)),
        ]))?)
    }
}

fn links(items: &[Ipld]) -> Result<Vec<Cid>, String> {
    items
        .iter()
        .map(|item| match item {
            Ipld::Link(cid) => Ok(*cid),
            other => Err(format!("expected link, got {other:?}")),
        })
        .collect()
}

/// A decoded agent message.
#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub root: Cid,
    /// Invocations the message asks the recipient to execute.
    pub invocations: Vec<Cid>,
    /// Receipts keyed by the string form of the invocation they ran.
    pub receipts: BTreeMap<String, Receipt>,
    pub archive: CarArchive,
}

impl AgentMessage {
    pub fn view(archive: CarArchive) -> Result<Self, MessageError> {
        let root = *archive.roots.first().ok_or(MessageError::NoRoot)?;
        let block = archive.get(&root).ok_or(MessageError::MissingBlock(root))?;
        let value = block.decode().map_err(|reason| MessageError::Block { cid: root, reason })?;

        let body = record::field(&value, MESSAGE_TAG)
            .ok_or_else(|| MessageError::Invalid(format!("root block is not a {MESSAGE_TAG}")))?;

        let invocations = match record::field(body, "execute") {
            Some(Ipld::List(items)) => links(items).map_err(MessageError::Invalid)?,
            None => Vec::new(),
            Some(_) => return Err(MessageError::Invalid("execute must be a list".into())),
        };

        let mut receipts = BTreeMap::new();
        match record::field(body, "report") {
            Some(Ipld::Map(report)) => {
                for (ran, link) in report {
                    let Ipld::Link(cid) = link else {
                        return Err(MessageError::Invalid(format!(
                            "report entry {ran} must be a link"
                        )));
                    };
                    let block = archive.get(cid).ok_or(MessageError::MissingBlock(*cid))?;
                    receipts.insert(ran.clone(), Receipt::view(block)?);
                }
            }
            None => {}
            Some(_) => return Err(MessageError::Invalid("report must be a map".into())),
        }

        tracing::debug!(
            root = %root,
            invocations = invocations.len(),
            receipts = receipts.len(),
            "decoded agent message"
        );

        Ok(AgentMessage {
            root,
            invocations,
            receipts,
            archive,
        })
    }

    pub fn receipt_count(&self) -> usize {
        self.receipts.len()
    }

    pub fn get(&self, ran: &Cid) -> Option<&Receipt> {
        self.receipts.get(&ran.to_string())
    }
}

/// Assembles an agent message archive.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    execute: Vec<Cid>,
    report: BTreeMap<String, Ipld>,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include an invocation block to be executed by the recipient.
    pub fn invocation(mut self, block: Block) -> Self {
        self.execute.push(block.cid);
        self.blocks.push(block);
        self
    }

    /// Report `receipt` as the outcome of the invocation `ran`.
    pub fn receipt(mut self, ran: Cid, receipt: Block) -> Self {
        self.report.insert(ran.to_string(), Ipld::Link(receipt.cid));
        self.blocks.push(receipt);
        self
    }

    pub fn build(self) -> Result<CarArchive, CarError> {
        let mut body = BTreeMap::new();
        if !self.execute.is_empty() {
            body.insert(
                "execute".to_string(),
                Ipld::List(self.execute.into_iter().map(Ipld::Link).collect()),
            );
        }
        if !self.report.is_empty() {
            body.insert("report".to_string(), Ipld::Map(self.report));
        }

        let root = Block::encode(&record::map([(MESSAGE_TAG, Ipld::Map(body))]))?;
        let mut archive = CarArchive::new(vec![root.cid]);
        for block in self.blocks {
            archive.insert(block);
        }
        archive.insert(root);
        Ok(archive)
    }
}
