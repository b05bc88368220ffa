//! Delegation archives passed to implementations as invocation proofs.

use ipld_core::cid::Cid;
use ipld_core::ipld::Ipld;

use crate::car::{Block, CarArchive};
use crate::error::ArchiveError;
use crate::record;

/// Variant tag wrapping the delegation root in an archive.
pub const DELEGATION_TAG: &str = "ucan@0.9.1";

/// A delegation: its root block plus every block reachable from it
/// (including the proofs it depends on).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub root: Cid,
    pub blocks: Vec<Block>,
}

impl Delegation {
    pub fn new(root: Cid, blocks: Vec<Block>) -> Self {
        Self { root, blocks }
    }

    /// A delegation consisting of a single encoded UCAN block.
    pub fn from_block(block: Block) -> Self {
        Self {
            root: block.cid,
            blocks: vec![block],
        }
    }

    /// Serialize into a CAR rooted at `{"ucan@0.9.1": <root>}`.
    pub fn archive(&self) -> Result<Vec<u8>, ArchiveError> {
        if !self.blocks.iter().any(|block| block.cid == self.root) {
            return Err(ArchiveError::MissingBlock(self.root));
        }

        let variant = Block::encode(&record::map([(DELEGATION_TAG, Ipld::Link(self.root))]))?;
        let mut archive = CarArchive::new(vec![variant.cid]);
        for block in &self.blocks {
            archive.insert(block.clone());
        }
        archive.insert(variant);
        Ok(archive.encode()?)
    }

    /// Inverse of [`Delegation::archive`].
    pub fn extract(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let archive = CarArchive::decode(bytes)?;
        let variant_cid = *archive.roots.first().ok_or(ArchiveError::NotADelegation)?;
        let variant = archive
            .get(&variant_cid)
            .ok_or(ArchiveError::MissingBlock(variant_cid))?
            .decode()
            .map_err(|_| ArchiveError::NotADelegation)?;

        let root = match record::field(&variant, DELEGATION_TAG) {
            Some(Ipld::Link(cid)) => *cid,
            _ => return Err(ArchiveError::NotADelegation),
        };
        if archive.get(&root).is_none() {
            return Err(ArchiveError::MissingBlock(root));
        }

        let blocks = archive
            .blocks
            .into_iter()
            .filter(|block| block.cid != variant_cid)
            .collect();
        Ok(Delegation { root, blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ucan_block() -> Block {
        Block::encode(&record::map([
            ("iss", Ipld::String("did:key:alice".to_string())),
            ("aud", Ipld::String("did:key:bob".to_string())),
        ]))
        .unwrap()
    }

    #[test]
    fn test_archive_and_extract() {
        let delegation = Delegation::from_block(ucan_block());
        let bytes = delegation.archive().unwrap();
        let extracted = Delegation::extract(&bytes).unwrap();
        assert_eq!(extracted, delegation);
    }

    #[test]
    fn test_archive_fails_without_root_block() {
        let block = ucan_block();
        let delegation = Delegation::new(block.cid, Vec::new());
        assert!(matches!(
            delegation.archive(),
            Err(ArchiveError::MissingBlock(cid)) if cid == block.cid
        ));
    }

    #[test]
    fn test_extract_rejects_non_delegation() {
        let block = ucan_block();
        let mut archive = CarArchive::new(vec![block.cid]);
        archive.insert(block);
        assert!(matches!(
            Delegation::extract(&archive.encode().unwrap()),
            Err(ArchiveError::NotADelegation)
        ));
    }
}
