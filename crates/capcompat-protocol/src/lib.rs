//! capcompat protocol layer
//!
//! The values a compatibility harness needs to exchange with capability
//! invocation implementations over process I/O:
//! - structured records (DAG-JSON) for every stdout payload and caveat
//! - DIDs and the signers whose key material implementations hand out
//! - CAR archives carrying agent messages, receipts and delegations
//! - the outbound codec that turns an HTTP response back into a message
//!
//! None of this validates authorization. Signatures are produced for
//! fixtures but never checked; the harness only needs both sides to
//! agree on the wire shapes.

pub mod car;
pub mod codec;
pub mod delegation;
pub mod did;
pub mod error;
pub mod message;
pub mod multibase;
pub mod record;
pub mod signer;

pub use car::{Block, CarArchive};
pub use codec::{CarCodec, HttpResponse, OutboundCodec, CAR_CONTENT_TYPE};
pub use delegation::Delegation;
pub use did::Did;
pub use error::{
    ArchiveError, CarError, CodecError, DidError, EncodingError, KeyError, MessageError,
    ReceiptIssueError, RecordError,
};
pub use message::{AgentMessage, MessageBuilder, Outcome, Receipt};
pub use record::Record;
pub use signer::{KeyAlgorithm, Signer};

pub use ipld_core::cid::Cid;
pub use ipld_core::ipld::Ipld;

/// capcompat protocol layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
