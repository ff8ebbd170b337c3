//! Identity and signature utilities for the Agent Communication Network.
//!
//! Every function here is deterministic and pure: no global state, no I/O.
//! This is the lowest leaf in the dependency graph — `acn-protocol`,
//! `acn-registry` and `acn-engine` all build on top of the types exposed here.

pub mod address;
pub mod error;
pub mod ledger;
pub mod peer_id;
pub mod por;
pub mod record;

pub use error::IdentityError;
pub use ledger::Ledger;
pub use peer_id::peer_id_from_peer_public_key;
pub use record::AgentRecord;
