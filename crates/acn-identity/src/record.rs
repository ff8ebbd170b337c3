//! `AgentRecord` — the bundle asserting "this agent address is served by
//! this peer", and the invariant that licenses it (see `por::verify_por`).

use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;

/// Binds an agent address to the peer currently serving it, with a
/// signature proving the agent authorized that peer (Proof of
/// Representation).
///
/// All byte-valued fields (`public_key`, `peer_public_key`) are hex-encoded
/// compressed secp256k1 keys; `signature` is ledger-specific (base64 for
/// fetchai/cosmos, `0x`-prefixed hex for ethereum — see `por::verify_por`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Ledger-derived address of the agent owning this record.
    pub address: String,
    /// Hex-encoded compressed secp256k1 public key of the agent.
    pub public_key: String,
    /// Hex-encoded compressed secp256k1 public key of the serving peer.
    pub peer_public_key: String,
    /// Signature, produced by `public_key`'s owner, over `peer_public_key`'s
    /// bytes, in the ledger's canonical signing form.
    pub signature: String,
    /// Selects the address-derivation and signature verification scheme.
    pub ledger_id: Ledger,
    /// Optional reachability hint. Not used by routing; carried for
    /// compatibility with records produced by other ACN implementations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_uri: Option<String>,
}
