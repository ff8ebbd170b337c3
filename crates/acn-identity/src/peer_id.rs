//! Derivation of a libp2p-style `PeerId` from a compressed secp256k1 key.
//!
//! ACN nodes use secp256k1 identity keys (not libp2p's usual ed25519
//! default) because the same key the agent signs its proof-of-representation
//! with is also the peer's transport identity — see `spec.md §3`'s
//! `peer_public_key` field and `acn-engine`'s keypair loading.

use libp2p::identity::secp256k1;
use libp2p::identity::PublicKey;
use libp2p::PeerId;

use crate::error::IdentityError;

/// Compute the libp2p `PeerId` (a multihash of the serialized public key)
/// from a hex-encoded compressed secp256k1 public key.
pub fn peer_id_from_peer_public_key(peer_public_key_hex: &str) -> Result<PeerId, IdentityError> {
    let raw = hex::decode(peer_public_key_hex.trim_start_matches("0x"))
        .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?;
    let pk = secp256k1::PublicKey::try_from_bytes(&raw)
        .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?;
    Ok(PeerId::from(PublicKey::from(pk)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key_hex() -> String {
        let kp = secp256k1::Keypair::generate();
        hex::encode(kp.public().to_bytes())
    }

    #[test]
    fn derivation_is_deterministic() {
        let hex_key = sample_key_hex();
        let p1 = peer_id_from_peer_public_key(&hex_key).unwrap();
        let p2 = peer_id_from_peer_public_key(&hex_key).unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn different_keys_yield_different_peer_ids() {
        let p1 = peer_id_from_peer_public_key(&sample_key_hex()).unwrap();
        let p2 = peer_id_from_peer_public_key(&sample_key_hex()).unwrap();
        assert_ne!(p1, p2);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(peer_id_from_peer_public_key("zz").is_err());
    }

    #[test]
    fn rejects_wrong_length_key() {
        assert!(peer_id_from_peer_public_key("aabbcc").is_err());
    }
}
