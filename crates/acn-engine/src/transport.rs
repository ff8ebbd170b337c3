//! Transport and identity construction, grounded on `sven-p2p`'s
//! `transport.rs` — same TCP+Noise+Yamux stack and `SwarmConfig` idle
//! timeout, but secp256k1 identity keys (not its ed25519 default:
//! `spec.md §3`'s `peer_public_key` field IS the transport identity, and
//! ledger signature verification already speaks secp256k1).

use std::time::Duration;

use libp2p::{
    core::{muxing::StreamMuxerBox, upgrade},
    identity, noise, relay,
    swarm::Config as SwarmConfig,
    tcp, yamux, PeerId, Transport,
};

use crate::error::EngineError;

/// Parse a hex-encoded secp256k1 private key into a libp2p node identity.
pub fn keypair_from_hex(private_key_hex: &str) -> Result<identity::Keypair, EngineError> {
    let mut bytes = hex::decode(private_key_hex.trim_start_matches("0x"))
        .map_err(|e| EngineError::Keypair(e.to_string()))?;
    let secret = identity::secp256k1::SecretKey::try_from_bytes(&mut bytes)
        .map_err(|e| EngineError::Keypair(e.to_string()))?;
    let keypair = identity::secp256k1::Keypair::from(secret);
    Ok(identity::Keypair::from(keypair))
}

/// TCP+Noise+Yamux transport used by full peers, which are never dialed
/// through a circuit-relay themselves.
pub fn build_transport(
    key: &identity::Keypair,
) -> Result<libp2p::core::transport::Boxed<(PeerId, StreamMuxerBox)>, EngineError> {
    let noise_config = noise::Config::new(key).map_err(|e| EngineError::Transport(e.to_string()))?;
    Ok(tcp::tokio::Transport::new(tcp::Config::default().nodelay(true))
        .upgrade(upgrade::Version::V1)
        .authenticate(noise_config)
        .multiplex(yamux::Config::default())
        .boxed())
}

/// TCP+Noise+Yamux transport OR'd with the relay-client transport, used by
/// client peers so dialing `/p2p/<relay>/p2p-circuit/p2p/<target>` addresses
/// and reserving a slot on the relay peer both work over the same `Swarm`.
pub fn build_client_transport(
    key: &identity::Keypair,
    relay_transport: relay::client::Transport,
) -> Result<libp2p::core::transport::Boxed<(PeerId, StreamMuxerBox)>, EngineError> {
    let noise_config = noise::Config::new(key).map_err(|e| EngineError::Transport(e.to_string()))?;
    let tcp = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true));
    Ok(relay_transport
        .or_transport(tcp)
        .upgrade(upgrade::Version::V1)
        .authenticate(noise_config)
        .multiplex(yamux::Config::default())
        .boxed())
}

pub fn default_swarm_config() -> SwarmConfig {
    SwarmConfig::with_tokio_executor().with_idle_connection_timeout(Duration::from_secs(30))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY_HEX: &str = "c85ef7d79691fe79573b1a7064c19c1a9819ebdbd1faaab1a8ec92344438aaf";

    #[test]
    fn keypair_from_hex_is_deterministic() {
        let k1 = keypair_from_hex(TEST_KEY_HEX).unwrap();
        let k2 = keypair_from_hex(TEST_KEY_HEX).unwrap();
        assert_eq!(PeerId::from(k1.public()), PeerId::from(k2.public()));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(keypair_from_hex("not-hex").is_err());
    }
}
