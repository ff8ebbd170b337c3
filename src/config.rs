//! Node configuration: YAML on disk (`spec.md §6`), loaded via `serde_yaml`
//! and turned into an `acn_engine::EngineConfig`.
//!
//! Grounded on `sven-node`'s `config` loader: addresses are kept
//! as plain strings in the on-disk shape and parsed into `Multiaddr`/
//! `SocketAddr` once, at load time, rather than relying on `Multiaddr`'s own
//! (de)serialization — same reasoning as `sven-node`'s `P2pGatewayConfig`
//! storing `listen`/`agent_listen` as `String` and parsing them in
//! `node.rs`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use acn_engine::EngineConfig;
use acn_identity::AgentRecord;

fn default_log_level() -> String {
    "info".to_string()
}

/// On-disk node configuration (`spec.md §6`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hex-encoded secp256k1 private key. Sets this node's peer identity.
    pub private_key: String,
    /// Provides the local `AgentRecord`, inline or by path to its own file.
    #[serde(default)]
    pub agent_record: Option<AgentRecordSource>,
    /// Bootstrap peers to connect to on startup.
    #[serde(default)]
    pub entry_peers: Vec<String>,
    /// Listen address for libp2p. Absent ⇒ client-peer mode.
    #[serde(default)]
    pub local_uri: Option<String>,
    /// Externally-advertised address, when different from `local_uri`.
    #[serde(default)]
    pub public_uri: Option<String>,
    /// TCP bind address for the delegate gateway (full peers only).
    #[serde(default)]
    pub delegate_uri: Option<SocketAddr>,
    /// For client peers: the single full peer they tether to.
    #[serde(default)]
    pub relay_peer: Option<String>,
    /// `trace`/`debug`/`info`/`warn`/`error`, or an `EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When set, logs go to this file instead of stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Either the `AgentRecord` inline in the config, or a path to its own YAML
/// file. Untagged so either shape parses without an explicit discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentRecordSource {
    Inline(AgentRecord),
    Path(PathBuf),
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    fn resolve_agent_record(&self) -> anyhow::Result<Option<AgentRecord>> {
        match &self.agent_record {
            None => Ok(None),
            Some(AgentRecordSource::Inline(record)) => Ok(Some(record.clone())),
            Some(AgentRecordSource::Path(path)) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading agent record {}", path.display()))?;
                let record = serde_yaml::from_str(&text)
                    .with_context(|| format!("parsing agent record {}", path.display()))?;
                Ok(Some(record))
            }
        }
    }

    fn parse_multiaddr(field: &str, value: &str) -> anyhow::Result<Multiaddr> {
        value
            .parse()
            .with_context(|| format!("invalid {field} multiaddress {value:?}"))
    }

    pub fn into_engine_config(self) -> anyhow::Result<EngineConfig> {
        let agent_record = self.resolve_agent_record()?;

        let entry_peers = self
            .entry_peers
            .iter()
            .map(|s| Self::parse_multiaddr("entry_peers", s))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let local_uri = self.local_uri.as_deref().map(|s| Self::parse_multiaddr("local_uri", s)).transpose()?;
        let public_uri = self.public_uri.as_deref().map(|s| Self::parse_multiaddr("public_uri", s)).transpose()?;
        let relay_peer = self.relay_peer.as_deref().map(|s| Self::parse_multiaddr("relay_peer", s)).transpose()?;

        Ok(EngineConfig {
            private_key_hex: self.private_key,
            agent_record,
            entry_peers,
            local_uri,
            public_uri,
            delegate_uri: self.delegate_uri,
            relay_peer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_peer_config_round_trips() {
        let config = NodeConfig {
            private_key: "abcd".into(),
            agent_record: None,
            entry_peers: vec!["/ip4/127.0.0.1/tcp/4001".into()],
            local_uri: Some("/ip4/0.0.0.0/tcp/4001".into()),
            public_uri: None,
            delegate_uri: Some("127.0.0.1:9000".parse().unwrap()),
            relay_peer: None,
            log_level: default_log_level(),
            log_file: None,
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: NodeConfig = serde_yaml::from_str(&yaml).unwrap();
        let engine_config = back.into_engine_config().unwrap();
        assert!(engine_config.is_full_peer());
        assert_eq!(engine_config.entry_peers.len(), 1);
    }

    #[test]
    fn client_config_has_no_local_uri() {
        let config = NodeConfig {
            private_key: "abcd".into(),
            agent_record: None,
            entry_peers: vec![],
            local_uri: None,
            public_uri: None,
            delegate_uri: None,
            relay_peer: Some("/ip4/127.0.0.1/tcp/4001".into()),
            log_level: default_log_level(),
            log_file: None,
        };
        let engine_config = config.into_engine_config().unwrap();
        assert!(!engine_config.is_full_peer());
    }
}
