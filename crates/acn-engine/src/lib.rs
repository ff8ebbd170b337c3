//! The ACN node engine (`spec.md §4.5`): full- and client-peer modes, the
//! five stream handlers, bootstrap/reconnection supervision, and the
//! delegate TCP gateway.
//!
//! Everything below it in the dependency graph (`acn-identity`,
//! `acn-pipe`, `acn-protocol`, `acn-registry`) is pure or narrowly scoped;
//! this crate is where those pieces are wired to a running libp2p `Swarm`
//! and, for full peers, a plain TCP listener — grounded throughout on
//! `sven-p2p`'s `P2pNode`/`NodeState`/`P2pHandle` split in `node.rs`.

mod behaviour;
mod codec;
pub mod config;
mod delegate;
mod engine;
pub mod error;
mod handle;
mod routing;
mod swarm_event;
mod transport;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use handle::{EngineHandle, EnvelopeOutcome};
