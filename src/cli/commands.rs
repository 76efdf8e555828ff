//! CLI commands
//!
//! Implements the command handlers for the CLI interface.

use crate::config::NodeConfig;
use crate::consensus::{ConsensusParameters, Network};
use crate::crypto::DoubleSha256;
use crate::network::{Message, MessageCodec, Node, PeerContext};
use bytes::BytesMut;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::Decoder;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Print the genesis header of the configured network
pub fn cmd_genesis(network: Network) -> CliResult<()> {
    let params = ConsensusParameters::for_network(network);
    let genesis = &params.genesis_header;

    println!("⛓️  Genesis header ({})", network);
    println!("   ├─ Hash: {}", genesis.hash);
    println!("   ├─ Merkle root: {}", genesis.merkle_root);
    println!("   ├─ Time: {}", genesis.timestamp);
    println!("   ├─ Bits: 0x{:08x}", genesis.bits);
    println!("   ├─ Nonce: {}", genesis.nonce);
    println!("   └─ Magic: {}", hex::encode(network.magic()));
    Ok(())
}

/// Decode every complete frame in a hex string
pub fn decode_frames(hex: &str, network: Network, protocol_version: i32) -> CliResult<Vec<Message>> {
    let bytes = hex::decode(hex.trim())?;

    let peer = Arc::new(PeerContext::new(0, "hex", false));
    peer.set_negotiated_version(protocol_version);
    let mut codec = MessageCodec::new(network.magic(), Arc::new(DoubleSha256), peer.clone());

    let mut src = BytesMut::from(&bytes[..]);
    let mut messages = Vec::new();
    while let Some(message) = codec.decode(&mut src)? {
        messages.push(message);
    }

    if messages.is_empty() {
        return Err("input does not contain a complete frame".into());
    }
    if !src.is_empty() || peer.metrics.wasted() > 0 {
        log::warn!(
            "{} bytes left over, {} bytes skipped",
            src.len(),
            peer.metrics.wasted()
        );
    }
    Ok(messages)
}

pub fn cmd_decode(config: &NodeConfig, hex: &str) -> CliResult<()> {
    let messages = decode_frames(hex, config.network, config.protocol_version)?;
    for (index, message) in messages.iter().enumerate() {
        println!("📦 Frame {}: '{}'", index, message.command());
        println!("{:#?}", message);
    }
    Ok(())
}

/// Feed a capture of raw frames through the node and print the events
pub async fn cmd_replay(config: &NodeConfig, input: &Path) -> CliResult<()> {
    let mut node = Node::new(config.clone());
    node.start();
    let mut events = node.events.subscribe();
    let shutdown = node.shutdown_token();

    let file = tokio::fs::File::open(input).await?;
    let summary = node.replay(file, &input.display().to_string()).await?;
    println!(
        "📂 Replayed {} messages ({} header batches)",
        summary.messages, summary.header_batches
    );

    let mut remaining = summary.header_batches;
    while remaining > 0 {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = shutdown.cancelled() => break,
        };
        match event {
            Ok(event) => {
                println!("   {}", event);
                remaining -= 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Missed {} events", skipped);
                remaining = remaining.saturating_sub(skipped as usize);
            }
            Err(RecvError::Closed) => break,
        }
    }

    let status = node.status().await;
    node.shutdown().await;

    println!("⛓️  Chain state ({})", status.network);
    println!("   ├─ Indexed headers: {}", status.indexed_headers);
    println!("   ├─ Best height: {}", status.best_height);
    println!("   └─ Best hash: {}", status.best_hash);

    match status.failure {
        Some(failure) => Err(failure.into()),
        None => Ok(()),
    }
}

/// Print the effective configuration as JSON
pub fn cmd_config(config: &NodeConfig) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::PROTOCOL_VERSION;
    use tokio_util::codec::Encoder;

    #[test]
    fn test_decode_verack_frame() {
        // Mainnet verack
        let hex = "f9beb4d976657261636b000000000000000000005df6e0e2";
        let messages = decode_frames(hex, Network::Mainnet, PROTOCOL_VERSION).unwrap();
        assert_eq!(messages, vec![Message::Verack]);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_frames("zz", Network::Mainnet, PROTOCOL_VERSION).is_err());
        assert!(decode_frames("f9beb4d9", Network::Mainnet, PROTOCOL_VERSION).is_err());
    }

    #[test]
    fn test_decode_several_frames() {
        let peer = Arc::new(PeerContext::new(0, "test", true));
        peer.set_negotiated_version(PROTOCOL_VERSION);
        let mut codec = MessageCodec::new(Network::Regtest.magic(), Arc::new(DoubleSha256), peer);
        let mut bytes = BytesMut::new();
        codec.encode(Message::Ping(3), &mut bytes).unwrap();
        codec.encode(Message::SendHeaders, &mut bytes).unwrap();

        let messages = decode_frames(&hex::encode(&bytes), Network::Regtest, PROTOCOL_VERSION).unwrap();
        assert_eq!(messages, vec![Message::Ping(3), Message::SendHeaders]);
    }

    #[tokio::test]
    async fn test_replay_file() {
        let config = NodeConfig {
            network: Network::Regtest,
            ..Default::default()
        };
        let params = ConsensusParameters::regtest();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("capture.bin");

        let peer = Arc::new(PeerContext::new(0, "test", true));
        peer.set_negotiated_version(PROTOCOL_VERSION);
        let mut codec = MessageCodec::new(Network::Regtest.magic(), Arc::new(DoubleSha256), peer);
        let mut bytes = BytesMut::new();
        codec
            .encode(Message::Headers(vec![params.genesis_header.clone()]), &mut bytes)
            .unwrap();
        std::fs::write(&path, &bytes).unwrap();

        cmd_replay(&config, &path).await.unwrap();
    }
}
