//! Connection driver
//!
//! Runs the framer over any duplex byte stream, hands decoded messages to
//! the dispatcher and writes replies back. Dialing, listening and peer
//! selection live elsewhere; this only needs `AsyncRead + AsyncWrite`.

use crate::network::codec::{MessageCodec, ProtocolError};
use crate::network::message::Message;
use crate::network::processor::{MessageDispatcher, ProcessorError};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Why a connection ended abnormally
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),
}

/// Drive one peer connection until it closes, fails or is cancelled.
///
/// `greeting` is sent before anything is read (our `version` on outbound
/// connections).
pub async fn run_connection<S>(
    stream: S,
    codec: MessageCodec,
    dispatcher: Arc<MessageDispatcher>,
    greeting: Option<Message>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer = codec.peer().clone();
    let mut framed = Framed::new(stream, codec);

    if let Some(message) = greeting {
        log::debug!("Sending '{}' to {}", message.command(), peer);
        framed.send(message).await?;
    }

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Connection to {} cancelled", peer);
                break;
            }
            next = framed.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                log::warn!("Dropping {}: {}", peer, e);
                return Err(e.into());
            }
            None => {
                log::info!("Peer {} disconnected", peer);
                break;
            }
        };

        log::debug!("Received '{}' from {}", message.command(), peer);
        let replies = match dispatcher.dispatch(&peer, &message) {
            Ok(replies) => replies,
            Err(e) => {
                log::warn!("Dropping {}: {}", peer, e);
                return Err(e.into());
            }
        };
        for reply in replies {
            framed.feed(reply).await?;
        }
        framed.flush().await?;
    }

    Ok(())
}
