//! Inbound transports.
//!
//! [`StreamListener`] treats everything a peer writes before closing its
//! write side as one message. [`FrameListener`] reads length-delimited
//! frames, one message per frame, and answers each frame with an `ack`
//! frame. Both hand accepted messages to the [`Dispatcher`] and stop
//! accepting once the shared cancellation token fires.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::metrics::IngestMetrics;

/// Reply written after each frame.
pub const ACK: &[u8] = b"ack";

/// State shared by every connection of a listener.
struct Shared {
    dispatcher: Arc<Dispatcher>,
    metrics: IngestMetrics,
    max_message_bytes: usize,
}

impl Shared {
    /// Decodes, trims, and dispatches one raw message.
    ///
    /// Returns whether the message was dispatched. Empty messages are not.
    fn accept(&self, raw: &[u8]) -> Result<bool> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| Error::Decode(format!("message is not valid UTF-8: {}", e)))?;
        // Trim the whole decoded message once, never individual read chunks.
        let message = text.trim();
        if message.is_empty() {
            return Ok(false);
        }
        self.metrics.messages_total.inc();
        let lanes = self.dispatcher.dispatch(message);
        debug!(len = message.len(), lanes, "message dispatched");
        Ok(true)
    }
}

/// Byte-stream listener: one message per connection, read to EOF.
pub struct StreamListener {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl StreamListener {
    pub async fn bind(
        addr: &str,
        dispatcher: Arc<Dispatcher>,
        metrics: IngestMetrics,
        max_message_bytes: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("stream listener bound on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                dispatcher,
                metrics,
                max_message_bytes,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("stream listener shutting down");
                    break;
                }
                result = self.listener.accept() => match result {
                    Ok((stream, addr)) => {
                        let shared = self.shared.clone();
                        tokio::spawn(async move {
                            if let Err(e) = read_message(stream, addr, &shared).await {
                                shared.metrics.errors_total.inc();
                                warn!("dropping message from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                },
            }
        }
    }
}

#[instrument(skip(stream, shared), fields(peer = %addr))]
async fn read_message(mut stream: TcpStream, addr: SocketAddr, shared: &Shared) -> Result<()> {
    let limit = shared.max_message_bytes;
    let mut buf = Vec::new();
    (&mut stream)
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > limit {
        return Err(Error::Transport(format!("message exceeds {} bytes", limit)));
    }
    shared.accept(&buf)?;
    Ok(())
}

/// Frame listener: each length-delimited frame is one message, acked per frame.
pub struct FrameListener {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl FrameListener {
    pub async fn bind(
        addr: &str,
        dispatcher: Arc<Dispatcher>,
        metrics: IngestMetrics,
        max_message_bytes: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("frame listener bound on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                dispatcher,
                metrics,
                max_message_bytes,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("frame listener shutting down");
                    break;
                }
                result = self.listener.accept() => match result {
                    Ok((stream, addr)) => {
                        let shared = self.shared.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            let peer = Uuid::new_v4();
                            if let Err(e) = serve_frames(stream, peer, &shared, cancel).await {
                                shared.metrics.errors_total.inc();
                                warn!("frame connection {} from {} failed: {}", peer, addr, e);
                            }
                        });
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                },
            }
        }
    }
}

#[instrument(skip(stream, shared, cancel), fields(peer = %peer))]
async fn serve_frames(
    stream: TcpStream,
    peer: Uuid,
    shared: &Shared,
    cancel: CancellationToken,
) -> Result<()> {
    debug!("frame peer connected");
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(shared.max_message_bytes)
        .new_codec();
    let mut framed = Framed::new(stream, codec);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = framed.next() => match frame {
                Some(frame) => frame?,
                None => break,
            },
        };

        // undecodable frames are dropped but still acknowledged
        if let Err(e) = shared.accept(&frame) {
            shared.metrics.errors_total.inc();
            warn!("dropping frame: {}", e);
        }
        framed.send(Bytes::from_static(ACK)).await?;
    }

    debug!("frame peer disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::client;
    use crate::dispatch::INGEST_LANE;

    fn dispatcher() -> (Arc<Dispatcher>, UnboundedReceiver<String>) {
        let mut dispatcher = Dispatcher::new();
        let receiver = dispatcher.add_lane(INGEST_LANE);
        (Arc::new(dispatcher), receiver)
    }

    #[tokio::test]
    async fn should_dispatch_trimmed_stream_message() {
        // given
        let (dispatcher, mut receiver) = dispatcher();
        let metrics = IngestMetrics::new();
        let listener = StreamListener::bind("127.0.0.1:0", dispatcher, metrics.clone(), 1024)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(listener.run(cancel.clone()));

        // when
        client::send_message(&addr.to_string(), "  1`abcd`{\"a\":1}\n")
            .await
            .unwrap();

        // then
        assert_eq!(receiver.recv().await.as_deref(), Some("1`abcd`{\"a\":1}"));
        assert_eq!(metrics.messages_total.get(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn should_trim_only_the_ends_of_a_multiline_stream_message() {
        // given
        let (dispatcher, mut receiver) = dispatcher();
        let metrics = IngestMetrics::new();
        let listener = StreamListener::bind("127.0.0.1:0", dispatcher, metrics.clone(), 1024)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(listener.run(cancel.clone()));

        // when
        client::send_message(&addr.to_string(), "\n1`abcd`first line\n  second line \n")
            .await
            .unwrap();

        // then
        assert_eq!(
            receiver.recv().await.as_deref(),
            Some("1`abcd`first line\n  second line")
        );
        cancel.cancel();
    }

    #[tokio::test]
    async fn should_drop_oversized_and_empty_stream_messages() {
        // given
        let (dispatcher, mut receiver) = dispatcher();
        let metrics = IngestMetrics::new();
        let listener = StreamListener::bind("127.0.0.1:0", dispatcher, metrics.clone(), 8)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let cancel = CancellationToken::new();
        tokio::spawn(listener.run(cancel.clone()));

        // when
        client::send_message(&addr, "   ").await.unwrap();
        // the server may reset the connection once it has seen too much
        let _ = client::send_message(&addr, "way more than eight bytes").await;
        client::send_message(&addr, "fits").await.unwrap();

        // then
        assert_eq!(receiver.recv().await.as_deref(), Some("fits"));
        assert_eq!(metrics.messages_total.get(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn should_ack_each_frame() {
        // given
        let (dispatcher, mut receiver) = dispatcher();
        let listener = FrameListener::bind("127.0.0.1:0", dispatcher, IngestMetrics::new(), 1024)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let cancel = CancellationToken::new();
        tokio::spawn(listener.run(cancel.clone()));

        // when
        let ack = client::send_frame(&addr, "2`wxyz`payload").await.unwrap();

        // then
        assert_eq!(ack, "ack");
        assert_eq!(receiver.recv().await.as_deref(), Some("2`wxyz`payload"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn should_ack_but_not_dispatch_empty_frame() {
        // given
        let (dispatcher, mut receiver) = dispatcher();
        let listener = FrameListener::bind("127.0.0.1:0", dispatcher, IngestMetrics::new(), 1024)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let cancel = CancellationToken::new();
        tokio::spawn(listener.run(cancel.clone()));

        // when
        let ack = client::send_frame(&addr, "").await.unwrap();

        // then
        assert_eq!(ack, "ack");
        assert!(receiver.try_recv().is_err());
        cancel.cancel();
    }
}
