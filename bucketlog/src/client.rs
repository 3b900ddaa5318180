//! Client side of both inbound transports.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::{Error, Result};

/// Sends one message over the byte-stream transport.
///
/// The write side is shut down afterwards so the server sees EOF.
pub async fn send_message(addr: &str, message: &str) -> Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(message.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Sends one frame over the frame transport and waits for the reply.
pub async fn send_frame(addr: &str, message: &str) -> Result<String> {
    let stream = TcpStream::connect(addr).await?;
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    framed
        .send(Bytes::copy_from_slice(message.as_bytes()))
        .await?;

    let reply = framed
        .next()
        .await
        .ok_or_else(|| Error::Transport("connection closed before ack".to_string()))??;
    Ok(String::from_utf8(reply.to_vec())?)
}
