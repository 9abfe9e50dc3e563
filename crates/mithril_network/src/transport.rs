use anyhow::{bail, Context};
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// The two wire carriers: TLS TCP speaking the framing directly, and
/// WebSocket carrying the same frames inside binary messages.
pub(crate) enum Transport {
    Tls(TlsStream<TcpStream>),
    Ws(WebSocketStream<TcpStream>),
}

impl Transport {
    pub(crate) fn tls(stream: TlsStream<TcpStream>) -> Self {
        Self::Tls(stream)
    }

    /// Upgrades a plain TCP stream, requiring the `"binary"` subprotocol.
    pub(crate) async fn websocket(stream: TcpStream) -> anyhow::Result<Self> {
        let ws = tokio_tungstenite::accept_hdr_async(stream, require_binary_subprotocol)
            .await
            .context("websocket upgrade")?;
        Ok(Self::Ws(ws))
    }

    /// Reads more bytes into `buf`. Returns the number of bytes added; zero
    /// means a clean remote close.
    pub(crate) async fn read_buf(&mut self, buf: &mut BytesMut) -> anyhow::Result<usize> {
        match self {
            Self::Tls(stream) => Ok(stream.read_buf(buf).await?),
            Self::Ws(stream) => loop {
                match stream.next().await {
                    Some(Ok(Message::Binary(bytes))) => {
                        buf.extend_from_slice(&bytes);
                        return Ok(bytes.len());
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => return Ok(0),
                    Some(Ok(Message::Text(_))) => bail!("text message on a binary websocket"),
                    Some(Err(e)) => return Err(e.into()),
                }
            },
        }
    }

    pub(crate) async fn write_all(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        match self {
            Self::Tls(stream) => {
                stream.write_all(bytes).await?;
                stream.flush().await?;
            }
            Self::Ws(stream) => {
                stream.send(Message::Binary(bytes.to_vec())).await?;
            }
        }
        Ok(())
    }
}

fn require_binary_subprotocol(
    request: &Request,
    mut response: Response,
) -> Result<Response, ErrorResponse> {
    let offered = request
        .headers()
        .get("Sec-WebSocket-Protocol")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|p| p.trim() == "binary"))
        .unwrap_or(false);

    if !offered {
        return Err(ErrorResponse::new(Some(
            "subprotocol \"binary\" required".to_owned(),
        )));
    }

    response
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", "binary".parse().expect("static header"));
    Ok(response)
}
