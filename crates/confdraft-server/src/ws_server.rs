// WebSocket server: accepts clients and relays request frames to the
// application task, writing each reply back on the same connection.

use std::fmt::Display;

use futures_util::stream::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A new WebSocket client has connected.
    Connected { addr: String },
    /// A client has disconnected.
    Disconnected { addr: String },
    /// A text frame (raw JSON) from `addr`. The application answers on
    /// `reply` with the serialized reply frame.
    Message {
        addr: String,
        text: String,
        reply: oneshot::Sender<String>,
    },
}

/// Run the WebSocket server on the given port, forwarding events through `tx`.
///
/// Binds a TCP listener on `127.0.0.1:{port}`. Every accepted connection is
/// served on its own task, so clients proceed concurrently; their requests
/// still reach the single application task one at a time through `tx`.
/// Returns once the application side has dropped its receiver.
pub async fn run(port: u16, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");
    serve(listener, tx).await;
    Ok(())
}

/// Accept loop over an already bound listener. A failed accept is logged and
/// skipped so one bad connection attempt does not stop the server.
pub async fn serve(listener: TcpListener, tx: mpsc::Sender<WsEvent>) {
    while !tx.is_closed() {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept TCP connection: {e}");
                continue;
            }
        };
        tokio::spawn(serve_connection(stream, addr.to_string(), tx.clone()));
    }
}

async fn serve_connection(stream: TcpStream, addr: String, tx: mpsc::Sender<WsEvent>) {
    info!("Accepted TCP connection from {addr}");
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    if tx
        .send(WsEvent::Connected { addr: addr.clone() })
        .await
        .is_err()
    {
        return;
    }

    let (write, read) = ws_stream.split();
    if process_message_stream(read, write, &tx, &addr).await.is_err() {
        return;
    }

    let _ = tx.send(WsEvent::Disconnected { addr }).await;
}

/// Relay text frames from `stream` to the application and write each reply
/// to `sink` before reading the next frame. Returns `Err(())` if the
/// application channel is closed, signalling the caller to stop.
///
/// Generic over the stream and sink so it can be tested with in-memory
/// values without opening TCP ports.
pub async fn process_message_stream<St, Si>(
    mut stream: St,
    mut sink: Si,
    tx: &mpsc::Sender<WsEvent>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    Si: Sink<Message> + Unpin,
    <Si as Sink<Message>>::Error: Display,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let event = WsEvent::Message {
                    addr: addr.to_string(),
                    text: text.to_string(),
                    reply: reply_tx,
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
                let Ok(reply) = reply_rx.await else {
                    return Err(());
                };
                if let Err(e) = sink.send(Message::Text(reply.into())).await {
                    warn!("Failed to send reply to {addr}: {e}");
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}
