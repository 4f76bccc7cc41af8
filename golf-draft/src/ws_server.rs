// WebSocket server for draft clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::protocol::ClientId;

/// Outbound queue depth per client. A client that falls this far behind
/// starts losing messages.
pub const OUTBOUND_BUFFER: usize = 64;

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A client completed the handshake. Text sent on `outbound` is
    /// written to that client.
    Connected {
        client_id: ClientId,
        addr: String,
        outbound: mpsc::Sender<String>,
    },
    /// A text message was received from a client (raw JSON string).
    Message { client_id: ClientId, text: String },
    /// The client closed or its connection failed.
    Disconnected { client_id: ClientId },
}

/// Run the WebSocket server on `addr`, forwarding events through `tx`.
///
/// Each accepted connection is served on its own task, so any number of
/// clients may be connected at once. Runs until the listener fails or the
/// event receiver is dropped.
pub async fn run(addr: &str, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");
    serve(listener, tx).await
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let next_id = Arc::new(AtomicU64::new(1));

    loop {
        let (stream, addr) = listener.accept().await?;
        if tx.is_closed() {
            break;
        }
        let client_id = next_id.fetch_add(1, Ordering::Relaxed);
        info!("Accepted TCP connection from {addr} (client {client_id})");
        tokio::spawn(handle_connection(stream, addr.to_string(), client_id, tx.clone()));
    }

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    addr: String,
    client_id: ClientId,
    tx: mpsc::Sender<WsEvent>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (mut write, read) = ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    if tx
        .send(WsEvent::Connected {
            client_id,
            addr: addr.clone(),
            outbound,
        })
        .await
        .is_err()
    {
        return;
    }

    let writer_addr = addr.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                warn!("Failed to write to {writer_addr}: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });

    let _ = process_message_stream(read, &tx, client_id, &addr).await;
    writer.abort();

    let _ = tx.send(WsEvent::Disconnected { client_id }).await;
    debug!("Client {client_id} ({addr}) finished");
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx`. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
///
/// Generic over the stream type so it can be tested without opening TCP
/// ports.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    client_id: ClientId,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    client_id,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
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
