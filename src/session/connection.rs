//! The persistent connection: handshake, pump task, and send handle.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::protocol::events::ServerEvent;
use crate::protocol::{decode_event, encode_intent, ClientIntent};
use crate::session::join::SessionCredentials;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const LOG_TARGET: &str = "session::connection";

/// The inbound feed: decoded events plus lifecycle signals. `Opened`,
/// `Error`, and `Closed` each arrive at most once per connection.
#[derive(Debug)]
pub enum SessionEvent {
    Opened,
    Event(ServerEvent),
    Error(TransportError),
    Closed { reason: Option<String> },
}

/// Send half of one live connection. Cloneable; closing any clone stops the
/// pump for all of them.
#[derive(Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::Sender<ClientIntent>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub async fn send(&self, intent: ClientIntent) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::SendClosed);
        }
        self.outbound
            .send(intent)
            .await
            .map_err(|_| TransportError::SendClosed)
    }

    /// Stops the pump synchronously; no intent can be sent afterwards.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn test_pair(capacity: usize) -> (Self, mpsc::Receiver<ClientIntent>) {
        let (outbound, rx) = mpsc::channel(capacity);
        (
            Self {
                outbound,
                cancel: CancellationToken::new(),
            },
            rx,
        )
    }
}

pub(crate) struct ActiveConnection {
    pub handle: ConnectionHandle,
    pub task: JoinHandle<()>,
}

/// Performs the handshake and spawns the pump. The caller receives the
/// inbound feed and an [`ActiveConnection`] it must keep to close and join
/// the pump later.
pub(crate) async fn open(
    config: &ClientConfig,
    room_id: &str,
    credentials: &SessionCredentials,
) -> Result<(mpsc::Receiver<SessionEvent>, ActiveConnection), TransportError> {
    let url = ws_url(&config.ws_base, room_id, credentials)?;
    info!(target = LOG_TARGET, room_id, "opening websocket");

    let connecting = connect_async(url.as_str());
    let (stream, _) = timeout(config.handshake_timeout, connecting)
        .await
        .map_err(|_| TransportError::HandshakeTimeout(config.handshake_timeout))?
        .map_err(|err| TransportError::Handshake(err.to_string()))?;

    let (events_tx, events_rx) = mpsc::channel(config.inbound_capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(pump(stream, events_tx, outbound_rx, cancel.clone()));

    Ok((
        events_rx,
        ActiveConnection {
            handle: ConnectionHandle {
                outbound: outbound_tx,
                cancel,
            },
            task,
        },
    ))
}

fn ws_url(
    base: &Url,
    room_id: &str,
    credentials: &SessionCredentials,
) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::Handshake("ws base url cannot carry a path".to_string()))?
        .extend(["ws", room_id, &credentials.player_id]);
    url.query_pairs_mut()
        .append_pair("token", &credentials.token);
    Ok(url)
}

/// One task owns the socket for its whole life: outbound intents, inbound
/// frames, pings, and the close handshake all pass through here in order.
async fn pump(
    stream: WsStream,
    events: mpsc::Sender<SessionEvent>,
    mut outbound: mpsc::Receiver<ClientIntent>,
    cancel: CancellationToken,
) {
    let (mut sink, mut source) = stream.split();
    let _ = events.send(SessionEvent::Opened).await;

    let mut close_reason: Option<String> = None;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target = LOG_TARGET, "connection cancelled");
                break;
            }
            maybe_intent = outbound.recv() => match maybe_intent {
                Some(intent) => match encode_intent(&intent) {
                    Ok(text) => {
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            let _ = events
                                .send(SessionEvent::Error(TransportError::Socket(err.to_string())))
                                .await;
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(target = LOG_TARGET, error = %err, "intent failed to encode; dropped");
                    }
                },
                // every send handle is gone
                None => break,
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => match decode_event(&text) {
                    Ok(event) => {
                        if events.send(SessionEvent::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = events
                            .send(SessionEvent::Error(TransportError::Frame(err)))
                            .await;
                        break;
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    sink.send(Message::Pong(payload)).await.ok();
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(target = LOG_TARGET, ?frame, "socket closed by server");
                    close_reason = frame.map(|f| f.reason.to_string());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = events
                        .send(SessionEvent::Error(TransportError::Socket(err.to_string())))
                        .await;
                    break;
                }
                None => break,
            }
        }
    }

    let _ = sink.close().await;
    let _ = events
        .send(SessionEvent::Closed {
            reason: close_reason,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_carries_room_player_and_token() {
        let base = Url::parse("ws://127.0.0.1:8000").unwrap();
        let credentials = SessionCredentials {
            player_id: "p-1".to_string(),
            token: "tok".to_string(),
        };
        let url = ws_url(&base, "room-9", &credentials).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/room-9/p-1?token=tok");
    }

    #[tokio::test]
    async fn closed_handles_refuse_to_send() {
        let (handle, _rx) = ConnectionHandle::test_pair(4);
        handle.close();
        let result = handle.send(ClientIntent::ReadyToggle).await;
        assert!(matches!(result, Err(TransportError::SendClosed)));
    }
}
