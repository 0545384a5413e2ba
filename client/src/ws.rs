//! WebSocket transport.
//!
//! Connects with tokio-tungstenite, then runs a socket task that decodes
//! binary frames into [`wire::ServerMessage`]s and forwards them over an
//! unbounded channel; outgoing [`wire::ClientMessage`]s travel the reverse
//! channel. The controller only ever sees the channel pair, so tests can
//! substitute an in-memory transport.
//!
//! An undecodable frame is a protocol error: the task reports it and closes
//! the socket rather than skipping the frame.

use std::sync::Arc;

use futures_channel::mpsc;
use futures_util::{SinkExt, StreamExt};
use http::uri::{Scheme, Uri};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use wire::{decode_server_message, encode_client_message, ClientMessage, Limits, ServerMessage};

use crate::error::Error;

/// The WebSocket subprotocol this client speaks.
pub const PROTOCOL: &str = "v1.tabsync.bin";

/// What the transport reports to the processing loop.
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded server message.
    Message(ServerMessage),
    /// The transport failed; no further events follow.
    Failed(Error),
    /// The server closed the connection; no further events follow.
    Closed,
}

/// Channel endpoints the controller drives.
pub(crate) struct Transport {
    pub outgoing: mpsc::UnboundedSender<ClientMessage>,
    pub incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn websocket_scheme(scheme: Option<&Scheme>) -> Result<&'static str, Error> {
    match scheme.map(Scheme::as_str) {
        None | Some("ws" | "http") => Ok("ws"),
        Some("wss" | "https") => Ok("wss"),
        Some(other) => Err(Error::UnsupportedScheme {
            scheme: other.into(),
        }),
    }
}

/// Builds the subscribe URI for a module: scheme mapped to ws(s), path
/// `/v1/database/{module}/subscribe`.
pub(crate) fn subscribe_uri(host: &Uri, module: &str) -> Result<Uri, Error> {
    let scheme = websocket_scheme(host.scheme())?;
    let authority = host
        .authority()
        .ok_or_else(|| Error::MissingConfig { field: "uri" })?;
    let mut path = host.path().trim_end_matches('/').to_owned();
    path.push_str("/v1/database/");
    path.push_str(module);
    path.push_str("/subscribe");

    let uri = format!("{scheme}://{authority}{path}");
    uri.parse().map_err(|source| Error::InvalidUri {
        uri: uri.into(),
        source: Arc::new(source),
    })
}

fn subscribe_request(
    host: &Uri,
    module: &str,
    token: Option<&str>,
) -> Result<http::Request<()>, Error> {
    let uri = subscribe_uri(host, module)?;
    let mut request = uri
        .clone()
        .into_client_request()
        .map_err(|source| Error::Connect {
            uri: uri.to_string().into(),
            source: Arc::new(source),
        })?;
    request.headers_mut().insert(
        http::header::SEC_WEBSOCKET_PROTOCOL,
        http::HeaderValue::from_static(PROTOCOL),
    );
    if let Some(token) = token {
        let bearer = format!("Bearer {token}");
        if let Ok(value) = http::HeaderValue::from_str(&bearer) {
            request.headers_mut().insert(http::header::AUTHORIZATION, value);
        } else {
            warn!("token contains bytes not valid in a header, sending anonymously");
        }
    }
    Ok(request)
}

/// Performs the WebSocket handshake and spawns the socket task.
pub(crate) async fn connect(
    host: &Uri,
    module: &str,
    token: Option<&str>,
    limits: Limits,
) -> Result<Transport, Error> {
    let request = subscribe_request(host, module, token)?;
    let uri = request.uri().to_string();
    let (socket, _response) = connect_async(request).await.map_err(|source| Error::Connect {
        uri: uri.clone().into(),
        source: Arc::new(source),
    })?;
    info!(%uri, "websocket connected");

    let (outgoing_tx, outgoing_rx) = mpsc::unbounded();
    let (incoming_tx, incoming_rx) = mpsc::unbounded();
    tokio::spawn(socket_task(socket, limits, incoming_tx, outgoing_rx));
    Ok(Transport {
        outgoing: outgoing_tx,
        incoming: incoming_rx,
    })
}

async fn socket_task(
    mut socket: Socket,
    limits: Limits,
    incoming: mpsc::UnboundedSender<TransportEvent>,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
) {
    loop {
        tokio::select! {
            frame = socket.next() => match frame {
                None => {
                    info!("server closed the connection");
                    let _ = incoming.unbounded_send(TransportEvent::Closed);
                    break;
                }
                Some(Err(source)) => {
                    let _ = incoming.unbounded_send(TransportEvent::Failed(Error::Transport {
                        source: Arc::new(source),
                    }));
                    break;
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    match decode_server_message(&bytes, &limits) {
                        Ok(msg) => {
                            let _ = incoming.unbounded_send(TransportEvent::Message(msg));
                        }
                        Err(source) => {
                            // Malformed traffic; tear the connection down.
                            let _ = incoming
                                .unbounded_send(TransportEvent::Failed(Error::Decode(source)));
                            let _ = socket.close(None).await;
                            break;
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) => {
                    info!("received close frame");
                    let _ = incoming.unbounded_send(TransportEvent::Closed);
                    break;
                }
                // Tungstenite answers pings itself; text frames are not part
                // of the protocol and are ignored.
                Some(Ok(other)) => debug!(?other, "ignoring non-binary frame"),
            },
            msg = outgoing.next() => match msg {
                None => {
                    // Controller dropped its sender: cooperative disconnect.
                    let _ = socket.close(None).await;
                    break;
                }
                Some(msg) => match encode_client_message(&msg) {
                    Ok(bytes) => {
                        if let Err(source) = socket.send(WsMessage::Binary(bytes)).await {
                            let _ = incoming.unbounded_send(TransportEvent::Failed(
                                Error::Transport { source: Arc::new(source) },
                            ));
                            break;
                        }
                    }
                    Err(source) => {
                        let _ = incoming
                            .unbounded_send(TransportEvent::Failed(Error::Encode(source)));
                        let _ = socket.close(None).await;
                        break;
                    }
                },
            },
        }
    }
}
