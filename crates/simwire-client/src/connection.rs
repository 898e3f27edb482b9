//! Connection manager.
//!
//! Owns the websocket lifecycle, the capability handshake, and the status
//! state machine. One connection per client instance; connecting again tears
//! the previous one down first.
//!
//! All inbound traffic is processed by a single spawned task: one frame is
//! decoded and its handler has returned before the next receive is polled,
//! which is what lets handlers mutate shared state (the entity table) safely.
//! Explicit disconnects and server-initiated closes converge on the same
//! teardown path inside that task.

use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use simwire_core::ConnectionStatus;
use simwire_schema::{DynMessage, SchemaRegistry};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, warn};

use crate::errors::{ClientError, ConnectionFailure};
use crate::frame::{self, Frame};
use crate::topic::{Subscription, SubscriptionTable, TopicInfo};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Reserved control topics, handled here rather than by the subscription table.
const TOPIC_TOPIC_TYPES: &str = "topics-types";
const TOPIC_TOPICS: &str = "topics";
const TOPIC_WORLDS: &str = "worlds";
const TOPIC_SCENE: &str = "scene";

/// The telemetry connection to one running simulation.
///
/// Status is exposed as a replayable stream: [`status`](Self::status)
/// receivers always observe the current value, and transitions follow
/// `Disconnected → Connected → Ready`, with `Error` reachable from any state
/// and always followed by `Disconnected`.
pub struct TelemetryClient {
    status_tx: watch::Sender<ConnectionStatus>,
    scene_tx: watch::Sender<Option<Arc<DynMessage>>>,
    shared: Arc<Shared>,
    conn: Mutex<Option<ActiveConnection>>,
}

/// State shared between API calls and the connection task.
#[derive(Default)]
struct Shared {
    subscriptions: Mutex<SubscriptionTable>,
    available: RwLock<Vec<TopicInfo>>,
    world: RwLock<Option<String>>,
    last_failure: RwLock<Option<ConnectionFailure>>,
}

struct ActiveConnection {
    outbound: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

enum Command {
    Send(String),
    Shutdown,
}

impl TelemetryClient {
    /// Create a client with no connection. Status starts `Disconnected`.
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (scene_tx, _) = watch::channel(None);
        Self {
            status_tx,
            scene_tx,
            shared: Arc::new(Shared::default()),
            conn: Mutex::new(None),
        }
    }

    /// Connect to a simulation websocket and begin the handshake.
    ///
    /// Tears down any prior connection first. Returns once the socket is
    /// established; the handshake continues on the connection task and is
    /// observable via [`status`](Self::status). A dial failure emits
    /// `Error` then `Disconnected` and is returned as
    /// [`ClientError::Transport`].
    pub async fn connect(&self, url: &str, auth_key: Option<&str>) -> Result<(), ClientError> {
        self.disconnect().await;
        *self.shared.last_failure.write() = None;

        let ws = match connect_async(url).await {
            Ok((ws, _response)) => ws,
            Err(err) => {
                error!(url, error = %err, "websocket dial failed");
                *self.shared.last_failure.write() = Some(ConnectionFailure::Transport);
                set_status(&self.status_tx, ConnectionStatus::Error);
                set_status(&self.status_tx, ConnectionStatus::Disconnected);
                return Err(ClientError::Transport {
                    url: url.to_owned(),
                    reason: err.to_string(),
                });
            }
        };
        debug!(url, "websocket connected, starting handshake");

        let (outbound, commands) = mpsc::unbounded_channel();
        let task = ConnectionTask {
            ws,
            registry: None,
            status_tx: self.status_tx.clone(),
            scene_tx: self.scene_tx.clone(),
            shared: Arc::clone(&self.shared),
        };
        let handle = tokio::spawn(task.run(auth_key.map(str::to_owned), commands));
        *self.conn.lock() = Some(ActiveConnection {
            outbound,
            task: handle,
        });
        Ok(())
    }

    /// Close the connection, if any. A no-op when already disconnected.
    ///
    /// Cleanup (subscription table, catalogue, schema registry, terminal
    /// status, scene-info reset) runs on the connection task's close path,
    /// which explicit and server-initiated closes share.
    pub async fn disconnect(&self) {
        let active = self.conn.lock().take();
        if let Some(active) = active {
            let _ = active.outbound.send(Command::Shutdown);
            let _ = active.task.await;
        }
    }

    /// Subscribe a handler to a topic.
    ///
    /// Re-subscribing the same topic replaces the prior handler. The `sub`
    /// message goes out immediately whatever the handshake state — the
    /// server buffers or ignores until it is ready. With no connection at
    /// all, the handler is still recorded and only the wire send is skipped.
    pub fn subscribe(&self, subscription: Subscription) {
        let topic = subscription.topic().to_owned();
        let throttle = subscription.throttle_hz();
        let _ = self.shared.subscriptions.lock().insert(subscription);
        self.send_request(frame::encode_request("sub", &topic, "", ""));
        if let Some(hz) = throttle {
            self.send_request(frame::encode_request("throttle", &topic, "", &hz.to_string()));
        }
    }

    /// Remove a topic's handler, returning whether one was registered.
    ///
    /// Removal completes locally regardless of the `unsub` message's fate;
    /// the handler's unsubscribe hook runs after removal.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        let removed = self.shared.subscriptions.lock().remove(topic);
        let Some(entry) = removed else {
            return false;
        };
        self.send_request(frame::encode_request("unsub", topic, "", ""));
        let mut handler = entry.into_handler();
        handler.on_unsubscribe();
        true
    }

    /// The replayable connection status stream.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// The scene-info stream: the most recent snapshot, `None` after teardown.
    pub fn scene_info(&self) -> watch::Receiver<Option<Arc<DynMessage>>> {
        self.scene_tx.subscribe()
    }

    /// The simulation's world name, learned during the handshake.
    pub fn world(&self) -> Option<String> {
        self.shared.world.read().clone()
    }

    /// The topic catalogue advertised by the server. Not the subscription table.
    pub fn available_topics(&self) -> Vec<TopicInfo> {
        self.shared.available.read().clone()
    }

    /// Names of the currently subscribed topics.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.shared.subscriptions.lock().names()
    }

    /// Classification of the most recent connection failure, for UI prompts.
    pub fn last_failure(&self) -> Option<ConnectionFailure> {
        *self.shared.last_failure.read()
    }

    fn send_request(&self, text: String) {
        let guard = self.conn.lock();
        match guard.as_ref() {
            Some(active) => {
                let _ = active.outbound.send(Command::Send(text));
            }
            None => debug!("no active connection; request not sent"),
        }
    }
}

impl Default for TelemetryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        // No awaiting in drop; stop the read loop outright.
        if let Some(active) = self.conn.lock().take() {
            active.task.abort();
        }
    }
}

/// Emit a status transition, suppressing duplicates.
fn set_status(tx: &watch::Sender<ConnectionStatus>, status: ConnectionStatus) {
    let _ = tx.send_if_modified(|current| {
        if *current == status {
            false
        } else {
            *current = status;
            true
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection task
// ─────────────────────────────────────────────────────────────────────────────

struct ConnectionTask {
    ws: WsStream,
    registry: Option<SchemaRegistry>,
    status_tx: watch::Sender<ConnectionStatus>,
    scene_tx: watch::Sender<Option<Arc<DynMessage>>>,
    shared: Arc<Shared>,
}

impl ConnectionTask {
    async fn run(mut self, auth_key: Option<String>, mut commands: mpsc::UnboundedReceiver<Command>) {
        // Socket is open: authorize if a key was supplied, otherwise go
        // straight to requesting the schema document.
        let opening = match &auth_key {
            Some(key) => frame::encode_request("auth", "", "", key),
            None => frame::encode_request("protos", "", "", ""),
        };
        if let Err(err) = self.send(opening).await {
            self.fail(ConnectionFailure::Transport, &err.to_string());
            self.shutdown().await;
            return;
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Send(text)) => {
                        if let Err(err) = self.send(text).await {
                            self.fail(ConnectionFailure::Transport, &err.to_string());
                            break;
                        }
                    }
                    Some(Command::Shutdown) | None => {
                        debug!("disconnect requested");
                        break;
                    }
                },
                inbound = self.ws.next() => match inbound {
                    Some(Ok(Message::Binary(data))) => {
                        if self.handle_unit(data).await.is_break() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        let data = Bytes::copy_from_slice(text.as_bytes());
                        if self.handle_unit(data).await.is_break() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("connection closed by server");
                        break;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Err(err)) => {
                        self.fail(ConnectionFailure::Transport, &err.to_string());
                        break;
                    }
                },
            }
        }

        self.shutdown().await;
    }

    /// Process one inbound unit, strictly before the next one is read.
    async fn handle_unit(&mut self, data: Bytes) -> ControlFlow<()> {
        if self.registry.is_some() {
            self.handle_frame(data).await
        } else {
            self.handle_handshake(data).await
        }
    }

    /// Control-plane replies before the schema registry exists are text:
    /// `authorized`, `invalid`, or the schema document itself.
    async fn handle_handshake(&mut self, data: Bytes) -> ControlFlow<()> {
        let text = String::from_utf8_lossy(&data).into_owned();
        match text.as_str() {
            "authorized" => {
                if let Err(err) = self.send(frame::encode_request("protos", "", "", "")).await {
                    self.fail(ConnectionFailure::Transport, &err.to_string());
                    return ControlFlow::Break(());
                }
            }
            "invalid" => {
                self.fail(ConnectionFailure::Unauthorized, "authorization key rejected");
                return ControlFlow::Break(());
            }
            _ => match SchemaRegistry::build(&text) {
                Ok(registry) => {
                    self.registry = Some(registry);
                    // Request the topic catalogue and the world listing; the
                    // world reply drives the scene snapshot request.
                    if let Err(err) = self
                        .send(frame::encode_request("topics-types", "", "", ""))
                        .await
                    {
                        self.fail(ConnectionFailure::Transport, &err.to_string());
                        return ControlFlow::Break(());
                    }
                    if let Err(err) = self.send(frame::encode_request("worlds", "", "", "")).await {
                        self.fail(ConnectionFailure::Transport, &err.to_string());
                        return ControlFlow::Break(());
                    }
                    set_status(&self.status_tx, ConnectionStatus::Connected);
                }
                Err(err) => {
                    self.fail(
                        ConnectionFailure::Transport,
                        &format!("schema document failed to parse: {err}"),
                    );
                    return ControlFlow::Break(());
                }
            },
        }
        ControlFlow::Continue(())
    }

    /// Post-handshake units: four-part framed binary, decoded through the
    /// registry, then routed by topic. Decode problems drop the one frame.
    async fn handle_frame(&mut self, data: Bytes) -> ControlFlow<()> {
        let frame = match Frame::parse(&data) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                return ControlFlow::Continue(());
            }
        };
        let Some(registry) = self.registry.as_ref() else {
            return ControlFlow::Continue(());
        };
        let msg = match registry.decode(&frame.type_name, &frame.payload) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(
                    topic = %frame.topic,
                    type_name = %frame.type_name,
                    error = %err,
                    "dropping undecodable frame"
                );
                return ControlFlow::Continue(());
            }
        };

        match frame.topic.as_str() {
            TOPIC_TOPIC_TYPES => {
                let mut available = self.shared.available.write();
                for publisher in msg.list("publisher").iter().filter_map(|v| v.as_message()) {
                    let Some(name) = publisher.get_str("topic") else {
                        continue;
                    };
                    available.push(TopicInfo {
                        name: name.to_owned(),
                        msg_type: publisher.get_str("msg_type").map(str::to_owned),
                    });
                }
            }
            TOPIC_TOPICS => {
                *self.shared.available.write() = msg
                    .list("data")
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|name| TopicInfo {
                        name: name.to_owned(),
                        msg_type: None,
                    })
                    .collect();
            }
            TOPIC_WORLDS => {
                let Some(world) = msg.list("data").first().and_then(|v| v.as_str()) else {
                    warn!("world listing carried no names");
                    return ControlFlow::Continue(());
                };
                let world = world.to_owned();
                debug!(world = %world, "world name learned, requesting scene");
                *self.shared.world.write() = Some(world.clone());
                if let Err(err) = self.send(frame::encode_request("scene", &world, "", "")).await {
                    self.fail(ConnectionFailure::Transport, &err.to_string());
                    return ControlFlow::Break(());
                }
            }
            TOPIC_SCENE => {
                let _ = self.scene_tx.send_replace(Some(Arc::new(msg)));
                // The handshake is complete only now.
                set_status(&self.status_tx, ConnectionStatus::Ready);
            }
            topic => {
                // A miss is expected: the server broadcasts on topics nobody
                // is watching. Not logged.
                let _ = self.shared.subscriptions.lock().dispatch(topic, &msg);
            }
        }
        ControlFlow::Continue(())
    }

    async fn send(&mut self, text: String) -> Result<(), WsError> {
        self.ws.send(Message::Text(text.into())).await
    }

    fn fail(&self, failure: ConnectionFailure, context: &str) {
        error!(?failure, context, "connection failure");
        *self.shared.last_failure.write() = Some(failure);
        set_status(&self.status_tx, ConnectionStatus::Error);
    }

    /// The one teardown path. Runs for explicit disconnects, server closes,
    /// and transport errors alike.
    async fn shutdown(mut self) {
        let _ = self.ws.close(None).await;
        self.registry = None;
        self.shared.subscriptions.lock().clear();
        self.shared.available.write().clear();
        *self.shared.world.write() = None;
        let _ = self.scene_tx.send_if_modified(|scene| scene.take().is_some());
        set_status(&self.status_tx, ConnectionStatus::Disconnected);
        debug!("connection torn down");
    }
}

#[cfg(test)]
mod tests {
    use crate::topic::handler_fn;

    use super::*;

    #[test]
    fn new_client_starts_disconnected() {
        let client = TelemetryClient::new();
        assert_eq!(*client.status().borrow(), ConnectionStatus::Disconnected);
        assert!(client.scene_info().borrow().is_none());
        assert!(client.world().is_none());
        assert!(client.available_topics().is_empty());
        assert!(client.last_failure().is_none());
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_noop() {
        let client = TelemetryClient::new();
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(*client.status().borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn connect_to_unreachable_url_is_transport_error() {
        let client = TelemetryClient::new();
        let result = client.connect("ws://127.0.0.1:1/ws", None).await;
        assert!(matches!(result, Err(ClientError::Transport { .. })));
        assert_eq!(*client.status().borrow(), ConnectionStatus::Disconnected);
        assert_eq!(client.last_failure(), Some(ConnectionFailure::Transport));
    }

    #[test]
    fn subscribe_without_connection_records_handler() {
        let client = TelemetryClient::new();
        client.subscribe(Subscription::new("/clock", handler_fn(|_| {})));
        assert_eq!(client.subscribed_topics(), ["/clock"]);
        assert!(client.unsubscribe("/clock"));
        assert!(!client.unsubscribe("/clock"));
    }

    #[test]
    fn set_status_suppresses_duplicates() {
        let (tx, mut rx) = watch::channel(ConnectionStatus::Disconnected);
        assert!(!rx.has_changed().unwrap());
        set_status(&tx, ConnectionStatus::Disconnected);
        assert!(!rx.has_changed().unwrap());
        set_status(&tx, ConnectionStatus::Connected);
        assert!(rx.has_changed().unwrap());
    }
}
