//! The manager handle hosts hold on to: server lifecycle, outbound sends,
//! discovery scans, event subscription.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use nico_core::{
    default_device_name, encode_message, now_ms, FrameEncodeError, Message, MessageStore,
    NotificationSink, PeerDirectory, PeerRecord,
};

use crate::config::Config;
use crate::discovery;
use crate::events::{EventDispatcher, NetworkEvent};
use crate::transport::{self, ConnectError};

#[derive(Debug, Error)]
pub enum NetError {
    #[error("port {port} unavailable: {source}")]
    PortUnavailable {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Encode(#[from] FrameEncodeError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// State shared between the manager handle and its spawned tasks.
pub(crate) struct NetContext {
    pub(crate) device_name: String,
    pub(crate) message_port: u16,
    pub(crate) directory: PeerDirectory,
    pub(crate) events: EventDispatcher,
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl NetContext {
    pub(crate) fn new(
        device_name: String,
        message_port: u16,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            device_name,
            message_port,
            directory: PeerDirectory::new(),
            events: EventDispatcher::new(),
            store,
            notifier,
        }
    }

    /// Inbound path: persist, notify, then publish. Runs once per decoded
    /// frame, so the store sees each inbound message exactly once.
    pub(crate) fn deliver_incoming(&self, msg: Message) {
        if let Err(e) = self.store.append(&msg) {
            warn!("failed to persist incoming message: {e}");
        }
        self.notifier.notify_message(&msg.sender, &msg.body);
        self.events.emit(NetworkEvent::MessageReceived {
            chat_name: msg.chat_name,
            sender: msg.sender,
            body: msg.body,
        });
    }

    pub(crate) fn record_peer(&self, addr: SocketAddr, name: &str) {
        self.directory.upsert(addr, name);
        debug!("peer '{name}' at {addr}");
        self.events.emit(NetworkEvent::DeviceDiscovered {
            addr,
            name: name.to_string(),
        });
    }
}

struct ServerState {
    shutdown_tx: broadcast::Sender<()>,
    listener_task: JoinHandle<()>,
    responder_task: JoinHandle<()>,
    responder_socket: Arc<UdpSocket>,
}

/// Notification sink that only logs. Real hosts plug in their own.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify_message(&self, sender: &str, body: &str) {
        info!("message from {sender}: {body}");
    }
}

pub struct NetworkManager {
    cfg: Config,
    local_ip: IpAddr,
    ctx: Arc<NetContext>,
    state: Mutex<Option<ServerState>>,
}

impl NetworkManager {
    /// Build a manager from config plus the two host collaborators. The local
    /// address is resolved once here; a changed network needs a new manager.
    pub fn new(
        cfg: Config,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let local_ip = cfg.local_ip.unwrap_or_else(|| {
            local_ip_address::local_ip().unwrap_or_else(|e| {
                warn!("cannot detect local address ({e}), using loopback");
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            })
        });
        // A configured name must survive the response frame; strip the
        // separator and newline rather than failing the responder later.
        let device_name = cfg
            .device_name
            .clone()
            .map(|n| n.replace(['|', '\n'], ""))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_device_name(local_ip));
        let ctx = Arc::new(NetContext::new(
            device_name,
            cfg.message_port,
            store,
            notifier,
        ));
        Self {
            cfg,
            local_ip,
            ctx,
            state: Mutex::new(None),
        }
    }

    /// Bind the message listener and the discovery responder and spawn their
    /// loops. Calling this while running is a no-op. If either port cannot be
    /// bound, nothing is left running.
    pub async fn start_server(&self) -> Result<(), NetError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            debug!("server already running");
            return Ok(());
        }

        let message_port = self.cfg.message_port;
        let listener = TcpListener::bind(("0.0.0.0", message_port))
            .await
            .map_err(|source| NetError::PortUnavailable {
                port: message_port,
                source,
            })?;

        let discovery_port = self.cfg.discovery_port;
        let socket = UdpSocket::bind(("0.0.0.0", discovery_port))
            .await
            .map_err(|source| NetError::PortUnavailable {
                port: discovery_port,
                source,
            })?;
        socket
            .set_broadcast(true)
            .map_err(|source| NetError::PortUnavailable {
                port: discovery_port,
                source,
            })?;
        let socket = Arc::new(socket);

        let (shutdown_tx, _) = broadcast::channel(1);
        let listener_task = tokio::spawn(transport::run_listener(
            listener,
            self.ctx.clone(),
            shutdown_tx.subscribe(),
        ));
        let responder_task = tokio::spawn(discovery::run_responder(
            socket.clone(),
            self.ctx.clone(),
            shutdown_tx.subscribe(),
        ));

        info!(
            "server started: tcp {message_port}, udp {discovery_port}, device '{}'",
            self.ctx.device_name
        );
        *state = Some(ServerState {
            shutdown_tx,
            listener_task,
            responder_task,
            responder_socket: socket,
        });
        Ok(())
    }

    /// Stop accepting inbound traffic and clear the peer table. Safe to call
    /// when never started, and safe to call twice.
    pub async fn stop_server(&self) {
        let mut state = self.state.lock().await;
        let Some(running) = state.take() else {
            debug!("server not running");
            return;
        };
        let _ = running.shutdown_tx.send(());
        let _ = running.listener_task.await;
        let _ = running.responder_task.await;
        self.ctx.directory.clear();
        info!("server stopped");
    }

    /// Encode and deliver one message to `addr`. What to persist is the
    /// caller's decision; a failure surfaces both as the returned error and
    /// as a `ConnectionStatus { connected: false }` event.
    pub async fn send(
        &self,
        addr: SocketAddr,
        chat_name: &str,
        sender: &str,
        body: &str,
    ) -> Result<(), NetError> {
        let msg = Message::outgoing(chat_name, sender, body, now_ms());
        let frame = encode_message(&msg)?;
        match transport::send_frame(addr, &frame, self.cfg.connect_timeout()).await {
            Ok(()) => {
                debug!("sent {} bytes to {addr}", frame.len());
                Ok(())
            }
            Err(e) => {
                warn!("send to {addr} failed: {e}");
                self.ctx
                    .events
                    .emit(NetworkEvent::ConnectionStatus { connected: false });
                Err(NetError::Connect(e))
            }
        }
    }

    /// Discover peers on the local /24. Previously known peers are cleared
    /// first; discoveries stream out as `DeviceDiscovered` events and
    /// accumulate in [`NetworkManager::known_peers`].
    pub async fn scan(&self) {
        let responder = self
            .state
            .lock()
            .await
            .as_ref()
            .map(|s| s.responder_socket.clone());
        discovery::scan(
            self.ctx.clone(),
            responder,
            self.local_ip,
            self.cfg.discovery_port,
            self.cfg.probe_timeout(),
        )
        .await;
    }

    /// Events for the current subscriber. Subscribing again ends the previous
    /// receiver's stream.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<NetworkEvent> {
        self.ctx.events.subscribe()
    }

    /// Snapshot of the peer table.
    pub fn known_peers(&self) -> Vec<PeerRecord> {
        self.ctx.directory.all()
    }

    pub fn local_address(&self) -> SocketAddr {
        SocketAddr::new(self.local_ip, self.cfg.message_port)
    }

    pub fn device_name(&self) -> &str {
        &self.ctx.device_name
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }
}
