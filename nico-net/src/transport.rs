//! Message transport: TCP listener for inbound frames, one-shot outbound
//! sender. Every outbound message opens its own short-lived connection; no
//! connection state is kept between sends.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use nico_core::decode_message;

use crate::manager::NetContext;

/// Why an outbound send did not reach the peer.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {addr} timed out after {timeout_ms} ms")]
    Timeout { addr: SocketAddr, timeout_ms: u64 },
    #[error("connection refused by {addr}")]
    Refused { addr: SocketAddr },
    #[error("{addr} unreachable: {source}")]
    Unreachable {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

fn classify(addr: SocketAddr, err: io::Error, timeout: Duration) -> ConnectError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ConnectError::Refused { addr },
        io::ErrorKind::TimedOut => ConnectError::Timeout {
            addr,
            timeout_ms: timeout.as_millis() as u64,
        },
        _ => ConnectError::Unreachable { addr, source: err },
    }
}

/// Accept inbound connections until the shutdown signal arrives. Each
/// connection gets its own task; a bad frame closes that connection only.
pub(crate) async fn run_listener(
    listener: TcpListener,
    ctx: Arc<NetContext>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer_addr, ctx).await;
                        });
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                    }
                }
            }
            _ = shutdown.recv() => {
                debug!("message listener shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: Arc<NetContext>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match decode_message(&line) {
                Ok(msg) => ctx.deliver_incoming(msg),
                Err(e) => {
                    warn!("bad frame from {peer_addr}: {e}");
                    break;
                }
            },
            Ok(None) => break,
            Err(e) => {
                debug!("read error from {peer_addr}: {e}");
                break;
            }
        }
    }
}

/// Open a connection to `addr`, write one already-encoded frame, close.
/// Nothing is read back.
pub(crate) async fn send_frame(
    addr: SocketAddr,
    frame: &str,
    connect_timeout: Duration,
) -> Result<(), ConnectError> {
    let mut stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => return Err(classify(addr, e, connect_timeout)),
        Err(_) => {
            return Err(ConnectError::Timeout {
                addr,
                timeout_ms: connect_timeout.as_millis() as u64,
            })
        }
    };
    stream
        .write_all(frame.as_bytes())
        .await
        .map_err(|e| classify(addr, e, connect_timeout))?;
    stream
        .shutdown()
        .await
        .map_err(|e| classify(addr, e, connect_timeout))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use tokio::time::timeout;

    use nico_core::{encode_message, Direction, MemoryStore, Message, NotificationSink};

    use crate::events::NetworkEvent;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn seen(&self) -> Vec<(String, String)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl NotificationSink for RecordingSink {
        fn notify_message(&self, sender: &str, body: &str) {
            self.seen
                .lock()
                .unwrap()
                .push((sender.to_string(), body.to_string()));
        }
    }

    fn test_ctx() -> (Arc<NetContext>, Arc<MemoryStore>, Arc<RecordingSink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let ctx = Arc::new(NetContext::new(
            "test-device".to_string(),
            0,
            store.clone(),
            sink.clone(),
        ));
        (ctx, store, sink)
    }

    async fn spawn_listener(
        ctx: Arc<NetContext>,
    ) -> (SocketAddr, broadcast::Sender<()>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_listener(listener, ctx, shutdown_rx));
        (addr, shutdown_tx, task)
    }

    #[tokio::test]
    async fn listener_delivers_inbound_frame() {
        let (ctx, store, sink) = test_ctx();
        let mut events = ctx.events.subscribe();
        let (addr, shutdown_tx, task) = spawn_listener(ctx).await;

        let msg = Message::outgoing("general", "alice", "hello", 7);
        let frame = encode_message(&msg).unwrap();
        send_frame(addr, &frame, Duration::from_secs(1)).await.unwrap();

        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            NetworkEvent::MessageReceived {
                chat_name: "general".into(),
                sender: "alice".into(),
                body: "hello".into(),
            }
        );
        let stored = store.all_messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].direction, Direction::Incoming);
        assert_eq!(stored[0].body, "hello");
        assert_eq!(sink.seen(), vec![("alice".to_string(), "hello".to_string())]);

        let _ = shutdown_tx.send(());
        let _ = task.await;
    }

    #[tokio::test]
    async fn bad_frame_closes_one_connection_only() {
        let (ctx, store, _sink) = test_ctx();
        let mut events = ctx.events.subscribe();
        let (addr, shutdown_tx, task) = spawn_listener(ctx).await;

        send_frame(addr, "definitely not a frame\n", Duration::from_secs(1))
            .await
            .unwrap();
        let msg = Message::outgoing("general", "bob", "still alive", 9);
        send_frame(addr, &encode_message(&msg).unwrap(), Duration::from_secs(1))
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(
            matches!(event, NetworkEvent::MessageReceived { ref sender, .. } if sender == "bob")
        );
        assert_eq!(store.all_messages().len(), 1);

        let _ = shutdown_tx.send(());
        let _ = task.await;
    }

    #[tokio::test]
    async fn reads_multiple_frames_per_connection() {
        let (ctx, store, _sink) = test_ctx();
        let mut events = ctx.events.subscribe();
        let (addr, shutdown_tx, task) = spawn_listener(ctx).await;

        let one = encode_message(&Message::outgoing("a", "s", "first", 1)).unwrap();
        let two = encode_message(&Message::outgoing("a", "s", "second", 2)).unwrap();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(one.as_bytes()).await.unwrap();
        stream.write_all(two.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();

        for expected in ["first", "second"] {
            let event = timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(
                matches!(event, NetworkEvent::MessageReceived { ref body, .. } if body == expected)
            );
        }
        assert_eq!(store.all_messages().len(), 2);

        let _ = shutdown_tx.send(());
        let _ = task.await;
    }

    #[tokio::test]
    async fn send_to_closed_port_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = send_frame(addr, "x\n", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Refused { .. }));
    }

    #[tokio::test]
    async fn shutdown_stops_acceptance() {
        let (ctx, _store, _sink) = test_ctx();
        let (addr, shutdown_tx, task) = spawn_listener(ctx).await;

        let _ = shutdown_tx.send(());
        task.await.unwrap();

        assert!(send_frame(addr, "x\n", Duration::from_millis(500))
            .await
            .is_err());
    }
}
