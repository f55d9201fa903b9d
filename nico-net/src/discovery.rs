//! LAN discovery: answer probes on the UDP discovery port, and scan the
//! local /24 for peers with a broadcast probe plus directed per-host probes.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use nico_core::protocol::DISCOVERY_PROBE;
use nico_core::{decode_discovery, encode_response, Discovery};

use crate::manager::NetContext;

const MAX_DATAGRAM: usize = 1024;

/// Answer probes and record responses until the shutdown signal arrives.
/// The reply frame is encoded once up front.
pub(crate) async fn run_responder(
    socket: Arc<UdpSocket>,
    ctx: Arc<NetContext>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let reply = match encode_response(&ctx.device_name) {
        Ok(r) => r,
        Err(e) => {
            warn!("cannot encode discovery response: {e}");
            return;
        }
    };
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((n, from)) => {
                        let text = String::from_utf8_lossy(&buf[..n]);
                        match decode_discovery(&text) {
                            Ok(Discovery::Probe) => {
                                debug!("probe from {from}");
                                if let Err(e) = socket.send_to(reply.as_bytes(), from).await {
                                    debug!("reply to {from} failed: {e}");
                                }
                            }
                            Ok(Discovery::Response { name }) => {
                                // A response here means we broadcast a probe
                                // from this socket during a scan.
                                let peer = SocketAddr::new(from.ip(), ctx.message_port);
                                ctx.record_peer(peer, &name);
                            }
                            Err(e) => debug!("ignoring datagram from {from}: {e}"),
                        }
                    }
                    Err(e) => {
                        warn!("discovery recv error: {e}");
                    }
                }
            }
            _ = shutdown.recv() => {
                debug!("discovery responder shutting down");
                break;
            }
        }
    }
}

/// One discovery cycle: clear the directory, then probe by broadcast and by
/// directed sweep concurrently. Broadcast replies come back to the responder
/// socket when the server is running; with the server stopped the broadcast
/// goes out on a throwaway socket and only the sweep collects peers.
pub(crate) async fn scan(
    ctx: Arc<NetContext>,
    responder: Option<Arc<UdpSocket>>,
    local_ip: IpAddr,
    discovery_port: u16,
    probe_timeout: Duration,
) {
    ctx.directory.clear();
    info!("discovery scan from {local_ip}, udp port {discovery_port}");
    let candidates = subnet_candidates(local_ip, discovery_port);
    tokio::join!(
        send_broadcast_probe(responder, discovery_port),
        sweep(ctx, candidates, probe_timeout),
    );
}

async fn send_broadcast_probe(responder: Option<Arc<UdpSocket>>, discovery_port: u16) {
    let target = SocketAddr::from(([255, 255, 255, 255], discovery_port));
    let result = match responder {
        Some(socket) => socket.send_to(DISCOVERY_PROBE.as_bytes(), target).await,
        None => one_shot_broadcast(target).await,
    };
    if let Err(e) = result {
        debug!("broadcast probe failed: {e}");
    }
}

async fn one_shot_broadcast(target: SocketAddr) -> std::io::Result<usize> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    socket.send_to(DISCOVERY_PROBE.as_bytes(), target).await
}

/// Directed-probe targets: every host suffix in the local /24 except our own
/// address. IPv4 only.
pub(crate) fn subnet_candidates(local_ip: IpAddr, discovery_port: u16) -> Vec<SocketAddr> {
    let IpAddr::V4(v4) = local_ip else {
        return Vec::new();
    };
    let [a, b, c, own] = v4.octets();
    (1..=254u8)
        .filter(|d| *d != own)
        .map(|d| SocketAddr::from(([a, b, c, d], discovery_port)))
        .collect()
}

/// Probe every candidate concurrently. A candidate that answers is recorded
/// at its message port; one that stays silent is simply absent.
pub(crate) async fn sweep(
    ctx: Arc<NetContext>,
    candidates: Vec<SocketAddr>,
    probe_timeout: Duration,
) {
    let mut probes = JoinSet::new();
    for target in candidates {
        probes.spawn(probe_candidate(target, probe_timeout));
    }
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((target, Some(name))) => {
                let peer = SocketAddr::new(target.ip(), ctx.message_port);
                ctx.record_peer(peer, &name);
            }
            Ok((_, None)) => {}
            Err(e) => debug!("probe task failed: {e}"),
        }
    }
}

/// Send one probe to `target` and wait for a response on the same socket.
/// The reply's source address may differ from `target` (responders bind the
/// wildcard address), so any valid response datagram counts.
async fn probe_candidate(
    target: SocketAddr,
    probe_timeout: Duration,
) -> (SocketAddr, Option<String>) {
    let name = tokio::time::timeout(probe_timeout, async {
        let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
        socket
            .send_to(DISCOVERY_PROBE.as_bytes(), target)
            .await
            .ok()?;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, _) = socket.recv_from(&mut buf).await.ok()?;
            let text = String::from_utf8_lossy(&buf[..n]);
            if let Ok(Discovery::Response { name }) = decode_discovery(&text) {
                return Some(name);
            }
        }
    })
    .await
    .ok()
    .flatten();
    (target, name)
}
