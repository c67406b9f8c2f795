//! Capture sources.
//!
//! A [`Receiver`] feeds a shared [`PoseStore`]. The only implementation today
//! is [`VmcReceiver`], a UDP listener for the VMC protocol.

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder;
use crate::error::ReceiverError;
use crate::pose::PoseStore;

/// Largest datagram the listener will read; VMC senders stay well under this
const MAX_DATAGRAM: usize = 65_536;

/// A pluggable capture source writing into a shared pose store.
///
/// `start` on a running receiver and `stop` on a stopped one are no-ops.
/// `stop` returns only after the receiver's network resources are released.
#[async_trait::async_trait]
pub trait Receiver: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), ReceiverError>;

    async fn stop(&self) -> Result<(), ReceiverError>;

    fn is_running(&self) -> bool;

    /// Bound address while running
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// The store this receiver merges into (shared, not owned)
    fn pose_store(&self) -> &Arc<PoseStore>;

    /// Counters for diagnostics
    fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::default()
    }
}

/// Ingest counters for one receiver
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    applied: AtomicU64,
    decode_errors: AtomicU64,
    ignored: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub datagrams: u64,
    pub applied: u64,
    pub decode_errors: u64,
    pub ignored: u64,
}

impl ReceiverStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }

    fn record(&self, applied: usize, ignored: usize, errors: usize) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        self.applied.fetch_add(applied as u64, Ordering::Relaxed);
        self.ignored.fetch_add(ignored as u64, Ordering::Relaxed);
        self.decode_errors.fetch_add(errors as u64, Ordering::Relaxed);
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Listens for VMC datagrams and merges them into the pose store
pub struct VmcReceiver {
    name: String,
    addr: SocketAddr,
    store: Arc<PoseStore>,
    stats: Arc<ReceiverStats>,
    running: Mutex<Option<Running>>,
    /// Mirrors `running` for the synchronous accessors
    bound: Arc<StdMutex<Option<SocketAddr>>>,
}

impl VmcReceiver {
    pub fn new(addr: SocketAddr, store: Arc<PoseStore>) -> Self {
        Self::named("vmc", addr, store)
    }

    pub fn named(name: impl Into<String>, addr: SocketAddr, store: Arc<PoseStore>) -> Self {
        Self {
            name: name.into(),
            addr,
            store,
            stats: Arc::new(ReceiverStats::default()),
            running: Mutex::new(None),
            bound: Arc::new(StdMutex::new(None)),
        }
    }

    /// Configured listen address (may be port 0)
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn set_bound(&self, addr: Option<SocketAddr>) {
        set_bound(&self.bound, addr);
    }
}

fn set_bound(bound: &StdMutex<Option<SocketAddr>>, addr: Option<SocketAddr>) {
    match bound.lock() {
        Ok(mut guard) => *guard = addr,
        Err(poisoned) => *poisoned.into_inner() = addr,
    }
}

#[async_trait::async_trait]
impl Receiver for VmcReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), ReceiverError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.task.is_finished() {
                debug!(receiver = %self.name, "Already running");
                return Ok(());
            }
            // Listener died on a socket error; reap it before rebinding
            if let Some(dead) = running.take() {
                let _ = dead.task.await;
            }
        }

        let socket = UdpSocket::bind(self.addr)
            .await
            .map_err(|source| ReceiverError::Bind {
                addr: self.addr,
                source,
            })?;
        let local = socket.local_addr()?;

        // Published before the listener runs so its exit path has the last word
        self.set_bound(Some(local));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listen(
            socket,
            self.name.clone(),
            self.store.clone(),
            self.stats.clone(),
            self.bound.clone(),
            cancel.clone(),
        ));

        *running = Some(Running { cancel, task });
        info!(receiver = %self.name, "Listening for VMC on {}", local);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ReceiverError> {
        let Some(current) = self.running.lock().await.take() else {
            return Ok(());
        };

        current.cancel.cancel();
        let joined = current.task.await;
        self.set_bound(None);
        joined.map_err(|e| ReceiverError::Join(e.to_string()))?;

        info!(receiver = %self.name, "Stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.local_addr().is_some()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        match self.bound.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn pose_store(&self) -> &Arc<PoseStore> {
        &self.store
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for VmcReceiver {
    fn drop(&mut self) {
        // Never leave a detached listener holding the port
        if let Some(current) = self.running.get_mut().take() {
            current.cancel.cancel();
        }
    }
}

/// Merge one datagram into the store.
///
/// Every delta the datagram carries lands under a single write lock; bad
/// messages are counted and skipped.
pub async fn ingest(store: &PoseStore, stats: &ReceiverStats, buf: &[u8]) {
    let decoded = decoder::decode_packet(buf);
    for err in &decoded.errors {
        debug!("Dropped VMC message: {}", err);
    }

    let applied = if decoded.deltas.is_empty() {
        0
    } else {
        store.apply(decoded.deltas).await
    };
    stats.record(applied, decoded.ignored, decoded.errors.len());
}

async fn listen(
    socket: UdpSocket,
    name: String,
    store: Arc<PoseStore>,
    stats: Arc<ReceiverStats>,
    bound: Arc<StdMutex<Option<SocketAddr>>>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(receiver = %name, "Listener cancelled");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, _from)) => ingest(&store, &stats, &buf[..len]).await,
                    // ICMP port-unreachable surfaces here on some platforms
                    Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                        debug!(receiver = %name, "Ignoring connection reset");
                    }
                    Err(e) => {
                        warn!(receiver = %name, "Socket receive failed, listener exiting: {}", e);
                        break;
                    }
                }
            }
        }
    }
    set_bound(&bound, None);
    // Dropping the socket here releases the port before stop() returns
    drop(socket);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{BLEND_VAL, BONE_POS};
    use crate::osc::{OscArg, OscMessage, encode_bundle};
    use crate::skeleton::{BoneName, ShapeName};
    use std::time::Duration;

    fn localhost() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn bone_msg(key: &str, x: f32) -> OscMessage {
        let mut args = vec![OscArg::Str(key.into())];
        args.extend([x, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0].map(OscArg::Float));
        OscMessage::new(BONE_POS, args)
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn ingest_applies_good_and_counts_bad() {
        let store = PoseStore::new();
        let stats = ReceiverStats::default();
        let mut bad = bone_msg("Hips", 1.0);
        bad.args[2] = OscArg::Str("x".into());
        let packet = encode_bundle(&[
            bone_msg("Hips", 1.0),
            bad,
            OscMessage::new(
                BLEND_VAL,
                vec![OscArg::Str("JawOpen".into()), OscArg::Float(2.0)],
            ),
        ]);

        ingest(&store, &stats, &packet).await;

        let pose = store.snapshot().await;
        assert_eq!(pose.bones[&BoneName::Hips].position.x, 1.0);
        assert_eq!(pose.blend_shapes[&ShapeName::JawOpen], 1.0);
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                datagrams: 1,
                applied: 2,
                decode_errors: 1,
                ignored: 0
            }
        );
    }

    #[tokio::test]
    async fn malformed_datagram_leaves_pose_unchanged() {
        let store = PoseStore::new();
        let stats = ReceiverStats::default();
        ingest(&store, &stats, &bone_msg("Hips", 3.0).encode()).await;
        let before = serde_json::to_vec(&store.snapshot().await).unwrap();

        let mut short = bone_msg("Hips", 9.0);
        short.args.truncate(5);
        ingest(&store, &stats, &short.encode()).await;
        ingest(&store, &stats, &[0xff, 0x00, 0x13]).await;
        ingest(&store, &stats, &bone_msg("Tail", 9.0).encode()).await;

        let after = serde_json::to_vec(&store.snapshot().await).unwrap();
        assert_eq!(before, after);
        assert_eq!(stats.snapshot().decode_errors, 3);
    }

    #[tokio::test]
    async fn receives_over_udp() {
        let store = Arc::new(PoseStore::new());
        let receiver = VmcReceiver::new(localhost(), store.clone());
        receiver.start().await.unwrap();
        let addr = receiver.local_addr().unwrap();
        assert!(receiver.is_running());
        assert_ne!(addr.port(), 0);

        let client = UdpSocket::bind(localhost()).await.unwrap();
        client
            .send_to(&bone_msg("LeftHand", 0.5).encode(), addr)
            .await
            .unwrap();

        for _ in 0..200 {
            if store.read(|p| p.bones.contains_key(&BoneName::LeftHand)).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let pose = store.snapshot().await;
        assert_eq!(pose.bones[&BoneName::LeftHand].position.x, 0.5);
        wait_for(|| receiver.stats().applied == 1).await;
        assert_eq!(receiver.stats().datagrams, 1);

        receiver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_releases_the_port() {
        let store = Arc::new(PoseStore::new());
        let first = VmcReceiver::new(localhost(), store.clone());
        first.start().await.unwrap();
        let addr = first.local_addr().unwrap();

        // Same port is busy while running
        let second = VmcReceiver::named("second", addr, store.clone());
        assert!(matches!(
            second.start().await,
            Err(ReceiverError::Bind { .. })
        ));

        first.stop().await.unwrap();
        assert!(!first.is_running());
        assert_eq!(first.local_addr(), None);

        second.start().await.unwrap();
        assert_eq!(second.local_addr(), Some(addr));
        second.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dead_listener_clears_address_and_restarts() {
        let store = Arc::new(PoseStore::new());
        let receiver = VmcReceiver::new(localhost(), store);
        receiver.start().await.unwrap();
        let addr = receiver.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        // End the listener without going through stop()
        if let Some(current) = receiver.running.lock().await.as_ref() {
            current.cancel.cancel();
        }
        wait_for(|| !receiver.is_running()).await;
        assert_eq!(receiver.local_addr(), None);
        for _ in 0..200 {
            let finished = receiver
                .running
                .lock()
                .await
                .as_ref()
                .is_some_and(|r| r.task.is_finished());
            if finished {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // start() reaps the dead task and the new address sticks
        receiver.start().await.unwrap();
        assert!(receiver.is_running());
        let rebound = receiver.local_addr().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(receiver.local_addr(), Some(rebound));
        receiver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let store = Arc::new(PoseStore::new());
        let receiver = VmcReceiver::new(localhost(), store);

        receiver.stop().await.unwrap();
        receiver.start().await.unwrap();
        let addr = receiver.local_addr();
        receiver.start().await.unwrap();
        assert_eq!(receiver.local_addr(), addr);

        receiver.stop().await.unwrap();
        receiver.stop().await.unwrap();
        assert!(!receiver.is_running());

        // Restart after stop binds again
        receiver.start().await.unwrap();
        wait_for(|| receiver.is_running()).await;
        receiver.stop().await.unwrap();
    }
}
